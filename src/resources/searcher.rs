use std::sync::Arc;

use query_core::{Query, filter_and_sort};

use crate::objects::{Lister, Object, Selector};
use crate::{Error, Result};

/// Per-type lookup and search over a cached snapshot.
pub trait Searcher: Send + Sync {
    /// One object by namespace and name.
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<dyn Object>>;

    /// Every object in `namespace` (all when empty) satisfying the query's
    /// conditions, in the query's order. Pagination is left to the caller.
    fn search(&self, namespace: &str, query: &Query) -> Result<Vec<Arc<dyn Object>>>;
}

/// [`Searcher`] over any [`Lister`].
pub struct ListerSearcher<T> {
    resource: &'static str,
    lister: Arc<dyn Lister<T>>,
}

impl<T: Object + 'static> ListerSearcher<T> {
    /// Searcher for `resource` backed by `lister`.
    pub fn new(resource: &'static str, lister: Arc<dyn Lister<T>>) -> Self {
        Self { resource, lister }
    }

    /// Boxed as a shared searcher.
    pub fn shared<L>(resource: &'static str, lister: Arc<L>) -> Arc<dyn Searcher>
    where
        L: Lister<T> + 'static,
    {
        Arc::new(Self::new(resource, lister))
    }
}

impl<T: Object + 'static> Searcher for ListerSearcher<T> {
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<dyn Object>> {
        self.lister
            .get_by_key(namespace, name)
            .map(|o| o as Arc<dyn Object>)
            .ok_or_else(|| Error::not_found(self.resource, name))
    }

    fn search(&self, namespace: &str, query: &Query) -> Result<Vec<Arc<dyn Object>>> {
        let items = self.lister.list(namespace, &Selector::everything());
        Ok(filter_and_sort(items, query)
            .into_iter()
            .map(|o| o as Arc<dyn Object>)
            .collect())
    }
}
