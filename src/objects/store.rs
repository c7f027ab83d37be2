use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::Object;

/// Label selector. An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: BTreeMap<String, Option<String>>,
}

impl Selector {
    /// Selector matching every object.
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Require `key=value`.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), Some(value.into()));
        self
    }

    /// Require the presence of `key`.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), None);
        self
    }

    /// Whether `labels` satisfy every requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|(key, value)| match value {
            Some(value) => labels.get(key) == Some(value),
            None => labels.contains_key(key),
        })
    }
}

/// Read-only indexed view of one object type.
pub trait Lister<T: ?Sized>: Send + Sync {
    /// Object by namespace and name. Cluster-scoped objects use an empty
    /// namespace.
    fn get_by_key(&self, namespace: &str, name: &str) -> Option<Arc<T>>;

    /// Objects in `namespace` (all namespaces when empty) matching `selector`.
    fn list(&self, namespace: &str, selector: &Selector) -> Vec<Arc<T>>;

    /// Whether the initial snapshot has been loaded.
    fn has_synced(&self) -> bool;
}

type Index<T> = BTreeMap<(String, String), Arc<T>>;

/// In-process [`Lister`] whose contents are swapped as a whole.
///
/// Readers clone the current snapshot `Arc` and never observe a partial
/// update.
pub struct Store<T> {
    index: RwLock<Arc<Index<T>>>,
    synced: AtomicBool,
}

impl<T: Object> Store<T> {
    /// Empty, unsynced store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Arc::new(BTreeMap::new())),
            synced: AtomicBool::new(false),
        }
    }

    /// Replace the whole contents and mark the store synced.
    pub fn replace<I>(&self, objects: I)
    where
        I: IntoIterator<Item = T>,
    {
        let index: Index<T> = objects
            .into_iter()
            .map(|o| {
                let meta = o.meta();
                ((meta.namespace.clone(), meta.name.clone()), Arc::new(o))
            })
            .collect();
        *self.index.write() = Arc::new(index);
        self.synced.store(true, Ordering::Release);
    }

    /// Number of cached objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Index<T>> {
        Arc::clone(&self.index.read())
    }
}

impl<T: Object> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> Lister<T> for Store<T> {
    fn get_by_key(&self, namespace: &str, name: &str) -> Option<Arc<T>> {
        self.snapshot()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn list(&self, namespace: &str, selector: &Selector) -> Vec<Arc<T>> {
        self.snapshot()
            .values()
            .filter(|o| namespace.is_empty() || o.meta().namespace == namespace)
            .filter(|o| selector.matches(&o.meta().labels))
            .cloned()
            .collect()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}
