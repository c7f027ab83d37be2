//! Resource registry query tests
//!
//! Filtering, ordering and pagination through both registry generations.

use std::sync::Arc;

use devops_apiserver::Error;
use devops_apiserver::objects::{GenericObject, ObjectCache, ObjectMeta, Snapshot, Store};
use devops_apiserver::resources::{ListerSearcher, ResourceGetter, v1alpha2, v1alpha3};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use query_core::{Condition, Query, fields};

fn widgets() -> v1alpha2::ResourceGetter {
    let store = Arc::new(Store::new());
    store.replace((0..25).map(|i| GenericObject::new(ObjectMeta::named(format!("widget-{i:02}")))));
    v1alpha2::ResourceGetter::new().with_searcher("widgets", ListerSearcher::shared("widgets", store))
}

fn names(page: &devops_apiserver::resources::ListResult) -> Vec<String> {
    page.items.iter().map(|o| o.meta().name.clone()).collect()
}

fn by_name() -> Query {
    Query::new().ordered_by(fields::NAME, false)
}

/// 25 widgets, limit 10, offset 20: the last five
#[test]
fn test_widgets_last_page() {
    let registry = widgets();

    let page = registry.list("widgets", "", &by_name().paged(10, 20)).unwrap();

    assert_eq!(page.total_count, 25);
    assert_eq!(
        names(&page),
        vec!["widget-20", "widget-21", "widget-22", "widget-23", "widget-24"]
    );
}

/// Listing twice with the same query gives the same page
#[test]
fn test_pagination_is_idempotent() {
    let registry = widgets();
    let query = by_name().paged(7, 3);

    let first = registry.list("widgets", "", &query).unwrap();
    let second = registry.list("widgets", "", &query).unwrap();

    assert_eq!(first.total_count, second.total_count);
    assert_eq!(names(&first), names(&second));
}

/// No limit returns everything past the offset; an offset past the end is empty
#[test]
fn test_pagination_boundaries() {
    let registry = widgets();

    let rest = registry.list("widgets", "", &by_name().paged(-1, 5)).unwrap();
    assert_eq!(rest.items.len(), 20);
    assert_eq!(rest.total_count, 25);

    let beyond = registry.list("widgets", "", &by_name().paged(10, 40)).unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_count, 25);
}

/// Conditions narrow the total before pagination
#[test]
fn test_conditions_count_before_paging() {
    let registry = widgets();
    let query = by_name()
        .with_condition(fields::NAME, Condition::fuzzy("widget-1"))
        .paged(3, 0);

    let page = registry.list("widgets", "", &query).unwrap();

    assert_eq!(page.total_count, 10);
    assert_eq!(names(&page), vec!["widget-10", "widget-11", "widget-12"]);
}

/// Legacy parameters reach the registry unchanged
#[test]
fn test_legacy_params_drive_the_registry() {
    let registry = widgets();
    let query = Query::from_legacy_params([
        ("conditions", "name~widget-2"),
        ("paging", "limit=2,page=2"),
        ("orderBy", "name"),
        ("reverse", "true"),
    ])
    .unwrap();

    let page = registry.list("widgets", "", &query).unwrap();

    assert_eq!(page.total_count, 5);
    assert_eq!(names(&page), vec!["widget-22", "widget-21"]);
}

/// A cluster-only resource asked for in a namespace never reaches a searcher
#[test]
fn test_cluster_scoped_resource_rejects_namespace() {
    let cache = ObjectCache::from_snapshot(Snapshot {
        namespaces: vec![GenericObject::new(ObjectMeta::named("dev"))],
        ..Snapshot::default()
    });

    let legacy = v1alpha2::ResourceGetter::from_cache(&cache);
    assert!(matches!(
        legacy.list("namespaces", "dev", &Query::new()),
        Err(Error::NotSupported(_))
    ));

    let current = v1alpha3::ResourceGetter::from_cache(&cache);
    assert!(matches!(
        current.list("workspaces", "dev", &Query::new()),
        Err(Error::NotSupported(_))
    ));
}

/// The current generation filters by any known field
#[test]
fn test_current_params_filter_by_workspace_label() {
    let cache = ObjectCache::from_snapshot(Snapshot {
        devops_projects: vec![
            GenericObject::new(
                ObjectMeta::named("proj-a").with_label("kubesphere.io/workspace", "ws1"),
            ),
            GenericObject::new(
                ObjectMeta::named("proj-b").with_label("kubesphere.io/workspace", "ws2"),
            ),
        ],
        ..Snapshot::default()
    });
    let registry = v1alpha3::ResourceGetter::from_cache(&cache);
    let query = Query::from_params([("workspace", "ws2")]).unwrap();

    let page = registry.list("devopsprojects", "", &query).unwrap();

    assert_eq!(names(&page), vec!["proj-b"]);
}

/// Without sortBy the current generation lists newest first
#[test]
fn test_current_default_order_is_newest_first() {
    let project = |name: &str, day: u32| {
        GenericObject::new(
            ObjectMeta::named(name).created_at(Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()),
        )
    };
    let cache = ObjectCache::from_snapshot(Snapshot {
        devops_projects: vec![
            project("p1", 1),
            project("p2", 3),
            project("p3", 2),
            project("p4", 3),
        ],
        ..Snapshot::default()
    });
    let registry = v1alpha3::ResourceGetter::from_cache(&cache);
    let query = Query::from_params(std::iter::empty::<(&str, &str)>()).unwrap();

    let page = registry.list("devopsprojects", "", &query).unwrap();

    // equal timestamps fall back to name, flipped along with the order
    assert_eq!(names(&page), vec!["p4", "p2", "p3", "p1"]);
    assert_eq!(page.total_count, 4);
}
