use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_stream::StreamExt;
use wcpos_api::{document, Document};
use wcpos_query::testing::FakeRemote;
use wcpos_query::{
    ApiError, Collection, CollectionConfig, Collections, FilterValue, MemoryCollection,
    QueryConfig, QueryDescription, QueryManager, QueryParams, QueryStatus, SortParam, Value,
};

struct Harness {
    manager: QueryManager,
    collection: Arc<MemoryCollection>,
    remote: Arc<FakeRemote>,
}

fn products_config() -> CollectionConfig {
    CollectionConfig::new("id").searchable(["name"])
}

fn harness(config: QueryConfig, remote_docs: Vec<Document>) -> Harness {
    let config = config.with_collection("products", products_config());
    let collection = Arc::new(MemoryCollection::new(
        "products",
        config.collection("products"),
    ));
    let collections = Arc::new(Collections::new().with(collection.clone()));
    let remote = Arc::new(FakeRemote::new().with_dataset(
        "products",
        products_config(),
        remote_docs,
    ));
    let manager = QueryManager::new(config, collections, remote.clone());
    Harness {
        manager,
        collection,
        remote,
    }
}

fn product(id: i64, name: &str) -> Document {
    document([("id", Value::Integer(id)), ("name", Value::from(name))])
}

fn by_name() -> QueryDescription {
    QueryDescription::new(
        "products",
        QueryParams::new().with_sort(SortParam::asc("name")),
    )
}

#[tokio::test(start_paused = true)]
async fn test_products_search_end_to_end() {
    let h = harness(
        QueryConfig::default(),
        vec![product(2, "B"), product(1, "A")],
    );

    let query = h.manager.get_query(&by_name());
    let mut resource = query.resource().unwrap();

    let synced = resource
        .wait_for(|r| r.len() == 2 && !r.is_loading)
        .await
        .unwrap();
    assert_eq!(synced.values_of("name"), vec![Value::from("A"), Value::from("B")]);
    assert_eq!(h.remote.request_count(), 1);

    query.search_debounced("B").unwrap();
    sleep(Duration::from_millis(299)).await;
    assert_eq!(h.remote.requests_with_search("B"), 0);
    assert_eq!(resource.current().len(), 2);

    sleep(Duration::from_millis(50)).await;
    let searched = resource.current();
    assert_eq!(searched.values_of("name"), vec![Value::from("B")]);
    assert!(!searched.is_loading);
    assert_eq!(h.remote.requests_with_search("B"), 1);
    assert_eq!(h.remote.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_collapses_keystrokes() {
    let h = harness(QueryConfig::default(), vec![product(1, "Blue"), product(2, "Black")]);
    let query = h.manager.get_query(&by_name());
    let _resource = query.resource().unwrap();

    for text in ["B", "Bl", "Blu"] {
        query.search_debounced(text).unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_millis(400)).await;

    assert_eq!(h.remote.requests_with_search("B"), 0);
    assert_eq!(h.remote.requests_with_search("Bl"), 0);
    assert_eq!(h.remote.requests_with_search("Blu"), 1);
    assert_eq!(query.params().search.as_deref(), Some("Blu"));
}

#[tokio::test]
async fn test_one_query_per_fingerprint() {
    let h = harness(QueryConfig::default(), vec![]);
    let first = QueryDescription::new(
        "products",
        QueryParams::new()
            .with_filter("status", FilterValue::eq("publish"))
            .with_filter("category", FilterValue::eq(3)),
    );
    let second = QueryDescription::new(
        "products",
        QueryParams::new()
            .with_filter("category", FilterValue::eq(3))
            .with_filter("status", FilterValue::eq("publish"))
            .with_search("  "),
    );

    let a = h.manager.get_query(&first);
    let b = h.manager.get_query(&second);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(h.manager.len(), 1);
    assert_eq!(h.manager.ref_count(a.fingerprint()), Some(2));

    let other = h.manager.get_query(&by_name());
    assert!(!Arc::ptr_eq(&a, &other));
    assert_eq!(h.manager.len(), 2);
}

#[tokio::test]
async fn test_fingerprint_stays_the_registration_key_after_param_changes() {
    let h = harness(QueryConfig::default(), vec![]);
    let query = h.manager.get_query(&by_name());
    let key = query.fingerprint().to_string();

    query.search("mug").unwrap();
    assert_eq!(query.fingerprint(), key);
    assert!(h.manager.contains(&key));
    assert!(Arc::ptr_eq(&query, &h.manager.get_query(&by_name())));
}

#[tokio::test(start_paused = true)]
async fn test_idle_eviction_after_grace_period() {
    let h = harness(QueryConfig::default(), vec![]);
    let query = h.manager.get_query(&by_name());
    let key = query.fingerprint().to_string();

    h.manager.release_query(&query);
    assert_eq!(h.manager.ref_count(&key), Some(0));

    sleep(Duration::from_secs(9)).await;
    assert!(h.manager.contains(&key));

    // Re-acquiring cancels the pending eviction
    let again = h.manager.get_query(&by_name());
    assert!(Arc::ptr_eq(&query, &again));
    sleep(Duration::from_secs(20)).await;
    assert!(h.manager.contains(&key));

    h.manager.release_query(&again);
    sleep(Duration::from_millis(10_001)).await;
    assert!(!h.manager.contains(&key));
    assert_eq!(query.status(), QueryStatus::Disposed);
}

#[tokio::test]
async fn test_zero_grace_period_evicts_immediately() {
    let config = QueryConfig {
        idle_eviction_ms: 0,
        ..QueryConfig::default()
    };
    let h = harness(config, vec![]);
    let query = h.manager.get_query(&by_name());
    let _other_ref = h.manager.get_query(&by_name());

    h.manager.release_query(&query);
    assert!(h.manager.contains(query.fingerprint()));
    h.manager.release_query(&query);
    assert!(h.manager.is_empty());
    assert!(query.is_disposed());
}

#[tokio::test]
async fn test_release_of_a_stale_handle_is_ignored() {
    let config = QueryConfig {
        idle_eviction_ms: 0,
        ..QueryConfig::default()
    };
    let h = harness(config, vec![]);
    let old = h.manager.get_query(&by_name());
    h.manager.release_query(&old);

    let fresh = h.manager.get_query(&by_name());
    assert!(!Arc::ptr_eq(&old, &fresh));
    h.manager.release_query(&old);
    assert_eq!(h.manager.ref_count(fresh.fingerprint()), Some(1));
}

#[tokio::test]
async fn test_invalidate_collection_disposes_regardless_of_refs() {
    let h = harness(QueryConfig::default(), vec![]);
    let query = h.manager.get_query(&by_name());
    let _resource = query.resource().unwrap();

    assert_eq!(h.manager.invalidate_collection("products"), 1);
    assert!(h.manager.is_empty());
    assert_eq!(query.status(), QueryStatus::Disposed);
    assert_eq!(h.collection.observer_count(), 0);
    assert!(matches!(
        query.sync().await,
        Err(ApiError::QueryDisposed { .. })
    ));
}

#[tokio::test]
async fn test_replace_collection_swaps_storage() {
    let config = QueryConfig {
        sync_on_subscribe: false,
        ..QueryConfig::default()
    };
    let h = harness(config, vec![]);
    h.collection
        .bulk_upsert(vec![product(1, "Old")], &Default::default())
        .unwrap();
    let old_query = h.manager.get_query(&by_name());
    assert_eq!(old_query.resource().unwrap().current().len(), 1);

    let fresh = Arc::new(MemoryCollection::new("products", products_config()));
    let previous = h.manager.replace_collection(fresh.clone());
    assert!(previous.is_some());
    assert!(old_query.is_disposed());

    let new_query = h.manager.get_query(&by_name());
    assert!(new_query.resource().unwrap().current().is_empty());
    fresh
        .bulk_upsert(vec![product(5, "New")], &Default::default())
        .unwrap();
    assert_eq!(
        new_query.resource().unwrap().current().values_of("name"),
        vec![Value::from("New")]
    );
}

#[tokio::test]
async fn test_errors_are_aggregated_across_queries() {
    let config = QueryConfig {
        sync_on_subscribe: false,
        ..QueryConfig::default()
    };
    let h = harness(config, vec![product(1, "A")]);
    let errors = h.manager.error_stream();
    tokio::pin!(errors);

    let first = h.manager.get_query(&by_name());
    let second = h
        .manager
        .get_query(&QueryDescription::new("products", QueryParams::new()));

    h.remote.fail_next(ApiError::network("502 Bad Gateway"));
    h.remote.fail_next(ApiError::network("timeout"));
    assert!(first.sync().await.is_err());
    assert!(second.sync().await.is_err());

    let a = errors.next().await.unwrap();
    let b = errors.next().await.unwrap();
    assert_eq!(a.fingerprint, first.fingerprint());
    assert_eq!(a.error, ApiError::network("502 Bad Gateway"));
    assert_eq!(b.fingerprint, second.fingerprint());
    assert_eq!(b.collection, "products");
}

#[tokio::test]
async fn test_unknown_collection_never_fails_get_query() {
    let h = harness(QueryConfig::default(), vec![]);
    let mut errors = h.manager.errors();
    let query = h
        .manager
        .get_query(&QueryDescription::new("coupons", QueryParams::new()));

    let err = query.resource().unwrap_err();
    assert_eq!(err, ApiError::collection_unavailable("coupons"));
    assert_eq!(errors.recv().await.unwrap().error, err);
}

#[tokio::test]
async fn test_clear_disposes_everything() {
    let h = harness(QueryConfig::default(), vec![]);
    let a = h.manager.get_query(&by_name());
    let b = h
        .manager
        .get_query(&QueryDescription::new("products", QueryParams::new()));
    h.manager.clear();
    assert!(h.manager.is_empty());
    assert!(a.is_disposed() && b.is_disposed());
}
