//! Query composition end to end against the in-memory backend.

mod common;

use common::*;
use helios_indexing::cluster::Cluster;
use helios_indexing::error::{IndexError, NotFoundError};
use helios_indexing::types::{AggregationRequest, BucketField, FilterField, IndexConfig, QueryCriteria, SortField};
use serde_json::{Value, json};

#[tokio::test]
async fn test_paging_is_stable() {
    init_tracing();
    let cluster = seeded_cluster(100).await;
    let by_sequence = || {
        QueryCriteria::advanced()
            .for_type(ORDER_TYPE)
            .sort(SortField::asc("sequence", 0))
    };

    let page = cluster.query::<Order>(by_sequence().page(0, 25)).await.unwrap();
    assert_eq!(page.total, 100);
    assert_eq!(page.documents.len(), 25);
    assert_eq!(page.documents[0].document.sequence, 0);
    assert_eq!(page.documents[24].document.sequence, 24);

    let skip_one = cluster.query::<Order>(by_sequence().page(1, 1)).await.unwrap();
    let first_two = cluster.query::<Order>(by_sequence().page(0, 2)).await.unwrap();
    assert_eq!(skip_one.documents[0].id, first_two.documents[1].id);

    let first_fifty = cluster.query::<Order>(by_sequence().page(0, 50)).await.unwrap();
    for n in [7, 42, 49] {
        let single = cluster.query::<Order>(by_sequence().page(n, 1)).await.unwrap();
        assert_eq!(single.documents.len(), 1);
        assert_eq!(single.documents[0].id, first_fifty.documents[n].id);
    }

    let last = cluster.query::<Order>(by_sequence().page(95, 25)).await.unwrap();
    assert_eq!(last.documents.len(), 5);
}

#[tokio::test]
async fn test_any_word_on_nested_field() {
    let cluster = seeded_cluster(50).await;
    let results = cluster
        .query::<Order>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .filter(FilterField::new("products.product_name", "anyWord", "Basic"))
                .page(0, 50),
        )
        .await
        .unwrap();

    assert!(results.total > 0);
    assert!(results.total < 50);
    for order in results.iter() {
        assert!(
            order
                .products
                .iter()
                .any(|p| p.product_name.to_lowercase().contains("basic")),
            "{} has no basic product",
            order.order_number
        );
    }
}

async fn customer_total(cluster: &Cluster, comparator: &str, value: &str) -> i64 {
    cluster
        .query::<Order>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .filter(FilterField::new("customer_name", comparator, value))
                .page(0, 0),
        )
        .await
        .unwrap()
        .total
}

#[tokio::test]
async fn test_equal_on_text_field_matches_whole_value() {
    let cluster = seeded_cluster(100).await;

    assert_eq!(customer_total(&cluster, "equal", "Grace Hopper").await, 25);
    assert_eq!(customer_total(&cluster, "equal", "grace").await, 0);
    assert_eq!(customer_total(&cluster, "equal", "grace hopper").await, 0);

    assert_eq!(customer_total(&cluster, "notEqual", "Grace Hopper").await, 75);
    assert_eq!(customer_total(&cluster, "notEqual", "hopper").await, 100);

    // Word matching still goes through the analyzed field.
    assert_eq!(customer_total(&cluster, "anyWord", "grace").await, 25);
}

#[tokio::test]
async fn test_range_filters() {
    let cluster = seeded_cluster(100).await;
    let between = cluster
        .query::<Order>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .filter(FilterField::new("sequence", "between", "10|19"))
                .page(0, 0),
        )
        .await
        .unwrap();
    assert_eq!(between.total, 10);
    assert!(between.documents.is_empty());

    let malformed = cluster
        .query::<Order>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .filter(FilterField::new("sequence", "between", "10")),
        )
        .await;
    assert!(matches!(malformed, Err(IndexError::InvalidArgument { .. })));
}

#[tokio::test]
async fn test_free_text_search() {
    let cluster = seeded_cluster(100).await;
    let results = cluster
        .query::<Order>(QueryCriteria::simple("Grace"))
        .await
        .unwrap();
    assert_eq!(results.total, 25);
    assert!(results.iter().all(|o| o.customer_name == "Grace Hopper"));

    let filtered = cluster
        .query::<Order>(
            QueryCriteria::simple("Grace")
                .filter(FilterField::new("status", "equal", "open"))
                .page(0, 100),
        )
        .await
        .unwrap();
    assert!(filtered.iter().all(|o| o.status == "open"));
}

#[tokio::test]
async fn test_buckets_without_documents() {
    let cluster = seeded_cluster(100).await;
    let results = cluster
        .query::<Order>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .bucket(BucketField::new("status"))
                .bucket(BucketField::new("customer_name"))
                .page(0, 0),
        )
        .await
        .unwrap();

    assert!(results.documents.is_empty());
    assert_eq!(results.total, 100);

    let status = results.bucket("status").unwrap();
    assert_eq!(status.values.len(), 3);
    assert_eq!(status.values[0].key, "open");
    assert_eq!(status.values[0].count, 34);
    assert_eq!(status.values.iter().map(|v| v.count).sum::<u64>(), 100);

    let customers = results.bucket("customer_name").unwrap();
    assert_eq!(customers.values.len(), 4);
    assert!(customers.values.iter().all(|v| v.count == 25));

    let plain = cluster
        .query::<Order>(QueryCriteria::advanced().for_type(ORDER_TYPE).page(0, 0))
        .await
        .unwrap();
    assert!(plain.buckets.is_empty());
}

#[tokio::test]
async fn test_unknown_tokens_fail_before_submission() {
    let cluster = seeded_cluster(5).await;

    let kind = cluster
        .query::<Value>(
            QueryCriteria::aggregation()
                .for_type(ORDER_TYPE)
                .aggregate(AggregationRequest::new("median", "total")),
        )
        .await;
    assert!(matches!(kind, Err(IndexError::NotFound(NotFoundError::Aggregation { .. }))));

    let comparator = cluster
        .query::<Value>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .filter(FilterField::new("status", "near", "open")),
        )
        .await;
    assert!(matches!(comparator, Err(IndexError::NotFound(NotFoundError::Comparator { .. }))));

    let index = cluster
        .query::<Value>(QueryCriteria::advanced().in_index("nowhere"))
        .await;
    assert!(matches!(index, Err(IndexError::NotFound(NotFoundError::Index { .. }))));
}

#[tokio::test]
async fn test_rejected_aggregations_are_failure_shaped() {
    let cluster = seeded_cluster(20).await;

    let avg_on_text = cluster
        .query::<Value>(
            QueryCriteria::aggregation()
                .for_type(ORDER_TYPE)
                .aggregate(AggregationRequest::new("avg", "customer_name")),
        )
        .await
        .unwrap();
    assert!(avg_on_text.is_failure());
    assert_eq!(avg_on_text.total, -1);
    assert!(avg_on_text.documents.is_empty());
    assert!(avg_on_text.aggregations.is_empty());
    assert!(!avg_on_text.messages.is_empty());

    let dates_on_keyword = cluster
        .query::<Value>(
            QueryCriteria::aggregation()
                .for_type(ORDER_TYPE)
                .aggregate(AggregationRequest::new("date_histogram", "status").with_calendar_interval("month")),
        )
        .await
        .unwrap();
    assert!(dates_on_keyword.is_failure());
    assert!(!dates_on_keyword.messages.is_empty());
}

#[tokio::test]
async fn test_metrics_and_nested_terms() {
    let cluster = seeded_cluster(30).await;
    let expected_total: f64 = orders(30).iter().map(|o| o.total).sum();

    let results = cluster
        .query::<Value>(
            QueryCriteria::aggregation()
                .for_type(ORDER_TYPE)
                .aggregate(AggregationRequest::new("sum", "total"))
                .aggregate(AggregationRequest::new("max", "sequence"))
                .aggregate(
                    AggregationRequest::new("terms", "status")
                        .with_nested(AggregationRequest::new("avg", "total")),
                ),
        )
        .await
        .unwrap();

    assert!(!results.is_failure(), "{:?}", results.messages);
    assert!(results.documents.is_empty());
    let sum = results.aggregation("sum", "total").and_then(|a| a.as_single()).unwrap();
    assert!((sum - expected_total).abs() < 1e-6);
    assert_eq!(results.aggregation("max", "sequence").and_then(|a| a.as_single()), Some(29.0));

    let statuses = results.aggregation("terms", "status").unwrap().buckets();
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses.iter().map(|b| b.count).sum::<u64>(), 30);
    for bucket in statuses {
        assert_eq!(bucket.nested.len(), 1);
        assert_eq!(bucket.nested[0].kind, "avg");
        assert!(bucket.nested[0].as_single().is_some());
    }
}

#[tokio::test]
async fn test_date_histogram_by_month() {
    let cluster = seeded_cluster(24).await;
    let results = cluster
        .query::<Value>(
            QueryCriteria::aggregation()
                .for_type(ORDER_TYPE)
                .aggregate(AggregationRequest::new("date_histogram", "order_date").with_calendar_interval("month")),
        )
        .await
        .unwrap();
    let months = results.aggregation("date_histogram", "order_date").unwrap().buckets();
    assert_eq!(months.len(), 12);
    assert!(months.iter().all(|b| b.count == 2));
}

#[tokio::test]
async fn test_field_values_and_ids() {
    let cluster = seeded_cluster(12).await;

    let values = cluster
        .query::<Value>(QueryCriteria::field_values("status").for_type(ORDER_TYPE))
        .await
        .unwrap();
    assert!(values.documents.is_empty());
    let mut keys: Vec<_> = values.buckets[0].values.iter().map(|v| v.key.clone()).collect();
    keys.sort();
    assert_eq!(keys, vec!["closed", "open", "shipped"]);

    let missing_field = cluster
        .query::<Value>(QueryCriteria::field_values(" ").for_type(ORDER_TYPE))
        .await;
    assert!(matches!(missing_field, Err(IndexError::InvalidArgument { .. })));

    let by_ids = cluster
        .query::<Order>(QueryCriteria::by_ids(["ORD-0001", "ORD-0005", "ORD-9999"]).for_type(ORDER_TYPE))
        .await
        .unwrap();
    let mut ids: Vec<_> = by_ids.documents.iter().map(|h| h.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["ORD-0001", "ORD-0005"]);
}

#[tokio::test]
async fn test_projection() {
    let cluster = seeded_cluster(3).await;
    let results = cluster
        .query::<Value>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .returning("order_number")
                .returning("status")
                .sort(SortField::desc("sequence", 0)),
        )
        .await
        .unwrap();
    assert_eq!(results.documents[0].document, json!({ "order_number": "ORD-0002", "status": "closed" }));
}

#[tokio::test]
async fn test_deprecated_and_hidden_indices() {
    let cluster = seeded_cluster(4).await;
    cluster
        .deprecate_index("orders", Some("moving to orders_v2".to_string()))
        .await
        .unwrap();

    let results = cluster
        .query::<Order>(QueryCriteria::advanced().for_type(ORDER_TYPE))
        .await
        .unwrap();
    assert_eq!(results.total, 4);
    assert_eq!(
        results.messages,
        vec!["Index 'sample_orders' is deprecated: moving to orders_v2".to_string()]
    );

    cluster.set_hidden("orders", true).await.unwrap();
    let by_type = cluster
        .query::<Order>(QueryCriteria::advanced().for_type(ORDER_TYPE))
        .await;
    assert!(matches!(by_type, Err(IndexError::InvalidOperation { .. })));
    let global = cluster.query::<Order>(QueryCriteria::simple("Ada")).await;
    assert!(matches!(global, Err(IndexError::InvalidOperation { .. })));

    // Hidden indices stay reachable by name.
    let by_name = cluster
        .query::<Order>(QueryCriteria::advanced().in_index("orders"))
        .await
        .unwrap();
    assert_eq!(by_name.total, 4);
}

#[tokio::test]
async fn test_custom_comparator() {
    let cluster = seeded_cluster(100).await;
    assert!(cluster.comparators().register_fn("oneOf", |field, value| {
        let values: Vec<&str> = value.split(',').map(str::trim).collect();
        Ok(json!({ "terms": { field: values } }))
    }));
    assert!(!cluster.comparators().register_fn("equal", |_, _| Ok(json!({ "match_all": {} }))));

    let results = cluster
        .query::<Order>(
            QueryCriteria::advanced()
                .for_type(ORDER_TYPE)
                .filter(FilterField::new("status", "oneOf", "open, closed"))
                .page(0, 0),
        )
        .await
        .unwrap();
    assert_eq!(results.total, 67);
}

#[tokio::test]
async fn test_auto_create_toggle() {
    let cluster = cluster().await;
    cluster.set_auto_create_indices(false);
    let customer = Customer {
        customer_id: "c-1".to_string(),
        name: "Ada Lovelace".to_string(),
    };

    let refused = cluster.commit(&customer).await;
    assert!(matches!(refused, Err(IndexError::NotFound(NotFoundError::Index { .. }))));
    assert!(cluster.index("customers").is_none());

    cluster.set_auto_create_indices(true);
    assert_eq!(cluster.commit(&customer).await.unwrap(), "sample_customers");
    assert_eq!(cluster.get::<Customer>("c-1").await.unwrap(), Some(customer.clone()));

    assert!(cluster.delete(&customer).await.unwrap());
    assert_eq!(cluster.get::<Customer>("c-1").await.unwrap(), None);
}

#[tokio::test]
async fn test_auto_create_does_not_reuse_index_of_another_type() {
    let cluster = cluster().await;
    cluster
        .create_index(IndexConfig::new("customers", ORDER_TYPE))
        .await
        .unwrap()
        .unwrap();
    let customer = Customer {
        customer_id: "c-1".to_string(),
        name: "Ada Lovelace".to_string(),
    };

    let refused = cluster.commit(&customer).await;
    assert!(matches!(refused, Err(IndexError::InvalidOperation { .. })));
    assert_eq!(cluster.index("customers").unwrap().document_type, ORDER_TYPE);
    assert_eq!(cluster.indices().len(), 1);
    assert_eq!(cluster.get::<Customer>("c-1").await.ok().flatten(), None);
}

#[tokio::test]
async fn test_bulk_delete() {
    let cluster = seeded_cluster(10).await;
    let doomed = orders(4);
    assert_eq!(cluster.delete_many(&doomed).await.unwrap(), 4);

    let remaining = cluster
        .query::<Order>(QueryCriteria::advanced().for_type(ORDER_TYPE).page(0, 0))
        .await
        .unwrap();
    assert_eq!(remaining.total, 6);
    assert!(cluster.delete_by_id::<Order>("ORD-0009").await.unwrap());
    assert!(!cluster.delete_by_id::<Order>("ORD-0009").await.unwrap());
}
