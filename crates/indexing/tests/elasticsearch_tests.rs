//! Elasticsearch backend integration tests.
//!
//! Tests that need a running cluster start one with testcontainers.
//!
//! Run with: `cargo test -p helios-indexing --features elasticsearch -- elasticsearch`

#![cfg(feature = "elasticsearch")]

mod common;

use helios_indexing::backends::ElasticsearchBackend;
use helios_indexing::config::{ClusterAuth, ClusterConfig};
use helios_indexing::core::{BackendKind, SearchBackend};

// ============================================================================
// Backend Configuration Tests (no ES instance required)
// ============================================================================

#[test]
fn test_backend_creation() {
    // Only builds the client; nothing connects.
    let backend = ElasticsearchBackend::new(ClusterConfig::with_scope("acme")).unwrap();
    assert_eq!(backend.kind(), BackendKind::Elasticsearch);
    assert_eq!(backend.name(), "elasticsearch");
    assert_eq!(backend.config().scope(), "acme");
}

#[test]
fn test_backend_creation_with_auth() {
    let config = ClusterConfig {
        nodes: vec!["https://search.internal:9243".to_string()],
        auth: Some(ClusterAuth::Basic {
            username: "indexer".to_string(),
            password: "secret".to_string(),
        }),
        disable_certificate_validation: true,
        ..ClusterConfig::with_scope("acme")
    };
    assert!(ElasticsearchBackend::new(config).is_ok());
}

#[test]
fn test_invalid_node_url() {
    let config = ClusterConfig {
        nodes: vec!["not a url".to_string()],
        ..ClusterConfig::with_scope("acme")
    };
    assert!(ElasticsearchBackend::new(config).is_err());
}

// ============================================================================
// Integration Tests (requires Docker for testcontainers)
// ============================================================================

/// Runs the catalog and query paths against a real Elasticsearch node.
///
/// These need Docker and are ignored by default. Run with:
///   cargo test -p helios-indexing --features elasticsearch -- --ignored es_integration
#[cfg(test)]
mod es_integration {
    use helios_indexing::cluster::Cluster;
    use helios_indexing::config::ClusterConfig;
    use helios_indexing::types::{AggregationRequest, BucketField, FilterField, IndexConfig, QueryCriteria, SortField};

    use testcontainers::ImageExt;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::elastic_search::ElasticSearch;
    use tokio::sync::OnceCell;

    use crate::common::*;

    /// Shared Elasticsearch container reused across all tests in this module.
    struct SharedEs {
        host: String,
        port: u16,
        /// Kept alive for the duration of the test binary; dropped at process exit.
        _container: testcontainers::ContainerAsync<ElasticSearch>,
    }

    static SHARED_ES: OnceCell<SharedEs> = OnceCell::const_new();

    async fn shared_es() -> &'static SharedEs {
        SHARED_ES
            .get_or_init(|| async {
                let run_id = std::env::var("GITHUB_RUN_ID").unwrap_or_default();
                let container = ElasticSearch::default()
                    .with_env_var("ES_JAVA_OPTS", "-Xms256m -Xmx256m")
                    .with_label("github.run_id", &run_id)
                    .with_startup_timeout(std::time::Duration::from_secs(120))
                    .start()
                    .await
                    .expect("Failed to start Elasticsearch container");

                let port = container
                    .get_host_port_ipv4(9200)
                    .await
                    .expect("Failed to get host port");

                let host = container
                    .get_host()
                    .await
                    .expect("Failed to get host")
                    .to_string();

                SharedEs {
                    host,
                    port,
                    _container: container,
                }
            })
            .await
    }

    /// Builds an initialized cluster on the shared node.
    ///
    /// Each call gets its own scope, so tests never see each other's indices.
    async fn es_cluster() -> Cluster {
        let es = shared_es().await;
        let config = ClusterConfig {
            nodes: vec![format!("http://{}:{}", es.host, es.port)],
            number_of_replicas: 0,
            refresh_interval: "1ms".to_string(),
            ..ClusterConfig::with_scope(format!("t{}", uuid::Uuid::new_v4().simple()))
        };

        let cluster = Cluster::elasticsearch(config)
            .expect("Failed to create Elasticsearch backend")
            .with_types(types())
            .build()
            .expect("Failed to build cluster");
        cluster.initialize().await.expect("Failed to initialize catalog");
        cluster
    }

    /// A cluster whose order index refreshes on every commit, seeded with `count` orders.
    async fn seeded_es_cluster(count: i64) -> Cluster {
        let cluster = es_cluster().await;
        cluster
            .create_index(IndexConfig::new("orders", ORDER_TYPE).with_force_refresh(true))
            .await
            .unwrap()
            .expect("order index");
        assert_eq!(cluster.commit_many(&orders(count)).await.unwrap() as i64, count);
        cluster
    }

    // ========================================================================
    // Catalog Tests
    // ========================================================================

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn es_integration_create_and_reload() {
        let cluster = es_cluster().await;
        let scope = cluster.config().scope();
        let created = cluster
            .create_index(IndexConfig::new("Orders", ORDER_TYPE).with_meta("owner", "sales"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.name, format!("{}_orders", scope));
        assert!(cluster.backend().index_exists(&created.name).await.unwrap());

        cluster.set_hidden("orders", true).await.unwrap();
        assert_eq!(cluster.refresh().await.unwrap(), 1);
        let reloaded = cluster.index("orders").unwrap();
        assert!(reloaded.is_hidden);
        assert_eq!(reloaded.meta.get("owner").map(String::as_str), Some("sales"));

        assert!(cluster.delete_index("orders", false).await.unwrap());
        assert!(!cluster.backend().index_exists(&created.name).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn es_integration_alias_round_trip() {
        let cluster = seeded_es_cluster(3).await;
        let scope = cluster.config().scope();
        cluster
            .create_index(
                IndexConfig::new("priority_orders", PRIORITY_ORDER_TYPE)
                    .with_index_as_type(ORDER_TYPE)
                    .with_force_refresh(true),
            )
            .await
            .unwrap()
            .unwrap();

        let written = cluster.commit(&priority_order(1)).await.unwrap();
        assert_eq!(written, format!("{}_orders", scope));

        let priority = cluster
            .query::<PriorityOrder>(QueryCriteria::advanced().for_type(PRIORITY_ORDER_TYPE))
            .await
            .unwrap();
        assert_eq!(priority.total, 1);
        assert_eq!(priority.documents[0].document.courier, "express");

        let fetched = cluster.get::<PriorityOrder>("PRI-0001").await.unwrap();
        assert_eq!(fetched.map(|o| o.order_number), Some("PRI-0001".to_string()));
        assert!(cluster.get::<PriorityOrder>("ORD-0001").await.unwrap().is_none());
    }

    // ========================================================================
    // Query Tests
    // ========================================================================

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn es_integration_paging_and_filters() {
        let cluster = seeded_es_cluster(40).await;
        let page = cluster
            .query::<Order>(
                QueryCriteria::advanced()
                    .for_type(ORDER_TYPE)
                    .sort(SortField::asc("sequence", 0))
                    .page(10, 10),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 40);
        assert_eq!(page.documents.len(), 10);
        assert_eq!(page.documents[0].document.sequence, 10);

        let basic = cluster
            .query::<Order>(
                QueryCriteria::advanced()
                    .for_type(ORDER_TYPE)
                    .filter(FilterField::new("products.product_name", "anyWord", "Basic"))
                    .page(0, 40),
            )
            .await
            .unwrap();
        assert!(basic.total > 0);
        assert!(basic.iter().all(|o| {
            o.products
                .iter()
                .any(|p| p.product_name.to_lowercase().contains("basic"))
        }));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn es_integration_buckets_and_aggregations() {
        let cluster = seeded_es_cluster(30).await;
        let results = cluster
            .query::<Order>(
                QueryCriteria::advanced()
                    .for_type(ORDER_TYPE)
                    .bucket(BucketField::new("status"))
                    .aggregate(
                        AggregationRequest::new("terms", "customer_name")
                            .with_nested(AggregationRequest::new("sum", "total")),
                    )
                    .page(0, 0),
            )
            .await
            .unwrap();
        assert!(!results.is_failure(), "{:?}", results.messages);
        assert!(results.documents.is_empty());
        assert_eq!(results.bucket("status").unwrap().values.len(), 3);
        let customers = results.aggregation("terms", "customer_name").unwrap().buckets();
        assert_eq!(customers.len(), 4);
        assert!(customers.iter().all(|b| b.nested[0].as_single().is_some()));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn es_integration_rejected_aggregation_is_failure_shaped() {
        let cluster = seeded_es_cluster(5).await;
        let results = cluster
            .query::<Order>(
                QueryCriteria::aggregation()
                    .for_type(ORDER_TYPE)
                    .aggregate(AggregationRequest::new("avg", "customer_name")),
            )
            .await
            .unwrap();
        assert!(results.is_failure());
        assert_eq!(results.total, -1);
        assert!(!results.messages.is_empty());
    }
}
