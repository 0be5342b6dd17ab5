//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use helios_indexing::backends::MemoryBackend;
use helios_indexing::cluster::Cluster;
use helios_indexing::config::ClusterConfig;
use helios_indexing::core::SearchBackend;
use helios_indexing::registry::{FieldDescriptor, TypeDescriptor, TypeRegistry};
use helios_indexing::types::{Document, FieldKind};
use serde::{Deserialize, Serialize};

pub const SCOPE: &str = "sample";
pub const ORDER_TYPE: &str = "sample.sales.Order";
pub const PRIORITY_ORDER_TYPE: &str = "sample.sales.PriorityOrder";
pub const CUSTOMER_TYPE: &str = "sample.crm.Customer";

const PRODUCT_NAMES: &[&str] = &[
    "Basic Widget",
    "Premium Widget",
    "Gadget Pro",
    "Basic Gadget",
    "Deluxe Sprocket",
];
const CUSTOMERS: &[&str] = &["Ada Lovelace", "Grace Hopper", "Alan Turing", "Edsger Dijkstra"];
const STATUSES: &[&str] = &["open", "shipped", "closed"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_name: String,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_number: String,
    pub sequence: i64,
    pub customer_name: String,
    pub status: String,
    pub order_date: String,
    pub total: f64,
    pub products: Vec<Product>,
}

impl Document for Order {
    const TYPE_NAME: &'static str = ORDER_TYPE;

    fn id(&self) -> String {
        self.order_number.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityOrder {
    pub order_number: String,
    pub sequence: i64,
    pub customer_name: String,
    pub status: String,
    pub order_date: String,
    pub total: f64,
    pub products: Vec<Product>,
    pub courier: String,
}

impl Document for PriorityOrder {
    const TYPE_NAME: &'static str = PRIORITY_ORDER_TYPE;

    fn id(&self) -> String {
        self.order_number.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
}

impl Document for Customer {
    const TYPE_NAME: &'static str = CUSTOMER_TYPE;

    fn id(&self) -> String {
        self.customer_id.clone()
    }

    fn index_name(&self) -> Option<String> {
        Some("Customers".to_string())
    }
}

/// Registers the sample types.
pub fn types() -> Arc<TypeRegistry> {
    let types = TypeRegistry::new();
    types.register(
        TypeDescriptor::new(ORDER_TYPE)
            .with_index_name("orders")
            .with_id_field("order_number")
            .with_field(FieldDescriptor::new("order_number", FieldKind::Keyword))
            .with_field(FieldDescriptor::new("sequence", FieldKind::Integer))
            .with_field(FieldDescriptor::new("customer_name", FieldKind::Text).with_label("Customer"))
            .with_field(FieldDescriptor::new("status", FieldKind::Keyword))
            .with_field(FieldDescriptor::new("order_date", FieldKind::Date))
            .with_field(FieldDescriptor::new("total", FieldKind::Float))
            .with_field(FieldDescriptor::new("products", FieldKind::Object))
            .with_field(FieldDescriptor::new("products.product_name", FieldKind::Text))
            .with_field(FieldDescriptor::new("products.price", FieldKind::Float))
            .with_field(FieldDescriptor::new("products.quantity", FieldKind::Integer)),
    );
    types.register(
        TypeDescriptor::new(PRIORITY_ORDER_TYPE)
            .with_parent(ORDER_TYPE)
            .with_index_name("priority_orders")
            .with_index_as_type(ORDER_TYPE)
            .with_field(FieldDescriptor::new("courier", FieldKind::Keyword)),
    );
    types.register(
        TypeDescriptor::new(CUSTOMER_TYPE)
            .with_field(FieldDescriptor::new("customer_id", FieldKind::Keyword))
            .with_field(FieldDescriptor::new("name", FieldKind::Text)),
    );
    Arc::new(types)
}

pub fn config() -> ClusterConfig {
    ClusterConfig::with_scope(SCOPE)
}

/// A cluster over `backend` with the sample types, not yet initialized.
pub fn cluster_on(backend: Arc<dyn SearchBackend>) -> Cluster {
    Cluster::builder(backend, config())
        .with_types(types())
        .build()
        .expect("valid sample configuration")
}

/// A fresh in-memory cluster, initialized.
pub async fn cluster() -> Cluster {
    let cluster = cluster_on(Arc::new(MemoryBackend::new()));
    cluster.initialize().await.expect("initialize");
    cluster
}

/// Deterministic sample order `n`.
pub fn order(n: i64) -> Order {
    let products = (0..(n % 3 + 1))
        .map(|i| {
            let name = PRODUCT_NAMES[((n + i) as usize) % PRODUCT_NAMES.len()];
            Product {
                product_name: name.to_string(),
                price: 5.0 + ((n + i) % 7) as f64,
                quantity: (i + 1),
            }
        })
        .collect::<Vec<_>>();
    let total = products.iter().map(|p| p.price * p.quantity as f64).sum();
    Order {
        order_number: format!("ORD-{:04}", n),
        sequence: n,
        customer_name: CUSTOMERS[(n as usize) % CUSTOMERS.len()].to_string(),
        status: STATUSES[(n as usize) % STATUSES.len()].to_string(),
        order_date: format!("2024-{:02}-{:02}", n % 12 + 1, n % 28 + 1),
        total,
        products,
    }
}

pub fn orders(count: i64) -> Vec<Order> {
    (0..count).map(order).collect()
}

pub fn priority_order(n: i64) -> PriorityOrder {
    let base = order(n);
    PriorityOrder {
        order_number: format!("PRI-{:04}", n),
        sequence: base.sequence,
        customer_name: base.customer_name,
        status: base.status,
        order_date: base.order_date,
        total: base.total,
        products: base.products,
        courier: "express".to_string(),
    }
}

/// An initialized cluster holding `count` sample orders.
pub async fn seeded_cluster(count: i64) -> Cluster {
    let cluster = cluster().await;
    let written = cluster.commit_many(&orders(count)).await.expect("seed orders");
    assert_eq!(written as i64, count);
    cluster
}

/// Installs a test subscriber once; `RUST_LOG` controls the output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
