//! Cluster connection parameters.
//!
//! [`ClusterConfig`] is plain serde data so it can be embedded in whatever
//! configuration file a host process already loads. Every field has a default.
//!
//! # Example
//!
//! ```
//! use helios_indexing::config::ClusterConfig;
//!
//! let config: ClusterConfig = serde_json::from_str(r#"{ "scope": "Acme" }"#).unwrap();
//! assert_eq!(config.scope(), "acme");
//! assert!(config.auto_create_indices);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

/// Authentication configuration for the search cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for one logical deployment on a search cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Namespace prefix for every index owned by this deployment.
    /// Stored lower-case; index names become `{scope}_{name}`.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Cluster node URLs (e.g., `["http://localhost:9200"]`).
    /// Currently uses the first node (single-node connection pool).
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ClusterAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// Create an index for a document's type when a commit finds none.
    #[serde(default = "default_true")]
    pub auto_create_indices: bool,

    /// Send `compatible-with` media types so a newer cluster accepts
    /// requests shaped for the previous major version.
    #[serde(default)]
    pub api_compatibility: bool,

    /// Number of primary shards per index (default: 1).
    #[serde(default = "default_shards")]
    pub number_of_shards: u32,

    /// Number of replica shards per index (default: 1).
    #[serde(default = "default_replicas")]
    pub number_of_replicas: u32,

    /// Refresh interval (default: "1s").
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,

    /// Maximum result window size (default: 10000).
    #[serde(default = "default_max_result_window")]
    pub max_result_window: u32,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Page size used when a criteria does not set `take` (default: 25).
    #[serde(default = "default_take")]
    pub default_take: usize,
}

fn default_scope() -> String {
    "helios".to_string()
}

fn default_nodes() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_shards() -> u32 {
    1
}

fn default_replicas() -> u32 {
    1
}

fn default_refresh_interval() -> String {
    "1s".to_string()
}

fn default_max_result_window() -> u32 {
    10000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_take() -> usize {
    25
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            nodes: default_nodes(),
            auth: None,
            disable_certificate_validation: false,
            auto_create_indices: true,
            api_compatibility: false,
            number_of_shards: default_shards(),
            number_of_replicas: default_replicas(),
            refresh_interval: default_refresh_interval(),
            max_result_window: default_max_result_window(),
            request_timeout_ms: default_request_timeout_ms(),
            default_take: default_take(),
        }
    }
}

impl ClusterConfig {
    /// Creates a configuration for the given scope with all other values defaulted.
    pub fn with_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Default::default()
        }
    }

    /// Returns the normalized (lower-case, trimmed) scope.
    pub fn scope(&self) -> String {
        self.scope.trim().to_lowercase()
    }

    /// Returns the prefix every index name in this scope starts with.
    pub fn scope_prefix(&self) -> String {
        format!("{}_", self.scope())
    }

    /// Returns the first configured node, or the local default.
    pub fn primary_node(&self) -> String {
        self.nodes
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string())
    }

    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let scope = self.scope();
        if scope.is_empty() {
            errors.push("Scope cannot be empty".to_string());
        }
        if scope.starts_with(&['_', '-', '+', '.'][..]) {
            errors.push(format!("Scope '{}' cannot start with '_', '-', '+' or '.'", scope));
        }
        if scope
            .chars()
            .any(|c| matches!(c, '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | ',' | '#'))
        {
            errors.push(format!("Scope '{}' contains characters not allowed in index names", scope));
        }

        if self.nodes.is_empty() {
            errors.push("At least one node URL is required".to_string());
        }

        if self.number_of_shards == 0 {
            errors.push("Number of shards cannot be 0".to_string());
        }

        if self.request_timeout_ms == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.default_take == 0 {
            errors.push("Default take cannot be 0".to_string());
        }

        if self.default_take > self.max_result_window as usize {
            errors.push("Default take cannot exceed max result window".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
