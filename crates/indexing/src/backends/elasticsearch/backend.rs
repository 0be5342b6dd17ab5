//! Elasticsearch backend implementation.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cat::CatIndicesParts;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::headers::{ACCEPT, CONTENT_TYPE, HeaderValue};
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetMappingParts,
    IndicesPutMappingParts, IndicesRefreshParts,
};
use elasticsearch::params::Refresh;
use elasticsearch::{
    BulkOperation as EsBulkOperation, BulkParts, DeleteParts, Elasticsearch, GetParts, IndexParts,
    SearchParts,
};
use serde_json::{Value, json};

use crate::config::{ClusterAuth, ClusterConfig};
use crate::core::{BackendKind, BulkOperation, BulkResponse, IndexMapping, SearchBackend};
use crate::error::{BackendError, BackendResult};

const BACKEND_NAME: &str = "elasticsearch";

/// Media type that asks a newer cluster to accept and answer in the previous
/// major version's format.
const COMPATIBLE_MEDIA_TYPE: &str = "application/vnd.elasticsearch+json; compatible-with=8";

fn internal_error(message: String) -> BackendError {
    BackendError::internal(BACKEND_NAME, message)
}

fn refresh_param(refresh: bool) -> Refresh {
    if refresh { Refresh::True } else { Refresh::False }
}

/// Adds the compatibility headers to a request builder when enabled.
///
/// The builder must only borrow locals: namespaces such as `indices()` and
/// part slices are bound before the call so they outlive the request.
macro_rules! compat {
    ($backend:expr, $builder:expr) => {{
        let builder = $builder;
        if $backend.config.api_compatibility {
            builder
                .header(ACCEPT, HeaderValue::from_static(COMPATIBLE_MEDIA_TYPE))
                .header(CONTENT_TYPE, HeaderValue::from_static(COMPATIBLE_MEDIA_TYPE))
        } else {
            builder
        }
    }};
}

/// Elasticsearch search backend.
pub struct ElasticsearchBackend {
    /// The Elasticsearch client.
    client: Elasticsearch,
    /// Configuration.
    config: ClusterConfig,
}

impl Debug for ElasticsearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchBackend")
            .field("nodes", &self.config.nodes)
            .field("scope", &self.config.scope)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchBackend {
    /// Creates a new Elasticsearch backend with the given configuration.
    pub fn new(config: ClusterConfig) -> BackendResult<Self> {
        let client = Self::build_client(&config)?;
        tracing::info!(
            "Elasticsearch backend configured for {} (scope '{}')",
            config.primary_node(),
            config.scope()
        );
        Ok(Self { client, config })
    }

    /// Builds the Elasticsearch client from configuration.
    fn build_client(config: &ClusterConfig) -> BackendResult<Elasticsearch> {
        let url = config.primary_node();

        let parsed_url: elasticsearch::http::Url =
            url.parse().map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Invalid URL: {}", e),
            })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);

        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                ClusterAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                ClusterAuth::Bearer { token } => builder.auth(Credentials::Bearer(token.clone())),
            };
        }

        let transport = builder.build().map_err(|e| BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("Failed to build transport: {}", e),
        })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Turns a non-success response into a rejection carrying the cluster's reason.
    async fn rejection(response: Response) -> BackendError {
        let status = response.status_code().as_u16();
        let body = response.text().await.unwrap_or_default();
        BackendError::QueryError {
            status,
            message: error_reason(&body),
        }
    }

    async fn json_body(response: Response, what: &str) -> BackendResult<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| internal_error(format!("Failed to parse {} response: {}", what, e)))
    }
}

/// Extracts `type: reason` (and the deepest `caused_by` reason) from an error body.
fn error_reason(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    let Some(error) = parsed.get("error") else {
        return body.to_string();
    };
    if let Some(text) = error.as_str() {
        return text.to_string();
    }

    let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
    let reason = error.get("reason").and_then(Value::as_str).unwrap_or_default();
    let mut message = format!("{}: {}", kind, reason);

    let mut cause = error.get("caused_by");
    let mut deepest = None;
    while let Some(c) = cause {
        deepest = c.get("reason").and_then(Value::as_str).or(deepest);
        cause = c.get("caused_by");
    }
    if let Some(deepest) = deepest.filter(|d| *d != reason) {
        message.push_str(&format!(" ({})", deepest));
    }
    message
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn health_check(&self) -> BackendResult<()> {
        let cluster = self.client.cluster();
        let request = cluster.health(elasticsearch::cluster::ClusterHealthParts::None);
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Health check failed: {}", e),
            })?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Cluster health returned status {}", status),
            });
        }

        let body = Self::json_body(response, "health").await?;
        let cluster_status = body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown");

        if cluster_status == "red" {
            return Err(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Cluster status is red: {:?}", body),
            });
        }

        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> BackendResult<Vec<String>> {
        let cat = self.client.cat();
        let patterns = [pattern];
        let request = cat
            .indices(CatIndicesParts::Index(&patterns))
            .format("json")
            .h(&["index"]);
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to list indices: {}", e)))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = Self::json_body(response, "cat indices").await?;
        let mut names: Vec<String> = body
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("index").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn index_exists(&self, index: &str) -> BackendResult<bool> {
        let indices = self.client.indices();
        let names = [index];
        let request = indices.exists(IndicesExistsParts::Index(&names));
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to check index existence: {}", e)))?;

        Ok(response.status_code().is_success())
    }

    async fn create_index(&self, index: &str, body: Value) -> BackendResult<()> {
        let indices = self.client.indices();
        let request = indices.create(IndicesCreateParts::Index(index)).body(body);
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to create index {}: {}", index, e)))?;

        if !response.status_code().is_success() {
            return Err(Self::rejection(response).await);
        }

        tracing::debug!("Created Elasticsearch index '{}'", index);
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> BackendResult<bool> {
        let indices = self.client.indices();
        let names = [index];
        let request = indices.delete(IndicesDeleteParts::Index(&names));
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to delete index {}: {}", index, e)))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(Self::rejection(response).await);
        }

        tracing::debug!("Deleted Elasticsearch index '{}'", index);
        Ok(true)
    }

    async fn get_mapping(&self, index: &str) -> BackendResult<Option<IndexMapping>> {
        let indices = self.client.indices();
        let names = [index];
        let request = indices.get_mapping(IndicesGetMappingParts::Index(&names));
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to read mapping of {}: {}", index, e)))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = Self::json_body(response, "mapping").await?;
        let mappings = &body[index]["mappings"];
        Ok(Some(IndexMapping {
            index: index.to_string(),
            properties: mappings.get("properties").cloned().unwrap_or_else(|| json!({})),
            meta: mappings.get("_meta").cloned().unwrap_or(Value::Null),
        }))
    }

    async fn put_mapping_meta(&self, index: &str, meta: Value) -> BackendResult<()> {
        let indices = self.client.indices();
        let names = [index];
        let request = indices
            .put_mapping(IndicesPutMappingParts::Index(&names))
            .body(json!({ "_meta": meta }));
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to update mapping of {}: {}", index, e)))?;

        if !response.status_code().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    async fn reindex(&self, source: &str, target: &str) -> BackendResult<u64> {
        let response = compat!(
            self,
            self.client
                .reindex()
                .refresh(true)
                .wait_for_completion(true)
                .body(json!({
                    "source": { "index": source },
                    "dest": { "index": target }
                }))
        )
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to reindex {} into {}: {}", source, target, e)))?;

        if !response.status_code().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = Self::json_body(response, "reindex").await?;
        if let Some(failure) = body
            .get("failures")
            .and_then(Value::as_array)
            .and_then(|f| f.first())
        {
            return Err(internal_error(format!(
                "Reindex of {} into {} reported failures: {}",
                source, target, failure
            )));
        }
        Ok(body.get("total").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn refresh(&self, index: &str) -> BackendResult<()> {
        let indices = self.client.indices();
        let names = [index];
        let request = indices.refresh(IndicesRefreshParts::Index(&names));
        let response = compat!(self, request)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to refresh index {}: {}", index, e)))?;

        if !response.status_code().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    async fn upsert(&self, index: &str, id: &str, source: Value, refresh: bool) -> BackendResult<()> {
        let response = compat!(
            self,
            self.client
                .index(IndexParts::IndexId(index, id))
                .refresh(refresh_param(refresh))
                .body(source)
        )
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to index document: {}", e)))?;

        if !response.status_code().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> BackendResult<Option<Value>> {
        let response = compat!(self, self.client.get(GetParts::IndexId(index, id)))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to read document: {}", e)))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(BackendError::QueryError {
                    status: 404,
                    message: error_reason(&body),
                });
            }
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = Self::json_body(response, "get").await?;
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn delete(&self, index: &str, id: &str, refresh: bool) -> BackendResult<bool> {
        let response = compat!(
            self,
            self.client
                .delete(DeleteParts::IndexId(index, id))
                .refresh(refresh_param(refresh))
        )
        .send()
        .await
        .map_err(|e| internal_error(format!("Failed to delete document: {}", e)))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(BackendError::QueryError {
                    status: 404,
                    message: error_reason(&body),
                });
            }
            return Ok(false);
        }
        if !status.is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(true)
    }

    async fn bulk(&self, operations: Vec<BulkOperation>, refresh: bool) -> BackendResult<BulkResponse> {
        let body: Vec<EsBulkOperation<Value>> = operations
            .into_iter()
            .map(|op| match op {
                BulkOperation::Index { index, id, source } => {
                    EsBulkOperation::index(source).id(id).index(index).into()
                }
                BulkOperation::Delete { index, id } => {
                    EsBulkOperation::delete(id).index(index).into()
                }
            })
            .collect();

        let response = compat!(
            self,
            self.client
                .bulk(BulkParts::None)
                .refresh(refresh_param(refresh))
                .body(body)
        )
        .send()
        .await
        .map_err(|e| internal_error(format!("Bulk request failed: {}", e)))?;

        if !response.status_code().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body = Self::json_body(response, "bulk").await?;
        Ok(BulkResponse {
            items: body
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
            errors: body.get("errors").and_then(Value::as_bool).unwrap_or(false),
            took: body.get("took").and_then(Value::as_u64).unwrap_or(0),
        })
    }

    async fn search(&self, indices: &[String], body: Value) -> BackendResult<Value> {
        let targets: Vec<&str> = indices.iter().map(String::as_str).collect();
        let parts = if targets.is_empty() {
            SearchParts::None
        } else {
            SearchParts::Index(&targets)
        };

        let response = compat!(self, self.client.search(parts).body(body))
            .send()
            .await
            .map_err(|e| internal_error(format!("Search request failed: {}", e)))?;

        if !response.status_code().is_success() {
            return Err(Self::rejection(response).await);
        }

        Self::json_body(response, "search").await
    }
}
