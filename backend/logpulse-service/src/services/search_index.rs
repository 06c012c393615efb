use async_trait::async_trait;
use elasticsearch::{
    http::transport::{BuildError, SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, Elasticsearch, SearchParts,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::LogEntry;

/// Upper bound on hits returned by one search.
pub const SEARCH_LIMIT: i64 = 100;

const SEARCH_FIELDS: [&str; 3] = ["message", "service_name", "level"];

#[derive(Debug, Error)]
pub enum SearchIndexError {
    #[error("invalid Elasticsearch URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build transport: {0}")]
    TransportBuild(#[from] BuildError),
    #[error("transport error: {0}")]
    Transport(#[from] elasticsearch::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Elasticsearch returned {status}")]
    Rejected { status: u16 },
    #[error("{failed} of {total} bulk items failed")]
    PartialBulkFailure { failed: usize, total: usize },
}

/// Full-text search index role.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSearchIndex: Send + Sync {
    /// Index a batch in one request. An empty batch is a no-op.
    async fn bulk_index(&self, entries: &[LogEntry]) -> Result<(), SearchIndexError>;

    /// Relevance-ranked match of `query` against message, service name and level.
    async fn search(&self, query: &str) -> Result<Vec<LogEntry>, SearchIndexError>;
}

#[derive(Clone)]
pub struct ElasticsearchLogIndex {
    client: Elasticsearch,
    index: String,
}

impl ElasticsearchLogIndex {
    /// Build the client, verify the cluster answers and ensure the index exists.
    pub async fn connect(url: &str, index: &str) -> Result<Self, SearchIndexError> {
        let parsed = Url::parse(url)?;
        let pool = SingleNodeConnectionPool::new(parsed);
        let transport = TransportBuilder::new(pool).build()?;

        let instance = Self {
            client: Elasticsearch::new(transport),
            index: index.to_string(),
        };

        instance.health_check().await?;
        instance.ensure_index().await?;
        info!(url, index, "Elasticsearch index ready");

        Ok(instance)
    }

    pub async fn health_check(&self) -> Result<(), SearchIndexError> {
        let response = self.client.ping().send().await?;
        let status = response.status_code();
        if status.is_success() {
            Ok(())
        } else {
            Err(SearchIndexError::Rejected {
                status: status.as_u16(),
            })
        }
    }

    async fn ensure_index(&self) -> Result<(), SearchIndexError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[self.index.as_str()]))
            .send()
            .await?;

        if exists.status_code().is_success() {
            return Ok(());
        }

        // Text fields keep a keyword sub-field for exact filters.
        let body = json!({
            "mappings": {
                "properties": {
                    "id": { "type": "long" },
                    "service_name": {
                        "type": "text",
                        "fields": { "keyword": { "type": "keyword" } }
                    },
                    "level": {
                        "type": "text",
                        "fields": { "keyword": { "type": "keyword" } }
                    },
                    "message": { "type": "text" },
                    "timestamp": { "type": "date" },
                    "created_at": { "type": "date" }
                }
            }
        });

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(body)
            .send()
            .await?;

        let status = response.status_code();
        // 400 here is a concurrent create from another instance.
        if !status.is_success() && status.as_u16() != 400 {
            return Err(SearchIndexError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn bulk_body(&self, entries: &[LogEntry]) -> Result<Vec<String>, SearchIndexError> {
        let mut lines = Vec::with_capacity(entries.len() * 2);
        for entry in entries {
            // Entries whose durable write failed get an index-generated id.
            let action = match entry.id {
                Some(id) => json!({ "index": { "_index": &self.index, "_id": id.to_string() } }),
                None => json!({ "index": { "_index": &self.index } }),
            };
            lines.push(serde_json::to_string(&action)?);
            lines.push(serde_json::to_string(entry)?);
        }
        Ok(lines)
    }
}

#[async_trait]
impl LogSearchIndex for ElasticsearchLogIndex {
    async fn bulk_index(&self, entries: &[LogEntry]) -> Result<(), SearchIndexError> {
        if entries.is_empty() {
            return Ok(());
        }

        let body = self.bulk_body(entries)?;
        let response = self
            .client
            .bulk(BulkParts::Index(&self.index))
            .body(body)
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchIndexError::Rejected {
                status: status.as_u16(),
            });
        }

        let summary: BulkResponse = response.json().await?;
        if summary.errors {
            let failed = summary
                .items
                .iter()
                .filter(|item| item.values().any(|result| result.error.is_some()))
                .count();
            warn!(failed, total = entries.len(), "Bulk request had item failures");
            return Err(SearchIndexError::PartialBulkFailure {
                failed,
                total: entries.len(),
            });
        }

        debug!(count = entries.len(), index = %self.index, "Bulk indexed log entries");
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<LogEntry>, SearchIndexError> {
        let body = json!({
            "size": SEARCH_LIMIT,
            "query": {
                "multi_match": {
                    "query": query,
                    "fields": SEARCH_FIELDS,
                }
            }
        });

        let response = self
            .client
            .search(SearchParts::Index(&[self.index.as_str()]))
            .body(body)
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(SearchIndexError::Rejected {
                status: status.as_u16(),
            });
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| hit.source)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: InnerHits,
}

#[derive(Debug, Deserialize)]
struct InnerHits {
    hits: Vec<LogHit>,
}

#[derive(Debug, Deserialize)]
struct LogHit {
    #[serde(rename = "_source")]
    source: Option<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(default)]
    error: Option<serde_json::Value>,
}
