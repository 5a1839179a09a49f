//! Content backend client used by the pipeline steps.
//!
//! Every call is a POST with its arguments in the query string. Connection
//! failures, timeouts and 5xx answers are retried with exponential back-off;
//! a 4xx answer is returned at once.

use std::time::Duration;

use newsdigest_core::config::ApiConfig;
use newsdigest_core::error::{DigestError, Result};
use serde_json::Value;

pub struct PipelineApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

/// Outcome of one attempt that did not produce a body.
enum AttemptError {
    Retryable(DigestError),
    Fatal(DigestError),
}

impl PipelineApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("NewsDigest/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DigestError::Http(format!("Client error: {e}")))?;

        tracing::debug!(
            "API client ready: {} (fetch={}, process={}, summary={})",
            config.base_url,
            config.fetch_path,
            config.process_path,
            config.summary_path
        );

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Trigger a scrape for one source family.
    pub async fn fetch_articles(&self, source_type: &str) -> Result<Value> {
        self.post(
            &self.config.fetch_path,
            &[("source_type", source_type.to_string())],
        )
        .await
    }

    /// Run pending-article processing on up to `limit` articles.
    pub async fn process_articles(&self, limit: Option<u32>) -> Result<Value> {
        let mut query = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.post(&self.config.process_path, &query).await
    }

    /// Produce the latest summaries for a summary category.
    pub async fn get_summaries(&self, source: &str, limit: Option<u32>) -> Result<Value> {
        let mut query = vec![("source", source.to_string())];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        self.post(&self.config.summary_path, &query).await
    }

    /// Wait before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let secs = self
            .config
            .retry_min_secs
            .saturating_mul(factor)
            .min(self.config.retry_max_secs);
        Duration::from_secs(secs)
    }

    async fn post(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let attempts = self.config.max_retries.max(1);

        let mut attempt = 0;
        loop {
            tracing::debug!("POST {} {:?} (attempt {}/{})", url, query, attempt + 1, attempts);
            match self.post_once(&url, query).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    attempt += 1;
                    if attempt >= attempts {
                        tracing::error!("❌ {} failed after {} attempts: {}", url, attempts, e);
                        return Err(e);
                    }
                    let wait = self.backoff(attempt - 1);
                    tracing::warn!("⚠️ {} failed: {} (retrying in {:?})", url, e, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn post_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, AttemptError> {
        let response = self.http.post(url).query(query).send().await.map_err(|e| {
            if e.is_connect() {
                AttemptError::Retryable(DigestError::Http(format!("Connection error: {e}")))
            } else if e.is_timeout() {
                AttemptError::Retryable(DigestError::Http(format!("Request timeout: {e}")))
            } else {
                AttemptError::Fatal(DigestError::Http(format!("Request failed: {e}")))
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AttemptError::Retryable(DigestError::Http(format!("Read body failed: {e}")))
        })?;

        if !status.is_success() {
            let err = DigestError::ApiResponse {
                status: status.as_u16(),
                body: text,
            };
            return Err(if status.is_server_error() {
                AttemptError::Retryable(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| AttemptError::Fatal(DigestError::Json(e)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Throwaway backend on an ephemeral port. Returns its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub(crate) fn api_config(base_url: String) -> ApiConfig {
        ApiConfig {
            base_url,
            timeout_secs: 5,
            retry_min_secs: 0,
            retry_max_secs: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_query_params_are_sent() {
        let router = Router::new()
            .route(
                "/api/v1/scrapers/scrapers/cnyes/fetch-articles",
                post(|Query(q): Query<HashMap<String, String>>| async move {
                    axum::Json(serde_json::json!({ "echo": q }))
                }),
            )
            .route(
                "/api/v1/articles/latest-summaries",
                post(|Query(q): Query<HashMap<String, String>>| async move {
                    axum::Json(serde_json::json!({ "echo": q }))
                }),
            );
        let client = PipelineApiClient::new(&api_config(serve(router).await)).unwrap();

        let fetched = client.fetch_articles("tw").await.unwrap();
        assert_eq!(fetched["echo"]["source_type"], "tw");

        let summaries = client.get_summaries("TW_Stock_Summary", Some(30)).await.unwrap();
        assert_eq!(summaries["echo"]["source"], "TW_Stock_Summary");
        assert_eq!(summaries["echo"]["limit"], "30");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/v1/articles/process-pending",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::BAD_GATEWAY, "upstream down".to_string())
                    } else {
                        (StatusCode::OK, r#"{"processed": 12}"#.to_string())
                    }
                }),
            )
            .with_state(hits.clone());
        let client = PipelineApiClient::new(&api_config(serve(router).await)).unwrap();

        let body = client.process_articles(Some(150)).await.unwrap();
        assert_eq!(body["processed"], 12);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/v1/articles/process-pending",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::SERVICE_UNAVAILABLE, "busy")
                }),
            )
            .with_state(hits.clone());
        let client = PipelineApiClient::new(&api_config(serve(router).await)).unwrap();

        let err = client.process_articles(None).await.unwrap_err();
        assert!(matches!(err, DigestError::ApiResponse { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/v1/articles/latest-summaries",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::UNPROCESSABLE_ENTITY, "unknown source")
                }),
            )
            .with_state(hits.clone());
        let client = PipelineApiClient::new(&api_config(serve(router).await)).unwrap();

        let err = client.get_summaries("Nope", None).await.unwrap_err();
        match err {
            DigestError::ApiResponse { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "unknown source");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        // Bind and drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PipelineApiClient::new(&api_config(format!("http://{addr}"))).unwrap();
        let err = client.fetch_articles("us").await.unwrap_err();
        assert!(matches!(err, DigestError::Http(_)));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = ApiConfig::default();
        let client = PipelineApiClient::new(&config).unwrap();
        assert_eq!(client.backoff(0), Duration::from_secs(4));
        assert_eq!(client.backoff(1), Duration::from_secs(8));
        assert_eq!(client.backoff(2), Duration::from_secs(10));
        assert_eq!(client.backoff(40), Duration::from_secs(10));
    }
}
