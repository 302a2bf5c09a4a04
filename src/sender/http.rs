use super::error::{DeliveryError, SinkBuildError};
use super::{DeliveryReceipt, Sink};
use crate::buffer::Batch;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use reqwest::{Client, ClientBuilder};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const TAG_HEADER: &str = "x-log-tag";
/// Concatenated gzip members, sent without `Content-Encoding`.
pub const DEFAULT_CONTENT_TYPE: &str = "application/gzip";

/// Response bodies attached to status errors are cut to this many bytes.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    pub endpoint: String,
    /// Sent verbatim as the `Authorization` header.
    pub authorization: Option<String>,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub max_idle_connections: usize,
    pub user_agent: String,
    pub content_type: String,
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/logs".to_string(),
            authorization: None,
            timeout: Duration::from_secs(15),
            connection_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(15),
            max_idle_connections: 10,
            user_agent: default_user_agent(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("logfwrd/{}", env!("CARGO_PKG_VERSION"))
}

/// POSTs each batch's gzip payload to a single collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: Url,
    config: HttpSinkConfig,
}

impl HttpSink {
    pub fn new(config: HttpSinkConfig) -> Result<Self, SinkBuildError> {
        let endpoint: Url = config.endpoint.parse().map_err(|e| {
            SinkBuildError::InvalidConfiguration(format!(
                "Invalid endpoint URL '{}': {e}",
                config.endpoint
            ))
        })?;

        if let Some(auth) = &config.authorization {
            HeaderValue::from_str(auth).map_err(|e| {
                SinkBuildError::InvalidConfiguration(format!("Invalid authorization value: {e}"))
            })?;
        }

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn config(&self) -> &HttpSinkConfig {
        &self.config
    }

    pub fn build_headers(&self, batch: &Batch) -> Result<HeaderMap, DeliveryError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&self.config.content_type).map_err(|e| {
                DeliveryError::InvalidRequest(format!("Invalid content type: {e}"))
            })?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .map_err(|e| DeliveryError::InvalidRequest(format!("Invalid user agent: {e}")))?,
        );

        if let Some(auth) = &self.config.authorization {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(auth).map_err(|e| {
                    DeliveryError::InvalidRequest(format!("Invalid authorization value: {e}"))
                })?,
            );
        }

        if let Some(label) = batch.label() {
            headers.insert(
                HeaderName::from_static(TAG_HEADER),
                HeaderValue::from_str(label)
                    .map_err(|e| DeliveryError::InvalidRequest(format!("Invalid tag: {e}")))?,
            );
        }

        Ok(headers)
    }

    async fn post(&self, batch: Batch) -> Result<DeliveryReceipt, DeliveryError> {
        let start = Instant::now();
        let headers = self.build_headers(&batch)?;
        let bytes = batch.len();

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .body(batch.into_payload())
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            endpoint = %self.endpoint,
            status = status.as_u16(),
            bytes,
            latency_ms = start.elapsed().as_millis() as u64,
            "Collector accepted batch"
        );

        Ok(DeliveryReceipt {
            location: self.endpoint.to_string(),
            status: Some(status.as_u16()),
            bytes,
        })
    }
}

impl Sink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, batch: Batch) -> Result<DeliveryReceipt, DeliveryError> {
        let limit = self.config.timeout;
        match tokio::time::timeout(limit, self.post(batch)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout { after: limit }),
        }
    }
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
