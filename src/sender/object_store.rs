use super::error::{DeliveryError, SinkBuildError};
use super::key::generate_object_key;
use super::{DeliveryReceipt, Sink};
use crate::buffer::Batch;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use std::time::Duration;
use tracing::debug;

/// Object metadata key carrying the batch label (`x-amz-meta-tag` on the wire).
pub const TAG_METADATA_KEY: &str = "tag";
pub const OBJECT_CONTENT_TYPE: &str = "application/gzip";

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub timeout: Duration,
    pub force_path_style: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            region: "auto".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            timeout: Duration::from_secs(10),
            force_path_style: true,
        }
    }
}

impl ObjectStoreConfig {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("bucket", self.bucket.as_str()),
            ("endpoint", self.endpoint.as_str()),
            ("access key", self.access_key.as_str()),
            ("secret key", self.secret_key.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Uploads each batch as one gzip object to an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreSink {
    client: aws_sdk_s3::Client,
    bucket: String,
    timeout: Duration,
}

impl ObjectStoreSink {
    pub async fn new(config: ObjectStoreConfig) -> Result<Self, SinkBuildError> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(SinkBuildError::InvalidConfiguration(format!(
                "missing object store settings: {}",
                missing.join(", ")
            )));
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "logfwrd-static",
        );

        // Retries are disabled: a delivery is a single attempt.
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint.clone())
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket,
            timeout: config.timeout,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, batch: Batch) -> Result<(), DeliveryError> {
        let label = batch.label().map(str::to_owned);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(OBJECT_CONTENT_TYPE)
            .body(ByteStream::from(batch.into_payload()));

        if let Some(label) = label {
            request = request.metadata(TAG_METADATA_KEY, label);
        }

        request
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify_put_error(e, self.timeout))
    }
}

impl Sink for ObjectStoreSink {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn deliver(&self, batch: Batch) -> Result<DeliveryReceipt, DeliveryError> {
        let key = generate_object_key(&batch.window());
        let bytes = batch.len();

        debug!(bucket = %self.bucket, key = %key, bytes, "Sending gzip object");

        match tokio::time::timeout(self.timeout, self.put(&key, batch)).await {
            Ok(Ok(())) => Ok(DeliveryReceipt {
                location: format!("{}/{}", self.bucket, key),
                status: None,
                bytes,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeliveryError::Timeout {
                after: self.timeout,
            }),
        }
    }
}

fn classify_put_error(err: SdkError<PutObjectError>, after: Duration) -> DeliveryError {
    match &err {
        SdkError::TimeoutError(_) => DeliveryError::Timeout { after },
        SdkError::ServiceError(_) => {
            let status = err
                .raw_response()
                .map(|raw| u16::from(raw.status()))
                .unwrap_or_default();
            DeliveryError::Status {
                status,
                body: DisplayErrorContext(&err).to_string(),
            }
        }
        SdkError::ConstructionFailure(_) => {
            DeliveryError::InvalidRequest(DisplayErrorContext(&err).to_string())
        }
        _ => DeliveryError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_settings_are_all_reported() {
        let config = ObjectStoreConfig {
            bucket: "logs".to_string(),
            ..Default::default()
        };

        let err = ObjectStoreSink::new(config).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("endpoint"));
        assert!(message.contains("access key"));
        assert!(message.contains("secret key"));
        assert!(!message.contains("bucket"));
    }

    #[tokio::test]
    async fn test_builds_with_complete_settings() {
        let config = ObjectStoreConfig {
            endpoint: "http://127.0.0.1:9000".to_string(),
            bucket: "logs".to_string(),
            access_key: "AKIA".to_string(),
            secret_key: "secret".to_string(),
            ..Default::default()
        };

        let sink = ObjectStoreSink::new(config).await.unwrap();
        assert_eq!(sink.bucket(), "logs");
        assert_eq!(sink.name(), "s3");
    }
}
