pub mod error;
pub mod http;
pub mod key;
pub mod metrics;
pub mod object_store;

pub use error::{DeliveryError, DeliveryFailureKind, SinkBuildError};
pub use http::{HttpSink, HttpSinkConfig};
pub use key::{generate_object_key, object_key};
pub use metrics::{DeliverySnapshot, DeliveryStats};
pub use object_store::{ObjectStoreConfig, ObjectStoreSink};

use crate::buffer::Batch;
use std::future::Future;
use std::sync::Arc;

/// Where a delivered batch ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Object path (`bucket/key`) or collector URL.
    pub location: String,
    pub status: Option<u16>,
    pub bytes: usize,
}

/// Delivery target for finished batches.
///
/// `deliver` makes exactly one attempt and must return within the sink's own
/// timeout; hanging forever is not an option for implementors.
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    fn deliver(
        &self,
        batch: Batch,
    ) -> impl Future<Output = Result<DeliveryReceipt, DeliveryError>> + Send;
}

impl<S: Sink> Sink for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn deliver(
        &self,
        batch: Batch,
    ) -> impl Future<Output = Result<DeliveryReceipt, DeliveryError>> + Send {
        (**self).deliver(batch)
    }
}

/// Sink selection made once at startup.
#[derive(Debug, Clone)]
pub enum SinkSettings {
    ObjectStore(ObjectStoreConfig),
    Http(HttpSinkConfig),
}

#[derive(Debug, Clone)]
pub enum SinkKind {
    ObjectStore(ObjectStoreSink),
    Http(HttpSink),
}

impl SinkKind {
    pub async fn from_settings(settings: SinkSettings) -> Result<Self, SinkBuildError> {
        match settings {
            SinkSettings::ObjectStore(config) => {
                Ok(SinkKind::ObjectStore(ObjectStoreSink::new(config).await?))
            }
            SinkSettings::Http(config) => Ok(SinkKind::Http(HttpSink::new(config)?)),
        }
    }
}

impl Sink for SinkKind {
    fn name(&self) -> &'static str {
        match self {
            SinkKind::ObjectStore(sink) => sink.name(),
            SinkKind::Http(sink) => sink.name(),
        }
    }

    async fn deliver(&self, batch: Batch) -> Result<DeliveryReceipt, DeliveryError> {
        match self {
            SinkKind::ObjectStore(sink) => sink.deliver(batch).await,
            SinkKind::Http(sink) => sink.deliver(batch).await,
        }
    }
}
