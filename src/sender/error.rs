use std::time::Duration;
use thiserror::Error;

/// A failed delivery attempt. None of these are retried: the window has
/// already been discarded by the time the error is seen.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sink rejected batch with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification of a [`DeliveryError`], used for counters and log
/// routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryFailureKind {
    Timeout,
    Transport,
    Status,
}

impl DeliveryFailureKind {
    pub const ALL: [DeliveryFailureKind; 3] = [
        DeliveryFailureKind::Timeout,
        DeliveryFailureKind::Transport,
        DeliveryFailureKind::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryFailureKind::Timeout => "timeout",
            DeliveryFailureKind::Transport => "transport",
            DeliveryFailureKind::Status => "status",
        }
    }
}

impl DeliveryError {
    pub fn kind(&self) -> DeliveryFailureKind {
        match self {
            DeliveryError::Timeout { .. } => DeliveryFailureKind::Timeout,
            DeliveryError::Transport(_) | DeliveryError::InvalidRequest(_) => {
                DeliveryFailureKind::Transport
            }
            DeliveryError::Status { .. } => DeliveryFailureKind::Status,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == DeliveryFailureKind::Timeout
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, after: Duration) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout { after }
        } else if err.is_builder() {
            DeliveryError::InvalidRequest(err.to_string())
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Raised while constructing a sink from its settings at startup.
#[derive(Error, Debug)]
pub enum SinkBuildError {
    #[error("Invalid sink configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
