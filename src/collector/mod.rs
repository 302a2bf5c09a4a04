//! Inbound side: syslog datagrams in, JSON records out.

pub mod listener;
pub mod syslog;

use std::io;
use thiserror::Error;

pub use listener::{MAX_DATAGRAM_SIZE, SyslogListener};
pub use syslog::{SyslogFormat, SyslogMessage, parse_syslog};

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to bind syslog listener on {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("Failed to receive datagram: {0}")]
    Receive(#[source] io::Error),

    #[error("Failed to encode record as JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}
