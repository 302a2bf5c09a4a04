use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    /// The codec could not encode a record. Only that record is lost;
    /// the window keeps every record written before it.
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Invalid buffer configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl BufferError {
    pub fn is_compression(&self) -> bool {
        matches!(self, BufferError::Compression(_))
    }
}
