//! Windowed accumulation of compressed log records.

pub mod batch;
pub mod batch_buffer;
pub mod compressor;
pub mod error;

pub use batch::{Batch, FlushTrigger, WindowBounds};
pub use batch_buffer::{
    AddOutcome, BatchBuffer, BufferConfig, DEFAULT_MAX_AGE, DEFAULT_MAX_ENTRIES, FlushReport,
};
pub use compressor::{Accumulator, Compressor, decompress};
pub use error::BufferError;
