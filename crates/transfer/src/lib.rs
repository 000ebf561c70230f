//! Client-side building blocks for chunked uploads.
//!
//! - [`chunked`]: split a file into contiguous fixed-size spans and read them
//! - [`fingerprint`]: incremental MD5 over all chunks on a blocking worker
//! - [`limiter`]: run async tasks with a bounded number in flight
//! - [`progress`]: per-chunk and aggregate progress that never moves backwards

pub mod chunked;
pub mod fingerprint;
pub mod limiter;
pub mod progress;

pub use chunked::{ChunkReader, ChunkSpan, plan_chunks, read_span};
pub use fingerprint::{FingerprintEngine, FingerprintEvent, fingerprint_bytes};
pub use limiter::run_limited;
pub use progress::ProgressTracker;

pub use chunkup_protocol::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read on chunk {index}: expected {expected} bytes, got {actual}")]
    ShortRead {
        index: u64,
        expected: usize,
        actual: usize,
    },

    #[error("fingerprint failed: {0}")]
    Fingerprint(String),

    #[error("cancelled")]
    Cancelled,
}
