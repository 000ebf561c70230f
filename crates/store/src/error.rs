//! Store error types.

use chunkup_protocol::constants::code;

/// Errors produced by the chunk store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("file {fingerprint} is already uploaded")]
    AlreadyStored { fingerprint: String },

    #[error("file {fingerprint} is missing chunk {index}")]
    MissingChunk { fingerprint: String, index: u64 },

    #[error("file {fingerprint} chunk {index} is {actual} bytes, expected {expected}")]
    ChunkSizeMismatch {
        fingerprint: String,
        index: u64,
        expected: u64,
        actual: u64,
    },
}

impl StoreError {
    /// Protocol response code for this error.
    pub fn code(&self) -> u16 {
        match self {
            Self::Io(_) => code::INTERNAL,
            Self::InvalidInput(_) => code::BAD_REQUEST,
            Self::AlreadyStored { .. } => code::ALREADY_UPLOADED,
            Self::MissingChunk { .. } | Self::ChunkSizeMismatch { .. } => code::BAD_REQUEST,
        }
    }

    /// Returns `true` for client protocol errors (missing or mis-sized chunks).
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MissingChunk { .. } | Self::ChunkSizeMismatch { .. }
        )
    }
}

impl From<chunkup_protocol::TagError> for StoreError {
    fn from(e: chunkup_protocol::TagError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}
