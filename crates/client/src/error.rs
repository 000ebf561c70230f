//! Upload error types.

use crate::session::SessionState;

/// Errors produced by the upload client.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] chunkup_transfer::TransferError),

    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },

    #[error("file is already uploaded")]
    AlreadyUploaded,

    #[error("cancelled")]
    Cancelled,

    #[error("file is empty")]
    EmptyFile,

    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("fingerprint failed: {0}")]
    Fingerprint(String),

    #[error("chunk {index} of {fingerprint} failed: {source}")]
    ChunkFailed {
        fingerprint: String,
        index: u64,
        source: Box<UploadError>,
    },

    #[error("session was cleared")]
    Cleared,
}

impl UploadError {
    /// Index of the failed chunk, if this error is about one chunk.
    pub fn chunk_index(&self) -> Option<u64> {
        match self {
            Self::ChunkFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> UploadError {
    UploadError::Io(std::io::Error::other(e))
}
