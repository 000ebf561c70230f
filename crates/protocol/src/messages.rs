use serde::{Deserialize, Serialize};

use crate::constants::code;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Asks whether a file is already stored, fully or in part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub file_hash: String,
    pub filename: String,
}

/// Asks the server to reassemble the stored chunks of a file.
///
/// `size` is the chunk size used for the upload, not the file size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub file_hash: String,
    pub filename: String,
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Answer to a [`VerifyRequest`].
///
/// `should_upload == false` means the final file already exists and
/// nothing must be sent. Otherwise `uploaded_list` holds the content tags
/// the server already has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub should_upload: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_list: Option<Vec<String>>,
}

impl VerifyResponse {
    /// The final file already exists.
    pub fn already_stored() -> Self {
        Self {
            should_upload: false,
            uploaded_list: None,
        }
    }

    /// Upload should proceed; `present` lists the tags to skip.
    pub fn resumable(present: Vec<String>) -> Self {
        Self {
            should_upload: true,
            uploaded_list: Some(present),
        }
    }
}

/// Generic `{code, message}` body returned by upload and merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: u16,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: code::OK,
            message: message.into(),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == code::OK
    }
}
