//! Observable upload session state.

use serde::Serialize;

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No file selected.
    #[default]
    Idle,
    /// Fingerprint being computed.
    Hashing,
    /// Fingerprint known, nothing sent yet.
    Ready,
    Uploading,
    /// Stopped by the user or by a failure; `resume` continues.
    Paused,
    /// Merged on the server.
    Done,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Hashing => "hashing",
            Self::Ready => "ready",
            Self::Uploading => "uploading",
            Self::Paused => "paused",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// One chunk as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkView {
    pub index: u64,
    /// `"<file name> -<index + 1>"`.
    pub name: String,
    pub size: usize,
    /// Content tag; empty until the fingerprint is known.
    pub tag: String,
    pub percent: f64,
}

/// Everything a presentation layer needs to render a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSnapshot {
    pub state: SessionState,
    pub file_name: Option<String>,
    pub file_size: u64,
    pub fingerprint: Option<String>,
    pub hash_percent: f64,
    pub aggregate_percent: f64,
    pub chunks: Vec<ChunkView>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::Uploading).unwrap(),
            "\"uploading\""
        );
    }

    #[test]
    fn snapshot_json_field_names() {
        let snap = UploadSnapshot {
            state: SessionState::Ready,
            file_name: Some("a.bin".into()),
            file_size: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["fileName"], "a.bin");
        assert_eq!(json["aggregatePercent"], 0.0);
        assert!(json["lastError"].is_null());
    }
}
