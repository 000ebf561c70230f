//! Server-side chunk store and merge engine.
//!
//! Chunks arrive independently and in any order. Each is persisted under a
//! per-fingerprint working directory, named by its content tag:
//!
//! ```text
//! <root>/.chunks/<fingerprint>/<fingerprint>-<index>   stored chunks
//! <root>/<fingerprint><ext>                            final file, once merged
//! ```
//!
//! The final file doubles as the completion marker: once it exists, no
//! further chunks or merges are accepted for that fingerprint.

mod error;
mod merge;
mod store;
mod validation;

pub use error::StoreError;
pub use merge::MergeReport;
pub use store::{ChunkStore, StoreConfig, Verification};
pub use validation::{validate_extension, validate_fingerprint};

/// Default number of concurrent chunk writes during a merge.
pub const DEFAULT_MERGE_CONCURRENCY: usize = 4;
