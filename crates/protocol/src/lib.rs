//! Wire protocol shared by the chunked upload client and server.
//!
//! The protocol has three operations:
//!
//! 1. **verify**: ask whether a file (by fingerprint) is already stored,
//!    and which of its chunks are
//! 2. **upload chunk**: multipart body carrying one chunk and its content tag
//! 3. **merge**: reassemble the stored chunks into the final file

pub mod constants;
pub mod messages;
pub mod tag;

// Re-export primary types for convenience.
pub use constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_PORT, MERGE_PATH, UPLOAD_PATH, VERIFY_PATH,
};
pub use messages::{ApiResponse, MergeRequest, VerifyRequest, VerifyResponse};
pub use tag::{ContentTag, TagError, extension_of};
