//! Protocol constants shared by both ends.

/// Default chunk size (1 MiB).
///
/// The chunk size is fixed per upload: verify, upload and merge for one
/// fingerprint must all agree on it, since the server derives every
/// chunk's byte offset from it.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default number of chunk uploads allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3001;

/// Route for the verify operation.
pub const VERIFY_PATH: &str = "/verify";

/// Route for chunk uploads (multipart).
pub const UPLOAD_PATH: &str = "/";

/// Route for the merge operation.
pub const MERGE_PATH: &str = "/merge";

/// Multipart field carrying the chunk bytes.
pub const FIELD_CHUNK: &str = "chunk";

/// Multipart field carrying the chunk's content tag.
pub const FIELD_TAG: &str = "hash";

/// Multipart field carrying the original file name.
pub const FIELD_FILENAME: &str = "filename";

/// Multipart field carrying the file fingerprint.
pub const FIELD_FILE_HASH: &str = "fileHash";

/// Response codes carried in [`ApiResponse`](crate::ApiResponse) bodies.
pub mod code {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const ALREADY_UPLOADED: u16 = 409;
    pub const INTERNAL: u16 = 500;
}
