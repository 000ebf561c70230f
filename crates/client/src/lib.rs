//! Resumable chunked upload client.
//!
//! The [`Uploader`] splits a local file into fixed-size chunks, fingerprints
//! it off the async executor, asks the server which chunks it already has,
//! uploads the rest through a bounded-concurrency limiter, and finally asks
//! the server to merge. Uploads can be paused, resumed and cleared at any
//! time; a presentation layer renders the [`UploadSnapshot`] it publishes.
//!
//! The server is reached through the [`ChunkStoreApi`] trait. The HTTP
//! implementation is [`HttpChunkStore`].

pub mod api;
pub mod error;
pub mod http;
pub mod session;
pub mod uploader;

pub use api::{ApiFuture, ChunkStoreApi, ChunkUpload, ProgressFn};
pub use error::UploadError;
pub use http::HttpChunkStore;
pub use session::{ChunkView, SessionState, UploadSnapshot};
pub use uploader::{DEFAULT_PROGRESS_INTERVAL, UploadOutcome, Uploader, UploaderConfig};
