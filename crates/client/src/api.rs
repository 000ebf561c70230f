//! Transport seam between the uploader and the chunk store server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chunkup_protocol::{MergeRequest, VerifyRequest, VerifyResponse};
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;

/// Boxed future returned by [`ChunkStoreApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Upload progress callback: `(bytes_sent, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One chunk ready to send.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub fingerprint: String,
    pub filename: String,
    /// Content tag, `"{fingerprint}-{index}"`.
    pub tag: String,
    pub data: Vec<u8>,
}

/// Operations the uploader needs from the server.
///
/// Using a trait keeps the upload logic independent of HTTP and testable
/// against an in-process store.
pub trait ChunkStoreApi: Send + Sync {
    /// Asks whether the file exists and which chunks are already stored.
    fn verify(&self, req: VerifyRequest) -> ApiFuture<'_, VerifyResponse>;

    /// Sends one chunk. Resolves to [`UploadError::Cancelled`] once `cancel`
    /// fires, and to [`UploadError::AlreadyUploaded`] if the server has
    /// the complete file.
    fn upload_chunk(
        &self,
        chunk: ChunkUpload,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> ApiFuture<'_, ()>;

    /// Asks the server to reassemble the file.
    fn merge(&self, req: MergeRequest) -> ApiFuture<'_, ()>;
}
