//! HTTP implementation of [`ChunkStoreApi`].
//!
//! JSON bodies for verify/merge and a multipart form for chunk uploads.
//! The chunk part is streamed in small pieces so the callback can report
//! byte progress as reqwest consumes the body.

use bytes::Bytes;
use chunkup_protocol::constants::{
    FIELD_CHUNK, FIELD_FILE_HASH, FIELD_FILENAME, FIELD_TAG, code,
};
use chunkup_protocol::{
    ApiResponse, MERGE_PATH, MergeRequest, UPLOAD_PATH, VERIFY_PATH, VerifyRequest,
    VerifyResponse,
};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ApiFuture, ChunkStoreApi, ChunkUpload, ProgressFn};
use crate::error::UploadError;

/// Size of the pieces a chunk body is streamed in.
const PIECE_SIZE: usize = 64 * 1024;

/// Chunk store reached over HTTP.
pub struct HttpChunkStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpChunkStore {
    /// Creates a client for the server at `base_url` (e.g. `http://localhost:3001`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Uses an existing reqwest client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(reqwest::StatusCode, Bytes), UploadError> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        let status = resp.status();
        Ok((status, resp.bytes().await?))
    }

    async fn send_chunk(&self, chunk: ChunkUpload, progress: ProgressFn) -> Result<(), UploadError> {
        let ChunkUpload {
            fingerprint,
            filename,
            tag,
            data,
        } = chunk;
        let total = data.len() as u64;
        let data = Bytes::from(data);

        let pieces: Vec<Bytes> = (0..data.len())
            .step_by(PIECE_SIZE)
            .map(|start| data.slice(start..(start + PIECE_SIZE).min(data.len())))
            .collect();
        let mut sent = 0u64;
        let stream = futures_util::stream::iter(pieces).map(move |piece| {
            sent += piece.len() as u64;
            progress(sent, total);
            Ok::<_, std::io::Error>(piece)
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(tag.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .part(FIELD_CHUNK, part)
            .text(FIELD_TAG, tag.clone())
            .text(FIELD_FILENAME, filename)
            .text(FIELD_FILE_HASH, fingerprint);

        let resp = self
            .http
            .post(self.url(UPLOAD_PATH))
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        debug!(%tag, bytes = total, status = status.as_u16(), "chunk sent");
        expect_ok(status, &body)
    }
}

impl ChunkStoreApi for HttpChunkStore {
    fn verify(&self, req: VerifyRequest) -> ApiFuture<'_, VerifyResponse> {
        Box::pin(async move {
            let (status, body) = self.post_json(VERIFY_PATH, &req).await?;
            if !status.is_success() {
                return Err(error_from(status, &body));
            }
            Ok(serde_json::from_slice(&body)?)
        })
    }

    fn upload_chunk(
        &self,
        chunk: ChunkUpload,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(UploadError::Cancelled),
                result = self.send_chunk(chunk, progress) => result,
            }
        })
    }

    fn merge(&self, req: MergeRequest) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let (status, body) = self.post_json(MERGE_PATH, &req).await?;
            expect_ok(status, &body)
        })
    }
}

/// Accepts only a 2xx status carrying a success `{code, message}` body.
fn expect_ok(status: reqwest::StatusCode, body: &[u8]) -> Result<(), UploadError> {
    if !status.is_success() {
        return Err(error_from(status, body));
    }
    let resp: ApiResponse = serde_json::from_slice(body)?;
    if resp.is_success() {
        Ok(())
    } else {
        Err(api_error(resp))
    }
}

fn error_from(status: reqwest::StatusCode, body: &[u8]) -> UploadError {
    match serde_json::from_slice::<ApiResponse>(body) {
        Ok(resp) => api_error(resp),
        Err(_) if status.as_u16() == code::ALREADY_UPLOADED => UploadError::AlreadyUploaded,
        Err(_) => UploadError::Server {
            code: status.as_u16(),
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

fn api_error(resp: ApiResponse) -> UploadError {
    if resp.code == code::ALREADY_UPLOADED {
        UploadError::AlreadyUploaded
    } else {
        UploadError::Server {
            code: resp.code,
            message: resp.message,
        }
    }
}
