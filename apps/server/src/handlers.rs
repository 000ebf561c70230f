//! Request handlers.

use axum::Json;
use axum::extract::{Multipart, State};
use chunkup_protocol::constants::{FIELD_CHUNK, FIELD_FILE_HASH, FIELD_FILENAME, FIELD_TAG};
use chunkup_protocol::{ApiResponse, MergeRequest, VerifyRequest, VerifyResponse};
use chunkup_store::Verification;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

/// `POST /verify`: whether the file exists, or which chunks are stored.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<VerifyResponse>> {
    let resp = match state.store.verify(&req.file_hash, &req.filename).await? {
        Verification::AlreadyStored => VerifyResponse::already_stored(),
        Verification::Resumable { present } => VerifyResponse::resumable(present),
    };
    debug!(
        fingerprint = %req.file_hash,
        should_upload = resp.should_upload,
        "verify"
    );
    Ok(Json(resp))
}

/// `POST /`: one multipart chunk.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse>> {
    let mut chunk = None;
    let mut tag = None;
    let mut filename = None;
    let mut file_hash = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_CHUNK => chunk = Some(field.bytes().await?),
            FIELD_TAG => tag = Some(field.text().await?),
            FIELD_FILENAME => filename = Some(field.text().await?),
            FIELD_FILE_HASH => file_hash = Some(field.text().await?),
            _ => {}
        }
    }

    let chunk = chunk.ok_or_else(|| missing(FIELD_CHUNK))?;
    let tag = tag.ok_or_else(|| missing(FIELD_TAG))?;
    let filename = filename.ok_or_else(|| missing(FIELD_FILENAME))?;
    let file_hash = file_hash.ok_or_else(|| missing(FIELD_FILE_HASH))?;

    state
        .store
        .store_chunk(&file_hash, &filename, &tag, &chunk)
        .await?;
    Ok(Json(ApiResponse::ok("chunk stored")))
}

/// `POST /merge`: reassemble the stored chunks.
pub async fn merge(
    State(state): State<AppState>,
    Json(req): Json<MergeRequest>,
) -> ApiResult<Json<ApiResponse>> {
    let report = state
        .store
        .merge(&req.file_hash, &req.filename, req.size)
        .await?;
    info!(
        fingerprint = %req.file_hash,
        filename = %req.filename,
        bytes = report.bytes,
        "file merged"
    );
    Ok(Json(ApiResponse::ok("file merged")))
}

pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok("ok"))
}

fn missing(field: &str) -> ApiError {
    ApiError::BadRequest(format!("missing field {field}"))
}
