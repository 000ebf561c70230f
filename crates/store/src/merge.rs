//! Reassembly of stored chunks into the final file.
//!
//! Chunks are written into a hidden staging file, each at
//! `index * chunk_size`, by up to `merge_concurrency` writers at once.
//! Byte ranges are disjoint so the writers never overlap. The staging file
//! becomes the final file by rename once every writer has synced, and only
//! after that are the chunk files deleted. Any failure before the rename
//! leaves every chunk on disk and the upload resumable.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chunkup_transfer::run_limited;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::store::{ChunkStore, StoredChunk};

/// Outcome of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub path: PathBuf,
    pub chunks: usize,
    pub bytes: u64,
}

impl ChunkStore {
    /// Reconstructs the final file of `fingerprint` from its stored chunks.
    ///
    /// `chunk_size` must be the size the client chunked with.
    pub async fn merge(
        &self,
        fingerprint: &str,
        filename: &str,
        chunk_size: u64,
    ) -> Result<MergeReport, StoreError> {
        let final_path = self.final_path(fingerprint, filename)?;
        if chunk_size == 0 {
            return Err(StoreError::InvalidInput("chunk size must be positive".into()));
        }

        let lock = self.lock_for(fingerprint);
        let guard = lock.write().await;

        // Another merge may have finished while we waited for the lock.
        if fs::try_exists(&final_path).await? {
            return Err(StoreError::AlreadyStored {
                fingerprint: fingerprint.to_string(),
            });
        }

        let chunks = self.list_chunks(fingerprint).await?;
        let total = check_chunks(fingerprint, &chunks, chunk_size).await?;
        let written = self
            .assemble(fingerprint, &final_path, &chunks, chunk_size, total)
            .await?;

        self.remove_chunks(fingerprint, &chunks).await;
        drop(guard);

        info!(
            %fingerprint,
            path = %final_path.display(),
            chunks = chunks.len(),
            bytes = written,
            "merge complete"
        );

        Ok(MergeReport {
            path: final_path,
            chunks: chunks.len(),
            bytes: written,
        })
    }

    /// Writes checked chunks into a staging file and renames it to
    /// `final_path`. On failure the staging file is removed and the chunks
    /// are left untouched.
    async fn assemble(
        &self,
        fingerprint: &str,
        final_path: &Path,
        chunks: &[StoredChunk],
        chunk_size: u64,
        total: u64,
    ) -> Result<u64, StoreError> {
        let staging = self
            .config
            .root
            .join(format!(".{fingerprint}.{}.merging", uuid::Uuid::new_v4()));

        let written = match write_staging(
            &staging,
            chunks,
            chunk_size,
            total,
            self.config.merge_concurrency,
        )
        .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(%fingerprint, error = %e, "merge failed, chunks retained");
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
        };

        if let Err(e) = fs::rename(&staging, final_path).await {
            warn!(%fingerprint, error = %e, "merge rename failed, chunks retained");
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(written)
    }

    /// Deletes merged chunk files and the working directory.
    ///
    /// The final file is already in place, so failures are only logged.
    async fn remove_chunks(&self, fingerprint: &str, chunks: &[StoredChunk]) {
        for chunk in chunks {
            if let Err(e) = fs::remove_file(&chunk.path).await {
                warn!(path = %chunk.path.display(), error = %e, "failed to delete chunk");
            }
        }
        // Sweeps temp files left by interrupted uploads as well.
        let dir = self.chunk_dir(fingerprint);
        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to delete working directory");
        }
    }
}

/// Checks that `chunks` are exactly `[0, count)` with consistent sizes and
/// returns the total byte count.
async fn check_chunks(
    fingerprint: &str,
    chunks: &[StoredChunk],
    chunk_size: u64,
) -> Result<u64, StoreError> {
    if chunks.is_empty() {
        return Err(StoreError::MissingChunk {
            fingerprint: fingerprint.to_string(),
            index: 0,
        });
    }

    for (expected, chunk) in chunks.iter().enumerate() {
        if chunk.tag.index != expected as u64 {
            return Err(StoreError::MissingChunk {
                fingerprint: fingerprint.to_string(),
                index: expected as u64,
            });
        }
    }

    let last = chunks.len() - 1;
    let mut total = 0u64;
    for (i, chunk) in chunks.iter().enumerate() {
        let actual = fs::metadata(&chunk.path).await?.len();
        let ok = if i < last {
            actual == chunk_size
        } else {
            actual > 0 && actual <= chunk_size
        };
        if !ok {
            return Err(StoreError::ChunkSizeMismatch {
                fingerprint: fingerprint.to_string(),
                index: chunk.tag.index,
                expected: chunk_size,
                actual,
            });
        }
        total += actual;
    }
    Ok(total)
}

async fn write_staging(
    staging: &Path,
    chunks: &[StoredChunk],
    chunk_size: u64,
    total: u64,
    width: usize,
) -> std::io::Result<u64> {
    let file = fs::File::create(staging).await?;
    file.set_len(total).await?;
    drop(file);

    let writers = chunks.iter().map(|chunk| {
        let dest = staging.to_path_buf();
        let src = chunk.path.clone();
        let offset = chunk.tag.index * chunk_size;
        move || write_at(dest, src, offset)
    });

    let mut written = 0u64;
    for result in run_limited(writers, width).await {
        written += result?;
    }
    if written != total {
        return Err(std::io::Error::other(format!(
            "wrote {written} bytes, expected {total}"
        )));
    }
    Ok(written)
}

/// Copies one chunk into `dest` at `offset` and syncs before returning.
async fn write_at(dest: PathBuf, src: PathBuf, offset: u64) -> std::io::Result<u64> {
    let bytes = fs::read(&src).await?;
    let mut file = fs::OpenOptions::new().write(true).open(&dest).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    file.sync_data().await?;
    debug!(src = %src.display(), offset, len = bytes.len(), "chunk merged");
    Ok(bytes.len() as u64)
}
