use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chunkup_protocol::{ContentTag, extension_of};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::validation::{validate_extension, validate_fingerprint};
use crate::{DEFAULT_MERGE_CONCURRENCY, StoreError};

/// Parent of all working directories, inside the upload root. The leading
/// dot keeps it apart from final file names, which start with a fingerprint.
const CHUNKS_DIR: &str = ".chunks";

/// Chunk store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upload root. Working directories and final files live directly below.
    pub root: PathBuf,
    /// Maximum concurrent chunk writes during a merge.
    pub merge_concurrency: usize,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            merge_concurrency: DEFAULT_MERGE_CONCURRENCY,
        }
    }
}

/// Result of a verify query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The final file exists; nothing may be uploaded.
    AlreadyStored,
    /// Tags already on disk, sorted by chunk index.
    Resumable { present: Vec<String> },
}

/// A chunk file found in a working directory.
#[derive(Debug, Clone)]
pub(crate) struct StoredChunk {
    pub tag: ContentTag,
    pub path: PathBuf,
}

/// Filesystem-backed chunk store.
///
/// All methods take `&self`; share the store behind an `Arc` across request
/// handlers.
pub struct ChunkStore {
    pub(crate) config: StoreConfig,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl ChunkStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Reports whether `fingerprint` is complete, or which chunks are present.
    pub async fn verify(
        &self,
        fingerprint: &str,
        filename: &str,
    ) -> Result<Verification, StoreError> {
        let final_path = self.final_path(fingerprint, filename)?;
        if fs::try_exists(&final_path).await? {
            debug!(%fingerprint, "verify: already stored");
            return Ok(Verification::AlreadyStored);
        }

        let present: Vec<String> = self
            .list_chunks(fingerprint)
            .await?
            .into_iter()
            .map(|c| c.tag.to_string())
            .collect();
        debug!(%fingerprint, present = present.len(), "verify: resumable");
        Ok(Verification::Resumable { present })
    }

    /// Persists one chunk under its content tag.
    ///
    /// The bytes are written to a hidden temp file and renamed into place,
    /// so a tag visible on disk always names a complete chunk. Storing the
    /// same tag again replaces the previous file.
    pub async fn store_chunk(
        &self,
        fingerprint: &str,
        filename: &str,
        tag: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let final_path = self.final_path(fingerprint, filename)?;
        let tag = ContentTag::parse(tag)?;
        if !tag.belongs_to(fingerprint) {
            return Err(StoreError::InvalidInput(format!(
                "tag {tag} does not belong to {fingerprint}"
            )));
        }

        let lock = self.lock_for(fingerprint);
        let _guard = lock.read().await;

        if fs::try_exists(&final_path).await? {
            return Err(StoreError::AlreadyStored {
                fingerprint: fingerprint.to_string(),
            });
        }

        let dir = self.chunk_dir(fingerprint);
        fs::create_dir_all(&dir).await?;

        let tag_name = tag.to_string();
        let temp_path = dir.join(format!(".{tag_name}.{}.tmp", uuid::Uuid::new_v4()));
        let dest = dir.join(&tag_name);

        if let Err(e) = write_synced(&temp_path, bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &dest).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(tag = %tag_name, bytes = bytes.len(), "chunk stored");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Paths and listing
    // -----------------------------------------------------------------------

    /// Working directory for `fingerprint`. Callers validate first.
    pub fn chunk_dir(&self, fingerprint: &str) -> PathBuf {
        self.config.root.join(CHUNKS_DIR).join(fingerprint)
    }

    /// Validated final file path for `fingerprint` + the extension of `filename`.
    pub fn final_path(&self, fingerprint: &str, filename: &str) -> Result<PathBuf, StoreError> {
        validate_fingerprint(fingerprint)?;
        let ext = extension_of(filename);
        validate_extension(ext)?;
        Ok(self.config.root.join(format!("{fingerprint}{ext}")))
    }

    /// Chunk files of `fingerprint`, sorted by numeric index.
    ///
    /// Temp files and names that are not a canonical tag of this
    /// fingerprint are skipped. A missing directory means no chunks.
    pub(crate) async fn list_chunks(
        &self,
        fingerprint: &str,
    ) -> Result<Vec<StoredChunk>, StoreError> {
        let dir = self.chunk_dir(fingerprint);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            let Ok(tag) = ContentTag::parse(name) else {
                continue;
            };
            // "abc-01" parses to index 1 but is not a name we ever write.
            if !tag.belongs_to(fingerprint) || tag.to_string() != name {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            chunks.push(StoredChunk {
                tag,
                path: entry.path(),
            });
        }

        chunks.sort_by_key(|c| c.tag.index);
        Ok(chunks)
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    /// Per-fingerprint lock. Chunk writes share it, merges take it alone.
    pub(crate) fn lock_for(&self, fingerprint: &str) -> FingerprintLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = Arc::clone(locks.entry(fingerprint.to_string()).or_default());
        FingerprintLock {
            store: self,
            fingerprint: fingerprint.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Handle on one entry of the lock map.
///
/// Dropping the last handle of a fingerprint removes its entry, so finished
/// and abandoned uploads leave nothing behind.
pub(crate) struct FingerprintLock<'a> {
    store: &'a ChunkStore,
    fingerprint: String,
    lock: Arc<RwLock<()>>,
}

impl FingerprintLock<'_> {
    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }
}

impl Drop for FingerprintLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.store.locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map and this handle are the only owners left.
        let idle = locks
            .get(&self.fingerprint)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(&self.fingerprint);
            debug!(
                fingerprint = %self.fingerprint,
                tracked = locks.len(),
                "released fingerprint lock"
            );
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FP: &str = "0123456789abcdef0123456789abcdef";

    fn store(dir: &TempDir) -> ChunkStore {
        ChunkStore::new(StoreConfig::new(dir.path()))
    }

    #[tokio::test]
    async fn verify_unknown_fingerprint_is_empty_resumable() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(
            store.verify(FP, "video.mp4").await.unwrap(),
            Verification::Resumable { present: vec![] }
        );
    }

    #[tokio::test]
    async fn stored_chunks_are_reported_in_numeric_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for i in [10u64, 2, 0, 1] {
            store
                .store_chunk(FP, "a.bin", &format!("{FP}-{i}"), b"x")
                .await
                .unwrap();
        }

        let Verification::Resumable { present } = store.verify(FP, "a.bin").await.unwrap() else {
            panic!("expected resumable");
        };
        assert_eq!(
            present,
            vec![
                format!("{FP}-0"),
                format!("{FP}-1"),
                format!("{FP}-2"),
                format!("{FP}-10"),
            ]
        );
    }

    #[tokio::test]
    async fn reupload_overwrites_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tag = format!("{FP}-0");

        store.store_chunk(FP, "a.bin", &tag, b"first").await.unwrap();
        store.store_chunk(FP, "a.bin", &tag, b"second!").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(store.chunk_dir(FP))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![tag.clone()]);
        assert_eq!(std::fs::read(store.chunk_dir(FP).join(&tag)).unwrap(), b"second!");
    }

    #[tokio::test]
    async fn verify_ignores_temp_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let work = store.chunk_dir(FP);
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join(format!(".{FP}-0.abc.tmp")), b"partial").unwrap();
        std::fs::write(work.join("notes.txt"), b"?").unwrap();
        std::fs::write(work.join("ffff-3"), b"other file").unwrap();
        std::fs::write(work.join(format!("{FP}-01")), b"not canonical").unwrap();
        std::fs::write(work.join(format!("{FP}-4")), b"ok").unwrap();

        assert_eq!(
            store.verify(FP, "a.bin").await.unwrap(),
            Verification::Resumable {
                present: vec![format!("{FP}-4")]
            }
        );
    }

    #[tokio::test]
    async fn store_rejects_tag_of_other_fingerprint() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = store
            .store_chunk(FP, "a.bin", "deadbeef-0", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn store_rejects_malformed_input() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.store_chunk(FP, "a.bin", "no-index-here-x", b"x").await,
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            store.store_chunk("../up", "a.bin", "../up-0", b"x").await,
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            store.verify(FP, "evil./../../x").await,
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn store_after_final_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(dir.path().join(format!("{FP}.bin")), b"done").unwrap();

        assert_eq!(
            store.verify(FP, "a.bin").await.unwrap(),
            Verification::AlreadyStored
        );
        let err = store
            .store_chunk(FP, "a.bin", &format!("{FP}-0"), b"late")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyStored { .. }));
        assert!(!store.chunk_dir(FP).exists());
    }

    #[tokio::test]
    async fn concurrent_stores_for_one_fingerprint_do_not_interfere() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));

        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .store_chunk(FP, "a.bin", &format!("{FP}-{i}"), &[i; 32])
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let chunks = store.list_chunks(FP).await.unwrap();
        assert_eq!(chunks.len(), 16);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.tag.index, i as u64);
            assert_eq!(std::fs::read(&c.path).unwrap(), vec![i as u8; 32]);
        }
    }

    #[tokio::test]
    async fn name_ending_in_dot_is_accepted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .store_chunk(FP, "notes.", &format!("{FP}-0"), b"x")
            .await
            .unwrap();
        assert_eq!(
            store.verify(FP, "notes.").await.unwrap(),
            Verification::Resumable {
                present: vec![format!("{FP}-0")]
            }
        );
        assert_eq!(store.final_path(FP, "notes.").unwrap(), dir.path().join(FP));
    }

    #[tokio::test]
    async fn lock_entries_do_not_outlive_operations() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));

        // Abandoned upload: chunks stored, never merged.
        store
            .store_chunk(FP, "a.bin", &format!("{FP}-0"), b"x")
            .await
            .unwrap();
        assert_eq!(store.tracked_locks(), 0);

        // Failed merge.
        store
            .store_chunk(FP, "a.bin", &format!("{FP}-2"), b"x")
            .await
            .unwrap();
        assert!(store.merge(FP, "a.bin", 1).await.is_err());
        assert_eq!(store.tracked_locks(), 0);

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .store_chunk(FP, "a.bin", &format!("{FP}-{i}"), b"x")
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.tracked_locks(), 0);

        store.merge(FP, "a.bin", 1).await.unwrap();
        assert_eq!(store.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn held_lock_keeps_its_entry() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let first = store.lock_for(FP);
        let second = store.lock_for(FP);
        drop(first);
        assert_eq!(store.tracked_locks(), 1);
        drop(second);
        assert_eq!(store.tracked_locks(), 0);
    }
}
