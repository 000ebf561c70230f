//! Upload orchestrator.
//!
//! One [`Uploader`] drives one session at a time:
//!
//! ```text
//! Idle --select_file--> Hashing --> Ready --start--> Uploading --> Done
//!                                              ^          |
//!                                   resume/start          | pause or chunk failure
//!                                              |          v
//!                                              +------ Paused
//! ```
//!
//! `clear` returns to `Idle` from anywhere. Every state change is published
//! as an [`UploadSnapshot`] on a watch channel. Progress-only changes are
//! published at most once per [`UploaderConfig::progress_interval`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chunkup_protocol::{
    ContentTag, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, MergeRequest, VerifyRequest,
};
use chunkup_transfer::{
    ChunkReader, ChunkSpan, FingerprintEngine, ProgressTracker, TransferError, plan_chunks,
    read_span, run_limited,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiFuture, ChunkStoreApi, ChunkUpload, ProgressFn};
use crate::error::{UploadError, join_error};
use crate::session::{ChunkView, SessionState, UploadSnapshot};

/// Default spacing of progress-only snapshots.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Uploader settings.
#[derive(Debug, Clone, Copy)]
pub struct UploaderConfig {
    /// Chunk size in bytes. Must match across verify, upload and merge.
    pub chunk_size: usize,
    /// Maximum concurrent chunk uploads.
    pub concurrency: usize,
    /// Minimum time between two snapshots that only carry progress.
    /// State changes are always published immediately.
    pub progress_interval: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// How a `start` or `resume` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Every chunk is on the server and the file was merged.
    Completed,
    /// The server already had the complete file. The session was cleared.
    AlreadyUploaded,
    /// `pause` was called; `resume` continues.
    Paused,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Session {
    path: PathBuf,
    file_name: String,
    file_size: u64,
    spans: Vec<ChunkSpan>,
    /// Names and tags, built once. Percents come from `tracker`.
    views: Vec<ChunkView>,
    fingerprint: Option<String>,
    hash_percent: f64,
    tracker: ProgressTracker,
}

impl Session {
    fn new(path: PathBuf, file_name: String, file_size: u64, spans: Vec<ChunkSpan>) -> Self {
        let views = spans
            .iter()
            .map(|span| ChunkView {
                index: span.index,
                name: format!("{} -{}", file_name, span.index + 1),
                size: span.len,
                tag: String::new(),
                percent: 0.0,
            })
            .collect();
        Self {
            path,
            file_name,
            file_size,
            tracker: ProgressTracker::new(spans.iter().map(|s| s.len as u64).collect()),
            spans,
            views,
            fingerprint: None,
            hash_percent: 0.0,
        }
    }

    fn set_fingerprint(&mut self, fingerprint: &str) {
        for view in &mut self.views {
            view.tag = ContentTag::new(fingerprint, view.index).to_string();
        }
        self.fingerprint = Some(fingerprint.to_string());
        self.hash_percent = 100.0;
    }
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    session: Option<Session>,
    /// Bumped whenever the session is replaced or cleared, so late results
    /// of an abandoned run are dropped.
    generation: u64,
    run: Option<CancellationToken>,
    hashing: Option<CancellationToken>,
    last_error: Option<String>,
    /// When the last snapshot went out.
    published: Option<Instant>,
}

impl Inner {
    fn reset(&mut self) {
        if let Some(token) = self.run.take() {
            token.cancel();
        }
        if let Some(token) = self.hashing.take() {
            token.cancel();
        }
        self.session = None;
        self.state = SessionState::Idle;
        self.last_error = None;
        self.generation += 1;
    }

    fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    fn snapshot(&self) -> UploadSnapshot {
        let Some(s) = &self.session else {
            return UploadSnapshot {
                state: self.state,
                last_error: self.last_error.clone(),
                ..Default::default()
            };
        };

        let chunks = s
            .views
            .iter()
            .map(|view| ChunkView {
                percent: s.tracker.percent(view.index as usize),
                ..view.clone()
            })
            .collect();

        UploadSnapshot {
            state: self.state,
            file_name: Some(s.file_name.clone()),
            file_size: s.file_size,
            fingerprint: s.fingerprint.clone(),
            hash_percent: s.hash_percent,
            aggregate_percent: s.tracker.aggregate(),
            chunks,
            last_error: self.last_error.clone(),
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    tx: watch::Sender<UploadSnapshot>,
    progress_interval: Duration,
}

impl Shared {
    /// Mutates the state and publishes a snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let result = f(&mut inner);
        inner.published = Some(Instant::now());
        self.tx.send_replace(inner.snapshot());
        result
    }

    /// Records progress on the current session. A snapshot is published
    /// only if the last one is older than the progress interval.
    fn progress(&self, generation: u64, f: impl FnOnce(&mut Session)) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.generation != generation {
            return;
        }
        let Some(session) = inner.session_mut() else {
            return;
        };
        f(session);

        let now = Instant::now();
        let due = inner
            .published
            .is_none_or(|at| now.duration_since(at) >= self.progress_interval);
        if due {
            inner.published = Some(now);
            self.tx.send_replace(inner.snapshot());
        }
    }

    /// Like [`update`](Self::update), but only while `generation` is current.
    fn update_current(&self, generation: u64, f: impl FnOnce(&mut Inner)) -> bool {
        self.update(|inner| {
            if inner.generation != generation {
                return false;
            }
            f(inner);
            true
        })
    }

    fn generation(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).generation
    }
}

/// Fixed inputs of one start/resume call.
struct Run {
    generation: u64,
    token: CancellationToken,
    path: PathBuf,
    file_name: String,
    fingerprint: String,
    spans: Vec<ChunkSpan>,
}

// ---------------------------------------------------------------------------
// Uploader
// ---------------------------------------------------------------------------

/// Resumable chunked uploader.
///
/// Methods take `&self`; wrap the uploader in an `Arc` to pause or clear
/// from another task while `start` is running.
pub struct Uploader {
    api: Arc<dyn ChunkStoreApi>,
    config: UploaderConfig,
    shared: Arc<Shared>,
}

impl Uploader {
    pub fn new(api: Arc<dyn ChunkStoreApi>, config: UploaderConfig) -> Self {
        let config = UploaderConfig {
            chunk_size: if config.chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                config.chunk_size
            },
            concurrency: config.concurrency.max(1),
            progress_interval: config.progress_interval,
        };
        let (tx, _) = watch::channel(UploadSnapshot::default());
        Self {
            api,
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                tx,
                progress_interval: config.progress_interval,
            }),
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Receives a snapshot after every state change, and on progress at most
    /// once per progress interval.
    pub fn subscribe(&self) -> watch::Receiver<UploadSnapshot> {
        self.shared.tx.subscribe()
    }

    /// The current state of the session.
    pub fn snapshot(&self) -> UploadSnapshot {
        self.shared.tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.tx.borrow().state
    }

    /// Starts a new session for `path` and computes its fingerprint.
    ///
    /// Any previous session is cleared first. Returns the fingerprint once
    /// the session is `Ready`.
    pub async fn select_file(&self, path: impl AsRef<Path>) -> Result<String, UploadError> {
        let path = path.as_ref().to_path_buf();
        self.clear();

        let file_size = tokio::fs::metadata(&path).await?.len();
        if file_size == 0 {
            return Err(UploadError::EmptyFile);
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let spans = plan_chunks(file_size, self.config.chunk_size);
        let cancel = CancellationToken::new();

        info!(file = %file_name, bytes = file_size, chunks = spans.len(), "hashing file");
        let generation = self.shared.update(|inner| {
            inner.reset();
            inner.state = SessionState::Hashing;
            inner.hashing = Some(cancel.clone());
            inner.session = Some(Session::new(path.clone(), file_name, file_size, spans));
            inner.generation
        });

        match self.fingerprint(&path, generation, cancel).await {
            Ok(fingerprint) => {
                let ready = self.shared.update_current(generation, |inner| {
                    inner.hashing = None;
                    inner.state = SessionState::Ready;
                    if let Some(s) = inner.session_mut() {
                        s.set_fingerprint(&fingerprint);
                    }
                });
                if !ready {
                    return Err(UploadError::Cleared);
                }
                info!(%fingerprint, "file ready");
                Ok(fingerprint)
            }
            Err(e) => {
                let message = e.to_string();
                let current = self.shared.update_current(generation, |inner| {
                    inner.reset();
                    inner.last_error = Some(message);
                });
                if current {
                    warn!(error = %e, "fingerprint failed");
                    Err(e)
                } else {
                    Err(UploadError::Cleared)
                }
            }
        }
    }

    /// Uploads the selected file from `Ready`, or continues from `Paused`.
    pub async fn start(&self) -> Result<UploadOutcome, UploadError> {
        self.begin("start", &[SessionState::Ready, SessionState::Paused])
            .await
    }

    /// Continues a paused upload. Only chunks the server lacks are sent.
    pub async fn resume(&self) -> Result<UploadOutcome, UploadError> {
        self.begin("resume", &[SessionState::Paused]).await
    }

    /// Cancels in-flight chunk uploads. Queued chunks are never started.
    pub fn pause(&self) -> Result<(), UploadError> {
        self.shared.update(|inner| match inner.state {
            SessionState::Uploading => {
                if let Some(token) = inner.run.take() {
                    token.cancel();
                }
                inner.state = SessionState::Paused;
                info!("upload paused");
                Ok(())
            }
            SessionState::Paused => Ok(()),
            state => Err(UploadError::InvalidState { op: "pause", state }),
        })
    }

    /// Abandons the session. Always succeeds.
    pub fn clear(&self) {
        self.shared.update(Inner::reset);
        debug!("session cleared");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn fingerprint(
        &self,
        path: &Path,
        generation: u64,
        cancel: CancellationToken,
    ) -> Result<String, UploadError> {
        let chunk_size = self.config.chunk_size;
        let reader = tokio::task::spawn_blocking({
            let path = path.to_path_buf();
            move || ChunkReader::open(&path, chunk_size)
        })
        .await
        .map_err(join_error)??;

        let shared = &self.shared;
        FingerprintEngine::spawn(reader, cancel)
            .finish(|pct| shared.progress(generation, |s| s.hash_percent = pct))
            .await
            .map_err(|e| match e {
                TransferError::Fingerprint(reason) => UploadError::Fingerprint(reason),
                TransferError::Cancelled => UploadError::Cleared,
                other => UploadError::Transfer(other),
            })
    }

    async fn begin(
        &self,
        op: &'static str,
        allowed: &[SessionState],
    ) -> Result<UploadOutcome, UploadError> {
        let run = self.shared.update(|inner| {
            let state = inner.state;
            let invalid = UploadError::InvalidState { op, state };
            if !allowed.contains(&state) {
                return Err(invalid);
            }
            let Some(session) = inner.session.as_ref() else {
                return Err(invalid);
            };
            let Some(fingerprint) = session.fingerprint.clone() else {
                return Err(invalid);
            };
            let run = Run {
                generation: inner.generation,
                token: CancellationToken::new(),
                path: session.path.clone(),
                file_name: session.file_name.clone(),
                fingerprint,
                spans: session.spans.clone(),
            };
            inner.run = Some(run.token.clone());
            inner.state = SessionState::Uploading;
            inner.last_error = None;
            Ok(run)
        })?;

        info!(fingerprint = %run.fingerprint, op, "upload started");
        self.execute(run).await
    }

    async fn execute(&self, run: Run) -> Result<UploadOutcome, UploadError> {
        match self.drive(&run).await {
            Ok(()) => {
                self.shared.update_current(run.generation, |inner| {
                    inner.run = None;
                    inner.state = SessionState::Done;
                });
                info!(fingerprint = %run.fingerprint, "upload complete");
                Ok(UploadOutcome::Completed)
            }
            Err(_) if run.token.is_cancelled() => {
                if self.shared.generation() == run.generation {
                    Ok(UploadOutcome::Paused)
                } else {
                    Err(UploadError::Cleared)
                }
            }
            Err(UploadError::AlreadyUploaded) => {
                info!(fingerprint = %run.fingerprint, "file already on server");
                self.shared.update_current(run.generation, Inner::reset);
                Ok(UploadOutcome::AlreadyUploaded)
            }
            Err(e) => {
                warn!(fingerprint = %run.fingerprint, error = %e, "upload failed");
                let message = e.to_string();
                self.shared.update_current(run.generation, |inner| {
                    inner.run = None;
                    inner.state = SessionState::Paused;
                    inner.last_error = Some(message);
                });
                Err(e)
            }
        }
    }

    /// verify -> upload missing chunks -> merge.
    async fn drive(&self, run: &Run) -> Result<(), UploadError> {
        let verify = cancellable(
            &run.token,
            self.api.verify(VerifyRequest {
                file_hash: run.fingerprint.clone(),
                filename: run.file_name.clone(),
            }),
        )
        .await?;
        if !verify.should_upload {
            return Err(UploadError::AlreadyUploaded);
        }

        let present: HashSet<u64> = verify
            .uploaded_list
            .unwrap_or_default()
            .iter()
            .filter_map(|raw| ContentTag::parse(raw).ok())
            .filter(|tag| tag.belongs_to(&run.fingerprint))
            .map(|tag| tag.index)
            .collect();
        self.shared.progress(run.generation, |s| {
            for &index in &present {
                s.tracker.complete(index as usize);
            }
        });

        let missing: Vec<ChunkSpan> = run
            .spans
            .iter()
            .filter(|span| !present.contains(&span.index))
            .copied()
            .collect();
        info!(
            fingerprint = %run.fingerprint,
            present = present.len(),
            missing = missing.len(),
            "uploading chunks"
        );

        let producers = missing
            .into_iter()
            .map(move |span| move || self.upload_one(run, span));
        let results = run_limited(producers, self.config.concurrency).await;

        if run.token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(UploadError::AlreadyUploaded) => return Err(UploadError::AlreadyUploaded),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        cancellable(
            &run.token,
            self.api.merge(MergeRequest {
                file_hash: run.fingerprint.clone(),
                filename: run.file_name.clone(),
                size: self.config.chunk_size as u64,
            }),
        )
        .await
    }

    async fn upload_one(&self, run: &Run, span: ChunkSpan) -> Result<(), UploadError> {
        // Queued behind a pause: never start.
        if run.token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let index = span.index as usize;
        self.shared.progress(run.generation, |s| {
            s.tracker.begin_attempt(index);
        });

        match self.send_one(run, span).await {
            Ok(()) => {
                self.shared.progress(run.generation, |s| {
                    s.tracker.complete(index);
                });
                debug!(fingerprint = %run.fingerprint, index = span.index, "chunk uploaded");
                Ok(())
            }
            Err(e @ (UploadError::Cancelled | UploadError::AlreadyUploaded)) => Err(e),
            Err(e) => Err(UploadError::ChunkFailed {
                fingerprint: run.fingerprint.clone(),
                index: span.index,
                source: Box::new(e),
            }),
        }
    }

    async fn send_one(&self, run: &Run, span: ChunkSpan) -> Result<(), UploadError> {
        let data = tokio::task::spawn_blocking({
            let path = run.path.clone();
            move || read_span(&path, &span)
        })
        .await
        .map_err(join_error)??;

        let index = span.index as usize;
        let generation = run.generation;
        let shared = Arc::clone(&self.shared);
        let progress: ProgressFn = Arc::new(move |sent, total| {
            if total == 0 {
                return;
            }
            let pct = 100.0 * sent as f64 / total as f64;
            shared.progress(generation, |s| {
                s.tracker.update(index, pct);
            });
        });

        let chunk = ChunkUpload {
            fingerprint: run.fingerprint.clone(),
            filename: run.file_name.clone(),
            tag: ContentTag::new(run.fingerprint.clone(), span.index).to_string(),
            data,
        };
        self.api
            .upload_chunk(chunk, progress, run.token.child_token())
            .await
    }
}

async fn cancellable<T>(token: &CancellationToken, fut: ApiFuture<'_, T>) -> Result<T, UploadError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(UploadError::Cancelled),
        result = fut => result,
    }
}
