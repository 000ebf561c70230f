//! Content fingerprinting off the async executor.
//!
//! The engine feeds every chunk, in index order, into one incremental MD5
//! accumulator running on a blocking worker thread. It reports progress
//! after each chunk and finishes with exactly one terminal event.
//!
//! The fingerprint depends only on the concatenated bytes, so the same
//! content split with different chunk sizes hashes identically.

use md5::{Digest, Md5};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::TransferError;

/// Event buffer between the worker and the consumer.
const EVENT_BUFFER: usize = 64;

/// Events emitted by a [`FingerprintEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum FingerprintEvent {
    /// Percentage of chunks consumed so far (0–100).
    Progress(f64),
    /// Hex-encoded fingerprint. Always the last event on success.
    Done(String),
    /// A chunk could not be read. No fingerprint follows.
    Failed(String),
}

/// Computes the MD5 fingerprint of `data` in one shot.
pub fn fingerprint_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A running fingerprint computation.
///
/// Each upload session owns its own engine. Terminating or dropping the
/// engine stops the worker after the chunk it is currently hashing.
pub struct FingerprintEngine {
    events: mpsc::Receiver<FingerprintEvent>,
    cancel: CancellationToken,
}

impl FingerprintEngine {
    /// Starts hashing `chunks` on a blocking worker.
    ///
    /// Chunks are consumed strictly in iteration order; chunk `i + 1` is not
    /// read until chunk `i` has been fed to the accumulator. Must be called
    /// from within a tokio runtime.
    pub fn spawn<I>(chunks: I, cancel: CancellationToken) -> Self
    where
        I: IntoIterator<Item = Result<Vec<u8>, TransferError>>,
        I::IntoIter: ExactSizeIterator + Send + 'static,
    {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let chunks = chunks.into_iter();
        let stop = cancel.clone();

        // Detached: the worker exits on its own once cancelled or finished.
        tokio::task::spawn_blocking(move || hash_chunks(chunks, stop, tx));

        Self { events, cancel }
    }

    /// Receives the next event, or `None` once the worker has exited.
    pub async fn recv(&mut self) -> Option<FingerprintEvent> {
        self.events.recv().await
    }

    /// Drains events until the terminal one, reporting progress along the way.
    ///
    /// Returns the fingerprint, [`TransferError::Fingerprint`] if a chunk
    /// failed to read, or [`TransferError::Cancelled`] if the engine was
    /// terminated first.
    pub async fn finish(
        mut self,
        mut on_progress: impl FnMut(f64),
    ) -> Result<String, TransferError> {
        while let Some(event) = self.recv().await {
            match event {
                FingerprintEvent::Progress(pct) => on_progress(pct),
                FingerprintEvent::Done(fingerprint) => return Ok(fingerprint),
                FingerprintEvent::Failed(reason) => {
                    return Err(TransferError::Fingerprint(reason));
                }
            }
        }
        Err(TransferError::Cancelled)
    }

    /// Stops the worker. No further events are produced after the chunk in
    /// progress.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }
}

impl Drop for FingerprintEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn hash_chunks<I>(chunks: I, stop: CancellationToken, tx: mpsc::Sender<FingerprintEvent>)
where
    I: ExactSizeIterator<Item = Result<Vec<u8>, TransferError>>,
{
    let total = chunks.len();
    let mut hasher = Md5::new();

    for (n, chunk) in chunks.enumerate() {
        if stop.is_cancelled() {
            debug!(hashed = n, total, "fingerprint terminated");
            return;
        }

        match chunk {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) => {
                warn!(index = n, error = %e, "fingerprint: chunk read failed");
                let _ = tx.blocking_send(FingerprintEvent::Failed(format!("chunk {n}: {e}")));
                return;
            }
        }

        let pct = 100.0 * (n + 1) as f64 / total as f64;
        if tx.blocking_send(FingerprintEvent::Progress(pct)).is_err() {
            // Consumer is gone.
            return;
        }
    }

    if total == 0 {
        let _ = tx.blocking_send(FingerprintEvent::Progress(100.0));
    }

    if stop.is_cancelled() {
        return;
    }

    let fingerprint = hex::encode(hasher.finalize());
    debug!(%fingerprint, chunks = total, "fingerprint complete");
    let _ = tx.blocking_send(FingerprintEvent::Done(fingerprint));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkReader;
    use std::io::Write;

    fn in_memory_chunks(data: &[u8], chunk_size: usize) -> Vec<Result<Vec<u8>, TransferError>> {
        data.chunks(chunk_size).map(|c| Ok(c.to_vec())).collect()
    }

    #[test]
    fn fingerprint_bytes_known_value() {
        assert_eq!(fingerprint_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            fingerprint_bytes(b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn emits_progress_then_done() {
        let data = vec![7u8; 10];
        let mut engine = FingerprintEngine::spawn(in_memory_chunks(&data, 4), CancellationToken::new());

        let mut events = Vec::new();
        while let Some(e) = engine.recv().await {
            events.push(e);
        }

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], FingerprintEvent::Progress(p) if (p - 100.0 / 3.0).abs() < 1e-9));
        assert!(matches!(events[2], FingerprintEvent::Progress(p) if (p - 100.0).abs() < 1e-9));
        assert_eq!(events[3], FingerprintEvent::Done(fingerprint_bytes(&data)));
    }

    #[tokio::test]
    async fn same_content_different_chunking_same_fingerprint() {
        const MB: usize = 1024 * 1024;
        let data: Vec<u8> = (0..5 * MB).map(|i| (i % 251) as u8).collect();

        let one_mb = FingerprintEngine::spawn(in_memory_chunks(&data, MB), CancellationToken::new())
            .finish(|_| {})
            .await
            .unwrap();
        let two_mb =
            FingerprintEngine::spawn(in_memory_chunks(&data, 2 * MB), CancellationToken::new())
                .finish(|_| {})
                .await
                .unwrap();

        assert_eq!(one_mb, two_mb);
        assert_eq!(one_mb, fingerprint_bytes(&data));
    }

    #[tokio::test]
    async fn hashes_file_through_chunk_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 97) as u8).collect();
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let reader = ChunkReader::open(&path, 1024).unwrap();
        let mut progress = Vec::new();
        let fingerprint = FingerprintEngine::spawn(reader, CancellationToken::new())
            .finish(|p| progress.push(p))
            .await
            .unwrap();

        assert_eq!(fingerprint, fingerprint_bytes(&data));
        assert_eq!(progress.len(), 10);
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn read_failure_is_terminal() {
        let chunks: Vec<Result<Vec<u8>, TransferError>> = vec![
            Ok(b"abc".to_vec()),
            Err(TransferError::ShortRead {
                index: 1,
                expected: 3,
                actual: 0,
            }),
            Ok(b"ghi".to_vec()),
        ];
        let mut engine = FingerprintEngine::spawn(chunks, CancellationToken::new());

        let mut events = Vec::new();
        while let Some(e) = engine.recv().await {
            events.push(e);
        }

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], FingerprintEvent::Failed(_)));
        assert!(!events.iter().any(|e| matches!(e, FingerprintEvent::Done(_))));
    }

    #[tokio::test]
    async fn finish_maps_failure_to_error() {
        let chunks: Vec<Result<Vec<u8>, TransferError>> =
            vec![Err(TransferError::Io(std::io::Error::other("disk gone")))];
        let result = FingerprintEngine::spawn(chunks, CancellationToken::new())
            .finish(|_| {})
            .await;
        assert!(matches!(result, Err(TransferError::Fingerprint(_))));
    }

    #[tokio::test]
    async fn terminated_engine_yields_no_fingerprint() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = FingerprintEngine::spawn(in_memory_chunks(&[1u8; 64], 8), cancel)
            .finish(|_| {})
            .await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
    }

    #[tokio::test]
    async fn empty_input_hashes_empty_string() {
        let chunks: Vec<Result<Vec<u8>, TransferError>> = Vec::new();
        let fingerprint = FingerprintEngine::spawn(chunks, CancellationToken::new())
            .finish(|_| {})
            .await
            .unwrap();
        assert_eq!(fingerprint, fingerprint_bytes(b""));
    }
}
