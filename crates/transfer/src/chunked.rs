use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// A contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// 0-based ordinal, stable for the file's lifetime.
    pub index: u64,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length in bytes.
    pub len: usize,
}

impl ChunkSpan {
    /// Byte offset one past the end of this span.
    pub fn end(&self) -> u64 {
        self.offset + self.len as u64
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Partitions `[0, file_size)` into spans of `chunk_size` bytes.
///
/// Every span but the last is exactly `chunk_size` long. If `chunk_size`
/// is 0, [`DEFAULT_CHUNK_SIZE`] is used. An empty file has no spans.
pub fn plan_chunks(file_size: u64, chunk_size: usize) -> Vec<ChunkSpan> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    let step = chunk_size as u64;

    let mut spans = Vec::with_capacity(file_size.div_ceil(step) as usize);
    let mut offset = 0u64;
    let mut index = 0u64;
    while offset < file_size {
        let len = (file_size - offset).min(step) as usize;
        spans.push(ChunkSpan { index, offset, len });
        offset += len as u64;
        index += 1;
    }
    spans
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Reads exactly `span.len` bytes at `span.offset` from an open file.
fn read_exact_span(file: &mut File, span: &ChunkSpan) -> Result<Vec<u8>, TransferError> {
    file.seek(SeekFrom::Start(span.offset))?;
    let mut buf = vec![0u8; span.len];
    let mut filled = 0;
    while filled < span.len {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(TransferError::ShortRead {
                index: span.index,
                expected: span.len,
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(buf)
}

/// Opens `path` and reads the bytes of a single span.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn read_span(path: &Path, span: &ChunkSpan) -> Result<Vec<u8>, TransferError> {
    let mut file = File::open(path)?;
    read_exact_span(&mut file, span)
}

/// Reads a file chunk by chunk in index order.
///
/// Iterating yields each chunk's bytes, which is what the fingerprint
/// engine consumes.
pub struct ChunkReader {
    file: File,
    spans: Vec<ChunkSpan>,
    next: usize,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` and plans its chunks.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            spans: plan_chunks(file_size, chunk_size),
            next: 0,
            file_size,
        })
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Vec<u8>, TransferError>;

    fn next(&mut self) -> Option<Self::Item> {
        let span = *self.spans.get(self.next)?;
        self.next += 1;
        Some(read_exact_span(&mut self.file, &span))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.spans.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkReader {}
