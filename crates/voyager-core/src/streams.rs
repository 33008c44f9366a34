//! Seekable byte stream abstraction backing index serialization.
//!
//! The index reads and writes through these traits rather than `std::io`
//! directly so that files, in-memory buffers, and host-language file-like
//! objects (through the binding layers) all share one contract:
//!
//! - input: bounded `read`, `position`, `length` (−1 when unknown), optional
//!   `seek`, and a 4-byte `peek` that never advances the position — the
//!   magic-header dispatch depends on it;
//! - output: `write` and `flush`.
//!
//! Bulk transfers are chunked at [`MAX_CHUNK_BYTES`] per underlying call to
//! bound peak memory when the other side is a host-language object.

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Upper bound on the byte count of a single underlying I/O call.
pub const MAX_CHUNK_BYTES: usize = 100 * 1024 * 1024;

/// A readable, optionally seekable byte source.
pub trait InputStream: Send {
    /// Reads up to `buf.len()` bytes, returning the number read.
    ///
    /// A return of 0 means the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Current position in bytes from the start of the stream.
    fn position(&self) -> u64;

    /// Total stream length in bytes, or −1 when unknown.
    fn length(&self) -> i64;

    /// Whether [`InputStream::seek`] is supported.
    fn is_seekable(&self) -> bool;

    /// Repositions the stream to an absolute byte offset.
    ///
    /// # Errors
    ///
    /// Fails when the stream is not seekable or the underlying seek fails.
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Copies up to four bytes of look-ahead into `buf` without advancing
    /// the position. Returns the number of bytes available.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails.
    fn peek(&mut self, buf: &mut [u8; 4]) -> Result<usize>;

    /// Whether the stream has no more bytes to produce.
    fn is_exhausted(&mut self) -> bool;

    /// Fills `buf` completely, chunking underlying reads at
    /// [`MAX_CHUNK_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamIo`] with the expected and received byte
    /// counts if the stream ends early.
    fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let expected = buf.len();
        let mut filled = 0;
        while filled < expected {
            let want = (expected - filled).min(MAX_CHUNK_BYTES);
            let n = self.read(&mut buf[filled..filled + want])?;
            if n == 0 {
                return Err(Error::StreamIo {
                    expected,
                    actual: filled,
                });
            }
            filled += n;
        }
        Ok(())
    }
}

/// A writable byte sink.
pub trait OutputStream: Send {
    /// Appends all of `data`, chunking underlying writes at
    /// [`MAX_CHUNK_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying sink fails.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flushes buffered bytes to the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying sink fails.
    fn flush(&mut self) -> Result<()>;
}

// ============================================================================
// File-backed streams
// ============================================================================

/// Buffered input stream over a file on disk.
pub struct FileInputStream {
    inner: BufReader<File>,
    position: u64,
    length: u64,
}

impl FileInputStream {
    /// Opens the file at `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its length queried.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();
        Ok(Self {
            inner: BufReader::new(file),
            position: 0,
            length,
        })
    }
}

impl InputStream for FileInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = buf.len().min(MAX_CHUNK_BYTES);
        let n = self.inner.read(&mut buf[..want])?;
        self.position += n as u64;
        Ok(n)
    }

    fn position(&self) -> u64 {
        self.position
    }

    #[allow(clippy::cast_possible_wrap)]
    fn length(&self) -> i64 {
        self.length as i64
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn peek(&mut self, buf: &mut [u8; 4]) -> Result<usize> {
        let mut got = 0;
        while got < buf.len() {
            let n = self.inner.read(&mut buf[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        // Rewind so the peek does not advance the position.
        self.inner.seek_relative(-(got as i64))?;
        Ok(got)
    }

    fn is_exhausted(&mut self) -> bool {
        self.position >= self.length
    }
}

/// Buffered output stream over a file on disk.
pub struct FileOutputStream {
    inner: BufWriter<File>,
}

impl FileOutputStream {
    /// Creates (or truncates) the file at `path` for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: BufWriter::new(file),
        })
    }
}

impl OutputStream for FileOutputStream {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(MAX_CHUNK_BYTES) {
            self.inner.write_all(chunk)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

// ============================================================================
// In-memory streams
// ============================================================================

/// Input stream over an in-memory byte buffer.
pub struct MemoryInputStream {
    data: Bytes,
    position: usize,
}

impl MemoryInputStream {
    /// Wraps an owned byte buffer.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }
}

impl InputStream for MemoryInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.data.len() - self.position;
        let n = buf.len().min(remaining).min(MAX_CHUNK_BYTES);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    #[allow(clippy::cast_possible_wrap)]
    fn length(&self) -> i64 {
        self.data.len() as i64
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.data.len() as u64 {
            return Err(Error::StreamIo {
                expected: usize::try_from(position).unwrap_or(usize::MAX),
                actual: self.data.len(),
            });
        }
        self.position = usize::try_from(position).unwrap_or(usize::MAX);
        Ok(())
    }

    fn peek(&mut self, buf: &mut [u8; 4]) -> Result<usize> {
        let remaining = self.data.len() - self.position;
        let n = buf.len().min(remaining);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        Ok(n)
    }

    fn is_exhausted(&mut self) -> bool {
        self.position >= self.data.len()
    }
}

/// Output stream appending to a growable in-memory buffer.
#[derive(Default)]
pub struct MemoryOutputStream {
    buffer: BytesMut,
}

impl MemoryOutputStream {
    /// Creates an empty output buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Borrows the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the stream, returning the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

impl OutputStream for MemoryOutputStream {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// POD read/write helpers (little-endian throughout)
// ============================================================================

macro_rules! pod_helpers {
    ($reader:ident, $writer:ident, $ty:ty) => {
        pub(crate) fn $reader(stream: &mut dyn InputStream) -> Result<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            stream.read_exact_bytes(&mut buf)?;
            Ok(<$ty>::from_le_bytes(buf))
        }

        pub(crate) fn $writer(stream: &mut dyn OutputStream, value: $ty) -> Result<()> {
            stream.write(&value.to_le_bytes())
        }
    };
}

pod_helpers!(read_u8, write_u8, u8);
pod_helpers!(read_u32_le, write_u32_le, u32);
pod_helpers!(read_u64_le, write_u64_le, u64);
pod_helpers!(read_i32_le, write_i32_le, i32);
pod_helpers!(read_f32_le, write_f32_le, f32);
pod_helpers!(read_f64_le, write_f64_le, f64);
