//! Request body buffering.
//!
//! Small bodies are kept in memory; anything above the spool threshold is
//! copied into an anonymous temp file that has no directory entry, so the
//! operating system reclaims it as soon as the last handle is closed.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Bodies larger than this many bytes are spooled to disk.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 1024 * (80 + 32);

const COPY_CHUNK: usize = 16 * 1024;

/// A request body that can be read from the start any number of times.
#[derive(Debug)]
pub enum RewindableBody {
    Memory(Cursor<Vec<u8>>),
    Spooled(Option<File>),
}

impl RewindableBody {
    pub fn empty() -> Self {
        RewindableBody::Memory(Cursor::new(Vec::new()))
    }

    /// Reads exactly `len` bytes from `src` into a new buffer.
    ///
    /// Lengths above `threshold` go to an unlinked file created in
    /// `spool_dir` (or the system temp directory). The returned buffer is
    /// positioned at offset 0. A source that ends early yields
    /// `UnexpectedEof`.
    pub async fn read_from<R>(
        src: &mut R,
        len: usize,
        threshold: usize,
        spool_dir: Option<&Path>,
    ) -> io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        if len > threshold {
            return Self::spool(src, len, spool_dir).await;
        }

        if len == 0 {
            return Ok(Self::empty());
        }

        let mut data = vec![0u8; len];
        src.read_exact(&mut data).await?;
        Ok(RewindableBody::Memory(Cursor::new(data)))
    }

    async fn spool<R>(src: &mut R, len: usize, spool_dir: Option<&Path>) -> io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let file = match spool_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        let mut file = tokio::fs::File::from_std(file);

        let mut remaining = len;
        let mut chunk = vec![0u8; COPY_CHUNK.min(len)];
        while remaining > 0 {
            let want = remaining.min(chunk.len());
            let n = src.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("body ended {remaining} bytes short of Content-Length"),
                ));
            }
            file.write_all(&chunk[..n]).await?;
            remaining -= n;
        }
        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;
        let file = file.into_std().await;

        tracing::debug!(bytes = len, "Spooled request body to temp file");
        Ok(RewindableBody::Spooled(Some(file)))
    }

    /// Repositions the buffer at its first byte.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, RewindableBody::Spooled(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self, RewindableBody::Spooled(None))
    }

    /// Frees the underlying storage. Calling it again is a no-op.
    pub fn release(&mut self) {
        match self {
            RewindableBody::Memory(cursor) => {
                *cursor = Cursor::new(Vec::new());
            }
            RewindableBody::Spooled(file) => {
                // closing the handle drops the last reference to the unlinked inode
                file.take();
            }
        }
    }
}

impl Default for RewindableBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for RewindableBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            RewindableBody::Memory(cursor) => Read::read(cursor, buf),
            RewindableBody::Spooled(Some(file)) => file.read(buf),
            RewindableBody::Spooled(None) => Ok(0),
        }
    }
}

impl Seek for RewindableBody {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            RewindableBody::Memory(cursor) => Seek::seek(cursor, pos),
            RewindableBody::Spooled(Some(file)) => file.seek(pos),
            RewindableBody::Spooled(None) => Ok(0),
        }
    }
}
