//! Sources for the data uploaded by write benchmarks.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::{io, task};

use anyhow::{Context, Result};
use bytesize::ByteSize;
use objperf_client::PayloadReader;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::config::PayloadConfig;

/// Shared source of upload contents.
///
/// Cloning is cheap. Every call to [`reader`](Self::reader) yields an independent reader over the
/// first `size` bytes of the source, so any number of uploads can read concurrently.
#[derive(Clone, Debug)]
pub enum Payload {
    /// A local file. Every reader opens its own handle, so reads never share a cursor.
    File(Arc<Path>),
    /// Pseudo-random bytes from a seeded generator.
    Random(u64),
}

impl Payload {
    /// Opens the configured payload source.
    ///
    /// Fails if a payload file cannot be read or is smaller than `max_size`.
    pub fn open(config: &PayloadConfig, max_size: u64) -> Result<Self> {
        match config {
            PayloadConfig::File { path } => {
                let metadata = std::fs::metadata(path)
                    .with_context(|| format!("failed to open payload file `{}`", path.display()))?;
                anyhow::ensure!(metadata.is_file(), "`{}` is not a file", path.display());

                let len = metadata.len();
                anyhow::ensure!(
                    len >= max_size,
                    "payload file `{}` has {} but objects of {} are required",
                    path.display(),
                    ByteSize::b(len),
                    ByteSize::b(max_size),
                );
                Ok(Payload::File(path.as_path().into()))
            }
            PayloadConfig::Random { seed } => Ok(Payload::Random(*seed)),
        }
    }

    /// Returns a reader over the first `size` bytes of the payload.
    ///
    /// File reads go through [`tokio::fs`], which runs them on the blocking thread pool.
    pub async fn reader(&self, size: u64) -> io::Result<PayloadReader> {
        match self {
            Payload::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::pin(file.take(size)))
            }
            Payload::Random(seed) => Ok(Box::pin(RandomReader {
                remaining: size,
                rng: SmallRng::seed_from_u64(*seed),
            })),
        }
    }
}

/// Produces `remaining` pseudo-random bytes.
struct RandomReader {
    remaining: u64,
    rng: SmallRng,
}

impl AsyncRead for RandomReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        let len_to_fill = (buf.remaining() as u64).min(self.remaining) as usize;

        let fill_buf = buf.initialize_unfilled_to(len_to_fill);
        self.rng.fill_bytes(fill_buf);

        self.remaining -= len_to_fill as u64;
        buf.advance(len_to_fill);

        task::Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    async fn read_all(mut reader: PayloadReader) -> Vec<u8> {
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        contents
    }

    fn payload_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[tokio::test]
    async fn file_readers_are_independent() {
        let file = payload_file(b"0123456789");
        let config = PayloadConfig::File {
            path: file.path().to_owned(),
        };
        let payload = Payload::open(&config, 10).unwrap();

        let mut first = payload.reader(4).await.unwrap();
        let second = payload.reader(6).await.unwrap();

        let mut head = [0; 2];
        first.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"01");
        assert_eq!(read_all(second).await, b"012345");
        assert_eq!(read_all(first).await, b"23");
    }

    #[test]
    fn file_too_small() {
        let file = payload_file(b"0123");
        let config = PayloadConfig::File {
            path: file.path().to_owned(),
        };
        let error = Payload::open(&config, 5).unwrap_err();
        assert!(error.to_string().contains("are required"));
    }

    #[test]
    fn missing_file() {
        let config = PayloadConfig::File {
            path: PathBuf::from("/does/not/exist/bigfile"),
        };
        assert!(Payload::open(&config, 1).is_err());
    }

    #[tokio::test]
    async fn random_payload_is_deterministic() {
        let payload = Payload::open(&PayloadConfig::Random { seed: 7 }, 0).unwrap();

        let first = read_all(payload.reader(100_000).await.unwrap()).await;
        let second = read_all(payload.reader(100_000).await.unwrap()).await;
        assert_eq!(first.len(), 100_000);
        assert_eq!(first, second);
    }
}
