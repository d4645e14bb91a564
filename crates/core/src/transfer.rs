use std::fmt;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};

/// Readable byte stream with a known length.
///
/// The length is declared up front (it is persisted with the blob), so the
/// stream itself never has to be consumed just to size it.
pub struct ByteSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    length: u64,
    origin: Option<PathBuf>,
}

impl ByteSource {
    /// Open a file as a source; its length comes from filesystem metadata
    /// and its path is recorded as the origin for diagnostics.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let length = file.metadata().await?.len();
        Ok(Self {
            reader: Box::new(BufReader::new(file)),
            length,
            origin: Some(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory buffer as a source.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            length: data.len() as u64,
            reader: Box::new(Cursor::new(data)),
            origin: None,
        }
    }

    /// Wrap an arbitrary reader whose length is already known.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, length: u64) -> Self {
        Self {
            reader: Box::new(reader),
            length,
            origin: None,
        }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Drain the stream into a single buffer sized by the declared length.
    pub async fn read_all(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.length as usize);
        self.reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("length", &self.length)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Writable destination for a downloaded payload.
pub enum ByteSink {
    /// Filesystem target. Parent directories are created by [`prepare`],
    /// the file itself only once a record is actually found.
    ///
    /// [`prepare`]: ByteSink::prepare
    File { path: PathBuf },
    /// Arbitrary writer target.
    Writer(Box<dyn AsyncWrite + Send + Sync + Unpin>),
}

impl ByteSink {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn writer(writer: impl AsyncWrite + Send + Sync + Unpin + 'static) -> Self {
        Self::Writer(Box::new(writer))
    }

    /// Create whatever must exist before the payload lookup runs.
    ///
    /// For file sinks this creates the parent directory; the file itself is
    /// not touched, so a lookup miss leaves no trace at the target path.
    pub async fn prepare(&self) -> io::Result<()> {
        if let Self::File { path } = self {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Open the underlying writer. File sinks create (or truncate) the
    /// target file here.
    pub async fn open(self) -> io::Result<Box<dyn AsyncWrite + Send + Sync + Unpin>> {
        match self {
            Self::File { path } => Ok(Box::new(File::create(&path).await?)),
            Self::Writer(writer) => Ok(writer),
        }
    }
}

impl fmt::Debug for ByteSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => f.debug_struct("ByteSink::File").field("path", path).finish(),
            Self::Writer(_) => f.write_str("ByteSink::Writer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn test_source_from_bytes() {
        let source = ByteSource::from_bytes(b"hello world".to_vec());
        assert_eq!(source.length(), 11);
        assert!(source.origin().is_none());
        assert_eq!(source.read_all().await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_source_from_reader_uses_declared_length() {
        let source = ByteSource::from_reader(Cursor::new(b"abcdef".to_vec()), 6);
        assert_eq!(source.length(), 6);
        assert_eq!(source.read_all().await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_source_from_path_records_origin_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let source = ByteSource::from_path(&path).await.unwrap();
        assert_eq!(source.length(), 7);
        assert_eq!(source.origin(), Some(path.as_path()));
        assert_eq!(source.read_all().await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_file_sink_prepare_creates_parent_but_not_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.bin");

        let sink = ByteSink::file(&path);
        sink.prepare().await.unwrap();

        assert!(path.parent().unwrap().exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_sink_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let sink = ByteSink::file(&path);
        sink.prepare().await.unwrap();
        let mut writer = sink.open().await.unwrap();
        writer.write_all(b"data").await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"data");
    }
}
