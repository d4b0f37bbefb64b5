//! Upload source backed by a filesystem path or by in-memory bytes.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;

use crate::error::{DriveError, Result};

#[derive(Clone)]
enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A file to upload.
#[derive(Clone)]
pub struct LocalFile {
    source: Source,
    file_name: Option<String>,
}

impl LocalFile {
    /// File on disk; the name is taken from the last path component.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);
        Self {
            source: Source::Path(path),
            file_name,
        }
    }

    /// In-memory content. A name is needed before it can be uploaded.
    pub fn from_bytes(data: Vec<u8>, file_name: Option<String>) -> Self {
        Self {
            source: Source::Bytes(data),
            file_name,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Path(path) => Some(path),
            Source::Bytes(_) => None,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.source, Source::Bytes(_))
    }

    pub fn name(&self) -> Result<&str> {
        self.file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| DriveError::Path(format!("{} has no file name", self)))
    }

    pub async fn size(&self) -> Result<u64> {
        match &self.source {
            Source::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            Source::Bytes(data) => Ok(data.len() as u64),
        }
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        match &self.source {
            Source::Path(path) => Ok(tokio::fs::read(path).await?),
            Source::Bytes(data) => Ok(data.clone()),
        }
    }

    /// Sequential reader over the content.
    pub async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        match &self.source {
            Source::Path(path) => Ok(Box::new(tokio::fs::File::open(path).await?)),
            Source::Bytes(data) => Ok(Box::new(Cursor::new(data.clone()))),
        }
    }

    /// Guess the MIME type from the file name.
    pub fn mime_type(&self) -> String {
        self.file_name
            .as_deref()
            .map(|name| mime_guess::from_path(name).first_or_octet_stream().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }
}

impl fmt::Display for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Bytes(_) => write!(
                f,
                "<in-memory:{}>",
                self.file_name.as_deref().unwrap_or("unnamed")
            ),
        }
    }
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Path(path) => f
                .debug_struct("LocalFile")
                .field("path", path)
                .field("file_name", &self.file_name)
                .finish(),
            Source::Bytes(data) => f
                .debug_struct("LocalFile")
                .field("in_memory_bytes", &data.len())
                .field("file_name", &self.file_name)
                .finish(),
        }
    }
}
