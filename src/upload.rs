//! File transfer: direct PUT for small payloads, resumable upload session
//! for large ones.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::error::{DriveError, Result};
use crate::local_file::LocalFile;
use crate::models::{DriveItem, UploadSessionInfo};
use crate::path::encode_drive_path;
use crate::transport::{GraphRequest, GraphTransport};

/// Payloads up to and including this size go through a single PUT (4 MiB).
pub const SMALL_FILE_THRESHOLD: u64 = 4 * 1024 * 1024;

/// Default chunk size for upload sessions (10 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Statuses an upload-session chunk PUT may answer with.
const CHUNK_EXPECTED_STATUS: &[u16] = &[200, 201, 202];

/// Progress of a running upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub file_name: String,
    pub bytes_uploaded: u64,
    pub file_size: u64,
}

/// Callback trait for progress reporting.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, progress: &UploadProgress);
}

/// Tuning for [`upload_file`].
#[derive(Clone)]
pub struct UploadOptions {
    /// Bytes per upload-session PUT. Must be non-zero.
    pub chunk_size: usize,
    /// Largest payload sent as a single PUT.
    pub small_file_threshold: u64,
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            small_file_threshold: SMALL_FILE_THRESHOLD,
            progress: None,
        }
    }
}

impl UploadOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_small_file_threshold(mut self, threshold: u64) -> Self {
        self.small_file_threshold = threshold;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Inclusive byte range of one chunk, rendered as a `Content-Range` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    /// Range for `len` bytes starting at `start`. `len` must be non-zero.
    pub fn new(start: u64, len: u64, total: u64) -> Self {
        Self {
            start,
            end: start + len - 1,
            total,
        }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// State of one resumable upload.
///
/// `bytes_uploaded` only moves forward, by the size of each accepted chunk.
/// The session is consumed by [`UploadSession::run`]; nothing is persisted.
#[derive(Debug)]
pub struct UploadSession {
    upload_url: String,
    file_size: u64,
    bytes_uploaded: u64,
    chunk_size: usize,
}

impl UploadSession {
    pub fn new(upload_url: impl Into<String>, file_size: u64, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DriveError::Config("chunk size must be greater than zero".to_string()));
        }
        Ok(Self {
            upload_url: upload_url.into(),
            file_size,
            bytes_uploaded: 0,
            chunk_size,
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Range the next chunk of `chunk_len` bytes will cover.
    pub fn next_range(&self, chunk_len: u64) -> ContentRange {
        ContentRange::new(self.bytes_uploaded, chunk_len, self.file_size)
    }

    fn advance(&mut self, chunk_len: u64) {
        self.bytes_uploaded += chunk_len;
    }

    /// Send `reader` to the session URL chunk by chunk, in offset order.
    ///
    /// A response carrying an item id marks completion; the last such body
    /// is returned. A failed chunk aborts the session without retry.
    pub async fn run<R>(
        mut self,
        transport: &dyn GraphTransport,
        reader: &mut R,
        file_name: &str,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<DriveItem>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut final_item: Option<DriveItem> = None;

        loop {
            let chunk_len = read_chunk(reader, &mut buf).await?;
            if chunk_len == 0 {
                break;
            }
            let len = chunk_len as u64;
            if self.bytes_uploaded + len > self.file_size {
                return Err(DriveError::Protocol(format!(
                    "source for '{}' is larger than the declared {} bytes",
                    file_name, self.file_size
                )));
            }

            let range = self.next_range(len);
            let request = GraphRequest::put(self.upload_url.clone())
                .unauthenticated()
                .header("Content-Length", chunk_len.to_string())
                .header("Content-Range", range.to_string())
                .bytes(buf[..chunk_len].to_vec())
                .expect(CHUNK_EXPECTED_STATUS);

            debug!(range = %range, "sending upload chunk");
            let response = transport.dispatch(request).await?;
            self.advance(len);

            if let Some(body) = response.json_body() {
                if body.get("id").and_then(Value::as_str).is_some() {
                    final_item = Some(serde_json::from_value(body.clone())?);
                }
            }

            info!(
                "Uploaded {}/{} bytes ({:.2}%)",
                self.bytes_uploaded,
                self.file_size,
                percent(self.bytes_uploaded, self.file_size)
            );
            if let Some(progress) = progress {
                progress.on_progress(&UploadProgress {
                    file_name: file_name.to_string(),
                    bytes_uploaded: self.bytes_uploaded,
                    file_size: self.file_size,
                });
            }
        }

        final_item.ok_or_else(|| {
            DriveError::Protocol(format!(
                "Upload session for '{}' finished without final item response ({} of {} bytes sent)",
                file_name, self.bytes_uploaded, self.file_size
            ))
        })
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    }
}

/// Fill `buf` from `reader`; returns fewer bytes only at end of stream.
async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn with_token(request: GraphRequest, token: Option<&str>) -> GraphRequest {
    match token {
        Some(token) => request.token(token),
        None => request,
    }
}

/// Upload `file` to `item_path`, choosing the strategy by size.
///
/// # Arguments
/// * `drive_id` - Target drive
/// * `item_path` - Drive-relative path of the file, including its name
/// * `token` - Token to reuse for the authenticated calls, if already held
pub async fn upload_file(
    transport: &dyn GraphTransport,
    drive_id: &str,
    item_path: &str,
    file: &LocalFile,
    options: &UploadOptions,
    token: Option<&str>,
) -> Result<DriveItem> {
    let size = file.size().await?;
    if size <= options.small_file_threshold {
        upload_small(transport, drive_id, item_path, file, token).await
    } else {
        upload_large(transport, drive_id, item_path, file, options, token).await
    }
}

/// Single-request upload: the whole payload in one PUT.
pub async fn upload_small(
    transport: &dyn GraphTransport,
    drive_id: &str,
    item_path: &str,
    file: &LocalFile,
    token: Option<&str>,
) -> Result<DriveItem> {
    let data = file.read_bytes().await?;
    let url = format!(
        "{}/drives/{}/root:/{}:/content",
        transport.graph_base(),
        drive_id,
        encode_drive_path(item_path)
    );
    info!(item_path, bytes = data.len(), "simple upload");

    let request = GraphRequest::put(url)
        .header("Content-Type", file.mime_type())
        .bytes(data)
        .expect(&[200, 201]);
    transport
        .dispatch(with_token(request, token))
        .await?
        .into_model()
}

/// Open an upload session for `item_path` and return its URL.
pub async fn create_upload_session(
    transport: &dyn GraphTransport,
    drive_id: &str,
    item_path: &str,
    file_name: &str,
    token: Option<&str>,
) -> Result<String> {
    let url = format!(
        "{}/drives/{}/root:/{}:/createUploadSession",
        transport.graph_base(),
        drive_id,
        encode_drive_path(item_path)
    );
    let body = json!({
        "item": {
            "@microsoft.graph.conflictBehavior": "replace",
            "name": file_name,
        }
    });

    let request = GraphRequest::post(url).json(body).expect(&[200]);
    let session: UploadSessionInfo = transport
        .dispatch(with_token(request, token))
        .await?
        .into_model()?;

    session
        .upload_url
        .ok_or_else(|| DriveError::Protocol("No uploadUrl in upload session response".to_string()))
}

/// Resumable upload through an upload session.
pub async fn upload_large(
    transport: &dyn GraphTransport,
    drive_id: &str,
    item_path: &str,
    file: &LocalFile,
    options: &UploadOptions,
    token: Option<&str>,
) -> Result<DriveItem> {
    let file_name = file.name()?;
    let file_size = file.size().await?;

    let upload_url =
        create_upload_session(transport, drive_id, item_path, file_name, token).await?;
    info!(item_path, file_size, "upload session created");

    let session = UploadSession::new(upload_url, file_size, options.chunk_size)?;
    let mut reader = file.open().await?;
    let item = session
        .run(transport, &mut reader, file_name, options.progress.as_deref())
        .await?;

    info!(item_path, item_id = %item.id, "upload complete");
    Ok(item)
}
