//! Uploads that run on their own task.
//!
//! The caller gets a [`JoinHandle`] back immediately. The outcome is also
//! reported to an [`UploadObserver`], whether or not the handle is awaited.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{GraphConfig, SiteConfig};
use crate::document::Document;
use crate::error::{DriveError, Result};
use crate::local_file::LocalFile;
use crate::site::Site;
use crate::transport::{GraphConnection, GraphTransport};
use crate::upload::{UploadOptions, DEFAULT_CHUNK_SIZE};

/// Receives the outcome of a background upload.
pub trait UploadObserver: Send + Sync {
    fn on_success(&self, local_path: &Path, url: &str);
    fn on_failure(&self, local_path: &Path, error: &DriveError);
}

/// Observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl UploadObserver for LogObserver {
    fn on_success(&self, local_path: &Path, url: &str) {
        info!(local = %local_path.display(), url, "background upload finished; local file removed");
    }

    fn on_failure(&self, local_path: &Path, error: &DriveError) {
        error!(local = %local_path.display(), error = %error, "background upload failed");
    }
}

/// Upload a local file, then delete it, without blocking the caller.
///
/// Every identity and site parameter is explicit; nothing is read from the
/// environment.
#[derive(Debug, Clone)]
pub struct BackgroundUpload {
    pub graph: GraphConfig,
    pub site: SiteConfig,
    pub local_path: PathBuf,
    pub folder: String,
    pub chunk_size: usize,
}

impl BackgroundUpload {
    pub fn new(
        graph: GraphConfig,
        site: SiteConfig,
        local_path: impl Into<PathBuf>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            site,
            local_path: local_path.into(),
            folder: folder.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Connect with `self.graph` and run the upload on a new task.
    pub fn spawn(self, observer: Arc<dyn UploadObserver>) -> JoinHandle<Result<String>> {
        tokio::spawn(async move {
            let local_path = self.local_path.clone();
            let result = match GraphConnection::new(self.graph.clone()) {
                Ok(connection) => self.run(Arc::new(connection)).await,
                Err(e) => Err(e),
            };
            report(observer.as_ref(), &local_path, &result);
            result
        })
    }

    /// Run the upload on a new task over an existing transport.
    pub fn spawn_with(
        self,
        transport: Arc<dyn GraphTransport>,
        observer: Arc<dyn UploadObserver>,
    ) -> JoinHandle<Result<String>> {
        tokio::spawn(async move {
            let local_path = self.local_path.clone();
            let result = self.run(transport).await;
            report(observer.as_ref(), &local_path, &result);
            result
        })
    }

    async fn run(self, transport: Arc<dyn GraphTransport>) -> Result<String> {
        let site = Arc::new(Site::new(transport, self.site));
        let mut document = Document::new(site);
        let options = UploadOptions::default().with_chunk_size(self.chunk_size);

        let url = document
            .upload(&self.folder, &LocalFile::from_path(&self.local_path), &options)
            .await?;

        tokio::fs::remove_file(&self.local_path).await?;
        Ok(url)
    }
}

fn report(observer: &dyn UploadObserver, local_path: &Path, result: &Result<String>) {
    match result {
        Ok(url) => observer.on_success(local_path, url),
        Err(e) => observer.on_failure(local_path, e),
    }
}
