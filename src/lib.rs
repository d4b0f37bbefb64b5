//! sp_drive - A client for site document libraries over the Microsoft Graph API.
//!
//! This library provides functionality to:
//! - Authenticate a service principal with the client-credentials grant
//! - Resolve site and document library (drive) identifiers, with caching
//! - Create nested folder chains idempotently
//! - Upload files, using a resumable upload session for large payloads
//! - Download, delete, tag and link existing files by site-relative URL
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sp_drive::{Document, GraphConfig, GraphConnection, LocalFile, Site, SiteConfig, UploadOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GraphConfig::new("tenant-id", "client-id", "client-secret");
//!     let connection = Arc::new(GraphConnection::new(config)?);
//!     let site = Arc::new(Site::new(
//!         connection,
//!         SiteConfig::new("contoso.sharepoint.com", "/sites/Finance"),
//!     ));
//!
//!     let mut doc = Document::new(site);
//!     let url = doc
//!         .upload("invoices/2025", &LocalFile::from_path("inv_123.pdf"), &UploadOptions::default())
//!         .await?;
//!     println!("{}", url);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod background;
pub mod config;
pub mod document;
pub mod error;
pub mod folders;
pub mod local_file;
pub mod models;
pub mod path;
pub mod site;
pub mod transport;
pub mod upload;

// Re-exports for convenience
pub use auth::Authenticator;
pub use background::{BackgroundUpload, LogObserver, UploadObserver};
pub use config::{GraphConfig, SiteConfig};
pub use document::{Document, DocumentState};
pub use error::{translate, DriveError, Result};
pub use folders::ensure_folder_path;
pub use local_file::LocalFile;
pub use models::DriveItem;
pub use site::Site;
pub use transport::{GraphConnection, GraphRequest, GraphResponse, GraphTransport, RawResponse};
pub use upload::{ContentRange, ProgressCallback, UploadOptions, UploadProgress, UploadSession};
