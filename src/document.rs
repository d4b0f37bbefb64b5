//! A single remote file in a site's document library.
//!
//! A [`Document`] starts either unbound (about to be uploaded), with only a
//! site-relative URL (resolved lazily), or bound to a known item (after an
//! upload, a path resolution, or [`Document::from_drive_item`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use sp_drive::{Document, GraphConfig, GraphConnection, LocalFile, Site, SiteConfig, UploadOptions};
//!
//! # async fn run() -> sp_drive::Result<()> {
//! let connection = Arc::new(GraphConnection::new(GraphConfig::new("tenant", "client", "secret"))?);
//! let site = Arc::new(Site::new(connection, SiteConfig::new("contoso.sharepoint.com", "/sites/Finance")));
//!
//! let mut doc = Document::new(Arc::clone(&site));
//! let url = doc
//!     .upload("invoices/2025", &LocalFile::from_path("inv_123.pdf"), &UploadOptions::default())
//!     .await?;
//!
//! let mut same = Document::with_url(site, url);
//! let bytes = same.download().await?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::LOCATION;
use serde_json::{json, Map, Value};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{translate, DriveError, Result};
use crate::folders::ensure_folder_path;
use crate::local_file::LocalFile;
use crate::models::{DriveItem, PreviewInfo};
use crate::path::{build_site_relative_url, encode_drive_path, join_item_path, parse_site_relative_url};
use crate::site::Site;
use crate::transport::{GraphRequest, GraphResponse, GraphTransport};
use crate::upload::{upload_file, UploadOptions};

/// Where a document is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// No URL and no item.
    Unbound,
    /// Site-relative URL known, item not resolved yet.
    Resolving,
    /// Item id known.
    Bound,
}

/// Resolved item. Set as a whole, never field by field.
#[derive(Debug, Clone)]
struct Binding {
    item: DriveItem,
    item_path: Option<String>,
}

/// Handle on one remote file.
pub struct Document {
    site: Arc<Site>,
    url: Option<String>,
    library: Option<String>,
    drive_id: Option<String>,
    binding: Option<Binding>,
}

impl Document {
    /// Document intended for upload, in the site's default library.
    pub fn new(site: Arc<Site>) -> Self {
        Self {
            site,
            url: None,
            library: None,
            drive_id: None,
            binding: None,
        }
    }

    /// Existing file addressed by its site-relative URL; resolved on first use.
    pub fn with_url(site: Arc<Site>, url: impl Into<String>) -> Self {
        let mut doc = Self::new(site);
        doc.url = Some(url.into());
        doc
    }

    /// Use `library` instead of the site's default library.
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self.drive_id = None;
        self
    }

    /// Bind directly to an item from a listing, without any request.
    ///
    /// The item path is derived from the parent's `root:` path marker when
    /// present; otherwise it (and the URL) stay unset.
    pub fn from_drive_item(
        site: Arc<Site>,
        item: DriveItem,
        library: Option<String>,
        drive_id: Option<String>,
    ) -> Self {
        let drive_id = drive_id.or_else(|| {
            item.parent_reference
                .as_ref()
                .and_then(|parent| parent.drive_id.clone())
        });
        let item_path = item.drive_relative_path();

        let mut doc = Self::new(site);
        doc.library = library;
        doc.drive_id = drive_id;
        if let Some(path) = item_path.as_deref() {
            doc.url = Some(build_site_relative_url(
                doc.site.site_path(),
                doc.library_name(),
                path,
            ));
        }
        doc.binding = Some(Binding { item, item_path });
        doc
    }

    pub fn site(&self) -> &Arc<Site> {
        &self.site
    }

    pub fn state(&self) -> DocumentState {
        match (&self.binding, &self.url) {
            (Some(_), _) => DocumentState::Bound,
            (None, Some(_)) => DocumentState::Resolving,
            (None, None) => DocumentState::Unbound,
        }
    }

    /// Site-relative URL, if known.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn library_name(&self) -> &str {
        self.library
            .as_deref()
            .unwrap_or_else(|| self.site.default_library())
    }

    pub fn item_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.item.id.as_str())
    }

    /// Path of the item inside its library.
    pub fn item_path(&self) -> Option<&str> {
        self.binding.as_ref().and_then(|b| b.item_path.as_deref())
    }

    /// Last fetched item metadata.
    pub fn file(&self) -> Option<&DriveItem> {
        self.binding.as_ref().map(|b| &b.item)
    }

    /// Name reported by the remote item.
    pub fn filename(&self) -> Option<&str> {
        self.file().and_then(|item| item.name.as_deref())
    }

    fn transport(&self) -> Arc<dyn GraphTransport> {
        Arc::clone(self.site.transport())
    }

    fn describe(&self) -> String {
        self.url
            .as_deref()
            .or_else(|| self.item_path())
            .or_else(|| self.item_id())
            .unwrap_or("<unbound document>")
            .to_string()
    }

    fn bound_item_id(&self) -> Result<String> {
        self.item_id().map(str::to_string).ok_or_else(|| {
            DriveError::Path("Document has no 'url' set and no item loaded.".to_string())
        })
    }

    async fn ensure_drive_id(&mut self) -> Result<String> {
        if let Some(id) = &self.drive_id {
            return Ok(id.clone());
        }
        let library = self.library.clone();
        let id = self.site.get_drive_id(library.as_deref()).await?;
        self.drive_id = Some(id.clone());
        Ok(id)
    }

    /// Resolve the URL into an item, once.
    async fn ensure_bound(&mut self) -> Result<()> {
        if self.binding.is_some() {
            return Ok(());
        }
        let url = self.url.clone().ok_or_else(|| {
            DriveError::Path("Document has no 'url' set and no item loaded.".to_string())
        })?;

        let (library, item_path) = parse_site_relative_url(self.site.site_path(), &url)?;
        if self.library.is_none() {
            self.library = Some(library);
            self.drive_id = None;
        }

        let drive_id = self.ensure_drive_id().await?;
        let item = self.resolve_item_by_path(&drive_id, &item_path).await?;
        debug!(url = %url, item_id = %item.id, "resolved document");
        self.binding = Some(Binding {
            item,
            item_path: Some(item_path),
        });
        Ok(())
    }

    /// Fetch the item at `item_path` inside `drive_id`.
    pub async fn resolve_item_by_path(&self, drive_id: &str, item_path: &str) -> Result<DriveItem> {
        let item_path = item_path.trim_matches('/');
        let url = format!(
            "{}/drives/{}/root:/{}",
            self.site.graph_base(),
            drive_id,
            encode_drive_path(item_path)
        );
        self.site
            .transport()
            .dispatch(GraphRequest::get(url))
            .await
            .and_then(|response| response.into_model())
            .map_err(|e| {
                translate(
                    format!("item '{}' in library '{}'", item_path, self.library_name()),
                    e,
                )
            })
    }

    /// Rebind to another site-relative URL and resolve it.
    pub async fn load_by_path(&mut self, url: impl Into<String>) -> Result<()> {
        self.url = Some(url.into());
        self.binding = None;
        self.ensure_bound().await
    }

    /// Make sure `path` exists as a folder chain in the library.
    pub async fn ensure_folder(&mut self, path: &str) -> Result<String> {
        let drive_id = self.ensure_drive_id().await?;
        let transport = self.transport();
        ensure_folder_path(transport.as_ref(), &drive_id, path, None).await
    }

    /// Upload `file` into `folder` (created as needed) and bind to the result.
    ///
    /// Returns the synthesized site-relative URL of the uploaded file.
    pub async fn upload(
        &mut self,
        folder: &str,
        file: &LocalFile,
        options: &UploadOptions,
    ) -> Result<String> {
        let file_name = file.name()?.to_string();
        let drive_id = self.ensure_drive_id().await?;
        let transport = self.transport();
        let token = transport.acquire_token().await?;

        let folder = ensure_folder_path(transport.as_ref(), &drive_id, folder, Some(&token)).await?;
        let item_path = join_item_path(&folder, &file_name);
        let library = self.library_name().to_string();

        info!(file = %file, item_path = %item_path, library = %library, "uploading");
        let item = upload_file(
            transport.as_ref(),
            &drive_id,
            &item_path,
            file,
            options,
            Some(&token),
        )
        .await
        .map_err(|e| {
            translate(
                format!("upload to '{}' in library '{}'", item_path, library),
                e,
            )
        })?;

        let url = build_site_relative_url(self.site.site_path(), &library, &item_path);
        self.binding = Some(Binding {
            item,
            item_path: Some(item_path),
        });
        self.url = Some(url.clone());
        Ok(url)
    }

    fn content_url(&self, drive_id: &str, item_id: &str) -> String {
        format!(
            "{}/drives/{}/items/{}/content",
            self.site.graph_base(),
            drive_id,
            item_id
        )
    }

    /// Content response, following a pre-authenticated redirect if given.
    async fn fetch_content(&mut self) -> Result<GraphResponse> {
        self.ensure_bound().await?;
        let drive_id = self.ensure_drive_id().await?;
        let item_id = self.bound_item_id()?;
        let target = format!("download of '{}'", self.describe());
        let transport = self.transport();

        let request = GraphRequest::get(self.content_url(&drive_id, &item_id))
            .header("Accept", "*/*")
            .expect(&[200, 301, 302])
            .stream();
        let response = transport
            .dispatch(request)
            .await
            .map_err(|e| translate(&target, e))?;

        if !matches!(response.status(), 301 | 302) {
            return Ok(response);
        }

        let location = redirect_location(&response).ok_or_else(|| {
            DriveError::not_found(format!(
                "No Location header when downloading {}",
                self.describe()
            ))
        })?;
        debug!(target = %target, "following pre-authenticated link");

        let follow = GraphRequest::get(location)
            .unauthenticated()
            .header("Accept", "*/*")
            .expect(&[200])
            .stream();
        transport
            .dispatch(follow)
            .await
            .map_err(|e| translate(&target, e))
    }

    /// Download the file content.
    ///
    /// Resolves the URL first if the document is not bound yet.
    pub async fn download(&mut self) -> Result<Vec<u8>> {
        let response = self.fetch_content().await?;
        response_bytes(response).await
    }

    /// Stream the file content into a local file.
    ///
    /// If `destination` is a directory, the remote file name is used inside
    /// it. Returns the written path and byte count.
    pub async fn download_to<P: AsRef<Path>>(&mut self, destination: P) -> Result<(PathBuf, u64)> {
        let response = self.fetch_content().await?;

        let destination = destination.as_ref();
        let final_path = if destination.is_dir() {
            let name = self.filename().unwrap_or("download.bin");
            destination.join(name)
        } else {
            destination.to_path_buf()
        };

        let mut file = File::create(&final_path).await?;
        let mut written: u64 = 0;

        match response {
            GraphResponse::Stream(response) => {
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
            }
            other => {
                let data = response_bytes(other).await?;
                file.write_all(&data).await?;
                written = data.len() as u64;
            }
        }

        file.flush().await?;
        info!(path = %final_path.display(), bytes = written, "download saved");
        Ok((final_path, written))
    }

    /// Delete the file from the library.
    pub async fn delete(&mut self) -> Result<()> {
        self.ensure_bound().await?;
        let drive_id = self.ensure_drive_id().await?;
        let item_id = self.bound_item_id()?;
        let url = format!(
            "{}/drives/{}/items/{}",
            self.site.graph_base(),
            drive_id,
            item_id
        );

        self.site
            .transport()
            .dispatch(GraphRequest::delete(url).expect(&[204]))
            .await
            .map_err(|e| translate(format!("delete of '{}'", self.describe()), e))?;
        info!(document = %self.describe(), "deleted");
        Ok(())
    }

    /// Set one field on the backing list item.
    ///
    /// `key` must be an existing column's internal name (e.g. `Title`).
    pub async fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.ensure_bound().await?;
        let drive_id = self.ensure_drive_id().await?;
        let item_id = self.bound_item_id()?;
        let url = format!(
            "{}/drives/{}/items/{}/listItem/fields",
            self.site.graph_base(),
            drive_id,
            item_id
        );

        let mut fields = Map::new();
        fields.insert(key.to_string(), Value::String(value.to_string()));

        self.site
            .transport()
            .dispatch(GraphRequest::patch(url).json(Value::Object(fields)).expect(&[200]))
            .await
            .map_err(|e| translate(format!("metadata update for '{}'", self.describe()), e))?;
        Ok(())
    }

    /// Short-lived pre-authenticated download URL.
    ///
    /// Unlike [`Document::download`], this never resolves a URL: the
    /// document must already be bound.
    pub async fn get_preauth_url(&mut self) -> Result<String> {
        let item_id = self.item_id().map(str::to_string).ok_or_else(|| {
            DriveError::not_found(
                "File must be uploaded or loaded before calling get_preauth_url().",
            )
        })?;
        let drive_id = self.ensure_drive_id().await?;

        let request = GraphRequest::get(self.content_url(&drive_id, &item_id))
            .header("Accept", "*/*")
            .expect(&[200, 301, 302])
            .stream();
        let response = self
            .site
            .transport()
            .dispatch(request)
            .await
            .map_err(|e| translate(format!("pre-authenticated link for '{}'", self.describe()), e))?;

        let status = response.status();
        if !matches!(status, 301 | 302) {
            return Err(DriveError::not_found(format!(
                "No redirect returned for preauth URL (status {}).",
                status
            )));
        }
        redirect_location(&response)
            .ok_or_else(|| DriveError::not_found("No Location header found; no preauth URL available."))
    }

    /// Short-lived embeddable preview URL. The document must already be bound.
    pub async fn get_preview_url(&mut self) -> Result<String> {
        let item_id = self.item_id().map(str::to_string).ok_or_else(|| {
            DriveError::not_found(
                "File must be uploaded or loaded before calling get_preview_url().",
            )
        })?;
        let drive_id = self.ensure_drive_id().await?;
        let url = format!(
            "{}/drives/{}/items/{}/preview",
            self.site.graph_base(),
            drive_id,
            item_id
        );

        let preview: PreviewInfo = self
            .site
            .transport()
            .dispatch(GraphRequest::post(url).json(json!({})).expect(&[200, 201]))
            .await
            .and_then(|response| response.into_model())
            .map_err(|e| translate(format!("preview of '{}'", self.describe()), e))?;

        preview
            .get_url
            .ok_or_else(|| DriveError::not_found("No getUrl returned from preview endpoint."))
    }
}

fn redirect_location(response: &GraphResponse) -> Option<String> {
    match response {
        GraphResponse::Raw(raw) => raw.location().map(str::to_string),
        GraphResponse::Stream(response) => response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        GraphResponse::Json { .. } => None,
    }
}

async fn response_bytes(response: GraphResponse) -> Result<Vec<u8>> {
    match response {
        GraphResponse::Stream(response) => Ok(response.bytes().await?.to_vec()),
        GraphResponse::Raw(raw) => Ok(raw.body),
        GraphResponse::Json { body, .. } => Ok(serde_json::to_vec(&body)?),
    }
}
