//! A site and its memoized identifiers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::SiteConfig;
use crate::error::{translate, DriveError, Result};
use crate::models::{DriveList, SiteDescriptor};
use crate::path::normalize_site_path;
use crate::transport::{GraphRequest, GraphTransport};

/// One site (hostname + path) bound to a transport.
///
/// The site id and the drive id of each library are resolved on first use
/// and kept for the lifetime of the value. Concurrent first lookups may
/// both hit the network; the cached outcome is the same either way.
pub struct Site {
    transport: Arc<dyn GraphTransport>,
    hostname: String,
    site_path: String,
    default_library: String,
    site_id: RwLock<Option<String>>,
    drive_cache: RwLock<HashMap<String, String>>,
}

impl Site {
    pub fn new(transport: Arc<dyn GraphTransport>, config: SiteConfig) -> Self {
        Self {
            transport,
            hostname: config.hostname,
            site_path: normalize_site_path(&config.site_path),
            default_library: config.default_library,
            site_id: RwLock::new(None),
            drive_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn GraphTransport> {
        &self.transport
    }

    pub fn graph_base(&self) -> &str {
        self.transport.graph_base()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Server-relative site path, always with a leading `/`.
    pub fn site_path(&self) -> &str {
        &self.site_path
    }

    pub fn default_library(&self) -> &str {
        &self.default_library
    }

    fn describe(&self) -> String {
        format!("{}{}", self.hostname, self.site_path)
    }

    /// Resolve and cache the site id for this hostname + path.
    pub async fn ensure_site_id(&self) -> Result<String> {
        if let Some(id) = self.site_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let url = format!(
            "{}/sites/{}:{}",
            self.graph_base(),
            self.hostname,
            self.site_path
        );
        let descriptor: SiteDescriptor = self
            .transport
            .dispatch(GraphRequest::get(url))
            .await
            .and_then(|response| response.into_model())
            .map_err(|e| translate(format!("site {}", self.describe()), e))?;

        debug!(site = %self.describe(), site_id = %descriptor.id, "resolved site id");
        *self.site_id.write().await = Some(descriptor.id.clone());
        Ok(descriptor.id)
    }

    /// Drive id of `library_name` (or the default library), cached per name.
    ///
    /// Fails with [`DriveError::NotFound`] listing the available drive names
    /// when no library matches.
    pub async fn get_drive_id(&self, library_name: Option<&str>) -> Result<String> {
        let library = library_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.default_library);
        if let Some(id) = self.drive_cache.read().await.get(library) {
            return Ok(id.clone());
        }

        let site_id = self.ensure_site_id().await?;
        let url = format!("{}/sites/{}/drives?$select=id,name", self.graph_base(), site_id);
        let drives: DriveList = self
            .transport
            .dispatch(GraphRequest::get(url))
            .await
            .and_then(|response| response.into_model())
            .map_err(|e| translate(format!("drives on site {}", self.describe()), e))?;

        let found = drives
            .value
            .iter()
            .find(|drive| drive.name.as_deref() == Some(library));

        match found {
            Some(drive) => {
                debug!(library, drive_id = %drive.id, "resolved drive id");
                self.drive_cache
                    .write()
                    .await
                    .insert(library.to_string(), drive.id.clone());
                Ok(drive.id.clone())
            }
            None => {
                let available = drives
                    .value
                    .iter()
                    .filter_map(|drive| drive.name.as_deref())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(DriveError::not_found(format!(
                    "Drive '{}' not found on site {}. Available drives: {}",
                    library,
                    self.describe(),
                    available
                )))
            }
        }
    }

    /// Forget the site id and every cached drive id.
    pub async fn clear_cache(&self) {
        *self.site_id.write().await = None;
        self.drive_cache.write().await.clear();
    }
}
