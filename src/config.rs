//! Explicit client configuration.
//!
//! Nothing in the library reads the process environment; callers build these
//! values themselves (the CLI binds them to environment variables via clap).

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DriveError, Result};

/// Default Graph API base URL.
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Default identity platform host used for the client-credentials grant.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default app-only scope.
pub const DEFAULT_GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default document library name.
pub const DEFAULT_LIBRARY: &str = "Documents";

/// Identity of one app registration plus the endpoints it talks to.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    #[serde(alias = "tenant_id")]
    pub tenant_id: String,
    #[serde(alias = "client_id")]
    pub client_id: String,
    #[serde(alias = "client_secret")]
    pub client_secret: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_graph_base", alias = "graph_base")]
    pub graph_base: String,
    #[serde(default = "default_authority_host", alias = "authority_host")]
    pub authority_host: String,
    #[serde(default = "default_timeout_secs", alias = "timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("graph_base", &self.graph_base)
            .field("authority_host", &self.authority_host)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_GRAPH_SCOPE.to_string()]
}

fn default_graph_base() -> String {
    DEFAULT_GRAPH_BASE.to_string()
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl GraphConfig {
    /// Create a config with the public Graph endpoints and default scope.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: default_scopes(),
            graph_base: default_graph_base(),
            authority_host: default_authority_host(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load a config from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: GraphConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_graph_base(mut self, graph_base: impl Into<String>) -> Self {
        self.graph_base = graph_base.into();
        self
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Graph base URL without a trailing slash.
    pub fn graph_base(&self) -> &str {
        self.graph_base.trim_end_matches('/')
    }

    /// Token endpoint for this tenant.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check that the identity fields are present.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(DriveError::Config(format!(
                "{} required for a Graph connection",
                missing.join(", ")
            )));
        }
        if self.scopes.is_empty() {
            return Err(DriveError::Config("at least one scope is required".to_string()));
        }
        Ok(())
    }
}

/// One site (hostname + server-relative path) and its default library.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub hostname: String,
    #[serde(alias = "site_path")]
    pub site_path: String,
    #[serde(default = "default_library", alias = "default_library")]
    pub default_library: String,
}

fn default_library() -> String {
    DEFAULT_LIBRARY.to_string()
}

impl SiteConfig {
    pub fn new(hostname: impl Into<String>, site_path: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            site_path: site_path.into(),
            default_library: default_library(),
        }
    }

    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.default_library = library.into();
        self
    }
}
