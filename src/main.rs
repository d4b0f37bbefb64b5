//! sp_drive CLI - Work with files in a site's document library.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use glob::glob;
use tracing_subscriber::EnvFilter;

use sp_drive::upload::DEFAULT_CHUNK_SIZE;
use sp_drive::{
    Document, GraphConfig, GraphConnection, LocalFile, Site, SiteConfig, UploadOptions,
};

/// CLI tool for working with files in a site's document library.
#[derive(Parser)]
#[command(name = "sp_drive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    identity: Identity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Identity {
    /// Directory (tenant) ID of the app registration.
    #[arg(long, env = "TENANT_ID")]
    tenant_id: String,

    /// Application (client) ID.
    #[arg(long, env = "CLIENT_ID")]
    client_id: String,

    /// Client secret.
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Site hostname, e.g. contoso.sharepoint.com.
    #[arg(long, env = "SHAREPOINT_HOSTNAME")]
    hostname: String,

    /// Server-relative site path, e.g. /sites/Finance.
    #[arg(long, env = "SHAREPOINT_SITE_PATH")]
    site_path: String,

    /// Document library used when a command does not name one.
    #[arg(long, env = "SHAREPOINT_LIBRARY", default_value = "Documents")]
    library: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files to a folder in the library.
    Upload {
        /// File patterns to upload (supports glob patterns like *.pdf, file_{1,2,3}.txt).
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Destination folder inside the library (created if missing).
        #[arg(long, short = 't', default_value = "")]
        to: String,

        /// Bytes per upload-session request for large files.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Download a file by its site-relative URL.
    Download {
        /// Site-relative URL, e.g. /sites/Finance/Documents/a/b.pdf.
        url: String,

        /// Local destination path (file or directory).
        #[arg(long, short = 't', default_value = ".")]
        to: PathBuf,
    },

    /// Delete a file by its site-relative URL.
    Delete {
        url: String,
    },

    /// Set a column value on a file's list item.
    SetMetadata {
        url: String,
        key: String,
        value: String,
    },

    /// Print the id, size, type and name of a file.
    Info {
        url: String,
    },

    /// Print a short-lived pre-authenticated download link.
    Link {
        url: String,
    },

    /// Print a short-lived embeddable preview link.
    Preview {
        url: String,
    },

    /// Create a folder chain inside the library.
    Mkdir {
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let identity = cli.identity;

    let config = GraphConfig::new(identity.tenant_id, identity.client_id, identity.client_secret);
    let connection =
        GraphConnection::new(config).context("Failed to create Graph connection")?;
    let site = Arc::new(Site::new(
        Arc::new(connection),
        SiteConfig::new(identity.hostname, identity.site_path).with_library(identity.library),
    ));

    match cli.command {
        Commands::Upload {
            patterns,
            to,
            chunk_size,
        } => {
            let files_to_upload = expand_patterns(&patterns)?;
            if files_to_upload.is_empty() {
                anyhow::bail!("No files to upload");
            }

            let options = UploadOptions::default().with_chunk_size(chunk_size);
            println!("Uploading {} file(s) to '{}'...", files_to_upload.len(), to);

            let mut failures = 0;
            for (idx, file_path) in files_to_upload.iter().enumerate() {
                let filename = file_path.file_name().unwrap_or_default().to_string_lossy();
                print!("[{}/{}] Uploading {}... ", idx + 1, files_to_upload.len(), filename);

                let mut doc = Document::new(Arc::clone(&site));
                match doc
                    .upload(&to, &LocalFile::from_path(file_path), &options)
                    .await
                {
                    Ok(url) => println!("OK ({})", url),
                    Err(e) => {
                        failures += 1;
                        println!("FAILED");
                        eprintln!("  Error: {}", e);
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} upload(s) failed", failures);
            }
            println!("Done.");
        }

        Commands::Download { url, to } => {
            if to.is_dir() || to.to_string_lossy().ends_with('/') {
                std::fs::create_dir_all(&to)
                    .with_context(|| format!("Failed to create directory: {:?}", to))?;
            } else if let Some(parent) = to.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create directory: {:?}", parent))?;
                }
            }

            print!("Downloading {}... ", url);
            let mut doc = Document::with_url(site, url.clone());
            let (saved, bytes) = doc
                .download_to(&to)
                .await
                .with_context(|| format!("Failed to download file: {}", url))?;

            println!("OK");
            println!("Saved {} bytes to: {:?}", bytes, saved);
        }

        Commands::Delete { url } => {
            let mut doc = Document::with_url(site, url.clone());
            doc.delete()
                .await
                .with_context(|| format!("Failed to delete file: {}", url))?;
            println!("Deleted {}", url);
        }

        Commands::SetMetadata { url, key, value } => {
            let mut doc = Document::with_url(site, url.clone());
            doc.set_metadata(&key, &value)
                .await
                .with_context(|| format!("Failed to update '{}' on {}", key, url))?;
            println!("Set {} on {}", key, url);
        }

        Commands::Info { url } => {
            let mut doc = Document::with_url(site, url.clone());
            doc.load_by_path(url.clone())
                .await
                .with_context(|| format!("Failed to resolve file: {}", url))?;
            if let Some(item) = doc.file() {
                println!("{}", item);
            }
        }

        Commands::Link { url } => {
            let mut doc = Document::with_url(site, url.clone());
            doc.load_by_path(url.clone())
                .await
                .with_context(|| format!("Failed to resolve file: {}", url))?;
            let link = doc
                .get_preauth_url()
                .await
                .with_context(|| format!("Failed to get download link for: {}", url))?;
            println!("{}", link);
        }

        Commands::Preview { url } => {
            let mut doc = Document::with_url(site, url.clone());
            doc.load_by_path(url.clone())
                .await
                .with_context(|| format!("Failed to resolve file: {}", url))?;
            let link = doc
                .get_preview_url()
                .await
                .with_context(|| format!("Failed to get preview link for: {}", url))?;
            println!("{}", link);
        }

        Commands::Mkdir { path } => {
            let mut doc = Document::new(site);
            let created = doc
                .ensure_folder(&path)
                .await
                .with_context(|| format!("Failed to create folder: {}", path))?;
            println!("Folder ready: {}", created);
        }
    }

    Ok(())
}

/// Expand glob and brace patterns into a sorted, de-duplicated file list.
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        for expanded_pattern in expand_braces(pattern) {
            let matches: Vec<PathBuf> = glob(&expanded_pattern)
                .with_context(|| format!("Invalid glob pattern: {}", expanded_pattern))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file())
                .collect();

            if matches.is_empty() {
                // If no glob matches, treat as literal path
                let path = PathBuf::from(&expanded_pattern);
                if path.is_file() {
                    files.push(path);
                } else {
                    eprintln!("Warning: No files matched pattern: {}", expanded_pattern);
                }
            } else {
                files.extend(matches);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand brace patterns like file_{1,2,3}.txt into multiple patterns.
fn expand_braces(pattern: &str) -> Vec<String> {
    if let Some(start) = pattern.find('{') {
        if let Some(end) = pattern[start..].find('}') {
            let end = start + end;
            let prefix = &pattern[..start];
            let suffix = &pattern[end + 1..];
            let alternatives = &pattern[start + 1..end];

            return alternatives
                .split(',')
                .flat_map(|alt| {
                    let expanded = format!("{}{}{}", prefix, alt.trim(), suffix);
                    expand_braces(&expanded)
                })
                .collect();
        }
    }

    vec![pattern.to_string()]
}
