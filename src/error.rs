//! Error types for the sp_drive crate.

use thiserror::Error;

/// Errors that can occur when talking to a site's document libraries.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Missing or rejected credentials, or an invalid client setting.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote answered with a status the call site did not expect.
    #[error("Graph {method} {url} failed (status {status}): {body}")]
    Transport {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// Malformed or foreign site-relative URL.
    #[error("Path error: {0}")]
    Path(String),

    #[error("Not found: {message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<Box<DriveError>>,
    },

    #[error("Permission denied: {message}")]
    PermissionDenied {
        message: String,
        #[source]
        source: Option<Box<DriveError>>,
    },

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        #[source]
        source: Option<Box<DriveError>>,
    },

    /// The remote broke the expected exchange (e.g. an upload session that
    /// ended without returning the final item).
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl DriveError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            source: None,
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
            source: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            source: None,
        }
    }

    /// HTTP status carried by a transport error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<reqwest::header::InvalidHeaderValue> for DriveError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderName> for DriveError {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// Translate a transport failure into a resource-level error.
///
/// `target` describes what was being acted on (e.g. `"item 'a/b.pdf' in
/// library 'Documents'"`) and only feeds the message. 404 becomes
/// [`DriveError::NotFound`], 401/403 [`DriveError::PermissionDenied`] and 409
/// [`DriveError::Conflict`]; every other error is handed back unchanged.
pub fn translate(target: impl AsRef<str>, err: DriveError) -> DriveError {
    let status = match err.status() {
        Some(status) => status,
        None => return err,
    };

    let message = format!("{} (Graph status {})", target.as_ref(), status);
    match status {
        404 => DriveError::NotFound {
            message,
            source: Some(Box::new(err)),
        },
        401 | 403 => DriveError::PermissionDenied {
            message,
            source: Some(Box::new(err)),
        },
        409 => DriveError::Conflict {
            message,
            source: Some(Box::new(err)),
        },
        _ => err,
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn transport(status: u16) -> DriveError {
        DriveError::Transport {
            method: "GET".to_string(),
            url: "https://graph.test/v1.0/drives/d1/root:/a".to_string(),
            status,
            body: "{\"error\":{\"code\":\"x\"}}".to_string(),
        }
    }

    #[test]
    fn test_translate_not_found() {
        let err = translate("item 'a'", transport(404));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: item 'a' (Graph status 404)");
        let cause = err.source().expect("cause kept");
        assert!(cause.to_string().contains("status 404"));
    }

    #[test]
    fn test_translate_permission_denied() {
        assert!(translate("site", transport(401)).is_permission_denied());
        assert!(translate("site", transport(403)).is_permission_denied());
    }

    #[test]
    fn test_translate_conflict() {
        let err = translate("folder 'a/b'", transport(409));
        assert!(err.is_conflict());
        assert!(err.to_string().contains("folder 'a/b'"));
    }

    #[test]
    fn test_translate_passes_other_statuses_through() {
        match translate("item", transport(500)) {
            DriveError::Transport { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "{\"error\":{\"code\":\"x\"}}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_translate_ignores_non_transport_errors() {
        let err = translate("item", DriveError::Path("bad".to_string()));
        assert!(matches!(err, DriveError::Path(_)));
    }

    #[test]
    fn test_transport_display() {
        let display = transport(502).to_string();
        assert!(display.contains("GET"));
        assert!(display.contains("502"));
        assert!(display.contains("\"code\""));
    }
}
