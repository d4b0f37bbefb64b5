//! Data models for Graph drive API responses.

use serde::{Deserialize, Serialize};

/// A file or folder node within a drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub e_tag: Option<String>,
    #[serde(default)]
    pub parent_reference: Option<ItemReference>,
    #[serde(default)]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub folder: Option<FolderFacet>,
    #[serde(default, rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    /// Path of the item inside its drive, derived from the parent's
    /// `.../root:/A/B` marker. `None` when the parent path is absent or does
    /// not carry the marker.
    pub fn drive_relative_path(&self) -> Option<String> {
        const MARKER: &str = "root:";

        let name = self.name.as_deref()?;
        let parent_path = self.parent_reference.as_ref()?.path.as_deref()?;
        let (_, rel) = parent_path.split_once(MARKER)?;
        let rel = rel.trim_matches('/');
        if rel.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{}/{}", rel, name))
        }
    }
}

impl std::fmt::Display for DriveItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size_str = self
            .size
            .map(format_size)
            .unwrap_or_else(|| "-".to_string());
        let kind = if self.is_folder() {
            "folder"
        } else {
            self.file
                .as_ref()
                .and_then(|f| f.mime_type.as_deref())
                .unwrap_or("-")
        };
        let name = self.name.as_deref().unwrap_or("-");
        write!(f, "{}\t{}\t{}\t{}", self.id, size_str, kind, name)
    }
}

/// Reference to the parent of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReference {
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: Option<u64>,
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Site descriptor returned by `GET /sites/{hostname}:{path}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDescriptor {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// Document library metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Response from the site drives listing.
#[derive(Debug, Deserialize)]
pub struct DriveList {
    #[serde(default)]
    pub value: Vec<DriveSummary>,
}

/// Response from `createUploadSession`, and the interim body of an accepted
/// chunk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionInfo {
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub expiration_date_time: Option<String>,
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

/// Response from the preview action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    #[serde(default)]
    pub get_url: Option<String>,
    #[serde(default)]
    pub post_url: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_drive_item_deserialize() {
        let json = r#"{
            "id": "01ABC",
            "name": "report.pdf",
            "size": 2048,
            "file": {"mimeType": "application/pdf"},
            "parentReference": {"driveId": "b!xyz", "path": "/drives/b!xyz/root:/Finance/2025"},
            "@microsoft.graph.downloadUrl": "https://download.test/abc"
        }"#;

        let item: DriveItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "01ABC");
        assert_eq!(item.size, Some(2048));
        assert!(!item.is_folder());
        assert_eq!(
            item.download_url.as_deref(),
            Some("https://download.test/abc")
        );
        assert_eq!(
            item.parent_reference.as_ref().unwrap().drive_id.as_deref(),
            Some("b!xyz")
        );
    }

    #[test]
    fn test_drive_relative_path() {
        let mut item = DriveItem {
            id: "1".to_string(),
            name: Some("a.txt".to_string()),
            size: None,
            web_url: None,
            e_tag: None,
            parent_reference: Some(ItemReference {
                drive_id: None,
                id: None,
                path: Some("/drives/d1/root:/A/B".to_string()),
            }),
            file: None,
            folder: None,
            download_url: None,
        };
        assert_eq!(item.drive_relative_path().as_deref(), Some("A/B/a.txt"));

        item.parent_reference.as_mut().unwrap().path = Some("/drives/d1/root:".to_string());
        assert_eq!(item.drive_relative_path().as_deref(), Some("a.txt"));

        item.parent_reference.as_mut().unwrap().path = Some("/drives/d1/items/x".to_string());
        assert_eq!(item.drive_relative_path(), None);

        item.parent_reference = None;
        assert_eq!(item.drive_relative_path(), None);
    }

    #[test]
    fn test_drive_item_display() {
        let item: DriveItem = serde_json::from_str(
            r#"{"id":"f1","name":"Folder","folder":{"childCount":3}}"#,
        )
        .unwrap();
        let display = format!("{}", item);
        assert!(display.contains("f1"));
        assert!(display.contains("folder"));
        assert!(display.contains("Folder"));
    }
}
