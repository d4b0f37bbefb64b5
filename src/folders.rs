//! Idempotent creation of nested folder chains inside a drive.

use serde_json::json;
use tracing::{debug, warn};

use crate::error::{translate, Result};
use crate::path::{encode_drive_path, normalize_folder_path, parent_path};
use crate::transport::{GraphRequest, GraphTransport};

/// Ensure every segment of `folder_path` exists in `drive_id`.
///
/// Walks the path left to right. Each prefix is looked up with a GET; a 404
/// creates exactly that segment under its parent with
/// `conflictBehavior: fail`. A 409 on create means another writer got there
/// first and counts as success. Any other failure stops the walk.
///
/// Returns the normalized path (`""` for an empty input, with no requests).
pub async fn ensure_folder_path(
    transport: &dyn GraphTransport,
    drive_id: &str,
    folder_path: &str,
    token: Option<&str>,
) -> Result<String> {
    let folder_path = normalize_folder_path(folder_path);
    if folder_path.is_empty() {
        return Ok(folder_path);
    }

    let base = transport.graph_base();
    let mut current = String::new();

    for segment in folder_path.split('/') {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);

        let lookup_url = format!(
            "{}/drives/{}/root:/{}",
            base,
            drive_id,
            encode_drive_path(&current)
        );
        let mut lookup = GraphRequest::get(lookup_url);
        if let Some(token) = token {
            lookup = lookup.token(token);
        }

        match transport.dispatch(lookup).await {
            Ok(_) => continue,
            Err(e) if e.status() == Some(404) => {}
            Err(e) => return Err(translate(format!("folder '{}'", current), e)),
        }

        let parent = parent_path(&current);
        let create_url = if parent.is_empty() {
            format!("{}/drives/{}/root/children", base, drive_id)
        } else {
            format!(
                "{}/drives/{}/root:/{}:/children",
                base,
                drive_id,
                encode_drive_path(parent)
            )
        };
        let body = json!({
            "name": segment,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail",
        });
        let mut create = GraphRequest::post(create_url).json(body).expect(&[201]);
        if let Some(token) = token {
            create = create.token(token);
        }

        match transport.dispatch(create).await {
            Ok(_) => debug!(folder = %current, "created folder"),
            Err(e) if e.status() == Some(409) => {
                warn!(folder = %current, "folder appeared concurrently; treating as created");
            }
            Err(e) => return Err(translate(format!("folder '{}'", current), e)),
        }
    }

    Ok(folder_path)
}
