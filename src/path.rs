//! Site-relative URL parsing and drive path helpers.
//!
//! A site-relative URL has the form `/{site_path}/{library}/{item_path}`,
//! e.g. `/sites/Finance/Documents/invoices/2025/inv_123.pdf`.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{DriveError, Result};

/// Characters escaped inside one path segment of a request URL.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Split a site-relative URL into `(library_name, item_path)`.
///
/// Fails with [`DriveError::Path`] when the URL does not start with `/`, does
/// not live under `site_path`, or has no item path after the library name.
///
/// # Examples
///
/// ```
/// use sp_drive::path::parse_site_relative_url;
///
/// let (library, item) =
///     parse_site_relative_url("/sites/Finance", "/sites/Finance/Documents/a/b.pdf").unwrap();
/// assert_eq!(library, "Documents");
/// assert_eq!(item, "a/b.pdf");
/// ```
pub fn parse_site_relative_url(site_path: &str, url: &str) -> Result<(String, String)> {
    let url = url.trim();
    if !url.starts_with('/') {
        return Err(DriveError::Path(format!(
            "Expected site relative URL to start with '/', got '{}'",
            url
        )));
    }

    let prefix = format!("/{}/", trim_site_path(site_path));
    let remainder = url.strip_prefix(&prefix).ok_or_else(|| {
        DriveError::Path(format!(
            "URL '{}' does not belong to site '{}'",
            url, site_path
        ))
    })?;

    match remainder.split_once('/') {
        Some((library, item_path)) if !library.is_empty() && !item_path.is_empty() => {
            Ok((library.to_string(), item_path.to_string()))
        }
        _ => Err(DriveError::Path(format!(
            "Cannot parse library + path from URL '{}'",
            url
        ))),
    }
}

/// Build `/{site_path}/{library}/{item_path}`. Purely textual.
pub fn build_site_relative_url(site_path: &str, library: &str, item_path: &str) -> String {
    format!(
        "/{}/{}/{}",
        trim_site_path(site_path),
        library,
        item_path.trim_matches('/')
    )
}

/// Normalize a folder path: unify separators, drop empty and `.` segments.
///
/// `"/a//b\\c/"` becomes `"a/b/c"`; an empty or root-only path becomes `""`.
pub fn normalize_folder_path(path: &str) -> String {
    path.split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a normalized folder and a file name into a drive item path.
pub fn join_item_path(folder: &str, file_name: &str) -> String {
    if folder.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", folder, file_name)
    }
}

/// Parent of a drive path (`"a/b/c"` → `"a/b"`, `"a"` → `""`).
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// Percent-encode each segment of a drive path for use in a request URL.
pub fn encode_drive_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Ensure a leading `/` and no trailing `/` (`"sites/x/"` → `"/sites/x"`).
pub fn normalize_site_path(site_path: &str) -> String {
    format!("/{}", trim_site_path(site_path))
}

fn trim_site_path(site_path: &str) -> &str {
    site_path.trim().trim_matches('/')
}
