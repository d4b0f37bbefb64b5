//! In-memory Graph double shared by the integration tests.
//!
//! Models one site with two libraries, a folder tree, stored files,
//! upload sessions and pre-authenticated download links. Status codes are
//! checked against `request.expected` exactly like the real dispatcher, so
//! call sites see the same `Transport` errors.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderValue, LOCATION};
use serde_json::{json, Value};

use sp_drive::transport::RequestBody;
use sp_drive::{
    DriveError, GraphRequest, GraphResponse, GraphTransport, RawResponse, Result, Site, SiteConfig,
};

pub const GRAPH_BASE: &str = "https://graph.test/v1.0";
pub const UPLOAD_HOST: &str = "https://upload.test";
pub const DOWNLOAD_HOST: &str = "https://download.test";
pub const HOSTNAME: &str = "contoso.sharepoint.com";
pub const SITE_PATH: &str = "/sites/Finance";
pub const SITE_ID: &str = "site-1";
pub const DOCS_DRIVE: &str = "drive-docs";
pub const ARCHIVE_DRIVE: &str = "drive-archive";
pub const TOKEN: &str = "fake-token";

/// One request as the double saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub authenticated: bool,
    pub token: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub json: Option<Value>,
    pub stream: bool,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    id: String,
    drive: String,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Session {
    drive: String,
    item_path: String,
    received: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Failure {
    method: String,
    needle: String,
    status: u16,
    once: bool,
}

enum Reply {
    Json(Value),
    Raw(RawResponse),
}

#[derive(Default)]
struct State {
    requests: Vec<Recorded>,
    token_requests: usize,
    folders: HashSet<String>,
    files: HashMap<String, StoredFile>,
    sessions: HashMap<String, Session>,
    racing_folders: HashSet<String>,
    failures: Vec<Failure>,
    withhold_final_item: bool,
    next_id: usize,
}

pub struct FakeGraph {
    state: Mutex<State>,
}

impl FakeGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
        })
    }

    /// Site over this double with the default `Documents` library.
    pub fn site(self: &Arc<Self>) -> Arc<Site> {
        Arc::new(Site::new(
            Arc::clone(self) as Arc<dyn GraphTransport>,
            SiteConfig::new(HOSTNAME, SITE_PATH),
        ))
    }

    pub fn add_folder(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        let mut current = String::new();
        for segment in path.split('/') {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            state.folders.insert(current.clone());
        }
    }

    /// Store a file in the `Documents` library and return its item id.
    pub fn add_file(&self, path: &str, data: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        store_file(&mut state, DOCS_DRIVE, path, data.to_vec())
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.files.get(path).map(|f| f.data.clone())
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.state.lock().unwrap().folders.contains(path)
    }

    /// The lookup for `path` answers 404 but the create answers 409, as if
    /// another writer created it in between.
    pub fn race_on_create(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.racing_folders.insert(path.to_string());
    }

    /// Upload sessions accept every chunk but never return the final item.
    pub fn withhold_final_item(&self) {
        self.state.lock().unwrap().withhold_final_item = true;
    }

    /// Fail the next matching request with `status`.
    pub fn fail_next(&self, method: &str, needle: &str, status: u16) {
        self.push_failure(method, needle, status, true);
    }

    /// Fail every matching request with `status`.
    pub fn fail_always(&self, method: &str, needle: &str, status: u16) {
        self.push_failure(method, needle, status, false);
    }

    fn push_failure(&self, method: &str, needle: &str, status: u16, once: bool) {
        self.state.lock().unwrap().failures.push(Failure {
            method: method.to_string(),
            needle: needle.to_string(),
            status,
            once,
        });
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests whose method matches and whose URL contains `needle`.
    pub fn matching(&self, method: &str, needle: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url.contains(needle))
            .collect()
    }

    pub fn count(&self, method: &str, needle: &str) -> usize {
        self.matching(method, needle).len()
    }

    pub fn token_requests(&self) -> usize {
        self.state.lock().unwrap().token_requests
    }

    fn route(&self, state: &mut State, request: &GraphRequest, body: Option<&Value>) -> (u16, Reply) {
        let method = request.method.as_str();
        let url = request.url.as_str();

        if let Some(index) = state
            .failures
            .iter()
            .position(|f| f.method == method && url.contains(&f.needle))
        {
            let failure = state.failures[index].clone();
            if failure.once {
                state.failures.remove(index);
            }
            return (failure.status, error_body("injected", "injected failure"));
        }

        if let Some(rest) = url.strip_prefix(UPLOAD_HOST) {
            return upload_chunk(state, rest, request);
        }
        if let Some(id) = url.strip_prefix(DOWNLOAD_HOST).map(|r| r.trim_start_matches('/')) {
            return match state.files.values().find(|f| f.id == id) {
                Some(file) => {
                    let mut raw = RawResponse::new(200);
                    raw.body = file.data.clone();
                    (200, Reply::Raw(raw))
                }
                None => (404, error_body("itemNotFound", "link expired")),
            };
        }

        let rest = match url.strip_prefix(GRAPH_BASE) {
            Some(rest) => rest,
            None => return (400, error_body("badHost", url)),
        };
        let path = rest.split_once('?').map(|(p, _)| p).unwrap_or(rest);

        if path == format!("/sites/{}:{}", HOSTNAME, SITE_PATH) && method == "GET" {
            return (200, Reply::Json(json!({"id": SITE_ID, "displayName": "Finance"})));
        }
        if path == format!("/sites/{}/drives", SITE_ID) && method == "GET" {
            return (
                200,
                Reply::Json(json!({"value": [
                    {"id": DOCS_DRIVE, "name": "Documents"},
                    {"id": ARCHIVE_DRIVE, "name": "Archive"}
                ]})),
            );
        }

        let after = match path.strip_prefix("/drives/") {
            Some(after) => after,
            None => return (400, error_body("noRoute", url)),
        };
        let (drive, tail) = match after.split_once('/') {
            Some(parts) => parts,
            None => return (400, error_body("noRoute", url)),
        };

        if tail == "root/children" && method == "POST" {
            return create_folder(state, "", body);
        }

        if let Some(inner) = tail.strip_prefix("root:/") {
            if let Some(parent) = inner.strip_suffix(":/children") {
                return create_folder(state, &decode(parent), body);
            }
            if let Some(item_path) = inner.strip_suffix(":/content") {
                if method == "PUT" {
                    let data = match &request.body {
                        RequestBody::Bytes(data) => data.clone(),
                        _ => Vec::new(),
                    };
                    let item_path = decode(item_path);
                    store_file(state, drive, &item_path, data);
                    return (201, Reply::Json(file_json(state, &item_path)));
                }
            }
            if let Some(item_path) = inner.strip_suffix(":/createUploadSession") {
                if method == "POST" {
                    state.next_id += 1;
                    let upload_url = format!("{}/session/{}", UPLOAD_HOST, state.next_id);
                    state.sessions.insert(
                        upload_url.clone(),
                        Session {
                            drive: drive.to_string(),
                            item_path: decode(item_path),
                            received: Vec::new(),
                        },
                    );
                    return (
                        200,
                        Reply::Json(json!({
                            "uploadUrl": upload_url,
                            "expirationDateTime": "2030-01-01T00:00:00Z",
                            "nextExpectedRanges": ["0-"]
                        })),
                    );
                }
            }
            if method == "GET" {
                let item_path = decode(inner);
                if state.racing_folders.contains(&item_path) {
                    return (404, error_body("itemNotFound", "not yet"));
                }
                if state.folders.contains(&item_path) {
                    return (200, Reply::Json(folder_json(drive, &item_path)));
                }
                if state.files.contains_key(&item_path) {
                    return (200, Reply::Json(file_json(state, &item_path)));
                }
                return (404, error_body("itemNotFound", "The resource could not be found."));
            }
        }

        if let Some(item_rest) = tail.strip_prefix("items/") {
            let (id, suffix) = item_rest.split_once('/').unwrap_or((item_rest, ""));
            let path = state
                .files
                .iter()
                .find(|(_, f)| f.id == id)
                .map(|(p, _)| p.clone());
            let path = match path {
                Some(path) => path,
                None => return (404, error_body("itemNotFound", "The resource could not be found.")),
            };

            return match (method, suffix) {
                ("GET", "content") => {
                    let mut raw = RawResponse::new(302);
                    raw.headers.insert(
                        LOCATION,
                        HeaderValue::from_str(&format!("{}/{}", DOWNLOAD_HOST, id)).unwrap(),
                    );
                    (302, Reply::Raw(raw))
                }
                ("DELETE", "") => {
                    state.files.remove(&path);
                    (204, Reply::Raw(RawResponse::new(204)))
                }
                ("PATCH", "listItem/fields") => {
                    (200, Reply::Json(body.cloned().unwrap_or_else(|| json!({}))))
                }
                ("POST", "preview") => (
                    200,
                    Reply::Json(json!({"getUrl": format!("https://preview.test/{}", id)})),
                ),
                _ => (400, error_body("noRoute", url)),
            };
        }

        (400, error_body("noRoute", url))
    }
}

#[async_trait]
impl GraphTransport for FakeGraph {
    fn graph_base(&self) -> &str {
        GRAPH_BASE
    }

    async fn acquire_token(&self) -> Result<String> {
        self.state.lock().unwrap().token_requests += 1;
        Ok(TOKEN.to_string())
    }

    async fn dispatch(&self, request: GraphRequest) -> Result<GraphResponse> {
        let mut state = self.state.lock().unwrap();

        let (body_bytes, body_json) = match &request.body {
            RequestBody::Empty => (Vec::new(), None),
            RequestBody::Json(value) => (serde_json::to_vec(value).unwrap(), Some(value.clone())),
            RequestBody::Bytes(data) => (data.clone(), None),
        };
        state.requests.push(Recorded {
            method: request.method.to_string(),
            url: request.url.clone(),
            authenticated: request.authenticated,
            token: request.token.clone(),
            headers: request.headers.clone(),
            body: body_bytes,
            json: body_json.clone(),
            stream: request.stream,
        });

        let (status, reply) = self.route(&mut state, &request, body_json.as_ref());

        if !request.expected.contains(&status) {
            let body = match reply {
                Reply::Json(value) => value.to_string(),
                Reply::Raw(raw) => raw.text(),
            };
            return Err(DriveError::Transport {
                method: request.method.to_string(),
                url: request.url,
                status,
                body,
            });
        }

        Ok(match reply {
            Reply::Json(body) => GraphResponse::Json { status, body },
            Reply::Raw(raw) => GraphResponse::Raw(raw),
        })
    }
}

fn decode(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

fn error_body(code: &str, message: &str) -> Reply {
    Reply::Json(json!({"error": {"code": code, "message": message}}))
}

fn store_file(state: &mut State, drive: &str, path: &str, data: Vec<u8>) -> String {
    let id = match state.files.get(path) {
        Some(existing) => existing.id.clone(),
        None => {
            state.next_id += 1;
            format!("item-{}", state.next_id)
        }
    };
    state.files.insert(
        path.to_string(),
        StoredFile {
            id: id.clone(),
            drive: drive.to_string(),
            data,
        },
    );
    id
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

fn parent_reference(drive: &str, parent: &str) -> Value {
    let path = if parent.is_empty() {
        format!("/drives/{}/root:", drive)
    } else {
        format!("/drives/{}/root:/{}", drive, parent)
    };
    json!({"driveId": drive, "path": path})
}

fn file_json(state: &State, path: &str) -> Value {
    let file = &state.files[path];
    let (parent, name) = split_path(path);
    json!({
        "id": file.id,
        "name": name,
        "size": file.data.len(),
        "file": {"mimeType": "application/octet-stream"},
        "parentReference": parent_reference(&file.drive, parent),
    })
}

fn folder_json(drive: &str, path: &str) -> Value {
    let (parent, name) = split_path(path);
    json!({
        "id": format!("folder-{}", path),
        "name": name,
        "folder": {"childCount": 0},
        "parentReference": parent_reference(drive, parent),
    })
}

fn create_folder(state: &mut State, parent: &str, body: Option<&Value>) -> (u16, Reply) {
    let name = match body.and_then(|b| b.get("name")).and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => return (400, error_body("invalidRequest", "missing name")),
    };
    let full = if parent.is_empty() {
        name
    } else {
        format!("{}/{}", parent, name)
    };

    if state.racing_folders.remove(&full) {
        state.folders.insert(full);
        return (409, error_body("nameAlreadyExists", "An item with the same name already exists."));
    }
    if !parent.is_empty() && !state.folders.contains(parent) {
        return (404, error_body("itemNotFound", "parent missing"));
    }
    if !state.folders.insert(full.clone()) {
        return (409, error_body("nameAlreadyExists", "An item with the same name already exists."));
    }
    (201, Reply::Json(folder_json(DOCS_DRIVE, &full)))
}

fn upload_chunk(state: &mut State, rest: &str, request: &GraphRequest) -> (u16, Reply) {
    let upload_url = format!("{}{}", UPLOAD_HOST, rest);
    let range = match request.header_value("Content-Range") {
        Some(range) => range.to_string(),
        None => return (400, error_body("invalidRange", "missing Content-Range")),
    };
    let (start, total) = match parse_content_range(&range) {
        Some(parsed) => parsed,
        None => return (400, error_body("invalidRange", &range)),
    };
    let data = match &request.body {
        RequestBody::Bytes(data) => data.clone(),
        _ => Vec::new(),
    };

    let withhold = state.withhold_final_item;
    let session = match state.sessions.get_mut(&upload_url) {
        Some(session) => session,
        None => return (404, error_body("itemNotFound", "session expired")),
    };
    if start != session.received.len() as u64 {
        return (416, error_body("invalidRange", "unexpected offset"));
    }
    session.received.extend_from_slice(&data);
    let received = session.received.len() as u64;

    if received < total || withhold {
        return (
            202,
            Reply::Json(json!({
                "expirationDateTime": "2030-01-01T00:00:00Z",
                "nextExpectedRanges": [format!("{}-", received)]
            })),
        );
    }

    let session = match state.sessions.remove(&upload_url) {
        Some(session) => session,
        None => return (404, error_body("itemNotFound", "session expired")),
    };
    store_file(state, &session.drive, &session.item_path, session.received);
    (201, Reply::Json(file_json(state, &session.item_path)))
}

fn parse_content_range(value: &str) -> Option<(u64, u64)> {
    let ranges = value.strip_prefix("bytes ")?;
    let (range, total) = ranges.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    Some((start.parse().ok()?, total.parse().ok()?))
}
