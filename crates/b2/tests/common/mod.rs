//! In-process fake of the B2 service for integration tests
//!
//! One catch-all [`wiremock`] responder routes on method and path and keeps
//! the buckets, file versions and issued tokens in memory. Failure hooks let
//! tests expire tokens, fail uploads and corrupt downloads.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use b2_core::{BucketInfo, BucketType, Config, FileAction, FileDescriptor};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ACCOUNT_ID: &str = "test-account";
pub const APP_KEY: &str = "test-key";

/// `Basic base64("test-account:test-key")`
const BASIC_AUTH: &str = "Basic dGVzdC1hY2NvdW50OnRlc3Qta2V5";

#[derive(Default)]
struct StoredFile {
    file: FileDescriptor,
    content: Vec<u8>,
}

#[derive(Default)]
struct State {
    counter: u64,
    valid_tokens: HashSet<String>,
    expired_tokens: HashSet<String>,
    upload_tokens: HashMap<String, String>,
    buckets: Vec<BucketInfo>,
    files: Vec<StoredFile>,
    fail_next_upload: bool,
    unreachable_upload_url: bool,
    corrupt_upload_sha1: bool,
    corrupt_downloads: bool,
    authorize_calls: usize,
    upload_url_calls: usize,
    upload_calls: usize,
}

impl State {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

/// Handle on the fake service; clones share state
#[derive(Clone)]
pub struct FakeB2 {
    base_url: String,
    state: Arc<Mutex<State>>,
}

impl FakeB2 {
    /// Start a server and mount the fake on it
    pub async fn start() -> (MockServer, FakeB2) {
        let server = MockServer::start().await;
        let fake = FakeB2 {
            base_url: server.uri(),
            state: Arc::default(),
        };
        Mock::given(any())
            .respond_with(fake.clone())
            .mount(&server)
            .await;
        (server, fake)
    }

    /// Client configuration pointing at this server
    pub fn config(&self) -> Config {
        Config {
            account_id: Some(ACCOUNT_ID.to_string()),
            application_key: Some(APP_KEY.to_string()),
            api_host: self.base_url.clone(),
            ..Default::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every issued account token report `expired_auth_token`
    pub fn expire_tokens(&self) {
        let mut state = self.state();
        let expired: Vec<String> = state.valid_tokens.drain().collect();
        state.expired_tokens.extend(expired);
    }

    /// Answer the next upload with 503 and revoke its upload token
    pub fn fail_next_upload(&self) {
        self.state().fail_next_upload = true;
    }

    /// Hand out an upload URL nothing listens on, once
    pub fn unreachable_upload_url(&self) {
        self.state().unreachable_upload_url = true;
    }

    /// Store uploads but report a wrong SHA1 for them
    pub fn corrupt_upload_sha1(&self, corrupt: bool) {
        self.state().corrupt_upload_sha1 = corrupt;
    }

    /// Report a wrong SHA1 on every download
    pub fn corrupt_downloads(&self, corrupt: bool) {
        self.state().corrupt_downloads = corrupt;
    }

    pub fn authorize_calls(&self) -> usize {
        self.state().authorize_calls
    }

    pub fn upload_url_calls(&self) -> usize {
        self.state().upload_url_calls
    }

    pub fn upload_calls(&self) -> usize {
        self.state().upload_calls
    }

    /// Number of stored versions, hide markers included
    pub fn version_count(&self) -> usize {
        self.state().files.len()
    }

    fn handle(&self, request: &Request) -> ResponseTemplate {
        let path = request.url.path().to_string();
        let method = request.method.as_str();

        if method == "GET" && path == "/b2api/v1/b2_authorize_account" {
            return self.authorize(request);
        }
        if method == "POST" {
            if let Some(bucket_id) = path.strip_prefix("/upload/") {
                return self.upload(bucket_id, request);
            }
            if let Some(api) = path.strip_prefix("/b2api/v1/") {
                if let Err(response) = self.check_token(request) {
                    return response;
                }
                let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
                return self.api(api, &body);
            }
        }
        if method == "GET" {
            if let Err(response) = self.check_token(request) {
                return response;
            }
            let range = header(request, "range").and_then(|r| parse_range(&r));
            if path == "/b2api/v1/b2_download_file_by_id" {
                let id = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "fileId")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default();
                return self.download(|f| f.file_id == id, range);
            }
            if let Some(rest) = path.strip_prefix("/file/") {
                let (bucket, name) = rest.split_once('/').unwrap_or((rest, ""));
                let name = urlencoding::decode(name)
                    .map(|n| n.into_owned())
                    .unwrap_or_default();
                let Some(bucket_id) = self.bucket_id_by_name(bucket) else {
                    return error(404, "not_found", "bucket not found");
                };
                return self.download_latest(&bucket_id, &name, range);
            }
        }

        error(400, "bad_request", "unknown endpoint")
    }

    fn authorize(&self, request: &Request) -> ResponseTemplate {
        if header(request, "authorization").as_deref() != Some(BASIC_AUTH) {
            return error(401, "unauthorized", "invalid account id or application key");
        }
        let mut state = self.state();
        state.authorize_calls += 1;
        let token = format!("token-{}", state.next());
        state.valid_tokens.insert(token.clone());
        ResponseTemplate::new(200).set_body_json(json!({
            "accountId": ACCOUNT_ID,
            "apiUrl": self.base_url,
            "authorizationToken": token,
            "downloadUrl": self.base_url,
            "minimumPartSize": 100_000_000,
        }))
    }

    fn check_token(&self, request: &Request) -> Result<(), ResponseTemplate> {
        let token = header(request, "authorization").unwrap_or_default();
        let state = self.state();
        if state.valid_tokens.contains(&token) {
            Ok(())
        } else if state.expired_tokens.contains(&token) {
            Err(error(401, "expired_auth_token", "Authorization token has expired"))
        } else {
            Err(error(401, "bad_auth_token", "Invalid authorization token"))
        }
    }

    fn bucket_id_by_name(&self, name: &str) -> Option<String> {
        self.state()
            .buckets
            .iter()
            .find(|b| b.bucket_name == name)
            .map(|b| b.bucket_id.clone())
    }

    fn api(&self, api: &str, body: &Value) -> ResponseTemplate {
        let text = |key: &str| body[key].as_str().unwrap_or_default().to_string();
        let mut state = self.state();

        match api {
            "b2_list_buckets" => {
                ResponseTemplate::new(200).set_body_json(json!({ "buckets": state.buckets }))
            }
            "b2_create_bucket" => {
                let name = text("bucketName");
                if state.buckets.iter().any(|b| b.bucket_name == name) {
                    return error(400, "duplicate_bucket_name", "Bucket name is already in use.");
                }
                let Ok(bucket_type) = text("bucketType").parse::<BucketType>() else {
                    return error(400, "bad_request", "invalid bucketType");
                };
                let info = BucketInfo {
                    account_id: ACCOUNT_ID.to_string(),
                    bucket_id: format!("bucket-{}", state.next()),
                    bucket_name: name,
                    bucket_type,
                    revision: 1,
                };
                state.buckets.push(info.clone());
                ResponseTemplate::new(200).set_body_json(&info)
            }
            "b2_update_bucket" => {
                let id = text("bucketId");
                let Ok(bucket_type) = text("bucketType").parse::<BucketType>() else {
                    return error(400, "bad_request", "invalid bucketType");
                };
                match state.buckets.iter_mut().find(|b| b.bucket_id == id) {
                    Some(bucket) => {
                        bucket.bucket_type = bucket_type;
                        bucket.revision += 1;
                        ResponseTemplate::new(200).set_body_json(&*bucket)
                    }
                    None => error(400, "bad_request", "bucket not found"),
                }
            }
            "b2_delete_bucket" => {
                let id = text("bucketId");
                if state.files.iter().any(|f| f.file.bucket_id == id) {
                    return error(400, "cannot_delete_non_empty_bucket", "Bucket is not empty");
                }
                let pos = state.buckets.iter().position(|b| b.bucket_id == id);
                match pos {
                    Some(pos) => ResponseTemplate::new(200).set_body_json(state.buckets.remove(pos)),
                    None => error(400, "bad_request", "bucket not found"),
                }
            }
            "b2_get_upload_url" => {
                let id = text("bucketId");
                state.upload_url_calls += 1;
                let token = format!("upload-token-{}", state.next());
                state.upload_tokens.insert(token.clone(), id.clone());
                let base = if std::mem::take(&mut state.unreachable_upload_url) {
                    "http://127.0.0.1:1"
                } else {
                    self.base_url.as_str()
                };
                ResponseTemplate::new(200).set_body_json(json!({
                    "bucketId": id,
                    "uploadUrl": format!("{base}/upload/{id}"),
                    "authorizationToken": token,
                }))
            }
            "b2_list_file_names" => {
                let bucket_id = text("bucketId");
                let start = text("startFileName");
                let prefix = text("prefix");
                let delimiter = text("delimiter");
                let max = body["maxFileCount"].as_u64().unwrap_or(100) as usize;

                let mut names: Vec<FileDescriptor> = latest_versions(&state.files, &bucket_id)
                    .into_iter()
                    .filter(|f| f.action == FileAction::Upload)
                    .filter(|f| f.file_name.starts_with(&prefix))
                    .map(|f| {
                        let rest = &f.file_name[prefix.len()..];
                        match rest.find(delimiter.as_str()) {
                            Some(pos) if !delimiter.is_empty() => FileDescriptor {
                                file_name: format!(
                                    "{prefix}{}",
                                    &rest[..pos + delimiter.len()]
                                ),
                                action: FileAction::Folder,
                                ..Default::default()
                            },
                            _ => f,
                        }
                    })
                    .filter(|f| f.file_name >= start)
                    .collect();
                names.dedup_by(|a, b| a.file_name == b.file_name);

                let next = names.get(max).map(|f| f.file_name.clone());
                names.truncate(max);
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "files": names, "nextFileName": next }))
            }
            "b2_list_file_versions" => {
                let bucket_id = text("bucketId");
                let start = text("startFileName");
                let start_id = text("startFileId");
                let max = body["maxFileCount"].as_u64().unwrap_or(100) as usize;

                let versions = sorted_versions(&state.files, &bucket_id);
                let from = versions
                    .iter()
                    .position(|f| {
                        f.file_name > start
                            || (f.file_name == start
                                && (start_id.is_empty() || f.file_id == start_id))
                    })
                    .unwrap_or(versions.len());
                let page: Vec<&FileDescriptor> = versions[from..].iter().take(max).collect();
                let next = versions.get(from + max);
                ResponseTemplate::new(200).set_body_json(json!({
                    "files": page,
                    "nextFileName": next.map(|f| &f.file_name),
                    "nextFileId": next.map(|f| &f.file_id),
                }))
            }
            "b2_get_file_info" => {
                let id = text("fileId");
                match state.files.iter().find(|f| f.file.file_id == id) {
                    Some(stored) => ResponseTemplate::new(200).set_body_json(&stored.file),
                    None => error(404, "not_found", &format!("File not present: {id}")),
                }
            }
            "b2_delete_file_version" => {
                let id = text("fileId");
                let name = text("fileName");
                let pos = state
                    .files
                    .iter()
                    .position(|f| f.file.file_id == id && f.file.file_name == name);
                match pos {
                    Some(pos) => {
                        state.files.remove(pos);
                        ResponseTemplate::new(200)
                            .set_body_json(json!({ "fileId": id, "fileName": name }))
                    }
                    None => error(400, "file_not_present", &format!("File not present: {name} {id}")),
                }
            }
            "b2_hide_file" => {
                let bucket_id = text("bucketId");
                let name = text("fileName");
                if !state
                    .files
                    .iter()
                    .any(|f| f.file.bucket_id == bucket_id && f.file.file_name == name)
                {
                    return error(400, "no_such_file", &format!("File not present: {name}"));
                }
                let n = state.next();
                let file = FileDescriptor {
                    file_id: format!("file-{n}"),
                    file_name: name,
                    account_id: ACCOUNT_ID.to_string(),
                    bucket_id,
                    action: FileAction::Hide,
                    upload_timestamp: 1_600_000_000_000 + n as i64,
                    ..Default::default()
                };
                state.files.push(StoredFile {
                    file: file.clone(),
                    content: Vec::new(),
                });
                ResponseTemplate::new(200).set_body_json(&file)
            }
            _ => error(400, "bad_request", &format!("unknown method {api}")),
        }
    }

    fn upload(&self, bucket_id: &str, request: &Request) -> ResponseTemplate {
        let token = header(request, "authorization").unwrap_or_default();
        let mut state = self.state();
        state.upload_calls += 1;

        if state.upload_tokens.get(&token).map(String::as_str) != Some(bucket_id) {
            return error(401, "bad_auth_token", "Invalid upload token");
        }
        if std::mem::take(&mut state.fail_next_upload) {
            state.upload_tokens.remove(&token);
            return error(503, "service_unavailable", "c001_v0001000_t0000 is too busy");
        }

        let sha1 = hex::encode(Sha1::digest(&request.body));
        if header(request, "x-bz-content-sha1").as_deref() != Some(sha1.as_str()) {
            return error(400, "bad_request", "Sha1 did not match data received");
        }
        let Some(name) = header(request, "x-bz-file-name")
            .and_then(|n| urlencoding::decode(&n).ok().map(|n| n.into_owned()))
        else {
            return error(400, "bad_request", "missing X-Bz-File-Name");
        };

        let file_info = request
            .headers
            .iter()
            .filter_map(|(k, v)| {
                let key = k.as_str().strip_prefix("x-bz-info-")?;
                let value = urlencoding::decode(v.to_str().ok()?).ok()?.into_owned();
                Some((key.to_string(), value))
            })
            .collect();

        let n = state.next();
        let file = FileDescriptor {
            file_id: format!("file-{n}"),
            file_name: name,
            account_id: ACCOUNT_ID.to_string(),
            bucket_id: bucket_id.to_string(),
            content_length: request.body.len() as u64,
            content_sha1: sha1,
            content_type: "application/octet-stream".to_string(),
            file_info,
            action: FileAction::Upload,
            upload_timestamp: 1_600_000_000_000 + n as i64,
        };
        state.files.push(StoredFile {
            file: file.clone(),
            content: request.body.clone(),
        });
        if state.corrupt_upload_sha1 {
            return ResponseTemplate::new(200).set_body_json(FileDescriptor {
                content_sha1: "0".repeat(40),
                ..file
            });
        }
        ResponseTemplate::new(200).set_body_json(&file)
    }

    fn download_latest(
        &self,
        bucket_id: &str,
        name: &str,
        range: Option<(usize, usize)>,
    ) -> ResponseTemplate {
        let latest = latest_versions(&self.state().files, bucket_id)
            .into_iter()
            .find(|f| f.file_name == name);
        match latest {
            Some(f) if f.action == FileAction::Upload => {
                self.download(|stored| stored.file_id == f.file_id, range)
            }
            _ => error(404, "not_found", &format!("File with such name does not exist: {name}")),
        }
    }

    fn download(
        &self,
        pick: impl Fn(&FileDescriptor) -> bool,
        range: Option<(usize, usize)>,
    ) -> ResponseTemplate {
        let state = self.state();
        let Some(stored) = state.files.iter().find(|f| pick(&f.file)) else {
            return error(404, "not_found", "file not found");
        };
        let file = &stored.file;

        let (status, content) = match range {
            Some((start, end)) => {
                let end = end.min(stored.content.len().saturating_sub(1));
                if start > end {
                    return error(416, "range_not_satisfiable", "bad range");
                }
                (206, stored.content[start..=end].to_vec())
            }
            None => (200, stored.content.clone()),
        };
        let sha1 = if state.corrupt_downloads {
            "0000000000000000000000000000000000000000".to_string()
        } else {
            file.content_sha1.clone()
        };

        let mut response = ResponseTemplate::new(status)
            .insert_header("x-bz-file-id", file.file_id.as_str())
            .insert_header(
                "x-bz-file-name",
                urlencoding::encode(&file.file_name).into_owned(),
            )
            .insert_header("x-bz-content-sha1", sha1)
            .insert_header("x-bz-upload-timestamp", file.upload_timestamp.to_string())
            .insert_header("content-type", file.content_type.as_str());
        for (key, value) in &file.file_info {
            response = response.insert_header(
                format!("x-bz-info-{key}").as_str(),
                urlencoding::encode(value).into_owned(),
            );
        }
        response.set_body_bytes(content)
    }
}

impl Respond for FakeB2 {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.handle(request)
    }
}

fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

fn error(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "status": status,
        "code": code,
        "message": message,
    }))
}

/// Versions ordered by name, newest first within a name
fn sorted_versions(files: &[StoredFile], bucket_id: &str) -> Vec<FileDescriptor> {
    let mut versions: Vec<FileDescriptor> = files
        .iter()
        .filter(|f| f.file.bucket_id == bucket_id)
        .map(|f| f.file.clone())
        .collect();
    versions.sort_by(|a, b| {
        a.file_name
            .cmp(&b.file_name)
            .then(b.upload_timestamp.cmp(&a.upload_timestamp))
    });
    versions
}

/// Newest version of every name
fn latest_versions(files: &[StoredFile], bucket_id: &str) -> Vec<FileDescriptor> {
    let mut versions = sorted_versions(files, bucket_id);
    versions.dedup_by(|a, b| a.file_name == b.file_name);
    versions
}

/// Deterministic test content of `len` bytes
pub fn content(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}
