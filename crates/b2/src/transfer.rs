//! File content transfer
//!
//! Uploads are hashed before they are sent: a seekable source is read twice
//! (once for the digest, once for the body) and any other source is buffered
//! in memory while it is hashed. Downloads return a [`Download`] whose body is
//! read lazily; its consumers verify the digest of complete downloads.

use std::collections::HashMap;
use std::io::SeekFrom;

use b2_core::{Error, FileDescriptor, FileRange, Result, retry_with_policy};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, RANGE};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::bucket::{Bucket, encode_file_name};
use crate::client::B2Client;
use crate::error::{error_from_response, parse_json, transport_error};
use crate::session::API_PREFIX;

/// Buffer size for hashing passes
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Content type that lets the service pick one from the file name
const AUTO_CONTENT_TYPE: &str = "b2/x-auto";

const INFO_HEADER_PREFIX: &str = "x-bz-info-";

/// Upper bound on the buffer reserved from a reported `Content-Length`
const MAX_PREALLOCATION: usize = 8 << 20;

/// SHA1 and length of a seekable source, leaving it rewound to the start
pub async fn hash_seekable<R>(reader: &mut R) -> Result<(String, u64)>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut len = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        len += n as u64;
    }
    reader.seek(SeekFrom::Start(0)).await?;

    Ok((hex::encode(hasher.finalize()), len))
}

/// Read a source to the end, hashing it on the way
///
/// Returns the buffered content and its SHA1.
pub async fn hash_buffered<R>(reader: &mut R) -> Result<(Vec<u8>, String)>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha1::new();
    let mut content = Vec::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        content.extend_from_slice(&buf[..n]);
    }

    Ok((content, hex::encode(hasher.finalize())))
}

impl Bucket {
    /// Upload from a seekable source such as a file
    ///
    /// The source is hashed first and then streamed as the request body.
    pub async fn upload_file<R>(
        &self,
        name: &str,
        meta: &HashMap<String, String>,
        mut reader: R,
    ) -> Result<FileDescriptor>
    where
        R: AsyncRead + AsyncSeek + Send + Unpin + 'static,
    {
        let (sha1, len) = hash_seekable(&mut reader).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        self.upload_hashed(name, meta, body, &sha1, len).await
    }

    /// Upload from a source that cannot be rewound
    ///
    /// The whole content is held in memory while it is sent.
    pub async fn upload_stream<R>(
        &self,
        name: &str,
        meta: &HashMap<String, String>,
        mut reader: R,
    ) -> Result<FileDescriptor>
    where
        R: AsyncRead + Unpin,
    {
        let (content, sha1) = hash_buffered(&mut reader).await?;
        let len = content.len() as u64;
        self.upload_hashed(name, meta, content, &sha1, len).await
    }

    /// Upload a body whose SHA1 and length are already known
    pub async fn upload_hashed(
        &self,
        name: &str,
        meta: &HashMap<String, String>,
        body: impl Into<reqwest::Body>,
        sha1: &str,
        len: u64,
    ) -> Result<FileDescriptor> {
        let auth = self.upload_endpoint().await?;

        let mut request = self
            .client()
            .http()
            .post(&auth.upload_url)
            .header(AUTHORIZATION, &auth.authorization_token)
            .header(CONTENT_TYPE, AUTO_CONTENT_TYPE)
            .header(CONTENT_LENGTH, len)
            .header("X-Bz-File-Name", urlencoding::encode(name).into_owned())
            .header("X-Bz-Content-Sha1", sha1);
        for (key, value) in meta {
            request = request.header(
                format!("X-Bz-Info-{}", urlencoding::encode(key)),
                urlencoding::encode(value).into_owned(),
            );
        }

        tracing::debug!(name = name, size = len, sha1 = sha1, "Uploading file");

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(e) => {
                self.discard_upload_endpoint(&auth).await;
                return Err(transport_error(e));
            }
        };

        if !response.status().is_success() {
            self.discard_upload_endpoint(&auth).await;
            return Err(error_from_response(response).await);
        }

        let file: FileDescriptor = parse_json(response).await?;
        if !file.content_sha1.eq_ignore_ascii_case(sha1) {
            return Err(Error::Integrity(format!(
                "SHA1 mismatch for {name}: sent {sha1}, service computed {}",
                file.content_sha1
            )));
        }

        tracing::debug!(name = %file.file_name, file_id = %file.file_id, "Uploaded file");
        Ok(file)
    }

    /// Download the latest version of a file by name
    pub async fn download_file_by_name(
        &self,
        name: &str,
        range: Option<FileRange>,
    ) -> Result<Download> {
        let path = format!("/file/{}/{}", self.name(), encode_file_name(name));
        self.client().download(&path, range).await
    }
}

impl B2Client {
    /// GET `path` on the download host
    ///
    /// Retried like API calls, since nothing has been consumed before the
    /// response headers arrive.
    pub(crate) async fn download(&self, path: &str, range: Option<FileRange>) -> Result<Download> {
        retry_with_policy(self.retry_policy(), || self.download_once(path, range)).await
    }

    async fn download_once(&self, path: &str, range: Option<FileRange>) -> Result<Download> {
        let state = self.session().current().await?;
        let url = format!("{}{path}", state.download_url);

        let mut request = self
            .http()
            .get(&url)
            .header(AUTHORIZATION, &state.authorization_token);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        tracing::debug!(url = %url, range = ?range, "Downloading file");
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::PARTIAL_CONTENT {
            let error = error_from_response(response).await;
            self.invalidate_session_after(&state, &error).await;
            return Err(error);
        }

        let mut file = file_from_headers(response.headers());
        if file.content_length == 0 {
            file.content_length = response.content_length().unwrap_or_default();
        }

        Ok(Download {
            file,
            range,
            body: response.bytes_stream().boxed(),
        })
    }

    pub(crate) fn download_by_id_path(file_id: &str) -> String {
        format!(
            "{API_PREFIX}b2_download_file_by_id?fileId={}",
            urlencoding::encode(file_id)
        )
    }
}

/// A download whose headers have arrived and whose body is still unread
pub struct Download {
    file: FileDescriptor,
    range: Option<FileRange>,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("file", &self.file)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl Download {
    /// Metadata reconstructed from the response headers
    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn range(&self) -> Option<FileRange> {
        self.range
    }

    /// Whether the body will be checked against the stored SHA1
    ///
    /// Partial downloads and files stored without a digest are not.
    pub fn is_verifiable(&self) -> bool {
        self.range.is_none()
            && !self.file.content_sha1.is_empty()
            && self.file.content_sha1 != "none"
    }

    /// The body as an unverified reader
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self.body.map_err(std::io::Error::other))
    }

    /// Stream the body into `writer`, verifying complete downloads
    pub async fn write_to<W>(self, writer: &mut W) -> Result<FileDescriptor>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_to_with(writer, |_| {}).await
    }

    /// Like [`Download::write_to`], reporting the size of every chunk
    pub async fn write_to_with<W, P>(self, writer: &mut W, mut progress: P) -> Result<FileDescriptor>
    where
        W: AsyncWrite + Unpin,
        P: FnMut(u64),
    {
        let verify = self.is_verifiable();
        if !verify && self.range.is_none() {
            tracing::debug!(name = %self.file.file_name, "File has no SHA1, skipping verification");
        }

        let Download { file, mut body, .. } = self;
        let mut hasher = Sha1::new();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(transport_error)?;
            if verify {
                hasher.update(&chunk);
            }
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress(chunk.len() as u64);
        }
        writer.flush().await?;

        if verify {
            if written != file.content_length {
                return Err(Error::Integrity(format!(
                    "Length mismatch for {}: expected {} bytes, received {written}",
                    file.file_name, file.content_length
                )));
            }
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(&file.content_sha1) {
                return Err(Error::Integrity(format!(
                    "SHA1 mismatch for {}: expected {}, received {actual}",
                    file.file_name, file.content_sha1
                )));
            }
        }

        Ok(file)
    }

    /// Read the whole body into memory, verifying complete downloads
    pub async fn bytes(self) -> Result<(FileDescriptor, Bytes)> {
        let hint = usize::try_from(self.file.content_length).unwrap_or(usize::MAX);
        let mut content = Vec::with_capacity(hint.min(MAX_PREALLOCATION));
        let file = self.write_to(&mut content).await?;
        Ok((file, Bytes::from(content)))
    }
}

/// Rebuild a file descriptor from download response headers
fn file_from_headers(headers: &HeaderMap) -> FileDescriptor {
    let text = |name: &str| {
        headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    };

    let mut file_info = HashMap::new();
    for (key, value) in headers {
        let Some(raw_key) = key.as_str().strip_prefix(INFO_HEADER_PREFIX) else {
            continue;
        };
        let raw_value = String::from_utf8_lossy(value.as_bytes());
        file_info.insert(unescape(raw_key), unescape(&raw_value));
    }

    FileDescriptor {
        file_id: text("x-bz-file-id"),
        file_name: unescape(&text("x-bz-file-name")),
        content_sha1: text("x-bz-content-sha1"),
        content_type: text(CONTENT_TYPE.as_str()),
        content_length: text(CONTENT_LENGTH.as_str()).parse().unwrap_or_default(),
        upload_timestamp: text("x-bz-upload-timestamp").parse().unwrap_or_default(),
        file_info,
        ..Default::default()
    }
}

/// Decode a URL-escaped header value, keeping it raw if it does not decode
fn unescape(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::warn!(value = raw, error = %e, "Failed to decode header value, keeping it raw");
            raw.to_string()
        }
    }
}
