//! Domain types shared across the client
//!
//! File descriptors are built from three sources (upload responses, listing
//! responses and download headers) and all of them produce [`FileDescriptor`].

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Account credentials used for `b2_authorize_account`
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    account_id: String,
    application_key: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, application_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            application_key: application_key.into(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn application_key(&self) -> &str {
        &self.application_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("application_key", &"<redacted>")
            .finish()
    }
}

/// Bucket visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BucketType {
    /// Anybody can download files
    #[serde(rename = "allPublic")]
    AllPublic,
    /// Downloads require an authorization token
    #[default]
    #[serde(rename = "allPrivate")]
    AllPrivate,
    #[serde(rename = "snapshot")]
    Snapshot,
}

impl std::fmt::Display for BucketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketType::AllPublic => write!(f, "allPublic"),
            BucketType::AllPrivate => write!(f, "allPrivate"),
            BucketType::Snapshot => write!(f, "snapshot"),
        }
    }
}

impl std::str::FromStr for BucketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allPublic" => Ok(BucketType::AllPublic),
            "allPrivate" => Ok(BucketType::AllPrivate),
            "snapshot" => Ok(BucketType::Snapshot),
            _ => Err(format!("Unrecognised bucket type: {s}")),
        }
    }
}

/// Bucket as described by the bucket management calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub account_id: String,
    pub bucket_id: String,
    pub bucket_name: String,
    pub bucket_type: BucketType,
    #[serde(default)]
    pub revision: u64,
}

/// What a file version represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// A stored file
    #[default]
    Upload,
    /// Marker hiding every earlier version
    Hide,
    /// Unfinished large file
    Start,
    /// Virtual directory returned when listing with a delimiter
    Folder,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileAction::Upload => write!(f, "upload"),
            FileAction::Hide => write!(f, "hide"),
            FileAction::Start => write!(f, "start"),
            FileAction::Folder => write!(f, "folder"),
        }
    }
}

/// Metadata of one file version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FileDescriptor {
    #[serde(deserialize_with = "nullable")]
    pub file_id: String,
    #[serde(deserialize_with = "nullable")]
    pub file_name: String,
    #[serde(deserialize_with = "nullable")]
    pub account_id: String,
    #[serde(deserialize_with = "nullable")]
    pub bucket_id: String,
    #[serde(deserialize_with = "nullable")]
    pub content_length: u64,
    #[serde(deserialize_with = "nullable")]
    pub content_sha1: String,
    #[serde(deserialize_with = "nullable")]
    pub content_type: String,
    /// User metadata (`X-Bz-Info-*`)
    #[serde(deserialize_with = "nullable")]
    pub file_info: HashMap<String, String>,
    #[serde(deserialize_with = "nullable")]
    pub action: FileAction,
    /// Milliseconds since the Unix epoch
    #[serde(deserialize_with = "nullable")]
    pub upload_timestamp: i64,
}

impl FileDescriptor {
    /// Upload time, if the service reported one
    pub fn uploaded_at(&self) -> Option<jiff::Timestamp> {
        if self.upload_timestamp == 0 {
            return None;
        }
        jiff::Timestamp::from_millisecond(self.upload_timestamp).ok()
    }
}

/// The API sends `null` for fields that do not apply to an entry
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Where the next listing page starts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListCursor {
    pub file_name: String,
    /// Only used when listing versions
    pub file_id: Option<String>,
}

impl ListCursor {
    pub fn from_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_name.is_empty()
    }
}

/// One page of a file listing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingPage {
    pub files: Vec<FileDescriptor>,
    /// `None` on the final page
    pub next: Option<ListCursor>,
}

impl ListingPage {
    pub fn is_last(&self) -> bool {
        self.next.as_ref().is_none_or(ListCursor::is_empty)
    }
}

/// Inclusive byte range of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRange {
    pub start: u64,
    pub end: u64,
}

impl FileRange {
    pub fn new(start: u64, end: u64) -> Result<Self, String> {
        if end < start {
            return Err(format!("Invalid range: {start}-{end}"));
        }
        Ok(Self { start, end })
    }

    /// Number of bytes covered
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl std::str::FromStr for FileRange {
    type Err = String;

    /// Parses `start-end`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid range: {s} (expected start-end)"))?;
        let start = start
            .trim()
            .parse()
            .map_err(|_| format!("Invalid range start: {start}"))?;
        let end = end
            .trim()
            .parse()
            .map_err(|_| format!("Invalid range end: {end}"))?;
        FileRange::new(start, end)
    }
}
