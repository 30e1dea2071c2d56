//! Request and response bodies of the B2 JSON API

use b2_core::{BucketInfo, BucketType, FileDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthorizeAccountResponse {
    pub account_id: String,
    pub api_url: String,
    pub authorization_token: String,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountRequest<'a> {
    pub account_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateBucketRequest<'a> {
    pub account_id: &'a str,
    pub bucket_name: &'a str,
    pub bucket_type: BucketType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteBucketRequest<'a> {
    pub account_id: &'a str,
    pub bucket_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateBucketRequest<'a> {
    pub account_id: &'a str,
    pub bucket_id: &'a str,
    pub bucket_type: BucketType,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListBucketsResponse {
    pub buckets: Vec<BucketInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BucketRequest<'a> {
    pub bucket_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetUploadUrlResponse {
    pub bucket_id: String,
    pub upload_url: String,
    pub authorization_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileRequest<'a> {
    pub file_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileVersionRequest<'a> {
    pub file_name: &'a str,
    pub file_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HideFileRequest<'a> {
    pub bucket_id: &'a str,
    pub file_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListFileNamesRequest<'a> {
    pub bucket_id: &'a str,
    pub start_file_name: &'a str,
    pub max_file_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListFileNamesResponse {
    pub files: Vec<FileDescriptor>,
    #[serde(default)]
    pub next_file_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListFileVersionsRequest<'a> {
    pub bucket_id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub start_file_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<&'a str>,
    pub max_file_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListFileVersionsResponse {
    pub files: Vec<FileDescriptor>,
    #[serde(default)]
    pub next_file_name: Option<String>,
    #[serde(default)]
    pub next_file_id: Option<String>,
}
