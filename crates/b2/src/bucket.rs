//! Bucket handle
//!
//! A [`Bucket`] carries the bucket's metadata and the upload endpoint that
//! its uploads share. The endpoint is fetched lazily and discarded whenever
//! an upload through it fails.

use b2_core::{BucketInfo, BucketType, Error, FileDescriptor, Result};
use tokio::sync::Mutex;

use crate::client::B2Client;
use crate::wire::{
    BucketRequest, DeleteBucketRequest, FileVersionRequest, GetUploadUrlResponse, HideFileRequest,
    UpdateBucketRequest,
};

/// Upload URL and its token, as returned by `b2_get_upload_url`
#[derive(Clone, PartialEq, Eq)]
pub struct UploadAuthorization {
    pub upload_url: String,
    pub authorization_token: String,
}

impl std::fmt::Debug for UploadAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadAuthorization")
            .field("upload_url", &self.upload_url)
            .finish_non_exhaustive()
    }
}

/// Handle on one bucket of the account
pub struct Bucket {
    info: BucketInfo,
    client: B2Client,
    upload_auth: Mutex<Option<UploadAuthorization>>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket").field("info", &self.info).finish()
    }
}

impl Bucket {
    pub(crate) fn new(client: B2Client, info: BucketInfo) -> Self {
        Self {
            info,
            client,
            upload_auth: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.bucket_id
    }

    pub fn name(&self) -> &str {
        &self.info.bucket_name
    }

    pub fn bucket_type(&self) -> BucketType {
        self.info.bucket_type
    }

    pub fn info(&self) -> &BucketInfo {
        &self.info
    }

    pub fn client(&self) -> &B2Client {
        &self.client
    }

    /// The bucket's upload endpoint, fetched on first use
    ///
    /// Concurrent uploads wait for a single fetch and then share the result.
    pub async fn upload_endpoint(&self) -> Result<UploadAuthorization> {
        let mut slot = self.upload_auth.lock().await;
        if let Some(auth) = slot.as_ref() {
            return Ok(auth.clone());
        }

        let response: GetUploadUrlResponse = self
            .client
            .call(
                "b2_get_upload_url",
                &BucketRequest {
                    bucket_id: self.id(),
                },
            )
            .await?;
        tracing::debug!(
            bucket_id = %response.bucket_id,
            upload_url = %response.upload_url,
            "Obtained upload URL"
        );

        let auth = UploadAuthorization {
            upload_url: response.upload_url,
            authorization_token: response.authorization_token,
        };
        *slot = Some(auth.clone());
        Ok(auth)
    }

    /// Forget the upload endpoint; the next upload fetches a new one
    pub async fn invalidate_upload_endpoint(&self) {
        *self.upload_auth.lock().await = None;
    }

    /// Forget the upload endpoint if it is still `used`
    pub(crate) async fn discard_upload_endpoint(&self, used: &UploadAuthorization) {
        let mut slot = self.upload_auth.lock().await;
        if slot.as_ref() == Some(used) {
            tracing::debug!(upload_url = %used.upload_url, "Discarding upload URL");
            *slot = None;
        }
    }

    /// Change the bucket's visibility
    pub async fn update(&mut self, bucket_type: BucketType) -> Result<()> {
        let info: BucketInfo = self
            .client
            .call(
                "b2_update_bucket",
                &UpdateBucketRequest {
                    account_id: &self.info.account_id,
                    bucket_id: &self.info.bucket_id,
                    bucket_type,
                },
            )
            .await?;
        self.info = info;
        Ok(())
    }

    /// Delete the bucket; it must be empty
    pub async fn delete(self) -> Result<()> {
        let _: BucketInfo = self
            .client
            .call(
                "b2_delete_bucket",
                &DeleteBucketRequest {
                    account_id: &self.info.account_id,
                    bucket_id: &self.info.bucket_id,
                },
            )
            .await?;
        tracing::info!(bucket = %self.info.bucket_name, "Deleted bucket");
        Ok(())
    }

    /// Public download URL of a file in this bucket
    ///
    /// Only meaningful for `allPublic` buckets.
    pub async fn file_url(&self, name: &str) -> Result<String> {
        let download_url = self.client.session().download_url().await?;
        Ok(Self::download_by_name_url(&download_url, self.name(), name))
    }

    /// Delete one version of a file
    pub async fn delete_file_version(&self, name: &str, file_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .client
            .call(
                "b2_delete_file_version",
                &FileVersionRequest {
                    file_name: name,
                    file_id,
                },
            )
            .await
            .map_err(|e| match e {
                Error::Service(se) if se.code == "file_not_present" => {
                    Error::NotFound(format!("File not found: {name}"))
                }
                e => e,
            })?;
        tracing::debug!(name = name, file_id = file_id, "Deleted file version");
        Ok(())
    }

    /// Hide a file so that it no longer appears in name listings
    pub async fn hide_file(&self, name: &str) -> Result<FileDescriptor> {
        self.client
            .call(
                "b2_hide_file",
                &HideFileRequest {
                    bucket_id: self.id(),
                    file_name: name,
                },
            )
            .await
    }

    /// URL of a file in this bucket on the download host
    pub(crate) fn download_by_name_url(download_url: &str, bucket: &str, name: &str) -> String {
        format!("{download_url}/file/{bucket}/{}", encode_file_name(name))
    }
}

/// Percent-encode a file name for a URL path, keeping `/` separators
pub(crate) fn encode_file_name(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
