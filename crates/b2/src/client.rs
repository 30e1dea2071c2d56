//! B2 client implementation
//!
//! [`B2Client`] executes JSON API calls on top of an [`AuthSession`] and the
//! configured retry policy, and exposes the account-level operations
//! (bucket management, lookups by file id).

use std::sync::Arc;
use std::time::Duration;

use b2_core::{
    BucketInfo, BucketType, Config, Error, FileDescriptor, FileRange, Result, RetryPolicy,
    retry_with_policy,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bucket::Bucket;
use crate::error::{error_from_response, parse_json, transport_error};
use crate::session::{API_PREFIX, AuthSession, SessionState};
use crate::transfer::Download;
use crate::wire::{AccountRequest, CreateBucketRequest, FileRequest, ListBucketsResponse};

/// B2 API client
///
/// Cloning is cheap; clones share the session and the HTTP transport.
#[derive(Clone)]
pub struct B2Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    session: AuthSession,
    retry: Arc<dyn RetryPolicy>,
}

impl B2Client {
    /// Create a client from configuration
    ///
    /// No request is made until the first call; use [`B2Client::authorize`]
    /// to validate the credentials up front.
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "b2-cli/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Self::with_http(config, http)
    }

    /// Create a client sharing an existing HTTP transport
    pub fn with_http(config: &Config, http: reqwest::Client) -> Result<Self> {
        let credentials = config.credentials()?;
        let host = config.api_host_url()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                session: AuthSession::new(http, credentials, &host),
                retry: config.retry.build_policy(),
            }),
        })
    }

    pub fn session(&self) -> &AuthSession {
        &self.inner.session
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        self.inner.session.http()
    }

    pub(crate) fn retry_policy(&self) -> &dyn RetryPolicy {
        self.inner.retry.as_ref()
    }

    /// Authorize the account now
    pub async fn authorize(&self) -> Result<Arc<SessionState>> {
        self.inner.session.authorize().await
    }

    /// Perform a JSON API call
    ///
    /// A non-fatal service error invalidates the session and the retry
    /// policy decides whether the call is repeated (once, by default).
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        tracing::debug!(method = method, body = %String::from_utf8_lossy(&body), "API request");

        retry_with_policy(self.retry_policy(), || self.call_once(method, &body)).await
    }

    async fn call_once<Resp: DeserializeOwned>(&self, method: &str, body: &[u8]) -> Result<Resp> {
        let state = self.inner.session.current().await?;
        let url = format!("{}{API_PREFIX}{method}", state.api_url);

        let response = self
            .http()
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, &state.authorization_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == reqwest::StatusCode::OK {
            return parse_json(response).await;
        }

        let error = error_from_response(response).await;
        self.invalidate_session_after(&state, &error).await;
        Err(error)
    }

    /// Clear the session after a non-fatal service error so the retry
    /// re-authorizes
    pub(crate) async fn invalidate_session_after(&self, state: &SessionState, error: &Error) {
        if let Error::Service(e) = error
            && !e.is_fatal()
        {
            tracing::debug!(code = %e.code, status = e.status, "Non-fatal service error");
            self.inner
                .session
                .invalidate_token(&state.authorization_token)
                .await;
        }
    }

    /// List all buckets of the account
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let state = self.inner.session.current().await?;
        let response: ListBucketsResponse = self
            .call(
                "b2_list_buckets",
                &AccountRequest {
                    account_id: &state.account_id,
                },
            )
            .await?;
        Ok(response.buckets)
    }

    /// Look up a bucket by name
    pub async fn bucket(&self, name: &str) -> Result<Bucket> {
        self.list_buckets()
            .await?
            .into_iter()
            .find(|b| b.bucket_name == name)
            .map(|info| Bucket::new(self.clone(), info))
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {name}")))
    }

    /// Create a bucket
    pub async fn create_bucket(&self, name: &str, bucket_type: BucketType) -> Result<Bucket> {
        let state = self.inner.session.current().await?;
        let info: BucketInfo = self
            .call(
                "b2_create_bucket",
                &CreateBucketRequest {
                    account_id: &state.account_id,
                    bucket_name: name,
                    bucket_type,
                },
            )
            .await?;

        tracing::info!(bucket = %info.bucket_name, bucket_id = %info.bucket_id, "Created bucket");
        Ok(Bucket::new(self.clone(), info))
    }

    /// Metadata of one file version
    pub async fn get_file_info(&self, file_id: &str) -> Result<FileDescriptor> {
        self.call("b2_get_file_info", &FileRequest { file_id }).await
    }

    /// Download a file version by id, optionally only a byte range
    pub async fn download_file_by_id(
        &self,
        file_id: &str,
        range: Option<FileRange>,
    ) -> Result<Download> {
        self.download(&Self::download_by_id_path(file_id), range)
            .await
    }
}
