//! Account authorization
//!
//! [`AuthSession`] owns the credentials and the current session (token, API
//! URL, download URL). The session is replaced wholesale on every
//! authorization, under a single lock, so readers never see a token paired
//! with another session's endpoints.

use std::sync::Arc;

use b2_core::{Credentials, Error, Result};
use tokio::sync::Mutex;

use crate::error::{parse_service_error, parse_json, transport_error};
use crate::wire::AuthorizeAccountResponse;

/// API version prefix shared by every JSON call
pub(crate) const API_PREFIX: &str = "/b2api/v1/";

/// Result of a successful `b2_authorize_account`
#[derive(Clone, PartialEq, Eq)]
pub struct SessionState {
    pub account_id: String,
    pub authorization_token: String,
    pub api_url: String,
    pub download_url: String,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("account_id", &self.account_id)
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .finish_non_exhaustive()
    }
}

/// Authorization state of one account
pub struct AuthSession {
    http: reqwest::Client,
    credentials: Credentials,
    authorize_url: String,
    state: Mutex<Option<Arc<SessionState>>>,
}

impl AuthSession {
    /// Create an unauthorized session; the first use authorizes it
    pub fn new(http: reqwest::Client, credentials: Credentials, api_host: &url::Url) -> Self {
        let host = api_host.as_str().trim_end_matches('/');
        Self {
            http,
            credentials,
            authorize_url: format!("{host}{API_PREFIX}b2_authorize_account"),
            state: Mutex::new(None),
        }
    }

    /// The shared HTTP transport
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Exchange the credentials for a new session, replacing the current one
    pub async fn authorize(&self) -> Result<Arc<SessionState>> {
        let mut slot = self.state.lock().await;
        self.authorize_locked(&mut slot).await
    }

    /// The current session, authorizing first if there is none
    ///
    /// The lock is held during authorization, so concurrent callers wait for
    /// one credential exchange instead of racing their own.
    pub async fn current(&self) -> Result<Arc<SessionState>> {
        let mut slot = self.state.lock().await;
        match slot.as_ref() {
            Some(state) => Ok(Arc::clone(state)),
            None => {
                tracing::debug!("No valid authorization token, re-authorizing client");
                self.authorize_locked(&mut slot).await
            }
        }
    }

    pub async fn current_token(&self) -> Result<String> {
        Ok(self.current().await?.authorization_token.clone())
    }

    pub async fn download_url(&self) -> Result<String> {
        Ok(self.current().await?.download_url.clone())
    }

    pub async fn is_authorized(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Drop the session; the next use re-authorizes
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }

    /// Drop the session only if it still carries `token`
    ///
    /// A request that failed with an old token must not discard a session
    /// that another task has already refreshed.
    pub async fn invalidate_token(&self, token: &str) {
        let mut slot = self.state.lock().await;
        if slot
            .as_ref()
            .is_some_and(|state| state.authorization_token == token)
        {
            tracing::debug!("Invalidating authorization token");
            *slot = None;
        }
    }

    async fn authorize_locked(
        &self,
        slot: &mut Option<Arc<SessionState>>,
    ) -> Result<Arc<SessionState>> {
        tracing::debug!(url = %self.authorize_url, "Authorizing account");

        let response = self
            .http
            .get(&self.authorize_url)
            .basic_auth(
                self.credentials.account_id(),
                Some(self.credentials.application_key()),
            )
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.bytes().await.unwrap_or_default();
            *slot = None;
            return Err(Error::Auth(parse_service_error(status.as_u16(), &body)));
        }

        let auth: AuthorizeAccountResponse = parse_json(response).await?;
        let state = Arc::new(SessionState {
            account_id: auth.account_id,
            authorization_token: auth.authorization_token,
            api_url: auth.api_url.trim_end_matches('/').to_string(),
            download_url: auth.download_url.trim_end_matches('/').to_string(),
        });

        tracing::info!(
            account_id = %state.account_id,
            api_url = %state.api_url,
            "Authorized B2 account"
        );

        *slot = Some(Arc::clone(&state));
        Ok(state)
    }
}
