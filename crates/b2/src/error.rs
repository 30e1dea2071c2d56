//! Mapping of HTTP failures onto the core error taxonomy

use b2_core::{Error, Result, ServiceError};
use serde::de::DeserializeOwned;

/// A request that never produced a response
pub(crate) fn transport_error(error: reqwest::Error) -> Error {
    let mut msg = error.to_string();
    if let Some(url) = error.url() {
        msg.push_str(&format!(" ({})", url.path()));
    }
    Error::Transport(msg)
}

/// Parse the error body of a non-success response
///
/// 404 responses become [`Error::NotFound`]; everything else is a
/// [`ServiceError`], synthesised if the body is not a B2 error document.
pub(crate) async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.bytes().await.unwrap_or_default();
    let service_error = parse_service_error(status, &body);

    if status == 404 {
        return Error::NotFound(service_error.message);
    }
    Error::Service(service_error)
}

pub(crate) fn parse_service_error(status: u16, body: &[u8]) -> ServiceError {
    match serde_json::from_slice::<ServiceError>(body) {
        Ok(err) if !err.code.is_empty() => err,
        _ => {
            tracing::debug!(
                status = status,
                body = %String::from_utf8_lossy(body),
                "Response carried no B2 error document"
            );
            ServiceError::unrecognised(status)
        }
    }
}

/// Decode a successful JSON response
pub(crate) async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response.bytes().await.map_err(transport_error)?;
    tracing::trace!(body = %String::from_utf8_lossy(&body), "Response");
    Ok(serde_json::from_slice(&body)?)
}
