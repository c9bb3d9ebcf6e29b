//! Status-code and transport-error classification.

use reqwest::StatusCode;

use crate::error::{TransportError, TransportErrorKind};

/// Statuses worth retrying: request timeout, rate limiting and server errors.
pub fn is_transient(status: u16) -> bool {
    match StatusCode::from_u16(status) {
        Ok(StatusCode::REQUEST_TIMEOUT) | Ok(StatusCode::TOO_MANY_REQUESTS) => true,
        Ok(s) => s.is_server_error(),
        Err(_) => false,
    }
}

/// Maps a reqwest failure onto a [`TransportError`].
pub fn classify_error(error: &reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Request
    };
    TransportError::new(kind, error.to_string())
}
