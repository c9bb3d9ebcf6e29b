//! Error leaves raised by the runtime.
//!
//! Everything fallible in this crate returns `anyhow::Result`. The types here
//! are the concrete errors that end up inside those `anyhow::Error` values, so
//! callers (and retry predicates) can classify a failure with
//! `err.downcast_ref::<TransportError>()` and friends.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Broad category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The request or response timed out.
    Timeout,
    /// The response body could not be read.
    Body,
    /// Any other failure while sending the request.
    Request,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Request => "request",
        };
        f.write_str(name)
    }
}

/// Connection, timeout or protocol failure reported by a transport.
#[derive(Debug, Error)]
#[error("transport {kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    /// A transport error of `kind`.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A configuration or metadata defect detected while building a request or
/// transforming a response. Never retried.
#[derive(Debug, Error, PartialEq)]
pub enum ContractError {
    #[error("property '{property}' is not present on {model}")]
    MissingProperty { model: String, property: String },

    #[error("value at '{location}' cannot be converted to {target}: {reason}")]
    TypeMismatch {
        location: String,
        target: String,
        reason: String,
    },

    #[error("response body is not valid {content_type}: {reason}")]
    MalformedBody { content_type: String, reason: String },

    #[error("invalid extraction path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("operation requires authorization but no provider is configured")]
    MissingAuthorization,

    #[error("invalid route '{route}': {reason}")]
    InvalidRoute { route: String, reason: String },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("no response processor registered for {0}")]
    UnknownProcessor(String),
}

/// The call was cancelled by its caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Invalid retry policy configuration, rejected when the policy is built.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("{field} must not be negative (got {millis}ms)")]
    NegativeDuration { field: &'static str, millis: i64 },

    #[error("initial wait {initial:?} exceeds max wait {max:?}")]
    InitialExceedsMax { initial: Duration, max: Duration },
}

/// Returns true when the error chain contains a [`Cancelled`].
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Cancelled>())
}

/// Returns true when the error chain contains a [`ContractError`].
pub fn is_contract_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<ContractError>())
}
