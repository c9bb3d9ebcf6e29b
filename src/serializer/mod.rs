//! Serializer abstraction used for request content and response bodies.
//!
//! [`Serializer`] is object-safe and speaks in terms of a generic parsed
//! document (`serde_json::Value`). The typed helpers in this module
//! ([`serialize`], [`deserialize`], [`extract`]) sit on top of it.

pub mod path;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ContractError;
use path::Path;

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub trait Serializer: Send + Sync {
    /// Content type written for serialized request content.
    fn content_type(&self) -> &str;

    /// Renders a document as request content.
    fn to_text(&self, doc: &Value) -> Result<String>;

    /// Parses a response body into a document.
    fn parse(&self, body: &[u8]) -> Result<Value>;

    /// Selects the sub-document at `path`. `None` when the path is absent.
    fn extract_by_path(&self, doc: &Value, path: &str) -> Result<Option<Value>> {
        let path = Path::parse(path)?;
        Ok(path.select(doc).cloned())
    }
}

/// JSON serializer backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn to_text(&self, doc: &Value) -> Result<String> {
        Ok(serde_json::to_string(doc)?)
    }

    fn parse(&self, body: &[u8]) -> Result<Value> {
        serde_json::from_slice(body).map_err(|e| {
            ContractError::MalformedBody {
                content_type: JSON_CONTENT_TYPE.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Serializes `value` with `serializer`.
pub fn serialize<T: Serialize + ?Sized>(serializer: &dyn Serializer, value: &T) -> Result<String> {
    let doc = serde_json::to_value(value).map_err(|e| ContractError::TypeMismatch {
        location: "request content".to_string(),
        target: "document".to_string(),
        reason: e.to_string(),
    })?;
    serializer.to_text(&doc)
}

/// Parses `body` as a `T`.
pub fn deserialize<T: DeserializeOwned>(serializer: &dyn Serializer, body: &[u8]) -> Result<T> {
    let doc = serializer.parse(body)?;
    coerce(doc, "$")
}

/// Extracts the value at `path` and converts it to `T`.
///
/// A missing path or an explicit `null` yields `None`.
pub fn extract<T: DeserializeOwned>(
    serializer: &dyn Serializer,
    doc: &Value,
    path: &str,
) -> Result<Option<T>> {
    match serializer.extract_by_path(doc, path)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce(value, path).map(Some),
    }
}

/// Converts a document into `T`, reporting failures as a contract error.
pub fn coerce<T: DeserializeOwned>(doc: Value, location: &str) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| {
        ContractError::TypeMismatch {
            location: location.to_string(),
            target: std::any::type_name::<T>().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
