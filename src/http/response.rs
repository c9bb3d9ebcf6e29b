//! Raw response envelope returned by a transport.

use anyhow::{Context, Result};
use bytes::Bytes;

use super::request::Headers;

/// Status, headers and fully buffered body of one response.
///
/// Transformers take the envelope by value, so a body is interpreted at most
/// once per response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    status: u16,
    headers: Headers,
    body: Bytes,
    content_type: Option<String>,
}

impl ResponseEnvelope {
    /// An envelope with `status`, no headers and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            content_type: None,
        }
    }

    /// Appends a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces all headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the buffered body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Declared content type, falling back to the `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .or_else(|| self.headers.get("content-type"))
    }

    /// Raw body bytes, possibly empty.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// False for an empty body.
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).context("Response body is not valid UTF-8")
    }

    /// Consumes the envelope, returning the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_falls_back_to_header() {
        let envelope = ResponseEnvelope::new(200).with_header("Content-Type", "text/plain");
        assert_eq!(envelope.content_type(), Some("text/plain"));

        let envelope = envelope.with_content_type("application/json");
        assert_eq!(envelope.content_type(), Some("application/json"));
    }

    #[test]
    fn test_body_accessors() {
        let envelope = ResponseEnvelope::new(204);
        assert!(!envelope.has_body());
        assert!(envelope.is_success());

        let envelope = ResponseEnvelope::new(503).with_body("busy");
        assert!(envelope.has_body());
        assert!(!envelope.is_success());
        assert_eq!(envelope.text().unwrap(), "busy");
        assert_eq!(envelope.into_body(), Bytes::from_static(b"busy"));
    }

    #[test]
    fn test_text_rejects_invalid_utf8() {
        let envelope = ResponseEnvelope::new(200).with_body(vec![0xff, 0xfe]);
        assert!(envelope.text().is_err());
    }
}
