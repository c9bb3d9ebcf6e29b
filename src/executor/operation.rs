//! Static description of one client operation.

use crate::auth::AuthorizationSpec;
use crate::http::{Headers, Method};
use crate::retry::RetryPolicy;

/// Everything known about an operation before it is called: route, method,
/// static headers, content type, retry policy and authorization.
///
/// Built once (typically by generated code) and shared by all calls of the
/// operation.
#[derive(Debug, Clone)]
pub struct Operation {
    name: String,
    method: Method,
    route: String,
    headers: Headers,
    content_type: Option<String>,
    retry: Option<RetryPolicy>,
    authorization: Option<AuthorizationSpec>,
    requires_authorization: bool,
}

impl Operation {
    /// An operation with no headers, retry policy or authorization.
    ///
    /// `route` is relative to the context's base URL unless it is absolute and
    /// may contain `{name}` placeholders.
    pub fn new(name: impl Into<String>, method: Method, route: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            route: route.into(),
            headers: Headers::new(),
            content_type: None,
            retry: None,
            authorization: None,
            requires_authorization: false,
        }
    }

    /// A `GET` operation.
    pub fn get(name: impl Into<String>, route: impl Into<String>) -> Self {
        Self::new(name, Method::Get, route)
    }

    /// A `POST` operation.
    pub fn post(name: impl Into<String>, route: impl Into<String>) -> Self {
        Self::new(name, Method::Post, route)
    }

    /// A `PUT` operation.
    pub fn put(name: impl Into<String>, route: impl Into<String>) -> Self {
        Self::new(name, Method::Put, route)
    }

    /// A `PATCH` operation.
    pub fn patch(name: impl Into<String>, route: impl Into<String>) -> Self {
        Self::new(name, Method::Patch, route)
    }

    /// A `DELETE` operation.
    pub fn delete(name: impl Into<String>, route: impl Into<String>) -> Self {
        Self::new(name, Method::Delete, route)
    }

    /// Adds a static header sent with every call.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Content type for request content, overriding the serializer's.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Wraps every send of this operation in `policy`.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Authorization used instead of the context's provider.
    pub fn with_authorization(mut self, spec: AuthorizationSpec) -> Self {
        self.authorization = Some(spec);
        self
    }

    /// Fails calls with a contract error when neither the operation nor the
    /// client context supplies authorization.
    pub fn require_authorization(mut self) -> Self {
        self.requires_authorization = true;
        self
    }

    /// Name used in logs and spans.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// The unresolved route template.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Content type overriding the serializer's.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    pub fn authorization(&self) -> Option<&AuthorizationSpec> {
        self.authorization.as_ref()
    }

    /// Whether a call without any authorization fails before sending.
    pub fn requires_authorization(&self) -> bool {
        self.requires_authorization
    }
}
