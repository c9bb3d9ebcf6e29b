//! Request execution pipeline.
//!
//! A call moves through `Building -> Authorizing -> Sending -> Transforming`.
//! With a retry policy the send is wrapped in the retry loop and only the
//! send is repeated; authorization is resolved once per call. Transformer
//! failures are never retried.

mod operation;
pub mod route;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::{HeaderName, HeaderValue};
use serde::Serialize;
use tracing::Span;

use crate::auth::{AUTHORIZATION_HEADER, mask_secret, resolve_provider};
use crate::cancel::CancellationToken;
use crate::context::ClientContext;
use crate::error::ContractError;
use crate::http::{Headers, RequestDescriptor, ResponseEnvelope};
use crate::serializer;
use crate::transform::ResponseTransformer;

pub use operation::Operation;

/// Pipeline stage of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Building,
    Authorizing,
    Sending,
    Retrying,
    Transforming,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Executes operations against one [`ClientContext`].
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    context: Arc<ClientContext>,
}

impl RequestExecutor {
    /// An executor sharing `context` with other executors of the same client.
    pub fn new(context: Arc<ClientContext>) -> Self {
        Self { context }
    }

    /// The shared client context.
    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Starts a call of `operation`.
    pub fn call<'a>(&'a self, operation: &'a Operation) -> Call<'a> {
        Call {
            executor: self,
            operation,
            path_params: Vec::new(),
            query: Vec::new(),
            headers: Headers::new(),
            content: None,
        }
    }
}

enum Content {
    /// Text produced by the context's serializer.
    Serialized(String),
    Raw { body: Bytes, content_type: String },
}

/// One invocation of an operation with its per-call arguments.
pub struct Call<'a> {
    executor: &'a RequestExecutor,
    operation: &'a Operation,
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: Headers,
    content: Option<Content>,
}

impl<'a> Call<'a> {
    /// Value for a `{name}` placeholder in the route template.
    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.push((name.into(), value.to_string()));
        self
    }

    /// Appends a query parameter; repeated names are kept.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Per-call header, sent after the operation's static headers.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Request content, serialized with the context's serializer.
    pub fn content<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let text = serializer::serialize(self.executor.context.serializer(), value)?;
        self.content = Some(Content::Serialized(text));
        Ok(self)
    }

    /// Pre-encoded request content.
    pub fn raw_content(mut self, body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.content = Some(Content::Raw {
            body: body.into(),
            content_type: content_type.into(),
        });
        self
    }

    /// The fully resolved request URI, without sending anything.
    pub fn request_uri(&self) -> Result<String> {
        let url = route::build_url(
            self.executor.context.base_url(),
            self.operation.route(),
            &self.path_params,
            &self.query,
        )?;
        Ok(url.into())
    }

    /// Runs the call and converts the response with `transformer`.
    #[tracing::instrument(
        name = "rest_call",
        skip_all,
        fields(
            operation = %self.operation.name(),
            http.method = %self.operation.method(),
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
            stage = tracing::field::Empty,
        )
    )]
    pub async fn execute<T>(self, transformer: &T, cancel: &CancellationToken) -> Result<T::Output>
    where
        T: ResponseTransformer,
    {
        let mut tracker = StageTracker::new(self.operation.name());
        let result = self.run(transformer, cancel, &mut tracker).await;
        match &result {
            Ok(_) => tracker.enter(Stage::Done),
            Err(e) => tracker.fail(e),
        }
        result
    }

    async fn run<T>(
        &self,
        transformer: &T,
        cancel: &CancellationToken,
        tracker: &mut StageTracker<'_>,
    ) -> Result<T::Output>
    where
        T: ResponseTransformer,
    {
        let context = &self.executor.context;

        tracker.enter(Stage::Building);
        cancel.check()?;
        let mut request = self.build_request()?;
        Span::current().record("http.url", request.uri());

        tracker.enter(Stage::Authorizing);
        self.authorize(&mut request, cancel).await?;

        let transport = context.transport()?;
        let response: ResponseEnvelope = match self.operation.retry() {
            Some(policy) => {
                tracker.enter(Stage::Retrying);
                let policy = match transformer.retry_predicate() {
                    Some(predicate) => policy.to_builder().result_predicate(predicate).build()?,
                    None => policy.clone(),
                };
                let request = &request;
                let transport = &transport;
                let tracker = &mut *tracker;
                policy
                    .execute(self.operation.name(), cancel, move || {
                        tracker.enter(Stage::Sending);
                        cancel.run(transport.send(request, cancel))
                    })
                    .await?
            }
            None => {
                tracker.enter(Stage::Sending);
                cancel.run(transport.send(&request, cancel)).await?
            }
        };
        Span::current().record("http.status_code", response.status());

        tracker.enter(Stage::Transforming);
        transformer.transform(response, context.serializer())
    }

    fn build_request(&self) -> Result<RequestDescriptor> {
        let context = &self.executor.context;
        let url = route::build_url(
            context.base_url(),
            self.operation.route(),
            &self.path_params,
            &self.query,
        )?;

        let mut headers = Headers::new();
        for (name, value) in context
            .default_headers()
            .iter()
            .chain(self.operation.headers().iter())
            .chain(self.headers.iter())
        {
            validate_header(name, value)?;
            headers.append(name, value);
        }

        let (content, content_type) = match &self.content {
            None => (None, None),
            Some(Content::Serialized(text)) => {
                let content_type = self
                    .operation
                    .content_type()
                    .unwrap_or(context.serializer().content_type())
                    .to_string();
                (Some(Bytes::from(text.clone())), Some(content_type))
            }
            Some(Content::Raw { body, content_type }) => {
                (Some(body.clone()), Some(content_type.clone()))
            }
        };

        Ok(RequestDescriptor {
            method: self.operation.method(),
            route_template: self.operation.route().to_string(),
            base_url: context.base_url().map(str::to_string),
            url,
            headers,
            content,
            content_type,
        })
    }

    /// Resolves the operation's authorization, falling back to the context's
    /// provider, and attaches it to `request`.
    async fn authorize(
        &self,
        request: &mut RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let value = match (self.operation.authorization(), self.executor.context.authorization()) {
            (Some(spec), _) => Some(spec.resolve(cancel).await?),
            (None, Some(provider)) => Some(resolve_provider(provider.as_ref(), cancel).await?),
            (None, None) if self.operation.requires_authorization() => {
                return Err(ContractError::MissingAuthorization.into());
            }
            (None, None) => None,
        };

        if let Some(value) = value {
            validate_header(AUTHORIZATION_HEADER, &value).map_err(|_| {
                ContractError::InvalidHeader {
                    name: AUTHORIZATION_HEADER.to_string(),
                    reason: format!("invalid value {}", mask_secret(&value)),
                }
            })?;
            request.headers.append(AUTHORIZATION_HEADER, value);
        }
        Ok(())
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), ContractError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ContractError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    HeaderValue::from_str(value).map_err(|e| ContractError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

struct StageTracker<'a> {
    operation: &'a str,
    stage: Option<Stage>,
}

impl<'a> StageTracker<'a> {
    fn new(operation: &'a str) -> Self {
        Self {
            operation,
            stage: None,
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!("{}: stage {}", self.operation, stage);
        Span::current().record("stage", tracing::field::display(stage));
        self.stage = Some(stage);
    }

    fn fail(&mut self, err: &anyhow::Error) {
        let failed_in = self.stage.map(|s| s.to_string()).unwrap_or_default();
        warn!("{}: failed during {}: {}", self.operation, failed_in, err);
        self.enter(Stage::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthorizationSpec, MockAuthorizationProvider};
    use crate::error::{TransportError, TransportErrorKind, is_cancelled};
    use crate::http::{MockTransport, Method, Transport};
    use crate::retry::RetryPolicy;
    use crate::transform::{Custom, Raw, ResponseProcessor, Whole};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Widget {
        id: u32,
        name: String,
    }

    fn executor(context: ClientContext) -> RequestExecutor {
        RequestExecutor::new(Arc::new(context))
    }

    fn json(status: u16, body: &str) -> ResponseEnvelope {
        ResponseEnvelope::new(status)
            .with_content_type("application/json")
            .with_body(body.to_string())
    }

    fn fast_retry(limit: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .retry_limit(limit)
            .initial_wait(Duration::from_millis(10))
            .retry_on_status([503])
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_uri() {
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(MockTransport::new())
                .build(),
        );
        let op = Operation::get("get_widget", "api/v1/widgets/{id}");

        let uri = executor
            .call(&op)
            .path_param("id", 42)
            .query("expand", "parts")
            .request_uri()
            .unwrap();
        assert_eq!(uri, "http://localhost/api/v1/widgets/42?expand=parts");

        let plain = Operation::get("list_widgets", "api/v1/widgets");
        assert_eq!(
            executor.call(&plain).request_uri().unwrap(),
            "http://localhost/api/v1/widgets"
        );
    }

    #[tokio::test]
    async fn test_get_deserializes_whole_body() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|request, _| {
                assert_eq!(request.method, Method::Get);
                assert_eq!(request.uri(), "http://localhost/widgets/1");
                Ok(json(200, r#"{"id":1,"name":"gear"}"#))
            });
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let op = Operation::get("get_widget", "widgets/{id}");

        let widget = executor
            .call(&op)
            .path_param("id", 1)
            .execute(&Whole::<Widget>::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            widget,
            Some(Widget {
                id: 1,
                name: "gear".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorizes_once_before_sending() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut provider = MockAuthorizationProvider::new();
        provider.expect_supports_async().return_const(false);
        provider.expect_scheme().returning(|| Some("Bearer".to_string()));
        provider.expect_value().times(1).returning({
            let events = events.clone();
            move || {
                events.lock().unwrap().push("authorize");
                Ok("token-1".to_string())
            }
        });

        let mut transport = MockTransport::new();
        let statuses = Mutex::new(vec![200, 503, 503]);
        transport.expect_send().times(3).returning({
            let events = events.clone();
            move |request: &RequestDescriptor, _: &CancellationToken| {
                events.lock().unwrap().push("send");
                assert_eq!(request.headers.get("authorization"), Some("Bearer token-1"));
                let status = statuses.lock().unwrap().pop().unwrap();
                Ok(ResponseEnvelope::new(status))
            }
        });

        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .authorization(provider)
                .build(),
        );
        let op = Operation::delete("delete_widget", "widgets/7").with_retry(fast_retry(3));

        let response = executor
            .call(&op)
            .execute(&Raw, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["authorize", "send", "send", "send"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_response() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(4)
            .returning(|_, _| Ok(ResponseEnvelope::new(503)));
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let op = Operation::get("get_status", "status").with_retry(fast_retry(3));

        let response = executor
            .call(&op)
            .execute(&Raw, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_retried_when_allowed() {
        let mut transport = MockTransport::new();
        let mut calls = 0;
        transport.expect_send().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                return Err(TransportError::new(TransportErrorKind::Connect, "refused").into());
            }
            Ok(json(200, r#"{"id":2,"name":"cog"}"#))
        });
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let policy = RetryPolicy::builder()
            .retry_limit(2)
            .initial_wait(Duration::from_millis(10))
            .retry_on_transport_errors()
            .build()
            .unwrap();
        let op = Operation::get("get_widget", "widgets/2").with_retry(policy);

        let widget = executor
            .call(&op)
            .execute(&Whole::<Widget>::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(widget.map(|w| w.id), Some(2));
    }

    #[tokio::test]
    async fn test_transformer_failure_not_retried() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(json(200, "not json")));
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let policy = RetryPolicy::builder()
            .retry_limit(3)
            .retry_on_error::<ContractError>()
            .build()
            .unwrap();
        let op = Operation::get("get_widget", "widgets/1").with_retry(policy);

        let err = executor
            .call(&op)
            .execute(&Whole::<Widget>::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ContractError>(),
            Some(ContractError::MalformedBody { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_required_authorization() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let op = Operation::get("me", "me").require_authorization();

        let err = executor
            .call(&op)
            .execute(&Raw, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ContractError>(),
            Some(&ContractError::MissingAuthorization)
        );
    }

    #[tokio::test]
    async fn test_operation_authorization_overrides_context() {
        let mut provider = MockAuthorizationProvider::new();
        provider.expect_value().never();
        provider.expect_value_async().never();
        provider.expect_supports_async().return_const(false);
        provider.expect_scheme().returning(|| None);

        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|request, _| {
            assert_eq!(
                request.headers.get_all("Authorization").collect::<Vec<_>>(),
                vec!["Token op-level"]
            );
            Ok(ResponseEnvelope::new(204))
        });
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .authorization(provider)
                .build(),
        );
        let op = Operation::get("me", "me")
            .with_authorization(AuthorizationSpec::Static("Token op-level".to_string()));

        let response = executor
            .call(&op)
            .execute(&Raw, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
    }

    #[tokio::test]
    async fn test_headers_and_content() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|request, _| {
            assert_eq!(
                request.headers.get_all("x-trace").collect::<Vec<_>>(),
                vec!["context", "operation", "call"]
            );
            assert_eq!(
                request.content.as_deref(),
                Some(br#"{"name":"gear"}"#.as_slice())
            );
            assert_eq!(request.content_type.as_deref(), Some("application/json"));
            Ok(ResponseEnvelope::new(201))
        });
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .default_header("X-Trace", "context")
                .build(),
        );
        let op = Operation::post("create_widget", "widgets").with_header("X-Trace", "operation");

        let response = executor
            .call(&op)
            .header("X-Trace", "call")
            .content(&serde_json::json!({"name": "gear"}))
            .unwrap()
            .execute(&Raw, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    #[tokio::test]
    async fn test_operation_content_type_override() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|request, _| {
            assert_eq!(
                request.content_type.as_deref(),
                Some("application/merge-patch+json")
            );
            Ok(ResponseEnvelope::new(200))
        });
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let op = Operation::patch("patch_widget", "widgets/1")
            .with_content_type("application/merge-patch+json");

        executor
            .call(&op)
            .content(&serde_json::json!({"name": null}))
            .unwrap()
            .execute(&Raw, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_header_is_contract_error() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let op = Operation::get("get", "widgets");

        let err = executor
            .call(&op)
            .header("bad name", "x")
            .execute(&Raw, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ContractError>(),
            Some(ContractError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let op = Operation::get("get", "widgets");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .call(&op)
            .execute(&Raw, &cancel)
            .await
            .unwrap_err();
        assert!(is_cancelled(&err));
    }

    struct PendingAware;

    impl ResponseProcessor for PendingAware {
        type Output = u16;

        fn process_response(&self, envelope: ResponseEnvelope) -> Result<u16> {
            Ok(envelope.status())
        }

        fn has_retry_predicate(&self) -> bool {
            true
        }

        fn should_retry(&self, envelope: &ResponseEnvelope) -> bool {
            envelope.status() == 202
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_retry_predicate_joins_policy() {
        let mut transport = MockTransport::new();
        let statuses = Mutex::new(vec![200, 202]);
        transport.expect_send().times(2).returning(move |_, _| {
            let status = statuses.lock().unwrap().pop().unwrap();
            Ok(ResponseEnvelope::new(status).with_body("done"))
        });
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .build(),
        );
        let policy = RetryPolicy::builder()
            .retry_limit(3)
            .initial_wait(Duration::from_millis(10))
            .build()
            .unwrap();
        let op = Operation::get("poll_job", "jobs/1").with_retry(policy);

        let status = executor
            .call(&op)
            .execute(&Custom::new(PendingAware), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status, Some(200));
    }

    #[tokio::test]
    async fn test_custom_resolved_from_context_registry() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(ResponseEnvelope::new(200).with_body("ok")));
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(transport)
                .processor(PendingAware)
                .build(),
        );
        let op = Operation::get("poll_job", "jobs/1");

        let custom = Custom::<PendingAware>::from_registry(executor.context().processors()).unwrap();
        let status = executor
            .call(&op)
            .execute(&custom, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status, Some(200));
    }

    /// Never answers and never looks at the cancellation token.
    struct StalledTransport {
        sends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(
            &self,
            _request: &RequestDescriptor,
            _cancel: &CancellationToken,
        ) -> Result<ResponseEnvelope> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_send_under_retry() {
        let sends = Arc::new(AtomicUsize::new(0));
        let executor = executor(
            ClientContext::builder()
                .base_url("http://localhost")
                .transport(StalledTransport {
                    sends: sends.clone(),
                })
                .build(),
        );
        let op = Operation::get("get_status", "status").with_retry(fast_retry(3));
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        };
        let (result, ()) = tokio::join!(executor.call(&op).execute(&Raw, &cancel), canceller);

        assert!(is_cancelled(&result.unwrap_err()));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Authorizing.to_string(), "Authorizing");
        assert_eq!(Stage::Failed.to_string(), "Failed");
    }
}
