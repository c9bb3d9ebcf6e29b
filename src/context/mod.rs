//! Per-client shared state.
//!
//! A [`ClientContext`] is configured once and then shared (behind an `Arc`)
//! by every call of one logical client. The transport is created lazily on
//! first use, at most once per context, even under concurrent first use.

mod config;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::debug;
use once_cell::sync::OnceCell;
use url::Url;

use crate::auth::{AuthorizationProvider, StaticToken};
use crate::error::ContractError;
use crate::http::{Headers, ReqwestTransport, Transport};
use crate::serializer::{JsonSerializer, Serializer};
use crate::transform::{ProcessorRegistry, ResponseProcessor};

pub use config::{ClientConfig, DEFAULT_TIMEOUT_SECS, RetryConfig, default_user_agent};

pub type TransportFactory = Arc<dyn Fn() -> Result<Arc<dyn Transport>> + Send + Sync>;

pub struct ClientContext {
    base_url: Option<String>,
    transport: OnceCell<Arc<dyn Transport>>,
    transport_factory: TransportFactory,
    serializer: Arc<dyn Serializer>,
    authorization: Option<Arc<dyn AuthorizationProvider>>,
    default_headers: Headers,
    processors: ProcessorRegistry,
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("base_url", &self.base_url)
            .field("transport_initialized", &self.is_transport_initialized())
            .field("authorization", &self.authorization.is_some())
            .field("default_headers", &self.default_headers)
            .field("processors", &self.processors.len())
            .finish()
    }
}

impl ClientContext {
    /// Starts a builder using the JSON serializer and the reqwest transport.
    pub fn builder() -> ClientContextBuilder {
        ClientContextBuilder::new()
    }

    /// Builds a context from configuration, using the reqwest transport.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        if let Some(base_url) = &config.base_url {
            Url::parse(base_url).map_err(|e| ContractError::InvalidRoute {
                route: base_url.clone(),
                reason: e.to_string(),
            })?;
        }

        let mut builder = Self::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone());
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url.clone());
        }
        for (name, value) in &config.default_headers {
            builder = builder.default_header(name.clone(), value.clone());
        }
        if let Some(token) = &config.token {
            builder = builder.authorization(StaticToken::bearer(token.clone()));
        }
        Ok(builder.build())
    }

    /// Base URL relative routes are resolved against.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Shared transport, created on first call.
    ///
    /// Concurrent first callers block on the same initialization; exactly one
    /// of them runs the factory. A failed construction is not cached, the
    /// next call tries again.
    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport
            .get_or_try_init(|| {
                debug!("Creating shared transport...");
                (self.transport_factory)()
            })
            .cloned()
    }

    /// Whether the transport has been created yet.
    pub fn is_transport_initialized(&self) -> bool {
        self.transport.get().is_some()
    }

    /// Serializer for request content and response bodies.
    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    /// Client-wide authorization provider.
    pub fn authorization(&self) -> Option<&Arc<dyn AuthorizationProvider>> {
        self.authorization.as_ref()
    }

    /// Headers sent before every operation's own headers.
    pub fn default_headers(&self) -> &Headers {
        &self.default_headers
    }

    /// Response processors available to [`Custom`](crate::transform::Custom).
    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }
}

pub struct ClientContextBuilder {
    base_url: Option<String>,
    transport_factory: Option<TransportFactory>,
    timeout: Duration,
    user_agent: String,
    serializer: Arc<dyn Serializer>,
    authorization: Option<Arc<dyn AuthorizationProvider>>,
    default_headers: Headers,
    processors: ProcessorRegistry,
}

impl ClientContextBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            transport_factory: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: default_user_agent(),
            serializer: Arc::new(JsonSerializer),
            authorization: None,
            default_headers: Headers::new(),
            processors: ProcessorRegistry::new(),
        }
    }

    /// Base URL for relative routes.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Uses a ready-made transport.
    pub fn transport<T: Transport + 'static>(self, transport: T) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        self.transport_factory(move || Ok(transport.clone()))
    }

    /// Uses `factory` to create the transport on first use.
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    /// Request timeout of the default reqwest transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// User agent of the default reqwest transport.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn serializer<S: Serializer + 'static>(mut self, serializer: S) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Client-wide authorization, used by operations that declare none.
    pub fn authorization<P: AuthorizationProvider + 'static>(mut self, provider: P) -> Self {
        self.authorization = Some(Arc::new(provider));
        self
    }

    /// Header sent with every call, before operation headers.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.append(name, value);
        self
    }

    /// Registers a response processor under its type.
    pub fn processor<P: ResponseProcessor>(mut self, processor: P) -> Self {
        self.processors.register(processor);
        self
    }

    /// Finishes the context. The transport is not created until first use.
    pub fn build(self) -> ClientContext {
        let transport_factory = self.transport_factory.unwrap_or_else(|| {
            let timeout = self.timeout;
            let user_agent = self.user_agent.clone();
            let factory: TransportFactory = Arc::new(move || -> Result<Arc<dyn Transport>> {
                Ok(Arc::new(ReqwestTransport::with_settings(timeout, &user_agent)?))
            });
            factory
        });

        ClientContext {
            base_url: self.base_url,
            transport: OnceCell::new(),
            transport_factory,
            serializer: self.serializer,
            authorization: self.authorization,
            default_headers: self.default_headers,
            processors: self.processors,
        }
    }
}
