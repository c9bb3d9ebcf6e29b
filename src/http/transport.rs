//! Transport abstraction and its reqwest implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use super::request::{Headers, RequestDescriptor};
use super::response::ResponseEnvelope;
use super::status::classify_error;
use crate::cancel::CancellationToken;

/// Sends one request and returns the buffered response.
///
/// This is the only network I/O point of the runtime. Implementations must
/// return [`Cancelled`](crate::error::Cancelled) when `cancel` fires and
/// report network failures as [`TransportError`](crate::error::TransportError).
/// Non-success statuses are responses, not errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope>;
}

/// Transport backed by a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps an existing reqwest client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client with the given request timeout and user agent.
    pub fn with_settings(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self, request, cancel), fields(method = %request.method, uri = %request.url))]
    async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope> {
        debug!("{} {}...", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.to_reqwest(), request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(content) = &request.content {
            if let Some(content_type) = &request.content_type {
                builder = builder.header(CONTENT_TYPE, content_type.as_str());
            }
            builder = builder.body(content.clone());
        }

        let response = cancel
            .run(async {
                builder
                    .send()
                    .await
                    .map_err(|e| anyhow::Error::from(classify_error(&e)))
            })
            .await?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let content_type = headers.get("content-type").map(str::to_string);

        let body = cancel
            .run(async {
                response
                    .bytes()
                    .await
                    .map_err(|e| anyhow::Error::from(classify_error(&e)))
            })
            .await?;

        debug!("{} {} -> {} ({} bytes)", request.method, request.url, status, body.len());

        let mut envelope = ResponseEnvelope::new(status)
            .with_headers(headers)
            .with_body(body);
        if let Some(content_type) = content_type {
            envelope = envelope.with_content_type(content_type);
        }
        Ok(envelope)
    }
}
