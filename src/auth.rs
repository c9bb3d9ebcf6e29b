//! Authorization header resolution.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::cancel::CancellationToken;

pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Supplies the `Authorization` header value for a request.
///
/// Providers that can fetch credentials asynchronously (token refresh, vault
/// lookups) return `true` from [`supports_async`](Self::supports_async) and
/// implement [`value_async`](Self::value_async); the runtime then prefers that
/// path. Otherwise the synchronous [`value`](Self::value) is used.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Scheme placed before the value, e.g. `Bearer`. `None` sends the value
    /// verbatim.
    fn scheme(&self) -> Option<String>;

    fn value(&self) -> Result<String>;

    fn supports_async(&self) -> bool {
        false
    }

    async fn value_async(&self, _cancel: &CancellationToken) -> Result<String> {
        self.value()
    }
}

/// A fixed credential.
#[derive(Clone)]
pub struct StaticToken {
    scheme: Option<String>,
    token: String,
}

impl StaticToken {
    /// A token sent after `scheme`, or verbatim when `scheme` is `None`.
    pub fn new(scheme: Option<String>, token: impl Into<String>) -> Self {
        Self {
            scheme,
            token: token.into(),
        }
    }

    /// A `Bearer` token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(Some("Bearer".to_string()), token)
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken")
            .field("scheme", &self.scheme)
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

impl AuthorizationProvider for StaticToken {
    fn scheme(&self) -> Option<String> {
        self.scheme.clone()
    }

    fn value(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// How an operation obtains its authorization header.
#[derive(Clone)]
pub enum AuthorizationSpec {
    /// Header value used verbatim.
    Static(String),
    /// Value produced by a provider on every call.
    Provider(Arc<dyn AuthorizationProvider>),
}

impl AuthorizationSpec {
    /// A static `Bearer <token>` header value.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        AuthorizationSpec::Static(format!("Bearer {}", token.as_ref()))
    }

    /// Resolves the value from `provider` on every call.
    pub fn provider<P: AuthorizationProvider + 'static>(provider: P) -> Self {
        AuthorizationSpec::Provider(Arc::new(provider))
    }

    /// Produces the full header value.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<String> {
        match self {
            AuthorizationSpec::Static(value) => Ok(value.clone()),
            AuthorizationSpec::Provider(provider) => resolve_provider(provider.as_ref(), cancel).await,
        }
    }
}

impl fmt::Debug for AuthorizationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationSpec::Static(value) => {
                f.debug_tuple("Static").field(&mask_secret(value)).finish()
            }
            AuthorizationSpec::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Resolves a provider, preferring its async path when it has one.
pub async fn resolve_provider(
    provider: &dyn AuthorizationProvider,
    cancel: &CancellationToken,
) -> Result<String> {
    let value = if provider.supports_async() {
        cancel.run(provider.value_async(cancel)).await?
    } else {
        provider.value()?
    };
    debug!("Resolved authorization value {}", mask_secret(&value));

    Ok(match provider.scheme() {
        Some(scheme) if !scheme.is_empty() => format!("{} {}", scheme, value),
        _ => value,
    })
}

/// Masks a secret for logging, keeping a short prefix and suffix.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 12 {
        return "*".repeat(chars.len().max(1));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_spec_used_verbatim() {
        let spec = AuthorizationSpec::Static("Token abc".to_string());
        let value = spec.resolve(&CancellationToken::new()).await.unwrap();
        assert_eq!(value, "Token abc");

        let spec = AuthorizationSpec::bearer("xyz");
        assert_eq!(
            spec.resolve(&CancellationToken::new()).await.unwrap(),
            "Bearer xyz"
        );
    }

    #[tokio::test]
    async fn test_async_path_preferred() {
        let mut provider = MockAuthorizationProvider::new();
        provider.expect_supports_async().return_const(true);
        provider
            .expect_value_async()
            .times(1)
            .returning(|_| Ok("async-token".to_string()));
        provider.expect_value().never();
        provider
            .expect_scheme()
            .returning(|| Some("Bearer".to_string()));

        let spec = AuthorizationSpec::provider(provider);
        let value = spec.resolve(&CancellationToken::new()).await.unwrap();
        assert_eq!(value, "Bearer async-token");
    }

    #[tokio::test]
    async fn test_sync_fallback() {
        let mut provider = MockAuthorizationProvider::new();
        provider.expect_supports_async().return_const(false);
        provider.expect_value_async().never();
        provider
            .expect_value()
            .times(1)
            .returning(|| Ok("sync-token".to_string()));
        provider.expect_scheme().returning(|| None);

        let value = resolve_provider(&provider, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value, "sync-token");
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let mut provider = MockAuthorizationProvider::new();
        provider.expect_supports_async().return_const(false);
        provider
            .expect_value()
            .returning(|| Err(anyhow::anyhow!("token store locked")));
        provider.expect_scheme().returning(|| None);

        let err = resolve_provider(&provider, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "token store locked");
    }

    #[tokio::test]
    async fn test_static_token_provider() {
        let value = resolve_provider(&StaticToken::bearer("t0k3n"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value, "Bearer t0k3n");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("ghp_1234567890abcd"), "ghp_*********abcd");
        assert_eq!(mask_secret("short"), "*****");
        assert_eq!(mask_secret(""), "*");
        assert!(!format!("{:?}", StaticToken::bearer("supersecretvalue")).contains("supersecret"));
    }
}
