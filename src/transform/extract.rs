//! Path-based extraction transformers.

use std::marker::PhantomData;

use anyhow::Result;
use serde::de::DeserializeOwned;

use super::ResponseTransformer;
use crate::http::ResponseEnvelope;
use crate::serializer::{self, Serializer, path::Path};

/// Selects the value at a path in the parsed body and converts it to `T`.
pub struct PathExtract<T> {
    path: Path,
    _target: PhantomData<fn() -> T>,
}

impl<T> PathExtract<T> {
    /// Fails with a contract error when `path` is not a valid expression.
    /// Validates `path` up front.
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self {
            path: Path::parse(path)?,
            _target: PhantomData,
        })
    }

    /// The parsed extraction path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> ResponseTransformer for PathExtract<T>
where
    T: DeserializeOwned + Send,
{
    type Output = Option<T>;

    fn transform(&self, envelope: ResponseEnvelope, serializer: &dyn Serializer) -> Result<Option<T>> {
        if !envelope.has_body() {
            return Ok(None);
        }
        let doc = serializer.parse(envelope.body())?;
        serializer::extract(serializer, &doc, &self.path.to_string())
    }
}

/// A wrapper with exactly one inner type that extraction results are placed
/// into.
pub trait ExtractContainer: Sized + Send {
    type Inner: DeserializeOwned;

    fn wrap(inner: Option<Self::Inner>) -> Self;

    /// Receives the envelope the value was extracted from. Containers that do
    /// not keep the response ignore it.
    fn attach_response(&mut self, _response: ResponseEnvelope) {}
}

impl<T: DeserializeOwned + Send> ExtractContainer for Option<T> {
    type Inner = T;

    fn wrap(inner: Option<T>) -> Self {
        inner
    }
}

/// Extracted value together with the response it came from, so callers can
/// read status and headers alongside the value.
#[derive(Debug, Clone, PartialEq)]
pub struct WithResponse<T> {
    pub value: Option<T>,
    pub response: Option<ResponseEnvelope>,
}

impl<T: DeserializeOwned + Send> ExtractContainer for WithResponse<T> {
    type Inner = T;

    fn wrap(inner: Option<T>) -> Self {
        Self {
            value: inner,
            response: None,
        }
    }

    fn attach_response(&mut self, response: ResponseEnvelope) {
        self.response = Some(response);
    }
}

/// Like [`PathExtract`], but places the extracted value into a new container
/// `C` and hands the container the response envelope.
pub struct PathExtractInto<C> {
    path: Path,
    _container: PhantomData<fn() -> C>,
}

impl<C> PathExtractInto<C> {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self {
            path: Path::parse(path)?,
            _container: PhantomData,
        })
    }
}

impl<C> ResponseTransformer for PathExtractInto<C>
where
    C: ExtractContainer,
{
    type Output = Option<C>;

    fn transform(&self, envelope: ResponseEnvelope, serializer: &dyn Serializer) -> Result<Option<C>> {
        if !envelope.has_body() {
            return Ok(None);
        }
        let doc = serializer.parse(envelope.body())?;
        let inner = serializer::extract::<C::Inner>(serializer, &doc, &self.path.to_string())?;
        let mut container = C::wrap(inner);
        container.attach_response(envelope);
        Ok(Some(container))
    }
}
