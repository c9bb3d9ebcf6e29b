//! Response transformers.
//!
//! A transformer turns the raw [`ResponseEnvelope`] of a call into the
//! caller's result type. Pick the variant matching the declared return shape:
//!
//! - [`Raw`] - the envelope itself
//! - [`Whole`] - the whole body deserialized as `T`
//! - [`PathExtract`] / [`PathExtractInto`] - a sub-value selected by path
//! - [`ModelProperty`] - one named property of a parsed model
//! - [`Custom`] - an externally supplied [`ResponseProcessor`]
//!
//! Every variant except [`Raw`] short-circuits an empty body to `None`
//! without parsing. Transformer failures are contract errors and are never
//! retried.

mod custom;
mod extract;
mod model;

use std::marker::PhantomData;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::http::ResponseEnvelope;
use crate::retry::predicate::ResultPredicate;
use crate::serializer::{self, Serializer};

pub use custom::{Custom, ProcessorRegistry, ResponseProcessor};
pub use extract::{ExtractContainer, PathExtract, PathExtractInto, WithResponse};
pub use model::ModelProperty;

pub trait ResponseTransformer: Send + Sync {
    type Output: Send;

    fn transform(
        &self,
        envelope: ResponseEnvelope,
        serializer: &dyn Serializer,
    ) -> Result<Self::Output>;

    /// Extra retry predicate over raw responses, consulted by the retry loop
    /// after the operation's own result predicates.
    fn retry_predicate(&self) -> Option<ResultPredicate> {
        None
    }
}

/// Returns the envelope unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl ResponseTransformer for Raw {
    type Output = ResponseEnvelope;

    fn transform(&self, envelope: ResponseEnvelope, _: &dyn Serializer) -> Result<ResponseEnvelope> {
        Ok(envelope)
    }
}

/// Deserializes the whole body as `T`.
pub struct Whole<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> Whole<T> {
    /// A transformer for `T`.
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for Whole<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResponseTransformer for Whole<T>
where
    T: DeserializeOwned + Send,
{
    type Output = Option<T>;

    fn transform(&self, envelope: ResponseEnvelope, serializer: &dyn Serializer) -> Result<Option<T>> {
        if !envelope.has_body() {
            return Ok(None);
        }
        serializer::deserialize(serializer, envelope.body()).map(Some)
    }
}
