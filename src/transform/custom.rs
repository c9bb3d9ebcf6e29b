//! Externally supplied response processors and their registry.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use super::ResponseTransformer;
use crate::error::ContractError;
use crate::http::ResponseEnvelope;
use crate::retry::predicate::ResultPredicate;
use crate::serializer::Serializer;

/// A processor that owns the whole response-to-result mapping.
pub trait ResponseProcessor: Send + Sync + 'static {
    type Output: Send;

    fn process_response(&self, envelope: ResponseEnvelope) -> Result<Self::Output>;

    /// Whether [`should_retry`](Self::should_retry) should be consulted by
    /// the retry loop.
    fn has_retry_predicate(&self) -> bool {
        false
    }

    fn should_retry(&self, _envelope: &ResponseEnvelope) -> bool {
        false
    }
}

/// Transformer delegating to a [`ResponseProcessor`].
pub struct Custom<P> {
    processor: Arc<P>,
}

impl<P: ResponseProcessor> Custom<P> {
    /// Delegates to `processor`.
    pub fn new(processor: P) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }

    /// Delegates to a shared processor.
    pub fn from_arc(processor: Arc<P>) -> Self {
        Self { processor }
    }

    /// Looks the processor up in `registry`.
    pub fn from_registry(registry: &ProcessorRegistry) -> Result<Self> {
        Ok(Self::from_arc(registry.resolve::<P>()?))
    }
}

impl<P: ResponseProcessor> ResponseTransformer for Custom<P> {
    type Output = Option<P::Output>;

    fn transform(&self, envelope: ResponseEnvelope, _: &dyn Serializer) -> Result<Self::Output> {
        if !envelope.has_body() {
            return Ok(None);
        }
        self.processor.process_response(envelope).map(Some)
    }

    fn retry_predicate(&self) -> Option<ResultPredicate> {
        if !self.processor.has_retry_predicate() {
            return None;
        }
        let processor = self.processor.clone();
        Some(ResultPredicate::new(move |envelope: &ResponseEnvelope| {
            processor.should_retry(envelope)
        }))
    }
}

/// Registry of response processors keyed by processor type.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor.
    ///
    /// If a processor of the same type is already registered, it will be replaced.
    pub fn register<P: ResponseProcessor>(&mut self, processor: P) {
        self.processors
            .insert(TypeId::of::<P>(), Arc::new(processor));
    }

    /// The registered `P`, if any.
    pub fn get<P: ResponseProcessor>(&self) -> Option<Arc<P>> {
        self.processors
            .get(&TypeId::of::<P>())
            .cloned()
            .and_then(|p| p.downcast::<P>().ok())
    }

    /// Like [`get`](Self::get), failing with a contract error when missing.
    pub fn resolve<P: ResponseProcessor>(&self) -> Result<Arc<P>> {
        self.get::<P>()
            .ok_or_else(|| ContractError::UnknownProcessor(type_name::<P>().to_string()).into())
    }

    /// Whether a `P` is registered.
    pub fn has<P: ResponseProcessor>(&self) -> bool {
        self.processors.contains_key(&TypeId::of::<P>())
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
