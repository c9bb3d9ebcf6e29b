//! Model-projection transformer.

use std::any::type_name;
use std::marker::PhantomData;

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::ResponseTransformer;
use crate::error::ContractError;
use crate::http::ResponseEnvelope;
use crate::serializer::{self, Serializer};

/// Parses the body as model `M` and returns its property `property` as `T`.
///
/// Property names are the model's serialized field names, so serde renames
/// apply. An absent property or a value not convertible to `T` is a
/// [`ContractError`].
pub struct ModelProperty<M, T> {
    property: String,
    _types: PhantomData<fn() -> (M, T)>,
}

impl<M, T> ModelProperty<M, T> {
    /// Projects `property` out of a parsed `M`.
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            _types: PhantomData,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }
}

impl<M, T> ResponseTransformer for ModelProperty<M, T>
where
    M: DeserializeOwned + Serialize,
    T: DeserializeOwned + Send,
{
    type Output = Option<T>;

    fn transform(&self, envelope: ResponseEnvelope, serializer: &dyn Serializer) -> Result<Option<T>> {
        if !envelope.has_body() {
            return Ok(None);
        }
        let model: M = serializer::deserialize(serializer, envelope.body())?;
        let doc = serde_json::to_value(&model).map_err(|e| ContractError::TypeMismatch {
            location: "$".to_string(),
            target: type_name::<M>().to_string(),
            reason: e.to_string(),
        })?;

        let value = doc
            .as_object()
            .and_then(|fields| fields.get(&self.property))
            .cloned()
            .ok_or_else(|| ContractError::MissingProperty {
                model: type_name::<M>().to_string(),
                property: self.property.clone(),
            })?;

        serializer::coerce(value, &self.property).map(Some)
    }
}
