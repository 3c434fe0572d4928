use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::binding::BindingSetter;
use crate::controller::{FormController, FormError, FormOptions, FormResult, read_lock};
use crate::path::IntoFieldPath;
use crate::rules::ValidationOptions;

/// Typed handle on one top-level field of a `FormModel`.
pub trait FieldLens: IntoFieldPath + Copy + Send + Sync + 'static {
    type Model: FormModel;
    type Value: Serialize + DeserializeOwned;

    fn name(self) -> &'static str;
}

pub trait FormModel: Serialize + DeserializeOwned {
    type Fields;

    fn fields() -> Self::Fields;
}

impl FormController {
    /// A controller whose defaults are the serialized `model`.
    pub fn from_model<M>(model: &M, options: FormOptions) -> FormResult<Self>
    where
        M: FormModel,
    {
        let defaults = serde_json::to_value(model)
            .map_err(|error| FormError::Serialization(error.to_string()))?;
        Ok(Self::new(defaults, options))
    }

    pub fn register_field<L>(&self, lens: L, options: ValidationOptions) -> FormResult<BindingSetter>
    where
        L: FieldLens,
    {
        self.register(lens, options)
    }

    pub fn set_field<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens,
    {
        let value = serde_json::to_value(value)
            .map_err(|error| FormError::Serialization(error.to_string()))?;
        self.set_value(lens, value)
    }

    pub async fn set_field_and_validate<L>(&self, lens: L, value: L::Value) -> FormResult<bool>
    where
        L: FieldLens,
    {
        let value = serde_json::to_value(value)
            .map_err(|error| FormError::Serialization(error.to_string()))?;
        self.set_value_and_validate(lens, value).await
    }

    /// `None` when the form holds nothing at the lens path.
    pub fn field_value<L>(&self, lens: L) -> FormResult<Option<L::Value>>
    where
        L: FieldLens,
    {
        let Some(value) = self.value(lens)? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|error| FormError::Serialization(format!("{}: {error}", lens.name())))
    }

    pub fn model<M>(&self) -> FormResult<M>
    where
        M: FormModel,
    {
        serde_json::from_value(self.values()?)
            .map_err(|error| FormError::Serialization(error.to_string()))
    }

    pub fn default_model<M>(&self) -> FormResult<M>
    where
        M: FormModel,
    {
        let baseline = read_lock(&self.state, "reading default values")?
            .tracker
            .baseline()
            .clone();
        serde_json::from_value(baseline).map_err(|error| FormError::Serialization(error.to_string()))
    }
}
