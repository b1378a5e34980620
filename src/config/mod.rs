mod composer;
mod model_config;
mod processor_config;

pub use composer::*;
pub use model_config::*;
pub use processor_config::*;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const MODEL_TYPE_KEY: &str = "model_type";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "`feed_forward_proj`: {value} is not a valid activation function of the dense layer. \
         Please make sure `feed_forward_proj` is of the format `gated-{{ACT_FN}}` or `{{ACT_FN}}`, \
         e.g. 'gated-gelu' or 'relu'"
    )]
    InvalidActivation { value: String },
    #[error("the configuration document must be a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A configuration record that can be dumped to, and loaded from, a JSON document.
///
/// Records declare an alias table that maps alternative attribute names to the
/// canonical field they refer to. Aliases are resolved both when reading a
/// document and when accessing a field by name through [SerializableRecord::get].
pub trait SerializableRecord: Serialize + DeserializeOwned {
    /// Written to the `model_type` key of every dumped document.
    const MODEL_TYPE: &'static str;
    /// File name used when the record is stored inside a directory.
    const FILE_NAME: &'static str;
    /// (alias, canonical) pairs.
    const ATTRIBUTE_MAP: &'static [(&'static str, &'static str)] = &[];

    /// Builds the record from a document whose aliases have already been resolved
    /// and whose `model_type` key has been removed.
    fn from_document(document: Map<String, Value>) -> Result<Self, ConfigError>;

    fn canonical_name(name: &str) -> &str {
        Self::ATTRIBUTE_MAP
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(name)
    }

    fn from_json_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(mut document) = value else {
            return Err(ConfigError::NotAnObject);
        };

        if let Some(model_type) = document.remove(MODEL_TYPE_KEY) {
            if model_type.as_str() != Some(Self::MODEL_TYPE) {
                warn!(
                    "Loading a {} configuration from a document with model_type {model_type}",
                    Self::MODEL_TYPE
                );
            }
        }

        // Aliases are applied after the canonical keys, so they win if both are present.
        for (alias, canonical) in Self::ATTRIBUTE_MAP {
            if let Some(value) = document.remove(*alias) {
                if document.contains_key(*canonical) {
                    debug!("`{alias}` overrides `{canonical}`");
                }
                document.insert(canonical.to_string(), value);
            }
        }

        Self::from_document(document)
    }

    fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_json_value(serde_json::from_str(s)?)
    }

    fn from_json_slice(v: &[u8]) -> Result<Self, ConfigError> {
        Self::from_json_value(serde_json::from_slice(v)?)
    }

    fn to_json_value(&self) -> Result<Value, ConfigError> {
        let mut value = serde_json::to_value(self)?;
        match &mut value {
            Value::Object(document) => {
                document.insert(
                    MODEL_TYPE_KEY.to_string(),
                    Value::String(Self::MODEL_TYPE.to_string()),
                );
            }
            _ => return Err(ConfigError::NotAnObject),
        }
        Ok(value)
    }

    fn to_json_string(&self) -> Result<String, ConfigError> {
        let mut s = serde_json::to_string_pretty(&self.to_json_value()?)?;
        s.push('\n');
        Ok(s)
    }

    /// Returns a new record with `changes` applied on top of this one. Keys may be aliases.
    ///
    /// The result goes through the same construction as a loaded document, so derived
    /// fields are recomputed and validation errors are reported.
    fn updated(&self, changes: Map<String, Value>) -> Result<Self, ConfigError> {
        let Value::Object(mut document) = self.to_json_value()? else {
            return Err(ConfigError::NotAnObject);
        };
        for (key, value) in changes {
            document.insert(Self::canonical_name(&key).to_string(), value);
        }
        Self::from_json_value(Value::Object(document))
    }

    /// Reads a field by name, going through the alias table.
    ///
    /// Unrecognized keys that the record carries along are reachable too.
    fn get(&self, name: &str) -> Option<Value> {
        match self.to_json_value() {
            Ok(Value::Object(mut document)) => document.remove(Self::canonical_name(name)),
            _ => None,
        }
    }
}
