//! Pluggable object formatter for `Object` records.
//!
//! The codec never inspects object payloads; it hands them to an
//! [`ObjectFormatter`] passed explicitly into each encode/decode call.
//! Object values travel through the codec as an [`ObjectValue`]: a declared
//! type name plus a dynamic `serde_json::Value`.  [`JsonFormatter`] is the
//! stock implementation.

use serde::{de::DeserializeOwned, Serialize};
use crate::error::{FormatError, Result};

/// A dynamically-typed object value and the name of the type it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub type_name: String,
    pub value:     serde_json::Value,
}

impl ObjectValue {
    pub fn new(type_name: impl Into<String>, value: serde_json::Value) -> Self {
        Self { type_name: type_name.into(), value }
    }

    /// Capture a typed value; the declared type name is `std::any::type_name::<T>()`.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| FormatError::Serialization(e.to_string()))?;
        Ok(Self::new(std::any::type_name::<T>(), value))
    }

    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            FormatError::Deserialization(format!("object of type {}: {e}", self.type_name))
        })
    }
}

/// Capability turning object values into payload bytes and back.
///
/// Implementations must be shareable across threads so writers and
/// [`ResourceFile`](crate::container::ResourceFile) handles can move between them.
pub trait ObjectFormatter: Send + Sync {
    fn serialize(&self, value: &ObjectValue) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8], type_name: &str) -> Result<ObjectValue>;
}

/// Stores objects as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl ObjectFormatter for JsonFormatter {
    fn serialize(&self, value: &ObjectValue) -> Result<Vec<u8>> {
        serde_json::to_vec(&value.value).map_err(|e| FormatError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8], type_name: &str) -> Result<ObjectValue> {
        let value = serde_json::from_slice(bytes).map_err(|e| {
            FormatError::Deserialization(format!("object of type {type_name}: {e}"))
        })?;
        Ok(ObjectValue::new(type_name, value))
    }
}
