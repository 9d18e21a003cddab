use crate::error::SignalRClientError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Maps wire values to and from the representation application types use.
///
/// Implementations only rewrite JSON values, e.g. to encode dates in a
/// server-specific format. Typed conversion goes through
/// [`convert_to_wire`](Self::convert_to_wire) and
/// [`convert_from_wire`](Self::convert_from_wire).
pub trait TypeConverter: Send + Sync {
    fn to_wire(&self, value: Value) -> Result<Value, SignalRClientError>;

    fn from_wire(&self, value: Value) -> Result<Value, SignalRClientError>;
}

impl dyn TypeConverter {
    pub fn convert_to_wire<T>(&self, value: &T) -> Result<Value, SignalRClientError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(unsupported_type)?;
        self.to_wire(value)
    }

    pub fn convert_from_wire<T>(&self, value: Value) -> Result<T, SignalRClientError>
    where
        T: DeserializeOwned,
    {
        let value = self.from_wire(value)?;
        serde_json::from_value(value).map_err(unsupported_type)
    }
}

/// Passes JSON values through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTypeConverter;

impl TypeConverter for JsonTypeConverter {
    fn to_wire(&self, value: Value) -> Result<Value, SignalRClientError> {
        Ok(value)
    }

    fn from_wire(&self, value: Value) -> Result<Value, SignalRClientError> {
        Ok(value)
    }
}

fn unsupported_type(error: serde_json::Error) -> SignalRClientError {
    SignalRClientError::UnsupportedType {
        reason: error.to_string(),
    }
}
