//! Socket value codec.
//!
//! A [`SocketValue`] is the boxed value that flows along a data edge: a
//! `(type_name, json_bytes)` pair, serialized on write and decoded on demand.
//! A `None` payload represents the null value and decodes to the target
//! type's [`Default`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Associates a Rust type with the type name recorded alongside its encoded
/// bytes. Implemented for the primitive and container shapes sockets
/// actually carry; node authors reach for `serde_json::Value` directly for
/// anything more exotic.
pub trait TypedValue: Serialize {
    fn type_name() -> &'static str;
}

macro_rules! impl_typed_value {
    ($ty:ty, $name:literal) => {
        impl TypedValue for $ty {
            fn type_name() -> &'static str {
                $name
            }
        }
    };
}

impl_typed_value!(bool, "bool");
impl_typed_value!(i64, "int");
impl_typed_value!(u64, "uint");
impl_typed_value!(f64, "float");
impl_typed_value!(String, "string");
impl_typed_value!(serde_json::Value, "json");

impl<T: TypedValue> TypedValue for Vec<T> {
    fn type_name() -> &'static str {
        // Leaked once per distinct `T`, on the cold "first encode of this
        // element type" path only — acceptable for a process-lifetime string.
        Box::leak(format!("array<{}>", T::type_name()).into_boxed_str())
    }
}

impl<T: TypedValue> TypedValue for Option<T> {
    fn type_name() -> &'static str {
        T::type_name()
    }
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("failed to encode value as {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {type_name} from stored socket value: {source}")]
    Decode {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A typed, boxed value carried on a data socket.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SocketValue {
    type_name: String,
    payload: Option<Vec<u8>>,
}

impl SocketValue {
    /// The null value: an empty payload, type name `"null"`.
    #[must_use]
    pub fn null() -> Self {
        Self {
            type_name: "null".to_string(),
            payload: None,
        }
    }

    /// Box `value` by serializing it to JSON and recording its type name.
    pub fn from_value<T: TypedValue>(value: &T) -> Result<Self, ValueError> {
        let payload = serde_json::to_vec(value).map_err(|source| ValueError::Encode {
            type_name: T::type_name(),
            source,
        })?;
        Ok(Self {
            type_name: T::type_name().to_string(),
            payload: Some(payload),
        })
    }

    /// Decode the boxed value as `T`. An empty payload (the null value)
    /// decodes to `T::default()` rather than erroring.
    pub fn to_value<T: TypedValue + DeserializeOwned + Default>(&self) -> Result<T, ValueError> {
        match &self.payload {
            None => Ok(T::default()),
            Some(bytes) if bytes.is_empty() => Ok(T::default()),
            Some(bytes) => {
                serde_json::from_slice(bytes).map_err(|source| ValueError::Decode {
                    type_name: self.type_name.clone(),
                    source,
                })
            }
        }
    }

    /// The type name recorded at construction time.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether this is the null value (empty payload).
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.payload.is_none()
    }
}

impl Default for SocketValue {
    fn default() -> Self {
        Self::null()
    }
}
