//! Lodestar Type Descriptors
//!
//! Arguments and results travel type-erased as JSON values. The receiving
//! side only learns the intended type from the descriptor carried alongside
//! the value (a request's `parameter_signature`, or the return type declared
//! in a [`ServiceInterface`](super::ServiceInterface)), and uses it to coerce
//! the raw value before handing it to typed code.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::error::{LodestarError, Result};

/// Names the type of a parameter or return value on the wire.
///
/// Serialized self-describingly: scalar descriptors are plain strings
/// (`"int"`, `"string"`) and lists nest their element type
/// (`{"list": "int"}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDescriptor {
    Bool,
    Int,
    Float,
    String,
    Unit,
    Any,
    Map,
    List(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Shorthand for `List(Box::new(inner))`.
    pub fn list(inner: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(inner))
    }

    /// Coerces a raw JSON value into the shape this descriptor names.
    ///
    /// Coercion is lenient in the same places a JSON data binder usually is:
    /// integral floats and numeric strings become integers, scalars become
    /// strings when a string is expected, list elements are coerced
    /// recursively. `null` is passed through untouched so optional values
    /// survive; whether it is acceptable is decided by the typed consumer.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when the value cannot represent the type.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            TypeDescriptor::Any => Ok(value),
            TypeDescriptor::Unit => Ok(Value::Null),
            TypeDescriptor::Bool => match value {
                Value::Bool(_) => Ok(value),
                Value::String(ref s) => match s.trim() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(self.mismatch(&value)),
                },
                _ => Err(self.mismatch(&value)),
            },
            TypeDescriptor::Int => match &value {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(Value::from(i))
                    } else if let Some(f) = n.as_f64() {
                        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                            Ok(Value::from(f as i64))
                        } else {
                            Err(self.mismatch(&value))
                        }
                    } else {
                        Err(self.mismatch(&value))
                    }
                }
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| self.mismatch(&value)),
                _ => Err(self.mismatch(&value)),
            },
            TypeDescriptor::Float => {
                let float = match &value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                float
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| self.mismatch(&value))
            }
            TypeDescriptor::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(self.mismatch(&value)),
            },
            TypeDescriptor::Map => match value {
                Value::Object(_) => Ok(value),
                _ => Err(self.mismatch(&value)),
            },
            TypeDescriptor::List(inner) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| inner.coerce(item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                _ => Err(self.mismatch(&value)),
            },
        }
    }

    fn mismatch(&self, value: &Value) -> LodestarError {
        LodestarError::Serialization(format!("cannot coerce {} into {}", value, self))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Bool => write!(f, "bool"),
            TypeDescriptor::Int => write!(f, "int"),
            TypeDescriptor::Float => write!(f, "float"),
            TypeDescriptor::String => write!(f, "string"),
            TypeDescriptor::Unit => write!(f, "unit"),
            TypeDescriptor::Any => write!(f, "any"),
            TypeDescriptor::Map => write!(f, "map"),
            TypeDescriptor::List(inner) => write!(f, "list<{}>", inner),
        }
    }
}

/// Coerces a list of arguments against a parameter signature, position by
/// position.
///
/// # Errors
///
/// Returns `Serialization` on an arity mismatch or when any argument fails
/// to coerce.
pub fn coerce_arguments(signature: &[TypeDescriptor], arguments: Vec<Value>) -> Result<Vec<Value>> {
    if signature.len() != arguments.len() {
        return Err(LodestarError::Serialization(format!(
            "expected {} arguments, got {}",
            signature.len(),
            arguments.len()
        )));
    }

    signature
        .iter()
        .zip(arguments)
        .map(|(descriptor, value)| descriptor.coerce(value))
        .collect()
}

/// Rust types that can cross the wire as an argument or a result.
///
/// Ties a Rust type to the descriptor that names it, so typed service
/// methods can derive their signatures instead of spelling them out.
pub trait RpcType: Serialize + DeserializeOwned + Send + 'static {
    fn descriptor() -> TypeDescriptor;
}

macro_rules! rpc_type {
    ($descriptor:expr => $($ty:ty),+) => {
        $(
            impl RpcType for $ty {
                fn descriptor() -> TypeDescriptor {
                    $descriptor
                }
            }
        )+
    };
}

rpc_type!(TypeDescriptor::Bool => bool);
rpc_type!(TypeDescriptor::Int => i8, i16, i32, i64, u8, u16, u32, u64, usize);
rpc_type!(TypeDescriptor::Float => f32, f64);
rpc_type!(TypeDescriptor::String => String);
rpc_type!(TypeDescriptor::Unit => ());
rpc_type!(TypeDescriptor::Any => Value);
rpc_type!(TypeDescriptor::Map => HashMap<String, Value>, serde_json::Map<String, Value>);

impl<T: RpcType> RpcType for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::list(T::descriptor())
    }
}

impl<T: RpcType> RpcType for Option<T> {
    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_wire_format() {
        assert_eq!(serde_json::to_value(TypeDescriptor::Int).unwrap(), json!("int"));
        assert_eq!(
            serde_json::to_value(TypeDescriptor::list(TypeDescriptor::String)).unwrap(),
            json!({"list": "string"})
        );

        let parsed: TypeDescriptor = serde_json::from_value(json!({"list": {"list": "float"}})).unwrap();
        assert_eq!(parsed, TypeDescriptor::list(TypeDescriptor::list(TypeDescriptor::Float)));
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(TypeDescriptor::Int.coerce(json!(7)).unwrap(), json!(7));
        assert_eq!(TypeDescriptor::Int.coerce(json!(7.0)).unwrap(), json!(7));
        assert_eq!(TypeDescriptor::Int.coerce(json!("42")).unwrap(), json!(42));
        assert!(TypeDescriptor::Int.coerce(json!(7.5)).is_err());
        assert!(TypeDescriptor::Int.coerce(json!("seven")).is_err());
        assert!(TypeDescriptor::Int.coerce(json!([1])).is_err());
    }

    #[test]
    fn test_coerce_int_rejects_out_of_range_floats() {
        // 2^63 is one past i64::MAX and would saturate if cast
        assert!(TypeDescriptor::Int.coerce(json!(9223372036854775808.0)).is_err());
        assert!(TypeDescriptor::Int.coerce(json!(1e19)).is_err());
        assert!(TypeDescriptor::Int.coerce(json!(u64::MAX)).is_err());
        assert_eq!(
            TypeDescriptor::Int.coerce(json!(-9223372036854775808.0)).unwrap(),
            json!(i64::MIN)
        );
    }

    #[test]
    fn test_coerce_float_and_bool() {
        assert_eq!(TypeDescriptor::Float.coerce(json!(3)).unwrap(), json!(3.0));
        assert_eq!(TypeDescriptor::Float.coerce(json!("2.5")).unwrap(), json!(2.5));
        assert_eq!(TypeDescriptor::Bool.coerce(json!("true")).unwrap(), json!(true));
        assert!(TypeDescriptor::Bool.coerce(json!(1)).is_err());
    }

    #[test]
    fn test_coerce_string_from_scalars() {
        assert_eq!(TypeDescriptor::String.coerce(json!(12)).unwrap(), json!("12"));
        assert_eq!(TypeDescriptor::String.coerce(json!(false)).unwrap(), json!("false"));
        assert!(TypeDescriptor::String.coerce(json!({"a": 1})).is_err());
    }

    #[test]
    fn test_coerce_nested_list() {
        let descriptor = TypeDescriptor::list(TypeDescriptor::Int);
        assert_eq!(descriptor.coerce(json!([1, "2", 3.0])).unwrap(), json!([1, 2, 3]));
        assert!(descriptor.coerce(json!([1, "x"])).is_err());
        assert!(descriptor.coerce(json!("not a list")).is_err());
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(TypeDescriptor::Int.coerce(Value::Null).unwrap(), Value::Null);
        assert_eq!(TypeDescriptor::Map.coerce(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_unit_discards_value() {
        assert_eq!(TypeDescriptor::Unit.coerce(json!("ignored")).unwrap(), Value::Null);
    }

    #[test]
    fn test_coerce_arguments_arity() {
        let signature = vec![TypeDescriptor::Int, TypeDescriptor::String];
        let coerced = coerce_arguments(&signature, vec![json!("1"), json!(2)]).unwrap();
        assert_eq!(coerced, vec![json!(1), json!("2")]);

        let err = coerce_arguments(&signature, vec![json!(1)]).unwrap_err();
        assert!(matches!(err, LodestarError::Serialization(_)));
    }

    #[test]
    fn test_rpc_type_descriptors() {
        assert_eq!(<i32 as RpcType>::descriptor(), TypeDescriptor::Int);
        assert_eq!(<Vec<String> as RpcType>::descriptor(), TypeDescriptor::list(TypeDescriptor::String));
        assert_eq!(<Option<f64> as RpcType>::descriptor(), TypeDescriptor::Float);
        assert_eq!(<() as RpcType>::descriptor(), TypeDescriptor::Unit);
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeDescriptor::list(TypeDescriptor::Map).to_string(), "list<map>");
    }
}
