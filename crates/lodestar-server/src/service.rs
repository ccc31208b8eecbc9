//! Service definitions
//!
//! A service is an explicit table of methods built once, keyed by method name
//! and parameter signature. Typed helpers derive the signature from the
//! handler's Rust types, so overloads by parameter type are just distinct
//! entries.

use std::collections::HashMap;
use std::sync::Arc;

use lodestar_common::protocol::{MethodSignature, RpcType, ServiceInterface, TypeDescriptor};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Kind reported when an argument cannot be decoded into the handler's type.
pub const INVALID_ARGUMENT: &str = "InvalidArgument";

/// An error raised by a service method, reported to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: String,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(INVALID_ARGUMENT, message)
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// A type-erased method body.
pub type MethodHandler = Arc<dyn Fn(Vec<Value>) -> ServiceResult<Value> + Send + Sync>;

type MethodKey = (String, Vec<TypeDescriptor>);

struct MethodEntry {
    signature: MethodSignature,
    handler: MethodHandler,
}

/// The methods one service exports.
///
/// # Example
///
/// ```
/// use lodestar_server::{ServiceDefinition, ServiceError};
///
/// let echo = ServiceDefinition::new("Echo")
///     .method1("echo", |s: String| Ok::<_, ServiceError>(s))
///     .method2("add", |a: i64, b: i64| Ok::<_, ServiceError>(a + b));
/// assert_eq!(echo.interface().methods.len(), 2);
/// ```
pub struct ServiceDefinition {
    name: String,
    methods: Vec<MethodEntry>,
    index: HashMap<MethodKey, usize>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a method with an explicit signature.
    ///
    /// Registering the same name and parameter list twice replaces the
    /// earlier handler.
    pub fn method<F>(
        mut self,
        name: impl Into<String>,
        parameters: Vec<TypeDescriptor>,
        returns: TypeDescriptor,
        handler: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> ServiceResult<Value> + Send + Sync + 'static,
    {
        let signature = MethodSignature::new(name, parameters, returns);
        let key = (signature.name.clone(), signature.parameters.clone());
        let entry = MethodEntry {
            signature,
            handler: Arc::new(handler),
        };

        match self.index.get(&key) {
            Some(&slot) => {
                warn!("{}.{} registered twice, keeping the last handler", self.name, key.0);
                self.methods[slot] = entry;
            }
            None => {
                self.index.insert(key, self.methods.len());
                self.methods.push(entry);
            }
        }
        self
    }

    pub fn method0<R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        R: RpcType,
        F: Fn() -> ServiceResult<R> + Send + Sync + 'static,
    {
        self.method(name, vec![], R::descriptor(), move |_args| encode(f()?))
    }

    pub fn method1<A, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: RpcType,
        R: RpcType,
        F: Fn(A) -> ServiceResult<R> + Send + Sync + 'static,
    {
        self.method(name, vec![A::descriptor()], R::descriptor(), move |args| {
            let mut args = args.into_iter();
            let a = decode(args.next())?;
            encode(f(a)?)
        })
    }

    pub fn method2<A, B, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: RpcType,
        B: RpcType,
        R: RpcType,
        F: Fn(A, B) -> ServiceResult<R> + Send + Sync + 'static,
    {
        self.method(
            name,
            vec![A::descriptor(), B::descriptor()],
            R::descriptor(),
            move |args| {
                let mut args = args.into_iter();
                let a = decode(args.next())?;
                let b = decode(args.next())?;
                encode(f(a, b)?)
            },
        )
    }

    pub fn method3<A, B, C, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        A: RpcType,
        B: RpcType,
        C: RpcType,
        R: RpcType,
        F: Fn(A, B, C) -> ServiceResult<R> + Send + Sync + 'static,
    {
        self.method(
            name,
            vec![A::descriptor(), B::descriptor(), C::descriptor()],
            R::descriptor(),
            move |args| {
                let mut args = args.into_iter();
                let a = decode(args.next())?;
                let b = decode(args.next())?;
                let c = decode(args.next())?;
                encode(f(a, b, c)?)
            },
        )
    }

    /// Finds the handler for an exact name and parameter signature.
    pub fn handler(&self, method: &str, parameters: &[TypeDescriptor]) -> Option<MethodHandler> {
        self.index
            .get(&(method.to_string(), parameters.to_vec()))
            .map(|&slot| self.methods[slot].handler.clone())
    }

    /// The interface a client needs to call this service.
    pub fn interface(&self) -> ServiceInterface {
        ServiceInterface {
            name: self.name.clone(),
            methods: self.methods.iter().map(|m| m.signature.clone()).collect(),
        }
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> ServiceResult<T> {
    serde_json::from_value(value.unwrap_or(Value::Null))
        .map_err(|e| ServiceError::invalid_argument(e.to_string()))
}

fn encode<T: Serialize>(value: T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(|e| ServiceError::new("SerializationError", e.to_string()))
}
