//! Declared shape of a remote service.
//!
//! A [`ServiceInterface`] is what a client proxies: the service name plus the
//! signature of every method it may call. The server derives the same
//! structure from its method table so both ends can be checked against it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::{LodestarError, Result};
use super::types::TypeDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub parameters: Vec<TypeDescriptor>,
    pub returns: TypeDescriptor,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, parameters: Vec<TypeDescriptor>, returns: TypeDescriptor) -> Self {
        MethodSignature {
            name: name.into(),
            parameters,
            returns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInterface {
    pub name: String,
    pub methods: Vec<MethodSignature>,
}

impl ServiceInterface {
    /// Starts declaring an interface for `name`.
    pub fn builder(name: impl Into<String>) -> ServiceInterfaceBuilder {
        ServiceInterfaceBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Checks that this describes a callable service.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the name is empty, no methods are
    /// declared, or two methods share a name and parameter list.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LodestarError::InvalidRequest(
                "service interface must have a name".to_string(),
            ));
        }
        if self.methods.is_empty() {
            return Err(LodestarError::InvalidRequest(format!(
                "{} declares no methods and is not a service interface",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for method in &self.methods {
            if method.name.trim().is_empty() {
                return Err(LodestarError::InvalidRequest(format!(
                    "{} declares a method without a name",
                    self.name
                )));
            }
            if !seen.insert((&method.name, &method.parameters)) {
                return Err(LodestarError::InvalidRequest(format!(
                    "{} declares {} twice with the same parameters",
                    self.name, method.name
                )));
            }
        }

        Ok(())
    }

    /// Finds the declared method a call with `arity` arguments refers to.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if no declared method has that name and
    /// arity, or if more than one does.
    pub fn resolve(&self, method: &str, arity: usize) -> Result<&MethodSignature> {
        let mut candidates = self
            .methods
            .iter()
            .filter(|m| m.name == method && m.parameters.len() == arity);

        match (candidates.next(), candidates.next()) {
            (Some(signature), None) => Ok(signature),
            (Some(_), Some(_)) => Err(LodestarError::InvalidRequest(format!(
                "{}.{} with {} arguments is ambiguous",
                self.name, method, arity
            ))),
            (None, _) => Err(LodestarError::InvalidRequest(format!(
                "{} declares no method {} taking {} arguments",
                self.name, method, arity
            ))),
        }
    }
}

pub struct ServiceInterfaceBuilder {
    name: String,
    methods: Vec<MethodSignature>,
}

impl ServiceInterfaceBuilder {
    pub fn method(
        mut self,
        name: impl Into<String>,
        parameters: Vec<TypeDescriptor>,
        returns: TypeDescriptor,
    ) -> Self {
        self.methods.push(MethodSignature::new(name, parameters, returns));
        self
    }

    pub fn build(self) -> Result<ServiceInterface> {
        let interface = ServiceInterface {
            name: self.name,
            methods: self.methods,
        };
        interface.validate()?;
        Ok(interface)
    }
}
