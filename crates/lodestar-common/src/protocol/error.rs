use thiserror::Error;

/// Errors produced anywhere in a Lodestar call lifecycle.
///
/// Codec and transport failures fail only the call that hit them. A failure
/// raised by the remote method itself travels inside a well-formed response
/// and surfaces as [`LodestarError::RemoteInvocation`].
#[derive(Error, Debug)]
pub enum LodestarError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC call {service}.{method} timed out after {timeout_ms}ms")]
    RpcTimeout {
        service: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("No available instances for service: {0}")]
    NoInstances(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("{message}")]
    RemoteInvocation {
        service: String,
        method: String,
        kind: String,
        message: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LodestarError {
    /// Short, stable name of the error category.
    ///
    /// Used as the `kind` of a remote error when a local failure has to be
    /// reported back over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            LodestarError::Serialization(_) => "SerializationError",
            LodestarError::Transport(_) => "TransportError",
            LodestarError::RpcTimeout { .. } => "RpcTimeoutError",
            LodestarError::NoInstances(_) => "NoInstancesError",
            LodestarError::InvalidState(_) => "InvalidStateError",
            LodestarError::Discovery(_) => "DiscoveryError",
            LodestarError::RemoteInvocation { .. } => "RemoteInvocationError",
            LodestarError::InvalidRequest(_) => "InvalidRequest",
            LodestarError::InvalidResponse(_) => "InvalidResponse",
            LodestarError::Registry(_) => "RegistryError",
            LodestarError::Config(_) => "ConfigError",
            LodestarError::Io(_) => "IoError",
        }
    }
}

impl From<serde_json::Error> for LodestarError {
    fn from(err: serde_json::Error) -> Self {
        LodestarError::Serialization(err.to_string())
    }
}

impl From<std::net::AddrParseError> for LodestarError {
    fn from(err: std::net::AddrParseError) -> Self {
        LodestarError::InvalidRequest(err.to_string())
    }
}

impl From<uuid::Error> for LodestarError {
    fn from(err: uuid::Error) -> Self {
        LodestarError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LodestarError>;
