pub mod error;
pub mod instance;
pub mod interface;
pub mod requests;
pub mod responses;
pub mod types;


pub use error::{LodestarError, Result};
pub use instance::{now_millis, Heartbeat, InstanceId, ServiceInstance};
pub use interface::{MethodSignature, ServiceInterface, ServiceInterfaceBuilder};
pub use requests::{generate_call_id, CallId, MethodName, RpcArgs, RpcRequest};
pub use responses::{RemoteError, RpcResponse, RpcResult};
pub use types::{coerce_arguments, RpcType, TypeDescriptor};
