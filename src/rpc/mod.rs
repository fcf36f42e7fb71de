//! Backend collaborators: method schemas and the RPC transport

pub mod local;
pub mod schema;
pub mod transport;

pub use local::{AsyncMethod, LocalTransport};
pub use schema::{MethodDescriptor, ParamSpec, SchemaRegistry, StaticSchemaRegistry};
pub use transport::{
    Completion, PendingCall, RpcError, RpcReply, RpcRequest, RpcTransport, UpstreamResult,
};
