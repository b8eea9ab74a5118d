//! Projects the registry's live capability set into the formats language
//! models consume, and serves the JSON-RPC tool protocol on top of it.

#![warn(missing_docs, clippy::pedantic)]

mod projection;
mod protocol;
mod rpc;
mod validation;

pub use projection::{
    CapabilityProjector, FunctionDeclaration, NAME_SEPARATOR, Projection, ProjectionFormat,
    projected_name, split_projected_name,
};
pub use protocol::{ProtocolHandler, TOOLS_CALL, TOOLS_LIST};
pub use rpc::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, RpcError,
    RpcRequest, RpcResponse,
};
pub use validation::{IssueKind, ValidationIssue, validate_call};
