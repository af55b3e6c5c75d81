//! Request/response RPC surface over pluggable transports

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::RpcClient;
pub use protocol::{dispatch, required_fields, validate, ErrorBody, Request, Response};
pub use server::{drain, request_channel, PendingRequest, RpcServer, REPLY_DEADLINE};
pub use transport::{ChannelTransport, TcpTransport, Transport};
