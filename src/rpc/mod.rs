//! Session RPC between gateway nodes and the logic tier
//!
//! Requests travel as NATS request/reply on `<prefix>.<method>` with JSON
//! bodies. Online-count renewal is gzip-compressed.

pub mod client;
pub mod codec;
pub mod messages;
pub mod server;
pub mod service;

pub use client::LogicClient;
pub use messages::{
    ConnectReply, ConnectReq, DisconnectReply, DisconnectReq, HeartbeatReq, OnlineReply, OnlineReq,
    ReceiveReq, RpcResult,
};
pub use server::RpcServer;
pub use service::LogicRpc;
