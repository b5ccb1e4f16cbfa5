//! `rdk-rpc` – resources over the network.
//!
//! Exposes every API of a robot on a WebSocket endpoint and lets other
//! processes (or other robots) call into it through typed client stubs.
//!
//! # Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`wire`] | JSON [`Frame`]s and method paths |
//! | [`flow`] | per-call credit windows |
//! | [`service`] | [`ApiServer`] method tables (unary, client/server streaming, bidi) |
//! | [`server`] | [`RpcServer`] accept loop and per-connection multiplexing |
//! | [`client`] | [`dial`] and [`ClientConn`] |
//! | [`registry`] | [`ServiceRegistry`] of per-API server and client factories |

pub mod client;
pub mod flow;
pub mod registry;
pub mod server;
pub mod service;
pub mod wire;

pub use client::{ClientConn, DEFAULT_DIAL_TIMEOUT, DialOptions, dial};
pub use flow::CALL_WINDOW;
pub use registry::ServiceRegistry;
pub use server::RpcServer;
pub use service::{ApiServer, MethodKind, RequestStream, ResponseStream, RpcService};
pub use wire::{Frame, RpcMessage, method_path};

pub use futures_util::stream::BoxStream;
