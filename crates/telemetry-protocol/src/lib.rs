//! Wire messages and transport seams for the observation subscription
//! protocol.
//!
//! Two messages cross the wire:
//!
//! - [`C2SRequest`] -- client to server: a location, a [`RequestKind`]
//!   (`Stop`, `Single`, `Keepalive`, `KeepaliveStart`) and an optional
//!   client tick.
//! - [`S2CResponse`] -- server to client: a location, the observation
//!   snapshot, and an optional server tick.
//!
//! The transport itself is not implemented here. It is assumed to be an
//! ordered, reliable, authenticated per-client channel; the
//! [`RequestSink`] and [`ResponseSink`] traits are the narrow seams the
//! managers send through.
//!
//! # Modules
//!
//! - [`codec`] -- varint, string, location and optional-tick primitives
//! - [`error`] -- [`ProtocolError`]
//! - [`request`] -- [`C2SRequest`], [`RequestKind`], [`TickInterval`]
//! - [`response`] -- [`S2CResponse`] and the snapshot codec
//! - [`transport`] -- sink traits and in-memory channel transports

pub mod codec;
pub mod error;
pub mod request;
pub mod response;
pub mod transport;

pub use error::ProtocolError;
pub use request::{C2SRequest, MAX_TICK_INTERVAL, RequestKind, TickInterval};
pub use response::S2CResponse;
pub use transport::{
    ChannelRequestSink, ChannelResponseSink, RequestSink, ResponseSink, TransportError,
};
