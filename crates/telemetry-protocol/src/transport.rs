//! Transport seams between the sync managers and the network.
//!
//! Both traits are synchronous and must not block: the managers call them
//! while holding their own table locks. Implementations must never call
//! back into a manager from inside a send.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use telemetry_types::ClientId;
use tokio::sync::mpsc;

use crate::request::C2SRequest;
use crate::response::S2CResponse;

/// Errors raised when a message cannot be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The other end of the channel is gone.
    #[error("transport channel closed")]
    Closed,

    /// No channel is registered for the client.
    #[error("no connection for client {0}")]
    UnknownClient(ClientId),

    /// A wire transport could not encode the message.
    #[error("message could not be encoded: {reason}")]
    Encode {
        /// The codec's description of the failure.
        reason: String,
    },
}

/// Client-side outbound path: hands requests to the server connection.
pub trait RequestSink: Send + Sync {
    /// Queue `request` for delivery to the server.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connection is gone.
    fn send_to_server(&self, request: C2SRequest) -> Result<(), TransportError>;
}

/// Server-side outbound path: fans one response out to several clients.
pub trait ResponseSink: Send + Sync {
    /// Queue `response` for delivery to every client in `clients`.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransportError`] encountered; delivery to the
    /// remaining clients is still attempted.
    fn send_to_clients(
        &self,
        clients: &[ClientId],
        response: &S2CResponse,
    ) -> Result<(), TransportError>;
}

/// [`RequestSink`] backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelRequestSink {
    tx: mpsc::UnboundedSender<C2SRequest>,
}

impl ChannelRequestSink {
    /// Create a sink and the receiver the server side reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<C2SRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RequestSink for ChannelRequestSink {
    fn send_to_server(&self, request: C2SRequest) -> Result<(), TransportError> {
        self.tx.send(request).map_err(|_closed| TransportError::Closed)
    }
}

/// [`ResponseSink`] holding one unbounded channel per connected client.
#[derive(Debug, Default)]
pub struct ChannelResponseSink {
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<S2CResponse>>>,
}

impl ChannelResponseSink {
    /// Create a sink with no connected clients.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` and return the receiver its responses arrive on.
    /// A previous registration for the same client is replaced.
    pub fn connect(&self, client: ClientId) -> mpsc::UnboundedReceiver<S2CResponse> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client, tx);
        rx
    }

    /// Forget `client`. Returns whether it was connected.
    pub fn disconnect(&self, client: ClientId) -> bool {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&client)
            .is_some()
    }
}

impl ResponseSink for ChannelResponseSink {
    fn send_to_clients(
        &self,
        clients: &[ClientId],
        response: &S2CResponse,
    ) -> Result<(), TransportError> {
        let senders = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let mut first_error = None;
        for client in clients {
            let result = senders
                .get(client)
                .ok_or(TransportError::UnknownClient(*client))
                .and_then(|tx| {
                    tx.send(response.clone())
                        .map_err(|_closed| TransportError::Closed)
                });
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
