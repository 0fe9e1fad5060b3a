//! Loopback wire between one client and one world session.
//!
//! Every message is encoded with the wire codec on send and decoded on
//! receipt, exactly as it would be on a real connection. Encoding happens
//! inside the sink so that a message the codec refuses is reported to the
//! sender; decoding happens in a pump task on the receiving side. A frame
//! that fails to decode is fatal to the connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use telemetry_protocol::{
    C2SRequest, ProtocolError, RequestSink, ResponseSink, S2CResponse, TransportError,
};
use telemetry_sync::{SyncManagerClient, SyncManagerServer};
use telemetry_types::ClientId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

fn encode_error(err: &ProtocolError) -> TransportError {
    TransportError::Encode {
        reason: err.to_string(),
    }
}

/// Client-side sink writing encoded requests to the loopback.
#[derive(Debug)]
pub struct WireRequestSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl WireRequestSink {
    /// Create a sink and the receiving end of its frames.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RequestSink for WireRequestSink {
    fn send_to_server(&self, request: C2SRequest) -> Result<(), TransportError> {
        let frame = request.to_bytes().map_err(|err| encode_error(&err))?;
        self.tx.send(frame).map_err(|_closed| TransportError::Closed)
    }
}

/// Server-side sink encoding each response once and fanning the frame out.
#[derive(Debug, Default)]
pub struct WireResponseSink {
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<Bytes>>>,
}

impl WireResponseSink {
    /// Create a sink with no connected clients.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `client`, returning the receiving end of its frames.
    pub fn connect(&self, client: ClientId) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client, tx);
        rx
    }
}

impl ResponseSink for WireResponseSink {
    fn send_to_clients(
        &self,
        clients: &[ClientId],
        response: &S2CResponse,
    ) -> Result<(), TransportError> {
        let frame = response.to_bytes().map_err(|err| encode_error(&err))?;
        let senders = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let mut first_error = None;
        for client in clients {
            let result = senders
                .get(client)
                .ok_or(TransportError::UnknownClient(*client))
                .and_then(|tx| tx.send(frame.clone()).map_err(|_closed| TransportError::Closed));
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Feed request frames from `client` into the session until the token is
/// cancelled or the wire closes.
pub fn spawn_server_pump(
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    client: ClientId,
    server: Arc<SyncManagerServer>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                () = token.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            match C2SRequest::decode_exact(frame) {
                Ok(request) => {
                    let registered = server.handle_request(client, &request);
                    trace!(client = %client, location = %request.location, registered, "request handled");
                }
                Err(err) => {
                    warn!(client = %client, error = %err, "malformed request, dropping connection");
                    break;
                }
            }
        }
        debug!(client = %client, "server pump stopped");
    })
}

/// Feed response frames into the client manager until the token is
/// cancelled or the wire closes.
pub fn spawn_client_pump(
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    manager: Arc<SyncManagerClient>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                () = token.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let response = match S2CResponse::decode_exact(frame) {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "malformed response, dropping connection");
                    break;
                }
            };
            if let Err(err) = manager.accept_response(&response) {
                warn!(location = %response.location, error = %err, "response not dispatched");
            }
        }
        debug!("client pump stopped");
    })
}
