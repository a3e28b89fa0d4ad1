//! In-process transport. Every dial produces a [`LoopbackPeer`] that plays
//! the central system side of the connection.

use crate::{
    error::{TransportError, TransportResult},
    ChannelTransport, Connection, ConnectionInfo, ConnectionState, Dialer, Outbound, SharedState,
    TransportEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Dialer whose connections are delivered to an in-process acceptor
#[derive(Clone)]
pub struct LoopbackDialer {
    accept_tx: mpsc::UnboundedSender<LoopbackPeer>,
    max_message_size: usize,
}

impl LoopbackDialer {
    /// Create a dialer and the receiver that yields one peer per dial
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                accept_tx,
                max_message_size: 65536,
            },
            accept_rx,
        )
    }
}

#[async_trait::async_trait]
impl Dialer for LoopbackDialer {
    async fn dial(&self, url: &str) -> TransportResult<Connection> {
        let (connection, peer) = pair(url, self.max_message_size);
        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::connection("connection refused"))?;
        Ok(connection)
    }
}

/// Build a connected client/peer pair without going through a dialer
pub fn pair(url: &str, max_message_size: usize) -> (Connection, LoopbackPeer) {
    let info = ConnectionInfo::new(url);
    let state = SharedState::new(ConnectionState::Connected);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let transport = ChannelTransport::new(info.id, outbound_tx, state.clone(), max_message_size);
    let peer = LoopbackPeer {
        url: url.to_string(),
        inbound: outbound_rx,
        events: events_tx,
        state,
    };

    (
        Connection {
            transport: Arc::new(transport),
            events: events_rx,
            info,
        },
        peer,
    )
}

/// Central system end of a loopback connection
pub struct LoopbackPeer {
    url: String,
    inbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: SharedState,
}

impl LoopbackPeer {
    /// URL the client dialed
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Last path segment of the dialed URL
    pub fn charge_point_id(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or_default()
    }

    /// Next frame from the client; `None` once the client has closed
    pub async fn recv(&mut self) -> Option<String> {
        match self.inbound.recv().await {
            Some(Outbound::Text(text)) => Some(text),
            Some(Outbound::Close) | None => {
                self.finish("closed by client");
                None
            }
        }
    }

    /// Deliver a frame to the client
    pub fn send(&self, text: impl Into<String>) -> TransportResult<()> {
        if self.state.get() == ConnectionState::Closed {
            return Err(TransportError::closed("client gone"));
        }
        self.events
            .send(TransportEvent::Message(text.into()))
            .map_err(|_| TransportError::closed("client gone"))
    }

    /// Report a read error to the client, then close
    pub fn fail(&self, error: TransportError) {
        let reason = error.to_string();
        let _ = self.events.send(TransportEvent::Error(error));
        self.finish(&reason);
    }

    /// Close from the central system side
    pub fn close(&self, reason: &str) {
        self.finish(reason);
    }

    pub fn is_closed(&self) -> bool {
        self.state.get() == ConnectionState::Closed
    }

    fn finish(&self, reason: &str) {
        if self.state.get() == ConnectionState::Closed {
            return;
        }
        debug!("Loopback connection {} closed: {}", self.url, reason);
        self.state.set(ConnectionState::Closed);
        let _ = self.events.send(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }
}

impl Drop for LoopbackPeer {
    fn drop(&mut self) {
        self.finish("peer dropped");
    }
}
