//! # OCPP Transport
//!
//! Charge-point side transport for OCPP-J. A [`Dialer`] opens a
//! [`Connection`]: a [`Transport`] handle for outbound text frames plus a
//! channel of [`TransportEvent`]s for everything the peer sends. The
//! WebSocket dialer is used against real central systems, the loopback
//! dialer lets tests script a central system in-process.

pub mod error;
pub mod loopback;
pub mod websocket;

pub use error::*;
pub use loopback::{LoopbackDialer, LoopbackPeer};
pub use websocket::WebSocketDialer;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// WebSocket sub-protocol requested during the handshake
    pub sub_protocol: String,
    /// Accept self-signed or otherwise invalid server certificates
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 65536, // 64KB
            connection_timeout: Duration::from_secs(30),
            sub_protocol: ocpp_types::OCPP16_SUBPROTOCOL.to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is being established
    Connecting,
    /// Connection is established and ready
    Connected,
    /// Connection is being closed
    Closing,
    /// Connection is closed
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Something that happened on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Text frame received from the peer
    Message(String),
    /// Connection closed, by either side
    Closed { reason: String },
    /// Read error; a `Closed` event follows
    Error(TransportError),
}

/// Outbound half of a connection
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send a text frame
    async fn send_text(&self, text: String) -> TransportResult<()>;

    /// Start closing the connection. Does not wait for the peer.
    async fn close(&self) -> TransportResult<()>;

    /// Get connection state
    fn state(&self) -> ConnectionState;

    /// Get connection ID
    fn connection_id(&self) -> Uuid;
}

/// Opens connections to a central system
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, url: &str) -> TransportResult<Connection>;
}

/// An open connection
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub info: ConnectionInfo,
}

/// Connection information
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: Uuid,
    /// URL that was dialed
    pub url: String,
    /// Connected timestamp
    pub connected_at: chrono::DateTime<chrono::Utc>,
    /// Sub-protocol agreed by the server
    pub sub_protocol: Option<String>,
}

impl ConnectionInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            connected_at: chrono::Utc::now(),
            sub_protocol: None,
        }
    }
}

pub(crate) enum Outbound {
    Text(String),
    Close,
}

/// Shared state cell so the IO tasks and the handle agree on the state
#[derive(Clone)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// [`Transport`] that hands frames to a writer task over a channel
pub(crate) struct ChannelTransport {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Outbound>,
    state: SharedState,
    max_message_size: usize,
}

impl ChannelTransport {
    pub(crate) fn new(
        id: Uuid,
        outbound: mpsc::UnboundedSender<Outbound>,
        state: SharedState,
        max_message_size: usize,
    ) -> Self {
        Self {
            id,
            outbound,
            state,
            max_message_size,
        }
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&self, text: String) -> TransportResult<()> {
        let state = self.state.get();
        if state != ConnectionState::Connected {
            return Err(TransportError::NotReady { state });
        }
        if text.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: text.len(),
                limit: self.max_message_size,
            });
        }
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::closed("writer stopped"))
    }

    async fn close(&self) -> TransportResult<()> {
        if matches!(
            self.state.get(),
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            return Ok(());
        }
        self.state.set(ConnectionState::Closing);
        // Writer may already be gone if the peer hung up first.
        let _ = self.outbound.send(Outbound::Close);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn connection_id(&self) -> Uuid {
        self.id
    }
}

/// Utility functions
pub mod utils {
    /// Build the URL a charge point connects to. Most central systems expect
    /// the charge point identity as the last path segment.
    pub fn session_url(base_url: &str, charge_point_id: &str, append_cp_id: bool) -> String {
        if append_cp_id {
            format!("{}/{}", base_url.trim_end_matches('/'), charge_point_id)
        } else {
            base_url.to_string()
        }
    }

    /// Validate WebSocket subprotocol
    pub fn validate_subprotocol(protocol: &str) -> bool {
        protocol == ocpp_types::OCPP16_SUBPROTOCOL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.max_message_size, 65536);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.sub_protocol, "ocpp1.6");
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_shared_state() {
        let state = SharedState::new(ConnectionState::Connecting);
        assert_eq!(state.get(), ConnectionState::Connecting);
        state.set(ConnectionState::Closed);
        assert_eq!(state.clone().get(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_channel_transport_rejects_when_not_connected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(
            Uuid::new_v4(),
            tx,
            SharedState::new(ConnectionState::Closing),
            1024,
        );

        let result = transport.send_text("[]".to_string()).await;
        assert!(matches!(
            result,
            Err(TransportError::NotReady {
                state: ConnectionState::Closing
            })
        ));
    }

    #[tokio::test]
    async fn test_channel_transport_size_limit() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(
            Uuid::new_v4(),
            tx,
            SharedState::new(ConnectionState::Connected),
            4,
        );

        let result = transport.send_text("[1,2,3]".to_string()).await;
        assert!(matches!(
            result,
            Err(TransportError::MessageTooLarge { size: 7, limit: 4 })
        ));
    }

    #[test]
    fn test_session_url() {
        assert_eq!(
            utils::session_url("ws://localhost:8180/steve/websocket/CentralSystemService/", "CP001", true),
            "ws://localhost:8180/steve/websocket/CentralSystemService/CP001"
        );
        assert_eq!(
            utils::session_url("ws://localhost:9000/ocpp", "CP001", false),
            "ws://localhost:9000/ocpp"
        );
        assert!(utils::validate_subprotocol("ocpp1.6"));
        assert!(!utils::validate_subprotocol("ocpp2.0.1"));
    }
}
