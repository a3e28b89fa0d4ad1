//! WebSocket dialer for OCPP-J over `ws://` and `wss://`

use crate::{
    error::{TransportError, TransportResult},
    ChannelTransport, Connection, ConnectionInfo, ConnectionState, Dialer, Outbound, SharedState,
    TransportConfig, TransportEvent,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, info, warn};
use url::Url;

/// Dials central systems over WebSocket, requesting the configured subprotocol
#[derive(Debug, Clone, Default)]
pub struct WebSocketDialer {
    config: TransportConfig,
}

impl WebSocketDialer {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, url: &str) -> TransportResult<Connection> {
        connect(url, &self.config).await
    }
}

fn tls_connector(config: &TransportConfig) -> TransportResult<Option<Connector>> {
    if !config.accept_invalid_certs {
        return Ok(None);
    }
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(Some(Connector::NativeTls(connector)))
}

/// Connect to a central system and start the reader and writer tasks
pub async fn connect(url: &str, config: &TransportConfig) -> TransportResult<Connection> {
    debug!("Connecting to WebSocket server: {}", url);

    let parsed = Url::parse(url).map_err(|e| TransportError::ConnectionError {
        message: format!("Invalid URL: {}", e),
    })?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(TransportError::connection(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    let mut request = parsed.as_str().into_client_request()?;
    let protocol = HeaderValue::from_str(&config.sub_protocol).map_err(|_| {
        TransportError::InvalidSubprotocol {
            protocol: config.sub_protocol.clone(),
        }
    })?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", protocol);

    let ws_config = WebSocketConfig {
        max_message_size: Some(config.max_message_size),
        max_frame_size: Some(config.max_message_size),
        ..Default::default()
    };

    let (ws_stream, response) = timeout(
        config.connection_timeout,
        connect_async_tls_with_config(request, Some(ws_config), false, tls_connector(config)?),
    )
    .await
    .map_err(|_| TransportError::Timeout {
        timeout_secs: config.connection_timeout.as_secs(),
    })?
    .map_err(TransportError::from)?;

    let mut info = ConnectionInfo::new(url);
    if let Some(protocol) = response.headers().get("sec-websocket-protocol") {
        if let Ok(protocol_str) = protocol.to_str() {
            info.sub_protocol = Some(protocol_str.to_string());
        }
    }
    match &info.sub_protocol {
        Some(agreed) if agreed != &config.sub_protocol => {
            warn!("Server agreed on subprotocol {} instead of {}", agreed, config.sub_protocol);
        }
        None => debug!("Server did not echo a subprotocol"),
        _ => {}
    }
    info!("WebSocket connection established: {}", url);

    let state = SharedState::new(ConnectionState::Connected);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (mut sink, mut stream) = ws_stream.split();

    let writer_state = state.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        debug!("WebSocket write failed: {}", e);
                        break;
                    }
                }
                Outbound::Close => {
                    if let Err(e) = sink.close().await {
                        debug!("WebSocket close failed: {}", e);
                    }
                    break;
                }
            }
        }
        writer_state.set(ConnectionState::Closed);
    });

    let reader_state = state.clone();
    tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if events_tx.send(TransportEvent::Message(text)).is_err() {
                        break "receiver dropped".to_string();
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!("Ignoring binary frame: {} bytes", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by peer".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let err = TransportError::from(e);
                    let reason = err.to_string();
                    let _ = events_tx.send(TransportEvent::Error(err));
                    break reason;
                }
                None => break "stream ended".to_string(),
            }
        };
        reader_state.set(ConnectionState::Closed);
        let _ = events_tx.send(TransportEvent::Closed { reason });
    });

    let transport = ChannelTransport::new(info.id, outbound_tx, state, config.max_message_size);
    Ok(Connection {
        transport: Arc::new(transport),
        events: events_rx,
        info,
    })
}
