//! WebSocket connection to the relay.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

use confab_common::{ClientEnvelope, Error, Result, ServerEnvelope};

/// One client's connection to the relay.
pub struct RelayConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayConnection {
    /// Connect to a relay at `url` (e.g. `ws://127.0.0.1:3000/ws`).
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(Error::connection)?;
        Ok(Self { ws })
    }

    /// Send one envelope to the relay.
    pub async fn send(&mut self, envelope: &ClientEnvelope) -> Result<()> {
        let text = serde_json::to_string(envelope).map_err(Error::serialization)?;
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(Error::connection)
    }

    /// Receive the next envelope from the relay.
    ///
    /// Skips non-text frames and anything that does not parse; errors only
    /// when the connection itself is gone.
    pub async fn recv(&mut self) -> Result<ServerEnvelope> {
        while let Some(msg) = self.ws.next().await {
            let msg = msg.map_err(Error::connection)?;
            let Message::Text(text) = msg else { continue };

            match serde_json::from_str(&text) {
                Ok(envelope) => return Ok(envelope),
                Err(err) => warn!("ignoring unparseable frame from relay: {}", err),
            }
        }
        Err(Error::connection("relay connection closed"))
    }
}
