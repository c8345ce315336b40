//! Socket seam between the connection manager and the network.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, stream::BoxStream};

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Socket closed")]
    Closed,
}

/// Text frames arriving from the server.
pub type Inbound = BoxStream<'static, Result<String, TransportError>>;

/// Text frames going to the server.
pub type Outbound = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// An open, text-framed socket.
pub struct Socket {
    pub outbound: Outbound,
    pub inbound: Inbound,
}

/// Opens sockets. Implemented for WebSockets; tests substitute channels.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new socket to `url`.
    async fn connect(&self, url: &str) -> Result<Socket, TransportError>;
}

#[cfg(feature = "websocket")]
pub use ws::WsConnector;

#[cfg(feature = "websocket")]
mod ws {
    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt, future};
    use tokio_tungstenite::tungstenite::Message;

    use super::{Connector, Socket, TransportError};

    /// WebSocket connector backed by tokio-tungstenite.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WsConnector;

    #[async_trait]
    impl Connector for WsConnector {
        async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
            let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
            let (write, read) = ws_stream.split();

            let outbound = write
                .sink_map_err(TransportError::from)
                .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));

            let inbound = read.filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => Some(Ok(text)),
                        Err(e) => {
                            tracing::warn!(len = e.as_bytes().len(), "dropping non-UTF-8 binary frame");
                            None
                        }
                    },
                    // Control frames are answered by tungstenite itself.
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                })
            });

            Ok(Socket {
                outbound: Box::pin(outbound),
                inbound: inbound.boxed(),
            })
        }
    }
}
