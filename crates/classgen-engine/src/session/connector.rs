//! Transports the session driver can open.

use std::pin::Pin;

use futures::future::{self, BoxFuture};
use futures::sink::Sink;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{EngineError, Result};

/// Writes encoded text frames to the service.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = EngineError> + Send>>;

/// Yields text frames from the service. The stream ending means the remote
/// closed the connection.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// An open, full-duplex text transport.
pub struct Transport {
    /// Outbound half.
    pub sink: FrameSink,
    /// Inbound half.
    pub stream: FrameStream,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens transports to an endpoint URL.
pub trait Connector: Send + Sync {
    /// Opens a transport to `url`.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport>>;
}

/// Connects over WebSocket, exchanging JSON as text messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport>> {
        let url = url.to_string();
        Box::pin(async move {
            let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| EngineError::transport(format!("failed to connect to {url}: {e}")))?;
            tracing::debug!(%url, "WebSocket connected");

            let (sink, stream) = ws.split();
            let sink = sink
                .sink_map_err(|e| EngineError::transport(e.to_string()))
                .with(|text: String| future::ready(Ok::<_, EngineError>(Message::Text(text))));
            let stream = stream.filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(EngineError::transport(e.to_string()))),
                })
            });

            Ok(Transport {
                sink: Box::pin(sink),
                stream: stream.boxed(),
            })
        })
    }
}
