//! WebSocket transport for the relay server. Frames are UTF-8 JSON text.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Transport, TransportEvent, TransportFactory};

const EVENT_CHANNEL_CAPACITY: usize = 64;

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;

/// Factory that dials the relay URL on every `create_transport` call.
pub struct WebSocketTransportFactory {
    url: String,
}

impl WebSocketTransportFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        let (sink, mut stream) = ws.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let transport: Arc<dyn Transport> = Arc::new(WebSocketTransport {
            sink: Mutex::new(Some(sink)),
        });

        events_tx
            .send(TransportEvent::Connected)
            .await
            .map_err(|_| anyhow::anyhow!("transport event receiver dropped"))?;

        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let frame = Bytes::copy_from_slice(text.as_bytes());
                        if events_tx
                            .send(TransportEvent::FrameReceived(frame))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        if events_tx
                            .send(TransportEvent::FrameReceived(data))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!("relay closed the websocket: {:?}", frame);
                        break;
                    }
                    // Ping/pong replies are queued by tungstenite itself.
                    Ok(_) => {}
                    Err(e) => {
                        warn!("websocket read error: {e}");
                        break;
                    }
                }
            }
            let _ = events_tx.send(TransportEvent::Disconnected).await;
        });

        Ok((transport, events_rx))
    }
}

/// Write half of an established relay connection.
pub struct WebSocketTransport {
    sink: Mutex<Option<WsSink>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), anyhow::Error> {
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("socket is closed"))?;
        let text = std::str::from_utf8(frame)
            .map_err(|_| anyhow::anyhow!("relay frames must be UTF-8 JSON"))?;
        sink.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
    }
}
