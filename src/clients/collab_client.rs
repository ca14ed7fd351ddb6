use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{error, info, warn};

use crate::editor::{ChangeSource, EditorAdapter, EditorWidget};
use crate::models::{ClientEvent, ServerEvent};

/// Headless collaboration client: one WebSocket connection driving an
/// editor adapter around an embedded widget.
///
/// Embedders wire the widget's change hook to `local_change` and pump the
/// connection with `recv_event`/`flush`.
pub struct CollabClient<W: EditorWidget> {
    adapter: EditorAdapter<W>,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    // Keeps the adapter's channel open even when no event is queued.
    _outbound_tx: mpsc::UnboundedSender<ClientEvent>,
}

impl<W: EditorWidget> CollabClient<W> {
    /// Connect to the relay. The auth token, when present, travels as a
    /// query parameter since browser WebSocket clients cannot set headers.
    pub async fn connect(url: &str, token: Option<&str>, widget: W) -> Result<Self, Error> {
        let url = match token {
            Some(token) => format!("{}?token={}", url, token),
            None => url.to_string(),
        };
        let (stream, _response) = connect_async(url.as_str()).await?;
        info!("Connected to relay at {}", url);

        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = EditorAdapter::new(widget, tx.clone());
        Ok(Self {
            adapter,
            stream,
            outbound_rx: rx,
            _outbound_tx: tx,
        })
    }

    pub fn adapter(&self) -> &EditorAdapter<W> {
        &self.adapter
    }

    /// Request membership in a room.
    pub async fn join(&mut self, room_id: &str) -> Result<(), Error> {
        self.send_event(&ClientEvent::JoinRoom {
            room_id: room_id.to_string(),
        })
        .await
    }

    /// Report a local user edit. Queued until the next `flush` or
    /// `recv_event`.
    pub fn local_change(&mut self, delta: Value) {
        self.adapter.local_change(delta, ChangeSource::User);
    }

    /// Wait for the next server event, feeding it into the adapter before
    /// returning it. Queued outbound events are pumped to the socket while
    /// waiting. Returns None when the connection closes.
    pub async fn recv_event(&mut self) -> Option<ServerEvent> {
        loop {
            tokio::select! {
                queued = self.outbound_rx.recv() => {
                    if let Some(event) = queued {
                        if let Err(e) = self.send_event(&event).await {
                            error!("Failed to send queued event: {}", e);
                            return None;
                        }
                    }
                }
                frame = self.stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                Ok(event) => {
                                    self.adapter.handle_event(event.clone());
                                    return Some(event);
                                }
                                Err(e) => warn!("Dropping unparseable frame from relay: {}", e),
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            return None;
                        }
                        None => return None,
                    }
                }
            }
        }
    }

    /// Push everything the adapter has queued onto the socket.
    pub async fn flush(&mut self) -> Result<(), Error> {
        while let Ok(event) = self.outbound_rx.try_recv() {
            self.send_event(&event).await?;
        }
        Ok(())
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), Error> {
        let text = serde_json::to_string(event).expect("client events serialize");
        self.stream.send(Message::Text(text.into())).await
    }
}
