use crate::error::Result;
use crate::event_sender::EventSender;
use futures::{SinkExt, StreamExt};
use sopcheck_protocol::{decode_frame, encode_frame, InboundEvent, OutboundEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// A live link to the dispatcher: a sender for outbound events and the
/// stream of inbound ones. The stream ends when the link closes.
pub struct Connection {
    pub sender: EventSender,
    pub events: UnboundedReceiver<InboundEvent>,
    tasks: Vec<JoinHandle<()>>,
}

/// The far side of a [`Connection::loopback`].
pub struct LoopbackPeer {
    pub inbound: UnboundedSender<InboundEvent>,
    pub outbound: UnboundedReceiver<OutboundEvent>,
}

impl Connection {
    /// Open a WebSocket to `url` and spawn the reader and writer tasks.
    pub async fn connect(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::info!("connected to {url}");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundEvent>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundEvent>();

        let forward = tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                let text = match encode_frame(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("could not encode {}: {e}", event.name());
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    tracing::warn!("send failed, closing writer: {e}");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        let recv = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => match decode_frame::<InboundEvent>(text.as_str()) {
                        Ok(event) => {
                            if in_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("dropping malformed frame: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("connection error: {e}");
                        break;
                    }
                }
            }
            tracing::info!("connection closed");
        });

        Ok(Self {
            sender: EventSender::new(out_tx),
            events: in_rx,
            tasks: vec![forward, recv],
        })
    }

    /// In-memory connection, for embedding and tests.
    pub fn loopback() -> (Self, LoopbackPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let conn = Self {
            sender: EventSender::new(out_tx),
            events: in_rx,
            tasks: Vec::new(),
        };
        (
            conn,
            LoopbackPeer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        self.events.recv().await
    }

    /// Flush queued outbound events and close the socket.
    ///
    /// Waits for every clone of `sender` to be dropped first.
    pub async fn close(mut self) {
        self.sender = EventSender::noop();
        let mut tasks = std::mem::take(&mut self.tasks).into_iter();
        if let Some(forward) = tasks.next() {
            let _ = forward.await;
        }
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sender::EventSink;
    use sopcheck_protocol::{ChecklistUpdate, SessionId, SopUpdate};

    #[tokio::test]
    async fn loopback_carries_both_directions() {
        let (mut conn, mut peer) = Connection::loopback();

        peer.inbound
            .send(InboundEvent::SopUpdate(SopUpdate::new("abc", Vec::new())))
            .expect("send inbound");
        let InboundEvent::SopUpdate(update) = conn.next_event().await.expect("event");
        assert_eq!(update.session_id.as_str(), "abc");

        conn.sender
            .emit(OutboundEvent::ChecklistUpdate(ChecklistUpdate::now(
                SessionId::new("abc"),
                "s1",
                true,
            )))
            .expect("emit");
        let OutboundEvent::ChecklistUpdate(sent) = peer.outbound.recv().await.expect("outbound");
        assert_eq!(sent.step_id, "s1");
    }

    #[tokio::test]
    async fn loopback_stream_ends_when_peer_drops() {
        let (mut conn, peer) = Connection::loopback();
        drop(peer);
        assert!(conn.next_event().await.is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_url() {
        assert!(Connection::connect("not a url").await.is_err());
    }
}
