//! WebSocket dispatcher: applies `checklist_update` events to the board and
//! broadcasts the resulting `sop_update` to every connected client.

use crate::board::SessionBoard;
use crate::error::Result;
use futures::{SinkExt, StreamExt};
use sopcheck_protocol::{decode_frame, encode_frame, InboundEvent, OutboundEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::Message;

const BROADCAST_CAPACITY: usize = 64;

pub struct Server {
    listener: TcpListener,
    board: Arc<Mutex<SessionBoard>>,
    updates: broadcast::Sender<InboundEvent>,
}

impl Server {
    pub async fn bind(addr: &str, board: SessionBoard) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (updates, _) = broadcast::channel(BROADCAST_CAPACITY);
        Ok(Self {
            listener,
            board: Arc::new(Mutex::new(board)),
            updates,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the task is dropped.
    pub async fn run(self) -> Result<()> {
        tracing::info!("dispatcher listening on {}", self.listener.local_addr()?);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let board = self.board.clone();
            let updates = self.updates.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, peer, board, updates).await {
                    tracing::warn!(%peer, "client error: {e}");
                }
            });
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    board: Arc<Mutex<SessionBoard>>,
    updates: broadcast::Sender<InboundEvent>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    tracing::info!(%peer, "client connected");
    let (mut ws_tx, mut ws_rx) = ws.split();

    // subscribe before sending the initial state so no update falls in between
    let mut rx = updates.subscribe();
    let initial = board.lock().await.snapshots();
    for snapshot in initial {
        let text = encode_frame(&InboundEvent::SopUpdate(snapshot))?;
        ws_tx.send(Message::Text(text.into())).await?;
    }

    let forward = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(text) = encode_frame(&event) else { continue };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("client lagged, skipped {n} updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg? {
            Message::Text(text) => match decode_frame::<OutboundEvent>(text.as_str()) {
                Ok(OutboundEvent::ChecklistUpdate(update)) => {
                    tracing::debug!(%peer, "checklist_update received: {update:?}");
                    let applied = {
                        let mut board = board.lock().await;
                        board.apply(&update).map(|snapshot| {
                            let complete = board.is_normal_flow(&update.session_id).unwrap_or(false);
                            (snapshot, complete)
                        })
                    };
                    match applied {
                        Ok((snapshot, complete)) => {
                            if complete && update.checked {
                                tracing::info!(session = %update.session_id, "all steps checked, normal flow");
                            }
                            let _ = updates.send(InboundEvent::SopUpdate(snapshot));
                        }
                        Err(e) => tracing::warn!("checklist_update dropped: {e}"),
                    }
                }
                Err(e) => tracing::warn!(%peer, "dropping malformed frame: {e}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    forward.abort();
    tracing::info!(%peer, "client disconnected");
    Ok(())
}
