//! Relay server.
//!
//! An axum websocket hub with one room per document. Each room keeps
//! its own server-side replica so late joiners get a merged snapshot
//! instead of a replay, and fans inbound updates out to every other
//! subscriber. Awareness frames are relayed without being merged.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::CollabConfig;
use crate::protocol::SyncFrame;
use crate::replica::ReplicaDoc;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CollabConfig>,
    pub hub: Arc<CollabHub>,
}

pub struct CollabHub {
    capacity: usize,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl CollabHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn room(&self, doc_id: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(doc_id).cloned() {
            return room;
        }

        let mut guard = self.rooms.write().await;
        guard
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Room::new(self.capacity)))
            .clone()
    }
}

/// One frame on a room's fan-out channel, with the connection that
/// produced it so the sender doesn't hear its own echo.
#[derive(Debug, Clone)]
struct RoomMessage {
    sender: u64,
    bytes: Vec<u8>,
}

pub struct Room {
    replica: ReplicaDoc,
    tx: broadcast::Sender<RoomMessage>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            replica: ReplicaDoc::new(),
            tx,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.tx.subscribe()
    }

    fn publish(&self, sender: u64, frame: SyncFrame) {
        let _ = self.tx.send(RoomMessage {
            sender,
            bytes: frame.encode(),
        });
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws/doc/{*id}", get(ws_doc))
        .with_state(state)
}

pub async fn serve(config: CollabConfig) -> Result<()> {
    let (_addr, handle) = bind_and_serve(config).await?;
    handle.await?
}

/// Bind and serve in the background, returning the bound address so
/// callers (and tests) can connect to an ephemeral port.
pub async fn bind_and_serve(config: CollabConfig) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
    let state = AppState {
        hub: Arc::new(CollabHub::new(config.room_capacity)),
        config: Arc::new(config),
    };
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.listen_addr).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "livedoc-collab listening");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await?;
        Ok(())
    });
    Ok((addr, handle))
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn ws_doc(
    Path(doc_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = handle_ws(socket, doc_id.clone(), state).await {
            warn!(%doc_id, %err, "ws session ended with error");
        }
    })
}

async fn handle_ws(mut socket: WebSocket, doc_id: String, state: AppState) -> Result<()> {
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let room = state.hub.room(&doc_id).await;
    let mut broadcast_rx = room.subscribe();

    // Late joiners start from the room's merged state.
    let snapshot = SyncFrame::Snapshot(room.replica.snapshot()).encode();
    socket.send(WsMessage::Binary(snapshot.into())).await.ok();

    loop {
        tokio::select! {
            // Frames from other connections in the room.
            recv = broadcast_rx.recv() => {
                match recv {
                    Ok(msg) => {
                        if msg.sender == conn_id {
                            continue;
                        }
                        if socket.send(WsMessage::Binary(msg.bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            // Frames from this connection.
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(WsMessage::Binary(data))) => {
                        match SyncFrame::decode(&data) {
                            Ok(SyncFrame::Update(payload)) | Ok(SyncFrame::Snapshot(payload)) => {
                                if let Err(err) = room.replica.apply_update(&payload) {
                                    warn!(%doc_id, conn_id, %err, "rejecting bad update");
                                    continue;
                                }
                                room.publish(conn_id, SyncFrame::Update(payload));
                            }
                            Ok(SyncFrame::SnapshotRequest) => {
                                let frame = SyncFrame::Snapshot(room.replica.snapshot());
                                if socket
                                    .send(WsMessage::Binary(frame.encode().into()))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Ok(SyncFrame::Awareness(payload)) => {
                                // Presence is relayed, never merged.
                                room.publish(conn_id, SyncFrame::Awareness(payload));
                            }
                            Err(err) => {
                                warn!(%doc_id, conn_id, %err, "ignoring undecodable frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    Ok(())
}
