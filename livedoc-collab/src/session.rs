//! Collaborative editing session.
//!
//! An `EditorSession` binds one editor state to one replica and, when
//! connected, one websocket to the relay. Local transactions go
//! through the normal dispatch pipeline and then into the replica;
//! remote updates come back out of the replica as whole-tree merges
//! tagged with the remote metadata key so plugins can tell them apart.
//!
//! Disconnect is idempotent and runs on every exit path, Drop
//! included, so a failed or abandoned connect never leaves a
//! half-initialized session reachable. Reconnecting is a fresh
//! `connect` from scratch.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use livedoc_core::plugins::horizontal_rule_rule;
use livedoc_core::{
    CodemarkPlugin, EditorState, EnterRulesPlugin, LoremPlugin, Node, PastePlugin, Plugin,
    TableFixPlugin, Transaction, TransformError, META_REMOTE,
};
use livedoc_types::DocId;

use crate::protocol::{AwarenessState, SyncFrame};
use crate::replica::ReplicaDoc;

/// The standard editing plugin stack.
pub fn default_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(CodemarkPlugin),
        Arc::new(EnterRulesPlugin::new(vec![horizontal_rule_rule()])),
        Arc::new(LoremPlugin),
        Arc::new(PastePlugin),
        Arc::new(TableFixPlugin),
    ]
}

struct Connection {
    outbound: mpsc::UnboundedSender<SyncFrame>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct EditorSession {
    doc_id: DocId,
    state: Arc<Mutex<EditorState>>,
    replica: Arc<ReplicaDoc>,
    peers: Arc<Mutex<HashMap<u64, AwarenessState>>>,
    connection: Option<Connection>,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
}

impl EditorSession {
    pub fn new(doc_id: DocId, doc: Node) -> Result<Self, TransformError> {
        let state = EditorState::with_plugins(doc, default_plugins())?;
        // The replica stays empty until the first local edit or remote
        // snapshot; seeding it here would make two fresh peers race
        // conflicting root inserts.
        let replica = ReplicaDoc::new();
        let (connected_tx, connected_rx) = watch::channel(false);
        Ok(Self {
            doc_id,
            state: Arc::new(Mutex::new(state)),
            replica: Arc::new(replica),
            peers: Arc::new(Mutex::new(HashMap::new())),
            connection: None,
            connected_tx,
            connected_rx,
        })
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn replica(&self) -> &Arc<ReplicaDoc> {
        &self.replica
    }

    /// Snapshot of the current document tree.
    pub fn doc(&self) -> Node {
        self.state.lock().doc.clone()
    }

    /// Watch the connected/disconnected signal.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Known peers from awareness traffic.
    pub fn peers(&self) -> Vec<AwarenessState> {
        self.peers.lock().values().cloned().collect()
    }

    /// Apply a local transaction and push the result into the replica.
    pub fn dispatch(&self, tr: Transaction) -> Result<Vec<Transaction>, TransformError> {
        let remote = tr.get_meta(META_REMOTE).is_some();
        let (batch, doc) = {
            let mut state = self.state.lock();
            let batch = state.apply(tr)?;
            (batch, state.doc.clone())
        };
        if !remote {
            if let Err(err) = self.replica.sync_tree(&doc) {
                warn!(doc_id = %self.doc_id, %err, "failed to sync tree into replica");
            }
        }
        Ok(batch)
    }

    /// Connect to a relay endpoint. Any previous connection is torn
    /// down first; there is no partial-reconnect path.
    pub async fn connect(&mut self, endpoint: &str) -> Result<()> {
        self.disconnect();

        let url = format!(
            "{}/ws/doc/{}",
            endpoint.trim_end_matches('/'),
            self.doc_id
        );
        let (ws, _) = connect_async(&url)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SyncFrame>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if sink.send(Message::Binary(frame.encode().into())).await.is_err() {
                    break;
                }
            }
        });

        // Local replica updates out to the wire. A lagged receiver has
        // dropped updates, so it resyncs with a full snapshot instead
        // of giving up.
        let forward_tx = out_tx.clone();
        let forward_replica = self.replica.clone();
        let mut local_updates = self.replica.subscribe();
        let forward = tokio::spawn(async move {
            loop {
                let frame = match local_updates.recv().await {
                    Ok(packet) => SyncFrame::Update(packet.payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "local update stream lagged; resyncing");
                        SyncFrame::Update(forward_replica.snapshot())
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if forward_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        let replica = self.replica.clone();
        let state = self.state.clone();
        let peers = self.peers.clone();
        let reply_tx = out_tx.clone();
        let connected_tx = self.connected_tx.clone();
        let doc_id = self.doc_id.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        match SyncFrame::decode(&data) {
                            Ok(SyncFrame::Snapshot(payload)) | Ok(SyncFrame::Update(payload)) => {
                                if let Err(err) = replica.apply_update(&payload) {
                                    warn!(%doc_id, %err, "dropping bad remote update");
                                    continue;
                                }
                                merge_replica_into_state(&replica, &state, &doc_id);
                            }
                            Ok(SyncFrame::Awareness(payload)) => {
                                match AwarenessState::from_payload(&payload) {
                                    Ok(peer) => {
                                        peers.lock().insert(peer.client_id, peer);
                                    }
                                    Err(err) => {
                                        debug!(%doc_id, %err, "ignoring bad awareness payload");
                                    }
                                }
                            }
                            Ok(SyncFrame::SnapshotRequest) => {
                                let _ = reply_tx.send(SyncFrame::Snapshot(replica.snapshot()));
                            }
                            Err(err) => {
                                warn!(%doc_id, %err, "ignoring undecodable frame");
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = connected_tx.send(false);
        });

        // Merge our offline state into the room, then ask for theirs.
        let _ = out_tx.send(SyncFrame::Update(self.replica.snapshot()));
        let _ = out_tx.send(SyncFrame::SnapshotRequest);

        self.connection = Some(Connection {
            outbound: out_tx,
            tasks: vec![writer, forward, reader],
        });
        let _ = self.connected_tx.send(true);
        Ok(())
    }

    /// Broadcast this client's presence.
    pub fn send_awareness(&self, user: &str, cursor: Option<usize>) {
        let Some(conn) = &self.connection else {
            return;
        };
        let state = AwarenessState {
            client_id: self.replica.client_id(),
            user: user.to_string(),
            cursor,
        };
        match state.to_frame() {
            Ok(frame) => {
                let _ = conn.outbound.send(frame);
            }
            Err(err) => warn!(doc_id = %self.doc_id, %err, "failed to encode awareness"),
        }
    }

    /// Tear down the connection. Safe to call any number of times,
    /// connected or not.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            for task in conn.tasks {
                task.abort();
            }
            let _ = self.connected_tx.send(false);
        }
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Replace the editor document with the replica's merged tree, as one
/// remote-tagged transaction through the normal dispatch pipeline.
fn merge_replica_into_state(replica: &ReplicaDoc, state: &Mutex<EditorState>, doc_id: &DocId) {
    let tree = match replica.tree() {
        Ok(tree) => tree,
        Err(err) => {
            warn!(%doc_id, %err, "replica body is not a parseable tree yet");
            return;
        }
    };
    let mut st = state.lock();
    if st.doc == tree {
        return;
    }
    let size = st.doc.content_size();
    let mut tr = st.tr();
    tr.set_meta(META_REMOTE, serde_json::json!(true));
    if let Err(err) = tr.replace(0, size, tree.children) {
        warn!(%doc_id, %err, "remote merge rejected");
        return;
    }
    let batch = match st.apply(tr) {
        Ok(batch) => batch,
        Err(err) => {
            warn!(%doc_id, %err, "remote merge failed validation");
            return;
        }
    };
    // Plugin corrections moved the tree past what the replica holds;
    // push them back so peers see the corrected document.
    if batch.len() > 1 {
        if let Err(err) = replica.sync_tree(&st.doc) {
            warn!(%doc_id, %err, "failed to sync merge corrections into replica");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> EditorSession {
        EditorSession::new(
            DocId::new("notes/today"),
            Node::doc(vec![Node::paragraph("hello")]),
        )
        .unwrap()
    }

    #[test]
    fn test_disconnect_without_connect_is_noop() {
        let mut s = session();
        s.disconnect();
        s.disconnect();
        assert!(!s.is_connected());
    }

    #[test]
    fn test_dispatch_syncs_replica() {
        let s = session();
        let mut tr = Transaction::new(s.doc(), livedoc_core::Selection::cursor(6));
        tr.insert_text(6, "!").unwrap();
        s.dispatch(tr).unwrap();

        assert_eq!(s.doc().text_content(), "hello!");
        assert_eq!(s.replica().tree().unwrap(), s.doc());
    }

    #[test]
    fn test_remote_merge_corrections_sync_back() {
        use livedoc_core::table::rebuild_header_row;
        use livedoc_types::NodeKind;

        let cell = |t: &str| {
            Node::block(NodeKind::TableCell, vec![Node::paragraph(t)])
        };
        let table = |body: Vec<Node>| {
            Node::block(
                NodeKind::Table,
                vec![
                    rebuild_header_row("Data", 2),
                    Node::block(NodeKind::TableRow, body),
                ],
            )
        };

        let s = EditorSession::new(
            DocId::new("notes/table"),
            Node::doc(vec![table(vec![cell("a"), cell("b")])]),
        )
        .unwrap();

        // A peer grew the table without widening the header.
        let incoming = ReplicaDoc::new();
        incoming.apply_update(&s.replica().snapshot()).unwrap();
        incoming
            .sync_tree(&Node::doc(vec![table(vec![
                cell("a"),
                cell("b"),
                cell("c"),
            ])]))
            .unwrap();

        let diff = incoming.diff_for(&s.replica().state_vector()).unwrap();
        s.replica().apply_update(&diff).unwrap();
        merge_replica_into_state(s.replica(), &s.state, &s.doc_id);

        // The enforcer repaired the header locally, and the repair
        // made it back into the replica.
        let header = &s.doc().children[0].children[0];
        assert_eq!(header.children[0].attr_u64("colspan"), Some(3));
        assert_eq!(s.replica().tree().unwrap(), s.doc());
    }

    #[test]
    fn test_remote_merge_updates_editor() {
        let s = session();
        // A peer that caught up with us, then edited.
        let incoming = ReplicaDoc::new();
        incoming.apply_update(&s.replica().snapshot()).unwrap();
        incoming
            .sync_tree(&Node::doc(vec![Node::paragraph("from afar")]))
            .unwrap();

        let diff = incoming.diff_for(&s.replica().state_vector()).unwrap();
        s.replica().apply_update(&diff).unwrap();
        merge_replica_into_state(s.replica(), &s.state, &s.doc_id);

        assert_eq!(s.doc().text_content(), "from afar");
        assert_eq!(s.replica().tree().unwrap(), s.doc());
    }
}
