//! Replicated document.
//!
//! `ReplicaDoc` wraps a yrs `Doc` holding the canonical serialized
//! document tree in a "body" text plus a "meta" map for document-level
//! fields. Merge semantics stay inside yrs; this layer only encodes,
//! applies, and fans out v1 updates.

use livedoc_core::Node;
use thiserror::Error;
use tokio::sync::broadcast;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, Map, ReadTxn, StateVector, Text, Transact, Update};

const BODY_TEXT_NAME: &str = "body";
const META_MAP_NAME: &str = "meta";

#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("failed to decode update: {0}")]
    DecodeUpdate(String),
    #[error("failed to apply update: {0}")]
    ApplyUpdate(String),
    #[error("failed to decode state vector: {0}")]
    DecodeStateVector(String),
    #[error("replica body is not a document tree: {0}")]
    Tree(#[from] serde_json::Error),
}

/// A local update ready for fan-out. Subscribers compare `sender_id`
/// against their own to suppress echo.
#[derive(Debug, Clone)]
pub struct SyncPacket {
    pub sender_id: u64,
    pub payload: Vec<u8>,
}

pub struct ReplicaDoc {
    doc: Doc,
    body: yrs::TextRef,
    meta: yrs::MapRef,
    updates: broadcast::Sender<SyncPacket>,
}

impl ReplicaDoc {
    pub fn new() -> Self {
        let doc = Doc::new();
        let body = doc.get_or_insert_text(BODY_TEXT_NAME);
        let meta = doc.get_or_insert_map(META_MAP_NAME);
        let (updates, _) = broadcast::channel(64);
        Self {
            doc,
            body,
            meta,
            updates,
        }
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    /// Subscribe to locally produced updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncPacket> {
        self.updates.subscribe()
    }

    pub fn body(&self) -> String {
        let txn = self.doc.transact();
        self.body.get_string(&txn)
    }

    /// Set the body with a minimal splice instead of delete-all plus
    /// insert-all, so unchanged content keeps its operation identity
    /// and merges cleanly. Returns the encoded incremental update.
    pub fn set_body(&self, content: &str) -> Vec<u8> {
        let (current, sv_before) = {
            let txn = self.doc.transact();
            (self.body.get_string(&txn), txn.state_vector())
        };
        if current == content {
            return Vec::new();
        }

        let current_chars: Vec<char> = current.chars().collect();
        let new_chars: Vec<char> = content.chars().collect();

        let common_prefix = current_chars
            .iter()
            .zip(new_chars.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let remaining_current = current_chars.len() - common_prefix;
        let remaining_new = new_chars.len() - common_prefix;
        let common_suffix = current_chars[common_prefix..]
            .iter()
            .rev()
            .zip(new_chars[common_prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .take(remaining_current.min(remaining_new))
            .count();

        let delete_len = (current_chars.len() - common_suffix - common_prefix) as u32;
        let insert: String = new_chars[common_prefix..new_chars.len() - common_suffix]
            .iter()
            .collect();

        {
            let mut txn = self.doc.transact_mut();
            if delete_len > 0 {
                self.body
                    .remove_range(&mut txn, common_prefix as u32, delete_len);
            }
            if !insert.is_empty() {
                self.body.insert(&mut txn, common_prefix as u32, &insert);
            }
        }

        self.record_update(&sv_before)
    }

    pub fn get_meta(&self, key: &str) -> Option<String> {
        let txn = self.doc.transact();
        self.meta.get(&txn, key).and_then(|v| v.cast::<String>().ok())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Vec<u8> {
        let sv_before = {
            let txn = self.doc.transact();
            txn.state_vector()
        };
        {
            let mut txn = self.doc.transact_mut();
            self.meta.insert(&mut txn, key, value);
        }
        self.record_update(&sv_before)
    }

    fn record_update(&self, sv_before: &StateVector) -> Vec<u8> {
        let update = {
            let txn = self.doc.transact();
            txn.encode_state_as_update_v1(sv_before)
        };
        if !update.is_empty() {
            let _ = self.updates.send(SyncPacket {
                sender_id: self.client_id(),
                payload: update.clone(),
            });
        }
        update
    }

    /// Serialize a document tree into the body text.
    pub fn sync_tree(&self, tree: &Node) -> Result<Vec<u8>, ReplicaError> {
        let body = serde_json::to_string(tree)?;
        Ok(self.set_body(&body))
    }

    /// Parse the body text back into a document tree.
    pub fn tree(&self) -> Result<Node, ReplicaError> {
        Ok(serde_json::from_str(&self.body())?)
    }

    /// Full state as a v1 update, for snapshots.
    pub fn snapshot(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Everything the remote is missing, given its state vector.
    pub fn diff_for(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>, ReplicaError> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| ReplicaError::DecodeStateVector(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Merge a remote update. Not rebroadcast; fan-out of remote
    /// traffic is the relay's job.
    pub fn apply_update(&self, payload: &[u8]) -> Result<(), ReplicaError> {
        let update =
            Update::decode_v1(payload).map_err(|e| ReplicaError::DecodeUpdate(e.to_string()))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| ReplicaError::ApplyUpdate(e.to_string()))
    }
}

impl Default for ReplicaDoc {
    fn default() -> Self {
        Self::new()
    }
}
