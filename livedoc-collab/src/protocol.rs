//! Sync wire protocol.
//!
//! Frames are binary: a one-byte tag followed by the payload. Update
//! and snapshot payloads are opaque yrs v1 updates; awareness payloads
//! are UTF-8 JSON. Unknown tags are a decode error so peers running a
//! newer protocol fail loudly instead of merging garbage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const TAG_SNAPSHOT_REQUEST: u8 = 0;
const TAG_SNAPSHOT: u8 = 1;
const TAG_UPDATE: u8 = 2;
const TAG_AWARENESS: u8 = 3;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("unknown frame tag {0}")]
    UnknownTag(u8),
    #[error("malformed awareness payload: {0}")]
    BadAwareness(#[from] serde_json::Error),
}

/// One frame on the document sync socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFrame {
    /// Ask the peer for its full state.
    SnapshotRequest,
    /// Full document state as a yrs v1 update.
    Snapshot(Vec<u8>),
    /// Incremental yrs v1 update.
    Update(Vec<u8>),
    /// Ephemeral presence, JSON-encoded. Never document content.
    Awareness(Vec<u8>),
}

impl SyncFrame {
    pub fn encode(&self) -> Vec<u8> {
        let (tag, payload): (u8, &[u8]) = match self {
            SyncFrame::SnapshotRequest => (TAG_SNAPSHOT_REQUEST, &[]),
            SyncFrame::Snapshot(p) => (TAG_SNAPSHOT, p),
            SyncFrame::Update(p) => (TAG_UPDATE, p),
            SyncFrame::Awareness(p) => (TAG_AWARENESS, p),
        };
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(tag);
        out.extend_from_slice(payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, payload) = bytes.split_first().ok_or(ProtocolError::EmptyFrame)?;
        match tag {
            TAG_SNAPSHOT_REQUEST => Ok(SyncFrame::SnapshotRequest),
            TAG_SNAPSHOT => Ok(SyncFrame::Snapshot(payload.to_vec())),
            TAG_UPDATE => Ok(SyncFrame::Update(payload.to_vec())),
            TAG_AWARENESS => Ok(SyncFrame::Awareness(payload.to_vec())),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// One peer's ephemeral presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwarenessState {
    pub client_id: u64,
    pub user: String,
    /// Cursor position in the peer's view of the document, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<usize>,
}

impl AwarenessState {
    pub fn to_frame(&self) -> Result<SyncFrame, ProtocolError> {
        Ok(SyncFrame::Awareness(serde_json::to_vec(self)?))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
