use thiserror::Error;

use crate::envelope::PeerId;

/// Faults surfaced by the room core. Stale signalling messages (a
/// `signalling` envelope for a peer that already left) are not represented
/// here: peer departure races with in-flight signaling, so those are
/// dropped and logged instead.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Inbound envelope carried a type tag outside the known protocol.
    #[error("unknown message type tag: {tag:?}")]
    Protocol { tag: String },

    /// Operation named a peer id absent from the peer set; local state has
    /// desynchronized from server-reported membership.
    #[error("no peer with id {id}")]
    PeerNotFound { id: PeerId },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the signaling server.
    #[error("{op} failed: {status} {body}")]
    Status {
        op: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed payload: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("socket send failed: {0}")]
    Socket(String),
}
