use serde::Deserialize;
use serde_json::Value;

use crate::envelope::{PeerId, Uid};
use crate::error::RoomError;

/// Identity and metadata of a remote participant as reported by the
/// server. `id` is the transient per-session connection identifier; `uid`
/// is stable across reconnects.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PeerDescriptor {
    #[serde(rename = "peerId")]
    pub id: PeerId,
    pub uid: Uid,
    #[serde(default)]
    pub info: Value,
}

impl PeerDescriptor {
    /// Parse from a camelized payload fragment (`announce` payload's
    /// `peer` object, or a `join` payload member entry).
    pub fn from_payload(value: &Value) -> Result<Self, RoomError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Opaque handle to an outbound local media stream. Capture and track
/// management live with the media layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalStream {
    pub id: String,
}

/// Opaque handle to an opened peer-to-peer data channel, labeled with the
/// file id it was negotiated for.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferChannel {
    pub label: String,
}

/// Per-counterpart signaling/data session. ICE/SDP negotiation lives
/// behind this seam; the room only drives the capability set.
pub trait PeerSession: Send {
    fn descriptor(&self) -> &PeerDescriptor;
    fn is_initiator(&self) -> bool;

    /// Begin the signaling handshake (initiator side).
    fn start(&mut self);
    /// Tear the session down.
    fn end(&mut self);

    fn receive_signalling_message(&mut self, payload: &Value);
    fn send_signalling_message(&mut self, kind: &str, payload: Value) -> Result<(), RoomError>;
    fn add_local_stream(&mut self, stream: &LocalStream);
}

/// Notifications the session layer feeds back into the room.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    /// A data channel negotiated for a file transfer came up.
    FileTransferChannelOpen {
        file_id: String,
        channel: TransferChannel,
    },
    /// The counterpart asked us to send a file.
    FileTransferRequested { data: Value },
}

/// Constructor for peer sessions; injected so the core stays testable
/// without a live RTC stack.
pub type PeerFactory = Box<dyn FnMut(&PeerDescriptor, bool) -> Box<dyn PeerSession> + Send>;
