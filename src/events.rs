use serde_json::Value;
use tokio::sync::broadcast;

use crate::envelope::{Envelope, PeerId, Uid};
use crate::peer::PeerDescriptor;

/// Application-facing notifications. A closed set with fixed payload
/// shapes; subscribers receive them over a broadcast channel.
#[derive(Clone, Debug)]
pub enum RoomEvent {
    Connecting,
    Connected,
    Join {
        payload: Value,
        envelope: Envelope,
    },
    PeerAnnounce {
        peer: PeerDescriptor,
        envelope: Envelope,
    },
    PeerAdded {
        peer: PeerDescriptor,
    },
    PeerLeave {
        peer: PeerDescriptor,
        envelope: Envelope,
    },
    PeerRemoved {
        peer_id: PeerId,
        uid: Uid,
    },
    /// Any non-echo inbound envelope, after its handler ran.
    Message {
        envelope: Envelope,
    },
    /// An `event` envelope authored by another peer; `name` is the
    /// camelized sub-event type.
    Custom {
        name: String,
        data: Value,
        envelope: Envelope,
    },
    LocalStreamConnected,
    FileTransferRequested {
        peer: PeerDescriptor,
        data: Value,
    },
    FileTransfer(TransferEvent),
}

/// Lifecycle of an inbound file transfer, keyed by the counterpart's
/// stable identity.
#[derive(Clone, Debug, PartialEq)]
pub enum TransferEvent {
    Requested { owner_uid: Uid, file_id: String },
    Started { owner_uid: Uid, file_id: String },
    Completed { owner_uid: Uid, file_id: String },
    Cancelled { owner_uid: Uid, file_id: String },
}

pub struct RoomEvents {
    sender: broadcast::Sender<RoomEvent>,
}

impl RoomEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.sender.subscribe()
    }

    /// Best-effort: delivery to zero subscribers is not an error.
    pub fn emit(&self, event: RoomEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for RoomEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let events = RoomEvents::new();
        events.emit(RoomEvent::Connecting);
    }

    #[test]
    fn subscribers_receive_in_order() {
        let events = RoomEvents::new();
        let mut rx = events.subscribe();
        events.emit(RoomEvent::Connecting);
        events.emit(RoomEvent::Connected);
        assert!(matches!(rx.try_recv().unwrap(), RoomEvent::Connecting));
        assert!(matches!(rx.try_recv().unwrap(), RoomEvent::Connected));
    }
}
