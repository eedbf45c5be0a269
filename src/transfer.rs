use std::collections::HashMap;

use crate::envelope::Uid;
use crate::peer::TransferChannel;

/// How the counterpart should deliver the file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferMode {
    Http,
    P2p,
}

impl TransferMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferMode::Http => "http",
            TransferMode::P2p => "p2p",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferState {
    /// Signaling request sent; waiting for the channel to come up.
    Requested,
    /// Channel handed over, bytes flowing.
    Receiving,
}

/// An inbound transfer we still owe bytes on. Keyed by the owner's stable
/// identity rather than their transient connection id, so resumption
/// still finds it after the counterpart reconnects under a new id.
#[derive(Clone, Debug)]
pub struct PendingTransfer {
    pub file_id: String,
    pub owner_uid: Uid,
    pub mode: TransferMode,
    pub state: TransferState,
    pub channel: Option<TransferChannel>,
}

/// Tracks pending inbound receivers per stable owner identity. Entries are
/// created by a transfer request and removed only on completion or
/// cancellation signaled by the session layer.
#[derive(Default)]
pub struct FileTransferManager {
    pending: HashMap<Uid, Vec<PendingTransfer>>,
}

impl FileTransferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending receiver. Idempotent per `(uid, file_id)`: a
    /// resumption re-request keeps the existing entry.
    pub fn track(&mut self, owner_uid: Uid, file_id: &str, mode: TransferMode) {
        let entries = self.pending.entry(owner_uid).or_default();
        if entries.iter().any(|t| t.file_id == file_id) {
            return;
        }
        entries.push(PendingTransfer {
            file_id: file_id.to_string(),
            owner_uid,
            mode,
            state: TransferState::Requested,
            channel: None,
        });
    }

    pub fn receivers_for_uid(&self, owner_uid: Uid) -> Vec<PendingTransfer> {
        self.pending.get(&owner_uid).cloned().unwrap_or_default()
    }

    /// Hand an opened channel to its pending receiver. Returns `false`
    /// when no matching `(uid, file_id)` entry exists, e.g. a channel for
    /// a transfer that was cancelled meanwhile.
    pub fn begin_receive(
        &mut self,
        owner_uid: Uid,
        file_id: &str,
        channel: TransferChannel,
    ) -> bool {
        match self.entry_mut(owner_uid, file_id) {
            Some(entry) => {
                entry.state = TransferState::Receiving;
                entry.channel = Some(channel);
                true
            }
            None => false,
        }
    }

    pub fn complete(&mut self, owner_uid: Uid, file_id: &str) -> bool {
        self.discard(owner_uid, file_id)
    }

    pub fn cancel(&mut self, owner_uid: Uid, file_id: &str) -> bool {
        self.discard(owner_uid, file_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    fn entry_mut(&mut self, owner_uid: Uid, file_id: &str) -> Option<&mut PendingTransfer> {
        self.pending
            .get_mut(&owner_uid)?
            .iter_mut()
            .find(|t| t.file_id == file_id)
    }

    fn discard(&mut self, owner_uid: Uid, file_id: &str) -> bool {
        let Some(entries) = self.pending.get_mut(&owner_uid) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|t| t.file_id != file_id);
        let removed = entries.len() < before;
        if entries.is_empty() {
            self.pending.remove(&owner_uid);
        }
        removed
    }
}
