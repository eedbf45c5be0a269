use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::casing::{decamelize, decamelize_keys};
use crate::envelope::{Envelope, MessageType, PeerId, Uid};
use crate::error::RoomError;
use crate::events::{RoomEvent, RoomEvents, TransferEvent};
use crate::http::{RoomApi, RoomUrls};
use crate::logging;
use crate::peer::{LocalStream, PeerDescriptor, PeerEvent, PeerFactory, PeerSession};
use crate::transfer::{FileTransferManager, TransferMode};
use crate::transport::SocketChannel;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Deserialize)]
struct LeavePayload {
    id: PeerId,
}

#[derive(Debug, Deserialize)]
struct JoinSelf {
    #[serde(rename = "peerId")]
    peer_id: PeerId,
}

/// Owns the control channel to the signaling server and the authoritative
/// peer set for one room. Inbound frames are dispatched synchronously in
/// arrival order; outbound intents go over the socket or the HTTP API,
/// caller-selected.
pub struct RoomConnection<A: RoomApi> {
    status: ConnectionStatus,
    peers: Vec<Box<dyn PeerSession>>,
    self_peer_id: Option<PeerId>,
    stream: Option<LocalStream>,
    socket: Box<dyn SocketChannel>,
    api: A,
    urls: RoomUrls,
    transfers: FileTransferManager,
    events: RoomEvents,
    make_peer: PeerFactory,
}

impl<A: RoomApi> RoomConnection<A> {
    pub fn new(
        api: A,
        urls: RoomUrls,
        socket: Box<dyn SocketChannel>,
        make_peer: PeerFactory,
    ) -> Self {
        RoomConnection {
            status: ConnectionStatus::Disconnected,
            peers: Vec::new(),
            self_peer_id: None,
            stream: None,
            socket,
            api,
            urls,
            transfers: FileTransferManager::new(),
            events: RoomEvents::new(),
            make_peer,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn self_peer_id(&self) -> Option<PeerId> {
        self.self_peer_id
    }

    pub fn peer_descriptors(&self) -> Vec<PeerDescriptor> {
        self.peers.iter().map(|p| p.descriptor().clone()).collect()
    }

    /// Open the control channel. No-op unless currently disconnected.
    pub fn connect(&mut self) {
        if self.status != ConnectionStatus::Disconnected {
            return;
        }
        self.status = ConnectionStatus::Connecting;
        self.events.emit(RoomEvent::Connecting);
        self.socket.open();
    }

    /// Transport reported the channel open.
    pub fn handle_socket_open(&mut self) {
        if self.status == ConnectionStatus::Connecting {
            self.status = ConnectionStatus::Connected;
            self.events.emit(RoomEvent::Connected);
        }
    }

    /// Decode and dispatch one inbound frame.
    pub fn handle_frame(&mut self, raw: &str) -> Result<(), RoomError> {
        let envelope = Envelope::decode(raw)?;
        self.dispatch(envelope)
    }

    /// Dispatch a decoded envelope. Exhaustive over the five kinds; after
    /// the handler runs, the envelope is re-broadcast as a `Message`
    /// unless it is an echo of our own action.
    pub fn dispatch(&mut self, envelope: Envelope) -> Result<(), RoomError> {
        match envelope.kind {
            MessageType::Signalling => self.on_signalling(&envelope),
            MessageType::Announce => self.on_announce(&envelope)?,
            MessageType::Join => self.on_join(&envelope)?,
            MessageType::Leave => self.on_leave(&envelope)?,
            MessageType::Event => self.on_event(&envelope),
        }
        if !self.is_echo(&envelope) {
            self.events.emit(RoomEvent::Message { envelope });
        }
        Ok(())
    }

    fn is_echo(&self, envelope: &Envelope) -> bool {
        matches!(
            (self.self_peer_id, envelope.origin_peer_id),
            (Some(own), Some(origin)) if own == origin
        )
    }

    fn on_signalling(&mut self, envelope: &Envelope) {
        let Some(id) = envelope.origin_peer_id else {
            logging::debug_kv("signalling frame without origin", &[]);
            return;
        };
        match self.peers.iter_mut().find(|p| p.descriptor().id == id) {
            Some(peer) => peer.receive_signalling_message(&envelope.payload),
            // departure races with in-flight signaling; benign
            None => logging::debug_kv(
                "dropping signalling for absent peer",
                &[("peer_id", &id.to_string())],
            ),
        }
    }

    fn on_announce(&mut self, envelope: &Envelope) -> Result<(), RoomError> {
        let descriptor =
            PeerDescriptor::from_payload(envelope.payload.get("peer").unwrap_or(&Value::Null))?;
        let id = descriptor.id;
        self.add_peer(descriptor.clone(), false);
        self.events.emit(RoomEvent::PeerAnnounce {
            peer: descriptor,
            envelope: envelope.clone(),
        });
        self.attempt_resume_file_transfers(id);
        Ok(())
    }

    fn on_join(&mut self, envelope: &Envelope) -> Result<(), RoomError> {
        // A join without a usable self-identity is malformed; established
        // identity must not be clobbered by it.
        let own: JoinSelf = serde_json::from_value(
            envelope.payload.get("self").cloned().unwrap_or(Value::Null),
        )?;
        self.self_peer_id = Some(own.peer_id);

        let members = envelope
            .payload
            .get("members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for member in &members {
            // members listed without a live connection id are not connectable
            if member.get("peerId").and_then(Value::as_u64).is_none() {
                continue;
            }
            let descriptor = PeerDescriptor::from_payload(member)?;
            let id = descriptor.id;
            self.add_peer(descriptor, true);
            if let Some(peer) = self.peer_mut(id) {
                peer.start();
            }
            self.attempt_resume_file_transfers(id);
        }
        self.events.emit(RoomEvent::Join {
            payload: envelope.payload.clone(),
            envelope: envelope.clone(),
        });
        Ok(())
    }

    fn on_leave(&mut self, envelope: &Envelope) -> Result<(), RoomError> {
        let leave: LeavePayload = serde_json::from_value(envelope.payload.clone())?;
        let descriptor = self.remove_peer(leave.id)?;
        self.events.emit(RoomEvent::PeerLeave {
            peer: descriptor,
            envelope: envelope.clone(),
        });
        Ok(())
    }

    fn on_event(&mut self, envelope: &Envelope) {
        if self.is_echo(envelope) {
            return;
        }
        let name = envelope
            .payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let data = envelope.payload.get("data").cloned().unwrap_or(Value::Null);
        self.events.emit(RoomEvent::Custom {
            name,
            data,
            envelope: envelope.clone(),
        });
    }

    /// Create-or-replace by transient id. A duplicate announce supersedes
    /// the existing entry without duplicating it; the superseded session
    /// is dropped. An attached local stream is handed to the new session
    /// immediately.
    pub fn add_peer(&mut self, descriptor: PeerDescriptor, is_initiator: bool) -> PeerId {
        let mut peer = (self.make_peer)(&descriptor, is_initiator);
        if let Some(stream) = &self.stream {
            peer.add_local_stream(stream);
        }
        let id = descriptor.id;
        match self.peers.iter().position(|p| p.descriptor().id == id) {
            Some(idx) => self.peers[idx] = peer,
            None => self.peers.push(peer),
        }
        logging::info_kv(
            "peer added",
            &[
                ("peer_id", &id.to_string()),
                ("uid", &descriptor.uid.to_string()),
            ],
        );
        self.events.emit(RoomEvent::PeerAdded { peer: descriptor });
        id
    }

    /// Remove by transient id, ending the session. A miss is a fault: it
    /// means local membership has drifted from the server's.
    pub fn remove_peer(&mut self, id: PeerId) -> Result<PeerDescriptor, RoomError> {
        let idx = self
            .peers
            .iter()
            .position(|p| p.descriptor().id == id)
            .ok_or(RoomError::PeerNotFound { id })?;
        let mut peer = self.peers.remove(idx);
        peer.end();
        let descriptor = peer.descriptor().clone();
        logging::info_kv("peer removed", &[("peer_id", &id.to_string())]);
        self.events.emit(RoomEvent::PeerRemoved {
            peer_id: descriptor.id,
            uid: descriptor.uid,
        });
        Ok(descriptor)
    }

    pub fn get_peer(&self, id: PeerId) -> Option<&dyn PeerSession> {
        self.peers
            .iter()
            .find(|p| p.descriptor().id == id)
            .map(|p| p.as_ref())
    }

    fn peer_mut(&mut self, id: PeerId) -> Option<&mut Box<dyn PeerSession>> {
        self.peers.iter_mut().find(|p| p.descriptor().id == id)
    }

    /// Encode and send an envelope, either as a durable message over HTTP
    /// or fire-and-forget over the socket. HTTP failures surface to the
    /// caller; nothing is retried here.
    pub async fn send(
        &mut self,
        kind: MessageType,
        payload: Value,
        via_http: bool,
    ) -> Result<Option<Value>, RoomError> {
        let wire = Envelope::new(kind, payload).encode();
        if via_http {
            let body = json!({
                "type": kind.code(),
                "payload": wire.get("p").cloned().unwrap_or(Value::Null),
            });
            let ack = self.api.post_json(&self.urls.messages, &body).await?;
            Ok(Some(ack))
        } else {
            self.socket.send(wire.to_string())?;
            Ok(None)
        }
    }

    pub async fn send_event(
        &mut self,
        name: &str,
        data: Value,
        via_http: bool,
    ) -> Result<Option<Value>, RoomError> {
        let payload = json!({ "type": name, "data": data });
        self.send(MessageType::Event, payload, via_http).await
    }

    /// Submit the initial join payload over HTTP.
    pub async fn initial_join(&self, data: Value) -> Result<Value, RoomError> {
        self.api
            .post_json(&self.urls.join, &decamelize_keys(data))
            .await
    }

    /// Invoke a named room action.
    pub async fn run_action(&self, name: &str, data: Value) -> Result<Value, RoomError> {
        let url = self.urls.action.replace(":name", &decamelize(name));
        self.api.post_json(&url, &decamelize_keys(data)).await
    }

    pub async fn notify_created_recording(&self, data: Value) -> Result<Value, RoomError> {
        self.api
            .post_json(&self.urls.recordings, &decamelize_keys(data))
            .await
    }

    /// Fetch message history, optionally bounded by a millisecond
    /// timestamp.
    pub async fn get_messages(&self, until: Option<i64>) -> Result<Vec<Envelope>, RoomError> {
        let url = match until {
            Some(ts) => format!("{}?until={ts}", self.urls.messages),
            None => self.urls.messages.clone(),
        };
        let body = self.api.get_json(&url).await?;
        let items = body
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        items.into_iter().map(Envelope::from_value).collect()
    }

    /// Replace the outbound local stream and attach it to every peer.
    pub fn connect_stream(&mut self, stream: LocalStream) {
        for peer in &mut self.peers {
            peer.add_local_stream(&stream);
        }
        self.stream = Some(stream);
        self.events.emit(RoomEvent::LocalStreamConnected);
    }

    /// Ask a peer to send us a file. The pending receiver is recorded
    /// under the peer's stable identity so it survives the peer's
    /// transient id changing across a reconnect.
    pub fn request_file_transfer(
        &mut self,
        file_id: &str,
        peer_id: PeerId,
        mode: TransferMode,
    ) -> Result<(), RoomError> {
        let uid = {
            let peer = self
                .peer_mut(peer_id)
                .ok_or(RoomError::PeerNotFound { id: peer_id })?;
            let uid = peer.descriptor().uid;
            peer.send_signalling_message(
                "requestFileTransfer",
                json!({ "fileId": file_id, "mode": mode.as_str() }),
            )?;
            uid
        };
        self.transfers.track(uid, file_id, mode);
        self.events
            .emit(RoomEvent::FileTransfer(TransferEvent::Requested {
                owner_uid: uid,
                file_id: file_id.to_string(),
            }));
        Ok(())
    }

    /// Re-issue transfer requests for everything still pending under this
    /// peer's stable identity. Requests for different peers may complete
    /// in any order; a failure for one file does not stop the rest.
    pub fn attempt_resume_file_transfers(&mut self, peer_id: PeerId) {
        let Some(uid) = self.get_peer(peer_id).map(|p| p.descriptor().uid) else {
            return;
        };
        for pending in self.transfers.receivers_for_uid(uid) {
            if let Err(err) = self.request_file_transfer(&pending.file_id, peer_id, pending.mode) {
                logging::error(format!(
                    "resuming transfer {} for uid {uid} failed: {err}",
                    pending.file_id
                ));
            }
        }
    }

    /// Notification from a peer's session layer. Tolerates the peer
    /// having been removed meanwhile; session callbacks race with
    /// membership changes.
    pub fn handle_peer_event(&mut self, peer_id: PeerId, event: PeerEvent) {
        let Some(descriptor) = self.get_peer(peer_id).map(|p| p.descriptor().clone()) else {
            logging::debug_kv(
                "peer event for absent peer",
                &[("peer_id", &peer_id.to_string())],
            );
            return;
        };
        match event {
            PeerEvent::FileTransferChannelOpen { file_id, channel } => {
                if self.transfers.begin_receive(descriptor.uid, &file_id, channel) {
                    self.events
                        .emit(RoomEvent::FileTransfer(TransferEvent::Started {
                            owner_uid: descriptor.uid,
                            file_id,
                        }));
                } else {
                    logging::debug_kv(
                        "channel for unknown transfer",
                        &[("uid", &descriptor.uid.to_string()), ("file_id", &file_id)],
                    );
                }
            }
            PeerEvent::FileTransferRequested { data } => {
                self.events.emit(RoomEvent::FileTransferRequested {
                    peer: descriptor,
                    data,
                });
            }
        }
    }

    /// The receiving side finished; forget the pending entry.
    pub fn complete_file_transfer(&mut self, owner_uid: Uid, file_id: &str) {
        if self.transfers.complete(owner_uid, file_id) {
            self.events
                .emit(RoomEvent::FileTransfer(TransferEvent::Completed {
                    owner_uid,
                    file_id: file_id.to_string(),
                }));
        }
    }

    pub fn cancel_file_transfer(&mut self, owner_uid: Uid, file_id: &str) {
        if self.transfers.cancel(owner_uid, file_id) {
            self.events
                .emit(RoomEvent::FileTransfer(TransferEvent::Cancelled {
                    owner_uid,
                    file_id: file_id.to_string(),
                }));
        }
    }
}
