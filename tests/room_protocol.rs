use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use roomlink::error::RoomError;
use roomlink::events::RoomEvent;
use roomlink::http::{RoomApi, RoomUrls};
use roomlink::peer::{LocalStream, PeerDescriptor, PeerSession};
use roomlink::room::RoomConnection;
use roomlink::transfer::TransferMode;
use roomlink::transport::SocketChannel;

struct StubPeer {
    descriptor: PeerDescriptor,
    initiator: bool,
    requests: Arc<Mutex<Vec<(u64, String, Value)>>>,
}

impl PeerSession for StubPeer {
    fn descriptor(&self) -> &PeerDescriptor {
        &self.descriptor
    }

    fn is_initiator(&self) -> bool {
        self.initiator
    }

    fn start(&mut self) {}
    fn end(&mut self) {}
    fn receive_signalling_message(&mut self, _payload: &Value) {}

    fn send_signalling_message(&mut self, kind: &str, payload: Value) -> Result<(), RoomError> {
        self.requests
            .lock()
            .unwrap()
            .push((self.descriptor.id, kind.to_string(), payload));
        Ok(())
    }

    fn add_local_stream(&mut self, _stream: &LocalStream) {}
}

struct StubSocket {
    sent: Arc<Mutex<Vec<String>>>,
}

impl SocketChannel for StubSocket {
    fn open(&mut self) {}

    fn send(&mut self, frame: String) -> Result<(), RoomError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }
}

#[derive(Clone)]
struct StubApi;

impl RoomApi for StubApi {
    async fn post_json(&self, _url: &str, _body: &Value) -> Result<Value, RoomError> {
        Ok(json!({"ok": true}))
    }

    async fn get_json(&self, _url: &str) -> Result<Value, RoomError> {
        Ok(json!({"messages": []}))
    }
}

struct Harness {
    room: RoomConnection<StubApi>,
    sent: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<(u64, String, Value)>>>,
}

fn harness() -> Harness {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let factory_requests = requests.clone();
    let room = RoomConnection::new(
        StubApi,
        RoomUrls::for_room("http://test", "kitchen"),
        Box::new(StubSocket { sent: sent.clone() }),
        Box::new(move |descriptor: &PeerDescriptor, is_initiator| {
            Box::new(StubPeer {
                descriptor: descriptor.clone(),
                initiator: is_initiator,
                requests: factory_requests.clone(),
            }) as Box<dyn PeerSession>
        }),
    );
    Harness {
        room,
        sent,
        requests,
    }
}

#[test]
fn join_sets_self_identity_and_builds_peer_set() {
    let mut h = harness();
    let mut events = h.room.subscribe();
    h.room
        .handle_frame(r#"{"t":"j","p":{"members":[{"peer_id":1,"uid":11}],"self":{"peer_id":99}}}"#)
        .unwrap();

    assert_eq!(h.room.self_peer_id(), Some(99));
    let peers = h.room.peer_descriptors();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, 1);
    assert_eq!(peers[0].uid, 11);

    let mut saw_join = false;
    while let Ok(event) = events.try_recv() {
        if let RoomEvent::Join { payload, .. } = event {
            // payload is camelized in-process
            assert_eq!(payload["self"]["peerId"], 99);
            assert_eq!(payload["members"][0]["peerId"], 1);
            saw_join = true;
        }
    }
    assert!(saw_join);
}

#[test]
fn repeated_join_reassigns_self_identity() {
    let mut h = harness();
    h.room
        .handle_frame(r#"{"t":"j","p":{"members":[],"self":{"peer_id":99}}}"#)
        .unwrap();
    assert_eq!(h.room.self_peer_id(), Some(99));
    h.room
        .handle_frame(r#"{"t":"j","p":{"members":[],"self":{"peer_id":7}}}"#)
        .unwrap();
    assert_eq!(h.room.self_peer_id(), Some(7));
}

#[test]
fn duplicate_announce_keeps_one_entry_per_id() {
    let mut h = harness();
    let frame = r#"{"t":"a","p":{"peer":{"peer_id":2,"uid":22}}}"#;
    h.room.handle_frame(frame).unwrap();
    h.room.handle_frame(frame).unwrap();
    let peers = h.room.peer_descriptors();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, 2);
    assert_eq!(peers[0].uid, 22);
}

#[test]
fn leave_removes_once_then_faults() {
    let mut h = harness();
    h.room
        .handle_frame(r#"{"t":"a","p":{"peer":{"peer_id":2,"uid":22}}}"#)
        .unwrap();
    let mut events = h.room.subscribe();

    h.room.handle_frame(r#"{"t":"l","p":{"id":2}}"#).unwrap();
    let mut saw_removed = false;
    while let Ok(event) = events.try_recv() {
        if let RoomEvent::PeerRemoved { peer_id, uid } = event {
            assert_eq!(peer_id, 2);
            assert_eq!(uid, 22);
            saw_removed = true;
        }
    }
    assert!(saw_removed);

    let err = h
        .room
        .handle_frame(r#"{"t":"l","p":{"id":2}}"#)
        .unwrap_err();
    assert!(matches!(err, RoomError::PeerNotFound { id: 2 }));
}

#[tokio::test]
async fn send_event_writes_decamelized_socket_frame() {
    let mut h = harness();
    h.room
        .send_event("testEvent", json!({"foo": "bar"}), false)
        .await
        .unwrap();

    let sent = h.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let frame: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(
        frame,
        json!({"t": "e", "p": {"type": "test_event", "data": {"foo": "bar"}}})
    );
}

#[test]
fn pending_transfer_resumes_across_reconnect() {
    let mut h = harness();
    h.room
        .handle_frame(r#"{"t":"a","p":{"peer":{"peer_id":2,"uid":22}}}"#)
        .unwrap();
    h.room
        .request_file_transfer("F", 2, TransferMode::P2p)
        .unwrap();
    h.requests.lock().unwrap().clear();

    // counterpart drops and reappears under a new transient id via join
    h.room.handle_frame(r#"{"t":"l","p":{"id":2}}"#).unwrap();
    h.room
        .handle_frame(r#"{"t":"j","p":{"members":[{"peer_id":8,"uid":22}],"self":{"peer_id":99}}}"#)
        .unwrap();

    let requests = h.requests.lock().unwrap();
    let resumed: Vec<_> = requests
        .iter()
        .filter(|(_, kind, _)| kind == "requestFileTransfer")
        .collect();
    assert_eq!(resumed.len(), 1);
    let (peer_id, _, payload) = resumed[0];
    assert_eq!(*peer_id, 8);
    assert_eq!(payload["fileId"], "F");
}

#[test]
fn peer_set_stays_unique_over_churn() {
    let mut h = harness();
    let frames = [
        concat!(
            r#"{"t":"j","p":{"members":[{"peer_id":1,"uid":11},"#,
            r#"{"peer_id":2,"uid":22}],"self":{"peer_id":99}}}"#,
        ),
        r#"{"t":"a","p":{"peer":{"peer_id":2,"uid":22}}}"#,
        r#"{"t":"a","p":{"peer":{"peer_id":3,"uid":33}}}"#,
        r#"{"t":"l","p":{"id":1}}"#,
        r#"{"t":"a","p":{"peer":{"peer_id":3,"uid":33}}}"#,
    ];
    for frame in frames {
        h.room.handle_frame(frame).unwrap();
    }
    let mut ids: Vec<_> = h.room.peer_descriptors().iter().map(|p| p.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3]);
}
