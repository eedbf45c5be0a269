use serde::Deserialize;
use serde_json::{json, Value};

use crate::casing::{camelize, camelize_keys, decamelize, decamelize_keys};
use crate::error::RoomError;

/// Transient per-session connection identifier.
pub type PeerId = u64;
/// Stable participant identity, surviving reconnects.
pub type Uid = u64;

/// The five message kinds carried over the control channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageType {
    Signalling,
    Announce,
    Join,
    Leave,
    Event,
}

impl MessageType {
    pub fn code(self) -> &'static str {
        match self {
            MessageType::Signalling => "s",
            MessageType::Announce => "a",
            MessageType::Join => "j",
            MessageType::Leave => "l",
            MessageType::Event => "e",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, RoomError> {
        match code {
            "s" => Ok(MessageType::Signalling),
            "a" => Ok(MessageType::Announce),
            "j" => Ok(MessageType::Join),
            "l" => Ok(MessageType::Leave),
            "e" => Ok(MessageType::Event),
            other => Err(RoomError::Protocol {
                tag: other.to_string(),
            }),
        }
    }
}

/// Raw frame shape on the wire: `{t, p}` plus the relay-stamped origin
/// peer id under `P`.
#[derive(Debug, Deserialize)]
struct WireFrame {
    t: String,
    #[serde(default)]
    p: Value,
    #[serde(rename = "P", default)]
    peer_id: Option<PeerId>,
}

/// A decoded control-channel message: payload keys are camelCase
/// in-process, snake_case on the wire. Constructed fresh per inbound
/// frame and immutable afterwards.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub kind: MessageType,
    pub payload: Value,
    pub origin_peer_id: Option<PeerId>,
}

impl Envelope {
    /// Build an outbound envelope from an in-process (camelCase) payload.
    pub fn new(kind: MessageType, payload: Value) -> Self {
        Envelope {
            kind,
            payload,
            origin_peer_id: None,
        }
    }

    pub fn decode(raw: &str) -> Result<Self, RoomError> {
        let frame: WireFrame = serde_json::from_str(raw)?;
        Self::from_wire(frame)
    }

    pub fn from_value(value: Value) -> Result<Self, RoomError> {
        let frame: WireFrame = serde_json::from_value(value)?;
        Self::from_wire(frame)
    }

    fn from_wire(frame: WireFrame) -> Result<Self, RoomError> {
        let kind = MessageType::from_code(&frame.t)?;
        let mut payload = camelize_keys(frame.p);
        if kind == MessageType::Event {
            // The event's own sub-type is a bare token, transformed
            // separately from the key pass.
            transform_event_type(&mut payload, &camelize);
        }
        Ok(Envelope {
            kind,
            payload,
            origin_peer_id: frame.peer_id,
        })
    }

    /// Wire form `{t, p}` with snake_case payload keys.
    pub fn encode(&self) -> Value {
        let mut payload = decamelize_keys(self.payload.clone());
        if self.kind == MessageType::Event {
            transform_event_type(&mut payload, &decamelize);
        }
        json!({ "t": self.kind.code(), "p": payload })
    }

    pub fn encode_text(&self) -> String {
        self.encode().to_string()
    }
}

fn transform_event_type(payload: &mut Value, f: &dyn Fn(&str) -> String) {
    if let Some(map) = payload.as_object_mut() {
        let transformed = match map.get("type") {
            Some(Value::String(name)) => f(name),
            _ => return,
        };
        map.insert("type".to_string(), Value::String(transformed));
    }
}
