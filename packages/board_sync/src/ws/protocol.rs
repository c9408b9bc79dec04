//! WebSocket Protocol Types
//!
//! Envelope exchanged between board clients and the server. Frames are JSON
//! objects with a `type` tag, the board id and a kind-dependent payload:
//!
//! ```text
//! {"type":"object_update","board_id":"b1","payload":{"id":"shape-1", ...}}
//! {"type":"object_focus","board_id":"b1","payload":"shape-1"}
//! {"type":"object_blur","board_id":"b1","payload":"shape-1"}
//! {"type":"object_delete","board_id":"b1","payload":"shape-1"}
//! ```
//!
//! A released blur is broadcast as `object_blur` carrying the full object.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::SharedObject;

pub const KIND_UPDATE: &str = "object_update";
pub const KIND_FOCUS: &str = "object_focus";
pub const KIND_BLUR: &str = "object_blur";
pub const KIND_DELETE: &str = "object_delete";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown message type {0:?}")]
    UnknownKind(String),

    #[error("payload does not match {kind}: {source}")]
    PayloadMismatch {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// What an envelope asks for, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create or replace an object.
    Update(SharedObject),
    /// Claim the focus lock on an object id.
    Focus(String),
    /// Release the focus lock on an object id.
    Blur(String),
    /// Server-side result of an effective blur: the object without its lock.
    Released(SharedObject),
    /// Remove an object id.
    Delete(String),
}

impl Operation {
    /// Wire `type` tag for this operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Update(_) => KIND_UPDATE,
            Operation::Focus(_) => KIND_FOCUS,
            Operation::Blur(_) | Operation::Released(_) => KIND_BLUR,
            Operation::Delete(_) => KIND_DELETE,
        }
    }

    /// Id of the object this operation targets.
    pub fn object_id(&self) -> &str {
        match self {
            Operation::Update(obj) | Operation::Released(obj) => &obj.id,
            Operation::Focus(id) | Operation::Blur(id) | Operation::Delete(id) => id,
        }
    }
}

/// One protocol message, bound to a board.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub board_id: String,
    pub op: Operation,
}

/// Raw frame layout shared by decoding and encoding.
#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    board_id: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    board_id: &'a str,
    payload: PayloadRef<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PayloadRef<'a> {
    Object(&'a SharedObject),
    Id(&'a str),
}

/// Which side produced the frame being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Client,
    Server,
}

impl Envelope {
    pub fn new(board_id: impl Into<String>, op: Operation) -> Self {
        Self {
            board_id: board_id.into(),
            op,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.op.kind()
    }

    /// Decode a client request. `object_blur` must carry a bare object id.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode_from(frame, Origin::Client)
    }

    /// Decode a server broadcast, where `object_blur` carries the released
    /// object instead of an id.
    pub fn decode_broadcast(frame: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode_from(frame, Origin::Server)
    }

    fn decode_from(frame: &[u8], origin: Origin) -> Result<Self, ProtocolError> {
        let raw: InboundFrame = serde_json::from_slice(frame).map_err(ProtocolError::Malformed)?;
        let payload = raw.payload;

        let op = match raw.kind.as_str() {
            KIND_UPDATE => Operation::Update(object_payload(KIND_UPDATE, payload)?),
            KIND_FOCUS => Operation::Focus(id_payload(KIND_FOCUS, payload)?),
            KIND_DELETE => Operation::Delete(id_payload(KIND_DELETE, payload)?),
            KIND_BLUR => match origin {
                Origin::Client => Operation::Blur(id_payload(KIND_BLUR, payload)?),
                Origin::Server if payload.is_string() => {
                    Operation::Blur(id_payload(KIND_BLUR, payload)?)
                }
                Origin::Server => Operation::Released(object_payload(KIND_BLUR, payload)?),
            },
            _ => return Err(ProtocolError::UnknownKind(raw.kind)),
        };

        Ok(Self {
            board_id: raw.board_id,
            op,
        })
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let payload = match &self.op {
            Operation::Update(obj) | Operation::Released(obj) => PayloadRef::Object(obj),
            Operation::Focus(id) | Operation::Blur(id) | Operation::Delete(id) => {
                PayloadRef::Id(id)
            }
        };
        serde_json::to_string(&OutboundFrame {
            kind: self.kind(),
            board_id: &self.board_id,
            payload,
        })
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) on {}", self.kind(), self.op.object_id(), self.board_id)
    }
}

fn object_payload(
    kind: &'static str,
    payload: serde_json::Value,
) -> Result<SharedObject, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::PayloadMismatch { kind, source })
}

fn id_payload(kind: &'static str, payload: serde_json::Value) -> Result<String, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::PayloadMismatch { kind, source })
}
