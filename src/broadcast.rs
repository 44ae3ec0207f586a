use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::Message;
use crate::render;

const STREAM_CAPACITY: usize = 64;

/// How a fragment is applied at the target selector on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Append under the room's message list (new messages).
    Insert,
    /// Swap the message's own element in place (edits).
    Replace,
    Remove,
}

/// One DOM update, published once per room-affecting event. Every
/// subscriber of the room receives the same envelope; each client resolves
/// its own fragment with [`Envelope::fragment_for`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub target: String,
    pub operation: Operation,
    pub default_fragment: String,
    /// Keyed by user id. A client whose id is absent uses the default.
    pub custom_fragments: HashMap<String, String>,
}

impl Envelope {
    /// Pure lookup-with-default. Clients with the same identity always
    /// resolve the same fragment.
    pub fn fragment_for(&self, identity: &str) -> &str {
        self.custom_fragments
            .get(identity)
            .map(String::as_str)
            .unwrap_or(&self.default_fragment)
    }
}

pub fn room_target(room_id: &str) -> String {
    format!("#messages-{room_id}")
}

pub fn message_target(message_id: &str) -> String {
    format!("#message-{message_id}")
}

/// A room's live event stream plus the gate that keeps publish order equal
/// to write order for that room.
#[derive(Clone)]
pub struct RoomStream {
    tx: broadcast::Sender<Envelope>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl RoomStream {
    fn new() -> Self {
        Self {
            tx: broadcast::channel(STREAM_CAPACITY).0,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Hold the returned guard across store-write and publish so that
    /// envelopes leave in the same order the writes committed.
    pub async fn write_order(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Publish to all current subscribers. A room with no listeners is
    /// not an error.
    pub fn publish(&self, envelope: Envelope) -> usize {
        match self.tx.send(envelope) {
            Ok(delivered) => delivered,
            Err(_) => {
                tracing::debug!("publish with no subscribers");
                0
            }
        }
    }
}

/// Registry of per-room streams, created on demand. Cloning is cheap and
/// all clones share the same streams.
#[derive(Clone, Default)]
pub struct RoomStreams(Arc<Mutex<HashMap<Uuid, RoomStream>>>);

impl RoomStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self, room_id: Uuid) -> RoomStream {
        let mut rooms = self.0.lock().unwrap();
        rooms.entry(room_id).or_insert_with(RoomStream::new).clone()
    }

    pub fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<Envelope> {
        self.stream(room_id).subscribe()
    }
}

/// Render both viewer variants of `message` and publish one envelope to
/// the room. The author's id is the only custom-fragment key; everyone
/// else falls back to the default fragment.
pub fn dispatch(
    stream: &RoomStream,
    message: &Message,
    author_handle: &str,
    operation: Operation,
) -> usize {
    let target = match operation {
        Operation::Insert => room_target(&message.room_id),
        Operation::Replace | Operation::Remove => message_target(&message.id),
    };

    let envelope = Envelope {
        target,
        operation,
        default_fragment: render::message_fragment(message, author_handle, false),
        custom_fragments: HashMap::from([(
            message.user_id.clone(),
            render::message_fragment(message, author_handle, true),
        )]),
    };

    let delivered = stream.publish(envelope);
    tracing::debug!(message = %message.id, ?operation, delivered, "dispatched envelope");
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            target: "#messages-r1".to_owned(),
            operation: Operation::Insert,
            default_fragment: "<div>other</div>".to_owned(),
            custom_fragments: HashMap::from([(
                "alice".to_owned(),
                "<div>mine</div>".to_owned(),
            )]),
        }
    }

    #[test]
    fn fragment_for_resolves_own_override() {
        assert_eq!(envelope().fragment_for("alice"), "<div>mine</div>");
    }

    #[test]
    fn fragment_for_falls_back_to_default() {
        let e = envelope();
        assert_eq!(e.fragment_for("bob"), "<div>other</div>");
        assert_eq!(e.fragment_for(""), "<div>other</div>");
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let value = serde_json::to_value(envelope()).unwrap();
        assert_eq!(value["operation"], "insert");
        assert_eq!(value["target"], "#messages-r1");
        assert_eq!(value["defaultFragment"], "<div>other</div>");
        assert_eq!(value["customFragments"]["alice"], "<div>mine</div>");
    }

    #[test]
    fn streams_are_shared_across_clones() {
        let streams = RoomStreams::new();
        let room = Uuid::now_v7();
        let mut rx = streams.subscribe(room);
        let delivered = streams.clone().stream(room).publish(envelope());
        assert_eq!(delivered, 1);
        assert_eq!(rx.try_recv().unwrap().target, "#messages-r1");
    }
}
