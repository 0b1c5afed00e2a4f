use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use bazaar_types::api::MessageResponse;
use bazaar_types::events::GatewayEvent;

/// Push seam between the HTTP write path and live sockets.
///
/// Called after the message is durable. Delivery is best effort: the return
/// value is how many sockets accepted the frame, and a failed push never
/// surfaces to the caller.
pub trait RoomFanout: Send + Sync {
    fn publish(&self, message: &MessageResponse) -> usize;
}

struct Subscriber {
    user_id: String,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// In-memory registry of live room sockets.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// room_id -> (conn_id -> subscriber)
    rooms: RwLock<HashMap<Uuid, HashMap<Uuid, Subscriber>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket for `room_id`. Returns (conn_id, receiver).
    pub fn register(&self, room_id: Uuid, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(room_id)
            .or_default()
            .insert(
                conn_id,
                Subscriber {
                    user_id: user_id.to_string(),
                    tx,
                },
            );
        debug!("{} subscribed to room {} (conn {})", user_id, room_id, conn_id);
        (conn_id, rx)
    }

    /// Drop a socket. Rooms left without subscribers are removed.
    pub fn unregister(&self, room_id: Uuid, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(conns) = rooms.get_mut(&room_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    pub fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.inner
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&room_id)
            .map_or(0, HashMap::len)
    }

    /// Send a frame to every socket in the frame's room. Sockets whose
    /// receiver is gone are pruned.
    pub fn broadcast(&self, event: GatewayEvent) -> usize {
        let room_id = event.room_id();
        let mut dead = Vec::new();
        let mut delivered = 0;

        {
            let rooms = self.inner.rooms.read().unwrap_or_else(PoisonError::into_inner);
            let Some(conns) = rooms.get(&room_id) else {
                return 0;
            };
            for (conn_id, sub) in conns {
                if sub.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    warn!("Dropping frame for {} in room {}: socket gone", sub.user_id, room_id);
                    dead.push(*conn_id);
                }
            }
        }

        for conn_id in dead {
            self.unregister(room_id, conn_id);
        }
        delivered
    }
}

impl RoomFanout for Dispatcher {
    fn publish(&self, message: &MessageResponse) -> usize {
        self.broadcast(GatewayEvent::MessageCreate(message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_types::models::MessageKind;

    fn message(room_id: Uuid, seq: i64) -> MessageResponse {
        MessageResponse {
            id: Uuid::new_v4(),
            room_id,
            seq,
            sender_id: "alice".into(),
            kind: MessageKind::Text,
            text: Some(format!("m{}", seq)),
            file_ref: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_only_the_room() {
        let dispatcher = Dispatcher::new();
        let (room, other) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, mut alice) = dispatcher.register(room, "alice");
        let (_, mut bob) = dispatcher.register(room, "bob");
        let (_, mut carol) = dispatcher.register(other, "carol");

        assert_eq!(dispatcher.publish(&message(room, 1)), 2);

        for rx in [&mut alice, &mut bob] {
            match rx.recv().await {
                Some(GatewayEvent::MessageCreate(m)) => assert_eq!(m.seq, 1),
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        assert!(carol.try_recv().is_err());
    }

    #[test]
    fn dead_sockets_are_pruned() {
        let dispatcher = Dispatcher::new();
        let room = Uuid::new_v4();
        let (_, live) = dispatcher.register(room, "alice");
        let (_, gone) = dispatcher.register(room, "bob");
        drop(gone);

        assert_eq!(dispatcher.publish(&message(room, 1)), 1);
        assert_eq!(dispatcher.subscriber_count(room), 1);
        drop(live);
    }

    #[test]
    fn unregister_removes_empty_rooms() {
        let dispatcher = Dispatcher::new();
        let room = Uuid::new_v4();
        let (conn_id, _rx) = dispatcher.register(room, "alice");

        dispatcher.unregister(room, conn_id);
        dispatcher.unregister(room, conn_id);
        assert_eq!(dispatcher.subscriber_count(room), 0);
        assert_eq!(dispatcher.publish(&message(room, 1)), 0);
    }
}
