//! Applies decoded envelopes to a board partition.

use tracing::debug;

use crate::metrics::ServerMetrics;
use crate::models::Identity;
use crate::store::{RoomObjects, UpdateOutcome};

use super::protocol::{Envelope, Operation};

/// Run one client operation against the board and return what the room
/// should see, or `None` when nothing observable changed.
pub async fn apply_envelope(
    objects: &RoomObjects,
    sender: &Identity,
    envelope: Envelope,
    metrics: &ServerMetrics,
) -> Option<Envelope> {
    let Envelope { board_id, op } = envelope;

    match op {
        // Peers see the stored object, so the lock they observe is the
        // store's and never the client's copy
        Operation::Update(incoming) => match objects.apply_update(sender, incoming).await {
            UpdateOutcome::Applied(stored) => {
                Some(Envelope::new(board_id, Operation::Update(stored)))
            }
            UpdateOutcome::Locked => {
                metrics.update_rejected();
                None
            }
        },
        Operation::Focus(object_id) => {
            objects.acquire_focus(sender, &object_id).await;
            Some(Envelope::new(board_id, Operation::Focus(object_id)))
        }
        Operation::Blur(object_id) => {
            let released = objects.release_focus(sender, &object_id).await;
            if released.is_none() {
                debug!(
                    board = %objects.board_id(),
                    object = %object_id,
                    user = sender.user_id,
                    "Blur ignored, sender does not hold focus"
                );
            }
            released.map(|obj| Envelope::new(board_id, Operation::Released(obj)))
        }
        Operation::Delete(object_id) => {
            objects.delete(&object_id).await;
            Some(Envelope::new(board_id, Operation::Delete(object_id)))
        }
        Operation::Released(obj) => {
            debug!(
                board = %objects.board_id(),
                object = %obj.id,
                "Ignoring server-only operation from client"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FocusLock, SharedObject};

    fn alice() -> Identity {
        Identity::new(1, "Alice")
    }

    fn bob() -> Identity {
        Identity::new(2, "Bob")
    }

    fn moved(id: &str, x: f64) -> SharedObject {
        SharedObject {
            x,
            kind: "rectangle".into(),
            ..SharedObject::bare(id)
        }
    }

    #[tokio::test]
    async fn test_update_broadcasts_stored_object() {
        let room = RoomObjects::new("b1");
        let metrics = ServerMetrics::new();
        let env = Envelope::new("b1", Operation::Update(moved("s", 3.0)));

        let out = apply_envelope(&room, &alice(), env.clone(), &metrics).await;
        assert_eq!(out, Some(env));
        assert_eq!(room.get("s").await.unwrap().x, 3.0);
    }

    #[tokio::test]
    async fn test_holder_update_broadcasts_stored_lock() {
        let room = RoomObjects::seeded("b1", vec![moved("s", 1.0)]);
        let metrics = ServerMetrics::new();
        room.acquire_focus(&alice(), "s").await;

        // A drag update without lock fields
        let env = Envelope::new("b1", Operation::Update(moved("s", 5.0)));
        let out = apply_envelope(&room, &alice(), env, &metrics).await.unwrap();

        let stored = room.get("s").await.unwrap();
        assert_eq!(out.op, Operation::Update(stored.clone()));
        assert_eq!(stored.focused_by(), Some(1));
        assert_eq!(stored.x, 5.0);
    }

    #[tokio::test]
    async fn test_client_lock_fields_never_broadcast() {
        let room = RoomObjects::new("b1");
        let metrics = ServerMetrics::new();
        let mut forged = moved("t", 2.0);
        forged.focus = Some(FocusLock::held_by(&bob()));

        let env = Envelope::new("b1", Operation::Update(forged));
        let out = apply_envelope(&room, &alice(), env, &metrics).await.unwrap();
        match out.op {
            Operation::Update(obj) => assert!(obj.focus.is_none()),
            other => panic!("Expected Update, got {:?}", other),
        }
        assert!(room.get("t").await.unwrap().focus.is_none());
    }

    #[tokio::test]
    async fn test_locked_update_is_silent() {
        let room = RoomObjects::seeded("b1", vec![moved("s", 1.0)]);
        let metrics = ServerMetrics::new();
        room.acquire_focus(&alice(), "s").await;

        let env = Envelope::new("b1", Operation::Update(moved("s", 99.0)));
        assert!(apply_envelope(&room, &bob(), env, &metrics).await.is_none());
        assert_eq!(room.get("s").await.unwrap().x, 1.0);
        assert_eq!(metrics.snapshot().messages.rejected_updates, 1);
    }

    #[tokio::test]
    async fn test_focus_then_blur() {
        let room = RoomObjects::seeded("b1", vec![moved("s", 1.0)]);
        let metrics = ServerMetrics::new();

        let focus = Envelope::new("b1", Operation::Focus("s".into()));
        assert_eq!(
            apply_envelope(&room, &alice(), focus.clone(), &metrics).await,
            Some(focus)
        );

        let blur = Envelope::new("b1", Operation::Blur("s".into()));
        let out = apply_envelope(&room, &alice(), blur, &metrics).await.unwrap();
        assert_eq!(out.kind(), "object_blur");
        assert_eq!(out.op, Operation::Released(moved("s", 1.0)));
    }

    #[tokio::test]
    async fn test_blur_by_non_holder_is_silent() {
        let room = RoomObjects::seeded("b1", vec![moved("s", 1.0)]);
        let metrics = ServerMetrics::new();
        room.acquire_focus(&alice(), "s").await;

        let blur = Envelope::new("b1", Operation::Blur("s".into()));
        assert!(apply_envelope(&room, &bob(), blur, &metrics).await.is_none());
        assert_eq!(room.get("s").await.unwrap().focused_by(), Some(1));
    }

    #[tokio::test]
    async fn test_delete_is_unconditional() {
        let room = RoomObjects::seeded("b1", vec![moved("s", 1.0)]);
        let metrics = ServerMetrics::new();
        room.acquire_focus(&alice(), "s").await;

        let delete = Envelope::new("b1", Operation::Delete("s".into()));
        assert_eq!(
            apply_envelope(&room, &bob(), delete.clone(), &metrics).await,
            Some(delete)
        );
        assert!(room.get("s").await.is_none());

        // Deleting a missing object still broadcasts
        let again = Envelope::new("b1", Operation::Delete("s".into()));
        assert!(apply_envelope(&room, &bob(), again, &metrics).await.is_some());
    }

    #[tokio::test]
    async fn test_released_from_client_ignored() {
        let room = RoomObjects::new("b1");
        let metrics = ServerMetrics::new();
        let env = Envelope::new("b1", Operation::Released(moved("s", 1.0)));
        assert!(apply_envelope(&room, &alice(), env, &metrics).await.is_none());
        assert!(room.get("s").await.is_none());
    }
}
