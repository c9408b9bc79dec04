//! Authoritative object store, partitioned by board.
//!
//! Each board owns one [`RoomObjects`] partition guarded by its own
//! read/write lock, so readers on a board proceed together and writers on
//! different boards never contend. The focus protocol runs inside a single
//! write section per operation, which keeps the check and the mutation
//! atomic with respect to every other session on the board.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{FocusLock, Identity, SharedObject};

/// Outcome of an `object_update` request.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The object was created or replaced. Carries the stored result,
    /// including whatever lock the store holds for it.
    Applied(SharedObject),
    /// Another user holds focus on the object; nothing changed.
    Locked,
}

/// Object map for a single board.
#[derive(Debug)]
pub struct RoomObjects {
    board_id: String,
    objects: RwLock<HashMap<String, SharedObject>>,
}

impl RoomObjects {
    pub fn new(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub async fn get(&self, object_id: &str) -> Option<SharedObject> {
        self.objects.read().await.get(object_id).cloned()
    }

    pub async fn upsert(&self, object: SharedObject) {
        self.objects.write().await.insert(object.id.clone(), object);
    }

    /// Remove an object. Returns the removed value, if there was one.
    pub async fn delete(&self, object_id: &str) -> Option<SharedObject> {
        self.objects.write().await.remove(object_id)
    }

    /// All objects on the board, ordered by id.
    pub async fn list(&self) -> Vec<SharedObject> {
        let mut objects: Vec<SharedObject> = self.objects.read().await.values().cloned().collect();
        objects.sort_by(|a, b| a.id.cmp(&b.id));
        objects
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    // =========================================================================
    // Focus protocol
    // =========================================================================

    /// Replace an object's contents unless someone else holds its focus.
    ///
    /// The lock is server-owned: an accepted update keeps whatever lock the
    /// stored object already had and ignores lock fields sent by the client.
    pub async fn apply_update(&self, sender: &Identity, incoming: SharedObject) -> UpdateOutcome {
        let mut objects = self.objects.write().await;
        match objects.get_mut(&incoming.id) {
            Some(existing) if existing.is_locked_against(sender.user_id) => {
                debug!(
                    board = %self.board_id,
                    object = %incoming.id,
                    holder = ?existing.focused_by(),
                    user = sender.user_id,
                    "Rejected update on focused object"
                );
                UpdateOutcome::Locked
            }
            Some(existing) => {
                existing.replace_contents(incoming);
                UpdateOutcome::Applied(existing.clone())
            }
            None => {
                let mut created = SharedObject::bare(incoming.id.clone());
                created.replace_contents(incoming);
                objects.insert(created.id.clone(), created.clone());
                UpdateOutcome::Applied(created)
            }
        }
    }

    /// Give `sender` the focus lock on an object, keeping its contents.
    ///
    /// Last focus wins: an existing holder is replaced. Focusing an unknown
    /// id creates a bare object for it.
    pub async fn acquire_focus(&self, sender: &Identity, object_id: &str) -> SharedObject {
        let mut objects = self.objects.write().await;
        let object = objects
            .entry(object_id.to_string())
            .or_insert_with(|| SharedObject::bare(object_id));
        if let Some(previous) = object.focused_by().filter(|h| *h != sender.user_id) {
            debug!(
                board = %self.board_id,
                object = %object_id,
                previous,
                user = sender.user_id,
                "Focus taken over"
            );
        }
        object.focus = Some(FocusLock::held_by(sender));
        object.clone()
    }

    /// Clear the lock if `sender` holds it. Returns the released object, or
    /// `None` when the object is missing or held by someone else.
    pub async fn release_focus(&self, sender: &Identity, object_id: &str) -> Option<SharedObject> {
        let mut objects = self.objects.write().await;
        let object = objects.get_mut(object_id)?;
        if object.focused_by() != Some(sender.user_id) {
            return None;
        }
        object.focus = None;
        Some(object.clone())
    }
}

/// All board partitions known to this process.
#[derive(Debug, Default)]
pub struct BoardStore {
    partitions: RwLock<HashMap<String, Arc<RoomObjects>>>,
}

impl BoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn partition(&self, board_id: &str) -> Option<Arc<RoomObjects>> {
        self.partitions.read().await.get(board_id).cloned()
    }

    /// Return the partition for `board_id`, creating it from `snapshot` if it
    /// does not exist yet. The snapshot is ignored when the partition is
    /// already live, since the store is authoritative from then on.
    pub async fn ensure_partition(
        &self,
        board_id: &str,
        snapshot: Vec<SharedObject>,
    ) -> Arc<RoomObjects> {
        let mut partitions = self.partitions.write().await;
        if let Some(existing) = partitions.get(board_id) {
            return existing.clone();
        }

        let room = Arc::new(RoomObjects::new(board_id));
        for object in snapshot {
            room.upsert(object).await;
        }
        let seeded = room.len().await;
        debug!(board = %board_id, objects = seeded, "Seeded board partition");
        partitions.insert(board_id.to_string(), room.clone());
        room
    }

    pub async fn partition_count(&self) -> usize {
        self.partitions.read().await.len()
    }

    /// Objects held across every partition.
    pub async fn object_count(&self) -> usize {
        let partitions: Vec<Arc<RoomObjects>> =
            self.partitions.read().await.values().cloned().collect();
        let mut total = 0;
        for room in partitions {
            total += room.len().await;
        }
        total
    }
}

#[cfg(test)]
impl RoomObjects {
    pub fn seeded(board_id: impl Into<String>, objects: Vec<SharedObject>) -> Self {
        Self {
            board_id: board_id.into(),
            objects: RwLock::new(objects.into_iter().map(|obj| (obj.id.clone(), obj)).collect()),
        }
    }
}
