//! Room Registry
//!
//! A single actor owns board membership. Sessions join, leave and publish
//! through [`RoomRegistry`] handles; the actor applies those commands one at
//! a time, so membership needs no lock and per-board delivery order is the
//! order commands were processed.
//!
//! Fan-out never waits on a consumer. A session whose outbound queue is full
//! is evicted on the spot: its queue sender is dropped, which closes the
//! queue and lets the session's writer send a close frame.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::ServerMetrics;
use crate::models::UserId;

use super::protocol::Envelope;

/// Encoded frame shared by every recipient of one broadcast.
pub type Frame = Arc<str>;

/// Registry-side view of a live session.
#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub board_id: String,
    pub user_id: UserId,
    outbound: mpsc::Sender<Frame>,
}

impl SessionHandle {
    /// The registry holds the only sender, so dropping this handle is what
    /// closes the session's outbound queue.
    pub fn new(
        session_id: Uuid,
        board_id: impl Into<String>,
        user_id: UserId,
        outbound: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            session_id,
            board_id: board_id.into(),
            user_id,
            outbound,
        }
    }
}

/// Commands processed by the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    Register(SessionHandle),
    Unregister {
        board_id: String,
        session_id: Uuid,
    },
    Broadcast(Envelope),
    RoomSizes {
        respond_to: oneshot::Sender<HashMap<String, usize>>,
    },
}

/// Cloneable handle to the registry actor.
#[derive(Clone, Debug)]
pub struct RoomRegistry {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RoomRegistry {
    /// Spawn the registry actor. It runs until `cancel` fires or every
    /// handle has been dropped.
    pub fn spawn(
        command_capacity: usize,
        metrics: Arc<ServerMetrics>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(command_capacity);
        let actor = RegistryActor {
            receiver,
            rooms: HashMap::new(),
            metrics,
            cancel,
        };
        let task = tokio::spawn(actor.run());
        (Self { sender }, task)
    }

    pub async fn register(&self, session: SessionHandle) {
        if self
            .sender
            .send(RegistryCommand::Register(session))
            .await
            .is_err()
        {
            warn!("Registry is gone; session not registered");
        }
    }

    pub async fn unregister(&self, board_id: &str, session_id: Uuid) {
        let cmd = RegistryCommand::Unregister {
            board_id: board_id.to_string(),
            session_id,
        };
        if self.sender.send(cmd).await.is_err() {
            debug!(session = %session_id, "Registry is gone; nothing to unregister");
        }
    }

    pub async fn broadcast(&self, envelope: Envelope) {
        if self
            .sender
            .send(RegistryCommand::Broadcast(envelope))
            .await
            .is_err()
        {
            warn!("Registry is gone; broadcast dropped");
        }
    }

    /// Member count of every live room. Empty if the registry has stopped.
    pub async fn room_sizes(&self) -> HashMap<String, usize> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::RoomSizes { respond_to: tx })
            .await
            .is_err()
        {
            return HashMap::new();
        }
        rx.await.unwrap_or_default()
    }
}

/// The actor owning the membership map
struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    rooms: HashMap<String, HashMap<Uuid, SessionHandle>>,
    metrics: Arc<ServerMetrics>,
    cancel: CancellationToken,
}

impl RegistryActor {
    async fn run(mut self) {
        debug!("Room registry started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Room registry shutting down");
                    break;
                }
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }

        // Dropping every handle closes every outbound queue
        let sessions: usize = self.rooms.values().map(HashMap::len).sum();
        self.rooms.clear();
        self.metrics.set_active_rooms(0);
        debug!(sessions, "Room registry stopped");
    }

    fn handle(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register(session) => self.register(session),
            RegistryCommand::Unregister {
                board_id,
                session_id,
            } => self.unregister(&board_id, session_id),
            RegistryCommand::Broadcast(envelope) => self.broadcast(envelope),
            RegistryCommand::RoomSizes { respond_to } => {
                let sizes = self
                    .rooms
                    .iter()
                    .map(|(board_id, members)| (board_id.clone(), members.len()))
                    .collect();
                let _ = respond_to.send(sizes);
            }
        }
    }

    fn register(&mut self, session: SessionHandle) {
        debug!(
            board = %session.board_id,
            session = %session.session_id,
            user = session.user_id,
            "Session joined"
        );
        self.rooms
            .entry(session.board_id.clone())
            .or_default()
            .insert(session.session_id, session);
        self.metrics.set_active_rooms(self.rooms.len());
    }

    fn unregister(&mut self, board_id: &str, session_id: Uuid) {
        let Some(members) = self.rooms.get_mut(board_id) else {
            return;
        };
        // Already gone if it was evicted as a slow consumer
        if members.remove(&session_id).is_some() {
            debug!(board = %board_id, session = %session_id, "Session left");
        }
        if members.is_empty() {
            self.rooms.remove(board_id);
            debug!(board = %board_id, "Room closed");
        }
        self.metrics.set_active_rooms(self.rooms.len());
    }

    fn broadcast(&mut self, envelope: Envelope) {
        let Some(members) = self.rooms.get_mut(&envelope.board_id) else {
            debug!(board = %envelope.board_id, "Broadcast to empty room dropped");
            return;
        };

        let frame: Frame = match envelope.encode() {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize {}: {}", envelope, e);
                return;
            }
        };

        let mut delivered = 0usize;
        let mut evicted = Vec::new();
        for (session_id, session) in members.iter() {
            match session.outbound.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        board = %envelope.board_id,
                        session = %session_id,
                        user = session.user_id,
                        "Outbound queue full, disconnecting slow session"
                    );
                    self.metrics.slow_consumer_dropped();
                    evicted.push(*session_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session = %session_id, "Outbound queue already closed");
                    evicted.push(*session_id);
                }
            }
        }

        for session_id in evicted {
            members.remove(&session_id);
        }
        if members.is_empty() {
            self.rooms.remove(&envelope.board_id);
            self.metrics.set_active_rooms(self.rooms.len());
        }

        self.metrics.broadcast_sent(delivered);
        debug!("Broadcast {} to {} sessions", envelope, delivered);
    }
}
