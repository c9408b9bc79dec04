//! Board session
//!
//! One admitted connection bound to one board. The session registers with
//! the room registry, runs its writer as a separate task fed by a bounded
//! queue, and reads client frames until the socket closes. It unregisters
//! exactly once on the way out, whatever ended it.

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Admission;
use crate::metrics::ServerMetrics;
use crate::models::Identity;
use crate::store::RoomObjects;

use super::focus::apply_envelope;
use super::protocol::Envelope;
use super::registry::{Frame, RoomRegistry, SessionHandle};

/// Shared dependencies every session needs.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub registry: RoomRegistry,
    pub metrics: Arc<ServerMetrics>,
    pub outbound_capacity: usize,
    pub close_grace: Duration,
}

/// An admitted connection's identity and board binding.
pub struct Session {
    pub id: Uuid,
    pub identity: Identity,
    pub board_id: String,
    objects: Arc<RoomObjects>,
    ctx: SessionContext,
}

/// Drive an upgraded socket until it closes.
pub async fn serve_socket(socket: WebSocket, admission: Admission, ctx: SessionContext) {
    let (ws_sender, ws_receiver) = socket.split();
    Session::new(admission, ctx).run(ws_sender, ws_receiver).await;
}

impl Session {
    pub fn new(admission: Admission, ctx: SessionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: admission.identity,
            board_id: admission.board_id,
            objects: admission.objects,
            ctx,
        }
    }

    /// Run both loops to completion. Generic over the socket halves so the
    /// session can be driven without a real connection.
    pub async fn run<W, R, E>(self, ws_sender: W, mut ws_receiver: R)
    where
        W: Sink<Message> + Unpin + Send + 'static,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        info!(
            session = %self.id,
            board = %self.board_id,
            user = self.identity.user_id,
            "Board session opened for {}",
            self.identity.display_name
        );
        self.ctx.metrics.connection_opened();

        // The registry holds the only sender: unregistering or eviction
        // closes this queue and stops the writer.
        let (tx, rx) = mpsc::channel::<Frame>(self.ctx.outbound_capacity);
        self.ctx
            .registry
            .register(SessionHandle::new(
                self.id,
                self.board_id.clone(),
                self.identity.user_id,
                tx,
            ))
            .await;

        let mut outbound = tokio::spawn(write_loop(ws_sender, rx, self.id));
        let mut writer_done = false;

        loop {
            tokio::select! {
                _ = &mut outbound => {
                    debug!(session = %self.id, "Writer finished, ending session");
                    writer_done = true;
                    break;
                }
                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str().as_bytes()).await,
                    Some(Ok(Message::Binary(bytes))) => self.handle_frame(&bytes).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(session = %self.id, "Read error: {}", e);
                        break;
                    }
                },
            }
        }

        self.ctx.registry.unregister(&self.board_id, self.id).await;

        if !writer_done
            && tokio::time::timeout(self.ctx.close_grace, &mut outbound)
                .await
                .is_err()
        {
            warn!(session = %self.id, "Writer did not finish within grace period, aborting");
            outbound.abort();
        }

        self.ctx.metrics.connection_closed();
        info!(session = %self.id, board = %self.board_id, "Board session closed");
    }

    async fn handle_frame(&self, frame: &[u8]) {
        self.ctx.metrics.frame_received();

        let mut envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.ctx.metrics.decode_error();
                debug!(session = %self.id, "Dropping frame: {}", e);
                return;
            }
        };

        // A session only ever speaks for the board it was admitted to
        if envelope.board_id != self.board_id {
            if !envelope.board_id.is_empty() {
                debug!(
                    session = %self.id,
                    claimed = %envelope.board_id,
                    board = %self.board_id,
                    "Rebinding envelope to session board"
                );
            }
            envelope.board_id.clone_from(&self.board_id);
        }

        if let Some(out) =
            apply_envelope(&self.objects, &self.identity, envelope, &self.ctx.metrics).await
        {
            self.ctx.registry.broadcast(out).await;
        }
    }
}

async fn write_loop<W>(mut ws_sender: W, mut rx: mpsc::Receiver<Frame>, session_id: Uuid)
where
    W: Sink<Message> + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if ws_sender
            .send(Message::Text(frame.to_string().into()))
            .await
            .is_err()
        {
            debug!(session = %session_id, "Write failed, stopping writer");
            return;
        }
    }
    let _ = ws_sender.send(Message::Close(None)).await;
}
