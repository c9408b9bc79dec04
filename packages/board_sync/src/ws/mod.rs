//! Board WebSocket Sync
//!
//! One connection per client per board:
//! - Client frames are applied to the board's object store under the focus lock
//! - Accepted changes are fanned out to every session on the board, sender included
//! - A session that cannot keep up is disconnected rather than slowing the room

mod focus;
mod protocol;
mod registry;
mod session;


pub use protocol::{Envelope, Operation};
pub use registry::RoomRegistry;
pub use session::{SessionContext, serve_socket};
