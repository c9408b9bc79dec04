pub mod boards;
pub mod health;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use boards::{board_object_handler, board_objects_handler};
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use websocket::board_websocket_handler;
