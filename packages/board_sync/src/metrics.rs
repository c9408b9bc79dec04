//! Server metrics for observability
//!
//! Counters for connection churn, inbound traffic, protocol errors and
//! broadcast fan-out, exposed as a serializable snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently live board sessions
    pub active_connections: AtomicU64,
    /// Total sessions since server start
    pub total_connections: AtomicU64,
    /// Upgrade attempts refused by identity/board/access checks
    pub rejected_connections: AtomicU64,

    // Message metrics
    /// Frames received from clients
    pub frames_received: AtomicU64,
    /// Frames that failed to decode and were dropped
    pub decode_errors: AtomicU64,
    /// Updates refused because another user held focus
    pub rejected_updates: AtomicU64,
    /// Envelopes fanned out by the registry
    pub broadcasts: AtomicU64,
    /// Individual frames placed on session queues
    pub frames_enqueued: AtomicU64,

    // Backpressure metrics
    /// Sessions disconnected because their outbound queue was full
    pub slow_consumer_disconnects: AtomicU64,

    // Room metrics
    /// Rooms with at least one live session
    pub active_rooms: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    // Message tracking
    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_rejected(&self) {
        self.rejected_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_sent(&self, recipients: usize) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.frames_enqueued.fetch_add(recipients as u64, Ordering::Relaxed);
    }

    pub fn slow_consumer_dropped(&self) {
        self.slow_consumer_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_rooms(&self, rooms: usize) {
        self.active_rooms.store(rooms as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                rejected: self.rejected_connections.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.frames_received.load(Ordering::Relaxed),
                decode_errors: self.decode_errors.load(Ordering::Relaxed),
                rejected_updates: self.rejected_updates.load(Ordering::Relaxed),
                broadcasts: self.broadcasts.load(Ordering::Relaxed),
                enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            },
            backpressure: BackpressureMetrics {
                slow_consumer_disconnects: self.slow_consumer_disconnects.load(Ordering::Relaxed),
            },
            rooms: self.active_rooms.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub backpressure: BackpressureMetrics,
    pub rooms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub decode_errors: u64,
    pub rejected_updates: u64,
    pub broadcasts: u64,
    pub enqueued: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackpressureMetrics {
    pub slow_consumer_disconnects: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub rooms: usize,
    pub boards: usize,
    pub objects: usize,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let metrics = ServerMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_connections.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_broadcast_counts_recipients() {
        let metrics = ServerMetrics::new();
        metrics.broadcast_sent(3);
        metrics.broadcast_sent(0);
        assert_eq!(metrics.broadcasts.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.frames_enqueued.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_snapshot() {
        let metrics = ServerMetrics::new();
        metrics.connection_opened();
        metrics.frame_received();
        metrics.decode_error();
        metrics.update_rejected();
        metrics.slow_consumer_dropped();
        metrics.set_active_rooms(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections.active, 1);
        assert_eq!(snapshot.messages.received, 1);
        assert_eq!(snapshot.messages.decode_errors, 1);
        assert_eq!(snapshot.messages.rejected_updates, 1);
        assert_eq!(snapshot.backpressure.slow_consumer_disconnects, 1);
        assert_eq!(snapshot.rooms, 4);
    }
}
