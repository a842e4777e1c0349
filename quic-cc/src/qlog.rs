//! Congestion metric event log.
//!
//! The connection reports a `CongestionMetricUpdate` after every event it
//! forwards to its controller. Loggers are shared across connections.

use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;

use crate::congestion::{Algorithm, Phase};

/// What triggered a metric update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionEvent {
    PacketAck,
    PacketLoss,
    PersistentCongestion,
    IdleRestart,
}

impl fmt::Display for CongestionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionEvent::PacketAck => write!(f, "congestion_packet_ack"),
            CongestionEvent::PacketLoss => write!(f, "congestion_packet_loss"),
            CongestionEvent::PersistentCongestion => write!(f, "persistent_congestion"),
            CongestionEvent::IdleRestart => write!(f, "idle_restart"),
        }
    }
}

/// Controller state right after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionMetricUpdate {
    pub time: Instant,
    pub event: CongestionEvent,
    pub algorithm: Algorithm,
    pub bytes_in_flight: u64,
    pub congestion_window: u64,
    pub phase: Phase,
}

/// Sink for congestion metric updates.
pub trait QLogger: Send + Sync {
    fn add_congestion_metric_update(&self, update: CongestionMetricUpdate);
}

/// Logger that keeps every update in memory.
#[derive(Debug, Default)]
pub struct MemoryQLogger {
    updates: Mutex<Vec<CongestionMetricUpdate>>,
}

impl MemoryQLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all updates logged so far.
    pub fn updates(&self) -> Vec<CongestionMetricUpdate> {
        self.updates.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.lock().is_empty()
    }

    /// Remove and return all updates.
    pub fn drain(&self) -> Vec<CongestionMetricUpdate> {
        std::mem::take(&mut *self.updates.lock())
    }
}

impl QLogger for MemoryQLogger {
    fn add_congestion_metric_update(&self, update: CongestionMetricUpdate) {
        self.updates.lock().push(update);
    }
}
