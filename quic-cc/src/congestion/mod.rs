//! Congestion control module.
//!
//! Defines the `CongestionController` trait that the transport drives from
//! its ack/loss processing path, the events it is driven with, and the
//! concrete algorithms selectable through [`factory`].

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::CongestionError;

pub mod copa;
pub mod cubic;
pub mod factory;
pub mod learned;
pub mod new_reno;

pub use copa::Copa;
pub use cubic::Cubic;
pub use factory::{build_controller, ControllerFactory, DefaultControllerFactory};
pub use learned::{Decision, DecisionPolicy, HoldPolicy, Learned, Observation};
pub use new_reno::NewReno;

/// Pacing gain while the window is still doubling every round trip.
const SLOW_START_PACING_GAIN: f64 = 2.0;
/// Pacing gain once growth is linear or delay-driven.
const STEADY_PACING_GAIN: f64 = 1.2;

/// Congestion control algorithm identifier, fixed when a connection is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    NewReno,
    Cubic,
    /// Delay-based controller steering towards a target queuing delay.
    Copa,
    /// Controller whose decisions come from a pluggable policy.
    Learned,
    /// Reserved identifier; no implementation exists.
    Bbr,
    /// Congestion control disabled.
    None,
}

impl Algorithm {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::NewReno => "newreno",
            Algorithm::Cubic => "cubic",
            Algorithm::Copa => "copa",
            Algorithm::Learned => "learned",
            Algorithm::Bbr => "bbr",
            Algorithm::None => "none",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CongestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newreno" | "new_reno" | "reno" => Ok(Algorithm::NewReno),
            "cubic" => Ok(Algorithm::Cubic),
            "copa" | "delay" => Ok(Algorithm::Copa),
            "learned" | "rl" => Ok(Algorithm::Learned),
            "bbr" => Ok(Algorithm::Bbr),
            "none" => Ok(Algorithm::None),
            _ => Err(CongestionError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Controller state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Window grows by every acknowledged byte.
    SlowStart,
    /// Window grows by roughly one segment (or along the cubic curve) per round trip.
    CongestionAvoidance,
    /// Delay-based: queuing delay on target, window held.
    Steady,
    /// Delay-based: queuing delay below target, window growing.
    ProbeUp,
    /// Delay-based: queuing delay above target, window shrinking.
    ProbeDown,
    /// Delay-based: window drained to re-measure the minimum RTT.
    ProbeRtt,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::SlowStart => write!(f, "SlowStart"),
            Phase::CongestionAvoidance => write!(f, "CongestionAvoidance"),
            Phase::Steady => write!(f, "Steady"),
            Phase::ProbeUp => write!(f, "ProbeUp"),
            Phase::ProbeDown => write!(f, "ProbeDown"),
            Phase::ProbeRtt => write!(f, "ProbeRtt"),
        }
    }
}

/// A batch of newly acknowledged bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    /// Bytes newly acknowledged by this ACK frame.
    pub acked_bytes: u64,
    /// Send time of the largest newly acknowledged packet.
    pub largest_acked_sent_time: Instant,
    /// Time the ACK was processed.
    pub ack_time: Instant,
}

/// A batch of bytes declared lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossEvent {
    /// Bytes newly declared lost.
    pub lost_bytes: u64,
    /// Send time of the largest lost packet.
    pub largest_lost_sent_time: Instant,
    /// Time the loss was detected.
    pub loss_time: Instant,
    /// Losses span more than the persistent congestion duration.
    pub persistent_congestion: bool,
}

/// RTT estimates after a new sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttSample {
    pub latest: Duration,
    pub min: Duration,
    pub smoothed: Duration,
}

/// Snapshot of controller state for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerMetrics {
    pub congestion_window: u64,
    pub ssthresh: Option<u64>,
    pub phase: Phase,
}

/// Trait for pluggable congestion control algorithms.
///
/// Implementations own the congestion window. Bytes in flight belong to the
/// connection and are only ever passed in as a snapshot. All event methods
/// are total: degenerate input is absorbed, never reported.
pub trait CongestionController: Send + fmt::Debug {
    /// Identifier this controller was built for.
    fn algorithm(&self) -> Algorithm;

    /// Notify the controller that bytes were acknowledged.
    fn on_packets_acked(&mut self, ack: &AckEvent);

    /// Notify the controller that bytes were declared lost.
    fn on_packet_loss(&mut self, loss: &LossEvent);

    /// Notify the controller of updated RTT estimates.
    fn on_rtt_sample(&mut self, _sample: &RttSample) {}

    /// Collapse the window to its floor after sustained loss.
    fn on_persistent_congestion(&mut self);

    /// Restart from the floor after the connection sat idle.
    fn on_idle_restart(&mut self);

    /// Returns the current congestion window in bytes.
    fn congestion_window(&self) -> u64;

    /// Returns the active state machine phase.
    fn phase(&self) -> Phase;

    /// Returns the slow-start threshold, if the algorithm has one.
    fn ssthresh(&self) -> Option<u64> {
        None
    }

    /// Bytes that may still be sent: `max(0, cwnd - bytes_in_flight)`.
    fn writable_bytes(&self, bytes_in_flight: u64) -> u64 {
        self.congestion_window().saturating_sub(bytes_in_flight)
    }

    /// Whether a pacing rate is meaningful for this controller.
    fn can_be_paced(&self) -> bool {
        true
    }

    /// Pacing rate in bytes per second for the given smoothed RTT.
    fn pacing_rate(&self, smoothed_rtt: Duration) -> Option<u64> {
        if !self.can_be_paced() || smoothed_rtt.is_zero() {
            return None;
        }
        let gain = match self.phase() {
            Phase::SlowStart => SLOW_START_PACING_GAIN,
            _ => STEADY_PACING_GAIN,
        };
        let rate = self.congestion_window() as f64 * gain / smoothed_rtt.as_secs_f64();
        Some(rate.min(u64::MAX as f64) as u64)
    }

    /// Mark whether the sender currently has less data than the window allows.
    fn set_app_limited(&mut self, _limited: bool, _now: Instant) {}

    fn is_app_limited(&self) -> bool {
        false
    }

    fn metrics(&self) -> ControllerMetrics {
        ControllerMetrics {
            congestion_window: self.congestion_window(),
            ssthresh: self.ssthresh(),
            phase: self.phase(),
        }
    }
}

/// Whether a packet sent at `sent` belongs to the recovery period that began
/// at `recovery_start`.
pub(crate) fn in_recovery(recovery_start: Option<Instant>, sent: Instant) -> bool {
    recovery_start.is_some_and(|start| sent <= start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_roundtrip() {
        for algo in [
            Algorithm::NewReno,
            Algorithm::Cubic,
            Algorithm::Copa,
            Algorithm::Learned,
            Algorithm::Bbr,
            Algorithm::None,
        ] {
            assert_eq!(algo.to_string().parse::<Algorithm>(), Ok(algo));
        }
    }

    #[test]
    fn algorithm_aliases() {
        assert_eq!("RL".parse::<Algorithm>(), Ok(Algorithm::Learned));
        assert_eq!("NewReno".parse::<Algorithm>(), Ok(Algorithm::NewReno));
        assert!(matches!(
            "vegas".parse::<Algorithm>(),
            Err(CongestionError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn recovery_covers_packets_sent_before_start() {
        let start = Instant::now();
        assert!(!in_recovery(None, start));
        assert!(in_recovery(Some(start), start));
        assert!(in_recovery(Some(start + Duration::from_millis(5)), start));
        assert!(!in_recovery(Some(start), start + Duration::from_millis(1)));
    }
}
