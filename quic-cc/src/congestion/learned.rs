//! Congestion controller driven by a pluggable decision policy.
//!
//! The controller owns the bookkeeping (window bounds, RTT filters) and hands
//! the policy an [`Observation`] after every ack or loss. What the policy
//! does with it is opaque to the rest of the transport; the default
//! [`HoldPolicy`] keeps the window where it is.
//!
//! RTT filters:
//! - min RTT: windowed minimum of latest RTT over 10 seconds.
//! - standing RTT: windowed minimum of latest RTT over srtt / 2.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::CongestionConfig;
use crate::congestion::{AckEvent, Algorithm, CongestionController, LossEvent, Phase, RttSample};
use crate::filter::WindowedMinFilter;

/// Window of the min RTT filter.
const MIN_RTT_WINDOW: Duration = Duration::from_secs(10);
/// Standing RTT window used until a smoothed RTT is known.
const INITIAL_STANDING_WINDOW: Duration = Duration::from_millis(100);

/// Inputs handed to a [`DecisionPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub congestion_window: u64,
    pub acked_bytes: u64,
    pub lost_bytes: u64,
    pub persistent_congestion: bool,
    pub latest_rtt: Option<Duration>,
    pub smoothed_rtt: Option<Duration>,
    pub min_rtt: Option<Duration>,
    pub standing_rtt: Option<Duration>,
    /// `latest_rtt - min_rtt`, when both are known.
    pub queuing_delay: Option<Duration>,
    pub now: Instant,
}

/// What the policy wants done with the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Leave the window unchanged.
    Hold,
    /// Set the window to this many bytes.
    SetWindow(u64),
    /// Multiply the window by this factor.
    Scale(f64),
}

/// Source of window decisions for [`Learned`].
pub trait DecisionPolicy: Send + fmt::Debug {
    fn decide(&mut self, observation: &Observation) -> Decision;
}

/// Policy that never changes the window.
#[derive(Debug, Default, Clone, Copy)]
pub struct HoldPolicy;

impl DecisionPolicy for HoldPolicy {
    fn decide(&mut self, _observation: &Observation) -> Decision {
        Decision::Hold
    }
}

/// Policy-driven congestion controller.
#[derive(Debug)]
pub struct Learned {
    min_window: u64,
    max_window: u64,
    cwnd: u64,
    policy: Box<dyn DecisionPolicy>,
    min_rtt_filter: WindowedMinFilter,
    standing_rtt_filter: WindowedMinFilter,
    latest_rtt: Option<Duration>,
    smoothed_rtt: Option<Duration>,
}

impl Learned {
    /// Controller with the default [`HoldPolicy`].
    pub fn new(config: &CongestionConfig) -> Self {
        Self::with_policy(config, Box::new(HoldPolicy))
    }

    pub fn with_policy(config: &CongestionConfig, policy: Box<dyn DecisionPolicy>) -> Self {
        Self {
            min_window: config.min_window,
            max_window: config.max_window,
            cwnd: config.clamp_window(config.initial_window),
            policy,
            min_rtt_filter: WindowedMinFilter::new(MIN_RTT_WINDOW),
            standing_rtt_filter: WindowedMinFilter::new(INITIAL_STANDING_WINDOW),
            latest_rtt: None,
            smoothed_rtt: None,
        }
    }

    fn observe(&self, acked_bytes: u64, lost_bytes: u64, persistent: bool, now: Instant) -> Observation {
        let min_rtt = self.min_rtt_filter.get();
        Observation {
            congestion_window: self.cwnd,
            acked_bytes,
            lost_bytes,
            persistent_congestion: persistent,
            latest_rtt: self.latest_rtt,
            smoothed_rtt: self.smoothed_rtt,
            min_rtt,
            standing_rtt: self.standing_rtt_filter.get(),
            queuing_delay: self
                .latest_rtt
                .zip(min_rtt)
                .map(|(latest, min)| latest.saturating_sub(min)),
            now,
        }
    }

    fn apply(&mut self, decision: Decision) {
        let next = match decision {
            Decision::Hold => return,
            Decision::SetWindow(window) => window,
            Decision::Scale(factor) if factor.is_finite() && factor > 0.0 => {
                (self.cwnd as f64 * factor).min(u64::MAX as f64) as u64
            }
            Decision::Scale(factor) => {
                warn!(factor, "learned: policy returned unusable scale factor, ignored");
                return;
            }
        };
        self.cwnd = next.clamp(self.min_window, self.max_window);
        trace!(cwnd = self.cwnd, ?decision, "learned: decision applied");
    }
}

impl CongestionController for Learned {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Learned
    }

    fn on_packets_acked(&mut self, ack: &AckEvent) {
        if ack.acked_bytes == 0 {
            return;
        }
        let Some(latest) = self.latest_rtt else {
            trace!("learned: ack before any rtt sample, no decision");
            return;
        };
        self.min_rtt_filter.update(latest, ack.ack_time);
        self.standing_rtt_filter.update(latest, ack.ack_time);

        let observation = self.observe(ack.acked_bytes, 0, false, ack.ack_time);
        let decision = self.policy.decide(&observation);
        self.apply(decision);
    }

    fn on_packet_loss(&mut self, loss: &LossEvent) {
        if loss.lost_bytes == 0 && !loss.persistent_congestion {
            return;
        }
        let observation = self.observe(
            0,
            loss.lost_bytes,
            loss.persistent_congestion,
            loss.loss_time,
        );
        let decision = self.policy.decide(&observation);
        if loss.persistent_congestion {
            // The policy sees the event but cannot lift the floor.
            trace!(?decision, "learned: decision dropped on persistent congestion");
            self.on_persistent_congestion();
            return;
        }
        self.apply(decision);
    }

    fn on_rtt_sample(&mut self, sample: &RttSample) {
        self.latest_rtt = Some(sample.latest);
        self.smoothed_rtt = Some(sample.smoothed);
        let half_srtt = sample.smoothed / 2;
        if !half_srtt.is_zero() {
            self.standing_rtt_filter.set_window(half_srtt);
        }
    }

    fn on_persistent_congestion(&mut self) {
        self.cwnd = self.min_window;
        debug!(cwnd = self.cwnd, "learned: persistent congestion");
    }

    fn on_idle_restart(&mut self) {
        self.cwnd = self.min_window;
        self.standing_rtt_filter.reset();
        debug!(cwnd = self.cwnd, "learned: idle restart");
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn phase(&self) -> Phase {
        Phase::Steady
    }

    fn can_be_paced(&self) -> bool {
        false
    }
}
