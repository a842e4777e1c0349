//! Delay-based congestion control steering towards a target queuing delay.
//!
//! Once per round trip the standing RTT (the smallest RTT sample of the
//! round) is compared with the minimum RTT:
//!
//! - queuing delay below target: cwnd grows by up to `max_increase_rate` of
//!   itself, scaled by how far below target the delay is.
//! - queuing delay above target: cwnd shrinks multiplicatively, never by a
//!   factor below `min_decrease_factor` in one round.
//!
//! The minimum RTT is a windowed minimum of per-round standing RTTs over
//! `min_rtt_window`, so a stale minimum expires once the path stops
//! delivering it. Every `probe_rtt_interval_rounds` rounds the window is
//! drained to `probe_rtt_window` for one round and the standing RTT of that
//! round refreshes the minimum. A probe round never raises the minimum.
//!
//! Per-round steps are at least one MSS, but never more than the configured
//! rate allows for the current window.
//!
//! Loss applies `loss_beta` on top of the delay response, once per recovery
//! period.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::CongestionConfig;
use crate::congestion::{
    in_recovery, AckEvent, Algorithm, CongestionController, LossEvent, Phase, RttSample,
};
use crate::filter::WindowedMinFilter;

/// Delay-based congestion controller.
#[derive(Debug, Clone)]
pub struct Copa {
    mss: u64,
    min_window: u64,
    max_window: u64,
    target: Duration,
    max_increase_rate: f64,
    max_decrease_rate: f64,
    min_decrease_factor: f64,
    loss_beta: f64,
    probe_interval_rounds: u32,
    probe_window: u64,

    cwnd: u64,
    phase: Phase,
    min_rtt_filter: WindowedMinFilter,
    /// Estimator's lifetime minimum, used to seed an empty filter.
    path_min_rtt: Option<Duration>,
    /// Smallest RTT sample seen in the current round.
    standing_rtt: Option<Duration>,
    /// Ack time that opened the current round.
    round_start: Option<Instant>,
    rounds: u64,
    rounds_since_probe: u32,
    /// Window to restore once a min-RTT probe ends.
    pre_probe_cwnd: Option<u64>,
    recovery_start: Option<Instant>,
}

impl Copa {
    pub fn new(config: &CongestionConfig) -> Self {
        let copa = &config.copa;
        Self {
            mss: config.max_datagram_size,
            min_window: config.min_window,
            max_window: config.max_window,
            target: copa.target_queuing_delay,
            max_increase_rate: copa.max_increase_rate,
            max_decrease_rate: copa.max_decrease_rate,
            min_decrease_factor: copa.min_decrease_factor,
            loss_beta: copa.loss_beta,
            probe_interval_rounds: copa.probe_rtt_interval_rounds,
            probe_window: config.clamp_window(copa.probe_rtt_window),
            cwnd: config.clamp_window(config.initial_window),
            phase: Phase::Steady,
            min_rtt_filter: WindowedMinFilter::new(copa.min_rtt_window),
            path_min_rtt: None,
            standing_rtt: None,
            round_start: None,
            rounds: 0,
            rounds_since_probe: 0,
            pre_probe_cwnd: None,
            recovery_start: None,
        }
    }

    /// Minimum RTT over the filter window.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt_filter.get()
    }

    /// Completed round trips.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Queuing delay observed in the current round so far.
    pub fn queuing_delay(&self) -> Option<Duration> {
        match (self.standing_rtt, self.min_rtt()) {
            (Some(standing), Some(min)) => Some(standing.saturating_sub(min)),
            _ => None,
        }
    }

    fn end_round(&mut self, now: Instant) {
        self.rounds += 1;
        self.round_start = Some(now);
        let standing = self.standing_rtt.take();

        if self.phase == Phase::ProbeRtt {
            self.finish_probe(standing, now);
            return;
        }

        if let Some(standing) = standing {
            if self.min_rtt_filter.get().is_none() {
                if let Some(path_min) = self.path_min_rtt {
                    self.min_rtt_filter.update(path_min, now);
                }
            }
            self.min_rtt_filter.update(standing, now);
            if let Some(min) = self.min_rtt_filter.get() {
                self.adjust_for_delay(standing.saturating_sub(min));
            }
        }

        self.rounds_since_probe = self.rounds_since_probe.saturating_add(1);
        if self.rounds_since_probe >= self.probe_interval_rounds {
            self.start_probe();
        }
    }

    fn adjust_for_delay(&mut self, delay: Duration) {
        let target = self.target.as_secs_f64();
        let delay_secs = delay.as_secs_f64();
        let cwnd = self.cwnd as f64;

        if delay < self.target {
            let headroom = (target - delay_secs) / target;
            let limit = ((cwnd * self.max_increase_rate) as u64).max(1);
            let step = ((cwnd * self.max_increase_rate * headroom) as u64)
                .max(self.mss)
                .min(limit);
            self.cwnd = self.cwnd.saturating_add(step).min(self.max_window);
            self.phase = Phase::ProbeUp;
        } else if delay > self.target {
            let excess = ((delay_secs - target) / target).min(1.0);
            let factor = (1.0 - self.max_decrease_rate * excess).max(self.min_decrease_factor);
            let limit = (self.cwnd - (cwnd * self.min_decrease_factor) as u64).max(1);
            let step = (self.cwnd - (cwnd * factor) as u64)
                .max(self.mss)
                .min(limit);
            self.cwnd = self.cwnd.saturating_sub(step).max(self.min_window);
            self.phase = Phase::ProbeDown;
        } else {
            self.phase = Phase::Steady;
        }
        trace!(
            cwnd = self.cwnd,
            delay = ?delay,
            phase = %self.phase,
            "copa: round adjustment"
        );
    }

    fn start_probe(&mut self) {
        self.rounds_since_probe = 0;
        self.pre_probe_cwnd = Some(self.cwnd);
        self.cwnd = self.cwnd.min(self.probe_window);
        self.phase = Phase::ProbeRtt;
        debug!(cwnd = self.cwnd, "copa: probing min rtt");
    }

    fn finish_probe(&mut self, standing: Option<Duration>, now: Instant) {
        if let Some(sample) = standing {
            let measured = self.min_rtt_filter.get().map_or(sample, |m| m.min(sample));
            self.min_rtt_filter.update(measured, now);
        }
        if let Some(cwnd) = self.pre_probe_cwnd.take() {
            self.cwnd = cwnd.clamp(self.min_window, self.max_window);
        }
        self.phase = Phase::Steady;
        debug!(cwnd = self.cwnd, min_rtt = ?self.min_rtt(), "copa: min rtt probe done");
    }

    fn reset_to_floor(&mut self) {
        self.cwnd = self.min_window;
        self.phase = Phase::Steady;
        self.standing_rtt = None;
        self.round_start = None;
        self.rounds_since_probe = 0;
        self.pre_probe_cwnd = None;
    }
}

impl CongestionController for Copa {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Copa
    }

    fn on_packets_acked(&mut self, ack: &AckEvent) {
        if ack.acked_bytes == 0 {
            return;
        }
        match self.round_start {
            None => self.round_start = Some(ack.ack_time),
            Some(start) if ack.largest_acked_sent_time >= start => self.end_round(ack.ack_time),
            Some(_) => {}
        }
    }

    fn on_packet_loss(&mut self, loss: &LossEvent) {
        if loss.lost_bytes == 0 && !loss.persistent_congestion {
            return;
        }

        if in_recovery(self.recovery_start, loss.largest_lost_sent_time) {
            trace!(cwnd = self.cwnd, "copa: loss coalesced into current recovery");
        } else {
            let start = loss.loss_time.max(loss.largest_lost_sent_time);
            self.recovery_start = Some(self.recovery_start.map_or(start, |r| r.max(start)));
            let (beta, floor) = (self.loss_beta, self.min_window);
            let reduce = |w: u64| ((w as f64 * beta) as u64).max(floor);
            self.cwnd = reduce(self.cwnd);
            self.pre_probe_cwnd = self.pre_probe_cwnd.map(reduce);
            if self.phase != Phase::ProbeRtt {
                self.phase = Phase::ProbeDown;
            }
            debug!(cwnd = self.cwnd, lost = loss.lost_bytes, "copa: loss reduction");
        }

        if loss.persistent_congestion {
            self.on_persistent_congestion();
        }
    }

    fn on_rtt_sample(&mut self, sample: &RttSample) {
        self.path_min_rtt = Some(sample.min.min(sample.latest));
        self.standing_rtt = Some(
            self.standing_rtt
                .map_or(sample.latest, |s| s.min(sample.latest)),
        );
    }

    fn on_persistent_congestion(&mut self) {
        self.reset_to_floor();
        debug!(cwnd = self.cwnd, "copa: persistent congestion");
    }

    fn on_idle_restart(&mut self) {
        self.reset_to_floor();
        self.recovery_start = None;
        debug!(cwnd = self.cwnd, "copa: idle restart");
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}
