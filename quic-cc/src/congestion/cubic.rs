//! CUBIC congestion control (RFC 8312).
//!
//! Slow start: cwnd += acked bytes (approximately doubles per RTT).
//! Congestion avoidance: W(t) = C * (t - K)^3 + w_max
//!   where t is the time since the last reduction and
//!   K = cbrt((w_max - w_origin) / C), so that W(0) = w_origin.
//! On loss: w_max = cwnd, cwnd = w_origin = cwnd * beta, ssthresh = cwnd.
//!
//! When TCP friendliness is enabled the target never falls below the window
//! an AIMD flow with the same beta would have reached:
//!   W_est(t) = w_origin + 3 * (1 - beta) / (1 + beta) * t / srtt
//! Before the inflection point W_est is capped at w_max, so the window only
//! passes the previous maximum once the curve turns convex.
//!
//! Time spent app-limited does not count towards t: the epoch start is
//! moved forward by the app-limited span.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::CongestionConfig;
use crate::congestion::{
    in_recovery, AckEvent, Algorithm, CongestionController, LossEvent, Phase, RttSample,
};

/// CUBIC congestion controller.
#[derive(Debug, Clone)]
pub struct Cubic {
    mss: u64,
    min_window: u64,
    max_window: u64,
    beta: f64,
    c: f64,
    tcp_friendly: bool,
    /// Current congestion window in bytes.
    cwnd: u64,
    /// Slow-start threshold.
    ssthresh: u64,
    phase: Phase,
    recovery_start: Option<Instant>,
    /// Start of the current growth epoch (the last reduction).
    last_reduction: Option<Instant>,
    /// Window just before the last reduction, in bytes.
    w_max: u64,
    /// Window at the start of the epoch, in bytes.
    w_origin: u64,
    /// Time from epoch start to the inflection point, in seconds.
    k: f64,
    /// Smoothed RTT, for the TCP-friendly estimate.
    srtt: Option<Duration>,
    app_limited: bool,
    /// When the current app-limited period began.
    app_limited_since: Option<Instant>,
}

impl Cubic {
    pub fn new(config: &CongestionConfig) -> Self {
        Self {
            mss: config.max_datagram_size,
            min_window: config.min_window,
            max_window: config.max_window,
            beta: config.cubic.beta,
            c: config.cubic.c,
            tcp_friendly: config.cubic.tcp_friendly,
            cwnd: config.clamp_window(config.initial_window),
            ssthresh: u64::MAX,
            phase: Phase::SlowStart,
            recovery_start: None,
            last_reduction: None,
            w_max: 0,
            w_origin: 0,
            k: 0.0,
            srtt: None,
            app_limited: false,
            app_limited_since: None,
        }
    }

    /// Returns whether we are in slow start.
    pub fn in_slow_start(&self) -> bool {
        self.phase == Phase::SlowStart
    }

    /// Window just before the most recent reduction.
    pub fn window_max(&self) -> u64 {
        self.w_max
    }

    /// Time of the most recent reduction, i.e. the start of the growth epoch.
    pub fn last_reduction_time(&self) -> Option<Instant> {
        self.last_reduction
    }

    /// Time from the epoch start to the inflection point of the cubic curve.
    pub fn inflection_time(&self) -> Duration {
        Duration::from_secs_f64(self.k)
    }

    /// Growth target `t` after the last reduction, clamped to the window
    /// bounds and never below the epoch's starting window. Returns the
    /// current window when no epoch has started.
    pub fn window_at(&self, t: Duration) -> u64 {
        if self.last_reduction.is_none() {
            return self.cwnd;
        }
        let mss = self.mss as f64;
        let t = t.as_secs_f64();
        let dt = t - self.k;
        let w_cubic = (self.c * dt * dt * dt + self.w_max as f64 / mss) * mss;

        let mut target = w_cubic;
        if self.tcp_friendly {
            if let Some(srtt) = self.srtt.filter(|d| !d.is_zero()) {
                let alpha = 3.0 * (1.0 - self.beta) / (1.0 + self.beta);
                let mut w_est = self.w_origin as f64 + alpha * (t / srtt.as_secs_f64()) * mss;
                if t < self.k {
                    w_est = w_est.min(self.w_max as f64);
                }
                target = target.max(w_est);
            }
        }

        (target.max(0.0) as u64)
            .max(self.w_origin)
            .clamp(self.min_window, self.max_window)
    }

    fn start_epoch(&mut self, now: Instant, w_max: u64) {
        self.last_reduction = Some(now);
        self.w_max = w_max;
        self.w_origin = self.cwnd;
        let gap_segments = w_max.saturating_sub(self.w_origin) as f64 / self.mss as f64;
        self.k = (gap_segments / self.c).cbrt();
    }

    fn reset_to_floor(&mut self) {
        self.cwnd = self.min_window;
        self.phase = Phase::SlowStart;
        self.last_reduction = None;
    }
}

impl CongestionController for Cubic {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Cubic
    }

    fn on_packets_acked(&mut self, ack: &AckEvent) {
        if ack.acked_bytes == 0 {
            return;
        }
        if in_recovery(self.recovery_start, ack.largest_acked_sent_time) {
            trace!(acked = ack.acked_bytes, "cubic: ack in recovery, window held");
            return;
        }
        if self.app_limited {
            return;
        }

        if self.phase == Phase::SlowStart {
            self.cwnd = self.cwnd.saturating_add(ack.acked_bytes).min(self.max_window);
            if self.cwnd >= self.ssthresh {
                self.phase = Phase::CongestionAvoidance;
                debug!(cwnd = self.cwnd, ssthresh = self.ssthresh, "cubic: exit slow start");
            }
            return;
        }

        let epoch = match self.last_reduction {
            Some(epoch) => epoch,
            None => {
                // Entered congestion avoidance without a loss: grow convexly
                // from the current window.
                self.start_epoch(ack.ack_time, self.cwnd);
                ack.ack_time
            }
        };
        let t = ack.ack_time.saturating_duration_since(epoch);
        let target = self.window_at(t);
        if target > self.cwnd {
            self.cwnd = target;
        }
        trace!(cwnd = self.cwnd, target, t = ?t, "cubic: ack");
    }

    fn on_packet_loss(&mut self, loss: &LossEvent) {
        if loss.lost_bytes == 0 && !loss.persistent_congestion {
            return;
        }

        if in_recovery(self.recovery_start, loss.largest_lost_sent_time) {
            debug!(cwnd = self.cwnd, "cubic: loss coalesced into current recovery");
        } else {
            let start = loss.loss_time.max(loss.largest_lost_sent_time);
            self.recovery_start = Some(self.recovery_start.map_or(start, |r| r.max(start)));

            let w_max = self.cwnd;
            self.cwnd = ((w_max as f64 * self.beta) as u64).clamp(self.min_window, self.max_window);
            self.ssthresh = self.cwnd;
            self.phase = Phase::CongestionAvoidance;
            self.start_epoch(start, w_max);
            debug!(
                cwnd = self.cwnd,
                w_max = self.w_max,
                k = self.k,
                "cubic: window reduced"
            );
        }

        if loss.persistent_congestion {
            self.on_persistent_congestion();
        }
    }

    fn on_rtt_sample(&mut self, sample: &RttSample) {
        self.srtt = Some(sample.smoothed);
    }

    fn on_persistent_congestion(&mut self) {
        self.reset_to_floor();
        debug!(cwnd = self.cwnd, "cubic: persistent congestion");
    }

    fn on_idle_restart(&mut self) {
        self.reset_to_floor();
        self.recovery_start = None;
        debug!(cwnd = self.cwnd, "cubic: idle restart");
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn ssthresh(&self) -> Option<u64> {
        (self.ssthresh != u64::MAX).then_some(self.ssthresh)
    }

    fn set_app_limited(&mut self, limited: bool, now: Instant) {
        match (self.app_limited, limited) {
            (false, true) => self.app_limited_since = Some(now),
            (true, false) => {
                if let (Some(since), Some(epoch)) =
                    (self.app_limited_since.take(), self.last_reduction)
                {
                    let paused = now.saturating_duration_since(since);
                    self.last_reduction = Some(epoch + paused);
                    trace!(paused = ?paused, "cubic: epoch shifted past app-limited period");
                }
            }
            _ => {}
        }
        self.app_limited = limited;
    }

    fn is_app_limited(&self) -> bool {
        self.app_limited
    }
}
