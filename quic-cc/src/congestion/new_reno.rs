//! NewReno congestion control (RFC 9002 section 7).
//!
//! Slow start: cwnd += acked bytes (doubles per RTT) until cwnd >= ssthresh.
//! Congestion avoidance: cwnd += MSS for every cwnd bytes acknowledged.
//! On loss: ssthresh = cwnd / 2, cwnd = max(ssthresh, min_window), at most
//! once per recovery period.

use std::time::Instant;

use tracing::{debug, trace};

use crate::config::CongestionConfig;
use crate::congestion::{in_recovery, AckEvent, Algorithm, CongestionController, LossEvent, Phase};

/// NewReno congestion controller.
#[derive(Debug, Clone)]
pub struct NewReno {
    /// Segment size used for linear growth.
    mss: u64,
    /// Window floor.
    min_window: u64,
    /// Window ceiling.
    max_window: u64,
    /// Current congestion window in bytes.
    cwnd: u64,
    /// Slow-start threshold.
    ssthresh: u64,
    phase: Phase,
    /// Time the current recovery period began. Losses of packets sent before
    /// this do not reduce the window again.
    recovery_start: Option<Instant>,
    /// Bytes acknowledged in congestion avoidance since the last increase.
    ack_accum: u64,
    app_limited: bool,
}

impl NewReno {
    pub fn new(config: &CongestionConfig) -> Self {
        Self {
            mss: config.max_datagram_size,
            min_window: config.min_window,
            max_window: config.max_window,
            cwnd: config.clamp_window(config.initial_window),
            ssthresh: u64::MAX,
            phase: Phase::SlowStart,
            recovery_start: None,
            ack_accum: 0,
            app_limited: false,
        }
    }

    /// Whether a packet sent at `sent` falls in the current recovery period.
    pub fn in_recovery(&self, sent: Instant) -> bool {
        in_recovery(self.recovery_start, sent)
    }

    fn reset_to_floor(&mut self) {
        self.cwnd = self.min_window;
        self.phase = Phase::SlowStart;
        self.ack_accum = 0;
    }
}

impl CongestionController for NewReno {
    fn algorithm(&self) -> Algorithm {
        Algorithm::NewReno
    }

    fn on_packets_acked(&mut self, ack: &AckEvent) {
        if ack.acked_bytes == 0 {
            return;
        }
        if self.in_recovery(ack.largest_acked_sent_time) {
            trace!(acked = ack.acked_bytes, "newreno: ack in recovery, window held");
            return;
        }
        if self.app_limited {
            return;
        }

        match self.phase {
            Phase::SlowStart => {
                self.cwnd = self.cwnd.saturating_add(ack.acked_bytes).min(self.max_window);
                if self.cwnd >= self.ssthresh {
                    self.phase = Phase::CongestionAvoidance;
                    debug!(cwnd = self.cwnd, ssthresh = self.ssthresh, "newreno: exit slow start");
                }
            }
            _ => {
                self.ack_accum = self.ack_accum.saturating_add(ack.acked_bytes);
                while self.ack_accum >= self.cwnd && self.cwnd < self.max_window {
                    self.ack_accum -= self.cwnd;
                    self.cwnd = (self.cwnd + self.mss).min(self.max_window);
                }
                if self.cwnd >= self.max_window {
                    self.ack_accum = 0;
                }
            }
        }
        trace!(cwnd = self.cwnd, phase = %self.phase, "newreno: ack");
    }

    fn on_packet_loss(&mut self, loss: &LossEvent) {
        if loss.lost_bytes == 0 && !loss.persistent_congestion {
            return;
        }

        if self.in_recovery(loss.largest_lost_sent_time) {
            debug!(cwnd = self.cwnd, "newreno: loss coalesced into current recovery");
        } else {
            let start = loss.loss_time.max(loss.largest_lost_sent_time);
            self.recovery_start = Some(self.recovery_start.map_or(start, |r| r.max(start)));
            self.ssthresh = self.cwnd / 2;
            self.cwnd = self.ssthresh.clamp(self.min_window, self.max_window);
            self.phase = Phase::CongestionAvoidance;
            self.ack_accum = 0;
            debug!(
                cwnd = self.cwnd,
                ssthresh = self.ssthresh,
                lost = loss.lost_bytes,
                "newreno: window reduced"
            );
        }

        if loss.persistent_congestion {
            self.on_persistent_congestion();
        }
    }

    fn on_persistent_congestion(&mut self) {
        self.reset_to_floor();
        debug!(cwnd = self.cwnd, "newreno: persistent congestion");
    }

    fn on_idle_restart(&mut self) {
        self.reset_to_floor();
        self.recovery_start = None;
        debug!(cwnd = self.cwnd, "newreno: idle restart");
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

    fn set_app_limited(&mut self, limited: bool, _now: Instant) {
        self.app_limited = limited;
    }

    fn is_app_limited(&self) -> bool {
        self.app_limited
    }
}
