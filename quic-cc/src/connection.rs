//! Per-connection congestion state.
//!
//! Owns the bytes-in-flight counter, the RTT estimator and the single
//! congestion controller selected when the connection was set up. The
//! ack/loss processing path calls in here; the send path asks
//! [`ConnectionState::writable_bytes`] before emitting packets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::CongestionConfig;
use crate::congestion::{
    build_controller, AckEvent, Algorithm, CongestionController, ControllerFactory, LossEvent,
    Phase,
};
use crate::error::Result;
use crate::qlog::{CongestionEvent, CongestionMetricUpdate, QLogger};
use crate::rtt::RttEstimator;

/// Congestion bookkeeping for one connection.
pub struct ConnectionState {
    config: CongestionConfig,
    algorithm: Algorithm,
    /// `None` when congestion control is disabled.
    congestion: Option<Box<dyn CongestionController>>,
    rtt: RttEstimator,
    bytes_in_flight: u64,
    /// Last send or ack, for idle detection.
    last_activity: Option<Instant>,
    qlogger: Option<Arc<dyn QLogger>>,
}

impl ConnectionState {
    /// Set up congestion state with the built-in controllers.
    pub fn new(algorithm: Algorithm, config: CongestionConfig) -> Result<Self> {
        let congestion = build_controller(algorithm, &config)?;
        Ok(Self::with_controller(algorithm, config, congestion))
    }

    /// Set up congestion state with a controller from `factory`.
    pub fn with_factory(
        factory: &dyn ControllerFactory,
        algorithm: Algorithm,
        config: CongestionConfig,
    ) -> Result<Self> {
        let congestion = factory.make_controller(algorithm, &config)?;
        Ok(Self::with_controller(algorithm, config, congestion))
    }

    fn with_controller(
        algorithm: Algorithm,
        config: CongestionConfig,
        congestion: Option<Box<dyn CongestionController>>,
    ) -> Self {
        Self {
            config,
            algorithm,
            congestion,
            rtt: RttEstimator::new(),
            bytes_in_flight: 0,
            last_activity: None,
            qlogger: None,
        }
    }

    /// Attach a logger receiving a metric update after every event.
    pub fn set_qlogger(&mut self, qlogger: Arc<dyn QLogger>) {
        self.qlogger = Some(qlogger);
    }

    /// Record a packet of `bytes` leaving the sender.
    pub fn on_packet_sent(&mut self, bytes: u64, now: Instant) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_add(bytes);
        self.last_activity = Some(now);
    }

    /// Feed a new RTT measurement to the estimator and the controller.
    pub fn on_rtt_sample(&mut self, latest: Duration) {
        self.rtt.update(latest);
        if let (Some(cc), Some(sample)) = (self.congestion.as_mut(), self.rtt.sample()) {
            cc.on_rtt_sample(&sample);
        }
    }

    /// Process newly acknowledged bytes.
    pub fn on_ack(&mut self, ack: &AckEvent) {
        self.remove_in_flight(ack.acked_bytes, "ack");
        self.last_activity = Some(ack.ack_time);
        if let Some(cc) = self.congestion.as_mut() {
            cc.on_packets_acked(ack);
        }
        self.log_update(CongestionEvent::PacketAck, ack.ack_time);
    }

    /// Process newly lost bytes.
    pub fn on_loss(&mut self, loss: &LossEvent) {
        self.remove_in_flight(loss.lost_bytes, "loss");
        if let Some(cc) = self.congestion.as_mut() {
            cc.on_packet_loss(loss);
        }
        let event = if loss.persistent_congestion {
            CongestionEvent::PersistentCongestion
        } else {
            CongestionEvent::PacketLoss
        };
        self.log_update(event, loss.loss_time);
    }

    /// Idle timer callback. Restarts the window if nothing has been in flight
    /// for at least the idle threshold. Returns whether a restart happened.
    pub fn check_idle(&mut self, now: Instant) -> bool {
        if self.bytes_in_flight > 0 {
            return false;
        }
        let idle = match self.last_activity {
            Some(last) => now.saturating_duration_since(last),
            None => return false,
        };
        if idle < self.config.idle_threshold {
            return false;
        }

        if let Some(cc) = self.congestion.as_mut() {
            cc.on_idle_restart();
        }
        self.last_activity = Some(now);
        debug!(idle = ?idle, "connection idle, congestion window restarted");
        self.log_update(CongestionEvent::IdleRestart, now);
        true
    }

    /// Bytes the send path may emit now. Unlimited when congestion control
    /// is disabled.
    pub fn writable_bytes(&self) -> u64 {
        match &self.congestion {
            Some(cc) => cc.writable_bytes(self.bytes_in_flight),
            None => u64::MAX,
        }
    }

    /// Current congestion window, if congestion control is enabled.
    pub fn congestion_window(&self) -> Option<u64> {
        self.congestion.as_ref().map(|cc| cc.congestion_window())
    }

    /// Pacing rate in bytes per second, once an RTT is known and the
    /// controller supports pacing.
    pub fn pacing_rate(&self) -> Option<u64> {
        let srtt = self.rtt.srtt()?;
        self.congestion.as_ref()?.pacing_rate(srtt)
    }

    pub fn set_app_limited(&mut self, limited: bool, now: Instant) {
        if let Some(cc) = self.congestion.as_mut() {
            cc.set_app_limited(limited, now);
        }
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn config(&self) -> &CongestionConfig {
        &self.config
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// The active controller, or `None` when congestion control is disabled.
    pub fn congestion(&self) -> Option<&dyn CongestionController> {
        self.congestion.as_deref()
    }

    /// Span of losses the loss detector should treat as persistent congestion.
    pub fn persistent_congestion_duration(&self) -> Duration {
        self.rtt.persistent_congestion_duration()
    }

    fn remove_in_flight(&mut self, bytes: u64, reason: &'static str) {
        if bytes > self.bytes_in_flight {
            warn!(
                bytes,
                in_flight = self.bytes_in_flight,
                reason,
                "more bytes removed than in flight"
            );
        }
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes);
    }

    fn log_update(&self, event: CongestionEvent, time: Instant) {
        let Some(qlogger) = &self.qlogger else {
            return;
        };
        let (congestion_window, phase) = match &self.congestion {
            Some(cc) => (cc.congestion_window(), cc.phase()),
            None => (u64::MAX, Phase::Steady),
        };
        qlogger.add_congestion_metric_update(CongestionMetricUpdate {
            time,
            event,
            algorithm: self.algorithm,
            bytes_in_flight: self.bytes_in_flight,
            congestion_window,
            phase,
        });
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("algorithm", &self.algorithm)
            .field("congestion", &self.congestion)
            .field("bytes_in_flight", &self.bytes_in_flight)
            .field("rtt", &self.rtt)
            .finish_non_exhaustive()
    }
}
