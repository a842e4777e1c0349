//! Window parameters and per-algorithm tunables.
//!
//! A `CongestionConfig` is the narrow view of connection settings that a
//! controller is allowed to see. It is fixed once the connection is set up.

use std::time::Duration;

use crate::error::{CongestionError, Result};

/// Default maximum segment size: the smallest QUIC datagram every path must carry.
pub const DEFAULT_MSS: u64 = 1200;
/// Default initial congestion window: 10 * MSS (per RFC 6928).
pub const DEFAULT_INITIAL_WINDOW_PACKETS: u64 = 10;
/// Default minimum congestion window: 2 * MSS.
pub const DEFAULT_MIN_WINDOW_PACKETS: u64 = 2;
/// Default maximum congestion window: 2000 * MSS.
pub const DEFAULT_MAX_WINDOW_PACKETS: u64 = 2000;
/// Default idle period after which the window restarts from the minimum.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(1);

/// Window bounds and segment size shared by every algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct CongestionConfig {
    /// Maximum segment size in bytes.
    pub max_datagram_size: u64,
    /// Congestion window a new controller starts with.
    pub initial_window: u64,
    /// Floor for the congestion window.
    pub min_window: u64,
    /// Ceiling for the congestion window.
    pub max_window: u64,
    /// Quiet period with nothing in flight that triggers an idle restart.
    pub idle_threshold: Duration,
    /// CUBIC tunables.
    pub cubic: CubicConfig,
    /// Delay-based tunables.
    pub copa: CopaConfig,
}

impl CongestionConfig {
    /// Build a config whose windows are expressed in packets of `mss` bytes.
    pub fn with_packets(mss: u64, initial: u64, min: u64, max: u64) -> Self {
        Self {
            max_datagram_size: mss,
            initial_window: initial * mss,
            min_window: min * mss,
            max_window: max * mss,
            copa: CopaConfig::with_mss(mss),
            ..Self::default()
        }
    }

    /// Replace the CUBIC tunables.
    pub fn with_cubic(mut self, cubic: CubicConfig) -> Self {
        self.cubic = cubic;
        self
    }

    /// Replace the delay-based tunables.
    pub fn with_copa(mut self, copa: CopaConfig) -> Self {
        self.copa = copa;
        self
    }

    /// Replace the idle restart threshold.
    pub fn with_idle_threshold(mut self, idle_threshold: Duration) -> Self {
        self.idle_threshold = idle_threshold;
        self
    }

    /// Clamp a window value into `[min_window, max_window]`.
    pub fn clamp_window(&self, window: u64) -> u64 {
        window.clamp(self.min_window, self.max_window)
    }

    /// Check that the window bounds and tunables are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_datagram_size == 0 {
            return Err(CongestionError::InvalidConfig(
                "max_datagram_size must be non-zero".into(),
            ));
        }
        if self.min_window == 0 || self.min_window > self.max_window {
            return Err(CongestionError::InvalidConfig(format!(
                "window bounds [{}, {}] are empty",
                self.min_window, self.max_window
            )));
        }
        if !(self.min_window..=self.max_window).contains(&self.initial_window) {
            return Err(CongestionError::InvalidConfig(format!(
                "initial window {} outside [{}, {}]",
                self.initial_window, self.min_window, self.max_window
            )));
        }
        self.cubic.validate()?;
        self.copa.validate()
    }
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: DEFAULT_MSS,
            initial_window: DEFAULT_INITIAL_WINDOW_PACKETS * DEFAULT_MSS,
            min_window: DEFAULT_MIN_WINDOW_PACKETS * DEFAULT_MSS,
            max_window: DEFAULT_MAX_WINDOW_PACKETS * DEFAULT_MSS,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            cubic: CubicConfig::default(),
            copa: CopaConfig::default(),
        }
    }
}

/// CUBIC constants (RFC 8312).
#[derive(Debug, Clone, PartialEq)]
pub struct CubicConfig {
    /// Multiplicative decrease factor.
    pub beta: f64,
    /// Cubic scaling constant, in segments per second cubed.
    pub c: f64,
    /// Never grow slower than an AIMD flow with the same `beta`.
    pub tcp_friendly: bool,
}

impl CubicConfig {
    fn validate(&self) -> Result<()> {
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(CongestionError::InvalidConfig(format!(
                "cubic beta {} outside (0, 1)",
                self.beta
            )));
        }
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(CongestionError::InvalidConfig(format!(
                "cubic c {} must be positive",
                self.c
            )));
        }
        Ok(())
    }
}

impl Default for CubicConfig {
    fn default() -> Self {
        Self {
            beta: 0.7,
            c: 0.4,
            tcp_friendly: true,
        }
    }
}

/// Delay-based controller tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct CopaConfig {
    /// Queuing delay the controller steers towards.
    pub target_queuing_delay: Duration,
    /// Largest fraction of cwnd added in one round trip.
    pub max_increase_rate: f64,
    /// Largest fraction of cwnd removed in one round trip at full excess delay.
    pub max_decrease_rate: f64,
    /// Lowest multiplicative factor a single delay decrease may apply.
    pub min_decrease_factor: f64,
    /// Multiplicative factor applied on loss.
    pub loss_beta: f64,
    /// Round trips between two min-RTT probes.
    pub probe_rtt_interval_rounds: u32,
    /// Window used while probing for the min RTT.
    pub probe_rtt_window: u64,
    /// How long a measured min RTT stays valid without being re-measured.
    pub min_rtt_window: Duration,
}

impl CopaConfig {
    /// Defaults with the probe window sized for `mss`.
    pub fn with_mss(mss: u64) -> Self {
        Self {
            probe_rtt_window: 4 * mss,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.target_queuing_delay.is_zero() {
            return Err(CongestionError::InvalidConfig(
                "target queuing delay must be non-zero".into(),
            ));
        }
        let fractions = [
            ("max_increase_rate", self.max_increase_rate),
            ("max_decrease_rate", self.max_decrease_rate),
            ("min_decrease_factor", self.min_decrease_factor),
            ("loss_beta", self.loss_beta),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(CongestionError::InvalidConfig(format!(
                    "{name} {value} outside (0, 1]"
                )));
            }
        }
        if self.min_rtt_window.is_zero() {
            return Err(CongestionError::InvalidConfig(
                "min_rtt_window must be non-zero".into(),
            ));
        }
        if self.probe_rtt_interval_rounds < 2 {
            return Err(CongestionError::InvalidConfig(
                "probe_rtt_interval_rounds must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CopaConfig {
    fn default() -> Self {
        Self {
            target_queuing_delay: Duration::from_millis(10),
            max_increase_rate: 0.5,
            max_decrease_rate: 0.5,
            min_decrease_factor: 0.5,
            loss_beta: 0.5,
            probe_rtt_interval_rounds: 16,
            probe_rtt_window: 4 * DEFAULT_MSS,
            min_rtt_window: Duration::from_secs(10),
        }
    }
}
