//! RTT estimation feeding the congestion controllers.
//!
//! Smoothing follows RFC 9002 section 5:
//! SRTT   = 7/8 * SRTT   + 1/8 * sample
//! RTTVAR = 3/4 * RTTVAR + 1/4 * |SRTT - sample|
//! RTO    = SRTT + max(1ms, 4 * RTTVAR), clamped to [200ms, 60s].
//!
//! The minimum RTT is the lowest sample ever seen and never rises.

use std::time::Duration;

use crate::congestion::RttSample;

/// Minimum RTO: 200 ms (per RFC 6298 recommendation).
const MIN_RTO: Duration = Duration::from_millis(200);
/// Maximum RTO: 60 seconds.
const MAX_RTO: Duration = Duration::from_secs(60);
/// Granularity floor for the variance component: 1 ms.
const GRANULARITY: Duration = Duration::from_millis(1);
/// Number of probe timeouts that make up persistent congestion (RFC 9002 7.6).
const PERSISTENT_CONGESTION_THRESHOLD: u32 = 3;

/// RTT estimator tracking latest, minimum and smoothed round-trip times.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Most recent sample.
    latest: Option<Duration>,
    /// Lowest sample seen.
    min: Option<Duration>,
    /// Smoothed RTT.
    srtt: Option<Duration>,
    /// RTT variance.
    rttvar: Option<Duration>,
    /// Current retransmission timeout.
    rto: Duration,
}

impl RttEstimator {
    /// Create a new estimator with default initial RTO of 1 second.
    pub fn new() -> Self {
        Self {
            latest: None,
            min: None,
            srtt: None,
            rttvar: None,
            rto: Duration::from_secs(1),
        }
    }

    /// Update the estimator with a new RTT sample.
    pub fn update(&mut self, sample: Duration) {
        self.latest = Some(sample);
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));

        match self.srtt {
            None => {
                // First sample: SRTT = sample, RTTVAR = sample / 2
                self.srtt = Some(sample);
                self.rttvar = Some(sample / 2);
            }
            Some(srtt) => {
                let diff = if srtt > sample {
                    srtt - sample
                } else {
                    sample - srtt
                };
                let rttvar = self.rttvar.unwrap_or(diff);
                self.rttvar = Some((rttvar * 3 + diff) / 4);
                self.srtt = Some((srtt * 7 + sample) / 8);
            }
        }

        self.recompute_rto();
    }

    /// Recompute RTO from current SRTT/RTTVAR.
    fn recompute_rto(&mut self) {
        if let (Some(srtt), Some(rttvar)) = (self.srtt, self.rttvar) {
            let var_component = std::cmp::max(GRANULARITY, rttvar * 4);
            self.rto = (srtt + var_component).clamp(MIN_RTO, MAX_RTO);
        }
    }

    /// Returns the most recent sample, or `None` if no samples yet.
    pub fn latest(&self) -> Option<Duration> {
        self.latest
    }

    /// Returns the minimum RTT seen so far.
    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    /// Returns the current smoothed RTT, or `None` if no samples yet.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt
    }

    /// Returns the current RTT variance, or `None` if no samples yet.
    pub fn rttvar(&self) -> Option<Duration> {
        self.rttvar
    }

    /// Returns the current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Span of losses that counts as persistent congestion:
    /// `(SRTT + max(4 * RTTVAR, 1ms)) * 3`, or three RTOs before any sample.
    pub fn persistent_congestion_duration(&self) -> Duration {
        match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                (srtt + std::cmp::max(rttvar * 4, GRANULARITY)) * PERSISTENT_CONGESTION_THRESHOLD
            }
            _ => self.rto * PERSISTENT_CONGESTION_THRESHOLD,
        }
    }

    /// Snapshot handed to the congestion controller after an update.
    pub fn sample(&self) -> Option<RttSample> {
        match (self.latest, self.min, self.srtt) {
            (Some(latest), Some(min), Some(smoothed)) => Some(RttSample {
                latest,
                min,
                smoothed,
            }),
            _ => None,
        }
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_initializes() {
        let mut est = RttEstimator::new();
        assert!(est.sample().is_none());
        est.update(Duration::from_millis(100));
        assert_eq!(est.srtt(), Some(Duration::from_millis(100)));
        assert_eq!(est.rttvar(), Some(Duration::from_millis(50)));
        assert_eq!(est.min(), Some(Duration::from_millis(100)));
        assert!(est.sample().is_some());
    }

    #[test]
    fn subsequent_samples_smooth() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_millis(100));
        est.update(Duration::from_millis(120));

        // SRTT = 7/8 * 100 + 1/8 * 120 = 87.5 + 15 = 102.5ms
        let srtt = est.srtt().unwrap();
        assert!(
            srtt.as_millis() >= 102 && srtt.as_millis() <= 103,
            "srtt = {:?}",
            srtt
        );
        assert_eq!(est.latest(), Some(Duration::from_millis(120)));
    }

    #[test]
    fn min_never_rises() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_millis(80));
        est.update(Duration::from_millis(60));
        est.update(Duration::from_millis(200));
        assert_eq!(est.min(), Some(Duration::from_millis(60)));
    }

    #[test]
    fn rto_clamped_min() {
        let mut est = RttEstimator::new();
        // Very tiny RTT -> RTO should be at least MIN_RTO.
        est.update(Duration::from_micros(100));
        assert!(est.rto() >= MIN_RTO);
    }

    #[test]
    fn rto_clamped_max() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_secs(100));
        assert!(est.rto() <= MAX_RTO);
    }

    #[test]
    fn persistent_congestion_spans_three_ptos() {
        let mut est = RttEstimator::new();
        assert_eq!(est.persistent_congestion_duration(), Duration::from_secs(3));

        est.update(Duration::from_millis(100));
        // (100ms + 4 * 50ms) * 3
        assert_eq!(
            est.persistent_congestion_duration(),
            Duration::from_millis(900)
        );
    }
}
