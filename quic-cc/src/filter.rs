//! Windowed minimum filter over timestamped RTT samples.
//!
//! Keeps a monotonic deque: samples are dropped once they fall out of the
//! window or once a newer sample is at least as small.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Minimum of the samples seen during the last `window`.
#[derive(Debug, Clone)]
pub struct WindowedMinFilter {
    window: Duration,
    samples: VecDeque<(Instant, Duration)>,
}

impl WindowedMinFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Change the window length. Takes effect on the next update.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `value` observed at `now` and expire old samples.
    ///
    /// A timestamp older than the newest recorded one is treated as arriving
    /// at that newest time so the deque stays ordered.
    pub fn update(&mut self, value: Duration, now: Instant) {
        let now = match self.samples.back() {
            Some(&(last, _)) if now < last => last,
            _ => now,
        };
        while matches!(self.samples.back(), Some(&(_, v)) if v >= value) {
            self.samples.pop_back();
        }
        self.samples.push_back((now, value));

        while let Some(&(t, _)) = self.samples.front() {
            if self.samples.len() > 1 && now.saturating_duration_since(t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current windowed minimum.
    pub fn get(&self) -> Option<Duration> {
        self.samples.front().map(|&(_, v)| v)
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
