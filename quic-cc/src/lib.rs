//! quic-cc -- congestion control for a QUIC transport.
//!
//! One controller per connection, selected at setup time and driven
//! synchronously from the ack/loss processing path:
//! - **NewReno**: classic AIMD
//! - **Cubic**: RFC 8312 window growth keyed on time since the last reduction
//! - **Copa**: delay-based, steering towards a target queuing delay
//! - **Learned**: window decisions delegated to a pluggable policy

pub mod config;
pub mod congestion;
pub mod connection;
pub mod error;
pub mod filter;
pub mod qlog;
pub mod rtt;

// Re-export key public types at crate root.
pub use config::{CongestionConfig, CopaConfig, CubicConfig};
pub use congestion::{
    build_controller, AckEvent, Algorithm, CongestionController, ControllerFactory,
    ControllerMetrics, DefaultControllerFactory, LossEvent, Phase, RttSample,
};
pub use connection::ConnectionState;
pub use error::{CongestionError, Result};
pub use qlog::{MemoryQLogger, QLogger};
pub use rtt::RttEstimator;
