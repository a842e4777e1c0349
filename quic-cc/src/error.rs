use thiserror::Error;

use crate::congestion::Algorithm;

/// All errors produced by the congestion control layer.
///
/// Every error here is a connection-setup failure. Event processing on a
/// constructed controller never fails.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CongestionError {
    #[error("unsupported congestion control algorithm: {0}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("unknown congestion control algorithm name: {0:?}")]
    UnknownAlgorithm(String),

    #[error("invalid congestion control config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CongestionError>;
