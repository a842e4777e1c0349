//! Selection of the congestion controller for a new connection.
//!
//! Selection happens once, when the connection is constructed. An
//! unsupported identifier is a setup error; there is no fallback algorithm.

use std::fmt;

use tracing::{debug, warn};

use crate::config::CongestionConfig;
use crate::congestion::{Algorithm, CongestionController, Copa, Cubic, Learned, NewReno};
use crate::error::{CongestionError, Result};

/// Build the controller for `algorithm`.
///
/// Returns `Ok(None)` for [`Algorithm::None`]: congestion control is disabled
/// and the caller must treat the writable window as unlimited.
pub fn build_controller(
    algorithm: Algorithm,
    config: &CongestionConfig,
) -> Result<Option<Box<dyn CongestionController>>> {
    let controller: Box<dyn CongestionController> = match algorithm {
        Algorithm::None => {
            debug!("congestion control disabled");
            return Ok(None);
        }
        Algorithm::Bbr => {
            warn!(%algorithm, "requested congestion controller is not implemented");
            return Err(CongestionError::UnsupportedAlgorithm(algorithm));
        }
        Algorithm::NewReno => {
            config.validate()?;
            Box::new(NewReno::new(config))
        }
        Algorithm::Cubic => {
            config.validate()?;
            Box::new(Cubic::new(config))
        }
        Algorithm::Copa => {
            config.validate()?;
            Box::new(Copa::new(config))
        }
        Algorithm::Learned => {
            config.validate()?;
            Box::new(Learned::new(config))
        }
    };

    debug!(
        %algorithm,
        cwnd = controller.congestion_window(),
        "congestion controller selected"
    );
    Ok(Some(controller))
}

/// Builds controllers for new connections.
///
/// A server holds one factory and shares it across all connections, so
/// implementations must be `Send + Sync`.
pub trait ControllerFactory: Send + Sync + fmt::Debug {
    fn make_controller(
        &self,
        algorithm: Algorithm,
        config: &CongestionConfig,
    ) -> Result<Option<Box<dyn CongestionController>>>;
}

/// Factory backed by [`build_controller`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultControllerFactory;

impl ControllerFactory for DefaultControllerFactory {
    fn make_controller(
        &self,
        algorithm: Algorithm,
        config: &CongestionConfig,
    ) -> Result<Option<Box<dyn CongestionController>>> {
        build_controller(algorithm, config)
    }
}
