//! State estimators.

use crate::error::{SimError, SimResult};
use rmpc_core::Real;

/// Maps a plant measurement to the state estimate used by the controller.
pub trait Estimator {
    fn make_step(&mut self, y: &[Real]) -> SimResult<Vec<Real>>;
}

/// Full-state feedback: the estimate is the measurement.
#[derive(Clone, Debug)]
pub struct StateFeedback {
    n_x: usize,
}

impl StateFeedback {
    pub fn new(n_x: usize) -> Self {
        Self { n_x }
    }
}

impl Estimator for StateFeedback {
    fn make_step(&mut self, y: &[Real]) -> SimResult<Vec<Real>> {
        if y.len() != self.n_x {
            return Err(SimError::InvalidArg {
                what: format!("measurement has {} entries, expected {}", y.len(), self.n_x),
            });
        }
        Ok(y.to_vec())
    }
}
