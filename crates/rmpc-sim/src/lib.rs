//! Plant simulation for closed-loop runs.
//!
//! Provides:
//! - [`Simulator`]: advances the true model by one sampling period under a
//!   zero-order-hold input and an explicit parameter function `p_fun(t)`
//! - ODE integrators: adaptive Dormand-Prince 5(4), classical RK4 and
//!   forward Euler
//! - [`Estimator`] trait with full [`StateFeedback`]

pub mod error;
pub mod estimator;
pub mod integrator;
pub mod model;
pub mod sim;

pub use error::{SimError, SimResult};
pub use estimator::{Estimator, StateFeedback};
pub use integrator::{Dopri5, ForwardEuler, Integrator, RK4};
pub use model::{ModelRhs, OdeRhs};
pub use sim::{IntegratorType, Simulator, SimulatorSettings};
