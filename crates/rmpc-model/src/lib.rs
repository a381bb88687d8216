//! Dynamics model definition for the robust MPC engine.
//!
//! A [`Model`] declares named states, inputs and uncertain parameters, one
//! right-hand-side [`Expr`] per state, and typed [`Bounds`](rmpc_core::Bounds)
//! per state and input. After [`Model::finalize`] the model is immutable and
//! can be shared (`Arc<Model>`) between the controller and the simulator.

pub mod error;
pub mod expr;
pub mod model;

pub use error::{ModelError, ModelResult};
pub use expr::{Expr, Point};
pub use model::{InputHandle, Model, ModelKind, ParamHandle, StateHandle, Variable};
