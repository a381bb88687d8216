//! Nonlinear programming layer for the robust MPC engine.
//!
//! This crate defines the boundary between the NLP assembler and whatever
//! numerical solver sits behind it ([`Nlp`] and [`NlpSolver`]), and ships a
//! default dense solver:
//!
//! - [`AugLagSolver`]: augmented Lagrangian outer loop for equality
//!   constraints, bound-constrained subproblems solved by a projected Newton
//!   method so iterates never leave the variable box
//! - [`newton::newton_solve`]: damped Newton for square nonlinear systems
//! - finite-difference gradients, Jacobians and Hessians

pub mod auglag;
pub mod error;
pub mod jacobian;
pub mod newton;
pub mod problem;
pub mod status;

mod projected_newton;

pub use auglag::{AugLagConfig, AugLagSolver};
pub use error::{SolverError, SolverResult};
pub use newton::{NewtonConfig, NewtonResult, newton_solve};
pub use problem::{Nlp, NlpSolver};
pub use status::{SolveStatus, SolverOutput};
