//! Transcription of the robust optimal control problem into one NLP.
//!
//! - [`collocation`]: orthogonal collocation on finite elements (Radau or
//!   Legendre points, differentiation matrix, element residuals)
//! - [`assembler`]: per-node variable blocks over the scenario tree,
//!   collocation/continuity/path constraints, weighted objective, and the
//!   [`Nlp`](rmpc_solver::Nlp) view handed to the solver
//! - [`solution`]: per-scenario trajectories extracted from a primal vector

pub mod assembler;
pub mod collocation;
pub mod error;
pub mod layout;
pub mod objective;
pub mod solution;

pub use assembler::{NlpInstance, NlpSpec, NlpStructure};
pub use collocation::{Collocation, CollocationFamily, CollocationSettings, IntervalSolution};
pub use error::{NlpError, NlpResult};
pub use layout::{ElementLayout, LayoutSignature, NodeLayout};
pub use objective::{NlConstraint, Objective};
pub use solution::{ScenarioTrajectory, SolutionTrajectory};
