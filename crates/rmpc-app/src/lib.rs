//! Application layer for the robust MPC engine.
//!
//! This crate wires the engine into runnable closed loops for the CLI:
//! YAML run configs, built-in demo plants, the closed-loop driver and a run
//! service that executes, caches and reloads runs.

pub mod config;
pub mod demos;
pub mod driver;
pub mod error;
pub mod plant;
pub mod run_service;

pub use config::{
    PlantSegment, RunConfig, UncertaintyDef, ValidationError, load_yaml, save_yaml,
    validate_config,
};
pub use demos::{DemoModel, DemoProblem};
pub use driver::{ClosedLoopDriver, HaltCause, LoopHalt, ParamFn};
pub use error::{AppError, AppResult};
pub use plant::PlantSchedule;
pub use run_service::{
    RunOptions, RunRequest, RunResponse, SOLVER_VERSION, build_controller, build_driver,
    ensure_run, ensure_run_with_progress, list_runs, load_run,
};
