//! rmpc-core: stable foundation for the robust MPC engine.
//!
//! Contains:
//! - ids (compact arena indices for model variables and tree nodes)
//! - numeric (Real + tolerances + bounds + float helpers)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
