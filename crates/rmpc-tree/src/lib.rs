//! Scenario tree over enumerated uncertain-parameter realizations.
//!
//! The tree is an arena of [`TreeNode`]s laid out breadth first. Up to the
//! robust horizon every node branches into one child per combination of
//! parameter realizations (full Cartesian product); past it each node gets a
//! single child carrying its parent's realization.

pub mod builder;
pub mod error;
pub mod tree;

pub use builder::{UncertainParameter, build_tree};
pub use error::{TreeError, TreeResult};
pub use tree::{ScenarioTree, TreeNode};
