//! Geometric Constraint Solver
//!
//! This crate provides:
//! - Sketch model of parameters, entities, constraints and groups
//! - Symbolic residual equations with exact derivatives
//! - Newton-Raphson solver working one group at a time
//! - Diagnostics for redundant, conflicting and unconstrained sketches

pub mod config;
pub mod constants;
pub mod expr;
pub mod handle;
pub mod math;
pub mod sketch;
pub mod solver;

// Re-exports for convenience
pub use config::{ConfigError, SolverConfig};
pub use expr::{Expr, ExprQuaternion, ExprVector, ParamValues, ReferencedParams};
pub use handle::{ConstraintId, EntityId, GroupId, ParamId};
pub use math::{make_quaternion, quaternion_components, quaternion_n, quaternion_u, quaternion_v};
pub use sketch::{
    Constraint, ConstraintKind, Entity, EntityKind, Group, Param, ParamOwner, Sketch, SketchError,
    SketchResult,
};
pub use solver::{ConstraintSolver, SolveReport, SolveStatus};
