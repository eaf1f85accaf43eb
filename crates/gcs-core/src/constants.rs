//! Numeric defaults shared by the solver and the sketch model

/// Largest residual magnitude accepted as converged
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Newton iteration cap
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Largest number of free parameters or equations handled in one solve
pub const DEFAULT_MAX_UNKNOWNS: usize = 1024;

/// Singular values below this fraction of the largest one count as zero
pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-10;

/// Step scale applied to dragged parameters, so they move less than the rest
pub const DEFAULT_DRAGGED_SCALE: f64 = 1.0 / 20.0;

/// Number of trailing iterations inspected when looking for a residual plateau
pub const DEFAULT_STALL_WINDOW: usize = 10;

/// A plateau is declared when the recent best residual is not below this
/// fraction of the earlier best
pub const DEFAULT_STALL_RATIO: f64 = 0.9;

/// Parameter values beyond this magnitude abort the Newton loop
pub const VALUE_LIMIT: f64 = 1e11;

/// Distance under which two endpoints are treated as shared
pub const ENDPOINT_MATCH_DISTANCE: f64 = 1e-6;

/// Above this |cos| an angle constraint switches to its boosted gain
pub const ANGLE_NEAR_PARALLEL_COS: f64 = 0.99;
