//! Solver configuration
//!
//! Every knob of the Newton loop and its diagnostics lives in
//! [`SolverConfig`]. A configuration can be built in code with the `with_*`
//! methods or read from a RON file:
//!
//! ```
//! use gcs_core::SolverConfig;
//!
//! let config =
//!     SolverConfig::from_ron_str("(max_iterations: 80, find_free_params: true)").unwrap();
//! assert_eq!(config.max_iterations, 80);
//! assert!(config.find_free_params);
//! assert_eq!(config.max_unknowns, SolverConfig::default().max_unknowns);
//! ```

use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_DRAGGED_SCALE, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_UNKNOWNS, DEFAULT_RANK_TOLERANCE,
    DEFAULT_STALL_RATIO, DEFAULT_STALL_WINDOW, DEFAULT_TOLERANCE,
};

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tuning of the Newton-Raphson solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Largest residual magnitude accepted as converged
    pub tolerance: f64,
    /// Newton iteration cap
    pub max_iterations: usize,
    /// Largest number of free parameters (or equations) in one solve
    pub max_unknowns: usize,
    /// Relative singular value threshold for the numeric rank
    pub rank_tolerance: f64,
    /// Step scale for dragged parameters
    pub dragged_scale: f64,
    /// Fraction of the Newton step applied per iteration (0-1]
    pub damping: f64,
    /// Trailing iterations inspected for a residual plateau
    pub stall_window: usize,
    /// Plateau threshold, see [`crate::constants::DEFAULT_STALL_RATIO`]
    pub stall_ratio: f64,
    /// Report the constraints responsible for a failure or a redundancy
    pub find_bad_constraints: bool,
    /// Report the parameters left unconstrained after a full-rank solve
    pub find_free_params: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_unknowns: DEFAULT_MAX_UNKNOWNS,
            rank_tolerance: DEFAULT_RANK_TOLERANCE,
            dragged_scale: DEFAULT_DRAGGED_SCALE,
            damping: 1.0,
            stall_window: DEFAULT_STALL_WINDOW,
            stall_ratio: DEFAULT_STALL_RATIO,
            find_bad_constraints: true,
            find_free_params: false,
        }
    }
}

impl SolverConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a configuration from a RON file
    ///
    /// # Errors
    ///
    /// Returns error if the file can't be read, isn't valid RON, or holds
    /// out-of-range values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse and validate a configuration from a RON string
    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        let config: SolverConfig = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty-printed RON form of this configuration
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be at least 1".into()));
        }
        if self.max_unknowns == 0 {
            return Err(ConfigError::Invalid("max_unknowns must be at least 1".into()));
        }
        if !(self.rank_tolerance.is_finite() && self.rank_tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "rank_tolerance must be positive, got {}",
                self.rank_tolerance
            )));
        }
        if !(self.dragged_scale.is_finite() && self.dragged_scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "dragged_scale must be positive, got {}",
                self.dragged_scale
            )));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "damping must be in (0, 1], got {}",
                self.damping
            )));
        }
        if self.stall_window == 0 {
            return Err(ConfigError::Invalid("stall_window must be at least 1".into()));
        }
        if !(self.stall_ratio > 0.0 && self.stall_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "stall_ratio must be in (0, 1], got {}",
                self.stall_ratio
            )));
        }
        Ok(())
    }

    /// Set the convergence tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the free parameter limit
    pub fn with_max_unknowns(mut self, max_unknowns: usize) -> Self {
        self.max_unknowns = max_unknowns;
        self
    }

    /// Set the relative rank threshold
    pub fn with_rank_tolerance(mut self, rank_tolerance: f64) -> Self {
        self.rank_tolerance = rank_tolerance;
        self
    }

    /// Set the step scale of dragged parameters
    pub fn with_dragged_scale(mut self, dragged_scale: f64) -> Self {
        self.dragged_scale = dragged_scale;
        self
    }

    /// Set the damping factor (0.1-1)
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping.clamp(0.1, 1.0);
        self
    }

    /// Set the plateau detection window and ratio
    pub fn with_stall_detection(mut self, window: usize, ratio: f64) -> Self {
        self.stall_window = window;
        self.stall_ratio = ratio;
        self
    }

    /// Enable or disable bad constraint reporting
    pub fn with_find_bad_constraints(mut self, enabled: bool) -> Self {
        self.find_bad_constraints = enabled;
        self
    }

    /// Enable or disable free parameter reporting
    pub fn with_find_free_params(mut self, enabled: bool) -> Self {
        self.find_free_params = enabled;
        self
    }
}
