//! Constraint Solver
//!
//! Newton-Raphson solver for one group of a [`Sketch`]. Each call assembles
//! the group's equations, shrinks the system, iterates with minimum-norm
//! least squares steps and then diagnoses the result: degrees of freedom,
//! redundant or conflicting constraints, and parameters left free.

pub mod linalg;
pub mod system;

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::SolverConfig;
use crate::constants::VALUE_LIMIT;
use crate::handle::{ConstraintId, GroupId, ParamId};
use crate::sketch::{Sketch, SketchResult};

pub use system::{Equation, EquationSource, EquationSystem, NewtonSystem};

/// Outcome of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Converged with independent equations
    Okay,
    /// Converged, but some equations are redundant
    RedundantOkay,
    /// Did not converge and the equations contradict each other
    Inconsistent,
    /// Did not converge within the iteration limit
    DidntConverge,
    /// The group has more unknowns or equations than allowed
    TooManyUnknowns,
}

impl SolveStatus {
    /// Whether the solved values were written back
    pub fn is_ok(&self) -> bool {
        matches!(self, SolveStatus::Okay | SolveStatus::RedundantOkay)
    }
}

/// Result of solving one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub status: SolveStatus,
    /// Remaining degrees of freedom, known only after convergence
    pub dof: Option<usize>,
    /// Constraints blamed for a failure or for redundancy
    pub bad_constraints: Vec<ConstraintId>,
    /// Unknowns that no equation pins down
    pub free_params: Vec<ParamId>,
    /// Newton iterations performed
    pub iterations: usize,
    /// Largest absolute residual at the end
    pub residual: f64,
}

impl SolveReport {
    fn new(status: SolveStatus) -> Self {
        Self {
            status,
            dof: None,
            bad_constraints: Vec::new(),
            free_params: Vec::new(),
            iterations: 0,
            residual: 0.0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// How the Newton loop ended
#[derive(Debug, Clone, Copy)]
struct Iteration {
    converged: bool,
    stalled: bool,
    iterations: usize,
}

/// Constraint solver using Newton-Raphson iteration
#[derive(Debug, Clone, Default)]
pub struct ConstraintSolver {
    config: SolverConfig,
}

impl ConstraintSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve `group` and write the values back on success
    ///
    /// Parameters of earlier groups stay fixed unless they are listed in
    /// `dragged`.
    ///
    /// # Errors
    ///
    /// Returns error if the group does not exist or an equation refers to
    /// a missing or mistyped entity.
    pub fn solve(
        &self,
        sketch: &mut Sketch,
        group: GroupId,
        dragged: &BTreeSet<ParamId>,
    ) -> SketchResult<SolveReport> {
        sketch.group(group)?;
        let config = &self.config;

        let mut system = EquationSystem::assemble(sketch, group, dragged)?;
        let unknowns = system.referenced_unknowns().len();
        if unknowns > config.max_unknowns || system.equations.len() > config.max_unknowns {
            warn!(
                "{}: {} unknowns and {} equations exceed the limit of {}",
                group,
                unknowns,
                system.equations.len(),
                config.max_unknowns
            );
            return Ok(SolveReport::new(SolveStatus::TooManyUnknowns));
        }

        system.substitute();
        if let Err(index) = system.solve_alone(config.tolerance, config.max_iterations) {
            // No stall test here: an unreachable equation in one unknown
            // reports DidntConverge, while the same equation in two or more
            // unknowns goes through Newton and can report Inconsistent.
            let mut report = SolveReport::new(SolveStatus::DidntConverge);
            if config.find_bad_constraints {
                if let EquationSource::Constraint(id) = system.equations[index].source {
                    report.bad_constraints.push(id);
                }
            }
            warn!("{}: single-unknown equation did not converge", group);
            return Ok(report);
        }

        let newton = system.newton_system();
        let (m, n) = (newton.equation_count(), newton.unknown_count());
        let mut x = newton.initial(&system);
        let rank = linalg::rank(&newton.jacobian(&system, &x, None), config.rank_tolerance);
        let rank_ok = rank == m;
        debug!(
            "{}: Newton system {}x{}, rank {} before iterating",
            group, m, n, rank
        );

        let outcome = self.iterate(&newton, &system, &mut x);
        let residuals = newton.residuals(&system, &x);
        system.store(&newton, &x);

        let mut report = SolveReport::new(SolveStatus::Okay);
        report.iterations = outcome.iterations;
        report.residual = max_abs(&residuals);

        if !outcome.converged {
            report.status = if !rank_ok || outcome.stalled {
                SolveStatus::Inconsistent
            } else {
                SolveStatus::DidntConverge
            };
            if config.find_bad_constraints {
                report.bad_constraints =
                    unsatisfied_constraints(&system, &newton, &residuals, config.tolerance);
            }
            warn!(
                "{}: {:?} after {} iterations, residual {:e}",
                group, report.status, report.iterations, report.residual
            );
            return Ok(report);
        }

        let jacobian = newton.jacobian(&system, &x, None);
        let rank = linalg::rank(&jacobian, config.rank_tolerance);
        report.dof = Some(n - rank);
        let values = system.resolved_values();

        if rank == m {
            if config.find_free_params {
                report.free_params = (0..n)
                    .filter(|j| {
                        let without = newton.jacobian(&system, &x, Some(*j));
                        linalg::rank(&without, config.rank_tolerance) == m
                    })
                    .map(|j| newton.unknowns[j])
                    .collect();
            }
        } else {
            report.status = SolveStatus::RedundantOkay;
            if config.find_bad_constraints {
                report.bad_constraints =
                    self.redundant_constraints(sketch, group, &system.dragged, &values)?;
            }
            warn!("{}: redundant equations, rank {} of {}", group, rank, m);
        }

        sketch.commit(group, &values, n - rank);
        info!(
            "{}: {:?} in {} iterations, {} dof",
            group, report.status, report.iterations, n - rank
        );
        Ok(report)
    }

    /// Damped Newton iteration on `x`
    fn iterate(
        &self,
        newton: &NewtonSystem,
        system: &EquationSystem,
        x: &mut DVector<f64>,
    ) -> Iteration {
        let config = &self.config;
        let scale = newton.scale(config.dragged_scale);
        let mut f = newton.residuals(system, x);
        let mut history = vec![max_abs(&f)];
        let mut outcome = Iteration {
            converged: false,
            stalled: false,
            iterations: 0,
        };

        loop {
            if is_converged(&f, config.tolerance) {
                outcome.converged = true;
                break;
            }
            outcome.stalled = is_stalled(&history, config.stall_window, config.stall_ratio);
            if outcome.iterations >= config.max_iterations || outcome.stalled {
                break;
            }
            if newton.unknown_count() == 0 {
                debug!("Residual left with nothing to move");
                break;
            }

            let jacobian = newton.jacobian(system, x, None);
            let Some(step) = linalg::least_squares_step(&jacobian, &f, &scale) else {
                debug!("Newton step is not finite");
                break;
            };
            *x -= step * config.damping;
            outcome.iterations += 1;
            f = newton.residuals(system, x);

            if out_of_range(x) || out_of_range(&f) {
                debug!("Values left the usable range");
                break;
            }
            history.push(max_abs(&f));
            trace!("Iteration {}: residual {:e}", outcome.iterations, max_abs(&f));
        }
        outcome
    }

    /// Constraints of `group` whose removal makes the equations independent
    ///
    /// Coincidence constraints are tried last, since removing one usually
    /// frees two or three equations at once.
    fn redundant_constraints(
        &self,
        sketch: &Sketch,
        group: GroupId,
        dragged: &BTreeSet<ParamId>,
        values: &BTreeMap<ParamId, f64>,
    ) -> SketchResult<Vec<ConstraintId>> {
        let mut scratch = sketch.clone();
        scratch.commit(group, values, 0);

        let (coincident, others): (Vec<_>, Vec<_>) = scratch
            .constraints_in(group)
            .partition(|c| c.is_coincidence());
        let candidates: Vec<ConstraintId> = others
            .into_iter()
            .chain(coincident)
            .map(|c| c.id)
            .collect();

        let mut bad = Vec::new();
        for id in candidates {
            let mut system =
                EquationSystem::assemble_excluding(&scratch, group, dragged, Some(id))?;
            system.substitute();
            let newton = system.newton_system();
            let x = newton.initial(&system);
            let jacobian = newton.jacobian(&system, &x, None);
            if linalg::rank(&jacobian, self.config.rank_tolerance) == newton.equation_count() {
                bad.push(id);
            }
        }
        Ok(bad)
    }
}

/// Constraints with an equation still violated, worst first
fn unsatisfied_constraints(
    system: &EquationSystem,
    newton: &NewtonSystem,
    residuals: &DVector<f64>,
    tolerance: f64,
) -> Vec<ConstraintId> {
    let mut worst: BTreeMap<ConstraintId, f64> = BTreeMap::new();
    for (row, f) in newton.rows.iter().zip(residuals.iter()) {
        let EquationSource::Constraint(id) = system.equations[*row].source else {
            continue;
        };
        let r = if f.is_nan() { f64::INFINITY } else { f.abs() };
        if r > tolerance {
            let entry = worst.entry(id).or_insert(0.0);
            *entry = entry.max(r);
        }
    }
    let mut ranked: Vec<(ConstraintId, f64)> = worst.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(id, _)| id).collect()
}

fn max_abs(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |m, x| if x.is_nan() { f64::NAN } else { m.max(x.abs()) })
}

fn is_converged(f: &DVector<f64>, tolerance: f64) -> bool {
    f.iter().all(|v| v.abs() <= tolerance)
}

fn out_of_range(v: &DVector<f64>) -> bool {
    v.iter().any(|x| x.is_nan() || x.abs() > VALUE_LIMIT)
}

/// No progress over the last `window` iterations compared to before
fn is_stalled(history: &[f64], window: usize, ratio: f64) -> bool {
    if window == 0 || history.len() <= window {
        return false;
    }
    let (earlier, recent) = history.split_at(history.len() - window);
    let best = |s: &[f64]| s.iter().copied().fold(f64::INFINITY, f64::min);
    best(recent) > ratio * best(earlier)
}
