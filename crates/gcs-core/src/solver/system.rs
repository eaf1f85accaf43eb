//! Equation System
//!
//! Collects the equations and unknowns for one group, freezes everything
//! solved earlier into constants, and shrinks the problem before Newton
//! iteration: parameters forced equal are merged, and equations in a single
//! unknown are solved on their own.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::expr::{Expr, ReferencedParams};
use crate::handle::{ConstraintId, EntityId, GroupId, ParamId};
use crate::sketch::{Sketch, SketchResult};

/// Where an equation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquationSource {
    /// A user constraint
    Constraint(ConstraintId),
    /// The implicit equations of an entity
    Entity(EntityId),
}

/// One residual equation
#[derive(Debug, Clone)]
pub struct Equation {
    pub source: EquationSource,
    /// Group of the constraint or entity that produced it
    pub group: GroupId,
    pub expr: Expr,
}

/// Equations and unknowns assembled for one group
#[derive(Debug, Clone)]
pub struct EquationSystem {
    pub group: GroupId,
    pub equations: Vec<Equation>,
    /// Free parameters with their working values
    pub values: BTreeMap<ParamId, f64>,
    /// Free parameters marked dragged
    pub dragged: BTreeSet<ParamId>,
    /// Parameters merged into another one, mapped to their representative
    pub substituted: BTreeMap<ParamId, ParamId>,
    /// Parameters fixed by an equation of their own
    pub solved_alone: BTreeSet<ParamId>,
    /// Indices of equations no longer part of the Newton system
    pub retired: BTreeSet<usize>,
}

impl EquationSystem {
    /// Write, freeze and filter the equations of `group`
    ///
    /// Parameters of `group` are unknowns, as are dragged parameters of
    /// earlier groups. Everything else is folded into constants. Equations
    /// left without unknowns are dropped when they come from an earlier
    /// group and kept otherwise, so the rank test can flag them.
    pub fn assemble(
        sketch: &Sketch,
        group: GroupId,
        dragged: &BTreeSet<ParamId>,
    ) -> SketchResult<Self> {
        Self::assemble_excluding(sketch, group, dragged, None)
    }

    /// Like [`EquationSystem::assemble`], leaving out one constraint
    pub fn assemble_excluding(
        sketch: &Sketch,
        group: GroupId,
        dragged: &BTreeSet<ParamId>,
        excluded: Option<ConstraintId>,
    ) -> SketchResult<Self> {
        let mut values = BTreeMap::new();
        let mut free_dragged = BTreeSet::new();
        for param in sketch.params_iter() {
            let is_dragged = dragged.contains(&param.id) && param.group <= group;
            if param.group == group || is_dragged {
                values.insert(param.id, param.value);
            }
            if is_dragged {
                free_dragged.insert(param.id);
            }
        }

        let mut written = Vec::new();
        let included = |id: ConstraintId| excluded != Some(id);
        for constraint in sketch
            .constraints()
            .filter(|c| c.group <= group && included(c.id))
        {
            for expr in constraint.equations(sketch)? {
                written.push(Equation {
                    source: EquationSource::Constraint(constraint.id),
                    group: constraint.group,
                    expr,
                });
            }
        }
        for entity in sketch.entities().filter(|e| e.group <= group) {
            for expr in sketch.entity_equations(entity)? {
                written.push(Equation {
                    source: EquationSource::Entity(entity.id),
                    group: entity.group,
                    expr,
                });
            }
        }

        let frozen = |p: ParamId| {
            if values.contains_key(&p) {
                None
            } else {
                Some(sketch.param_value(p).unwrap_or(f64::NAN))
            }
        };
        let total = written.len();
        let equations: Vec<Equation> = written
            .into_iter()
            .map(|eq| Equation {
                expr: eq.expr.freeze(&frozen).fold_constants(),
                ..eq
            })
            .filter(|eq| {
                eq.group == group || eq.expr.referenced_params() != ReferencedParams::None
            })
            .collect();

        debug!(
            "Assembled {}: {} equations ({} frozen out), {} unknowns, {} dragged",
            group,
            equations.len(),
            total - equations.len(),
            values.len(),
            free_dragged.len()
        );

        Ok(Self {
            group,
            equations,
            values,
            dragged: free_dragged,
            substituted: BTreeMap::new(),
            solved_alone: BTreeSet::new(),
            retired: BTreeSet::new(),
        })
    }

    /// Free parameters that appear in at least one equation
    pub fn referenced_unknowns(&self) -> BTreeSet<ParamId> {
        let mut used = BTreeSet::new();
        for eq in &self.equations {
            eq.expr.params_used(&mut used);
        }
        used.retain(|p| self.values.contains_key(p));
        used
    }

    /// Merge parameters tied by equations of the form `a − b`
    ///
    /// The equation is retired and `a` is replaced by `b` everywhere, unless
    /// `a` is dragged, in which case `a` is kept instead.
    pub fn substitute(&mut self) {
        for i in 0..self.equations.len() {
            if self.retired.contains(&i) {
                continue;
            }
            let Some((a, b)) = self.equations[i].expr.as_param_difference() else {
                continue;
            };
            if !self.values.contains_key(&a) || !self.values.contains_key(&b) {
                continue;
            }
            self.retired.insert(i);
            if a == b {
                continue;
            }
            let (gone, keep) = if self.dragged.contains(&a) && !self.dragged.contains(&b) {
                (b, a)
            } else {
                (a, b)
            };

            for target in self.substituted.values_mut() {
                if *target == gone {
                    *target = keep;
                }
            }
            self.substituted.insert(gone, keep);
            let rename = BTreeMap::from([(gone, keep)]);
            for eq in &mut self.equations {
                eq.expr.substitute(&rename);
            }
            trace!("Substituted {} by {}", gone, keep);
        }
        if !self.substituted.is_empty() {
            debug!("Substitution removed {} unknowns", self.substituted.len());
        }
    }

    /// Solve equations in exactly one untouched unknown by themselves
    ///
    /// Returns the index of the first equation that could not be solved.
    pub fn solve_alone(&mut self, tolerance: f64, max_iterations: usize) -> Result<(), usize> {
        for i in 0..self.equations.len() {
            if self.retired.contains(&i) {
                continue;
            }
            let ReferencedParams::One(p) = self.equations[i].expr.referenced_params() else {
                continue;
            };
            if self.solved_alone.contains(&p) || self.substituted.contains_key(&p) {
                continue;
            }
            let Some(start) = self.values.get(&p).copied() else {
                continue;
            };

            let expr = &self.equations[i].expr;
            let derivative = expr.partial_wrt(p).fold_constants();
            let mut x = start;
            let mut converged = false;
            for _ in 0..max_iterations {
                let at = |q: ParamId| if q == p { x } else { f64::NAN };
                let f = expr.eval(&at);
                if f.abs() <= tolerance {
                    converged = true;
                    break;
                }
                let d = derivative.eval(&at);
                if !(d.is_finite() && d != 0.0 && f.is_finite()) {
                    break;
                }
                x -= f / d;
            }
            if !converged {
                let at = |q: ParamId| if q == p { x } else { f64::NAN };
                converged = expr.eval(&at).abs() <= tolerance;
            }
            if !converged {
                return Err(i);
            }

            trace!("Solved {} alone: {}", p, x);
            self.values.insert(p, x);
            self.solved_alone.insert(p);
            self.retired.insert(i);
        }
        if !self.solved_alone.is_empty() {
            debug!("{} unknowns solved alone", self.solved_alone.len());
        }
        Ok(())
    }

    /// Value lookup for evaluation: working values for free parameters
    pub fn value(&self, param: ParamId) -> f64 {
        let param = self.substituted.get(&param).copied().unwrap_or(param);
        self.values.get(&param).copied().unwrap_or(f64::NAN)
    }

    /// The Newton system left after substitution and the alone pass
    pub fn newton_system(&self) -> NewtonSystem {
        let unknowns: Vec<ParamId> = self
            .values
            .keys()
            .copied()
            .filter(|p| !self.substituted.contains_key(p) && !self.solved_alone.contains(p))
            .collect();
        let rows: Vec<usize> = (0..self.equations.len())
            .filter(|i| !self.retired.contains(i))
            .collect();
        NewtonSystem::new(self, unknowns, rows)
    }

    /// Write Newton results back into the working values
    pub fn store(&mut self, system: &NewtonSystem, x: &DVector<f64>) {
        for (p, v) in system.unknowns.iter().zip(x.iter()) {
            self.values.insert(*p, *v);
        }
    }

    /// Final values of every free parameter, merged ones included
    pub fn resolved_values(&self) -> BTreeMap<ParamId, f64> {
        self.values
            .keys()
            .map(|p| (*p, self.value(*p)))
            .collect()
    }
}

/// Equations and unknowns iterated by Newton's method, with a symbolic
/// Jacobian
#[derive(Debug, Clone)]
pub struct NewtonSystem {
    /// Unknowns in column order
    pub unknowns: Vec<ParamId>,
    /// Indices into [`EquationSystem::equations`], in row order
    pub rows: Vec<usize>,
    exprs: Vec<Expr>,
    /// Non-zero partial derivatives per row, as (column, expression)
    jacobian: Vec<Vec<(usize, Expr)>>,
    dragged: Vec<bool>,
}

impl NewtonSystem {
    fn new(system: &EquationSystem, unknowns: Vec<ParamId>, rows: Vec<usize>) -> Self {
        let column: BTreeMap<ParamId, usize> =
            unknowns.iter().enumerate().map(|(j, p)| (*p, j)).collect();
        let exprs: Vec<Expr> = rows
            .iter()
            .map(|i| system.equations[*i].expr.clone())
            .collect();
        let jacobian = exprs
            .iter()
            .map(|expr| {
                let mut used = BTreeSet::new();
                expr.params_used(&mut used);
                used.into_iter()
                    .filter_map(|p| column.get(&p).map(|j| (*j, p)))
                    .map(|(j, p)| (j, expr.partial_wrt(p).fold_constants()))
                    .filter(|(_, d)| !d.is_zero_const())
                    .collect()
            })
            .collect();
        let dragged = unknowns.iter().map(|p| system.dragged.contains(p)).collect();
        Self {
            unknowns,
            rows,
            exprs,
            jacobian,
            dragged,
        }
    }

    pub fn equation_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn unknown_count(&self) -> usize {
        self.unknowns.len()
    }

    /// Current values of the unknowns
    pub fn initial(&self, system: &EquationSystem) -> DVector<f64> {
        DVector::from_iterator(
            self.unknowns.len(),
            self.unknowns.iter().map(|p| system.value(*p)),
        )
    }

    /// Per-column step scale
    pub fn scale(&self, dragged_scale: f64) -> DVector<f64> {
        DVector::from_iterator(
            self.dragged.len(),
            self.dragged
                .iter()
                .map(|d| if *d { dragged_scale } else { 1.0 }),
        )
    }

    /// Residuals at `x`, with everything outside the Newton system taken
    /// from `system`
    pub fn residuals(&self, system: &EquationSystem, x: &DVector<f64>) -> DVector<f64> {
        let lookup = self.lookup(system, x);
        DVector::from_iterator(self.exprs.len(), self.exprs.iter().map(|e| e.eval(&lookup)))
    }

    /// Jacobian at `x`, with the listed columns left out
    pub fn jacobian(
        &self,
        system: &EquationSystem,
        x: &DVector<f64>,
        skip_column: Option<usize>,
    ) -> DMatrix<f64> {
        let lookup = self.lookup(system, x);
        let ncols = self.unknowns.len() - usize::from(skip_column.is_some());
        let mut matrix = DMatrix::zeros(self.exprs.len(), ncols);
        for (i, row) in self.jacobian.iter().enumerate() {
            for (j, d) in row {
                let j = match skip_column {
                    Some(skip) if *j == skip => continue,
                    Some(skip) if *j > skip => j - 1,
                    _ => *j,
                };
                matrix[(i, j)] = d.eval(&lookup);
            }
        }
        matrix
    }

    fn lookup<'a>(
        &'a self,
        system: &'a EquationSystem,
        x: &'a DVector<f64>,
    ) -> impl Fn(ParamId) -> f64 + 'a {
        move |p: ParamId| match self.unknowns.binary_search(&p) {
            Ok(j) => x[j],
            Err(_) => system.value(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn g(raw: u32) -> GroupId {
        GroupId::new(raw)
    }

    #[test]
    fn test_earlier_groups_are_frozen() {
        let mut sketch = Sketch::new();
        let wp = sketch.add_base_2d(g(1)).unwrap();
        let a = sketch.add_point_2d(g(1), wp, 0.0, 0.0).unwrap();
        let b = sketch.add_point_2d(g(1), wp, 3.0, 0.0).unwrap();
        sketch.distance(g(1), a, b, 3.0, Some(wp)).unwrap();
        let p = sketch.add_point_2d(g(2), wp, 1.0, 1.0).unwrap();
        sketch.distance(g(2), a, p, 2.0, Some(wp)).unwrap();

        let system = EquationSystem::assemble(&sketch, g(2), &BTreeSet::new()).unwrap();
        assert_eq!(system.values.len(), 2);
        assert_eq!(system.equations.len(), 1);
        let mut used = BTreeSet::new();
        system.equations[0].expr.params_used(&mut used);
        assert_eq!(used, sketch.entity_params(p).unwrap().into_iter().collect());
    }

    #[test]
    fn test_referenced_unknowns_skip_unused_params() {
        let mut sketch = Sketch::new();
        let wp = sketch.add_base_2d(g(1)).unwrap();
        let a = sketch.add_point_2d(g(1), wp, 0.0, 0.0).unwrap();
        let p = sketch.add_point_2d(g(2), wp, 1.0, 1.0).unwrap();
        sketch.add_point_2d(g(2), wp, 5.0, 5.0).unwrap();
        sketch.add_point_2d(g(2), wp, 6.0, 6.0).unwrap();
        sketch.distance(g(2), a, p, 2.0, Some(wp)).unwrap();

        let system = EquationSystem::assemble(&sketch, g(2), &BTreeSet::new()).unwrap();
        assert_eq!(system.values.len(), 6);
        let used = system.referenced_unknowns();
        assert_eq!(used, sketch.entity_params(p).unwrap().into_iter().collect());
    }

    #[test]
    fn test_constant_equation_of_target_group_is_kept() {
        let mut sketch = Sketch::new();
        let a = sketch.add_point_3d(g(1), DVec3::ZERO).unwrap();
        let b = sketch.add_point_3d(g(1), DVec3::X).unwrap();
        sketch.distance(g(2), a, b, 5.0, None).unwrap();

        let system = EquationSystem::assemble(&sketch, g(2), &BTreeSet::new()).unwrap();
        assert_eq!(system.equations.len(), 1);
        assert_eq!(system.equations[0].expr.as_constant(), Some(-4.0));
    }

    #[test]
    fn test_substitution_merges_params() {
        let mut sketch = Sketch::new();
        let wp = sketch.add_base_2d(g(1)).unwrap();
        let a = sketch.add_point_2d(g(2), wp, 0.0, 0.0).unwrap();
        let b = sketch.add_point_2d(g(2), wp, 1.0, 5.0).unwrap();
        let c = sketch.add_point_2d(g(2), wp, 2.0, 7.0).unwrap();
        sketch.vertical_points(g(2), a, b, wp).unwrap();
        sketch.vertical_points(g(2), b, c, wp).unwrap();

        let mut system = EquationSystem::assemble(&sketch, g(2), &BTreeSet::new()).unwrap();
        system.substitute();
        assert_eq!(system.substituted.len(), 2);
        assert_eq!(system.retired.len(), 2);

        let ua = sketch.entity_params(a).unwrap()[0];
        let uc = sketch.entity_params(c).unwrap()[0];
        assert_eq!(system.substituted[&ua], uc);
        assert_eq!(system.value(ua), 2.0);
        assert_eq!(system.newton_system().unknown_count(), 4);
    }

    #[test]
    fn test_alone_pass() {
        let mut sketch = Sketch::new();
        let wp = sketch.add_base_2d(g(1)).unwrap();
        let p = sketch.add_point_2d(g(2), wp, 1.0, 2.0).unwrap();
        let r = sketch.add_distance(g(2), wp, 1.0).unwrap();
        sketch.dragged(g(2), p, Some(wp)).unwrap();
        let normal = sketch.add_normal_from_basis(g(2), DVec3::X, DVec3::Y).unwrap();
        let circle = sketch.add_circle(g(2), wp, normal, p, r).unwrap();
        sketch.diameter(g(2), circle, 6.0).unwrap();

        let mut system = EquationSystem::assemble(&sketch, g(2), &BTreeSet::new()).unwrap();
        system.substitute();
        system.solve_alone(1e-10, 50).unwrap();

        let rp = sketch.entity_params(r).unwrap()[0];
        assert!(system.solved_alone.contains(&rp));
        assert!((system.value(rp) - 3.0).abs() < 1e-10);
        // u, v of the pinned point and the radius
        assert_eq!(system.solved_alone.len(), 3);
        // the unit quaternion equation stays
        assert_eq!(system.newton_system().equation_count(), 1);
    }
}
