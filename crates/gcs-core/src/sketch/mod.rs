//! Sketch System
//!
//! A [`Sketch`] owns every parameter, entity, constraint and group of one
//! solver session. Geometry is added through the `add_*` builders in
//! [`entity`], relations through the constraint builders in [`constrain`],
//! and each group is solved with [`Sketch::solve`].

pub mod constrain;
pub mod constraint;
pub mod entity;
pub mod geometry;

pub use constraint::{Constraint, ConstraintKind};
pub use entity::{Entity, EntityKind, Param, ParamOwner};

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SolverConfig;
use crate::expr::ParamValues;
use crate::handle::{ConstraintId, EntityId, GroupId, ParamId};
use crate::solver::{ConstraintSolver, SolveReport};

/// Sketch configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SketchError {
    #[error("Parameter not found: {0}")]
    ParamNotFound(ParamId),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Constraint not found: {0}")]
    ConstraintNotFound(ConstraintId),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("{role} argument {entity} must be {expected}, found {found}")]
    WrongEntityKind {
        entity: EntityId,
        role: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{entity} belongs to {entity_group}, which is solved after {group}")]
    LaterGroup {
        entity: EntityId,
        entity_group: GroupId,
        group: GroupId,
    },

    #[error("{0} requires a workplane")]
    WorkplaneRequired(&'static str),

    #[error("{0} must be free in 3D")]
    WorkplaneNotAllowed(&'static str),

    #[error("Invalid arguments for {0}")]
    InvalidArguments(&'static str),

    #[error("{a} and {b} share no endpoint")]
    NoSharedEndpoint { a: EntityId, b: EntityId },

    #[error("{group} is still referenced by {user}")]
    GroupInUse { group: GroupId, user: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type for sketch operations
pub type SketchResult<T> = Result<T, SketchError>;

/// Solve state of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Handle
    pub id: GroupId,
    /// Whether the last solve converged and nothing changed since
    pub solved: bool,
    /// Degrees of freedom reported by the last successful solve
    pub dof: Option<usize>,
}

impl Group {
    fn new(id: GroupId) -> Self {
        Self {
            id,
            solved: false,
            dof: None,
        }
    }
}

/// Entities, constraints and parameters of one solver session
///
/// Cloning a sketch produces a fully independent copy, suitable for
/// what-if solves.
#[derive(Debug, Clone, Default)]
pub struct Sketch {
    params: BTreeMap<ParamId, Param>,
    entities: BTreeMap<EntityId, Entity>,
    constraints: BTreeMap<ConstraintId, Constraint>,
    groups: BTreeMap<GroupId, Group>,
    next_param: u32,
    next_entity: u32,
    next_constraint: u32,
    config: SolverConfig,
}

impl Sketch {
    /// Create an empty sketch with the default solver configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sketch that solves with `config`
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Solve `group`, treating parameters of earlier groups as constants
    ///
    /// New values are written back only when the solve converges.
    ///
    /// # Errors
    ///
    /// Returns error if the group is unknown or the sketch is malformed.
    /// Numeric failures are reported through [`SolveReport::status`].
    pub fn solve(&mut self, group: GroupId) -> SketchResult<SolveReport> {
        self.solve_dragged(group, &[])
    }

    /// Solve `group` with `dragged` as extra unknowns, even when they belong
    /// to earlier groups
    ///
    /// Dragged parameters move less per Newton step than the rest, so a
    /// point being dragged follows the cursor while the others adapt.
    pub fn solve_dragged(
        &mut self,
        group: GroupId,
        dragged: &[ParamId],
    ) -> SketchResult<SolveReport> {
        let mut set = BTreeSet::new();
        for id in dragged {
            self.param(*id)?;
            set.insert(*id);
        }
        ConstraintSolver::new(self.config.clone()).solve(self, group, &set)
    }

    // ============== Parameters ==============

    pub fn param(&self, id: ParamId) -> SketchResult<&Param> {
        self.params.get(&id).ok_or(SketchError::ParamNotFound(id))
    }

    pub fn param_value(&self, id: ParamId) -> SketchResult<f64> {
        Ok(self.param(id)?.value)
    }

    /// Overwrite a parameter value. The owning group and every later group
    /// become unsolved.
    pub fn set_param_value(&mut self, id: ParamId, value: f64) -> SketchResult<()> {
        if !value.is_finite() {
            return Err(SketchError::InvalidValue(format!(
                "{id} must be finite, got {value}"
            )));
        }
        let param = self.params.get_mut(&id).ok_or(SketchError::ParamNotFound(id))?;
        param.value = value;
        let group = param.group;
        self.mark_unsolved(group);
        Ok(())
    }

    /// Iterate over all parameters in id order
    pub fn params_iter(&self) -> impl Iterator<Item = &Param> {
        self.params.values()
    }

    // ============== Entities ==============

    pub fn entity(&self, id: EntityId) -> SketchResult<&Entity> {
        self.entities.get(&id).ok_or(SketchError::EntityNotFound(id))
    }

    /// Iterate over all entities in id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities owned by `group`
    pub fn entities_in(&self, group: GroupId) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.group == group)
    }

    /// Parameter handles of an entity
    pub fn entity_params(&self, id: EntityId) -> SketchResult<Vec<ParamId>> {
        Ok(self.entity(id)?.params())
    }

    /// Current parameter values of an entity, in parameter order
    pub fn params(&self, id: EntityId) -> SketchResult<Vec<f64>> {
        self.entity_params(id)?
            .into_iter()
            .map(|p| self.param_value(p))
            .collect()
    }

    /// Current 3D position of a point
    pub fn point_position(&self, id: EntityId) -> SketchResult<DVec3> {
        Ok(self.point_exprs(id)?.eval(self))
    }

    // ============== Constraints ==============

    pub fn constraint(&self, id: ConstraintId) -> SketchResult<&Constraint> {
        self.constraints
            .get(&id)
            .ok_or(SketchError::ConstraintNotFound(id))
    }

    /// Iterate over all constraints in id order
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    /// Constraints owned by `group`
    pub fn constraints_in(&self, group: GroupId) -> impl Iterator<Item = &Constraint> {
        self.constraints.values().filter(move |c| c.group == group)
    }

    // ============== Groups ==============

    pub fn group(&self, id: GroupId) -> SketchResult<&Group> {
        self.groups.get(&id).ok_or(SketchError::GroupNotFound(id))
    }

    /// Iterate over groups in solve order
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Register a group. Groups are also created implicitly on first use.
    pub fn create_group(&mut self, id: GroupId) -> GroupId {
        self.groups.entry(id).or_insert_with(|| Group::new(id));
        id
    }

    /// Remove a group with its entities, constraints and parameters
    ///
    /// # Errors
    ///
    /// Returns error if the group is unknown or an item of another group
    /// still references one of its entities.
    pub fn remove_group(&mut self, id: GroupId) -> SketchResult<()> {
        self.group(id)?;

        let doomed: BTreeSet<EntityId> = self.entities_in(id).map(|e| e.id).collect();
        if let Some(user) = self
            .entities
            .values()
            .filter(|e| e.group != id)
            .find(|e| e.referenced_entities().iter().any(|r| doomed.contains(r)))
        {
            return Err(SketchError::GroupInUse {
                group: id,
                user: user.id.to_string(),
            });
        }
        if let Some(user) = self
            .constraints
            .values()
            .filter(|c| c.group != id)
            .find(|c| c.referenced_entities().iter().any(|r| doomed.contains(r)))
        {
            return Err(SketchError::GroupInUse {
                group: id,
                user: user.id.to_string(),
            });
        }

        self.entities.retain(|_, e| e.group != id);
        self.constraints.retain(|_, c| c.group != id);
        self.params.retain(|_, p| p.group != id);
        self.groups.remove(&id);
        self.mark_unsolved(id);
        Ok(())
    }

    /// Remove everything. Handles are not reused.
    pub fn clear(&mut self) {
        self.params.clear();
        self.entities.clear();
        self.constraints.clear();
        self.groups.clear();
    }

    // ============== Internal Bookkeeping ==============

    pub(crate) fn allocate_entity_id(&mut self) -> EntityId {
        self.next_entity += 1;
        EntityId::new(self.next_entity)
    }

    pub(crate) fn allocate_constraint_id(&mut self) -> ConstraintId {
        self.next_constraint += 1;
        ConstraintId::new(self.next_constraint)
    }

    fn new_param(&mut self, group: GroupId, owner: ParamOwner, value: f64) -> ParamId {
        self.next_param += 1;
        let id = ParamId::new(self.next_param);
        self.params.insert(
            id,
            Param {
                id,
                group,
                owner,
                value,
            },
        );
        id
    }

    pub(crate) fn new_entity_param(
        &mut self,
        group: GroupId,
        owner: EntityId,
        value: f64,
    ) -> ParamId {
        self.new_param(group, ParamOwner::Entity(owner), value)
    }

    pub(crate) fn new_constraint_param(
        &mut self,
        group: GroupId,
        owner: ConstraintId,
        value: f64,
    ) -> ParamId {
        self.new_param(group, ParamOwner::Constraint(owner), value)
    }

    pub(crate) fn insert_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id;
        self.touch_group(entity.group);
        self.entities.insert(id, entity);
        id
    }

    pub(crate) fn insert_constraint(&mut self, constraint: Constraint) -> ConstraintId {
        let id = constraint.id;
        self.touch_group(constraint.group);
        self.constraints.insert(id, constraint);
        id
    }

    /// Look up an argument entity, check its kind, and check that `group`
    /// is allowed to reference it
    pub(crate) fn require_entity(
        &self,
        group: GroupId,
        id: EntityId,
        role: &'static str,
        expected: &'static str,
        is_kind: impl Fn(&Entity) -> bool,
    ) -> SketchResult<&Entity> {
        let entity = self.entity(id)?;
        if !is_kind(entity) {
            return Err(SketchError::WrongEntityKind {
                entity: id,
                role,
                expected,
                found: entity.type_name(),
            });
        }
        if entity.group > group {
            return Err(SketchError::LaterGroup {
                entity: id,
                entity_group: entity.group,
                group,
            });
        }
        Ok(entity)
    }

    fn touch_group(&mut self, group: GroupId) {
        self.create_group(group);
        self.mark_unsolved(group);
    }

    fn mark_unsolved(&mut self, from: GroupId) {
        for group in self.groups.range_mut(from..).map(|(_, g)| g) {
            group.solved = false;
        }
    }

    /// Write solved values back and record the group's result
    pub(crate) fn commit(&mut self, group: GroupId, values: &BTreeMap<ParamId, f64>, dof: usize) {
        for (id, value) in values {
            if let Some(param) = self.params.get_mut(id) {
                param.value = *value;
            }
        }
        if let Some(g) = self.groups.range(group..).nth(1).map(|(id, _)| *id) {
            self.mark_unsolved(g);
        }
        let entry = self.groups.entry(group).or_insert_with(|| Group::new(group));
        entry.solved = true;
        entry.dof = Some(dof);
    }
}

impl ParamValues for Sketch {
    fn value(&self, param: ParamId) -> f64 {
        self.params.get(&param).map_or(f64::NAN, |p| p.value)
    }
}
