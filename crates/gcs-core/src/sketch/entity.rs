//! Sketch Entities
//!
//! Entities are the geometric objects of a sketch. Points, normals and
//! distances own parameters; lines, curves and workplanes are built from
//! other entities and own none.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::{Sketch, SketchError, SketchResult};
use crate::handle::{ConstraintId, EntityId, GroupId, ParamId};
use crate::math::{make_quaternion, quaternion_components};

/// Who created a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamOwner {
    /// A point, normal or distance
    Entity(EntityId),
    /// An auxiliary unknown introduced by a constraint
    Constraint(ConstraintId),
}

/// A scalar unknown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Handle
    pub id: ParamId,
    /// Group that solves for this parameter
    pub group: GroupId,
    /// Entity or constraint this parameter belongs to
    pub owner: ParamOwner,
    /// Current value
    pub value: f64,
}

/// Shape of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    // ============== Parameter Owners ==============
    /// Point in 3D space (x, y, z)
    Point3d {
        /// x, y, z
        params: [ParamId; 3],
    },

    /// Point in a workplane, in the workplane's (u, v) basis
    Point2d {
        /// u, v
        params: [ParamId; 2],
    },

    /// Orientation given by a unit quaternion
    Normal3d {
        /// w, x, y, z
        params: [ParamId; 4],
    },

    /// The normal of the entity's workplane
    Normal2d,

    /// Scalar length, used as a circle radius
    Distance {
        /// Length
        param: ParamId,
    },

    // ============== Composite Entities ==============
    /// 2D coordinate frame
    Workplane {
        /// Origin point (3D)
        origin: EntityId,
        /// Orientation (3D normal)
        normal: EntityId,
    },

    /// Line segment between two points
    Line {
        /// Endpoints
        points: [EntityId; 2],
    },

    /// Cubic Bézier curve
    Cubic {
        /// Start point, two control points, end point
        points: [EntityId; 4],
    },

    /// Full circle
    Circle {
        /// Center point
        center: EntityId,
        /// Plane orientation
        normal: EntityId,
        /// Distance entity holding the radius
        radius: EntityId,
    },

    /// Counter-clockwise arc from `start` to `end` around `center`
    Arc {
        /// Plane orientation
        normal: EntityId,
        /// Center point
        center: EntityId,
        /// First endpoint (defines the radius)
        start: EntityId,
        /// Second endpoint
        end: EntityId,
    },
}

/// A geometric entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Handle
    pub id: EntityId,
    /// Owning group
    pub group: GroupId,
    /// Workplane the entity lives in, `None` when free in 3D
    pub workplane: Option<EntityId>,
    /// Shape and references
    pub kind: EntityKind,
}

impl Entity {
    /// Get the type name of this entity
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            EntityKind::Point3d { .. } => "Point 3D",
            EntityKind::Point2d { .. } => "Point 2D",
            EntityKind::Normal3d { .. } => "Normal 3D",
            EntityKind::Normal2d => "Normal 2D",
            EntityKind::Distance { .. } => "Distance",
            EntityKind::Workplane { .. } => "Workplane",
            EntityKind::Line { .. } => "Line",
            EntityKind::Cubic { .. } => "Cubic",
            EntityKind::Circle { .. } => "Circle",
            EntityKind::Arc { .. } => "Arc",
        }
    }

    /// Parameters owned by this entity, in their defined order
    pub fn params(&self) -> Vec<ParamId> {
        match &self.kind {
            EntityKind::Point3d { params } => params.to_vec(),
            EntityKind::Point2d { params } => params.to_vec(),
            EntityKind::Normal3d { params } => params.to_vec(),
            EntityKind::Distance { param } => vec![*param],
            _ => Vec::new(),
        }
    }

    /// Get all entity IDs referenced by this entity, its workplane included
    pub fn referenced_entities(&self) -> Vec<EntityId> {
        let mut refs: Vec<EntityId> = self.workplane.into_iter().collect();
        match &self.kind {
            EntityKind::Workplane { origin, normal } => refs.extend([*origin, *normal]),
            EntityKind::Line { points } => refs.extend(points),
            EntityKind::Cubic { points } => refs.extend(points),
            EntityKind::Circle {
                center,
                normal,
                radius,
            } => refs.extend([*center, *normal, *radius]),
            EntityKind::Arc {
                normal,
                center,
                start,
                end,
            } => refs.extend([*normal, *center, *start, *end]),
            _ => {}
        }
        refs
    }

    /// Check if this entity references a specific entity
    pub fn references_entity(&self, entity_id: EntityId) -> bool {
        self.referenced_entities().contains(&entity_id)
    }

    pub fn is_point(&self) -> bool {
        matches!(
            self.kind,
            EntityKind::Point3d { .. } | EntityKind::Point2d { .. }
        )
    }

    pub fn is_point_2d(&self) -> bool {
        matches!(self.kind, EntityKind::Point2d { .. })
    }

    pub fn is_point_3d(&self) -> bool {
        matches!(self.kind, EntityKind::Point3d { .. })
    }

    pub fn is_normal(&self) -> bool {
        matches!(self.kind, EntityKind::Normal3d { .. } | EntityKind::Normal2d)
    }

    pub fn is_normal_3d(&self) -> bool {
        matches!(self.kind, EntityKind::Normal3d { .. })
    }

    pub fn is_distance(&self) -> bool {
        matches!(self.kind, EntityKind::Distance { .. })
    }

    pub fn is_workplane(&self) -> bool {
        matches!(self.kind, EntityKind::Workplane { .. })
    }

    pub fn is_line(&self) -> bool {
        matches!(self.kind, EntityKind::Line { .. })
    }

    /// A line segment drawn in a workplane
    pub fn is_line_2d(&self) -> bool {
        self.is_line() && self.workplane.is_some()
    }

    pub fn is_cubic(&self) -> bool {
        matches!(self.kind, EntityKind::Cubic { .. })
    }

    pub fn is_arc(&self) -> bool {
        matches!(self.kind, EntityKind::Arc { .. })
    }

    /// Circle or arc
    pub fn is_circle(&self) -> bool {
        matches!(self.kind, EntityKind::Circle { .. } | EntityKind::Arc { .. })
    }

    /// Entities with a direction vector (lines and normals)
    pub fn has_vector(&self) -> bool {
        self.is_line() || self.is_normal()
    }

    /// Endpoints of a line, arc or cubic, in (start, end) order
    pub fn endpoints(&self) -> Option<(EntityId, EntityId)> {
        match &self.kind {
            EntityKind::Line { points } => Some((points[0], points[1])),
            EntityKind::Cubic { points } => Some((points[0], points[3])),
            EntityKind::Arc { start, end, .. } => Some((*start, *end)),
            _ => None,
        }
    }
}

// ============== Entity Creation ==============

impl Sketch {
    /// Add a point in 3D space
    pub fn add_point_3d(&mut self, group: GroupId, position: DVec3) -> SketchResult<EntityId> {
        check_finite(&[position.x, position.y, position.z])?;
        let id = self.allocate_entity_id();
        let params = [
            self.new_entity_param(group, id, position.x),
            self.new_entity_param(group, id, position.y),
            self.new_entity_param(group, id, position.z),
        ];
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: None,
            kind: EntityKind::Point3d { params },
        }))
    }

    /// Add a point in a workplane at `(u, v)` in the workplane's basis
    pub fn add_point_2d(
        &mut self,
        group: GroupId,
        workplane: EntityId,
        u: f64,
        v: f64,
    ) -> SketchResult<EntityId> {
        check_finite(&[u, v])?;
        self.require_entity(group, workplane, "workplane", "a workplane", Entity::is_workplane)?;
        let id = self.allocate_entity_id();
        let params = [
            self.new_entity_param(group, id, u),
            self.new_entity_param(group, id, v),
        ];
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: Some(workplane),
            kind: EntityKind::Point2d { params },
        }))
    }

    /// Add a normal from a rotation. The quaternion is normalized.
    pub fn add_normal_3d(&mut self, group: GroupId, orientation: DQuat) -> SketchResult<EntityId> {
        let [w, x, y, z] = quaternion_components(orientation);
        check_finite(&[w, x, y, z])?;
        if orientation.length_squared() == 0.0 {
            return Err(SketchError::InvalidValue(
                "normal quaternion must not be zero".into(),
            ));
        }
        let [w, x, y, z] = quaternion_components(orientation.normalize());
        let id = self.allocate_entity_id();
        let params = [
            self.new_entity_param(group, id, w),
            self.new_entity_param(group, id, x),
            self.new_entity_param(group, id, y),
            self.new_entity_param(group, id, z),
        ];
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: None,
            kind: EntityKind::Normal3d { params },
        }))
    }

    /// Add a normal whose U and V basis vectors are `u` and `v`
    pub fn add_normal_from_basis(
        &mut self,
        group: GroupId,
        u: DVec3,
        v: DVec3,
    ) -> SketchResult<EntityId> {
        self.add_normal_3d(group, make_quaternion(u, v))
    }

    /// Add a normal that follows a workplane's orientation
    pub fn add_normal_2d(&mut self, group: GroupId, workplane: EntityId) -> SketchResult<EntityId> {
        self.require_entity(group, workplane, "workplane", "a workplane", Entity::is_workplane)?;
        let id = self.allocate_entity_id();
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: Some(workplane),
            kind: EntityKind::Normal2d,
        }))
    }

    /// Add a scalar distance, used as a circle radius
    pub fn add_distance(
        &mut self,
        group: GroupId,
        workplane: EntityId,
        value: f64,
    ) -> SketchResult<EntityId> {
        check_finite(&[value])?;
        self.require_entity(group, workplane, "workplane", "a workplane", Entity::is_workplane)?;
        let id = self.allocate_entity_id();
        let param = self.new_entity_param(group, id, value);
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: Some(workplane),
            kind: EntityKind::Distance { param },
        }))
    }

    /// Add a workplane from a 3D origin point and a 3D normal
    pub fn add_workplane(
        &mut self,
        group: GroupId,
        origin: EntityId,
        normal: EntityId,
    ) -> SketchResult<EntityId> {
        self.require_entity(group, origin, "origin", "a 3d point", Entity::is_point_3d)?;
        self.require_entity(group, normal, "normal", "a 3d normal", Entity::is_normal_3d)?;
        let id = self.allocate_entity_id();
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: None,
            kind: EntityKind::Workplane { origin, normal },
        }))
    }

    /// Add the XY workplane through the origin, with its point and normal,
    /// all in `group`
    pub fn add_base_2d(&mut self, group: GroupId) -> SketchResult<EntityId> {
        let normal = self.add_normal_from_basis(group, DVec3::X, DVec3::Y)?;
        let origin = self.add_point_3d(group, DVec3::ZERO)?;
        self.add_workplane(group, origin, normal)
    }

    /// Add a line segment between two points of a workplane
    pub fn add_line_2d(
        &mut self,
        group: GroupId,
        workplane: EntityId,
        a: EntityId,
        b: EntityId,
    ) -> SketchResult<EntityId> {
        self.require_entity(group, workplane, "workplane", "a workplane", Entity::is_workplane)?;
        self.require_point_in(group, workplane, a, "point", "Line")?;
        self.require_point_in(group, workplane, b, "point", "Line")?;
        let id = self.allocate_entity_id();
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: Some(workplane),
            kind: EntityKind::Line { points: [a, b] },
        }))
    }

    /// Add a line segment between two 3D points
    pub fn add_line_3d(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
    ) -> SketchResult<EntityId> {
        self.require_entity(group, a, "point", "a 3d point", Entity::is_point_3d)?;
        self.require_entity(group, b, "point", "a 3d point", Entity::is_point_3d)?;
        let id = self.allocate_entity_id();
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: None,
            kind: EntityKind::Line { points: [a, b] },
        }))
    }

    /// Add a cubic Bézier through `points[0]` and `points[3]`, with
    /// `points[1]` and `points[2]` as control points
    pub fn add_cubic(
        &mut self,
        group: GroupId,
        workplane: EntityId,
        points: [EntityId; 4],
    ) -> SketchResult<EntityId> {
        self.require_entity(group, workplane, "workplane", "a workplane", Entity::is_workplane)?;
        for point in points {
            self.require_point_in(group, workplane, point, "point", "Cubic")?;
        }
        let id = self.allocate_entity_id();
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: Some(workplane),
            kind: EntityKind::Cubic { points },
        }))
    }

    /// Add an arc around `center` from `start` to `end`, counter-clockwise
    /// about `normal`
    pub fn add_arc(
        &mut self,
        group: GroupId,
        workplane: EntityId,
        normal: EntityId,
        center: EntityId,
        start: EntityId,
        end: EntityId,
    ) -> SketchResult<EntityId> {
        self.require_entity(group, workplane, "workplane", "a workplane", Entity::is_workplane)?;
        self.require_entity(group, normal, "normal", "a 3d normal", Entity::is_normal_3d)?;
        self.require_point_in(group, workplane, center, "center", "Arc")?;
        self.require_point_in(group, workplane, start, "start", "Arc")?;
        self.require_point_in(group, workplane, end, "end", "Arc")?;
        let id = self.allocate_entity_id();
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: Some(workplane),
            kind: EntityKind::Arc {
                normal,
                center,
                start,
                end,
            },
        }))
    }

    /// Add a circle around `center` whose radius is the distance entity
    /// `radius`
    pub fn add_circle(
        &mut self,
        group: GroupId,
        workplane: EntityId,
        normal: EntityId,
        center: EntityId,
        radius: EntityId,
    ) -> SketchResult<EntityId> {
        self.require_entity(group, workplane, "workplane", "a workplane", Entity::is_workplane)?;
        self.require_entity(group, normal, "normal", "a 3d normal", Entity::is_normal_3d)?;
        self.require_point_in(group, workplane, center, "center", "Circle")?;
        self.require_entity(group, radius, "radius", "a distance", Entity::is_distance)?;
        let id = self.allocate_entity_id();
        Ok(self.insert_entity(Entity {
            id,
            group,
            workplane: Some(workplane),
            kind: EntityKind::Circle {
                center,
                normal,
                radius,
            },
        }))
    }

    /// A 2D point that lives in `workplane`
    fn require_point_in(
        &self,
        group: GroupId,
        workplane: EntityId,
        point: EntityId,
        role: &'static str,
        operation: &'static str,
    ) -> SketchResult<()> {
        let entity = self.require_entity(group, point, role, "a 2d point", Entity::is_point_2d)?;
        if entity.workplane != Some(workplane) {
            return Err(SketchError::InvalidArguments(operation));
        }
        Ok(())
    }
}

fn check_finite(values: &[f64]) -> SketchResult<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(v) => Err(SketchError::InvalidValue(format!(
            "initial value must be finite, got {v}"
        ))),
        None => Ok(()),
    }
}
