//! Constraint Builders
//!
//! One method per relation. Each checks that its arguments have the right
//! kinds and may be referenced from the target group, picks the constraint
//! kind that fits the argument types, and seeds any auxiliary parameter so
//! the constraint starts as close to satisfied as possible.

use glam::DVec3;

use super::{Constraint, ConstraintKind, Entity, Sketch, SketchError, SketchResult};
use crate::constants::ENDPOINT_MATCH_DISTANCE;
use crate::handle::{ConstraintId, EntityId, GroupId};

impl Sketch {
    fn check_workplane(&self, group: GroupId, workplane: Option<EntityId>) -> SketchResult<()> {
        if let Some(wp) = workplane {
            self.require_entity(group, wp, "workplane", "a workplane", Entity::is_workplane)?;
        }
        Ok(())
    }

    fn add_constraint(
        &mut self,
        group: GroupId,
        workplane: Option<EntityId>,
        kind: ConstraintKind,
    ) -> ConstraintId {
        let id = self.allocate_constraint_id();
        self.insert_constraint(Constraint {
            id,
            group,
            workplane,
            kind,
        })
    }

    /// Numeric direction of a line or normal, in workplane coordinates when
    /// given
    fn vector_value(&self, id: EntityId, workplane: Option<EntityId>) -> SketchResult<DVec3> {
        Ok(self.vector_in(id, workplane)?.eval(self))
    }

    fn points_match(&self, a: EntityId, b: EntityId) -> SketchResult<bool> {
        if a == b {
            return Ok(true);
        }
        let d = self.point_position(a)?.distance(self.point_position(b)?);
        Ok(d < ENDPOINT_MATCH_DISTANCE)
    }

    // ============== Incidence ==============

    /// Make two entities coincide
    ///
    /// - point, point: the points are at the same location
    /// - point, workplane: the point lies in the plane (3D only)
    /// - point, line: the point lies on the line
    /// - point, circle or arc: the point lies on the curve
    pub fn coincident(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        let point = self.require_entity(group, a, "first", "a point", Entity::is_point)?.id;
        let expected = "a point, workplane, line or circle";
        let other = self.require_entity(group, b, "second", expected, |e| {
            e.is_point() || e.is_workplane() || e.is_line() || e.is_circle()
        })?;

        let kind = if other.is_point() {
            ConstraintKind::PointsCoincident { a: point, b }
        } else if other.is_workplane() {
            if workplane.is_some() {
                return Err(SketchError::WorkplaneNotAllowed("Point In Plane"));
            }
            ConstraintKind::PointInPlane { point, plane: b }
        } else if other.is_line() {
            let [la, lb] = self.line_points(b)?;
            let ea = self.point_in(la, workplane)?.eval(self);
            let eb = self.point_in(lb, workplane)?.eval(self);
            let ep = self.point_in(point, workplane)?.eval(self);
            let d = eb - ea;
            let t = if d.length_squared() > 0.0 {
                d.dot(ep - ea) / d.length_squared()
            } else {
                0.0
            };
            let id = self.allocate_constraint_id();
            let t = self.new_constraint_param(group, id, t);
            return Ok(self.insert_constraint(Constraint {
                id,
                group,
                workplane,
                kind: ConstraintKind::PointOnLine { point, line: b, t },
            }));
        } else {
            ConstraintKind::PointOnCircle { point, circle: b }
        };
        Ok(self.add_constraint(group, workplane, kind))
    }

    // ============== Distances ==============

    /// Fix the distance between a point and a point, workplane or line
    ///
    /// The distance to a workplane is signed and measured in 3D; the
    /// distance to a line is signed when measured in a workplane.
    pub fn distance(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        value: f64,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        let point = self.require_entity(group, a, "first", "a point", Entity::is_point)?.id;
        let other = self.require_entity(group, b, "second", "a point, workplane or line", |e| {
            e.is_point() || e.is_workplane() || e.is_line()
        })?;

        let kind = if other.is_point() {
            ConstraintKind::PointPointDistance {
                a: point,
                b,
                distance: value,
            }
        } else if other.is_workplane() {
            if workplane.is_some() {
                return Err(SketchError::WorkplaneNotAllowed("Point-Plane Distance"));
            }
            ConstraintKind::PointPlaneDistance {
                point,
                plane: b,
                distance: value,
            }
        } else {
            ConstraintKind::PointLineDistance {
                point,
                line: b,
                distance: value,
            }
        };
        Ok(self.add_constraint(group, workplane, kind))
    }

    /// Fix the distance between two points measured along a line or normal
    pub fn projected_distance(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        direction: EntityId,
        value: f64,
    ) -> SketchResult<ConstraintId> {
        self.require_entity(group, a, "first", "a point", Entity::is_point)?;
        self.require_entity(group, b, "second", "a point", Entity::is_point)?;
        self.require_entity(group, direction, "direction", "a line or normal", Entity::has_vector)?;
        Ok(self.add_constraint(
            group,
            None,
            ConstraintKind::ProjectedPointDistance {
                a,
                b,
                direction,
                distance: value,
            },
        ))
    }

    // ============== Lengths & Radii ==============

    /// Make two lengths equal
    ///
    /// - line, line: equal length
    /// - line, arc or circle (either order): line length equals arc length
    /// - arc or circle, arc or circle: equal radius
    pub fn equal(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        let is_length = |e: &Entity| e.is_line() || e.is_circle();
        let ea = self.require_entity(group, a, "first", "a line, circle or arc", is_length)?;
        let eb = self.require_entity(group, b, "second", "a line, circle or arc", is_length)?;

        let kind = match (ea.is_line(), eb.is_line()) {
            (true, true) => ConstraintKind::EqualLength { a, b },
            (true, false) => ConstraintKind::EqualLineArcLength { line: a, arc: b },
            (false, true) => ConstraintKind::EqualLineArcLength { line: b, arc: a },
            (false, false) => ConstraintKind::EqualRadius { a, b },
        };
        Ok(self.add_constraint(group, workplane, kind))
    }

    /// Make the angle between `a` and `b` equal the angle between `c` and `d`
    #[allow(clippy::too_many_arguments)]
    pub fn equal_angle(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        c: EntityId,
        d: EntityId,
        inverse: bool,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        for id in [a, b, c, d] {
            self.require_entity(group, id, "direction", "a line or normal", Entity::has_vector)?;
        }
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::EqualAngle {
                a,
                b,
                c,
                d,
                inverse,
            },
        ))
    }

    /// Make the distance from `point_a` to `line_a` equal the distance from
    /// `point_b` to `line_b`
    pub fn equal_point_to_line(
        &mut self,
        group: GroupId,
        point_a: EntityId,
        line_a: EntityId,
        point_b: EntityId,
        line_b: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, point_a, "point", "a point", Entity::is_point)?;
        self.require_entity(group, line_a, "line", "a line", Entity::is_line)?;
        self.require_entity(group, point_b, "point", "a point", Entity::is_point)?;
        self.require_entity(group, line_b, "line", "a line", Entity::is_line)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::EqualPointLineDistances {
                point_a,
                line_a,
                point_b,
                line_b,
            },
        ))
    }

    /// Make the length of `line` equal the distance from `point` to
    /// `other_line`
    pub fn equal_length_point_line_distance(
        &mut self,
        group: GroupId,
        line: EntityId,
        point: EntityId,
        other_line: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, line, "line", "a line", Entity::is_line)?;
        self.require_entity(group, point, "point", "a point", Entity::is_point)?;
        self.require_entity(group, other_line, "line", "a line", Entity::is_line)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::EqualLengthPointLineDistance {
                line,
                point,
                other_line,
            },
        ))
    }

    /// Fix the ratio of two line lengths, `a / b`
    pub fn ratio(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        value: f64,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, a, "first", "a line", Entity::is_line)?;
        self.require_entity(group, b, "second", "a line", Entity::is_line)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::LengthRatio { a, b, ratio: value },
        ))
    }

    /// Fix the difference of two line lengths, `a − b`
    pub fn length_difference(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        value: f64,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, a, "first", "a line", Entity::is_line)?;
        self.require_entity(group, b, "second", "a line", Entity::is_line)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::LengthDifference {
                a,
                b,
                difference: value,
            },
        ))
    }

    /// Fix the diameter of a circle or arc
    pub fn diameter(
        &mut self,
        group: GroupId,
        circle: EntityId,
        value: f64,
    ) -> SketchResult<ConstraintId> {
        self.require_entity(group, circle, "circle", "a circle or arc", Entity::is_circle)?;
        Ok(self.add_constraint(
            group,
            None,
            ConstraintKind::Diameter {
                circle,
                diameter: value,
            },
        ))
    }

    // ============== Symmetry ==============

    /// Make two points mirror images across a workplane or a line
    ///
    /// Mirroring across a line happens inside a workplane, which is then
    /// required. Points drawn in a workplane mirror across a plane within
    /// their own workplane unless another one is given.
    pub fn symmetric(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        about: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        let ea = self.require_entity(group, a, "first", "a point", Entity::is_point)?;
        let (a_2d, a_wp) = (ea.is_point_2d(), ea.workplane);
        let b_2d = self
            .require_entity(group, b, "second", "a point", Entity::is_point)?
            .is_point_2d();
        let mirror = self.require_entity(group, about, "mirror", "a workplane or line", |e| {
            e.is_workplane() || e.is_line()
        })?;

        if mirror.is_line() {
            let wp = workplane.ok_or(SketchError::WorkplaneRequired("Symmetric Line"))?;
            return Ok(self.add_constraint(
                group,
                Some(wp),
                ConstraintKind::SymmetricLine { a, b, line: about },
            ));
        }

        let workplane = match workplane {
            Some(wp) => Some(wp),
            None if a_2d && b_2d => a_wp,
            None => None,
        };
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::Symmetric { a, b, plane: about },
        ))
    }

    /// Make two points mirror images across the workplane's V axis
    pub fn symmetric_horizontal(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, Some(workplane))?;
        self.require_entity(group, a, "first", "a 2d point", Entity::is_point_2d)?;
        self.require_entity(group, b, "second", "a 2d point", Entity::is_point_2d)?;
        Ok(self.add_constraint(
            group,
            Some(workplane),
            ConstraintKind::SymmetricHorizontal { a, b },
        ))
    }

    /// Make two points mirror images across the workplane's U axis
    pub fn symmetric_vertical(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, Some(workplane))?;
        self.require_entity(group, a, "first", "a 2d point", Entity::is_point_2d)?;
        self.require_entity(group, b, "second", "a 2d point", Entity::is_point_2d)?;
        Ok(self.add_constraint(
            group,
            Some(workplane),
            ConstraintKind::SymmetricVertical { a, b },
        ))
    }

    /// Put a point at the middle of a line
    pub fn midpoint(
        &mut self,
        group: GroupId,
        point: EntityId,
        line: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, point, "point", "a point", Entity::is_point)?;
        self.require_entity(group, line, "line", "a line", Entity::is_line)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::PointAtMidpoint { point, line },
        ))
    }

    /// Put the middle of a line in the plane of a workplane
    pub fn midpoint_on_plane(
        &mut self,
        group: GroupId,
        line: EntityId,
        plane: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, line, "line", "a line", Entity::is_line)?;
        self.require_entity(group, plane, "plane", "a workplane", Entity::is_workplane)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::MidpointInPlane { line, plane },
        ))
    }

    // ============== Orientation ==============

    /// Make a line parallel to the workplane's U axis
    pub fn horizontal(
        &mut self,
        group: GroupId,
        line: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, Some(workplane))?;
        self.require_entity(group, line, "line", "a 2d line", Entity::is_line_2d)?;
        let [a, b] = self.line_points(line)?;
        Ok(self.add_constraint(
            group,
            Some(workplane),
            ConstraintKind::Horizontal {
                line: Some(line),
                a,
                b,
            },
        ))
    }

    /// Make a line parallel to the workplane's V axis
    pub fn vertical(
        &mut self,
        group: GroupId,
        line: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, Some(workplane))?;
        self.require_entity(group, line, "line", "a 2d line", Entity::is_line_2d)?;
        let [a, b] = self.line_points(line)?;
        Ok(self.add_constraint(
            group,
            Some(workplane),
            ConstraintKind::Vertical {
                line: Some(line),
                a,
                b,
            },
        ))
    }

    /// Give two points the same V coordinate
    pub fn horizontal_points(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, Some(workplane))?;
        self.require_entity(group, a, "first", "a 2d point", Entity::is_point_2d)?;
        self.require_entity(group, b, "second", "a 2d point", Entity::is_point_2d)?;
        Ok(self.add_constraint(
            group,
            Some(workplane),
            ConstraintKind::Horizontal { line: None, a, b },
        ))
    }

    /// Give two points the same U coordinate
    pub fn vertical_points(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, Some(workplane))?;
        self.require_entity(group, a, "first", "a 2d point", Entity::is_point_2d)?;
        self.require_entity(group, b, "second", "a 2d point", Entity::is_point_2d)?;
        Ok(self.add_constraint(
            group,
            Some(workplane),
            ConstraintKind::Vertical { line: None, a, b },
        ))
    }

    /// Make two normals describe the same orientation
    pub fn same_orientation(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
    ) -> SketchResult<ConstraintId> {
        self.require_entity(group, a, "first", "a 3d normal", Entity::is_normal_3d)?;
        self.require_entity(group, b, "second", "a 3d normal", Entity::is_normal_3d)?;
        let seed = parallel_scale(self.vector_value(a, None)?, self.vector_value(b, None)?);
        let id = self.allocate_constraint_id();
        let scale = self.new_constraint_param(group, id, seed);
        Ok(self.insert_constraint(Constraint {
            id,
            group,
            workplane: None,
            kind: ConstraintKind::SameOrientation { a, b, scale },
        }))
    }

    /// Fix the angle between two lines or normals, in degrees
    ///
    /// With `inverse`, the angle is measured against the reversed direction
    /// of `a`.
    pub fn angle(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        degrees: f64,
        inverse: bool,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, a, "first", "a line or normal", Entity::has_vector)?;
        self.require_entity(group, b, "second", "a line or normal", Entity::has_vector)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::Angle {
                a,
                b,
                degrees,
                inverse,
            },
        ))
    }

    /// Make two lines or normals perpendicular
    pub fn perpendicular(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        inverse: bool,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, a, "first", "a line or normal", Entity::has_vector)?;
        self.require_entity(group, b, "second", "a line or normal", Entity::has_vector)?;
        Ok(self.add_constraint(
            group,
            workplane,
            ConstraintKind::Perpendicular { a, b, inverse },
        ))
    }

    /// Make two lines or normals parallel
    pub fn parallel(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, a, "first", "a line or normal", Entity::has_vector)?;
        self.require_entity(group, b, "second", "a line or normal", Entity::has_vector)?;

        let id = self.allocate_constraint_id();
        let scale = match workplane {
            Some(_) => None,
            None => {
                let seed = parallel_scale(self.vector_value(a, None)?, self.vector_value(b, None)?);
                Some(self.new_constraint_param(group, id, seed))
            }
        };
        Ok(self.insert_constraint(Constraint {
            id,
            group,
            workplane,
            kind: ConstraintKind::Parallel { a, b, scale },
        }))
    }

    // ============== Tangency ==============

    /// Make two curves tangent where they share an endpoint
    ///
    /// - arc, line: needs a workplane
    /// - cubic, line: in a workplane, or free in 3D
    /// - arc or cubic, arc or cubic: needs a workplane
    pub fn tangent(
        &mut self,
        group: GroupId,
        a: EntityId,
        b: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        let is_curve = |e: &Entity| e.is_arc() || e.is_cubic() || e.is_line();
        let ea = self
            .require_entity(group, a, "first", "an arc, cubic or line", is_curve)?
            .clone();
        let eb = self
            .require_entity(group, b, "second", "an arc, cubic or line", is_curve)?
            .clone();

        // Put the line, if any, second.
        let (ea, eb) = if ea.is_line() { (eb, ea) } else { (ea, eb) };
        let (a, b) = (ea.id, eb.id);
        if ea.is_line() {
            return Err(SketchError::InvalidArguments("Tangent"));
        }

        let (a_start, a_end) = ea.endpoints().ok_or(SketchError::InvalidArguments("Tangent"))?;
        let (b_start, b_end) = eb.endpoints().ok_or(SketchError::InvalidArguments("Tangent"))?;

        if eb.is_line() {
            let at_start =
                self.points_match(a_start, b_start)? || self.points_match(a_start, b_end)?;
            let at_end = if at_start {
                false
            } else if self.points_match(a_end, b_start)? || self.points_match(a_end, b_end)? {
                true
            } else {
                return Err(SketchError::NoSharedEndpoint { a, b });
            };

            if ea.is_arc() {
                let wp = workplane.ok_or(SketchError::WorkplaneRequired("Arc-Line Tangent"))?;
                return Ok(self.add_constraint(
                    group,
                    Some(wp),
                    ConstraintKind::ArcLineTangent { arc: a, line: b, at_end },
                ));
            }

            let id = self.allocate_constraint_id();
            let scale = match workplane {
                Some(_) => None,
                None => {
                    let tangent = self.cubic_tangent(a, at_end)?.eval(self);
                    let seed = parallel_scale(tangent, self.vector_value(b, None)?);
                    Some(self.new_constraint_param(group, id, seed))
                }
            };
            return Ok(self.insert_constraint(Constraint {
                id,
                group,
                workplane,
                kind: ConstraintKind::CubicLineTangent {
                    cubic: a,
                    line: b,
                    at_end,
                    scale,
                },
            }));
        }

        let wp = workplane.ok_or(SketchError::WorkplaneRequired("Curve-Curve Tangent"))?;
        let (a_at_end, b_at_end) = if self.points_match(a_start, b_start)? {
            (false, false)
        } else if self.points_match(a_start, b_end)? {
            (false, true)
        } else if self.points_match(a_end, b_start)? {
            (true, false)
        } else if self.points_match(a_end, b_end)? {
            (true, true)
        } else {
            return Err(SketchError::NoSharedEndpoint { a, b });
        };
        Ok(self.add_constraint(
            group,
            Some(wp),
            ConstraintKind::CurveCurveTangent {
                a,
                b,
                a_at_end,
                b_at_end,
            },
        ))
    }

    // ============== Dragging ==============

    /// Pin a point where it is each time equations are written
    pub fn dragged(
        &mut self,
        group: GroupId,
        point: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ConstraintId> {
        self.check_workplane(group, workplane)?;
        self.require_entity(group, point, "point", "a point", Entity::is_point)?;
        Ok(self.add_constraint(group, workplane, ConstraintKind::WhereDragged { point }))
    }
}

/// Scale `s` minimizing `|a − b·s|`
fn parallel_scale(a: DVec3, b: DVec3) -> f64 {
    let len2 = b.length_squared();
    if len2 > 0.0 { a.dot(b) / len2 } else { 0.0 }
}
