//! Entity Expressions
//!
//! Symbolic positions, directions and distances of entities, shared by the
//! constraint translator and the implicit entity equations.

use std::f64::consts::PI;

use glam::DVec3;

use super::{ConstraintKind, Entity, EntityKind, Sketch, SketchError, SketchResult};
use crate::expr::{Expr, ExprQuaternion, ExprVector};
use crate::handle::{EntityId, GroupId};

/// Orthonormal frame of a workplane as expressions
pub(crate) struct WorkplaneFrame {
    pub origin: ExprVector,
    pub u: ExprVector,
    pub v: ExprVector,
    pub n: ExprVector,
}

impl Sketch {
    fn wrong_kind(&self, id: EntityId, role: &'static str, expected: &'static str) -> SketchError {
        match self.entity(id) {
            Ok(entity) => SketchError::WrongEntityKind {
                entity: id,
                role,
                expected,
                found: entity.type_name(),
            },
            Err(err) => err,
        }
    }

    fn own_workplane(&self, entity: &Entity) -> SketchResult<EntityId> {
        entity
            .workplane
            .ok_or(SketchError::WorkplaneRequired(entity.type_name()))
    }

    // ============== Points ==============

    /// Position of a point in 3D
    pub(crate) fn point_exprs(&self, point: EntityId) -> SketchResult<ExprVector> {
        let entity = self.entity(point)?;
        match entity.kind {
            EntityKind::Point3d { params: [x, y, z] } => Ok(ExprVector::from_params(x, y, z)),
            EntityKind::Point2d { params: [u, v] } => {
                let frame = self.workplane_frame(self.own_workplane(entity)?)?;
                Ok(frame
                    .origin
                    .plus(&frame.u.scaled_by(&Expr::param(u)))
                    .plus(&frame.v.scaled_by(&Expr::param(v))))
            }
            _ => Err(self.wrong_kind(point, "point", "a point")),
        }
    }

    /// Coordinates of a point in the basis of `workplane`
    ///
    /// A point drawn in that same workplane yields its own parameters.
    pub(crate) fn point_in_workplane(
        &self,
        point: EntityId,
        workplane: EntityId,
    ) -> SketchResult<(Expr, Expr)> {
        let entity = self.entity(point)?;
        if let EntityKind::Point2d { params: [u, v] } = entity.kind {
            if entity.workplane == Some(workplane) {
                return Ok((Expr::param(u), Expr::param(v)));
            }
        }
        let frame = self.workplane_frame(workplane)?;
        let rel = self.point_exprs(point)?.minus(&frame.origin);
        Ok((rel.dot(&frame.u), rel.dot(&frame.v)))
    }

    /// Point as a 3-vector: its 3D position, or `(u, v, 0)` in `workplane`
    pub(crate) fn point_in(
        &self,
        point: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ExprVector> {
        match workplane {
            None => self.point_exprs(point),
            Some(wp) => {
                let (u, v) = self.point_in_workplane(point, wp)?;
                Ok(ExprVector::new(u, v, Expr::constant(0.0)))
            }
        }
    }

    /// Map workplane coordinates back to 3D
    pub(crate) fn point_in_three_space(
        &self,
        workplane: EntityId,
        u: Expr,
        v: Expr,
    ) -> SketchResult<ExprVector> {
        let frame = self.workplane_frame(workplane)?;
        Ok(frame
            .u
            .scaled_by(&u)
            .plus(&frame.v.scaled_by(&v))
            .plus(&frame.origin))
    }

    // ============== Normals & Workplanes ==============

    pub(crate) fn normal_quaternion(&self, normal: EntityId) -> SketchResult<ExprQuaternion> {
        let entity = self.entity(normal)?;
        match entity.kind {
            EntityKind::Normal3d { params } => Ok(ExprQuaternion::from_params(params)),
            EntityKind::Normal2d => {
                let wp = self.own_workplane(entity)?;
                self.normal_quaternion(self.workplane_normal(wp)?)
            }
            _ => Err(self.wrong_kind(normal, "normal", "a normal")),
        }
    }

    pub(crate) fn normal_n(&self, normal: EntityId) -> SketchResult<ExprVector> {
        Ok(self.normal_quaternion(normal)?.rotation_n())
    }

    fn workplane_parts(&self, workplane: EntityId) -> SketchResult<(EntityId, EntityId)> {
        match self.entity(workplane)?.kind {
            EntityKind::Workplane { origin, normal } => Ok((origin, normal)),
            _ => Err(self.wrong_kind(workplane, "workplane", "a workplane")),
        }
    }

    pub(crate) fn workplane_normal(&self, workplane: EntityId) -> SketchResult<EntityId> {
        Ok(self.workplane_parts(workplane)?.1)
    }

    pub(crate) fn workplane_frame(&self, workplane: EntityId) -> SketchResult<WorkplaneFrame> {
        let (origin, normal) = self.workplane_parts(workplane)?;
        let q = self.normal_quaternion(normal)?;
        Ok(WorkplaneFrame {
            origin: self.point_exprs(origin)?,
            u: q.rotation_u(),
            v: q.rotation_v(),
            n: q.rotation_n(),
        })
    }

    /// Signed distance of `point` from the plane of `workplane`
    pub(crate) fn point_plane_distance(
        &self,
        point: &ExprVector,
        workplane: EntityId,
    ) -> SketchResult<Expr> {
        let frame = self.workplane_frame(workplane)?;
        let d = frame.origin.dot(&frame.n);
        Ok(point.dot(&frame.n) - d)
    }

    // ============== Directions ==============

    /// Direction of a line (`point0 − point1`) or the N axis of a normal, in 3D
    pub(crate) fn vector_exprs(&self, id: EntityId) -> SketchResult<ExprVector> {
        self.vector_in(id, None)
    }

    /// Direction of a line or normal, projected into `workplane` when given
    pub(crate) fn vector_in(
        &self,
        id: EntityId,
        workplane: Option<EntityId>,
    ) -> SketchResult<ExprVector> {
        let entity = self.entity(id)?;
        match entity.kind {
            EntityKind::Line { points: [a, b] } => {
                Ok(self.point_in(a, workplane)?.minus(&self.point_in(b, workplane)?))
            }
            EntityKind::Normal3d { .. } | EntityKind::Normal2d => {
                let n = self.normal_n(id)?;
                match workplane {
                    None => Ok(n),
                    Some(wp) => {
                        let frame = self.workplane_frame(wp)?;
                        Ok(ExprVector::new(
                            n.dot(&frame.u),
                            n.dot(&frame.v),
                            Expr::constant(0.0),
                        ))
                    }
                }
            }
            _ => Err(self.wrong_kind(id, "direction", "a line or normal")),
        }
    }

    /// Cosine of the angle between two vectors, measured in `workplane`
    /// when given
    pub(crate) fn direction_cosine(
        &self,
        workplane: Option<EntityId>,
        a: &ExprVector,
        b: &ExprVector,
    ) -> SketchResult<Expr> {
        match workplane {
            None => Ok(a.dot(b) / (a.magnitude() * b.magnitude())),
            Some(wp) => {
                let frame = self.workplane_frame(wp)?;
                let (ua, va) = (a.dot(&frame.u), a.dot(&frame.v));
                let (ub, vb) = (b.dot(&frame.u), b.dot(&frame.v));
                let maga = (ua.clone().square() + va.clone().square()).sqrt();
                let magb = (ub.clone().square() + vb.clone().square()).sqrt();
                Ok((ua * ub + va * vb) / (maga * magb))
            }
        }
    }

    /// Tangent direction of a cubic at its start (`p0 − p1`) or end (`p3 − p2`)
    pub(crate) fn cubic_tangent(&self, cubic: EntityId, at_end: bool) -> SketchResult<ExprVector> {
        match self.entity(cubic)?.kind {
            EntityKind::Cubic { points } => {
                let (from, to) = if at_end {
                    (points[3], points[2])
                } else {
                    (points[0], points[1])
                };
                Ok(self.point_exprs(from)?.minus(&self.point_exprs(to)?))
            }
            _ => Err(self.wrong_kind(cubic, "curve", "a cubic")),
        }
    }

    // ============== Distances ==============

    /// Distance between two points, measured in `workplane` when given
    pub(crate) fn distance_expr(
        &self,
        workplane: Option<EntityId>,
        a: EntityId,
        b: EntityId,
    ) -> SketchResult<Expr> {
        match workplane {
            None => Ok(self.point_exprs(a)?.minus(&self.point_exprs(b)?).magnitude()),
            Some(wp) => {
                let (au, av) = self.point_in_workplane(a, wp)?;
                let (bu, bv) = self.point_in_workplane(b, wp)?;
                Ok(((au - bu).square() + (av - bv).square()).sqrt())
            }
        }
    }

    /// Length of a line segment, measured in `workplane` when given
    pub(crate) fn line_length(
        &self,
        workplane: Option<EntityId>,
        line: EntityId,
    ) -> SketchResult<Expr> {
        let [a, b] = self.line_points(line)?;
        self.distance_expr(workplane, a, b)
    }

    pub(crate) fn line_points(&self, line: EntityId) -> SketchResult<[EntityId; 2]> {
        match self.entity(line)?.kind {
            EntityKind::Line { points } => Ok(points),
            _ => Err(self.wrong_kind(line, "line", "a line")),
        }
    }

    /// Distance from a point to a line; signed when measured in a workplane
    pub(crate) fn point_line_distance(
        &self,
        workplane: Option<EntityId>,
        point: EntityId,
        line: EntityId,
    ) -> SketchResult<Expr> {
        let [la, lb] = self.line_points(line)?;
        match workplane {
            None => {
                let a = self.point_exprs(la)?;
                let b = self.point_exprs(lb)?;
                let p = self.point_exprs(point)?;
                let ab = a.minus(&b);
                Ok(ab.cross(&a.minus(&p)).magnitude() / ab.magnitude())
            }
            Some(wp) => {
                let (ua, va) = self.point_in_workplane(la, wp)?;
                let (ub, vb) = self.point_in_workplane(lb, wp)?;
                let (u, v) = self.point_in_workplane(point, wp)?;
                let du = ua.clone() - ub;
                let dv = va.clone() - vb;
                let m = (du.clone().square() + dv.clone().square()).sqrt();
                Ok((dv * (ua - u) - du * (va - v)) / m)
            }
        }
    }

    /// Radius of a circle or arc
    pub(crate) fn circle_radius(&self, circle: EntityId) -> SketchResult<Expr> {
        let entity = self.entity(circle)?;
        match entity.kind {
            EntityKind::Circle { radius, .. } => match self.entity(radius)?.kind {
                EntityKind::Distance { param } => Ok(Expr::param(param)),
                _ => Err(self.wrong_kind(radius, "radius", "a distance")),
            },
            EntityKind::Arc { center, start, .. } => {
                self.distance_expr(entity.workplane, center, start)
            }
            _ => Err(self.wrong_kind(circle, "circle", "a circle or arc")),
        }
    }

    /// Center point and normal of a circle or arc
    pub(crate) fn circle_center_normal(
        &self,
        circle: EntityId,
    ) -> SketchResult<(EntityId, EntityId)> {
        match self.entity(circle)?.kind {
            EntityKind::Circle { center, normal, .. } | EntityKind::Arc { center, normal, .. } => {
                Ok((center, normal))
            }
            _ => Err(self.wrong_kind(circle, "circle", "a circle or arc")),
        }
    }

    // ============== Numeric Helpers ==============

    /// Start angle, end angle and counter-clockwise sweep of an arc,
    /// measured in the basis of its normal
    pub(crate) fn arc_angles(&self, arc: EntityId) -> SketchResult<(f64, f64, f64)> {
        let EntityKind::Arc {
            normal,
            center,
            start,
            end,
        } = self.entity(arc)?.kind
        else {
            return Err(self.wrong_kind(arc, "arc", "an arc"));
        };
        let q = self.normal_quaternion(normal)?;
        let (u, v) = (q.rotation_u().eval(self), q.rotation_v().eval(self));
        let c = self.point_position(center)?;
        let angle = |p: DVec3| {
            let d = p - c;
            d.dot(v).atan2(d.dot(u))
        };
        let theta_a = angle(self.point_position(start)?);
        let theta_b = angle(self.point_position(end)?);
        let mut dtheta = theta_b - theta_a;
        while dtheta < 1e-6 {
            dtheta += 2.0 * PI;
        }
        while dtheta > 2.0 * PI {
            dtheta -= 2.0 * PI;
        }
        Ok((theta_a, theta_b, dtheta))
    }

    // ============== Implicit Equations ==============

    /// Equations an entity needs to stay well formed
    ///
    /// A 3D normal keeps a unit quaternion. An arc keeps its end on the
    /// circle through its start, unless start and end are constrained
    /// coincident in the arc's own group.
    pub(crate) fn entity_equations(&self, entity: &Entity) -> SketchResult<Vec<Expr>> {
        match entity.kind {
            EntityKind::Normal3d { params } => {
                let q = ExprQuaternion::from_params(params);
                Ok(vec![q.magnitude() - Expr::constant(1.0)])
            }
            EntityKind::Arc {
                center, start, end, ..
            } => {
                let joined = self.endpoints_joined(entity.group, start, end);
                if !self.entity(center)?.is_point_2d() || joined {
                    return Ok(Vec::new());
                }
                let wp = entity.workplane;
                let ra = self.distance_expr(wp, center, start)?;
                let rb = self.distance_expr(wp, center, end)?;
                Ok(vec![ra - rb])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn endpoints_joined(&self, group: GroupId, a: EntityId, b: EntityId) -> bool {
        self.constraints_in(group).any(|c| match c.kind {
            ConstraintKind::PointsCoincident { a: ca, b: cb } => {
                (ca == a && cb == b) || (ca == b && cb == a)
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn base() -> (Sketch, EntityId) {
        let mut sketch = Sketch::new();
        let wp = sketch.add_base_2d(GroupId::new(1)).unwrap();
        (sketch, wp)
    }

    #[test]
    fn test_point_in_foreign_workplane() {
        let mut sketch = Sketch::new();
        let g = GroupId::new(1);
        let origin = sketch.add_point_3d(g, DVec3::new(0.0, 0.0, 5.0)).unwrap();
        let normal = sketch.add_normal_from_basis(g, DVec3::Y, DVec3::Z).unwrap();
        let wp = sketch.add_workplane(g, origin, normal).unwrap();
        let p = sketch.add_point_3d(g, DVec3::new(1.0, 2.0, 3.0)).unwrap();

        let (u, v) = sketch.point_in_workplane(p, wp).unwrap();
        assert_relative_eq!(u.eval(&sketch), 2.0, epsilon = 1e-12);
        assert_relative_eq!(v.eval(&sketch), -2.0, epsilon = 1e-12);
        let d = sketch
            .point_plane_distance(&sketch.point_exprs(p).unwrap(), wp)
            .unwrap();
        assert_relative_eq!(d.eval(&sketch), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_signed_point_line_distance() {
        let (mut sketch, wp) = base();
        let g = GroupId::new(2);
        let a = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let b = sketch.add_point_2d(g, wp, 10.0, 0.0).unwrap();
        let line = sketch.add_line_2d(g, wp, a, b).unwrap();
        let above = sketch.add_point_2d(g, wp, 3.0, 2.0).unwrap();
        let below = sketch.add_point_2d(g, wp, 3.0, -2.0).unwrap();

        let d_above = sketch.point_line_distance(Some(wp), above, line).unwrap();
        let d_below = sketch.point_line_distance(Some(wp), below, line).unwrap();
        assert_relative_eq!(d_above.eval(&sketch), -d_below.eval(&sketch), epsilon = 1e-12);
        assert_relative_eq!(d_above.eval(&sketch).abs(), 2.0, epsilon = 1e-12);

        let d_3d = sketch.point_line_distance(None, below, line).unwrap();
        assert_relative_eq!(d_3d.eval(&sketch), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_direction_cosine() {
        let (mut sketch, wp) = base();
        let g = GroupId::new(2);
        let p0 = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let p1 = sketch.add_point_2d(g, wp, 1.0, 1.0).unwrap();
        let p2 = sketch.add_point_2d(g, wp, 1.0, 0.0).unwrap();
        let l1 = sketch.add_line_2d(g, wp, p0, p1).unwrap();
        let l2 = sketch.add_line_2d(g, wp, p0, p2).unwrap();

        let a = sketch.vector_in(l1, Some(wp)).unwrap();
        let b = sketch.vector_in(l2, Some(wp)).unwrap();
        let c = sketch.direction_cosine(Some(wp), &a, &b).unwrap();
        assert_relative_eq!(c.eval(&sketch), 0.5f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_arc_angles_and_radius() {
        let (mut sketch, wp) = base();
        let g = GroupId::new(2);
        let normal = sketch.add_normal_from_basis(g, DVec3::X, DVec3::Y).unwrap();
        let c = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let s = sketch.add_point_2d(g, wp, 2.0, 0.0).unwrap();
        let e = sketch.add_point_2d(g, wp, 0.0, 2.0).unwrap();
        let arc = sketch.add_arc(g, wp, normal, c, s, e).unwrap();

        let (ta, tb, dtheta) = sketch.arc_angles(arc).unwrap();
        assert_relative_eq!(ta, 0.0, epsilon = 1e-12);
        assert_relative_eq!(tb, PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(dtheta, PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(sketch.circle_radius(arc).unwrap().eval(&sketch), 2.0);

        let eqs = sketch.entity_equations(sketch.entity(arc).unwrap()).unwrap();
        assert_eq!(eqs.len(), 1);
        assert_relative_eq!(eqs[0].eval(&sketch), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normal_keeps_unit_length() {
        let (sketch, wp) = base();
        let normal = sketch.workplane_normal(wp).unwrap();
        let eqs = sketch.entity_equations(sketch.entity(normal).unwrap()).unwrap();
        assert_eq!(eqs.len(), 1);
        assert_relative_eq!(eqs[0].eval(&sketch), 0.0);
    }
}
