//! Sketch Constraints
//!
//! Defines geometric and dimensional constraints between sketch entities,
//! and translates each one into the residual equations the solver drives to
//! zero.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::{EntityKind, Sketch, SketchError, SketchResult};
use crate::constants::ANGLE_NEAR_PARALLEL_COS;
use crate::expr::{Expr, ExprVector};
use crate::handle::{ConstraintId, EntityId, GroupId, ParamId};

/// Relation enforced by a constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    // ============== Incidence ==============
    /// Two points are at the same location
    PointsCoincident {
        /// First point
        a: EntityId,
        /// Second point
        b: EntityId,
    },

    /// A point lies in the plane of a workplane
    PointInPlane {
        /// Point to constrain
        point: EntityId,
        /// Workplane
        plane: EntityId,
    },

    /// A point lies on the infinite line through a segment
    PointOnLine {
        /// Point to constrain
        point: EntityId,
        /// Line
        line: EntityId,
        /// Position along the line, 0 at the first endpoint
        t: ParamId,
    },

    /// A point lies on a circle or arc
    PointOnCircle {
        /// Point to constrain
        point: EntityId,
        /// Circle or arc
        circle: EntityId,
    },

    // ============== Distances ==============
    /// Distance between two points
    PointPointDistance {
        a: EntityId,
        b: EntityId,
        /// Target distance
        distance: f64,
    },

    /// Distance between two points measured along a direction
    ProjectedPointDistance {
        a: EntityId,
        b: EntityId,
        /// Line or normal giving the direction
        direction: EntityId,
        /// Target distance
        distance: f64,
    },

    /// Signed distance from a point to a workplane
    PointPlaneDistance {
        point: EntityId,
        plane: EntityId,
        /// Target distance
        distance: f64,
    },

    /// Distance from a point to a line (signed in a workplane)
    PointLineDistance {
        point: EntityId,
        line: EntityId,
        /// Target distance
        distance: f64,
    },

    // ============== Lengths & Radii ==============
    /// Two lines have the same length
    EqualLength { a: EntityId, b: EntityId },

    /// Length of `a` divided by length of `b`
    LengthRatio {
        a: EntityId,
        b: EntityId,
        /// Target ratio
        ratio: f64,
    },

    /// Length of `a` minus length of `b`
    LengthDifference {
        a: EntityId,
        b: EntityId,
        /// Target difference
        difference: f64,
    },

    /// Length of `line` equals the distance from `point` to `other_line`
    EqualLengthPointLineDistance {
        line: EntityId,
        point: EntityId,
        other_line: EntityId,
    },

    /// Two point-line distances are equal
    EqualPointLineDistances {
        point_a: EntityId,
        line_a: EntityId,
        point_b: EntityId,
        line_b: EntityId,
    },

    /// Length of a line equals the length of an arc (or circumference)
    EqualLineArcLength { line: EntityId, arc: EntityId },

    /// Two circles or arcs have the same radius
    EqualRadius { a: EntityId, b: EntityId },

    /// Diameter of a circle or arc
    Diameter {
        circle: EntityId,
        /// Target diameter
        diameter: f64,
    },

    // ============== Symmetry ==============
    /// Two points are mirror images across a workplane
    Symmetric {
        a: EntityId,
        b: EntityId,
        /// Mirror plane
        plane: EntityId,
    },

    /// Two points are mirror images across the workplane's V axis
    SymmetricHorizontal { a: EntityId, b: EntityId },

    /// Two points are mirror images across the workplane's U axis
    SymmetricVertical { a: EntityId, b: EntityId },

    /// Two points are mirror images across a line
    SymmetricLine {
        a: EntityId,
        b: EntityId,
        line: EntityId,
    },

    /// A point sits at the middle of a line
    PointAtMidpoint { point: EntityId, line: EntityId },

    /// The middle of a line lies in a workplane
    MidpointInPlane { line: EntityId, plane: EntityId },

    // ============== Orientation ==============
    /// Two points (or a line's endpoints) share their V coordinate
    Horizontal {
        /// Line the points came from, if any
        line: Option<EntityId>,
        a: EntityId,
        b: EntityId,
    },

    /// Two points (or a line's endpoints) share their U coordinate
    Vertical {
        /// Line the points came from, if any
        line: Option<EntityId>,
        a: EntityId,
        b: EntityId,
    },

    /// Two normals describe the same orientation
    SameOrientation {
        a: EntityId,
        b: EntityId,
        /// Scale between the two N axes
        scale: ParamId,
    },

    /// Angle between two lines or normals
    Angle {
        a: EntityId,
        b: EntityId,
        /// Target angle in degrees
        degrees: f64,
        /// Measure against the reversed direction of `a`
        inverse: bool,
    },

    /// Two lines or normals are perpendicular
    Perpendicular {
        a: EntityId,
        b: EntityId,
        /// Measure against the reversed direction of `a`
        inverse: bool,
    },

    /// Angle between `a` and `b` equals angle between `c` and `d`
    EqualAngle {
        a: EntityId,
        b: EntityId,
        c: EntityId,
        d: EntityId,
        /// Measure against the reversed direction of `a`
        inverse: bool,
    },

    /// Two lines or normals are parallel
    Parallel {
        a: EntityId,
        b: EntityId,
        /// Scale between the directions, free in 3D only
        scale: Option<ParamId>,
    },

    // ============== Tangency ==============
    /// A line touches an arc at one of the arc's endpoints
    ArcLineTangent {
        arc: EntityId,
        line: EntityId,
        /// The shared endpoint is the arc's end rather than its start
        at_end: bool,
    },

    /// A line is tangent to a cubic at one of its endpoints
    CubicLineTangent {
        cubic: EntityId,
        line: EntityId,
        /// The shared endpoint is the cubic's end rather than its start
        at_end: bool,
        /// Scale between the directions, free in 3D only
        scale: Option<ParamId>,
    },

    /// Two arcs or cubics are tangent at a shared endpoint
    CurveCurveTangent {
        a: EntityId,
        b: EntityId,
        a_at_end: bool,
        b_at_end: bool,
    },

    // ============== Dragging ==============
    /// A point stays where it is when the equations are written
    WhereDragged { point: EntityId },
}

/// A constraint owned by a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Handle
    pub id: ConstraintId,
    /// Owning group
    pub group: GroupId,
    /// Workplane the relation is measured in, `None` when free in 3D
    pub workplane: Option<EntityId>,
    /// Relation
    pub kind: ConstraintKind,
}

impl Constraint {
    /// Get the type name of this constraint
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ConstraintKind::PointsCoincident { .. } => "Points Coincident",
            ConstraintKind::PointInPlane { .. } => "Point In Plane",
            ConstraintKind::PointOnLine { .. } => "Point On Line",
            ConstraintKind::PointOnCircle { .. } => "Point On Circle",
            ConstraintKind::PointPointDistance { .. } => "Distance",
            ConstraintKind::ProjectedPointDistance { .. } => "Projected Distance",
            ConstraintKind::PointPlaneDistance { .. } => "Point-Plane Distance",
            ConstraintKind::PointLineDistance { .. } => "Point-Line Distance",
            ConstraintKind::EqualLength { .. } => "Equal Length",
            ConstraintKind::LengthRatio { .. } => "Length Ratio",
            ConstraintKind::LengthDifference { .. } => "Length Difference",
            ConstraintKind::EqualLengthPointLineDistance { .. } => {
                "Equal Length Point-Line Distance"
            }
            ConstraintKind::EqualPointLineDistances { .. } => "Equal Point-Line Distances",
            ConstraintKind::EqualLineArcLength { .. } => "Equal Line-Arc Length",
            ConstraintKind::EqualRadius { .. } => "Equal Radius",
            ConstraintKind::Diameter { .. } => "Diameter",
            ConstraintKind::Symmetric { .. } => "Symmetric",
            ConstraintKind::SymmetricHorizontal { .. } => "Symmetric Horizontal",
            ConstraintKind::SymmetricVertical { .. } => "Symmetric Vertical",
            ConstraintKind::SymmetricLine { .. } => "Symmetric Line",
            ConstraintKind::PointAtMidpoint { .. } => "Midpoint",
            ConstraintKind::MidpointInPlane { .. } => "Midpoint In Plane",
            ConstraintKind::Horizontal { .. } => "Horizontal",
            ConstraintKind::Vertical { .. } => "Vertical",
            ConstraintKind::SameOrientation { .. } => "Same Orientation",
            ConstraintKind::Angle { .. } => "Angle",
            ConstraintKind::Perpendicular { .. } => "Perpendicular",
            ConstraintKind::EqualAngle { .. } => "Equal Angle",
            ConstraintKind::Parallel { .. } => "Parallel",
            ConstraintKind::ArcLineTangent { .. } => "Arc-Line Tangent",
            ConstraintKind::CubicLineTangent { .. } => "Cubic-Line Tangent",
            ConstraintKind::CurveCurveTangent { .. } => "Curve-Curve Tangent",
            ConstraintKind::WhereDragged { .. } => "Where Dragged",
        }
    }

    /// Get all entity IDs referenced by this constraint, its workplane
    /// included
    pub fn referenced_entities(&self) -> Vec<EntityId> {
        use ConstraintKind as K;

        let mut refs: Vec<EntityId> = self.workplane.into_iter().collect();
        match &self.kind {
            K::PointsCoincident { a, b }
            | K::PointPointDistance { a, b, .. }
            | K::EqualLength { a, b }
            | K::LengthRatio { a, b, .. }
            | K::LengthDifference { a, b, .. }
            | K::EqualRadius { a, b }
            | K::SymmetricHorizontal { a, b }
            | K::SymmetricVertical { a, b }
            | K::SameOrientation { a, b, .. }
            | K::Angle { a, b, .. }
            | K::Perpendicular { a, b, .. }
            | K::Parallel { a, b, .. }
            | K::CurveCurveTangent { a, b, .. } => refs.extend([*a, *b]),
            K::PointInPlane { point, plane } | K::PointPlaneDistance { point, plane, .. } => {
                refs.extend([*point, *plane])
            }
            K::PointOnLine { point, line, .. }
            | K::PointLineDistance { point, line, .. }
            | K::PointAtMidpoint { point, line } => refs.extend([*point, *line]),
            K::PointOnCircle { point, circle } => refs.extend([*point, *circle]),
            K::ProjectedPointDistance { a, b, direction, .. } => {
                refs.extend([*a, *b, *direction])
            }
            K::EqualLengthPointLineDistance {
                line,
                point,
                other_line,
            } => refs.extend([*line, *point, *other_line]),
            K::EqualPointLineDistances {
                point_a,
                line_a,
                point_b,
                line_b,
            } => refs.extend([*point_a, *line_a, *point_b, *line_b]),
            K::EqualLineArcLength { line, arc } => refs.extend([*line, *arc]),
            K::Diameter { circle, .. } => refs.push(*circle),
            K::Symmetric { a, b, plane } => refs.extend([*a, *b, *plane]),
            K::SymmetricLine { a, b, line } => refs.extend([*a, *b, *line]),
            K::MidpointInPlane { line, plane } => refs.extend([*line, *plane]),
            K::Horizontal { line, a, b } | K::Vertical { line, a, b } => match line {
                Some(line) => refs.push(*line),
                None => refs.extend([*a, *b]),
            },
            K::EqualAngle { a, b, c, d, .. } => refs.extend([*a, *b, *c, *d]),
            K::ArcLineTangent { arc, line, .. } => refs.extend([*arc, *line]),
            K::CubicLineTangent { cubic, line, .. } => refs.extend([*cubic, *line]),
            K::WhereDragged { point } => refs.push(*point),
        }
        refs
    }

    /// Check if this constraint references a specific entity
    pub fn references_entity(&self, entity_id: EntityId) -> bool {
        self.referenced_entities().contains(&entity_id)
    }

    /// Auxiliary parameter owned by this constraint, if any
    pub fn aux_param(&self) -> Option<ParamId> {
        match self.kind {
            ConstraintKind::PointOnLine { t, .. } => Some(t),
            ConstraintKind::SameOrientation { scale, .. } => Some(scale),
            ConstraintKind::Parallel { scale, .. }
            | ConstraintKind::CubicLineTangent { scale, .. } => scale,
            _ => None,
        }
    }

    /// Check if this is a dimensional constraint (has a numeric value)
    pub fn is_dimensional(&self) -> bool {
        self.value().is_some()
    }

    /// Get the numeric value of a dimensional constraint
    pub fn value(&self) -> Option<f64> {
        match self.kind {
            ConstraintKind::PointPointDistance { distance, .. }
            | ConstraintKind::ProjectedPointDistance { distance, .. }
            | ConstraintKind::PointPlaneDistance { distance, .. }
            | ConstraintKind::PointLineDistance { distance, .. } => Some(distance),
            ConstraintKind::LengthRatio { ratio, .. } => Some(ratio),
            ConstraintKind::LengthDifference { difference, .. } => Some(difference),
            ConstraintKind::Diameter { diameter, .. } => Some(diameter),
            ConstraintKind::Angle { degrees, .. } => Some(degrees),
            _ => None,
        }
    }

    /// Whether this constraint merges two points
    pub fn is_coincidence(&self) -> bool {
        matches!(self.kind, ConstraintKind::PointsCoincident { .. })
    }

    fn require_workplane(&self) -> SketchResult<EntityId> {
        self.workplane
            .ok_or(SketchError::WorkplaneRequired(self.type_name()))
    }

    /// Residual equations of this constraint, each zero when satisfied
    ///
    /// Reads current values for the parts that depend on the present
    /// configuration (dragged positions, arc sweep, orientation branch).
    pub fn equations(&self, sketch: &Sketch) -> SketchResult<Vec<Expr>> {
        use ConstraintKind as K;

        let wp = self.workplane;
        let c = Expr::constant;

        let eqs = match &self.kind {
            // ============== Incidence ==============
            K::PointsCoincident { a, b } => match wp {
                None => {
                    let d = sketch.point_exprs(*a)?.minus(&sketch.point_exprs(*b)?);
                    vec![d.x, d.y, d.z]
                }
                Some(wp) => {
                    let (au, av) = sketch.point_in_workplane(*a, wp)?;
                    let (bu, bv) = sketch.point_in_workplane(*b, wp)?;
                    vec![au - bu, av - bv]
                }
            },

            K::PointInPlane { point, plane } => {
                vec![sketch.point_plane_distance(&sketch.point_exprs(*point)?, *plane)?]
            }

            K::PointOnLine { point, line, t } => {
                let [la, lb] = sketch.line_points(*line)?;
                let ea = sketch.point_in(la, wp)?;
                let eb = sketch.point_in(lb, wp)?;
                let ep = sketch.point_in(*point, wp)?;
                let d = ea
                    .plus(&eb.minus(&ea).scaled_by(&Expr::param(*t)))
                    .minus(&ep);
                match wp {
                    None => vec![d.x, d.y, d.z],
                    Some(_) => vec![d.x, d.y],
                }
            }

            K::PointOnCircle { point, circle } => {
                let (center, normal) = sketch.circle_center_normal(*circle)?;
                let q = sketch.normal_quaternion(normal)?;
                let d = sketch.point_exprs(center)?.minus(&sketch.point_exprs(*point)?);
                let du = d.dot(&q.rotation_u());
                let dv = d.dot(&q.rotation_v());
                vec![(du.square() + dv.square()).sqrt() - sketch.circle_radius(*circle)?]
            }

            // ============== Distances ==============
            K::PointPointDistance { a, b, distance } => {
                vec![sketch.distance_expr(wp, *a, *b)? - c(*distance)]
            }

            K::ProjectedPointDistance {
                a,
                b,
                direction,
                distance,
            } => {
                let dp = sketch.point_exprs(*b)?.minus(&sketch.point_exprs(*a)?);
                let dir = sketch.vector_exprs(*direction)?.with_magnitude(c(1.0));
                vec![dp.dot(&dir) - c(*distance)]
            }

            K::PointPlaneDistance {
                point,
                plane,
                distance,
            } => {
                let p = sketch.point_exprs(*point)?;
                vec![sketch.point_plane_distance(&p, *plane)? - c(*distance)]
            }

            K::PointLineDistance {
                point,
                line,
                distance,
            } => vec![sketch.point_line_distance(wp, *point, *line)? - c(*distance)],

            // ============== Lengths & Radii ==============
            K::EqualLength { a, b } => {
                vec![sketch.line_length(wp, *a)? - sketch.line_length(wp, *b)?]
            }

            K::LengthRatio { a, b, ratio } => {
                vec![sketch.line_length(wp, *a)? / sketch.line_length(wp, *b)? - c(*ratio)]
            }

            K::LengthDifference { a, b, difference } => {
                vec![sketch.line_length(wp, *a)? - sketch.line_length(wp, *b)? - c(*difference)]
            }

            K::EqualLengthPointLineDistance {
                line,
                point,
                other_line,
            } => {
                let length = sketch.line_length(wp, *line)?;
                let distance = sketch.point_line_distance(wp, *point, *other_line)?;
                vec![length.square() - distance.square()]
            }

            K::EqualPointLineDistances {
                point_a,
                line_a,
                point_b,
                line_b,
            } => {
                let da = sketch.point_line_distance(wp, *point_a, *line_a)?;
                let db = sketch.point_line_distance(wp, *point_b, *line_b)?;
                vec![da.square() - db.square()]
            }

            K::EqualLineArcLength { line, arc } => {
                vec![arc_length(sketch, *arc)? - sketch.line_length(None, *line)?]
            }

            K::EqualRadius { a, b } => {
                vec![sketch.circle_radius(*a)? - sketch.circle_radius(*b)?]
            }

            K::Diameter { circle, diameter } => {
                vec![sketch.circle_radius(*circle)? * c(2.0) - c(*diameter)]
            }

            // ============== Symmetry ==============
            K::Symmetric { a, b, plane } => match wp {
                None => {
                    let pa = sketch.point_exprs(*a)?;
                    let pb = sketch.point_exprs(*b)?;
                    let m = pa.plus(&pb).scaled_by(&c(0.5));
                    let (au, av) = sketch.point_in_workplane(*a, *plane)?;
                    let (bu, bv) = sketch.point_in_workplane(*b, *plane)?;
                    vec![sketch.point_plane_distance(&m, *plane)?, au - bu, av - bv]
                }
                Some(wp) => {
                    let (au, av) = sketch.point_in_workplane(*a, wp)?;
                    let (bu, bv) = sketch.point_in_workplane(*b, wp)?;
                    let mu = c(0.5) * (au + bu);
                    let mv = c(0.5) * (av + bv);
                    let m = sketch.point_in_three_space(wp, mu, mv)?;

                    let frame = sketch.workplane_frame(wp)?;
                    let n = sketch.workplane_frame(*plane)?.n;
                    let d = sketch.point_exprs(*a)?.minus(&sketch.point_exprs(*b)?);
                    vec![
                        sketch.point_plane_distance(&m, *plane)?,
                        n.cross(&frame.u.cross(&frame.v)).dot(&d),
                    ]
                }
            },

            K::SymmetricHorizontal { a, b } => {
                let wp = self.require_workplane()?;
                let (au, av) = sketch.point_in_workplane(*a, wp)?;
                let (bu, bv) = sketch.point_in_workplane(*b, wp)?;
                vec![av - bv, au + bu]
            }

            K::SymmetricVertical { a, b } => {
                let wp = self.require_workplane()?;
                let (au, av) = sketch.point_in_workplane(*a, wp)?;
                let (bu, bv) = sketch.point_in_workplane(*b, wp)?;
                vec![au - bu, av + bv]
            }

            K::SymmetricLine { a, b, line } => {
                let wp = self.require_workplane()?;
                let [la, lb] = sketch.line_points(*line)?;
                let (pau, pav) = sketch.point_in_workplane(*a, wp)?;
                let (pbu, pbv) = sketch.point_in_workplane(*b, wp)?;
                let (lau, lav) = sketch.point_in_workplane(la, wp)?;
                let (lbu, lbv) = sketch.point_in_workplane(lb, wp)?;

                let dpu = pbu.clone() - pau.clone();
                let dpv = pbv.clone() - pav.clone();
                let dlu = lbu - lau.clone();
                let dlv = lbv - lav.clone();
                // The segment between the points is perpendicular to the
                // line, and the points sit at opposite signed distances.
                let perpendicular = dlu.clone() * dpu + dlv.clone() * dpv;
                let dista = dlv.clone() * (lau.clone() - pau) - dlu.clone() * (lav.clone() - pav);
                let distb = dlv * (lau - pbu) - dlu * (lav - pbv);
                vec![perpendicular, dista + distb]
            }

            K::PointAtMidpoint { point, line } => {
                let [la, lb] = sketch.line_points(*line)?;
                match wp {
                    None => {
                        let m = sketch
                            .point_exprs(la)?
                            .plus(&sketch.point_exprs(lb)?)
                            .scaled_by(&c(0.5));
                        let d = m.minus(&sketch.point_exprs(*point)?);
                        vec![d.x, d.y, d.z]
                    }
                    Some(wp) => {
                        let (mu, mv) = workplane_midpoint(sketch, wp, la, lb)?;
                        let (pu, pv) = sketch.point_in_workplane(*point, wp)?;
                        vec![pu - mu, pv - mv]
                    }
                }
            }

            K::MidpointInPlane { line, plane } => {
                let [la, lb] = sketch.line_points(*line)?;
                let m = match wp {
                    None => sketch
                        .point_exprs(la)?
                        .plus(&sketch.point_exprs(lb)?)
                        .scaled_by(&c(0.5)),
                    Some(wp) => {
                        let (mu, mv) = workplane_midpoint(sketch, wp, la, lb)?;
                        sketch.point_in_three_space(wp, mu, mv)?
                    }
                };
                vec![sketch.point_plane_distance(&m, *plane)?]
            }

            // ============== Orientation ==============
            K::Horizontal { a, b, .. } => {
                let wp = self.require_workplane()?;
                let (_, av) = sketch.point_in_workplane(*a, wp)?;
                let (_, bv) = sketch.point_in_workplane(*b, wp)?;
                vec![av - bv]
            }

            K::Vertical { a, b, .. } => {
                let wp = self.require_workplane()?;
                let (au, _) = sketch.point_in_workplane(*a, wp)?;
                let (bu, _) = sketch.point_in_workplane(*b, wp)?;
                vec![au - bu]
            }

            K::SameOrientation { a, b, scale } => {
                let qa = sketch.normal_quaternion(*a)?;
                let qb = sketch.normal_quaternion(*b)?;
                let (au, an) = (qa.rotation_u(), qa.rotation_n());
                let (bu, bv, bn) = (qb.rotation_u(), qb.rotation_v(), qb.rotation_n());

                let d = an.minus(&bn.scaled_by(&Expr::param(*scale)));
                // Either handedness of the U/V pair is accepted, whichever
                // is closer now.
                let d1 = au.dot(&bv);
                let d2 = au.dot(&bu);
                let twist = if d1.eval(sketch).abs() < d2.eval(sketch).abs() {
                    d1
                } else {
                    d2
                };
                vec![d.x, d.y, d.z, twist]
            }

            K::Angle {
                a,
                b,
                degrees,
                inverse,
            } => {
                let cos = oriented_cosine(sketch, wp, *a, *b, *inverse)?;
                let target = (degrees * PI / 180.0).cos();
                let gain = if target.abs() > ANGLE_NEAR_PARALLEL_COS {
                    0.01 / (1.00001 - target.abs())
                } else {
                    1.0
                };
                vec![(cos - c(target)) * c(gain)]
            }

            K::Perpendicular { a, b, inverse } => {
                vec![oriented_cosine(sketch, wp, *a, *b, *inverse)?]
            }

            K::EqualAngle {
                a,
                b,
                c: ec,
                d: ed,
                inverse,
            } => {
                let cab = oriented_cosine(sketch, wp, *a, *b, *inverse)?;
                let ccd = oriented_cosine(sketch, wp, *ec, *ed, false)?;
                vec![cab - ccd]
            }

            K::Parallel { a, b, scale } => {
                let va = sketch.vector_in(*a, wp)?;
                let vb = sketch.vector_in(*b, wp)?;
                match (wp, scale) {
                    (None, Some(scale)) => parallel_3d(&va, &vb, *scale),
                    (Some(_), _) => vec![va.x * vb.y - va.y * vb.x],
                    (None, None) => {
                        return Err(SketchError::InvalidArguments(self.type_name()));
                    }
                }
            }

            // ============== Tangency ==============
            K::ArcLineTangent { arc, line, at_end } => {
                let EntityKind::Arc {
                    center, start, end, ..
                } = sketch.entity(*arc)?.kind
                else {
                    return Err(SketchError::InvalidArguments(self.type_name()));
                };
                let ac = sketch.point_exprs(center)?;
                let ap = sketch.point_exprs(if *at_end { end } else { start })?;
                let ld = sketch.vector_exprs(*line)?;
                vec![ld.dot(&ac.minus(&ap))]
            }

            K::CubicLineTangent {
                cubic,
                line,
                at_end,
                scale,
            } => {
                let a = sketch.cubic_tangent(*cubic, *at_end)?;
                let b = sketch.vector_exprs(*line)?;
                match (wp, scale) {
                    (Some(wp), _) => {
                        let wn = sketch.normal_n(sketch.workplane_normal(wp)?)?;
                        vec![a.cross(&b).dot(&wn)]
                    }
                    (None, Some(scale)) => parallel_3d(&a, &b, *scale),
                    (None, None) => {
                        return Err(SketchError::InvalidArguments(self.type_name()));
                    }
                }
            }

            K::CurveCurveTangent {
                a,
                b,
                a_at_end,
                b_at_end,
            } => {
                let wp = self.require_workplane()?;
                let (da, ra) = curve_direction(sketch, *a, *a_at_end)?;
                let (db, rb) = curve_direction(sketch, *b, *b_at_end)?;
                // A radius direction is normal to the tangent, so one arc
                // flips the test from parallel to perpendicular.
                if ra != rb {
                    vec![da.dot(&db)]
                } else {
                    let wn = sketch.normal_n(sketch.workplane_normal(wp)?)?;
                    vec![da.cross(&db).dot(&wn)]
                }
            }

            // ============== Dragging ==============
            K::WhereDragged { point } => match wp {
                None => {
                    let p = sketch.point_exprs(*point)?;
                    let now = p.eval(sketch);
                    vec![p.x - c(now.x), p.y - c(now.y), p.z - c(now.z)]
                }
                Some(wp) => {
                    let (u, v) = sketch.point_in_workplane(*point, wp)?;
                    let (u0, v0) = (u.eval(sketch), v.eval(sketch));
                    vec![u - c(u0), v - c(v0)]
                }
            },
        };
        Ok(eqs)
    }
}

fn parallel_3d(a: &ExprVector, b: &ExprVector, scale: ParamId) -> Vec<Expr> {
    let d = a.minus(&b.scaled_by(&Expr::param(scale)));
    vec![d.x, d.y, d.z]
}

fn workplane_midpoint(
    sketch: &Sketch,
    wp: EntityId,
    a: EntityId,
    b: EntityId,
) -> SketchResult<(Expr, Expr)> {
    let (au, av) = sketch.point_in_workplane(a, wp)?;
    let (bu, bv) = sketch.point_in_workplane(b, wp)?;
    Ok((
        Expr::constant(0.5) * (au + bu),
        Expr::constant(0.5) * (av + bv),
    ))
}

/// Direction cosine of two 3D directions, `a` optionally reversed
fn oriented_cosine(
    sketch: &Sketch,
    wp: Option<EntityId>,
    a: EntityId,
    b: EntityId,
    inverse: bool,
) -> SketchResult<Expr> {
    let mut va = sketch.vector_exprs(a)?;
    if inverse {
        va = va.scaled_by(&Expr::constant(-1.0));
    }
    let vb = sketch.vector_exprs(b)?;
    sketch.direction_cosine(wp, &va, &vb)
}

/// Direction at a curve endpoint, and whether it is a radius (arc) rather
/// than a tangent (cubic)
fn curve_direction(
    sketch: &Sketch,
    curve: EntityId,
    at_end: bool,
) -> SketchResult<(ExprVector, bool)> {
    match sketch.entity(curve)?.kind {
        EntityKind::Arc {
            center, start, end, ..
        } => {
            let endpoint = sketch.point_exprs(if at_end { end } else { start })?;
            Ok((endpoint.minus(&sketch.point_exprs(center)?), true))
        }
        EntityKind::Cubic { .. } => Ok((sketch.cubic_tangent(curve, at_end)?, false)),
        _ => Err(SketchError::InvalidArguments("Curve-Curve Tangent")),
    }
}

/// Length of an arc (or circumference of a circle) as an expression
fn arc_length(sketch: &Sketch, arc: EntityId) -> SketchResult<Expr> {
    let entity = sketch.entity(arc)?;
    let EntityKind::Arc {
        normal,
        center,
        start,
        end,
    } = entity.kind
    else {
        return Ok(sketch.circle_radius(arc)? * Expr::constant(2.0 * PI));
    };

    let ao = sketch.point_exprs(center)?;
    let aos = sketch.point_exprs(start)?.minus(&ao);
    let aof = sketch.point_exprs(end)?.minus(&ao);
    let r = aof.magnitude();

    let n = sketch.normal_n(normal)?;
    let u = aos.with_magnitude(Expr::constant(1.0));
    let v = n.cross(&u);
    let cos = aof.dot(&u) / r.clone();
    let sin = aof.dot(&v) / r.clone();

    // acos is flat near pi, so switch to asin around there.
    let (_, _, dtheta) = sketch.arc_angles(arc)?;
    let theta = if dtheta < 3.0 * PI / 4.0 {
        cos.acos()
    } else if dtheta < 5.0 * PI / 4.0 {
        Expr::constant(PI) - sin.asin()
    } else {
        Expr::constant(2.0 * PI) - cos.acos()
    };
    Ok(r * theta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DVec3;

    struct Fixture {
        sketch: Sketch,
        wp: EntityId,
        g: GroupId,
    }

    fn fixture() -> Fixture {
        let mut sketch = Sketch::new();
        let wp = sketch.add_base_2d(GroupId::new(1)).unwrap();
        Fixture {
            sketch,
            wp,
            g: GroupId::new(2),
        }
    }

    fn residuals(sketch: &Sketch, id: ConstraintId) -> Vec<f64> {
        let constraint = sketch.constraint(id).unwrap();
        constraint
            .equations(sketch)
            .unwrap()
            .iter()
            .map(|e| e.eval(sketch))
            .collect()
    }

    #[test]
    fn test_distance_residual() {
        let Fixture { mut sketch, wp, g } = fixture();
        let a = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let b = sketch.add_point_2d(g, wp, 3.0, 4.0).unwrap();
        let c = sketch.distance(g, a, b, 7.0, Some(wp)).unwrap();
        let r = residuals(&sketch, c);
        assert_eq!(r.len(), 1);
        assert_relative_eq!(r[0], -2.0, epsilon = 1e-12);

        let constraint = sketch.constraint(c).unwrap();
        assert!(constraint.is_dimensional());
        assert_eq!(constraint.value(), Some(7.0));
        assert!(constraint.references_entity(a));
        assert!(constraint.references_entity(wp));
    }

    #[test]
    fn test_coincident_equation_count() {
        let Fixture { mut sketch, wp, g } = fixture();
        let a = sketch.add_point_2d(g, wp, 1.0, 2.0).unwrap();
        let b = sketch.add_point_2d(g, wp, 1.0, 5.0).unwrap();
        let in_plane = sketch.coincident(g, a, b, Some(wp)).unwrap();
        let in_space = sketch.coincident(g, a, b, None).unwrap();
        assert_eq!(residuals(&sketch, in_plane), vec![0.0, -3.0]);
        assert_eq!(residuals(&sketch, in_space).len(), 3);
        assert!(sketch.constraint(in_plane).unwrap().is_coincidence());
    }

    #[test]
    fn test_point_on_line_starts_satisfied() {
        let Fixture { mut sketch, wp, g } = fixture();
        let a = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let b = sketch.add_point_2d(g, wp, 10.0, 0.0).unwrap();
        let line = sketch.add_line_2d(g, wp, a, b).unwrap();
        let p = sketch.add_point_2d(g, wp, 4.0, 0.0).unwrap();
        let c = sketch.coincident(g, p, line, Some(wp)).unwrap();

        let constraint = sketch.constraint(c).unwrap();
        let t = constraint.aux_param().unwrap();
        assert_relative_eq!(sketch.param_value(t).unwrap(), 0.4, epsilon = 1e-12);
        for r in residuals(&sketch, c) {
            assert_relative_eq!(r, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_angle_residual() {
        let Fixture { mut sketch, wp, g } = fixture();
        let o = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let x = sketch.add_point_2d(g, wp, 1.0, 0.0).unwrap();
        let y = sketch.add_point_2d(g, wp, 1.0, 1.0).unwrap();
        let l1 = sketch.add_line_2d(g, wp, o, x).unwrap();
        let l2 = sketch.add_line_2d(g, wp, o, y).unwrap();

        let at_45 = sketch.angle(g, l1, l2, 45.0, false, Some(wp)).unwrap();
        assert_relative_eq!(residuals(&sketch, at_45)[0], 0.0, epsilon = 1e-12);

        let perpendicular = sketch.perpendicular(g, l1, l2, false, Some(wp)).unwrap();
        assert_relative_eq!(
            residuals(&sketch, perpendicular)[0],
            0.5f64.sqrt(),
            epsilon = 1e-12
        );

        let inverse = sketch.angle(g, l1, l2, 135.0, true, Some(wp)).unwrap();
        assert_relative_eq!(residuals(&sketch, inverse)[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_horizontal_and_vertical() {
        let Fixture { mut sketch, wp, g } = fixture();
        let a = sketch.add_point_2d(g, wp, 1.0, 2.0).unwrap();
        let b = sketch.add_point_2d(g, wp, 4.0, 6.0).unwrap();
        let line = sketch.add_line_2d(g, wp, a, b).unwrap();
        let h = sketch.horizontal(g, line, wp).unwrap();
        let v = sketch.vertical_points(g, a, b, wp).unwrap();
        assert_eq!(residuals(&sketch, h), vec![-4.0]);
        assert_eq!(residuals(&sketch, v), vec![-3.0]);
        assert_eq!(
            sketch.constraint(h).unwrap().referenced_entities(),
            vec![wp, line]
        );
    }

    #[test]
    fn test_diameter_and_equal_radius() {
        let Fixture { mut sketch, wp, g } = fixture();
        let normal = sketch.add_normal_from_basis(g, DVec3::X, DVec3::Y).unwrap();
        let center = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let radius = sketch.add_distance(g, wp, 5.0).unwrap();
        let circle = sketch.add_circle(g, wp, normal, center, radius).unwrap();
        let c = sketch.add_point_2d(g, wp, 10.0, 0.0).unwrap();
        let s = sketch.add_point_2d(g, wp, 13.0, 0.0).unwrap();
        let e = sketch.add_point_2d(g, wp, 10.0, 3.0).unwrap();
        let arc = sketch.add_arc(g, wp, normal, c, s, e).unwrap();

        let d = sketch.diameter(g, circle, 12.0).unwrap();
        assert_relative_eq!(residuals(&sketch, d)[0], -2.0, epsilon = 1e-12);
        let eq = sketch.equal(g, arc, circle, None).unwrap();
        assert_relative_eq!(residuals(&sketch, eq)[0], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_equal_line_arc_length() {
        let Fixture { mut sketch, wp, g } = fixture();
        let normal = sketch.add_normal_from_basis(g, DVec3::X, DVec3::Y).unwrap();
        let c = sketch.add_point_2d(g, wp, 0.0, 0.0).unwrap();
        let s = sketch.add_point_2d(g, wp, 2.0, 0.0).unwrap();
        let e = sketch.add_point_2d(g, wp, 0.0, 2.0).unwrap();
        let arc = sketch.add_arc(g, wp, normal, c, s, e).unwrap();
        let a = sketch.add_point_2d(g, wp, 0.0, 5.0).unwrap();
        let b = sketch.add_point_2d(g, wp, PI, 5.0).unwrap();
        let line = sketch.add_line_2d(g, wp, a, b).unwrap();

        let eq = sketch.equal(g, line, arc, Some(wp)).unwrap();
        assert_relative_eq!(residuals(&sketch, eq)[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_where_dragged_pins_current_position() {
        let Fixture { mut sketch, wp, g } = fixture();
        let p = sketch.add_point_2d(g, wp, 3.0, 4.0).unwrap();
        let c = sketch.dragged(g, p, Some(wp)).unwrap();
        assert_eq!(residuals(&sketch, c), vec![0.0, 0.0]);
    }

    #[test]
    fn test_symmetric_horizontal() {
        let Fixture { mut sketch, wp, g } = fixture();
        let a = sketch.add_point_2d(g, wp, -2.0, 1.0).unwrap();
        let b = sketch.add_point_2d(g, wp, 2.0, 1.0).unwrap();
        let c = sketch.symmetric_horizontal(g, a, b, wp).unwrap();
        assert_eq!(residuals(&sketch, c), vec![0.0, 0.0]);
    }
}
