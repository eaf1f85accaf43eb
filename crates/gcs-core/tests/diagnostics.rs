//! Solve outcomes other than a clean convergence, and the guarantees that
//! hold across solves

use approx::assert_abs_diff_eq;
use gcs_core::{
    EntityId, GroupId, Sketch, SketchError, SolveStatus, SolverConfig, make_quaternion,
};
use glam::{DQuat, DVec3};

const BASE: GroupId = GroupId::new(1);
const SKETCH: GroupId = GroupId::new(2);

/// Fixed origin point in the base group and a free point at (3, 4)
fn anchored_point() -> (Sketch, EntityId, EntityId, EntityId) {
    let mut sketch = Sketch::new();
    let wp = sketch.add_base_2d(BASE).unwrap();
    let anchor = sketch.add_point_2d(BASE, wp, 0.0, 0.0).unwrap();
    let point = sketch.add_point_2d(SKETCH, wp, 3.0, 4.0).unwrap();
    (sketch, wp, anchor, point)
}

fn crank_rocker(config: SolverConfig) -> (Sketch, EntityId) {
    let mut sketch = Sketch::with_config(config);
    let wp = sketch.add_base_2d(BASE).unwrap();
    let p0 = sketch.add_point_2d(SKETCH, wp, 0.0, 0.0).unwrap();
    sketch.dragged(SKETCH, p0, Some(wp)).unwrap();
    let p1 = sketch.add_point_2d(SKETCH, wp, 90.0, 0.0).unwrap();
    sketch.dragged(SKETCH, p1, Some(wp)).unwrap();
    let line0 = sketch.add_line_2d(SKETCH, wp, p0, p1).unwrap();
    let p2 = sketch.add_point_2d(SKETCH, wp, 20.0, 20.0).unwrap();
    let p3 = sketch.add_point_2d(SKETCH, wp, 0.0, 10.0).unwrap();
    let p4 = sketch.add_point_2d(SKETCH, wp, 30.0, 20.0).unwrap();
    sketch.distance(SKETCH, p2, p3, 40.0, Some(wp)).unwrap();
    sketch.distance(SKETCH, p2, p4, 40.0, Some(wp)).unwrap();
    sketch.distance(SKETCH, p3, p4, 70.0, Some(wp)).unwrap();
    sketch.distance(SKETCH, p0, p3, 35.0, Some(wp)).unwrap();
    sketch.distance(SKETCH, p1, p4, 70.0, Some(wp)).unwrap();
    let line1 = sketch.add_line_2d(SKETCH, wp, p0, p3).unwrap();
    sketch.angle(SKETCH, line0, line1, 45.0, false, Some(wp)).unwrap();
    (sketch, p2)
}

#[test]
fn test_unreachable_distance_is_inconsistent() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    let c = sketch.distance(SKETCH, anchor, point, -5.0, Some(wp)).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Inconsistent);
    assert_eq!(report.bad_constraints, vec![c]);
    assert_eq!(report.dof, None);
    assert!(report.iterations < sketch.config().max_iterations);
    assert_eq!(sketch.params(point).unwrap(), vec![3.0, 4.0]);
    assert!(!sketch.group(SKETCH).unwrap().solved);
}

#[test]
fn test_unreachable_distance_status_depends_on_unknowns() {
    let mut sketch = Sketch::new();
    let wp = sketch.add_base_2d(BASE).unwrap();
    let anchor = sketch.add_point_2d(BASE, wp, 0.0, 0.0).unwrap();
    let point = sketch.add_point_2d(BASE, wp, 3.0, 4.0).unwrap();
    let c = sketch.distance(SKETCH, anchor, point, -5.0, Some(wp)).unwrap();
    let params = sketch.entity_params(point).unwrap();
    let (u, v) = (params[0], params[1]);

    // one unknown: solved by itself, no stall test
    let report = sketch.solve_dragged(SKETCH, &[u]).unwrap();
    assert_eq!(report.status, SolveStatus::DidntConverge);
    assert_eq!(report.bad_constraints, vec![c]);

    let report = sketch.solve_dragged(SKETCH, &[u, v]).unwrap();
    assert_eq!(report.status, SolveStatus::Inconsistent);
    assert_eq!(report.bad_constraints, vec![c]);
    assert_eq!(sketch.params(point).unwrap(), vec![3.0, 4.0]);
}

#[test]
fn test_conflicting_distances_are_inconsistent() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    let near = sketch.distance(SKETCH, anchor, point, 10.0, Some(wp)).unwrap();
    let far = sketch.distance(SKETCH, anchor, point, 20.0, Some(wp)).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Inconsistent);
    assert!(report.bad_constraints.contains(&near));
    assert!(report.bad_constraints.contains(&far));
    assert_eq!(sketch.params(point).unwrap(), vec![3.0, 4.0]);
}

#[test]
fn test_bad_constraints_can_be_skipped() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    sketch.set_config(SolverConfig::default().with_find_bad_constraints(false));
    sketch.distance(SKETCH, anchor, point, -5.0, Some(wp)).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Inconsistent);
    assert!(report.bad_constraints.is_empty());
}

#[test]
fn test_iteration_limit() {
    let (mut sketch, p2) = crank_rocker(SolverConfig::default().with_max_iterations(1));
    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::DidntConverge);
    assert_eq!(report.iterations, 1);
    assert!(!report.is_ok());
    assert_eq!(sketch.params(p2).unwrap(), vec![20.0, 20.0]);
}

#[test]
fn test_too_many_unknowns() {
    let (mut sketch, p2) = crank_rocker(SolverConfig::default().with_max_unknowns(4));
    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::TooManyUnknowns);
    assert_eq!(report.iterations, 0);
    assert_eq!(sketch.params(p2).unwrap(), vec![20.0, 20.0]);
}

#[test]
fn test_unknown_limit_ignores_unconstrained_params() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    sketch.set_config(SolverConfig::default().with_max_unknowns(2));
    sketch.add_point_2d(SKETCH, wp, 7.0, 7.0).unwrap();
    sketch.add_point_2d(SKETCH, wp, 8.0, 8.0).unwrap();
    sketch.distance(SKETCH, anchor, point, 10.0, Some(wp)).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_eq!(report.dof, Some(5));
}

#[test]
fn test_earlier_groups_stay_fixed() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    sketch.distance(SKETCH, anchor, point, 10.0, Some(wp)).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_eq!(sketch.params(anchor).unwrap(), vec![0.0, 0.0]);
    let moved = sketch.point_position(point).unwrap();
    assert_abs_diff_eq!(moved.length(), 10.0, epsilon = 1e-8);
    // minimum-norm steps keep the direction of the initial guess
    assert_abs_diff_eq!(moved.x, 6.0, epsilon = 1e-6);
    assert_abs_diff_eq!(moved.y, 8.0, epsilon = 1e-6);
}

#[test]
fn test_dragged_params_of_earlier_groups_move() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    sketch.dragged(SKETCH, point, Some(wp)).unwrap();
    sketch.distance(SKETCH, anchor, point, 10.0, Some(wp)).unwrap();
    let anchor_params = sketch.entity_params(anchor).unwrap();

    let report = sketch.solve_dragged(SKETCH, &anchor_params).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_eq!(sketch.params(point).unwrap(), vec![3.0, 4.0]);
    let anchor_at = sketch.point_position(anchor).unwrap();
    let point_at = sketch.point_position(point).unwrap();
    assert_abs_diff_eq!(anchor_at.distance(point_at), 10.0, epsilon = 1e-8);
    assert_abs_diff_eq!(anchor_at.x, -3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(anchor_at.y, -4.0, epsilon = 1e-6);

    // the override lasts for one call only
    sketch.set_param_value(anchor_params[0], 0.0).unwrap();
    sketch.set_param_value(anchor_params[1], 0.0).unwrap();
    sketch.solve(SKETCH).unwrap();
    assert_eq!(sketch.params(anchor).unwrap(), vec![0.0, 0.0]);
}

#[test]
fn test_solve_is_idempotent() {
    let (mut sketch, p2) = crank_rocker(SolverConfig::default());
    assert!(sketch.solve(SKETCH).unwrap().is_ok());
    let first = sketch.params(p2).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_eq!(report.iterations, 0);
    assert_eq!(sketch.params(p2).unwrap(), first);
}

#[test]
fn test_solve_is_deterministic() {
    let (mut a, pa) = crank_rocker(SolverConfig::default());
    let (mut b, pb) = crank_rocker(SolverConfig::default());
    let ra = a.solve(SKETCH).unwrap();
    let rb = b.solve(SKETCH).unwrap();
    assert_eq!(ra, rb);
    assert_eq!(a.params(pa).unwrap(), b.params(pb).unwrap());
}

#[test]
fn test_normal_is_renormalized() {
    let mut sketch = Sketch::new();
    let normal = sketch
        .add_normal_3d(SKETCH, make_quaternion(DVec3::X, DVec3::Y))
        .unwrap();
    let w = sketch.entity_params(normal).unwrap()[0];
    sketch.set_param_value(w, 2.0).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_eq!(report.dof, Some(3));
    let q = sketch.params(normal).unwrap();
    let q = DQuat::from_xyzw(q[1], q[2], q[3], q[0]);
    assert_abs_diff_eq!(q.length(), 1.0, epsilon = 1e-8);
}

#[test]
fn test_free_params_reported() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    sketch.set_config(SolverConfig::default().with_find_free_params(true));
    sketch.distance(SKETCH, anchor, point, 10.0, Some(wp)).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_eq!(report.dof, Some(1));
    assert_eq!(report.free_params, sketch.entity_params(point).unwrap());
}

#[test]
fn test_configuration_errors() {
    let (mut sketch, wp, anchor, point) = anchored_point();
    let later = sketch.add_point_2d(GroupId::new(3), wp, 1.0, 1.0).unwrap();

    let err = sketch
        .distance(SKETCH, point, later, 1.0, Some(wp))
        .unwrap_err();
    assert!(matches!(err, SketchError::LaterGroup { entity, .. } if entity == later));

    let err = sketch.horizontal(SKETCH, anchor, wp).unwrap_err();
    assert!(matches!(err, SketchError::WrongEntityKind { .. }));

    let err = sketch.solve(GroupId::new(9)).unwrap_err();
    assert_eq!(err, SketchError::GroupNotFound(GroupId::new(9)));

    let normal = sketch
        .add_normal_from_basis(SKETCH, DVec3::X, DVec3::Y)
        .unwrap();
    let center = sketch.add_point_2d(SKETCH, wp, 0.0, 0.0).unwrap();
    let start = sketch.add_point_2d(SKETCH, wp, 1.0, 0.0).unwrap();
    let end = sketch.add_point_2d(SKETCH, wp, 0.0, 1.0).unwrap();
    let arc = sketch
        .add_arc(SKETCH, wp, normal, center, start, end)
        .unwrap();
    let line = sketch.add_line_2d(SKETCH, wp, point, anchor).unwrap();
    let err = sketch.tangent(SKETCH, arc, line, Some(wp)).unwrap_err();
    assert!(matches!(err, SketchError::NoSharedEndpoint { .. }));
}
