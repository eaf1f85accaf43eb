//! Reference mechanisms solved end to end through the sketch API

use approx::assert_abs_diff_eq;
use gcs_core::{EntityId, GroupId, Sketch, SolveStatus, make_quaternion};
use glam::DVec3;

const BASE: GroupId = GroupId::new(1);
const SKETCH: GroupId = GroupId::new(2);

fn base() -> (Sketch, EntityId) {
    let mut sketch = Sketch::new();
    let wp = sketch.add_base_2d(BASE).unwrap();
    (sketch, wp)
}

fn assert_point(sketch: &Sketch, point: EntityId, u: f64, v: f64) {
    let values = sketch.params(point).unwrap();
    assert_abs_diff_eq!(values[0], u, epsilon = 1e-4);
    assert_abs_diff_eq!(values[1], v, epsilon = 1e-4);
}

#[test]
fn test_workplane_demo() {
    let mut sketch = Sketch::new();
    let p101 = sketch.add_point_3d(BASE, DVec3::ZERO).unwrap();
    let n102 = sketch
        .add_normal_3d(BASE, make_quaternion(DVec3::X, DVec3::Y))
        .unwrap();
    let wp200 = sketch.add_workplane(BASE, p101, n102).unwrap();

    let p301 = sketch.add_point_2d(SKETCH, wp200, 10.0, 20.0).unwrap();
    let p302 = sketch.add_point_2d(SKETCH, wp200, 20.0, 10.0).unwrap();
    let l400 = sketch.add_line_2d(SKETCH, wp200, p301, p302).unwrap();

    let p303 = sketch.add_point_2d(SKETCH, wp200, 100.0, 120.0).unwrap();
    let p304 = sketch.add_point_2d(SKETCH, wp200, 120.0, 110.0).unwrap();
    let p305 = sketch.add_point_2d(SKETCH, wp200, 115.0, 115.0).unwrap();
    let a401 = sketch
        .add_arc(SKETCH, wp200, n102, p303, p304, p305)
        .unwrap();

    let p306 = sketch.add_point_2d(SKETCH, wp200, 200.0, 200.0).unwrap();
    let d307 = sketch.add_distance(SKETCH, wp200, 30.0).unwrap();
    let c402 = sketch.add_circle(SKETCH, wp200, n102, p306, d307).unwrap();

    sketch.distance(SKETCH, p301, p302, 30.0, Some(wp200)).unwrap();
    sketch.distance(SKETCH, p101, l400, 10.0, Some(wp200)).unwrap();
    sketch.vertical(SKETCH, l400, wp200).unwrap();
    sketch.distance(SKETCH, p301, p101, 15.0, Some(wp200)).unwrap();
    sketch.equal(SKETCH, a401, c402, Some(wp200)).unwrap();
    sketch.diameter(SKETCH, a401, 17.0 * 2.0).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert!(report.bad_constraints.is_empty());

    assert_point(&sketch, p301, 10.0, 11.18030);
    assert_point(&sketch, p302, 10.0, -18.81966);
    assert_point(&sketch, p303, 101.11418, 119.04153);
    assert_point(&sketch, p304, 116.47661, 111.76171);
    assert_point(&sketch, p305, 117.40922, 114.19676);
    assert_point(&sketch, p306, 200.0, 200.0);
    assert_abs_diff_eq!(sketch.params(d307).unwrap()[0], 17.0, epsilon = 1e-4);
    assert_eq!(report.dof, Some(6));
    assert_eq!(sketch.group(SKETCH).unwrap().dof, Some(6));
}

#[test]
fn test_crank_rocker() {
    let (mut sketch, wp) = base();
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

    let mut copy = sketch.clone();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_point(&sketch, p2, 39.54852, 61.91009);

    let report = copy.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_point(&copy, p2, 39.54852, 61.91009);
}

#[test]
fn test_involute() {
    let r = 10.0;
    let angle = 45.0_f64;

    let (mut sketch, wp) = base();
    let p0 = sketch.add_point_2d(SKETCH, wp, 0.0, 0.0).unwrap();
    sketch.dragged(SKETCH, p0, Some(wp)).unwrap();

    let p1 = sketch.add_point_2d(SKETCH, wp, 0.0, 10.0).unwrap();
    sketch.distance(SKETCH, p0, p1, r, Some(wp)).unwrap();
    let line0 = sketch.add_line_2d(SKETCH, wp, p0, p1).unwrap();

    let p2 = sketch.add_point_2d(SKETCH, wp, 10.0, 10.0).unwrap();
    let line1 = sketch.add_line_2d(SKETCH, wp, p1, p2).unwrap();
    sketch
        .distance(SKETCH, p1, p2, r * angle.to_radians(), Some(wp))
        .unwrap();
    sketch
        .perpendicular(SKETCH, line0, line1, false, Some(wp))
        .unwrap();

    let p3 = sketch.add_point_2d(SKETCH, wp, 10.0, 0.0).unwrap();
    sketch.dragged(SKETCH, p3, Some(wp)).unwrap();
    let line_base = sketch.add_line_2d(SKETCH, wp, p0, p3).unwrap();
    sketch
        .angle(SKETCH, line0, line_base, angle, false, Some(wp))
        .unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_point(&sketch, p2, 12.62467, 1.51746);
}

#[test]
fn test_jansen_linkage() {
    let (mut sketch, wp) = base();
    let p0 = sketch.add_point_2d(SKETCH, wp, 0.0, 0.0).unwrap();
    sketch.dragged(SKETCH, p0, Some(wp)).unwrap();

    let p1 = sketch.add_point_2d(SKETCH, wp, 0.0, 20.0).unwrap();
    sketch.distance(SKETCH, p0, p1, 15.0, Some(wp)).unwrap();
    let line0 = sketch.add_line_2d(SKETCH, wp, p0, p1).unwrap();

    let p2 = sketch.add_point_2d(SKETCH, wp, -38.0, -7.8).unwrap();
    sketch.dragged(SKETCH, p2, Some(wp)).unwrap();
    let p3 = sketch.add_point_2d(SKETCH, wp, -50.0, 30.0).unwrap();
    let p4 = sketch.add_point_2d(SKETCH, wp, -70.0, -15.0).unwrap();
    sketch.distance(SKETCH, p2, p3, 41.5, Some(wp)).unwrap();
    sketch.distance(SKETCH, p3, p4, 55.8, Some(wp)).unwrap();
    sketch.distance(SKETCH, p2, p4, 40.1, Some(wp)).unwrap();

    let p5 = sketch.add_point_2d(SKETCH, wp, -50.0, -50.0).unwrap();
    let p6 = sketch.add_point_2d(SKETCH, wp, -10.0, -90.0).unwrap();
    let p7 = sketch.add_point_2d(SKETCH, wp, -20.0, -40.0).unwrap();
    sketch.distance(SKETCH, p5, p6, 65.7, Some(wp)).unwrap();
    sketch.distance(SKETCH, p6, p7, 49.0, Some(wp)).unwrap();
    sketch.distance(SKETCH, p5, p7, 36.7, Some(wp)).unwrap();

    sketch.distance(SKETCH, p1, p3, 50.0, Some(wp)).unwrap();
    sketch.distance(SKETCH, p1, p7, 61.9, Some(wp)).unwrap();

    let p8 = sketch.add_point_2d(SKETCH, wp, 20.0, 0.0).unwrap();
    let line_base = sketch.add_line_2d(SKETCH, wp, p0, p8).unwrap();
    sketch
        .angle(SKETCH, line0, line_base, 45.0, false, Some(wp))
        .unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    assert_point(&sketch, p8, 18.93036, 13.63778);
}

#[test]
fn test_nut_cracker() {
    let h0 = 0.5;
    let b0 = 0.75;
    let r0 = 0.25;
    let n1 = 1.5;
    let n2 = 2.3;
    let l0 = 3.25;

    let (mut sketch, wp) = base();
    let p0 = sketch.add_point_2d(SKETCH, wp, 0.0, 0.0).unwrap();
    sketch.dragged(SKETCH, p0, Some(wp)).unwrap();

    let p1 = sketch.add_point_2d(SKETCH, wp, 2.0, 2.0).unwrap();
    let p2 = sketch.add_point_2d(SKETCH, wp, 2.0, 0.0).unwrap();
    let line0 = sketch.add_line_2d(SKETCH, wp, p0, p2).unwrap();
    sketch.horizontal(SKETCH, line0, wp).unwrap();

    let line1 = sketch.add_line_2d(SKETCH, wp, p1, p2).unwrap();
    let p3 = sketch.add_point_2d(SKETCH, wp, b0 / 2.0, h0).unwrap();
    sketch.dragged(SKETCH, p3, Some(wp)).unwrap();
    let radius = sketch.distance(SKETCH, p3, line1, r0, Some(wp)).unwrap();
    sketch.distance(SKETCH, p0, p1, n1, Some(wp)).unwrap();
    sketch.distance(SKETCH, p1, p2, n2, Some(wp)).unwrap();

    let report = sketch.solve(SKETCH).unwrap();
    assert_eq!(report.status, SolveStatus::Okay);
    let x = sketch.params(p2).unwrap()[0];
    assert_abs_diff_eq!(x - b0 / 2.0, 1.01576, epsilon = 1e-4);

    // the pinned nut and the jaw dimension survive the solve
    let half_b0 = sketch.params(p3).unwrap()[0];
    let r0 = sketch.constraint(radius).unwrap().value().unwrap();
    assert_abs_diff_eq!(half_b0, b0 / 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(l0 - r0 - half_b0, 2.625, epsilon = 1e-4);
}
