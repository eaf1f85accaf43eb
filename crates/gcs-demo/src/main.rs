//! Reference linkages solved with gcs-core
//!
//! Usage: `gcs-demo [solver.ron]`. Each mechanism is built in a fresh
//! sketch, solved, and its report and key point positions are logged.

use std::process::ExitCode;

use gcs_core::{
    ConfigError, EntityId, GroupId, Sketch, SketchError, SolveReport, SolverConfig,
    make_quaternion,
};
use glam::DVec3;
use ron::ser::PrettyConfig;
use thiserror::Error;

const BASE: GroupId = GroupId::new(1);
const SKETCH: GroupId = GroupId::new(2);

#[derive(Debug, Error)]
enum DemoError {
    #[error("Sketch error: {0}")]
    Sketch(#[from] SketchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Report serialization error: {0}")]
    Report(#[from] ron::Error),
}

/// A solved mechanism and the points worth printing
struct Outcome {
    name: &'static str,
    sketch: Sketch,
    report: SolveReport,
    points: Vec<(&'static str, EntityId)>,
}

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcs_core=debug,gcs_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), DemoError> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("Loading solver configuration from {}", path);
            SolverConfig::load(path)?
        }
        None => SolverConfig::default(),
    };

    let outcomes = [
        workplane_demo(config.clone())?,
        crank_rocker(config.clone())?,
        jansen_linkage(config)?,
    ];
    for outcome in &outcomes {
        log_outcome(outcome)?;
    }
    Ok(())
}

fn log_outcome(outcome: &Outcome) -> Result<(), DemoError> {
    let report = ron::ser::to_string_pretty(&outcome.report, PrettyConfig::default())?;
    tracing::info!("{}:\n{}", outcome.name, report);
    for (label, point) in &outcome.points {
        let at = outcome.sketch.point_position(*point)?;
        tracing::info!("  {} = ({:.5}, {:.5})", label, at.x, at.y);
    }
    Ok(())
}

/// Line, arc and circle dimensioned in a workplane of their own
fn workplane_demo(config: SolverConfig) -> Result<Outcome, DemoError> {
    let mut sketch = Sketch::with_config(config);
    let origin = sketch.add_point_3d(BASE, DVec3::ZERO)?;
    let normal = sketch.add_normal_3d(BASE, make_quaternion(DVec3::X, DVec3::Y))?;
    let wp = sketch.add_workplane(BASE, origin, normal)?;

    let a = sketch.add_point_2d(SKETCH, wp, 10.0, 20.0)?;
    let b = sketch.add_point_2d(SKETCH, wp, 20.0, 10.0)?;
    let line = sketch.add_line_2d(SKETCH, wp, a, b)?;

    let center = sketch.add_point_2d(SKETCH, wp, 100.0, 120.0)?;
    let start = sketch.add_point_2d(SKETCH, wp, 120.0, 110.0)?;
    let end = sketch.add_point_2d(SKETCH, wp, 115.0, 115.0)?;
    let arc = sketch.add_arc(SKETCH, wp, normal, center, start, end)?;

    let circle_center = sketch.add_point_2d(SKETCH, wp, 200.0, 200.0)?;
    let radius = sketch.add_distance(SKETCH, wp, 30.0)?;
    let circle = sketch.add_circle(SKETCH, wp, normal, circle_center, radius)?;

    sketch.distance(SKETCH, a, b, 30.0, Some(wp))?;
    sketch.distance(SKETCH, origin, line, 10.0, Some(wp))?;
    sketch.vertical(SKETCH, line, wp)?;
    sketch.distance(SKETCH, a, origin, 15.0, Some(wp))?;
    sketch.equal(SKETCH, arc, circle, Some(wp))?;
    sketch.diameter(SKETCH, arc, 34.0)?;

    let report = sketch.solve(SKETCH)?;
    Ok(Outcome {
        name: "Workplane demo",
        sketch,
        report,
        points: vec![("line start", a), ("line end", b), ("arc center", center)],
    })
}

/// Four-bar linkage with a coupler triangle, crank at 45 degrees
fn crank_rocker(config: SolverConfig) -> Result<Outcome, DemoError> {
    let mut sketch = Sketch::with_config(config);
    let wp = sketch.add_base_2d(BASE)?;

    let p0 = sketch.add_point_2d(SKETCH, wp, 0.0, 0.0)?;
    sketch.dragged(SKETCH, p0, Some(wp))?;
    let p1 = sketch.add_point_2d(SKETCH, wp, 90.0, 0.0)?;
    sketch.dragged(SKETCH, p1, Some(wp))?;
    let ground = sketch.add_line_2d(SKETCH, wp, p0, p1)?;

    let p2 = sketch.add_point_2d(SKETCH, wp, 20.0, 20.0)?;
    let p3 = sketch.add_point_2d(SKETCH, wp, 0.0, 10.0)?;
    let p4 = sketch.add_point_2d(SKETCH, wp, 30.0, 20.0)?;
    sketch.distance(SKETCH, p2, p3, 40.0, Some(wp))?;
    sketch.distance(SKETCH, p2, p4, 40.0, Some(wp))?;
    sketch.distance(SKETCH, p3, p4, 70.0, Some(wp))?;
    sketch.distance(SKETCH, p0, p3, 35.0, Some(wp))?;
    sketch.distance(SKETCH, p1, p4, 70.0, Some(wp))?;

    let crank = sketch.add_line_2d(SKETCH, wp, p0, p3)?;
    sketch.angle(SKETCH, ground, crank, 45.0, false, Some(wp))?;

    let report = sketch.solve(SKETCH)?;
    Ok(Outcome {
        name: "Crank rocker",
        sketch,
        report,
        points: vec![("coupler", p2), ("crank tip", p3), ("rocker tip", p4)],
    })
}

/// Jansen's leg with the crank at 45 degrees
fn jansen_linkage(config: SolverConfig) -> Result<Outcome, DemoError> {
    let mut sketch = Sketch::with_config(config);
    let wp = sketch.add_base_2d(BASE)?;

    let p0 = sketch.add_point_2d(SKETCH, wp, 0.0, 0.0)?;
    sketch.dragged(SKETCH, p0, Some(wp))?;
    let p1 = sketch.add_point_2d(SKETCH, wp, 0.0, 20.0)?;
    sketch.distance(SKETCH, p0, p1, 15.0, Some(wp))?;
    let crank = sketch.add_line_2d(SKETCH, wp, p0, p1)?;

    let p2 = sketch.add_point_2d(SKETCH, wp, -38.0, -7.8)?;
    sketch.dragged(SKETCH, p2, Some(wp))?;
    let p3 = sketch.add_point_2d(SKETCH, wp, -50.0, 30.0)?;
    let p4 = sketch.add_point_2d(SKETCH, wp, -70.0, -15.0)?;
    sketch.distance(SKETCH, p2, p3, 41.5, Some(wp))?;
    sketch.distance(SKETCH, p3, p4, 55.8, Some(wp))?;
    sketch.distance(SKETCH, p2, p4, 40.1, Some(wp))?;

    let p5 = sketch.add_point_2d(SKETCH, wp, -50.0, -50.0)?;
    let p6 = sketch.add_point_2d(SKETCH, wp, -10.0, -90.0)?;
    let p7 = sketch.add_point_2d(SKETCH, wp, -20.0, -40.0)?;
    sketch.distance(SKETCH, p5, p6, 65.7, Some(wp))?;
    sketch.distance(SKETCH, p6, p7, 49.0, Some(wp))?;
    sketch.distance(SKETCH, p5, p7, 36.7, Some(wp))?;

    sketch.distance(SKETCH, p1, p3, 50.0, Some(wp))?;
    sketch.distance(SKETCH, p1, p7, 61.9, Some(wp))?;

    let p8 = sketch.add_point_2d(SKETCH, wp, 20.0, 0.0)?;
    let base_line = sketch.add_line_2d(SKETCH, wp, p0, p8)?;
    sketch.angle(SKETCH, crank, base_line, 45.0, false, Some(wp))?;

    let report = sketch.solve(SKETCH)?;
    Ok(Outcome {
        name: "Jansen linkage",
        sketch,
        report,
        points: vec![("foot", p6), ("base", p8)],
    })
}
