//! Quick benchmark for profiling the particle solver
//!
//! Run with: cargo run --release --example bench -p fluid
//! Profile with: cargo flamegraph --example bench -p fluid

use fluid::{ExecutionMode, Rect, SimulationSettings, Solver, Substance, SubstanceId, Vec2};
use std::time::Instant;

const WATER: SubstanceId = SubstanceId(0);

fn setup(execution: ExecutionMode) -> Solver {
    let settings = SimulationSettings {
        interaction_radius: 0.5,
        area_bounds: Rect::new(Vec2::ZERO, Vec2::new(48.0, 24.0)),
        max_particles: 16384,
        execution,
        ..Default::default()
    };
    let mut solver = Solver::new(
        settings,
        vec![Substance::water(), Substance::stone()],
        Vec::new(),
    )
    .expect("bench configuration is valid");

    // ~6000 water particles in a column, a stone ledge to pile against
    for iy in 0..75 {
        for ix in 0..80 {
            let p = Vec2::new(0.5 + ix as f32 * 0.25, 0.5 + iy as f32 * 0.25);
            solver.add_particle(p, Vec2::ZERO, WATER).expect("capacity");
        }
    }
    for ix in 0..40 {
        let p = Vec2::new(30.0 + ix as f32 * 0.2, 0.2);
        solver.add_particle(p, Vec2::ZERO, SubstanceId(1)).expect("capacity");
    }
    solver
}

fn run(execution: ExecutionMode) {
    const FRAMES: usize = 300; // 5 seconds at 60 FPS
    const DT: f32 = 1.0 / 60.0;

    let mut solver = setup(execution);
    println!("\n[{:?}] Initial particles: {}", execution, solver.particle_count());

    println!("Warming up (30 frames)...");
    for _ in 0..30 {
        solver.step(DT);
    }

    println!("Running {} frames...", FRAMES);
    let start = Instant::now();
    let mut overflows = 0;
    for frame in 0..FRAMES {
        solver.step(DT);
        let diag = solver.diagnostics();
        overflows += diag.cell_overflows + diag.neighbor_overflows;
        if frame % 60 == 0 {
            println!("  Frame {}: {}", frame, diag);
        }
    }

    let elapsed = start.elapsed();
    let avg_frame_time = elapsed.as_secs_f64() / FRAMES as f64;
    let fps = 1.0 / avg_frame_time;

    println!("=== Results ({:?}) ===", execution);
    println!("Total time: {:.2?}", elapsed);
    println!("Avg frame time: {:.2}ms", avg_frame_time * 1000.0);
    println!("Effective FPS: {:.1}", fps);
    println!("Dropped grid/neighbor entries: {}", overflows);

    if fps < 60.0 {
        println!("Below 60 FPS target - optimization needed");
    } else {
        println!("Meeting 60 FPS target");
    }
}

fn main() {
    env_logger::init();
    run(ExecutionMode::Serial);
    run(ExecutionMode::Parallel);
}
