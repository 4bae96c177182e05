//! Headless dam break driven by a JSON scenario.
//!
//! Run with: RUST_LOG=info cargo run --release --example dam_break -p fluid [scenario.json] [frames]

use std::path::PathBuf;

use fluid::{Scenario, SubstanceId};

fn main() -> fluid::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios/dam_break.json"));
    let frames: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(600);

    let scenario = Scenario::load_json(&path)?;
    let mut solver = scenario.build()?;
    let mut snapshots = Vec::new();
    let dt = 1.0 / 60.0;

    for frame in 0..frames {
        solver.step(dt);

        for alert in solver.proximity_alerts() {
            log::debug!(
                "frame {frame}: {} within {:.3} of {} (request {})",
                alert.first,
                alert.distance,
                alert.second,
                alert.request
            );
        }

        if frame % 60 == 0 {
            solver.write_snapshots(&mut snapshots);
            let water: Vec<_> = snapshots
                .iter()
                .filter(|s| s.substance == SubstanceId(0).0)
                .collect();
            let front = water.iter().map(|s| s.position[0]).fold(0.0f32, f32::max);
            let mean_height =
                water.iter().map(|s| s.position[1]).sum::<f32>() / water.len().max(1) as f32;
            println!(
                "t={:5.2}s water front x={:6.2} mean height={:5.2} alerts={} | {}",
                frame as f32 * dt,
                front,
                mean_height,
                solver.proximity_alerts().len(),
                solver.diagnostics(),
            );
        }
    }

    if let Some(first) = solver.particles().next() {
        let sample = solver.debug_sample(first.id)?;
        println!("final sample: {sample:?}");
    }
    Ok(())
}
