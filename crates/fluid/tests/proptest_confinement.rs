//! Property-based tests for the particle solver using proptest
//!
//! These tests verify invariants across random initial conditions:
//! - No NaN values in positions/velocities, for any positive dt
//! - Particle count conservation
//! - Spatial bounds containment
//! - Proximity output never exceeds its capacity

use fluid::{ProximityAlertRequest, Rect, SimulationSettings, Solver, Substance, SubstanceId, Vec2};
use proptest::prelude::*;

// Simulation domain constants
const WIDTH: f32 = 10.0;
const HEIGHT: f32 = 6.0;
const RADIUS: f32 = 0.4;
const MAX_PARTICLES: usize = 400;
const DT: f32 = 1.0 / 60.0;

// Test configuration
const SIMULATION_STEPS: usize = 15;
const MAX_ALERTS: usize = 8;

fn settings() -> SimulationSettings {
    SimulationSettings {
        interaction_radius: RADIUS,
        area_bounds: Rect::new(Vec2::ZERO, Vec2::new(WIDTH, HEIGHT)),
        max_particles: MAX_PARTICLES,
        // Small caps so the overflow paths get exercised too.
        max_particles_per_cell: 8,
        max_neighbors_per_particle: 12,
        max_proximity_alerts: MAX_ALERTS,
        ..Default::default()
    }
}

/// Positions anywhere in the area, edges included
fn valid_position() -> impl Strategy<Value = Vec2> {
    (0.0f32..=WIDTH, 0.0f32..=HEIGHT).prop_map(|(x, y)| Vec2::new(x, y))
}

/// Velocities up to well past the speed clamp
fn valid_velocity() -> impl Strategy<Value = Vec2> {
    (-200.0f32..200.0f32, -200.0f32..200.0f32).prop_map(|(x, y)| Vec2::new(x, y))
}

/// Step durations from the smallest positive float up to very long frames
fn any_dt() -> impl Strategy<Value = f32> {
    prop_oneof![
        Just(f32::from_bits(1)),
        1e-40f32..1e-30f32,
        1e-6f32..1.0f32,
        1.0f32..=10.0f32,
    ]
}

/// A set of particles with substance ids 0..4
fn particle_set() -> impl Strategy<Value = Vec<(Vec2, Vec2, u32)>> {
    prop::collection::vec((valid_position(), valid_velocity(), 0u32..4), 1..=MAX_PARTICLES)
}

fn build(particles: &[(Vec2, Vec2, u32)]) -> Solver {
    let mut solver = Solver::new(
        settings(),
        vec![
            Substance::water(),
            Substance::oil(),
            Substance::steam(),
            Substance::stone(),
        ],
        vec![
            ProximityAlertRequest::new(SubstanceId(0), SubstanceId(2), RADIUS),
            ProximityAlertRequest::new(SubstanceId(1), SubstanceId(1), RADIUS * 0.5),
        ],
    )
    .expect("valid configuration");
    for &(pos, vel, substance) in particles {
        solver
            .add_particle(pos, vel, SubstanceId(substance))
            .expect("within capacity");
    }
    solver
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Property: particles never leave the area and never go non-finite
    #[test]
    fn test_positions_confined_and_finite(particles in particle_set()) {
        let mut solver = build(&particles);
        let bounds = settings().area_bounds.expand(fluid::BOUNDARY_EPSILON);

        for step in 0..SIMULATION_STEPS {
            solver.step(DT);
            for p in solver.particles() {
                prop_assert!(
                    p.position.is_finite() && bounds.contains(p.position),
                    "step {}: particle {} at {:?}", step, p.id, p.position
                );
                prop_assert!(
                    p.velocity.is_finite(),
                    "step {}: particle {} velocity {:?}", step, p.id, p.velocity
                );
            }
        }
    }

    /// Property: any positive dt, however small or large, keeps state finite
    #[test]
    fn test_extreme_dt_stays_finite(
        particles in particle_set(),
        dts in prop::collection::vec(any_dt(), 1..6),
    ) {
        let mut solver = build(&particles);
        let bounds = settings().area_bounds.expand(fluid::BOUNDARY_EPSILON);

        for dt in dts {
            solver.step(dt);
            for p in solver.particles() {
                prop_assert!(
                    p.position.is_finite() && bounds.contains(p.position),
                    "dt {:e}: particle {} at {:?}", dt, p.id, p.position
                );
                prop_assert!(
                    p.velocity.is_finite(),
                    "dt {:e}: particle {} velocity {:?}", dt, p.id, p.velocity
                );
            }
        }
    }

    /// Property: stepping never creates or destroys particles
    #[test]
    fn test_particle_count_conserved(particles in particle_set()) {
        let mut solver = build(&particles);
        for _ in 0..SIMULATION_STEPS {
            solver.step(DT);
        }
        prop_assert_eq!(solver.particle_count(), particles.len());
        prop_assert_eq!(solver.particles().count(), particles.len());
    }

    /// Property: alert output is bounded and every alert is within range
    #[test]
    fn test_alerts_bounded(particles in particle_set()) {
        let mut solver = build(&particles);
        for _ in 0..3 {
            solver.step(DT);
            let alerts = solver.proximity_alerts();
            prop_assert!(alerts.len() <= MAX_ALERTS);
            if solver.proximity_maxed_out() {
                prop_assert_eq!(alerts.len(), MAX_ALERTS);
            }
            for alert in alerts {
                let a = solver.particle(alert.first).unwrap();
                let b = solver.particle(alert.second).unwrap();
                let range = if alert.request == 0 { RADIUS } else { RADIUS * 0.5 };
                prop_assert!(a.position.distance(b.position) <= range + 1e-5);
                prop_assert!(alert.first != alert.second);
            }
        }
    }
}
