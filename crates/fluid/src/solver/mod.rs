//! The sub-stepped particle solver.
//!
//! `Solver` owns the particle store and every scratch buffer. Buffers are
//! sized from the settings at construction; a step never allocates.

mod boundary;
mod kernels;

use glam::Vec2;

use crate::diagnostics::{DebugSample, StepDiagnostics};
use crate::error::{Error, Result};
use crate::grid::{Insertion, SpatialGrid};
use crate::neighbors::NeighborSearch;
use crate::particle::{Particle, ParticleId, ParticleSnapshot, ParticleStore};
use crate::proximity::{ProximityAlert, ProximityAlertEngine, ProximityAlertRequest};
use crate::settings::{Rect, SimulationSettings};
use crate::substance::{Substance, SubstanceId, SubstanceTable};

pub use boundary::BOUNDARY_EPSILON;
use boundary::Walls;
use kernels::{ParticleScratch, StageContext};

pub struct Solver {
    settings: SimulationSettings,
    substances: SubstanceTable,
    store: ParticleStore,
    neighbors: NeighborSearch,
    proximity: ProximityAlertEngine,
    walls: Walls,

    // Per-slot scratch, `max_particles` long.
    scratch: Vec<ParticleScratch>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    pending: Vec<Vec2>,
    /// Per-pair relaxation displacements, `max_particles * max_neighbors`.
    pairs: Vec<Vec2>,

    /// Grid over current positions for area queries; refreshed lazily.
    query_grid: SpatialGrid,
    /// Slots the query grid could not hold (full cell or outside the area).
    query_spill: Vec<u32>,
    query_dirty: bool,
    /// Neighbor lists no longer match the slot layout (add/remove/clear).
    neighbors_dirty: bool,

    diagnostics: StepDiagnostics,
    step_count: u64,
}

impl Solver {
    /// Validate the configuration and allocate every buffer.
    ///
    /// Fails on invalid settings, an empty or invalid substance list, or bad
    /// proximity requests (unknown substance, bad range, duplicate pair).
    pub fn new(
        settings: SimulationSettings,
        substances: Vec<Substance>,
        proximity_requests: Vec<ProximityAlertRequest>,
    ) -> Result<Self> {
        settings.validate()?;
        let substances = SubstanceTable::new(substances)?;
        let proximity = ProximityAlertEngine::new(
            proximity_requests,
            &substances,
            settings.interaction_radius,
            settings.max_proximity_alerts,
        )?;

        let capacity = settings.max_particles;
        let neighbors = NeighborSearch::new(&settings);
        let grid = neighbors.grid();
        log::info!(
            "fluid solver: {} substances, {} requests, {}x{} grid of {} cells, capacity {}, {:?}",
            substances.len(),
            proximity.requests().len(),
            grid.width(),
            grid.height(),
            grid.cell_size(),
            capacity,
            settings.execution,
        );

        Ok(Self {
            walls: Walls::new(
                settings.area_bounds,
                settings.boundary_restitution,
                settings.boundary_friction,
            ),
            store: ParticleStore::with_capacity(capacity),
            scratch: vec![ParticleScratch::default(); capacity],
            positions: vec![Vec2::ZERO; capacity],
            velocities: vec![Vec2::ZERO; capacity],
            pending: vec![Vec2::ZERO; capacity],
            pairs: vec![Vec2::ZERO; capacity * neighbors.stride()],
            query_grid: SpatialGrid::from_settings(&settings),
            query_spill: Vec::new(),
            query_dirty: true,
            neighbors_dirty: true,
            neighbors,
            proximity,
            substances,
            settings,
            diagnostics: StepDiagnostics::default(),
            step_count: 0,
        })
    }

    pub fn add_particle(&mut self, position: Vec2, velocity: Vec2, substance: SubstanceId) -> Result<ParticleId> {
        if !self.substances.contains(substance) {
            return Err(Error::UnknownSubstance(substance));
        }
        let id = self.store.add(position, velocity, substance)?;
        self.scratch[id.index as usize] = ParticleScratch::default();
        self.mark_dirty();
        Ok(id)
    }

    pub fn remove_particle(&mut self, id: ParticleId) -> Result<()> {
        self.store.remove(id)?;
        self.mark_dirty();
        Ok(())
    }

    /// Snapshot copy of one particle.
    pub fn particle(&self, id: ParticleId) -> Result<Particle> {
        self.store.get(id).copied()
    }

    /// Remove every particle. Previously issued ids become invalid.
    pub fn clear(&mut self) {
        self.store.clear();
        self.neighbors.reset();
        self.proximity.reset();
        self.mark_dirty();
        log::debug!("solver cleared");
    }

    fn mark_dirty(&mut self) {
        self.query_dirty = true;
        self.neighbors_dirty = true;
    }

    /// Advance by `dt`, split into `sub_step_count` substeps.
    ///
    /// A `dt` whose substep duration is not finite and positive (including a
    /// tiny `dt` that underflows once split) does nothing except clear the
    /// previous alerts and record `invalid_dt`.
    pub fn step(&mut self, dt: f32) {
        let dt_sub = self.settings.sub_dt(dt);
        if !dt_sub.is_finite() || dt_sub <= 0.0 || !(1.0 / dt_sub).is_finite() {
            log::warn!("step ignored: invalid dt {dt} (substep {dt_sub})");
            self.proximity.reset();
            self.diagnostics = StepDiagnostics {
                invalid_dt: 1,
                ..Default::default()
            };
            return;
        }

        let mut diag = StepDiagnostics::default();
        if self.neighbors_dirty {
            // Viscosity on the first substep reads the lists, so they must match the slots.
            self.neighbors.rebuild(self.store.slots(), self.settings.execution);
            self.neighbors_dirty = false;
        }

        for _ in 0..self.settings.sub_step_count {
            self.substep(dt_sub, &mut diag);
        }

        self.proximity.scan(self.store.slots(), &self.neighbors);
        diag.proximity_alerts = self.proximity.alerts().len();
        diag.proximity_maxed_out = self.proximity.maxed_out();

        self.query_dirty = true;
        self.step_count += 1;
        if diag.has_warnings() {
            log::warn!("step {}: {}", self.step_count, diag);
        } else {
            log::trace!("step {}: {}", self.step_count, diag);
        }
        self.diagnostics = diag;
    }

    fn substep(&mut self, dt: f32, diag: &mut StepDiagnostics) {
        let n = self.store.slots().len();
        let mode = self.settings.execution;
        let ctx = StageContext {
            mode,
            params: self.substances.params(),
            dt,
            radius: self.settings.interaction_radius,
            gravity: self.settings.gravity,
            drag: self.settings.drag,
            max_speed: self.settings.max_speed,
            walls: self.walls,
        };
        let particles = self.store.slots_mut();
        let scratch = &mut self.scratch[..n];

        // 1. Gravity, drag, speed clamp
        diag.velocity_clamps += kernels::apply_gravity(&ctx, particles);

        // 2. Viscosity
        if self.settings.viscosity_enabled {
            let positions = &mut self.positions[..n];
            let velocities = &mut self.velocities[..n];
            kernels::snapshot(particles, positions, velocities);
            kernels::apply_viscosity(&ctx, particles, scratch, &self.neighbors, positions, velocities);
        } else {
            scratch.iter_mut().for_each(|s| s.viscosity = Vec2::ZERO);
        }

        // 3. Advection
        kernels::advect(&ctx, particles);

        // 4. Neighbor rebuild
        self.neighbors.rebuild(particles, mode);
        diag.cell_overflows += self.neighbors.grid().cell_overflows();
        diag.out_of_area += self.neighbors.grid().out_of_bounds();
        diag.neighbor_overflows += self.neighbors.overflows();

        // 5. Boundary pre-clamp
        diag.non_finite_resets += kernels::pre_clamp(&ctx, particles);

        // 6. Double-density relaxation
        kernels::relax(&ctx, particles, scratch, &self.neighbors, &mut self.pairs, &mut self.pending);

        // 7. Boundary collision
        kernels::resolve_boundaries(&ctx, particles, scratch);

        // 8. Velocity reconstruction
        diag.velocity_clamps += kernels::reconstruct_velocity(&ctx, particles);

        diag.substeps += 1;
    }

    fn refresh_query_grid(&mut self) {
        if !self.query_dirty {
            return;
        }
        self.query_grid.clear();
        self.query_spill.clear();
        for (i, p) in self.store.slots().iter().enumerate() {
            if p.active && self.query_grid.insert(i as u32, p.position) != Insertion::Inserted {
                self.query_spill.push(i as u32);
            }
        }
        self.query_dirty = false;
    }

    fn collect_ids<F>(&self, candidates: Vec<u32>, keep: F) -> Vec<ParticleId>
    where
        F: Fn(Vec2) -> bool,
    {
        let slots = self.store.slots();
        candidates
            .into_iter()
            .chain(self.query_spill.iter().copied())
            .map(|i| &slots[i as usize])
            .filter(|p| p.active && keep(p.position))
            .map(|p| p.id)
            .collect()
    }

    /// Ids of particles inside `rect` (inclusive).
    pub fn particles_in_rect(&mut self, rect: &Rect) -> Vec<ParticleId> {
        self.refresh_query_grid();
        let candidates = self.query_grid.query_rect(rect);
        self.collect_ids(candidates, |p| rect.contains(p))
    }

    /// Ids of particles within `radius` of `center`.
    pub fn particles_in_circle(&mut self, center: Vec2, radius: f32) -> Vec<ParticleId> {
        self.refresh_query_grid();
        let slots = self.store.slots();
        let candidates = self
            .query_grid
            .query_circle(center, radius, |i| slots[i as usize].position);
        let r2 = radius.max(0.0) * radius.max(0.0);
        self.collect_ids(candidates, |p| p.distance_squared(center) <= r2)
    }

    /// Alerts from the last step. Cleared by the next call to `step`.
    #[inline]
    pub fn proximity_alerts(&self) -> &[ProximityAlert] {
        self.proximity.alerts()
    }

    #[inline]
    pub fn proximity_maxed_out(&self) -> bool {
        self.proximity.maxed_out()
    }

    /// Position plus the per-stage vectors of the last substep.
    pub fn debug_sample(&self, id: ParticleId) -> Result<DebugSample> {
        let p = self.store.get(id)?;
        let s = &self.scratch[id.index as usize];
        Ok(DebugSample {
            id,
            position: p.position,
            velocity: p.velocity,
            relaxation: s.relaxation,
            viscosity: s.viscosity,
            boundary: s.boundary,
            density: s.density,
            near_density: s.near_density,
        })
    }

    /// Counters of the last `step` call.
    #[inline]
    pub fn diagnostics(&self) -> StepDiagnostics {
        self.diagnostics
    }

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.store.len()
    }

    /// Active particles in slot order.
    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.store.iter()
    }

    /// Replace `out` with upload-ready copies of every active particle.
    pub fn write_snapshots(&self, out: &mut Vec<ParticleSnapshot>) {
        out.clear();
        out.extend(self.store.iter().map(ParticleSnapshot::from));
    }

    #[inline]
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    #[inline]
    pub fn substances(&self) -> &SubstanceTable {
        &self.substances
    }

    /// Number of completed (non-ignored) steps.
    #[inline]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ExecutionMode;

    const WATER: SubstanceId = SubstanceId(0);
    const STONE: SubstanceId = SubstanceId(1);

    fn settings() -> SimulationSettings {
        SimulationSettings {
            interaction_radius: 1.0,
            area_bounds: Rect::new(Vec2::ZERO, Vec2::splat(20.0)),
            max_particles: 256,
            execution: ExecutionMode::Serial,
            ..Default::default()
        }
    }

    fn solver() -> Solver {
        Solver::new(settings(), vec![Substance::water(), Substance::stone()], Vec::new()).unwrap()
    }

    #[test]
    fn test_invalid_settings_are_fatal() {
        let s = SimulationSettings {
            sub_step_count: 0,
            ..settings()
        };
        assert!(matches!(
            Solver::new(s, vec![Substance::water()], Vec::new()),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_unknown_substance_rejected_on_add() {
        let mut solver = solver();
        let err = solver
            .add_particle(Vec2::ONE, Vec2::ZERO, SubstanceId(7))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSubstance(SubstanceId(7))));
        assert_eq!(solver.particle_count(), 0);
    }

    #[test]
    fn test_particle_falls_under_gravity() {
        let mut solver = solver();
        let id = solver.add_particle(Vec2::new(10.0, 10.0), Vec2::ZERO, WATER).unwrap();
        for _ in 0..10 {
            solver.step(1.0 / 60.0);
        }
        let p = solver.particle(id).unwrap();
        assert!(p.position.y < 10.0, "particle should fall, y = {}", p.position.y);
        assert!(p.velocity.y < 0.0);
        assert!((p.position.x - 10.0).abs() < 1e-5, "no sideways drift alone");
        assert_eq!(solver.step_count(), 10);
    }

    #[test]
    fn test_invalid_dt_is_noop() {
        let mut solver = solver();
        let id = solver.add_particle(Vec2::new(10.0, 10.0), Vec2::ONE, WATER).unwrap();
        for dt in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            solver.step(dt);
            assert_eq!(solver.diagnostics().invalid_dt, 1);
        }
        let p = solver.particle(id).unwrap();
        assert_eq!(p.position, Vec2::new(10.0, 10.0));
        assert_eq!(p.velocity, Vec2::ONE);
        assert_eq!(solver.step_count(), 0);
    }

    #[test]
    fn test_underflowing_dt_is_noop() {
        let mut solver = solver();
        let water = solver.add_particle(Vec2::new(10.0, 10.0), Vec2::ONE, WATER).unwrap();
        let stone = solver.add_particle(Vec2::new(5.0, 5.0), Vec2::ZERO, STONE).unwrap();
        // Positive, but zero once divided into substeps.
        let dt = f32::from_bits(1);
        assert!(dt > 0.0);
        solver.step(dt);

        let diag = solver.diagnostics();
        assert_eq!(diag.invalid_dt, 1, "diagnostics: {diag}");
        assert_eq!(diag.velocity_clamps, 0, "diagnostics: {diag}");
        let w = solver.particle(water).unwrap();
        let s = solver.particle(stone).unwrap();
        assert_eq!(w.velocity, Vec2::ONE);
        assert_eq!(s.velocity, Vec2::ZERO);
        assert_eq!(s.position, Vec2::new(5.0, 5.0));
        assert_eq!(solver.step_count(), 0);
    }

    #[test]
    fn test_queries_refresh_after_step() {
        let mut solver = solver();
        let id = solver.add_particle(Vec2::new(10.0, 0.5), Vec2::new(0.0, 0.0), WATER).unwrap();
        solver.add_particle(Vec2::new(15.0, 15.0), Vec2::ZERO, STONE).unwrap();
        let near_floor = Rect::new(Vec2::new(9.0, 0.0), Vec2::new(11.0, 1.0));
        assert_eq!(solver.particles_in_rect(&near_floor), vec![id]);
        for _ in 0..30 {
            solver.step(1.0 / 60.0);
        }
        // Resting on the floor: still in the strip.
        assert_eq!(solver.particles_in_rect(&near_floor), vec![id]);
        let circle = solver.particles_in_circle(Vec2::new(15.0, 15.0), 0.1);
        assert_eq!(circle.len(), 1);
    }

    #[test]
    fn test_queries_see_spilled_particles() {
        let s = SimulationSettings {
            max_particles_per_cell: 2,
            ..settings()
        };
        let mut solver = Solver::new(s, vec![Substance::water()], Vec::new()).unwrap();
        for _ in 0..5 {
            solver.add_particle(Vec2::splat(3.5), Vec2::ZERO, WATER).unwrap();
        }
        let found = solver.particles_in_circle(Vec2::splat(3.5), 0.01);
        assert_eq!(found.len(), 5, "overflowing the query grid must not hide particles");
    }

    #[test]
    fn test_debug_sample_tracks_particle() {
        let mut solver = solver();
        let a = solver.add_particle(Vec2::new(5.0, 5.0), Vec2::ZERO, WATER).unwrap();
        solver.add_particle(Vec2::new(5.3, 5.0), Vec2::ZERO, WATER).unwrap();
        solver.step(1.0 / 60.0);
        let sample = solver.debug_sample(a).unwrap();
        assert_eq!(sample.id, a);
        assert_eq!(sample.position, solver.particle(a).unwrap().position);
        assert!(sample.density > 0.0, "has a neighbor");
        assert!(sample.relaxation.length() > 0.0);
    }

    #[test]
    fn test_write_snapshots_matches_particles() {
        let mut solver = solver();
        solver.add_particle(Vec2::new(1.0, 2.0), Vec2::ZERO, WATER).unwrap();
        let b = solver.add_particle(Vec2::new(3.0, 4.0), Vec2::ZERO, STONE).unwrap();
        let mut out = vec![ParticleSnapshot::default(); 9];
        solver.write_snapshots(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].position, [3.0, 4.0]);
        assert_eq!(out[1].substance, 1);
        assert_eq!(out[1].index, b.index);
    }
}
