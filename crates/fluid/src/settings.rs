//! Solver configuration.
//!
//! Settings are validated once when the solver is built and never change
//! afterwards. All capacities here are hard upper bounds: buffers are sized
//! from them up front and never grow during a step.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on grid entry slots and on neighbor list entries.
///
/// Both buffers are allocated up front, so oversized settings are rejected
/// by `validate` instead of failing at allocation.
pub const MAX_BUFFER_SLOTS: usize = 1 << 26;

/// Axis-aligned rectangle in world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Inclusive containment. Non-finite points are never contained.
    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    #[inline]
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        p.clamp(self.min, self.max)
    }

    /// Rectangle shrunk by `amount` on every side (never inverted).
    pub fn shrink(&self, amount: f32) -> Self {
        let half = self.size() * 0.5;
        let d = Vec2::splat(amount).min(half);
        Self {
            min: self.min + d,
            max: self.max - d,
        }
    }

    /// Rectangle grown by `amount` on every side.
    pub fn expand(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// How per-particle stage work is scheduled.
///
/// Both modes run the same kernels and produce identical results; only the
/// scheduling differs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Plain sequential iteration on the calling thread.
    Serial,
    /// Data-parallel across particles on the rayon global pool.
    #[default]
    Parallel,
}

/// Immutable solver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Neighbor radius; also the spatial grid cell size.
    pub interaction_radius: f32,
    /// Gravity magnitude, applied along -Y.
    pub gravity: f32,
    /// Linear velocity damping per second.
    pub drag: f32,
    pub max_particles: usize,
    /// Particles are confined to this rectangle.
    pub area_bounds: Rect,
    pub max_particles_per_cell: usize,
    pub max_neighbors_per_particle: usize,
    pub sub_step_count: u32,
    pub viscosity_enabled: bool,
    /// Fraction of the normal displacement kept after a wall hit (0 = stick, 1 = mirror).
    pub boundary_restitution: f32,
    /// Fraction of the tangential displacement removed on a wall hit.
    pub boundary_friction: f32,
    /// Speeds above this are clamped during the gravity stage.
    pub max_speed: f32,
    /// Upper bound on alerts reported per step.
    pub max_proximity_alerts: usize,
    pub execution: ExecutionMode,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            interaction_radius: 0.5,
            gravity: 9.81,
            drag: 0.0,
            max_particles: 8192,
            area_bounds: Rect::new(Vec2::ZERO, Vec2::new(32.0, 18.0)),
            max_particles_per_cell: 32,
            max_neighbors_per_particle: 64,
            sub_step_count: 3,
            viscosity_enabled: true,
            boundary_restitution: 0.3,
            boundary_friction: 0.1,
            max_speed: 100.0,
            max_proximity_alerts: 256,
            execution: ExecutionMode::Parallel,
        }
    }
}

impl SimulationSettings {
    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        let r = self.interaction_radius;
        if !r.is_finite() || r <= 0.0 {
            return invalid(format!("interaction_radius must be finite and > 0, got {r}"));
        }
        let b = self.area_bounds;
        if !(b.min.is_finite() && b.max.is_finite()) {
            return invalid("area_bounds must be finite".to_string());
        }
        if b.width() <= 0.0 || b.height() <= 0.0 {
            return invalid(format!(
                "area_bounds must have positive width and height, got {}x{}",
                b.width(),
                b.height()
            ));
        }
        if !self.gravity.is_finite() {
            return invalid("gravity must be finite".to_string());
        }
        if !self.drag.is_finite() || self.drag < 0.0 {
            return invalid(format!("drag must be finite and >= 0, got {}", self.drag));
        }
        if self.max_particles == 0 || self.max_particles > u32::MAX as usize {
            return invalid(format!(
                "max_particles must be in 1..={}, got {}",
                u32::MAX,
                self.max_particles
            ));
        }
        if self.max_particles_per_cell == 0 {
            return invalid("max_particles_per_cell must be > 0".to_string());
        }
        if self.max_neighbors_per_particle == 0 {
            return invalid("max_neighbors_per_particle must be > 0".to_string());
        }
        if self.sub_step_count == 0 {
            return invalid("sub_step_count must be >= 1".to_string());
        }
        for (name, v) in [
            ("boundary_restitution", self.boundary_restitution),
            ("boundary_friction", self.boundary_friction),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return invalid(format!("{name} must be in [0, 1], got {v}"));
            }
        }
        if !self.max_speed.is_finite() || self.max_speed <= 0.0 {
            return invalid(format!("max_speed must be finite and > 0, got {}", self.max_speed));
        }

        let (w, h) = self.grid_dimensions();
        let cells = w.checked_mul(h);
        let grid_slots = cells.and_then(|c| c.checked_mul(self.max_particles_per_cell));
        if !matches!(grid_slots, Some(n) if n <= MAX_BUFFER_SLOTS) {
            return invalid(format!(
                "grid of {w}x{h} cells with {} slots each exceeds {MAX_BUFFER_SLOTS} slots",
                self.max_particles_per_cell
            ));
        }
        let neighbor_slots = self.max_particles.checked_mul(self.max_neighbors_per_particle);
        if !matches!(neighbor_slots, Some(n) if n <= MAX_BUFFER_SLOTS) {
            return invalid(format!(
                "{} particles x {} neighbors exceeds {MAX_BUFFER_SLOTS} list slots",
                self.max_particles, self.max_neighbors_per_particle
            ));
        }
        Ok(())
    }

    /// Grid cell count along x and y for the configured bounds.
    pub fn grid_dimensions(&self) -> (usize, usize) {
        let cs = self.interaction_radius;
        let w = (self.area_bounds.width() / cs).ceil().max(1.0);
        let h = (self.area_bounds.height() / cs).ceil().max(1.0);
        (w as usize, h as usize)
    }

    /// Duration of one substep.
    #[inline]
    pub fn sub_dt(&self, dt: f32) -> f32 {
        dt / self.sub_step_count as f32
    }
}

fn invalid(msg: String) -> Result<()> {
    Err(Error::InvalidSettings(msg))
}
