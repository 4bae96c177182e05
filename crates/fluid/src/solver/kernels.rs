//! Per-substep stage kernels.
//!
//! Each kernel takes the particle slots plus whatever scratch it needs and
//! runs through [`crate::exec`]. Kernels never write another particle's state
//! in place; the relaxation transfer goes through the pair buffer and a
//! sequential reduction.

use glam::Vec2;

use super::boundary::Walls;
use crate::exec::{self, ExecutionMode};
use crate::neighbors::NeighborSearch;
use crate::particle::Particle;
use crate::substance::SubstanceParams;

/// Per-particle values from the last substep, read back by `debug_sample`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticleScratch {
    pub density: f32,
    pub near_density: f32,
    pub relaxation: Vec2,
    pub viscosity: Vec2,
    pub boundary: Vec2,
}

/// Inputs shared by every kernel of one substep.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub mode: ExecutionMode,
    pub params: &'a [SubstanceParams],
    /// Substep duration.
    pub dt: f32,
    pub radius: f32,
    pub gravity: f32,
    pub drag: f32,
    pub max_speed: f32,
    pub walls: Walls,
}

impl StageContext<'_> {
    #[inline]
    fn params_of(&self, p: &Particle) -> &SubstanceParams {
        &self.params[p.substance.index()]
    }

    #[inline]
    fn is_solid(&self, p: &Particle) -> bool {
        self.params_of(p).solid
    }
}

/// Stage 1: gravity and drag on non-solid particles, then the speed clamp.
///
/// Returns the number of velocities clamped or zeroed.
pub fn apply_gravity(ctx: &StageContext<'_>, particles: &mut [Particle]) -> usize {
    let down = Vec2::NEG_Y * ctx.gravity * ctx.dt;
    let damping = (1.0 - ctx.drag * ctx.dt).max(0.0);
    let max_speed_sq = ctx.max_speed * ctx.max_speed;

    exec::count_mut(ctx.mode, particles, |_, p| {
        if !p.active || ctx.is_solid(p) {
            return false;
        }
        let factor = ctx.params_of(p).gravity_factor;
        p.velocity += down * factor;
        p.velocity *= damping;

        if !p.velocity.is_finite() {
            p.velocity = Vec2::ZERO;
            return true;
        }
        if p.velocity.length_squared() > max_speed_sq {
            // Rescale before normalizing: the squared length may have overflowed.
            let dir = (p.velocity / p.velocity.abs().max_element()).normalize_or_zero();
            p.velocity = dir * ctx.max_speed;
            return true;
        }
        false
    })
}

/// Copy positions and velocities so stages can read neighbors while writing.
pub fn snapshot(particles: &[Particle], positions: &mut [Vec2], velocities: &mut [Vec2]) {
    for ((p, pos), vel) in particles.iter().zip(positions.iter_mut()).zip(velocities.iter_mut()) {
        *pos = p.position;
        *vel = p.velocity;
    }
}

/// Stage 2: one-sided viscosity impulse.
///
/// Each particle only changes its own velocity, reading its neighbors from the
/// snapshot, so the pair impulse is not mirrored onto `j`.
pub fn apply_viscosity(
    ctx: &StageContext<'_>,
    particles: &mut [Particle],
    scratch: &mut [ParticleScratch],
    neighbors: &NeighborSearch,
    positions: &[Vec2],
    velocities: &[Vec2],
) {
    exec::for_each_zip_mut(ctx.mode, particles, scratch, |i, p, s| {
        s.viscosity = Vec2::ZERO;
        if !p.active {
            return;
        }
        let prm = ctx.params_of(p);
        if prm.solid || (prm.viscosity_sigma == 0.0 && prm.viscosity_beta == 0.0) {
            return;
        }

        let mut impulse = Vec2::ZERO;
        for &j in neighbors.neighbors_of(i) {
            let j = j as usize;
            let rij = positions[j] - positions[i];
            let dist = rij.length();
            let q = dist / ctx.radius;
            if q >= 1.0 || dist <= 0.0 {
                continue;
            }
            let dir = rij / dist;
            let u = (velocities[i] - velocities[j]).dot(dir);
            if u > 0.0 {
                let strength = ctx.dt * (1.0 - q) * (prm.viscosity_sigma * u + prm.viscosity_beta * u * u);
                impulse -= dir * strength;
            }
        }
        p.velocity += impulse;
        s.viscosity = impulse;
    });
}

/// Stage 3: remember the substep start, move non-solid particles.
pub fn advect(ctx: &StageContext<'_>, particles: &mut [Particle]) {
    exec::for_each_mut(ctx.mode, particles, |_, p| {
        if !p.active {
            return;
        }
        p.previous_position = p.position;
        if !ctx.is_solid(p) {
            p.position += p.velocity * ctx.dt;
        }
    });
}

/// Stage 5: pull stray particles back inside the area before the density pass.
///
/// Non-finite positions are reset to the substep start (or the area center if
/// that is not finite either) with zero velocity. Returns how many were reset.
pub fn pre_clamp(ctx: &StageContext<'_>, particles: &mut [Particle]) -> usize {
    let bounds = ctx.walls.bounds;
    exec::count_mut(ctx.mode, particles, |_, p| {
        if !p.active {
            return false;
        }
        if !p.position.is_finite() {
            p.position = if p.previous_position.is_finite() {
                bounds.clamp(p.previous_position)
            } else {
                bounds.center()
            };
            p.previous_position = p.position;
            p.velocity = Vec2::ZERO;
            return true;
        }
        if !bounds.contains(p.position) {
            p.position = bounds.clamp(p.position);
        }
        false
    })
}

/// Direction from `i` to `j`, with a fixed axis for coincident particles so
/// they can still be pushed apart.
#[inline]
fn pair_direction(i: usize, j: usize, rij: Vec2, dist: f32) -> Vec2 {
    if dist > 0.0 {
        rij / dist
    } else if i < j {
        Vec2::X
    } else {
        Vec2::NEG_X
    }
}

/// Stage 6: double-density relaxation.
///
/// Four passes: densities, per-pair displacements into `pairs` (stride =
/// neighbor cap), a sequential reduction into `pending`, and application to
/// non-solid particles.
pub fn relax(
    ctx: &StageContext<'_>,
    particles: &mut [Particle],
    scratch: &mut [ParticleScratch],
    neighbors: &NeighborSearch,
    pairs: &mut [Vec2],
    pending: &mut [Vec2],
) {
    let n = particles.len();
    let stride = neighbors.stride();
    let dt_sq = ctx.dt * ctx.dt;

    {
        let particles: &[Particle] = particles;
        exec::for_each_mut(ctx.mode, scratch, |i, s| {
            s.density = 0.0;
            s.near_density = 0.0;
            let pi = &particles[i];
            if !pi.active {
                return;
            }
            for &j in neighbors.neighbors_of(i) {
                let q = pi.position.distance(particles[j as usize].position) / ctx.radius;
                if q < 1.0 {
                    let w = 1.0 - q;
                    s.density += w * w;
                    s.near_density += w * w * w;
                }
            }
        });

        let scratch: &[ParticleScratch] = scratch;
        exec::for_each_chunk_mut(ctx.mode, &mut pairs[..n * stride], stride, |i, out| {
            let pi = &particles[i];
            if !pi.active {
                return;
            }
            let prm = ctx.params_of(pi);
            let pressure = prm.stiffness * (scratch[i].density - prm.rest_density);
            let near_pressure = prm.near_stiffness * scratch[i].near_density;
            for (k, &j) in neighbors.neighbors_of(i).iter().enumerate() {
                let j = j as usize;
                let rij = particles[j].position - pi.position;
                let dist = rij.length();
                let q = dist / ctx.radius;
                out[k] = if q < 1.0 {
                    let w = 1.0 - q;
                    let magnitude = dt_sq * (pressure * w + near_pressure * w * w);
                    pair_direction(i, j, rij, dist) * magnitude
                } else {
                    Vec2::ZERO
                };
            }
        });

        pending[..n].fill(Vec2::ZERO);
        for i in 0..n {
            if !particles[i].active {
                continue;
            }
            for (k, &j) in neighbors.neighbors_of(i).iter().enumerate() {
                let half = pairs[i * stride + k] * 0.5;
                let j = j as usize;
                if !ctx.is_solid(&particles[j]) {
                    pending[j] += half;
                }
                pending[i] -= half;
            }
        }
    }

    let pending: &[Vec2] = pending;
    exec::for_each_zip_mut(ctx.mode, particles, scratch, |i, p, s| {
        if p.active && !ctx.is_solid(p) {
            p.position += pending[i];
            s.relaxation = pending[i];
        } else {
            s.relaxation = Vec2::ZERO;
        }
    });
}

/// Stage 7: wall collision for non-solid particles.
pub fn resolve_boundaries(ctx: &StageContext<'_>, particles: &mut [Particle], scratch: &mut [ParticleScratch]) {
    exec::for_each_zip_mut(ctx.mode, particles, scratch, |_, p, s| {
        s.boundary = Vec2::ZERO;
        if !p.active || ctx.is_solid(p) {
            return;
        }
        let corrected = ctx.walls.collide(p.previous_position, p.position);
        s.boundary = corrected - p.position;
        p.position = corrected;
    });
}

/// Stage 8: velocity from realized displacement.
///
/// A displacement too large for the substep yields a non-finite velocity,
/// which is zeroed. Returns how many were zeroed.
pub fn reconstruct_velocity(ctx: &StageContext<'_>, particles: &mut [Particle]) -> usize {
    let inv_dt = 1.0 / ctx.dt;
    exec::count_mut(ctx.mode, particles, |_, p| {
        if !p.active {
            return false;
        }
        p.velocity = (p.position - p.previous_position) * inv_dt;
        if !p.velocity.is_finite() {
            p.velocity = Vec2::ZERO;
            return true;
        }
        false
    })
}
