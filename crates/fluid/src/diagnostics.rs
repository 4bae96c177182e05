//! Per-step counters and per-particle debug samples.

use std::fmt;

use glam::Vec2;
use serde::Serialize;

use crate::particle::ParticleId;

/// Transient warnings aggregated over all substeps of the last `step` call.
///
/// Nothing counted here interrupts a step: the affected particle or pair is
/// left out of that computation for that substep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StepDiagnostics {
    /// Substeps actually run.
    pub substeps: u32,
    /// Grid insertions rejected because the cell was full.
    pub cell_overflows: usize,
    /// Grid insertions rejected because the particle was outside the area.
    pub out_of_area: usize,
    /// Neighbor matches dropped at `max_neighbors_per_particle`.
    pub neighbor_overflows: usize,
    /// Non-finite positions reset during the boundary pre-clamp.
    pub non_finite_resets: usize,
    /// Velocities clamped to `max_speed` (or zeroed when non-finite).
    pub velocity_clamps: usize,
    /// Step calls ignored for a non-finite or non-positive `dt`.
    pub invalid_dt: usize,
    /// Alerts reported at the end of the step.
    pub proximity_alerts: usize,
    /// More alerts matched than `max_proximity_alerts`.
    pub proximity_maxed_out: bool,
}

impl StepDiagnostics {
    /// Any counter that a driver might want to surface.
    pub fn has_warnings(&self) -> bool {
        self.cell_overflows > 0
            || self.out_of_area > 0
            || self.neighbor_overflows > 0
            || self.non_finite_resets > 0
            || self.velocity_clamps > 0
            || self.invalid_dt > 0
            || self.proximity_maxed_out
    }
}

impl fmt::Display for StepDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "substeps={} cell_overflows={} out_of_area={} neighbor_overflows={} \
             non_finite_resets={} velocity_clamps={} invalid_dt={} alerts={}{}",
            self.substeps,
            self.cell_overflows,
            self.out_of_area,
            self.neighbor_overflows,
            self.non_finite_resets,
            self.velocity_clamps,
            self.invalid_dt,
            self.proximity_alerts,
            if self.proximity_maxed_out { " (maxed out)" } else { "" },
        )
    }
}

/// Per-particle vectors from the last substep, for tooling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DebugSample {
    pub id: ParticleId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Displacement applied by double-density relaxation.
    pub relaxation: Vec2,
    /// Velocity change from the viscosity pass.
    pub viscosity: Vec2,
    /// Position correction from boundary collision.
    pub boundary: Vec2,
    pub density: f32,
    pub near_density: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_warnings() {
        assert!(!StepDiagnostics::default().has_warnings());
    }

    #[test]
    fn test_any_counter_is_a_warning() {
        let d = StepDiagnostics {
            neighbor_overflows: 3,
            ..Default::default()
        };
        assert!(d.has_warnings());
        assert!(d.to_string().contains("neighbor_overflows=3"));
    }

    #[test]
    fn test_alert_count_alone_is_not_a_warning() {
        let d = StepDiagnostics {
            substeps: 3,
            proximity_alerts: 12,
            ..Default::default()
        };
        assert!(!d.has_warnings());
    }
}
