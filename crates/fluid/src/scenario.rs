//! JSON scenario files: solver configuration plus initial particle blocks.
//!
//! A scenario bundles everything `Solver::new` needs with a list of spawn
//! blocks, so a headless driver can go from a file to a populated solver in
//! one call.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::proximity::ProximityAlertRequest;
use crate::settings::SimulationSettings;
use crate::solver::Solver;
use crate::substance::{Substance, SubstanceId};

/// Axis-aligned lattice of particles of one substance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnBlock {
    pub substance: SubstanceId,
    pub min: Vec2,
    pub max: Vec2,
    /// Lattice spacing. Points are placed from `min` while they stay `<= max`.
    pub spacing: f32,
    /// Initial velocity for every particle of the block.
    #[serde(default)]
    pub velocity: Vec2,
}

impl SpawnBlock {
    fn validate(&self, index: usize, max_particles: usize) -> Result<()> {
        if !self.spacing.is_finite() || self.spacing <= 0.0 {
            return Err(Error::InvalidSettings(format!(
                "spawn block #{index}: spacing must be finite and > 0, got {}",
                self.spacing
            )));
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.velocity.is_finite()) {
            return Err(Error::InvalidSettings(format!(
                "spawn block #{index}: min, max and velocity must be finite"
            )));
        }
        match self.lattice() {
            Some((cols, rows)) if cols * rows <= max_particles => Ok(()),
            _ => Err(Error::InvalidSettings(format!(
                "spawn block #{index}: lattice of spacing {} over {} .. {} exceeds max_particles {max_particles}",
                self.spacing, self.min, self.max
            ))),
        }
    }

    /// Column and row counts, or `None` if the spacing is unusable or the
    /// point count does not fit in `usize`.
    fn lattice(&self) -> Option<(usize, usize)> {
        if !self.spacing.is_finite() || self.spacing <= 0.0 {
            return None;
        }
        let extent = (self.max - self.min).max(Vec2::ZERO);
        let count = |e: f32| {
            let n = f64::from((e / self.spacing).floor()) + 1.0;
            (n.is_finite() && n < usize::MAX as f64).then_some(n as usize)
        };
        let (cols, rows) = (count(extent.x)?, count(extent.y)?);
        cols.checked_mul(rows).map(|_| (cols, rows))
    }

    /// Lattice points of the block, row by row from `min`.
    pub fn positions(&self) -> impl Iterator<Item = Vec2> + '_ {
        let (cols, rows) = self.lattice().unwrap_or((0, 0));
        (0..rows).flat_map(move |iy| {
            (0..cols).map(move |ix| self.min + Vec2::new(ix as f32, iy as f32) * self.spacing)
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: SimulationSettings,
    pub substances: Vec<Substance>,
    #[serde(default)]
    pub proximity_requests: Vec<ProximityAlertRequest>,
    #[serde(default)]
    pub spawn: Vec<SpawnBlock>,
}

impl Scenario {
    pub fn new(name: &str, substances: Vec<Substance>) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            settings: SimulationSettings::default(),
            substances,
            proximity_requests: Vec::new(),
            spawn: Vec::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load scenario from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let scenario = Self::from_json_str(&json)?;
        log::info!("loaded scenario '{}' from {}", scenario.name, path.display());
        Ok(scenario)
    }

    /// Save scenario to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Total particles the spawn blocks would create.
    pub fn spawn_count(&self) -> usize {
        self.spawn
            .iter()
            .filter_map(SpawnBlock::lattice)
            .fold(0usize, |total, (cols, rows)| total.saturating_add(cols * rows))
    }

    /// Construct the solver and add every spawn block's particles.
    pub fn build(&self) -> Result<Solver> {
        for (i, block) in self.spawn.iter().enumerate() {
            block.validate(i, self.settings.max_particles)?;
        }
        let mut solver = Solver::new(
            self.settings.clone(),
            self.substances.clone(),
            self.proximity_requests.clone(),
        )?;
        for block in &self.spawn {
            for position in block.positions() {
                solver.add_particle(position, block.velocity, block.substance)?;
            }
        }
        log::info!(
            "scenario '{}': spawned {} particles in {} blocks",
            self.name,
            solver.particle_count(),
            self.spawn.len()
        );
        Ok(solver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Rect;

    fn small() -> Scenario {
        let mut scenario = Scenario::new("small", vec![Substance::water(), Substance::stone()]);
        scenario.settings.area_bounds = Rect::new(Vec2::ZERO, Vec2::splat(10.0));
        scenario.settings.max_particles = 64;
        scenario.spawn.push(SpawnBlock {
            substance: SubstanceId(0),
            min: Vec2::new(1.0, 1.0),
            max: Vec2::new(2.0, 1.5),
            spacing: 0.5,
            velocity: Vec2::new(0.5, 0.0),
        });
        scenario
    }

    #[test]
    fn test_block_lattice_is_inclusive() {
        let s = small();
        let pts: Vec<Vec2> = s.spawn[0].positions().collect();
        assert_eq!(pts.len(), 6, "3 columns x 2 rows");
        assert_eq!(pts[0], Vec2::new(1.0, 1.0));
        assert_eq!(pts[5], Vec2::new(2.0, 1.5));
        assert_eq!(s.spawn_count(), 6);
    }

    #[test]
    fn test_build_populates_solver() {
        let solver = small().build().unwrap();
        assert_eq!(solver.particle_count(), 6);
        assert!(solver.particles().all(|p| p.velocity == Vec2::new(0.5, 0.0)));
    }

    #[test]
    fn test_json_round_trip() {
        let s = small();
        let json = s.to_json_string().unwrap();
        let back = Scenario::from_json_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "name": "bare",
            "substances": [{
                "kind": "liquid", "density": 1.0, "stiffness": 100.0,
                "near_stiffness": 300.0, "rest_density": 3.0,
                "viscosity_sigma": 0.1, "viscosity_beta": 0.0, "gravity_scale": 1.0
            }]
        }"#;
        let s = Scenario::from_json_str(json).unwrap();
        assert_eq!(s.settings, SimulationSettings::default());
        assert!(s.spawn.is_empty());
        assert_eq!(s.substances[0].density_pull_factor, 0.0);
    }

    #[test]
    fn test_bad_spacing_rejected() {
        let mut s = small();
        s.spawn[0].spacing = 0.0;
        assert!(matches!(s.build(), Err(Error::InvalidSettings(_))));
    }

    #[test]
    fn test_huge_lattice_rejected() {
        let mut s = small();
        s.spawn[0].min = Vec2::ZERO;
        s.spawn[0].max = Vec2::splat(1e30);
        s.spawn[0].spacing = 1e-30;
        assert!(matches!(s.build(), Err(Error::InvalidSettings(_))));
        assert_eq!(s.spawn_count(), 0, "unrepresentable block spawns nothing");
        assert_eq!(s.spawn[0].positions().count(), 0);

        // Representable, but larger than the solver could ever hold.
        s.spawn[0].max = Vec2::splat(100.0);
        s.spawn[0].spacing = 0.01;
        assert!(matches!(s.build(), Err(Error::InvalidSettings(_))));
    }

    #[test]
    fn test_overfull_scenario_hits_capacity() {
        let mut s = small();
        s.settings.max_particles = 8;
        let mut second = s.spawn[0].clone();
        second.min += Vec2::new(4.0, 4.0);
        second.max += Vec2::new(4.0, 4.0);
        s.spawn.push(second);
        // Each block fits on its own, together they do not.
        assert!(matches!(s.build(), Err(Error::CapacityExhausted { max: 8 })));
    }

    #[test]
    fn test_malformed_json_is_scenario_error() {
        assert!(matches!(Scenario::from_json_str("{ nope"), Err(Error::Scenario(_))));
    }
}
