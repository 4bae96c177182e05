//! 2D viscoelastic particle fluid simulation.
//!
//! Position-based double-density relaxation (Clavet et al.) over liquids,
//! gases and static solids, with a uniform spatial grid for neighbor search,
//! sub-stepped integration, wall confinement and cross-substance proximity
//! alerts. The crate has no rendering or windowing; a driver calls
//! [`Solver::step`] once per tick and reads particle state back.
//!
//! # Example
//!
//! ```
//! use fluid::{Rect, SimulationSettings, Solver, Substance, SubstanceId, Vec2};
//!
//! let settings = SimulationSettings {
//!     area_bounds: Rect::new(Vec2::ZERO, Vec2::new(8.0, 8.0)),
//!     max_particles: 1024,
//!     ..Default::default()
//! };
//! let mut solver = Solver::new(settings, vec![Substance::water()], Vec::new()).unwrap();
//! let id = solver
//!     .add_particle(Vec2::new(4.0, 4.0), Vec2::ZERO, SubstanceId(0))
//!     .unwrap();
//!
//! for _ in 0..60 {
//!     solver.step(1.0 / 60.0);
//! }
//! assert!(solver.particle(id).unwrap().position.y < 4.0);
//! ```

pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod grid;
pub mod neighbors;
pub mod particle;
pub mod proximity;
pub mod scenario;
pub mod settings;
pub mod solver;
pub mod substance;

pub use diagnostics::{DebugSample, StepDiagnostics};
pub use error::{Error, Result};
pub use glam::Vec2;
pub use grid::{Insertion, SpatialGrid};
pub use neighbors::NeighborSearch;
pub use particle::{Particle, ParticleId, ParticleSnapshot, ParticleStore};
pub use proximity::{ProximityAlert, ProximityAlertEngine, ProximityAlertRequest};
pub use scenario::{Scenario, SpawnBlock};
pub use settings::{ExecutionMode, Rect, SimulationSettings};
pub use solver::{Solver, BOUNDARY_EPSILON};
pub use substance::{Substance, SubstanceId, SubstanceKind, SubstanceParams, SubstanceTable};
