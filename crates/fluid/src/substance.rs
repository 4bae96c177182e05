//! Substance kinds and their physical coefficients.
//!
//! Every particle references one substance by id. The table is validated and
//! flattened into [`SubstanceParams`] once at construction, so the per-substep
//! kernels only ever index a slice of plain numbers and never branch on kind
//! beyond the `solid` flag.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Index into a [`SubstanceTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstanceId(pub u32);

impl SubstanceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Physical behavior class of a substance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstanceKind {
    Liquid,
    Gas,
    /// Never moved by gravity, advection or relaxation; acts as an anchor.
    Solid,
}

/// Immutable parameter set for one substance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Substance {
    pub kind: SubstanceKind,
    /// Relative density, 1.0 is the neutral reference. Range [0, 10].
    pub density: f32,
    /// Far-field pressure stiffness (k).
    pub stiffness: f32,
    /// Near-field pressure stiffness (k_near); resists clumping.
    pub near_stiffness: f32,
    /// Target value of the `(1-q)^2` density sum.
    pub rest_density: f32,
    /// Linear viscosity coefficient. Range [0, 1].
    pub viscosity_sigma: f32,
    /// Quadratic viscosity coefficient. Range [0, 1].
    pub viscosity_beta: f32,
    /// Multiplier on settings gravity.
    pub gravity_scale: f32,
    /// Strength of the buoyancy pull from `density`. Range [0, 1].
    #[serde(default)]
    pub density_pull_factor: f32,
}

impl Substance {
    pub fn water() -> Self {
        Self {
            kind: SubstanceKind::Liquid,
            density: 1.0,
            stiffness: 400.0,
            near_stiffness: 1200.0,
            rest_density: 4.0,
            viscosity_sigma: 0.05,
            viscosity_beta: 0.1,
            gravity_scale: 1.0,
            density_pull_factor: 0.0,
        }
    }

    /// Thick, lighter-than-water liquid.
    pub fn oil() -> Self {
        Self {
            kind: SubstanceKind::Liquid,
            density: 0.9,
            stiffness: 300.0,
            near_stiffness: 900.0,
            rest_density: 4.0,
            viscosity_sigma: 0.3,
            viscosity_beta: 0.3,
            gravity_scale: 1.0,
            density_pull_factor: 0.2,
        }
    }

    /// Buoyant gas: no direct gravity, rises through the density pull.
    pub fn steam() -> Self {
        Self {
            kind: SubstanceKind::Gas,
            density: 0.2,
            stiffness: 40.0,
            near_stiffness: 120.0,
            rest_density: 1.0,
            viscosity_sigma: 0.01,
            viscosity_beta: 0.0,
            gravity_scale: 0.0,
            density_pull_factor: 0.5,
        }
    }

    pub fn stone() -> Self {
        Self {
            kind: SubstanceKind::Solid,
            density: 8.0,
            stiffness: 600.0,
            near_stiffness: 1800.0,
            rest_density: 4.0,
            viscosity_sigma: 0.0,
            viscosity_beta: 0.0,
            gravity_scale: 0.0,
            density_pull_factor: 0.0,
        }
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        self.kind == SubstanceKind::Solid
    }

    /// Net multiplier on settings gravity, including the buoyancy pull.
    ///
    /// Positive pulls down, negative lifts.
    pub fn gravity_factor(&self) -> f32 {
        self.gravity_scale + self.density_pull_factor * (self.density - 1.0)
    }

    /// Check the documented ranges. `id` is only used for the error message.
    pub fn validate(&self, id: usize) -> Result<()> {
        let fail = |reason: String| Err(Error::InvalidSubstance { id, reason });

        let fields = [
            ("density", self.density),
            ("stiffness", self.stiffness),
            ("near_stiffness", self.near_stiffness),
            ("rest_density", self.rest_density),
            ("viscosity_sigma", self.viscosity_sigma),
            ("viscosity_beta", self.viscosity_beta),
            ("gravity_scale", self.gravity_scale),
            ("density_pull_factor", self.density_pull_factor),
        ];
        for (name, v) in fields {
            if !v.is_finite() {
                return fail(format!("{name} must be finite, got {v}"));
            }
        }
        if !(0.0..=10.0).contains(&self.density) {
            return fail(format!("density {} outside [0, 10]", self.density));
        }
        for (name, v) in [
            ("viscosity_sigma", self.viscosity_sigma),
            ("viscosity_beta", self.viscosity_beta),
            ("density_pull_factor", self.density_pull_factor),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return fail(format!("{name} {v} outside [0, 1]"));
            }
        }
        for (name, v) in [
            ("stiffness", self.stiffness),
            ("near_stiffness", self.near_stiffness),
            ("rest_density", self.rest_density),
        ] {
            if v < 0.0 {
                return fail(format!("{name} must be >= 0, got {v}"));
            }
        }
        if self.is_solid() {
            if self.gravity_scale != 0.0 {
                return fail(format!(
                    "solid substances must have gravity_scale 0, got {}",
                    self.gravity_scale
                ));
            }
            if self.viscosity_sigma != 0.0 || self.viscosity_beta != 0.0 {
                return fail("solid substances must have zero viscosity".to_string());
            }
        }
        Ok(())
    }
}

/// Flattened per-substance numbers used by the stage kernels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubstanceParams {
    pub solid: bool,
    pub stiffness: f32,
    pub near_stiffness: f32,
    pub rest_density: f32,
    pub viscosity_sigma: f32,
    pub viscosity_beta: f32,
    pub gravity_factor: f32,
}

impl From<&Substance> for SubstanceParams {
    fn from(s: &Substance) -> Self {
        Self {
            solid: s.is_solid(),
            stiffness: s.stiffness,
            near_stiffness: s.near_stiffness,
            rest_density: s.rest_density,
            viscosity_sigma: s.viscosity_sigma,
            viscosity_beta: s.viscosity_beta,
            gravity_factor: if s.is_solid() { 0.0 } else { s.gravity_factor() },
        }
    }
}

/// Validated, immutable registry of substances indexed by [`SubstanceId`].
#[derive(Clone, Debug)]
pub struct SubstanceTable {
    substances: Vec<Substance>,
    params: Vec<SubstanceParams>,
}

impl SubstanceTable {
    pub fn new(substances: Vec<Substance>) -> Result<Self> {
        if substances.is_empty() {
            return Err(Error::EmptySubstanceTable);
        }
        if substances.len() > u32::MAX as usize {
            return Err(Error::InvalidSubstance {
                id: substances.len() - 1,
                reason: "too many substances".to_string(),
            });
        }
        for (id, s) in substances.iter().enumerate() {
            s.validate(id)?;
        }
        let params = substances.iter().map(SubstanceParams::from).collect();
        Ok(Self { substances, params })
    }

    pub fn get(&self, id: SubstanceId) -> Result<&Substance> {
        self.substances
            .get(id.index())
            .ok_or(Error::UnknownSubstance(id))
    }

    #[inline]
    pub fn contains(&self, id: SubstanceId) -> bool {
        id.index() < self.substances.len()
    }

    /// Kernel-ready parameters, indexed by `SubstanceId::index()`.
    #[inline]
    pub fn params(&self) -> &[SubstanceParams] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.substances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.substances.is_empty()
    }
}
