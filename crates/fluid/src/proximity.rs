//! Cross-substance proximity alerts.
//!
//! Requests are validated and indexed by unordered substance pair when the
//! solver is built. After each step the engine walks the final neighbor lists,
//! visits every unordered particle pair once and reports the pairs of watched
//! substances that are within the request's range.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::neighbors::NeighborSearch;
use crate::particle::{Particle, ParticleId};
use crate::substance::{SubstanceId, SubstanceTable};

/// Watch particles of `substance_a` and `substance_b` closer than `range`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProximityAlertRequest {
    pub substance_a: SubstanceId,
    pub substance_b: SubstanceId,
    pub range: f32,
}

impl ProximityAlertRequest {
    pub fn new(substance_a: SubstanceId, substance_b: SubstanceId, range: f32) -> Self {
        Self {
            substance_a,
            substance_b,
            range,
        }
    }

    fn key(&self) -> (SubstanceId, SubstanceId) {
        pair_key(self.substance_a, self.substance_b)
    }
}

#[inline]
fn pair_key(a: SubstanceId, b: SubstanceId) -> (SubstanceId, SubstanceId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// One detected pair. Valid until the next step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProximityAlert {
    /// Particle of the request's `substance_a`.
    pub first: ParticleId,
    /// Particle of the request's `substance_b`.
    pub second: ParticleId,
    /// Index of the triggering request.
    pub request: usize,
    pub distance: f32,
}

#[derive(Clone, Debug)]
pub struct ProximityAlertEngine {
    requests: Vec<ProximityAlertRequest>,
    by_pair: FxHashMap<(SubstanceId, SubstanceId), usize>,
    capacity: usize,
    alerts: Vec<ProximityAlert>,
    maxed_out: bool,
}

impl ProximityAlertEngine {
    /// Validate `requests` against the table and the interaction radius.
    pub fn new(
        requests: Vec<ProximityAlertRequest>,
        substances: &SubstanceTable,
        interaction_radius: f32,
        capacity: usize,
    ) -> Result<Self> {
        let mut by_pair = FxHashMap::default();
        for (index, req) in requests.iter().enumerate() {
            for id in [req.substance_a, req.substance_b] {
                if !substances.contains(id) {
                    return Err(Error::InvalidProximityRequest {
                        index,
                        reason: format!("unknown substance {id:?}"),
                    });
                }
            }
            if !req.range.is_finite() || req.range <= 0.0 {
                return Err(Error::InvalidProximityRequest {
                    index,
                    reason: format!("range must be finite and > 0, got {}", req.range),
                });
            }
            if req.range > interaction_radius {
                return Err(Error::InvalidProximityRequest {
                    index,
                    reason: format!(
                        "range {} exceeds interaction radius {interaction_radius}",
                        req.range
                    ),
                });
            }
            if by_pair.insert(req.key(), index).is_some() {
                let (a, b) = req.key();
                return Err(Error::DuplicateProximityRequest { a, b });
            }
        }
        Ok(Self {
            requests,
            by_pair,
            capacity,
            alerts: Vec::with_capacity(capacity),
            maxed_out: false,
        })
    }

    /// Recompute alerts from the final positions and neighbor lists.
    pub fn scan(&mut self, particles: &[Particle], neighbors: &NeighborSearch) {
        self.alerts.clear();
        self.maxed_out = false;
        if self.requests.is_empty() {
            return;
        }

        for (i, pi) in particles.iter().enumerate() {
            if !pi.active {
                continue;
            }
            for &j in neighbors.neighbors_of(i) {
                let j = j as usize;
                // Each unordered pair once: from the lower slot, or from the
                // higher one when the lower slot's list was truncated.
                if j < i && neighbors.contains(j, i as u32) {
                    continue;
                }
                let pj = &particles[j];
                if !pj.active {
                    continue;
                }
                let Some(&request) = self.by_pair.get(&pair_key(pi.substance, pj.substance)) else {
                    continue;
                };
                let req = &self.requests[request];
                let distance = pi.position.distance(pj.position);
                if distance > req.range {
                    continue;
                }
                if self.alerts.len() >= self.capacity {
                    self.maxed_out = true;
                    return;
                }
                let (first, second) = if pi.substance == req.substance_a {
                    (pi.id, pj.id)
                } else {
                    (pj.id, pi.id)
                };
                self.alerts.push(ProximityAlert {
                    first,
                    second,
                    request,
                    distance,
                });
            }
        }
    }

    /// Drop alerts from the previous step.
    pub fn reset(&mut self) {
        self.alerts.clear();
        self.maxed_out = false;
    }

    #[inline]
    pub fn alerts(&self) -> &[ProximityAlert] {
        &self.alerts
    }

    #[inline]
    pub fn maxed_out(&self) -> bool {
        self.maxed_out
    }

    #[inline]
    pub fn requests(&self) -> &[ProximityAlertRequest] {
        &self.requests
    }
}
