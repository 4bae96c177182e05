//! Particle records and the fixed-capacity store that owns them.
//!
//! The store is a slot array: removed particles leave an inactive slot that is
//! reused by later insertions with a bumped generation, so ids stay unique and
//! stale ids are detected. Slot order is the iteration order of every solver
//! stage, which keeps a run reproducible for a fixed sequence of operations.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::substance::SubstanceId;

/// Stable particle handle. Invalidated by removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId {
    /// Slot in the store.
    pub index: u32,
    /// Bumped every time the slot is reused.
    pub generation: u32,
}

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// One simulated particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub id: ParticleId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Position at the start of the current substep.
    pub previous_position: Vec2,
    pub substance: SubstanceId,
    /// False for vacant slots; every stage skips inactive particles.
    pub active: bool,
}

impl Particle {
    fn new(id: ParticleId, position: Vec2, velocity: Vec2, substance: SubstanceId) -> Self {
        Self {
            id,
            position,
            velocity,
            previous_position: position,
            substance,
            active: true,
        }
    }
}

/// GPU/upload friendly particle layout for visualization collaborators.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleSnapshot {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub substance: u32,
    pub index: u32,
    pub generation: u32,
}

impl From<&Particle> for ParticleSnapshot {
    fn from(p: &Particle) -> Self {
        Self {
            position: p.position.to_array(),
            velocity: p.velocity.to_array(),
            substance: p.substance.0,
            index: p.id.index,
            generation: p.id.generation,
        }
    }
}

/// Owns all particles. Capacity is fixed at construction.
#[derive(Clone, Debug)]
pub struct ParticleStore {
    slots: Vec<Particle>,
    /// Vacant slot indices; popped from the back.
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl ParticleStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    /// Insert a particle. Fails when the store is full or the state is not finite.
    pub fn add(&mut self, position: Vec2, velocity: Vec2, substance: SubstanceId) -> Result<ParticleId> {
        if !position.is_finite() {
            return Err(Error::InvalidParticle(format!("non-finite position {position}")));
        }
        if !velocity.is_finite() {
            return Err(Error::InvalidParticle(format!("non-finite velocity {velocity}")));
        }
        if self.live >= self.capacity {
            return Err(Error::CapacityExhausted { max: self.capacity });
        }

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let id = ParticleId {
                    index,
                    generation: slot.id.generation.wrapping_add(1),
                };
                *slot = Particle::new(id, position, velocity, substance);
                id
            }
            None => {
                let id = ParticleId {
                    index: self.slots.len() as u32,
                    generation: 0,
                };
                self.slots.push(Particle::new(id, position, velocity, substance));
                id
            }
        };
        self.live += 1;
        Ok(id)
    }

    /// Remove a particle, returning its final state.
    pub fn remove(&mut self, id: ParticleId) -> Result<Particle> {
        let slot = self.slot_mut(id)?;
        slot.active = false;
        let removed = *slot;
        self.free.push(id.index);
        self.live -= 1;
        Ok(removed)
    }

    pub fn get(&self, id: ParticleId) -> Result<&Particle> {
        match self.slots.get(id.index as usize) {
            Some(p) if p.active && p.id == id => Ok(p),
            _ => Err(Error::ParticleNotFound(id)),
        }
    }

    fn slot_mut(&mut self, id: ParticleId) -> Result<&mut Particle> {
        match self.slots.get_mut(id.index as usize) {
            Some(p) if p.active && p.id == id => Ok(p),
            _ => Err(Error::ParticleNotFound(id)),
        }
    }

    #[inline]
    pub fn contains(&self, id: ParticleId) -> bool {
        self.get(id).is_ok()
    }

    /// Deactivate every particle. Slots are kept so old ids stay invalid.
    pub fn clear(&mut self) {
        for p in &mut self.slots {
            p.active = false;
        }
        // Reverse so slot 0 is reused first.
        self.free.clear();
        self.free.extend((0..self.slots.len() as u32).rev());
        self.live = 0;
    }

    /// Number of active particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// All slots, including inactive ones, in slot order.
    #[inline]
    pub fn slots(&self) -> &[Particle] {
        &self.slots
    }

    #[inline]
    pub fn slots_mut(&mut self) -> &mut [Particle] {
        &mut self.slots
    }

    /// Active particles in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.slots.iter().filter(|p| p.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATER: SubstanceId = SubstanceId(0);

    #[test]
    fn test_add_then_get_round_trip() {
        let mut store = ParticleStore::with_capacity(4);
        let id = store
            .add(Vec2::new(1.0, 2.0), Vec2::new(-0.5, 0.25), WATER)
            .unwrap();
        let p = store.get(id).unwrap();
        assert_eq!(p.position, Vec2::new(1.0, 2.0));
        assert_eq!(p.velocity, Vec2::new(-0.5, 0.25));
        assert_eq!(p.previous_position, p.position);
        assert_eq!(p.substance, WATER);
        assert!(p.active);
    }

    #[test]
    fn test_removed_id_is_not_found() {
        let mut store = ParticleStore::with_capacity(4);
        let id = store.add(Vec2::ZERO, Vec2::ZERO, WATER).unwrap();
        store.remove(id).unwrap();
        assert!(matches!(store.get(id), Err(Error::ParticleNotFound(_))));
        assert!(matches!(store.remove(id), Err(Error::ParticleNotFound(_))));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut store = ParticleStore::with_capacity(2);
        let a = store.add(Vec2::ZERO, Vec2::ZERO, WATER).unwrap();
        store.remove(a).unwrap();
        let b = store.add(Vec2::ONE, Vec2::ZERO, WATER).unwrap();
        assert_eq!(a.index, b.index);
        assert_ne!(a, b);
        assert!(store.get(a).is_err(), "stale id must not resolve to the new particle");
        assert!(store.get(b).is_ok());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut store = ParticleStore::with_capacity(2);
        store.add(Vec2::ZERO, Vec2::ZERO, WATER).unwrap();
        store.add(Vec2::ZERO, Vec2::ZERO, WATER).unwrap();
        let err = store.add(Vec2::ZERO, Vec2::ZERO, WATER).unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { max: 2 }));
    }

    #[test]
    fn test_clear_invalidates_old_ids() {
        let mut store = ParticleStore::with_capacity(8);
        let ids: Vec<_> = (0..5)
            .map(|i| store.add(Vec2::splat(i as f32), Vec2::ZERO, WATER).unwrap())
            .collect();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
        let fresh = store.add(Vec2::ZERO, Vec2::ZERO, WATER).unwrap();
        assert_eq!(fresh.index, 0, "slot 0 is reused first after clear");
        for id in ids {
            assert!(store.get(id).is_err());
        }
    }

    #[test]
    fn test_non_finite_state_rejected() {
        let mut store = ParticleStore::with_capacity(2);
        assert!(store.add(Vec2::new(f32::NAN, 0.0), Vec2::ZERO, WATER).is_err());
        assert!(store.add(Vec2::ZERO, Vec2::new(0.0, f32::INFINITY), WATER).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_layout() {
        assert_eq!(std::mem::size_of::<ParticleSnapshot>(), 28);
        let p = Particle::new(
            ParticleId { index: 3, generation: 1 },
            Vec2::new(1.0, 2.0),
            Vec2::new(3.0, 4.0),
            SubstanceId(2),
        );
        let snap = ParticleSnapshot::from(&p);
        let bytes: &[u8] = bytemuck::bytes_of(&snap);
        assert_eq!(bytes.len(), 28);
        assert_eq!(snap.position, [1.0, 2.0]);
        assert_eq!(snap.substance, 2);
    }
}
