//! Bounded per-particle neighbor lists built from the spatial grid.
//!
//! Lists are stored in one flat buffer with a fixed stride of
//! `max_neighbors_per_particle`, indexed by particle slot. The grid fill is
//! sequential (slot order decides the order inside each cell), the per-particle
//! scans go through [`crate::exec`] and each only writes its own stride.

use crate::exec::{self, ExecutionMode};
use crate::grid::SpatialGrid;
use crate::particle::Particle;
use crate::settings::SimulationSettings;

#[derive(Clone, Copy, Debug, Default)]
struct ListHeader {
    count: u32,
    dropped: u32,
}

#[derive(Clone, Debug)]
pub struct NeighborSearch {
    grid: SpatialGrid,
    radius: f32,
    stride: usize,
    lists: Vec<u32>,
    headers: Vec<ListHeader>,
    /// Slots covered by the last rebuild.
    len: usize,
    overflows: usize,
}

impl NeighborSearch {
    pub fn new(settings: &SimulationSettings) -> Self {
        let stride = settings.max_neighbors_per_particle;
        Self {
            grid: SpatialGrid::from_settings(settings),
            radius: settings.interaction_radius,
            stride,
            lists: vec![0; settings.max_particles * stride],
            headers: vec![ListHeader::default(); settings.max_particles],
            len: 0,
            overflows: 0,
        }
    }

    /// Refill the grid from `particles` and recompute every list.
    ///
    /// Inactive slots get an empty list and are never anyone's neighbor.
    pub fn rebuild(&mut self, particles: &[Particle], mode: ExecutionMode) {
        self.grid.clear();
        for (i, p) in particles.iter().enumerate() {
            if p.active {
                self.grid.insert(i as u32, p.position);
            }
        }

        let n = particles.len().min(self.headers.len());
        self.len = n;
        let radius_sq = self.radius * self.radius;
        let grid = &self.grid;
        let stride = self.stride;

        exec::for_each_chunk_zip_mut(
            mode,
            &mut self.lists[..n * stride],
            stride,
            &mut self.headers[..n],
            |i, list, header| {
                *header = ListHeader::default();
                let p = &particles[i];
                if !p.active {
                    return;
                }
                let Some((cx, cy)) = grid.cell_coord(p.position) else {
                    return;
                };
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        for &j in grid.query_offset(cx, cy, dx, dy) {
                            if j as usize == i {
                                continue;
                            }
                            let d2 = particles[j as usize].position.distance_squared(p.position);
                            if d2 > radius_sq {
                                continue;
                            }
                            if (header.count as usize) < stride {
                                list[header.count as usize] = j;
                                header.count += 1;
                            } else {
                                header.dropped += 1;
                            }
                        }
                    }
                }
            },
        );

        self.overflows = self.headers[..n].iter().map(|h| h.dropped as usize).sum();
        if self.overflows > 0 {
            log::debug!("neighbor search: {} matches dropped at the per-particle cap", self.overflows);
        }
    }

    /// Neighbor slots of particle `i` from the last rebuild.
    #[inline]
    pub fn neighbors_of(&self, i: usize) -> &[u32] {
        if i >= self.len {
            return &[];
        }
        let count = self.headers[i].count as usize;
        let start = i * self.stride;
        &self.lists[start..start + count]
    }

    /// Whether `j` is in the list of `i`.
    #[inline]
    pub fn contains(&self, i: usize, j: u32) -> bool {
        self.neighbors_of(i).contains(&j)
    }

    /// Number of slots covered by the last rebuild.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed per-particle list capacity.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Matches dropped at the per-particle cap in the last rebuild.
    #[inline]
    pub fn overflows(&self) -> usize {
        self.overflows
    }

    /// The grid as filled by the last rebuild.
    #[inline]
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Forget every list without touching the grid allocation.
    pub fn reset(&mut self) {
        self.grid.clear();
        self.len = 0;
        self.overflows = 0;
    }
}
