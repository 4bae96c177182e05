//! Uniform spatial grid with fixed per-cell capacity.
//!
//! Storage is two flat arrays (slot entries and per-cell counts) sized once
//! from the settings, so `clear` is a fill and nothing reallocates while
//! stepping. Cells that fill up drop further entries and count the overflow;
//! dense packing against a wall can do that for a substep without anything
//! being wrong.

use glam::Vec2;

use crate::settings::{Rect, SimulationSettings};

/// Outcome of [`SpatialGrid::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    /// Position outside the grid area or not finite.
    OutOfBounds,
    /// Target cell already holds `max_per_cell` entries.
    CellFull,
}

/// Bounded bucket grid over a rectangle. Entities are `u32` indices.
#[derive(Clone, Debug)]
pub struct SpatialGrid {
    bounds: Rect,
    cell_size: f32,
    inv_cell_size: f32,
    width: usize,
    height: usize,
    max_per_cell: usize,
    /// `width * height * max_per_cell` entity slots.
    entries: Vec<u32>,
    counts: Vec<u32>,
    out_of_bounds: usize,
    cell_overflows: usize,
}

impl SpatialGrid {
    pub fn new(bounds: Rect, cell_size: f32, max_per_cell: usize) -> Self {
        let width = (bounds.width() / cell_size).ceil().max(1.0) as usize;
        let height = (bounds.height() / cell_size).ceil().max(1.0) as usize;
        let cells = width * height;
        Self {
            bounds,
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            width,
            height,
            max_per_cell,
            entries: vec![0; cells * max_per_cell],
            counts: vec![0; cells],
            out_of_bounds: 0,
            cell_overflows: 0,
        }
    }

    /// Grid matching the solver settings (cell size = interaction radius).
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self::new(
            settings.area_bounds,
            settings.interaction_radius,
            settings.max_particles_per_cell,
        )
    }

    /// Reset occupancy and counters. Keeps allocations.
    pub fn clear(&mut self) {
        self.counts.fill(0);
        self.out_of_bounds = 0;
        self.cell_overflows = 0;
    }

    /// Cell coordinate containing `p`, or `None` outside the bounds.
    /// Points on the max edge belong to the last cell.
    #[inline]
    pub fn cell_coord(&self, p: Vec2) -> Option<(usize, usize)> {
        if !self.bounds.contains(p) {
            return None;
        }
        let rel = (p - self.bounds.min) * self.inv_cell_size;
        let cx = (rel.x.floor() as usize).min(self.width - 1);
        let cy = (rel.y.floor() as usize).min(self.height - 1);
        Some((cx, cy))
    }

    #[inline]
    pub fn cell_index(&self, cx: usize, cy: usize) -> usize {
        cx + cy * self.width
    }

    /// Place `entity` in the cell containing `position`.
    pub fn insert(&mut self, entity: u32, position: Vec2) -> Insertion {
        let Some((cx, cy)) = self.cell_coord(position) else {
            self.out_of_bounds += 1;
            log::trace!("grid insert: entity {entity} at {position} outside {:?}", self.bounds);
            return Insertion::OutOfBounds;
        };
        let cell = self.cell_index(cx, cy);
        let count = self.counts[cell] as usize;
        if count >= self.max_per_cell {
            self.cell_overflows += 1;
            log::trace!("grid insert: cell ({cx}, {cy}) full, dropping entity {entity}");
            return Insertion::CellFull;
        }
        self.entries[cell * self.max_per_cell + count] = entity;
        self.counts[cell] += 1;
        Insertion::Inserted
    }

    /// Entities in one cell, in insertion order.
    #[inline]
    pub fn query_cell(&self, index: usize) -> &[u32] {
        let count = self.counts[index] as usize;
        let start = index * self.max_per_cell;
        &self.entries[start..start + count]
    }

    /// Entities of the cell at `(cx, cy)` offset by `(dx, dy)`; empty when off-grid.
    #[inline]
    pub fn query_offset(&self, cx: usize, cy: usize, dx: i32, dy: i32) -> &[u32] {
        let nx = cx as i64 + dx as i64;
        let ny = cy as i64 + dy as i64;
        if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
            return &[];
        }
        self.query_cell(self.cell_index(nx as usize, ny as usize))
    }

    /// Inclusive range of cell coordinates overlapping `rect`, clipped to the grid.
    fn cell_span(&self, rect: &Rect) -> Option<((usize, usize), (usize, usize))> {
        if !(rect.min.is_finite() && rect.max.is_finite()) || !rect.intersects(&self.bounds) {
            return None;
        }
        let lo = (self.bounds.clamp(rect.min) - self.bounds.min) * self.inv_cell_size;
        let hi = (self.bounds.clamp(rect.max) - self.bounds.min) * self.inv_cell_size;
        let x0 = (lo.x.floor() as usize).min(self.width - 1);
        let y0 = (lo.y.floor() as usize).min(self.height - 1);
        let x1 = (hi.x.floor() as usize).min(self.width - 1);
        let y1 = (hi.y.floor() as usize).min(self.height - 1);
        Some(((x0, y0), (x1, y1)))
    }

    /// All entities in cells overlapping `rect`. Candidates only: no exact
    /// position test is made here.
    pub fn query_rect(&self, rect: &Rect) -> Vec<u32> {
        let mut out = Vec::new();
        if let Some(((x0, y0), (x1, y1))) = self.cell_span(rect) {
            for cy in y0..=y1 {
                for cx in x0..=x1 {
                    out.extend_from_slice(self.query_cell(self.cell_index(cx, cy)));
                }
            }
        }
        out
    }

    /// Entities within `radius` of `center`, using `position_of` for the exact test.
    pub fn query_circle<F>(&self, center: Vec2, radius: f32, position_of: F) -> Vec<u32>
    where
        F: Fn(u32) -> Vec2,
    {
        let r = radius.max(0.0);
        let r2 = r * r;
        let aabb = Rect::new(center - Vec2::splat(r), center + Vec2::splat(r));
        let mut out = self.query_rect(&aabb);
        out.retain(|&e| position_of(e).distance_squared(center) <= r2);
        out
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Insertions rejected as out of bounds since the last `clear`.
    #[inline]
    pub fn out_of_bounds(&self) -> usize {
        self.out_of_bounds
    }

    /// Insertions rejected by full cells since the last `clear`.
    #[inline]
    pub fn cell_overflows(&self) -> usize {
        self.cell_overflows
    }
}
