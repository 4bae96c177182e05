//! Serial / rayon-parallel dispatch for per-particle stage work.
//!
//! Every kernel is written once as a closure over `(index, &mut item)` and run
//! through one of these helpers. A kernel only writes the items it is handed,
//! so both modes visit the same data and produce identical results.

use rayon::prelude::*;

pub use crate::settings::ExecutionMode;

/// Run `f` on every item.
pub fn for_each_mut<T, F>(mode: ExecutionMode, items: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    match mode {
        ExecutionMode::Serial => items.iter_mut().enumerate().for_each(|(i, t)| f(i, t)),
        ExecutionMode::Parallel => items.par_iter_mut().enumerate().for_each(|(i, t)| f(i, t)),
    }
}

/// Run `f` on every item and count how many calls returned `true`.
pub fn count_mut<T, F>(mode: ExecutionMode, items: &mut [T], f: F) -> usize
where
    T: Send,
    F: Fn(usize, &mut T) -> bool + Sync + Send,
{
    match mode {
        ExecutionMode::Serial => items
            .iter_mut()
            .enumerate()
            .map(|(i, t)| f(i, t) as usize)
            .sum(),
        ExecutionMode::Parallel => items
            .par_iter_mut()
            .enumerate()
            .map(|(i, t)| f(i, t) as usize)
            .sum(),
    }
}

/// Run `f` over two equally long slices in lockstep.
pub fn for_each_zip_mut<A, B, F>(mode: ExecutionMode, a: &mut [A], b: &mut [B], f: F)
where
    A: Send,
    B: Send,
    F: Fn(usize, &mut A, &mut B) + Sync + Send,
{
    debug_assert_eq!(a.len(), b.len());
    match mode {
        ExecutionMode::Serial => a
            .iter_mut()
            .zip(b.iter_mut())
            .enumerate()
            .for_each(|(i, (x, y))| f(i, x, y)),
        ExecutionMode::Parallel => a
            .par_iter_mut()
            .zip(b.par_iter_mut())
            .enumerate()
            .for_each(|(i, (x, y))| f(i, x, y)),
    }
}

/// Run `f` on fixed-size chunks of a flat per-item buffer.
///
/// Chunk `i` is `buffer[i * chunk_len..(i + 1) * chunk_len]`.
pub fn for_each_chunk_mut<T, F>(mode: ExecutionMode, buffer: &mut [T], chunk_len: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    match mode {
        ExecutionMode::Serial => buffer
            .chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(i, c)| f(i, c)),
        ExecutionMode::Parallel => buffer
            .par_chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(i, c)| f(i, c)),
    }
}

/// Like [`for_each_chunk_mut`] with a second per-item slice zipped alongside.
pub fn for_each_chunk_zip_mut<T, U, F>(
    mode: ExecutionMode,
    buffer: &mut [T],
    chunk_len: usize,
    items: &mut [U],
    f: F,
) where
    T: Send,
    U: Send,
    F: Fn(usize, &mut [T], &mut U) + Sync + Send,
{
    match mode {
        ExecutionMode::Serial => buffer
            .chunks_mut(chunk_len)
            .zip(items.iter_mut())
            .enumerate()
            .for_each(|(i, (c, u))| f(i, c, u)),
        ExecutionMode::Parallel => buffer
            .par_chunks_mut(chunk_len)
            .zip(items.par_iter_mut())
            .enumerate()
            .for_each(|(i, (c, u))| f(i, c, u)),
    }
}
