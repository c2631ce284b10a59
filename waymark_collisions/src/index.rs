// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Uniform-grid collision index over allocated screen boxes.

use alloc::vec::Vec;
use core::fmt::Debug;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::types::ScreenBox;

/// Default grid cell size in pixels.
///
/// Label boxes are tens of pixels across; a 128px cell keeps most boxes in a
/// single cell while keeping per-cell slot lists short.
pub const DEFAULT_CELL_SIZE: f64 = 128.0;

/// A screen box committed to the index this frame.
#[derive(Clone, Debug)]
pub struct Placed<P> {
    /// The allocated screen-space box.
    pub bounds: ScreenBox,
    /// Camera distance of the owning label, for depth ordering of pick hits.
    pub distance: f64,
    /// Caller payload (typically pick info for the owning label).
    pub payload: P,
}

#[derive(Default)]
struct Cell {
    slots: SmallVec<[usize; 8]>,
}

/// Per-frame collision index bucketing allocated boxes into a uniform grid.
///
/// The index only grows within a frame; [`CollisionIndex::reset`] clears it
/// before each placement pass. See the crate docs for an overview.
pub struct CollisionIndex<P> {
    cell_size: f64,
    cells: HashMap<(i32, i32), Cell>,
    placed: Vec<Placed<P>>,
    enabled: bool,
}

impl<P> Debug for CollisionIndex<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CollisionIndex")
            .field("cell_size", &self.cell_size)
            .field("placed", &self.placed.len())
            .field("cells", &self.cells.len())
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Map a pixel coordinate to a grid coordinate, rounding towards -∞.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Grid cell indices are intentionally i32; out-of-range values are saturated."
)]
#[inline]
fn cell_coord(value: f64, cell_size: f64) -> i32 {
    debug_assert!(cell_size > 0.0, "grid cell_size must be strictly positive");
    let t = value / cell_size;
    if t >= i32::MAX as f64 {
        return i32::MAX;
    }
    if t <= i32::MIN as f64 {
        return i32::MIN;
    }
    let coord = t as i32;
    // The cast truncated towards zero; correct negatives to floor.
    if t < 0.0 && (coord as f64) > t {
        coord.saturating_sub(1)
    } else {
        coord
    }
}

impl<P> CollisionIndex<P> {
    /// Create an index with the default cell size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cell_size(DEFAULT_CELL_SIZE)
    }

    /// Create an index with an explicit grid cell size in pixels.
    #[must_use]
    pub fn with_cell_size(cell_size: f64) -> Self {
        debug_assert!(cell_size > 0.0, "cell_size must be strictly positive");
        Self {
            cell_size,
            cells: HashMap::new(),
            placed: Vec::new(),
            enabled: true,
        }
    }

    /// Clear all allocated boxes. Called once per frame before placement.
    ///
    /// Capacity is retained so a steady-state frame does not reallocate.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.placed.clear();
    }

    /// Enable or disable collision testing.
    ///
    /// While disabled, [`intersects`][Self::intersects] always reports `false`
    /// but [`allocate`][Self::allocate] keeps recording boxes so pick queries
    /// continue to work.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether collision testing is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of boxes allocated this frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.placed.len()
    }

    /// Whether no boxes have been allocated this frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    fn cell_range(&self, min: f64, max: f64) -> (i32, i32) {
        let c0 = cell_coord(min, self.cell_size);
        let c1 = cell_coord(max, self.cell_size);
        if c0 <= c1 { (c0, c1) } else { (c1, c0) }
    }

    /// Test whether `bounds` would overlap any allocated box.
    ///
    /// Does not commit anything; always `false` while the index is disabled.
    #[must_use]
    pub fn intersects(&self, bounds: &ScreenBox) -> bool {
        if !self.enabled {
            return false;
        }
        let (ix0, ix1) = self.cell_range(bounds.min_x, bounds.max_x);
        let (iy0, iy1) = self.cell_range(bounds.min_y, bounds.max_y);
        for ix in ix0..=ix1 {
            for iy in iy0..=iy1 {
                if let Some(cell) = self.cells.get(&(ix, iy)) {
                    for &slot in &cell.slots {
                        if self.placed[slot].bounds.intersects(bounds) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Commit a box to the index.
    ///
    /// Future [`intersects`][Self::intersects] tests will consider it. The
    /// index never refuses an allocation; the caller decides whether overlap
    /// is allowed before committing.
    pub fn allocate(&mut self, bounds: ScreenBox, distance: f64, payload: P) {
        debug_assert!(
            !bounds.min_x.is_nan() && !bounds.min_y.is_nan(),
            "allocated boxes must not contain NaN"
        );
        let slot = self.placed.len();
        let (ix0, ix1) = self.cell_range(bounds.min_x, bounds.max_x);
        let (iy0, iy1) = self.cell_range(bounds.min_y, bounds.max_y);
        for ix in ix0..=ix1 {
            for iy in iy0..=iy1 {
                self.cells.entry((ix, iy)).or_default().slots.push(slot);
            }
        }
        self.placed.push(Placed {
            bounds,
            distance,
            payload,
        });
    }

    /// All allocated boxes whose bounds contain the pixel, for pick queries.
    ///
    /// A pixel lies in exactly one grid cell, and a box registers at most
    /// once per cell, so hits are inherently unique.
    pub fn query_point(&self, x: f64, y: f64) -> impl Iterator<Item = &Placed<P>> {
        let ix = cell_coord(x, self.cell_size);
        let iy = cell_coord(y, self.cell_size);
        self.cells
            .get(&(ix, iy))
            .into_iter()
            .flat_map(|cell| cell.slots.iter())
            .map(|&slot| &self.placed[slot])
            .filter(move |p| p.bounds.contains_point(x, y))
    }
}

impl<P> Default for CollisionIndex<P> {
    fn default() -> Self {
        Self::new()
    }
}
