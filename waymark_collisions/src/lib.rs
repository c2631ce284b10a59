// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Waymark Collisions: the per-frame screen-space collision index.
//!
//! During a placement pass every label that wins its spot *allocates* an
//! axis-aligned screen box; every later candidate first *tests* whether its
//! own box would intersect one already allocated. The index is rebuilt from
//! scratch each frame ([`CollisionIndex::reset`]), which keeps it allocate-only
//! and free of cross-frame mutation hazards.
//!
//! Boxes are bucketed into a uniform grid so that a test only touches the
//! cells its box covers. Overlap uses **strict** inequalities: two boxes that
//! merely share an edge do not collide, so labels on abutting tiles are not
//! spuriously rejected.
//!
//! Allocated boxes carry a caller payload and a camera distance, which makes
//! the same structure answer pick queries ("which labels cover this pixel?")
//! for hit testing.
//!
//! # Example
//!
//! ```rust
//! use waymark_collisions::{CollisionIndex, ScreenBox};
//!
//! let mut index: CollisionIndex<u32> = CollisionIndex::new();
//!
//! let a = ScreenBox::new(0.0, 0.0, 100.0, 20.0);
//! assert!(!index.intersects(&a));
//! index.allocate(a, 10.0, 1);
//!
//! // An overlapping box is rejected…
//! assert!(index.intersects(&ScreenBox::new(50.0, 10.0, 150.0, 30.0)));
//! // …but a box that only touches the edge is not.
//! assert!(!index.intersects(&ScreenBox::new(100.0, 0.0, 200.0, 20.0)));
//!
//! // Pick query: payloads of all boxes containing the pixel.
//! let hits: Vec<u32> = index.query_point(5.0, 5.0).map(|p| p.payload).collect();
//! assert_eq!(hits, vec![1]);
//! ```
//!
//! The whole index can be disabled ([`CollisionIndex::set_enabled`]): tests
//! then always pass while allocation keeps recording boxes, which debug
//! harnesses use to let every label fade in before re-enabling collision.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod index;
mod types;

pub use index::{CollisionIndex, DEFAULT_CELL_SIZE, Placed};
pub use types::ScreenBox;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn allocate_then_intersect_then_reset() {
        let mut index: CollisionIndex<u32> = CollisionIndex::new();
        let a = ScreenBox::new(10.0, 10.0, 50.0, 30.0);
        index.allocate(a, 1.0, 7);
        assert!(index.intersects(&ScreenBox::new(40.0, 20.0, 80.0, 40.0)));

        index.reset();
        assert!(index.is_empty());
        assert!(!index.intersects(&ScreenBox::new(40.0, 20.0, 80.0, 40.0)));
    }

    #[test]
    fn pick_returns_all_covering_payloads() {
        let mut index: CollisionIndex<u32> = CollisionIndex::new();
        // Overlapping boxes can coexist when the placer permits overlap; the
        // index itself never refuses an allocation.
        index.allocate(ScreenBox::new(0.0, 0.0, 100.0, 100.0), 1.0, 1);
        index.allocate(ScreenBox::new(50.0, 50.0, 150.0, 150.0), 2.0, 2);

        let mut hits: Vec<u32> = index.query_point(75.0, 75.0).map(|p| p.payload).collect();
        hits.sort_unstable();
        assert_eq!(hits, [1, 2]);

        let only_first: Vec<u32> = index.query_point(10.0, 10.0).map(|p| p.payload).collect();
        assert_eq!(only_first, [1]);
    }
}
