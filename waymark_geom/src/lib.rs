// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stateless geometry helpers for label placement.
//!
//! Small building blocks shared by the placement pipeline:
//!
//! - World-space polyline measurements ([`polyline_length`],
//!   [`polyline_midpoint`], [`point_along`], [`distance_to_polyline`]) used
//!   for path-label anchors and the longer-path-wins deduplication tie-break.
//! - Screen-space box construction ([`screen_rect`]) turning a projected
//!   anchor plus style offset and half extents into the axis-aligned
//!   rectangle that the collision index tests.
//!
//! Polylines are ordered `[x, y, z]` world points; degenerate inputs (fewer
//! than two points) measure as zero length. All inputs are assumed NaN-free;
//! debug builds assert.
//!
//! # Example
//!
//! ```rust
//! use waymark_geom::{polyline_length, polyline_midpoint};
//!
//! let path = [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [3.0, 4.0, 0.0]];
//! assert_eq!(polyline_length(&path), 7.0);
//!
//! // The midpoint lies half the total length along the path.
//! let mid = polyline_midpoint(&path).unwrap();
//! assert_eq!(mid, [3.0, 0.5, 0.0]);
//! ```

#![no_std]

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::{Point, Rect};

/// Euclidean distance between two world points.
#[inline]
fn segment_length(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Total length of a polyline of world points.
///
/// Returns `0.0` for polylines with fewer than two points.
#[must_use]
pub fn polyline_length(points: &[[f64; 3]]) -> f64 {
    debug_assert!(
        points.iter().flatten().all(|c| !c.is_nan()),
        "polyline coordinates must not be NaN"
    );
    points
        .windows(2)
        .map(|pair| segment_length(pair[0], pair[1]))
        .sum()
}

/// The point at `distance` along a polyline, interpolated on the containing
/// segment.
///
/// Distances are clamped to the polyline: negative values return the first
/// point, values past the end return the last. Returns `None` for an empty
/// polyline.
#[must_use]
pub fn point_along(points: &[[f64; 3]], distance: f64) -> Option<[f64; 3]> {
    let (&first, rest) = points.split_first()?;
    if rest.is_empty() || distance <= 0.0 {
        return Some(first);
    }
    let mut remaining = distance;
    let mut prev = first;
    for &next in rest {
        let len = segment_length(prev, next);
        if remaining <= len && len > 0.0 {
            let t = remaining / len;
            return Some([
                prev[0] + (next[0] - prev[0]) * t,
                prev[1] + (next[1] - prev[1]) * t,
                prev[2] + (next[2] - prev[2]) * t,
            ]);
        }
        remaining -= len;
        prev = next;
    }
    Some(prev)
}

/// Shortest distance from a world point to a polyline.
///
/// Measured to the nearest point on any segment; a single-point polyline
/// measures to that point. Returns `f64::INFINITY` for an empty polyline,
/// which compares greater than any tolerance.
#[must_use]
pub fn distance_to_polyline(point: [f64; 3], points: &[[f64; 3]]) -> f64 {
    let Some((&first, rest)) = points.split_first() else {
        return f64::INFINITY;
    };
    if rest.is_empty() {
        return segment_length(point, first);
    }
    points
        .windows(2)
        .map(|pair| distance_to_segment(point, pair[0], pair[1]))
        .fold(f64::INFINITY, f64::min)
}

fn distance_to_segment(p: [f64; 3], a: [f64; 3], b: [f64; 3]) -> f64 {
    let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let len_sq = ab[0] * ab[0] + ab[1] * ab[1] + ab[2] * ab[2];
    if len_sq == 0.0 {
        return segment_length(p, a);
    }
    let ap = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];
    let t = ((ap[0] * ab[0] + ap[1] * ab[1] + ap[2] * ab[2]) / len_sq).clamp(0.0, 1.0);
    segment_length(p, [a[0] + ab[0] * t, a[1] + ab[1] * t, a[2] + ab[2] * t])
}

/// The point halfway along a polyline by arc length.
///
/// This is the anchor used for path-following labels: it stays stable under
/// re-tiling as long as the overall path geometry does. Returns `None` for an
/// empty polyline.
#[must_use]
pub fn polyline_midpoint(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    point_along(points, polyline_length(points) * 0.5)
}

/// Build the screen-space rectangle for a label part.
///
/// `anchor` is the projected screen position; `offset` is the style's pixel
/// offset; `half_width`/`half_height` are the part's half extents, already
/// composed with any per-element scale. The anchor plus offset is the box
/// center.
#[must_use]
pub fn screen_rect(anchor: Point, half_width: f64, half_height: f64, offset: (f64, f64)) -> Rect {
    debug_assert!(
        !anchor.x.is_nan() && !anchor.y.is_nan(),
        "screen anchor must not be NaN"
    );
    let cx = anchor.x + offset.0;
    let cy = anchor.y + offset.1;
    Rect::new(
        cx - half_width,
        cy - half_height,
        cx + half_width,
        cy + half_height,
    )
}
