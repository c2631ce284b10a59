// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The screen-space box primitive.

/// Axis-aligned screen-space rectangle in pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenBox {
    /// Minimum x (left).
    pub min_x: f64,
    /// Minimum y (top).
    pub min_y: f64,
    /// Maximum x (right).
    pub max_x: f64,
    /// Maximum y (bottom).
    pub max_y: f64,
}

impl ScreenBox {
    /// Create a new box from min/max corners.
    #[inline(always)]
    #[must_use]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a box from origin and size.
    #[inline]
    #[must_use]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Box width. Negative for inverted boxes.
    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Box height. Negative for inverted boxes.
    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether the box contains the point. Edges are part of the box.
    #[inline]
    #[must_use]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }

    /// Whether this box overlaps another with positive area.
    ///
    /// Strict semantics: two boxes that only share an edge or corner do
    /// **not** intersect. Labels laid out edge-to-edge across tile borders
    /// must not reject each other.
    ///
    /// ```rust
    /// use waymark_collisions::ScreenBox;
    ///
    /// let a = ScreenBox::new(0.0, 0.0, 10.0, 10.0);
    /// assert!(a.intersects(&ScreenBox::new(5.0, 5.0, 15.0, 15.0)));
    /// assert!(!a.intersects(&ScreenBox::new(10.0, 0.0, 20.0, 10.0)));
    /// ```
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// The box grown by `margin` pixels on every side.
    #[inline]
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    /// Whether the box is empty or inverted (no area). Assumes no NaN.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_x <= self.min_x || self.max_y <= self.min_y
    }
}

#[cfg(test)]
mod tests {
    use super::ScreenBox;

    #[test]
    fn edge_touching_boxes_do_not_intersect() {
        let a = ScreenBox::new(0.0, 0.0, 10.0, 10.0);
        // Shared vertical edge, shared horizontal edge, shared corner.
        assert!(!a.intersects(&ScreenBox::new(10.0, 0.0, 20.0, 10.0)));
        assert!(!a.intersects(&ScreenBox::new(0.0, 10.0, 10.0, 20.0)));
        assert!(!a.intersects(&ScreenBox::new(10.0, 10.0, 20.0, 20.0)));
        // One pixel of genuine overlap does.
        assert!(a.intersects(&ScreenBox::new(9.0, 9.0, 20.0, 20.0)));
    }

    #[test]
    fn contains_point_includes_edges() {
        let a = ScreenBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.contains_point(0.0, 0.0));
        assert!(a.contains_point(10.0, 10.0));
        assert!(!a.contains_point(10.1, 5.0));
    }

    #[test]
    fn from_xywh_and_extents() {
        let a = ScreenBox::from_xywh(5.0, 7.0, 20.0, 10.0);
        assert_eq!(a, ScreenBox::new(5.0, 7.0, 25.0, 17.0));
        assert_eq!(a.width(), 20.0);
        assert_eq!(a.height(), 10.0);
        assert!(!a.is_empty());
        assert!(ScreenBox::new(5.0, 5.0, 5.0, 9.0).is_empty());
    }

    #[test]
    fn expanded_grows_every_side() {
        let a = ScreenBox::new(10.0, 10.0, 20.0, 20.0).expanded(2.0);
        assert_eq!(a, ScreenBox::new(8.0, 8.0, 22.0, 22.0));
    }
}
