// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Waymark Project: stateless world-to-screen projection.
//!
//! The placement pass needs one thing from the camera: "where does this world
//! point land on screen, if anywhere?". [`ScreenProjector`] answers that for
//! a combined view-projection matrix (GL-style clip conventions, NDC depth in
//! `[-1, 1]`) and a viewport size, both refreshed once per frame via
//! [`ScreenProjector::update`].
//!
//! Two failure modes are deliberately distinguished:
//!
//! - **Outside the depth range** (behind the camera / near plane, or beyond
//!   the far plane): the point is unusable, every variant returns `None`.
//! - **Inside the depth range but outside the viewport rectangle**: the raw
//!   point is off screen, but a label box *around* it may still poke into
//!   view. [`ScreenProjector::project_area`] accepts those, which is what
//!   lets a label whose anchor just crossed the screen edge keep rendering
//!   its visible half instead of popping off.
//!
//! Screen coordinates are pixels with the origin at the top-left and y
//! growing downward.
//!
//! # Example
//!
//! ```rust
//! use glam::{DMat4, DVec3};
//! use waymark_project::ScreenProjector;
//!
//! // An orthographic camera mapping world units 1:1 to an 800×600 viewport.
//! let mut projector = ScreenProjector::new();
//! let view_proj = DMat4::orthographic_rh_gl(0.0, 800.0, 600.0, 0.0, -1000.0, 1000.0);
//! projector.update(view_proj, 800.0, 600.0);
//!
//! let center = projector.project(DVec3::new(400.0, 300.0, 0.0)).unwrap();
//! assert_eq!((center.x, center.y), (400.0, 300.0));
//!
//! // Slightly off screen: the point itself is rejected…
//! assert!(projector.project(DVec3::new(-10.0, 300.0, 0.0)).is_none());
//! // …but a 40px-wide box around it still reaches into the viewport.
//! assert!(projector.project_area(DVec3::new(-10.0, 300.0, 0.0), 20.0, 10.0).is_some());
//! ```

use glam::{DMat4, DVec2, DVec3, DVec4};

/// Per-frame projector from world space to screen pixels.
///
/// Holds only the last camera state handed to [`update`][Self::update]; all
/// projection calls are pure.
#[derive(Clone, Debug)]
pub struct ScreenProjector {
    view_proj: DMat4,
    width: f64,
    height: f64,
}

impl ScreenProjector {
    /// Create a projector with an identity camera and an empty viewport.
    ///
    /// Call [`update`][Self::update] before projecting.
    #[must_use]
    pub fn new() -> Self {
        Self {
            view_proj: DMat4::IDENTITY,
            width: 0.0,
            height: 0.0,
        }
    }

    /// Refresh the camera state. Called once per frame before any projection.
    pub fn update(&mut self, view_proj: DMat4, width: f64, height: f64) {
        debug_assert!(
            width >= 0.0 && height >= 0.0,
            "viewport size must be non-negative"
        );
        self.view_proj = view_proj;
        self.width = width;
        self.height = height;
    }

    /// Viewport width in pixels.
    #[must_use]
    pub const fn width(&self) -> f64 {
        self.width
    }

    /// Viewport height in pixels.
    #[must_use]
    pub const fn height(&self) -> f64 {
        self.height
    }

    /// Project a world point, checking only the depth range.
    ///
    /// Returns `None` if the point is behind the camera (`w <= 0`) or its NDC
    /// depth falls outside `[-1, 1]`. The returned screen point may lie
    /// outside the viewport; callers that need the viewport test use
    /// [`project`][Self::project] or [`project_area`][Self::project_area].
    #[must_use]
    pub fn project_depth(&self, world: DVec3) -> Option<DVec2> {
        debug_assert!(!world.is_nan(), "world point must not be NaN");
        let clip = self.view_proj * DVec4::new(world.x, world.y, world.z, 1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        if ndc.z < -1.0 || ndc.z > 1.0 {
            return None;
        }
        Some(DVec2::new(
            (ndc.x + 1.0) * 0.5 * self.width,
            (1.0 - ndc.y) * 0.5 * self.height,
        ))
    }

    /// Project a world point, requiring it to land inside the viewport.
    #[must_use]
    pub fn project(&self, world: DVec3) -> Option<DVec2> {
        self.project_depth(world).filter(|p| self.on_screen(*p))
    }

    /// Project a world point, accepting it if a `half_width` × `half_height`
    /// box centered on it intersects the viewport.
    ///
    /// The depth-range check still applies. This is the entry point for
    /// labels whose anchor is off screen but whose box is partially visible.
    #[must_use]
    pub fn project_area(&self, world: DVec3, half_width: f64, half_height: f64) -> Option<DVec2> {
        debug_assert!(
            half_width >= 0.0 && half_height >= 0.0,
            "half extents must be non-negative"
        );
        self.project_depth(world).filter(|p| {
            p.x + half_width > 0.0
                && p.x - half_width < self.width
                && p.y + half_height > 0.0
                && p.y - half_height < self.height
        })
    }

    /// Whether a screen point lies inside the viewport rectangle.
    #[must_use]
    pub fn on_screen(&self, p: DVec2) -> bool {
        p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height
    }
}

impl Default for ScreenProjector {
    fn default() -> Self {
        Self::new()
    }
}
