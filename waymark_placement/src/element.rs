// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Candidate label model: text elements, label kinds, and flags.

use glam::DVec3;
use waymark_geom::{polyline_length, polyline_midpoint};

bitflags::bitflags! {
    /// Placement behavior flags for a text element.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ElementFlags: u8 {
        /// The element may share screen space with others; collision tests
        /// are skipped for it and against it no slot is enforced.
        const MAY_OVERLAP     = 0b0000_0001;
        /// Exempt from camera-distance culling.
        const IGNORE_DISTANCE = 0b0000_0010;
        /// The text part may be dropped while the icon survives.
        const TEXT_OPTIONAL   = 0b0000_0100;
        /// The icon part may be dropped while the text survives.
        const ICON_OPTIONAL   = 0b0000_1000;
    }
}

/// Reference to an icon image in the external texture atlas.
#[derive(Clone, Debug, PartialEq)]
pub struct IconRef {
    /// Image name in the atlas.
    pub name: String,
    /// Icon width in pixels.
    pub width: f64,
    /// Icon height in pixels.
    pub height: f64,
}

impl IconRef {
    /// Create an icon reference.
    #[must_use]
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }
}

/// The kind of a label, as a closed sum over the four supported shapes.
///
/// Each variant carries only the data relevant to it; callers query
/// capabilities ([`has_icon`][Self::has_icon], [`is_path_based`][Self::is_path_based])
/// instead of probing optional fields.
#[derive(Clone, Debug, PartialEq)]
pub enum LabelKind {
    /// Plain text anchored at a single world point.
    PointText,
    /// Point of interest: an icon with (optional) text at a world point.
    Poi {
        /// The POI icon.
        icon: IconRef,
    },
    /// Text following a world-space path; anchored at the path midpoint.
    PathText {
        /// Ordered world points of the path.
        path: Vec<DVec3>,
        /// Cached total path length, the dedup tie-break key.
        path_length: f64,
    },
    /// An icon repeated at each point of a world-space path.
    LineMarker {
        /// Ordered world marker positions.
        path: Vec<DVec3>,
        /// The marker icon.
        icon: IconRef,
    },
}

impl LabelKind {
    /// Whether this kind renders an icon.
    #[must_use]
    pub fn has_icon(&self) -> bool {
        matches!(self, Self::Poi { .. } | Self::LineMarker { .. })
    }

    /// Whether this kind is anchored to a path rather than a single point.
    #[must_use]
    pub fn is_path_based(&self) -> bool {
        matches!(self, Self::PathText { .. } | Self::LineMarker { .. })
    }

    /// The icon, for kinds that carry one.
    #[must_use]
    pub fn icon(&self) -> Option<&IconRef> {
        match self {
            Self::Poi { icon } | Self::LineMarker { icon, .. } => Some(icon),
            _ => None,
        }
    }

    /// The world path, for path-based kinds.
    #[must_use]
    pub fn path(&self) -> Option<&[DVec3]> {
        match self {
            Self::PathText { path, .. } | Self::LineMarker { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The cached path length, for path text.
    #[must_use]
    pub fn path_length(&self) -> Option<f64> {
        match self {
            Self::PathText { path_length, .. } => Some(*path_length),
            _ => None,
        }
    }
}

/// A candidate label produced by tile decoding.
///
/// Owned by the [`Tile`][crate::Tile] that produced it; the placement pass
/// and the dedup cache never retain references into it across frames.
#[derive(Clone, Debug, PartialEq)]
pub struct TextElement {
    /// Stable feature identity from the source data, when available.
    pub feature_id: Option<u64>,
    /// The label text.
    pub text: String,
    /// The label shape.
    pub kind: LabelKind,
    /// Placement priority; higher wins collisions.
    pub priority: i32,
    /// World-space anchor. For path kinds this is the path midpoint.
    pub position: DVec3,
    /// Pixel offset applied to the projected anchor.
    pub offset: (f64, f64),
    /// Scale multiplier applied to the measured screen box.
    pub scale: f64,
    /// Behavior flags.
    pub flags: ElementFlags,
    /// Valid zoom interval for the text part.
    pub zoom_range: (f64, f64),
    /// Valid zoom interval for the icon part, when it differs from the text's.
    pub icon_zoom_range: Option<(f64, f64)>,
    /// Style name resolved through the style cache.
    pub style: String,
}

/// The widest zoom interval; elements default to always-valid.
const FULL_ZOOM_RANGE: (f64, f64) = (0.0, f64::MAX);

impl TextElement {
    fn base(text: impl Into<String>, kind: LabelKind, position: DVec3) -> Self {
        Self {
            feature_id: None,
            text: text.into(),
            kind,
            priority: 0,
            position,
            offset: (0.0, 0.0),
            scale: 1.0,
            flags: ElementFlags::empty(),
            zoom_range: FULL_ZOOM_RANGE,
            icon_zoom_range: None,
            style: String::new(),
        }
    }

    /// Create a point-text label.
    #[must_use]
    pub fn point(text: impl Into<String>, position: DVec3) -> Self {
        Self::base(text, LabelKind::PointText, position)
    }

    /// Create a POI label (icon plus text).
    #[must_use]
    pub fn poi(text: impl Into<String>, position: DVec3, icon: IconRef) -> Self {
        Self::base(text, LabelKind::Poi { icon }, position)
    }

    /// Create a path-text label. The anchor is the path midpoint; the path
    /// length is measured once and cached for dedup tie-breaks.
    #[must_use]
    pub fn path(text: impl Into<String>, path: Vec<DVec3>) -> Self {
        let points: Vec<[f64; 3]> = path.iter().map(|p| p.to_array()).collect();
        let path_length = polyline_length(&points);
        let anchor = polyline_midpoint(&points)
            .map(DVec3::from_array)
            .unwrap_or(DVec3::ZERO);
        Self::base(text, LabelKind::PathText { path, path_length }, anchor)
    }

    /// Create a line-marker label: `icon` repeated at each path point.
    #[must_use]
    pub fn line_marker(text: impl Into<String>, path: Vec<DVec3>, icon: IconRef) -> Self {
        let points: Vec<[f64; 3]> = path.iter().map(|p| p.to_array()).collect();
        let anchor = polyline_midpoint(&points)
            .map(DVec3::from_array)
            .unwrap_or(DVec3::ZERO);
        Self::base(text, LabelKind::LineMarker { path, icon }, anchor)
    }

    /// Set the feature identity.
    #[must_use]
    pub fn with_feature_id(mut self, id: u64) -> Self {
        self.feature_id = Some(id);
        self
    }

    /// Set the placement priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the style name.
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    /// Set behavior flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ElementFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the pixel offset.
    #[must_use]
    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.offset = (x, y);
        self
    }

    /// Set the valid zoom interval for the text part.
    #[must_use]
    pub fn with_zoom_range(mut self, min: f64, max: f64) -> Self {
        self.zoom_range = (min, max);
        self
    }

    /// Set a separate valid zoom interval for the icon part.
    #[must_use]
    pub fn with_icon_zoom_range(mut self, min: f64, max: f64) -> Self {
        self.icon_zoom_range = Some((min, max));
        self
    }

    /// Whether the element's data is usable: finite anchor, and a non-empty
    /// path for path-based kinds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if !self.position.is_finite() {
            return false;
        }
        match self.kind.path() {
            Some(path) => !path.is_empty() && path.iter().all(|p| p.is_finite()),
            None => true,
        }
    }
}
