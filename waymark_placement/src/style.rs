// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Text style definitions, resolved layout parameters, and font catalogs.
//!
//! Style and catalog configuration arrives from the theme layer and is
//! applied idempotently: re-sending an identical configuration is a no-op,
//! and only genuinely new or changed catalogs are reported back for loading.
//! Resolved layout parameters are cached per
//! `(data source, style name, zoom level)` — the cache is owned by the
//! [`Placer`][crate::Placer] that created it and passed down explicitly,
//! never a process-wide singleton.

use hashbrown::HashMap;

/// A named text style as supplied by the theme.
#[derive(Clone, Debug, PartialEq)]
pub struct TextStyleDef {
    /// Style name, referenced by [`TextElement::style`][crate::TextElement::style].
    pub name: String,
    /// Name of the font catalog this style draws glyphs from.
    pub font_catalog: String,
    /// Base glyph height in pixels at the reference zoom.
    pub glyph_height: f64,
    /// Extra horizontal/vertical padding added to measured boxes, in pixels.
    pub padding: (f64, f64),
}

impl TextStyleDef {
    /// Create a style definition.
    #[must_use]
    pub fn new(name: impl Into<String>, font_catalog: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            font_catalog: font_catalog.into(),
            glyph_height: DEFAULT_GLYPH_HEIGHT,
            padding: DEFAULT_PADDING,
        }
    }

    /// Set the base glyph height.
    #[must_use]
    pub fn with_glyph_height(mut self, height: f64) -> Self {
        self.glyph_height = height;
        self
    }
}

/// A font catalog to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontCatalogConfig {
    /// Catalog name, referenced by styles.
    pub name: String,
    /// Source URL.
    pub url: String,
}

const DEFAULT_GLYPH_HEIGHT: f64 = 16.0;
const DEFAULT_PADDING: (f64, f64) = (2.0, 2.0);

/// Reference zoom at which styles render at their base glyph height.
const REFERENCE_ZOOM: f64 = 14.0;

/// Approximate glyph advance as a fraction of glyph height.
const ADVANCE_RATIO: f64 = 0.6;

#[derive(Clone, Debug, PartialEq, Eq)]
enum CatalogState {
    Loading,
    Ready,
}

#[derive(Clone, Debug)]
struct CatalogEntry {
    url: String,
    state: CatalogState,
}

/// Layout parameters resolved for a style at a zoom level.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedStyle {
    /// Glyph height in pixels after the zoom ramp.
    pub glyph_height: f64,
    /// Box padding in pixels.
    pub padding: (f64, f64),
    /// The catalog the style needs ready before its text can render.
    pub font_catalog: String,
}

impl ResolvedStyle {
    /// Half extents of the screen box for `text` rendered in this style.
    ///
    /// A coarse measurement — character count times the advance ratio — is
    /// all collision needs; precise shaping happens downstream.
    #[must_use]
    pub fn text_half_extents(&self, text: &str, scale: f64) -> (f64, f64) {
        let chars = text.chars().count() as f64;
        let half_w = chars * self.glyph_height * ADVANCE_RATIO * 0.5 * scale + self.padding.0;
        let half_h = self.glyph_height * 0.5 * scale + self.padding.1;
        (half_w, half_h)
    }
}

/// Outcome of a style lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum StyleResolution {
    /// The requested style, resolved.
    Resolved(ResolvedStyle),
    /// The style name is unknown; the default style was substituted.
    Fallback(ResolvedStyle),
    /// The style name is unknown and no default is configured.
    Unknown,
}

/// Style definitions, font catalog states, and the resolved-parameter cache.
#[derive(Clone, Debug)]
pub struct TextStyleCache {
    styles: HashMap<String, TextStyleDef>,
    default_style: Option<TextStyleDef>,
    catalogs: HashMap<String, CatalogEntry>,
    resolved: HashMap<(u32, String, i32), ResolvedStyle>,
}

impl TextStyleCache {
    /// Create a cache with a built-in default style (16px, no catalog).
    #[must_use]
    pub fn new() -> Self {
        Self {
            styles: HashMap::new(),
            default_style: Some(TextStyleDef::new("", "")),
            catalogs: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Replace the style set, diffing against the current one.
    ///
    /// Idempotent: applying an identical configuration changes nothing and
    /// returns `false`. On any change the resolved-parameter cache is
    /// dropped. Passing `default: None` keeps the built-in default.
    pub fn update_styles(
        &mut self,
        styles: Vec<TextStyleDef>,
        default: Option<TextStyleDef>,
    ) -> bool {
        let next: HashMap<String, TextStyleDef> =
            styles.into_iter().map(|s| (s.name.clone(), s)).collect();
        let default_changed = match &default {
            Some(d) => self.default_style.as_ref() != Some(d),
            None => false,
        };
        if next == self.styles && !default_changed {
            return false;
        }
        self.styles = next;
        if let Some(d) = default {
            self.default_style = Some(d);
        }
        self.resolved.clear();
        true
    }

    /// Replace the catalog set, diffing by name and URL.
    ///
    /// Returns the names of catalogs that need (re)loading: new names and
    /// names whose URL changed. Unchanged catalogs keep their load state, so
    /// re-applying an identical configuration requests nothing. Catalogs
    /// absent from `configs` are dropped.
    pub fn update_catalogs(&mut self, configs: Vec<FontCatalogConfig>) -> Vec<String> {
        let mut to_load = Vec::new();
        let mut next: HashMap<String, CatalogEntry> = HashMap::new();
        for config in configs {
            let entry = match self.catalogs.get(&config.name) {
                Some(existing) if existing.url == config.url => existing.clone(),
                _ => {
                    to_load.push(config.name.clone());
                    CatalogEntry {
                        url: config.url,
                        state: CatalogState::Loading,
                    }
                }
            };
            next.insert(config.name, entry);
        }
        self.catalogs = next;
        to_load
    }

    /// Mark a catalog's load as complete. Returns `false` for names that are
    /// no longer configured (a stale completion).
    pub fn mark_catalog_ready(&mut self, name: &str) -> bool {
        match self.catalogs.get_mut(name) {
            Some(entry) => {
                entry.state = CatalogState::Ready;
                true
            }
            None => false,
        }
    }

    /// Whether text drawing from `name` can render.
    ///
    /// The empty name (no catalog requirement) and names never registered
    /// here are ready by definition; registered catalogs gate on their load.
    #[must_use]
    pub fn catalog_ready(&self, name: &str) -> bool {
        match self.catalogs.get(name) {
            Some(entry) => entry.state == CatalogState::Ready,
            None => true,
        }
    }

    /// Whether a style with this name is configured.
    #[must_use]
    pub fn has_style(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    /// Resolve layout parameters for a style at a zoom level.
    ///
    /// Results are cached by `(data_source, style, floor(zoom))`. An empty
    /// style name resolves to the default without counting as a fallback.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Zoom levels are small integers; the floor always fits an i32."
    )]
    pub fn resolve(&mut self, data_source: u32, style: &str, zoom: f64) -> StyleResolution {
        let zoom_floor = zoom.floor() as i32;
        let (def, fallback) = match self.styles.get(style) {
            Some(def) => (def, false),
            None => match &self.default_style {
                Some(def) => (def, !style.is_empty()),
                None => return StyleResolution::Unknown,
            },
        };

        let key = (data_source, style.to_owned(), zoom_floor);
        let resolved = match self.resolved.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                // Labels grow modestly as the camera zooms in past the
                // reference level and shrink when zoomed out.
                let ramp = (1.0 + 0.04 * (f64::from(zoom_floor) - REFERENCE_ZOOM)).clamp(0.6, 1.4);
                let resolved = ResolvedStyle {
                    glyph_height: def.glyph_height * ramp,
                    padding: def.padding,
                    font_catalog: def.font_catalog.clone(),
                };
                self.resolved.insert(key, resolved.clone());
                resolved
            }
        };
        if fallback {
            StyleResolution::Fallback(resolved)
        } else {
            StyleResolution::Resolved(resolved)
        }
    }

    /// Drop all cached resolved parameters (e.g. on dispose).
    pub fn clear_resolved(&mut self) {
        self.resolved.clear();
    }
}

impl Default for TextStyleCache {
    fn default() -> Self {
        Self::new()
    }
}
