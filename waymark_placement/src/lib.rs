// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Waymark Placement: the per-frame label placement orchestrator.
//!
//! This crate ties the Waymark building blocks together into the engine that
//! decides, every frame, which map labels are on screen and how opaque they
//! are:
//!
//! - [`TextElement`] and [`LabelKind`] model candidate labels (point text,
//!   POIs, path-following text, line markers) owned by [`Tile`]s.
//! - [`TextStyleCache`] resolves per-style layout parameters and tracks font
//!   catalog readiness; styles and catalogs are updated idempotently.
//! - [`DedupCache`] gives labels a stable identity across tiles and zoom
//!   generations so a reloaded label continues its fade instead of
//!   restarting, and suppresses duplicates.
//! - [`Placer`] runs the placement pass: gather candidates from the visible
//!   tiles, sort by priority, project (`waymark_project`), deduplicate, test
//!   and reserve screen boxes (`waymark_collisions`), advance fade states
//!   (`waymark_fade`), and emit draw commands through a [`RenderSink`].
//!
//! The core is single-threaded and frame-synchronous: one placement pass per
//! rendered frame, no overlap, no interior blocking. Asynchronous font and
//! image loading lives at the boundary as message passing: loaders push
//! [`LoadEvent`]s into a [`LoadEventQueue`] handle and the placer drains the
//! queue at the start of the next pass, discarding events from a previous
//! generation (see [`Placer::dispose`]).
//!
//! ## Minimal example
//!
//! ```rust
//! use glam::{DMat4, DVec3};
//! use waymark_placement::{
//!     Placer, RenderSink, PickInfo, SourceTiles, TextElement, Tile, TileKey, ViewState,
//! };
//! use waymark_collisions::ScreenBox;
//! use glam::DVec2;
//!
//! // A render sink that just counts emitted labels.
//! #[derive(Default)]
//! struct Counter(usize);
//! impl RenderSink for Counter {
//!     fn add_text(&mut self, _: DVec2, _: f64, _: &PickInfo) {
//!         self.0 += 1;
//!     }
//!     fn add_icon(&mut self, _: ScreenBox, _: f64, _: &PickInfo) {}
//! }
//!
//! let mut tile = Tile::new(TileKey::new(0, 0, 0, 14));
//! tile.push(TextElement::point("London", DVec3::new(400.0, 300.0, 0.0)));
//!
//! let mut placer = Placer::default();
//! let view = ViewState {
//!     view_proj: DMat4::orthographic_rh_gl(0.0, 800.0, 600.0, 0.0, -1000.0, 1000.0),
//!     camera_pos: DVec3::ZERO,
//!     width: 800.0,
//!     height: 600.0,
//!     near: 0.1,
//!     far: 10_000.0,
//!     zoom: 14.0,
//! };
//!
//! let tiles = [SourceTiles::new(0, std::slice::from_ref(&tile))];
//! let mut sink = Counter::default();
//! let placed = placer.place_text(&tiles, &view, 1000, &mut sink);
//! assert_eq!(placed.len(), 1);
//! assert_eq!(sink.0, 1);
//! ```

mod dedup;
mod element;
mod events;
mod placer;
mod style;
mod tile;

pub use dedup::{CacheEntry, DedupCache, DedupOptions, Resolution};
pub use element::{ElementFlags, IconRef, LabelKind, TextElement};
pub use events::{LoadEvent, LoadEventQueue};
pub use placer::{
    ElevationSource, LabelPart, PickInfo, PlacedLabel, Placer, PlacerOptions, RenderSink,
    ViewState,
};
pub use style::{
    FontCatalogConfig, ResolvedStyle, StyleResolution, TextStyleCache, TextStyleDef,
};
pub use tile::{ElementRef, SourceTiles, Tile, TileKey};
