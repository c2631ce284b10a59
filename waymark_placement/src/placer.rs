// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-frame placement pass.
//!
//! [`Placer::place_text`] is the single entry point the renderer calls each
//! frame. It drains pending load events, projects every candidate from the
//! visible tiles, resolves identity against the dedup cache, reserves screen
//! boxes in the collision index in priority order, advances fade states, and
//! emits draw commands through a [`RenderSink`]. The pass is synchronous and
//! allocates no cross-frame references: the collision index is rebuilt from
//! scratch, and only the dedup cache carries state between frames.

use glam::{DVec2, DVec3};
use hashbrown::{HashMap, HashSet};
use kurbo::Point;
use smallvec::SmallVec;
use tracing::{debug, warn};

use waymark_collisions::{CollisionIndex, DEFAULT_CELL_SIZE, ScreenBox};
use waymark_fade::{DEFAULT_FADE_DURATION_MS, FadeState, RenderState};
use waymark_geom::screen_rect;
use waymark_project::ScreenProjector;

use crate::dedup::{DedupCache, DedupOptions, Resolution};
use crate::element::{ElementFlags, LabelKind, TextElement};
use crate::events::{LoadEvent, LoadEventQueue};
use crate::style::{FontCatalogConfig, StyleResolution, TextStyleCache, TextStyleDef};
use crate::tile::{ElementRef, SourceTiles, TileKey};

/// Tuning knobs for the placement pass.
#[derive(Clone, Copy, Debug)]
pub struct PlacerOptions {
    /// Fade transition length in milliseconds.
    pub fade_duration_ms: u64,
    /// Consecutive frames a previously visible label that lost its slot to
    /// a collision keeps its second-chance ordering boost.
    pub max_retries: u32,
    /// Labels farther from the camera than this fraction of the far plane
    /// are culled (unless flagged [`ElementFlags::IGNORE_DISTANCE`]).
    pub max_distance_ratio: f64,
    /// Collision index cell size in pixels.
    pub collision_cell_size: f64,
    /// Identity-matching tuning.
    pub dedup: DedupOptions,
}

impl Default for PlacerOptions {
    fn default() -> Self {
        Self {
            fade_duration_ms: DEFAULT_FADE_DURATION_MS,
            max_retries: 3,
            max_distance_ratio: 0.45,
            collision_cell_size: DEFAULT_CELL_SIZE,
            dedup: DedupOptions::default(),
        }
    }
}

/// The camera for one frame.
#[derive(Clone, Copy, Debug)]
pub struct ViewState {
    /// Combined view-projection matrix, GL clip conventions.
    pub view_proj: glam::DMat4,
    /// Camera position in world space.
    pub camera_pos: DVec3,
    /// Viewport width in pixels.
    pub width: f64,
    /// Viewport height in pixels.
    pub height: f64,
    /// Near plane distance.
    pub near: f64,
    /// Far plane distance; the distance-cull threshold scales off it.
    pub far: f64,
    /// Current map zoom level.
    pub zoom: f64,
}

/// Identity of a placed label part, carried through the collision index and
/// draw commands so hit testing can map a pixel back to its source feature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickInfo {
    /// The owning tile.
    pub tile: TileKey,
    /// The element within its tile arena.
    pub element: ElementRef,
    /// Feature identity, when the source data carries one.
    pub feature_id: Option<u64>,
    /// The label text.
    pub text: String,
}

/// Which sub-part of a label a draw command belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LabelPart {
    /// The text box.
    Text,
    /// The icon box.
    Icon,
}

/// One emitted label part, reported back from [`Placer::place_text`].
#[derive(Clone, Debug)]
pub struct PlacedLabel {
    /// Source identity.
    pub pick: PickInfo,
    /// Which part was drawn.
    pub part: LabelPart,
    /// Fade phase after this frame's update.
    pub state: FadeState,
    /// Opacity after this frame's update.
    pub opacity: f64,
    /// Screen box the part occupies.
    pub bounds: ScreenBox,
}

/// Receiver for the frame's draw commands.
pub trait RenderSink {
    /// Draw `pick`'s text centered at `anchor` with the given opacity.
    fn add_text(&mut self, anchor: DVec2, opacity: f64, pick: &PickInfo);
    /// Draw `pick`'s icon filling `bounds` with the given opacity.
    fn add_icon(&mut self, bounds: ScreenBox, opacity: f64, pick: &PickInfo);
}

/// Terrain heights for draping label anchors.
///
/// When a source is installed, anchors are lifted to the sampled elevation
/// before projection; `None` samples leave the anchor untouched.
pub trait ElevationSource {
    /// Terrain height at a world `(x, y)`, if known.
    fn elevation_at(&self, x: f64, y: f64) -> Option<f64>;
}

/// The label placement engine.
///
/// One placer serves one map view. It is single-threaded by contract; all
/// cross-thread interaction happens through the [`LoadEventQueue`] handle.
pub struct Placer {
    options: PlacerOptions,
    projector: ScreenProjector,
    collisions: CollisionIndex<PickInfo>,
    dedup: DedupCache,
    styles: TextStyleCache,
    events: LoadEventQueue,
    elevation: Option<Box<dyn ElevationSource>>,
    /// Bumped on [`dispose`][Self::dispose]; load events from an older
    /// generation are discarded.
    generation: u64,
    frame: u64,
    ready_images: HashSet<String>,
    pending_images: Vec<String>,
    warned: HashSet<String>,
    needs_redraw: bool,
}

impl core::fmt::Debug for Placer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Placer")
            .field("generation", &self.generation)
            .field("frame", &self.frame)
            .field("cached_labels", &self.dedup.len())
            .finish_non_exhaustive()
    }
}

impl Default for Placer {
    fn default() -> Self {
        Self::new(PlacerOptions::default())
    }
}

impl Placer {
    /// Create a placer.
    #[must_use]
    pub fn new(options: PlacerOptions) -> Self {
        Self {
            options,
            projector: ScreenProjector::new(),
            collisions: CollisionIndex::with_cell_size(options.collision_cell_size),
            dedup: DedupCache::new(options.dedup),
            styles: TextStyleCache::new(),
            events: LoadEventQueue::new(),
            elevation: None,
            generation: 0,
            frame: 0,
            ready_images: HashSet::new(),
            pending_images: Vec::new(),
            warned: HashSet::new(),
            needs_redraw: false,
        }
    }

    /// The queue handle to hand to font and image loaders.
    #[must_use]
    pub fn load_events(&self) -> LoadEventQueue {
        self.events.clone()
    }

    /// The current generation, to stamp into [`LoadEvent`]s.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply a style configuration. Idempotent; a real change schedules a
    /// redraw.
    pub fn update_text_styles(&mut self, styles: Vec<TextStyleDef>, default: Option<TextStyleDef>) {
        if self.styles.update_styles(styles, default) {
            self.needs_redraw = true;
        }
    }

    /// Apply a font catalog configuration. Returns the catalog names the
    /// host must load; completions come back as
    /// [`LoadEvent::CatalogReady`].
    pub fn update_font_catalogs(&mut self, configs: Vec<FontCatalogConfig>) -> Vec<String> {
        self.styles.update_catalogs(configs)
    }

    /// Install or remove the terrain elevation source.
    pub fn set_elevation_source(&mut self, source: Option<Box<dyn ElevationSource>>) {
        self.elevation = source;
        self.needs_redraw = true;
    }

    /// Enable or disable collision testing. While disabled, every candidate
    /// places; screen boxes are still recorded so picking keeps working.
    pub fn set_collision_enabled(&mut self, enabled: bool) {
        if self.collisions.is_enabled() != enabled {
            self.collisions.set_enabled(enabled);
            self.needs_redraw = true;
        }
    }

    /// Icon image names requested since the last call. The host loads them
    /// and reports back with [`LoadEvent::ImageReady`].
    pub fn take_image_requests(&mut self) -> Vec<String> {
        core::mem::take(&mut self.pending_images)
    }

    /// Mark an icon image as available without going through the event
    /// queue, for hosts with a synchronously populated atlas.
    pub fn mark_image_ready(&mut self, name: impl Into<String>) {
        self.ready_images.insert(name.into());
        self.needs_redraw = true;
    }

    /// Whether the last pass left unfinished fades or pending changes, and
    /// the host should schedule another frame. Reading resets the flag.
    pub fn take_needs_redraw(&mut self) -> bool {
        core::mem::take(&mut self.needs_redraw)
    }

    /// All labels whose reserved screen box contains the pixel `(x, y)`.
    #[must_use]
    pub fn pick(&self, x: f64, y: f64) -> Vec<PickInfo> {
        self.collisions
            .query_point(x, y)
            .map(|placed| placed.payload.clone())
            .collect()
    }

    /// Fade state of the first cached label with this text, for inspection.
    #[must_use]
    pub fn render_state(&self, text: &str) -> Option<RenderState> {
        self.dedup
            .lookup(text)
            .and_then(|entries| entries.first())
            .map(|entry| entry.text_state)
    }

    /// Tear down per-view state.
    ///
    /// Clears the identity and collision caches and bumps the generation so
    /// load events already in flight are discarded when they arrive. Style
    /// and catalog configuration survives; catalogs whose completion was
    /// lost to the bump must be re-requested by the host.
    pub fn dispose(&mut self) {
        self.generation += 1;
        self.dedup.clear();
        self.collisions.reset();
        self.styles.clear_resolved();
        self.ready_images.clear();
        self.pending_images.clear();
        self.warned.clear();
        let _ = self.events.drain();
        self.needs_redraw = true;
    }

    /// Run one placement pass and emit this frame's draw commands.
    ///
    /// `sources` is the visible tile set, one entry per data source; `now`
    /// is the frame time in milliseconds on a monotonic clock. Returns every
    /// emitted label part.
    pub fn place_text<S: RenderSink>(
        &mut self,
        sources: &[SourceTiles<'_>],
        view: &ViewState,
        now: u64,
        sink: &mut S,
    ) -> Vec<PlacedLabel> {
        self.frame += 1;
        let options = self.options;

        self.apply_load_events();
        self.projector.update(view.view_proj, view.width, view.height);
        self.collisions.reset();

        // Gather candidates across all sources, then order globally:
        // priority first, and within a priority band labels holding a
        // second-chance retry go first so newcomers cannot steal the slot
        // they are about to re-claim.
        let mut candidates: Vec<(ElementRef, &TextElement, bool)> = Vec::new();
        for source in sources {
            for tile in source.tiles {
                self.needs_redraw |= tile.changed;
                for (eref, el) in tile.elements() {
                    let retrying = self
                        .dedup
                        .lookup(&el.text)
                        .is_some_and(|entries| entries.iter().any(|e| e.retries > 0));
                    candidates.push((eref, el, retrying));
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.1.priority
                .cmp(&a.1.priority)
                .then(b.2.cmp(&a.2))
        });

        let mut placed_out = Vec::new();
        // Screen anchors of labels placed this frame, by text. Distinct
        // features sharing a name (dual carriageways, repeated shields) are
        // thinned when they project too close together.
        let mut placed_texts: HashMap<&str, SmallVec<[DVec2; 2]>> = HashMap::new();
        for (eref, el, _) in candidates {
            if !el.is_valid() {
                if self.warned.insert(format!("invalid:{}", el.text)) {
                    warn!(text = %el.text, "skipping label with non-finite geometry");
                }
                continue;
            }

            // Zoom gating per part. Leaving the zoom interval is a failed
            // placement like any other: a visible label fades out rather
            // than popping off the moment the zoom crosses its bound.
            let text_in_zoom = zoom_in(view.zoom, el.zoom_range);
            let icon_in_zoom = zoom_in(view.zoom, el.icon_zoom_range.unwrap_or(el.zoom_range));
            let has_icon = el.kind.has_icon();
            let fully_out_of_zoom = if matches!(el.kind, LabelKind::LineMarker { .. }) {
                !icon_in_zoom
            } else {
                !text_in_zoom && !(has_icon && icon_in_zoom)
            };

            let resolved = match self.styles.resolve(eref.tile.data_source, &el.style, view.zoom) {
                StyleResolution::Resolved(r) => r,
                StyleResolution::Fallback(r) => {
                    if self.warned.insert(format!("style:{}", el.style)) {
                        warn!(style = %el.style, "unknown text style, using default");
                    }
                    r
                }
                StyleResolution::Unknown => {
                    if self.warned.insert(format!("style:{}", el.style)) {
                        warn!(style = %el.style, "unknown text style and no default configured");
                    }
                    continue;
                }
            };
            let catalog_ready = self.styles.catalog_ready(&resolved.font_catalog);

            // Icon readiness: request the image once the icon enters its
            // zoom range, render it only after the host reports it loaded.
            let icon_ready = match el.kind.icon() {
                Some(icon) if icon_in_zoom => {
                    let ready = self.ready_images.contains(&icon.name);
                    if !ready && !self.pending_images.contains(&icon.name) {
                        self.pending_images.push(icon.name.clone());
                    }
                    ready
                }
                _ => false,
            };

            let (resolution, entry) = self.dedup.resolve(el, eref.tile, view.zoom);
            if resolution == Resolution::Duplicate {
                continue;
            }
            // An out-of-zoom label with nothing left on screen is simply
            // absent; its entry sits unclaimed until eviction collects it.
            if fully_out_of_zoom && entry.fully_faded_out() {
                continue;
            }
            // A label returning after frames off the visible set resumes its
            // transition from the frozen opacity.
            if resolution != Resolution::New && self.frame > entry.last_seen + 1 {
                entry.text_state.rebase(now);
                if let Some(state) = entry.icon_state.as_mut() {
                    state.rebase(now);
                }
                for state in &mut entry.point_states {
                    state.rebase(now);
                }
            }
            entry.last_seen = self.frame;
            entry.last_seen_at = now;

            let pick = PickInfo {
                tile: eref.tile,
                element: eref,
                feature_id: el.feature_id,
                text: el.text.clone(),
            };

            if let LabelKind::LineMarker { path, icon } = &el.kind {
                entry.point_states.resize(path.len(), RenderState::new());
                let icon_half = (icon.width * el.scale * 0.5, icon.height * el.scale * 0.5);
                let may_overlap = el.flags.contains(ElementFlags::MAY_OVERLAP);
                for (point, state) in path.iter().zip(entry.point_states.iter_mut()) {
                    let world = drape(self.elevation.as_deref(), *point);
                    let projected = self.projector.project_area(world, icon_half.0, icon_half.1);
                    let placed = match projected {
                        Some(p) if icon_in_zoom && icon_ready => {
                            let bounds = part_box(p, icon_half.0, icon_half.1, (0.0, 0.0));
                            let free = may_overlap || !self.collisions.intersects(&bounds);
                            if free && !may_overlap {
                                self.collisions.allocate(
                                    bounds,
                                    view.camera_pos.distance(world),
                                    pick.clone(),
                                );
                            }
                            free
                        }
                        _ => false,
                    };
                    state.apply_outcome(placed, now);
                    let opacity = state.update(now, options.fade_duration_ms);
                    if state.is_fading() {
                        self.needs_redraw = true;
                    }
                    if !state.is_faded_out() {
                        if let Some(p) = projected {
                            let bounds = part_box(p, icon_half.0, icon_half.1, (0.0, 0.0));
                            sink.add_icon(bounds, opacity, &pick);
                            placed_out.push(PlacedLabel {
                                pick: pick.clone(),
                                part: LabelPart::Icon,
                                state: state.state(),
                                opacity,
                                bounds,
                            });
                        }
                    }
                }
                continue;
            }

            // Point-anchored kinds: one text box, plus an icon box for POIs.
            let text_wanted = text_in_zoom && catalog_ready;
            let icon_wanted = has_icon && icon_in_zoom && icon_ready;
            // A required icon whose image has not arrived fails the whole
            // label; the text must not appear first and shift when the
            // icon lands.
            let icon_missing = has_icon
                && icon_in_zoom
                && !icon_ready
                && !el.flags.contains(ElementFlags::ICON_OPTIONAL);
            let (text_half_w, text_half_h) = resolved.text_half_extents(&el.text, el.scale);
            let (icon_half_w, icon_half_h) = match el.kind.icon() {
                Some(icon) => (icon.width * el.scale * 0.5, icon.height * el.scale * 0.5),
                None => (0.0, 0.0),
            };

            let world = drape(self.elevation.as_deref(), el.position);
            let projected = self.projector.project_area(
                world,
                text_half_w.max(icon_half_w) + el.offset.0.abs(),
                text_half_h.max(icon_half_h) + el.offset.1.abs(),
            );
            let distance = view.camera_pos.distance(world);
            let culled = !el.flags.contains(ElementFlags::IGNORE_DISTANCE)
                && distance > options.max_distance_ratio * view.far;
            let sibling = projected.is_some_and(|p| {
                placed_texts.get(el.text.as_str()).is_some_and(|anchors| {
                    anchors
                        .iter()
                        .any(|q| q.distance(p) < options.dedup.sibling_tolerance_px)
                })
            });

            let (place_text_part, place_icon_part, screen) = match projected {
                Some(p)
                    if !culled && !sibling && !icon_missing && (text_wanted || icon_wanted) =>
                {
                    let may_overlap = el.flags.contains(ElementFlags::MAY_OVERLAP);
                    let text_box = part_box(p, text_half_w, text_half_h, el.offset);
                    let icon_box = part_box(p, icon_half_w, icon_half_h, (0.0, 0.0));
                    let text_free =
                        !text_wanted || may_overlap || !self.collisions.intersects(&text_box);
                    let icon_free =
                        !icon_wanted || may_overlap || !self.collisions.intersects(&icon_box);

                    // A blocked part that is not optional sinks the label.
                    let text_required = text_wanted && !el.flags.contains(ElementFlags::TEXT_OPTIONAL);
                    let icon_required = icon_wanted && !el.flags.contains(ElementFlags::ICON_OPTIONAL);
                    let label_ok =
                        (!text_required || text_free) && (!icon_required || icon_free);

                    if label_ok {
                        entry.retries = 0;
                        placed_texts.entry(el.text.as_str()).or_default().push(p);
                        let place_text_part = text_wanted && text_free;
                        let place_icon_part = icon_wanted && icon_free;
                        // Both boxes are tested before either is reserved,
                        // so a label never blocks its own parts.
                        if !may_overlap {
                            if place_text_part {
                                self.collisions.allocate(text_box, distance, pick.clone());
                            }
                            if place_icon_part {
                                self.collisions.allocate(icon_box, distance, pick.clone());
                            }
                        }
                        (place_text_part, place_icon_part, Some(p))
                    } else {
                        // A collision loss starts the fade-out this frame.
                        // A label that was on screen keeps a second-chance
                        // retry so it sorts ahead of same-priority newcomers
                        // next frame; most collisions are transient and the
                        // label wins its slot back mid-fade.
                        if (second_chance(entry.text_state)
                            || entry.icon_state.is_some_and(second_chance))
                            && entry.retries < options.max_retries
                        {
                            entry.retries += 1;
                            self.needs_redraw = true;
                        } else {
                            entry.retries = 0;
                        }
                        (false, false, Some(p))
                    }
                }
                other => {
                    entry.retries = 0;
                    (false, false, other)
                }
            };

            entry.text_state.apply_outcome(place_text_part, now);
            if has_icon && entry.icon_state.is_none() {
                entry.icon_state = Some(RenderState::new());
            }
            if let Some(state) = entry.icon_state.as_mut() {
                state.apply_outcome(place_icon_part, now);
            }

            let text_opacity = entry.text_state.update(now, options.fade_duration_ms);
            if entry.text_state.is_fading() {
                self.needs_redraw = true;
            }
            if !entry.text_state.is_faded_out() {
                if let Some(p) = screen {
                    let anchor = DVec2::new(p.x + el.offset.0, p.y + el.offset.1);
                    let bounds = part_box(p, text_half_w, text_half_h, el.offset);
                    sink.add_text(anchor, text_opacity, &pick);
                    placed_out.push(PlacedLabel {
                        pick: pick.clone(),
                        part: LabelPart::Text,
                        state: entry.text_state.state(),
                        opacity: text_opacity,
                        bounds,
                    });
                }
            }

            if let Some(state) = entry.icon_state.as_mut() {
                let opacity = state.update(now, options.fade_duration_ms);
                if state.is_fading() {
                    self.needs_redraw = true;
                }
                if !state.is_faded_out() {
                    if let Some(p) = screen {
                        let bounds = part_box(p, icon_half_w, icon_half_h, (0.0, 0.0));
                        sink.add_icon(bounds, opacity, &pick);
                        placed_out.push(PlacedLabel {
                            pick,
                            part: LabelPart::Icon,
                            state: state.state(),
                            opacity,
                            bounds,
                        });
                    }
                }
            }
        }

        self.dedup.evict(now, options.fade_duration_ms);
        placed_out
    }

    /// Drain the load-event queue, applying events from the current
    /// generation and discarding stale ones.
    fn apply_load_events(&mut self) {
        for event in self.events.drain() {
            match event {
                LoadEvent::CatalogReady { name, generation } => {
                    if generation != self.generation {
                        debug!(catalog = %name, "discarding stale catalog event");
                    } else if self.styles.mark_catalog_ready(&name) {
                        self.needs_redraw = true;
                    }
                }
                LoadEvent::ImageReady { name, generation } => {
                    if generation != self.generation {
                        debug!(image = %name, "discarding stale image event");
                    } else {
                        self.ready_images.insert(name);
                        self.needs_redraw = true;
                    }
                }
            }
        }
    }
}

fn zoom_in(zoom: f64, range: (f64, f64)) -> bool {
    zoom >= range.0 && zoom <= range.1
}

/// Screen box for a label part, anchored at the projected point plus the
/// style offset.
fn part_box(anchor: DVec2, half_w: f64, half_h: f64, offset: (f64, f64)) -> ScreenBox {
    let r = screen_rect(Point::new(anchor.x, anchor.y), half_w, half_h, offset);
    ScreenBox::new(r.x0, r.y0, r.x1, r.y1)
}

fn drape(elevation: Option<&dyn ElevationSource>, mut p: DVec3) -> DVec3 {
    if let Some(source) = elevation {
        if let Some(z) = source.elevation_at(p.x, p.y) {
            p.z = z;
        }
    }
    p
}

/// Whether a part that just lost its slot earns a second-chance retry: it was
/// on (or headed for) the screen and had not already committed to a fade-out.
fn second_chance(state: RenderState) -> bool {
    matches!(state.state(), FadeState::FadingIn | FadeState::FadedIn)
}

#[cfg(test)]
mod tests {
    use glam::DMat4;

    use super::*;
    use crate::element::IconRef;
    use crate::tile::Tile;

    #[derive(Default)]
    struct Sink {
        texts: Vec<(String, f64)>,
        icons: Vec<(String, f64)>,
    }

    impl RenderSink for Sink {
        fn add_text(&mut self, _anchor: DVec2, opacity: f64, pick: &PickInfo) {
            self.texts.push((pick.text.clone(), opacity));
        }
        fn add_icon(&mut self, _bounds: ScreenBox, opacity: f64, pick: &PickInfo) {
            self.icons.push((pick.text.clone(), opacity));
        }
    }

    /// An 800x600 orthographic view where world units are pixels.
    fn view() -> ViewState {
        ViewState {
            view_proj: DMat4::orthographic_rh_gl(0.0, 800.0, 600.0, 0.0, -1000.0, 1000.0),
            camera_pos: DVec3::ZERO,
            width: 800.0,
            height: 600.0,
            near: 0.1,
            far: 10_000.0,
            zoom: 14.0,
        }
    }

    fn tile_of(elements: Vec<TextElement>) -> Tile {
        let mut tile = Tile::new(TileKey::new(0, 0, 0, 14));
        for el in elements {
            tile.push(el);
        }
        tile
    }

    fn frame(placer: &mut Placer, tiles: &[Tile], now: u64) -> (Vec<PlacedLabel>, Sink) {
        let mut sink = Sink::default();
        let sources = [SourceTiles::new(0, tiles)];
        let placed = placer.place_text(&sources, &view(), now, &mut sink);
        (placed, sink)
    }

    #[test]
    fn fresh_label_fades_in_over_the_duration() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![TextElement::point(
            "London",
            DVec3::new(400.0, 300.0, 0.0),
        )])];

        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].state, FadeState::FadingIn);
        assert_eq!(placed[0].opacity, 0.0);
        assert!(placer.take_needs_redraw());

        let (placed, _) = frame(&mut placer, &tiles, 400);
        assert!(placed[0].opacity > 0.0 && placed[0].opacity < 1.0);

        let (placed, sink) = frame(&mut placer, &tiles, 800);
        assert_eq!(placed[0].state, FadeState::FadedIn);
        assert_eq!(placed[0].opacity, 1.0);
        assert_eq!(sink.texts, [("London".to_owned(), 1.0)]);
    }

    #[test]
    fn higher_priority_wins_the_collision() {
        let mut placer = Placer::default();
        let pos = DVec3::new(400.0, 300.0, 0.0);
        let tiles = [tile_of(vec![
            TextElement::point("minor", pos),
            TextElement::point("major", pos).with_priority(5),
        ])];

        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].pick.text, "major");
        // The loser never became visible, so it emits nothing.
        assert!(placer.render_state("minor").unwrap().is_faded_out());
    }

    #[test]
    fn disabling_collisions_places_everything() {
        let mut placer = Placer::default();
        placer.set_collision_enabled(false);
        let pos = DVec3::new(400.0, 300.0, 0.0);
        let tiles = [tile_of(vec![
            TextElement::point("minor", pos),
            TextElement::point("major", pos).with_priority(5),
        ])];

        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 2);
        // Boxes are still recorded while disabled, so picking works.
        assert_eq!(placer.pick(400.0, 300.0).len(), 2);
    }

    #[test]
    fn feature_id_replacement_keeps_opacity() {
        let mut placer = Placer::default();
        let old = [tile_of(vec![
            TextElement::point("Bridge", DVec3::new(400.0, 300.0, 0.0)).with_feature_id(7),
        ])];
        frame(&mut placer, &old, 0);
        frame(&mut placer, &old, 800);
        assert!(placer.render_state("Bridge").unwrap().is_faded_in());

        // The same feature arrives from a new tile at a slightly different
        // anchor; the swap must not dip the opacity.
        let mut tile = Tile::new(TileKey::new(0, 0, 1, 15));
        tile.push(TextElement::point("Bridge", DVec3::new(410.0, 300.0, 0.0)).with_feature_id(7));
        let (placed, _) = frame(&mut placer, &[tile], 900);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].opacity, 1.0);
        assert_eq!(placed[0].state, FadeState::FadedIn);
    }

    #[test]
    fn longer_path_wins_within_two_frames_either_order() {
        for shorter_first in [false, true] {
            // The short clip lies on the long one, as a neighboring tile's
            // fragment of the same road does.
            let long = TextElement::path(
                "Main St",
                vec![DVec3::new(100.0, 300.0, 0.0), DVec3::new(700.0, 300.0, 0.0)],
            );
            let short = TextElement::path(
                "Main St",
                vec![DVec3::new(350.0, 300.0, 0.0), DVec3::new(450.0, 300.0, 0.0)],
            );
            let pair = if shorter_first {
                vec![short.clone(), long.clone()]
            } else {
                vec![long.clone(), short.clone()]
            };
            let tiles = [tile_of(pair)];

            let mut placer = Placer::default();
            frame(&mut placer, &tiles, 0);
            let (placed, _) = frame(&mut placer, &tiles, 100);
            assert_eq!(placed.len(), 1, "shorter_first={shorter_first}");
            // The surviving entry carries the longer clip's geometry.
            let entries = placer.dedup.lookup("Main St").unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].path_length, 600.0);
        }
    }

    #[test]
    fn nearby_labels_with_the_same_text_are_thinned() {
        let mut placer = Placer::default();
        // Three distinct features sharing a name. The middle one projects
        // within the sibling radius of the first and is withheld even
        // though its box clears the collision index.
        let tiles = [tile_of(vec![
            TextElement::point("Ash", DVec3::new(400.0, 300.0, 0.0)),
            TextElement::point("Ash", DVec3::new(400.0, 320.0, 0.0)),
            TextElement::point("Ash", DVec3::new(400.0, 440.0, 0.0)),
        ])];

        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 2);
        // All three are cached as separate features regardless.
        assert_eq!(placer.dedup.lookup("Ash").unwrap().len(), 3);
    }

    #[test]
    fn collision_loss_fades_out_but_earns_a_retry() {
        let mut placer = Placer::default();
        let pos = DVec3::new(400.0, 300.0, 0.0);
        let alone = [tile_of(vec![TextElement::point("loser", pos)])];
        frame(&mut placer, &alone, 0);
        frame(&mut placer, &alone, 800);
        assert!(placer.render_state("loser").unwrap().is_faded_in());

        // A higher-priority label lands on the same spot. The incumbent
        // starts fading that very frame, still emitting without a slot.
        let crowded = [tile_of(vec![
            TextElement::point("loser", pos),
            TextElement::point("winner", pos).with_priority(9),
        ])];
        let (placed, _) = frame(&mut placer, &crowded, 900);
        let loser = placed.iter().find(|p| p.pick.text == "loser").unwrap();
        assert_eq!(loser.state, FadeState::FadingOut);
        assert_eq!(loser.opacity, 1.0);
        assert_eq!(placer.dedup.lookup("loser").unwrap()[0].retries, 1);

        // The blocker leaves: the retry wins the slot back mid-fade.
        let (placed, _) = frame(&mut placer, &alone, 1100);
        let loser = placed.iter().find(|p| p.pick.text == "loser").unwrap();
        assert!(matches!(
            loser.state,
            FadeState::FadingIn | FadeState::FadedIn
        ));
        assert_eq!(placer.dedup.lookup("loser").unwrap()[0].retries, 0);

        // Blocked for good, it finishes the fade and stops emitting.
        frame(&mut placer, &crowded, 1200);
        let (placed, _) = frame(&mut placer, &crowded, 2200);
        assert!(placed.iter().all(|p| p.pick.text != "loser"));
    }

    #[test]
    fn reenabling_collisions_starts_the_fade_out_that_frame() {
        let mut placer = Placer::default();
        let pos = DVec3::new(400.0, 300.0, 0.0);
        let tiles = [tile_of(vec![
            TextElement::point("p0", pos),
            TextElement::point("p1", pos).with_priority(5),
        ])];
        placer.set_collision_enabled(false);
        frame(&mut placer, &tiles, 0);
        frame(&mut placer, &tiles, 800);

        placer.set_collision_enabled(true);
        let (placed, _) = frame(&mut placer, &tiles, 900);
        let state_of = |text: &str| placed.iter().find(|l| l.pick.text == text).unwrap().state;
        assert_eq!(state_of("p1"), FadeState::FadedIn);
        // The loser does not linger at full opacity; its fade-out begins
        // the frame the collision appears.
        assert_eq!(state_of("p0"), FadeState::FadingOut);
    }

    #[test]
    fn may_overlap_labels_share_space_and_reserve_nothing() {
        let mut placer = Placer::default();
        let pos = DVec3::new(400.0, 300.0, 0.0);
        let tiles = [tile_of(vec![
            TextElement::point("solid", pos).with_priority(5),
            TextElement::point("ghost", pos).with_flags(ElementFlags::MAY_OVERLAP),
        ])];
        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 2);
        // Only the solid label is pickable.
        let picks = placer.pick(400.0, 300.0);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].text, "solid");
    }

    #[test]
    fn distant_labels_are_culled_unless_exempt() {
        let mut placer = Placer::default();
        let mut v = view();
        v.far = 1000.0; // cull threshold 450
        let far_pos = DVec3::new(400.0, 300.0, 0.0); // distance 500 from origin
        let tiles = [tile_of(vec![
            TextElement::point("culled", far_pos),
            TextElement::point("exempt", far_pos)
                .with_offset(0.0, 40.0)
                .with_flags(ElementFlags::IGNORE_DISTANCE),
        ])];

        let mut sink = Sink::default();
        let sources = [SourceTiles::new(0, &tiles)];
        let placed = placer.place_text(&sources, &v, 0, &mut sink);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].pick.text, "exempt");
    }

    #[test]
    fn zoom_range_gates_visibility() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![
            TextElement::point("low-zoom only", DVec3::new(400.0, 300.0, 0.0))
                .with_zoom_range(0.0, 10.0),
        ])];
        let (placed, _) = frame(&mut placer, &tiles, 0); // view zoom is 14
        assert!(placed.is_empty());
    }

    #[test]
    fn leaving_the_zoom_range_fades_out() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![
            TextElement::point("London", DVec3::new(400.0, 300.0, 0.0)).with_zoom_range(0.0, 15.0),
        ])];
        frame(&mut placer, &tiles, 0);
        frame(&mut placer, &tiles, 800);
        assert!(placer.render_state("London").unwrap().is_faded_in());

        // Zoom past the label's range: it fades, it does not pop off.
        let mut zoomed = view();
        zoomed.zoom = 16.0;
        let run = |placer: &mut Placer, now: u64| {
            let mut sink = Sink::default();
            let sources = [SourceTiles::new(0, &tiles)];
            placer.place_text(&sources, &zoomed, now, &mut sink)
        };
        let placed = run(&mut placer, 900);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].state, FadeState::FadingOut);
        assert_eq!(placed[0].opacity, 1.0);

        let placed = run(&mut placer, 1300);
        assert!(placed[0].opacity > 0.0 && placed[0].opacity < 1.0);

        let placed = run(&mut placer, 1700);
        assert!(placed.is_empty());
    }

    #[test]
    fn text_waits_for_its_font_catalog() {
        let mut placer = Placer::default();
        placer.update_text_styles(vec![TextStyleDef::new("city", "fonts")], None);
        let to_load = placer.update_font_catalogs(vec![FontCatalogConfig {
            name: "fonts".into(),
            url: "u".into(),
        }]);
        assert_eq!(to_load, ["fonts"]);

        let tiles = [tile_of(vec![
            TextElement::point("Paris", DVec3::new(400.0, 300.0, 0.0)).with_style("city"),
        ])];
        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert!(placed.is_empty());

        // A stale completion (older generation) must not unlock it.
        placer.dispose();
        placer.load_events().push(LoadEvent::CatalogReady {
            name: "fonts".into(),
            generation: placer.generation() - 1,
        });
        let (placed, _) = frame(&mut placer, &tiles, 100);
        assert!(placed.is_empty());

        placer.load_events().push(LoadEvent::CatalogReady {
            name: "fonts".into(),
            generation: placer.generation(),
        });
        let (placed, _) = frame(&mut placer, &tiles, 200);
        assert_eq!(placed.len(), 1);
    }

    #[test]
    fn poi_waits_for_its_image_before_placing_anything() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![TextElement::poi(
            "Cafe",
            DVec3::new(400.0, 300.0, 0.0),
            IconRef::new("cafe", 16.0, 16.0),
        )])];

        // The icon is not optional, so the text must not appear alone and
        // shift once the image lands.
        let (placed, sink) = frame(&mut placer, &tiles, 0);
        assert!(placed.is_empty());
        assert!(sink.texts.is_empty());
        assert_eq!(placer.take_image_requests(), ["cafe"]);
        assert!(placer.take_image_requests().is_empty());

        placer.load_events().push(LoadEvent::ImageReady {
            name: "cafe".into(),
            generation: placer.generation(),
        });
        let (placed, sink) = frame(&mut placer, &tiles, 100);
        assert_eq!(placed.len(), 2);
        assert_eq!(sink.texts.len(), 1);
        assert_eq!(sink.icons.len(), 1);
    }

    #[test]
    fn optional_icon_does_not_hold_back_the_text() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![
            TextElement::poi(
                "Kiosk",
                DVec3::new(400.0, 300.0, 0.0),
                IconRef::new("kiosk", 16.0, 16.0),
            )
            .with_flags(ElementFlags::ICON_OPTIONAL),
        ])];

        let (placed, sink) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].part, LabelPart::Text);
        assert!(sink.icons.is_empty());
    }

    #[test]
    fn line_marker_places_each_point_independently() {
        let mut placer = Placer::default();
        placer.mark_image_ready("shield");
        let marker = TextElement::line_marker(
            "A3",
            vec![
                DVec3::new(100.0, 300.0, 0.0),
                DVec3::new(400.0, 300.0, 0.0),
                DVec3::new(700.0, 300.0, 0.0),
            ],
            IconRef::new("shield", 12.0, 12.0),
        );

        let tiles = [tile_of(vec![marker.clone()])];
        let (placed, sink) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 3);
        assert_eq!(sink.icons.len(), 3);

        // A higher-priority label over the middle point knocks out only
        // that point.
        let crowded = [tile_of(vec![
            marker,
            TextElement::point("blocker", DVec3::new(400.0, 300.0, 0.0)).with_priority(9),
        ])];
        let mut placer = Placer::default();
        placer.mark_image_ready("shield");
        let (placed, _) = frame(&mut placer, &crowded, 0);
        let markers: Vec<_> = placed.iter().filter(|p| p.pick.text == "A3").collect();
        assert_eq!(markers.len(), 2);
    }

    #[test]
    fn frozen_entries_are_evicted_after_long_absence() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![TextElement::point(
            "ephemeral",
            DVec3::new(400.0, 300.0, 0.0),
        )])];
        frame(&mut placer, &tiles, 0);
        frame(&mut placer, &tiles, 400);
        assert!(placer.render_state("ephemeral").is_some());

        // The tile leaves the visible set; well past the hard eviction
        // window the identity is gone and a return starts from scratch.
        frame(&mut placer, &[], 5000);
        assert!(placer.render_state("ephemeral").is_none());
    }

    #[test]
    fn invalid_elements_are_skipped() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![
            TextElement::point("nan", DVec3::new(f64::NAN, 0.0, 0.0)),
            TextElement::point("ok", DVec3::new(400.0, 300.0, 0.0)),
        ])];
        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].pick.text, "ok");
    }

    #[test]
    fn elevation_source_drapes_anchors() {
        struct Flat(f64);
        impl ElevationSource for Flat {
            fn elevation_at(&self, _x: f64, _y: f64) -> Option<f64> {
                Some(self.0)
            }
        }

        let mut placer = Placer::default();
        // With the ortho view any z in (-1000, 1000) stays on screen; an
        // elevation outside the clip volume culls the label.
        placer.set_elevation_source(Some(Box::new(Flat(5000.0))));
        let tiles = [tile_of(vec![TextElement::point(
            "peak",
            DVec3::new(400.0, 300.0, 0.0),
        )])];
        let (placed, _) = frame(&mut placer, &tiles, 0);
        assert!(placed.is_empty());

        placer.set_elevation_source(None);
        let (placed, _) = frame(&mut placer, &tiles, 100);
        assert_eq!(placed.len(), 1);
    }

    #[test]
    fn dispose_clears_identity_and_collision_state() {
        let mut placer = Placer::default();
        let tiles = [tile_of(vec![TextElement::point(
            "London",
            DVec3::new(400.0, 300.0, 0.0),
        )])];
        frame(&mut placer, &tiles, 0);
        frame(&mut placer, &tiles, 800);
        assert!(placer.render_state("London").unwrap().is_faded_in());

        placer.dispose();
        assert!(placer.render_state("London").is_none());
        assert!(placer.pick(400.0, 300.0).is_empty());

        // The label starts over from transparent.
        let (placed, _) = frame(&mut placer, &tiles, 900);
        assert_eq!(placed[0].state, FadeState::FadingIn);
        assert_eq!(placed[0].opacity, 0.0);
    }
}
