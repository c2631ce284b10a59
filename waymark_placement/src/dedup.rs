// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity cache: recognizing the same label across tiles and levels.
//!
//! Adjacent tiles and adjacent detail levels routinely carry copies of the
//! same real-world feature. The cache keys entries by label text and decides,
//! for each candidate, whether it is a brand-new label, a replacement for an
//! existing one (inheriting its fade state so the swap is invisible), or a
//! duplicate to suppress.

use glam::DVec3;
use hashbrown::HashMap;
use smallvec::SmallVec;

use waymark_fade::RenderState;
use waymark_geom::distance_to_polyline;

use crate::element::{LabelKind, TextElement};
use crate::tile::TileKey;

/// Tuning for identity matching.
#[derive(Clone, Copy, Debug)]
pub struct DedupOptions {
    /// Replacement tolerance in pixels at zoom 0, scaled down per level.
    pub base_tolerance_px: f64,
    /// Screen-space radius within which same-text labels from other entries
    /// are treated as siblings and suppressed.
    pub sibling_tolerance_px: f64,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            base_tolerance_px: 1.0,
            sibling_tolerance_px: 50.0,
        }
    }
}

impl DedupOptions {
    /// Replacement tolerance in world units at `zoom`.
    ///
    /// One tile spans 256 first-level pixels, so a fixed pixel tolerance
    /// halves in world units with every zoom level.
    #[must_use]
    pub fn tolerance(&self, zoom: f64) -> f64 {
        self.base_tolerance_px * 256.0 / f64::exp2(zoom)
    }
}

/// How a candidate element relates to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Never seen before; starts fully transparent and fades in on placement.
    New,
    /// The same feature from another tile or level; inherits the existing
    /// entry's fade state.
    Replacement,
    /// A worse copy of an existing label; suppressed this frame.
    Duplicate,
}

/// Per-label state that survives across frames.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Feature identity from the source data, when present.
    pub feature_id: Option<u64>,
    /// World anchor of the element that last claimed this entry.
    pub position: DVec3,
    /// Cached path length for path-based labels, `0.0` otherwise.
    pub path_length: f64,
    /// World path of the claiming element, for path-text labels; used to
    /// decide whether another clip of the same road overlaps this one.
    path: Vec<[f64; 3]>,
    /// Tile of the claiming element.
    pub tile: TileKey,
    /// Fade state of the text box.
    pub text_state: RenderState,
    /// Fade state of the icon, for labels that carry one.
    pub icon_state: Option<RenderState>,
    /// Per-point fade states for line markers.
    pub point_states: Vec<RenderState>,
    /// Frame counter value when this entry was last claimed.
    pub last_seen: u64,
    /// Frame time in milliseconds when this entry was last claimed.
    pub last_seen_at: u64,
    /// Consecutive frames this label has been retried after a transient
    /// collision.
    pub retries: u32,
}

impl CacheEntry {
    fn new(el: &TextElement, tile: TileKey) -> Self {
        Self {
            feature_id: el.feature_id,
            position: el.position,
            path_length: el.kind.path_length().unwrap_or(0.0),
            path: claimed_path(el),
            tile,
            text_state: RenderState::new(),
            icon_state: el.kind.has_icon().then(RenderState::new),
            point_states: Vec::new(),
            last_seen: 0,
            last_seen_at: 0,
            retries: 0,
        }
    }

    /// Take over this entry's identity for `el` without touching fade state.
    fn claim(&mut self, el: &TextElement, tile: TileKey) {
        self.feature_id = el.feature_id;
        self.position = el.position;
        self.path_length = el.kind.path_length().unwrap_or(0.0);
        self.path = claimed_path(el);
        self.tile = tile;
        if el.kind.has_icon() && self.icon_state.is_none() {
            self.icon_state = Some(RenderState::new());
        }
    }

    /// Whether every fade state in this entry has reached full transparency.
    #[must_use]
    pub fn fully_faded_out(&self) -> bool {
        self.text_state.is_faded_out()
            && self.icon_state.is_none_or(|s| s.is_faded_out())
            && self.point_states.iter().all(RenderState::is_faded_out)
    }
}

/// The cross-frame identity cache, keyed by label text.
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: HashMap<String, SmallVec<[CacheEntry; 1]>>,
    options: DedupOptions,
}

impl DedupCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(options: DedupOptions) -> Self {
        Self {
            entries: HashMap::new(),
            options,
        }
    }

    /// Number of live entries across all texts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(SmallVec::len).sum()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Match `el` against the cache and return its entry.
    ///
    /// Matching is tried in order: explicit feature identity, then path
    /// identity for path-text labels (clips of the same road overlapping
    /// within the zoom-scaled tolerance; the longer path wins and a shorter
    /// candidate is a duplicate of the longer incumbent), then world-space
    /// proximity within the same tolerance. A candidate that matches nothing
    /// gets a fresh entry.
    ///
    /// The returned entry is claimed for `el` on `New` and `Replacement`;
    /// on `Duplicate` the incumbent is returned untouched. `last_seen` is
    /// left to the caller, which knows whether the label actually ran.
    pub fn resolve(
        &mut self,
        el: &TextElement,
        tile: TileKey,
        zoom: f64,
    ) -> (Resolution, &mut CacheEntry) {
        let bucket = self.entries.entry(el.text.clone()).or_default();

        let resolution = Self::match_entry(bucket, el, self.options.tolerance(zoom));
        match resolution {
            Some((index, Resolution::Duplicate)) => (Resolution::Duplicate, &mut bucket[index]),
            Some((index, resolution)) => {
                bucket[index].claim(el, tile);
                (resolution, &mut bucket[index])
            }
            None => {
                bucket.push(CacheEntry::new(el, tile));
                let index = bucket.len() - 1;
                (Resolution::New, &mut bucket[index])
            }
        }
    }

    fn match_entry(
        bucket: &SmallVec<[CacheEntry; 1]>,
        el: &TextElement,
        tolerance: f64,
    ) -> Option<(usize, Resolution)> {
        // Feature identity is authoritative regardless of geometry.
        if let Some(id) = el.feature_id {
            if let Some(index) = bucket.iter().position(|e| e.feature_id == Some(id)) {
                return Some((index, Resolution::Replacement));
            }
        }

        // Path text dedups on path identity: an adjacent tile's or level's
        // copy of the same road carries a different clip of the path, and the
        // longer clip is the better label. Clips count as the same road only
        // when they overlap within tolerance; a road elsewhere that happens
        // to share the name stays a separate label. Line markers have no
        // meaningful length and use anchor proximity like point labels.
        if let LabelKind::PathText { path, path_length } = &el.kind {
            let candidate_path: Vec<[f64; 3]> = path.iter().map(DVec3::to_array).collect();
            if let Some(index) = bucket.iter().position(|e| {
                e.path_length > 0.0
                    && paths_overlap(el.position, &candidate_path, e.position, &e.path, tolerance)
            }) {
                return if *path_length < bucket[index].path_length {
                    Some((index, Resolution::Duplicate))
                } else {
                    Some((index, Resolution::Replacement))
                };
            }
            return None;
        }

        bucket
            .iter()
            .position(|e| e.position.distance(el.position) <= tolerance)
            .map(|index| (index, Resolution::Replacement))
    }

    /// Iterate over all entries for one text, if any.
    #[must_use]
    pub fn lookup(&self, text: &str) -> Option<&[CacheEntry]> {
        self.entries.get(text).map(SmallVec::as_slice)
    }

    /// Mutable iteration over every `(text, entry)` pair.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = (&str, &mut CacheEntry)> {
        self.entries
            .iter_mut()
            .flat_map(|(text, bucket)| bucket.iter_mut().map(move |e| (text.as_str(), e)))
    }

    /// Drop stale entries.
    ///
    /// An entry unclaimed for one fade duration is dropped once fully faded
    /// out. Entries frozen mid-fade (their tile left the visible set, so they
    /// never finish the fade) are reclaimed unconditionally after four fade
    /// durations; a label returning after that starts over from transparent.
    pub fn evict(&mut self, now: u64, fade_duration_ms: u64) {
        let hard_limit = fade_duration_ms.saturating_mul(4).max(1);
        self.entries.retain(|_, bucket| {
            bucket.retain(|e| {
                let unseen = now.saturating_sub(e.last_seen_at);
                unseen <= fade_duration_ms || (!e.fully_faded_out() && unseen <= hard_limit)
            });
            !bucket.is_empty()
        });
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn claimed_path(el: &TextElement) -> Vec<[f64; 3]> {
    match &el.kind {
        LabelKind::PathText { path, .. } => path.iter().map(DVec3::to_array).collect(),
        _ => Vec::new(),
    }
}

/// Two clips of the same road overlap when either anchor lies within
/// `tolerance` of the other clip's polyline. Anchors sit at the clip
/// midpoints, so a short fragment at the far end of a long road is still
/// caught by the symmetric test.
fn paths_overlap(
    a_anchor: DVec3,
    a_path: &[[f64; 3]],
    b_anchor: DVec3,
    b_path: &[[f64; 3]],
    tolerance: f64,
) -> bool {
    distance_to_polyline(a_anchor.to_array(), b_path) <= tolerance
        || distance_to_polyline(b_anchor.to_array(), a_path) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::TextElement;

    fn tile(x: u32, y: u32) -> TileKey {
        TileKey::new(0, x, y, 10)
    }

    #[test]
    fn tolerance_halves_per_zoom_level() {
        let options = DedupOptions::default();
        assert_eq!(options.tolerance(0.0), 256.0);
        assert_eq!(options.tolerance(8.0), 1.0);
        assert_eq!(options.tolerance(9.0), 0.5);
    }

    #[test]
    fn distinct_labels_get_distinct_entries() {
        let mut cache = DedupCache::default();
        let a = TextElement::point("Springfield", DVec3::new(0.0, 0.0, 0.0));
        let b = TextElement::point("Springfield", DVec3::new(500.0, 0.0, 0.0));

        let (res, _) = cache.resolve(&a, tile(0, 0), 10.0);
        assert_eq!(res, Resolution::New);
        // Beyond tolerance at zoom 10, so a separate town of the same name.
        let (res, _) = cache.resolve(&b, tile(1, 0), 10.0);
        assert_eq!(res, Resolution::New);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn nearby_same_text_is_a_replacement() {
        let mut cache = DedupCache::default();
        let a = TextElement::point("Lake", DVec3::new(10.0, 10.0, 0.0));
        let b = TextElement::point("Lake", DVec3::new(10.1, 10.0, 0.0));

        let (_, entry) = cache.resolve(&a, tile(0, 0), 8.0);
        entry.text_state.start_fade_in(0);
        let (res, entry) = cache.resolve(&b, tile(0, 1), 8.0);
        assert_eq!(res, Resolution::Replacement);
        // Fade state carried over, geometry re-claimed.
        assert!(entry.text_state.is_fading());
        assert_eq!(entry.position, DVec3::new(10.1, 10.0, 0.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn feature_id_matches_across_any_distance() {
        let mut cache = DedupCache::default();
        let a = TextElement::point("A1", DVec3::ZERO).with_feature_id(7);
        let b = TextElement::point("A1", DVec3::new(1e6, 0.0, 0.0)).with_feature_id(7);

        cache.resolve(&a, tile(0, 0), 14.0);
        let (res, _) = cache.resolve(&b, tile(9, 9), 14.0);
        assert_eq!(res, Resolution::Replacement);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn longer_path_wins_either_arrival_order() {
        let long = TextElement::path(
            "Main St",
            vec![DVec3::ZERO, DVec3::new(100.0, 0.0, 0.0)],
        );
        let short = TextElement::path(
            "Main St",
            vec![DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0)],
        );

        // Long first: the short copy is a duplicate.
        let mut cache = DedupCache::default();
        cache.resolve(&long, tile(0, 0), 12.0);
        let (res, entry) = cache.resolve(&short, tile(1, 0), 12.0);
        assert_eq!(res, Resolution::Duplicate);
        assert_eq!(entry.path_length, 100.0);

        // Short first: the long copy replaces and takes over the geometry.
        let mut cache = DedupCache::default();
        cache.resolve(&short, tile(1, 0), 12.0);
        let (res, entry) = cache.resolve(&long, tile(0, 0), 12.0);
        assert_eq!(res, Resolution::Replacement);
        assert_eq!(entry.path_length, 100.0);
    }

    #[test]
    fn far_apart_paths_sharing_a_name_stay_distinct() {
        let mut cache = DedupCache::default();
        let here = TextElement::path(
            "Main St",
            vec![DVec3::ZERO, DVec3::new(100.0, 0.0, 0.0)],
        );
        let elsewhere = TextElement::path(
            "Main St",
            vec![DVec3::new(1e6, 0.0, 0.0), DVec3::new(1e6 + 100.0, 0.0, 0.0)],
        );

        cache.resolve(&here, tile(0, 0), 12.0);
        // A road in another city is not a clip of this one.
        let (res, _) = cache.resolve(&elsewhere, tile(9, 9), 12.0);
        assert_eq!(res, Resolution::New);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_waits_for_fade_out() {
        let mut cache = DedupCache::default();
        let el = TextElement::point("Gone", DVec3::ZERO);
        let (_, entry) = cache.resolve(&el, tile(0, 0), 10.0);
        entry.last_seen_at = 1000;
        entry.text_state.start_fade_in(1000);
        entry.text_state.update(1400, 800);

        // Stale but still visible: kept.
        cache.evict(2000, 800);
        assert_eq!(cache.len(), 1);

        for (_, entry) in cache.entries_mut() {
            entry.text_state.start_fade_out(2000);
            entry.text_state.update(3000, 800);
        }
        cache.evict(2000, 800);
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_reclaims_frozen_entries_after_the_hard_limit() {
        let mut cache = DedupCache::default();
        let el = TextElement::point("Frozen", DVec3::ZERO);
        let (_, entry) = cache.resolve(&el, tile(0, 0), 10.0);
        entry.last_seen_at = 1000;
        entry.text_state.start_fade_in(1000);
        entry.text_state.update(1400, 800);

        // Mid-fade and frozen: survives the soft window...
        cache.evict(3000, 800);
        assert_eq!(cache.len(), 1);
        // ...but not four fade durations of absence.
        cache.evict(4300, 800);
        assert!(cache.is_empty());
    }
}
