// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tiles as element arenas, and the per-frame visible-tile view.
//!
//! A [`Tile`] owns the [`TextElement`]s decoded for it, bucketed into
//! priority groups. Everything else refers to elements by [`ElementRef`]
//! (tile key, group, index) instead of holding pointers, so dropping a tile
//! is a plain arena drop with no cleanup elsewhere.

use crate::element::TextElement;

/// Identity of a tile within a data source's tiling scheme.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TileKey {
    /// Owning data source id.
    pub data_source: u32,
    /// Tile column.
    pub x: u32,
    /// Tile row.
    pub y: u32,
    /// Tile zoom level.
    pub level: u8,
}

impl TileKey {
    /// Create a tile key.
    #[must_use]
    pub const fn new(data_source: u32, x: u32, y: u32, level: u8) -> Self {
        Self {
            data_source,
            x,
            y,
            level,
        }
    }
}

/// Location of an element inside a tile arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ElementRef {
    /// The owning tile.
    pub tile: TileKey,
    /// Priority group index within the tile.
    pub group: u32,
    /// Element index within the group.
    pub index: u32,
}

/// One priority bucket of a tile's elements.
#[derive(Clone, Debug, Default)]
struct ElementGroup {
    priority: i32,
    elements: Vec<TextElement>,
}

/// A tile's decoded text elements, grouped by priority.
#[derive(Clone, Debug)]
pub struct Tile {
    /// The tile's identity.
    pub key: TileKey,
    /// Set by the tile pipeline when the element list changed since the last
    /// frame; the placer uses it to request a follow-up frame.
    pub changed: bool,
    groups: Vec<ElementGroup>,
}

impl Tile {
    /// Create an empty tile.
    #[must_use]
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            changed: true,
            groups: Vec::new(),
        }
    }

    /// Add an element, bucketing it into the group for its priority.
    ///
    /// Groups are kept ordered by descending priority; insertion order within
    /// a group is preserved (it is the arrival-order tie-break).
    pub fn push(&mut self, element: TextElement) {
        let priority = element.priority;
        match self.groups.iter_mut().find(|g| g.priority == priority) {
            Some(group) => group.elements.push(element),
            None => {
                let at = self
                    .groups
                    .iter()
                    .position(|g| g.priority < priority)
                    .unwrap_or(self.groups.len());
                self.groups.insert(
                    at,
                    ElementGroup {
                        priority,
                        elements: vec![element],
                    },
                );
            }
        }
        self.changed = true;
    }

    /// Total number of elements across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.elements.len()).sum()
    }

    /// Whether the tile holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.elements.is_empty())
    }

    /// Look up an element by its reference. Returns `None` for refs into
    /// other tiles or out-of-range indices.
    #[must_use]
    pub fn element(&self, at: ElementRef) -> Option<&TextElement> {
        if at.tile != self.key {
            return None;
        }
        self.groups
            .get(at.group as usize)?
            .elements
            .get(at.index as usize)
    }

    /// Iterate all elements with their references, priority groups first.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Tiles hold far fewer than 2^32 groups and elements."
    )]
    pub fn elements(&self) -> impl Iterator<Item = (ElementRef, &TextElement)> {
        let key = self.key;
        self.groups.iter().enumerate().flat_map(move |(gi, group)| {
            group.elements.iter().enumerate().map(move |(ei, el)| {
                (
                    ElementRef {
                        tile: key,
                        group: gi as u32,
                        index: ei as u32,
                    },
                    el,
                )
            })
        })
    }
}

/// One data source's contribution to the frame's visible set.
#[derive(Copy, Clone, Debug)]
pub struct SourceTiles<'a> {
    /// Data source id (matches [`TileKey::data_source`]).
    pub data_source: u32,
    /// The source's visible tiles this frame, in draw order.
    pub tiles: &'a [Tile],
}

impl<'a> SourceTiles<'a> {
    /// Create a visible-tile entry for a data source.
    #[must_use]
    pub const fn new(data_source: u32, tiles: &'a [Tile]) -> Self {
        Self { data_source, tiles }
    }
}
