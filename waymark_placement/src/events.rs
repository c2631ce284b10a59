// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Load-completion events from asynchronous resource loaders.
//!
//! The placement core never blocks on fonts or images. Loaders run wherever
//! the host wants; on completion they push a [`LoadEvent`] through a cloned
//! [`LoadEventQueue`] handle. The placer drains the queue at the start of the
//! next frame and applies events whose generation matches the current one —
//! events from before a [`dispose`][crate::Placer::dispose] or theme switch
//! are discarded without effect.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A completed asynchronous load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadEvent {
    /// A font catalog finished loading.
    CatalogReady {
        /// Catalog name.
        name: String,
        /// The placer generation the load was started under.
        generation: u64,
    },
    /// An icon image finished loading.
    ImageReady {
        /// Image name.
        name: String,
        /// The placer generation the load was started under.
        generation: u64,
    },
}

/// Clonable handle to the load-event queue.
///
/// The core is single-threaded by contract, so the queue is a plain
/// `Rc<RefCell<…>>`; completion callbacks enqueue, the placer drains.
#[derive(Clone, Debug, Default)]
pub struct LoadEventQueue {
    inner: Rc<RefCell<VecDeque<LoadEvent>>>,
}

impl LoadEventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a completion event.
    pub fn push(&self, event: LoadEvent) {
        self.inner.borrow_mut().push_back(event);
    }

    /// Remove and return all queued events, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<LoadEvent> {
        self.inner.borrow_mut().drain(..).collect()
    }

    /// Whether no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}
