// Copyright 2025 the Waymark Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Waymark Fade: the opacity state machine driving label fade transitions.
//!
//! Map labels must never pop on or off screen. Every label (and every
//! independently animated sub-part, such as a POI icon vs. its text, or each
//! point of a line marker) owns a [`RenderState`] that tracks where it is in
//! the cycle
//!
//! ```text
//! FadedOut → FadingIn → FadedIn → FadingOut → FadedOut
//! ```
//!
//! Transitions are driven by two inputs only: the outcome of this frame's
//! placement attempt and the current frame time in milliseconds. A label that
//! is not evaluated in a frame (its tile left the visible set) simply does not
//! get an [`update`][RenderState::update] call, so its opacity freezes until
//! it reappears or is evicted.
//!
//! Opacity is monotonic within a single transition and snaps to exactly `1.0`
//! or `0.0` once the fade duration has elapsed, so downstream consumers can
//! compare against the extremes without epsilons.
//!
//! ## Minimal example
//!
//! ```rust
//! use waymark_fade::{FadeState, RenderState, DEFAULT_FADE_DURATION_MS};
//!
//! let mut state = RenderState::new();
//! assert_eq!(state.state(), FadeState::FadedOut);
//!
//! // The label was placed at t = 1000ms: it starts fading in.
//! state.apply_outcome(true, 1000);
//! state.update(1000, DEFAULT_FADE_DURATION_MS);
//! assert_eq!(state.opacity(), 0.0);
//!
//! // Halfway through the fade.
//! state.update(1400, DEFAULT_FADE_DURATION_MS);
//! assert!(state.opacity() > 0.0 && state.opacity() < 1.0);
//!
//! // At the full duration the state snaps.
//! state.update(1800, DEFAULT_FADE_DURATION_MS);
//! assert_eq!(state.state(), FadeState::FadedIn);
//! assert_eq!(state.opacity(), 1.0);
//! ```
//!
//! A *replacement* label (the same logical label arriving from a new tile
//! generation) takes over its predecessor's state with
//! [`RenderState::inherit`], so the swap is invisible on screen.
//!
//! This crate is `no_std` and dependency-free.

#![no_std]

/// Default fade transition length in milliseconds.
pub const DEFAULT_FADE_DURATION_MS: u64 = 800;

/// Phase of a label's opacity transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FadeState {
    /// Fully transparent; not rendered.
    FadedOut,
    /// Opacity increasing towards `1.0`.
    FadingIn,
    /// Fully opaque.
    FadedIn,
    /// Opacity decreasing towards `0.0`.
    FadingOut,
}

/// Per-label (or per-sub-part) fade state.
///
/// Holds the current opacity, the transition phase, and the starting point
/// (time and opacity) of the transition in progress. All timestamps are
/// milliseconds on a caller-supplied monotonic clock.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderState {
    state: FadeState,
    opacity: f64,
    start_opacity: f64,
    start_time: u64,
}

impl RenderState {
    /// Create a fresh state: `FadedOut` with opacity `0.0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FadeState::FadedOut,
            opacity: 0.0,
            start_opacity: 0.0,
            start_time: 0,
        }
    }

    /// The current transition phase.
    #[must_use]
    pub const fn state(&self) -> FadeState {
        self.state
    }

    /// The current opacity in `[0, 1]`.
    #[must_use]
    pub const fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Whether the label contributes any pixels this frame.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
    }

    /// Whether a transition is in progress.
    #[must_use]
    pub fn is_fading(&self) -> bool {
        matches!(self.state, FadeState::FadingIn | FadeState::FadingOut)
    }

    /// Whether the label is fully opaque.
    #[must_use]
    pub fn is_faded_in(&self) -> bool {
        self.state == FadeState::FadedIn
    }

    /// Whether the label is fully transparent.
    #[must_use]
    pub fn is_faded_out(&self) -> bool {
        self.state == FadeState::FadedOut
    }

    /// Begin fading in from the current opacity.
    ///
    /// Legal from `FadedOut` (a fresh appearance) and `FadingOut` (a label
    /// that won placement back mid-fade reverses without a visual jump).
    /// A no-op while already `FadingIn` or `FadedIn`.
    pub fn start_fade_in(&mut self, now: u64) {
        if matches!(self.state, FadeState::FadedOut | FadeState::FadingOut) {
            self.state = FadeState::FadingIn;
            self.start_opacity = self.opacity;
            self.start_time = now;
        }
    }

    /// Begin fading out from the current opacity.
    ///
    /// Legal from `FadedIn` and `FadingIn`; a no-op otherwise.
    pub fn start_fade_out(&mut self, now: u64) {
        if matches!(self.state, FadeState::FadedIn | FadeState::FadingIn) {
            self.state = FadeState::FadingOut;
            self.start_opacity = self.opacity;
            self.start_time = now;
        }
    }

    /// Apply a placement outcome, starting the appropriate transition.
    ///
    /// A successful placement while invisible starts a fade-in; a failed
    /// placement while visible starts a fade-out. All other combinations
    /// leave the state untouched.
    pub fn apply_outcome(&mut self, placed: bool, now: u64) {
        if placed {
            self.start_fade_in(now);
        } else {
            self.start_fade_out(now);
        }
    }

    /// Advance the transition in progress to time `now`.
    ///
    /// Opacity interpolates linearly from the transition's starting opacity
    /// to the target (`1.0` for a fade-in, `0.0` for a fade-out) over
    /// `duration_ms`. Once the duration has elapsed the state snaps to
    /// `FadedIn`/`FadedOut` and opacity to exactly `1.0`/`0.0`. Steady
    /// states are untouched.
    ///
    /// Returns the opacity after the update.
    pub fn update(&mut self, now: u64, duration_ms: u64) -> f64 {
        let target = match self.state {
            FadeState::FadingIn => 1.0,
            FadeState::FadingOut => 0.0,
            FadeState::FadedIn | FadeState::FadedOut => return self.opacity,
        };
        let elapsed = now.saturating_sub(self.start_time);
        // A zero duration degenerates to an instant snap.
        let t = if duration_ms == 0 {
            1.0
        } else {
            (elapsed as f64 / duration_ms as f64).min(1.0)
        };
        self.opacity = self.start_opacity + (target - self.start_opacity) * t;
        if t >= 1.0 {
            self.opacity = target;
            self.state = if target == 1.0 {
                FadeState::FadedIn
            } else {
                FadeState::FadedOut
            };
        }
        self.opacity
    }

    /// Re-anchor an in-progress transition at time `now`.
    ///
    /// A label whose tile dropped out of the visible set accrues no fade
    /// time; when it reappears the caller rebases the transition so it
    /// resumes from the frozen opacity instead of jumping ahead by the
    /// elapsed wall-clock time. Steady states are untouched.
    pub fn rebase(&mut self, now: u64) {
        if self.is_fading() {
            self.start_opacity = self.opacity;
            self.start_time = now;
        }
    }

    /// Take over a predecessor's state wholesale.
    ///
    /// Used when a label from a new tile generation replaces the same logical
    /// label from a previous one: the replacement continues the predecessor's
    /// transition (or steady state) instead of restarting from `FadedOut`.
    pub fn inherit(&mut self, predecessor: &Self) {
        *self = *predecessor;
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_faded_out() {
        let state = RenderState::new();
        assert_eq!(state.state(), FadeState::FadedOut);
        assert_eq!(state.opacity(), 0.0);
        assert!(!state.is_visible());
        assert!(!state.is_fading());
    }

    #[test]
    fn fade_in_reaches_exactly_one_at_duration() {
        let mut state = RenderState::new();
        state.start_fade_in(1000);
        assert_eq!(state.update(1000, 800), 0.0);

        // Strictly between 0 and 1 mid-fade.
        let mid = state.update(1400, 800);
        assert!(mid > 0.0 && mid < 1.0);

        // Exactly 1.0 and FadedIn at the duration.
        assert_eq!(state.update(1800, 800), 1.0);
        assert_eq!(state.state(), FadeState::FadedIn);

        // Further updates are no-ops.
        assert_eq!(state.update(5000, 800), 1.0);
        assert_eq!(state.state(), FadeState::FadedIn);
    }

    #[test]
    fn fade_in_opacity_is_strictly_increasing() {
        let mut state = RenderState::new();
        state.start_fade_in(0);
        let mut last = state.update(0, 800);
        for now in (50..800).step_by(50) {
            let next = state.update(now, 800);
            assert!(next > last, "opacity must increase while FadingIn");
            last = next;
        }
    }

    #[test]
    fn fade_out_from_partial_fade_in_continues_from_current_opacity() {
        let mut state = RenderState::new();
        state.start_fade_in(0);
        state.update(400, 800);
        let at_reversal = state.opacity();
        assert!(at_reversal > 0.0 && at_reversal < 1.0);

        // Lose placement mid-fade: reverse without a jump.
        state.start_fade_out(400);
        assert_eq!(state.state(), FadeState::FadingOut);
        assert_eq!(state.opacity(), at_reversal);

        let mut last = at_reversal;
        for now in (450..1200).step_by(50) {
            let next = state.update(now, 800);
            assert!(next < last, "opacity must decrease while FadingOut");
            last = next;
        }
        assert_eq!(state.update(1200, 800), 0.0);
        assert_eq!(state.state(), FadeState::FadedOut);
    }

    #[test]
    fn reversing_a_fade_out_fades_back_in_from_current_opacity() {
        let mut state = RenderState::new();
        state.start_fade_in(0);
        state.update(800, 800);
        assert_eq!(state.state(), FadeState::FadedIn);

        state.start_fade_out(1000);
        state.update(1400, 800);
        let partial = state.opacity();
        assert!(partial > 0.0 && partial < 1.0);

        state.start_fade_in(1400);
        assert_eq!(state.opacity(), partial);
        assert_eq!(state.update(2200, 800), 1.0);
        assert_eq!(state.state(), FadeState::FadedIn);
    }

    #[test]
    fn steady_states_ignore_updates_and_redundant_triggers() {
        let mut state = RenderState::new();

        // FadedOut ignores fade-out triggers and time.
        state.start_fade_out(100);
        assert_eq!(state.state(), FadeState::FadedOut);
        assert_eq!(state.update(10_000, 800), 0.0);

        state.start_fade_in(0);
        state.update(800, 800);

        // FadedIn ignores fade-in triggers.
        state.start_fade_in(900);
        assert_eq!(state.state(), FadeState::FadedIn);
        assert_eq!(state.opacity(), 1.0);
    }

    #[test]
    fn apply_outcome_maps_to_transitions() {
        let mut state = RenderState::new();
        state.apply_outcome(true, 0);
        assert_eq!(state.state(), FadeState::FadingIn);

        state.update(800, 800);
        state.apply_outcome(false, 1000);
        assert_eq!(state.state(), FadeState::FadingOut);

        // A placed label that is already fading in keeps its transition.
        let mut state = RenderState::new();
        state.apply_outcome(true, 0);
        state.update(400, 800);
        let mid = state.opacity();
        state.apply_outcome(true, 400);
        assert_eq!(state.state(), FadeState::FadingIn);
        assert_eq!(state.opacity(), mid);
    }

    #[test]
    fn inherit_copies_predecessor_state() {
        let mut old = RenderState::new();
        old.start_fade_in(0);
        old.update(800, 800);
        assert_eq!(old.state(), FadeState::FadedIn);

        let mut replacement = RenderState::new();
        replacement.inherit(&old);
        assert_eq!(replacement.state(), FadeState::FadedIn);
        assert_eq!(replacement.opacity(), 1.0);
    }

    #[test]
    fn zero_duration_snaps_immediately() {
        let mut state = RenderState::new();
        state.start_fade_in(500);
        assert_eq!(state.update(500, 0), 1.0);
        assert_eq!(state.state(), FadeState::FadedIn);
    }

    #[test]
    fn unevaluated_frames_freeze_opacity() {
        let mut state = RenderState::new();
        state.start_fade_in(0);
        state.update(400, 800);
        let frozen = state.opacity();

        // No update calls while the tile is invisible; nothing changes.
        assert_eq!(state.opacity(), frozen);

        // On reappearance the transition is rebased: no time accrued while
        // the label was off the visible set.
        state.rebase(5000);
        let resumed = state.update(5100, 800);
        assert!(resumed > frozen && resumed < 1.0);
    }

    #[test]
    fn rebase_leaves_steady_states_alone() {
        let mut state = RenderState::new();
        state.start_fade_in(0);
        state.update(800, 800);
        state.rebase(9000);
        assert_eq!(state.state(), FadeState::FadedIn);
        assert_eq!(state.opacity(), 1.0);
    }
}
