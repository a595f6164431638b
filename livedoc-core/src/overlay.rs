//! Diff overlay view model.
//!
//! The overlay is a cover element drawn over a diff region plus its
//! floating controls. This module models the host-side state: which
//! classes the renderer should attach, which tab is showing, and the
//! two-press confirmation machine. Selecting a tab is pure view state;
//! only confirming resolves the underlying region.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use livedoc_types::DiffOrigin;

/// Confirmation must land within this window of the first press.
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(5);

/// CSS class of the cover element.
pub const OVERLAY_CLASS: &str = "diff-color-overlay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayMode {
    /// Keep / delete buttons only.
    TwoControl,
    /// Local / Upstream / Difference tabs.
    ThreeTab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffTab {
    Local,
    Upstream,
    Difference,
}

// =============================================================================
// Confirmation state machine
// =============================================================================

/// Two-press confirmation with a timeout.
///
/// The first press arms the machine; a second press inside the window
/// confirms. A tick past the deadline falls back to idle, and teardown
/// always lands in idle so no timer outlives its overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Idle,
    Confirming { deadline: Instant },
    Confirmed,
}

impl OverlayState {
    pub fn new() -> Self {
        OverlayState::Idle
    }

    /// Register a button press. Returns true when this press confirmed.
    pub fn press(&mut self, now: Instant) -> bool {
        match *self {
            OverlayState::Idle => {
                *self = OverlayState::Confirming {
                    deadline: now + CONFIRM_WINDOW,
                };
                false
            }
            OverlayState::Confirming { deadline } => {
                if now <= deadline {
                    *self = OverlayState::Confirmed;
                    true
                } else {
                    // Late press re-arms instead of confirming.
                    *self = OverlayState::Confirming {
                        deadline: now + CONFIRM_WINDOW,
                    };
                    false
                }
            }
            OverlayState::Confirmed => true,
        }
    }

    /// Advance time; an expired confirmation window falls back to idle.
    pub fn tick(&mut self, now: Instant) {
        if let OverlayState::Confirming { deadline } = *self {
            if now > deadline {
                *self = OverlayState::Idle;
            }
        }
    }

    /// Cancel any pending confirmation.
    pub fn teardown(&mut self) {
        if !matches!(self, OverlayState::Confirmed) {
            *self = OverlayState::Idle;
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, OverlayState::Confirming { .. })
    }
}

impl Default for OverlayState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// View model
// =============================================================================

/// Host-side state for one region's overlay.
#[derive(Debug, Clone)]
pub struct OverlayView {
    pub origin: DiffOrigin,
    pub mode: OverlayMode,
    pub active_tab: DiffTab,
    /// Set once a tab is confirmed; the other tabs are then inert.
    pub confirmed_tab: Option<DiffTab>,
    pub state: OverlayState,
}

impl OverlayView {
    pub fn new(origin: DiffOrigin, mode: OverlayMode) -> Self {
        Self {
            origin,
            mode,
            active_tab: DiffTab::Local,
            confirmed_tab: None,
            state: OverlayState::new(),
        }
    }

    /// Classes the renderer attaches to the cover element.
    pub fn cover_classes(&self) -> [&'static str; 2] {
        [OVERLAY_CLASS, self.origin.class_name()]
    }

    /// Class for a floating control button.
    pub fn button_class(action: &str) -> String {
        format!("loc-composite-btn-{action}")
    }

    /// Switch the visible tab. Pure view state, never a transaction,
    /// and inert after a confirmation.
    pub fn select_tab(&mut self, tab: DiffTab) {
        if self.mode == OverlayMode::ThreeTab && self.confirmed_tab.is_none() {
            self.active_tab = tab;
        }
    }

    /// Confirm the active tab, locking the others out.
    pub fn confirm_active_tab(&mut self) -> Option<DiffTab> {
        if self.confirmed_tab.is_some() {
            return self.confirmed_tab;
        }
        self.confirmed_tab = Some(self.active_tab);
        self.state = OverlayState::Confirmed;
        self.confirmed_tab
    }

    pub fn teardown(&mut self) {
        self.state.teardown();
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

/// Custom events the overlay dispatches toward the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OverlayEvent {
    ConfirmInsert { pointer: Pointer, source: String },
    ConfirmRemove { pointer: Pointer, source: String },
    ConfirmMove { pointer: Pointer, source: String },
    ActivateItemGroup { pointer: Pointer, mode: OverlayMode },
}
