//! Controller liveness flag.
//!
//! # States
//! - Up: the last probe succeeded
//! - Down: the last probe failed, or nothing has been probed yet
//!
//! # Writers
//! The status monitor is the only regular writer. The notifier also forces
//! the flag down when it broadcasts an error. Anyone may read it.

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "is the controller up" flag.
#[derive(Debug, Default)]
pub struct StatusFlag {
    up: AtomicBool,
}

impl StatusFlag {
    /// Create a flag in the down state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Mark up. Returns whether it was already up.
    pub fn mark_up(&self) -> bool {
        self.up.swap(true, Ordering::AcqRel)
    }

    /// Mark down. Returns whether it was up.
    pub fn mark_down(&self) -> bool {
        self.up.swap(false, Ordering::AcqRel)
    }
}
