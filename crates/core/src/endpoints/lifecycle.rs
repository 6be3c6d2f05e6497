//! Initialization state shared by endpoint implementations.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::errors::{Error, Result};

const CREATED: u8 = 0;
const READY: u8 = 1;
const CLOSED: u8 = 2;

/// Tracks `initialize()`/`close()` for one endpoint.
#[derive(Debug)]
pub struct Lifecycle {
    name: String,
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(CREATED),
        }
    }

    /// Fails with `NotInitialized` unless `initialize()` completed and
    /// `close()` has not been called since.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::NotInitialized(self.name.clone()))
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    pub fn mark_ready(&self) {
        self.state.store(READY, Ordering::Release);
    }

    /// Moves to closed. Returns `true` only for the call that actually closed
    /// a ready endpoint.
    pub fn mark_closed(&self) -> bool {
        self.state.swap(CLOSED, Ordering::AcqRel) == READY
    }
}
