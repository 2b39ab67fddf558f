//! Per-file time budget, checked cooperatively by the parser and engines

use std::time::{Duration, Instant};
use thiserror::Error;

/// The per-file budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("per-file time budget exhausted")]
pub struct TimedOut;

/// Point in time after which work on the current file stops
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No limit
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Expires `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    /// Remaining budget, `None` when unlimited
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn check(&self) -> Result<(), TimedOut> {
        if self.is_expired() {
            Err(TimedOut)
        } else {
            Ok(())
        }
    }
}
