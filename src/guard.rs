//! Power-off guard.
//!
//! Power-off must not go ahead while the power key is held: the PMIC would
//! treat the still-pressed key as a power-on request. The guard polls the key
//! at a fixed interval and returns on the first reading that reports it
//! released. There is no timeout; the optional `max_polls` valve
//! is only meant for simulators and test rigs without a real key.

use std::time::Duration;
use tracing::{error, info};

use crate::config::GuardConfig;

/// Query for the physical power key state.
pub trait PowerKey: Send + Sync {
    /// Whether the key is currently held down.
    fn is_pressed(&self) -> bool;
}

/// Blocking sleep used between polls.
pub trait Sleeper: Send + Sync {
    /// Block the calling context for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Summary of one guard wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardReport {
    /// Number of polls that found the key pressed (one sleep followed each)
    pub pressed_polls: u32,
    /// The safety valve gave up before the key was released
    pub valve_tripped: bool,
}

/// Blocks power-off until the power key has been released.
#[derive(Debug, Clone)]
pub struct PowerOffGuard {
    interval: Duration,
    max_polls: Option<u32>,
}

impl Default for PowerOffGuard {
    fn default() -> Self {
        Self::new(&GuardConfig::default())
    }
}

impl PowerOffGuard {
    /// Create a guard from configuration.
    #[must_use]
    pub const fn new(config: &GuardConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
        }
    }

    /// Interval between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `key` reports released.
    ///
    /// Without a `max_polls` valve this only returns once the key is released.
    pub fn wait_for_release(&self, key: &dyn PowerKey, sleeper: &dyn Sleeper) -> GuardReport {
        let mut pressed_polls = 0u32;

        while key.is_pressed() {
            info!(polls = pressed_polls + 1, "PWR Key is not released.");
            pressed_polls += 1;

            if self.max_polls.is_some_and(|max| pressed_polls >= max) {
                error!(
                    polls = pressed_polls,
                    "Power key still pressed, guard poll limit reached; allowing power off"
                );
                return GuardReport {
                    pressed_polls,
                    valve_tripped: true,
                };
            }

            sleeper.sleep(self.interval);
        }

        info!(polls = pressed_polls, "ready to do power off.");
        GuardReport {
            pressed_polls,
            valve_tripped: false,
        }
    }
}
