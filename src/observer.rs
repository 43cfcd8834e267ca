//! Priority-ordered observer chains for reboot-class events.
//!
//! An [`ObserverCoordinator`] keeps an explicit list of `(priority, observer)`
//! entries sorted by descending priority, ties kept in registration order.
//! Dispatch is a plain ordered traversal that always runs every observer:
//! neither a [`Ack::Stop`] nor an error cuts the chain short.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{Error, ErrorCode, Result};

/// Kind of reboot-class event being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebootEvent {
    /// The system is about to restart
    Restart,
    /// The system is halting without removing power
    Halt,
    /// The system is about to power off
    PowerOff,
}

impl std::fmt::Display for RebootEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restart => write!(f, "Restart"),
            Self::Halt => write!(f, "Halt"),
            Self::PowerOff => write!(f, "PowerOff"),
        }
    }
}

/// Acknowledgement returned by an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Not interested in this event
    Done,
    /// Event handled
    Ok,
    /// Observer asks that nothing further happen; recorded, never enforced
    Stop,
}

/// Callback invoked on reboot-class events.
pub trait Observer: Send + Sync {
    /// Handle `event` with the raw reboot reason.
    ///
    /// # Errors
    ///
    /// Returns an error when the observer's own work failed. The error is
    /// logged and reported; later observers still run.
    fn notify(&self, event: RebootEvent, reason: Option<&str>) -> Result<Ack>;
}

impl<F> Observer for F
where
    F: Fn(RebootEvent, Option<&str>) -> Result<Ack> + Send + Sync,
{
    fn notify(&self, event: RebootEvent, reason: Option<&str>) -> Result<Ack> {
        self(event, reason)
    }
}

/// Handle to a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[derive(Clone)]
struct ObserverEntry {
    id: ObserverId,
    name: Arc<str>,
    priority: i32,
    observer: Arc<dyn Observer>,
}

/// Outcome of a single observer invocation.
#[derive(Debug)]
pub struct ObserverOutcome {
    /// Observer name
    pub name: Arc<str>,
    /// Observer priority
    pub priority: i32,
    /// What the observer returned
    pub result: Result<Ack>,
}

/// Aggregate result of one dispatch.
#[derive(Debug)]
pub struct NotifyReport {
    /// Event that was dispatched
    pub event: RebootEvent,
    /// Per-observer outcomes, in invocation order
    pub outcomes: Vec<ObserverOutcome>,
}

impl NotifyReport {
    /// Names of the observers that ran, in invocation order.
    #[must_use]
    pub fn invoked(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.name.as_ref()).collect()
    }

    /// Number of observers that returned an error.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// Whether any observer asked to stop.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.result, Ok(Ack::Stop)))
    }

    /// Whether every observer completed without error.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.failures() == 0
    }
}

/// Ordered set of observers for one event stream.
pub struct ObserverCoordinator {
    chain: &'static str,
    entries: RwLock<Vec<ObserverEntry>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ObserverCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("ObserverCoordinator")
            .field("chain", &self.chain)
            .field(
                "entries",
                &entries
                    .iter()
                    .map(|e| (e.name.as_ref(), e.priority))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ObserverCoordinator {
    /// Create an empty chain; `chain` names it in log output.
    #[must_use]
    pub const fn new(chain: &'static str) -> Self {
        Self {
            chain,
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `observer` at `priority` (higher runs first).
    pub fn register<S, O>(&self, name: S, priority: i32, observer: O) -> ObserverId
    where
        S: Into<Arc<str>>,
        O: Observer + 'static,
    {
        self.register_arc(name, priority, Arc::new(observer))
    }

    /// Register an already shared observer.
    pub fn register_arc<S: Into<Arc<str>>>(
        &self,
        name: S,
        priority: i32,
        observer: Arc<dyn Observer>,
    ) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = ObserverEntry {
            id,
            name: name.into(),
            priority,
            observer,
        };

        let mut entries = self.entries.write();
        // After every entry of equal or higher priority, so ties stay in registration order.
        let pos = entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(entries.len());
        debug!(chain = self.chain, observer = %entry.name, priority, "Registered observer");
        entries.insert(pos, entry);
        id
    }

    /// Remove a registered observer.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not registered on this chain.
    pub fn unregister(&self, id: ObserverId) -> Result<()> {
        let mut entries = self.entries.write();
        let pos = entries.iter().position(|e| e.id == id).ok_or_else(|| {
            Error::observer_with_code(
                ErrorCode::ObserverNotFound,
                format!("#{}", id.0),
                format!("not registered on the {} chain", self.chain),
            )
        })?;
        let entry = entries.remove(pos);
        debug!(chain = self.chain, observer = %entry.name, "Unregistered observer");
        Ok(())
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run every observer for `event`, highest priority first.
    pub fn notify(&self, event: RebootEvent, reason: Option<&str>) -> NotifyReport {
        // Snapshot so observers may register or unregister without deadlocking.
        let entries = self.entries.read().clone();
        let mut outcomes = Vec::with_capacity(entries.len());

        for entry in entries {
            let result = entry.observer.notify(event, reason);
            match &result {
                Ok(Ack::Stop) => warn!(
                    chain = self.chain,
                    observer = %entry.name,
                    %event,
                    "Observer asked to stop; continuing chain"
                ),
                Ok(_) => {}
                Err(e) => error!(
                    chain = self.chain,
                    observer = %entry.name,
                    %event,
                    error = %e,
                    "Observer failed"
                ),
            }
            outcomes.push(ObserverOutcome {
                name: entry.name,
                priority: entry.priority,
                result,
            });
        }

        NotifyReport { event, outcomes }
    }
}
