//! Reboot orchestration.
//!
//! [`RebootController`] owns the two observer chains a platform exposes:
//!
//! - the **reboot chain**, run for every restart, halt and power-off. The
//!   [`RebootHandler`] sits on it at maximum priority: it resolves the reason,
//!   persists the mode and, on power-off, holds the caller until the power key
//!   is released.
//! - the **restart chain**, run only when the system actually restarts. The
//!   [`RestartHandler`] sits on it at the configured priority.
//!
//! Everything runs synchronously in the caller's context. When
//! [`RebootController::handle`] returns the caller is free to perform the
//! hardware reset (see [`RebootController::reset_register`]).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::{Config, ResetKind, ResetRegister};
use crate::error::{Error, Result};
use crate::guard::{GuardReport, PowerKey, PowerOffGuard, Sleeper, ThreadSleeper};
use crate::mode::ModeCode;
use crate::observer::{Ack, NotifyReport, Observer, ObserverCoordinator, ObserverId, RebootEvent};
use crate::persist::{
    ModePersister, ModeStorage, PersistOutcome, PrimaryOutcome, PrivilegedWriter, Regmap,
};
use crate::restart::{RestartHandler, RestartPreparer};

/// Name of the mode-persisting observer on the reboot chain.
pub const REBOOT_HANDLER_NAME: &str = "reboot-mode";

/// Name of the firmware-preparing observer on the restart chain.
pub const RESTART_HANDLER_NAME: &str = "restart-prepare";

#[derive(Debug, Default)]
struct StatsInner {
    events: AtomicU64,
    restarts: AtomicU64,
    persisted: AtomicU64,
    fallbacks: AtomicU64,
    primary_failures: AtomicU64,
    storage_failures: AtomicU64,
    unknown_reasons: AtomicU64,
    guard_polls: AtomicU64,
}

/// Counters describing the controller's activity since setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerStats {
    /// Reboot-class events handled
    pub events: u64,
    /// Restart-chain dispatches
    pub restarts: u64,
    /// Modes persisted
    pub persisted: u64,
    /// Persists that needed the regmap fallback
    pub fallbacks: u64,
    /// Persists where both register paths failed
    pub primary_failures: u64,
    /// Persists where the storage write failed
    pub storage_failures: u64,
    /// Reasons that did not resolve to a mode
    pub unknown_reasons: u64,
    /// Power key polls that found the key still pressed
    pub guard_polls: u64,
}

impl StatsInner {
    fn snapshot(&self) -> ControllerStats {
        ControllerStats {
            events: self.events.load(Ordering::Acquire),
            restarts: self.restarts.load(Ordering::Acquire),
            persisted: self.persisted.load(Ordering::Acquire),
            fallbacks: self.fallbacks.load(Ordering::Acquire),
            primary_failures: self.primary_failures.load(Ordering::Acquire),
            storage_failures: self.storage_failures.load(Ordering::Acquire),
            unknown_reasons: self.unknown_reasons.load(Ordering::Acquire),
            guard_polls: self.guard_polls.load(Ordering::Acquire),
        }
    }

    fn record_persist(&self, outcome: &PersistOutcome) {
        self.persisted.fetch_add(1, Ordering::AcqRel);
        match outcome.primary {
            PrimaryOutcome::Direct => {}
            PrimaryOutcome::Fallback => {
                self.fallbacks.fetch_add(1, Ordering::AcqRel);
            }
            PrimaryOutcome::Failed => {
                self.fallbacks.fetch_add(1, Ordering::AcqRel);
                self.primary_failures.fetch_add(1, Ordering::AcqRel);
            }
        }
        if !outcome.secondary_ok() {
            self.storage_failures.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// What the reboot handler did for the most recent event.
#[derive(Debug, Default)]
struct HandlerRecord {
    mode: Option<ModeCode>,
    persist: Option<PersistOutcome>,
    guard: Option<GuardReport>,
}

/// Maximum-priority observer: resolves, persists and guards power-off.
pub struct RebootHandler {
    persister: ModePersister,
    guard: PowerOffGuard,
    power_key: Arc<dyn PowerKey>,
    sleeper: Arc<dyn Sleeper>,
    stats: Arc<StatsInner>,
    last: Mutex<Option<HandlerRecord>>,
}

impl std::fmt::Debug for RebootHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebootHandler")
            .field("persister", &self.persister)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl RebootHandler {
    /// Resolve `reason` and persist the mode; unknown reasons persist nothing.
    fn record_reason(&self, reason: Option<&str>, record: &mut HandlerRecord) {
        let Some(reason) = reason else {
            return;
        };
        info!("Reboot command: '{reason}'");

        let Some(mode) = ModeCode::resolve(Some(reason)) else {
            info!(reason, "Unknown reboot command, mode left unchanged");
            self.stats.unknown_reasons.fetch_add(1, Ordering::AcqRel);
            return;
        };

        let outcome = self.persister.persist(mode);
        self.stats.record_persist(&outcome);
        record.mode = Some(mode);
        record.persist = Some(outcome);
    }

    fn take_record(&self) -> HandlerRecord {
        self.last.lock().take().unwrap_or_default()
    }
}

impl Observer for RebootHandler {
    fn notify(&self, event: RebootEvent, reason: Option<&str>) -> Result<Ack> {
        let mut record = HandlerRecord::default();
        self.record_reason(reason, &mut record);

        if event == RebootEvent::PowerOff {
            let report = self
                .guard
                .wait_for_release(self.power_key.as_ref(), self.sleeper.as_ref());
            self.stats
                .guard_polls
                .fetch_add(u64::from(report.pressed_polls), Ordering::AcqRel);
            record.guard = Some(report);
        }

        *self.last.lock() = Some(record);
        Ok(Ack::Done)
    }
}

/// Everything that happened while handling one event.
#[derive(Debug)]
pub struct EventReport {
    /// Event that was handled
    pub event: RebootEvent,
    /// Mode resolved from the reason, if any
    pub mode: Option<ModeCode>,
    /// Persistence outcome, when a mode was resolved
    pub persist: Option<PersistOutcome>,
    /// Guard summary, for power-off events
    pub guard: Option<GuardReport>,
    /// Reboot chain outcomes
    pub reboot_observers: NotifyReport,
    /// Restart chain outcomes, for restart events
    pub restart_observers: Option<NotifyReport>,
}

impl EventReport {
    /// Whether every observer on both chains completed without error.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.reboot_observers.all_ok()
            && self.restart_observers.as_ref().map_or(true, NotifyReport::all_ok)
    }
}

/// Top-level entry point for reboot-class events.
pub struct RebootController {
    config: Config,
    handler: Arc<RebootHandler>,
    reboot_chain: ObserverCoordinator,
    restart_chain: ObserverCoordinator,
    stats: Arc<StatsInner>,
}

impl std::fmt::Debug for RebootController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebootController")
            .field("config", &self.config)
            .field("reboot_chain", &self.reboot_chain)
            .field("restart_chain", &self.restart_chain)
            .finish_non_exhaustive()
    }
}

impl RebootController {
    /// Create a controller builder with the provided configuration.
    #[must_use]
    pub fn builder(config: Config) -> RebootControllerBuilder {
        RebootControllerBuilder::new(config)
    }

    /// Handle a reboot-class event and return once the reset may proceed.
    ///
    /// Runs the reboot chain (mode persistence first, power-off guard
    /// included) and, for restarts, the restart chain after it.
    #[instrument(skip(self, event), fields(event = %event))]
    pub fn handle(&self, event: RebootEvent, reason: Option<&str>) -> EventReport {
        self.stats.events.fetch_add(1, Ordering::AcqRel);

        let reboot_observers = self.reboot_chain.notify(event, reason);
        let record = self.handler.take_record();

        let restart_observers = (event == RebootEvent::Restart).then(|| self.restart(reason));

        debug!(
            mode = ?record.mode,
            failures = reboot_observers.failures(),
            "Reboot event handled"
        );

        EventReport {
            event,
            mode: record.mode,
            persist: record.persist,
            guard: record.guard,
            reboot_observers,
            restart_observers,
        }
    }

    /// Run only the restart chain (restart-only event stream).
    pub fn restart(&self, reason: Option<&str>) -> NotifyReport {
        self.stats.restarts.fetch_add(1, Ordering::AcqRel);
        self.restart_chain.notify(RebootEvent::Restart, reason)
    }

    /// Persist `mode` directly, outside of any event.
    pub fn set_mode(&self, mode: ModeCode) -> PersistOutcome {
        let outcome = self.handler.persister.persist(mode);
        self.stats.record_persist(&outcome);
        outcome
    }

    /// Mode recorded in storage by the previous shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or holds no valid record.
    pub fn recorded_mode(&self) -> Result<ModeCode> {
        self.handler.persister.recorded()
    }

    /// Register an additional observer on the reboot chain.
    pub fn register_reboot_observer<S, O>(&self, name: S, priority: i32, observer: O) -> ObserverId
    where
        S: Into<Arc<str>>,
        O: Observer + 'static,
    {
        self.reboot_chain.register(name, priority, observer)
    }

    /// Register an additional observer on the restart chain.
    pub fn register_restart_observer<S, O>(&self, name: S, priority: i32, observer: O) -> ObserverId
    where
        S: Into<Arc<str>>,
        O: Observer + 'static,
    {
        self.restart_chain.register(name, priority, observer)
    }

    /// The reboot chain.
    #[must_use]
    pub const fn reboot_chain(&self) -> &ObserverCoordinator {
        &self.reboot_chain
    }

    /// The restart chain.
    #[must_use]
    pub const fn restart_chain(&self) -> &ObserverCoordinator {
        &self.restart_chain
    }

    /// Register write that performs the reset for `event`; halt has none.
    #[must_use]
    pub fn reset_register(&self, event: RebootEvent) -> Option<ResetRegister> {
        let kind = match event {
            RebootEvent::Restart => ResetKind::Warm,
            RebootEvent::PowerOff => ResetKind::PowerOff,
            RebootEvent::Halt => return None,
        };
        self.config.reset_register(kind).ok()
    }

    /// The configuration this controller was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> ControllerStats {
        self.stats.snapshot()
    }
}

/// Builder wiring platform capabilities into a [`RebootController`].
pub struct RebootControllerBuilder {
    config: Config,
    privileged: Option<Arc<dyn PrivilegedWriter>>,
    regmap: Option<Arc<dyn Regmap>>,
    storage: Option<Arc<dyn ModeStorage>>,
    power_key: Option<Arc<dyn PowerKey>>,
    sleeper: Arc<dyn Sleeper>,
    preparer: Option<Arc<dyn RestartPreparer>>,
}

impl RebootControllerBuilder {
    /// Create a builder; capabilities are added with the setter methods.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            privileged: None,
            regmap: None,
            storage: None,
            power_key: None,
            sleeper: Arc::new(ThreadSleeper),
            preparer: None,
        }
    }

    /// Privileged register writer used for the primary mode write.
    #[must_use]
    pub fn privileged_writer<W: PrivilegedWriter + 'static>(mut self, writer: Arc<W>) -> Self {
        self.privileged = Some(writer);
        self
    }

    /// Register map used as the fallback mode write.
    #[must_use]
    pub fn regmap<R: Regmap + 'static>(mut self, regmap: Arc<R>) -> Self {
        self.regmap = Some(regmap);
        self
    }

    /// Long-term storage for the mode record.
    #[must_use]
    pub fn storage<S: ModeStorage + 'static>(mut self, storage: Arc<S>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Power key queried by the power-off guard.
    #[must_use]
    pub fn power_key<K: PowerKey + 'static>(mut self, key: Arc<K>) -> Self {
        self.power_key = Some(key);
        self
    }

    /// Sleep used between guard polls (defaults to [`ThreadSleeper`]).
    #[must_use]
    pub fn sleeper<T: Sleeper + 'static>(mut self, sleeper: Arc<T>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Subsystem told to prepare before a restart.
    #[must_use]
    pub fn restart_preparer<P: RestartPreparer + 'static>(mut self, preparer: Arc<P>) -> Self {
        self.preparer = Some(preparer);
        self
    }

    /// Validate the configuration and register both handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete or a required
    /// capability was not provided.
    pub fn build(self) -> Result<RebootController> {
        self.config.validate()?;

        let privileged = self
            .privileged
            .ok_or_else(|| Error::config("privileged register writer not provided"))?;
        let regmap = self
            .regmap
            .ok_or_else(|| Error::config("PMU regmap not provided"))?;
        let storage = self
            .storage
            .ok_or_else(|| Error::config("mode storage not provided"))?;
        let power_key = self
            .power_key
            .ok_or_else(|| Error::config("power key not provided"))?;

        let persister = ModePersister::new(&self.config, privileged, regmap, storage)?;
        let stats = Arc::new(StatsInner::default());

        let handler = Arc::new(RebootHandler {
            persister,
            guard: PowerOffGuard::new(&self.config.guard),
            power_key,
            sleeper: self.sleeper,
            stats: Arc::clone(&stats),
            last: Mutex::new(None),
        });

        let reboot_chain = ObserverCoordinator::new("reboot");
        reboot_chain.register_arc(
            REBOOT_HANDLER_NAME,
            crate::REBOOT_HANDLER_PRIORITY,
            Arc::clone(&handler) as Arc<dyn Observer>,
        );

        let restart_chain = ObserverCoordinator::new("restart");
        restart_chain.register(
            RESTART_HANDLER_NAME,
            self.config.restart_priority,
            RestartHandler::new(self.preparer),
        );

        info!(
            reboot_cmd = format_args!("{:#x}", handler.persister.address()),
            restart_priority = self.config.restart_priority,
            "register restart handler successfully"
        );

        Ok(RebootController {
            config: self.config,
            handler,
            reboot_chain,
            restart_chain,
            stats,
        })
    }
}
