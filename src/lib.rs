#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
//! # reboot-mode: reboot reason persistence for SoC platforms
//!
//! Decides, records and acts on the reason a device is restarting or powering
//! off. On every reboot-class event the crate:
//!
//! - **Resolves** the free-form reboot command into a compact [`ModeCode`]
//! - **Persists** the code to a PMU register (privileged write with a regmap
//!   fallback) and to a long-term storage tag carrying a validity bit
//! - **Notifies** registered observers in strict priority order
//! - **Guards** power-off until the physical power key has been released
//!
//! Hardware access is modelled through small traits ([`PrivilegedWriter`],
//! [`Regmap`], [`ModeStorage`], [`PowerKey`], [`RestartPreparer`]) so the
//! platform binding layer plugs in its own transport.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reboot_mode::{Config, RebootController, RebootEvent};
//!
//! fn setup(platform: Platform) -> reboot_mode::Result<RebootController> {
//!     let config = Config::load()?;
//!
//!     RebootController::builder(config)
//!         .privileged_writer(platform.smc())
//!         .regmap(platform.pmu_regmap())
//!         .storage(platform.battery_storage())
//!         .power_key(platform.pmic())
//!         .restart_preparer(platform.acpm())
//!         .build()
//! }
//!
//! // Delivered by the host once a reboot has been requested.
//! controller.handle(RebootEvent::Restart, Some("bootloader"));
//! controller.restart(Some("bootloader"));
//! ```

// Private modules
mod config;
mod error;

// Public modules
pub mod guard;
pub mod logging;
pub mod mode;
pub mod observer;
pub mod orchestrator;
pub mod persist;
pub mod restart;

// Public exports
pub use config::{Config, ConfigBuilder, GuardConfig, LogConfig, LogLevel, ResetKind, ResetRegister};
pub use error::{Error, ErrorCode, Result};
pub use guard::{GuardReport, PowerKey, PowerOffGuard, Sleeper, ThreadSleeper};
pub use mode::{ModeCode, PersistedModeRecord};
pub use observer::{Ack, NotifyReport, Observer, ObserverCoordinator, ObserverId, RebootEvent};
pub use orchestrator::{ControllerStats, EventReport, RebootController, RebootControllerBuilder, RebootHandler};
pub use persist::{ModePersister, ModeStorage, PersistOutcome, PrimaryOutcome, PrivilegedWriter, Regmap};
pub use restart::{RestartHandler, RestartPreparer};

/// Version of the reboot-mode library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default offset of the reboot command register inside the PMU alive block
pub const DEFAULT_REBOOT_CMD_OFFSET: u32 = 0x0810;

/// Validity flag OR-ed into the mode code stored in long-term storage
pub const VALID_BIT: u32 = 1 << 31;

/// Storage tag of the recorded shutdown/boot mode ("RSBM")
pub const RSBM_TAG: u32 = u32::from_be_bytes(*b"RSBM");

/// Priority of the reboot handler: it always runs first
pub const REBOOT_HANDLER_PRIORITY: i32 = i32::MAX;

/// Default priority of the restart handler
pub const DEFAULT_RESTART_PRIORITY: i32 = 130;

/// Default power key poll interval in milliseconds
pub const DEFAULT_GUARD_POLL_INTERVAL_MS: u64 = 1000;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "reboot.toml";
