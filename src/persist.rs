//! Dual-path persistence of the reboot mode.
//!
//! The mode is written twice so the next boot can always tell why the
//! previous one ended:
//!
//! - **Primary**: the PMU reboot command register. The privileged (secure
//!   monitor) write is tried first; when the access-control layer refuses it
//!   the same offset and value go through the generic regmap instead.
//! - **Secondary**: the long-term storage tag `RSBM`, written with the
//!   validity bit set. It is attempted on every persist, whatever happened
//!   on the primary path, and is never retried.
//!
//! Neither path can fail the reboot; every outcome is logged and reported
//! through [`PersistOutcome`].

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, ErrorCode, Result};
use crate::mode::{ModeCode, PersistedModeRecord};
use crate::RSBM_TAG;

/// Privileged single-word register write (secure monitor call or similar).
pub trait PrivilegedWriter: Send + Sync {
    /// Write `value` to the absolute physical `address`.
    ///
    /// # Errors
    ///
    /// Returns an error when the write is refused or fails.
    fn write_priv(&self, address: u64, value: u32) -> Result<()>;
}

/// Generic register map over the PMU block.
pub trait Regmap: Send + Sync {
    /// Write `value` at `offset` inside the register map.
    ///
    /// # Errors
    ///
    /// Returns an error when the bus write fails.
    fn write(&self, offset: u32, value: u32) -> Result<()>;
}

/// Keyed persistent storage (battery management storage on the reference platform).
pub trait ModeStorage: Send + Sync {
    /// Write `data` under `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] carrying the backend status on failure.
    fn write(&self, tag: u32, data: &[u8]) -> Result<()>;

    /// Read the record stored under `tag` into `buf`, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] carrying the backend status on failure.
    fn read(&self, tag: u32, buf: &mut [u8]) -> Result<usize>;
}

/// How the primary (register) write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryOutcome {
    /// The privileged write succeeded
    Direct,
    /// The privileged write was refused and the regmap write succeeded
    Fallback,
    /// Both the privileged and the regmap write failed
    Failed,
}

/// Result of one persist operation.
#[derive(Debug)]
pub struct PersistOutcome {
    /// Mode that was persisted
    pub mode: ModeCode,
    /// Outcome of the register write
    pub primary: PrimaryOutcome,
    /// Storage failure, if the secondary write did not go through
    pub secondary_error: Option<Error>,
}

impl PersistOutcome {
    /// Whether the authoritative storage record was written.
    #[must_use]
    pub const fn secondary_ok(&self) -> bool {
        self.secondary_error.is_none()
    }

    /// Whether both locations now hold the mode.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !matches!(self.primary, PrimaryOutcome::Failed) && self.secondary_ok()
    }

    /// Whether the regmap fallback was needed.
    #[must_use]
    pub const fn used_fallback(&self) -> bool {
        !matches!(self.primary, PrimaryOutcome::Direct)
    }
}

/// Writes mode codes to the register and storage locations.
#[derive(Clone)]
pub struct ModePersister {
    address: u64,
    offset: u32,
    privileged: Arc<dyn PrivilegedWriter>,
    regmap: Arc<dyn Regmap>,
    storage: Arc<dyn ModeStorage>,
}

impl std::fmt::Debug for ModePersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModePersister")
            .field("address", &format_args!("{:#x}", self.address))
            .field("offset", &format_args!("{:#x}", self.offset))
            .finish_non_exhaustive()
    }
}

impl ModePersister {
    /// Create a persister targeting the reboot command register of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration has no base address.
    pub fn new(
        config: &Config,
        privileged: Arc<dyn PrivilegedWriter>,
        regmap: Arc<dyn Regmap>,
        storage: Arc<dyn ModeStorage>,
    ) -> Result<Self> {
        Ok(Self {
            address: config.reboot_cmd_address()?,
            offset: config.reboot_cmd_offset,
            privileged,
            regmap,
            storage,
        })
    }

    /// Absolute address of the reboot command register.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// Record `mode` in both locations.
    pub fn persist(&self, mode: ModeCode) -> PersistOutcome {
        let primary = self.write_register(mode.value());
        let secondary_error = self.write_storage(PersistedModeRecord::new(mode)).err();

        debug!(%mode, ?primary, secondary_ok = secondary_error.is_none(), "Reboot mode persisted");

        PersistOutcome {
            mode,
            primary,
            secondary_error,
        }
    }

    fn write_register(&self, value: u32) -> PrimaryOutcome {
        let err = match self.privileged.write_priv(self.address, value) {
            Ok(()) => return PrimaryOutcome::Direct,
            Err(e) => e,
        };

        info!(
            address = format_args!("{:#x}", self.address),
            error = %err,
            "Failed to set reboot mode via privileged write, using regmap"
        );

        match self.regmap.write(self.offset, value) {
            Ok(()) => PrimaryOutcome::Fallback,
            Err(e) => {
                warn!(
                    offset = format_args!("{:#x}", self.offset),
                    error = %e,
                    "Regmap write of reboot mode failed"
                );
                PrimaryOutcome::Failed
            }
        }
    }

    fn write_storage(&self, record: PersistedModeRecord) -> Result<()> {
        self.storage
            .write(RSBM_TAG, &record.to_bytes())
            .inspect_err(|e| {
                error!(
                    tag = format_args!("{RSBM_TAG:#010x}"),
                    status = e.storage_status(),
                    error = %e,
                    "Failed to write reboot mode to storage"
                );
            })
    }

    /// Read back the mode recorded in storage by the previous shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read, the record is short, the
    /// validity bit is clear, or the mode is unknown.
    pub fn recorded(&self) -> Result<ModeCode> {
        let mut buf = [0u8; PersistedModeRecord::SIZE];
        let len = self.storage.read(RSBM_TAG, &mut buf)?;
        if len != buf.len() {
            return Err(Error::storage_with_code(
                ErrorCode::StorageReadFailed,
                RSBM_TAG,
                0,
                format!("short record: {len} of {} bytes", buf.len()),
            ));
        }
        PersistedModeRecord::from_bytes(buf).decode()
    }
}
