//! Reboot mode codes and the reason-string table.
//!
//! The bootloader reads the mode code back on the next boot to decide what
//! to do (enter fastboot, recovery, charger mode, ...). Resolution is an
//! exact, case-sensitive match against a fixed table; anything else resolves
//! to nothing and leaves the previously recorded mode untouched.

use crate::error::{Error, ErrorCode, Result};
use crate::VALID_BIT;

/// Compact numeric identifier of why the device rebooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ModeCode {
    /// Ordinary restart with no special next-boot behaviour
    Normal = 0x00,
    /// Boot into charger mode
    Charge = 0x0A,
    /// dm-verity detected a corrupted device
    DmVerityCorrupted = 0x50,
    /// Thermal shutdown
    ShutdownThermal = 0x51,
    /// Rescue party mode
    Rescue = 0xF9,
    /// Userspace fastboot
    Fastboot = 0xFA,
    /// Bootloader fastboot
    Bootloader = 0xFC,
    /// Factory mode
    Factory = 0xFD,
    /// Recovery
    Recovery = 0xFF,
}

/// Reason strings that are ordinary user-triggered restarts.
const NORMAL_REASONS: [&str; 6] = [
    "from_fastboot",
    "shell",
    "userrequested",
    "userrequested,fastboot",
    "userrequested,recovery",
    "userrequested,recovery,ui",
];

impl ModeCode {
    /// Every mode code, in ascending numeric order.
    pub const ALL: [Self; 9] = [
        Self::Normal,
        Self::Charge,
        Self::DmVerityCorrupted,
        Self::ShutdownThermal,
        Self::Rescue,
        Self::Fastboot,
        Self::Bootloader,
        Self::Factory,
        Self::Recovery,
    ];

    /// Resolve a reboot reason to its mode code.
    ///
    /// Returns `None` for an absent reason and for any string not in the table.
    #[must_use]
    pub fn resolve(reason: Option<&str>) -> Option<Self> {
        let mode = match reason? {
            "charge" => Self::Charge,
            "bootloader" => Self::Bootloader,
            "fastboot" => Self::Fastboot,
            "recovery" => Self::Recovery,
            "dm-verity device corrupted" => Self::DmVerityCorrupted,
            "rescue" => Self::Rescue,
            "shutdown-thermal" => Self::ShutdownThermal,
            other if NORMAL_REASONS.contains(&other) => Self::Normal,
            _ => return None,
        };
        Some(mode)
    }

    /// Raw register value of this mode.
    #[must_use]
    pub const fn value(self) -> u32 {
        self as u32
    }

    /// Short name used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Charge => "charge",
            Self::DmVerityCorrupted => "dm-verity-corrupted",
            Self::ShutdownThermal => "shutdown-thermal",
            Self::Rescue => "rescue",
            Self::Fastboot => "fastboot",
            Self::Bootloader => "bootloader",
            Self::Factory => "factory",
            Self::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for ModeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#04x})", self.as_str(), self.value())
    }
}

impl TryFrom<u32> for ModeCode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.value() == value)
            .ok_or_else(|| {
                Error::storage_with_code(
                    ErrorCode::StorageRecordInvalid,
                    crate::RSBM_TAG,
                    0,
                    format!("unknown reboot mode {value:#x}"),
                )
            })
    }
}

/// Mode code as stored in long-term storage, tagged with the validity bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedModeRecord(u32);

impl PersistedModeRecord {
    /// Size of the encoded record in bytes.
    pub const SIZE: usize = 4;

    /// Record for a freshly written mode; always carries the validity bit.
    #[must_use]
    pub const fn new(mode: ModeCode) -> Self {
        Self(mode.value() | VALID_BIT)
    }

    /// Raw record word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether the validity bit is set.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 & VALID_BIT != 0
    }

    /// Native-endian bytes written to the storage tag.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_ne_bytes()
    }

    /// Decode a record read back from storage.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(u32::from_ne_bytes(bytes))
    }

    /// Mode carried by this record.
    ///
    /// # Errors
    ///
    /// Returns an error if the validity bit is clear or the mode is unknown.
    pub fn decode(self) -> Result<ModeCode> {
        if !self.is_valid() {
            return Err(Error::storage_with_code(
                ErrorCode::StorageRecordInvalid,
                crate::RSBM_TAG,
                0,
                format!("record {:#010x} has no validity bit", self.0),
            ));
        }
        ModeCode::try_from(self.0 & !VALID_BIT)
    }
}

impl From<ModeCode> for PersistedModeRecord {
    fn from(mode: ModeCode) -> Self {
        Self::new(mode)
    }
}
