//! Integration tests for reboot-mode.

use parking_lot::Mutex;
use reboot_mode::{
    Ack, Config, Error, ErrorCode, ModeCode, ModeStorage, PowerKey, PrimaryOutcome,
    PrivilegedWriter, RebootController, RebootEvent, Regmap, ResetRegister, RestartPreparer,
    Result, Sleeper, RSBM_TAG, VALID_BIT,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BASE: u64 = 0x1746_0000;

#[derive(Default)]
struct SecureMonitor {
    refuse: AtomicBool,
    writes: Mutex<Vec<(u64, u32)>>,
}

impl PrivilegedWriter for SecureMonitor {
    fn write_priv(&self, address: u64, value: u32) -> Result<()> {
        self.writes.lock().push((address, value));
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::register_denied(address, "not in the allow list"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct PmuRegmap {
    writes: Mutex<Vec<(u32, u32)>>,
}

impl Regmap for PmuRegmap {
    fn write(&self, offset: u32, value: u32) -> Result<()> {
        self.writes.lock().push((offset, value));
        Ok(())
    }
}

#[derive(Default)]
struct BatteryStorage {
    fail_status: Option<i32>,
    records: Mutex<HashMap<u32, Vec<u8>>>,
}

impl BatteryStorage {
    fn record(&self) -> Option<u32> {
        self.records
            .lock()
            .get(&RSBM_TAG)
            .map(|bytes| u32::from_ne_bytes(bytes.as_slice().try_into().unwrap()))
    }
}

impl ModeStorage for BatteryStorage {
    fn write(&self, tag: u32, data: &[u8]) -> Result<()> {
        if let Some(status) = self.fail_status {
            return Err(Error::storage(tag, status, "storage offline"));
        }
        self.records.lock().insert(tag, data.to_vec());
        Ok(())
    }

    fn read(&self, tag: u32, buf: &mut [u8]) -> Result<usize> {
        let records = self.records.lock();
        let bytes = records
            .get(&tag)
            .ok_or_else(|| Error::storage(tag, -61, "no data"))?;
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }
}

/// Reports pressed for the first `pressed_for` polls.
#[derive(Default)]
struct ScriptedKey {
    pressed_for: u32,
    polls: AtomicU32,
}

impl ScriptedKey {
    const fn pressed_for(polls: u32) -> Self {
        Self {
            pressed_for: polls,
            polls: AtomicU32::new(0),
        }
    }
}

impl PowerKey for ScriptedKey {
    fn is_pressed(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) < self.pressed_for
    }
}

#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

#[derive(Default)]
struct Firmware {
    fail: bool,
    calls: AtomicU32,
}

impl RestartPreparer for Firmware {
    fn prepare_reboot(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::observer_with_code(
                ErrorCode::PrepareRebootFailed,
                "acpm",
                "ipc timed out",
            ));
        }
        Ok(())
    }
}

struct Platform {
    monitor: Arc<SecureMonitor>,
    regmap: Arc<PmuRegmap>,
    storage: Arc<BatteryStorage>,
    key: Arc<ScriptedKey>,
    sleeper: Arc<RecordingSleeper>,
    firmware: Arc<Firmware>,
}

impl Platform {
    fn new() -> Self {
        Self {
            monitor: Arc::default(),
            regmap: Arc::default(),
            storage: Arc::default(),
            key: Arc::default(),
            sleeper: Arc::default(),
            firmware: Arc::default(),
        }
    }

    fn config() -> Config {
        Config::builder()
            .base_address(BASE)
            .swreset(0x3a00, 0x2)
            .pshold(0x3e9c, 0x0)
            .build()
            .unwrap()
    }

    fn controller(&self) -> RebootController {
        self.controller_with(Self::config())
    }

    fn controller_with(&self, config: Config) -> RebootController {
        RebootController::builder(config)
            .privileged_writer(self.monitor.clone())
            .regmap(self.regmap.clone())
            .storage(self.storage.clone())
            .power_key(self.key.clone())
            .sleeper(self.sleeper.clone())
            .restart_preparer(self.firmware.clone())
            .build()
            .unwrap()
    }
}

#[test]
fn test_restart_runs_both_chains() {
    let platform = Platform::new();
    let controller = platform.controller();

    let report = controller.handle(RebootEvent::Restart, Some("bootloader"));

    assert_eq!(report.mode, Some(ModeCode::Bootloader));
    assert_eq!(*platform.monitor.writes.lock(), vec![(BASE + 0x0810, 0xFC)]);
    assert_eq!(platform.storage.record(), Some(0xFC | VALID_BIT));
    assert!(report.guard.is_none());
    assert!(platform.sleeper.sleeps.lock().is_empty());

    let restart = report.restart_observers.as_ref().unwrap();
    assert_eq!(restart.invoked(), vec!["restart-prepare"]);
    assert_eq!(platform.firmware.calls.load(Ordering::SeqCst), 1);
    assert!(report.all_ok());
}

#[test]
fn test_power_off_blocks_until_key_released() {
    let platform = Platform {
        key: Arc::new(ScriptedKey::pressed_for(3)),
        ..Platform::new()
    };
    let controller = platform.controller();

    let report = controller.handle(RebootEvent::PowerOff, Some("shutdown-thermal"));

    assert_eq!(report.mode, Some(ModeCode::ShutdownThermal));
    let guard = report.guard.unwrap();
    assert_eq!(guard.pressed_polls, 3);
    assert!(!guard.valve_tripped);
    assert_eq!(
        *platform.sleeper.sleeps.lock(),
        vec![Duration::from_millis(1000); 3]
    );
    assert_eq!(platform.key.polls.load(Ordering::SeqCst), 4);

    assert!(report.restart_observers.is_none());
    assert_eq!(platform.firmware.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_power_off_without_reason_still_guards() {
    let platform = Platform {
        key: Arc::new(ScriptedKey::pressed_for(2)),
        ..Platform::new()
    };
    let controller = platform.controller();

    let report = controller.handle(RebootEvent::PowerOff, None);

    assert!(report.mode.is_none());
    assert!(report.persist.is_none());
    assert!(platform.monitor.writes.lock().is_empty());
    assert!(platform.storage.record().is_none());
    assert_eq!(report.guard.unwrap().pressed_polls, 2);
    assert_eq!(platform.sleeper.sleeps.lock().len(), 2);
}

#[test]
fn test_unknown_reason_skips_persistence() {
    let platform = Platform::new();
    let controller = platform.controller();

    let _ = controller.set_mode(ModeCode::Recovery);
    platform.monitor.writes.lock().clear();

    let report = controller.handle(RebootEvent::Restart, Some("blah"));

    assert!(report.mode.is_none());
    assert!(platform.monitor.writes.lock().is_empty());
    assert!(platform.regmap.writes.lock().is_empty());
    assert_eq!(controller.recorded_mode().unwrap(), ModeCode::Recovery);
    assert_eq!(controller.stats().unknown_reasons, 1);
    assert!(report.all_ok());
}

#[test]
fn test_user_requested_recovery_is_normal() {
    let platform = Platform::new();
    let controller = platform.controller();

    let report = controller.handle(RebootEvent::Restart, Some("userrequested,recovery"));

    assert_eq!(report.mode, Some(ModeCode::Normal));
    assert_eq!(platform.storage.record(), Some(VALID_BIT));
    assert_eq!(controller.recorded_mode().unwrap(), ModeCode::Normal);
}

#[test]
fn test_refused_privileged_write_uses_regmap() {
    let platform = Platform::new();
    platform.monitor.refuse.store(true, Ordering::SeqCst);
    let controller = platform.controller();

    let report = controller.handle(RebootEvent::Restart, Some("rescue"));

    let persist = report.persist.unwrap();
    assert_eq!(persist.primary, PrimaryOutcome::Fallback);
    assert_eq!(*platform.regmap.writes.lock(), vec![(0x0810, 0xF9)]);
    assert_eq!(platform.storage.record(), Some(0xF9 | VALID_BIT));
    assert_eq!(controller.stats().fallbacks, 1);
}

#[test]
fn test_custom_reboot_cmd_offset() {
    let platform = Platform::new();
    platform.monitor.refuse.store(true, Ordering::SeqCst);
    let config = Config::builder()
        .base_address(BASE)
        .swreset(0x3a00, 0x2)
        .pshold(0x3e9c, 0x0)
        .reboot_cmd_offset(0x0900)
        .build()
        .unwrap();
    let controller = platform.controller_with(config);

    let _ = controller.handle(RebootEvent::Restart, Some("fastboot"));

    assert_eq!(*platform.monitor.writes.lock(), vec![(BASE + 0x0900, 0xFA)]);
    assert_eq!(*platform.regmap.writes.lock(), vec![(0x0900, 0xFA)]);
}

#[test]
fn test_storage_failure_does_not_block_restart() {
    let platform = Platform {
        storage: Arc::new(BatteryStorage {
            fail_status: Some(-5),
            ..BatteryStorage::default()
        }),
        ..Platform::new()
    };
    let controller = platform.controller();

    let report = controller.handle(RebootEvent::Restart, Some("charge"));

    let persist = report.persist.as_ref().unwrap();
    assert_eq!(persist.primary, PrimaryOutcome::Direct);
    assert_eq!(
        persist.secondary_error.as_ref().and_then(Error::storage_status),
        Some(-5)
    );
    assert_eq!(platform.firmware.calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.stats().storage_failures, 1);
}

#[test]
fn test_reboot_handler_runs_first() {
    let platform = Platform::new();
    let controller = platform.controller();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for (name, priority) in [("late", 0), ("tie", i32::MAX), ("mid", 500)] {
        let storage = platform.storage.clone();
        let seen = Arc::clone(&seen);
        controller.register_reboot_observer(
            name,
            priority,
            move |_: RebootEvent, _: Option<&str>| -> Result<Ack> {
                seen.lock().push((name, storage.record()));
                Ok(Ack::Ok)
            },
        );
    }

    let report = controller.handle(RebootEvent::Halt, Some("recovery"));

    assert_eq!(report.reboot_observers.invoked(), vec!["reboot-mode", "tie", "mid", "late"]);
    let recorded = Some(0xFF | VALID_BIT);
    assert_eq!(
        *seen.lock(),
        vec![("tie", recorded), ("mid", recorded), ("late", recorded)]
    );
}

#[test]
fn test_halt_persists_without_guard_or_restart() {
    let platform = Platform {
        key: Arc::new(ScriptedKey::pressed_for(5)),
        ..Platform::new()
    };
    let controller = platform.controller();

    let report = controller.handle(RebootEvent::Halt, Some("dm-verity device corrupted"));

    assert_eq!(report.mode, Some(ModeCode::DmVerityCorrupted));
    assert!(report.guard.is_none());
    assert!(report.restart_observers.is_none());
    assert_eq!(platform.key.polls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_restart_prepare_failure_does_not_stop_chain() {
    let platform = Platform {
        firmware: Arc::new(Firmware {
            fail: true,
            ..Firmware::default()
        }),
        ..Platform::new()
    };
    let controller = platform.controller();
    let later = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&later);
    controller.register_restart_observer(
        "watchdog",
        10,
        move |_: RebootEvent, _: Option<&str>| -> Result<Ack> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Ack::Ok)
        },
    );

    let report = controller.handle(RebootEvent::Restart, None);

    let restart = report.restart_observers.as_ref().unwrap();
    assert_eq!(restart.invoked(), vec!["restart-prepare", "watchdog"]);
    assert_eq!(restart.failures(), 1);
    assert_eq!(later.load(Ordering::SeqCst), 1);
    assert!(!report.all_ok());
}

#[test]
fn test_restart_only_stream() {
    let platform = Platform::new();
    let controller = platform.controller();

    let report = controller.restart(Some("bootloader"));

    assert_eq!(report.invoked(), vec!["restart-prepare"]);
    assert_eq!(platform.firmware.calls.load(Ordering::SeqCst), 1);
    assert!(platform.storage.record().is_none());
    assert_eq!(controller.stats().restarts, 1);
    assert_eq!(controller.stats().events, 0);
}

#[test]
fn test_restart_priority_is_configurable() {
    let platform = Platform::new();
    let config = Config::builder()
        .base_address(BASE)
        .swreset(0x3a00, 0x2)
        .pshold(0x3e9c, 0x0)
        .restart_priority(5)
        .build()
        .unwrap();
    let controller = platform.controller_with(config);
    controller.register_restart_observer("first", 6, |_: RebootEvent, _: Option<&str>| -> Result<Ack> {
        Ok(Ack::Done)
    });

    let report = controller.restart(None);

    assert_eq!(report.invoked(), vec!["first", "restart-prepare"]);
}

#[test]
fn test_safety_valve_releases_stuck_guard() {
    let platform = Platform {
        key: Arc::new(ScriptedKey::pressed_for(u32::MAX)),
        ..Platform::new()
    };
    let config = Config::builder()
        .base_address(BASE)
        .swreset(0x3a00, 0x2)
        .pshold(0x3e9c, 0x0)
        .max_polls(2)
        .build()
        .unwrap();
    let controller = platform.controller_with(config);

    let report = controller.handle(RebootEvent::PowerOff, Some("shell"));

    let guard = report.guard.unwrap();
    assert!(guard.valve_tripped);
    assert_eq!(guard.pressed_polls, 2);
    assert_eq!(controller.stats().guard_polls, 2);
}

#[test]
fn test_reset_registers() {
    let controller = Platform::new().controller();

    assert_eq!(
        controller.reset_register(RebootEvent::Restart),
        Some(ResetRegister {
            offset: 0x3a00,
            trigger: 0x2
        })
    );
    assert_eq!(
        controller.reset_register(RebootEvent::PowerOff),
        Some(ResetRegister {
            offset: 0x3e9c,
            trigger: 0x0
        })
    );
    assert_eq!(controller.reset_register(RebootEvent::Halt), None);
}

#[test]
fn test_setup_requires_complete_config() {
    let platform = Platform::new();
    let mut config = Platform::config();
    config.swreset_system_trigger = None;

    let err = RebootController::builder(config)
        .privileged_writer(platform.monitor.clone())
        .regmap(platform.regmap.clone())
        .storage(platform.storage.clone())
        .power_key(platform.key.clone())
        .build()
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ConfigMissing);
    assert!(err.to_string().contains("swreset-system-trigger"));
}

#[test]
fn test_setup_requires_capabilities() {
    let platform = Platform::new();

    let err = RebootController::builder(Platform::config())
        .privileged_writer(platform.monitor.clone())
        .regmap(platform.regmap.clone())
        .power_key(platform.key.clone())
        .build()
        .unwrap_err();

    assert!(err.is_config_error());
    assert!(err.to_string().contains("storage"));
}

#[test]
fn test_stats_track_events() {
    let platform = Platform::new();
    let controller = platform.controller();

    let _ = controller.handle(RebootEvent::Restart, Some("recovery"));
    let _ = controller.handle(RebootEvent::PowerOff, Some("charge"));
    let _ = controller.handle(RebootEvent::Halt, None);

    let stats = controller.stats();
    assert_eq!(stats.events, 3);
    assert_eq!(stats.restarts, 1);
    assert_eq!(stats.persisted, 2);
    assert_eq!(stats.fallbacks, 0);
    assert_eq!(controller.recorded_mode().unwrap(), ModeCode::Charge);
}
