#![cfg(feature = "sim")]

use std::time::Duration;

use canopen_drive::clock::Clock;
use canopen_drive::frame::CanOpenFrame;
use canopen_drive::sdo::{SDOAbortCode, SdoError};
use canopen_drive::sim::{ManualClock, SimulatedDrive, DEVICE_NAME};
use canopen_drive::{Drive, DriveConfig, DriveError, NodeId, OperationMode, PowerState};

fn config() -> DriveConfig {
    DriveConfig {
        node_id: 3,
        sdo_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn setup() -> (ManualClock, SimulatedDrive) {
    let clock = ManualClock::new();
    let sim = SimulatedDrive::new(NodeId::new(3).unwrap(), clock.clone());
    (clock, sim)
}

fn drive<'a>(
    sim: &'a SimulatedDrive,
    clock: &ManualClock,
    config: DriveConfig,
) -> Drive<&'a SimulatedDrive, ManualClock> {
    Drive::with_clock(sim, clock.clone(), config).unwrap()
}

#[test]
fn test_enable_from_switch_on_disabled() {
    let (clock, sim) = setup();
    let drive = drive(&sim, &clock, config());

    let status = drive.enable(Duration::from_secs(1)).unwrap();
    assert_eq!(status.state(), Some(PowerState::OperationEnabled));
    assert!(status.operation_enabled());
    assert_eq!(sim.control_words(), [0x06, 0x07, 0x0F]);
    assert_eq!(sim.state(), PowerState::OperationEnabled);
    assert_eq!(drive.last_state(), Some(PowerState::OperationEnabled));
}

#[test]
fn test_enable_resets_fault_first() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::Fault);
    let drive = drive(&sim, &clock, config());

    drive.enable(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.control_words(), [0x80, 0x06, 0x07, 0x0F]);
}

#[test]
fn test_enable_repeats_fault_reset_edge() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::Fault);
    sim.set_sticky_fault(1);
    let drive = drive(&sim, &clock, config());

    drive.enable(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.control_words(), [0x80, 0x00, 0x80, 0x06, 0x07, 0x0F]);
}

#[test]
fn test_enable_from_quick_stop() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::QuickStopActive);
    let drive = drive(&sim, &clock, config());

    drive.enable(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.control_words(), [0x00, 0x06, 0x07, 0x0F]);
}

#[test]
fn test_enable_when_enabled_writes_nothing() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::OperationEnabled);
    let drive = drive(&sim, &clock, config());

    drive.enable(Duration::from_secs(1)).unwrap();
    assert!(sim.control_words().is_empty());
    assert_eq!(sim.download_requests(), 0);
}

#[test]
fn test_enable_waits_for_boot() {
    let (clock, sim) = setup();
    sim.set_boot_polls(3);
    let drive = drive(&sim, &clock, config());

    drive.enable(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.control_words(), [0x06, 0x07, 0x0F]);
    // three polls in NotReadyToSwitchOn before the first transition
    assert!(clock.now() >= Duration::from_millis(30));
}

#[test]
fn test_enable_timeout() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::Fault);
    sim.set_sticky_fault(u32::MAX);
    let drive = drive(&sim, &clock, config());

    let timeout = Duration::from_millis(100);
    let err = drive.enable(timeout).unwrap_err();
    assert_eq!(
        err,
        DriveError::EnableTimeout {
            timeout,
            last: Some(PowerState::Fault),
        }
    );
    assert_eq!(clock.now(), timeout);
    assert_eq!(sim.state(), PowerState::Fault);
}

#[test]
fn test_enable_max_polls() {
    let (clock, sim) = setup();
    sim.set_boot_polls(10);
    let drive = drive(
        &sim,
        &clock,
        DriveConfig {
            max_polls: Some(3),
            ..config()
        },
    );

    let err = drive.enable(Duration::from_secs(1)).unwrap_err();
    assert!(matches!(
        err,
        DriveError::EnableTimeout {
            last: Some(PowerState::NotReadyToSwitchOn),
            ..
        }
    ));
    assert_eq!(sim.sdo_requests().len(), 3);
}

#[test]
fn test_sdo_timeouts_count_as_failed_polls() {
    let (clock, sim) = setup();
    sim.set_silent(true);
    let drive = drive(&sim, &clock, config());

    let timeout = Duration::from_millis(200);
    let err = drive.enable(timeout).unwrap_err();
    assert_eq!(err, DriveError::EnableTimeout { timeout, last: None });
    assert!(clock.now() >= timeout);
}

#[test]
fn test_abort_while_polling_propagates() {
    let (clock, sim) = setup();
    sim.abort_on(0x6041, 0, SDOAbortCode::GeneralError);
    let drive = drive(&sim, &clock, config());

    let err = drive.enable(Duration::from_secs(1)).unwrap_err();
    assert_eq!(
        err,
        DriveError::Sdo(SdoError::Aborted {
            index: 0x6041,
            subindex: 0,
            code: SDOAbortCode::GeneralError,
        })
    );
    assert_eq!(err.abort_code(), Some(SDOAbortCode::GeneralError));
    // failed on the first poll
    assert_eq!(clock.now(), Duration::ZERO);
}

#[test]
fn test_disable() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::OperationEnabled);
    let drive = drive(&sim, &clock, config());

    let status = drive.disable(Duration::from_secs(1)).unwrap();
    assert_eq!(status.state(), Some(PowerState::SwitchOnDisabled));
    assert_eq!(sim.control_words(), [0x00]);
}

#[test]
fn test_disable_clears_fault() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::Fault);
    let drive = drive(&sim, &clock, config());

    drive.disable(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.control_words(), [0x80]);
    assert_eq!(sim.state(), PowerState::SwitchOnDisabled);
}

#[test]
fn test_disable_timeout() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::Fault);
    sim.set_sticky_fault(u32::MAX);
    let drive = drive(&sim, &clock, config());

    let err = drive.disable(Duration::from_millis(50)).unwrap_err();
    assert!(matches!(
        err,
        DriveError::DisableTimeout {
            last: Some(PowerState::Fault),
            ..
        }
    ));
}

#[test]
fn test_set_mode() {
    let (clock, sim) = setup();
    let drive = drive(&sim, &clock, config());

    assert_eq!(drive.mode(), Ok(None));
    drive
        .set_mode(OperationMode::Velocity, Duration::from_millis(100))
        .unwrap();
    assert_eq!(sim.value(0x6060, 0), Some(vec![3]));
    assert_eq!(drive.mode(), Ok(Some(OperationMode::Velocity)));
}

#[test]
fn test_set_mode_rejected() {
    let (clock, sim) = setup();
    sim.set_accept_modes(false);
    let drive = drive(&sim, &clock, config());

    let err = drive
        .set_mode(OperationMode::Torque, Duration::from_millis(100))
        .unwrap_err();
    assert_eq!(
        err,
        DriveError::ModeRejected {
            requested: OperationMode::Torque,
            actual: Some(0),
        }
    );
}

#[test]
fn test_current_mode_code() {
    let (clock, sim) = setup();
    let drive = drive(
        &sim,
        &clock,
        DriveConfig {
            current_mode_code: -3,
            ..config()
        },
    );

    drive
        .set_mode(OperationMode::Current, Duration::from_millis(100))
        .unwrap();
    assert_eq!(sim.value(0x6060, 0), Some(vec![0xFD]));
    assert_eq!(drive.mode(), Ok(Some(OperationMode::Current)));
}

#[test]
fn test_quick_stop_then_enable() {
    let (clock, sim) = setup();
    sim.set_state(PowerState::OperationEnabled);
    let drive = drive(&sim, &clock, config());

    let status = drive.quick_stop(Duration::from_millis(100)).unwrap();
    assert_eq!(status.state(), Some(PowerState::QuickStopActive));
    assert!(!status.quick_stop());

    drive.enable(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.control_words(), [0x02, 0x00, 0x06, 0x07, 0x0F]);
}

#[test]
fn test_nmt_start_once() {
    let (clock, sim) = setup();
    let drive = drive(
        &sim,
        &clock,
        DriveConfig {
            nmt_start: true,
            ..config()
        },
    );

    drive.enable(Duration::from_secs(1)).unwrap();
    drive.disable(Duration::from_secs(1)).unwrap();
    drive.enable(Duration::from_secs(1)).unwrap();
    assert_eq!(sim.nmt_commands(), [0x01]);
    assert_eq!(sim.frames_sent()[0].cob_id(), Some(0x000));
}

#[test]
fn test_device_name() {
    let (clock, sim) = setup();
    let drive = drive(&sim, &clock, config());

    assert_eq!(drive.device_name().unwrap(), DEVICE_NAME);
}

#[test]
fn test_monitor_counts_heartbeats() {
    let (clock, sim) = setup();
    let drive = drive(&sim, &clock, config());
    sim.heartbeat();
    let other = CanOpenFrame::from_cob_id(0x704, &[0x05]).unwrap();
    sim.inject(other);
    sim.heartbeat();

    let start = clock.now();
    assert_eq!(drive.monitor(Duration::from_millis(500)), Ok(2));
    assert_eq!(clock.now() - start, Duration::from_millis(500));
    assert_eq!(sim.pending_frames(), [other]);
}
