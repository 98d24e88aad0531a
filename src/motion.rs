//! Profile moves on top of the CiA 402 state machine.
//!
//! Every move is validated against the limits the drive itself reports
//! before anything is written, then mode, profile parameters and the
//! set-point are sent in that order.

use std::time::Duration;

use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::drive::control::{setpoint_word, ControlCommand};
use crate::drive::{Drive, DriveError, DriveStatus, OperationMode, PowerState};
use crate::network::Network;
use crate::objectdictionary::Parameter;
use crate::sdo::SDOAbortCode;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositionKind {
    Absolute,
    /// Relative to the previous target position
    Relative,
}

/// A single move command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotionProfile {
    Velocity {
        target: i32,
        acceleration: u32,
        deceleration: u32,
    },
    Position {
        target: i32,
        profile_velocity: u32,
        kind: PositionKind,
    },
    Current {
        target: i16,
    },
    Torque {
        target: i16,
    },
}

impl MotionProfile {
    pub const fn mode(&self) -> OperationMode {
        match self {
            MotionProfile::Velocity { .. } => OperationMode::Velocity,
            MotionProfile::Position { .. } => OperationMode::Position,
            MotionProfile::Current { .. } => OperationMode::Current,
            MotionProfile::Torque { .. } => OperationMode::Torque,
        }
    }

    /// The set-point object and its value.
    const fn target(&self) -> (Parameter, i64) {
        match *self {
            MotionProfile::Velocity { target, .. } => (Parameter::TargetVelocity, target as i64),
            MotionProfile::Position { target, .. } => (Parameter::TargetPosition, target as i64),
            MotionProfile::Current { target } => (Parameter::TargetCurrent, target as i64),
            MotionProfile::Torque { target } => (Parameter::TargetTorque, target as i64),
        }
    }

    const fn is_relative(&self) -> bool {
        matches!(
            self,
            MotionProfile::Position {
                kind: PositionKind::Relative,
                ..
            }
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MoveOptions {
    /// Block until the drive reports "target reached"
    pub wait: bool,
    /// Overrides [`DriveConfig::motion_timeout`](crate::config::DriveConfig::motion_timeout)
    pub timeout: Option<Duration>,
    /// Keep the move running this long before returning, counting the node's
    /// heartbeats meanwhile
    pub duration: Option<Duration>,
    /// Disable the drive once the move is done: after `duration` if given,
    /// otherwise once the target is reached
    pub disable_after: bool,
    /// Abort a running positioning in favour of the new set-point
    pub change_immediately: bool,
}

impl MoveOptions {
    pub fn wait() -> Self {
        MoveOptions {
            wait: true,
            ..Default::default()
        }
    }
}

/// Issues profile moves to one drive.
pub struct MotionController<N, C = SystemClock> {
    drive: Drive<N, C>,
}

impl<N: Network, C: Clock> MotionController<N, C> {
    pub fn new(drive: Drive<N, C>) -> Self {
        MotionController { drive }
    }

    pub fn drive(&self) -> &Drive<N, C> {
        &self.drive
    }

    pub fn into_drive(self) -> Drive<N, C> {
        self.drive
    }

    pub fn move_velocity(
        &self,
        target: i32,
        acceleration: u32,
        deceleration: u32,
        opts: MoveOptions,
    ) -> Result<DriveStatus, DriveError> {
        self.execute(
            MotionProfile::Velocity {
                target,
                acceleration,
                deceleration,
            },
            opts,
        )
    }

    pub fn move_position(
        &self,
        target: i32,
        profile_velocity: u32,
        kind: PositionKind,
        opts: MoveOptions,
    ) -> Result<DriveStatus, DriveError> {
        self.execute(
            MotionProfile::Position {
                target,
                profile_velocity,
                kind,
            },
            opts,
        )
    }

    pub fn move_current(&self, target: i16, opts: MoveOptions) -> Result<DriveStatus, DriveError> {
        self.execute(MotionProfile::Current { target }, opts)
    }

    pub fn move_torque(&self, target: i16, opts: MoveOptions) -> Result<DriveStatus, DriveError> {
        self.execute(MotionProfile::Torque { target }, opts)
    }

    /// Validates and starts `profile`.
    ///
    /// Returns the last status read, which is the "target reached" status if
    /// `opts.wait` is set and no `duration` follows.
    pub fn execute(
        &self,
        profile: MotionProfile,
        opts: MoveOptions,
    ) -> Result<DriveStatus, DriveError> {
        self.validate(&profile)?;

        let config = self.drive.config();
        let mode = profile.mode();
        if self.drive.mode()? != Some(mode) {
            self.drive.set_mode(mode, config.mode_timeout)?;
        }

        match profile {
            MotionProfile::Velocity {
                acceleration,
                deceleration,
                ..
            } => {
                self.write_if_changed(Parameter::ProfileAcceleration, acceleration.into())?;
                self.write_if_changed(Parameter::ProfileDeceleration, deceleration.into())?;
            }
            MotionProfile::Position {
                profile_velocity, ..
            } => {
                self.write_if_changed(Parameter::ProfileVelocity, profile_velocity.into())?;
            }
            MotionProfile::Current { .. } | MotionProfile::Torque { .. } => {}
        }
        let (parameter, target) = profile.target();
        self.drive.write(parameter, target)?;

        let mut status = self.drive.status()?;
        if status.state() != Some(PowerState::OperationEnabled) {
            status = self.drive.enable(config.enable_timeout)?;
        }

        self.trigger(&profile, opts)?;
        info!(node = %self.drive.node(), ?profile, "move started");

        if opts.wait || (opts.disable_after && opts.duration.is_none()) {
            status = self.wait_target_reached(opts.timeout.unwrap_or(config.motion_timeout))?;
        }
        if let Some(duration) = opts.duration {
            let heartbeats = self.drive.monitor(duration)?;
            info!(node = %self.drive.node(), heartbeats, "ran for {:?}", duration);
            status = self.drive.status()?;
        }
        if opts.disable_after {
            status = self.drive.disable(config.disable_timeout)?;
        }
        Ok(status)
    }

    /// Polls until the drive reports "target reached".
    pub fn wait_target_reached(&self, timeout: Duration) -> Result<DriveStatus, DriveError> {
        let reached = self.drive.poll_until(timeout, || {
            let status = self.drive.status()?;
            Ok(status.target_reached().then_some(status))
        })?;
        reached.ok_or(DriveError::MotionTimeout { timeout })
    }

    fn validate(&self, profile: &MotionProfile) -> Result<(), DriveError> {
        match *profile {
            MotionProfile::Velocity {
                target,
                acceleration,
                deceleration,
            } => {
                self.check_magnitude(
                    Parameter::TargetVelocity,
                    target.into(),
                    Parameter::MaxProfileVelocity,
                )?;
                self.check_magnitude(
                    Parameter::ProfileAcceleration,
                    acceleration.into(),
                    Parameter::MaxAcceleration,
                )?;
                self.check_magnitude(
                    Parameter::ProfileDeceleration,
                    deceleration.into(),
                    Parameter::MaxDeceleration,
                )?;
            }
            MotionProfile::Position {
                target,
                profile_velocity,
                kind,
            } => {
                self.check_magnitude(
                    Parameter::ProfileVelocity,
                    profile_velocity.into(),
                    Parameter::MaxProfileVelocity,
                )?;
                if kind == PositionKind::Absolute {
                    self.check_position(target.into())?;
                }
            }
            MotionProfile::Current { target } => {
                self.check_magnitude(
                    Parameter::TargetCurrent,
                    target.into(),
                    Parameter::MaxCurrent,
                )?;
            }
            MotionProfile::Torque { target } => {
                self.check_magnitude(
                    Parameter::TargetTorque,
                    target.into(),
                    Parameter::MaxTorque,
                )?;
            }
        }
        Ok(())
    }

    /// `|value| <= limit`, skipped if the drive does not implement the limit object.
    fn check_magnitude(
        &self,
        parameter: Parameter,
        value: i64,
        limit: Parameter,
    ) -> Result<(), DriveError> {
        let Some(max) = self.read_limit(limit)? else {
            return Ok(());
        };
        if value.abs() > max {
            return Err(DriveError::OutOfRange {
                parameter,
                value,
                min: -max,
                max,
            });
        }
        Ok(())
    }

    fn check_position(&self, target: i64) -> Result<(), DriveError> {
        let min = self.read_limit(Parameter::SoftwarePositionLimitMin)?;
        let max = self.read_limit(Parameter::SoftwarePositionLimitMax)?;
        let (Some(min), Some(max)) = (min, max) else {
            return Ok(());
        };
        // both zero: limits disabled
        if (min, max) == (0, 0) {
            return Ok(());
        }
        if !(min..=max).contains(&target) {
            return Err(DriveError::OutOfRange {
                parameter: Parameter::TargetPosition,
                value: target,
                min,
                max,
            });
        }
        Ok(())
    }

    fn read_limit(&self, limit: Parameter) -> Result<Option<i64>, DriveError> {
        match self.drive.read_i64(limit) {
            Ok(value) => Ok(Some(value)),
            Err(err)
                if matches!(
                    err.abort_code(),
                    Some(SDOAbortCode::ObjectDoesNotExist | SDOAbortCode::SubindexDoesNotExist)
                ) =>
            {
                debug!(node = %self.drive.node(), "{:?} not implemented, not checked", limit);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn write_if_changed(&self, parameter: Parameter, value: i64) -> Result<(), DriveError> {
        if self.drive.read_i64(parameter)? == value {
            return Ok(());
        }
        self.drive.write(parameter, value)
    }

    /// New set-point handshake: raise bit 4, optionally wait for the
    /// acknowledge, drop bit 4 again.
    fn trigger(&self, profile: &MotionProfile, opts: MoveOptions) -> Result<(), DriveError> {
        let drive = &self.drive;
        drive.write_control(setpoint_word(profile.is_relative(), opts.change_immediately))?;

        // only profile position acknowledges set-points
        if drive.config().wait_setpoint_ack && profile.mode() == OperationMode::Position {
            let timeout = opts.timeout.unwrap_or(drive.config().motion_timeout);
            let acknowledged = drive.poll_until(timeout, || {
                Ok(drive.status()?.setpoint_acknowledge().then_some(()))
            })?;
            acknowledged.ok_or(DriveError::MotionTimeout { timeout })?;
        }

        drive.write_control(ControlCommand::EnableOperation.word())
    }
}
