//! CiA 402 device control of a single drive.
//!
//! [`Drive`] walks the power state machine over SDO: it reads the status
//! word, decides on the next control word and polls until the drive reports
//! the requested state or the deadline passes.

pub use control::ControlCommand;
pub use machine::Drive;
pub use status::{DriveStatus, PowerState};

pub mod control;
mod machine;
pub mod status;

use core::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::network::NetworkError;
use crate::objectdictionary::{ODError, Parameter};
use crate::sdo::SdoError;

/// Modes of operation (0x6060) the drive can be switched to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperationMode {
    Position,
    Velocity,
    Torque,
    Current,
}

impl OperationMode {
    /// Standard code of the mode. Current control has no CiA 402 code, see
    /// [`DriveConfig::current_mode_code`](crate::config::DriveConfig::current_mode_code).
    pub const fn code(self, current_mode_code: i8) -> i8 {
        match self {
            OperationMode::Position => 1,
            OperationMode::Velocity => 3,
            OperationMode::Torque => 4,
            OperationMode::Current => current_mode_code,
        }
    }

    pub const fn from_code(code: i8, current_mode_code: i8) -> Option<Self> {
        match code {
            1 => Some(OperationMode::Position),
            3 => Some(OperationMode::Velocity),
            4 => Some(OperationMode::Torque),
            code if code == current_mode_code => Some(OperationMode::Current),
            _ => None,
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationMode::Position => "profile position",
            OperationMode::Velocity => "profile velocity",
            OperationMode::Torque => "profile torque",
            OperationMode::Current => "current",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriveError {
    #[error(transparent)]
    Sdo(#[from] SdoError),
    /// Failure outside an SDO transfer: NMT commands, bus monitoring.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown parameter: {0}")]
    UnknownParameter(#[from] ODError),
    #[error("{parameter:?} = {value} is outside {min}..={max}")]
    OutOfRange {
        parameter: Parameter,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("{parameter:?} holds a non numeric value")]
    NotNumeric { parameter: Parameter },
    #[error("drive did not accept mode {requested}, reports {actual:?}")]
    ModeRejected {
        requested: OperationMode,
        actual: Option<i8>,
    },
    #[error("drive not enabled within {timeout:?}, last state {last:?}")]
    EnableTimeout {
        timeout: Duration,
        last: Option<PowerState>,
    },
    #[error("drive not disabled within {timeout:?}, last state {last:?}")]
    DisableTimeout {
        timeout: Duration,
        last: Option<PowerState>,
    },
    #[error("quick stop not confirmed within {timeout:?}, last state {last:?}")]
    QuickStopTimeout {
        timeout: Duration,
        last: Option<PowerState>,
    },
    #[error("target not reached within {timeout:?}")]
    MotionTimeout { timeout: Duration },
}

impl DriveError {
    /// Abort code if an SDO transfer was aborted by the drive.
    pub fn abort_code(&self) -> Option<crate::sdo::SDOAbortCode> {
        match self {
            DriveError::Sdo(err) => err.abort_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mode_codes() {
        assert_eq!(OperationMode::Velocity.code(6), 3);
        assert_eq!(OperationMode::Current.code(-3), -3);
        assert_eq!(OperationMode::from_code(1, 6), Some(OperationMode::Position));
        assert_eq!(OperationMode::from_code(6, 6), Some(OperationMode::Current));
        assert_eq!(OperationMode::from_code(6, -3), None);
    }

    #[test]
    fn test_error_display() {
        let err = DriveError::OutOfRange {
            parameter: Parameter::TargetVelocity,
            value: 5000,
            min: -3000,
            max: 3000,
        };
        assert_eq!(err.to_string(), "TargetVelocity = 5000 is outside -3000..=3000");
        let err = DriveError::ModeRejected {
            requested: OperationMode::Torque,
            actual: Some(3),
        };
        assert_eq!(
            err.to_string(),
            "drive did not accept mode profile torque, reports Some(3)"
        );
    }
}
