//! Object dictionary layout of a CiA 402 drive.
//!
//! Only the objects used by the drive state machine and the profile moves are listed.
//! Drives that deviate (most often the vendor specific current set-point) override
//! single entries with [`ObjectDictionary::with`](super::ObjectDictionary::with).

use super::{DataType, Variable};

/// Drive parameters the state machine and motion profiles address symbolically.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Parameter {
    ManufacturerDeviceName,
    ControlWord,
    StatusWord,
    ModesOfOperation,
    ModesOfOperationDisplay,
    TargetTorque,
    MaxTorque,
    MaxCurrent,
    TargetPosition,
    SoftwarePositionLimitMin,
    SoftwarePositionLimitMax,
    MaxProfileVelocity,
    ProfileVelocity,
    ProfileAcceleration,
    ProfileDeceleration,
    MaxAcceleration,
    MaxDeceleration,
    TargetVelocity,
    TargetCurrent,
}

impl Parameter {
    pub const ALL: [Parameter; 19] = [
        Parameter::ManufacturerDeviceName,
        Parameter::ControlWord,
        Parameter::StatusWord,
        Parameter::ModesOfOperation,
        Parameter::ModesOfOperationDisplay,
        Parameter::TargetTorque,
        Parameter::MaxTorque,
        Parameter::MaxCurrent,
        Parameter::TargetPosition,
        Parameter::SoftwarePositionLimitMin,
        Parameter::SoftwarePositionLimitMax,
        Parameter::MaxProfileVelocity,
        Parameter::ProfileVelocity,
        Parameter::ProfileAcceleration,
        Parameter::ProfileDeceleration,
        Parameter::MaxAcceleration,
        Parameter::MaxDeceleration,
        Parameter::TargetVelocity,
        Parameter::TargetCurrent,
    ];

    /// Symbolic name used as key in the object dictionary.
    pub const fn name(self) -> &'static str {
        self.default_variable().name
    }

    pub const fn default_variable(self) -> Variable {
        match self {
            Parameter::ManufacturerDeviceName => MANUFACTURER_DEVICE_NAME,
            Parameter::ControlWord => CONTROL_WORD,
            Parameter::StatusWord => STATUS_WORD,
            Parameter::ModesOfOperation => MODES_OF_OPERATION,
            Parameter::ModesOfOperationDisplay => MODES_OF_OPERATION_DISPLAY,
            Parameter::TargetTorque => TARGET_TORQUE,
            Parameter::MaxTorque => MAX_TORQUE,
            Parameter::MaxCurrent => MAX_CURRENT,
            Parameter::TargetPosition => TARGET_POSITION,
            Parameter::SoftwarePositionLimitMin => SOFTWARE_POSITION_LIMIT_MIN,
            Parameter::SoftwarePositionLimitMax => SOFTWARE_POSITION_LIMIT_MAX,
            Parameter::MaxProfileVelocity => MAX_PROFILE_VELOCITY,
            Parameter::ProfileVelocity => PROFILE_VELOCITY,
            Parameter::ProfileAcceleration => PROFILE_ACCELERATION,
            Parameter::ProfileDeceleration => PROFILE_DECELERATION,
            Parameter::MaxAcceleration => MAX_ACCELERATION,
            Parameter::MaxDeceleration => MAX_DECELERATION,
            Parameter::TargetVelocity => TARGET_VELOCITY,
            Parameter::TargetCurrent => TARGET_CURRENT,
        }
    }
}

pub const MANUFACTURER_DEVICE_NAME: Variable = Variable::string(
    "manufacturer device name",
    0x1008,
    0x00,
    DataType::VisibleString,
    64,
);
pub const CONTROL_WORD: Variable = Variable::new("control word", 0x6040, 0x00, DataType::UInt16);
pub const STATUS_WORD: Variable = Variable::new("status word", 0x6041, 0x00, DataType::UInt16);
pub const MODES_OF_OPERATION: Variable =
    Variable::new("modes of operation", 0x6060, 0x00, DataType::Int8);
pub const MODES_OF_OPERATION_DISPLAY: Variable =
    Variable::new("modes of operation display", 0x6061, 0x00, DataType::Int8);
pub const TARGET_TORQUE: Variable = Variable::new("target torque", 0x6071, 0x00, DataType::Int16);
pub const MAX_TORQUE: Variable = Variable::new("max torque", 0x6072, 0x00, DataType::UInt16);
pub const MAX_CURRENT: Variable = Variable::new("max current", 0x6073, 0x00, DataType::UInt16);
pub const TARGET_POSITION: Variable =
    Variable::new("target position", 0x607A, 0x00, DataType::Int32);
pub const SOFTWARE_POSITION_LIMIT_MIN: Variable =
    Variable::new("software position limit min", 0x607D, 0x01, DataType::Int32);
pub const SOFTWARE_POSITION_LIMIT_MAX: Variable =
    Variable::new("software position limit max", 0x607D, 0x02, DataType::Int32);
pub const MAX_PROFILE_VELOCITY: Variable =
    Variable::new("max profile velocity", 0x607F, 0x00, DataType::UInt32);
pub const PROFILE_VELOCITY: Variable =
    Variable::new("profile velocity", 0x6081, 0x00, DataType::UInt32);
pub const PROFILE_ACCELERATION: Variable =
    Variable::new("profile acceleration", 0x6083, 0x00, DataType::UInt32);
pub const PROFILE_DECELERATION: Variable =
    Variable::new("profile deceleration", 0x6084, 0x00, DataType::UInt32);
pub const MAX_ACCELERATION: Variable =
    Variable::new("max acceleration", 0x60C5, 0x00, DataType::UInt32);
pub const MAX_DECELERATION: Variable =
    Variable::new("max deceleration", 0x60C6, 0x00, DataType::UInt32);
pub const TARGET_VELOCITY: Variable =
    Variable::new("target velocity", 0x60FF, 0x00, DataType::Int32);
// vendor specific, 0x2030 on the drives this crate was first used with
pub const TARGET_CURRENT: Variable =
    Variable::new("target current", 0x2030, 0x00, DataType::Int16);
