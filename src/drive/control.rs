use super::status::PowerState;

/// Control word bits, object 0x6040.
pub mod bits {
    pub const SWITCH_ON: u16 = 1 << 0;
    pub const ENABLE_VOLTAGE: u16 = 1 << 1;
    pub const QUICK_STOP: u16 = 1 << 2;
    pub const ENABLE_OPERATION: u16 = 1 << 3;
    /// Profile position: latch a new set-point on the rising edge
    pub const NEW_SETPOINT: u16 = 1 << 4;
    /// Profile position: abort the current positioning for the new set-point
    pub const CHANGE_SET_IMMEDIATELY: u16 = 1 << 5;
    /// Profile position: target is relative to the current target
    pub const RELATIVE: u16 = 1 << 6;
    pub const FAULT_RESET: u16 = 1 << 7;
    pub const HALT: u16 = 1 << 8;
}

/// Device control commands of the CiA 402 state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ControlCommand {
    DisableVoltage,
    QuickStop,
    Shutdown,
    SwitchOn,
    EnableOperation,
    FaultReset,
}

impl ControlCommand {
    pub const fn word(self) -> u16 {
        use bits::*;
        match self {
            ControlCommand::DisableVoltage => 0x00,
            ControlCommand::QuickStop => ENABLE_VOLTAGE,
            ControlCommand::Shutdown => ENABLE_VOLTAGE | QUICK_STOP,
            ControlCommand::SwitchOn => SWITCH_ON | ENABLE_VOLTAGE | QUICK_STOP,
            ControlCommand::EnableOperation => {
                SWITCH_ON | ENABLE_VOLTAGE | QUICK_STOP | ENABLE_OPERATION
            }
            ControlCommand::FaultReset => FAULT_RESET,
        }
    }

    /// Next command on the way from `state` to OperationEnabled.
    ///
    /// `None` while the drive moves on by itself (or is already there).
    pub const fn towards_operation(state: PowerState) -> Option<ControlCommand> {
        match state {
            PowerState::SwitchOnDisabled => Some(ControlCommand::Shutdown),
            PowerState::ReadyToSwitchOn => Some(ControlCommand::SwitchOn),
            PowerState::SwitchedOn => Some(ControlCommand::EnableOperation),
            PowerState::QuickStopActive => Some(ControlCommand::DisableVoltage),
            PowerState::Fault => Some(ControlCommand::FaultReset),
            PowerState::NotReadyToSwitchOn
            | PowerState::FaultReactionActive
            | PowerState::OperationEnabled => None,
        }
    }
}

/// Control word latching a new set-point while operation stays enabled.
pub const fn setpoint_word(relative: bool, change_immediately: bool) -> u16 {
    let mut word = ControlCommand::EnableOperation.word() | bits::NEW_SETPOINT;
    if relative {
        word |= bits::RELATIVE;
    }
    if change_immediately {
        word |= bits::CHANGE_SET_IMMEDIATELY;
    }
    word
}
