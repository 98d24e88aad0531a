use core::fmt;

/// Power states of the CiA 402 device control state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PowerState {
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActive,
    Fault,
}

impl PowerState {
    /// Decodes the state bits of a status word, `None` for reserved patterns.
    pub const fn from_status_word(word: u16) -> Option<Self> {
        // states are identified by bits 0-3, 5 and 6 under two different masks
        let state = if word & 0x4F == 0x00 {
            PowerState::NotReadyToSwitchOn
        } else if word & 0x4F == 0x40 {
            PowerState::SwitchOnDisabled
        } else if word & 0x6F == 0x21 {
            PowerState::ReadyToSwitchOn
        } else if word & 0x6F == 0x23 {
            PowerState::SwitchedOn
        } else if word & 0x6F == 0x27 {
            PowerState::OperationEnabled
        } else if word & 0x6F == 0x07 {
            PowerState::QuickStopActive
        } else if word & 0x4F == 0x0F {
            PowerState::FaultReactionActive
        } else if word & 0x4F == 0x08 {
            PowerState::Fault
        } else {
            return None;
        };
        Some(state)
    }

    /// State bits a device reports in this state.
    pub const fn status_bits(self) -> u16 {
        match self {
            PowerState::NotReadyToSwitchOn => 0x00,
            PowerState::SwitchOnDisabled => 0x40,
            PowerState::ReadyToSwitchOn => 0x21,
            PowerState::SwitchedOn => 0x23,
            PowerState::OperationEnabled => 0x27,
            PowerState::QuickStopActive => 0x07,
            PowerState::FaultReactionActive => 0x0F,
            PowerState::Fault => 0x08,
        }
    }

    pub const fn is_fault(self) -> bool {
        matches!(self, PowerState::Fault | PowerState::FaultReactionActive)
    }
}

/// Decoded status word (0x6041) as read from the drive.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct DriveStatus(u16);

impl DriveStatus {
    const READY_TO_SWITCH_ON: u16 = 1 << 0;
    const SWITCHED_ON: u16 = 1 << 1;
    const OPERATION_ENABLED: u16 = 1 << 2;
    const FAULT: u16 = 1 << 3;
    const VOLTAGE_ENABLED: u16 = 1 << 4;
    const QUICK_STOP: u16 = 1 << 5;
    const SWITCH_ON_DISABLED: u16 = 1 << 6;
    const WARNING: u16 = 1 << 7;
    const REMOTE: u16 = 1 << 9;
    const TARGET_REACHED: u16 = 1 << 10;
    const INTERNAL_LIMIT_ACTIVE: u16 = 1 << 11;
    const SETPOINT_ACKNOWLEDGE: u16 = 1 << 12;

    pub const fn from_word(word: u16) -> Self {
        DriveStatus(word)
    }

    pub const fn word(self) -> u16 {
        self.0
    }

    /// Power state, `None` if the drive reports a reserved bit pattern.
    pub const fn state(self) -> Option<PowerState> {
        PowerState::from_status_word(self.0)
    }

    pub const fn ready_to_switch_on(self) -> bool {
        self.0 & Self::READY_TO_SWITCH_ON != 0
    }
    pub const fn switched_on(self) -> bool {
        self.0 & Self::SWITCHED_ON != 0
    }
    pub const fn operation_enabled(self) -> bool {
        self.0 & Self::OPERATION_ENABLED != 0
    }
    pub const fn fault(self) -> bool {
        self.0 & Self::FAULT != 0
    }
    pub const fn voltage_enabled(self) -> bool {
        self.0 & Self::VOLTAGE_ENABLED != 0
    }
    /// Low active: `false` while a quick stop is in progress.
    pub const fn quick_stop(self) -> bool {
        self.0 & Self::QUICK_STOP != 0
    }
    pub const fn switch_on_disabled(self) -> bool {
        self.0 & Self::SWITCH_ON_DISABLED != 0
    }
    pub const fn warning(self) -> bool {
        self.0 & Self::WARNING != 0
    }
    pub const fn remote(self) -> bool {
        self.0 & Self::REMOTE != 0
    }
    pub const fn target_reached(self) -> bool {
        self.0 & Self::TARGET_REACHED != 0
    }
    pub const fn internal_limit_active(self) -> bool {
        self.0 & Self::INTERNAL_LIMIT_ACTIVE != 0
    }
    /// Profile position mode only
    pub const fn setpoint_acknowledge(self) -> bool {
        self.0 & Self::SETPOINT_ACKNOWLEDGE != 0
    }
}

impl fmt::Debug for DriveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveStatus")
            .field("word", &format_args!("0x{:04X}", self.0))
            .field("state", &self.state())
            .field("voltage_enabled", &self.voltage_enabled())
            .field("warning", &self.warning())
            .field("remote", &self.remote())
            .field("target_reached", &self.target_reached())
            .finish()
    }
}
