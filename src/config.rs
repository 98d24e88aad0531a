use std::time::Duration;

use thiserror::Error;

use crate::node::{InvalidNodeId, NodeId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    NodeId(#[from] InvalidNodeId),
    #[error("{0} must not be zero")]
    Zero(&'static str),
    #[error("poll interval {interval:?} exceeds {field} {timeout:?}")]
    PollInterval {
        field: &'static str,
        interval: Duration,
        timeout: Duration,
    },
}

/// Static settings of one drive session.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriveConfig {
    /// Node id of the drive (1..=127)
    pub node_id: u8,
    /// Timeout of a single SDO frame exchange
    pub sdo_timeout: Duration,
    /// Delay between two status word polls
    pub poll_interval: Duration,
    /// Upper bound on status word polls per operation, on top of the deadline
    pub max_polls: Option<u32>,
    pub enable_timeout: Duration,
    pub disable_timeout: Duration,
    pub mode_timeout: Duration,
    pub motion_timeout: Duration,
    /// Send NMT "start remote node" before the first enable
    pub nmt_start: bool,
    /// Wait for the set-point acknowledge bit before clearing "new set-point"
    pub wait_setpoint_ack: bool,
    /// Modes of operation value selecting current control (vendor specific)
    pub current_mode_code: i8,
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            node_id: 127,
            sdo_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(10),
            max_polls: None,
            enable_timeout: Duration::from_secs(5),
            disable_timeout: Duration::from_secs(5),
            mode_timeout: Duration::from_secs(1),
            motion_timeout: Duration::from_secs(30),
            nmt_start: false,
            wait_setpoint_ack: true,
            current_mode_code: 6,
        }
    }
}

impl DriveConfig {
    pub fn node(&self) -> Result<NodeId, InvalidNodeId> {
        NodeId::new(self.node_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.node()?;
        if self.sdo_timeout.is_zero() {
            return Err(ConfigError::Zero("sdo_timeout"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Zero("poll_interval"));
        }
        if self.max_polls == Some(0) {
            return Err(ConfigError::Zero("max_polls"));
        }
        for (field, timeout) in [
            ("enable_timeout", self.enable_timeout),
            ("disable_timeout", self.disable_timeout),
            ("mode_timeout", self.mode_timeout),
            ("motion_timeout", self.motion_timeout),
        ] {
            if self.poll_interval > timeout {
                return Err(ConfigError::PollInterval {
                    field,
                    interval: self.poll_interval,
                    timeout,
                });
            }
        }
        Ok(())
    }
}
