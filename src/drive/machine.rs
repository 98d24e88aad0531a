use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::control::ControlCommand;
use super::status::{DriveStatus, PowerState};
use super::{DriveError, OperationMode};
use crate::clock::{Clock, Deadline, SystemClock};
use crate::config::{ConfigError, DriveConfig};
use crate::network::Network;
use crate::nmt::{self, NmtCommand, HEARTBEAT_BASE};
use crate::node::NodeId;
use crate::objectdictionary::{ObjectDictionary, Parameter, Value};
use crate::sdo::SdoClient;

/// A CiA 402 drive reached through its SDO server.
///
/// All operations block and poll the status word every
/// [`DriveConfig::poll_interval`] on the injected [`Clock`]. SDO timeouts
/// while polling count as a missed poll; aborts and malformed responses end
/// the operation immediately.
pub struct Drive<N, C = SystemClock> {
    sdo: SdoClient<N, C>,
    od: ObjectDictionary,
    config: DriveConfig,
    nmt_started: AtomicBool,
    last_state: Mutex<Option<PowerState>>,
}

impl<N: Network> Drive<N> {
    pub fn new(network: N, config: DriveConfig) -> Result<Self, DriveError> {
        Self::with_clock(network, SystemClock::new(), config)
    }
}

impl<N: Network, C: Clock> Drive<N, C> {
    pub fn with_clock(network: N, clock: C, config: DriveConfig) -> Result<Self, DriveError> {
        config.validate()?;
        let node = config.node().map_err(ConfigError::from)?;
        Ok(Drive {
            sdo: SdoClient::with_clock(node, network, clock),
            od: ObjectDictionary::cia402(),
            config,
            nmt_started: AtomicBool::new(false),
            last_state: Mutex::new(None),
        })
    }

    /// Replaces the default CiA 402 object layout.
    pub fn with_dictionary(mut self, od: ObjectDictionary) -> Self {
        self.od = od;
        self
    }

    pub fn node(&self) -> NodeId {
        self.sdo.node()
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &ObjectDictionary {
        &self.od
    }

    pub fn sdo(&self) -> &SdoClient<N, C> {
        &self.sdo
    }

    pub(crate) fn clock(&self) -> &C {
        self.sdo.clock()
    }

    pub fn mode_code(&self, mode: OperationMode) -> i8 {
        mode.code(self.config.current_mode_code)
    }

    pub fn read(&self, parameter: Parameter) -> Result<Value, DriveError> {
        let entry = self.od.entry(parameter)?;
        Ok(self.sdo.read_value(entry, self.config.sdo_timeout)?)
    }

    pub fn read_i64(&self, parameter: Parameter) -> Result<i64, DriveError> {
        self.read(parameter)?
            .as_i64()
            .ok_or(DriveError::NotNumeric { parameter })
    }

    /// Writes `raw` converted to the entry's data type.
    pub fn write(&self, parameter: Parameter, raw: i64) -> Result<(), DriveError> {
        let entry = self.od.entry(parameter)?;
        let (min, max) = entry
            .data_type
            .range()
            .ok_or(DriveError::NotNumeric { parameter })?;
        let value = Value::from_i64(entry.data_type, raw).ok_or(DriveError::OutOfRange {
            parameter,
            value: raw,
            min,
            max,
        })?;
        Ok(self.sdo.write_value(entry, &value, self.config.sdo_timeout)?)
    }

    pub fn write_control(&self, word: u16) -> Result<(), DriveError> {
        debug!(node = %self.node(), "control word 0x{:04X}", word);
        self.write(Parameter::ControlWord, word.into())
    }

    /// Reads and decodes the status word.
    pub fn status(&self) -> Result<DriveStatus, DriveError> {
        let status = match self.read(Parameter::StatusWord)? {
            Value::U16(word) => DriveStatus::from_word(word),
            _ => {
                return Err(DriveError::NotNumeric {
                    parameter: Parameter::StatusWord,
                })
            }
        };
        let state = status.state();
        let mut last_state = self.last_state.lock();
        if *last_state != state {
            info!(node = %self.node(), "power state {:?} -> {:?}", *last_state, state);
            *last_state = state;
        }
        Ok(status)
    }

    /// Power state seen by the most recent status read.
    pub fn last_state(&self) -> Option<PowerState> {
        *self.last_state.lock()
    }

    /// Brings the drive to OperationEnabled, resetting a fault first.
    pub fn enable(&self, timeout: Duration) -> Result<DriveStatus, DriveError> {
        self.start_node()?;

        let mut last = None;
        let mut last_command = None;
        let enabled = self.poll_until(timeout, || {
            let status = self.status()?;
            let Some(state) = status.state() else {
                return Ok(None);
            };
            last = Some(state);
            let command = match state {
                PowerState::OperationEnabled => return Ok(Some(status)),
                // a reset that did not clear the fault needs a new rising edge
                PowerState::Fault if last_command == Some(ControlCommand::FaultReset) => {
                    ControlCommand::DisableVoltage
                }
                state => match ControlCommand::towards_operation(state) {
                    Some(command) => command,
                    None => return Ok(None),
                },
            };
            self.write_control(command.word())?;
            last_command = Some(command);
            Ok(None)
        })?;
        enabled.ok_or(DriveError::EnableTimeout { timeout, last })
    }

    /// Brings the drive to SwitchOnDisabled, resetting a fault first.
    pub fn disable(&self, timeout: Duration) -> Result<DriveStatus, DriveError> {
        let mut last = None;
        let mut last_command = None;
        let disabled = self.poll_until(timeout, || {
            let status = self.status()?;
            let Some(state) = status.state() else {
                return Ok(None);
            };
            last = Some(state);
            let command = match state {
                PowerState::SwitchOnDisabled => return Ok(Some(status)),
                PowerState::NotReadyToSwitchOn | PowerState::FaultReactionActive => {
                    return Ok(None)
                }
                PowerState::Fault if last_command == Some(ControlCommand::FaultReset) => {
                    ControlCommand::DisableVoltage
                }
                PowerState::Fault => ControlCommand::FaultReset,
                _ => ControlCommand::DisableVoltage,
            };
            self.write_control(command.word())?;
            last_command = Some(command);
            Ok(None)
        })?;
        disabled.ok_or(DriveError::DisableTimeout { timeout, last })
    }

    /// Stops the drive with its quick stop ramp.
    pub fn quick_stop(&self, timeout: Duration) -> Result<DriveStatus, DriveError> {
        let mut last = None;
        let mut sent = false;
        let stopped = self.poll_until(timeout, || {
            let status = self.status()?;
            last = status.state();
            match status.state() {
                Some(PowerState::QuickStopActive | PowerState::SwitchOnDisabled) => {
                    return Ok(Some(status))
                }
                Some(PowerState::Fault | PowerState::FaultReactionActive) => {}
                _ if !sent => {
                    self.write_control(ControlCommand::QuickStop.word())?;
                    sent = true;
                }
                _ => {}
            }
            Ok(None)
        })?;
        stopped.ok_or(DriveError::QuickStopTimeout { timeout, last })
    }

    /// Selects `mode` and waits until the drive reports it in 0x6061.
    pub fn set_mode(&self, mode: OperationMode, timeout: Duration) -> Result<(), DriveError> {
        let code = self.mode_code(mode);
        self.write(Parameter::ModesOfOperation, code.into())?;

        let mut actual = None;
        let accepted = self.poll_until(timeout, || {
            let display = self.read_i64(Parameter::ModesOfOperationDisplay)?;
            actual = i8::try_from(display).ok();
            Ok((display == i64::from(code)).then_some(()))
        })?;
        match accepted {
            Some(()) => {
                info!(node = %self.node(), "mode of operation: {}", mode);
                Ok(())
            }
            None => Err(DriveError::ModeRejected {
                requested: mode,
                actual,
            }),
        }
    }

    /// Mode reported by the drive, `None` for codes outside [`OperationMode`].
    pub fn mode(&self) -> Result<Option<OperationMode>, DriveError> {
        let display = self.read_i64(Parameter::ModesOfOperationDisplay)?;
        Ok(i8::try_from(display)
            .ok()
            .and_then(|code| OperationMode::from_code(code, self.config.current_mode_code)))
    }

    /// Manufacturer device name (0x1008), usually a segmented upload.
    pub fn device_name(&self) -> Result<String, DriveError> {
        let name = self.read(Parameter::ManufacturerDeviceName)?.to_bytes();
        Ok(String::from_utf8_lossy(&name)
            .trim_end_matches('\0')
            .to_owned())
    }

    /// Listens to the bus for `duration` and counts the node's heartbeats.
    pub fn monitor(&self, duration: Duration) -> Result<usize, DriveError> {
        let clock = self.clock();
        let deadline = Deadline::after(clock, duration);
        let heartbeat_id = HEARTBEAT_BASE + self.node().raw() as u16;
        let mut heartbeats = 0;
        while !deadline.expired(clock) {
            let frame = self
                .sdo
                .network()
                .receive_frame(heartbeat_id, deadline.remaining(clock))?;
            if let Some(frame) = frame {
                trace!(node = %self.node(), "heartbeat {}", frame);
                heartbeats += 1;
            }
        }
        debug!(node = %self.node(), heartbeats, "monitored for {:?}", duration);
        Ok(heartbeats)
    }

    fn start_node(&self) -> Result<(), DriveError> {
        if !self.config.nmt_start || self.nmt_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = nmt::send_command(
            self.sdo.network(),
            NmtCommand::StartRemoteNode,
            Some(self.node()),
        );
        if result.is_err() {
            self.nmt_started.store(false, Ordering::Release);
        }
        Ok(result?)
    }

    /// Runs `step` every poll interval until it yields a value.
    ///
    /// Returns `Ok(None)` once the deadline or the poll limit is reached.
    pub(crate) fn poll_until<T>(
        &self,
        timeout: Duration,
        mut step: impl FnMut() -> Result<Option<T>, DriveError>,
    ) -> Result<Option<T>, DriveError> {
        let clock = self.clock();
        let deadline = Deadline::after(clock, timeout);
        let mut polls = 0;
        loop {
            polls += 1;
            match step() {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(DriveError::Sdo(err)) if err.is_timeout() => {
                    warn!(node = %self.node(), "poll {} failed: {}", polls, err);
                }
                Err(err) => return Err(err),
            }
            if deadline.expired(clock) || self.config.max_polls.is_some_and(|max| polls >= max) {
                return Ok(None);
            }
            clock.sleep(self.config.poll_interval.min(deadline.remaining(clock)));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::CanOpenFrame;
    use crate::network::NetworkError;

    struct Unplugged;

    impl Network for Unplugged {
        fn send_frame(&self, _frame: &CanOpenFrame) -> Result<(), NetworkError> {
            Err(NetworkError::BusOff)
        }

        fn receive_frame(
            &self,
            _cob_id: u16,
            _timeout: Duration,
        ) -> Result<Option<CanOpenFrame>, NetworkError> {
            Err(NetworkError::BusOff)
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DriveConfig {
            node_id: 200,
            ..Default::default()
        };
        assert!(matches!(
            Drive::new(Unplugged, config),
            Err(DriveError::Config(_))
        ));
    }

    #[test]
    fn test_network_error_propagates() {
        let drive = Drive::new(Unplugged, DriveConfig::default()).unwrap();
        assert_eq!(
            drive.status().unwrap_err(),
            DriveError::Sdo(NetworkError::BusOff.into())
        );
        assert_eq!(drive.last_state(), None);
        assert_eq!(
            drive.monitor(Duration::from_millis(10)),
            Err(DriveError::Network(NetworkError::BusOff))
        );
    }

    #[test]
    fn test_write_checks_type_range() {
        let drive = Drive::new(Unplugged, DriveConfig::default()).unwrap();
        assert_eq!(
            drive.write(Parameter::ModesOfOperation, 300),
            Err(DriveError::OutOfRange {
                parameter: Parameter::ModesOfOperation,
                value: 300,
                min: -128,
                max: 127,
            })
        );
        assert_eq!(
            drive.write(Parameter::ManufacturerDeviceName, 1),
            Err(DriveError::NotNumeric {
                parameter: Parameter::ManufacturerDeviceName
            })
        );
    }
}
