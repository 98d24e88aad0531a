use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use embedded_can::Frame;
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::ManualClock;
use crate::drive::control::bits;
use crate::drive::PowerState;
use crate::frame::CanOpenFrame;
use crate::network::{Network, NetworkError};
use crate::nmt::{HEARTBEAT_BASE, NMT_REQUEST_ID};
use crate::node::NodeId;
use crate::objectdictionary::cia402::*;
use crate::objectdictionary::{DataType, Value, Variable};
use crate::sdo::{
    ObjectStore, SDOAbortCode, SdoServer, COMMAND_SPECIFIER_MASK, EXPEDITED, REQUEST_ABORTED,
    REQUEST_DOWNLOAD, REQUEST_SEGMENT_DOWNLOAD, REQUEST_SEGMENT_UPLOAD, REQUEST_UPLOAD,
    RESPONSE_ABORTED, RESPONSE_UPLOAD, SDO_REQUEST_BASE, SDO_RESPONSE_BASE, SIZE_SPECIFIED,
    TOGGLE_BIT,
};

const REMOTE: u16 = 1 << 9;
const VOLTAGE_ENABLED: u16 = 1 << 4;
const TARGET_REACHED: u16 = 1 << 10;
const SETPOINT_ACKNOWLEDGE: u16 = 1 << 12;

const NMT_OPERATIONAL: u8 = 0x05;

pub const DEVICE_NAME: &str = "Simulated CiA 402 drive";

struct Object {
    data_type: DataType,
    data: Vec<u8>,
    writable: bool,
}

/// Object dictionary and CiA 402 state machine of the simulated device.
struct Device {
    objects: BTreeMap<(u16, u8), Object>,
    aborts: HashMap<(u16, u8), SDOAbortCode>,
    state: PowerState,
    last_control: u16,
    control_words: Vec<u16>,
    // fault resets that leave the fault in place
    sticky_resets: u32,
    accept_modes: bool,
    boot_polls: u32,
    setpoint_acknowledged: bool,
    target_reached: bool,
    // status reads until the target is reached, `None` never
    motion_polls: Option<u32>,
    polls_left: u32,
}

impl Device {
    fn new() -> Self {
        let mut device = Device {
            objects: BTreeMap::new(),
            aborts: HashMap::new(),
            state: PowerState::SwitchOnDisabled,
            last_control: 0,
            control_words: Vec::new(),
            sticky_resets: 0,
            accept_modes: true,
            boot_polls: 0,
            setpoint_acknowledged: false,
            target_reached: true,
            motion_polls: Some(2),
            polls_left: 0,
        };
        let defaults = [
            (CONTROL_WORD, Value::U16(0)),
            (MODES_OF_OPERATION, Value::I8(0)),
            (TARGET_TORQUE, Value::I16(0)),
            (MAX_TORQUE, Value::U16(1000)),
            (MAX_CURRENT, Value::U16(2000)),
            (TARGET_POSITION, Value::I32(0)),
            (SOFTWARE_POSITION_LIMIT_MIN, Value::I32(0)),
            (SOFTWARE_POSITION_LIMIT_MAX, Value::I32(0)),
            (MAX_PROFILE_VELOCITY, Value::U32(3000)),
            (PROFILE_VELOCITY, Value::U32(0)),
            (PROFILE_ACCELERATION, Value::U32(0)),
            (PROFILE_DECELERATION, Value::U32(0)),
            (MAX_ACCELERATION, Value::U32(10_000)),
            (MAX_DECELERATION, Value::U32(10_000)),
            (TARGET_VELOCITY, Value::I32(0)),
            (TARGET_CURRENT, Value::I16(0)),
        ];
        for (variable, value) in defaults {
            device.insert(&variable, value.to_bytes(), true);
        }
        device.insert(&STATUS_WORD, vec![0; 2], false);
        device.insert(&MODES_OF_OPERATION_DISPLAY, vec![0], false);
        device.insert(
            &MANUFACTURER_DEVICE_NAME,
            DEVICE_NAME.as_bytes().to_vec(),
            false,
        );
        device
    }

    fn insert(&mut self, variable: &Variable, data: Vec<u8>, writable: bool) {
        self.objects.insert(
            (variable.index, variable.subindex),
            Object {
                data_type: variable.data_type,
                data,
                writable,
            },
        );
    }

    fn object(&self, index: u16, subindex: u8) -> Result<&Object, SDOAbortCode> {
        if let Some(code) = self.aborts.get(&(index, subindex)) {
            return Err(*code);
        }
        match self.objects.get(&(index, subindex)) {
            Some(object) => Ok(object),
            None if self.objects.range((index, 0)..=(index, u8::MAX)).next().is_some() => {
                Err(SDOAbortCode::SubindexDoesNotExist)
            }
            None => Err(SDOAbortCode::ObjectDoesNotExist),
        }
    }

    fn status_word(&mut self) -> u16 {
        match self.state {
            PowerState::NotReadyToSwitchOn if self.boot_polls == 0 => {
                self.state = PowerState::SwitchOnDisabled;
            }
            PowerState::NotReadyToSwitchOn => self.boot_polls -= 1,
            PowerState::FaultReactionActive => self.state = PowerState::Fault,
            PowerState::OperationEnabled if !self.target_reached => {
                if self.motion_polls.is_some() {
                    if self.polls_left == 0 {
                        self.target_reached = true;
                    } else {
                        self.polls_left -= 1;
                    }
                }
            }
            _ => {}
        }

        let mut word = self.state.status_bits() | REMOTE;
        if matches!(
            self.state,
            PowerState::ReadyToSwitchOn
                | PowerState::SwitchedOn
                | PowerState::OperationEnabled
                | PowerState::QuickStopActive
        ) {
            word |= VOLTAGE_ENABLED;
        }
        if self.target_reached {
            word |= TARGET_REACHED;
        }
        if self.setpoint_acknowledged {
            word |= SETPOINT_ACKNOWLEDGE;
        }
        word
    }

    fn control(&mut self, word: u16) {
        self.control_words.push(word);
        let rising = word & !self.last_control;
        self.last_control = word;

        let next = match self.state {
            PowerState::Fault if rising & bits::FAULT_RESET != 0 => {
                if self.sticky_resets > 0 {
                    self.sticky_resets -= 1;
                    PowerState::Fault
                } else {
                    PowerState::SwitchOnDisabled
                }
            }
            PowerState::Fault | PowerState::FaultReactionActive | PowerState::NotReadyToSwitchOn => {
                self.state
            }
            _ if word & bits::FAULT_RESET != 0 => self.state,
            state => next_state(state, word),
        };
        if next != self.state {
            trace!("simulated drive {:?} -> {:?}", self.state, next);
        }
        self.state = next;

        if self.state != PowerState::OperationEnabled || word & bits::NEW_SETPOINT == 0 {
            self.setpoint_acknowledged = false;
        } else if rising & bits::NEW_SETPOINT != 0 {
            self.setpoint_acknowledged = true;
            self.target_reached = false;
            self.polls_left = self.motion_polls.unwrap_or(0);
        }
    }
}

/// Device control transitions of CiA 402 for a non fault state.
fn next_state(state: PowerState, word: u16) -> PowerState {
    use PowerState::*;

    let enable_voltage = word & bits::ENABLE_VOLTAGE != 0;
    let quick_stop = word & bits::QUICK_STOP != 0;
    let switch_on = word & bits::SWITCH_ON != 0;
    let enable_operation = word & bits::ENABLE_OPERATION != 0;

    if !enable_voltage {
        return SwitchOnDisabled;
    }
    if !quick_stop {
        return match state {
            OperationEnabled | QuickStopActive => QuickStopActive,
            _ => SwitchOnDisabled,
        };
    }
    match (state, switch_on, enable_operation) {
        (SwitchOnDisabled | SwitchedOn | OperationEnabled, false, _) => ReadyToSwitchOn,
        (ReadyToSwitchOn | OperationEnabled, true, false) => SwitchedOn,
        (SwitchedOn | QuickStopActive, true, true) => OperationEnabled,
        (state, _, _) => state,
    }
}

impl ObjectStore for Device {
    fn size_hint(&self, index: u16, subindex: u8) -> Result<Option<usize>, SDOAbortCode> {
        Ok(self.object(index, subindex)?.data_type.width())
    }

    fn read(&mut self, index: u16, subindex: u8) -> Result<Vec<u8>, SDOAbortCode> {
        let data = self.object(index, subindex)?.data.clone();
        if (index, subindex) == (STATUS_WORD.index, STATUS_WORD.subindex) {
            return Ok(self.status_word().to_le_bytes().to_vec());
        }
        Ok(data)
    }

    fn write(&mut self, index: u16, subindex: u8, data: &[u8]) -> Result<(), SDOAbortCode> {
        if !self.object(index, subindex)?.writable {
            return Err(SDOAbortCode::ReadOnlyError);
        }
        if (index, subindex) == (CONTROL_WORD.index, CONTROL_WORD.subindex) {
            let word = u16::from_le_bytes(data.try_into().map_err(|_| SDOAbortCode::TooLong)?);
            self.control(word);
        }
        if (index, subindex) == (MODES_OF_OPERATION.index, MODES_OF_OPERATION.subindex)
            && self.accept_modes
        {
            let display = (MODES_OF_OPERATION_DISPLAY.index, MODES_OF_OPERATION_DISPLAY.subindex);
            if let Some(object) = self.objects.get_mut(&display) {
                object.data = data.to_vec();
            }
        }
        if let Some(object) = self.objects.get_mut(&(index, subindex)) {
            object.data = data.to_vec();
        }
        Ok(())
    }
}

struct Inner {
    server: SdoServer,
    device: Device,
    // frames waiting for the client
    rx: VecDeque<CanOpenFrame>,
    // every frame the client sent
    sent: Vec<CanOpenFrame>,
    awaiting_response: bool,
    overlapping_requests: usize,
    silent: bool,
    hide_upload_size: bool,
    // segment responses (either direction) since the hooks were set, 1 based
    segments: usize,
    corrupt_segment: Option<usize>,
    drop_segment: Option<usize>,
}

/// A CiA 402 drive behind an in-memory CAN bus.
///
/// Implements [`Network`] so it can be handed to an [`SdoClient`](crate::sdo::SdoClient)
/// or a [`Drive`](crate::drive::Drive) directly (wrap it in an `Arc` or pass a
/// reference to keep access for inspection). Requests are answered by a
/// [`SdoServer`] synchronously; the response is queued until the client receives it.
///
/// A receive finding no frame with the requested COB-ID advances the shared
/// [`ManualClock`] by the full receive timeout. Frames with other ids stay queued.
pub struct SimulatedDrive {
    node: NodeId,
    clock: ManualClock,
    inner: Mutex<Inner>,
}

impl SimulatedDrive {
    pub fn new(node: NodeId, clock: ManualClock) -> Self {
        SimulatedDrive {
            node,
            clock,
            inner: Mutex::new(Inner {
                server: SdoServer::new(),
                device: Device::new(),
                rx: VecDeque::new(),
                sent: Vec::new(),
                awaiting_response: false,
                overlapping_requests: 0,
                silent: false,
                hide_upload_size: false,
                segments: 0,
                corrupt_segment: None,
                drop_segment: None,
            }),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn state(&self) -> PowerState {
        self.inner.lock().device.state
    }

    pub fn set_state(&self, state: PowerState) {
        self.inner.lock().device.state = state;
    }

    /// Adds or replaces an object. Objects added this way are writable.
    pub fn set_value(&self, index: u16, subindex: u8, value: Value) {
        let variable = Variable::new("", index, subindex, value.data_type());
        self.inner.lock().device.insert(&variable, value.to_bytes(), true);
    }

    pub fn value(&self, index: u16, subindex: u8) -> Option<Vec<u8>> {
        let inner = self.inner.lock();
        inner.device.objects.get(&(index, subindex)).map(|object| object.data.clone())
    }

    pub fn remove_object(&self, index: u16, subindex: u8) {
        self.inner.lock().device.objects.remove(&(index, subindex));
    }

    /// Every access to the object is answered with an abort carrying `code`.
    pub fn abort_on(&self, index: u16, subindex: u8, code: SDOAbortCode) {
        self.inner.lock().device.aborts.insert((index, subindex), code);
    }

    /// Drop all SDO requests without answering.
    pub fn set_silent(&self, silent: bool) {
        self.inner.lock().silent = silent;
    }

    /// Flip the toggle bit of the `n`th segment response (1 based), upload or download.
    pub fn corrupt_segment_toggle(&self, segment: Option<usize>) {
        let mut inner = self.inner.lock();
        inner.corrupt_segment = segment;
        inner.segments = 0;
    }

    /// Lose the `n`th segment response (1 based), upload or download.
    pub fn drop_segment_response(&self, segment: Option<usize>) {
        let mut inner = self.inner.lock();
        inner.drop_segment = segment;
        inner.segments = 0;
    }

    /// Answer segmented uploads without announcing the size.
    pub fn hide_upload_size(&self, hide: bool) {
        self.inner.lock().hide_upload_size = hide;
    }

    /// Number of fault resets the drive ignores before leaving Fault.
    pub fn set_sticky_fault(&self, resets: u32) {
        self.inner.lock().device.sticky_resets = resets;
    }

    /// Whether writes to "modes of operation" show up in the mode display.
    pub fn set_accept_modes(&self, accept: bool) {
        self.inner.lock().device.accept_modes = accept;
    }

    /// Status reads after a new set-point until "target reached", `None` for never.
    pub fn set_motion_polls(&self, polls: Option<u32>) {
        self.inner.lock().device.motion_polls = polls;
    }

    /// Status reads spent in NotReadyToSwitchOn before the drive is ready.
    pub fn set_boot_polls(&self, polls: u32) {
        let mut inner = self.inner.lock();
        inner.device.state = PowerState::NotReadyToSwitchOn;
        inner.device.boot_polls = polls;
    }

    /// Queues a frame for the client as if another node had sent it.
    pub fn inject(&self, frame: CanOpenFrame) {
        self.inner.lock().rx.push_back(frame);
    }

    /// Queues a heartbeat of this node reporting NMT state operational.
    pub fn heartbeat(&self) {
        let id = HEARTBEAT_BASE + self.node.raw() as u16;
        if let Some(frame) = CanOpenFrame::from_cob_id(id, &[NMT_OPERATIONAL]) {
            self.inject(frame);
        }
    }

    /// Frames queued and not received by anyone yet.
    pub fn pending_frames(&self) -> Vec<CanOpenFrame> {
        self.inner.lock().rx.iter().copied().collect()
    }

    /// Control words written so far, in order.
    pub fn control_words(&self) -> Vec<u16> {
        self.inner.lock().device.control_words.clone()
    }

    pub fn frames_sent(&self) -> Vec<CanOpenFrame> {
        self.inner.lock().sent.clone()
    }

    /// Payloads of all SDO requests addressed to this drive.
    pub fn sdo_requests(&self) -> Vec<[u8; 8]> {
        let request_id = self.request_id();
        let inner = self.inner.lock();
        inner
            .sent
            .iter()
            .filter(|frame| frame.cob_id() == Some(request_id))
            .filter_map(|frame| frame.sdo_payload().copied())
            .collect()
    }

    /// Number of initiate download (write) requests received.
    pub fn download_requests(&self) -> usize {
        self.sdo_requests()
            .iter()
            .filter(|request| request[0] & COMMAND_SPECIFIER_MASK == REQUEST_DOWNLOAD)
            .count()
    }

    /// NMT command codes addressed to this node or broadcast.
    pub fn nmt_commands(&self) -> Vec<u8> {
        let node = self.node.raw();
        let inner = self.inner.lock();
        inner
            .sent
            .iter()
            .filter(|frame| frame.cob_id() == Some(NMT_REQUEST_ID.as_raw()))
            .filter_map(|frame| match frame.data() {
                [command, target] if *target == 0 || *target == node => Some(*command),
                _ => None,
            })
            .collect()
    }

    /// Requests that arrived while an earlier one was still unanswered.
    pub fn overlapping_requests(&self) -> usize {
        self.inner.lock().overlapping_requests
    }

    pub fn clear_log(&self) {
        let mut inner = self.inner.lock();
        inner.sent.clear();
        inner.device.control_words.clear();
    }

    fn request_id(&self) -> u16 {
        SDO_REQUEST_BASE + self.node.raw() as u16
    }

    fn response_id(&self) -> u16 {
        SDO_RESPONSE_BASE + self.node.raw() as u16
    }
}

impl Network for SimulatedDrive {
    fn send_frame(&self, frame: &CanOpenFrame) -> Result<(), NetworkError> {
        let mut inner = self.inner.lock();
        inner.sent.push(*frame);

        if frame.cob_id() != Some(self.request_id()) {
            return Ok(());
        }
        let Some(request) = frame.sdo_payload() else {
            return Ok(());
        };
        trace!(node = %self.node, "sim rx {}", frame);

        let command = request[0] & COMMAND_SPECIFIER_MASK;
        if command == REQUEST_ABORTED {
            inner.awaiting_response = false;
        } else {
            if inner.awaiting_response {
                warn!(node = %self.node, "request while previous one is unanswered");
                inner.overlapping_requests += 1;
            }
            inner.awaiting_response = true;
        }
        if inner.silent {
            return Ok(());
        }

        let Inner { server, device, .. } = &mut *inner;
        let Some(mut response) = server.on_request(device, request) else {
            return Ok(());
        };
        let segmented_upload =
            response[0] & (COMMAND_SPECIFIER_MASK | EXPEDITED) == RESPONSE_UPLOAD;
        if command == REQUEST_UPLOAD && inner.hide_upload_size && segmented_upload {
            response[0] &= !SIZE_SPECIFIED;
            response[4..].fill(0);
        }
        let aborted = response[0] & COMMAND_SPECIFIER_MASK == RESPONSE_ABORTED;
        if matches!(command, REQUEST_SEGMENT_UPLOAD | REQUEST_SEGMENT_DOWNLOAD) && !aborted {
            inner.segments += 1;
            if inner.corrupt_segment == Some(inner.segments) {
                response[0] ^= TOGGLE_BIT;
            }
            if inner.drop_segment == Some(inner.segments) {
                trace!(node = %self.node, "sim drops segment response {}", inner.segments);
                return Ok(());
            }
        }
        let response = CanOpenFrame::from_cob_id(self.response_id(), &response)
            .ok_or(NetworkError::Adapter("invalid response id".into()))?;
        inner.rx.push_back(response);
        Ok(())
    }

    fn receive_frame(
        &self,
        cob_id: u16,
        timeout: Duration,
    ) -> Result<Option<CanOpenFrame>, NetworkError> {
        let mut inner = self.inner.lock();
        let position = inner.rx.iter().position(|frame| frame.cob_id() == Some(cob_id));
        let frame = position.and_then(|position| inner.rx.remove(position));
        match frame {
            Some(frame) => {
                if cob_id == self.response_id() {
                    inner.awaiting_response = false;
                }
                Ok(Some(frame))
            }
            None => {
                drop(inner);
                self.clock.advance(timeout);
                Ok(None)
            }
        }
    }
}
