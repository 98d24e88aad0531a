#![cfg(feature = "sim")]

use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use canopen_drive::clock::Clock;
use canopen_drive::frame::CanOpenFrame;
use canopen_drive::objectdictionary::cia402::{
    CONTROL_WORD, MANUFACTURER_DEVICE_NAME, PROFILE_VELOCITY, STATUS_WORD, TARGET_VELOCITY,
};
use canopen_drive::objectdictionary::{DataType, Value, Variable};
use canopen_drive::sdo::client::ProtocolError;
use canopen_drive::sdo::{SDOAbortCode, SdoClient, SdoError, TransactionState};
use canopen_drive::sim::{ManualClock, SimulatedDrive, DEVICE_NAME};
use canopen_drive::{Network, NetworkError, NodeId, PowerState};
use parking_lot::Mutex;

const TIMEOUT: Duration = Duration::from_millis(100);
const BLOB: Variable = Variable::string("blob", 0x2001, 0x00, DataType::OctetString, 32);

fn setup() -> (ManualClock, SimulatedDrive) {
    let clock = ManualClock::new();
    let sim = SimulatedDrive::new(NodeId::new(5).unwrap(), clock.clone());
    (clock, sim)
}

fn client<'a>(
    sim: &'a SimulatedDrive,
    clock: &ManualClock,
) -> SdoClient<&'a SimulatedDrive, ManualClock> {
    SdoClient::with_clock(sim.node(), sim, clock.clone())
}

#[test]
fn test_expedited_round_trip() {
    let (clock, sim) = setup();
    let client = client(&sim, &clock);

    client.write_value(&PROFILE_VELOCITY, &Value::U32(1500), TIMEOUT).unwrap();
    assert_eq!(
        client.read_value(&PROFILE_VELOCITY, TIMEOUT).unwrap(),
        Value::U32(1500)
    );
    assert_eq!(
        sim.sdo_requests(),
        [
            [0x23, 0x81, 0x60, 0x00, 0xDC, 0x05, 0x00, 0x00],
            [0x40, 0x81, 0x60, 0x00, 0x00, 0x00, 0x00, 0x00],
        ]
    );
    assert_eq!(sim.frames_sent()[0].cob_id(), Some(0x605));

    let last = client.last_transaction().unwrap();
    assert_eq!(last.state, TransactionState::Completed);
    assert_eq!(last.payload, [0xDC, 0x05, 0x00, 0x00]);
}

#[test]
fn test_segmented_upload() {
    let (clock, sim) = setup();
    let client = client(&sim, &clock);

    let name = client.read(&MANUFACTURER_DEVICE_NAME, TIMEOUT).unwrap();
    assert_eq!(name, DEVICE_NAME.as_bytes());

    // 23 bytes: initiate plus four segments with alternating toggle bit
    let commands: Vec<u8> = sim.sdo_requests().iter().map(|request| request[0]).collect();
    assert_eq!(commands, [0x40, 0x60, 0x70, 0x60, 0x70]);
}

#[test]
fn test_segmented_download() {
    let (clock, sim) = setup();
    sim.set_value(BLOB.index, BLOB.subindex, Value::Bytes(Vec::new()));
    let client = client(&sim, &clock);

    let data: Vec<u8> = (1..=20).collect();
    client.write(&BLOB, &data, TIMEOUT).unwrap();
    assert_eq!(sim.value(BLOB.index, BLOB.subindex), Some(data.clone()));

    let requests = sim.sdo_requests();
    assert_eq!(requests[0], [0x21, 0x01, 0x20, 0x00, 0x14, 0x00, 0x00, 0x00]);
    assert_eq!(requests[1], [0x00, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(requests[2], [0x10, 8, 9, 10, 11, 12, 13, 14]);
    // six bytes, one unused, last segment
    assert_eq!(requests[3], [0x03, 15, 16, 17, 18, 19, 20, 0]);

    assert_eq!(client.read(&BLOB, TIMEOUT).unwrap(), data);
}

#[test]
fn test_abort_code_is_exact() {
    let (clock, sim) = setup();
    sim.abort_on(0x6081, 0, SDOAbortCode::from(0x1234_5678));
    sim.abort_on(0x60FF, 0, SDOAbortCode::ValueTooHigh);
    let client = client(&sim, &clock);

    let err = client.read(&PROFILE_VELOCITY, TIMEOUT).unwrap_err();
    assert_eq!(err.abort_code().map(|code| code.code()), Some(0x1234_5678));
    assert_eq!(
        client.last_transaction().unwrap().state,
        TransactionState::Aborted(0x1234_5678)
    );

    let err = client.write(&TARGET_VELOCITY, &[0, 0, 1, 0], TIMEOUT).unwrap_err();
    assert_eq!(
        err,
        SdoError::Aborted {
            index: 0x60FF,
            subindex: 0,
            code: SDOAbortCode::ValueTooHigh,
        }
    );
    // the server ended the transfer, the client has nothing to abort
    assert_eq!(sim.sdo_requests().len(), 2);
}

#[test]
fn test_missing_object() {
    let (clock, sim) = setup();
    sim.remove_object(0x60FF, 0);
    let client = client(&sim, &clock);

    let err = client.read(&TARGET_VELOCITY, TIMEOUT).unwrap_err();
    assert_eq!(err.abort_code(), Some(SDOAbortCode::ObjectDoesNotExist));
}

#[test]
fn test_timeout_after_exactly_timeout() {
    let (clock, sim) = setup();
    sim.set_silent(true);
    let client = client(&sim, &clock);

    let start = clock.now();
    let err = client.read(&STATUS_WORD, TIMEOUT).unwrap_err();
    assert_eq!(
        err,
        SdoError::Timeout {
            index: 0x6041,
            subindex: 0,
            timeout: TIMEOUT,
        }
    );
    assert!(err.is_timeout());
    assert_eq!(clock.now() - start, TIMEOUT);
    assert_eq!(
        client.last_transaction().unwrap().state,
        TransactionState::TimedOut
    );

    // the abandoned transfer is aborted with "SDO protocol timed out"
    let requests = sim.sdo_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], [0x80, 0x41, 0x60, 0x00, 0x00, 0x00, 0x04, 0x05]);

    // no retries, the next call is a fresh transaction
    sim.set_silent(false);
    assert!(client.read(&STATUS_WORD, TIMEOUT).is_ok());
    assert_eq!(sim.overlapping_requests(), 0);
}

#[test]
fn test_toggle_error_is_malformed() {
    let (clock, sim) = setup();
    sim.corrupt_segment_toggle(Some(2));
    let client = client(&sim, &clock);

    let err = client.read(&MANUFACTURER_DEVICE_NAME, TIMEOUT).unwrap_err();
    assert_eq!(
        err,
        SdoError::MalformedResponse(ProtocolError::ToggleBitNotAlternated)
    );
    let requests = sim.sdo_requests();
    assert_eq!(
        requests.last(),
        Some(&[0x80, 0x08, 0x10, 0x00, 0x00, 0x00, 0x03, 0x05])
    );
    assert_eq!(
        client.last_transaction().unwrap().state,
        TransactionState::Failed
    );

    // the server channel was reset by the abort
    assert_eq!(
        client.read(&MANUFACTURER_DEVICE_NAME, TIMEOUT).unwrap(),
        DEVICE_NAME.as_bytes()
    );
}

#[test]
fn test_invalid_value_size_sends_nothing() {
    let (clock, sim) = setup();
    let client = client(&sim, &clock);

    assert_eq!(
        client.write(&CONTROL_WORD, &[0x0F, 0x00, 0x00], TIMEOUT),
        Err(SdoError::InvalidValueSize {
            index: 0x6040,
            subindex: 0,
            len: 3,
        })
    );
    assert!(matches!(
        client.write(&BLOB, &[], TIMEOUT),
        Err(SdoError::InvalidValueSize { len: 0, .. })
    ));
    assert!(sim.frames_sent().is_empty());
}

#[test]
fn test_ignores_other_nodes() {
    let (clock, sim) = setup();
    let client = client(&sim, &clock);

    // upload response of node 6 for the same object
    let foreign =
        CanOpenFrame::from_cob_id(0x586, &[0x4B, 0x41, 0x60, 0x00, 0x08, 0x00, 0x00, 0x00])
            .unwrap();
    sim.inject(foreign);

    let status = client.upload::<u16>(0x6041, 0, TIMEOUT).unwrap();
    assert_eq!(status & 0x4F, 0x40);
    // left on the bus for whoever listens to node 6
    assert_eq!(sim.pending_frames(), [foreign]);
}

#[test]
fn test_upload_longer_than_entry() {
    let (clock, sim) = setup();
    sim.set_value(BLOB.index, BLOB.subindex, Value::Bytes(vec![0xAA; 40]));
    let client = client(&sim, &clock);

    // announced size too large, no segment is requested
    assert_eq!(
        client.read(&BLOB, TIMEOUT),
        Err(SdoError::MalformedResponse(ProtocolError::SizeMismatch {
            expected: 32,
            actual: 40,
        }))
    );
    let requests = sim.sdo_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], [0x80, 0x01, 0x20, 0x00, 0x01, 0x00, 0x04, 0x05]);

    // no size announced: stops at the first segment past the entry size
    sim.clear_log();
    sim.hide_upload_size(true);
    assert_eq!(
        client.read(&BLOB, TIMEOUT),
        Err(SdoError::MalformedResponse(ProtocolError::SizeMismatch {
            expected: 32,
            actual: 35,
        }))
    );
    let requests = sim.sdo_requests();
    // initiate, five segments, abort
    assert_eq!(requests.len(), 7);
    assert_eq!(requests[0][0], 0x40);
    assert_eq!(requests[6], [0x80, 0x01, 0x20, 0x00, 0x01, 0x00, 0x04, 0x05]);
    assert_eq!(sim.overlapping_requests(), 0);
}

#[test]
fn test_lost_segment_times_out() {
    let (clock, sim) = setup();
    sim.drop_segment_response(Some(2));
    let client = client(&sim, &clock);

    let start = clock.now();
    assert_eq!(
        client.read(&MANUFACTURER_DEVICE_NAME, TIMEOUT),
        Err(SdoError::Timeout {
            index: 0x1008,
            subindex: 0,
            timeout: TIMEOUT,
        })
    );
    // the deadline is per segment
    assert_eq!(clock.now() - start, TIMEOUT);

    let commands: Vec<u8> = sim.sdo_requests().iter().map(|request| request[0]).collect();
    assert_eq!(commands, [0x40, 0x60, 0x70, 0x80]);
    assert_eq!(
        sim.sdo_requests().last(),
        Some(&[0x80, 0x08, 0x10, 0x00, 0x00, 0x00, 0x04, 0x05])
    );

    assert_eq!(
        client.read(&MANUFACTURER_DEVICE_NAME, TIMEOUT).unwrap(),
        DEVICE_NAME.as_bytes()
    );
    assert_eq!(sim.overlapping_requests(), 0);
}

#[test]
fn test_download_toggle_error() {
    let (clock, sim) = setup();
    sim.set_value(BLOB.index, BLOB.subindex, Value::Bytes(Vec::new()));
    sim.corrupt_segment_toggle(Some(1));
    let client = client(&sim, &clock);

    let data: Vec<u8> = (1..=20).collect();
    assert_eq!(
        client.write(&BLOB, &data, TIMEOUT),
        Err(SdoError::MalformedResponse(ProtocolError::ToggleBitNotAlternated))
    );
    let requests = sim.sdo_requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2], [0x80, 0x01, 0x20, 0x00, 0x00, 0x00, 0x03, 0x05]);
    assert_eq!(
        client.last_transaction().unwrap().state,
        TransactionState::Failed
    );
    // the transfer never completed on the server
    assert_eq!(sim.value(BLOB.index, BLOB.subindex), Some(Vec::new()));
}

struct Unplugged;

impl Network for Unplugged {
    fn send_frame(&self, _frame: &CanOpenFrame) -> Result<(), NetworkError> {
        Err(NetworkError::Adapter("no channel".into()))
    }

    fn receive_frame(
        &self,
        _cob_id: u16,
        _timeout: Duration,
    ) -> Result<Option<CanOpenFrame>, NetworkError> {
        Ok(None)
    }
}

#[test]
fn test_network_error() {
    let client = SdoClient::with_clock(NodeId::new(1).unwrap(), Unplugged, ManualClock::new());
    assert_eq!(
        client.read(&STATUS_WORD, TIMEOUT),
        Err(SdoError::Network(NetworkError::Adapter("no channel".into())))
    );
}

/// Holds the first receive until the test releases it.
struct Gated<N> {
    inner: N,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl<N> Gated<N> {
    fn new(inner: N, entered: mpsc::Sender<()>, release: mpsc::Receiver<()>) -> Self {
        Gated {
            inner,
            entered: Mutex::new(Some(entered)),
            release: Mutex::new(release),
        }
    }
}

impl<N: Network> Network for Gated<N> {
    fn send_frame(&self, frame: &CanOpenFrame) -> Result<(), NetworkError> {
        self.inner.send_frame(frame)
    }

    fn receive_frame(
        &self,
        cob_id: u16,
        timeout: Duration,
    ) -> Result<Option<CanOpenFrame>, NetworkError> {
        if let Some(entered) = self.entered.lock().take() {
            entered.send(()).unwrap();
            self.release.lock().recv().unwrap();
        }
        self.inner.receive_frame(cob_id, timeout)
    }
}

#[test]
fn test_try_read_while_busy() {
    let (clock, sim) = setup();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gated = Gated::new(&sim, entered_tx, release_rx);
    let client = SdoClient::with_clock(sim.node(), gated, clock.clone());

    thread::scope(|s| {
        let first = s.spawn(|| client.read(&STATUS_WORD, TIMEOUT));
        entered_rx.recv().unwrap();

        assert_eq!(
            client.try_read(&STATUS_WORD, TIMEOUT),
            Err(SdoError::Busy(sim.node()))
        );
        assert_eq!(
            client.try_write(&CONTROL_WORD, &[0x06, 0x00], TIMEOUT),
            Err(SdoError::Busy(sim.node()))
        );

        release_tx.send(()).unwrap();
        assert!(first.join().unwrap().is_ok());
    });
    assert_eq!(sim.sdo_requests().len(), 1);
}

#[test]
fn test_concurrent_callers_do_not_overlap() {
    let (clock, sim) = setup();
    let client = client(&sim, &clock);

    thread::scope(|s| {
        for worker in 0..4i32 {
            let client = &client;
            s.spawn(move || {
                for i in 0..25 {
                    let velocity = Value::I32(worker * 1000 + i);
                    client.write_value(&TARGET_VELOCITY, &velocity, TIMEOUT).unwrap();
                    client.read(&STATUS_WORD, TIMEOUT).unwrap();
                    client.read(&MANUFACTURER_DEVICE_NAME, TIMEOUT).unwrap();
                }
            });
        }
    });

    assert_eq!(sim.overlapping_requests(), 0);
    // 4 workers * 25 rounds * (1 + 1 + 5) requests
    assert_eq!(sim.sdo_requests().len(), 700);
}

/// Several simulated drives answering into one receive queue, like nodes on
/// a shared CAN bus.
struct SharedBus<'a> {
    drives: Vec<&'a SimulatedDrive>,
    clock: ManualClock,
    rx: Mutex<VecDeque<CanOpenFrame>>,
}

impl Network for SharedBus<'_> {
    fn send_frame(&self, frame: &CanOpenFrame) -> Result<(), NetworkError> {
        for drive in &self.drives {
            drive.send_frame(frame)?;
            let response_id = 0x580 + drive.node().raw() as u16;
            while let Some(response) = drive.receive_frame(response_id, Duration::ZERO)? {
                self.rx.lock().push_back(response);
            }
        }
        Ok(())
    }

    fn receive_frame(
        &self,
        cob_id: u16,
        timeout: Duration,
    ) -> Result<Option<CanOpenFrame>, NetworkError> {
        let mut rx = self.rx.lock();
        if let Some(position) = rx.iter().position(|frame| frame.cob_id() == Some(cob_id)) {
            return Ok(rx.remove(position));
        }
        drop(rx);
        self.clock.advance(timeout);
        Ok(None)
    }
}

#[test]
fn test_nodes_sharing_a_bus() {
    let clock = ManualClock::new();
    let drive5 = SimulatedDrive::new(NodeId::new(5).unwrap(), clock.clone());
    let drive6 = SimulatedDrive::new(NodeId::new(6).unwrap(), clock.clone());
    drive6.set_state(PowerState::OperationEnabled);
    let bus = SharedBus {
        drives: vec![&drive5, &drive6],
        clock: clock.clone(),
        rx: Mutex::default(),
    };

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let client5 = SdoClient::with_clock(
        drive5.node(),
        Gated::new(&bus, entered_tx, release_rx),
        clock.clone(),
    );
    let client6 = SdoClient::with_clock(drive6.node(), &bus, clock.clone());

    thread::scope(|s| {
        let first = s.spawn(|| client5.upload::<u16>(0x6041, 0, TIMEOUT));
        entered_rx.recv().unwrap();

        // node 5's answer is already on the bus while node 6 is served
        let status6 = client6.upload::<u16>(0x6041, 0, TIMEOUT).unwrap();
        assert_eq!(status6 & 0x6F, 0x27);

        release_tx.send(()).unwrap();
        let status5 = first.join().unwrap().unwrap();
        assert_eq!(status5 & 0x4F, 0x40);
    });
    assert!(bus.rx.lock().is_empty());
    assert_eq!(drive5.overlapping_requests(), 0);
    assert_eq!(drive6.overlapping_requests(), 0);
}
