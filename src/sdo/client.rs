use core::array::TryFromSliceError;
use std::time::Duration;

use heapless::Vec as BoundedVec;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::*;
use crate::clock::{Clock, Deadline, SystemClock};
use crate::frame::CanOpenFrame;
use crate::network::{Network, NetworkError};
use crate::node::NodeId;
use crate::objectdictionary::{Value, Variable};

pub fn upload_request(index: u16, sub_index: u8) -> [u8; 8] {
    let mut request = [0; 8];
    request[0] = REQUEST_UPLOAD;
    request[1..3].copy_from_slice(&index.to_le_bytes());
    request[3] = sub_index;
    request
}

pub fn upload_segment_request(toggle_bit: u8) -> [u8; 8] {
    [REQUEST_SEGMENT_UPLOAD | toggle_bit, 0, 0, 0, 0, 0, 0, 0]
}

/// Initiate download carrying up to four bytes of `data` in the frame itself.
pub fn expedited_download_request(index: u16, sub_index: u8, data: &[u8]) -> [u8; 8] {
    debug_assert!(!data.is_empty() && data.len() <= EXPEDITED_MAX);
    let mut request = [0; 8];
    request[0] =
        REQUEST_DOWNLOAD | EXPEDITED | SIZE_SPECIFIED | ((EXPEDITED_MAX - data.len()) << 2) as u8;
    request[1..3].copy_from_slice(&index.to_le_bytes());
    request[3] = sub_index;
    request[4..4 + data.len()].copy_from_slice(data);
    request
}

/// Initiate download announcing `size` bytes to follow in segments.
pub fn segmented_download_request(index: u16, sub_index: u8, size: u32) -> [u8; 8] {
    let mut request = [0; 8];
    request[0] = REQUEST_DOWNLOAD | SIZE_SPECIFIED;
    request[1..3].copy_from_slice(&index.to_le_bytes());
    request[3] = sub_index;
    request[4..8].copy_from_slice(&size.to_le_bytes());
    request
}

pub fn download_segment_request(toggle_bit: u8, chunk: &[u8], last: bool) -> [u8; 8] {
    debug_assert!(chunk.len() <= SEGMENT_MAX);
    let mut request = [0; 8];
    request[0] = REQUEST_SEGMENT_DOWNLOAD | toggle_bit | ((SEGMENT_MAX - chunk.len()) << 1) as u8;
    if last {
        request[0] |= NO_MORE_DATA;
    }
    request[1..1 + chunk.len()].copy_from_slice(chunk);
    request
}

pub fn abort_request(index: u16, sub_index: u8, code: SDOAbortCode) -> [u8; 8] {
    let mut request = abort_frame(index, sub_index, code);
    request[0] = REQUEST_ABORTED;
    request
}

/// Server answer to an initiate upload request
#[derive(Debug, PartialEq, Eq)]
pub enum UploadResponse {
    Expedited {
        data: BoundedVec<u8, EXPEDITED_MAX>,
        size_indicated: bool,
    },
    Segmented {
        size: Option<u32>,
    },
}

pub fn parse_upload_response(
    response: &[u8; 8],
    expected_index: u16,
    expected_subindex: u8,
) -> Result<UploadResponse, SdoError> {
    match response[0] & COMMAND_SPECIFIER_MASK {
        RESPONSE_ABORTED => Err(to_abort(response)),
        RESPONSE_UPLOAD => {
            check_index(response, expected_index, expected_subindex)?;
            let command = response[0];
            let size_indicated = command & SIZE_SPECIFIED != 0;
            if command & EXPEDITED != 0 {
                let len = match size_indicated {
                    true => EXPEDITED_MAX - ((command >> 2) & 0x3) as usize,
                    false => EXPEDITED_MAX,
                };
                let data = BoundedVec::from_slice(&response[4..4 + len])
                    .map_err(|_| ProtocolError::SizeMismatch { expected: EXPEDITED_MAX, actual: len })?;
                Ok(UploadResponse::Expedited {
                    data,
                    size_indicated,
                })
            } else {
                let size = size_indicated.then(|| {
                    u32::from_le_bytes([response[4], response[5], response[6], response[7]])
                });
                Ok(UploadResponse::Segmented { size })
            }
        }
        other => Err(ProtocolError::UnexpectedCommand(other).into()),
    }
}

/// Returns the segment payload and whether it was the last one.
pub fn parse_upload_segment(
    response: &[u8; 8],
    expected_toggle: u8,
) -> Result<(BoundedVec<u8, SEGMENT_MAX>, bool), SdoError> {
    match response[0] & COMMAND_SPECIFIER_MASK {
        RESPONSE_ABORTED => Err(to_abort(response)),
        RESPONSE_SEGMENT_UPLOAD => {
            let command = response[0];
            check_toggle(command, expected_toggle)?;
            let len = SEGMENT_MAX - ((command >> 1) & 0x7) as usize;
            let data = BoundedVec::from_slice(&response[1..1 + len])
                .map_err(|_| ProtocolError::SizeMismatch { expected: SEGMENT_MAX, actual: len })?;
            Ok((data, command & NO_MORE_DATA != 0))
        }
        other => Err(ProtocolError::UnexpectedCommand(other).into()),
    }
}

pub fn parse_download_response(
    response: &[u8; 8],
    expected_index: u16,
    expected_subindex: u8,
) -> Result<(), SdoError> {
    match response[0] & COMMAND_SPECIFIER_MASK {
        RESPONSE_ABORTED => Err(to_abort(response)),
        RESPONSE_DOWNLOAD => check_index(response, expected_index, expected_subindex),
        other => Err(ProtocolError::UnexpectedCommand(other).into()),
    }
}

pub fn parse_download_segment_response(
    response: &[u8; 8],
    expected_toggle: u8,
) -> Result<(), SdoError> {
    match response[0] & COMMAND_SPECIFIER_MASK {
        RESPONSE_ABORTED => Err(to_abort(response)),
        RESPONSE_SEGMENT_DOWNLOAD => check_toggle(response[0], expected_toggle),
        other => Err(ProtocolError::UnexpectedCommand(other).into()),
    }
}

fn check_index(response: &[u8; 8], index: u16, subindex: u8) -> Result<(), SdoError> {
    let actual = index_of(response);
    if actual != (index, subindex) {
        return Err(ProtocolError::IndexMismatch {
            expected: (index, subindex),
            actual,
        }
        .into());
    }
    Ok(())
}

fn check_toggle(command: u8, expected_toggle: u8) -> Result<(), SdoError> {
    if command & TOGGLE_BIT != expected_toggle {
        return Err(ProtocolError::ToggleBitNotAlternated.into());
    }
    Ok(())
}

fn to_abort(response: &[u8; 8]) -> SdoError {
    let (index, subindex) = index_of(response);
    let code = u32::from_le_bytes([response[4], response[5], response[6], response[7]]);
    SdoError::Aborted {
        index,
        subindex,
        code: SDOAbortCode::from(code),
    }
}

/// Protocol violation found in a server response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unexpected command specifier 0x{0:02X}")]
    UnexpectedCommand(u8),
    #[error("response for 0x{:04X}:{}, expected 0x{:04X}:{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    IndexMismatch { expected: (u16, u8), actual: (u16, u8) },
    #[error("toggle bit not alternated")]
    ToggleBitNotAlternated,
    #[error("expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdoError {
    #[error("no SDO response for 0x{index:04X}:{subindex} within {timeout:?}")]
    Timeout {
        index: u16,
        subindex: u8,
        timeout: Duration,
    },
    #[error("transfer of 0x{index:04X}:{subindex} aborted: {code}")]
    Aborted {
        index: u16,
        subindex: u8,
        code: SDOAbortCode,
    },
    #[error("malformed SDO response: {0}")]
    MalformedResponse(#[from] ProtocolError),
    #[error("SDO channel of node {0} is busy")]
    Busy(NodeId),
    #[error("{len} bytes are not a valid value of 0x{index:04X}:{subindex}")]
    InvalidValueSize { index: u16, subindex: u8, len: usize },
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl SdoError {
    /// The abort code reported by the server, if the server aborted the transfer.
    pub fn abort_code(&self) -> Option<SDOAbortCode> {
        match self {
            SdoError::Aborted { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SdoError::Timeout { .. })
    }
}

pub struct ParseError;

impl From<TryFromSliceError> for ParseError {
    fn from(_: TryFromSliceError) -> Self {
        ParseError
    }
}

/// Conversion trait for integers supported by SDO
pub trait SdoValue: Sized {
    /// `Self` as bytes
    type Bytes: AsRef<[u8]>;
    /// Convert from little endian bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError>;
    /// Convert to little endian bytes
    fn to_bytes(self) -> Self::Bytes;
}

macro_rules! sdo_value {
    ($typ:ty) => {
        impl SdoValue for $typ {
            type Bytes = [u8; core::mem::size_of::<Self>()];
            fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
                let bytes: Self::Bytes = bytes.try_into()?;
                Ok(Self::from_le_bytes(bytes))
            }

            fn to_bytes(self) -> Self::Bytes {
                self.to_le_bytes()
            }
        }
    };
}

sdo_value!(u8);
sdo_value!(u16);
sdo_value!(u32);
sdo_value!(i8);
sdo_value!(i16);
sdo_value!(i32);

/// SDO client for a single remote node.
///
/// All calls block until the transfer completes, the server aborts, or the
/// timeout passes. The client never retries on its own.
///
/// Only one transaction can be pending per node: concurrent callers of the
/// blocking methods queue on the channel lock, the `try_*` variants fail with
/// [`SdoError::Busy`] instead.
pub struct SdoClient<N, C = SystemClock> {
    node: NodeId,
    network: N,
    clock: C,
    channel: Mutex<Option<SdoTransaction>>,
}

struct Upload {
    data: Vec<u8>,
    size_indicated: bool,
}

impl<N: Network> SdoClient<N> {
    pub fn new(node: NodeId, network: N) -> Self {
        Self::with_clock(node, network, SystemClock::new())
    }
}

impl<N: Network, C: Clock> SdoClient<N, C> {
    pub fn with_clock(node: NodeId, network: N, clock: C) -> Self {
        SdoClient {
            node,
            network,
            clock,
            channel: Mutex::new(None),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// COB-ID the client sends requests on
    pub fn request_id(&self) -> u16 {
        SDO_REQUEST_BASE + self.node.raw() as u16
    }

    /// COB-ID the server answers on
    pub fn response_id(&self) -> u16 {
        SDO_RESPONSE_BASE + self.node.raw() as u16
    }

    /// Snapshot of the most recent transaction, pending or finished.
    ///
    /// Blocks while a transaction is in flight.
    pub fn last_transaction(&self) -> Option<SdoTransaction> {
        self.channel.lock().clone()
    }

    /// Uploads `entry` from the server.
    pub fn read(&self, entry: &Variable, timeout: Duration) -> Result<Vec<u8>, SdoError> {
        let mut slot = self.channel.lock();
        self.read_locked(&mut slot, entry, timeout)
    }

    pub fn try_read(&self, entry: &Variable, timeout: Duration) -> Result<Vec<u8>, SdoError> {
        let mut slot = self.channel.try_lock().ok_or(SdoError::Busy(self.node))?;
        self.read_locked(&mut slot, entry, timeout)
    }

    /// Downloads `value` to `entry` on the server.
    pub fn write(&self, entry: &Variable, value: &[u8], timeout: Duration) -> Result<(), SdoError> {
        let mut slot = self.channel.lock();
        self.write_locked(&mut slot, entry, value, timeout)
    }

    pub fn try_write(
        &self,
        entry: &Variable,
        value: &[u8],
        timeout: Duration,
    ) -> Result<(), SdoError> {
        let mut slot = self.channel.try_lock().ok_or(SdoError::Busy(self.node))?;
        self.write_locked(&mut slot, entry, value, timeout)
    }

    pub fn read_value(&self, entry: &Variable, timeout: Duration) -> Result<Value, SdoError> {
        let data = self.read(entry, timeout)?;
        Value::decode(entry.data_type, &data).ok_or(SdoError::MalformedResponse(
            ProtocolError::SizeMismatch {
                expected: entry.access_size,
                actual: data.len(),
            },
        ))
    }

    pub fn write_value(
        &self,
        entry: &Variable,
        value: &Value,
        timeout: Duration,
    ) -> Result<(), SdoError> {
        self.write(entry, &value.to_bytes(), timeout)
    }

    /// Typed upload of an integer object.
    pub fn upload<T: SdoValue>(
        &self,
        index: u16,
        subindex: u8,
        timeout: Duration,
    ) -> Result<T, SdoError> {
        let mut slot = self.channel.lock();
        let transaction = slot.insert(SdoTransaction::new(
            self.node,
            index,
            subindex,
            Direction::Upload,
        ));
        let width = core::mem::size_of::<T>();
        let result = self.upload_raw(index, subindex, width, timeout);
        finish(transaction, &result, |upload| upload.data.clone());
        let upload = result?;
        let mut data = upload.data;
        if !upload.size_indicated && data.len() > width {
            data.truncate(width);
        }
        T::from_bytes(&data).map_err(|_| {
            SdoError::MalformedResponse(ProtocolError::SizeMismatch {
                expected: width,
                actual: data.len(),
            })
        })
    }

    /// Typed download of an integer object.
    pub fn download<T: SdoValue>(
        &self,
        index: u16,
        subindex: u8,
        value: T,
        timeout: Duration,
    ) -> Result<(), SdoError> {
        let bytes = value.to_bytes();
        let mut slot = self.channel.lock();
        let transaction = slot.insert(SdoTransaction::new(
            self.node,
            index,
            subindex,
            Direction::Download,
        ));
        transaction.payload = bytes.as_ref().to_vec();
        let result = self.download_raw(index, subindex, bytes.as_ref(), timeout);
        finish(transaction, &result, |_| Vec::new());
        result
    }

    fn read_locked(
        &self,
        slot: &mut Option<SdoTransaction>,
        entry: &Variable,
        timeout: Duration,
    ) -> Result<Vec<u8>, SdoError> {
        let transaction = slot.insert(SdoTransaction::new(
            self.node,
            entry.index,
            entry.subindex,
            Direction::Upload,
        ));
        let result = self
            .upload_raw(entry.index, entry.subindex, entry.access_size, timeout)
            .and_then(|upload| fit_to_entry(entry, upload));
        finish(transaction, &result, |data| data.clone());
        result
    }

    fn write_locked(
        &self,
        slot: &mut Option<SdoTransaction>,
        entry: &Variable,
        value: &[u8],
        timeout: Duration,
    ) -> Result<(), SdoError> {
        if value.is_empty() || !entry.accepts_len(value.len()) {
            return Err(SdoError::InvalidValueSize {
                index: entry.index,
                subindex: entry.subindex,
                len: value.len(),
            });
        }
        let transaction = slot.insert(SdoTransaction::new(
            self.node,
            entry.index,
            entry.subindex,
            Direction::Download,
        ));
        transaction.payload = value.to_vec();
        let result = self.download_raw(entry.index, entry.subindex, value, timeout);
        finish(transaction, &result, |_| Vec::new());
        result
    }

    /// Uploads at most `limit` bytes; a server sending more is treated as malformed.
    fn upload_raw(
        &self,
        index: u16,
        subindex: u8,
        limit: usize,
        timeout: Duration,
    ) -> Result<Upload, SdoError> {
        debug!(node = %self.node, "upload 0x{:04X}:{}", index, subindex);
        let result = self.upload_inner(index, subindex, limit, timeout);
        self.abort_on_failure(index, subindex, &result);
        result
    }

    fn upload_inner(
        &self,
        index: u16,
        subindex: u8,
        limit: usize,
        timeout: Duration,
    ) -> Result<Upload, SdoError> {
        let response = self.exchange(&upload_request(index, subindex), index, subindex, timeout)?;
        match parse_upload_response(&response, index, subindex)? {
            UploadResponse::Expedited {
                data,
                size_indicated,
            } => Ok(Upload {
                data: data.to_vec(),
                size_indicated,
            }),
            UploadResponse::Segmented { size } => {
                let size = size.map(|size| size as usize);
                if let Some(size) = size.filter(|size| *size > limit) {
                    return Err(ProtocolError::SizeMismatch {
                        expected: limit,
                        actual: size,
                    }
                    .into());
                }
                let max = size.unwrap_or(limit);
                let mut data = Vec::with_capacity(max);
                let mut toggle_bit = 0;
                loop {
                    let response = self.exchange(
                        &upload_segment_request(toggle_bit),
                        index,
                        subindex,
                        timeout,
                    )?;
                    let (chunk, last) = parse_upload_segment(&response, toggle_bit)?;
                    data.extend_from_slice(&chunk);
                    if data.len() > max {
                        return Err(ProtocolError::SizeMismatch {
                            expected: max,
                            actual: data.len(),
                        }
                        .into());
                    }
                    if last {
                        break;
                    }
                    toggle_bit ^= TOGGLE_BIT;
                }
                if let Some(size) = size.filter(|size| data.len() != *size) {
                    return Err(ProtocolError::SizeMismatch {
                        expected: size,
                        actual: data.len(),
                    }
                    .into());
                }
                Ok(Upload {
                    data,
                    size_indicated: size.is_some(),
                })
            }
        }
    }

    fn download_raw(
        &self,
        index: u16,
        subindex: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), SdoError> {
        debug!(node = %self.node, "download 0x{:04X}:{} {:02X?}", index, subindex, data);
        let result = self.download_inner(index, subindex, data, timeout);
        self.abort_on_failure(index, subindex, &result);
        result
    }

    fn download_inner(
        &self,
        index: u16,
        subindex: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), SdoError> {
        if data.len() <= EXPEDITED_MAX {
            let request = expedited_download_request(index, subindex, data);
            let response = self.exchange(&request, index, subindex, timeout)?;
            return parse_download_response(&response, index, subindex);
        }

        let request = segmented_download_request(index, subindex, data.len() as u32);
        let response = self.exchange(&request, index, subindex, timeout)?;
        parse_download_response(&response, index, subindex)?;

        let mut toggle_bit = 0;
        let mut chunks = data.chunks(SEGMENT_MAX).peekable();
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            let request = download_segment_request(toggle_bit, chunk, last);
            let response = self.exchange(&request, index, subindex, timeout)?;
            parse_download_segment_response(&response, toggle_bit)?;
            toggle_bit ^= TOGGLE_BIT;
        }
        Ok(())
    }

    /// Sends one request and waits for the matching server frame.
    fn exchange(
        &self,
        request: &[u8; 8],
        index: u16,
        subindex: u8,
        timeout: Duration,
    ) -> Result<[u8; 8], SdoError> {
        self.send(request)?;

        let deadline = Deadline::after(&self.clock, timeout);
        loop {
            let frame = self
                .network
                .receive_frame(self.response_id(), deadline.remaining(&self.clock))?;
            if let Some(frame) = frame {
                if frame.cob_id() == Some(self.response_id()) {
                    if let Some(payload) = frame.sdo_payload() {
                        trace!(node = %self.node, "rx {}", frame);
                        return Ok(*payload);
                    }
                }
                trace!(node = %self.node, "ignoring {}", frame);
            }
            if deadline.expired(&self.clock) {
                return Err(SdoError::Timeout {
                    index,
                    subindex,
                    timeout,
                });
            }
        }
    }

    fn send(&self, data: &[u8; 8]) -> Result<(), SdoError> {
        // request_id() is at most 0x67F, always a valid standard id
        let frame = CanOpenFrame::from_cob_id(self.request_id(), data)
            .ok_or(NetworkError::Adapter("invalid SDO request frame".into()))?;
        trace!(node = %self.node, "tx {}", frame);
        self.network.send_frame(&frame)?;
        Ok(())
    }

    /// Tells the server to drop a transfer the client gave up on, so the next
    /// request starts from a clean channel.
    fn abort_on_failure<T>(&self, index: u16, subindex: u8, result: &Result<T, SdoError>) {
        let code = match result {
            Err(SdoError::Timeout { .. }) => SDOAbortCode::SDOProtocolTimedOut,
            Err(SdoError::MalformedResponse(ProtocolError::ToggleBitNotAlternated)) => {
                SDOAbortCode::ToggleBitNotAlternated
            }
            Err(SdoError::MalformedResponse(_)) => SDOAbortCode::CommandSpecifierError,
            _ => return,
        };
        if let Err(err) = result {
            warn!(node = %self.node, "0x{:04X}:{} failed: {}", index, subindex, err);
        }
        if let Err(err) = self.send(&abort_request(index, subindex, code)) {
            warn!(node = %self.node, "could not send SDO abort: {}", err);
        }
    }
}

fn fit_to_entry(entry: &Variable, upload: Upload) -> Result<Vec<u8>, SdoError> {
    let mut data = upload.data;
    if let Some(width) = entry.data_type.width() {
        if !upload.size_indicated && data.len() > width {
            data.truncate(width);
        }
    }
    if !entry.accepts_len(data.len()) {
        return Err(ProtocolError::SizeMismatch {
            expected: entry.access_size,
            actual: data.len(),
        }
        .into());
    }
    Ok(data)
}

fn finish<T>(
    transaction: &mut SdoTransaction,
    result: &Result<T, SdoError>,
    payload: impl FnOnce(&T) -> Vec<u8>,
) {
    transaction.state = match result {
        Ok(value) => {
            if transaction.direction == Direction::Upload {
                transaction.payload = payload(value);
            }
            TransactionState::Completed
        }
        Err(SdoError::Timeout { .. }) => TransactionState::TimedOut,
        Err(SdoError::Aborted { code, .. }) => {
            warn!(
                node = %transaction.node,
                "0x{:04X}:{} aborted by server: {}",
                transaction.index, transaction.subindex, code
            );
            TransactionState::Aborted(code.code())
        }
        Err(_) => TransactionState::Failed,
    };
}
