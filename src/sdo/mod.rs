pub mod client;
pub use client::{SdoClient, SdoError, SdoValue};

pub mod errors;
pub use errors::SDOAbortCode;

pub mod server;
pub use server::{ObjectStore, SdoServer};

mod transaction;
pub use transaction::{Direction, SdoTransaction, TransactionState};

/// COB-ID base of client → server messages (requests)
pub const SDO_REQUEST_BASE: u16 = 0x600;
/// COB-ID base of server → client messages (responses)
pub const SDO_RESPONSE_BASE: u16 = 0x580;

pub(crate) const REQUEST_SEGMENT_DOWNLOAD: u8 = 0 << 5;
pub(crate) const REQUEST_DOWNLOAD: u8 = 1 << 5;
pub(crate) const REQUEST_UPLOAD: u8 = 2 << 5;
pub(crate) const REQUEST_SEGMENT_UPLOAD: u8 = 3 << 5;
pub(crate) const REQUEST_ABORTED: u8 = 4 << 5;

const RESPONSE_SEGMENT_UPLOAD: u8 = 0 << 5;
const RESPONSE_SEGMENT_DOWNLOAD: u8 = 1 << 5;
pub(crate) const RESPONSE_UPLOAD: u8 = 2 << 5;
const RESPONSE_DOWNLOAD: u8 = 3 << 5;
pub(crate) const RESPONSE_ABORTED: u8 = 4 << 5;

pub(crate) const COMMAND_SPECIFIER_MASK: u8 = 0b1110_0000;
pub(crate) const EXPEDITED: u8 = 0x2;
pub(crate) const SIZE_SPECIFIED: u8 = 0x1;
const NO_MORE_DATA: u8 = 0x1;
pub(crate) const TOGGLE_BIT: u8 = 0x10;

/// Payload bytes carried by one expedited frame
pub const EXPEDITED_MAX: usize = 4;
/// Payload bytes carried by one segment frame
pub const SEGMENT_MAX: usize = 7;

fn index_of(frame: &[u8; 8]) -> (u16, u8) {
    (u16::from_le_bytes([frame[1], frame[2]]), frame[3])
}

fn abort_frame(index: u16, subindex: u8, code: SDOAbortCode) -> [u8; 8] {
    let [index_lo, index_hi] = index.to_le_bytes();
    let code = code.code().to_le_bytes();
    [
        RESPONSE_ABORTED,
        index_lo,
        index_hi,
        subindex,
        code[0],
        code[1],
        code[2],
        code[3],
    ]
}
