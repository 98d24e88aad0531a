use core::cmp::{self, Ordering};

use tracing::debug;

use super::*;

type RequestResult = Result<Option<[u8; 8]>, SDOAbortCode>;

/// Object storage an [`SdoServer`] serves requests from.
pub trait ObjectStore {
    /// Fixed size of the object in bytes, `None` for variable length objects.
    fn size_hint(&self, index: u16, subindex: u8) -> Result<Option<usize>, SDOAbortCode>;
    fn read(&mut self, index: u16, subindex: u8) -> Result<Vec<u8>, SDOAbortCode>;
    fn write(&mut self, index: u16, subindex: u8, data: &[u8]) -> Result<(), SDOAbortCode>;
}

enum State {
    None,
    SegmentedUpload {
        toggle_bit: u8,
        data: Vec<u8>,
        bytes_uploaded: usize,
    },
    SegmentedDownload {
        toggle_bit: u8,
        data: Vec<u8>,
        expected_size: Option<usize>,
    },
}

/// Server side of the SDO protocol, answering one client at a time.
///
/// Used by the simulated drive; a real node would feed it frames received on
/// `0x600 + node` and send the answers on `0x580 + node`.
pub struct SdoServer {
    last_index: u16,
    last_subindex: u8,
    state: State,
}

impl Default for SdoServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SdoServer {
    pub fn new() -> Self {
        SdoServer {
            last_index: 0,
            last_subindex: 0,
            state: State::None,
        }
    }

    /// `true` while a segmented transfer is in progress
    pub fn in_transfer(&self) -> bool {
        !matches!(self.state, State::None)
    }

    /// Handles one request and returns the response to send, if any.
    pub fn on_request(&mut self, store: &mut dyn ObjectStore, data: &[u8; 8]) -> Option<[u8; 8]> {
        let ccs = data[0] & COMMAND_SPECIFIER_MASK;

        let result = match ccs {
            REQUEST_DOWNLOAD => {
                self.set_index(data);
                self.init_download(store, data)
            }
            REQUEST_SEGMENT_DOWNLOAD => self.segmented_download(store, data),
            REQUEST_UPLOAD => {
                self.set_index(data);
                self.init_upload(store)
            }
            REQUEST_SEGMENT_UPLOAD => self.segmented_upload(data[0]),
            REQUEST_ABORTED => {
                debug!("client aborted 0x{:04X}:{}", self.last_index, self.last_subindex);
                self.state = State::None;
                Ok(None)
            }
            _ => Err(SDOAbortCode::CommandSpecifierError),
        };
        match result {
            Ok(response) => response,
            Err(abort_code) => {
                self.state = State::None;
                Some(abort_frame(self.last_index, self.last_subindex, abort_code))
            }
        }
    }

    fn set_index(&mut self, request: &[u8; 8]) {
        (self.last_index, self.last_subindex) = index_of(request);
        // a new initiate request always ends a transfer in progress
        self.state = State::None;
    }

    fn init_download(&mut self, store: &mut dyn ObjectStore, request: &[u8; 8]) -> RequestResult {
        let expected_size = store.size_hint(self.last_index, self.last_subindex)?;

        let command = request[0];
        if command & EXPEDITED != 0 {
            let size = match command & SIZE_SPECIFIED {
                0 => EXPEDITED_MAX,
                _ => EXPEDITED_MAX - ((command >> 2) & 0x3) as usize,
            };
            if let Some(expected_size) = expected_size {
                check_sizes(size, expected_size)?;
            }
            store.write(self.last_index, self.last_subindex, &request[4..4 + size])?;
        } else {
            let size = match command & SIZE_SPECIFIED {
                0 => None,
                _ => Some(u32::from_le_bytes([request[4], request[5], request[6], request[7]]) as usize),
            };
            if let (Some(size), Some(expected_size)) = (size, expected_size) {
                check_sizes(size, expected_size)?;
            }
            self.state = State::SegmentedDownload {
                toggle_bit: 0,
                data: Vec::with_capacity(size.unwrap_or(0)),
                expected_size: size,
            };
        }

        let mut response = [RESPONSE_DOWNLOAD, 0, 0, 0, 0, 0, 0, 0];
        response[1..4].copy_from_slice(&request[1..4]);

        Ok(Some(response))
    }

    fn segmented_download(&mut self, store: &mut dyn ObjectStore, request: &[u8; 8]) -> RequestResult {
        let State::SegmentedDownload {
            toggle_bit,
            data,
            expected_size,
        } = &mut self.state
        else {
            return Err(SDOAbortCode::CommandSpecifierError);
        };

        // unpack command
        let command = request[0];
        if command & TOGGLE_BIT != *toggle_bit {
            return Err(SDOAbortCode::ToggleBitNotAlternated);
        }
        let last_byte = 1 + SEGMENT_MAX - ((command >> 1) & 0x7) as usize;
        let no_more_data = command & NO_MORE_DATA != 0;
        data.extend_from_slice(&request[1..last_byte]);

        if let Some(expected_size) = *expected_size {
            if data.len() > expected_size {
                return Err(SDOAbortCode::TooLong);
            }
            if no_more_data && data.len() < expected_size {
                return Err(SDOAbortCode::TooShort);
            }
        }

        // respond
        let response = [RESPONSE_SEGMENT_DOWNLOAD | *toggle_bit, 0, 0, 0, 0, 0, 0, 0];
        *toggle_bit ^= TOGGLE_BIT;

        if no_more_data {
            let data = core::mem::take(data);
            self.state = State::None;
            store.write(self.last_index, self.last_subindex, &data)?;
        }
        Ok(Some(response))
    }

    fn init_upload(&mut self, store: &mut dyn ObjectStore) -> RequestResult {
        let data = store.read(self.last_index, self.last_subindex)?;
        let mut response = [RESPONSE_UPLOAD | SIZE_SPECIFIED, 0, 0, 0, 0, 0, 0, 0];
        response[1..3].copy_from_slice(&self.last_index.to_le_bytes());
        response[3] = self.last_subindex;

        let size = data.len();
        if size > 0 && size <= EXPEDITED_MAX {
            response[0] |= EXPEDITED;
            response[0] |= ((EXPEDITED_MAX - size) as u8) << 2;
            response[4..4 + size].copy_from_slice(&data);
            return Ok(Some(response));
        }

        response[4..].copy_from_slice(&(size as u32).to_le_bytes());
        self.state = State::SegmentedUpload {
            toggle_bit: 0,
            data,
            bytes_uploaded: 0,
        };

        Ok(Some(response))
    }

    fn segmented_upload(&mut self, command: u8) -> RequestResult {
        let State::SegmentedUpload {
            toggle_bit,
            data,
            bytes_uploaded,
        } = &mut self.state
        else {
            return Err(SDOAbortCode::CommandSpecifierError);
        };

        if command & TOGGLE_BIT != *toggle_bit {
            return Err(SDOAbortCode::ToggleBitNotAlternated);
        }

        let mut response = [0; 8];
        let total_size = data.len();
        let size = cmp::min(total_size - *bytes_uploaded, SEGMENT_MAX);
        response[1..1 + size].copy_from_slice(&data[*bytes_uploaded..*bytes_uploaded + size]);
        *bytes_uploaded += size;

        let mut res_command = RESPONSE_SEGMENT_UPLOAD;
        res_command |= *toggle_bit; // add toggle bit
        res_command |= ((SEGMENT_MAX - size) as u8) << 1; // add number of bytes not used

        let finished = *bytes_uploaded == total_size;
        if finished {
            res_command |= NO_MORE_DATA; // nothing left in buffer
        }

        *toggle_bit ^= TOGGLE_BIT;
        if finished {
            self.state = State::None;
        }

        response[0] = res_command;
        Ok(Some(response))
    }
}

fn check_sizes(given: usize, expected: usize) -> Result<(), SDOAbortCode> {
    match given.cmp(&expected) {
        Ordering::Less => Err(SDOAbortCode::TooShort),
        Ordering::Greater => Err(SDOAbortCode::TooLong),
        Ordering::Equal => Ok(()),
    }
}
