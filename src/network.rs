use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::frame::CanOpenFrame;

/// Failure reported by the CAN adapter behind a [`Network`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("CAN adapter error: {0}")]
    Adapter(String),
    #[error("bus off")]
    BusOff,
    #[error("transmit buffer full")]
    TxBufferFull,
}

/// Raw frame transport to the CAN bus.
///
/// Channel setup (bit rate, bus on/off) is the adapter's business.
///
/// One transport is shared by every client on the bus, so receiving is
/// demultiplexed by COB-ID: a reader only takes frames with the id it asks
/// for, frames with other ids stay queued for their own readers.
pub trait Network {
    fn send_frame(&self, frame: &CanOpenFrame) -> Result<(), NetworkError>;

    /// Waits up to `timeout` for the next frame with COB-ID `cob_id`.
    /// `Ok(None)` means nothing arrived in time.
    fn receive_frame(
        &self,
        cob_id: u16,
        timeout: Duration,
    ) -> Result<Option<CanOpenFrame>, NetworkError>;
}

impl<N: Network + ?Sized> Network for &N {
    fn send_frame(&self, frame: &CanOpenFrame) -> Result<(), NetworkError> {
        (**self).send_frame(frame)
    }

    fn receive_frame(
        &self,
        cob_id: u16,
        timeout: Duration,
    ) -> Result<Option<CanOpenFrame>, NetworkError> {
        (**self).receive_frame(cob_id, timeout)
    }
}

impl<N: Network + ?Sized> Network for Arc<N> {
    fn send_frame(&self, frame: &CanOpenFrame) -> Result<(), NetworkError> {
        (**self).send_frame(frame)
    }

    fn receive_frame(
        &self,
        cob_id: u16,
        timeout: Duration,
    ) -> Result<Option<CanOpenFrame>, NetworkError> {
        (**self).receive_frame(cob_id, timeout)
    }
}
