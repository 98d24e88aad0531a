use core::fmt;

use embedded_can::{Frame, Id, StandardId};

/// A classic CAN frame as exchanged by the CANopen services of this crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CanOpenFrame {
    id: Id,
    data: [u8; 8],
    dlc: u8,
    is_remote: bool,
}

impl CanOpenFrame {
    /// Builds a standard-id data frame from a raw COB-ID.
    ///
    /// Returns `None` if `cob_id` does not fit into 11 bits or `data` is longer than 8 bytes.
    pub fn from_cob_id(cob_id: u16, data: &[u8]) -> Option<Self> {
        <Self as Frame>::new(StandardId::new(cob_id)?, data)
    }

    /// Standard-id data frame; `data` beyond 8 bytes is cut off.
    pub(crate) fn from_parts(id: StandardId, data: &[u8]) -> Self {
        let dlc = data.len().min(8);
        let mut frame_data = [0; 8];
        frame_data[..dlc].copy_from_slice(&data[..dlc]);
        CanOpenFrame {
            id: Id::Standard(id),
            data: frame_data,
            dlc: dlc as u8,
            is_remote: false,
        }
    }

    /// The 11-bit COB-ID, or `None` for extended frames.
    pub fn cob_id(&self) -> Option<u16> {
        match self.id {
            Id::Standard(id) => Some(id.as_raw()),
            Id::Extended(_) => None,
        }
    }

    /// Frame payload padded to 8 bytes, if the frame carries exactly 8 data bytes.
    ///
    /// SDO frames are always 8 bytes long, shorter frames are not valid SDO messages.
    pub fn sdo_payload(&self) -> Option<&[u8; 8]> {
        if self.is_remote || self.dlc != 8 {
            return None;
        }
        Some(&self.data)
    }
}

impl Frame for CanOpenFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }
        let mut frame_data = [0; 8];
        frame_data[0..data.len()].copy_from_slice(data);
        Some(CanOpenFrame {
            id: id.into(),
            data: frame_data,
            dlc: data.len() as u8,
            is_remote: false,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        Some(CanOpenFrame {
            id: id.into(),
            data: [0; 8],
            dlc: dlc as u8,
            is_remote: true,
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.is_remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        &self.data[0..self.dlc as usize]
    }
}

impl fmt::Display for CanOpenFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Id::Standard(id) => write!(f, "{:03X} [{}]", id.as_raw(), self.dlc)?,
            Id::Extended(id) => write!(f, "{:08X} [{}]", id.as_raw(), self.dlc)?,
        }
        for byte in self.data() {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_limits() {
        assert!(CanOpenFrame::from_cob_id(0x800, &[]).is_none());
        assert!(CanOpenFrame::from_cob_id(0x601, &[0; 9]).is_none());

        let frame = CanOpenFrame::from_cob_id(0x601, &[0x40, 0x41, 0x60]).unwrap();
        assert_eq!(frame.cob_id(), Some(0x601));
        assert_eq!(frame.data(), &[0x40, 0x41, 0x60]);
        assert_eq!(frame.sdo_payload(), None);
    }

    #[test]
    fn test_display() {
        let frame = CanOpenFrame::from_cob_id(0x5FF, &[0x4B, 0x41, 0x60, 0x00, 0x40, 0x02, 0, 0])
            .unwrap();
        assert_eq!(frame.to_string(), "5FF [8] 4B 41 60 00 40 02 00 00");
    }
}
