use crate::objectdictionary::DataType;

/// One addressable entry of a remote device's object dictionary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Variable {
    pub name: &'static str,
    pub index: u16,
    pub subindex: u8,
    pub data_type: DataType,
    /// Bytes transferred on access; the maximum length for string types.
    pub access_size: usize,
}

impl Variable {
    /// Entry of a fixed size numeric type.
    pub const fn new(name: &'static str, index: u16, subindex: u8, data_type: DataType) -> Variable {
        let access_size = match data_type.width() {
            Some(width) => width,
            None => 0,
        };
        Variable {
            name,
            index,
            subindex,
            data_type,
            access_size,
        }
    }

    /// String or octet entry of at most `max_len` bytes.
    pub const fn string(
        name: &'static str,
        index: u16,
        subindex: u8,
        data_type: DataType,
        max_len: usize,
    ) -> Variable {
        Variable {
            name,
            index,
            subindex,
            data_type,
            access_size: max_len,
        }
    }

    /// `true` if a payload of `len` bytes is a valid value of this entry.
    pub fn accepts_len(&self, len: usize) -> bool {
        match self.data_type.width() {
            Some(width) => len == width,
            None => len <= self.access_size,
        }
    }
}
