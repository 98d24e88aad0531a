use core::fmt;

/// CANopen basic data types understood by the SDO client.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    VisibleString,
    OctetString,
}

impl DataType {
    /// Encoded width of fixed size types, `None` for strings.
    pub const fn width(self) -> Option<usize> {
        match self {
            DataType::UInt8 | DataType::Int8 => Some(1),
            DataType::UInt16 | DataType::Int16 => Some(2),
            DataType::UInt32 | DataType::Int32 => Some(4),
            DataType::VisibleString | DataType::OctetString => None,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, DataType::Int8 | DataType::Int16 | DataType::Int32)
    }

    /// Inclusive value range of integer types.
    pub const fn range(self) -> Option<(i64, i64)> {
        let range = match self {
            DataType::UInt8 => (0, u8::MAX as i64),
            DataType::UInt16 => (0, u16::MAX as i64),
            DataType::UInt32 => (0, u32::MAX as i64),
            DataType::Int8 => (i8::MIN as i64, i8::MAX as i64),
            DataType::Int16 => (i16::MIN as i64, i16::MAX as i64),
            DataType::Int32 => (i32::MIN as i64, i32::MAX as i64),
            DataType::VisibleString | DataType::OctetString => return None,
        };
        Some(range)
    }
}

/// A decoded object dictionary value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    Bytes(Vec<u8>),
}

impl Value {
    /// Decodes little endian `bytes` as `data_type`.
    ///
    /// Returns `None` if the length does not match a fixed size type.
    pub fn decode(data_type: DataType, bytes: &[u8]) -> Option<Self> {
        let value = match data_type {
            DataType::UInt8 => Value::U8(u8::from_le_bytes(bytes.try_into().ok()?)),
            DataType::UInt16 => Value::U16(u16::from_le_bytes(bytes.try_into().ok()?)),
            DataType::UInt32 => Value::U32(u32::from_le_bytes(bytes.try_into().ok()?)),
            DataType::Int8 => Value::I8(i8::from_le_bytes(bytes.try_into().ok()?)),
            DataType::Int16 => Value::I16(i16::from_le_bytes(bytes.try_into().ok()?)),
            DataType::Int32 => Value::I32(i32::from_le_bytes(bytes.try_into().ok()?)),
            DataType::VisibleString | DataType::OctetString => Value::Bytes(bytes.to_vec()),
        };
        Some(value)
    }

    /// Builds the value of `data_type` closest to `raw`, or `None` if it does not fit.
    pub fn from_i64(data_type: DataType, raw: i64) -> Option<Self> {
        let value = match data_type {
            DataType::UInt8 => Value::U8(raw.try_into().ok()?),
            DataType::UInt16 => Value::U16(raw.try_into().ok()?),
            DataType::UInt32 => Value::U32(raw.try_into().ok()?),
            DataType::Int8 => Value::I8(raw.try_into().ok()?),
            DataType::Int16 => Value::I16(raw.try_into().ok()?),
            DataType::Int32 => Value::I32(raw.try_into().ok()?),
            DataType::VisibleString | DataType::OctetString => return None,
        };
        Some(value)
    }

    /// Natural data type of the value, byte strings count as octet strings.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::U8(_) => DataType::UInt8,
            Value::U16(_) => DataType::UInt16,
            Value::U32(_) => DataType::UInt32,
            Value::I8(_) => DataType::Int8,
            Value::I16(_) => DataType::Int16,
            Value::I32(_) => DataType::Int32,
            Value::Bytes(_) => DataType::OctetString,
        }
    }

    /// Little endian encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::U8(v) => v.to_le_bytes().to_vec(),
            Value::U16(v) => v.to_le_bytes().to_vec(),
            Value::U32(v) => v.to_le_bytes().to_vec(),
            Value::I8(v) => v.to_le_bytes().to_vec(),
            Value::I16(v) => v.to_le_bytes().to_vec(),
            Value::I32(v) => v.to_le_bytes().to_vec(),
            Value::Bytes(v) => v.clone(),
        }
    }

    /// Numeric value, `None` for byte strings.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::Bytes(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(bytes) => match core::str::from_utf8(bytes) {
                Ok(text) => write!(f, "{:?}", text),
                Err(_) => write!(f, "{:02X?}", bytes),
            },
            other => match other.as_i64() {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            },
        }
    }
}
