use core::fmt;

macro_rules! abort_codes {
    ($($name:ident = $code:literal => $text:literal,)*) => {
        /// CiA 301 SDO abort codes.
        ///
        /// Codes not listed here are kept verbatim in [`SDOAbortCode::Other`].
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        pub enum SDOAbortCode {
            $($name,)*
            Other(u32),
        }

        impl SDOAbortCode {
            /// The raw 32-bit abort code
            pub const fn code(self) -> u32 {
                match self {
                    $(SDOAbortCode::$name => $code,)*
                    SDOAbortCode::Other(code) => code,
                }
            }

            pub const fn description(self) -> &'static str {
                match self {
                    $(SDOAbortCode::$name => $text,)*
                    SDOAbortCode::Other(_) => "Unknown abort code",
                }
            }
        }

        impl From<u32> for SDOAbortCode {
            fn from(abort_code: u32) -> Self {
                match abort_code {
                    $($code => SDOAbortCode::$name,)*
                    other => SDOAbortCode::Other(other),
                }
            }
        }
    };
}

abort_codes! {
    ToggleBitNotAlternated = 0x0503_0000 => "Toggle bit not alternated",
    SDOProtocolTimedOut = 0x0504_0000 => "SDO protocol timed out",
    CommandSpecifierError = 0x0504_0001 => "Client/server command specifier not valid or unknown",
    InvalidBlockSize = 0x0504_0002 => "Invalid block size",
    InvalidSequenceNumber = 0x0504_0003 => "Invalid sequence number",
    CRCError = 0x0504_0004 => "CRC error",
    OutOfMemory = 0x0504_0005 => "Out of memory",
    UnsupportedAccess = 0x0601_0000 => "Unsupported access to an object",
    WriteOnlyError = 0x0601_0001 => "Attempt to read a write only object",
    ReadOnlyError = 0x0601_0002 => "Attempt to write a read only object",
    ObjectDoesNotExist = 0x0602_0000 => "Object does not exist in the object dictionary",
    ObjectCannotBeMapped = 0x0604_0041 => "Object cannot be mapped to the PDO",
    PDOOverflow = 0x0604_0042 => "The number and length of the objects to be mapped would exceed PDO length",
    ParameterIncompatibility = 0x0604_0043 => "General parameter incompatibility reason",
    InternalIncompatibility = 0x0604_0047 => "General internal incompatibility in the device",
    HardwareError = 0x0606_0000 => "Access failed due to a hardware error",
    WrongLength = 0x0607_0010 => "Data type does not match, length of service parameter does not match",
    TooLong = 0x0607_0012 => "Data type does not match, length of service parameter too high",
    TooShort = 0x0607_0013 => "Data type does not match, length of service parameter too low",
    SubindexDoesNotExist = 0x0609_0011 => "Subindex does not exist",
    InvalidValue = 0x0609_0030 => "Invalid value for parameter",
    ValueTooHigh = 0x0609_0031 => "Value of parameter written too high",
    ValueTooLow = 0x0609_0032 => "Value of parameter written too low",
    MaxLessThanMin = 0x0609_0036 => "Maximum value is less than minimum value",
    ResourceNotAvailable = 0x060A_0023 => "Resource not available: SDO connection",
    GeneralError = 0x0800_0000 => "General error",
    TransferOrStorageError = 0x0800_0020 => "Data cannot be transferred or stored to the application",
    LocalControlError = 0x0800_0021 => "Data can not be transferred or stored to the application because of local control",
    DeviceStateError = 0x0800_0022 => "Data can not be transferred or stored to the application because of the present device state",
    DictionaryError = 0x0800_0023 => "Object dictionary dynamic generation fails or no object dictionary is present",
    NoDataAvailable = 0x0800_0024 => "No data available",
}

impl From<SDOAbortCode> for u32 {
    fn from(code: SDOAbortCode) -> Self {
        code.code()
    }
}

impl From<SDOAbortCode> for [u8; 4] {
    fn from(code: SDOAbortCode) -> Self {
        code.code().to_le_bytes()
    }
}

impl fmt::Display for SDOAbortCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Code 0x{:08X}, {}", self.code(), self.description())
    }
}
