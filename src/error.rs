use crate::framing::{Scid, ServiceType, Vcid};
use crate::spacepacket::Apid;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A field is outside its bit width or a cross-field invariant does not hold.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("Not enough bytes")]
    NotEnoughData {
        /// Number of bytes we got
        actual: usize,
        /// Minimum number of expected bytes
        minimum: usize,
    },
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The transport ended before a complete header or body could be read.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error(transparent)]
    Io(std::io::Error),

    /// Received and computed CRC-16 do not agree.
    #[error("integrity check failed: expected {expected:#06x}, computed {computed:#06x}")]
    Integrity { expected: u16, computed: u16 },

    #[error("unsupported secondary header field type {0}")]
    UnsupportedFieldType(u8),
    #[error("secondary header flag is set but no secondary header is present")]
    SecondaryHeaderMissing,

    #[error("virtual channel {vcid} buffer full ({capacity} frames)")]
    BufferFull { vcid: Vcid, capacity: usize },
    #[error("virtual channel {vcid} is empty")]
    Empty { vcid: Vcid },
    #[error("no virtual channels registered")]
    NoChannels,
    #[error("no frames available")]
    NoFramesAvailable,
    #[error("virtual channel {0} not registered")]
    ChannelNotFound(Vcid),

    #[error("no {service_type} service registered for virtual channel {vcid}")]
    ServiceNotFound {
        vcid: Vcid,
        service_type: ServiceType,
    },
    #[error("no master channel service registered for spacecraft {0}")]
    MasterChannelNotFound(Scid),
    #[error("frame spacecraft id {actual} does not match master channel {expected}")]
    ScidMismatch { expected: Scid, actual: Scid },
    #[error("frame virtual channel id {actual} does not match service channel {expected}")]
    VcidMismatch { expected: Vcid, actual: Vcid },
    #[error("APID {0} is already reserved")]
    ApidReserved(Apid),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
