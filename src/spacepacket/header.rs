use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Read;

use serde::{Deserialize, Serialize};

use super::Apid;
use crate::prelude::*;

/// Packet is a part of a packet group, but not first and not last
pub const SEQ_CONTINUATION: u8 = 0;
/// Packet is the first packet in a packet group
pub const SEQ_FIRST: u8 = 1;
/// Packet is the last packet in a packet group
pub const SEQ_LAST: u8 = 2;
/// Packet is not part of a packet group, i.e., standalone.
pub const SEQ_UNSEGMENTED: u8 = 3;

/// Packet type identifier carried in the 1-bit type field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Telemetry = 0,
    Telecommand = 1,
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        value as u8
    }
}

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets.
///
/// Fields are held in plain integers so that out-of-range values can be represented
/// and rejected by [PrimaryHeader::validate] rather than silently truncated.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PrimaryHeader {
    /// 3 bits
    pub version: u8,
    /// 1 bit, see [PacketType]
    pub type_flag: u8,
    /// 1 bit; 1 when a [SecondaryHeader] follows the primary header
    pub secondary_header_flag: u8,
    /// 11 bits
    pub apid: Apid,
    /// Defines a packets grouping. See the `SEQ_*` values.
    pub sequence_flags: u8,
    /// 14 bits
    pub sequence_count: u16,
    /// Number of user data octets minus 1
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Size of a ``PrimaryHeader``
    pub const LEN: usize = 6;
    pub const VERSION_MAX: u8 = 7;
    pub const APID_MAX: Apid = 2047;
    pub const SEQ_MAX: u16 = 16383;

    #[must_use]
    pub fn has_secondary_header(&self) -> bool {
        self.secondary_header_flag == 1
    }

    /// Check every field fits its bit width.
    ///
    /// # Errors
    /// [Error::Validation] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.version > Self::VERSION_MAX {
            return Err(invalid("version", self.version, Self::VERSION_MAX));
        }
        if self.type_flag > 1 {
            return Err(invalid("type", self.type_flag, 1));
        }
        if self.secondary_header_flag > 1 {
            return Err(invalid(
                "secondary header flag",
                self.secondary_header_flag,
                1,
            ));
        }
        if self.apid > Self::APID_MAX {
            return Err(invalid("apid", self.apid, Self::APID_MAX));
        }
        if self.sequence_flags > SEQ_UNSEGMENTED {
            return Err(invalid(
                "sequence flags",
                self.sequence_flags,
                SEQ_UNSEGMENTED,
            ));
        }
        if self.sequence_count > Self::SEQ_MAX {
            return Err(invalid(
                "sequence count",
                self.sequence_count,
                Self::SEQ_MAX,
            ));
        }
        Ok(())
    }

    /// Pack into the 6 byte wire format.
    ///
    /// # Errors
    /// [Error::Validation] if any field does not fit its bit width.
    pub fn encode(&self) -> Result<[u8; Self::LEN]> {
        self.validate()?;

        let d1 = u16::from(self.version) << 13
            | u16::from(self.type_flag) << 12
            | u16::from(self.secondary_header_flag) << 11
            | self.apid;
        let d2 = u16::from(self.sequence_flags) << 14 | self.sequence_count;

        let mut buf = [0u8; Self::LEN];
        buf[..2].copy_from_slice(&d1.to_be_bytes());
        buf[2..4].copy_from_slice(&d2.to_be_bytes());
        buf[4..].copy_from_slice(&self.len_minus1.to_be_bytes());
        Ok(buf)
    }

    /// Decode from bytes.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if there are fewer than [PrimaryHeader::LEN] bytes.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: buf.len(),
                minimum: Self::LEN,
            });
        }
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        let header = PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            secondary_header_flag: (d1 >> 11 & 0x1) as u8,
            apid: (d1 & 0x7ff),
            sequence_flags: (d2 >> 14 & 0x3) as u8,
            sequence_count: (d2 & 0x3fff),
            len_minus1: d3,
        };
        header.validate()?;
        Ok(header)
    }

    /// Read header from `r`.
    ///
    /// # Errors
    /// [Error::UnexpectedEof] if the reader ends before 6 bytes are available, or
    /// any other IO error.
    pub fn read<R>(mut r: R) -> Result<PrimaryHeader>
    where
        R: Read,
    {
        let mut buf = [0u8; Self::LEN];
        r.read_exact(&mut buf)?;
        Self::decode(&buf)
    }
}

impl Display for PrimaryHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PrimaryHeader{{version={}, type={}, secondary_header={}, apid={}, sequence_flags={}, sequence_count={}, len_minus1={}}}",
            self.version,
            self.type_flag,
            self.secondary_header_flag,
            self.apid,
            self.sequence_flags,
            self.sequence_count,
            self.len_minus1,
        )
    }
}

fn invalid<T: Display>(field: &str, value: T, max: T) -> Error {
    Error::Validation(format!("{field} {value} exceeds maximum {max}"))
}

/// A typed mission specific secondary header value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FieldValue {
    String(String),
}

impl FieldValue {
    /// Wire tag for [FieldValue::String]
    pub const TAG_STRING: u8 = 1;
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Mission specific packet secondary header.
///
/// Wire format is an 8 byte big-endian timestamp followed by zero or more fields, each
/// encoded as:
///
/// | bytes | content |
/// |---|---|
/// | 2 | key length |
/// | n | key |
/// | 1 | value type tag |
/// | 2 | value length |
/// | m | value |
///
/// Fields are written in key order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SecondaryHeader {
    pub timestamp: u64,
    pub other_fields: BTreeMap<String, FieldValue>,
}

impl SecondaryHeader {
    /// Length of the timestamp, the only mandatory part of the header.
    pub const TIMESTAMP_LEN: usize = 8;

    #[must_use]
    pub fn new(timestamp: u64) -> Self {
        SecondaryHeader {
            timestamp,
            other_fields: BTreeMap::default(),
        }
    }

    /// Add a field, replacing any existing field with the same key.
    #[must_use]
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.other_fields.insert(key.into(), value.into());
        self
    }

    /// # Errors
    /// [Error::Validation] if the timestamp is zero.
    pub fn validate(&self) -> Result<()> {
        if self.timestamp == 0 {
            return Err(Error::Validation(
                "secondary header timestamp cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// # Errors
    /// [Error::Validation] if the header is not valid or a key or value is longer than
    /// `u16::MAX` bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::with_capacity(Self::TIMESTAMP_LEN);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        for (key, value) in &self.other_fields {
            put_prefixed(&mut buf, key.as_bytes(), "field key")?;
            match value {
                FieldValue::String(s) => {
                    buf.push(FieldValue::TAG_STRING);
                    put_prefixed(&mut buf, s.as_bytes(), "field value")?;
                }
            }
        }
        Ok(buf)
    }

    /// Decode from bytes, consuming all of `dat`.
    ///
    /// # Errors
    /// * [Error::NotEnoughData] if there are fewer than 8 bytes
    /// * [Error::MalformedHeader] if a length prefix runs past the end of `dat` or data
    ///   is not valid UTF-8
    /// * [Error::UnsupportedFieldType] for an unknown field type tag
    /// * [Error::Validation] if the decoded header is not valid
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::TIMESTAMP_LEN {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: Self::TIMESTAMP_LEN,
            });
        }
        let (ts, mut rest) = dat.split_at(Self::TIMESTAMP_LEN);
        let mut header = SecondaryHeader::new(u64::from_be_bytes([
            ts[0], ts[1], ts[2], ts[3], ts[4], ts[5], ts[6], ts[7],
        ]));

        while !rest.is_empty() {
            let key = take_string(&mut rest, "field key")?;
            let tag = take(&mut rest, 1, "field type")?[0];
            let value = match tag {
                FieldValue::TAG_STRING => FieldValue::String(take_string(&mut rest, "field value")?),
                _ => return Err(Error::UnsupportedFieldType(tag)),
            };
            header.other_fields.insert(key, value);
        }

        header.validate()?;
        Ok(header)
    }
}

impl Display for SecondaryHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecondaryHeader{{timestamp={}", self.timestamp)?;
        for (key, value) in &self.other_fields {
            write!(f, ", {key}={value}")?;
        }
        write!(f, "}}")
    }
}

fn put_prefixed(buf: &mut Vec<u8>, dat: &[u8], what: &str) -> Result<()> {
    let len = u16::try_from(dat.len()).map_err(|_| {
        Error::Validation(format!(
            "{what} length {} exceeds maximum {}",
            dat.len(),
            u16::MAX
        ))
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(dat);
    Ok(())
}

fn take<'a>(dat: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8]> {
    if dat.len() < n {
        return Err(Error::MalformedHeader(format!(
            "{what} needs {n} bytes, {} remain",
            dat.len()
        )));
    }
    let (head, tail) = dat.split_at(n);
    *dat = tail;
    Ok(head)
}

fn take_string(dat: &mut &[u8], what: &str) -> Result<String> {
    let len = take(dat, 2, what)?;
    let len = u16::from_be_bytes([len[0], len[1]]) as usize;
    let raw = take(dat, len, what)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| Error::MalformedHeader(format!("{what} is not valid utf-8")))
}
