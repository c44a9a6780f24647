//! CCSDS Space Packet Protocol.
//!
//! A [SpacePacket] is a [PrimaryHeader], an optional [SecondaryHeader], user data and
//! an optional CRC-16 error control field. Packets are constructed with
//! [SpacePacket::new], which validates the result, and round-trip through
//! [SpacePacket::encode] and [SpacePacket::decode].
mod header;
mod service;

use std::fmt::Display;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::{compute_crc, verify_crc, CRC_LEN};
use crate::prelude::*;

pub use header::{
    FieldValue, PacketType, PrimaryHeader, SecondaryHeader, SEQ_CONTINUATION, SEQ_FIRST,
    SEQ_LAST, SEQ_UNSEGMENTED,
};
pub use service::{decapsulate_octet_string, describe_apid, encapsulate_octet_string, ApidRegistry};

pub type Apid = u16;

/// Optional packet configuration applied, in order, by [SpacePacket::new].
#[derive(Debug, Clone)]
pub enum PacketOption {
    /// Attach a secondary header and set the primary header flag.
    SecondaryHeader(SecondaryHeader),
    /// Attach a caller provided error control value.
    ErrorControl(u16),
    /// Attach the CRC-16 of the packet as configured when this option is applied.
    /// It should therefore be the last option.
    ComputedErrorControl,
    SequenceCount(u16),
    /// See the `SEQ_*` values.
    SequenceFlags(u8),
}

impl PacketOption {
    fn apply(self, packet: &mut SpacePacket) -> Result<()> {
        match self {
            PacketOption::SecondaryHeader(header) => {
                header.validate()?;
                packet.header.secondary_header_flag = 1;
                packet.secondary_header = Some(header);
            }
            PacketOption::ErrorControl(crc) => packet.error_control = Some(crc),
            PacketOption::ComputedErrorControl => {
                packet.error_control = Some(compute_crc(&packet.encode_without_error_control()?));
            }
            PacketOption::SequenceCount(count) => {
                if count > PrimaryHeader::SEQ_MAX {
                    return Err(Error::Validation(format!(
                        "sequence count {count} exceeds maximum {}",
                        PrimaryHeader::SEQ_MAX
                    )));
                }
                packet.header.sequence_count = count;
            }
            PacketOption::SequenceFlags(flags) => {
                if flags > SEQ_UNSEGMENTED {
                    return Err(Error::Validation(format!(
                        "sequence flags {flags} exceeds maximum {SEQ_UNSEGMENTED}"
                    )));
                }
                packet.header.sequence_flags = flags;
            }
        }
        Ok(())
    }
}

/// SpacePacket represents a single CCSDS space packet and its associated data.
///
/// # Example
/// ```
/// use ccsds_link::spacepacket::{PacketType, SpacePacket};
///
/// let packet = SpacePacket::new(100, PacketType::Telemetry, vec![1, 2, 3], []).unwrap();
/// let dat = packet.encode().unwrap();
/// assert_eq!(dat, [0x00, 0x64, 0xc0, 0x00, 0x00, 0x02, 0x01, 0x02, 0x03]);
///
/// let decoded = SpacePacket::decode(&dat).unwrap();
/// assert_eq!(decoded.header.apid, 100);
/// assert_eq!(decoded.data, [1, 2, 3]);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpacePacket {
    pub header: PrimaryHeader,
    /// Present iff `header.secondary_header_flag == 1`
    pub secondary_header: Option<SecondaryHeader>,
    /// User data, not including any secondary header or error control
    pub data: Vec<u8>,
    pub error_control: Option<u16>,
}

impl Display for SpacePacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SpacePacket{{header: {}", self.header)?;
        if let Some(ref sh) = self.secondary_header {
            write!(f, ", secondary_header: {sh}")?;
        }
        write!(f, ", data:[len={}]", self.data.len())?;
        if let Some(crc) = self.error_control {
            write!(f, ", error_control: {crc:#06x}")?;
        }
        write!(f, "}}")
    }
}

impl SpacePacket {
    /// Smallest valid packet: a primary header and 1 byte of user data
    pub const MIN_LEN: usize = PrimaryHeader::LEN + 1;
    /// Largest valid packet: a primary header and 65536 bytes of user data
    pub const MAX_LEN: usize = PrimaryHeader::LEN + u16::MAX as usize + 1;

    /// Create a new standalone packet with sequence count 0.
    ///
    /// # Errors
    /// [Error::Validation] if `apid` is out of range, the packet size is outside
    /// [Self::MIN_LEN]..=[Self::MAX_LEN], or an option fails.
    pub fn new<I>(apid: Apid, packet_type: PacketType, data: Vec<u8>, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = PacketOption>,
    {
        if apid > PrimaryHeader::APID_MAX {
            return Err(Error::Validation(format!(
                "apid {apid} exceeds maximum {}",
                PrimaryHeader::APID_MAX
            )));
        }
        check_size(PrimaryHeader::LEN + data.len())?;
        let len_minus1 = u16::try_from(data.len() - 1)
            .map_err(|_| Error::Validation(format!("user data length {}", data.len())))?;

        let mut packet = SpacePacket {
            header: PrimaryHeader {
                version: 0,
                type_flag: packet_type.into(),
                secondary_header_flag: 0,
                apid,
                sequence_flags: SEQ_UNSEGMENTED,
                sequence_count: 0,
                len_minus1,
            },
            secondary_header: None,
            data,
            error_control: None,
        };
        for option in options {
            option.apply(&mut packet)?;
        }
        packet.validate()?;
        Ok(packet)
    }

    /// Create a telemetry packet. See [SpacePacket::new].
    ///
    /// # Errors
    /// See [SpacePacket::new].
    pub fn telemetry<I>(apid: Apid, data: Vec<u8>, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = PacketOption>,
    {
        Self::new(apid, PacketType::Telemetry, data, options)
    }

    /// Create a telecommand packet. See [SpacePacket::new].
    ///
    /// # Errors
    /// See [SpacePacket::new].
    pub fn telecommand<I>(apid: Apid, data: Vec<u8>, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = PacketOption>,
    {
        Self::new(apid, PacketType::Telecommand, data, options)
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.header.sequence_flags == SEQ_FIRST
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.header.sequence_flags == SEQ_LAST
    }

    #[must_use]
    pub fn is_cont(&self) -> bool {
        self.header.sequence_flags == SEQ_CONTINUATION
    }

    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.header.sequence_flags == SEQ_UNSEGMENTED
    }

    /// Check header fields, secondary header presence, and that the user data agrees
    /// with the header length.
    ///
    /// # Errors
    /// [Error::SecondaryHeaderMissing] if flagged but absent, otherwise
    /// [Error::Validation].
    pub fn validate(&self) -> Result<()> {
        self.header.validate()?;
        if self.header.has_secondary_header() {
            match self.secondary_header {
                Some(ref sh) => sh.validate()?,
                None => return Err(Error::SecondaryHeaderMissing),
            }
        }

        let expected = self.header.len_minus1 as usize + 1;
        if self.data.len() != expected {
            return Err(Error::Validation(format!(
                "user data length {} does not match header length {expected}",
                self.data.len()
            )));
        }
        check_size(PrimaryHeader::LEN + self.data.len())
    }

    fn encode_without_error_control(&self) -> Result<Vec<u8>> {
        let mut dat = Vec::with_capacity(PrimaryHeader::LEN + self.data.len() + CRC_LEN);
        dat.extend_from_slice(&self.header.encode()?);
        if self.header.has_secondary_header() {
            let sh = self
                .secondary_header
                .as_ref()
                .ok_or(Error::SecondaryHeaderMissing)?;
            dat.extend_from_slice(&sh.encode()?);
        }
        dat.extend_from_slice(&self.data);
        Ok(dat)
    }

    /// Encode to the wire format.
    ///
    /// # Errors
    /// [Error::SecondaryHeaderMissing] if the header flags a secondary header that is
    /// not present, or [Error::Validation] if a header is invalid.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut dat = self.encode_without_error_control()?;
        if let Some(crc) = self.error_control {
            dat.extend_from_slice(&crc.to_be_bytes());
        }
        Ok(dat)
    }

    /// Decode from bytes.
    ///
    /// If the secondary header flag is set the 8 byte timestamp following the primary
    /// header is decoded as the secondary header. User data extends for the length
    /// given in the header, or to the end of `dat` if it is shorter. Two or more bytes
    /// remaining after the user data are taken as the error control field.
    ///
    /// # Secondary header fields
    /// Only the timestamp is decoded. A packet encoded with
    /// [SecondaryHeader::other_fields] still decodes successfully, but the field bytes
    /// are returned as the start of `data` and the tail of the user data may be taken
    /// as an error control field. Use [SecondaryHeader::decode] directly when the
    /// extent of the secondary header is known.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if there are not enough bytes for the headers, or any
    /// error from [SpacePacket::validate].
    pub fn decode(dat: &[u8]) -> Result<Self> {
        let header = PrimaryHeader::decode(dat)?;
        let mut offset = PrimaryHeader::LEN;

        let secondary_header = if header.has_secondary_header() {
            let end = offset + SecondaryHeader::TIMESTAMP_LEN;
            if dat.len() < end {
                return Err(Error::NotEnoughData {
                    actual: dat.len(),
                    minimum: end,
                });
            }
            let sh = SecondaryHeader::decode(&dat[offset..end])?;
            offset = end;
            Some(sh)
        } else {
            None
        };

        let data_end = (offset + header.len_minus1 as usize + 1).min(dat.len());
        let data = dat[offset..data_end].to_vec();
        let error_control = if dat.len() >= data_end + CRC_LEN {
            Some(u16::from_be_bytes([dat[data_end], dat[data_end + 1]]))
        } else {
            None
        };

        let packet = SpacePacket {
            header,
            secondary_header,
            data,
            error_control,
        };
        if let Err(err) = packet.validate() {
            debug!(header = %packet.header, "invalid packet: {err}");
            return Err(err);
        }
        Ok(packet)
    }

    /// Check the error control field, if present, against the CRC-16 of the rest of
    /// the encoded packet.
    ///
    /// # Errors
    /// [Error::Integrity] on mismatch, or any encoding error.
    pub fn verify_error_control(&self) -> Result<()> {
        match self.error_control {
            Some(crc) => verify_crc(&self.encode_without_error_control()?, crc),
            None => Ok(()),
        }
    }

    /// Total number of bytes a packet with `header` occupies on a packet stream, which
    /// carries no error control field.
    fn stream_len(header: &PrimaryHeader) -> usize {
        let secondary = if header.has_secondary_header() {
            SecondaryHeader::TIMESTAMP_LEN
        } else {
            0
        };
        PrimaryHeader::LEN + secondary + header.len_minus1 as usize + 1
    }

    /// Read a single [SpacePacket].
    ///
    /// Exactly 6 header bytes are read, then the remainder of the packet as computed
    /// from the header.
    ///
    /// # Errors
    /// [Error::UnexpectedEof] if the stream ends early, any other IO error, or any
    /// decode error.
    pub fn read<R>(mut r: R) -> Result<SpacePacket>
    where
        R: Read,
    {
        let mut buf = vec![0u8; PrimaryHeader::LEN];
        r.read_exact(&mut buf)?;
        let header = PrimaryHeader::decode(&buf)?;
        buf.resize(Self::stream_len(&header), 0);
        r.read_exact(&mut buf[PrimaryHeader::LEN..])?;
        Self::decode(&buf)
    }

    /// Write the encoded packet to `w`.
    ///
    /// # Errors
    /// Any encoding or IO error.
    pub fn write<W>(&self, mut w: W) -> Result<()>
    where
        W: Write,
    {
        w.write_all(&self.encode()?)?;
        Ok(())
    }
}

fn check_size(len: usize) -> Result<()> {
    if !(SpacePacket::MIN_LEN..=SpacePacket::MAX_LEN).contains(&len) {
        return Err(Error::Validation(format!(
            "packet length {len} must be between {} and {} octets",
            SpacePacket::MIN_LEN,
            SpacePacket::MAX_LEN
        )));
    }
    Ok(())
}

pub struct PacketReaderIter<R>
where
    R: Read,
{
    reader: R,
    /// Byte offset of the next packet
    pub offset: usize,
}

impl<R> PacketReaderIter<R>
where
    R: Read,
{
    /// Read the bytes of the next packet, advancing `offset` past everything consumed
    /// whether or not the packet later decodes.
    fn read_packet_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; PrimaryHeader::LEN];
        self.reader.read_exact(&mut buf)?;
        self.offset += PrimaryHeader::LEN;
        let header = PrimaryHeader::decode(&buf)?;
        buf.resize(SpacePacket::stream_len(&header), 0);
        self.reader.read_exact(&mut buf[PrimaryHeader::LEN..])?;
        self.offset += buf.len() - PrimaryHeader::LEN;
        Ok(buf)
    }
}

impl<R> Iterator for PacketReaderIter<R>
where
    R: Read,
{
    type Item = Result<SpacePacket>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_packet_bytes() {
            Ok(dat) => Some(SpacePacket::decode(&dat)),
            Err(Error::UnexpectedEof) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Return an iterator providing [SpacePacket]s read from a byte synchronized packet
/// stream.
///
/// Iteration ends at the end of the stream. A partial packet at the end of the stream
/// is discarded.
///
/// # Examples
/// ```
/// use ccsds_link::spacepacket::read_packets;
///
/// let dat: &[u8] = &[
///     // primary header bytes
///     0x0d, 0x59, 0xc0, 0x01, 0x00, 0x00,
///     // 8 byte secondary header timestamp
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
///     // 1 byte of user data
///     0xff,
/// ];
///
/// let packets: Vec<_> = read_packets(dat).collect();
/// assert_eq!(packets.len(), 1);
/// assert_eq!(packets[0].as_ref().unwrap().header.apid, 1369);
/// ```
pub fn read_packets<R>(reader: R) -> PacketReaderIter<R>
where
    R: Read,
{
    PacketReaderIter { reader, offset: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_case::test_case;

    #[test]
    fn test_new_defaults() {
        let packet = SpacePacket::new(100, PacketType::Telemetry, vec![1, 2, 3], []).unwrap();

        assert_eq!(packet.header.version, 0);
        assert_eq!(packet.header.type_flag, 0);
        assert_eq!(packet.header.secondary_header_flag, 0);
        assert_eq!(packet.header.sequence_flags, SEQ_UNSEGMENTED);
        assert_eq!(packet.header.sequence_count, 0);
        assert_eq!(packet.header.len_minus1, 2);
        assert!(packet.is_standalone());
        assert!(packet.secondary_header.is_none());
        assert!(packet.error_control.is_none());
    }

    #[test]
    fn test_roundtrip_no_options() {
        let packet = SpacePacket::new(100, PacketType::Telemetry, vec![1, 2, 3], []).unwrap();
        let dat = packet.encode().unwrap();
        assert_eq!(dat.len(), 9);

        let decoded = SpacePacket::decode(&dat).unwrap();
        assert_eq!(decoded.header.apid, 100);
        assert_eq!(decoded.data, [1, 2, 3]);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_roundtrip_all_options() {
        let packet = SpacePacket::telecommand(
            2047,
            b"command".to_vec(),
            [
                PacketOption::SecondaryHeader(SecondaryHeader::new(1_700_000_000)),
                PacketOption::SequenceCount(PrimaryHeader::SEQ_MAX),
                PacketOption::SequenceFlags(SEQ_FIRST),
                PacketOption::ComputedErrorControl,
            ],
        )
        .unwrap();
        assert!(packet.is_first());
        assert_eq!(packet.header.type_flag, 1);

        let dat = packet.encode().unwrap();
        assert_eq!(dat.len(), 6 + 8 + 7 + 2);

        let decoded = SpacePacket::decode(&dat).unwrap();
        assert_eq!(decoded, packet);
        decoded.verify_error_control().unwrap();
    }

    #[test]
    fn test_explicit_error_control_is_encoded() {
        let packet =
            SpacePacket::telemetry(1, vec![0xaa], [PacketOption::ErrorControl(0xbeef)]).unwrap();
        let dat = packet.encode().unwrap();
        assert_eq!(&dat[dat.len() - 2..], &[0xbe, 0xef]);
        assert!(matches!(
            packet.verify_error_control(),
            Err(Error::Integrity {
                expected: 0xbeef,
                ..
            })
        ));
    }

    #[test_case(2047, true ; "apid max")]
    #[test_case(2048, false ; "apid overflow")]
    fn test_new_apid(apid: Apid, ok: bool) {
        assert_eq!(
            SpacePacket::telemetry(apid, vec![0], []).is_ok(),
            ok
        );
    }

    #[test_case(0, false ; "empty")]
    #[test_case(1, true ; "minimum")]
    #[test_case(65536, true ; "maximum")]
    #[test_case(65537, false ; "too large")]
    fn test_new_size(len: usize, ok: bool) {
        assert_eq!(
            SpacePacket::telemetry(1, vec![0; len], []).is_ok(),
            ok
        );
    }

    #[test]
    fn test_option_failure_aborts() {
        let zult = SpacePacket::telemetry(
            1,
            vec![0],
            [PacketOption::SecondaryHeader(SecondaryHeader::new(0))],
        );
        assert!(matches!(zult, Err(Error::Validation(_))), "{zult:?}");

        let zult = SpacePacket::telemetry(1, vec![0], [PacketOption::SequenceCount(16384)]);
        assert!(matches!(zult, Err(Error::Validation(_))), "{zult:?}");
    }

    #[test]
    fn test_encode_missing_secondary_header() {
        let mut packet = SpacePacket::telemetry(1, vec![0], []).unwrap();
        packet.header.secondary_header_flag = 1;
        assert!(matches!(
            packet.encode(),
            Err(Error::SecondaryHeaderMissing)
        ));
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            SpacePacket::decode(&[0u8; 5]),
            Err(Error::NotEnoughData { .. })
        ));
        // flagged secondary header but not enough bytes for it
        assert!(matches!(
            SpacePacket::decode(&[0x08, 0x01, 0xc0, 0x00, 0x00, 0x00, 0x00]),
            Err(Error::NotEnoughData { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_data_is_error() {
        // header claims 4 bytes of data, only 2 present
        let dat = [0x00, 0x64, 0xc0, 0x00, 0x00, 0x03, 0x01, 0x02];
        let zult = SpacePacket::decode(&dat);
        assert!(matches!(zult, Err(Error::Validation(_))), "{zult:?}");
    }

    #[test]
    fn test_decode_reads_timestamp_only() {
        let sh = SecondaryHeader::new(7).with_field("k", "v");
        let packet = SpacePacket::telemetry(
            3,
            vec![1, 2, 3, 4, 5, 6, 7, 8],
            [PacketOption::SecondaryHeader(sh.clone())],
        )
        .unwrap();
        let dat = packet.encode().unwrap();

        let decoded = SpacePacket::decode(&dat).unwrap();
        assert_eq!(decoded.secondary_header.as_ref().unwrap().timestamp, 7);
        assert!(decoded.secondary_header.unwrap().other_fields.is_empty());
        assert_ne!(decoded.data, packet.data);
        assert!(decoded.error_control.is_some());

        // recoverable when the extent is known
        let sh_len = sh.encode().unwrap().len();
        let end = PrimaryHeader::LEN + sh_len;
        assert_eq!(SecondaryHeader::decode(&dat[PrimaryHeader::LEN..end]).unwrap(), sh);
        assert_eq!(dat[end..], packet.data);
    }

    #[test]
    fn test_decode_ignores_single_trailing_byte() {
        let dat = [0x00, 0x64, 0xc0, 0x00, 0x00, 0x00, 0x01, 0xff];
        let packet = SpacePacket::decode(&dat).unwrap();
        assert_eq!(packet.data, [0x01]);
        assert!(packet.error_control.is_none());
    }

    #[test]
    fn test_read_write() {
        let packets = vec![
            SpacePacket::telemetry(1, vec![1, 2, 3], []).unwrap(),
            SpacePacket::telemetry(
                2,
                vec![4],
                [PacketOption::SecondaryHeader(SecondaryHeader::new(99))],
            )
            .unwrap(),
        ];
        let mut buf = Vec::new();
        for p in &packets {
            p.write(&mut buf).unwrap();
        }

        let mut iter = read_packets(Cursor::new(buf));
        assert_eq!(iter.next().unwrap().unwrap(), packets[0]);
        assert_eq!(iter.offset, 9);
        assert_eq!(iter.next().unwrap().unwrap(), packets[1]);
        assert_eq!(iter.offset, 9 + 15);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_read_packets_offset_after_decode_error() {
        let good = SpacePacket::telemetry(1, vec![1, 2, 3], []).unwrap();
        let mut buf = Vec::new();
        // secondary header flag set with a zero timestamp
        buf.extend_from_slice(&[0x08, 0x02, 0xc0, 0x00, 0x00, 0x00]);
        buf.extend_from_slice(&[0u8; 8]);
        buf.push(0xaa);
        good.write(&mut buf).unwrap();

        let mut iter = read_packets(Cursor::new(buf));
        let zult = iter.next().unwrap();
        assert!(matches!(zult, Err(Error::Validation(_))), "{zult:?}");
        assert_eq!(iter.offset, 15);
        assert_eq!(iter.next().unwrap().unwrap(), good);
        assert_eq!(iter.offset, 15 + 9);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_read_short_body() {
        let dat: &[u8] = &[0x00, 0x64, 0xc0, 0x00, 0x00, 0x03, 0x01];
        assert!(matches!(
            SpacePacket::read(dat),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn test_display() {
        let packet = SpacePacket::telemetry(5, vec![1, 2], []).unwrap();
        let s = packet.to_string();
        assert!(s.contains("apid=5"), "{s}");
        assert!(s.contains("data:[len=2]"), "{s}");
    }
}
