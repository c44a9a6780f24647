use std::fmt::Display;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use super::{FrameHeader, FrameSecondaryHeader, Scid, Vcid};
use crate::checksum::{compute_crc, split_crc, verify_crc, CRC_LEN};
use crate::prelude::*;

/// Length of the operational control field.
pub const OCF_LEN: usize = 4;

/// Parameters for building a [TransferFrame]. Obtain a builder with
/// [TransferFrame::builder]; `build` returns `Result<TransferFrame>`.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(build_method(into = Result<TransferFrame>))]
pub struct FrameParams {
    /// Masked to 10 bits
    scid: Scid,
    /// Masked to 3 bits
    vcid: Vcid,
    #[builder(default, setter(into))]
    data: Vec<u8>,
    /// Complete encoded secondary header, identification byte included. Empty for no
    /// secondary header.
    #[builder(default, setter(into))]
    secondary_header: Vec<u8>,
    #[builder(default, setter(strip_option))]
    ocf: Option<[u8; OCF_LEN]>,
    #[builder(default)]
    mc_frame_count: u8,
    #[builder(default)]
    vc_frame_count: u8,
    #[builder(default)]
    sync: bool,
}

impl From<FrameParams> for Result<TransferFrame> {
    fn from(params: FrameParams) -> Self {
        TransferFrame::from_params(params)
    }
}

/// TM transfer frame.
///
/// Frames are immutable values once built: the error control field is computed at
/// build time over everything preceding it.
///
/// # Example
/// ```
/// use ccsds_link::framing::TransferFrame;
///
/// let frame = TransferFrame::new(933, 2, b"Telemetry Data", &[], None).unwrap();
/// let dat = frame.encode().unwrap();
/// assert_eq!(dat.len(), 22);
/// assert_eq!(TransferFrame::decode(&dat).unwrap(), frame);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferFrame {
    pub header: FrameHeader,
    /// Present iff `header.secondary_header`
    pub secondary_header: Option<FrameSecondaryHeader>,
    pub data: Vec<u8>,
    /// Present iff `header.ocf`
    pub ocf: Option<[u8; OCF_LEN]>,
    pub error_control: u16,
}

#[allow(clippy::len_without_is_empty)]
impl TransferFrame {
    /// Smallest decodable frame, a header and error control.
    pub const MIN_LEN: usize = FrameHeader::LEN + CRC_LEN;
    pub const DATA_MAX: usize = u16::MAX as usize;

    #[must_use]
    pub fn builder() -> FrameParamsBuilder {
        FrameParams::builder()
    }

    /// Create a frame with zero counters and sync unset.
    ///
    /// `secondary_header` is a complete encoded secondary header, or empty for none.
    ///
    /// # Errors
    /// [Error::Validation] if `data` is longer than [Self::DATA_MAX] or the secondary
    /// header is not valid.
    pub fn new(
        scid: Scid,
        vcid: Vcid,
        data: &[u8],
        secondary_header: &[u8],
        ocf: Option<[u8; OCF_LEN]>,
    ) -> Result<Self> {
        Self::from_params(FrameParams {
            scid,
            vcid,
            data: data.to_vec(),
            secondary_header: secondary_header.to_vec(),
            ocf,
            mc_frame_count: 0,
            vc_frame_count: 0,
            sync: false,
        })
    }

    fn from_params(params: FrameParams) -> Result<Self> {
        if params.data.len() > Self::DATA_MAX {
            return Err(Error::Validation(format!(
                "frame data length {} exceeds maximum {}",
                params.data.len(),
                Self::DATA_MAX
            )));
        }

        let secondary_header = if params.secondary_header.is_empty() {
            None
        } else {
            Some(FrameSecondaryHeader::decode(&params.secondary_header)?)
        };
        let first_header_ptr = match (&secondary_header, params.sync) {
            (_, true) => FrameHeader::FHP_UNDEFINED,
            (Some(sh), false) => sh.len() as u16,
            (None, false) => 0,
        };

        let header = FrameHeader {
            version: 0,
            scid: params.scid & FrameHeader::SCID_MAX,
            vcid: params.vcid & FrameHeader::VCID_MAX,
            ocf: params.ocf.is_some(),
            mc_frame_count: params.mc_frame_count,
            vc_frame_count: params.vc_frame_count,
            secondary_header: secondary_header.is_some(),
            sync: params.sync,
            packet_order: false,
            segment_length_id: FrameHeader::SEGMENT_LENGTH_ID_UNSEGMENTED,
            first_header_ptr,
        };
        header.validate()?;

        let mut frame = TransferFrame {
            header,
            secondary_header,
            data: params.data,
            ocf: params.ocf,
            error_control: 0,
        };
        frame.error_control = compute_crc(&frame.encode_without_fec()?);
        Ok(frame)
    }

    /// Encoded length in bytes. Never 0, as the header and error control are always
    /// counted.
    #[must_use]
    pub fn len(&self) -> usize {
        let sh = match (self.header.secondary_header, &self.secondary_header) {
            (true, Some(sh)) => sh.len(),
            _ => 0,
        };
        let ocf = if self.header.ocf { OCF_LEN } else { 0 };
        FrameHeader::LEN + sh + self.data.len() + ocf + CRC_LEN
    }

    /// Whether the frame carries any user data.
    #[must_use]
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Encode everything except the trailing error control field.
    ///
    /// # Errors
    /// [Error::Validation] if the header or secondary header is not valid, or a flag is
    /// set for a field that is not present.
    pub fn encode_without_fec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len());
        buf.extend_from_slice(&self.header.encode()?);
        if self.header.secondary_header {
            let sh = self.secondary_header.as_ref().ok_or_else(|| {
                Error::Validation("secondary header flag set without a secondary header".into())
            })?;
            buf.extend(sh.encode()?);
        }
        buf.extend_from_slice(&self.data);
        if self.header.ocf {
            let ocf = self.ocf.ok_or_else(|| {
                Error::Validation("ocf flag set without an operational control field".into())
            })?;
            buf.extend_from_slice(&ocf);
        }
        Ok(buf)
    }

    /// Encode the complete frame, including the error control field.
    ///
    /// # Errors
    /// See [Self::encode_without_fec].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = self.encode_without_fec()?;
        buf.extend_from_slice(&self.error_control.to_be_bytes());
        Ok(buf)
    }

    /// Decode a complete frame, including error control.
    ///
    /// The error control field is verified before anything else is decoded. A
    /// secondary header occupies the number of bytes given by the first header pointer,
    /// or when sync is set, the length in its identification byte.
    ///
    /// # Errors
    /// * [Error::NotEnoughData] if `dat` is shorter than [Self::MIN_LEN]
    /// * [Error::Integrity] if the error control does not match
    /// * [Error::MalformedHeader] if a header is not valid or does not fit
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::MIN_LEN {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: Self::MIN_LEN,
            });
        }
        let (content, error_control) = split_crc(dat).ok_or(Error::NotEnoughData {
            actual: dat.len(),
            minimum: Self::MIN_LEN,
        })?;
        verify_crc(content, error_control)?;

        let header = FrameHeader::decode(content)?;
        let mut offset = FrameHeader::LEN;
        let mut end = content.len();

        let secondary_header = if header.secondary_header {
            let sh_len = if header.sync {
                match content.get(offset) {
                    Some(id) => usize::from(id & FrameSecondaryHeader::LENGTH_MAX) + 1,
                    None => {
                        return Err(Error::MalformedHeader(
                            "missing secondary header identification".into(),
                        ))
                    }
                }
            } else {
                usize::from(header.first_header_ptr)
            };
            if offset + sh_len > end {
                debug!(header = %header, sh_len, "secondary header overruns frame");
                return Err(Error::MalformedHeader(format!(
                    "secondary header length {sh_len} exceeds remaining {} bytes",
                    end - offset
                )));
            }
            let sh = FrameSecondaryHeader::decode(&content[offset..offset + sh_len])
                .map_err(|err| Error::MalformedHeader(format!("secondary header: {err}")))?;
            offset += sh_len;
            Some(sh)
        } else {
            None
        };

        let ocf = if header.ocf {
            if end - offset < OCF_LEN {
                return Err(Error::MalformedHeader(format!(
                    "ocf flag set but only {} bytes remain",
                    end - offset
                )));
            }
            let mut ocf = [0u8; OCF_LEN];
            ocf.copy_from_slice(&content[end - OCF_LEN..end]);
            end -= OCF_LEN;
            Some(ocf)
        } else {
            None
        };

        Ok(TransferFrame {
            header,
            secondary_header,
            data: content[offset..end].to_vec(),
            ocf,
            error_control,
        })
    }

    /// Read a single frame of `frame_len` bytes.
    ///
    /// The header is read and checked before the remainder of the frame.
    ///
    /// # Errors
    /// [Error::Validation] if `frame_len` is less than [Self::MIN_LEN],
    /// [Error::UnexpectedEof] if the stream ends first, or any [Self::decode] error.
    pub fn read<R>(mut r: R, frame_len: usize) -> Result<Self>
    where
        R: Read,
    {
        if frame_len < Self::MIN_LEN {
            return Err(Error::Validation(format!(
                "frame length {frame_len} is less than minimum {}",
                Self::MIN_LEN
            )));
        }
        let mut buf = vec![0u8; frame_len];
        r.read_exact(&mut buf[..FrameHeader::LEN])?;
        FrameHeader::decode(&buf)?;
        r.read_exact(&mut buf[FrameHeader::LEN..])?;
        Self::decode(&buf)
    }

    /// Write the encoded frame to `w`.
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

impl Display for TransferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransferFrame{{header: {}", self.header)?;
        if let Some(ref sh) = self.secondary_header {
            write!(f, ", secondary_header: {sh}")?;
        }
        write!(f, ", data:[len={}]", self.data.len())?;
        if let Some(ocf) = self.ocf {
            write!(f, ", ocf: {:#010x}", u32::from_be_bytes(ocf))?;
        }
        write!(f, ", error_control: {:#06x}}}", self.error_control)
    }
}
