use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Scid, Vcid};
use crate::prelude::*;

/// TM transfer frame primary header.
///
/// ```text
/// byte 0   version(2) scid[9:4]
/// byte 1   scid[3:0] vcid(3) ocf(1)
/// byte 2   master channel frame count
/// byte 3   virtual channel frame count
/// byte 4-5 fsh(1) sync(1) order(1) segment_length_id(2) first_header_ptr(11)
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    /// Operational control field present
    pub ocf: bool,
    pub mc_frame_count: u8,
    pub vc_frame_count: u8,
    /// Frame secondary header present
    pub secondary_header: bool,
    pub sync: bool,
    pub packet_order: bool,
    pub segment_length_id: u8,
    pub first_header_ptr: u16,
}

impl Display for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FrameHeader{{version={}, scid={}, vcid={}, ocf={}, mc_count={}, vc_count={}, fsh={}, sync={}, order={}, segment_length_id={}, fhp={}}}",
            self.version,
            self.scid,
            self.vcid,
            self.ocf,
            self.mc_frame_count,
            self.vc_frame_count,
            self.secondary_header,
            self.sync,
            self.packet_order,
            self.segment_length_id,
            self.first_header_ptr,
        )
    }
}

impl FrameHeader {
    pub const LEN: usize = 6;
    pub const SCID_MAX: Scid = 0x3ff;
    pub const VCID_MAX: Vcid = 7;
    /// Segment length id required when `sync` is false.
    pub const SEGMENT_LENGTH_ID_UNSEGMENTED: u8 = 0b11;
    /// First header pointer required when `sync` is true.
    pub const FHP_UNDEFINED: u16 = 0x7ff;

    /// Create a header with all counters zero and no optional fields.
    #[must_use]
    pub fn new(scid: Scid, vcid: Vcid) -> Self {
        FrameHeader {
            version: 0,
            scid,
            vcid,
            ocf: false,
            mc_frame_count: 0,
            vc_frame_count: 0,
            secondary_header: false,
            sync: false,
            packet_order: false,
            segment_length_id: Self::SEGMENT_LENGTH_ID_UNSEGMENTED,
            first_header_ptr: 0,
        }
    }

    /// Master channel id: transfer frame version and spacecraft id.
    #[must_use]
    pub fn mcid(&self) -> u16 {
        u16::from(self.version) << 8 | self.scid
    }

    /// Global virtual channel id: master channel id plus virtual channel id.
    #[must_use]
    pub fn gvcid(&self) -> u16 {
        self.mcid().wrapping_add(u16::from(self.vcid))
    }

    /// # Errors
    /// [Error::Validation] if any field exceeds its width or the sync dependent
    /// constraints do not hold.
    pub fn validate(&self) -> Result<()> {
        if self.version != 0 {
            return Err(Error::Validation(format!(
                "frame version {} must be 0 for TM",
                self.version
            )));
        }
        if self.scid > Self::SCID_MAX {
            return Err(Error::Validation(format!(
                "scid {} exceeds maximum {}",
                self.scid,
                Self::SCID_MAX
            )));
        }
        if self.vcid > Self::VCID_MAX {
            return Err(Error::Validation(format!(
                "vcid {} exceeds maximum {}",
                self.vcid,
                Self::VCID_MAX
            )));
        }
        if self.segment_length_id > 3 {
            return Err(Error::Validation(format!(
                "segment length id {} exceeds maximum 3",
                self.segment_length_id
            )));
        }
        if self.first_header_ptr > Self::FHP_UNDEFINED {
            return Err(Error::Validation(format!(
                "first header pointer {} exceeds maximum {}",
                self.first_header_ptr,
                Self::FHP_UNDEFINED
            )));
        }
        if self.sync {
            if self.first_header_ptr != Self::FHP_UNDEFINED {
                return Err(Error::Validation(format!(
                    "first header pointer must be {:#x} when sync is set, got {:#x}",
                    Self::FHP_UNDEFINED,
                    self.first_header_ptr
                )));
            }
        } else {
            if self.packet_order {
                return Err(Error::Validation(
                    "packet order must be 0 when sync is not set".to_string(),
                ));
            }
            if self.segment_length_id != Self::SEGMENT_LENGTH_ID_UNSEGMENTED {
                return Err(Error::Validation(format!(
                    "segment length id must be 3 when sync is not set, got {}",
                    self.segment_length_id
                )));
            }
        }
        Ok(())
    }

    /// # Errors
    /// [Error::Validation] if the header is not valid.
    pub fn encode(&self) -> Result<[u8; Self::LEN]> {
        self.validate()?;

        let mut buf = [0u8; Self::LEN];
        buf[0] = (self.version << 6) | ((self.scid >> 4) & 0x3f) as u8;
        buf[1] = ((self.scid & 0xf) as u8) << 4 | (self.vcid << 1) | u8::from(self.ocf);
        buf[2] = self.mc_frame_count;
        buf[3] = self.vc_frame_count;
        buf[4] = u8::from(self.secondary_header) << 7
            | u8::from(self.sync) << 6
            | u8::from(self.packet_order) << 5
            | (self.segment_length_id & 0x3) << 3
            | ((self.first_header_ptr >> 8) & 0x7) as u8;
        buf[5] = (self.first_header_ptr & 0xff) as u8;
        Ok(buf)
    }

    /// Decode from the first [Self::LEN] bytes of `dat`.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `dat` is too short, [Error::MalformedHeader] if the
    /// decoded fields are not valid.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }

        let header = FrameHeader {
            version: (dat[0] >> 6) & 0x3,
            scid: u16::from(dat[0] & 0x3f) << 4 | u16::from(dat[1] >> 4),
            vcid: (dat[1] >> 1) & 0x7,
            ocf: dat[1] & 0x1 == 1,
            mc_frame_count: dat[2],
            vc_frame_count: dat[3],
            secondary_header: (dat[4] >> 7) & 0x1 == 1,
            sync: (dat[4] >> 6) & 0x1 == 1,
            packet_order: (dat[4] >> 5) & 0x1 == 1,
            segment_length_id: (dat[4] >> 3) & 0x3,
            first_header_ptr: u16::from(dat[4] & 0x7) << 8 | u16::from(dat[5]),
        };
        if let Err(err) = header.validate() {
            debug!(header = %header, "invalid frame header: {err}");
            return Err(Error::MalformedHeader(err.to_string()));
        }
        Ok(header)
    }
}

/// TM transfer frame secondary header: an identification byte, version(2) and
/// length(6), followed by mission specific data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FrameSecondaryHeader {
    pub version: u8,
    /// Length of the secondary header minus 1, i.e., the data length
    pub header_length: u8,
    pub data: Vec<u8>,
}

impl FrameSecondaryHeader {
    pub const LENGTH_MAX: u8 = 0x3f;

    /// Create a version 0 secondary header carrying `data`.
    ///
    /// # Errors
    /// [Error::Validation] if `data` is longer than [Self::LENGTH_MAX].
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let header_length = u8::try_from(data.len())
            .ok()
            .filter(|len| *len <= Self::LENGTH_MAX)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "secondary header data length {} exceeds maximum {}",
                    data.len(),
                    Self::LENGTH_MAX
                ))
            })?;
        let header = FrameSecondaryHeader {
            version: 0,
            header_length,
            data,
        };
        header.validate()?;
        Ok(header)
    }

    /// Encoded length, including the identification byte.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// # Errors
    /// [Error::Validation] if the version is not 0, a length exceeds 6 bits, or the
    /// length field disagrees with the data length.
    pub fn validate(&self) -> Result<()> {
        if self.version != 0 {
            return Err(Error::Validation(format!(
                "secondary header version {} must be 0",
                self.version
            )));
        }
        if self.header_length > Self::LENGTH_MAX {
            return Err(Error::Validation(format!(
                "secondary header length {} exceeds maximum {}",
                self.header_length,
                Self::LENGTH_MAX
            )));
        }
        if self.data.len() > Self::LENGTH_MAX as usize {
            return Err(Error::Validation(format!(
                "secondary header data length {} exceeds maximum {}",
                self.data.len(),
                Self::LENGTH_MAX
            )));
        }
        if usize::from(self.header_length) != self.data.len() {
            return Err(Error::Validation(format!(
                "secondary header length {} does not match data length {}",
                self.header_length,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// # Errors
    /// [Error::Validation] if the header is not valid.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut buf = Vec::with_capacity(self.len());
        buf.push(self.version << 6 | (self.header_length & Self::LENGTH_MAX));
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    /// Decode from `dat`. All bytes after the identification byte are data.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `dat` is empty, otherwise see [Self::validate].
    pub fn decode(dat: &[u8]) -> Result<Self> {
        let Some((id, data)) = dat.split_first() else {
            return Err(Error::NotEnoughData {
                actual: 0,
                minimum: 1,
            });
        };
        let header = FrameSecondaryHeader {
            version: id >> 6,
            header_length: id & Self::LENGTH_MAX,
            data: data.to_vec(),
        };
        header.validate()?;
        Ok(header)
    }
}

impl Display for FrameSecondaryHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FrameSecondaryHeader{{version={}, header_length={}, data=[len={}]}}",
            self.version,
            self.header_length,
            self.data.len()
        )
    }
}
