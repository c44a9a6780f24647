//! Frame and packet integrity.
//!
//! Both the TM frame error control field and the optional space packet error control
//! field use CRC-16/CCITT-FALSE: polynomial 0x1021, initial register 0xFFFF, no reflection
//! and no final XOR. The `crc` catalogue calls this algorithm `CRC_16_IBM_3740`.
use crate::prelude::*;
use tracing::warn;

const CRC16: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_IBM_3740);

/// Number of bytes in an encoded CRC.
pub const CRC_LEN: usize = 2;

/// Compute the CRC-16/CCITT-FALSE of `data`.
#[must_use]
pub fn compute_crc(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Check that the CRC of `data` is `expected`.
///
/// # Errors
/// [Error::Integrity] if the computed value differs from `expected`.
pub fn verify_crc(data: &[u8], expected: u16) -> Result<()> {
    let computed = compute_crc(data);
    if computed != expected {
        warn!(expected, computed, len = data.len(), "crc mismatch");
        return Err(Error::Integrity { expected, computed });
    }
    Ok(())
}

/// Split `dat` into its content and trailing big-endian CRC, or `None` if there are
/// not enough bytes.
pub(crate) fn split_crc(dat: &[u8]) -> Option<(&[u8], u16)> {
    if dat.len() < CRC_LEN {
        return None;
    }
    let (content, crc) = dat.split_at(dat.len() - CRC_LEN);
    Some((content, u16::from_be_bytes([crc[0], crc[1]])))
}
