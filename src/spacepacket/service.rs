use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

use super::{Apid, PrimaryHeader, SpacePacket};
use crate::prelude::*;

/// Wrap raw octets into a standalone telemetry packet.
///
/// # Errors
/// [Error::Validation] if `apid` is out of range or `data` does not fit in a packet.
pub fn encapsulate_octet_string(apid: Apid, data: &[u8]) -> Result<SpacePacket> {
    SpacePacket::telemetry(apid, data.to_vec(), [])
}

/// The user data carried by `packet`.
#[must_use]
pub fn decapsulate_octet_string(packet: &SpacePacket) -> &[u8] {
    &packet.data
}

/// Human readable description of well-known APIDs.
#[must_use]
pub fn describe_apid(apid: Apid) -> &'static str {
    match apid {
        0 | PrimaryHeader::APID_MAX => "Idle Packet",
        1 => "Telemetry Packet",
        2 => "Command Packet",
        _ => "Unknown or Custom Packet",
    }
}

/// Tracks which APIDs are in use.
///
/// All operations take `&self` and are serialized on an internal lock so a registry
/// may be shared between threads, e.g., in an `Arc`.
#[derive(Debug, Default)]
pub struct ApidRegistry {
    reserved: Mutex<HashSet<Apid>>,
}

impl ApidRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Apid>> {
        // The set cannot be left inconsistent by a panicking holder, so recover it.
        self.reserved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Reserve `apid`.
    ///
    /// # Errors
    /// [Error::Validation] if `apid` is out of range, [Error::ApidReserved] if it is
    /// already reserved.
    pub fn reserve(&self, apid: Apid) -> Result<()> {
        if apid > PrimaryHeader::APID_MAX {
            return Err(Error::Validation(format!(
                "apid {apid} exceeds maximum {}",
                PrimaryHeader::APID_MAX
            )));
        }
        if !self.lock().insert(apid) {
            return Err(Error::ApidReserved(apid));
        }
        debug!(apid, "reserved apid");
        Ok(())
    }

    /// Release `apid`. Releasing an APID that is not reserved does nothing.
    pub fn release(&self, apid: Apid) {
        if self.lock().remove(&apid) {
            debug!(apid, "released apid");
        }
    }

    #[must_use]
    pub fn is_reserved(&self, apid: Apid) -> bool {
        self.lock().contains(&apid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use test_case::test_case;

    #[test]
    fn test_octet_string() {
        let packet = encapsulate_octet_string(42, b"hello").unwrap();
        assert_eq!(packet.header.apid, 42);
        assert_eq!(packet.header.type_flag, 0);
        assert_eq!(decapsulate_octet_string(&packet), b"hello");

        assert!(matches!(
            encapsulate_octet_string(2048, b"x"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            encapsulate_octet_string(1, b""),
            Err(Error::Validation(_))
        ));
    }

    #[test_case(0, "Idle Packet")]
    #[test_case(1, "Telemetry Packet")]
    #[test_case(2, "Command Packet")]
    #[test_case(3, "Unknown or Custom Packet")]
    #[test_case(2047, "Idle Packet")]
    fn test_describe_apid(apid: Apid, expected: &str) {
        assert_eq!(describe_apid(apid), expected);
    }

    #[test]
    fn test_registry() {
        let registry = ApidRegistry::new();
        assert!(!registry.is_reserved(10));

        registry.reserve(10).unwrap();
        assert!(registry.is_reserved(10));
        assert!(matches!(registry.reserve(10), Err(Error::ApidReserved(10))));

        registry.release(10);
        assert!(!registry.is_reserved(10));
        registry.reserve(10).unwrap();

        // releasing something never reserved is fine
        registry.release(11);
    }

    #[test]
    fn test_registry_rejects_invalid_apid() {
        let registry = ApidRegistry::new();
        assert!(matches!(registry.reserve(2048), Err(Error::Validation(_))));
        assert!(!registry.is_reserved(2048));
    }

    #[test]
    fn test_registry_concurrent_reserve() {
        let registry = Arc::new(ApidRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.reserve(7).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1, "exactly one thread should win the reservation");
    }
}
