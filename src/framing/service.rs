use std::collections::VecDeque;
use std::fmt::Debug;

use tracing::{debug, trace};

use super::{FrameHeader, Scid, TransferFrame, Vcid, DEFAULT_SCID};
use crate::prelude::*;

/// A virtual channel service accepting and delivering user data.
pub trait Service: Debug + Send {
    /// Accept a service data unit for transfer.
    ///
    /// # Errors
    /// Service specific; typically [Error::Validation] for unacceptable data.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Deliver the oldest service data unit.
    ///
    /// # Errors
    /// [Error::NoFramesAvailable] if there is nothing to deliver.
    fn receive(&mut self) -> Result<Vec<u8>>;
}

/// Wraps user data into frames for one virtual channel.
#[derive(Debug, Clone)]
struct FrameQueue {
    scid: Scid,
    vcid: Vcid,
    vc_frame_count: u8,
    frames: VecDeque<TransferFrame>,
}

impl FrameQueue {
    fn new(vcid: Vcid) -> Self {
        FrameQueue {
            scid: DEFAULT_SCID,
            vcid: vcid & FrameHeader::VCID_MAX,
            vc_frame_count: 0,
            frames: VecDeque::new(),
        }
    }

    fn wrap(&mut self, data: &[u8]) -> Result<()> {
        let frame = TransferFrame::builder()
            .scid(self.scid)
            .vcid(self.vcid)
            .data(data)
            .vc_frame_count(self.vc_frame_count)
            .build()?;
        trace!(vcid = self.vcid, count = self.vc_frame_count, len = data.len(), "wrapped data");
        self.vc_frame_count = self.vc_frame_count.wrapping_add(1);
        self.frames.push_back(frame);
        Ok(())
    }

    fn unwrap_next(&mut self) -> Result<Vec<u8>> {
        self.frames
            .pop_front()
            .map(|f| f.data)
            .ok_or(Error::NoFramesAvailable)
    }
}

/// Virtual Channel Packet (VCP) service. Each payload, typically an encoded space
/// packet, is carried in its own frame.
#[derive(Debug, Clone)]
pub struct PacketService {
    queue: FrameQueue,
}

impl PacketService {
    /// Create a service for `vcid` using [DEFAULT_SCID].
    #[must_use]
    pub fn new(vcid: Vcid) -> Self {
        PacketService {
            queue: FrameQueue::new(vcid),
        }
    }

    #[must_use]
    pub fn with_scid(mut self, scid: Scid) -> Self {
        self.queue.scid = scid;
        self
    }

    #[must_use]
    pub fn scid(&self) -> Scid {
        self.queue.scid
    }

    #[must_use]
    pub fn vcid(&self) -> Vcid {
        self.queue.vcid
    }

    /// Number of frames waiting to be received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.frames.len()
    }
}

impl Service for PacketService {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::Validation("packet data cannot be empty".into()));
        }
        self.queue.wrap(data)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        self.queue.unwrap_next()
    }
}

/// Virtual Channel Access (VCA) service for fixed length service data units.
#[derive(Debug, Clone)]
pub struct AccessService {
    queue: FrameQueue,
    unit_size: usize,
}

impl AccessService {
    /// Create a service for `vcid` accepting units of exactly `unit_size` bytes, using
    /// [DEFAULT_SCID].
    #[must_use]
    pub fn new(vcid: Vcid, unit_size: usize) -> Self {
        AccessService {
            queue: FrameQueue::new(vcid),
            unit_size,
        }
    }

    #[must_use]
    pub fn with_scid(mut self, scid: Scid) -> Self {
        self.queue.scid = scid;
        self
    }

    #[must_use]
    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.frames.len()
    }
}

impl Service for AccessService {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != self.unit_size {
            return Err(Error::Validation(format!(
                "access unit length {} does not match fixed size {}",
                data.len(),
                self.unit_size
            )));
        }
        self.queue.wrap(data)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        self.queue.unwrap_next()
    }
}

/// Virtual Channel Frame (VCF) service, transferring complete frames.
///
/// Through [Service], data sent is an encoded frame and data received is the encoded
/// frame.
#[derive(Debug, Clone)]
pub struct FrameService {
    vcid: Vcid,
    frames: VecDeque<TransferFrame>,
}

impl FrameService {
    #[must_use]
    pub fn new(vcid: Vcid) -> Self {
        FrameService {
            vcid: vcid & FrameHeader::VCID_MAX,
            frames: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn vcid(&self) -> Vcid {
        self.vcid
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.frames.len()
    }

    /// # Errors
    /// [Error::VcidMismatch] if the frame is for another virtual channel.
    pub fn send_frame(&mut self, frame: TransferFrame) -> Result<()> {
        if frame.header.vcid != self.vcid {
            debug!(expected = self.vcid, actual = frame.header.vcid, "rejecting frame");
            return Err(Error::VcidMismatch {
                expected: self.vcid,
                actual: frame.header.vcid,
            });
        }
        self.frames.push_back(frame);
        Ok(())
    }

    /// # Errors
    /// [Error::NoFramesAvailable] if there are no frames.
    pub fn receive_frame(&mut self) -> Result<TransferFrame> {
        self.frames.pop_front().ok_or(Error::NoFramesAvailable)
    }
}

impl Service for FrameService {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let frame = TransferFrame::decode(data)?;
        self.send_frame(frame)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        self.receive_frame()?.encode()
    }
}

/// Complete frames for all virtual channels of a single spacecraft.
#[derive(Debug, Clone)]
pub struct MasterChannelService {
    scid: Scid,
    frames: VecDeque<TransferFrame>,
}

impl MasterChannelService {
    #[must_use]
    pub fn new(scid: Scid) -> Self {
        MasterChannelService {
            scid,
            frames: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn scid(&self) -> Scid {
        self.scid
    }

    /// # Errors
    /// [Error::ScidMismatch] if the frame is for a different spacecraft.
    pub fn add_frame(&mut self, frame: TransferFrame) -> Result<()> {
        if frame.header.scid != self.scid {
            debug!(expected = self.scid, actual = frame.header.scid, "rejecting frame");
            return Err(Error::ScidMismatch {
                expected: self.scid,
                actual: frame.header.scid,
            });
        }
        self.frames.push_back(frame);
        Ok(())
    }

    /// # Errors
    /// [Error::NoFramesAvailable] if there are no frames.
    pub fn next_frame(&mut self) -> Result<TransferFrame> {
        self.frames.pop_front().ok_or(Error::NoFramesAvailable)
    }

    #[must_use]
    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_service() {
        let mut service = PacketService::new(2);
        assert_eq!(service.scid(), DEFAULT_SCID);

        service.send(b"first").unwrap();
        service.send(b"second").unwrap();
        assert_eq!(service.pending(), 2);
        assert_eq!(service.receive().unwrap(), b"first");
        assert_eq!(service.receive().unwrap(), b"second");
        assert!(matches!(service.receive(), Err(Error::NoFramesAvailable)));
    }

    #[test]
    fn test_packet_service_rejects_empty() {
        let mut service = PacketService::new(0);
        assert!(matches!(service.send(&[]), Err(Error::Validation(_))));
        assert_eq!(service.pending(), 0);
    }

    #[test]
    fn test_packet_service_frames() {
        let mut service = PacketService::new(4).with_scid(77);
        for _ in 0..257 {
            service.send(b"x").unwrap();
        }
        let counts: Vec<u8> = service
            .queue
            .frames
            .iter()
            .map(|f| f.header.vc_frame_count)
            .collect();
        assert_eq!(counts[0], 0);
        assert_eq!(counts[255], 255);
        assert_eq!(counts[256], 0);

        let frame = &service.queue.frames[0];
        assert_eq!(frame.header.scid, 77);
        assert_eq!(frame.header.vcid, 4);
        assert!(frame.secondary_header.is_none());
        assert!(frame.ocf.is_none());
    }

    #[test]
    fn test_access_service() {
        let mut service = AccessService::new(1, 4);
        assert!(matches!(service.send(b"abc"), Err(Error::Validation(_))));
        assert!(matches!(service.send(b"abcde"), Err(Error::Validation(_))));
        service.send(b"abcd").unwrap();
        assert_eq!(service.receive().unwrap(), b"abcd");
        assert!(matches!(service.receive(), Err(Error::NoFramesAvailable)));
    }

    #[test]
    fn test_frame_service() {
        let mut service = FrameService::new(3);
        assert!(matches!(
            service.receive_frame(),
            Err(Error::NoFramesAvailable)
        ));

        let frame = TransferFrame::new(933, 3, b"frame", &[], None).unwrap();
        service.send_frame(frame.clone()).unwrap();
        assert_eq!(service.receive_frame().unwrap(), frame);

        let other = TransferFrame::new(933, 4, b"other", &[], None).unwrap();
        let zult = service.send_frame(other.clone());
        assert!(
            matches!(
                zult,
                Err(Error::VcidMismatch {
                    expected: 3,
                    actual: 4
                })
            ),
            "{zult:?}"
        );
        assert!(matches!(
            service.send(&other.encode().unwrap()),
            Err(Error::VcidMismatch { .. })
        ));
        assert_eq!(service.pending(), 0);

        // encoded frames through the byte oriented interface
        let dat = frame.encode().unwrap();
        service.send(&dat).unwrap();
        assert_eq!(service.receive().unwrap(), dat);

        assert!(matches!(
            service.send(&[0u8; 4]),
            Err(Error::NotEnoughData { .. })
        ));
    }

    #[test]
    fn test_master_channel() {
        let mut service = MasterChannelService::new(933);
        assert!(!service.has_frames());

        let zult = service.add_frame(TransferFrame::new(100, 0, b"x", &[], None).unwrap());
        assert!(
            matches!(
                zult,
                Err(Error::ScidMismatch {
                    expected: 933,
                    actual: 100
                })
            ),
            "{zult:?}"
        );

        service
            .add_frame(TransferFrame::new(933, 0, b"a", &[], None).unwrap())
            .unwrap();
        service
            .add_frame(TransferFrame::new(933, 5, b"b", &[], None).unwrap())
            .unwrap();
        assert!(service.has_frames());
        assert_eq!(service.len(), 2);
        assert_eq!(service.next_frame().unwrap().data, b"a");
        assert_eq!(service.next_frame().unwrap().data, b"b");
        assert!(matches!(
            service.next_frame(),
            Err(Error::NoFramesAvailable)
        ));
    }
}
