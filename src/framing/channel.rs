use std::collections::VecDeque;

use tracing::debug;

use super::{FrameHeader, TransferFrame, Vcid};
use crate::prelude::*;

/// A bounded FIFO of frames for a single virtual channel.
///
/// Frames are moved in and out; a full channel rejects new frames rather than
/// evicting old ones.
#[derive(Debug, Clone)]
pub struct VirtualChannel {
    vcid: Vcid,
    capacity: usize,
    frames: VecDeque<TransferFrame>,
}

impl VirtualChannel {
    /// `vcid` is masked to 3 bits, as it is when building frames.
    #[must_use]
    pub fn new(vcid: Vcid, capacity: usize) -> Self {
        VirtualChannel {
            vcid: vcid & FrameHeader::VCID_MAX,
            capacity,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn vcid(&self) -> Vcid {
        self.vcid
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Queue `frame`.
    ///
    /// # Errors
    /// [Error::BufferFull] if the channel is at capacity. The frame is dropped.
    pub fn add_frame(&mut self, frame: TransferFrame) -> Result<()> {
        if self.frames.len() >= self.capacity {
            debug!(vcid = self.vcid, capacity = self.capacity, "buffer full, dropping frame");
            return Err(Error::BufferFull {
                vcid: self.vcid,
                capacity: self.capacity,
            });
        }
        self.frames.push_back(frame);
        Ok(())
    }

    /// Remove and return the oldest frame.
    ///
    /// # Errors
    /// [Error::Empty] if there are no frames.
    pub fn next_frame(&mut self) -> Result<TransferFrame> {
        self.frames
            .pop_front()
            .ok_or(Error::Empty { vcid: self.vcid })
    }
}
