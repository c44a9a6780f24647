use std::collections::BTreeMap;
use std::fmt::Debug;

use tracing::{debug, trace, warn};

use super::{TransferFrame, Vcid, VirtualChannel};
use crate::prelude::*;

/// Scheduling weight of a virtual channel. Larger is more important.
pub type Priority = i32;

/// Scheduler view of a registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    pub vcid: Vcid,
    pub priority: Priority,
    /// Number of queued frames
    pub pending: usize,
}

impl ChannelStatus {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.pending > 0
    }
}

/// Selects the next ready channel to transmit from.
///
/// `channels` is every registered channel in ascending VCID order. Implementations
/// return the VCID of a ready channel, or `None` if they find none.
pub trait Scheduler: Debug + Send {
    fn select(&mut self, channels: &[ChannelStatus]) -> Option<Vcid>;
}

/// Plain round-robin, ignoring priority.
///
/// Starting just after the position last selected, at most one pass is made over the
/// channels and the first ready one is taken.
#[derive(Debug, Default, Clone)]
pub struct RoundRobin {
    last_used: usize,
}

impl RoundRobin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_matching<F>(&mut self, channels: &[ChannelStatus], pred: F) -> Option<Vcid>
    where
        F: Fn(&ChannelStatus) -> bool,
    {
        let num = channels.len();
        for _ in 0..num {
            self.last_used = (self.last_used + 1) % num;
            let status = &channels[self.last_used];
            if pred(status) {
                return Some(status.vcid);
            }
        }
        None
    }
}

impl Scheduler for RoundRobin {
    fn select(&mut self, channels: &[ChannelStatus]) -> Option<Vcid> {
        self.next_matching(channels, ChannelStatus::is_ready)
    }
}

/// Always serve the highest priority ready channel. Ready channels sharing the
/// highest priority are served round-robin.
#[derive(Debug, Default, Clone)]
pub struct StrictPriority {
    cursor: RoundRobin,
}

impl StrictPriority {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for StrictPriority {
    fn select(&mut self, channels: &[ChannelStatus]) -> Option<Vcid> {
        let best = channels
            .iter()
            .filter(|c| c.is_ready())
            .map(|c| c.priority)
            .max()?;
        self.cursor
            .next_matching(channels, |c| c.is_ready() && c.priority == best)
    }
}

#[derive(Debug)]
struct Registration {
    channel: VirtualChannel,
    priority: Priority,
}

/// Interleaves frames from a set of [VirtualChannel]s onto one physical channel.
///
/// # Example
/// ```
/// use ccsds_link::framing::{TransferFrame, VirtualChannel, VirtualChannelMultiplexer};
///
/// let mut mux = VirtualChannelMultiplexer::new();
/// mux.add_channel(VirtualChannel::new(0, 4), 1);
/// mux.add_channel(VirtualChannel::new(1, 4), 1);
///
/// mux.add_frame(0, TransferFrame::new(933, 0, b"zero", &[], None).unwrap()).unwrap();
/// mux.add_frame(1, TransferFrame::new(933, 1, b"one", &[], None).unwrap()).unwrap();
///
/// assert_eq!(mux.next_frame().unwrap().data, b"one");
/// assert_eq!(mux.next_frame().unwrap().data, b"zero");
/// assert!(!mux.has_pending_frames());
/// ```
#[derive(Debug)]
pub struct VirtualChannelMultiplexer {
    channels: BTreeMap<Vcid, Registration>,
    scheduler: Box<dyn Scheduler>,
}

impl Default for VirtualChannelMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualChannelMultiplexer {
    /// Create a multiplexer using [RoundRobin] scheduling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_scheduler(RoundRobin::new())
    }

    #[must_use]
    pub fn with_scheduler<S>(scheduler: S) -> Self
    where
        S: Scheduler + 'static,
    {
        VirtualChannelMultiplexer {
            channels: BTreeMap::new(),
            scheduler: Box::new(scheduler),
        }
    }

    /// Register `channel` with the provided priority weight, returning any channel
    /// previously registered with the same VCID.
    pub fn add_channel(
        &mut self,
        channel: VirtualChannel,
        priority: Priority,
    ) -> Option<VirtualChannel> {
        let vcid = channel.vcid();
        debug!(vcid, priority, capacity = channel.capacity(), "adding virtual channel");
        let previous = self
            .channels
            .insert(vcid, Registration { channel, priority });
        if previous.is_some() {
            warn!(vcid, "replaced existing virtual channel");
        }
        previous.map(|r| r.channel)
    }

    #[must_use]
    pub fn channel(&self, vcid: Vcid) -> Option<&VirtualChannel> {
        self.channels.get(&vcid).map(|r| &r.channel)
    }

    #[must_use]
    pub fn channel_mut(&mut self, vcid: Vcid) -> Option<&mut VirtualChannel> {
        self.channels.get_mut(&vcid).map(|r| &mut r.channel)
    }

    #[must_use]
    pub fn priority(&self, vcid: Vcid) -> Option<Priority> {
        self.channels.get(&vcid).map(|r| r.priority)
    }

    /// Registered VCIDs in ascending order.
    pub fn vcids(&self) -> impl Iterator<Item = Vcid> + '_ {
        self.channels.keys().copied()
    }

    /// Queue `frame` on the channel registered for `vcid`.
    ///
    /// # Errors
    /// [Error::ChannelNotFound] if no such channel is registered, or
    /// [Error::BufferFull] if it is full.
    pub fn add_frame(&mut self, vcid: Vcid, frame: TransferFrame) -> Result<()> {
        match self.channel_mut(vcid) {
            Some(channel) => channel.add_frame(frame),
            None => {
                debug!(vcid, "no virtual channel for frame");
                Err(Error::ChannelNotFound(vcid))
            }
        }
    }

    #[must_use]
    pub fn has_pending_frames(&self) -> bool {
        self.channels.values().any(|r| r.channel.has_frames())
    }

    /// Take the next frame as chosen by the scheduler.
    ///
    /// # Errors
    /// [Error::NoChannels] if no channels are registered, [Error::NoFramesAvailable] if
    /// the scheduler finds no ready channel.
    pub fn next_frame(&mut self) -> Result<TransferFrame> {
        if self.channels.is_empty() {
            return Err(Error::NoChannels);
        }
        let statuses: Vec<ChannelStatus> = self
            .channels
            .values()
            .map(|r| ChannelStatus {
                vcid: r.channel.vcid(),
                priority: r.priority,
                pending: r.channel.len(),
            })
            .collect();

        let vcid = self
            .scheduler
            .select(&statuses)
            .ok_or(Error::NoFramesAvailable)?;
        trace!(vcid, "selected virtual channel");
        self.channel_mut(vcid)
            .ok_or(Error::ChannelNotFound(vcid))?
            .next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(vcid: Vcid, data: &[u8]) -> TransferFrame {
        TransferFrame::new(933, vcid, data, &[], None).unwrap()
    }

    fn mux_with<S>(scheduler: S, channels: &[(Vcid, Priority)]) -> VirtualChannelMultiplexer
    where
        S: Scheduler + 'static,
    {
        let mut mux = VirtualChannelMultiplexer::with_scheduler(scheduler);
        for (vcid, priority) in channels {
            mux.add_channel(VirtualChannel::new(*vcid, 8), *priority);
        }
        mux
    }

    #[test]
    fn test_no_channels() {
        let mut mux = VirtualChannelMultiplexer::new();
        assert!(matches!(mux.next_frame(), Err(Error::NoChannels)));
        assert!(!mux.has_pending_frames());
    }

    #[test]
    fn test_no_frames() {
        let mut mux = mux_with(RoundRobin::new(), &[(0, 1), (1, 1)]);
        assert!(matches!(mux.next_frame(), Err(Error::NoFramesAvailable)));
    }

    #[test]
    fn test_fairness() {
        let mut mux = mux_with(RoundRobin::new(), &[(0, 1), (1, 1)]);
        mux.add_frame(0, frame(0, b"a")).unwrap();
        mux.add_frame(1, frame(1, b"b")).unwrap();

        let mut vcids = vec![
            mux.next_frame().unwrap().header.vcid,
            mux.next_frame().unwrap().header.vcid,
        ];
        vcids.sort_unstable();
        assert_eq!(vcids, [0, 1]);
        assert!(!mux.has_pending_frames());
    }

    #[test]
    fn test_round_robin_order() {
        let mut mux = mux_with(RoundRobin::new(), &[(0, 1), (1, 1), (2, 1)]);
        for vcid in 0..3 {
            for _ in 0..2 {
                mux.add_frame(vcid, frame(vcid, b"x")).unwrap();
            }
        }

        let order: Vec<Vcid> = (0..6)
            .map(|_| mux.next_frame().unwrap().header.vcid)
            .collect();
        // cursor starts at position 0 and selection begins just after it
        assert_eq!(order, [1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_round_robin_skips_empty() {
        let mut mux = mux_with(RoundRobin::new(), &[(0, 1), (1, 1), (2, 1)]);
        mux.add_frame(0, frame(0, b"x")).unwrap();
        mux.add_frame(0, frame(0, b"x")).unwrap();
        mux.add_frame(2, frame(2, b"x")).unwrap();

        let order: Vec<Vcid> = (0..3)
            .map(|_| mux.next_frame().unwrap().header.vcid)
            .collect();
        assert_eq!(order, [2, 0, 0]);
        assert!(matches!(mux.next_frame(), Err(Error::NoFramesAvailable)));
    }

    #[test]
    fn test_round_robin_ignores_priority() {
        let mut mux = mux_with(RoundRobin::new(), &[(0, 1), (1, 100)]);
        for _ in 0..2 {
            mux.add_frame(0, frame(0, b"x")).unwrap();
            mux.add_frame(1, frame(1, b"x")).unwrap();
        }
        let order: Vec<Vcid> = (0..4)
            .map(|_| mux.next_frame().unwrap().header.vcid)
            .collect();
        assert_eq!(order, [1, 0, 1, 0]);
    }

    #[test]
    fn test_strict_priority() {
        let mut mux = mux_with(StrictPriority::new(), &[(0, 1), (1, 5), (2, 5)]);
        for vcid in 0..3 {
            mux.add_frame(vcid, frame(vcid, b"x")).unwrap();
            mux.add_frame(vcid, frame(vcid, b"x")).unwrap();
        }
        let order: Vec<Vcid> = (0..6)
            .map(|_| mux.next_frame().unwrap().header.vcid)
            .collect();
        assert_eq!(order, [1, 2, 1, 2, 0, 0]);
    }

    #[test]
    fn test_add_frame_unknown_channel() {
        let mut mux = mux_with(RoundRobin::new(), &[(0, 1)]);
        assert!(matches!(
            mux.add_frame(5, frame(5, b"x")),
            Err(Error::ChannelNotFound(5))
        ));
    }

    #[test]
    fn test_add_channel_masks_vcid() {
        let mut mux = VirtualChannelMultiplexer::new();
        mux.add_channel(VirtualChannel::new(9, 1), 1);
        assert_eq!(mux.vcids().collect::<Vec<_>>(), [1]);
        mux.add_frame(1, frame(9, b"x")).unwrap();
        assert_eq!(mux.next_frame().unwrap().header.vcid, 1);
    }

    #[test]
    fn test_add_channel_replaces() {
        let mut mux = VirtualChannelMultiplexer::new();
        assert!(mux.add_channel(VirtualChannel::new(3, 1), 1).is_none());
        mux.add_frame(3, frame(3, b"x")).unwrap();

        let previous = mux.add_channel(VirtualChannel::new(3, 4), 9).unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(mux.priority(3), Some(9));
        assert_eq!(mux.channel(3).unwrap().capacity(), 4);
        assert_eq!(mux.vcids().collect::<Vec<_>>(), [3]);
    }
}
