//! CCSDS Space Packet Protocol and TM Space Data Link Protocol.
//!
//! References:
//! * CCSDS Space Packet Protocol 133.0-B-2
//!     - <https://public.ccsds.org/Pubs/133x0b2e1.pdf>
//! * CCSDS TM Space Data Link Protocol 132.0-B-3
//!     - <https://public.ccsds.org/Pubs/132x0b3.pdf>
//!
//! Packets are built and decoded with [spacepacket::SpacePacket]. Frames are built with
//! [framing::TransferFrame], buffered per virtual channel, and interleaved onto a physical
//! channel by the [framing::VirtualChannelMultiplexer].
mod error;
mod prelude;

pub mod config;
pub mod checksum;
pub mod framing;
pub mod spacepacket;

pub use error::{Error, Result};
