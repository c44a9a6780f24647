//! CCSDS TM Space Data Link Protocol.
//!
//! [TransferFrame]s are built by producers or by one of the virtual channel services,
//! buffered per [VirtualChannel], and interleaved onto a physical channel by a
//! [VirtualChannelMultiplexer]. The [ServiceManager] routes user data to the services
//! registered for each virtual channel and frames to per-spacecraft master channels.
mod channel;
mod frame;
mod header;
mod manager;
mod mux;
mod service;

pub use channel::*;
pub use frame::*;
pub use header::*;
pub use manager::*;
pub use mux::*;
pub use service::*;

/// Spacecraft identifier, 10 bits
pub type Scid = u16;
/// Virtual channel identifier, 3 bits
pub type Vcid = u8;

/// Spacecraft id used by the virtual channel services when not configured.
pub const DEFAULT_SCID: Scid = 933;
