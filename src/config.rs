//! Link configuration.
//!
//! A [LinkConfig] describes the virtual channels of a single spacecraft downlink and
//! the service attached to each, and builds the corresponding
//! [VirtualChannelMultiplexer] and [ServiceManager]. Configurations are usually
//! loaded from JSON:
//!
//! ```json
//! {
//!   "scid": 933,
//!   "scheduler": "strictPriority",
//!   "channels": [
//!     { "vcid": 0, "bufferSize": 16, "priority": 1, "service": { "type": "packet" } },
//!     { "vcid": 1, "bufferSize": 4, "service": { "type": "access", "unitSize": 128 } },
//!     { "vcid": 7, "bufferSize": 2 }
//!   ]
//! }
//! ```
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::framing::{
    AccessService, FrameHeader, FrameService, PacketService, Priority, RoundRobin, Scid,
    Service, ServiceManager, ServiceType, StrictPriority, TransferFrame, Vcid,
    VirtualChannel, VirtualChannelMultiplexer, DEFAULT_SCID,
};
use crate::prelude::*;

/// Multiplexer scheduling policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Scheduling {
    #[default]
    RoundRobin,
    StrictPriority,
}

/// Service attached to a virtual channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServiceConfig {
    Packet,
    Frame,
    Access {
        #[serde(rename = "unitSize")]
        unit_size: usize,
    },
}

impl ServiceConfig {
    #[must_use]
    pub fn service_type(&self) -> ServiceType {
        match self {
            ServiceConfig::Packet => ServiceType::Packet,
            ServiceConfig::Frame => ServiceType::Frame,
            ServiceConfig::Access { .. } => ServiceType::Access,
        }
    }

    fn build(&self, scid: Scid, vcid: Vcid) -> Box<dyn Service> {
        match *self {
            ServiceConfig::Packet => Box::new(PacketService::new(vcid).with_scid(scid)),
            ServiceConfig::Frame => Box::new(FrameService::new(vcid)),
            ServiceConfig::Access { unit_size } => {
                Box::new(AccessService::new(vcid, unit_size).with_scid(scid))
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub vcid: Vcid,
    /// Maximum number of queued frames
    pub buffer_size: usize,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub service: Option<ServiceConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    pub scid: Scid,
    #[serde(default)]
    pub scheduler: Scheduling,
    pub channels: Vec<ChannelConfig>,
}

impl Default for LinkConfig {
    /// A single round-robin scheduled packet channel, VCID 0, for [DEFAULT_SCID].
    fn default() -> Self {
        LinkConfig {
            scid: DEFAULT_SCID,
            scheduler: Scheduling::default(),
            channels: vec![ChannelConfig {
                vcid: 0,
                buffer_size: 16,
                priority: 1,
                service: Some(ServiceConfig::Packet),
            }],
        }
    }
}

impl LinkConfig {
    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be read, [Error::Config] if it is not a valid
    /// configuration document, or any [LinkConfig::validate] error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading link config");
        let config: LinkConfig = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    /// [Error::Config] if `json` is not a valid configuration document, or any
    /// [LinkConfig::validate] error.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LinkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// [Error::Validation] if an id is out of range, a VCID is repeated, a buffer size
    /// is zero, or an access unit size cannot be carried in a frame.
    pub fn validate(&self) -> Result<()> {
        if self.scid > FrameHeader::SCID_MAX {
            return Err(Error::Validation(format!(
                "scid {} exceeds maximum {}",
                self.scid,
                FrameHeader::SCID_MAX
            )));
        }
        if self.channels.is_empty() {
            return Err(Error::Validation("at least one channel is required".into()));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.vcid > FrameHeader::VCID_MAX {
                return Err(Error::Validation(format!(
                    "vcid {} exceeds maximum {}",
                    channel.vcid,
                    FrameHeader::VCID_MAX
                )));
            }
            if !seen.insert(channel.vcid) {
                return Err(Error::Validation(format!(
                    "vcid {} configured more than once",
                    channel.vcid
                )));
            }
            if channel.buffer_size == 0 {
                return Err(Error::Validation(format!(
                    "vcid {} buffer size must be greater than 0",
                    channel.vcid
                )));
            }
            if let Some(ServiceConfig::Access { unit_size }) = channel.service {
                if unit_size == 0 || unit_size > TransferFrame::DATA_MAX {
                    return Err(Error::Validation(format!(
                        "vcid {} access unit size {unit_size} must be between 1 and {}",
                        channel.vcid,
                        TransferFrame::DATA_MAX
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create a multiplexer with an empty channel for each configured channel.
    #[must_use]
    pub fn build_multiplexer(&self) -> VirtualChannelMultiplexer {
        let mut mux = match self.scheduler {
            Scheduling::RoundRobin => VirtualChannelMultiplexer::with_scheduler(RoundRobin::new()),
            Scheduling::StrictPriority => {
                VirtualChannelMultiplexer::with_scheduler(StrictPriority::new())
            }
        };
        for channel in &self.channels {
            mux.add_channel(
                VirtualChannel::new(channel.vcid, channel.buffer_size),
                channel.priority,
            );
        }
        mux
    }

    /// Create a service manager with each configured service registered and a master
    /// channel registered for the spacecraft.
    #[must_use]
    pub fn build_service_manager(&self) -> ServiceManager {
        let mut manager = ServiceManager::new();
        manager.register_master_channel_service(self.scid);
        for channel in &self.channels {
            if let Some(service) = channel.service {
                manager.register_virtual_service(
                    channel.vcid,
                    service.service_type(),
                    service.build(self.scid, channel.vcid),
                );
            }
        }
        manager
    }
}
