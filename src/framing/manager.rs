use std::collections::HashMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MasterChannelService, Scid, Service, TransferFrame, Vcid};
use crate::prelude::*;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceType {
    /// Virtual Channel Packet
    Packet,
    /// Virtual Channel Access
    Access,
    /// Virtual Channel Frame
    Frame,
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceType::Packet => "VCP",
            ServiceType::Access => "VCA",
            ServiceType::Frame => "VCF",
        };
        write!(f, "{name}")
    }
}

/// Routes user data to virtual channel services by (VCID, [ServiceType]) and frames to
/// master channels by SCID.
///
/// # Example
/// ```
/// use ccsds_link::framing::{PacketService, ServiceManager, ServiceType};
///
/// let mut manager = ServiceManager::new();
/// manager.register_virtual_service(1, ServiceType::Packet, Box::new(PacketService::new(1)));
///
/// manager.send_data(1, ServiceType::Packet, b"hello").unwrap();
/// assert_eq!(manager.receive_data(1, ServiceType::Packet).unwrap(), b"hello");
/// ```
#[derive(Debug, Default)]
pub struct ServiceManager {
    virtual_services: HashMap<(Vcid, ServiceType), Box<dyn Service>>,
    master_channels: HashMap<Scid, MasterChannelService>,
}

impl ServiceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` for `vcid`, replacing any service of the same type already
    /// registered there.
    pub fn register_virtual_service(
        &mut self,
        vcid: Vcid,
        service_type: ServiceType,
        service: Box<dyn Service>,
    ) {
        debug!(vcid, %service_type, "registering virtual channel service");
        self.virtual_services.insert((vcid, service_type), service);
    }

    /// Register a master channel for `scid`. Registering an existing master channel
    /// keeps its queued frames.
    pub fn register_master_channel_service(&mut self, scid: Scid) {
        self.master_channels.entry(scid).or_insert_with(|| {
            debug!(scid, "registering master channel service");
            MasterChannelService::new(scid)
        });
    }

    fn service(&mut self, vcid: Vcid, service_type: ServiceType) -> Result<&mut Box<dyn Service>> {
        self.virtual_services
            .get_mut(&(vcid, service_type))
            .ok_or_else(|| {
                debug!(vcid, %service_type, "no service registered");
                Error::ServiceNotFound { vcid, service_type }
            })
    }

    fn master_channel(&mut self, scid: Scid) -> Result<&mut MasterChannelService> {
        self.master_channels.get_mut(&scid).ok_or_else(|| {
            debug!(scid, "no master channel registered");
            Error::MasterChannelNotFound(scid)
        })
    }

    /// # Errors
    /// [Error::ServiceNotFound] if no such service is registered, otherwise any error
    /// from the service.
    pub fn send_data(&mut self, vcid: Vcid, service_type: ServiceType, data: &[u8]) -> Result<()> {
        self.service(vcid, service_type)?.send(data)
    }

    /// # Errors
    /// [Error::ServiceNotFound] if no such service is registered, otherwise any error
    /// from the service.
    pub fn receive_data(&mut self, vcid: Vcid, service_type: ServiceType) -> Result<Vec<u8>> {
        self.service(vcid, service_type)?.receive()
    }

    /// # Errors
    /// [Error::MasterChannelNotFound] if `scid` is not registered, or
    /// [Error::ScidMismatch] if the frame is for another spacecraft.
    pub fn add_frame_to_master_channel(&mut self, scid: Scid, frame: TransferFrame) -> Result<()> {
        self.master_channel(scid)?.add_frame(frame)
    }

    /// # Errors
    /// [Error::MasterChannelNotFound] if `scid` is not registered, or
    /// [Error::NoFramesAvailable] if it has no frames.
    pub fn next_frame_from_master_channel(&mut self, scid: Scid) -> Result<TransferFrame> {
        self.master_channel(scid)?.next_frame()
    }

    /// False when `scid` is not registered.
    #[must_use]
    pub fn has_pending_frames_in_master_channel(&self, scid: Scid) -> bool {
        self.master_channels
            .get(&scid)
            .is_some_and(MasterChannelService::has_frames)
    }

    /// True if a service of `service_type` is registered for `vcid`.
    #[must_use]
    pub fn has_service(&self, vcid: Vcid, service_type: ServiceType) -> bool {
        self.virtual_services.contains_key(&(vcid, service_type))
    }
}
