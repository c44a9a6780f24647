mod common;

use ccsds_link::config::{LinkConfig, Scheduling, ServiceConfig};
use ccsds_link::framing::{Service, ServiceType, TransferFrame};
use common::{fixture_path, init_tracing};

#[test]
fn test_link_fixture() {
    init_tracing();
    let config = LinkConfig::from_file(fixture_path("link.json")).unwrap();

    assert_eq!(config.scid, 933);
    assert_eq!(config.scheduler, Scheduling::RoundRobin);
    assert_eq!(
        config
            .channels
            .iter()
            .map(|c| c.service)
            .collect::<Vec<_>>(),
        [
            Some(ServiceConfig::Packet),
            Some(ServiceConfig::Access { unit_size: 4 }),
            Some(ServiceConfig::Frame),
        ]
    );
}

#[test]
fn test_configured_link_end_to_end() {
    let config = LinkConfig::from_file(fixture_path("link.json")).unwrap();
    let mut manager = config.build_service_manager();
    let mut mux = config.build_multiplexer();

    manager.send_data(0, ServiceType::Packet, b"packet data").unwrap();
    manager.send_data(1, ServiceType::Access, b"unit").unwrap();

    for (vcid, service_type) in [(0, ServiceType::Packet), (1, ServiceType::Access)] {
        let data = manager.receive_data(vcid, service_type).unwrap();
        let frame = TransferFrame::new(config.scid, vcid, &data, &[], None).unwrap();
        mux.add_frame(vcid, frame.clone()).unwrap();
        manager.add_frame_to_master_channel(config.scid, frame).unwrap();
    }

    assert_eq!(mux.next_frame().unwrap().data, b"unit");
    assert_eq!(mux.next_frame().unwrap().data, b"packet data");
    assert!(!mux.has_pending_frames());

    assert_eq!(
        manager
            .next_frame_from_master_channel(config.scid)
            .unwrap()
            .data,
        b"packet data"
    );
}

#[test]
fn test_default_config_builds() {
    let config = LinkConfig::default();
    let mut manager = config.build_service_manager();
    manager.send_data(0, ServiceType::Packet, b"x").unwrap();

    let mux = config.build_multiplexer();
    assert_eq!(mux.channel(0).unwrap().capacity(), 16);

    // services are usable directly as well
    let mut service = ccsds_link::framing::PacketService::new(0);
    service.send(b"y").unwrap();
}
