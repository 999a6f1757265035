#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate lazy_static;
extern crate usrip;

mod context;

use std::time::Duration;

use usrip::core::config::StackConfig;
use usrip::core::repr::{
    eth_types,
    icmpv4_types,
    ipv4_protocols,
    Icmpv4Packet,
    Icmpv4Repr,
    Ipv4Packet,
};
use usrip::Error;

use context::*;

#[test]
fn icmp_echo() {
    context::run_with_config(StackConfig::default(), |context| {
        // Neither host knows the other yet.
        assert!(context.a.arp().cache_entries().is_empty());
        assert!(context.b.arp().cache_entries().is_empty());

        let pongs = context.a.icmpv4().subscribe();
        context.a.ping(*HOST_B_IPV4_ADDR, 1, 1, b"ping").unwrap();

        let pong = pongs.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(*HOST_B_IPV4_ADDR, pong.src_addr);
        assert_eq!((1, 1), (pong.id, pong.seq));
        assert!(pong.rtt < Duration::from_secs(3));
        assert_eq!(
            vec![(*HOST_A_IPV4_ADDR, *HOST_A_ETH_ADDR)],
            context.b.arp().cache_entries()
        );

        let replies: Vec<_> = sent_frames(&context.b_port)
            .into_iter()
            .filter(|(_, eth_type, _)| *eth_type == eth_types::IPV4)
            .collect();
        assert_eq!(1, replies.len());

        let (dst_addr, _, packet) = &replies[0];
        assert_eq!(*HOST_A_ETH_ADDR, *dst_addr);
        let ipv4_packet = Ipv4Packet::try_new(&packet[..]).unwrap();
        assert_eq!(ipv4_protocols::ICMP, ipv4_packet.protocol());
        assert_eq!(*HOST_A_IPV4_ADDR, ipv4_packet.dst_addr());

        let icmp_packet = Icmpv4Packet::try_new(ipv4_packet.payload()).unwrap();
        assert_matches!(icmp_packet.check_encoding(), Ok(()));
        assert_matches!(
            Icmpv4Repr::deserialize(&icmp_packet),
            Ok(Icmpv4Repr::EchoReply { id: 1, seq: 1 })
        );
        assert_eq!(b"ping", icmp_packet.payload());

        // The send time was consumed by the reply.
        assert_matches!(
            context.a.icmpv4().take_send_time(*HOST_B_IPV4_ADDR, 1, 1),
            Err(Error::UnknownEcho)
        );
    });
}

#[test]
fn icmp_echo_unresolved() {
    context::run(|context| {
        assert_matches!(
            context.a.ping(*NO_HOST_IPV4_ADDR, 1, 1, b"ping"),
            Err(Error::MacResolution(_))
        );
        assert_matches!(
            context.a.icmpv4().take_send_time(*NO_HOST_IPV4_ADDR, 1, 1),
            Err(Error::UnknownEcho)
        );
    });
}

#[test]
fn icmp_unsupported_type() {
    context::run(|context| {
        assert_matches!(
            context.a.icmpv4().send_message(
                context.a.ipv4(),
                *HOST_B_IPV4_ADDR,
                13,
                0,
                1,
                1,
                &[],
            ),
            Err(Error::Unsupported)
        );
        assert_matches!(
            context.a.icmpv4().send_message(
                context.a.ipv4(),
                *HOST_B_IPV4_ADDR,
                icmpv4_types::ECHO_REPLY,
                0,
                1,
                1,
                b"pong",
            ),
            Ok(())
        );
    });
}
