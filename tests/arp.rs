#[macro_use]
extern crate assert_matches;
#[macro_use]
extern crate lazy_static;
extern crate usrip;

mod context;

use std::sync::Arc;
use std::thread;
use std::time::{
    Duration,
    Instant,
};

use usrip::core::config::StackConfig;
use usrip::core::link::Link;
use usrip::core::repr::{
    eth_types,
    Arp,
    ArpOp,
    EthernetAddress,
};
use usrip::core::wire::Port;
use usrip::Error;

use context::*;

fn arp_requests(port: &Port) -> Vec<Arp> {
    sent_frames(port)
        .into_iter()
        .map(|(dst_addr, eth_type, payload)| {
            assert_eq!(EthernetAddress::BROADCAST, dst_addr);
            assert_eq!(eth_types::ARP, eth_type);
            let arp = Arp::deserialize(&payload).unwrap();
            assert_eq!(ArpOp::Request, arp.op);
            arp
        })
        .collect()
}

#[test]
fn arp_resolves_peer() {
    context::run(|context| {
        assert_eq!(
            Some(*HOST_B_ETH_ADDR),
            context.a.arp().resolve(*HOST_B_IPV4_ADDR)
        );
        assert_eq!(
            vec![(*HOST_B_IPV4_ADDR, *HOST_B_ETH_ADDR)],
            context.a.arp().cache_entries()
        );

        // B answered with a single unicast reply and learned nothing.
        let replies = sent_frames(&context.b_port);
        assert_eq!(1, replies.len());
        assert_eq!(*HOST_A_ETH_ADDR, replies[0].0);
        let reply = Arp::deserialize(&replies[0].2).unwrap();
        assert_eq!(ArpOp::Reply, reply.op);
        assert_eq!(*HOST_B_IPV4_ADDR, reply.source_proto_addr);
        assert!(context.b.arp().cache_entries().is_empty());
    });
}

#[test]
fn arp_cache_hit_sends_nothing() {
    context::run(|context| {
        context.a.arp().resolve(*HOST_B_IPV4_ADDR).unwrap();
        context.a_port.clear_sent_frames();

        assert_eq!(
            Some(*HOST_B_ETH_ADDR),
            context.a.arp().resolve(*HOST_B_IPV4_ADDR)
        );
        assert!(context.a_port.sent_frames().is_empty());
    });
}

#[test]
fn arp_gives_up_after_retries() {
    context::run_with_config(StackConfig::default(), |context| {
        let start = Instant::now();
        assert_eq!(None, context.a.arp().resolve(*NO_HOST_IPV4_ADDR));
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(1500), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(2000), "{:?}", elapsed);

        let requests = arp_requests(&context.a_port);
        assert_eq!(4, requests.len());
        for request in requests {
            assert_eq!(*NO_HOST_IPV4_ADDR, request.target_proto_addr);
            assert_eq!(*HOST_A_IPV4_ADDR, request.source_proto_addr);
            assert_eq!(*HOST_A_ETH_ADDR, request.source_hw_addr);
        }
    });
}

#[test]
fn arp_concurrent_resolutions() {
    context::run(|context| {
        let a = context.a.arp().clone();
        let resolvers: Vec<_> = vec![*HOST_B_IPV4_ADDR, *NO_HOST_IPV4_ADDR, *HOST_B_IPV4_ADDR]
            .into_iter()
            .map(|ipv4_addr| {
                let a = a.clone();
                thread::spawn(move || a.resolve(ipv4_addr))
            })
            .collect();

        let resolved: Vec<_> = resolvers
            .into_iter()
            .map(|resolver| resolver.join().unwrap())
            .collect();

        assert_eq!(
            vec![Some(*HOST_B_ETH_ADDR), None, Some(*HOST_B_ETH_ADDR)],
            resolved
        );
    });
}

#[test]
fn arp_ignores_spoofed_reply() {
    let config = StackConfig {
        arp_retry_interval: Duration::from_millis(200),
        ..StackConfig::default()
    };

    context::run_with_config(config, |context| {
        let mallory = Arc::new(context.wire.attach(EthernetAddress::new([0x06, 0, 0, 0, 0, 0x66])));
        let victim = EthernetAddress::new([0x06, 0, 0, 0, 0, 0x77]);

        let resolver = {
            let a = context.a.arp().clone();
            thread::spawn(move || a.resolve(*NO_HOST_IPV4_ADDR))
        };

        // Wait for the request, then answer claiming another host's address.
        let mut buffer = [0; 1518];
        while mallory.recv_frame(&mut buffer).is_err() {}
        let spoofed = Arp {
            op: ArpOp::Reply,
            source_hw_addr: victim,
            source_proto_addr: *NO_HOST_IPV4_ADDR,
            target_hw_addr: *HOST_A_ETH_ADDR,
            target_proto_addr: *HOST_A_IPV4_ADDR,
        };
        let mut payload = [0; Arp::BUFFER_LEN];
        spoofed.serialize(&mut payload).unwrap();
        mallory
            .send_frame(&payload, eth_types::ARP, *HOST_A_ETH_ADDR)
            .unwrap();

        assert_eq!(None, resolver.join().unwrap());
        assert!(context.a.arp().cache_entries().is_empty());
    });
}

#[test]
fn arp_accepts_reply_from_claimed_address() {
    let config = StackConfig {
        arp_retry_interval: Duration::from_millis(200),
        ..StackConfig::default()
    };

    context::run_with_config(config, |context| {
        let helper_eth_addr = EthernetAddress::new([0x06, 0, 0, 0, 0, 0x66]);
        let helper = Arc::new(context.wire.attach(helper_eth_addr));

        let resolver = {
            let a = context.a.arp().clone();
            thread::spawn(move || a.resolve(*NO_HOST_IPV4_ADDR))
        };

        let mut buffer = [0; 1518];
        while helper.recv_frame(&mut buffer).is_err() {}
        let reply = Arp {
            op: ArpOp::Reply,
            source_hw_addr: helper_eth_addr,
            source_proto_addr: *NO_HOST_IPV4_ADDR,
            target_hw_addr: *HOST_A_ETH_ADDR,
            target_proto_addr: *HOST_A_IPV4_ADDR,
        };
        let mut payload = [0; Arp::BUFFER_LEN];
        reply.serialize(&mut payload).unwrap();
        helper
            .send_frame(&payload, eth_types::ARP, *HOST_A_ETH_ADDR)
            .unwrap();

        assert_eq!(Some(helper_eth_addr), resolver.join().unwrap());
    });
}

#[test]
fn arp_detects_duplicate_address() {
    context::run(|context| {
        let (stack, _) = context::host(
            &context.wire,
            EthernetAddress::new([0x06, 0, 0, 0, 0, 0x03]),
            *HOST_B_IPV4_ADDR,
            fast_config(),
        );

        assert_matches!(
            stack,
            Err(Error::DuplicateAddress(ipv4_addr, eth_addr))
                if ipv4_addr == *HOST_B_IPV4_ADDR && eth_addr == *HOST_B_ETH_ADDR
        );
    });
}
