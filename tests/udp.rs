#[macro_use]
extern crate lazy_static;
extern crate usrip;

mod context;

use std::time::Duration;

use usrip::core::ports::EPHEMERAL_START;
use usrip::core::service::udp::UdpDatagram;

use context::*;

#[test]
fn udp_send_and_receive() {
    context::run(|context| {
        let datagrams = context.b.udp().subscribe();

        let src_port = context
            .a
            .send_udp(*HOST_B_IPV4_ADDR, 5353, b"hello")
            .unwrap();
        assert!(src_port >= EPHEMERAL_START);

        assert_eq!(
            UdpDatagram {
                src_addr: *HOST_A_IPV4_ADDR,
                src_port,
                dst_port: 5353,
                payload: b"hello".to_vec(),
            },
            datagrams.recv_timeout(Duration::from_secs(1)).unwrap()
        );
    });
}

#[test]
fn udp_multiple_subscribers() {
    context::run(|context| {
        let first = context.b.udp().subscribe();
        let second = context.b.udp().subscribe();
        drop(context.b.udp().subscribe());

        for i in 0 .. 3u8 {
            context
                .a
                .send_udp(*HOST_B_IPV4_ADDR, 7, &[i])
                .unwrap();
        }

        for subscriber in &[first, second] {
            let payloads: Vec<_> = (0 .. 3)
                .map(|_| {
                    subscriber
                        .recv_timeout(Duration::from_secs(1))
                        .unwrap()
                        .payload
                })
                .collect();
            assert_eq!(vec![vec![0], vec![1], vec![2]], payloads);
        }
    });
}
