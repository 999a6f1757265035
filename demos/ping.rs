extern crate clap;
extern crate env_logger;
extern crate usrip;

mod env;

use std::process;
use std::time::Duration;

use env::App;
use usrip::core::repr::Ipv4Address;

/// Sends ICMP echo requests and prints the round trip time of each reply.
fn main() {
    env_logger::init();

    let matches = clap::App::new("ping")
        .with_defaults()
        .arg(
            clap::Arg::with_name("IPV4")
                .help("Host to ping")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::with_name("count")
                .short("c")
                .long("count")
                .value_name("COUNT")
                .help("Number of echo requests to send")
                .default_value("4")
                .takes_value(true),
        )
        .get_matches();

    let dst_addr: Ipv4Address = env::ipv4_arg(&matches, "IPV4");
    let count = matches
        .value_of("count")
        .and_then(|count| count.parse::<u16>().ok())
        .expect("Bad count!");

    let stack = env::stack(&matches).unwrap_or_else(|err| {
        eprintln!("Unable to bring up the stack: {}.", err);
        process::exit(1);
    });

    let pongs = stack.icmpv4().subscribe();
    let id = process::id() as u16;

    for seq in 1 ..= count {
        if let Err(err) = stack.ping(dst_addr, id, seq, b"ping") {
            println!("Ping {} to {} failed: {}.", seq, dst_addr, err);
            continue;
        }

        match pongs.recv_timeout(Duration::from_secs(1)) {
            Ok(pong) => println!(
                "Reply from {}: id={} seq={} time={:?}",
                pong.src_addr, pong.id, pong.seq, pong.rtt
            ),
            Err(_) => println!("Request {} to {} timed out.", seq, dst_addr),
        }
    }

    env::print_arp_cache(&stack);
}
