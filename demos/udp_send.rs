extern crate clap;
extern crate env_logger;
extern crate usrip;

mod env;

use std::process;
use std::time::{
    Duration,
    Instant,
};

use env::App;

/// Sends a UDP datagram and prints any datagrams received for a while after.
fn main() {
    env_logger::init();

    let matches = clap::App::new("udp_send")
        .with_defaults()
        .arg(
            clap::Arg::with_name("IPV4")
                .help("Destination host")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::with_name("PORT")
                .help("Destination UDP port")
                .required(true)
                .index(2),
        )
        .arg(
            clap::Arg::with_name("MESSAGE")
                .help("Payload to send")
                .default_value("hello")
                .index(3),
        )
        .arg(
            clap::Arg::with_name("listen")
                .long("listen")
                .value_name("SECONDS")
                .help("How long to print received datagrams for")
                .default_value("5")
                .takes_value(true),
        )
        .get_matches();

    let dst_addr = env::ipv4_arg(&matches, "IPV4");
    let dst_port = matches
        .value_of("PORT")
        .and_then(|port| port.parse::<u16>().ok())
        .expect("Bad UDP port!");
    let message = matches.value_of("MESSAGE").unwrap_or_default();
    let listen = matches
        .value_of("listen")
        .and_then(|secs| secs.parse::<u64>().ok())
        .map(Duration::from_secs)
        .expect("Bad listen duration!");

    let stack = env::stack(&matches).unwrap_or_else(|err| {
        eprintln!("Unable to bring up the stack: {}.", err);
        process::exit(1);
    });

    let datagrams = stack.udp().subscribe();

    match stack.send_udp(dst_addr, dst_port, message.as_bytes()) {
        Ok(src_port) => println!(
            "Sent {} byte(s) from port {} to {}:{}; Use 'ncat -ul {}' to receive them.",
            message.len(),
            src_port,
            dst_addr,
            dst_port,
            dst_port
        ),
        Err(err) => {
            println!("Sending to {}:{} failed: {}.", dst_addr, dst_port, err);
            process::exit(1);
        }
    }

    let deadline = Instant::now() + listen;
    while let Some(timeout) = deadline.checked_duration_since(Instant::now()) {
        if let Ok(datagram) = datagrams.recv_timeout(timeout) {
            println!(
                "{}:{} -> port {}: {}",
                datagram.src_addr,
                datagram.src_port,
                datagram.dst_port,
                String::from_utf8_lossy(&datagram.payload)
            );
        }
    }

    env::print_arp_cache(&stack);
}
