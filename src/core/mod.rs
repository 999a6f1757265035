//! Core, platform independent networking code.

pub mod arp_cache;
pub mod check;
pub mod config;
pub mod link;
pub mod ports;
pub mod repr;
pub mod service;
pub mod time;
pub mod wire;
