//! Linux specific links and interface configuration.

mod libc;
pub mod netconf;
pub mod tap;
