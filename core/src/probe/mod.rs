//! Probe transport: USB framing plus CMSIS-DAP command encoding.

pub mod cmsisdap;
pub mod transport;

pub use transport::{ProbeHandle, DEFAULT_PID, DEFAULT_VID};
