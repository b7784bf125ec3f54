//! ADIv5/SWD: the Debug Port and Access Port addressing/access discipline.

pub mod ap;
pub mod dap;
pub mod dp;

pub use dap::{DapSession, LinkState};
