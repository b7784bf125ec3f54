//! Host-side tooling for backing up, chip-erasing, and restoring the
//! non-volatile memory of an nRF52832 target through a CMSIS-DAP probe.
//!
//! The call stack is layered bottom-up: a probe transport at the bottom, an
//! ADIv5 DP/AP driver above it, a memory engine on top of that, the
//! nRF52-specific NVM controller above the engine, and the backup / erase /
//! restore operations at the top. `records` and `kitchen` are pure
//! data-layer modules with no target I/O.

pub mod archive;
pub mod arm;
pub mod error;
pub mod kitchen;
pub mod memory;
pub mod nrf52;
pub mod ops;
pub mod probe;
pub mod records;

pub use arm::DapSession;
pub use error::{CoreError, ErrorCode, Result};
pub use memory::MemoryEngine;
pub use nrf52::NvmController;
pub use probe::ProbeHandle;
