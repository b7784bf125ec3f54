//! The nRF52832 memory map and non-volatile memory controller.

pub mod addr;
pub mod nvm;

pub use nvm::NvmController;
