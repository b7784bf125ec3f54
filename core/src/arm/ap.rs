//! Access Port registers: MEM-AP (#0, memory-mapped target access) and the
//! nRF CTRL-AP (#1, `ERASEALL`/`RESET`/`IDR`).

use bitfield::bitfield;

/// The MEM-AP providing memory-mapped access.
pub const MEM_AP_SEL: u8 = 0;
/// The nRF CTRL-AP providing `ERASEALL`/`RESET`.
pub const CTRL_AP_SEL: u8 = 1;

/// MEM-AP register addresses (bank 0).
pub mod mem_ap {
    pub const CSW: u8 = 0x0;
    pub const TAR: u8 = 0x4;
    pub const DRW: u8 = 0xC;
}

bitfield! {
    /// MEM-AP `CSW`, configured for 32-bit single auto-increment transfers.
    #[derive(Clone, Copy)]
    pub struct Csw(u32);
    impl Debug;
    pub u8, prot, set_prot: 26, 24;
    pub u8, cache, set_cache: 15, 12;
    pub u8, addr_inc, set_addr_inc: 5, 4;
    pub u8, size, set_size: 2, 0;
}

/// `AddrInc` field values.
pub const ADDR_INC_OFF: u8 = 0b00;
pub const ADDR_INC_SINGLE: u8 = 0b01;
/// `Size` field value for 32-bit transfers.
pub const SIZE_32: u8 = 0b010;

impl Csw {
    /// `CSW` for 32-bit, single-auto-increment transfers.
    pub fn auto_increment_32() -> u32 {
        let mut c = Csw(0);
        c.set_prot(0b110);
        c.set_cache(0b11);
        c.set_addr_inc(ADDR_INC_SINGLE);
        c.set_size(SIZE_32);
        c.0
    }
}

/// CTRL-AP register addresses.
pub mod ctrl_ap {
    pub const RESET: u8 = 0x00;
    pub const ERASEALL: u8 = 0x04;
    pub const ERASEALLSTATUS: u8 = 0x08;
    pub const IDR: u8 = 0xFC;
}

/// The expected `CTRL-AP.IDR` value on an nRF52; a mismatch is a logged
/// warning, not a hard error.
pub const CTRL_AP_EXPECTED_IDR: u32 = 0x0288_0000;
