//! Debug Port registers (ADIv5): `ABORT`/`CTRL-STAT` bitfields and `SELECT`
//! addressing.

use bitfield::bitfield;

/// DP register addresses (2-bit register select within the 4-register bank).
pub mod addr {
    pub const IDCODE_OR_ABORT: u8 = 0x0;
    pub const CTRL_STAT: u8 = 0x4;
    pub const SELECT: u8 = 0x8;
    pub const RDBUFF: u8 = 0xC;
}

bitfield! {
    /// `DP.ABORT`. Writing sticky-clear bits clears the corresponding error
    /// flag: `STKERR`/`WDERR`/`ORUNERR` after a fault response, before
    /// retrying the access.
    #[derive(Clone, Copy)]
    pub struct Abort(u32);
    impl Debug;
    pub _, set_orunerrclr: 4;
    pub _, set_wderrclr: 3;
    pub _, set_stkerrclr: 2;
    pub _, set_stkcmpclr: 1;
    pub _, set_dapabort: 0;
}

impl From<Abort> for u32 {
    fn from(a: Abort) -> u32 {
        a.0
    }
}

bitfield! {
    /// `DP.CTRL/STAT`.
    #[derive(Clone, Copy)]
    pub struct CtrlStat(u32);
    impl Debug;
    pub csyspwrupack, _: 31;
    pub csyspwrupreq, set_csyspwrupreq: 30;
    pub cdbgpwrupack, _: 29;
    pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
    pub sticky_err, set_sticky_err: 5;
    pub sticky_cmp, set_sticky_cmp: 4;
    pub sticky_orun, set_sticky_orun: 1;
}

impl From<u32> for CtrlStat {
    fn from(raw: u32) -> Self {
        CtrlStat(raw)
    }
}

impl From<CtrlStat> for u32 {
    fn from(c: CtrlStat) -> u32 {
        c.0
    }
}

/// `CTRL/STAT` with `CSYSPWRUPREQ | CDBGPWRUPREQ` set: the debug power-up
/// request issued once after line reset.
pub fn power_up_request() -> u32 {
    let mut c = CtrlStat(0);
    c.set_csyspwrupreq(true);
    c.set_cdbgpwrupreq(true);
    c.into()
}

/// The fixed value written to clear sticky-error bits after a WAIT/FAULT
/// response: `0x0000001E`.
pub const CLEAR_STICKY_ERRORS: u32 = 0x0000_001E;

/// `DP.SELECT` layout: `APSEL<<24 | APBANKSEL<<4`.
pub fn select_value(apsel: u8, apbanksel: u8) -> u32 {
    ((apsel as u32) << 24) | (((apbanksel & 0xF) as u32) << 4)
}
