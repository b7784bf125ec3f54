//! The nRF52832 memory map.

pub const FICR_BASE: u32 = 0x1000_0000;
pub const UICR_BASE: u32 = 0x1000_1000;
pub const UICR_SIZE: u32 = 0x400;

pub const NVMC_READY: u32 = 0x4001_E400;
pub const NVMC_CONFIG: u32 = 0x4001_E504;
pub const NVMC_ERASEPAGE: u32 = 0x4001_E508;

pub const FLASH_BASE: u32 = 0x0000_0000;
pub const FLASH_PAGE_SIZE: u32 = 4096;

pub const BL_SETTINGS_ADDR: u32 = 0x0007_F000;

/// The bootloader's application bank base, used to compute `APP_END` when
/// resolving a patch file's clean-region symbols.
pub const APP_BANK_BASE: u32 = 0x23000;

/// Cortex-M `SCB.AIRCR`, used for the restore path's soft reset. Writing
/// `VECTKEY=0x05FA` with `SYSRESETREQ` (bit 2) set requests a system reset.
pub const AIRCR_ADDR: u32 = 0xE000_ED0C;
pub const AIRCR_SYSRESETREQ: u32 = 0x05FA_0004;

/// `NVMC.CONFIG` values.
pub const NVMC_CONFIG_REN: u32 = 0x00;
pub const NVMC_CONFIG_WEN: u32 = 0x01;
pub const NVMC_CONFIG_EEN: u32 = 0x02;

/// FICR field offsets used by `read_device_info`.
pub mod ficr_offset {
    pub const CODEPAGESIZE: u32 = 0x010;
    pub const CODESIZE: u32 = 0x014;
    pub const DEVICEID0: u32 = 0x060;
    pub const DEVICEID1: u32 = 0x064;
    pub const DEVICEADDRTYPE: u32 = 0x0A0;
    pub const DEVICEADDR0: u32 = 0x0A4;
    pub const DEVICEADDR1: u32 = 0x0A8;
    pub const INFO_PART: u32 = 0x100;
    pub const INFO_VARIANT: u32 = 0x104;
    pub const INFO_PACKAGE: u32 = 0x108;
    pub const INFO_RAM: u32 = 0x10C;
    pub const INFO_FLASH: u32 = 0x110;
}

/// UICR field offsets used by `read_uicr`.
pub mod uicr_offset {
    pub const PSELRESET0: u32 = 0x200;
    pub const PSELRESET1: u32 = 0x204;
    pub const APPROTECT: u32 = 0x208;
    pub const NFCPINS: u32 = 0x20C;
    pub const NRFFW0: u32 = 0x014;
    pub const NRFFW1: u32 = 0x018;
}
