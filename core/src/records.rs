//! Structured record decoders: FICR device info, UICR registers, and the
//! bootloader settings page.

use crate::error::{CoreError, Result};
use crate::kitchen::crc::crc32;
use crate::nrf52::nvm::{RawBootloaderSettings, RawDeviceInfo, RawUicr};

/// A decoded FICR snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub part: u32,
    pub variant: String,
    pub package: &'static str,
    pub ram_kb: u32,
    pub flash_kb: u32,
    pub device_id: [u32; 2],
    pub device_addr: [u32; 2],
    pub device_addr_type: u32,
    pub codepagesize: u32,
    pub codesize: u32,
}

impl From<RawDeviceInfo> for DeviceInfo {
    fn from(raw: RawDeviceInfo) -> Self {
        Self {
            part: raw.part,
            variant: decode_variant(raw.variant),
            package: decode_package(raw.package),
            ram_kb: raw.ram_kb,
            flash_kb: raw.flash_kb,
            device_id: raw.device_id,
            device_addr: raw.device_addr,
            device_addr_type: raw.device_addr_type,
            codepagesize: raw.codepagesize,
            codesize: raw.codesize,
        }
    }
}

/// `variant` is four ASCII bytes, MSB first, trailing NULs stripped (spec
/// §4.6).
fn decode_variant(raw: u32) -> String {
    let bytes = raw.to_be_bytes();
    let text: String = bytes.iter().map(|&b| b as char).collect();
    text.trim_end_matches('\0').to_string()
}

/// `package` is mapped via a fixed table.
fn decode_package(raw: u32) -> &'static str {
    match raw {
        0x2000 => "QF",
        0x2001 => "CH",
        0x2002 => "CI",
        0x2005 => "QK",
        _ => "Unknown",
    }
}

/// Decoded UICR registers. Stored as raw 32-bit values plus their display
/// interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UicrRegisters {
    pub pselreset0: u32,
    pub pselreset1: u32,
    pub approtect: u32,
    pub nfcpins: u32,
    pub nrffw0: u32,
    pub nrffw1: u32,
}

impl From<RawUicr> for UicrRegisters {
    fn from(raw: RawUicr) -> Self {
        Self {
            pselreset0: raw.pselreset0,
            pselreset1: raw.pselreset1,
            approtect: raw.approtect,
            nfcpins: raw.nfcpins,
            nrffw0: raw.nrffw0,
            nrffw1: raw.nrffw1,
        }
    }
}

impl UicrRegisters {
    /// "Enabled" iff the low byte equals `0x00`.
    pub fn approtect_display(&self) -> &'static str {
        if self.approtect & 0xFF == 0x00 {
            "Enabled"
        } else {
            "Disabled"
        }
    }

    /// "Disconnected" iff bit 31 is set, else "Pin N".
    pub fn pselreset_display(value: u32) -> String {
        if value & (1 << 31) != 0 {
            "Disconnected".to_string()
        } else {
            format!("Pin {}", value & 0xFF)
        }
    }

    /// Bit 0 selects "GPIO" (0) vs "NFC Antenna" (1).
    pub fn nfcpins_display(&self) -> &'static str {
        if self.nfcpins & 0x1 == 0 {
            "GPIO"
        } else {
            "NFC Antenna"
        }
    }

    pub fn nrffw0_display(&self) -> String {
        if self.nrffw0 == 0xFFFF_FFFF {
            "Not Set".to_string()
        } else {
            format!("{:#010x}", self.nrffw0)
        }
    }
}

/// One flash bank slot inside the bootloader settings page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankInfo {
    pub image_size: u32,
    pub image_crc: u32,
    pub bank_code: u32,
}

/// The 92-byte bootloader settings page at `BL_SETTINGS_ADDR`.
///
/// Field offsets follow the vendor SDK's `nrf_dfu_settings_t` (settings
/// schema v1); `reserved` preserves the remaining bytes byte-for-byte so
/// `decode(encode(x)) == x` holds for any input with a valid header CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderSettings {
    pub crc: u32,
    pub settings_version: u32,
    pub app_version: u32,
    pub bootloader_version: u32,
    pub bank_layout: u32,
    pub bank_current: u32,
    pub bank0: BankInfo,
    pub bank1: BankInfo,
    pub write_offset: u32,
    pub sd_size: u32,
    pub dfu_progress: u32,
    pub enter_buttonless_dfu: u32,
    pub reserved: [u8; 28],
}

pub const SETTINGS_PAGE_LEN: usize = 92;
/// Offset of `bank0.image_crc` within the page: written little-endian at
/// `BL_SETTINGS_ADDR + 0x1C` after a patch recomputes it.
pub const BANK0_IMAGE_CRC_OFFSET: u32 = 0x1C;

impl BootloaderSettings {
    /// Decodes the page from its 23 little-endian words.
    pub fn decode(words: &RawBootloaderSettings) -> Self {
        Self {
            crc: words[0],
            settings_version: words[1],
            app_version: words[2],
            bootloader_version: words[3],
            bank_layout: words[4],
            bank_current: words[5],
            bank0: BankInfo {
                image_size: words[6],
                image_crc: words[7],
                bank_code: words[8],
            },
            bank1: BankInfo {
                image_size: words[9],
                image_crc: words[10],
                bank_code: words[11],
            },
            write_offset: words[12],
            sd_size: words[13],
            dfu_progress: words[14],
            enter_buttonless_dfu: words[15],
            reserved: {
                let mut r = [0u8; 28];
                for (i, w) in words[16..23].iter().enumerate() {
                    r[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
                }
                r
            },
        }
    }

    /// Decodes directly from a flash image's bytes at `BL_SETTINGS_ADDR`.
    pub fn decode_from_image(image: &[u8], base_offset: usize) -> Result<Self> {
        if image.len() < base_offset + SETTINGS_PAGE_LEN {
            return Err(CoreError::invalid_data(
                "image too short to contain the bootloader settings page",
            ));
        }
        let page = &image[base_offset..base_offset + SETTINGS_PAGE_LEN];
        let mut words = [0u32; 23];
        for (i, chunk) in page.chunks_exact(4).enumerate() {
            words[i] = u32::from_le_bytes(chunk.try_into().unwrap());
        }
        Ok(Self::decode(&words))
    }

    /// Encodes back to the 92-byte page layout.
    pub fn encode(&self) -> [u8; SETTINGS_PAGE_LEN] {
        let mut out = [0u8; SETTINGS_PAGE_LEN];
        let words = [
            self.crc,
            self.settings_version,
            self.app_version,
            self.bootloader_version,
            self.bank_layout,
            self.bank_current,
            self.bank0.image_size,
            self.bank0.image_crc,
            self.bank0.bank_code,
            self.bank1.image_size,
            self.bank1.image_crc,
            self.bank1.bank_code,
            self.write_offset,
            self.sd_size,
            self.dfu_progress,
            self.enter_buttonless_dfu,
        ];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        out[64..92].copy_from_slice(&self.reserved);
        out
    }

    /// `crc` equals `CRC-32([4..92))`.
    pub fn crc_is_valid(&self) -> bool {
        let encoded = self.encode();
        crc32(&encoded[4..92]) == self.crc
    }

    /// `APP_END = 0x23000 + bank0.image_size`.
    pub fn app_end(&self) -> u32 {
        crate::nrf52::addr::APP_BANK_BASE + self.bank0.image_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> BootloaderSettings {
        let mut s = BootloaderSettings {
            crc: 0,
            settings_version: 1,
            app_version: 2,
            bootloader_version: 3,
            bank_layout: 0,
            bank_current: 0,
            bank0: BankInfo {
                image_size: 0x1000,
                image_crc: 0xDEAD_BEEF,
                bank_code: 1,
            },
            bank1: BankInfo {
                image_size: 0,
                image_crc: 0,
                bank_code: 0,
            },
            write_offset: 0,
            sd_size: 0x1000,
            dfu_progress: 0,
            enter_buttonless_dfu: 0,
            reserved: [0xAB; 28],
        };
        let encoded = s.encode();
        s.crc = crc32(&encoded[4..92]);
        s
    }

    #[test]
    fn decode_of_encode_round_trips() {
        let s = sample();
        let words = {
            let bytes = s.encode();
            let mut w = [0u32; 23];
            for (i, chunk) in bytes.chunks_exact(4).enumerate() {
                w[i] = u32::from_le_bytes(chunk.try_into().unwrap());
            }
            w
        };
        let decoded = BootloaderSettings::decode(&words);
        assert_eq!(decoded, s);
        assert!(decoded.crc_is_valid());
    }

    #[test]
    fn variant_strips_trailing_nuls() {
        // "AAC0" stored MSB-first as in a real FICR read.
        let raw = u32::from_be_bytes([b'A', b'A', b'C', 0]);
        assert_eq!(decode_variant(raw), "AAC");
    }

    #[test]
    fn package_table_maps_known_codes() {
        assert_eq!(decode_package(0x2000), "QF");
        assert_eq!(decode_package(0x2005), "QK");
        assert_eq!(decode_package(0x9999), "Unknown");
    }

    #[test]
    fn approtect_enabled_iff_low_byte_zero() {
        let mut u = UicrRegisters {
            pselreset0: 0,
            pselreset1: 0,
            approtect: 0xFFFF_FF00,
            nfcpins: 0,
            nrffw0: 0xFFFF_FFFF,
            nrffw1: 0,
        };
        assert_eq!(u.approtect_display(), "Enabled");
        u.approtect = 0xFFFF_FFFF;
        assert_eq!(u.approtect_display(), "Disabled");
    }

    #[test]
    fn pselreset_disconnected_vs_pin() {
        assert_eq!(UicrRegisters::pselreset_display(0x8000_0000), "Disconnected");
        assert_eq!(UicrRegisters::pselreset_display(0x0000_0015), "Pin 21");
    }
}
