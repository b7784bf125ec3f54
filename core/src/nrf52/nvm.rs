//! The nRF52 non-volatile memory controller protocol: flash/UICR read and
//! write, CTRL-AP chip erase.

use std::time::{Duration, Instant};

use crate::arm::ap;
use crate::arm::DapSession;
use crate::error::{CoreError, Result};
use crate::memory::MemoryEngine;
use crate::nrf52::addr;

const NVMC_POLL_INTERVAL: Duration = Duration::from_millis(1);
const NVMC_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const ERASEALL_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ERASEALL_BUDGET: Duration = Duration::from_secs(15);
const ERASEALL_MAX_ATTEMPTS: u32 = 150;
const POST_ERASE_SETTLE: Duration = Duration::from_secs(1);

/// The ten raw FICR words behind `DeviceInfo`.
#[derive(Debug, Clone, Copy)]
pub struct RawDeviceInfo {
    pub codepagesize: u32,
    pub codesize: u32,
    pub device_id: [u32; 2],
    pub device_addr_type: u32,
    pub device_addr: [u32; 2],
    pub part: u32,
    pub variant: u32,
    pub package: u32,
    pub ram_kb: u32,
    pub flash_kb: u32,
}

/// The six raw UICR words behind `UicrRegisters`.
#[derive(Debug, Clone, Copy)]
pub struct RawUicr {
    pub pselreset0: u32,
    pub pselreset1: u32,
    pub approtect: u32,
    pub nfcpins: u32,
    pub nrffw0: u32,
    pub nrffw1: u32,
}

/// The 23 raw words of the bootloader settings page, or `None` if the page
/// reads as erased (first word `0xFFFFFFFF`).
pub type RawBootloaderSettings = [u32; 23];

pub struct NvmController {
    engine: MemoryEngine,
}

impl NvmController {
    pub fn new() -> Self {
        Self {
            engine: MemoryEngine::new(),
        }
    }

    fn read(&self, session: &mut DapSession, addr: u32) -> Result<u32> {
        self.engine.read_u32(session, addr)
    }

    pub fn read_device_info(&self, session: &mut DapSession) -> Result<RawDeviceInfo> {
        use addr::ficr_offset as o;
        let base = addr::FICR_BASE;
        Ok(RawDeviceInfo {
            codepagesize: self.read(session, base + o::CODEPAGESIZE)?,
            codesize: self.read(session, base + o::CODESIZE)?,
            device_id: [
                self.read(session, base + o::DEVICEID0)?,
                self.read(session, base + o::DEVICEID1)?,
            ],
            device_addr_type: self.read(session, base + o::DEVICEADDRTYPE)?,
            device_addr: [
                self.read(session, base + o::DEVICEADDR0)?,
                self.read(session, base + o::DEVICEADDR1)?,
            ],
            part: self.read(session, base + o::INFO_PART)?,
            variant: self.read(session, base + o::INFO_VARIANT)?,
            package: self.read(session, base + o::INFO_PACKAGE)?,
            ram_kb: self.read(session, base + o::INFO_RAM)?,
            flash_kb: self.read(session, base + o::INFO_FLASH)?,
        })
    }

    pub fn read_uicr(&self, session: &mut DapSession) -> Result<RawUicr> {
        use addr::uicr_offset as o;
        let base = addr::UICR_BASE;
        Ok(RawUicr {
            pselreset0: self.read(session, base + o::PSELRESET0)?,
            pselreset1: self.read(session, base + o::PSELRESET1)?,
            approtect: self.read(session, base + o::APPROTECT)?,
            nfcpins: self.read(session, base + o::NFCPINS)?,
            nrffw0: self.read(session, base + o::NRFFW0)?,
            nrffw1: self.read(session, base + o::NRFFW1)?,
        })
    }

    /// Reads the full 1 KiB UICR region as a block.
    pub fn read_uicr_binary(&self, session: &mut DapSession) -> Result<Vec<u8>> {
        let word_count = (addr::UICR_SIZE / 4) as usize;
        let mut words = vec![0u32; word_count];
        self.engine.read_block(session, addr::UICR_BASE, &mut words)?;
        Ok(words_to_le_bytes(&words))
    }

    /// Reads the flash image, `flash_bytes` long, reporting progress
    /// through `on_progress(percent)`.
    pub fn read_flash(
        &self,
        session: &mut DapSession,
        flash_bytes: u32,
        mut on_progress: impl FnMut(u8),
    ) -> Result<Vec<u8>> {
        let word_count = (flash_bytes / 4) as usize;
        let mut words = vec![0u32; word_count];
        const CHUNK_WORDS: usize = 1024; // 4 KiB per progress tick
        let mut done = 0usize;
        let mut last_reported = 0u8;
        while done < word_count {
            let chunk_len = CHUNK_WORDS.min(word_count - done);
            let addr = addr::FLASH_BASE + (done as u32) * 4;
            self.engine
                .read_block(session, addr, &mut words[done..done + chunk_len])?;
            done += chunk_len;
            let percent = ((done * 100) / word_count.max(1)) as u8;
            if percent >= last_reported + 10 || done == word_count {
                on_progress(percent);
                last_reported = percent;
            }
        }
        Ok(words_to_le_bytes(&words))
    }

    /// Reads the 23-word bootloader-settings page, or `None` if absent.
    pub fn read_bootloader_settings(&self, session: &mut DapSession) -> Result<Option<RawBootloaderSettings>> {
        let mut words = [0u32; 23];
        self.engine.read_block(session, addr::BL_SETTINGS_ADDR, &mut words)?;
        if words[0] == 0xFFFF_FFFF {
            return Ok(None);
        }
        Ok(Some(words))
    }

    /// Enables `NVMC.CONFIG = WEN`, waits for `READY`, writes `data` (padded
    /// to a whole word with `0xFF`) starting at `address` in 4-KiB blocks,
    /// then sets `CONFIG = REN`.
    pub fn write(&self, session: &mut DapSession, address: u32, data: &[u8]) -> Result<()> {
        let words = bytes_to_le_words_padded(data);

        self.write_config(session, addr::NVMC_CONFIG_WEN)?;
        let result = self.write_words_in_pages(session, address, &words);
        // Always attempt to leave NVMC back in read-only mode, even on error.
        if let Err(e) = self.write_config(session, addr::NVMC_CONFIG_REN) {
            tracing::warn!(error = %e, "failed to restore NVMC to read-only mode");
        }
        result.map_err(|e| CoreError::write_failed(format!("NVMC write failed: {e}")))
    }

    fn write_words_in_pages(&self, session: &mut DapSession, address: u32, words: &[u32]) -> Result<()> {
        const WORDS_PER_PAGE: usize = (addr::FLASH_PAGE_SIZE / 4) as usize;
        let mut offset = 0usize;
        while offset < words.len() {
            let chunk_len = WORDS_PER_PAGE.min(words.len() - offset);
            let chunk_addr = address + (offset as u32) * 4;
            self.poll_ready(session)?;
            self.engine
                .write_block(session, chunk_addr, &words[offset..offset + chunk_len])?;
            offset += chunk_len;
        }
        Ok(())
    }

    fn write_config(&self, session: &mut DapSession, value: u32) -> Result<()> {
        self.engine.write_u32(session, addr::NVMC_CONFIG, value)
    }

    fn poll_ready(&self, session: &mut DapSession) -> Result<()> {
        let deadline = Instant::now() + NVMC_WRITE_TIMEOUT;
        loop {
            if self.read(session, addr::NVMC_READY)? == 1 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CoreError::timeout("NVMC did not become ready in time"));
            }
            std::thread::sleep(NVMC_POLL_INTERVAL);
        }
    }

    /// Writes `uicr`, which must be exactly 1024 bytes, as a single 256-word
    /// block.
    pub fn write_uicr(&self, session: &mut DapSession, uicr: &[u8]) -> Result<()> {
        if uicr.len() != addr::UICR_SIZE as usize {
            return Err(CoreError::invalid_data(format!(
                "UICR image must be {} bytes, got {}",
                addr::UICR_SIZE,
                uicr.len()
            )));
        }
        self.write(session, addr::UICR_BASE, uicr)
    }

    /// Performs the CTRL-AP `ERASEALL` recovery procedure.
    ///
    /// Best-effort steps (reset pulse, re-selecting MEM-AP) are logged, not
    /// surfaced, on failure.
    pub fn chip_erase(&self, session: &mut DapSession) -> Result<()> {
        session.clear_errors();

        let idr = session.read_ap(ap::CTRL_AP_SEL, ap::ctrl_ap::IDR)?;
        if idr != ap::CTRL_AP_EXPECTED_IDR {
            tracing::warn!(
                idr = format!("{idr:#010x}"),
                expected = format!("{:#010x}", ap::CTRL_AP_EXPECTED_IDR),
                "CTRL-AP IDR mismatch; continuing anyway"
            );
        }

        session.write_ap(ap::CTRL_AP_SEL, ap::ctrl_ap::ERASEALL, 0)?;
        session.write_ap(ap::CTRL_AP_SEL, ap::ctrl_ap::ERASEALL, 1)?;

        let deadline = Instant::now() + ERASEALL_BUDGET;
        let mut attempts = 0u32;
        loop {
            let status = session.read_ap(ap::CTRL_AP_SEL, ap::ctrl_ap::ERASEALLSTATUS)?;
            if status == 0 {
                break;
            }
            attempts += 1;
            if attempts >= ERASEALL_MAX_ATTEMPTS || Instant::now() >= deadline {
                return Err(CoreError::erase_failed(
                    "ERASEALLSTATUS did not clear within the 15s budget",
                ));
            }
            std::thread::sleep(ERASEALL_POLL_INTERVAL);
        }

        if let Err(e) = session.write_ap(ap::CTRL_AP_SEL, ap::ctrl_ap::RESET, 1) {
            tracing::warn!(error = %e, "failed to assert CTRL-AP reset (best-effort)");
        }
        if let Err(e) = session.write_ap(ap::CTRL_AP_SEL, ap::ctrl_ap::RESET, 0) {
            tracing::warn!(error = %e, "failed to deassert CTRL-AP reset (best-effort)");
        }
        if let Err(e) = session.write_ap(ap::CTRL_AP_SEL, ap::ctrl_ap::ERASEALL, 0) {
            tracing::warn!(error = %e, "failed to clear ERASEALL (best-effort)");
        }

        session.clear_errors();
        std::thread::sleep(POST_ERASE_SETTLE);
        Ok(())
    }
}

impl Default for NvmController {
    fn default() -> Self {
        Self::new()
    }
}

fn words_to_le_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}

/// Packs bytes into little-endian words, padding a partial trailing word
/// with `0xFF`, the erased-flash value.
fn bytes_to_le_words_padded(data: &[u8]) -> Vec<u32> {
    let mut out = Vec::with_capacity(data.len().div_ceil(4));
    for chunk in data.chunks(4) {
        let mut buf = [0xFFu8; 4];
        buf[..chunk.len()].copy_from_slice(chunk);
        out.push(u32::from_le_bytes(buf));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_partial_trailing_word_with_erased_value() {
        let data = [0x11, 0x22, 0x33];
        let words = bytes_to_le_words_padded(&data);
        assert_eq!(words, vec![u32::from_le_bytes([0x11, 0x22, 0x33, 0xFF])]);
    }

    #[test]
    fn exact_word_multiple_has_no_padding() {
        let data = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        let words = bytes_to_le_words_padded(&data);
        assert_eq!(
            words,
            vec![
                u32::from_le_bytes([0x11, 0x22, 0x33, 0x44]),
                u32::from_le_bytes([0x55, 0x66, 0x77, 0x88]),
            ]
        );
    }
}
