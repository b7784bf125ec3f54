//! `restore`: write flash and UICR back to a target, with optional
//! read-back verification.

use crate::arm::DapSession;
use crate::error::{CoreError, Result};
use crate::memory::MemoryEngine;
use crate::nrf52::addr;
use crate::nrf52::NvmController;

use super::progress::ProgressSink;

/// How many mismatches to log individually before just counting.
const MAX_LOGGED_MISMATCHES: usize = 5;

/// 32 KiB per progress tick while writing flash.
const WRITE_CHUNK_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct RestoreOptions {
    pub verify: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self { verify: true }
    }
}

/// Restores `flash` and `uicr` onto a connected target. `flash.len()` must
/// equal the target's reported flash size; `uicr.len()` must be exactly
/// 1024.
pub fn restore(
    session: &mut DapSession,
    nvm: &NvmController,
    flash: &[u8],
    uicr: &[u8],
    options: RestoreOptions,
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    let raw_info = nvm.read_device_info(session)?;
    let expected_flash_len = (raw_info.flash_kb * 1024) as usize;
    if flash.len() != expected_flash_len {
        return Err(CoreError::invalid_data(format!(
            "flash image is {} bytes, target expects {expected_flash_len}",
            flash.len()
        )));
    }
    if uicr.len() != addr::UICR_SIZE as usize {
        return Err(CoreError::invalid_data(format!(
            "UICR image must be {} bytes, got {}",
            addr::UICR_SIZE,
            uicr.len()
        )));
    }

    // Step 1: write flash in chunks, reporting progress.
    let mut written = 0usize;
    while written < flash.len() {
        let chunk_len = WRITE_CHUNK_BYTES.min(flash.len() - written);
        let chunk_addr = addr::FLASH_BASE + written as u32;
        nvm.write(session, chunk_addr, &flash[written..written + chunk_len])?;
        written += chunk_len;
        let percent = ((written * 60) / flash.len().max(1)) as u8;
        progress.report(percent, Some("writing flash"));
    }

    // Step 2: optional read-back verification.
    if options.verify {
        progress.report(65, Some("verifying flash"));
        verify_flash(session, flash)?;
    }

    // Step 3: write UICR as a single block.
    progress.report(85, Some("writing UICR"));
    nvm.write_uicr(session, uicr)?;

    // Step 4: soft reset via the DP driver.
    progress.report(95, Some("resetting target"));
    let engine = MemoryEngine::new();
    engine.write_u32(session, addr::AIRCR_ADDR, addr::AIRCR_SYSRESETREQ)?;

    progress.report(100, Some("restore complete"));
    Ok(())
}

fn verify_flash(session: &mut DapSession, expected: &[u8]) -> Result<()> {
    let engine = MemoryEngine::new();
    let word_count = expected.len() / 4;
    let mut observed = vec![0u32; word_count];

    const CHUNK_WORDS: usize = 1024;
    let mut offset = 0usize;
    while offset < word_count {
        let chunk_len = CHUNK_WORDS.min(word_count - offset);
        let addr = addr::FLASH_BASE + (offset as u32) * 4;
        engine.read_block(session, addr, &mut observed[offset..offset + chunk_len])?;
        offset += chunk_len;
    }

    let mut mismatches = 0usize;
    for (i, chunk) in expected.chunks_exact(4).enumerate() {
        let expected_word = u32::from_le_bytes(chunk.try_into().unwrap());
        let observed_word = observed[i];
        if expected_word != observed_word {
            if mismatches < MAX_LOGGED_MISMATCHES {
                tracing::warn!(
                    address = format!("{:#010x}", i as u32 * 4),
                    expected = format!("{expected_word:#010x}"),
                    observed = format!("{observed_word:#010x}"),
                    "flash verify mismatch"
                );
            }
            mismatches += 1;
        }
    }

    if mismatches > 0 {
        return Err(CoreError::verify_failed(format!(
            "{mismatches} word(s) mismatched during flash verify"
        )));
    }
    Ok(())
}
