//! `erase`: CTRL-AP `ERASEALL`, then a sanity read of three probe sites.

use crate::arm::DapSession;
use crate::error::Result;
use crate::nrf52::addr;
use crate::nrf52::NvmController;

use super::progress::ProgressSink;

const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Performs the CTRL-AP chip erase and verifies three probe sites read as
/// erased. Returns `Ok` even if the sanity probe finds non-erased bytes —
/// the erase itself completed; only a warning is logged.
pub fn erase(
    session: &mut DapSession,
    nvm: &NvmController,
    progress: &mut dyn ProgressSink,
) -> Result<()> {
    progress.report(0, Some("erasing"));
    nvm.chip_erase(session)?;
    progress.report(80, Some("verifying erase"));

    let engine = crate::memory::MemoryEngine::new();
    let flash_0 = engine.read_u32(session, addr::FLASH_BASE)?;
    let flash_400 = engine.read_u32(session, addr::FLASH_BASE + 0x400)?;
    let uicr_approtect = engine.read_u32(session, addr::UICR_BASE + addr::uicr_offset::APPROTECT)?;

    tracing::info!(
        flash_0 = format!("{flash_0:#010x}"),
        flash_400 = format!("{flash_400:#010x}"),
        uicr_approtect = format!("{uicr_approtect:#010x}"),
        "post-erase probe sites"
    );

    if flash_0 == ERASED_WORD && flash_400 == ERASED_WORD && uicr_approtect == ERASED_WORD {
        progress.report(100, Some("erase verified"));
    } else {
        tracing::warn!("post-erase probe sites did not all read as erased");
        progress.report(100, Some("erase completed with warnings"));
    }

    Ok(())
}
