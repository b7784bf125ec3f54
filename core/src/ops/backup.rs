//! `backup`: read device info, flash, and UICR off a connected target.

use crate::arm::DapSession;
use crate::error::Result;
use crate::nrf52::NvmController;
use crate::records::DeviceInfo;

use super::progress::ProgressSink;

/// The three things a backup produces.
pub struct BackupResult {
    pub device_info: DeviceInfo,
    pub flash: Vec<u8>,
    pub uicr: Vec<u8>,
}

/// Full backup of flash and UICR.
pub fn backup(
    session: &mut DapSession,
    nvm: &NvmController,
    progress: &mut dyn ProgressSink,
) -> Result<BackupResult> {
    progress.report(0, Some("reading device info"));
    let raw_info = nvm.read_device_info(session)?;
    let device_info: DeviceInfo = raw_info.into();
    let flash_bytes = device_info.flash_kb * 1024;

    tracing::info!(
        part = format!("{:#010x}", device_info.part),
        flash_kb = device_info.flash_kb,
        "starting backup"
    );

    let flash = nvm.read_flash(session, flash_bytes, |percent| {
        progress.report(percent, Some("reading flash"));
    })?;

    progress.report(95, Some("reading UICR"));
    let uicr = nvm.read_uicr_binary(session)?;

    progress.report(100, Some("backup complete"));
    Ok(BackupResult {
        device_info,
        flash,
        uicr,
    })
}
