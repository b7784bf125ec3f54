//! Backup archive format: a ZIP with `flash.bin`, `uicr.bin`, and an
//! advisory `metadata.json`.

use std::io::{Read, Seek, Write};

use serde::{Deserialize, Serialize};
use zip::write::FileOptions;

use crate::error::{CoreError, Result};
use crate::records::DeviceInfo;

#[derive(Debug, Serialize, Deserialize)]
struct DeviceMetadata {
    part: u32,
    variant: String,
    package: String,
    ram: u32,
    flash: u32,
    #[serde(rename = "deviceId")]
    device_id: [u32; 2],
}

#[derive(Debug, Serialize, Deserialize)]
struct SizesMetadata {
    flash: usize,
    uicr: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupMetadata {
    timestamp: String,
    device: DeviceMetadata,
    sizes: SizesMetadata,
}

/// Writes `flash`, `uicr`, and a `metadata.json` derived from `device_info`
/// into a ZIP at `writer`.
pub fn write_backup<W: Write + Seek>(
    writer: W,
    device_info: &DeviceInfo,
    flash: &[u8],
    uicr: &[u8],
) -> Result<()> {
    let mut archive = zip::ZipWriter::new(writer);
    let options = FileOptions::<()>::default();

    let metadata = BackupMetadata {
        timestamp: chrono::Utc::now().to_rfc3339(),
        device: DeviceMetadata {
            part: device_info.part,
            variant: device_info.variant.clone(),
            package: device_info.package.to_string(),
            ram: device_info.ram_kb,
            flash: device_info.flash_kb,
            device_id: device_info.device_id,
        },
        sizes: SizesMetadata {
            flash: flash.len(),
            uicr: uicr.len(),
        },
    };

    archive
        .start_file("flash.bin", options)
        .map_err(|e| CoreError::invalid_data(format!("could not start flash.bin entry: {e}")))?;
    archive
        .write_all(flash)
        .map_err(|e| CoreError::invalid_data(format!("could not write flash.bin: {e}")))?;

    archive
        .start_file("uicr.bin", options)
        .map_err(|e| CoreError::invalid_data(format!("could not start uicr.bin entry: {e}")))?;
    archive
        .write_all(uicr)
        .map_err(|e| CoreError::invalid_data(format!("could not write uicr.bin: {e}")))?;

    archive
        .start_file("metadata.json", options)
        .map_err(|e| CoreError::invalid_data(format!("could not start metadata.json entry: {e}")))?;
    serde_json::to_writer_pretty(&mut archive, &metadata)
        .map_err(|e| CoreError::invalid_data(format!("could not write metadata.json: {e}")))?;

    archive
        .finish()
        .map_err(|e| CoreError::invalid_data(format!("could not finalize archive: {e}")))?;
    Ok(())
}

/// The result of reading back a backup archive. Restore accepts any ZIP
/// with at least `flash.bin` and `uicr.bin`; `metadata.json` is advisory.
pub struct RestoreSource {
    pub flash: Vec<u8>,
    pub uicr: Vec<u8>,
}

pub fn read_backup<R: Read + Seek>(reader: R) -> Result<RestoreSource> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| CoreError::invalid_data(format!("not a valid ZIP archive: {e}")))?;

    let flash = read_member(&mut archive, "flash.bin")?;
    let uicr = read_member(&mut archive, "uicr.bin")?;
    Ok(RestoreSource { flash, uicr })
}

fn read_member<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| CoreError::invalid_data(format!("archive is missing '{name}': {e}")))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| CoreError::invalid_data(format!("could not read '{name}': {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_device_info() -> DeviceInfo {
        DeviceInfo {
            part: 0x52832,
            variant: "AAC0".to_string(),
            package: "QF",
            ram_kb: 64,
            flash_kb: 512,
            device_id: [0x1111_1111, 0x2222_2222],
            device_addr: [0x3333_3333, 0x4444_4444],
            device_addr_type: 0,
            codepagesize: 4096,
            codesize: 128,
        }
    }

    #[test]
    fn write_then_read_round_trips_flash_and_uicr() {
        let device_info = sample_device_info();
        let flash = vec![0xABu8; 4096];
        let uicr = vec![0xCDu8; 1024];

        let mut buf = Cursor::new(Vec::new());
        write_backup(&mut buf, &device_info, &flash, &uicr).unwrap();

        buf.set_position(0);
        let restored = read_backup(buf).unwrap();
        assert_eq!(restored.flash, flash);
        assert_eq!(restored.uicr, uicr);
    }

    #[test]
    fn read_backup_rejects_archive_missing_flash() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut archive = zip::ZipWriter::new(&mut buf);
            let options = FileOptions::<()>::default();
            archive.start_file("uicr.bin", options).unwrap();
            archive.write_all(&[0u8; 1024]).unwrap();
            archive.finish().unwrap();
        }
        buf.set_position(0);
        let err = read_backup(buf).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidData);
    }
}
