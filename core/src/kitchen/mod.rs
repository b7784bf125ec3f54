//! The firmware kitchen: deterministic patch application with
//! verification, region masking, and CRC repair of the bootloader settings
//! page. A pure transformation over byte buffers — it never touches a
//! target.

pub mod crc;

use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::nrf52::addr;
use crate::records::{BootloaderSettings, BANK0_IMAGE_CRC_OFFSET};
use crc::crc32;

/// A single typed or find-replace patch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Patch {
    String {
        address: u32,
        original: String,
        data: String,
        description: String,
    },
    U8 {
        address: u32,
        original: u8,
        data: u8,
        description: String,
    },
    U16 {
        address: u32,
        original: u16,
        data: u16,
        description: String,
    },
    U32 {
        address: u32,
        original: u32,
        data: u32,
        description: String,
    },
    Bytes {
        address: u32,
        original: Vec<u8>,
        data: Vec<u8>,
        description: String,
    },
    FindReplace {
        find: Vec<u8>,
        replace: Vec<u8>,
        description: String,
    },
}

impl Patch {
    pub fn description(&self) -> &str {
        match self {
            Patch::String { description, .. }
            | Patch::U8 { description, .. }
            | Patch::U16 { description, .. }
            | Patch::U32 { description, .. }
            | Patch::Bytes { description, .. }
            | Patch::FindReplace { description, .. } => description,
        }
    }
}

/// The end of a clean region: either a fixed address or the symbolic
/// `APP_END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionEnd {
    Fixed(u32),
    AppEnd,
}

impl<'de> Deserialize<'de> for RegionEnd {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u32),
            Symbol(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(RegionEnd::Fixed(n)),
            Repr::Symbol(s) if s == "APP_END" => Ok(RegionEnd::AppEnd),
            Repr::Symbol(s) => Err(serde::de::Error::custom(format!(
                "unknown clean-region end symbol: {s}"
            ))),
        }
    }
}

/// A byte range copied from the input image into an otherwise-erased
/// working buffer.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanRegion {
    pub start: u32,
    pub end: RegionEnd,
    pub description: String,
}

/// The patch-file record.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchFile {
    pub name: String,
    pub firmware_path: String,
    pub output_postfix: String,
    #[serde(default)]
    pub clean_regions: Vec<CleanRegion>,
    pub patches: Vec<Patch>,
}

/// Verifies and applies every patch in `patch_file` against `image`,
/// returning the patched output buffer.
pub fn apply(image: &[u8], patch_file: &PatchFile) -> Result<Vec<u8>> {
    // Step 1: load settings, compute APP_END.
    let settings = BootloaderSettings::decode_from_image(image, addr::BL_SETTINGS_ADDR as usize)?;
    let app_end = settings.app_end();

    // Step 2: optional region clean.
    let mut working = if patch_file.clean_regions.is_empty() {
        image.to_vec()
    } else {
        clean_regions(image, &patch_file.clean_regions, app_end)?
    };

    // Step 3: original-CRC sanity (warning only).
    let app_start = addr::APP_BANK_BASE as usize;
    let app_region_end = app_start + settings.bank0.image_size as usize;
    if app_region_end <= working.len() {
        let observed = crc32(&working[app_start..app_region_end]);
        if observed != settings.bank0.image_crc {
            tracing::warn!(
                observed = format!("{observed:#010x}"),
                recorded = format!("{:#010x}", settings.bank0.image_crc),
                "app-image CRC does not match bootloader settings before patching"
            );
        }
    }

    // Step 4: verify every patch before any write.
    let found_offsets = verify_patches(&working, &patch_file.patches)?;

    // Step 5: apply patches in listed order.
    for (patch, found_offset) in patch_file.patches.iter().zip(found_offsets.iter()) {
        apply_one(&mut working, patch, *found_offset)?;
    }

    // Step 6: recompute app CRC using the *original* (pre-patch) image size.
    if app_region_end <= working.len() {
        let new_app_crc = crc32(&working[app_start..app_region_end]);
        let offset = addr::BL_SETTINGS_ADDR as usize + BANK0_IMAGE_CRC_OFFSET as usize;
        working[offset..offset + 4].copy_from_slice(&new_app_crc.to_le_bytes());
    } else {
        return Err(CoreError::invalid_data(
            "app region extends past the end of the image",
        ));
    }

    // Step 7: recompute the settings-page CRC.
    let settings_base = addr::BL_SETTINGS_ADDR as usize;
    let settings_end = settings_base + crate::records::SETTINGS_PAGE_LEN;
    let new_settings_crc = crc32(&working[settings_base + 4..settings_end]);
    working[settings_base..settings_base + 4].copy_from_slice(&new_settings_crc.to_le_bytes());

    Ok(working)
}

fn clean_regions(image: &[u8], regions: &[CleanRegion], app_end: u32) -> Result<Vec<u8>> {
    let mut buf = vec![0xFFu8; image.len()];
    for region in regions {
        let end = match region.end {
            RegionEnd::Fixed(n) => n,
            RegionEnd::AppEnd => app_end,
        } as usize;
        let start = region.start as usize;
        if start > end || end > image.len() {
            return Err(CoreError::invalid_data(format!(
                "clean region '{}' [{start:#x}, {end:#x}) is out of bounds",
                region.description
            )));
        }
        buf[start..end].copy_from_slice(&image[start..end]);
    }
    Ok(buf)
}

/// Verifies every patch against `image` without writing anything. Returns,
/// per patch, the byte offset `find_replace` found its needle at (`None`
/// for typed patches).
fn verify_patches(image: &[u8], patches: &[Patch]) -> Result<Vec<Option<usize>>> {
    let mut offsets = Vec::with_capacity(patches.len());
    for patch in patches {
        offsets.push(verify_one(image, patch)?);
    }
    Ok(offsets)
}

fn verify_one(image: &[u8], patch: &Patch) -> Result<Option<usize>> {
    match patch {
        Patch::String {
            address,
            original,
            description,
            ..
        } => {
            let bytes = slice_at(image, *address, original.len(), description)?;
            if bytes != original.as_bytes() {
                return Err(mismatch(description));
            }
            Ok(None)
        }
        Patch::U8 {
            address,
            original,
            description,
            ..
        } => {
            let bytes = slice_at(image, *address, 1, description)?;
            if bytes[0] != *original {
                return Err(mismatch(description));
            }
            Ok(None)
        }
        Patch::U16 {
            address,
            original,
            description,
            ..
        } => {
            // Hex-viewer (big-endian-on-disk) convention.
            let bytes = slice_at(image, *address, 2, description)?;
            let current = u16::from_be_bytes(bytes.try_into().unwrap());
            if current != *original {
                return Err(mismatch(description));
            }
            Ok(None)
        }
        Patch::U32 {
            address,
            original,
            description,
            ..
        } => {
            let bytes = slice_at(image, *address, 4, description)?;
            let current = u32::from_be_bytes(bytes.try_into().unwrap());
            if current != *original {
                return Err(mismatch(description));
            }
            Ok(None)
        }
        Patch::Bytes {
            address,
            original,
            description,
            ..
        } => {
            let bytes = slice_at(image, *address, original.len(), description)?;
            if bytes != original.as_slice() {
                return Err(mismatch(description));
            }
            Ok(None)
        }
        Patch::FindReplace {
            find,
            replace,
            description,
        } => {
            if find.len() != replace.len() {
                return Err(CoreError::invalid_data(format!(
                    "find_replace '{description}': find and replace lengths differ"
                )));
            }
            if find.is_empty() {
                return Err(CoreError::invalid_data(format!(
                    "find_replace '{description}': empty find pattern"
                )));
            }
            let matches: Vec<usize> = find_all(image, find);
            match matches.len() {
                0 => Err(CoreError::invalid_data(format!(
                    "find_replace '{description}': pattern not found"
                ))),
                1 => Ok(Some(matches[0])),
                n => Err(CoreError::invalid_data(format!(
                    "find_replace '{description}': pattern found {n} times, expected exactly 1"
                ))),
            }
        }
    }
}

fn apply_one(image: &mut [u8], patch: &Patch, found_offset: Option<usize>) -> Result<()> {
    match patch {
        Patch::String { address, data, .. } => {
            write_at(image, *address, data.as_bytes())
        }
        Patch::U8 { address, data, .. } => write_at(image, *address, &[*data]),
        Patch::U16 { address, data, .. } => write_at(image, *address, &data.to_be_bytes()),
        Patch::U32 { address, data, .. } => write_at(image, *address, &data.to_be_bytes()),
        Patch::Bytes { address, data, .. } => write_at(image, *address, data),
        Patch::FindReplace { replace, .. } => {
            let offset = found_offset.expect("find_replace must have a recorded offset after verify");
            image[offset..offset + replace.len()].copy_from_slice(replace);
            Ok(())
        }
    }
}

fn slice_at<'a>(image: &'a [u8], address: u32, len: usize, description: &str) -> Result<&'a [u8]> {
    let start = address as usize;
    let end = start + len;
    image.get(start..end).ok_or_else(|| {
        CoreError::invalid_data(format!(
            "patch '{description}': address range [{start:#x}, {end:#x}) is out of bounds"
        ))
    })
}

fn write_at(image: &mut [u8], address: u32, data: &[u8]) -> Result<()> {
    let start = address as usize;
    let end = start + data.len();
    if end > image.len() {
        return Err(CoreError::invalid_data(format!(
            "patch write range [{start:#x}, {end:#x}) is out of bounds"
        )));
    }
    image[start..end].copy_from_slice(data);
    Ok(())
}

fn mismatch(description: &str) -> CoreError {
    CoreError::invalid_data(format!(
        "patch '{description}': pre-patch invariant did not hold"
    ))
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    (0..=haystack.len() - needle.len())
        .filter(|&i| &haystack[i..i + needle.len()] == needle)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::BootloaderSettings;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const FLASH_LEN: usize = 512 * 1024;

    fn image_with_settings(app_bytes: &[u8]) -> Vec<u8> {
        let mut image = vec![0xFFu8; FLASH_LEN];
        let app_start = addr::APP_BANK_BASE as usize;
        image[app_start..app_start + app_bytes.len()].copy_from_slice(app_bytes);

        let mut settings = BootloaderSettings {
            crc: 0,
            settings_version: 1,
            app_version: 1,
            bootloader_version: 1,
            bank_layout: 0,
            bank_current: 0,
            bank0: crate::records::BankInfo {
                image_size: app_bytes.len() as u32,
                image_crc: crc32(app_bytes),
                bank_code: 1,
            },
            bank1: crate::records::BankInfo {
                image_size: 0,
                image_crc: 0,
                bank_code: 0,
            },
            write_offset: 0,
            sd_size: 0,
            dfu_progress: 0,
            enter_buttonless_dfu: 0,
            reserved: [0u8; 28],
        };
        let encoded = settings.encode();
        settings.crc = crc32(&encoded[4..92]);
        let encoded = settings.encode();

        let base = addr::BL_SETTINGS_ADDR as usize;
        image[base..base + 92].copy_from_slice(&encoded);
        image
    }

    fn sample_app() -> Vec<u8> {
        let mut app = vec![0u8; 4096];
        app[0..8].copy_from_slice(b"versions");
        app[16..18].copy_from_slice(&0x2301u16.to_be_bytes());
        app
    }

    #[test]
    fn apply_patches_verifies_writes_and_recomputes_crcs() {
        let image = image_with_settings(&sample_app());
        let app_start = addr::APP_BANK_BASE as usize;

        let patch_file = PatchFile {
            name: "test".into(),
            firmware_path: "firmware.bin".into(),
            output_postfix: "_patched".into(),
            clean_regions: vec![],
            patches: vec![
                Patch::String {
                    address: (app_start) as u32,
                    original: "versions".into(),
                    data: "versionz".into(),
                    description: "rename versions field".into(),
                },
                Patch::U16 {
                    address: (app_start + 16) as u32,
                    original: 0x2301,
                    data: 0x2303,
                    description: "bump minor version".into(),
                },
            ],
        };

        let output = apply(&image, &patch_file).expect("patch application should succeed");

        assert_eq!(&output[app_start..app_start + 8], b"versionz");
        assert_eq!(&output[app_start + 16..app_start + 18], &[0x23, 0x03]);

        let settings = BootloaderSettings::decode_from_image(&output, addr::BL_SETTINGS_ADDR as usize).unwrap();
        assert!(settings.crc_is_valid());

        let app_region = &output[app_start..app_start + settings.bank0.image_size as usize];
        assert_eq!(settings.bank0.image_crc, crc32(app_region));
    }

    #[test]
    fn reverifying_a_changed_site_fails() {
        let image = image_with_settings(&sample_app());
        let app_start = addr::APP_BANK_BASE as usize;
        let patch = Patch::String {
            address: app_start as u32,
            original: "versions".into(),
            data: "versionz".into(),
            description: "rename".into(),
        };
        let patch_file = PatchFile {
            name: "t".into(),
            firmware_path: "f.bin".into(),
            output_postfix: "_p".into(),
            clean_regions: vec![],
            patches: vec![patch.clone()],
        };
        let output = apply(&image, &patch_file).unwrap();

        let err = verify_one(&output, &patch).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidData);
    }

    #[test_case(0, 1; "zero matches")]
    #[test_case(2, 1; "two matches")]
    fn find_replace_requires_exactly_one_match(occurrences: usize, _unused: u8) {
        let needle = b"UNIQUEKEY_______________________________________________________";
        let mut app = vec![0u8; 4096];
        for i in 0..occurrences {
            let at = 100 + i * 128;
            app[at..at + needle.len()].copy_from_slice(needle);
        }
        let image = image_with_settings(&app);

        let patch_file = PatchFile {
            name: "t".into(),
            firmware_path: "f.bin".into(),
            output_postfix: "_p".into(),
            clean_regions: vec![],
            patches: vec![Patch::FindReplace {
                find: needle.to_vec(),
                replace: vec![0u8; needle.len()],
                description: "replace key".into(),
            }],
        };

        let err = apply(&image, &patch_file).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidData);
    }

    #[test]
    fn find_replace_succeeds_with_exactly_one_match_and_reports_offset() {
        let needle = b"UNIQUEKEY_______________________________________________________";
        let mut app = vec![0u8; 4096];
        let at = 256usize;
        app[at..at + needle.len()].copy_from_slice(needle);
        let image = image_with_settings(&app);
        let app_start = addr::APP_BANK_BASE as usize;

        let patch_file = PatchFile {
            name: "t".into(),
            firmware_path: "f.bin".into(),
            output_postfix: "_p".into(),
            clean_regions: vec![],
            patches: vec![Patch::FindReplace {
                find: needle.to_vec(),
                replace: vec![0xAAu8; needle.len()],
                description: "replace key".into(),
            }],
        };

        let output = apply(&image, &patch_file).unwrap();
        assert_eq!(
            &output[app_start + at..app_start + at + needle.len()],
            vec![0xAAu8; needle.len()].as_slice()
        );
    }

    #[test]
    fn clean_region_resolves_app_end_symbol() {
        let app = sample_app();
        let image = image_with_settings(&app);
        let app_start = addr::APP_BANK_BASE;

        let patch_file = PatchFile {
            name: "t".into(),
            firmware_path: "f.bin".into(),
            output_postfix: "_p".into(),
            clean_regions: vec![CleanRegion {
                start: app_start,
                end: RegionEnd::AppEnd,
                description: "keep app region only".into(),
            }],
            patches: vec![],
        };

        let output = apply(&image, &patch_file).unwrap();
        // Everything outside [app_start, app_end) should read as erased.
        assert_eq!(output[0], 0xFF);
        assert_eq!(
            &output[app_start as usize..app_start as usize + app.len()],
            app.as_slice()
        );
    }
}
