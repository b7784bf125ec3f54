//! End-to-end kitchen scenarios against a synthetic 512 KiB image, mirroring
//! the seed cases of the patch-file acceptance criteria: verify-before-write,
//! CRC repair, and find-replace uniqueness.

use nrf52_recovery_core::kitchen::{self, CleanRegion, Patch, PatchFile, RegionEnd};
use nrf52_recovery_core::records::{BankInfo, BootloaderSettings};

const FLASH_LEN: usize = 512 * 1024;
const APP_BASE: usize = 0x23000;
const BL_SETTINGS_BASE: usize = 0x7F000;

fn build_image(app: &[u8]) -> Vec<u8> {
    let mut image = vec![0xFFu8; FLASH_LEN];
    image[APP_BASE..APP_BASE + app.len()].copy_from_slice(app);

    let mut settings = BootloaderSettings {
        crc: 0,
        settings_version: 1,
        app_version: 6,
        bootloader_version: 2,
        bank_layout: 0,
        bank_current: 0,
        bank0: BankInfo {
            image_size: app.len() as u32,
            image_crc: nrf52_recovery_core::kitchen::crc::crc32(app),
            bank_code: 1,
        },
        bank1: BankInfo {
            image_size: 0,
            image_crc: 0,
            bank_code: 0,
        },
        write_offset: 0,
        sd_size: 0x1f000,
        dfu_progress: 0,
        enter_buttonless_dfu: 0,
        reserved: [0u8; 28],
    };
    settings.crc = nrf52_recovery_core::kitchen::crc::crc32(&settings.encode()[4..92]);
    image[BL_SETTINGS_BASE..BL_SETTINGS_BASE + 92].copy_from_slice(&settings.encode());
    image
}

fn app_image() -> Vec<u8> {
    // Large enough to hold both patch sites at offsets analogous to the
    // seed scenario (0x3AF00 and 0x3050C are absolute; translate to
    // app-relative offsets for this synthetic image).
    let mut app = vec![0u8; 0x40000];
    app[0..8].copy_from_slice(b"versions");
    let version_field_offset = 0x2050C;
    app[version_field_offset..version_field_offset + 2].copy_from_slice(&0x2301u16.to_be_bytes());
    app
}

#[test]
fn two_patch_set_verifies_applies_and_repairs_both_crcs() {
    let app = app_image();
    let image = build_image(&app);

    let patch_file = PatchFile {
        name: "nrf-6-221122-0".into(),
        firmware_path: "firmware.bin".into(),
        output_postfix: "-patched".into(),
        clean_regions: vec![],
        patches: vec![
            Patch::String {
                address: APP_BASE as u32,
                original: "versions".into(),
                data: "versionz".into(),
                description: "rename build marker".into(),
            },
            Patch::U16 {
                address: (APP_BASE + 0x2050C) as u32,
                original: 0x2301,
                data: 0x2303,
                description: "bump minor version".into(),
            },
        ],
    };

    let output = kitchen::apply(&image, &patch_file).expect("verified patch set must apply");

    assert_eq!(&output[APP_BASE..APP_BASE + 8], b"versionz");
    let version_addr = APP_BASE + 0x2050C;
    assert_eq!(&output[version_addr..version_addr + 2], &[0x23, 0x03]);

    let app_size = app.len();
    let recomputed_app_crc = nrf52_recovery_core::kitchen::crc::crc32(&output[APP_BASE..APP_BASE + app_size]);
    let stored_app_crc = u32::from_le_bytes(
        output[BL_SETTINGS_BASE + 0x1C..BL_SETTINGS_BASE + 0x20]
            .try_into()
            .unwrap(),
    );
    assert_eq!(stored_app_crc, recomputed_app_crc);

    let recomputed_settings_crc =
        nrf52_recovery_core::kitchen::crc::crc32(&output[BL_SETTINGS_BASE + 4..BL_SETTINGS_BASE + 92]);
    let stored_settings_crc = u32::from_le_bytes(
        output[BL_SETTINGS_BASE..BL_SETTINGS_BASE + 4]
            .try_into()
            .unwrap(),
    );
    assert_eq!(stored_settings_crc, recomputed_settings_crc);

    let decoded = BootloaderSettings::decode_from_image(&output, BL_SETTINGS_BASE).unwrap();
    assert!(decoded.crc_is_valid());
}

#[test]
fn reapplying_the_same_patches_to_the_output_fails_verification() {
    let app = app_image();
    let image = build_image(&app);

    let patch_file = PatchFile {
        name: "nrf-6-221122-0".into(),
        firmware_path: "firmware.bin".into(),
        output_postfix: "-patched".into(),
        clean_regions: vec![],
        patches: vec![Patch::String {
            address: APP_BASE as u32,
            original: "versions".into(),
            data: "versionz".into(),
            description: "rename build marker".into(),
        }],
    };

    let output = kitchen::apply(&image, &patch_file).unwrap();
    // Re-running the identical patch set against its own output must fail:
    // the site no longer holds `original`.
    let err = kitchen::apply(&output, &patch_file).unwrap_err();
    assert_eq!(err.code(), nrf52_recovery_core::error::ErrorCode::InvalidData);
}

#[test]
fn degenerate_patch_where_original_equals_data_is_idempotent() {
    let app = app_image();
    let image = build_image(&app);

    let patch_file = PatchFile {
        name: "noop".into(),
        firmware_path: "firmware.bin".into(),
        output_postfix: "-noop".into(),
        clean_regions: vec![],
        patches: vec![Patch::String {
            address: APP_BASE as u32,
            original: "versions".into(),
            data: "versions".into(),
            description: "no-op rename".into(),
        }],
    };

    let once = kitchen::apply(&image, &patch_file).unwrap();
    let twice = kitchen::apply(&once, &patch_file).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn duplicate_find_replace_needle_fails_invalid_data() {
    let mut app = app_image();
    let key = b"THE_QUICK_BROWN_FOX_JUMPS_OVER_THE_LAZY_DOG_0123456789ABCDEF____";
    assert_eq!(key.len(), 64);
    app[0x1000..0x1000 + key.len()].copy_from_slice(key);
    app[0x2000..0x2000 + key.len()].copy_from_slice(key);
    let image = build_image(&app);

    let patch_file = PatchFile {
        name: "dup-key".into(),
        firmware_path: "firmware.bin".into(),
        output_postfix: "-patched".into(),
        clean_regions: vec![],
        patches: vec![Patch::FindReplace {
            find: key.to_vec(),
            replace: vec![0u8; key.len()],
            description: "replace DFU public key".into(),
        }],
    };

    let err = kitchen::apply(&image, &patch_file).unwrap_err();
    assert_eq!(err.code(), nrf52_recovery_core::error::ErrorCode::InvalidData);
}

#[test]
fn clean_region_with_app_end_erases_everything_outside_the_app() {
    let app = app_image();
    let image = build_image(&app);

    let patch_file = PatchFile {
        name: "clean".into(),
        firmware_path: "firmware.bin".into(),
        output_postfix: "-clean".into(),
        clean_regions: vec![CleanRegion {
            start: APP_BASE as u32,
            end: RegionEnd::AppEnd,
            description: "app region only".into(),
        }],
        patches: vec![],
    };

    let output = kitchen::apply(&image, &patch_file).unwrap();
    assert_eq!(output[0], 0xFF);
    assert_eq!(output[APP_BASE - 1], 0xFF);
    assert_eq!(&output[APP_BASE..APP_BASE + app.len()], app.as_slice());
}
