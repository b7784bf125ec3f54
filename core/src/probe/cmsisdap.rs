//! CMSIS-DAP command framing: command IDs, the SWD connect sequence, and
//! transfer request/ack encoding for the SWD-only subset this tool needs.

use scroll::{Pread, Pwrite, LE};

use crate::error::{CoreError, Result};
use crate::probe::transport::{ProbeHandle, BLOCK_TIMEOUT, REGISTER_TIMEOUT};

#[allow(dead_code)]
mod id {
    pub const CONNECT: u8 = 0x02;
    pub const DISCONNECT: u8 = 0x03;
    pub const TRANSFER_CONFIGURE: u8 = 0x04;
    pub const TRANSFER: u8 = 0x05;
    pub const TRANSFER_BLOCK: u8 = 0x06;
    pub const WRITE_ABORT: u8 = 0x08;
    pub const SWJ_CLOCK: u8 = 0x11;
    pub const SWJ_SEQUENCE: u8 = 0x12;
    pub const SWD_CONFIGURE: u8 = 0x13;
}

/// `DAP_Connect` mode byte.
const CONNECT_MODE_SWD: u8 = 0x01;

/// Transfer acknowledgement values (CMSIS-DAP `Transfer Response` low bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Wait,
    Fault,
    NoAck,
}

impl Ack {
    fn from_status(byte: u8) -> Self {
        match byte & 0x07 {
            0b001 => Ack::Ok,
            0b010 => Ack::Wait,
            0b100 => Ack::Fault,
            _ => Ack::NoAck,
        }
    }
}

/// Request-byte bit layout for `DAP_Transfer`.
fn request_byte(ap_not_dp: bool, read: bool, address: u8) -> u8 {
    let a2 = (address >> 2) & 0x1;
    let a3 = (address >> 3) & 0x1;
    (ap_not_dp as u8) | ((read as u8) << 1) | (a2 << 2) | (a3 << 3)
}

/// Sends the JTAG-to-SWD line-reset sequence followed by `DAP_Connect(SWD)`.
pub fn connect_swd(probe: &mut ProbeHandle) -> Result<()> {
    // DAP_SWJ_Sequence: 0x12, sequence-bit-count, raw bits.
    // The reference 56-cycle "JTAG-to-SWD" switch sequence, per ARM ADIv5.
    const SWD_SWITCH_SEQUENCE: [u8; 7] = [0xFF, 0xFF, 0x9E, 0xE7, 0xFF, 0xFF, 0x00];
    let mut packet = vec![id::SWJ_SEQUENCE, (SWD_SWITCH_SEQUENCE.len() * 8) as u8];
    packet.extend_from_slice(&SWD_SWITCH_SEQUENCE);
    let response = probe.transfer(&packet, REGISTER_TIMEOUT)?;
    check_ok(&response, id::SWJ_SEQUENCE)?;

    // DAP_Connect's second response byte is the negotiated port mode
    // (0 = failed, 1 = SWD, 2 = JTAG), not a generic command-status byte —
    // `check_ok` does not apply here.
    let response = probe.transfer(&[id::CONNECT, CONNECT_MODE_SWD], REGISTER_TIMEOUT)?;
    if response.first() != Some(&id::CONNECT) {
        return Err(CoreError::transfer_failed("unexpected response command id"));
    }
    if response.get(1) != Some(&CONNECT_MODE_SWD) {
        return Err(CoreError::connection_failed(
            "probe refused to connect in SWD mode",
        ));
    }
    Ok(())
}

pub fn disconnect(probe: &mut ProbeHandle) -> Result<()> {
    let response = probe.transfer(&[id::DISCONNECT], REGISTER_TIMEOUT)?;
    check_ok(&response, id::DISCONNECT)
}

/// Sets the SWD clock, in Hz.
pub fn set_clock(probe: &mut ProbeHandle, hz: u32) -> Result<()> {
    let mut packet = vec![0u8; 5];
    packet[0] = id::SWJ_CLOCK;
    packet
        .pwrite_with(hz, 1, LE)
        .expect("5-byte buffer fits a u32 at offset 1");
    let response = probe.transfer(&packet, REGISTER_TIMEOUT)?;
    check_ok(&response, id::SWJ_CLOCK)
}

/// Performs one `DAP_Transfer` register access. `address` must be one of
/// `{0x0, 0x4, 0x8, 0xC}` (the two-bit register select within the DP/AP
/// bank).
pub fn transfer_register(
    probe: &mut ProbeHandle,
    ap_not_dp: bool,
    read: bool,
    address: u8,
    write_value: u32,
) -> Result<(Ack, u32)> {
    let mut packet = vec![id::TRANSFER, 0x00, 0x01, request_byte(ap_not_dp, read, address)];
    if !read {
        let mut word = [0u8; 4];
        word.pwrite_with(write_value, 0, LE).expect("4-byte buffer fits a u32");
        packet.extend_from_slice(&word);
    }

    let response = probe.transfer(&packet, REGISTER_TIMEOUT)?;
    if response.first() != Some(&id::TRANSFER) {
        return Err(CoreError::transfer_failed("unexpected response command id"));
    }
    let count = *response.get(1).unwrap_or(&0);
    let status = *response.get(2).unwrap_or(&0);
    let ack = Ack::from_status(status);
    if count != 1 {
        return Err(CoreError::transfer_failed(format!(
            "transfer count mismatch: expected 1, probe reported {count}"
        )));
    }

    let value = if read && ack == Ack::Ok {
        response.pread_with::<u32>(3, LE).map_err(|_| {
            CoreError::transfer_failed("short transfer response, expected 4 data bytes")
        })?
    } else {
        0
    };

    Ok((ack, value))
}

/// Performs one `DAP_TransferBlock` of `len(words)` 32-bit AP accesses at a
/// fixed register address, auto-incrementing TAR on the target side.
/// `address` is the AP register select (almost always DRW, `0xC`).
pub fn transfer_block(
    probe: &mut ProbeHandle,
    read: bool,
    address: u8,
    words: &mut [u32],
) -> Result<Ack> {
    let mut packet = vec![0u8; 4];
    packet[0] = id::TRANSFER_BLOCK;
    packet
        .pwrite_with(words.len() as u16, 2, LE)
        .expect("4-byte header fits a u16 at offset 2");
    packet.push(request_byte(true, read, address));
    if !read {
        for w in words.iter() {
            let mut word = [0u8; 4];
            word.pwrite_with(*w, 0, LE).expect("4-byte buffer fits a u32");
            packet.extend_from_slice(&word);
        }
    }

    let response = probe.transfer(&packet, BLOCK_TIMEOUT)?;
    if response.first() != Some(&id::TRANSFER_BLOCK) {
        return Err(CoreError::transfer_failed("unexpected response command id"));
    }
    let count: u16 = response.pread_with(1, LE).unwrap_or(0);
    let status = *response.get(3).unwrap_or(&0);
    let ack = Ack::from_status(status);

    if count as usize != words.len() {
        return Err(CoreError::transfer_failed(format!(
            "block transfer count mismatch: expected {}, probe reported {count}",
            words.len()
        )));
    }

    if read && ack == Ack::Ok {
        for (i, word) in words.iter_mut().enumerate() {
            *word = response
                .pread_with(4 + i * 4, LE)
                .map_err(|_| CoreError::transfer_failed("short block transfer response"))?;
        }
    }

    Ok(ack)
}

fn check_ok(response: &[u8], expected_id: u8) -> Result<()> {
    match response.first() {
        Some(id) if *id == expected_id => match response.get(1) {
            Some(0) | None => Ok(()),
            Some(status) => Err(CoreError::transfer_failed(format!(
                "probe reported command-status failure: {status:#x}"
            ))),
        },
        _ => Err(CoreError::transfer_failed("unexpected response command id")),
    }
}
