//! The USB-facing half of the probe driver: device enumeration and the
//! single request/response primitive every CMSIS-DAP command is built on.

use std::time::{Duration, Instant};

use hidapi::{HidApi, HidDevice};

use crate::error::{CoreError, Result};

/// Reference VID/PID of the debug probe this tool targets.
pub const DEFAULT_VID: u16 = 0x303A;
pub const DEFAULT_PID: u16 = 0x1002;

const REPORT_SIZE: usize = 64;

/// Deadline for a single DP/AP register access (`DAP_Transfer`).
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(1);
/// Deadline for a block read/write (`DAP_TransferBlock`): larger payloads
/// need more than a single register access's budget to clear the wire.
pub const BLOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// An opened USB endpoint pair to a CMSIS-DAP device.
///
/// Owns the `hidapi::HidDevice` exclusively; dropping it releases the
/// interface on every exit path, including panics unwound through `Drop`.
pub struct ProbeHandle {
    device: HidDevice,
    packet_size: usize,
}

impl ProbeHandle {
    /// Opens the first device matching `vid`/`pid` on the bus.
    pub fn open(vid: u16, pid: u16) -> Result<Self> {
        let api = HidApi::new()
            .map_err(|e| CoreError::with_cause(crate::error::ErrorCode::Unknown, "failed to initialize USB HID backend", HidErr(e)))?;

        let device = api.open(vid, pid).map_err(|e| {
            CoreError::with_cause(
                crate::error::ErrorCode::DeviceNotFound,
                format!("no CMSIS-DAP probe found for {vid:04x}:{pid:04x}"),
                HidErr(e),
            )
        })?;

        tracing::info!(vid, pid, "opened CMSIS-DAP probe");

        Ok(Self {
            device,
            packet_size: REPORT_SIZE,
        })
    }

    /// Opens the reference debug-probe identity.
    pub fn open_default() -> Result<Self> {
        Self::open(DEFAULT_VID, DEFAULT_PID)
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Sends `out_packet` and returns the matching response, or
    /// `TRANSFER_FAILED`/`TIMEOUT` if the probe doesn't answer within
    /// `timeout`.
    ///
    /// Exactly one request may be outstanding; the caller (the CMSIS-DAP
    /// command layer) serializes all access through `&mut self`. Use
    /// [`REGISTER_TIMEOUT`] for single DP/AP register accesses and
    /// [`BLOCK_TIMEOUT`] for `DAP_TransferBlock`.
    pub fn transfer(&mut self, out_packet: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let mut padded = vec![0u8; self.packet_size];
        let n = out_packet.len().min(self.packet_size);
        padded[..n].copy_from_slice(&out_packet[..n]);

        tracing::debug!(bytes = out_packet.len(), "probe transfer: write");
        let written = self
            .device
            .write(&padded)
            .map_err(|e| CoreError::with_cause(crate::error::ErrorCode::TransferFailed, "USB write failed", HidErr(e)))?;
        if written != padded.len() {
            return Err(CoreError::transfer_failed(format!(
                "short write: wrote {written} of {} bytes",
                padded.len()
            )));
        }

        let mut response = vec![0u8; self.packet_size];
        let deadline = Instant::now() + timeout;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let read = self
            .device
            .read_timeout(&mut response, remaining.as_millis() as i32)
            .map_err(|e| CoreError::with_cause(crate::error::ErrorCode::TransferFailed, "USB read failed", HidErr(e)))?;

        if read == 0 {
            return Err(CoreError::timeout("no response from probe within deadline"));
        }

        tracing::debug!(bytes = read, "probe transfer: read");
        response.truncate(read);
        Ok(response)
    }
}

/// Wraps `hidapi::HidError` so it satisfies `std::error::Error + Send + Sync`.
#[derive(Debug)]
struct HidErr(hidapi::HidError);

impl std::fmt::Display for HidErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HidErr {}
