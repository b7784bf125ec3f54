//! The DP/AP driver: the ADIv5 state machine on top of the CMSIS-DAP command
//! layer. Handles the SWJ switch, line reset, and power-up handshake on
//! connect, and pipelined AP reads via `RDBUFF` on every access.

use std::time::{Duration, Instant};

use crate::arm::{ap, dp};
use crate::error::{CoreError, Result};
use crate::probe::cmsisdap::{self, Ack};
use crate::probe::ProbeHandle;

/// The SWD link's connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

const DP_ACCESS_TIMEOUT: Duration = Duration::from_secs(1);
const POWER_UP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State of the SWD link: clock speed, last-selected AP+bank, current CSW
/// value, accumulated error flags, connection state.
pub struct DapSession {
    probe: ProbeHandle,
    state: LinkState,
    last_select: Option<u32>,
    current_csw: Option<u32>,
    error_flags: u32,
    speed_hz: u32,
}

impl DapSession {
    pub fn new(probe: ProbeHandle) -> Self {
        Self {
            probe,
            state: LinkState::Disconnected,
            last_select: None,
            current_csw: None,
            error_flags: 0,
            speed_hz: 4_000_000,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Negotiates the SWD link: SWJ switch, line reset, `IDCODE` read,
    /// power-up request, power-up confirmation.
    ///
    /// On success, the link is reported connected only once the target has
    /// answered `IDCODE` and the power-up handshake has completed.
    pub fn connect(&mut self) -> Result<u32> {
        self.state = LinkState::Connecting;
        self.last_select = None;
        self.current_csw = None;

        cmsisdap::set_clock(&mut self.probe, self.speed_hz).map_err(|e| self.fault(e))?;
        cmsisdap::connect_swd(&mut self.probe).map_err(|e| self.fault(e))?;

        // IDCODE is DP register 0x0 read.
        let idcode = self.read_dp(dp::addr::IDCODE_OR_ABORT).map_err(|e| self.fault(e))?;
        if idcode == 0 || idcode == 0xFFFF_FFFF {
            self.state = LinkState::Faulted;
            return Err(CoreError::target_not_connected(
                "target did not answer IDCODE (no pull-ups, target unpowered, or wiring fault)",
            ));
        }
        let designer = (idcode >> 1) & 0x7FF;
        let jep = jep106::JEP106Code::new((designer >> 7) as u8, (designer & 0x7F) as u8);
        tracing::info!(
            idcode = format!("{idcode:#010x}"),
            designer = jep.get(),
            "SWD line reset ok"
        );

        self.write_dp(dp::addr::CTRL_STAT, dp::power_up_request())
            .map_err(|e| self.fault(e))?;

        let deadline = Instant::now() + DP_ACCESS_TIMEOUT;
        loop {
            let ctrl = dp::CtrlStat::from(self.read_dp(dp::addr::CTRL_STAT).map_err(|e| self.fault(e))?);
            if ctrl.csyspwrupack() && ctrl.cdbgpwrupack() {
                break;
            }
            if Instant::now() >= deadline {
                self.state = LinkState::Faulted;
                return Err(CoreError::timeout("target did not confirm debug power-up"));
            }
            std::thread::sleep(POWER_UP_POLL_INTERVAL);
        }

        self.state = LinkState::Connected;
        tracing::info!("SWD link connected");
        Ok(idcode)
    }

    /// Tears down the link. Recoverable from `Faulted` by calling `connect`
    /// again.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state != LinkState::Disconnected {
            let _ = cmsisdap::disconnect(&mut self.probe);
        }
        self.state = LinkState::Disconnected;
        self.last_select = None;
        self.current_csw = None;
        Ok(())
    }

    fn fault(&mut self, e: CoreError) -> CoreError {
        self.state = LinkState::Faulted;
        e
    }

    pub fn read_dp(&mut self, addr: u8) -> Result<u32> {
        let (ack, value) = cmsisdap::transfer_register(&mut self.probe, false, true, addr, 0)?;
        self.handle_ack(ack)?;
        Ok(value)
    }

    pub fn write_dp(&mut self, addr: u8, value: u32) -> Result<()> {
        let (ack, _) = cmsisdap::transfer_register(&mut self.probe, false, false, addr, value)?;
        self.handle_ack(ack)
    }

    /// Selects `apsel`/`apbanksel` via `DP.SELECT`, skipping the write if it
    /// already holds that value.
    fn select_ap(&mut self, apsel: u8, apbanksel: u8) -> Result<()> {
        let select = dp::select_value(apsel, apbanksel);
        if self.last_select == Some(select) {
            return Ok(());
        }
        self.write_dp(dp::addr::SELECT, select)?;
        self.last_select = Some(select);
        Ok(())
    }

    /// Reads an AP register. Because AP accesses are pipelined, the raw
    /// `DAP_Transfer` response is the *previous* transaction's data; a
    /// trailing `DP.RDBUFF` read realizes the value just requested.
    pub fn read_ap(&mut self, apsel: u8, addr: u8) -> Result<u32> {
        self.select_ap(apsel, (addr >> 4) & 0xF)?;
        let (ack, _) = cmsisdap::transfer_register(&mut self.probe, true, true, addr, 0)?;
        self.handle_ack(ack)?;
        self.read_dp(dp::addr::RDBUFF)
    }

    pub fn write_ap(&mut self, apsel: u8, addr: u8, value: u32) -> Result<()> {
        self.select_ap(apsel, (addr >> 4) & 0xF)?;
        let (ack, _) = cmsisdap::transfer_register(&mut self.probe, true, false, addr, value)?;
        self.handle_ack(ack)
    }

    /// Writes the MEM-AP `CSW`, skipping the write if unchanged — layered on
    /// top of the SELECT cache for the same reason.
    pub fn write_csw_if_changed(&mut self, csw: u32) -> Result<()> {
        if self.current_csw == Some(csw) {
            return Ok(());
        }
        self.write_ap(ap::MEM_AP_SEL, ap::mem_ap::CSW, csw)?;
        self.current_csw = Some(csw);
        Ok(())
    }

    /// Reads and performs a block AP transfer through the CMSIS-DAP
    /// `DAP_TransferBlock` command, used for every throughput-sensitive
    /// path instead of per-word `DAP_Transfer` calls.
    pub fn transfer_block(&mut self, apsel: u8, addr: u8, read: bool, words: &mut [u32]) -> Result<()> {
        self.select_ap(apsel, (addr >> 4) & 0xF)?;
        let ack = cmsisdap::transfer_block(&mut self.probe, read, addr, words)?;
        self.handle_ack(ack)
    }

    /// Issues `CTRL/STAT = 0x0000001E` to clear sticky-error bits. Never
    /// fails the caller's operation; logged at `warn` on failure.
    pub fn clear_errors(&mut self) {
        self.error_flags = 0;
        if let Err(e) = self.write_dp(dp::addr::CTRL_STAT, dp::CLEAR_STICKY_ERRORS) {
            tracing::warn!(error = %e, "failed to clear DP sticky errors");
        }
    }

    fn handle_ack(&mut self, ack: Ack) -> Result<()> {
        match ack {
            Ack::Ok => Ok(()),
            Ack::Wait => {
                self.error_flags |= 1;
                self.clear_errors();
                Err(CoreError::target_not_connected(
                    "target responded WAIT to SWD access",
                ))
            }
            Ack::Fault => {
                self.error_flags |= 2;
                self.clear_errors();
                Err(CoreError::transfer_failed("target responded FAULT to SWD access"))
            }
            Ack::NoAck => {
                self.state = LinkState::Faulted;
                Err(CoreError::target_not_connected("no ACK from target"))
            }
        }
    }
}
