use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use nrf52_recovery_core::arm::DapSession;
use nrf52_recovery_core::nrf52::NvmController;
use nrf52_recovery_core::ops::{self, ProgressSink, RestoreOptions};
use nrf52_recovery_core::probe::ProbeHandle;
use nrf52_recovery_core::records::{DeviceInfo, UicrRegisters};
use nrf52_recovery_core::CoreError;

#[derive(Parser)]
#[command(name = "nrf52-recovery", about = "Backup, erase, and restore an nRF52832 target")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, print device info, UICR, and bootloader settings, disconnect.
    ReadInfo,
    /// Back up flash and UICR into `<dir>/flash.bin` and `<dir>/uicr.bin`.
    Backup { dir: PathBuf },
    /// Perform a CTRL-AP ERASEALL.
    Erase,
    /// Restore flash and UICR from files.
    Restore {
        flash: PathBuf,
        uicr: PathBuf,
        #[arg(long)]
        no_verify: bool,
    },
    /// Reserved for experiments.
    Dev,
}

struct LoggingProgress;

impl ProgressSink for LoggingProgress {
    fn report(&mut self, percent: u8, message: Option<&str>) {
        match message {
            Some(m) => tracing::info!(percent, "{m}"),
            None => tracing::info!(percent, "progress"),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(core_err) = e.downcast_ref::<CoreError>() {
        if core_err.recoverable() {
            return 2;
        }
    }
    1
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::ReadInfo => read_info(),
        Command::Backup { dir } => backup(&dir),
        Command::Erase => erase(),
        Command::Restore {
            flash,
            uicr,
            no_verify,
        } => restore(&flash, &uicr, !no_verify),
        Command::Dev => {
            tracing::info!("dev command: nothing wired up yet");
            Ok(())
        }
    }
}

fn connect() -> Result<DapSession> {
    let probe = ProbeHandle::open_default().context("opening CMSIS-DAP probe")?;
    let mut session = DapSession::new(probe);
    session.connect().context("connecting to target over SWD")?;
    Ok(session)
}

fn read_info() -> Result<()> {
    let mut session = connect()?;
    let nvm = NvmController::new();

    let raw_info = nvm.read_device_info(&mut session).context("reading device info")?;
    let info: DeviceInfo = raw_info.into();
    println!("{info:#?}");

    let raw_uicr = nvm.read_uicr(&mut session).context("reading UICR")?;
    let uicr: UicrRegisters = raw_uicr.into();
    println!("approtect: {}", uicr.approtect_display());
    println!("pselreset0: {}", UicrRegisters::pselreset_display(uicr.pselreset0));
    println!("pselreset1: {}", UicrRegisters::pselreset_display(uicr.pselreset1));
    println!("nfcpins: {}", uicr.nfcpins_display());
    println!("nrffw0: {}", uicr.nrffw0_display());

    match nvm.read_bootloader_settings(&mut session).context("reading bootloader settings")? {
        Some(words) => {
            let settings = nrf52_recovery_core::records::BootloaderSettings::decode(&words);
            println!("{settings:#?}");
            println!("crc valid: {}", settings.crc_is_valid());
        }
        None => println!("bootloader settings: absent (page reads as erased)"),
    }

    session.disconnect().ok();
    Ok(())
}

fn backup(dir: &PathBuf) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut session = connect()?;
    let nvm = NvmController::new();
    let mut progress = LoggingProgress;

    let result = ops::backup(&mut session, &nvm, &mut progress).context("backing up target")?;
    session.disconnect().ok();

    fs::write(dir.join("flash.bin"), &result.flash).context("writing flash.bin")?;
    fs::write(dir.join("uicr.bin"), &result.uicr).context("writing uicr.bin")?;
    println!(
        "backed up {} bytes of flash and {} bytes of UICR to {}",
        result.flash.len(),
        result.uicr.len(),
        dir.display()
    );
    Ok(())
}

fn erase() -> Result<()> {
    let mut session = connect()?;
    let nvm = NvmController::new();
    let mut progress = LoggingProgress;

    ops::erase(&mut session, &nvm, &mut progress).context("erasing target")?;
    session.disconnect().ok();
    println!("erase complete");
    Ok(())
}

fn restore(flash_path: &PathBuf, uicr_path: &PathBuf, verify: bool) -> Result<()> {
    let flash = fs::read(flash_path).with_context(|| format!("reading {}", flash_path.display()))?;
    let uicr = fs::read(uicr_path).with_context(|| format!("reading {}", uicr_path.display()))?;

    let mut session = connect()?;
    let nvm = NvmController::new();
    let mut progress = LoggingProgress;

    ops::restore(
        &mut session,
        &nvm,
        &flash,
        &uicr,
        RestoreOptions { verify },
        &mut progress,
    )
    .context("restoring target")?;
    session.disconnect().ok();
    println!("restore complete");
    Ok(())
}
