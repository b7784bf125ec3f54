use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use nrf52_recovery_core::kitchen::{self, PatchFile};

#[derive(Parser)]
#[command(name = "nrf52-kitchen", about = "Apply patch files to nRF52832 flash images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a patch file to its referenced firmware image.
    Patch { patch_file: PathBuf },
    /// Reserved: DFU signing-key generation is an external collaborator, not
    /// part of this tool.
    Keygen { out_dir: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Patch { patch_file } => patch(&patch_file),
        Command::Keygen { out_dir } => {
            let _ = out_dir;
            anyhow::bail!(
                "keygen is not implemented here; DFU signing-key generation lives outside this tool"
            );
        }
    }
}

fn patch(patch_file_path: &Path) -> Result<()> {
    let text = fs::read_to_string(patch_file_path)
        .with_context(|| format!("reading {}", patch_file_path.display()))?;
    let patch_file: PatchFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", patch_file_path.display()))?;

    let project_root = patch_file_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let firmware_path = project_root.join(&patch_file.firmware_path);
    let image = fs::read(&firmware_path)
        .with_context(|| format!("reading {}", firmware_path.display()))?;

    let output = kitchen::apply(&image, &patch_file).context("applying patches")?;

    let stem = firmware_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("firmware");
    let output_dir = firmware_path.parent().unwrap_or_else(|| Path::new("."));
    let output_path = output_dir.join(format!("{stem}{}.bin", patch_file.output_postfix));

    fs::write(&output_path, &output).with_context(|| format!("writing {}", output_path.display()))?;
    println!("wrote {} ({} bytes)", output_path.display(), output.len());
    Ok(())
}
