#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use ethsim_config::SimConfig;
use ethsim_machine::{RunExit, Simulator};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Run simulated Ethernet MACs described by a configuration file")]
struct Args {
    /// Configuration file with one `section ethernet` block per MAC.
    #[arg(long)]
    config: PathBuf,

    /// RAM size in KiB, mapped at physical address 0.
    #[arg(long, default_value_t = 1024)]
    ram: usize,

    /// Stop after at most N ticks.
    #[arg(long, default_value_t = 1_000_000)]
    ticks: u64,

    /// Copy a file into RAM before running (`ADDR=PATH`, repeatable).
    #[arg(long = "load", value_name = "ADDR=PATH", value_parser = parse_load)]
    loads: Vec<(u64, PathBuf)>,

    /// Store a 32-bit word through the bus before running (`ADDR=VALUE`, repeatable).
    ///
    /// Writes are applied in order after every `--load`, so they can program descriptors and
    /// then enable the MAC.
    #[arg(long = "write", value_name = "ADDR=VALUE", value_parser = parse_write)]
    writes: Vec<(u64, u32)>,

    /// Print every MAC's registers and engine state after the run.
    #[arg(long)]
    status: bool,

    /// Print the status report as JSON.
    #[arg(long, requires = "status")]
    json: bool,
}

fn parse_number(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid number {text:?}: {err}"))
}

fn split_assignment(arg: &str) -> Result<(&str, &str), String> {
    arg.split_once('=')
        .ok_or_else(|| format!("expected ADDR=..., got {arg:?}"))
}

fn parse_write(arg: &str) -> Result<(u64, u32), String> {
    let (addr, value) = split_assignment(arg)?;
    let addr = parse_number(addr)?;
    let value = parse_number(value)?;
    let value = u32::try_from(value).map_err(|_| format!("value 0x{value:x} exceeds 32 bits"))?;
    Ok((addr, value))
}

fn parse_load(arg: &str) -> Result<(u64, PathBuf), String> {
    let (addr, path) = split_assignment(arg)?;
    if path.is_empty() {
        return Err("missing file path".to_string());
    }
    Ok((parse_number(addr)?, PathBuf::from(path)))
}

fn load_image(sim: &mut Simulator, addr: u64, path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let range = usize::try_from(addr)
        .ok()
        .and_then(|start| Some(start..start.checked_add(bytes.len())?));
    let ram = sim.bus_mut().ram_mut();
    let Some(dst) = (match range {
        Some(range) => ram.get_mut(range),
        None => None,
    }) else {
        bail!(
            "{} ({} bytes) does not fit in RAM at 0x{addr:x}",
            path.display(),
            bytes.len()
        );
    };
    dst.copy_from_slice(&bytes);
    tracing::debug!(addr, len = bytes.len(), path = %path.display(), "image loaded");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = SimConfig::load(&args.config)?;
    if config.ethernet.is_empty() {
        tracing::warn!(config = %args.config.display(), "no enabled ethernet sections");
    }

    let ram_bytes = args.ram.checked_mul(1024).context("RAM size overflow")?;
    let mut sim = Simulator::from_config(ram_bytes, &config)?;

    for (addr, path) in &args.loads {
        load_image(&mut sim, *addr, path)?;
    }
    for &(addr, value) in &args.writes {
        sim.write_u32(addr, value);
    }

    let exit = sim.run(args.ticks);
    match exit {
        RunExit::Completed { ticks } => tracing::info!(ticks, "tick limit reached"),
        RunExit::Idle { ticks } => tracing::info!(ticks, "no engine enabled"),
        RunExit::InputExhausted { device, ticks } => {
            tracing::info!(device, ticks, "receive input exhausted")
        }
    }

    if args.status {
        let status = sim.status();
        if args.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            for mac in &status {
                println!("{mac}");
            }
        }
    }

    Ok(())
}
