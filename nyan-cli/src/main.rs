mod compress;
mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;

/// STM32 CDC ACM identifiers the keyboard enumerates with.
const NYAN_VID: u16 = 0x0483;
const NYAN_PID: u16 = 0x5740;

#[derive(Parser)]
#[command(name = "nyan-cli")]
#[command(about = "Nyan Keys bitstream and console tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a raw iCE40 bitstream into the upload container
    Compress {
        /// Path to the raw bitstream (.bin)
        bitstream: String,
        /// Output path for the compressed container
        output: String,
    },
    /// Upload a bitstream to the keyboard over its console port
    Upload {
        /// Path to the bitstream; raw images are compressed on the fly
        bitstream: String,
        /// Console device node (e.g. /dev/ttyACM0)
        port: String,
    },
    /// Set the board owner record
    SetOwner {
        /// Console device node
        port: String,
        /// Owner name (spaces allowed)
        name: Vec<String>,
    },
    /// Print the board info screen
    Info {
        /// Console device node
        port: String,
    },
    /// Detect whether a Nyan Keys board is connected
    Detect,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Compress { bitstream, output } => {
            let raw = fs::read(&bitstream).with_context(|| format!("reading {}", bitstream))?;
            let compressed = compress::compress(&raw)?;
            println!(
                "Compressed {} bytes to {} ({}%)",
                raw.len(),
                compressed.len(),
                compressed.len() * 100 / raw.len().max(1)
            );
            fs::write(&output, &compressed).with_context(|| format!("writing {}", output))?;
        }
        Command::Upload { bitstream, port } => {
            let contents = fs::read(&bitstream).with_context(|| format!("reading {}", bitstream))?;
            let compressed = if compress::is_compressed(&contents) {
                contents
            } else {
                println!("Raw bitstream, compressing before upload");
                compress::compress(&contents)?
            };
            println!("Uploading {} compressed bytes", compressed.len());
            let mut console = console::Console::open(&port)?;
            console.upload_bitstream(&compressed)?;
            println!("Bitstream written. The keyboard reconfigures its FPGA now.");
        }
        Command::SetOwner { port, name } => {
            let mut console = console::Console::open(&port)?;
            let response = console.command(&format!("set-owner {}", name.join(" ")))?;
            print!("{}", response);
        }
        Command::Info { port } => {
            let mut console = console::Console::open(&port)?;
            let response = console.command("getinfo")?;
            print!("{}", response);
        }
        Command::Detect => {
            if detect()? {
                println!("Nyan Keys board detected.");
            } else {
                println!("No Nyan Keys board found.");
                println!("Check the USB cable and that the firmware is running.");
            }
        }
    }

    Ok(())
}

/// Scan the bus for the keyboard's CDC identity.
fn detect() -> Result<bool> {
    let devices = rusb::devices().context("failed to enumerate USB devices")?;
    for device in devices.iter() {
        let desc = device
            .device_descriptor()
            .context("failed to read device descriptor")?;
        if desc.vendor_id() == NYAN_VID && desc.product_id() == NYAN_PID {
            return Ok(true);
        }
    }
    Ok(false)
}
