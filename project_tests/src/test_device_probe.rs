//! # Device Probe Live Test
//!
//! Connects to a running QUsb2Snes server through lib_autosplit, attaches to a
//! device and reads a slice of WRAM, printing every step.

use clap::Parser;
use lib_autosplit::driver::{ConnectionStateMachine, ProtocolState};
use lib_autosplit::protocol::{Usb2SnesClient, DEFAULT_URL};
use lib_autosplit::splits::MemoryReader;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Server URL
    #[clap(long, default_value = DEFAULT_URL)]
    url: String,

    /// Device to attach to (last listed when empty)
    #[clap(long, default_value = "")]
    device: String,

    /// WRAM offset to read, hexadecimal
    #[clap(long, default_value = "0")]
    offset: String,

    /// Bytes to read
    #[clap(long, default_value_t = 16)]
    size: u32,
}

/// Executes the probe.
///
/// // Statement: Exits non-zero when any step fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let offset = u32::from_str_radix(args.offset.trim_start_matches("0x"), 16)?;

    let client = Arc::new(Usb2SnesClient::new(args.url.clone()));
    let machine = ConnectionStateMachine::new(client.clone(), "lib_autosplit probe");

    println!("[*] Connecting to {} ...", args.url);
    if !client.connect().await {
        anyhow::bail!("server not reachable");
    }

    // // Statement: Show what the server offers before attaching
    let devices = client.device_list().await?;
    println!("[INFO] Devices: {:?}", devices);

    if !machine.connect(&args.device).await || machine.state() != ProtocolState::Attached {
        anyhow::bail!("could not attach (state {:?})", machine.state());
    }
    if let Some(info) = machine.last_info() {
        println!("[INFO] Firmware: {}", info.version);
        println!("[INFO] Running:  {}", info.rom_playing);
        println!("[INFO] Flags:    {:?}", info.flags);
    }

    println!("[*] Reading {} bytes at WRAM ${:05X} ...", args.size, offset);
    let started = std::time::Instant::now();
    let data = client.read_wram(offset, args.size).await?;
    println!("\n[SUCCESS] {} bytes in {:?}", data.len(), started.elapsed());
    println!("-----------------------------------------------");
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
        println!("{:05X}: {}", offset as usize + row * 16, hex.join(" "));
    }
    println!("-----------------------------------------------");

    machine.disconnect().await;
    Ok(())
}
