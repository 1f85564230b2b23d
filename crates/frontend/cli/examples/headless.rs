use std::env;

use emu_core::System;
use emu_loopy::LoopySystem;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let (Some(bios), Some(rom)) = (args.get(1), args.get(2)) else {
        anyhow::bail!("usage: headless <bios.bin> <rom.bin>");
    };

    let mut sys = LoopySystem::default();
    sys.mount("BIOS", &std::fs::read(bios)?)?;
    sys.mount("Cartridge", &std::fs::read(rom)?)?;
    let frame = sys.step_frame()?;
    println!("Headless Loopy frame: {}x{}", frame.width, frame.height);
    println!("Save-state: {}", serde_json::to_string_pretty(&sys.save_state())?);
    Ok(())
}
