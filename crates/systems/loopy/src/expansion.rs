//! Cartridge expansion window at 0x040A0000. No supported cartridge puts
//! hardware here, so accesses are only logged.

use emu_core::logging::{log, LogCategory, LogLevel};

pub const EXP_START: u32 = 0x040A_0000;
pub const EXP_END: u32 = 0x040B_0000;

pub fn read(addr: u32, size: u32) -> u32 {
    log(LogCategory::Stubs, LogLevel::Warn, || {
        format!("Expansion: unmapped read{} {:08X}", size * 8, addr)
    });
    0
}

pub fn write(addr: u32, size: u32, value: u32) {
    log(LogCategory::Stubs, LogLevel::Warn, || {
        format!(
            "Expansion: unmapped write{} {:08X}: {:0width$X}",
            size * 8,
            addr,
            value,
            width = size as usize * 2
        )
    });
}
