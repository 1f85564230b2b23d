//! Loopy cartridge: ROM, battery-backed SRAM and header
//!
//! Header layout (big-endian words):
//! - 0x08: checksum, used as the cartridge id
//! - 0x10: SRAM start address
//! - 0x14: SRAM end address (inclusive)

use std::path::{Path, PathBuf};

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::wordops::load_be32;

use crate::LoopyError;

const HEADER_CHECKSUM: usize = 0x08;
const HEADER_SRAM_START: usize = 0x10;
const HEADER_SRAM_END: usize = 0x14;
const HEADER_SIZE: usize = 0x18;

/// Largest SRAM the 0x02000000 window can expose
const MAX_SRAM_SIZE: usize = 0x0100_0000;

/// ROM window 0x06000000..0x08000000
pub(crate) const MAX_ROM_SIZE: usize = 0x0200_0000;

/// Carts that ship with the mouse
const MOUSE_CARTS: [u32; 5] = [
    0xA534_1F72, // Chakrakun no Omajinai Paradise
    0xF294_F931, // Pasokon Collection
    0x6A41_0BB2, // Little Romance
    0x8373_E9DD, // Loopy Town no Oheya ga Hoshii!
    0x6E00_CE71, // Lupiton no Wonder Palette
];

/// Round a buffer up to the 4 KiB page size, filling with 0xFF.
pub(crate) fn pad_to_page(buf: &mut Vec<u8>) {
    let size = (buf.len() + 0xFFF) & !0xFFF;
    buf.resize(size, 0xFF);
}

pub struct Cartridge {
    pub(crate) rom: Vec<u8>,
    pub(crate) sram: Vec<u8>,
    checksum: u32,
    sram_path: Option<PathBuf>,
    commit_interval: u32,
    frames_since_commit: u32,
}

impl Cartridge {
    pub fn load(data: &[u8]) -> Result<Self, LoopyError> {
        if data.len() < HEADER_SIZE {
            return Err(LoopyError::InvalidRom(format!(
                "ROM too small for header ({} bytes)",
                data.len()
            )));
        }

        if data.len() > MAX_ROM_SIZE {
            return Err(LoopyError::InvalidRom(format!(
                "ROM larger than the 32 MiB cartridge window ({} bytes)",
                data.len()
            )));
        }

        let checksum = load_be32(data, HEADER_CHECKSUM);
        let start = load_be32(data, HEADER_SRAM_START);
        let end = load_be32(data, HEADER_SRAM_END);
        let sram_size = match end.checked_sub(start) {
            Some(span) if (span as usize) < MAX_SRAM_SIZE => span as usize + 1,
            _ => {
                log(LogCategory::Bus, LogLevel::Warn, || {
                    format!(
                        "Cart: bad SRAM range {:08X}..{:08X}, running without SRAM",
                        start, end
                    )
                });
                0
            }
        };

        let mut rom = data.to_vec();
        pad_to_page(&mut rom);
        let mut sram = vec![0xFF; sram_size];
        pad_to_page(&mut sram);

        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "Cart: checksum {:08X}, ROM {} KiB, SRAM {} bytes",
                checksum,
                rom.len() / 1024,
                sram_size
            )
        });

        Ok(Self {
            rom,
            sram,
            checksum,
            sram_path: None,
            commit_interval: 60,
            frames_since_commit: 0,
        })
    }

    /// Seed SRAM with saved contents. Extra bytes are ignored.
    pub fn load_sram(&mut self, data: &[u8]) {
        let len = data.len().min(self.sram.len());
        self.sram[..len].copy_from_slice(&data[..len]);
    }

    /// Persist SRAM to `path` every `interval` frames.
    pub fn set_sram_persistence(&mut self, path: Option<PathBuf>, interval: u32) {
        self.sram_path = path;
        self.commit_interval = interval.max(1);
        self.frames_since_commit = 0;
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn is_mouse_cart(&self) -> bool {
        MOUSE_CARTS.contains(&self.checksum)
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn sram(&self) -> &[u8] {
        &self.sram
    }

    /// Called once per frame. Returns true when SRAM was written out.
    pub fn sram_commit_check(&mut self) -> bool {
        self.frames_since_commit += 1;
        if self.frames_since_commit < self.commit_interval {
            return false;
        }
        self.frames_since_commit = 0;
        self.commit_sram()
    }

    /// Write SRAM out now. Failures are logged and otherwise ignored.
    pub fn commit_sram(&mut self) -> bool {
        let Some(path) = self.sram_path.as_deref() else {
            return false;
        };
        match write_sram(path, &self.sram) {
            Ok(()) => true,
            Err(err) => {
                log(LogCategory::Bus, LogLevel::Warn, || {
                    format!("Cart: failed to save SRAM to {}: {}", path.display(), err)
                });
                false
            }
        }
    }
}

fn write_sram(path: &Path, sram: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, sram)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal header: checksum, SRAM at 0x02000000..=0x02001FFF
    pub(crate) fn make_rom(checksum: u32, sram_end: u32) -> Vec<u8> {
        let mut rom = vec![0u8; 0x100];
        rom[0x08..0x0C].copy_from_slice(&checksum.to_be_bytes());
        rom[0x10..0x14].copy_from_slice(&0x0200_0000u32.to_be_bytes());
        rom[0x14..0x18].copy_from_slice(&sram_end.to_be_bytes());
        rom
    }

    #[test]
    fn test_rom_padding_and_header() {
        let cart = Cartridge::load(&make_rom(0x1234_5678, 0x0200_1FFF)).unwrap();
        assert_eq!(cart.rom().len(), 0x1000);
        assert_eq!(cart.rom()[0x100], 0xFF);
        assert_eq!(cart.checksum(), 0x1234_5678);
        assert_eq!(cart.sram().len(), 0x2000);
        assert!(cart.sram().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_odd_sram_size_is_padded() {
        let cart = Cartridge::load(&make_rom(0, 0x0200_00FF)).unwrap();
        assert_eq!(cart.sram().len(), 0x1000);
    }

    #[test]
    fn test_too_small_rom() {
        assert!(matches!(
            Cartridge::load(&[0; 8]),
            Err(LoopyError::InvalidRom(_))
        ));
    }

    #[test]
    fn test_oversized_rom() {
        let mut rom = make_rom(0, 0x0200_00FF);
        rom.resize(MAX_ROM_SIZE, 0);
        assert!(Cartridge::load(&rom).is_ok());
        rom.push(0);
        assert!(matches!(
            Cartridge::load(&rom),
            Err(LoopyError::InvalidRom(_))
        ));
    }

    #[test]
    fn test_load_sram() {
        let mut cart = Cartridge::load(&make_rom(0, 0x0200_1FFF)).unwrap();
        cart.load_sram(&[1, 2, 3]);
        assert_eq!(&cart.sram()[..4], &[1, 2, 3, 0xFF]);
    }

    #[test]
    fn test_mouse_cart_detection() {
        let cart = Cartridge::load(&make_rom(0xF294_F931, 0x0200_1FFF)).unwrap();
        assert!(cart.is_mouse_cart());
        let cart = Cartridge::load(&make_rom(0x1111_1111, 0x0200_1FFF)).unwrap();
        assert!(!cart.is_mouse_cart());
    }

    #[test]
    fn test_sram_commit_interval() {
        let dir = std::env::temp_dir().join(format!("emu_loopy_sram_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.sav");

        let mut cart = Cartridge::load(&make_rom(0, 0x0200_1FFF)).unwrap();
        cart.set_sram_persistence(Some(path.clone()), 3);
        assert!(!cart.sram_commit_check());
        assert!(!cart.sram_commit_check());
        assert!(cart.sram_commit_check());
        assert_eq!(std::fs::read(&path).unwrap().len(), 0x2000);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_sram_commit_failure_is_ignored() {
        let mut cart = Cartridge::load(&make_rom(0, 0x0200_1FFF)).unwrap();
        let path = std::env::temp_dir()
            .join("emu_loopy_missing_dir_for_test")
            .join("nested")
            .join("x.sav");
        cart.set_sram_persistence(Some(path), 1);
        assert!(!cart.sram_commit_check());
    }
}
