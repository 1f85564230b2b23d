//! Loopy memory bus
//!
//! Plain memory (BIOS, DRAM, cartridge ROM/SRAM, VRAM) is reached through a
//! 4 KiB page table. Everything else falls through to an ordered MMIO table.
//!
//! ## Memory Map (after translation)
//!
//! - 0x00000000: BIOS
//! - 0x01000000: DRAM (512 KiB)
//! - 0x02000000: cartridge SRAM
//! - 0x04000000: VDP (VRAM and registers), console I/O, sound, expansion
//! - 0x05FFFE00: SH7021 on-chip peripherals
//! - 0x06000000: cartridge ROM
//! - 0x0F000000: on-chip RAM (1 KiB, mirrored)

use emu_core::cpu_sh2::MemorySh2;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::scheduler::{FuncHandle, Scheduler, TimerId};
use emu_core::wordops::{load_be16, load_be32, store_be16, store_be32};

use crate::cart::{pad_to_page, Cartridge};
use crate::console::{self, Console};
use crate::expansion::{self, EXP_END, EXP_START};
use crate::io::{self, LoopyIo};
use crate::ocpm::{self, itu, serial, Ocpm, ORAM_END, ORAM_START};
use crate::printer::Printer;
use crate::sound::{self, Sound, SoundSink};
use crate::vdp::{self, Vdp, VdpRegion};
use crate::Unimplemented;

const PAGE_SHIFT: u32 = 12;
const PAGE_MASK: u32 = 0xFFF;
const PAGE_COUNT: usize = 1 << (28 - PAGE_SHIFT);

pub const BIOS_START: u32 = 0x0000_0000;
pub const DRAM_START: u32 = 0x0100_0000;
pub const DRAM_SIZE: usize = 0x8_0000;
pub const SRAM_START: u32 = 0x0200_0000;
pub const ROM_START: u32 = 0x0600_0000;

/// Host buffer behind a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    Bios,
    Dram,
    Sram,
    Rom,
    BitmapVram,
    TileVram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Page {
    backing: Backing,
    /// Offset of the page's first byte within the backing buffer
    offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mmio {
    Oram,
    Vdp(VdpRegion),
    Io,
    Ocpm,
    SoundCtrl,
    Expansion,
}

/// Checked in order; the first matching range owns the access.
const MMIO_MAP: [(u32, u32, Mmio); 15] = [
    (ORAM_START, ORAM_END, Mmio::Oram),
    (vdp::PALETTE_START, vdp::PALETTE_END, Mmio::Vdp(VdpRegion::Palette)),
    (vdp::OAM_START, vdp::OAM_END, Mmio::Vdp(VdpRegion::Oam)),
    (vdp::CAPTURE_START, vdp::CAPTURE_END, Mmio::Vdp(VdpRegion::Capture)),
    (vdp::CTRL_REG_START, vdp::CTRL_REG_END, Mmio::Vdp(VdpRegion::Ctrl)),
    (vdp::BITMAP_REG_START, vdp::BITMAP_REG_END, Mmio::Vdp(VdpRegion::Bitmap)),
    (vdp::BGOBJ_REG_START, vdp::BGOBJ_REG_END, Mmio::Vdp(VdpRegion::BgObj)),
    (vdp::DISPLAY_REG_START, vdp::DISPLAY_REG_END, Mmio::Vdp(VdpRegion::Display)),
    (vdp::IRQ_REG_START, vdp::IRQ_REG_END, Mmio::Vdp(VdpRegion::Irq)),
    (io::IO_START, io::IO_END, Mmio::Io),
    (vdp::DMA_CTRL_START, vdp::DMA_CTRL_END, Mmio::Vdp(VdpRegion::DmaCtrl)),
    (vdp::DMA_START, vdp::DMA_END, Mmio::Vdp(VdpRegion::Dma)),
    (ocpm::IO_START, ocpm::IO_END, Mmio::Ocpm),
    (sound::CTRL_START, sound::CTRL_END, Mmio::SoundCtrl),
    (EXP_START, EXP_END, Mmio::Expansion),
];

/// Access width in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte = 1,
    Half = 2,
    Word = 4,
}

/// Scheduler callbacks owned by bus devices
#[derive(Debug, Clone, Copy)]
pub(crate) struct Funcs {
    pub serial_tx: FuncHandle,
    pub itu: FuncHandle,
    pub vcount: FuncHandle,
    pub hsync: FuncHandle,
    pub timeref: FuncHandle,
}

/// The on-chip region (bits 24-27 all set) ignores only the top nibble;
/// every other region also drops bit 27, which mirrors it.
pub fn translate(addr: u32) -> u32 {
    if addr & 0x0F00_0000 == 0x0F00_0000 {
        addr & !0xF000_0000
    } else {
        addr & !0xF800_0000
    }
}

pub struct LoopyBus {
    bios: Vec<u8>,
    dram: Vec<u8>,
    pub(crate) cart: Option<Cartridge>,
    pages: Vec<Option<Page>>,

    pub(crate) ocpm: Ocpm,
    pub(crate) vdp: Vdp,
    pub(crate) io: LoopyIo,
    pub(crate) sound: Sound,
    pub(crate) printer: Printer,

    pub(crate) sched: Scheduler<Console>,
    pub(crate) cpu_timer: TimerId,
    pub(crate) funcs: Funcs,

    unimplemented: Option<Unimplemented>,
}

impl LoopyBus {
    pub fn new(
        mut bios: Vec<u8>,
        cart: Option<Cartridge>,
        sound: Box<dyn SoundSink>,
        printer: Printer,
    ) -> Self {
        pad_to_page(&mut bios);

        let mut sched = Scheduler::new();
        let cpu_timer = sched.register_timer("SH2", 1, Some(console::run_cpu));
        let funcs = Funcs {
            serial_tx: sched.register_func("Serial::tx", serial::tx_event),
            itu: sched.register_func("ITU::event", itu::itu_event),
            vcount: sched.register_func("VDP::inc_vcount", vdp::vcount_event),
            hsync: sched.register_func("VDP::start_hsync", vdp::hsync_event),
            timeref: sched.register_func("Sound::timeref", sound::timeref_event),
        };

        let mut ocpm = Ocpm::new();
        ocpm.pfc.set_cart_present(cart.is_some());

        let mut bus = Self {
            bios,
            dram: vec![0; DRAM_SIZE],
            cart,
            pages: vec![None; PAGE_COUNT],
            ocpm,
            vdp: Vdp::new(),
            io: LoopyIo::new(),
            sound: Sound::new(sound),
            printer,
            sched,
            cpu_timer,
            funcs,
            unimplemented: None,
        };
        bus.map_pages();
        bus
    }

    fn map(&mut self, backing: Backing, start: u32, size: usize) {
        let first = (start >> PAGE_SHIFT) as usize;
        let pages = self.pages.iter_mut().skip(first).take(size >> PAGE_SHIFT);
        for (i, page) in pages.enumerate() {
            *page = Some(Page {
                backing,
                offset: i << PAGE_SHIFT,
            });
        }
    }

    fn map_pages(&mut self) {
        self.map(Backing::Bios, BIOS_START, self.bios.len());
        self.map(Backing::Dram, DRAM_START, DRAM_SIZE);
        if let Some((rom, sram)) = self.cart.as_ref().map(|c| (c.rom.len(), c.sram.len())) {
            self.map(Backing::Rom, ROM_START, rom);
            if sram > 0 {
                self.map(Backing::Sram, SRAM_START, sram);
            }
        }
        // Bitmap VRAM appears twice
        self.map(Backing::BitmapVram, vdp::BITMAP_VRAM_START, vdp::BITMAP_VRAM_SIZE);
        self.map(
            Backing::BitmapVram,
            vdp::BITMAP_VRAM_START + vdp::BITMAP_VRAM_SIZE as u32,
            vdp::BITMAP_VRAM_SIZE,
        );
        self.map(Backing::TileVram, vdp::TILE_VRAM_START, vdp::TILE_VRAM_SIZE);
    }

    fn backing(&self, backing: Backing) -> &[u8] {
        match backing {
            Backing::Bios => &self.bios,
            Backing::Dram => &self.dram,
            Backing::Sram => match self.cart.as_ref() {
                Some(cart) => &cart.sram,
                None => &[],
            },
            Backing::Rom => match self.cart.as_ref() {
                Some(cart) => &cart.rom,
                None => &[],
            },
            Backing::BitmapVram => &self.vdp.bitmap_vram,
            Backing::TileVram => &self.vdp.tile_vram,
        }
    }

    fn backing_mut(&mut self, backing: Backing) -> &mut [u8] {
        match backing {
            Backing::Bios => &mut self.bios,
            Backing::Dram => &mut self.dram,
            Backing::Sram => match self.cart.as_mut() {
                Some(cart) => &mut cart.sram,
                None => &mut [],
            },
            Backing::Rom => match self.cart.as_mut() {
                Some(cart) => &mut cart.rom,
                None => &mut [],
            },
            Backing::BitmapVram => &mut self.vdp.bitmap_vram,
            Backing::TileVram => &mut self.vdp.tile_vram,
        }
    }

    /// Page-table lookup: the backing and the byte offset for `addr`,
    /// aligned down to `width`.
    fn lookup(&self, addr: u32, width: Width) -> Option<(Backing, usize)> {
        let page = self.pages[(addr >> PAGE_SHIFT) as usize]?;
        let within = (addr & PAGE_MASK & !(width as u32 - 1)) as usize;
        Some((page.backing, page.offset + within))
    }

    fn mmio_region(addr: u32) -> Option<Mmio> {
        MMIO_MAP
            .iter()
            .find(|(start, end, _)| (*start..*end).contains(&addr))
            .map(|(_, _, region)| *region)
    }

    fn read(&mut self, addr: u32, width: Width) -> u32 {
        let addr = translate(addr);
        if let Some((backing, offset)) = self.lookup(addr, width) {
            let mem = self.backing(backing);
            return match width {
                Width::Byte => u32::from(mem[offset]),
                Width::Half => u32::from(load_be16(mem, offset)),
                Width::Word => load_be32(mem, offset),
            };
        }

        match Self::mmio_region(addr) {
            Some(Mmio::Oram) => match width {
                Width::Byte => u32::from(self.ocpm.oram_read8(addr)),
                Width::Half => u32::from(self.ocpm.oram_read16(addr)),
                Width::Word => self.ocpm.oram_read32(addr),
            },
            Some(Mmio::Vdp(region)) => match width {
                Width::Byte => u32::from(self.vdp.read8(region, addr)),
                Width::Half => u32::from(self.vdp.read16(region, addr)),
                Width::Word => self.vdp.read32(region, addr),
            },
            Some(Mmio::Io) => match width {
                Width::Byte => u32::from(self.io.read8(addr)),
                Width::Half => u32::from(self.io.read16(addr)),
                Width::Word => self.io.read32(addr),
            },
            Some(Mmio::Ocpm) => match width {
                Width::Byte => u32::from(ocpm::io_read8(self, addr)),
                Width::Half => u32::from(ocpm::io_read16(self, addr)),
                Width::Word => ocpm::io_read32(self, addr),
            },
            Some(Mmio::SoundCtrl) => match width {
                Width::Byte => u32::from(self.sound.ctrl_read8(addr)),
                Width::Half => u32::from(self.sound.ctrl_read16(addr)),
                Width::Word => self.sound.ctrl_read32(addr),
            },
            Some(Mmio::Expansion) => expansion::read(addr, width as u32),
            None => {
                log(LogCategory::Bus, LogLevel::Warn, || {
                    format!("Bus: unmapped read{} {:08X}", width as u32 * 8, addr)
                });
                0
            }
        }
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) {
        let addr = translate(addr);
        if let Some((backing, offset)) = self.lookup(addr, width) {
            if matches!(backing, Backing::Bios | Backing::Rom) {
                log(LogCategory::Bus, LogLevel::Warn, || {
                    format!("Bus: write{} to ROM {:08X}: {:X}", width as u32 * 8, addr, value)
                });
                return;
            }
            let mem = self.backing_mut(backing);
            match width {
                Width::Byte => mem[offset] = value as u8,
                Width::Half => store_be16(mem, offset, value as u16),
                Width::Word => store_be32(mem, offset, value),
            }
            return;
        }

        match Self::mmio_region(addr) {
            Some(Mmio::Oram) => match width {
                Width::Byte => self.ocpm.oram_write8(addr, value as u8),
                Width::Half => self.ocpm.oram_write16(addr, value as u16),
                Width::Word => self.ocpm.oram_write32(addr, value),
            },
            Some(Mmio::Vdp(region)) => match width {
                Width::Byte => self.vdp.write8(&mut self.io, region, addr, value as u8),
                Width::Half => self.vdp.write16(&mut self.io, region, addr, value as u16),
                Width::Word => self.vdp.write32(&mut self.io, region, addr, value),
            },
            Some(Mmio::Io) => match width {
                Width::Byte => self.io.write8(addr, value as u8),
                Width::Half => self.io.write16(addr, value as u16),
                Width::Word => self.io.write32(addr, value),
            },
            Some(Mmio::Ocpm) => match width {
                Width::Byte => ocpm::io_write8(self, addr, value as u8),
                Width::Half => ocpm::io_write16(self, addr, value as u16),
                Width::Word => ocpm::io_write32(self, addr, value),
            },
            Some(Mmio::SoundCtrl) => match width {
                Width::Byte => self.sound.ctrl_write8(addr, value as u8),
                Width::Half => self.sound.ctrl_write16(addr, value as u16),
                Width::Word => self.sound.ctrl_write32(addr, value),
            },
            Some(Mmio::Expansion) => expansion::write(addr, width as u32, value),
            None => log(LogCategory::Bus, LogLevel::Warn, || {
                format!(
                    "Bus: unmapped write{} {:08X}: {:X}",
                    width as u32 * 8,
                    addr,
                    value
                )
            }),
        }
    }

    /// Record a path the emulator does not model. The first one is kept
    /// until taken.
    pub(crate) fn latch_unimplemented(&mut self, what: Unimplemented) {
        log(LogCategory::Stubs, LogLevel::Warn, || format!("Unimplemented: {}", what));
        if self.unimplemented.is_none() {
            self.unimplemented = Some(what);
        }
    }

    pub(crate) fn has_unimplemented(&self) -> bool {
        self.unimplemented.is_some()
    }

    pub(crate) fn unimplemented(&self) -> Option<&Unimplemented> {
        self.unimplemented.as_ref()
    }

    pub(crate) fn take_unimplemented(&mut self) -> Option<Unimplemented> {
        self.unimplemented.take()
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cart.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.cart.as_mut()
    }

    pub fn vdp(&self) -> &Vdp {
        &self.vdp
    }

    pub fn vdp_mut(&mut self) -> &mut Vdp {
        &mut self.vdp
    }

    pub fn io_mut(&mut self) -> &mut LoopyIo {
        &mut self.io
    }
}

impl MemorySh2 for LoopyBus {
    fn read_byte(&mut self, addr: u32) -> u8 {
        self.read(addr, Width::Byte) as u8
    }

    fn read_halfword(&mut self, addr: u32) -> u16 {
        self.read(addr, Width::Half) as u16
    }

    fn read_word(&mut self, addr: u32) -> u32 {
        self.read(addr, Width::Word)
    }

    fn write_byte(&mut self, addr: u32, val: u8) {
        self.write(addr, Width::Byte, u32::from(val));
    }

    fn write_halfword(&mut self, addr: u32, val: u16) {
        self.write(addr, Width::Half, u32::from(val));
    }

    fn write_word(&mut self, addr: u32, val: u32) {
        self.write(addr, Width::Word, val);
    }

    /// Wait states per region; refresh and configurable waits are not
    /// modelled.
    fn read_cycles(&self, addr: u32) -> u32 {
        let addr = translate(addr);
        match addr >> 24 {
            0x0 | 0x1 => 1,
            0x2 => 3,
            0x4 => {
                let wait = if addr & 0x3F_FFFF >= 0x5_8000 { 2 } else { 1 };
                2 + wait
            }
            0x5 | 0x6 => 3,
            0xF => 1,
            _ => 1,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cart::tests::make_rom;
    use crate::sound::NullSound;

    pub(crate) fn make_bus() -> LoopyBus {
        LoopyBus::new(vec![0; 0x8000], None, Box::new(NullSound), Printer::new(true))
    }

    fn make_bus_with_cart() -> LoopyBus {
        let cart = Cartridge::load(&make_rom(0x1234_5678, 0x0200_1FFF)).unwrap();
        LoopyBus::new(vec![0; 0x8000], Some(cart), Box::new(NullSound), Printer::new(true))
    }

    #[test]
    fn test_translate() {
        assert_eq!(translate(0x2100_0000), 0x0100_0000);
        assert_eq!(translate(0x0900_1234), 0x0100_1234);
        assert_eq!(translate(0xFFFF_FE00), 0x0FFF_FE00);
        assert_eq!(translate(0x0F00_0010), 0x0F00_0010);
        assert_eq!(translate(0x85FF_FF40), 0x05FF_FF40);
    }

    #[test]
    fn test_dram_big_endian() {
        let mut bus = make_bus();
        bus.write_word(0x0100_0000, 0x1122_3344);
        assert_eq!(bus.read_byte(0x0100_0000), 0x11);
        assert_eq!(bus.read_byte(0x0100_0003), 0x44);
        assert_eq!(bus.read_halfword(0x0100_0002), 0x3344);
        // Mirror through bit 27 and the top nibble
        assert_eq!(bus.read_word(0x2900_0000), 0x1122_3344);
    }

    #[test]
    fn test_bitmap_vram_mirror() {
        let mut bus = make_bus();
        bus.write_halfword(0x0400_0100, 0xBEEF);
        assert_eq!(bus.read_halfword(0x0402_0100), 0xBEEF);
        assert_eq!(bus.vdp.bitmap_vram()[0x100], 0xBE);
        bus.write_byte(0x0404_0001, 0x5A);
        assert_eq!(bus.vdp.tile_vram()[1], 0x5A);
    }

    #[test]
    fn test_cart_rom_and_sram() {
        let mut bus = make_bus_with_cart();
        assert_eq!(bus.read_word(0x0600_0008), 0x1234_5678);
        bus.write_word(0x0600_0008, 0);
        assert_eq!(bus.read_word(0x0600_0008), 0x1234_5678);
        bus.write_byte(0x0200_0010, 0x42);
        assert_eq!(bus.read_byte(0x0200_0010), 0x42);
        assert_eq!(bus.cartridge().unwrap().sram()[0x10], 0x42);
        assert_eq!(bus.read_halfword(0x05FF_FFC0), 0x0100);
    }

    #[test]
    fn test_unmapped_reads_zero() {
        let mut bus = make_bus();
        assert_eq!(bus.read_word(0x0300_0000), 0);
        bus.write_word(0x0300_0000, 0xFFFF_FFFF);
        assert_eq!(bus.read_word(0x0300_0000), 0);
        // No cartridge: ROM and SRAM windows are unmapped
        assert_eq!(bus.read_word(0x0600_0000), 0);
        assert_eq!(bus.read_halfword(0x05FF_FFC0), 0);
    }

    #[test]
    fn test_mmio_order_prefers_earlier_entries() {
        assert_eq!(
            LoopyBus::mmio_region(0x0405_1000),
            Some(Mmio::Vdp(VdpRegion::Palette))
        );
        assert_eq!(LoopyBus::mmio_region(0x0405_D010), Some(Mmio::Io));
        assert_eq!(LoopyBus::mmio_region(0x0F00_0000), Some(Mmio::Oram));
        assert_eq!(LoopyBus::mmio_region(0x0405_0200), None);
    }

    #[test]
    fn test_palette_and_io_through_bus() {
        let mut bus = make_bus();
        bus.write_word(0x0405_1010, 0x7FFF_001F);
        assert_eq!(bus.read_halfword(0x0405_1012), 0x001F);
        assert_eq!(bus.vdp.palette()[0x10], 0x7F);

        bus.io.set_controller_plugged(true, false);
        bus.write_halfword(0x0405_8000, 0x0010); // MODE: scan pad
        assert_eq!(bus.read_halfword(0x0405_D010), 0x0001);
    }

    #[test]
    fn test_cycle_costs() {
        let bus = make_bus();
        assert_eq!(bus.read_cycles(0x0000_0100), 1);
        assert_eq!(bus.read_cycles(0x0100_0000), 1);
        assert_eq!(bus.read_cycles(0x0200_0000), 3);
        assert_eq!(bus.read_cycles(0x0400_0000), 3);
        assert_eq!(bus.read_cycles(0x0405_8000), 4);
        assert_eq!(bus.read_cycles(0x05FF_FF40), 3);
        assert_eq!(bus.read_cycles(0x0600_0000), 3);
        assert_eq!(bus.read_cycles(0xFFFF_F000), 1);
        assert_eq!(bus.write_cycles(0x0200_0000), 3);
    }

    #[test]
    fn test_unimplemented_keeps_first() {
        let mut bus = make_bus();
        bus.latch_unimplemented(Unimplemented::TimerMode(1));
        bus.latch_unimplemented(Unimplemented::TimerMode(2));
        assert!(bus.has_unimplemented());
        assert_eq!(bus.take_unimplemented(), Some(Unimplemented::TimerMode(1)));
        assert_eq!(bus.take_unimplemented(), None);
    }
}
