//! VDP - video display processor
//!
//! Owns VRAM, palette, OAM and the capture buffer, the register surface,
//! and the scanline timing that drives IRQ0, IRQ1 and NMI. Pixel drawing
//! is delegated to a [`LineRenderer`].
//!
//! ## Memory Map
//!
//! - 0x04000000: bitmap VRAM (128 KiB, mirrored once)
//! - 0x04040000: tile VRAM (64 KiB)
//! - 0x04050000: OAM
//! - 0x04051000: palette
//! - 0x04052000: capture buffer (read only)
//! - 0x04058000: control (MODE, HCOUNT, VCOUNT, triggers, SYNC_IRQ_CTRL)
//! - 0x04059000: bitmap layer registers
//! - 0x0405A000: BG/OBJ registers
//! - 0x0405B000: display registers
//! - 0x0405C000: IRQ compare registers
//! - 0x0405E000: VDP DMA control
//! - 0x0405F000: VDP DMA trigger

mod render;

pub use render::{argb1555_to_argb8888, BackdropRenderer, LineRenderer};

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::Frame;
use emu_core::wordops::{load_be16, load_be32, store_be16, store_be32};

use crate::bus::LoopyBus;
use crate::console::{Console, F_CPU};
use crate::io::LoopyIo;
use crate::ocpm::intc::Source;

pub const BITMAP_VRAM_START: u32 = 0x0400_0000;
pub const BITMAP_VRAM_SIZE: usize = 0x2_0000;
pub const TILE_VRAM_START: u32 = 0x0404_0000;
pub const TILE_VRAM_SIZE: usize = 0x1_0000;

pub const OAM_START: u32 = 0x0405_0000;
pub const OAM_END: u32 = 0x0405_0200;
pub const PALETTE_START: u32 = 0x0405_1000;
pub const PALETTE_END: u32 = 0x0405_1200;
pub const CAPTURE_START: u32 = 0x0405_2000;
pub const CAPTURE_END: u32 = 0x0405_2200;
pub const CTRL_REG_START: u32 = 0x0405_8000;
pub const CTRL_REG_END: u32 = 0x0405_9000;
pub const BITMAP_REG_START: u32 = 0x0405_9000;
pub const BITMAP_REG_END: u32 = 0x0405_A000;
pub const BGOBJ_REG_START: u32 = 0x0405_A000;
pub const BGOBJ_REG_END: u32 = 0x0405_B000;
pub const DISPLAY_REG_START: u32 = 0x0405_B000;
pub const DISPLAY_REG_END: u32 = 0x0405_C000;
pub const IRQ_REG_START: u32 = 0x0405_C000;
pub const IRQ_REG_END: u32 = 0x0405_D000;
pub const DMA_CTRL_START: u32 = 0x0405_E000;
pub const DMA_CTRL_END: u32 = 0x0405_F000;
pub const DMA_START: u32 = 0x0405_F000;
pub const DMA_END: u32 = 0x0406_0000;

const OAM_SIZE: usize = 0x200;
const PALETTE_SIZE: usize = 0x200;
const CAPTURE_SIZE: usize = 0x200;

pub const DISPLAY_WIDTH: usize = 256;
/// Rows kept in the display buffer: the tallest mode plus a border row
pub const DISPLAY_HEIGHT: usize = 0x100;

pub const LINES_PER_FRAME: i64 = 263;
pub const CYCLES_PER_FRAME: i64 = F_CPU / 60;
pub const CYCLES_PER_LINE: i64 = CYCLES_PER_FRAME / LINES_PER_FRAME;
/// 256 of 341.25 dot clocks are active before HSYNC
pub const CYCLES_UNTIL_HSYNC: i64 = CYCLES_PER_LINE * 1024 / 1365;

const VISIBLE_LINES: u16 = 0xE0;
const VISIBLE_LINES_EXTRA: u16 = 0xF0;
const VSYNC_END: u16 = 0x200;
const HCOUNT_HSYNC: u16 = 0x100;

/// OAM entry value that hides an object
const OBJ_HIDDEN: u32 = 0x200;

/// Register blocks behind the VDP's MMIO windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdpRegion {
    Palette,
    Oam,
    Capture,
    Ctrl,
    Bitmap,
    BgObj,
    Display,
    Irq,
    DmaCtrl,
    Dma,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BitmapLayer {
    pub scrollx: u16,
    pub scrolly: u16,
    pub screenx: u16,
    pub screeny: u16,
    pub width: u8,
    pub clipx: u8,
    pub height: u8,
    pub buffer_ctrl: u16,
}

/// Register file. Multi-field registers are kept as written and decoded
/// on demand.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VdpRegs {
    /// bit0 PAL, bit1 extra scanlines, bit3 mouse scan, bit4 pad scan
    pub mode: u16,
    /// bit0 IRQ1 enable, bit1 IRQ1 source (0 = VSYNC, 1 = HSYNC)
    pub sync_irq_ctrl: u16,
    pub bitmap: [BitmapLayer; 4],
    pub bitmap_ctrl: u16,
    pub bitmap_palsel: u16,
    pub bg_ctrl: u16,
    pub bg_scrollx: [u16; 2],
    pub bg_scrolly: [u16; 2],
    pub bg_palsel: [u16; 2],
    pub obj_ctrl: u16,
    pub obj_palsel: [u16; 2],
    pub tilebase: u16,
    pub dispmode: u16,
    pub layer_ctrl: u16,
    pub color_prio: u16,
    pub backdrops: [u16; 2],
    pub capture_scanline: u16,
    pub capture_format: u8,
    /// bit1 IRQ0 enable, bit2 NMI enable, bit5 use VCMP, bit7 IRQ0 enable 2
    pub cmp_irq_ctrl: u16,
    pub irq0_hcmp: u16,
    pub irq0_vcmp: u16,
    pub dma_mask: u16,
    pub dma_value: u16,
}

impl VdpRegs {
    pub fn extra_scanlines(&self) -> bool {
        self.mode & 0x02 != 0
    }

    fn irq1_enable(&self) -> bool {
        self.sync_irq_ctrl & 0x1 != 0
    }

    fn irq1_source(&self) -> u16 {
        (self.sync_irq_ctrl >> 1) & 0x1
    }

    fn irq0_enabled(&self) -> bool {
        self.cmp_irq_ctrl & 0x02 != 0 && self.cmp_irq_ctrl & 0x80 != 0
    }

    fn nmi_enable(&self) -> bool {
        self.cmp_irq_ctrl & 0x04 != 0
    }

    fn use_vcmp(&self) -> bool {
        self.cmp_irq_ctrl & 0x20 != 0
    }
}

pub struct Vdp {
    pub(crate) bitmap_vram: Vec<u8>,
    pub(crate) tile_vram: Vec<u8>,
    oam: Vec<u8>,
    palette: Vec<u8>,
    capture: Vec<u8>,

    regs: VdpRegs,
    hcount: u16,
    vcount: u16,
    visible_scanlines: u16,
    capture_enable: bool,
    frame_ended: bool,
    frame_count: u64,

    display: Vec<u16>,
    renderer: Option<Box<dyn LineRenderer>>,
}

impl Vdp {
    pub fn new() -> Self {
        let mut oam = vec![0; OAM_SIZE];
        for offset in (0..OAM_SIZE).step_by(4) {
            store_be32(&mut oam, offset, OBJ_HIDDEN);
        }
        Self {
            bitmap_vram: vec![0; BITMAP_VRAM_SIZE],
            tile_vram: vec![0; TILE_VRAM_SIZE],
            oam,
            palette: vec![0; PALETTE_SIZE],
            capture: vec![0; CAPTURE_SIZE],
            regs: VdpRegs::default(),
            hcount: 0,
            vcount: 0,
            visible_scanlines: VISIBLE_LINES,
            capture_enable: false,
            frame_ended: false,
            frame_count: 0,
            display: vec![0; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            renderer: Some(Box::new(BackdropRenderer)),
        }
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn LineRenderer>) {
        self.renderer = Some(renderer);
    }

    pub fn regs(&self) -> &VdpRegs {
        &self.regs
    }

    pub fn hcount(&self) -> u16 {
        self.hcount
    }

    pub fn vcount(&self) -> u16 {
        self.vcount
    }

    pub fn visible_scanlines(&self) -> u16 {
        self.visible_scanlines
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn bitmap_vram(&self) -> &[u8] {
        &self.bitmap_vram
    }

    pub fn tile_vram(&self) -> &[u8] {
        &self.tile_vram
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn palette(&self) -> &[u8] {
        &self.palette
    }

    pub fn capture_buffer(&self) -> &[u8] {
        &self.capture
    }

    /// Composited 15-bit output, `DISPLAY_WIDTH` pixels per row
    pub fn display(&self) -> &[u16] {
        &self.display
    }

    pub fn frame_ended(&self) -> bool {
        self.frame_ended
    }

    pub fn start_frame(&mut self) {
        self.frame_ended = false;
    }

    /// The visible area as an ARGB frame.
    pub fn frame(&self) -> Frame {
        let height = self.visible_scanlines as usize;
        let mut frame = Frame::new(DISPLAY_WIDTH as u32, height as u32);
        for (dst, src) in frame
            .pixels
            .iter_mut()
            .zip(&self.display[..DISPLAY_WIDTH * height])
        {
            *dst = argb1555_to_argb8888(*src);
        }
        frame
    }

    pub fn read8(&mut self, region: VdpRegion, addr: u32) -> u8 {
        match region {
            VdpRegion::Palette => self.palette[(addr & 0x1FF) as usize],
            VdpRegion::Oam => self.oam[(addr & 0x1FF) as usize],
            VdpRegion::Capture => self.capture[(addr & 0x1FF) as usize],
            _ => {
                let half = self.read16(region, addr & !1);
                if addr & 1 == 0 {
                    (half >> 8) as u8
                } else {
                    half as u8
                }
            }
        }
    }

    pub fn read16(&mut self, region: VdpRegion, addr: u32) -> u16 {
        match region {
            VdpRegion::Palette => load_be16(&self.palette, (addr & 0x1FE) as usize),
            VdpRegion::Oam => load_be16(&self.oam, (addr & 0x1FE) as usize),
            VdpRegion::Capture => load_be16(&self.capture, (addr & 0x1FE) as usize),
            VdpRegion::Ctrl => self.ctrl_read16(addr),
            VdpRegion::Bitmap => self.bitmap_read16(addr),
            VdpRegion::BgObj => self.bgobj_read16(addr),
            VdpRegion::Display => self.display_read16(addr),
            VdpRegion::Irq => self.irq_read16(addr),
            VdpRegion::DmaCtrl => self.dma_ctrl_read16(addr),
            VdpRegion::Dma => unknown_read(region, addr),
        }
    }

    pub fn read32(&mut self, region: VdpRegion, addr: u32) -> u32 {
        match region {
            VdpRegion::Palette => load_be32(&self.palette, (addr & 0x1FC) as usize),
            VdpRegion::Oam => load_be32(&self.oam, (addr & 0x1FC) as usize),
            VdpRegion::Capture => load_be32(&self.capture, (addr & 0x1FC) as usize),
            _ => {
                let hi = self.read16(region, addr);
                let lo = self.read16(region, addr + 2);
                (u32::from(hi) << 16) | u32::from(lo)
            }
        }
    }

    pub fn write8(&mut self, io: &mut LoopyIo, region: VdpRegion, addr: u32, value: u8) {
        match region {
            VdpRegion::Palette => self.palette[(addr & 0x1FF) as usize] = value,
            VdpRegion::Oam => self.oam[(addr & 0x1FF) as usize] = value,
            VdpRegion::Capture => capture_write(addr, u32::from(value)),
            // The fill fires on any write; the value is irrelevant
            VdpRegion::Dma => self.dma_write16(addr & !1),
            _ => {
                let half = self.read16(region, addr & !1);
                let merged = if addr & 1 == 0 {
                    (half & 0x00FF) | (u16::from(value) << 8)
                } else {
                    (half & 0xFF00) | u16::from(value)
                };
                self.write16(io, region, addr & !1, merged);
            }
        }
    }

    pub fn write16(&mut self, io: &mut LoopyIo, region: VdpRegion, addr: u32, value: u16) {
        match region {
            VdpRegion::Palette => store_be16(&mut self.palette, (addr & 0x1FE) as usize, value),
            VdpRegion::Oam => store_be16(&mut self.oam, (addr & 0x1FE) as usize, value),
            VdpRegion::Capture => capture_write(addr, u32::from(value)),
            VdpRegion::Ctrl => self.ctrl_write16(io, addr, value),
            VdpRegion::Bitmap => self.bitmap_write16(addr, value),
            VdpRegion::BgObj => self.bgobj_write16(addr, value),
            VdpRegion::Display => self.display_write16(addr, value),
            VdpRegion::Irq => self.irq_write16(addr, value),
            VdpRegion::DmaCtrl => self.dma_ctrl_write16(addr, value),
            VdpRegion::Dma => self.dma_write16(addr),
        }
    }

    pub fn write32(&mut self, io: &mut LoopyIo, region: VdpRegion, addr: u32, value: u32) {
        match region {
            VdpRegion::Palette => store_be32(&mut self.palette, (addr & 0x1FC) as usize, value),
            VdpRegion::Oam => store_be32(&mut self.oam, (addr & 0x1FC) as usize, value),
            VdpRegion::Capture => capture_write(addr, value),
            _ => {
                self.write16(io, region, addr, (value >> 16) as u16);
                self.write16(io, region, addr + 2, value as u16);
            }
        }
    }

    fn ctrl_read16(&self, addr: u32) -> u16 {
        match addr & 0xFFE {
            0x000 => self.regs.mode,
            // Only the HSYNC flag is modelled, not the dot counter
            0x002 => self.hcount,
            0x004 => self.vcount,
            0x008 => self.regs.sync_irq_ctrl,
            _ => unknown_read(VdpRegion::Ctrl, addr),
        }
    }

    fn ctrl_write16(&mut self, io: &mut LoopyIo, addr: u32, value: u16) {
        match addr & 0xFFE {
            0x000 => {
                log(LogCategory::VDP, LogLevel::Debug, || {
                    format!("VDP: write MODE: {:04X}", value)
                });
                if value & 0x01 != 0 {
                    log(LogCategory::Stubs, LogLevel::Warn, || {
                        "VDP: PAL timing requested, staying on NTSC".to_string()
                    });
                }
                self.regs.mode = value & 0x3F;
                self.visible_scanlines = if self.regs.extra_scanlines() {
                    VISIBLE_LINES_EXTRA
                } else {
                    VISIBLE_LINES
                };
                io.set_controller_scan_mode(value & 0x10 != 0, value & 0x08 != 0);
            }
            0x006 => {
                if value & 0x01 != 0 {
                    self.capture_enable = true;
                }
                if value & 0x02 != 0 {
                    io.update_print_temp();
                }
                if value & 0x04 != 0 {
                    io.update_sensors();
                }
                if value & !0x0007 != 0 {
                    log(LogCategory::Stubs, LogLevel::Debug, || {
                        format!("VDP: write trigger bits {:04X}", value)
                    });
                }
            }
            0x008 => {
                log(LogCategory::VDP, LogLevel::Debug, || {
                    format!("VDP: write SYNC_IRQ_CTRL: {:04X}", value)
                });
                self.regs.sync_irq_ctrl = value & 0x3;
            }
            _ => unknown_write(VdpRegion::Ctrl, addr, value),
        }
    }

    fn bitmap_read16(&self, addr: u32) -> u16 {
        let addr = addr & 0xFFE;
        let layer = &self.regs.bitmap[((addr >> 1) & 0x3) as usize];
        match addr & !0x7 {
            0x000 => layer.scrollx,
            0x008 => layer.scrolly,
            0x010 => layer.screenx,
            0x018 => layer.screeny,
            0x020 => u16::from(layer.width) | (u16::from(layer.clipx) << 8),
            0x028 => u16::from(layer.height),
            0x030 => self.regs.bitmap_ctrl,
            0x040 => self.regs.bitmap_palsel,
            0x050 => layer.buffer_ctrl,
            _ => unknown_read(VdpRegion::Bitmap, addr),
        }
    }

    fn bitmap_write16(&mut self, addr: u32, value: u16) {
        let addr = addr & 0xFFE;
        let index = ((addr >> 1) & 0x3) as usize;
        let layer = &mut self.regs.bitmap[index];
        let name = match addr & !0x7 {
            0x000 => {
                layer.scrollx = value & 0x1FF;
                "SCROLLX"
            }
            0x008 => {
                layer.scrolly = value & 0x1FF;
                "SCROLLY"
            }
            0x010 => {
                layer.screenx = value & 0x1FF;
                "SCREENX"
            }
            0x018 => {
                layer.screeny = value & 0x1FF;
                "SCREENY"
            }
            0x020 => {
                layer.width = value as u8;
                layer.clipx = (value >> 8) as u8;
                "CLIPWIDTH"
            }
            0x028 => {
                layer.height = value as u8;
                "HEIGHT"
            }
            0x030 => {
                self.regs.bitmap_ctrl = value;
                "CTRL"
            }
            0x040 => {
                self.regs.bitmap_palsel = value;
                "PALSEL"
            }
            0x050 => {
                layer.buffer_ctrl = value;
                "BUFFER_CTRL"
            }
            _ => return unknown_write(VdpRegion::Bitmap, addr, value),
        };
        log(LogCategory::VDP, LogLevel::Debug, || {
            format!("VDP: write BM{}_{}: {:04X}", index, name, value)
        });
    }

    fn bgobj_read16(&self, addr: u32) -> u16 {
        let r = &self.regs;
        match addr & 0xFFE {
            0x000 => r.bg_ctrl,
            0x002 => r.bg_scrollx[0],
            0x004 => r.bg_scrolly[0],
            0x006 => r.bg_scrollx[1],
            0x008 => r.bg_scrolly[1],
            0x00A => r.bg_palsel[0],
            0x00C => r.bg_palsel[1],
            0x010 => r.obj_ctrl,
            0x012 => r.obj_palsel[0],
            0x014 => r.obj_palsel[1],
            0x020 => r.tilebase,
            _ => unknown_read(VdpRegion::BgObj, addr),
        }
    }

    fn bgobj_write16(&mut self, addr: u32, value: u16) {
        let addr = addr & 0xFFE;
        let r = &mut self.regs;
        match addr {
            0x000 => r.bg_ctrl = value & 0xFF,
            0x002 | 0x006 => r.bg_scrollx[((addr - 0x002) >> 2) as usize] = value & 0xFFF,
            0x004 | 0x008 => r.bg_scrolly[((addr - 0x004) >> 2) as usize] = value & 0xFFF,
            0x00A | 0x00C => r.bg_palsel[((addr - 0x00A) >> 1) as usize] = value,
            0x010 => r.obj_ctrl = value & 0x7FFF,
            0x012 | 0x014 => r.obj_palsel[((addr - 0x012) >> 1) as usize] = value,
            0x020 => r.tilebase = value & 0xFF,
            _ => return unknown_write(VdpRegion::BgObj, addr, value),
        }
        log(LogCategory::VDP, LogLevel::Debug, || {
            format!("VDP: write BG/OBJ {:03X}: {:04X}", addr, value)
        });
    }

    fn display_read16(&self, addr: u32) -> u16 {
        let r = &self.regs;
        match addr & 0xFFE {
            0x000 => r.dispmode,
            0x002 => r.layer_ctrl,
            0x004 => r.color_prio,
            // Backdrop registers are in reverse order
            0x006 => r.backdrops[1],
            0x008 => r.backdrops[0],
            0x00A => r.capture_scanline | (u16::from(r.capture_format) << 8),
            _ => unknown_read(VdpRegion::Display, addr),
        }
    }

    fn display_write16(&mut self, addr: u32, value: u16) {
        let addr = addr & 0xFFE;
        let r = &mut self.regs;
        match addr {
            0x000 => r.dispmode = value & 0x7,
            0x002 => r.layer_ctrl = value,
            0x004 => r.color_prio = value & 0xFF,
            0x006 => r.backdrops[1] = value,
            0x008 => r.backdrops[0] = value,
            0x00A => {
                r.capture_scanline = value & 0xFF;
                r.capture_format = ((value >> 8) & 0x3) as u8;
            }
            _ => return unknown_write(VdpRegion::Display, addr, value),
        }
        log(LogCategory::VDP, LogLevel::Debug, || {
            format!("VDP: write display {:03X}: {:04X}", addr, value)
        });
    }

    fn irq_read16(&self, addr: u32) -> u16 {
        match addr & 0xFFE {
            0x000 => self.regs.cmp_irq_ctrl,
            0x002 => self.regs.irq0_hcmp,
            0x004 => self.regs.irq0_vcmp,
            _ => unknown_read(VdpRegion::Irq, addr),
        }
    }

    fn irq_write16(&mut self, addr: u32, value: u16) {
        match addr & 0xFFE {
            0x000 => {
                log(LogCategory::VDP, LogLevel::Debug, || {
                    format!("VDP: write CMP_IRQ_CTRL: {:04X}", value)
                });
                self.regs.cmp_irq_ctrl = value & 0xA6;
            }
            0x002 => self.regs.irq0_hcmp = value & 0x1FF,
            0x004 => self.regs.irq0_vcmp = value & 0x1FF,
            _ => unknown_write(VdpRegion::Irq, addr, value),
        }
    }

    fn dma_ctrl_read16(&self, addr: u32) -> u16 {
        match addr & 0xFFE {
            0x002 => self.regs.dma_mask,
            0x004 => self.regs.dma_value,
            _ => unknown_read(VdpRegion::DmaCtrl, addr),
        }
    }

    fn dma_ctrl_write16(&mut self, addr: u32, value: u16) {
        match addr & 0xFFE {
            0x000 => log(LogCategory::Stubs, LogLevel::Debug, || {
                format!("VDP: write DMA ctrl 000: {:04X}", value)
            }),
            0x002 => self.regs.dma_mask = value & 0x1FF,
            0x004 => self.regs.dma_value = value & 0xFF,
            _ => unknown_write(VdpRegion::DmaCtrl, addr, value),
        }
    }

    /// Fill one bitmap row: every byte keeps its unmasked bits and takes
    /// the masked bits from the DMA value.
    fn dma_write16(&mut self, addr: u32) {
        let y = ((addr & 0x3FE) >> 1) as usize;
        let mask = self.regs.dma_mask as u8;
        let fill = self.regs.dma_value as u8 & mask;
        let row = &mut self.bitmap_vram[y * DISPLAY_WIDTH..(y + 1) * DISPLAY_WIDTH];
        for byte in row.iter_mut() {
            *byte = (*byte & !mask) | fill;
        }
    }

    /// Draw a visible line through the renderer, then run the capture unit.
    fn draw_scanline(&mut self, y: usize) {
        let mut line = [0u16; DISPLAY_WIDTH];
        let mut screen_a = [0u8; DISPLAY_WIDTH];
        if let Some(mut renderer) = self.renderer.take() {
            renderer.draw_line(self, y, &mut line, &mut screen_a);
            self.renderer = Some(renderer);
        }
        self.display[y * DISPLAY_WIDTH..(y + 1) * DISPLAY_WIDTH].copy_from_slice(&line);

        if self.capture_enable && y == usize::from(self.regs.capture_scanline) {
            render::capture_line(&mut self.capture, self.regs.capture_format, &line, &screen_a);
            self.capture_enable = false;
        }
    }

    /// Paint backdrop A over a whole row outside the active area.
    fn draw_border_scanline(&mut self, y: usize) {
        let color = self.regs.backdrops[0] | 0x8000;
        self.display[y * DISPLAY_WIDTH..(y + 1) * DISPLAY_WIDTH].fill(color);
    }
}

impl Default for Vdp {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_read(region: VdpRegion, addr: u32) -> u16 {
    log(LogCategory::Stubs, LogLevel::Warn, || {
        format!("VDP: unknown {:?} read16 {:03X}", region, addr & 0xFFF)
    });
    0
}

fn unknown_write(region: VdpRegion, addr: u32, value: u16) {
    log(LogCategory::Stubs, LogLevel::Warn, || {
        format!("VDP: unknown {:?} write16 {:03X}: {:04X}", region, addr & 0xFFF, value)
    });
}

fn capture_write(addr: u32, value: u32) {
    log(LogCategory::VDP, LogLevel::Warn, || {
        format!("VDP: ignored write to capture buffer {:08X}: {:X}", addr, value)
    });
}

/// Scheduler event: HSYNC begins on the current line.
pub fn hsync_event(console: &mut Console, _param: u64, _cycles_late: i64) {
    start_hsync(console.bus_mut());
}

/// Scheduler event: the current line ends.
pub fn vcount_event(console: &mut Console, _param: u64, cycles_late: i64) {
    inc_vcount(console.bus_mut(), cycles_late);
}

fn start_hsync(bus: &mut LoopyBus) {
    let vdp = &mut bus.vdp;
    vdp.hcount |= HCOUNT_HSYNC;

    // HCMP is not modelled; IRQ0 is taken to coincide with HSYNC
    let regs = &vdp.regs;
    let irq0 = regs.irq0_enabled() && (!regs.use_vcmp() || vdp.vcount == regs.irq0_vcmp);
    let irq1 = regs.irq1_enable() && regs.irq1_source() == 1 && vdp.vcount < vdp.visible_scanlines;

    if irq0 {
        bus.ocpm.intc.raise(Source::Irq(0));
    }
    if irq1 {
        bus.ocpm.intc.raise(Source::Irq(1));
    }
}

/// Enter VSYNC. The VSYNC lines count up from a negative VCOUNT.
fn vsync_start(bus: &mut LoopyBus) {
    let vdp = &mut bus.vdp;
    log(LogCategory::VDP, LogLevel::Trace, || "VDP: VSYNC start".to_string());
    vdp.vcount = (vdp.vcount.wrapping_sub(LINES_PER_FRAME as u16)) & 0x1FF;
    vdp.frame_ended = true;
    vdp.frame_count += 1;

    let nmi = vdp.regs.nmi_enable();
    let irq1 = vdp.regs.irq1_enable() && vdp.regs.irq1_source() == 0;
    if nmi {
        bus.ocpm.intc.raise(Source::Nmi);
    }
    if irq1 {
        bus.ocpm.intc.raise(Source::Irq(1));
    }
}

/// Finish the current line and arm the next one.
pub fn inc_vcount(bus: &mut LoopyBus, cycles_late: i64) {
    let vdp = &mut bus.vdp;
    vdp.hcount &= !HCOUNT_HSYNC;
    if vdp.vcount < vdp.visible_scanlines {
        let y = usize::from(vdp.vcount);
        vdp.draw_scanline(y);
    }

    vdp.vcount += 1;
    if vdp.vcount == vdp.visible_scanlines {
        vsync_start(bus);
    }

    let vdp = &mut bus.vdp;
    if vdp.vcount == VSYNC_END {
        log(LogCategory::VDP, LogLevel::Trace, || "VDP: VSYNC end".to_string());
        vdp.vcount = 0;
        if !vdp.regs.extra_scanlines() {
            vdp.draw_border_scanline(usize::from(VISIBLE_LINES));
        }
    }

    let timer = bus.cpu_timer;
    let line = bus.sched.convert(timer, CYCLES_PER_LINE - cycles_late);
    bus.sched.add_event(bus.funcs.vcount, line, 0, timer);
    let hsync = bus.sched.convert(timer, CYCLES_UNTIL_HSYNC - cycles_late);
    bus.sched.add_event(bus.funcs.hsync, hsync, 0, timer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::make_console;
    use emu_core::cpu_sh2::MemorySh2;
    use emu_core::scheduler::process_slice;

    fn run_cycles(console: &mut Console, cycles: i64) {
        let timer = console.bus().cpu_timer;
        let units = console.bus().sched.convert(timer, cycles);
        process_slice(console, timer, units);
    }

    fn regs() -> (Vdp, LoopyIo) {
        (Vdp::new(), LoopyIo::new())
    }

    #[test]
    fn test_timing_constants() {
        assert_eq!(CYCLES_PER_LINE, 1013);
        assert_eq!(CYCLES_UNTIL_HSYNC, 759);
    }

    #[test]
    fn test_oam_starts_hidden() {
        let (mut vdp, _) = regs();
        assert_eq!(vdp.read32(VdpRegion::Oam, OAM_START), 0x200);
        assert_eq!(vdp.read32(VdpRegion::Oam, OAM_START + 0x1FC), 0x200);
    }

    #[test]
    fn test_mode_selects_visible_lines_and_scan() {
        let (mut vdp, mut io) = regs();
        io.set_controller_plugged(true, false);
        io.set_pad_buttons(crate::io::pad::A);
        vdp.write16(&mut io, VdpRegion::Ctrl, CTRL_REG_START, 0x0012);
        assert_eq!(vdp.visible_scanlines(), 0xF0);
        assert_eq!(io.read16(0x010), 0x0005);
        vdp.write16(&mut io, VdpRegion::Ctrl, CTRL_REG_START, 0);
        assert_eq!(vdp.visible_scanlines(), 0xE0);
        assert_eq!(io.read16(0x010), 0);
    }

    #[test]
    fn test_bitmap_register_decode() {
        let (mut vdp, mut io) = regs();
        vdp.write16(&mut io, VdpRegion::Bitmap, BITMAP_REG_START + 0x002, 0x3FF);
        vdp.write16(&mut io, VdpRegion::Bitmap, BITMAP_REG_START + 0x026, 0x1280);
        assert_eq!(vdp.regs().bitmap[1].scrollx, 0x1FF);
        assert_eq!(vdp.regs().bitmap[3].width, 0x80);
        assert_eq!(vdp.regs().bitmap[3].clipx, 0x12);
        assert_eq!(vdp.read16(VdpRegion::Bitmap, BITMAP_REG_START + 0x026), 0x1280);
    }

    #[test]
    fn test_backdrops_are_reversed() {
        let (mut vdp, mut io) = regs();
        vdp.write16(&mut io, VdpRegion::Display, DISPLAY_REG_START + 0x008, 0x001F);
        vdp.write16(&mut io, VdpRegion::Display, DISPLAY_REG_START + 0x006, 0x7C00);
        assert_eq!(vdp.regs().backdrops, [0x001F, 0x7C00]);
    }

    #[test]
    fn test_byte_write_merges_halfword() {
        let (mut vdp, mut io) = regs();
        vdp.write16(&mut io, VdpRegion::BgObj, BGOBJ_REG_START + 0x002, 0x0123);
        vdp.write8(&mut io, VdpRegion::BgObj, BGOBJ_REG_START + 0x003, 0x45);
        assert_eq!(vdp.regs().bg_scrollx[0], 0x0145);
    }

    #[test]
    fn test_dma_fill_row() {
        let (mut vdp, mut io) = regs();
        vdp.bitmap_vram[2 * DISPLAY_WIDTH..3 * DISPLAY_WIDTH].fill(0xAA);
        vdp.write16(&mut io, VdpRegion::DmaCtrl, DMA_CTRL_START + 2, 0x0F);
        vdp.write16(&mut io, VdpRegion::DmaCtrl, DMA_CTRL_START + 4, 0x35);
        vdp.write16(&mut io, VdpRegion::Dma, DMA_START + 4, 0);
        assert!(vdp.bitmap_vram()[2 * DISPLAY_WIDTH..3 * DISPLAY_WIDTH]
            .iter()
            .all(|&b| b == 0xA5));
        assert_eq!(vdp.bitmap_vram()[DISPLAY_WIDTH], 0);
    }

    #[test]
    fn test_capture_buffer_ignores_writes() {
        let (mut vdp, mut io) = regs();
        vdp.write16(&mut io, VdpRegion::Capture, CAPTURE_START, 0x1234);
        assert_eq!(vdp.read16(VdpRegion::Capture, CAPTURE_START), 0);
    }

    #[test]
    fn test_frame_is_263_lines() {
        let mut console = make_console();
        let start = console.bus().vdp.frame_count();
        console.bus_mut().vdp.start_frame();
        run_cycles(&mut console, CYCLES_PER_LINE * LINES_PER_FRAME);
        assert_eq!(console.bus().vdp.frame_count(), start + 1);
        assert!(console.bus().vdp.frame_ended());
        run_cycles(&mut console, CYCLES_PER_LINE * LINES_PER_FRAME);
        assert_eq!(console.bus().vdp.frame_count(), start + 2);
    }

    #[test]
    fn test_vcount_wraps_through_vsync() {
        let mut console = make_console();
        // Kickstart already advanced to line 1
        assert_eq!(console.bus().vdp.vcount(), 1);
        run_cycles(&mut console, CYCLES_PER_LINE * 0xDF);
        assert_eq!(console.bus().vdp.vcount(), (0xE0u16.wrapping_sub(263)) & 0x1FF);
        run_cycles(&mut console, CYCLES_PER_LINE * 39);
        assert_eq!(console.bus().vdp.vcount(), 0);
    }

    #[test]
    fn test_hsync_flag_and_irq1() {
        let mut console = make_console();
        let bus = console.bus_mut();
        bus.ocpm.intc.write16(0xF84, 0x0700); // IRQ1 priority 7
        bus.write_halfword(CTRL_REG_START + 0x008, 0x0003); // IRQ1 on HSYNC
        run_cycles(&mut console, CYCLES_UNTIL_HSYNC);
        let bus = console.bus_mut();
        assert_ne!(bus.read_halfword(CTRL_REG_START + 0x002) & 0x100, 0);
        let req = bus.ocpm.intc.take_above(None).unwrap();
        assert_eq!(req.vector, 65);
        assert_eq!(req.priority, 7);

        // The flag drops when the line ends
        run_cycles(&mut console, CYCLES_PER_LINE - CYCLES_UNTIL_HSYNC);
        assert_eq!(console.bus_mut().read_halfword(CTRL_REG_START + 0x002) & 0x100, 0);
    }

    #[test]
    fn test_irq0_vcount_compare() {
        let mut console = make_console();
        let bus = console.bus_mut();
        bus.ocpm.intc.write16(0xF84, 0x5000); // IRQ0 priority 5
        bus.write_halfword(IRQ_REG_START + 0x004, 2);
        bus.write_halfword(IRQ_REG_START, 0x00A2);
        run_cycles(&mut console, CYCLES_UNTIL_HSYNC);
        assert!(!console.bus().ocpm.intc.has_pending());
        run_cycles(&mut console, CYCLES_PER_LINE);
        let req = console.bus_mut().ocpm.intc.take_above(None).unwrap();
        assert_eq!(req.vector, 64);
    }

    #[test]
    fn test_nmi_on_vsync() {
        let mut console = make_console();
        console.bus_mut().write_halfword(IRQ_REG_START, 0x0004);
        run_cycles(&mut console, CYCLES_PER_LINE * 0xDF - 1);
        assert!(!console.bus().ocpm.intc.has_pending());
        assert_eq!(console.bus().vdp.frame_count(), 0);
        run_cycles(&mut console, 1);
        assert_eq!(console.bus().vdp.frame_count(), 1);
        let req = console.bus_mut().ocpm.intc.take_above(None).unwrap();
        assert_eq!(req.vector, 11);
    }
}
