//! High-level emulation of the BIOS printer calls
//!
//! The seal printer is driven by long BIOS routines that step the motor
//! and stream pixels to the thermal head. Two CPU hooks replace them: one
//! skips the slow motor homing at boot, the other captures the picture a
//! game asks to print and returns a status code straight to the caller.

use emu_core::cpu_sh2::{CpuSh2, MemorySh2};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::Serialize;

use crate::bus::LoopyBus;

pub const ADDR_MOTOR_MOVE: u32 = 0x0000_1B76;
pub const ADDR_PRINT: u32 = 0x0000_06D4;

/// Exit of the motor-move routine
const MOTOR_MOVE_EXIT: u32 = 0x0000_15FA;
/// Exit of the print routine, where R0 is returned to the caller
const PRINT_EXIT: u32 = 0x0000_0FD2;

pub const PRINT_STATUS_SUCCESS: u32 = 0;
pub const PRINT_STATUS_GENERAL_FAILURE: u32 = 1;
pub const PRINT_STATUS_NO_SEAL_CART: u32 = 2;
pub const PRINT_STATUS_CANCELLED: u32 = 3;
pub const PRINT_STATUS_PAPER_JAM: u32 = 4;
pub const PRINT_STATUS_OVERHEAT: u32 = 5;

const FORMAT_16BPP: u32 = 1;
const FORMAT_8BPP: u32 = 3;
const MAX_HEIGHT: u32 = 224;
const MAX_HEIGHT_DOUBLED: u32 = 112;

/// A picture handed to the printer, already doubled if requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintJob {
    pub width: u32,
    pub height: u32,
    /// 15-bit colour, row major
    pub pixels: Vec<u16>,
}

#[derive(Debug, Default)]
pub struct Printer {
    enabled: bool,
    pub(crate) jobs: Vec<PrintJob>,
}

impl Printer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            jobs: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn take_jobs(&mut self) -> Vec<PrintJob> {
        std::mem::take(&mut self.jobs)
    }
}

pub fn install_hooks(cpu: &mut CpuSh2<LoopyBus>, skip_motor_move: bool) {
    if skip_motor_move {
        cpu.add_hook(ADDR_MOTOR_MOVE, motor_move_hook);
    }
    cpu.add_hook(ADDR_PRINT, print_hook);
    log(LogCategory::Printer, LogLevel::Debug, || {
        format!(
            "Printer: hooks installed (motor skip: {})",
            skip_motor_move
        )
    });
}

fn motor_move_hook(cpu: &mut CpuSh2<LoopyBus>, _addr: u32) -> bool {
    log(LogCategory::Printer, LogLevel::Info, || {
        "Printer: skipping motor move".to_string()
    });
    cpu.jump_to(MOTOR_MOVE_EXIT);
    true
}

fn double_pixels(data: &[u16], width: u32, height: u32) -> Vec<u16> {
    let (width, height) = (width as usize, height as usize);
    let mut doubled = Vec::with_capacity(width * height * 4);
    for y in 0..height * 2 {
        for x in 0..width * 2 {
            doubled.push(data[(y / 2) * width + x / 2]);
        }
    }
    doubled
}

fn read_job(
    mem: &mut LoopyBus,
    data: u32,
    palette: u32,
    width: u32,
    height: u32,
    format: u32,
) -> Vec<u16> {
    let count = width * height;
    if format == FORMAT_8BPP {
        let colors: Vec<u16> = (0..256u32)
            .map(|i| mem.read_halfword(palette.wrapping_add(i * 2)))
            .collect();
        (0..count)
            .map(|i| colors[usize::from(mem.read_byte(data.wrapping_add(i)))])
            .collect()
    } else {
        (0..count)
            .map(|i| mem.read_halfword(data.wrapping_add(i * 2)))
            .collect()
    }
}

fn print_hook(cpu: &mut CpuSh2<LoopyBus>, _addr: u32) -> bool {
    let sp = cpu.gpr[15];
    let (r4, r5, r6) = (cpu.gpr[4], cpu.gpr[5], cpu.gpr[6]);
    let mem = &mut cpu.memory;
    let data = mem.read_word(r4);
    let palette = mem.read_word(r5);
    let dims = mem.read_word(r6);
    let format_ptr = mem.read_word(sp.wrapping_add(4));
    let format = u32::from(mem.read_byte(format_ptr));
    log(LogCategory::Printer, LogLevel::Debug, || {
        format!(
            "Printer: data={:08X} palette={:08X} dims={:08X} format={:02X}",
            data, palette, dims, format
        )
    });

    if !mem.printer.is_enabled() {
        cpu.gpr[0] = PRINT_STATUS_NO_SEAL_CART;
        return true;
    }

    let pixel_double = format >> 4;
    let pixel_format = format & 0xF;
    let width = dims & 0xFFFF;
    let max_height = if pixel_double == 1 {
        MAX_HEIGHT_DOUBLED
    } else {
        MAX_HEIGHT
    };
    let height = (dims >> 16).min(max_height);

    let valid = pixel_double <= 1 && (pixel_format == FORMAT_16BPP || pixel_format == FORMAT_8BPP);
    let status = if valid {
        log(LogCategory::Printer, LogLevel::Info, || {
            format!(
                "Printer: {}x{} format {} doubled {}",
                width, height, pixel_format, pixel_double
            )
        });
        let pixels = read_job(mem, data, palette, width, height, pixel_format);
        let job = if pixel_double == 1 {
            PrintJob {
                width: width * 2,
                height: height * 2,
                pixels: double_pixels(&pixels, width, height),
            }
        } else {
            PrintJob {
                width,
                height,
                pixels,
            }
        };
        mem.printer.jobs.push(job);
        PRINT_STATUS_SUCCESS
    } else {
        log(LogCategory::Printer, LogLevel::Warn, || {
            format!("Printer: unknown mode {:02X}, aborting", format)
        });
        PRINT_STATUS_GENERAL_FAILURE
    };

    cpu.gpr[0] = status;
    cpu.jump_to(PRINT_EXIT);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::make_console;
    use crate::console::Console;

    const PARAMS: u32 = 0x0100_0000;
    const PIXELS: u32 = 0x0100_1000;
    const PALETTE: u32 = 0x0100_2000;
    const STACK: u32 = 0x0100_3000;

    /// Lay out the BIOS call arguments and stop the CPU on the hook.
    fn setup_call(console: &mut Console, width: u32, height: u32, format: u8) {
        let cpu = &mut console.cpu;
        let mem = &mut cpu.memory;
        mem.write_word(PARAMS, PIXELS);
        mem.write_word(PARAMS + 4, PALETTE);
        mem.write_word(PARAMS + 8, (height << 16) | width);
        mem.write_word(STACK + 4, PARAMS + 0x10);
        mem.write_byte(PARAMS + 0x10, format);
        cpu.gpr[4] = PARAMS;
        cpu.gpr[5] = PARAMS + 4;
        cpu.gpr[6] = PARAMS + 8;
        cpu.gpr[15] = STACK;
        cpu.gpr[0] = 0xDEAD;
    }

    fn call_hook(console: &mut Console) -> bool {
        print_hook(&mut console.cpu, ADDR_PRINT)
    }

    #[test]
    fn test_16bpp_job() {
        let mut console = make_console();
        setup_call(&mut console, 2, 2, 0x01);
        for (i, p) in [0x7FFFu16, 0x001F, 0x03E0, 0x7C00].iter().enumerate() {
            console.cpu.memory.write_halfword(PIXELS + i as u32 * 2, *p);
        }
        assert!(!call_hook(&mut console));
        assert_eq!(console.cpu.gpr[0], PRINT_STATUS_SUCCESS);
        assert_eq!(console.cpu.pc, PRINT_EXIT);
        assert!(!console.cpu.pipeline_valid);

        let jobs = console.bus_mut().printer.take_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].width, 2);
        assert_eq!(jobs[0].pixels, vec![0x7FFF, 0x001F, 0x03E0, 0x7C00]);
    }

    #[test]
    fn test_8bpp_doubled_job() {
        let mut console = make_console();
        setup_call(&mut console, 2, 1, 0x13);
        let mem = &mut console.cpu.memory;
        mem.write_byte(PIXELS, 1);
        mem.write_byte(PIXELS + 1, 2);
        mem.write_halfword(PALETTE + 2, 0x1111);
        mem.write_halfword(PALETTE + 4, 0x2222);
        call_hook(&mut console);

        let jobs = console.bus_mut().printer.take_jobs();
        assert_eq!((jobs[0].width, jobs[0].height), (4, 2));
        assert_eq!(
            jobs[0].pixels,
            vec![0x1111, 0x1111, 0x2222, 0x2222, 0x1111, 0x1111, 0x2222, 0x2222]
        );
    }

    #[test]
    fn test_height_is_limited() {
        let mut console = make_console();
        setup_call(&mut console, 1, 300, 0x11);
        call_hook(&mut console);
        let jobs = console.bus_mut().printer.take_jobs();
        assert_eq!(jobs[0].height, MAX_HEIGHT_DOUBLED * 2);
    }

    #[test]
    fn test_unknown_format_fails() {
        let mut console = make_console();
        setup_call(&mut console, 4, 4, 0x02);
        assert!(!call_hook(&mut console));
        assert_eq!(console.cpu.gpr[0], PRINT_STATUS_GENERAL_FAILURE);
        assert_eq!(console.cpu.pc, PRINT_EXIT);
        assert!(console.bus_mut().printer.take_jobs().is_empty());
    }

    #[test]
    fn test_disabled_printer_reports_no_seal() {
        let mut console = make_console();
        console.bus_mut().printer = Printer::new(false);
        setup_call(&mut console, 4, 4, 0x01);
        let pc = console.cpu.pc;
        assert!(call_hook(&mut console));
        assert_eq!(console.cpu.gpr[0], PRINT_STATUS_NO_SEAL_CART);
        assert_eq!(console.cpu.pc, pc);
    }

    #[test]
    fn test_motor_move_skips_to_exit() {
        let mut console = make_console();
        assert!(motor_move_hook(&mut console.cpu, ADDR_MOTOR_MOVE));
        assert_eq!(console.cpu.pc, MOTOR_MOVE_EXIT);
    }

    #[test]
    fn test_hooks_installed() {
        let mut console = make_console();
        console.cpu.remove_hook(ADDR_MOTOR_MOVE);
        console.cpu.remove_hook(ADDR_PRINT);
        install_hooks(&mut console.cpu, false);
        assert!(console.cpu.has_hook(ADDR_PRINT));
        assert!(!console.cpu.has_hook(ADDR_MOTOR_MOVE));
    }
}
