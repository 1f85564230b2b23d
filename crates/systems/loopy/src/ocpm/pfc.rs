//! Pin function controller: GPIO ports A and B
//!
//! - 0xFC0: PADR, 0xFC2: PBDR - data
//! - 0xFC4: PAIOR, 0xFC6: PBIOR - direction (1 = output)
//! - 0xFC8/0xFCA: PACR1/2, 0xFCC/0xFCE: PBCR1/2 - pin function

use emu_core::logging::{log, LogCategory, LogLevel};

pub const PFC_START: u32 = 0xFC0;
pub const PFC_END: u32 = 0xFF8;

/// PA8 is high while a cartridge is inserted
const PA8_CART_PRESENT: u16 = 1 << 8;
/// PB1 and PB3 are pulled high on retail cartridges
const PB_PULLUPS: u16 = (1 << 3) | (1 << 1);

const PORT_NAMES: [char; 2] = ['A', 'B'];

pub struct Pfc {
    output: [u16; 2],
    direction: [u16; 2],
    control: [[u16; 2]; 2],
    cart_present: bool,
}

impl Pfc {
    pub fn new() -> Self {
        Self {
            output: [0; 2],
            direction: [0; 2],
            control: [[0; 2]; 2],
            cart_present: true,
        }
    }

    pub fn set_cart_present(&mut self, present: bool) {
        self.cart_present = present;
    }

    fn inputs(&self, port: usize) -> u16 {
        match port {
            0 if self.cart_present => PA8_CART_PRESENT,
            0 => 0,
            _ => PB_PULLUPS,
        }
    }

    pub fn read16(&self, addr: u32) -> u16 {
        let addr = addr & 0x3F;
        match addr {
            0x00 | 0x02 => {
                let port = ((addr >> 1) & 1) as usize;
                let dir = self.direction[port];
                (self.output[port] & dir) | (self.inputs(port) & !dir)
            }
            0x04 | 0x06 => self.direction[((addr >> 1) & 1) as usize],
            0x08..=0x0E => self.control[((addr >> 2) & 1) as usize][((addr >> 1) & 1) as usize],
            _ => {
                log(LogCategory::Bus, LogLevel::Warn, || {
                    format!("PFC: unmapped read {:02X}", addr)
                });
                0
            }
        }
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        let addr = addr & 0x3F;
        match addr {
            0x00 | 0x02 => {
                let port = ((addr >> 1) & 1) as usize;
                self.output[port] = value;
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("PFC: write P{}DR: {:04X}", PORT_NAMES[port], value)
                });
            }
            0x04 | 0x06 => {
                let port = ((addr >> 1) & 1) as usize;
                self.direction[port] = value;
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("PFC: write P{}IOR: {:04X}", PORT_NAMES[port], value)
                });
            }
            0x08..=0x0E => {
                let port = ((addr >> 2) & 1) as usize;
                let reg = ((addr >> 1) & 1) as usize;
                self.control[port][reg] = value;
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("PFC: write P{}CR{}: {:04X}", PORT_NAMES[port], reg + 1, value)
                });
            }
            _ => log(LogCategory::Bus, LogLevel::Warn, || {
                format!("PFC: unmapped write {:02X}: {:04X}", addr, value)
            }),
        }
    }
}

impl Default for Pfc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_when_all_pins_are_inputs() {
        let pfc = Pfc::new();
        assert_eq!(pfc.read16(0xFC0), 0x0100);
        assert_eq!(pfc.read16(0xFC2), 0x000A);
    }

    #[test]
    fn test_outputs_mix_with_inputs() {
        let mut pfc = Pfc::new();
        pfc.write16(0xFC4, 0x00FF);
        pfc.write16(0xFC0, 0xFFFF);
        assert_eq!(pfc.read16(0xFC0), 0x01FF);
        assert_eq!(pfc.read16(0xFC4), 0x00FF);

        pfc.set_cart_present(false);
        assert_eq!(pfc.read16(0xFC0), 0x00FF);
    }

    #[test]
    fn test_control_registers_are_stored() {
        let mut pfc = Pfc::new();
        pfc.write16(0xFCA, 0x1234);
        pfc.write16(0xFCC, 0x5678);
        assert_eq!(pfc.read16(0xFCA), 0x1234);
        assert_eq!(pfc.read16(0xFCC), 0x5678);
        assert_eq!(pfc.read16(0xFC8), 0);
    }
}
