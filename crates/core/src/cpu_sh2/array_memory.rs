use super::MemorySh2;

/// Flat big-endian memory for tests and benchmarks
pub struct ArrayMemory {
    data: Vec<u8>,
    /// Cycle cost reported for every access
    pub wait: u32,
}

impl ArrayMemory {
    pub fn new() -> Self {
        Self {
            data: vec![0; 0x10_0000],
            wait: 1,
        }
    }

    fn index(&self, addr: u32) -> usize {
        addr as usize % self.data.len()
    }

    /// Copy `bytes` to `addr`
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            let idx = self.index(addr.wrapping_add(i as u32));
            self.data[idx] = *b;
        }
    }

    /// Store a sequence of opcodes starting at `addr`
    pub fn load_program(&mut self, addr: u32, program: &[u16]) {
        for (i, op) in program.iter().enumerate() {
            self.write_halfword(addr.wrapping_add(2 * i as u32), *op);
        }
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySh2 for ArrayMemory {
    fn read_byte(&mut self, addr: u32) -> u8 {
        self.data[self.index(addr)]
    }

    fn read_halfword(&mut self, addr: u32) -> u16 {
        (u16::from(self.read_byte(addr)) << 8) | u16::from(self.read_byte(addr.wrapping_add(1)))
    }

    fn read_word(&mut self, addr: u32) -> u32 {
        (u32::from(self.read_halfword(addr)) << 16)
            | u32::from(self.read_halfword(addr.wrapping_add(2)))
    }

    fn write_byte(&mut self, addr: u32, val: u8) {
        let idx = self.index(addr);
        self.data[idx] = val;
    }

    fn write_halfword(&mut self, addr: u32, val: u16) {
        self.write_byte(addr, (val >> 8) as u8);
        self.write_byte(addr.wrapping_add(1), val as u8);
    }

    fn write_word(&mut self, addr: u32, val: u32) {
        self.write_halfword(addr, (val >> 16) as u16);
        self.write_halfword(addr.wrapping_add(2), val as u16);
    }

    fn read_cycles(&self, _addr: u32) -> u32 {
        self.wait
    }
}
