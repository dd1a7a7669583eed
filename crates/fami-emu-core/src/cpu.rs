use log::error;

use crate::error::ExecutionFault;

#[cfg(feature = "cpu-trace")]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "cpu-trace"))]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {};
}

// Status register bits
const FLAG_C: u8 = 0x01; // Carry
const FLAG_Z: u8 = 0x02; // Zero
const FLAG_I: u8 = 0x04; // Interrupt disable
const FLAG_D: u8 = 0x08; // Decimal (stored, no effect on arithmetic)
const FLAG_B: u8 = 0x10; // Break, only exists on the stack copy
const FLAG_R: u8 = 0x20; // Reserved, always reads 1
const FLAG_V: u8 = 0x40; // Overflow
const FLAG_N: u8 = 0x80; // Negative

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

const STACK_PAGE: u16 = 0x0100;
const INTERRUPT_CYCLES: i64 = 7;

/// Z and N flags for every 8-bit result.
const ZN_TABLE: [u8; 256] = {
    let mut t = [0u8; 256];
    t[0] = FLAG_Z;
    let mut i = 0x80;
    while i < 256 {
        t[i] = FLAG_N;
        i += 1;
    }
    t
};

/// Sticky interrupt-source bitmask shared by every chip that can interrupt
/// the CPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interrupts(u8);

impl Interrupts {
    pub const NMI: u8 = 0x01;
    pub const IRQ: u8 = 0x02;
    pub const FRAME: u8 = 0x04;
    pub const DMC: u8 = 0x08;
    pub const MAPPER: u8 = 0x10;
    pub const MAPPER2: u8 = 0x20;
    pub const TRIGGER: u8 = 0x40;
    pub const TRIGGER2: u8 = 0x80;

    /// Sources that assert the IRQ line.
    const IRQ_LINE: u8 = 0xFC;

    #[inline]
    pub fn raise(&mut self, bits: u8) {
        self.0 |= bits;
    }

    #[inline]
    pub fn clear(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    #[inline]
    pub fn is_set(&self, bits: u8) -> bool {
        self.0 & bits != 0
    }

    #[inline]
    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// CPU-side state that the rest of the machine also reads or writes: the
/// interrupt lines, the DMA stall debt and the elapsed cycle count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signals {
    pub intr: Interrupts,
    /// CPU cycles still owed to DMA; paid before the next instruction.
    pub dma_cycles: i64,
    /// CPU cycles elapsed since reset, as of the start of the current
    /// instruction.
    pub cycles: i64,
}

/// What the CPU sees of the rest of the machine.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, data: u8);
    /// Instruction-stream read. Never triggers I/O side effects.
    fn fetch(&mut self, addr: u16) -> u8;
    fn signals(&mut self) -> &mut Signals;
    /// Cycles just spent, forwarded to the cartridge.
    fn clock(&mut self, cycles: i64);
}

/// Register snapshot for tracing and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub s: u8,
    pub pc: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Imm,
    Zp,
    ZpX,
    ZpY,
    Abs,
    AbsX,
    AbsY,
    IndX,
    IndY,
}

impl Mode {
    /// Base cycles of a load-type instruction; indexed modes may add one.
    const fn read_cycles(self) -> i64 {
        match self {
            Mode::Imm => 2,
            Mode::Zp => 3,
            Mode::ZpX | Mode::ZpY | Mode::Abs | Mode::AbsX | Mode::AbsY => 4,
            Mode::IndX => 6,
            Mode::IndY => 5,
        }
    }

    const fn write_cycles(self) -> i64 {
        match self {
            Mode::Imm => 2,
            Mode::Zp => 3,
            Mode::ZpX | Mode::ZpY | Mode::Abs => 4,
            Mode::AbsX | Mode::AbsY => 5,
            Mode::IndX | Mode::IndY => 6,
        }
    }

    const fn rmw_cycles(self) -> i64 {
        match self {
            Mode::Imm => 2,
            Mode::Zp => 5,
            Mode::ZpX | Mode::ZpY | Mode::Abs => 6,
            Mode::AbsX | Mode::AbsY => 7,
            Mode::IndX | Mode::IndY => 8,
        }
    }
}

use Mode::*;

#[inline]
fn crosses_page(base: u16, addr: u16) -> bool {
    base & 0xFF00 != addr & 0xFF00
}

pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub s: u8,
    pub pc: u16,
    jam: Option<ExecutionFault>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_Z | FLAG_R,
            s: 0xFF,
            pc: 0,
            jam: None,
        }
    }

    /// Load PC from the reset vector and clear all CPU-side signals.
    pub fn reset<B: CpuBus>(&mut self, bus: &mut B) {
        *bus.signals() = Signals::default();
        *self = Self::new();
        self.pc = self.read_vector(bus, RESET_VECTOR);
    }

    pub fn registers(&self) -> Registers {
        Registers {
            a: self.a,
            x: self.x,
            y: self.y,
            p: self.p,
            s: self.s,
            pc: self.pc,
        }
    }

    /// The fault that halted this CPU, if any. Cleared by [`Cpu::reset`].
    pub fn jammed(&self) -> Option<ExecutionFault> {
        self.jam
    }

    /// Execute whole instructions until at least `request` cycles have
    /// elapsed. Returns the cycles actually spent.
    pub fn run<B: CpuBus>(&mut self, bus: &mut B, mut request: i64) -> Result<i64, ExecutionFault> {
        if let Some(fault) = self.jam {
            return Err(fault);
        }
        let start = bus.signals().cycles;
        while request > 0 {
            let mut exec = 0;
            let sig = bus.signals();
            if sig.dma_cycles != 0 {
                if sig.dma_cycles >= request {
                    sig.dma_cycles -= request;
                    sig.cycles += request;
                    bus.clock(request);
                    return Ok(bus.signals().cycles - start);
                }
                exec += sig.dma_cycles;
                sig.dma_cycles = 0;
            }

            let pc = self.pc;
            let opcode = self.fetch8(bus);

            let sig = bus.signals();
            let mut vector = None;
            if sig.intr.is_set(Interrupts::NMI) {
                sig.intr.clear(Interrupts::NMI);
                vector = Some(NMI_VECTOR);
            } else if sig.intr.is_set(Interrupts::IRQ_LINE) {
                if self.p & FLAG_I == 0 && opcode != 0x40 {
                    vector = Some(IRQ_VECTOR);
                    sig.intr.clear(Interrupts::TRIGGER);
                }
                sig.intr.clear(Interrupts::TRIGGER2);
            }

            cpu_trace!(
                "{:04X}  {:02X}  A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
                pc,
                opcode,
                self.a,
                self.x,
                self.y,
                self.p,
                self.s,
                bus.signals().cycles + exec
            );

            match self.execute(bus, opcode) {
                Some(cycles) => exec += cycles,
                None => {
                    self.pc = pc;
                    let fault = ExecutionFault::Jammed { opcode, pc };
                    error!("{fault}");
                    self.jam = Some(fault);
                    bus.signals().cycles += exec;
                    bus.clock(exec);
                    return Err(fault);
                }
            }

            if let Some(vector) = vector {
                self.interrupt(bus, vector, false);
                exec += INTERRUPT_CYCLES;
            }

            request -= exec;
            bus.signals().cycles += exec;
            bus.clock(exec);
        }
        Ok(bus.signals().cycles - start)
    }

    #[inline(always)]
    fn fetch8<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        let v = bus.fetch(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    #[inline(always)]
    fn fetch16<B: CpuBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    fn read_vector<B: CpuBus>(&self, bus: &mut B, vector: u16) -> u16 {
        let lo = bus.fetch(vector) as u16;
        let hi = bus.fetch(vector.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// 16-bit pointer stored in zero page; the high byte wraps within the
    /// page.
    fn read_zp_word<B: CpuBus>(&self, bus: &mut B, ptr: u8) -> u16 {
        let lo = bus.read(ptr as u16) as u16;
        let hi = bus.read(ptr.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    fn push<B: CpuBus>(&mut self, bus: &mut B, v: u8) {
        bus.write(STACK_PAGE | self.s as u16, v);
        self.s = self.s.wrapping_sub(1);
    }

    fn pull<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        self.s = self.s.wrapping_add(1);
        bus.read(STACK_PAGE | self.s as u16)
    }

    fn push16<B: CpuBus>(&mut self, bus: &mut B, v: u16) {
        self.push(bus, (v >> 8) as u8);
        self.push(bus, v as u8);
    }

    fn pull16<B: CpuBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.pull(bus) as u16;
        let hi = self.pull(bus) as u16;
        (hi << 8) | lo
    }

    fn interrupt<B: CpuBus>(&mut self, bus: &mut B, vector: u16, brk: bool) {
        self.push16(bus, self.pc);
        let p = if brk { self.p | FLAG_B } else { self.p & !FLAG_B };
        self.push(bus, p | FLAG_R);
        self.p |= FLAG_I;
        self.pc = self.read_vector(bus, vector);
    }

    /// Effective address for `mode` and whether indexing crossed a page.
    fn address<B: CpuBus>(&mut self, bus: &mut B, mode: Mode) -> (u16, bool) {
        match mode {
            Imm => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (addr, false)
            }
            Zp => (self.fetch8(bus) as u16, false),
            ZpX => (self.fetch8(bus).wrapping_add(self.x) as u16, false),
            ZpY => (self.fetch8(bus).wrapping_add(self.y) as u16, false),
            Abs => (self.fetch16(bus), false),
            AbsX => {
                let base = self.fetch16(bus);
                let addr = base.wrapping_add(self.x as u16);
                (addr, crosses_page(base, addr))
            }
            AbsY => {
                let base = self.fetch16(bus);
                let addr = base.wrapping_add(self.y as u16);
                (addr, crosses_page(base, addr))
            }
            IndX => {
                let ptr = self.fetch8(bus).wrapping_add(self.x);
                (self.read_zp_word(bus, ptr), false)
            }
            IndY => {
                let ptr = self.fetch8(bus);
                let base = self.read_zp_word(bus, ptr);
                let addr = base.wrapping_add(self.y as u16);
                (addr, crosses_page(base, addr))
            }
        }
    }

    #[inline]
    fn operand<B: CpuBus>(&mut self, bus: &mut B, mode: Mode) -> (u8, i64) {
        let (addr, crossed) = self.address(bus, mode);
        let v = if mode == Imm {
            bus.fetch(addr)
        } else {
            bus.read(addr)
        };
        (v, mode.read_cycles() + crossed as i64)
    }

    fn load<B: CpuBus>(&mut self, bus: &mut B, mode: Mode, op: fn(&mut Self, u8)) -> i64 {
        let (v, cycles) = self.operand(bus, mode);
        op(self, v);
        cycles
    }

    fn store<B: CpuBus>(&mut self, bus: &mut B, mode: Mode, v: u8) -> i64 {
        let (addr, _) = self.address(bus, mode);
        bus.write(addr, v);
        mode.write_cycles()
    }

    fn modify<B: CpuBus>(&mut self, bus: &mut B, mode: Mode, op: fn(&mut Self, u8) -> u8) -> i64 {
        let (addr, _) = self.address(bus, mode);
        let v = bus.read(addr);
        let r = op(self, v);
        bus.write(addr, r);
        mode.rmw_cycles()
    }

    /// `SHA`/`SHX`/`SHY` style store of `v & (high byte + 1)`.
    fn store_high<B: CpuBus>(&mut self, bus: &mut B, mode: Mode, v: u8) -> i64 {
        let (addr, _) = self.address(bus, mode);
        bus.write(addr, v & ((addr >> 8) as u8).wrapping_add(1));
        mode.write_cycles()
    }

    fn branch<B: CpuBus>(&mut self, bus: &mut B, taken: bool) -> i64 {
        let offset = self.fetch8(bus) as i8;
        if !taken {
            return 2;
        }
        let target = self.pc.wrapping_add(offset as u16);
        let cycles = if crosses_page(self.pc, target) { 4 } else { 3 };
        self.pc = target;
        cycles
    }

    #[inline]
    fn set_zn(&mut self, v: u8) {
        self.p = (self.p & !(FLAG_Z | FLAG_N)) | ZN_TABLE[v as usize];
    }

    #[inline]
    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
    }

    fn lda(&mut self, v: u8) {
        self.a = v;
        self.set_zn(v);
    }

    fn ldx(&mut self, v: u8) {
        self.x = v;
        self.set_zn(v);
    }

    fn ldy(&mut self, v: u8) {
        self.y = v;
        self.set_zn(v);
    }

    fn lax(&mut self, v: u8) {
        self.a = v;
        self.x = v;
        self.set_zn(v);
    }

    fn ora(&mut self, v: u8) {
        self.a |= v;
        self.set_zn(self.a);
    }

    fn and(&mut self, v: u8) {
        self.a &= v;
        self.set_zn(self.a);
    }

    fn eor(&mut self, v: u8) {
        self.a ^= v;
        self.set_zn(self.a);
    }

    fn adc(&mut self, v: u8) {
        let sum = self.a as u16 + v as u16 + (self.p & FLAG_C) as u16;
        let r = sum as u8;
        self.set_flag(FLAG_C, sum > 0xFF);
        self.set_flag(FLAG_V, !(self.a ^ v) & (self.a ^ r) & 0x80 != 0);
        self.a = r;
        self.set_zn(r);
    }

    fn sbc(&mut self, v: u8) {
        let diff = (self.a as u16)
            .wrapping_sub(v as u16)
            .wrapping_sub((!self.p & FLAG_C) as u16);
        let r = diff as u8;
        self.set_flag(FLAG_C, diff < 0x100);
        self.set_flag(FLAG_V, (self.a ^ v) & (self.a ^ r) & 0x80 != 0);
        self.a = r;
        self.set_zn(r);
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.set_flag(FLAG_C, reg >= v);
        self.set_zn(reg.wrapping_sub(v));
    }

    fn cmp(&mut self, v: u8) {
        self.compare(self.a, v);
    }

    fn cpx(&mut self, v: u8) {
        self.compare(self.x, v);
    }

    fn cpy(&mut self, v: u8) {
        self.compare(self.y, v);
    }

    fn bit(&mut self, v: u8) {
        self.p &= !(FLAG_Z | FLAG_V | FLAG_N);
        self.p |= v & (FLAG_V | FLAG_N);
        if v & self.a == 0 {
            self.p |= FLAG_Z;
        }
    }

    fn asl(&mut self, v: u8) -> u8 {
        self.set_flag(FLAG_C, v & 0x80 != 0);
        let r = v << 1;
        self.set_zn(r);
        r
    }

    fn lsr(&mut self, v: u8) -> u8 {
        self.set_flag(FLAG_C, v & 0x01 != 0);
        let r = v >> 1;
        self.set_zn(r);
        r
    }

    fn rol(&mut self, v: u8) -> u8 {
        let r = (v << 1) | (self.p & FLAG_C);
        self.set_flag(FLAG_C, v & 0x80 != 0);
        self.set_zn(r);
        r
    }

    fn ror(&mut self, v: u8) -> u8 {
        let r = (v >> 1) | ((self.p & FLAG_C) << 7);
        self.set_flag(FLAG_C, v & 0x01 != 0);
        self.set_zn(r);
        r
    }

    fn inc(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.set_zn(r);
        r
    }

    fn dec(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.set_zn(r);
        r
    }

    fn slo(&mut self, v: u8) -> u8 {
        let r = self.asl(v);
        self.ora(r);
        r
    }

    fn rla(&mut self, v: u8) -> u8 {
        let r = self.rol(v);
        self.and(r);
        r
    }

    fn sre(&mut self, v: u8) -> u8 {
        let r = self.lsr(v);
        self.eor(r);
        r
    }

    fn rra(&mut self, v: u8) -> u8 {
        let r = self.ror(v);
        self.adc(r);
        r
    }

    fn dcp(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.cmp(r);
        r
    }

    fn isb(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.sbc(r);
        r
    }

    fn anc(&mut self, v: u8) {
        self.and(v);
        self.set_flag(FLAG_C, self.a & 0x80 != 0);
    }

    fn alr(&mut self, v: u8) {
        self.a &= v;
        self.a = self.lsr(self.a);
    }

    fn arr(&mut self, v: u8) {
        let t = self.a & v;
        self.a = (t >> 1) | ((self.p & FLAG_C) << 7);
        self.set_zn(self.a);
        self.set_flag(FLAG_C, self.a & 0x40 != 0);
        self.set_flag(FLAG_V, ((self.a >> 6) ^ (self.a >> 5)) & 0x01 != 0);
    }

    fn ane(&mut self, v: u8) {
        self.a = (self.a | 0xEE) & self.x & v;
        self.set_zn(self.a);
    }

    fn lxa(&mut self, v: u8) {
        let r = (self.a | 0xEE) & v;
        self.lax(r);
    }

    fn axs(&mut self, v: u8) {
        let t = self.a & self.x;
        self.set_flag(FLAG_C, t >= v);
        self.x = t.wrapping_sub(v);
        self.set_zn(self.x);
    }

    fn las(&mut self, v: u8) {
        let r = self.s & v;
        self.s = r;
        self.lax(r);
    }

    /// Execute one decoded instruction. Returns its cycle count, or `None`
    /// for an opcode that locks up the processor.
    fn execute<B: CpuBus>(&mut self, bus: &mut B, opcode: u8) -> Option<i64> {
        let cycles = match opcode {
            // Loads
            0xA9 => self.load(bus, Imm, Self::lda),
            0xA5 => self.load(bus, Zp, Self::lda),
            0xB5 => self.load(bus, ZpX, Self::lda),
            0xAD => self.load(bus, Abs, Self::lda),
            0xBD => self.load(bus, AbsX, Self::lda),
            0xB9 => self.load(bus, AbsY, Self::lda),
            0xA1 => self.load(bus, IndX, Self::lda),
            0xB1 => self.load(bus, IndY, Self::lda),
            0xA2 => self.load(bus, Imm, Self::ldx),
            0xA6 => self.load(bus, Zp, Self::ldx),
            0xB6 => self.load(bus, ZpY, Self::ldx),
            0xAE => self.load(bus, Abs, Self::ldx),
            0xBE => self.load(bus, AbsY, Self::ldx),
            0xA0 => self.load(bus, Imm, Self::ldy),
            0xA4 => self.load(bus, Zp, Self::ldy),
            0xB4 => self.load(bus, ZpX, Self::ldy),
            0xAC => self.load(bus, Abs, Self::ldy),
            0xBC => self.load(bus, AbsX, Self::ldy),

            // Stores
            0x85 => self.store(bus, Zp, self.a),
            0x95 => self.store(bus, ZpX, self.a),
            0x8D => self.store(bus, Abs, self.a),
            0x9D => self.store(bus, AbsX, self.a),
            0x99 => self.store(bus, AbsY, self.a),
            0x81 => self.store(bus, IndX, self.a),
            0x91 => self.store(bus, IndY, self.a),
            0x86 => self.store(bus, Zp, self.x),
            0x96 => self.store(bus, ZpY, self.x),
            0x8E => self.store(bus, Abs, self.x),
            0x84 => self.store(bus, Zp, self.y),
            0x94 => self.store(bus, ZpX, self.y),
            0x8C => self.store(bus, Abs, self.y),

            // Arithmetic and logic
            0x69 => self.load(bus, Imm, Self::adc),
            0x65 => self.load(bus, Zp, Self::adc),
            0x75 => self.load(bus, ZpX, Self::adc),
            0x6D => self.load(bus, Abs, Self::adc),
            0x7D => self.load(bus, AbsX, Self::adc),
            0x79 => self.load(bus, AbsY, Self::adc),
            0x61 => self.load(bus, IndX, Self::adc),
            0x71 => self.load(bus, IndY, Self::adc),
            0xE9 | 0xEB => self.load(bus, Imm, Self::sbc),
            0xE5 => self.load(bus, Zp, Self::sbc),
            0xF5 => self.load(bus, ZpX, Self::sbc),
            0xED => self.load(bus, Abs, Self::sbc),
            0xFD => self.load(bus, AbsX, Self::sbc),
            0xF9 => self.load(bus, AbsY, Self::sbc),
            0xE1 => self.load(bus, IndX, Self::sbc),
            0xF1 => self.load(bus, IndY, Self::sbc),
            0x29 => self.load(bus, Imm, Self::and),
            0x25 => self.load(bus, Zp, Self::and),
            0x35 => self.load(bus, ZpX, Self::and),
            0x2D => self.load(bus, Abs, Self::and),
            0x3D => self.load(bus, AbsX, Self::and),
            0x39 => self.load(bus, AbsY, Self::and),
            0x21 => self.load(bus, IndX, Self::and),
            0x31 => self.load(bus, IndY, Self::and),
            0x09 => self.load(bus, Imm, Self::ora),
            0x05 => self.load(bus, Zp, Self::ora),
            0x15 => self.load(bus, ZpX, Self::ora),
            0x0D => self.load(bus, Abs, Self::ora),
            0x1D => self.load(bus, AbsX, Self::ora),
            0x19 => self.load(bus, AbsY, Self::ora),
            0x01 => self.load(bus, IndX, Self::ora),
            0x11 => self.load(bus, IndY, Self::ora),
            0x49 => self.load(bus, Imm, Self::eor),
            0x45 => self.load(bus, Zp, Self::eor),
            0x55 => self.load(bus, ZpX, Self::eor),
            0x4D => self.load(bus, Abs, Self::eor),
            0x5D => self.load(bus, AbsX, Self::eor),
            0x59 => self.load(bus, AbsY, Self::eor),
            0x41 => self.load(bus, IndX, Self::eor),
            0x51 => self.load(bus, IndY, Self::eor),
            0xC9 => self.load(bus, Imm, Self::cmp),
            0xC5 => self.load(bus, Zp, Self::cmp),
            0xD5 => self.load(bus, ZpX, Self::cmp),
            0xCD => self.load(bus, Abs, Self::cmp),
            0xDD => self.load(bus, AbsX, Self::cmp),
            0xD9 => self.load(bus, AbsY, Self::cmp),
            0xC1 => self.load(bus, IndX, Self::cmp),
            0xD1 => self.load(bus, IndY, Self::cmp),
            0xE0 => self.load(bus, Imm, Self::cpx),
            0xE4 => self.load(bus, Zp, Self::cpx),
            0xEC => self.load(bus, Abs, Self::cpx),
            0xC0 => self.load(bus, Imm, Self::cpy),
            0xC4 => self.load(bus, Zp, Self::cpy),
            0xCC => self.load(bus, Abs, Self::cpy),
            0x24 => self.load(bus, Zp, Self::bit),
            0x2C => self.load(bus, Abs, Self::bit),

            // Shifts and increments
            0x0A => {
                self.a = self.asl(self.a);
                2
            }
            0x06 => self.modify(bus, Zp, Self::asl),
            0x16 => self.modify(bus, ZpX, Self::asl),
            0x0E => self.modify(bus, Abs, Self::asl),
            0x1E => self.modify(bus, AbsX, Self::asl),
            0x4A => {
                self.a = self.lsr(self.a);
                2
            }
            0x46 => self.modify(bus, Zp, Self::lsr),
            0x56 => self.modify(bus, ZpX, Self::lsr),
            0x4E => self.modify(bus, Abs, Self::lsr),
            0x5E => self.modify(bus, AbsX, Self::lsr),
            0x2A => {
                self.a = self.rol(self.a);
                2
            }
            0x26 => self.modify(bus, Zp, Self::rol),
            0x36 => self.modify(bus, ZpX, Self::rol),
            0x2E => self.modify(bus, Abs, Self::rol),
            0x3E => self.modify(bus, AbsX, Self::rol),
            0x6A => {
                self.a = self.ror(self.a);
                2
            }
            0x66 => self.modify(bus, Zp, Self::ror),
            0x76 => self.modify(bus, ZpX, Self::ror),
            0x6E => self.modify(bus, Abs, Self::ror),
            0x7E => self.modify(bus, AbsX, Self::ror),
            0xE6 => self.modify(bus, Zp, Self::inc),
            0xF6 => self.modify(bus, ZpX, Self::inc),
            0xEE => self.modify(bus, Abs, Self::inc),
            0xFE => self.modify(bus, AbsX, Self::inc),
            0xC6 => self.modify(bus, Zp, Self::dec),
            0xD6 => self.modify(bus, ZpX, Self::dec),
            0xCE => self.modify(bus, Abs, Self::dec),
            0xDE => self.modify(bus, AbsX, Self::dec),
            0xE8 => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
                2
            }
            0xC8 => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
                2
            }
            0xCA => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
                2
            }
            0x88 => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
                2
            }

            // Transfers
            0xAA => {
                self.ldx(self.a);
                2
            }
            0xA8 => {
                self.ldy(self.a);
                2
            }
            0x8A => {
                self.lda(self.x);
                2
            }
            0x98 => {
                self.lda(self.y);
                2
            }
            0xBA => {
                self.ldx(self.s);
                2
            }
            0x9A => {
                self.s = self.x;
                2
            }

            // Stack
            0x48 => {
                self.push(bus, self.a);
                3
            }
            0x08 => {
                self.push(bus, self.p | FLAG_B | FLAG_R);
                3
            }
            0x68 => {
                let v = self.pull(bus);
                self.lda(v);
                4
            }
            0x28 => {
                self.p = (self.pull(bus) & !FLAG_B) | FLAG_R;
                4
            }

            // Flags
            0x18 => {
                self.p &= !FLAG_C;
                2
            }
            0x38 => {
                self.p |= FLAG_C;
                2
            }
            0x58 => {
                self.p &= !FLAG_I;
                2
            }
            0x78 => {
                self.p |= FLAG_I;
                2
            }
            0xB8 => {
                self.p &= !FLAG_V;
                2
            }
            0xD8 => {
                self.p &= !FLAG_D;
                2
            }
            0xF8 => {
                self.p |= FLAG_D;
                2
            }

            // Branches
            0x10 => self.branch(bus, self.p & FLAG_N == 0),
            0x30 => self.branch(bus, self.p & FLAG_N != 0),
            0x50 => self.branch(bus, self.p & FLAG_V == 0),
            0x70 => self.branch(bus, self.p & FLAG_V != 0),
            0x90 => self.branch(bus, self.p & FLAG_C == 0),
            0xB0 => self.branch(bus, self.p & FLAG_C != 0),
            0xD0 => self.branch(bus, self.p & FLAG_Z == 0),
            0xF0 => self.branch(bus, self.p & FLAG_Z != 0),

            // Jumps and subroutines
            0x4C => {
                self.pc = self.fetch16(bus);
                3
            }
            0x6C => {
                let ptr = self.fetch16(bus);
                let lo = bus.read(ptr) as u16;
                // The pointer's high byte never carries into the next page.
                let hi = bus.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
                self.pc = (hi << 8) | lo;
                5
            }
            0x20 => {
                let target = self.fetch16(bus);
                self.push16(bus, self.pc.wrapping_sub(1));
                self.pc = target;
                6
            }
            0x60 => {
                self.pc = self.pull16(bus).wrapping_add(1);
                6
            }
            0x40 => {
                self.p = (self.pull(bus) & !FLAG_B) | FLAG_R;
                self.pc = self.pull16(bus);
                6
            }
            0x00 => {
                self.pc = self.pc.wrapping_add(1);
                self.interrupt(bus, IRQ_VECTOR, true);
                7
            }

            // Undocumented read-modify-write combinations
            0x07 => self.modify(bus, Zp, Self::slo),
            0x17 => self.modify(bus, ZpX, Self::slo),
            0x0F => self.modify(bus, Abs, Self::slo),
            0x1F => self.modify(bus, AbsX, Self::slo),
            0x1B => self.modify(bus, AbsY, Self::slo),
            0x03 => self.modify(bus, IndX, Self::slo),
            0x13 => self.modify(bus, IndY, Self::slo),
            0x27 => self.modify(bus, Zp, Self::rla),
            0x37 => self.modify(bus, ZpX, Self::rla),
            0x2F => self.modify(bus, Abs, Self::rla),
            0x3F => self.modify(bus, AbsX, Self::rla),
            0x3B => self.modify(bus, AbsY, Self::rla),
            0x23 => self.modify(bus, IndX, Self::rla),
            0x33 => self.modify(bus, IndY, Self::rla),
            0x47 => self.modify(bus, Zp, Self::sre),
            0x57 => self.modify(bus, ZpX, Self::sre),
            0x4F => self.modify(bus, Abs, Self::sre),
            0x5F => self.modify(bus, AbsX, Self::sre),
            0x5B => self.modify(bus, AbsY, Self::sre),
            0x43 => self.modify(bus, IndX, Self::sre),
            0x53 => self.modify(bus, IndY, Self::sre),
            0x67 => self.modify(bus, Zp, Self::rra),
            0x77 => self.modify(bus, ZpX, Self::rra),
            0x6F => self.modify(bus, Abs, Self::rra),
            0x7F => self.modify(bus, AbsX, Self::rra),
            0x7B => self.modify(bus, AbsY, Self::rra),
            0x63 => self.modify(bus, IndX, Self::rra),
            0x73 => self.modify(bus, IndY, Self::rra),
            0xC7 => self.modify(bus, Zp, Self::dcp),
            0xD7 => self.modify(bus, ZpX, Self::dcp),
            0xCF => self.modify(bus, Abs, Self::dcp),
            0xDF => self.modify(bus, AbsX, Self::dcp),
            0xDB => self.modify(bus, AbsY, Self::dcp),
            0xC3 => self.modify(bus, IndX, Self::dcp),
            0xD3 => self.modify(bus, IndY, Self::dcp),
            0xE7 => self.modify(bus, Zp, Self::isb),
            0xF7 => self.modify(bus, ZpX, Self::isb),
            0xEF => self.modify(bus, Abs, Self::isb),
            0xFF => self.modify(bus, AbsX, Self::isb),
            0xFB => self.modify(bus, AbsY, Self::isb),
            0xE3 => self.modify(bus, IndX, Self::isb),
            0xF3 => self.modify(bus, IndY, Self::isb),

            // Undocumented loads and stores
            0xA7 => self.load(bus, Zp, Self::lax),
            0xB7 => self.load(bus, ZpY, Self::lax),
            0xAF => self.load(bus, Abs, Self::lax),
            0xBF => self.load(bus, AbsY, Self::lax),
            0xA3 => self.load(bus, IndX, Self::lax),
            0xB3 => self.load(bus, IndY, Self::lax),
            0x87 => self.store(bus, Zp, self.a & self.x),
            0x97 => self.store(bus, ZpY, self.a & self.x),
            0x8F => self.store(bus, Abs, self.a & self.x),
            0x83 => self.store(bus, IndX, self.a & self.x),
            0xBB => self.load(bus, AbsY, Self::las),
            0x93 => self.store_high(bus, IndY, self.a & self.x),
            0x9F => self.store_high(bus, AbsY, self.a & self.x),
            0x9E => self.store_high(bus, AbsY, self.x),
            0x9C => self.store_high(bus, AbsX, self.y),
            0x9B => {
                self.s = self.a & self.x;
                self.store_high(bus, AbsY, self.s)
            }

            // Undocumented immediates
            0x0B | 0x2B => self.load(bus, Imm, Self::anc),
            0x4B => self.load(bus, Imm, Self::alr),
            0x6B => self.load(bus, Imm, Self::arr),
            0x8B => self.load(bus, Imm, Self::ane),
            0xAB => self.load(bus, Imm, Self::lxa),
            0xCB => self.load(bus, Imm, Self::axs),

            // NOPs, including the multi-byte undocumented ones. Their operand
            // reads are not performed so I/O registers see no access.
            0xEA | 0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => 2,
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => {
                self.pc = self.pc.wrapping_add(1);
                2
            }
            0x04 | 0x44 | 0x64 => {
                self.pc = self.pc.wrapping_add(1);
                3
            }
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => {
                self.pc = self.pc.wrapping_add(1);
                4
            }
            0x0C => {
                self.pc = self.pc.wrapping_add(2);
                4
            }
            0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => {
                let (_, crossed) = self.address(bus, AbsX);
                4 + crossed as i64
            }

            // KIL
            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2
            | 0xF2 => return None,
        };
        Some(cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat 64 KiB bus with the program loaded at `$8000`.
    struct FlatBus {
        mem: Vec<u8>,
        signals: Signals,
        clocked: i64,
    }

    impl FlatBus {
        fn with_program(program: &[u8]) -> Self {
            let mut mem = vec![0u8; 0x10000];
            mem[0x8000..0x8000 + program.len()].copy_from_slice(program);
            mem[0xFFFC] = 0x00;
            mem[0xFFFD] = 0x80;
            mem[0xFFFA] = 0x00;
            mem[0xFFFB] = 0x90;
            mem[0xFFFE] = 0x00;
            mem[0xFFFF] = 0xA0;
            Self {
                mem,
                signals: Signals::default(),
                clocked: 0,
            }
        }
    }

    impl CpuBus for FlatBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn write(&mut self, addr: u16, data: u8) {
            self.mem[addr as usize] = data;
        }
        fn fetch(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn signals(&mut self) -> &mut Signals {
            &mut self.signals
        }
        fn clock(&mut self, cycles: i64) {
            self.clocked += cycles;
        }
    }

    fn boot(program: &[u8]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus::with_program(program);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    /// Run exactly one instruction and return its cycle count.
    fn step(cpu: &mut Cpu, bus: &mut FlatBus) -> i64 {
        cpu.run(bus, 1).unwrap()
    }

    #[test]
    fn reset_state() {
        let (cpu, bus) = boot(&[]);
        let r = cpu.registers();
        assert_eq!(r.pc, 0x8000);
        assert_eq!(r.s, 0xFF);
        assert_eq!(r.p, FLAG_Z | FLAG_R);
        assert_eq!(bus.signals.cycles, 0);
    }

    #[test]
    fn zn_table_matches_definition() {
        for v in 0..=255u8 {
            let expect = if v == 0 { FLAG_Z } else { 0 } | if v & 0x80 != 0 { FLAG_N } else { 0 };
            assert_eq!(ZN_TABLE[v as usize], expect);
        }
    }

    #[test]
    fn adc_sets_carry_and_overflow() {
        // LDA #$7F; ADC #$01; ADC #$80
        let (mut cpu, mut bus) = boot(&[0xA9, 0x7F, 0x69, 0x01, 0x69, 0x80]);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x80);
        assert_eq!(cpu.p & (FLAG_V | FLAG_N | FLAG_C), FLAG_V | FLAG_N);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x00);
        assert_eq!(cpu.p & (FLAG_V | FLAG_Z | FLAG_C), FLAG_V | FLAG_Z | FLAG_C);
    }

    #[test]
    fn decimal_flag_does_not_change_arithmetic() {
        // SED; LDA #$09; CLC; ADC #$01
        let (mut cpu, mut bus) = boot(&[0xF8, 0xA9, 0x09, 0x18, 0x69, 0x01]);
        for _ in 0..4 {
            step(&mut cpu, &mut bus);
        }
        assert_eq!(cpu.a, 0x0A);
        assert_ne!(cpu.p & FLAG_D, 0);
    }

    #[test]
    fn sbc_borrow() {
        // SEC; LDA #$00; SBC #$01
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0x00, 0xE9, 0x01]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        assert_eq!(cpu.a, 0xFF);
        assert_eq!(cpu.p & FLAG_C, 0);
        assert_ne!(cpu.p & FLAG_N, 0);
    }

    #[test]
    fn indexed_page_cross_costs_a_cycle() {
        // LDX #$01; LDA $80FF,X; LDA $8000,X
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0xBD, 0xFF, 0x80, 0xBD, 0x00, 0x80]);
        assert_eq!(step(&mut cpu, &mut bus), 2);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(step(&mut cpu, &mut bus), 4);
    }

    #[test]
    fn store_never_pays_page_penalty() {
        // LDY #$FF; STA $10,Y (abs,Y); STA ($20),Y
        let (mut cpu, mut bus) = boot(&[0xA0, 0xFF, 0x99, 0x10, 0x00, 0x91, 0x20]);
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(step(&mut cpu, &mut bus), 6);
    }

    #[test]
    fn indy_pointer_wraps_in_zero_page() {
        // LDY #$02; LDA ($FF),Y
        let (mut cpu, mut bus) = boot(&[0xA0, 0x02, 0xB1, 0xFF]);
        bus.mem[0xFF] = 0x00;
        bus.mem[0x00] = 0x03;
        bus.mem[0x0302] = 0x5A;
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.a, 0x5A);
    }

    #[test]
    fn branch_timing() {
        // CLC; BCC +2; NOP; NOP; SEC; BCC +0 (not taken)
        let (mut cpu, mut bus) = boot(&[0x18, 0x90, 0x02, 0xEA, 0xEA, 0x38, 0x90, 0x00]);
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 3);
        assert_eq!(cpu.pc, 0x8005);
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 2);
    }

    #[test]
    fn branch_across_page_costs_two() {
        let mut program = vec![0xEA; 0x100];
        program[0xF0] = 0xD0; // BNE +$10 from $80F2 to $8102
        program[0xF1] = 0x10;
        let (mut cpu, mut bus) = boot(&program);
        cpu.pc = 0x80F0;
        cpu.p &= !FLAG_Z;
        assert_eq!(step(&mut cpu, &mut bus), 4);
        assert_eq!(cpu.pc, 0x8102);
    }

    #[test]
    fn jsr_rts_round_trip() {
        // JSR $8005; BRK; BRK; RTS at $8005
        let (mut cpu, mut bus) = boot(&[0x20, 0x05, 0x80, 0x00, 0x00, 0x60]);
        assert_eq!(step(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.pc, 0x8005);
        assert_eq!(bus.mem[0x01FF], 0x80);
        assert_eq!(bus.mem[0x01FE], 0x02);
        assert_eq!(step(&mut cpu, &mut bus), 6);
        assert_eq!(cpu.pc, 0x8003);
        assert_eq!(cpu.s, 0xFF);
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        let (mut cpu, mut bus) = boot(&[0x6C, 0xFF, 0x02]);
        bus.mem[0x02FF] = 0x34;
        bus.mem[0x0200] = 0x12;
        bus.mem[0x0300] = 0x99;
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn brk_pushes_break_flag_and_vectors() {
        let (mut cpu, mut bus) = boot(&[0x00, 0xFF]);
        assert_eq!(step(&mut cpu, &mut bus), 7);
        assert_eq!(cpu.pc, 0xA000);
        assert_eq!(bus.mem[0x01FD] & FLAG_B, FLAG_B);
        assert_eq!(u16::from_le_bytes([bus.mem[0x01FE], bus.mem[0x01FF]]), 0x8002);
        assert_ne!(cpu.p & FLAG_I, 0);
    }

    #[test]
    fn nmi_runs_after_current_instruction() {
        let (mut cpu, mut bus) = boot(&[0xEA, 0xEA]);
        bus.signals.intr.raise(Interrupts::NMI);
        assert_eq!(step(&mut cpu, &mut bus), 2 + INTERRUPT_CYCLES);
        assert_eq!(cpu.pc, 0x9000);
        assert_eq!(u16::from_le_bytes([bus.mem[0x01FE], bus.mem[0x01FF]]), 0x8001);
        assert_eq!(bus.mem[0x01FD] & FLAG_B, 0);
        assert!(!bus.signals.intr.is_set(Interrupts::NMI));
    }

    #[test]
    fn irq_waits_for_interrupt_enable() {
        // SEI; NOP; CLI; NOP
        let (mut cpu, mut bus) = boot(&[0x78, 0xEA, 0x58, 0xEA, 0xEA]);
        step(&mut cpu, &mut bus);
        bus.signals.intr.raise(Interrupts::MAPPER);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.pc, 0x8003);
        assert_eq!(step(&mut cpu, &mut bus), 2 + INTERRUPT_CYCLES);
        assert_eq!(cpu.pc, 0xA000);
        // Level triggered: the source stays raised until acknowledged.
        assert!(bus.signals.intr.is_set(Interrupts::MAPPER));
    }

    #[test]
    fn dma_debt_is_paid_before_execution() {
        let (mut cpu, mut bus) = boot(&[0xEA; 16]);
        bus.signals.dma_cycles = 514;
        assert_eq!(cpu.run(&mut bus, 100).unwrap(), 100);
        assert_eq!(bus.signals.dma_cycles, 414);
        assert_eq!(cpu.pc, 0x8000);
        let spent = cpu.run(&mut bus, 420).unwrap();
        assert_eq!(spent, 414 + 2 * 3);
        assert_eq!(bus.clocked, 100 + spent);
    }

    #[test]
    fn run_overshoots_by_whole_instructions() {
        let (mut cpu, mut bus) = boot(&[0xEA; 16]);
        assert_eq!(cpu.run(&mut bus, 5).unwrap(), 6);
        assert_eq!(bus.signals.cycles, 6);
    }

    #[test]
    fn kil_jams_until_reset() {
        let (mut cpu, mut bus) = boot(&[0xEA, 0x02]);
        let err = cpu.run(&mut bus, 10).unwrap_err();
        assert_eq!(err, ExecutionFault::Jammed { opcode: 0x02, pc: 0x8001 });
        assert_eq!(cpu.run(&mut bus, 10), Err(err));
        assert_eq!(cpu.pc, 0x8001);
        cpu.reset(&mut bus);
        assert!(cpu.jammed().is_none());
    }

    #[test]
    fn undocumented_lax_and_sax() {
        // LAX $10; SAX $11 after LDX #$0F
        let (mut cpu, mut bus) = boot(&[0xA7, 0x10, 0xA2, 0x0F, 0x87, 0x11]);
        bus.mem[0x10] = 0xF3;
        assert_eq!(step(&mut cpu, &mut bus), 3);
        assert_eq!((cpu.a, cpu.x), (0xF3, 0xF3));
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 3);
        assert_eq!(bus.mem[0x11], 0x03);
    }

    #[test]
    fn undocumented_dcp_and_isb() {
        // LDA #$05; DCP $20; ISB $21
        let (mut cpu, mut bus) = boot(&[0xA9, 0x05, 0xC7, 0x20, 0xE7, 0x21]);
        bus.mem[0x20] = 0x06;
        bus.mem[0x21] = 0x01;
        step(&mut cpu, &mut bus);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(bus.mem[0x20], 0x05);
        assert_ne!(cpu.p & FLAG_Z, 0);
        assert_ne!(cpu.p & FLAG_C, 0);
        step(&mut cpu, &mut bus);
        assert_eq!(bus.mem[0x21], 0x02);
        assert_eq!(cpu.a, 0x03);
    }

    #[test]
    fn undocumented_immediates() {
        // LDA #$FF; ANC #$80 -> A=$80, C=1
        let (mut cpu, mut bus) = boot(&[0xA9, 0xFF, 0x0B, 0x80, 0x4B, 0x81, 0xA2, 0x03, 0xCB, 0x01]);
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x80);
        assert_ne!(cpu.p & FLAG_C, 0);
        // ALR #$81 -> A = ($80 & $81) >> 1 = $40, C = 0
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.a, 0x40);
        assert_eq!(cpu.p & FLAG_C, 0);
        // LDX #$03; AXS #$01 -> X = ($40 & $03) - 1 = $FF, C = 0
        step(&mut cpu, &mut bus);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.x, 0xFF);
        assert_eq!(cpu.p & FLAG_C, 0);
    }

    #[test]
    fn arr_flags() {
        // SEC; LDA #$FF; ARR #$C0 -> A = $E0, C = bit6 = 1, V = bit6 ^ bit5 = 0
        let (mut cpu, mut bus) = boot(&[0x38, 0xA9, 0xFF, 0x6B, 0xC0]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        assert_eq!(cpu.a, 0xE0);
        assert_ne!(cpu.p & FLAG_C, 0);
        assert_eq!(cpu.p & FLAG_V, 0);
        assert_ne!(cpu.p & FLAG_N, 0);
    }

    #[test]
    fn multi_byte_nops_skip_operands() {
        let (mut cpu, mut bus) = boot(&[0x80, 0xFF, 0x04, 0x10, 0x14, 0x10, 0x0C, 0x00, 0x20, 0x1C, 0xFF, 0x80]);
        cpu.x = 1;
        assert_eq!(step(&mut cpu, &mut bus), 2);
        assert_eq!(step(&mut cpu, &mut bus), 3);
        assert_eq!(step(&mut cpu, &mut bus), 4);
        assert_eq!(step(&mut cpu, &mut bus), 4);
        assert_eq!(step(&mut cpu, &mut bus), 5);
        assert_eq!(cpu.pc, 0x800C);
    }

    #[test]
    fn plp_ignores_break_bit() {
        // LDA #$FF; PHA; PLP
        let (mut cpu, mut bus) = boot(&[0xA9, 0xFF, 0x48, 0x28]);
        for _ in 0..3 {
            step(&mut cpu, &mut bus);
        }
        assert_eq!(cpu.p, 0xFF & !FLAG_B);
    }
}
