use super::{Mapper, MapperCtx};
use crate::memory::Mirroring;

/// Mapper 69 (Sunsoft FME-7). Command/parameter register pair plus a
/// 16-bit CPU-cycle IRQ counter.
pub struct Fme7 {
    /// Patch bit 0: ignore PRG selects for `$6000`.
    fixed_low_prg: bool,
    command: u8,
    irq_enabled: bool,
    irq_counter: i32,
}

impl Fme7 {
    pub fn new(patch: u64) -> Self {
        Self {
            fixed_low_prg: patch & 0x01 != 0,
            command: 0,
            irq_enabled: false,
            irq_counter: 0,
        }
    }
}

impl Mapper for Fme7 {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        self.irq_enabled = false;
        self.irq_counter = 0;
        self.command = 0;
        let n = ctx.mem.prg_pages();
        ctx.mem.set_prg_32k4(0, 1, n - 2, n - 1);
        if ctx.mem.chr_pages() != 0 {
            ctx.mem.set_chr_8k(0);
        }
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        match addr & 0xE000 {
            0x8000 => self.command = data,
            0xA000 => {
                let r = self.command & 0x0F;
                match r {
                    0x00..=0x07 => ctx.mem.set_chr_1k(r as usize, data as usize),
                    0x08 if self.fixed_low_prg => {}
                    0x08 if data & 0x40 == 0 => ctx.mem.set_prg_8k(3, data as usize),
                    0x08 => ctx.mem.set_save_ram_8k(3, 0),
                    0x09..=0x0B => ctx.mem.set_prg_8k((r - 0x05) as usize, data as usize),
                    0x0C => ctx.mem.set_mirroring(match data & 0x03 {
                        0 => Mirroring::Vertical,
                        1 => Mirroring::Horizontal,
                        2 => Mirroring::SingleLow,
                        _ => Mirroring::SingleHigh,
                    }),
                    0x0D => {
                        self.irq_enabled = data != 0;
                        ctx.clear_irq();
                    }
                    0x0E => {
                        self.irq_counter = (self.irq_counter & 0xFF00) | data as i32;
                        ctx.clear_irq();
                    }
                    _ => {
                        self.irq_counter = (self.irq_counter & 0x00FF) | ((data as i32) << 8);
                        ctx.clear_irq();
                    }
                }
            }
            _ => {}
        }
    }

    fn clock(&mut self, ctx: &mut MapperCtx<'_>, cycles: i64) {
        if !self.irq_enabled {
            return;
        }
        self.irq_counter -= cycles as i32;
        if self.irq_counter <= 0 {
            self.irq_enabled = false;
            self.irq_counter = 0xFFFF;
            ctx.raise_irq();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Interrupts;
    use crate::mapper::test_support::{Harness, board};

    fn command(m: &mut Fme7, h: &mut Harness, reg: u8, value: u8) {
        m.write(&mut h.ctx(), 0x8000, reg);
        m.write(&mut h.ctx(), 0xA000, value);
    }

    #[test]
    fn banks_and_low_window() {
        let mut h = Harness::new(board(69, 8, 8));
        let mut m = Fme7::new(0);
        m.reset(&mut h.ctx());
        command(&mut m, &mut h, 0x09, 3);
        command(&mut m, &mut h, 0x0B, 7);
        command(&mut m, &mut h, 0x03, 21);
        assert_eq!(h.prg_at(0x8000), 3);
        assert_eq!(h.prg_at(0xC000), 7);
        assert_eq!(h.prg_at(0xE000), 15);
        assert_eq!(h.chr_at(0x0C00), 21);

        command(&mut m, &mut h, 0x08, 5);
        assert_eq!(h.prg_at(0x6000), 5);
        h.mem.cpu_write(0x6000, 0xAA);
        assert_eq!(h.prg_at(0x6000), 5);
        command(&mut m, &mut h, 0x08, 0x40);
        h.mem.cpu_write(0x6000, 0xAA);
        assert_eq!(h.prg_at(0x6000), 0xAA);
    }

    #[test]
    fn cycle_counter_raises_irq_once() {
        let mut h = Harness::new(board(69, 2, 1));
        let mut m = Fme7::new(0);
        m.reset(&mut h.ctx());
        command(&mut m, &mut h, 0x0E, 100);
        command(&mut m, &mut h, 0x0F, 0);
        command(&mut m, &mut h, 0x0D, 0x81);

        m.clock(&mut h.ctx(), 60);
        assert!(!h.intr.is_set(Interrupts::MAPPER));
        m.clock(&mut h.ctx(), 40);
        assert!(h.intr.is_set(Interrupts::MAPPER));

        command(&mut m, &mut h, 0x0D, 0);
        assert!(!h.intr.is_set(Interrupts::MAPPER));
        m.clock(&mut h.ctx(), 100_000);
        assert!(!h.intr.is_set(Interrupts::MAPPER));
    }
}
