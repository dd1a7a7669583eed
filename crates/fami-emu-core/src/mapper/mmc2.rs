use super::{Mapper, MapperCtx};
use crate::memory::{Memory, Mirroring};

/// Each CHR half has two candidate banks; fetching tile `$FD` or `$FE`
/// from that half flips which one is mapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ChrLatch {
    /// Bank registers: `[$FD bank, $FE bank]` for each half.
    banks: [[u8; 2]; 2],
    /// Current selection per half, `true` for `$FD`.
    fd: [bool; 2],
}

impl ChrLatch {
    fn power_on() -> Self {
        Self {
            banks: [[0, 4], [0, 0]],
            fd: [false, false],
        }
    }

    fn map(&self, mem: &mut Memory, half: usize) {
        let bank = self.banks[half][usize::from(!self.fd[half])];
        mem.set_chr_4k(half * 4, bank as usize);
    }

    fn set_bank(&mut self, mem: &mut Memory, half: usize, fe: bool, data: u8) {
        self.banks[half][usize::from(fe)] = data;
        if self.fd[half] != fe {
            self.map(mem, half);
        }
    }

    fn fetch(&mut self, mem: &mut Memory, addr: u16) {
        let half = usize::from(addr & 0x1000 != 0);
        let fd = match addr & 0x0FF0 {
            0x0FD0 => true,
            0x0FE0 => false,
            _ => return,
        };
        if self.fd[half] != fd {
            self.fd[half] = fd;
            self.map(mem, half);
        }
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        match addr & 0xF000 {
            0xB000 => self.set_bank(ctx.mem, 0, false, data),
            0xC000 => self.set_bank(ctx.mem, 0, true, data),
            0xD000 => self.set_bank(ctx.mem, 1, false, data),
            0xE000 => self.set_bank(ctx.mem, 1, true, data),
            0xF000 => ctx.mem.set_mirroring(if data & 0x01 != 0 {
                Mirroring::Horizontal
            } else {
                Mirroring::Vertical
            }),
            _ => {}
        }
    }
}

/// Mapper 9. One switchable 8 KiB PRG bank, latch-switched CHR.
#[derive(Default)]
pub struct Mmc2 {
    latch: ChrLatch,
}

impl Mapper for Mmc2 {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        let n = ctx.mem.prg_pages();
        ctx.mem.set_prg_32k4(0, n.saturating_sub(3), n - 2, n - 1);
        self.latch = ChrLatch::power_on();
        ctx.mem.set_chr_4k(0, 4);
        ctx.mem.set_chr_4k(4, 0);
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        if addr & 0xF000 == 0xA000 {
            ctx.mem.set_prg_8k(4, data as usize);
        } else {
            self.latch.write(ctx, addr, data);
        }
    }

    fn ppu_chr_latch(&mut self, mem: &mut Memory, addr: u16) {
        self.latch.fetch(mem, addr);
    }

    fn uses_chr_latch(&self) -> bool {
        true
    }
}

/// Mapper 10. MMC2 with a 16 KiB PRG bank.
#[derive(Default)]
pub struct Mmc4 {
    latch: ChrLatch,
}

impl Mapper for Mmc4 {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        let n = ctx.mem.prg_pages();
        ctx.mem.set_prg_32k4(0, 1, n - 2, n - 1);
        self.latch = ChrLatch::power_on();
        ctx.mem.set_chr_4k(0, 4);
        ctx.mem.set_chr_4k(4, 0);
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        if addr & 0xF000 == 0xA000 {
            ctx.mem.set_prg_16k(4, data as usize);
        } else {
            self.latch.write(ctx, addr, data);
        }
    }

    fn ppu_chr_latch(&mut self, mem: &mut Memory, addr: u16) {
        self.latch.fetch(mem, addr);
    }

    fn uses_chr_latch(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::test_support::{Harness, board};

    #[test]
    fn latch_tiles_switch_each_half_independently() {
        let mut h = Harness::new(board(9, 8, 16));
        let mut m = Mmc2::default();
        m.reset(&mut h.ctx());
        assert_eq!(h.chr_at(0x0000), 16);
        assert_eq!(h.prg_at(0xA000), 13);

        m.write(&mut h.ctx(), 0xB000, 2);
        m.write(&mut h.ctx(), 0xC000, 3);
        m.write(&mut h.ctx(), 0xD000, 5);
        m.write(&mut h.ctx(), 0xE000, 6);
        assert_eq!(h.chr_at(0x0000), 12);
        assert_eq!(h.chr_at(0x1000), 24);

        m.ppu_chr_latch(&mut h.mem, 0x0FD8);
        assert_eq!(h.chr_at(0x0000), 8);
        assert_eq!(h.chr_at(0x1000), 24);

        m.ppu_chr_latch(&mut h.mem, 0x1FD0);
        assert_eq!(h.chr_at(0x1000), 20);
        assert_eq!(h.chr_at(0x0000), 8);

        m.ppu_chr_latch(&mut h.mem, 0x1FE3);
        assert_eq!(h.chr_at(0x1000), 24);
    }

    #[test]
    fn mmc4_switches_16k() {
        let mut h = Harness::new(board(10, 8, 16));
        let mut m = Mmc4::default();
        m.reset(&mut h.ctx());
        m.write(&mut h.ctx(), 0xA000, 2);
        assert_eq!(h.prg_at(0x8000), 4);
        assert_eq!(h.prg_at(0xA000), 5);
        assert_eq!(h.prg_at(0xC000), 14);
        assert!(m.uses_chr_latch());
    }
}
