use super::{Mapper, MapperCtx};
use crate::memory::Mirroring;

/// Mapper 7. 32 KiB PRG switching with one-screen mirroring select.
pub struct Axrom;

impl Mapper for Axrom {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        ctx.mem.set_prg_32k(0);
        ctx.mem.set_mirroring(Mirroring::SingleLow);
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, _addr: u16, data: u8) {
        ctx.mem.set_prg_32k((data & 0x07) as usize);
        ctx.mem.set_mirroring(if data & 0x10 != 0 {
            Mirroring::SingleHigh
        } else {
            Mirroring::SingleLow
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::test_support::{Harness, board};
    use crate::memory::NAMETABLE_WINDOW;

    #[test]
    fn selects_bank_and_screen() {
        let mut h = Harness::new(board(7, 8, 0));
        Axrom.reset(&mut h.ctx());
        Axrom.write(&mut h.ctx(), 0x8000, 0x12);
        assert_eq!(h.prg_at(0x8000), 8);
        assert_eq!(h.prg_at(0xE000), 11);
        for i in 0..4 {
            assert_eq!(h.mem.ppu_window(NAMETABLE_WINDOW + i).offset, 0x400);
        }
        Axrom.write(&mut h.ctx(), 0x8000, 0x00);
        assert_eq!(h.mem.ppu_window(NAMETABLE_WINDOW + 3).offset, 0);
    }
}
