use super::{Mapper, MapperCtx};

/// Mapper 0. Fixed 16 or 32 KiB of PRG, 8 KiB of CHR.
pub struct Nrom;

/// Map 16 KiB carts twice, 32 KiB carts once.
pub(super) fn map_fixed_prg(ctx: &mut MapperCtx<'_>) {
    match ctx.mem.prg_pages() >> 1 {
        1 => {
            ctx.mem.set_prg_16k(4, 0);
            ctx.mem.set_prg_16k(6, 0);
        }
        2 => ctx.mem.set_prg_32k(0),
        _ => {}
    }
}

impl Mapper for Nrom {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        map_fixed_prg(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::test_support::{Harness, board};

    #[test]
    fn small_prg_is_mirrored() {
        let mut h = Harness::new(board(0, 1, 1));
        Nrom.reset(&mut h.ctx());
        assert_eq!(h.prg_at(0x8000), 0);
        assert_eq!(h.prg_at(0xC000), 0);
        assert_eq!(h.prg_at(0xE000), 1);
    }

    #[test]
    fn rom_writes_change_nothing() {
        let mut h = Harness::new(board(0, 2, 1));
        Nrom.reset(&mut h.ctx());
        Nrom.write(&mut h.ctx(), 0x8000, 3);
        assert_eq!(h.prg_at(0x8000), 0);
        assert_eq!(h.prg_at(0xE000), 3);
    }
}
