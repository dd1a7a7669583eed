use super::{Mapper, MapperCtx, nrom::map_fixed_prg};

/// Mapper 3. Fixed PRG, any write selects an 8 KiB CHR bank.
pub struct Cnrom;

impl Mapper for Cnrom {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        map_fixed_prg(ctx);
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, _addr: u16, data: u8) {
        ctx.mem.set_chr_8k(data as usize);
    }
}
