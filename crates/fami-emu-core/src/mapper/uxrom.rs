use super::{Mapper, MapperCtx, write_save_ram};

/// Mapper 2. 16 KiB switchable bank at `$8000`, last bank fixed at `$C000`.
///
/// Patch bit 0: some boards also switch on `$5000-$5FFF` writes.
/// Patch bit 1: bank number sits in the high nibble.
pub struct Uxrom {
    low_switch: bool,
    high_nibble: bool,
}

impl Uxrom {
    pub fn new(patch: u64) -> Self {
        Self {
            low_switch: patch & 0x01 != 0,
            high_nibble: patch & 0x01 == 0 && patch & 0x02 != 0,
        }
    }
}

impl Mapper for Uxrom {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        let n = ctx.mem.prg_pages();
        ctx.mem.set_prg_32k4(0, 1, n - 2, n - 1);
    }

    fn write_low(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        if ctx.mem.header().save_ram {
            write_save_ram(ctx.mem, addr, data);
        } else if self.low_switch && addr >= 0x5000 {
            ctx.mem.set_prg_16k(4, data as usize);
        }
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, _addr: u16, data: u8) {
        let bank = if self.high_nibble { data >> 4 } else { data };
        ctx.mem.set_prg_16k(4, bank as usize);
    }
}
