use super::{Mapper, MapperCtx, read_save_ram, write_save_ram};
use crate::{hardware::RenderMode, memory::Mirroring};

const VISIBLE_LINES: u16 = 240;

/// Scanline counter behaviour. Boards and dumps disagree on when the counter
/// reloads, so the variant is picked by patch bits 0-4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum IrqVariant {
    #[default]
    Standard,
    /// `$C000` loads the counter, `$C001` the latch; reload precedes the
    /// decrement and the request stays asserted.
    ReloadFirst,
    /// `$C001` always arms a reload, even during vertical blank.
    AlwaysArm,
    /// The reload on scanline 0 also counts that line.
    EarlyLineZero,
    /// The latch is hard-wired to 7.
    FixedLatch,
    /// Like `ReloadFirst`, but the decrement precedes the reload.
    DecrementFirst,
}

impl IrqVariant {
    fn from_patch(patch: u64) -> Self {
        if patch & 0x01 != 0 {
            Self::ReloadFirst
        } else if patch & 0x02 != 0 {
            Self::AlwaysArm
        } else if patch & 0x04 != 0 {
            Self::EarlyLineZero
        } else if patch & 0x08 != 0 {
            Self::FixedLatch
        } else if patch & 0x10 != 0 {
            Self::DecrementFirst
        } else {
            Self::Standard
        }
    }

    fn counter_on_c000(self) -> bool {
        matches!(self, Self::ReloadFirst | Self::DecrementFirst)
    }
}

/// Mapper 4. Two switchable 8 KiB PRG banks, six CHR banks, and a
/// scanline counter driven from [`Mapper::h_sync`].
pub struct Mmc3 {
    variant: IrqVariant,
    render_mode: Option<RenderMode>,
    irq_enabled: bool,
    irq_counter: u8,
    irq_latch: u8,
    irq_request: bool,
    irq_reload: bool,
    irq_reload_vblank: bool,
    prg: [u8; 2],
    select: u8,
    chr: [u8; 8],
}

impl Mmc3 {
    pub fn new(patch: u64) -> Self {
        let render_mode = if patch & 0x20 != 0 {
            Some(RenderMode::Tile)
        } else if patch & 0x40 != 0 {
            Some(RenderMode::Post)
        } else {
            None
        };
        Self {
            variant: IrqVariant::from_patch(patch),
            render_mode,
            irq_enabled: false,
            irq_counter: 0,
            irq_latch: 0xFF,
            irq_request: false,
            irq_reload: false,
            irq_reload_vblank: false,
            prg: [0, 1],
            select: 0,
            chr: [0, 1, 2, 3, 4, 5, 6, 7],
        }
    }

    fn set_prg(&self, ctx: &mut MapperCtx<'_>) {
        let n = ctx.mem.prg_pages();
        let (p0, p1) = (self.prg[0] as usize, self.prg[1] as usize);
        if self.select & 0x40 != 0 {
            ctx.mem.set_prg_32k4(n - 2, p1, p0, n - 1);
        } else {
            ctx.mem.set_prg_32k4(p0, p1, n - 2, n - 1);
        }
    }

    fn set_chr(&self, ctx: &mut MapperCtx<'_>) {
        let swap = self.select & 0x80 != 0;
        let has_rom = ctx.mem.chr_pages() != 0;
        for slot in 0..8 {
            let reg = if swap { slot ^ 4 } else { slot };
            let page = self.chr[reg] as usize;
            if has_rom {
                ctx.mem.set_chr_1k(slot, page);
            } else {
                ctx.mem.set_cram_1k(slot, page & 0x07);
            }
        }
    }
}

impl Mapper for Mmc3 {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        self.irq_enabled = false;
        self.irq_counter = 0;
        self.irq_latch = 0xFF;
        self.irq_request = false;
        self.irq_reload = false;
        self.irq_reload_vblank = false;
        self.select = 0;
        self.prg = [0, 1];
        self.chr = [0, 1, 2, 3, 4, 5, 6, 7];
        self.set_prg(ctx);
        self.set_chr(ctx);
    }

    fn read_low(&mut self, ctx: &mut MapperCtx<'_>, addr: u16) -> u8 {
        if (0x5000..0x6000).contains(&addr) {
            return ctx.mem.xram[(addr & 0x1FFF) as usize];
        }
        read_save_ram(ctx.mem, addr)
    }

    fn write_low(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        if (0x5000..0x6000).contains(&addr) {
            ctx.mem.xram[(addr & 0x1FFF) as usize] = data;
            return;
        }
        write_save_ram(ctx.mem, addr, data);
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        match addr & 0xE001 {
            0x8000 => {
                self.select = data;
                self.set_prg(ctx);
                self.set_chr(ctx);
            }
            0x8001 => {
                let r = (self.select & 0x07) as usize;
                match r {
                    0 | 1 => {
                        let i = r << 1;
                        self.chr[i] = data & 0xFE;
                        self.chr[i + 1] = self.chr[i] + 1;
                        self.set_chr(ctx);
                    }
                    2..=5 => {
                        self.chr[r + 2] = data;
                        self.set_chr(ctx);
                    }
                    6 => {
                        self.prg[0] = data;
                        self.set_prg(ctx);
                    }
                    _ => {
                        self.prg[1] = data;
                        self.set_prg(ctx);
                    }
                }
            }
            0xA000 => {
                if !ctx.mem.header().four_screen {
                    ctx.mem.set_mirroring(if data & 0x01 != 0 {
                        Mirroring::Horizontal
                    } else {
                        Mirroring::Vertical
                    });
                }
            }
            0xC000 => match self.variant {
                v if v.counter_on_c000() => self.irq_counter = data,
                IrqVariant::FixedLatch => self.irq_latch = 0x07,
                _ => self.irq_latch = data,
            },
            0xC001 => {
                if self.variant.counter_on_c000() {
                    self.irq_latch = data;
                } else if ctx.scanline < VISIBLE_LINES || self.variant == IrqVariant::AlwaysArm {
                    self.irq_counter |= 0x80;
                    self.irq_reload = true;
                } else {
                    self.irq_counter |= 0x80;
                    self.irq_reload = false;
                    self.irq_reload_vblank = true;
                }
            }
            0xE000 => {
                self.irq_enabled = false;
                self.irq_request = false;
                ctx.clear_irq();
            }
            _ => {
                self.irq_enabled = true;
                self.irq_request = false;
            }
        }
    }

    fn h_sync(&mut self, ctx: &mut MapperCtx<'_>) {
        let counting = ctx.scanline < VISIBLE_LINES && ctx.display;
        match self.variant {
            IrqVariant::ReloadFirst => {
                if counting && self.irq_enabled {
                    if self.irq_counter == 0 {
                        self.irq_counter = self.irq_latch;
                        self.irq_request = true;
                    }
                    if self.irq_counter > 0 {
                        self.irq_counter -= 1;
                    }
                }
                if self.irq_request {
                    ctx.raise_irq();
                }
            }
            IrqVariant::DecrementFirst => {
                if counting && self.irq_enabled {
                    self.irq_counter = self.irq_counter.wrapping_sub(1);
                    if self.irq_counter == 0 {
                        self.irq_counter = self.irq_latch;
                        self.irq_request = true;
                    }
                }
                if self.irq_request {
                    ctx.raise_irq();
                }
            }
            _ => {
                if !counting {
                    return;
                }
                if self.irq_reload_vblank {
                    self.irq_counter = self.irq_latch;
                    self.irq_reload_vblank = false;
                }
                if self.irq_reload {
                    self.irq_counter = self.irq_latch;
                    self.irq_reload = false;
                    if self.variant == IrqVariant::EarlyLineZero && ctx.scanline == 0 {
                        self.irq_counter = self.irq_counter.wrapping_sub(1);
                    }
                } else if self.irq_counter > 0 {
                    self.irq_counter -= 1;
                }
                if self.irq_counter == 0 {
                    if self.irq_enabled {
                        self.irq_request = true;
                        ctx.raise_irq();
                    }
                    self.irq_reload = true;
                }
            }
        }
    }

    fn preferred_render_mode(&self) -> Option<RenderMode> {
        self.render_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Interrupts;
    use crate::mapper::test_support::{Harness, board};

    fn setup(patch: u64) -> (Mmc3, Harness) {
        let mut h = Harness::new(board(4, 8, 8));
        let mut m = Mmc3::new(patch);
        m.reset(&mut h.ctx());
        (m, h)
    }

    fn run_lines(m: &mut Mmc3, h: &mut Harness, lines: std::ops::Range<u16>) -> Option<u16> {
        for line in lines {
            h.scanline = line;
            m.h_sync(&mut h.ctx());
            if h.intr.is_set(Interrupts::MAPPER) {
                return Some(line);
            }
        }
        None
    }

    #[test]
    fn prg_mode_swaps_fixed_bank() {
        let (mut m, mut h) = setup(0);
        m.write(&mut h.ctx(), 0x8000, 6);
        m.write(&mut h.ctx(), 0x8001, 5);
        assert_eq!(h.prg_at(0x8000), 5);
        assert_eq!(h.prg_at(0xC000), 14);
        m.write(&mut h.ctx(), 0x8000, 0x46);
        assert_eq!(h.prg_at(0x8000), 14);
        assert_eq!(h.prg_at(0xC000), 5);
        assert_eq!(h.prg_at(0xE000), 15);
    }

    #[test]
    fn chr_2k_banks_ignore_low_bit_and_swap() {
        let (mut m, mut h) = setup(0);
        m.write(&mut h.ctx(), 0x8000, 0);
        m.write(&mut h.ctx(), 0x8001, 9);
        assert_eq!(h.chr_at(0x0000), 8);
        assert_eq!(h.chr_at(0x0400), 9);
        m.write(&mut h.ctx(), 0x8000, 0x80);
        assert_eq!(h.chr_at(0x1000), 8);
        assert_eq!(h.chr_at(0x0000), 4);
    }

    #[test]
    fn scanline_counter_fires_after_latch_lines() {
        let (mut m, mut h) = setup(0);
        h.scanline = 0;
        m.write(&mut h.ctx(), 0xC000, 3);
        m.write(&mut h.ctx(), 0xC001, 0);
        m.write(&mut h.ctx(), 0xE001, 0);
        assert_eq!(run_lines(&mut m, &mut h, 0..240), Some(3));

        m.write(&mut h.ctx(), 0xE000, 0);
        assert!(!h.intr.is_set(Interrupts::MAPPER));
    }

    #[test]
    fn counter_stalls_while_rendering_is_off() {
        let (mut m, mut h) = setup(0);
        m.write(&mut h.ctx(), 0xC000, 1);
        m.write(&mut h.ctx(), 0xC001, 0);
        m.write(&mut h.ctx(), 0xE001, 0);
        h.display = false;
        assert_eq!(run_lines(&mut m, &mut h, 0..240), None);
    }

    #[test]
    fn mirroring_register_respects_four_screen() {
        let (mut m, mut h) = setup(0);
        m.write(&mut h.ctx(), 0xA000, 0);
        assert_eq!(h.mem.ppu_window(9).offset, 0x400);
        m.write(&mut h.ctx(), 0xA000, 1);
        assert_eq!(h.mem.ppu_window(9).offset, 0);
    }

    #[test]
    fn patch_bits_pick_render_mode() {
        assert_eq!(Mmc3::new(0x20).preferred_render_mode(), Some(RenderMode::Tile));
        assert_eq!(Mmc3::new(0x40).preferred_render_mode(), Some(RenderMode::Post));
        assert_eq!(Mmc3::new(0).preferred_render_mode(), None);
    }

    #[test]
    fn expansion_ram_window() {
        let (mut m, mut h) = setup(0);
        m.write_low(&mut h.ctx(), 0x5432, 0x77);
        assert_eq!(m.read_low(&mut h.ctx(), 0x5432), 0x77);
        assert_eq!(m.read_low(&mut h.ctx(), 0x4FFF), 0xFF);
    }
}
