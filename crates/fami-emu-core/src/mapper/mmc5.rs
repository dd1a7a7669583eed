use super::{ExtTile, Mapper, MapperCtx, read_save_ram};
use crate::memory::{BankKind, Memory, PPU_WINDOW_LEN};

const VISIBLE_LINES: u16 = 240;
/// ExRAM lives in nametable page 2.
const EXRAM: usize = 0x0800;
const EXRAM_ATTR: usize = EXRAM + 0x03C0;

const STATUS_PENDING: u8 = 0x80;
const STATUS_IN_FRAME: u8 = 0x40;

/// Marker for "keep PRG ROM mapped" in the save-RAM page remap.
const ROM_PAGE: u8 = 8;

/// Mapper 5 (MMC5).
///
/// Background tiles are fetched through [`Mapper::ppu_ext_latch`] so the
/// board can apply its separate background CHR set, extended attributes,
/// fill mode and the vertical split.
pub struct Mmc5 {
    patch: u64,
    save_ram_layout: u8,
    irq_patch: bool,
    chr_patch: bool,

    prg_size: u8,
    chr_size: u8,
    save_ram_protect: [bool; 2],
    graph_mode: u8,
    fill_chr: u8,
    fill_pal: u8,
    /// `true` once the background register set (`$5128-$512B`) was written
    /// last.
    bg_chr_set: bool,
    split_control: u8,
    split_scroll: u8,
    split_page: u8,
    irq_enabled: bool,
    irq_status: u8,
    irq_clear: u8,
    irq_line: u8,
    irq_scanline: u8,
    mult: [u8; 2],
    split_x: u8,
    split_y: u8,
    split_addr: u16,

    nametable_types: [u8; 4],
    sprite_chr: [u8; 8],
    bg_chr: [u8; 8],
    /// Byte offsets into CHR ROM of the eight 1 KiB background banks.
    bg_banks: [usize; 8],
}

impl Mmc5 {
    pub fn new(patch: u64) -> Self {
        let save_ram_layout = if patch & 0x01 != 0 {
            1
        } else if patch & 0x02 != 0 {
            2
        } else {
            0
        };
        Self {
            patch,
            save_ram_layout,
            irq_patch: patch & 0x04 != 0,
            chr_patch: patch & 0x08 != 0,
            prg_size: 3,
            chr_size: 3,
            save_ram_protect: [false; 2],
            graph_mode: 0,
            fill_chr: 0,
            fill_pal: 0,
            bg_chr_set: false,
            split_control: 0,
            split_scroll: 0,
            split_page: 0,
            irq_enabled: false,
            irq_status: 0,
            irq_clear: 0,
            irq_line: 0,
            irq_scanline: 0,
            mult: [0; 2],
            split_x: 0,
            split_y: 0,
            split_addr: 0,
            nametable_types: [0; 4],
            sprite_chr: [0; 8],
            bg_chr: [0; 8],
            bg_banks: [0; 8],
        }
    }

    fn save_ram_writable(&self) -> bool {
        self.save_ram_protect[0] && self.save_ram_protect[1]
    }

    /// Point CPU window `slot` at save RAM page `page`, honouring the
    /// board's save RAM size. Pages the board lacks leave PRG ROM mapped.
    fn set_save_ram(&self, mem: &mut Memory, slot: usize, page: u8) {
        let page = match (self.save_ram_layout, page > 3) {
            (0, true) | (2, true) => ROM_PAGE,
            (0, false) => 0,
            (1, true) => 1,
            (1, false) => 0,
            _ => page,
        };
        if page == ROM_PAGE {
            mem.set_cpu_window_kind(slot, BankKind::Rom);
        } else {
            mem.set_save_ram_8k(slot, page as usize);
        }
    }

    fn set_sprite_chr(&self, mem: &mut Memory) {
        let c = &self.sprite_chr;
        match self.chr_size {
            0 => mem.set_chr_8k(c[7] as usize),
            1 => {
                mem.set_chr_4k(0, c[3] as usize);
                mem.set_chr_4k(4, c[7] as usize);
            }
            2 => {
                for slot in [0, 2, 4, 6] {
                    mem.set_chr_2k(slot, c[slot + 1] as usize);
                }
            }
            _ => {
                for (slot, &page) in c.iter().enumerate() {
                    mem.set_chr_1k(slot, page as usize);
                }
            }
        }
    }

    fn set_bg_chr(&mut self, mem: &Memory) {
        let pages = mem.chr_pages();
        if pages == 0 {
            return;
        }
        let size = 8usize >> self.chr_size;
        for start in (0..8).step_by(size) {
            let bank = self.bg_chr[start + size - 1] as usize;
            let first = (bank % (pages / size).max(1)) * size;
            for i in 0..size {
                self.bg_banks[start + i] = ((first + i) % pages) * PPU_WINDOW_LEN;
            }
        }
    }

    fn set_chr(&mut self, mem: &mut Memory) {
        if self.bg_chr_set {
            self.set_bg_chr(mem);
        } else {
            self.set_sprite_chr(mem);
        }
    }

    fn write_prg(&self, mem: &mut Memory, addr: u16, data: u8) {
        let slot = (addr & 0x07) as usize;
        if data & 0x80 != 0 {
            let page = (data & 0x7F) as usize;
            match (slot, self.prg_size) {
                (4, 3) => mem.set_prg_8k(4, page),
                (5, 1 | 2) => mem.set_prg_16k(4, page >> 1),
                (5, 3) => mem.set_prg_8k(5, page),
                (6, 2 | 3) => mem.set_prg_8k(6, page),
                (7, 0) => mem.set_prg_32k(page >> 2),
                (7, 1) => mem.set_prg_16k(6, page >> 1),
                (7, _) => mem.set_prg_8k(7, page),
                _ => {}
            }
        } else {
            match (slot, self.prg_size) {
                (4, 3) => self.set_save_ram(mem, 4, data & 0x07),
                (5, 1 | 2) => {
                    self.set_save_ram(mem, 4, data & 0x06);
                    self.set_save_ram(mem, 5, (data & 0x06) + 1);
                }
                (5, 3) => self.set_save_ram(mem, 5, data & 0x07),
                (6, 2 | 3) => self.set_save_ram(mem, 6, data & 0x07),
                _ => {}
            }
        }
    }

    fn write_exram(&self, mem: &mut Memory, addr: u16, data: u8) {
        let i = (addr & 0x03FF) as usize + EXRAM;
        match self.graph_mode {
            2 => mem.vram[i] = data,
            3 => {}
            _ => {
                mem.vram[i] = if self.irq_status & STATUS_IN_FRAME != 0 {
                    data
                } else {
                    0
                };
            }
        }
    }

    fn chr_4k_pages(mem: &Memory) -> usize {
        (mem.chr_pages() >> 2).max(1)
    }

    fn split_tile(&self, mem: &Memory) -> ExtTile {
        let name = (((self.split_addr & 0x03E0) | (self.split_x & 0x1F) as u16) & 0x03FF) as usize;
        let tile = ((self.split_page as usize % Self::chr_4k_pages(mem)) << 12)
            + ((mem.vram[name + EXRAM] as usize) << 4)
            + self.split_y as usize;
        let (lo, hi) = mem.chr_pattern(tile);
        let attr_index = ((name & 0x0380) >> 4) + ((name & 0x001C) >> 2) + EXRAM_ATTR;
        let attr = attribute_bits(mem.vram[attr_index], name as u16);
        ExtTile { lo, hi, attr }
    }
}

/// Pick the 2-bit palette for the tile at `name` out of an attribute byte,
/// shifted into palette-select position.
fn attribute_bits(mut a: u8, name: u16) -> u8 {
    if name & 0x0002 != 0 {
        a >>= 2;
    }
    if name & 0x0040 != 0 {
        a >>= 4;
    }
    (a & 0x03) << 2
}

impl Mapper for Mmc5 {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        *self = Self::new(self.patch);
        for i in 0..8 {
            self.sprite_chr[i] = i as u8;
            self.bg_chr[i] = (i as u8 & 0x03) | 0x04;
            self.bg_banks[i] = i * PPU_WINDOW_LEN;
        }

        let last = ctx.mem.prg_pages() - 1;
        ctx.mem.set_prg_32k4(last, last, last, last);
        ctx.mem.set_chr_8k(0);
        self.set_save_ram(ctx.mem, 3, 0);
    }

    fn read_low(&mut self, ctx: &mut MapperCtx<'_>, addr: u16) -> u8 {
        match addr {
            0x5015 => 0,
            0x5204 => {
                let data = self.irq_status;
                self.irq_status &= !STATUS_PENDING;
                ctx.clear_irq();
                data
            }
            0x5205 => self.mult[0].wrapping_mul(self.mult[1]),
            0x5206 => ((self.mult[0] as u16 * self.mult[1] as u16) >> 8) as u8,
            0x5C00..=0x5FFF if self.graph_mode >= 2 => {
                ctx.mem.vram[(addr & 0x03FF) as usize + EXRAM]
            }
            _ => read_save_ram(ctx.mem, addr),
        }
    }

    fn write_low(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        match addr {
            0x5100 => self.prg_size = data & 0x03,
            0x5101 => self.chr_size = data & 0x03,
            0x5102 => self.save_ram_protect[0] = data & 0x02 != 0,
            0x5103 => self.save_ram_protect[1] = data & 0x01 != 0,
            0x5104 => self.graph_mode = data & 0x03,
            0x5105 => {
                for table in 0..4 {
                    let t = (data >> (table * 2)) & 0x03;
                    self.nametable_types[table] = t;
                    ctx.mem.set_nametable(table, t as usize);
                }
            }
            0x5106 => self.fill_chr = data,
            0x5107 => self.fill_pal = data & 0x03,
            0x5113 => self.set_save_ram(ctx.mem, 3, data & 0x07),
            0x5114..=0x5117 => self.write_prg(ctx.mem, addr, data),
            0x5120..=0x5127 => {
                self.bg_chr_set = false;
                self.sprite_chr[(addr & 0x07) as usize] = data;
                self.set_chr(ctx.mem);
            }
            0x5128..=0x512B => {
                let i = (addr & 0x03) as usize;
                self.bg_chr_set = true;
                self.bg_chr[i] = data;
                self.bg_chr[i + 4] = data;
                self.set_chr(ctx.mem);
            }
            0x5200 => self.split_control = data,
            0x5201 => self.split_scroll = data,
            0x5202 => self.split_page = data & 0x3F,
            0x5203 => {
                self.irq_line = data;
                ctx.clear_irq();
            }
            0x5204 => {
                self.irq_enabled = data & 0x80 != 0;
                ctx.clear_irq();
            }
            0x5205 => self.mult[0] = data,
            0x5206 => self.mult[1] = data,
            0x5C00..=0x5FFF => self.write_exram(ctx.mem, addr, data),
            0x6000.. => {
                if self.save_ram_writable() && ctx.mem.cpu_window(3).kind == BankKind::Ram {
                    ctx.mem.cpu_write(addr, data);
                }
            }
            _ => {}
        }
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        if (0x8000..0xE000).contains(&addr) {
            let slot = (addr >> 13) as usize;
            if self.save_ram_writable() && ctx.mem.cpu_window(slot).kind == BankKind::Ram {
                ctx.mem.cpu_write(addr, data);
            }
        }
    }

    fn h_sync(&mut self, ctx: &mut MapperCtx<'_>) {
        let line = ctx.scanline;
        if self.irq_patch && self.irq_scanline == self.irq_line {
            self.irq_status |= STATUS_PENDING;
        }
        if ctx.display && line < VISIBLE_LINES {
            self.irq_scanline = self.irq_scanline.wrapping_add(1);
            self.irq_status |= STATUS_IN_FRAME;
            self.irq_clear = 0;
        } else if self.irq_patch {
            self.irq_scanline = 0;
            self.irq_status &= !(STATUS_PENDING | STATUS_IN_FRAME);
        }
        if !self.irq_patch {
            if self.irq_scanline == self.irq_line {
                self.irq_status |= STATUS_PENDING;
            }
            self.irq_clear = self.irq_clear.saturating_add(1);
            if self.irq_clear > 2 {
                self.irq_scanline = 0;
                self.irq_status &= !(STATUS_PENDING | STATUS_IN_FRAME);
                ctx.clear_irq();
            }
        }
        if self.irq_enabled && self.irq_status & STATUS_PENDING != 0 {
            ctx.raise_irq();
        }

        if line == 0 {
            self.split_y = self.split_scroll & 0x07;
            self.split_addr = ((self.split_scroll & 0xF8) as u16) << 2;
        } else if ctx.display {
            if self.split_y == 7 {
                self.split_y = 0;
                match self.split_addr & 0x03E0 {
                    0x03A0 | 0x03E0 => self.split_addr &= 0x001F,
                    _ => self.split_addr += 0x0020,
                }
            } else {
                self.split_y += 1;
            }
        }
    }

    fn ppu_ext_latch_x(&mut self, x: u8) {
        self.split_x = x;
    }

    fn ppu_ext_latch(&mut self, mem: &Memory, name_addr: u16, ctrl: u8, fine_y: u8) -> ExtTile {
        let split = self.split_control & 0x80 != 0
            && ((self.split_control & 0x40 == 0) == ((self.split_control & 0x1F) > self.split_x));
        if split {
            return self.split_tile(mem);
        }

        let fill = self.nametable_types[((name_addr & 0x0C00) >> 10) as usize] == 3;
        let name = (name_addr & 0x0FFF) | 0x2000;
        let fill_attr = (self.fill_pal << 2) & 0x0C;
        let exram = |name: u16| mem.vram[(name & 0x03FF) as usize + EXRAM];

        if self.graph_mode == 1 {
            let (mut tile, attr) = if fill {
                (((self.fill_chr as usize) << 4) + fine_y as usize, fill_attr)
            } else {
                (
                    ((mem.ppu_read(name) as usize) << 4) + fine_y as usize,
                    (exram(name) & 0xC0) >> 4,
                )
            };
            tile += ((exram(name) & 0x3F) as usize % Self::chr_4k_pages(mem)) << 12;
            let (lo, hi) = mem.chr_pattern(tile);
            return ExtTile { lo, hi, attr };
        }

        let mut tile = ((ctrl & 0x10) as usize) << 8;
        let attr = if fill {
            tile += ((self.fill_chr as usize) << 4) + fine_y as usize;
            fill_attr
        } else {
            let attr_addr = (name_addr & 0x0C00)
                + ((name_addr & 0x0380) >> 4)
                + ((name_addr & 0x001C) >> 2)
                + 0x23C0;
            tile += ((mem.ppu_read(name) as usize) << 4) + fine_y as usize;
            attribute_bits(mem.ppu_read(attr_addr), name)
        };
        let (lo, hi) = if self.chr_patch {
            mem.pattern(tile as u16)
        } else {
            mem.chr_pattern(self.bg_banks[(tile >> 10) & 7] + (tile & 0x03FF))
        };
        ExtTile { lo, hi, attr }
    }

    fn uses_ext_latch(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Interrupts;
    use crate::mapper::test_support::{Harness, board};

    fn setup() -> (Mmc5, Harness) {
        let mut h = Harness::new(board(5, 8, 8));
        let mut m = Mmc5::new(0);
        m.reset(&mut h.ctx());
        (m, h)
    }

    #[test]
    fn power_on_maps_last_bank_everywhere() {
        let (_, h) = setup();
        for addr in [0x8000, 0xA000, 0xC000, 0xE000] {
            assert_eq!(h.prg_at(addr), 15);
        }
    }

    #[test]
    fn prg_mode_3_switches_8k_banks() {
        let (mut m, mut h) = setup();
        m.write_low(&mut h.ctx(), 0x5100, 3);
        m.write_low(&mut h.ctx(), 0x5114, 0x82);
        m.write_low(&mut h.ctx(), 0x5115, 0x83);
        m.write_low(&mut h.ctx(), 0x5116, 0x84);
        m.write_low(&mut h.ctx(), 0x5117, 0x85);
        assert_eq!(h.prg_at(0x8000), 2);
        assert_eq!(h.prg_at(0xA000), 3);
        assert_eq!(h.prg_at(0xC000), 4);
        assert_eq!(h.prg_at(0xE000), 5);
    }

    #[test]
    fn multiplier() {
        let (mut m, mut h) = setup();
        m.write_low(&mut h.ctx(), 0x5205, 200);
        m.write_low(&mut h.ctx(), 0x5206, 3);
        assert_eq!(m.read_low(&mut h.ctx(), 0x5205), (600u16 & 0xFF) as u8);
        assert_eq!(m.read_low(&mut h.ctx(), 0x5206), (600u16 >> 8) as u8);
    }

    #[test]
    fn save_ram_needs_both_protect_registers() {
        let (mut m, mut h) = setup();
        m.write_low(&mut h.ctx(), 0x6000, 0x11);
        assert_eq!(h.mem.cpu_read(0x6000), 0);
        m.write_low(&mut h.ctx(), 0x5102, 0x02);
        m.write_low(&mut h.ctx(), 0x5103, 0x01);
        m.write_low(&mut h.ctx(), 0x6000, 0x11);
        assert_eq!(h.mem.cpu_read(0x6000), 0x11);
    }

    #[test]
    fn exram_writes_depend_on_mode() {
        let (mut m, mut h) = setup();
        m.write_low(&mut h.ctx(), 0x5104, 2);
        m.write_low(&mut h.ctx(), 0x5C10, 0x5A);
        assert_eq!(m.read_low(&mut h.ctx(), 0x5C10), 0x5A);
        m.write_low(&mut h.ctx(), 0x5104, 0);
        m.write_low(&mut h.ctx(), 0x5C10, 0x77);
        assert_eq!(h.mem.vram[EXRAM + 0x10], 0);
    }

    #[test]
    fn scanline_irq_and_status_acknowledge() {
        let (mut m, mut h) = setup();
        m.write_low(&mut h.ctx(), 0x5203, 10);
        m.write_low(&mut h.ctx(), 0x5204, 0x80);
        let mut fired = None;
        for line in 0..240 {
            h.scanline = line;
            m.h_sync(&mut h.ctx());
            if h.intr.is_set(Interrupts::MAPPER) {
                fired = Some(line);
                break;
            }
        }
        assert_eq!(fired, Some(9));
        let status = m.read_low(&mut h.ctx(), 0x5204);
        assert_eq!(status, STATUS_PENDING | STATUS_IN_FRAME);
        assert!(!h.intr.is_set(Interrupts::MAPPER));
    }

    #[test]
    fn fill_mode_tile_comes_from_fill_registers() {
        let (mut m, mut h) = setup();
        m.write_low(&mut h.ctx(), 0x5105, 0xFF);
        m.write_low(&mut h.ctx(), 0x5106, 0x41);
        m.write_low(&mut h.ctx(), 0x5107, 0x02);
        let t = m.ppu_ext_latch(&h.mem, 0x2000, 0x00, 3);
        assert_eq!(t.attr, 0x08);
        // tile $41 row 3 is at $0413, inside the second background bank
        assert_eq!(t.lo, 0x81);
        assert_eq!(t.hi, 0x81);
    }
}
