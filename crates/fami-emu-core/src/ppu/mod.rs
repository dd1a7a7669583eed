//! Picture chip.
//!
//! Rendering is scanline based. The bus decides how CPU time is interleaved
//! with the stages below (see [`crate::hardware::RenderMode`]):
//!
//! * [`Ppu::frame_start`] / [`Ppu::scanline_start`] / [`Ppu::scanline_next`]
//!   maintain the loopy scroll registers.
//! * [`Ppu::begin_line`], [`Ppu::fetch_tile`] and [`Ppu::finish_line`]
//!   render one line. [`Ppu::render_line`] runs all three back to back.
//!
//! Pixels go to an internal line buffer first and are copied into the
//! host's [`FrameBuffer`] when one is attached, so timing side effects such
//! as sprite 0 hit never depend on the host supplying a buffer.

mod palette;

pub use palette::Palette;

use crate::{
    cpu::Interrupts,
    mapper::Mapper,
    memory::Memory,
};

#[cfg(feature = "ppu-trace")]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "ppu-trace"))]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {};
}

/// Pixels per frame buffer row: the 256 visible pixels plus an 8-pixel
/// margin on each side that absorbs fine horizontal scroll.
pub const FRAME_WIDTH: usize = 256 + 16;
pub const FRAME_HEIGHT: usize = 240;
pub const FRAME_MARGIN: usize = 8;
pub const VISIBLE_WIDTH: usize = 256;

/// Tiles fetched per line; one more than fits so fine scroll has data.
pub const TILES_PER_LINE: u8 = 33;

const OAM_LEN: usize = 256;
const SPRITES: usize = 64;
const SPRITES_PER_LINE: usize = 8;

// $2000
const CTRL_NMI: u8 = 0x80;
const CTRL_SPRITE_16: u8 = 0x20;
const CTRL_BG_TABLE: u8 = 0x10;
const CTRL_SPRITE_TABLE: u8 = 0x08;
const CTRL_INC_32: u8 = 0x04;

// $2001
const MASK_SPRITES: u8 = 0x10;
const MASK_BG: u8 = 0x08;
const MASK_SPRITE_LEFT: u8 = 0x04;
const MASK_BG_LEFT: u8 = 0x02;

// $2002
const STATUS_VBLANK: u8 = 0x80;
const STATUS_SPRITE_0: u8 = 0x40;
const STATUS_OVERFLOW: u8 = 0x20;

// Sprite attribute byte
const ATTR_FLIP_V: u8 = 0x80;
const ATTR_FLIP_H: u8 = 0x40;
const ATTR_BEHIND: u8 = 0x20;
const ATTR_PALETTE: u8 = 0x03;

const BLACK: u32 = 0xFF00_0000;

/// Host-owned picture, `0xAARRGGBB`, [`FRAME_WIDTH`] × [`FRAME_HEIGHT`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    pixels: Box<[u32]>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            pixels: vec![BLACK; FRAME_WIDTH * FRAME_HEIGHT].into_boxed_slice(),
        }
    }

    /// All rows including margins.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// The 256 visible pixels of row `y`.
    pub fn visible_row(&self, y: usize) -> &[u32] {
        let start = y * FRAME_WIDTH + FRAME_MARGIN;
        &self.pixels[start..start + VISIBLE_WIDTH]
    }

    /// Visible pixel at (`x`, `y`).
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * FRAME_WIDTH + FRAME_MARGIN + x]
    }

    fn row_mut(&mut self, y: usize) -> &mut [u32] {
        let start = y * FRAME_WIDTH;
        &mut self.pixels[start..start + FRAME_WIDTH]
    }
}

/// Background fetch cursor for the line being rendered.
#[derive(Clone, Copy, Default)]
struct TileFetch {
    /// Nametable address of the next tile (`$2000-$2FFF`).
    name: u16,
    /// Tile column within the nametable.
    x: u8,
    /// Line buffer position of the next tile's first pixel.
    pos: usize,
    /// Pattern bytes and palette select of the previous tile.
    prev: Option<(u8, u8, u8)>,
}

pub struct Ppu {
    ctrl: u8,
    mask: u8,
    status: u8,
    oam_addr: u8,
    read_buf: u8,

    /// Current VRAM address.
    v: u16,
    /// Temporary VRAM address.
    t: u16,
    fine_x: u8,
    /// Fine Y of the line being rendered.
    fine_y: u8,
    /// Fine X latched for the line being rendered.
    shift: u8,
    toggle: bool,

    bg_pal: [u8; 16],
    sp_pal: [u8; 16],
    pub oam: [u8; OAM_LEN],

    chr_latch: bool,
    ext_latch: bool,

    palette: Palette,
    table: usize,

    line: [u32; FRAME_WIDTH],
    /// Opaque-pixel mask per fetched tile, for sprite 0 hit and priority.
    bg_opaque: [u8; TILES_PER_LINE as usize + 1],
    fetch: TileFetch,
    scanline: u16,

    screen: Option<FrameBuffer>,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            read_buf: 0xFF,
            v: 0,
            t: 0,
            fine_x: 0,
            fine_y: 0,
            shift: 0,
            toggle: false,
            bg_pal: [0; 16],
            sp_pal: [0; 16],
            oam: [0; OAM_LEN],
            chr_latch: false,
            ext_latch: false,
            palette: Palette::new(),
            table: 0,
            line: [BLACK; FRAME_WIDTH],
            bg_opaque: [0; TILES_PER_LINE as usize + 1],
            fetch: TileFetch::default(),
            scanline: 0,
            screen: None,
        }
    }

    /// Clear registers. Palette RAM and OAM are only cleared on power-on.
    pub fn reset(&mut self, power_on: bool, mapper: &dyn Mapper) {
        if power_on {
            self.bg_pal = [0; 16];
            self.sp_pal = [0; 16];
            self.oam = [0; OAM_LEN];
        }
        self.ctrl = 0;
        self.mask = 0;
        self.status = 0;
        self.oam_addr = 0;
        self.read_buf = 0xFF;
        self.v = 0;
        self.t = 0;
        self.fine_x = 0;
        self.fine_y = 0;
        self.shift = 0;
        self.toggle = false;
        self.table = 0;
        self.scanline = 0;
        self.chr_latch = mapper.uses_chr_latch();
        self.ext_latch = mapper.uses_ext_latch();
    }

    pub fn set_frame_buffer(&mut self, screen: Option<FrameBuffer>) -> Option<FrameBuffer> {
        std::mem::replace(&mut self.screen, screen)
    }

    pub fn frame_buffer(&self) -> Option<&FrameBuffer> {
        self.screen.as_ref()
    }

    /// Background or sprites enabled.
    #[inline]
    pub fn is_rendering(&self) -> bool {
        self.mask & (MASK_BG | MASK_SPRITES) != 0
    }

    #[inline]
    pub fn ctrl(&self) -> u8 {
        self.ctrl
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Current VRAM address (loopy v).
    #[inline]
    pub fn vram_addr(&self) -> u16 {
        self.v
    }

    #[inline]
    fn increment(&self) -> u16 {
        if self.ctrl & CTRL_INC_32 != 0 { 32 } else { 1 }
    }

    /// CPU read from `$2000-$2007`; `addr` is already reduced to that range.
    pub fn read_register(&mut self, mem: &Memory, addr: u16) -> u8 {
        match addr & 0x07 {
            2 => {
                let data = self.status;
                self.toggle = false;
                self.status &= !STATUS_VBLANK;
                data
            }
            4 => {
                let data = self.oam[self.oam_addr as usize];
                self.oam_addr = self.oam_addr.wrapping_add(1);
                data
            }
            7 => {
                let vaddr = self.v & 0x3FFF;
                self.v = self.v.wrapping_add(self.increment()) & 0x7FFF;
                if vaddr >= 0x3F00 {
                    return self.palette_entry(vaddr);
                }
                let data = self.read_buf;
                self.read_buf = mem.ppu_read(vaddr);
                data
            }
            _ => self.read_buf,
        }
    }

    /// CPU write to `$2000-$2007`.
    pub fn write_register(
        &mut self,
        mem: &mut Memory,
        mapper: &mut dyn Mapper,
        intr: &mut Interrupts,
        addr: u16,
        data: u8,
    ) {
        ppu_trace!("PPU write {:04X} <- {:02X}", addr, data);
        match addr & 0x07 {
            0 => {
                self.t = (self.t & 0xF3FF) | (((data & 0x03) as u16) << 10);
                if data & CTRL_NMI != 0
                    && self.ctrl & CTRL_NMI == 0
                    && self.status & STATUS_VBLANK != 0
                {
                    intr.raise(Interrupts::NMI);
                }
                self.ctrl = data;
            }
            1 => self.mask = data,
            3 => self.oam_addr = data,
            4 => {
                self.oam[self.oam_addr as usize] = data;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            5 => {
                if !self.toggle {
                    self.t = (self.t & 0xFFE0) | (data >> 3) as u16;
                    self.fine_x = data & 0x07;
                } else {
                    self.t = (self.t & 0xFC1F) | (((data & 0xF8) as u16) << 2);
                    self.t = (self.t & 0x8FFF) | (((data & 0x07) as u16) << 12);
                }
                self.toggle = !self.toggle;
            }
            6 => {
                if !self.toggle {
                    self.t = (self.t & 0x00FF) | (((data & 0x3F) as u16) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | data as u16;
                    self.v = self.t;
                    mapper.ppu_latch(mem, self.v);
                }
                self.toggle = !self.toggle;
            }
            7 => {
                let vaddr = self.v & 0x3FFF;
                self.v = self.v.wrapping_add(self.increment()) & 0x7FFF;
                if vaddr >= 0x3F00 {
                    self.set_palette_entry(vaddr, data);
                } else {
                    mem.ppu_write(vaddr, data);
                }
            }
            _ => {}
        }
    }

    fn palette_entry(&self, vaddr: u16) -> u8 {
        let i = (vaddr & 0x0F) as usize;
        if vaddr & 0x10 == 0 {
            self.bg_pal[i]
        } else {
            self.sp_pal[i]
        }
    }

    /// Palette RAM write. Entry 0 of every sub-palette mirrors the backdrop.
    fn set_palette_entry(&mut self, vaddr: u16, data: u8) {
        let data = data & 0x3F;
        let i = (vaddr & 0x0F) as usize;
        if i == 0 {
            self.bg_pal[0] = data;
            self.sp_pal[0] = data;
        } else if vaddr & 0x10 == 0 {
            self.bg_pal[i] = data;
        } else {
            self.sp_pal[i] = data;
        }
        let backdrop = self.bg_pal[0];
        for i in [0x04, 0x08, 0x0C] {
            self.bg_pal[i] = backdrop;
        }
        for i in [0x00, 0x04, 0x08, 0x0C] {
            self.sp_pal[i] = backdrop;
        }
    }

    /// Copy one 256-byte page into sprite memory.
    pub fn load_oam(&mut self, page: &[u8; OAM_LEN]) {
        self.oam.copy_from_slice(page);
    }

    /// Start of vertical blank. Raises NMI when enabled.
    pub fn start_vblank(&mut self, intr: &mut Interrupts) {
        self.status |= STATUS_VBLANK;
        if self.ctrl & CTRL_NMI != 0 {
            intr.raise(Interrupts::NMI);
        }
    }

    /// Pre-render line: drop all status flags.
    pub fn end_vblank(&mut self) {
        self.status &= !(STATUS_VBLANK | STATUS_SPRITE_0 | STATUS_OVERFLOW);
    }

    /// First line of a frame. Reloads the scroll and blanks row 0, which is
    /// never rendered.
    pub fn frame_start(&mut self) {
        if self.is_rendering() {
            self.v = self.t;
            self.shift = self.fine_x;
            self.fine_y = ((self.v & 0x7000) >> 12) as u8;
        }
        if let Some(screen) = self.screen.as_mut() {
            screen.row_mut(0).fill(BLACK);
        }
    }

    /// Horizontal reload at the end of a line's active window.
    pub fn scanline_start(&mut self, mem: &mut Memory, mapper: &mut dyn Mapper) {
        if self.is_rendering() {
            self.v = (self.v & 0xFBE0) | (self.t & 0x041F);
            self.shift = self.fine_x;
            self.fine_y = ((self.v & 0x7000) >> 12) as u8;
            mapper.ppu_latch(mem, (self.v & 0x0FFF) | 0x2000);
        }
    }

    /// Vertical increment: fine Y, then coarse Y. Row 29 wraps to the other
    /// vertical nametable; rows 30 and 31 wrap without switching.
    pub fn scanline_next(&mut self) {
        if !self.is_rendering() {
            return;
        }
        if self.v & 0x7000 == 0x7000 {
            self.v &= 0x8FFF;
            match self.v & 0x03E0 {
                0x03A0 => {
                    self.v ^= 0x0800;
                    self.v &= 0xFC1F;
                }
                0x03E0 => self.v &= 0xFC1F,
                _ => self.v += 0x0020,
            }
        } else {
            self.v += 0x1000;
        }
        self.fine_y = ((self.v & 0x7000) >> 12) as u8;
    }

    /// Prepare line `scanline` (1-239). Returns whether background tiles
    /// must be fetched with [`Ppu::fetch_tile`].
    pub fn begin_line(&mut self, scanline: u16) -> bool {
        self.scanline = scanline;
        if scanline == 1 {
            self.table = Palette::index_for_mask(self.mask);
        }
        self.bg_opaque = [0; TILES_PER_LINE as usize + 1];
        if self.mask & MASK_BG == 0 {
            let backdrop = self.palette.color(self.table, self.bg_pal[0]);
            self.line.fill(backdrop);
            return false;
        }
        let name = (self.v & 0x0FFF) | 0x2000;
        self.fetch = TileFetch {
            name,
            x: (name & 0x1F) as u8,
            pos: FRAME_MARGIN - self.shift as usize,
            prev: None,
        };
        true
    }

    /// Fetch and draw background tile `i` of the current line.
    pub fn fetch_tile(&mut self, mem: &mut Memory, mapper: &mut dyn Mapper, i: u8) {
        let name = self.fetch.name;
        let (lo, hi, attr) = if self.ext_latch {
            mapper.ppu_ext_latch_x(i);
            let ext = mapper.ppu_ext_latch(mem, name, self.ctrl, self.fine_y);
            (ext.lo, ext.hi, ext.attr & 0x0C)
        } else {
            let tile = (((self.ctrl & CTRL_BG_TABLE) as u16) << 8)
                + ((mem.ppu_read(name) as u16) << 4)
                + self.fine_y as u16;
            let x = self.fetch.x;
            let attr_addr = (name & 0x2C00) | ((name & 0x0380) >> 4) | 0x03C0 | (x >> 2) as u16;
            let attr_shift = (x & 0x02) | ((name as u8 & 0x40) >> 4);
            let attr = ((mem.ppu_read(attr_addr) >> attr_shift) & 0x03) << 2;
            let (lo, hi) = mem.pattern(tile);
            if self.chr_latch {
                mapper.ppu_chr_latch(mem, tile);
            }
            (lo, hi, attr)
        };

        let pos = self.fetch.pos;
        let i = i as usize;
        if i != 0 && self.fetch.prev == Some((lo, hi, attr)) {
            self.line.copy_within(pos - 8..pos, pos);
            self.bg_opaque[i] = self.bg_opaque[i - 1];
        } else {
            self.fetch.prev = Some((lo, hi, attr));
            self.bg_opaque[i] = lo | hi;
            for px in 0..8 {
                let bit = 7 - px;
                let c = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
                self.line[pos + px] = self
                    .palette
                    .color(self.table, self.bg_pal[(attr + c) as usize]);
            }
        }
        self.fetch.pos += 8;

        self.fetch.x += 1;
        if self.fetch.x == 32 {
            self.fetch.x = 0;
            self.fetch.name ^= 0x041F;
        } else {
            self.fetch.name += 1;
        }
    }

    /// Left-column clip, sprites, and hand-off to the frame buffer.
    pub fn finish_line(&mut self, mem: &mut Memory, mapper: &mut dyn Mapper, all_sprites: bool) {
        if self.mask & MASK_BG != 0 && self.mask & MASK_BG_LEFT == 0 {
            let backdrop = self.palette.color(self.table, self.bg_pal[0]);
            self.line[FRAME_MARGIN..FRAME_MARGIN + 8].fill(backdrop);
        }
        self.status &= !STATUS_OVERFLOW;
        if self.scanline < FRAME_HEIGHT as u16 && self.mask & MASK_SPRITES != 0 {
            self.render_sprites(mem, mapper, all_sprites);
        }
        let y = self.scanline as usize;
        if let Some(screen) = self.screen.as_mut()
            && y < FRAME_HEIGHT
        {
            screen.row_mut(y).copy_from_slice(&self.line);
        }
    }

    /// Whole line in one go.
    pub fn render_line(&mut self, mem: &mut Memory, mapper: &mut dyn Mapper, scanline: u16, all_sprites: bool) {
        if self.begin_line(scanline) {
            for i in 0..TILES_PER_LINE {
                self.fetch_tile(mem, mapper, i);
            }
        }
        self.finish_line(mem, mapper, all_sprites);
    }

    /// Background opaque mask for the 8 screen pixels starting at `x`.
    fn bg_mask_at(&self, x: u8) -> u8 {
        let start = x as u16 + self.shift as u16;
        let pos = (start >> 3) as usize;
        let sh = 8 - (start & 0x07);
        let m16 = ((self.bg_opaque[pos] as u16) << 8) | self.bg_opaque[pos + 1] as u16;
        (m16 >> sh) as u8
    }

    fn render_sprites(&mut self, mem: &mut Memory, mapper: &mut dyn Mapper, all_sprites: bool) {
        let line = self.scanline as u8;
        let height: u8 = if self.ctrl & CTRL_SPRITE_16 != 0 { 15 } else { 7 };
        // Pixels already claimed by a higher-priority sprite, by screen tile.
        let mut claimed = [0u8; TILES_PER_LINE as usize + 1];
        if self.mask & MASK_SPRITE_LEFT == 0 {
            claimed[0] = 0xFF;
        }
        let sp_ofs = if self.ext_latch {
            mapper.ppu_ext_latch_sp_ofs()
        } else {
            0
        };

        let mut drawn = 0;
        for i in 0..SPRITES {
            let entry = &self.oam[i * 4..i * 4 + 4];
            let (y, tile, attr, x) = (entry[0], entry[1], entry[2], entry[3]);
            let dy = line.wrapping_sub(y).wrapping_sub(1);
            if y >= line || dy > height {
                continue;
            }
            if drawn == SPRITES_PER_LINE {
                self.status |= STATUS_OVERFLOW;
                if !all_sprites {
                    break;
                }
            }

            let mut addr = if height == 7 {
                let base = (((self.ctrl & CTRL_SPRITE_TABLE) as u16) << 9) | ((tile as u16) << 4);
                base + if attr & ATTR_FLIP_V == 0 { dy } else { 7 - dy } as u16
            } else {
                let base = (((tile & 0x01) as u16) << 12) | (((tile & 0xFE) as u16) << 4);
                let row = if attr & ATTR_FLIP_V == 0 {
                    ((dy & 0x08) << 1) | (dy & 0x07)
                } else {
                    ((!dy & 0x08) << 1) | (7 - (dy & 0x07))
                };
                base + row as u16
            };
            addr = addr.wrapping_add(sp_ofs);

            let (mut lo, mut hi) = mem.pattern(addr);
            if self.chr_latch {
                mapper.ppu_chr_latch(mem, addr);
            }
            if attr & ATTR_FLIP_H != 0 {
                lo = lo.reverse_bits();
                hi = hi.reverse_bits();
            }
            let mut opaque = lo | hi;

            let bg = self.bg_mask_at(x);
            if i == 0 && self.status & STATUS_SPRITE_0 == 0 && opaque & bg != 0 {
                self.status |= STATUS_SPRITE_0;
            }

            let pos = (x >> 3) as usize;
            let sh = 8 - (x & 0x07) as u16;
            let taken = ((((claimed[pos] as u16) << 8) | claimed[pos + 1] as u16) >> sh) as u8;
            opaque &= !taken;
            let claim = (opaque as u16) << sh;
            claimed[pos] |= (claim >> 8) as u8;
            claimed[pos + 1] |= claim as u8;
            if attr & ATTR_BEHIND != 0 {
                opaque &= !bg;
            }

            let pal = ((attr & ATTR_PALETTE) << 2) as usize;
            let start = x as usize + FRAME_MARGIN;
            for px in 0..8 {
                let bit = 7 - px;
                if opaque & (1 << bit) == 0 {
                    continue;
                }
                let c = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
                self.line[start + px] = self.palette.color(self.table, self.sp_pal[pal + c as usize]);
            }
            drawn += 1;
        }
    }
}
