//! Banked storage behind the CPU and PPU address spaces.
//!
//! The CPU space is split into eight 8 KiB windows and the PPU space into
//! twelve 1 KiB windows (eight pattern windows, four nametable windows). Each
//! window is a (source, offset) pair into one of the storage pools; mappers
//! retarget windows, they never own storage.

use crate::cartridge::{Cartridge, Header};

pub const CPU_WINDOW_LEN: usize = 0x2000;
pub const PPU_WINDOW_LEN: usize = 0x0400;
pub const CPU_WINDOWS: usize = 8;
pub const PPU_WINDOWS: usize = 12;

pub const INTERNAL_RAM_LEN: usize = 0x0800;
pub const EXPANSION_RAM_LEN: usize = 0x2000;
pub const SAVE_RAM_LEN: usize = 0x2_0000;
pub const NAMETABLE_RAM_LEN: usize = 0x1000;
pub const PATTERN_RAM_LEN: usize = 0x8000;

/// Size of the battery-backed area exposed to the host.
pub const BATTERY_RAM_LEN: usize = 0x2000;

const SAVE_RAM_PAGES: usize = SAVE_RAM_LEN / CPU_WINDOW_LEN;
const PATTERN_RAM_PAGE_MASK: usize = 0x1F;
const NAMETABLE_PAGE_MASK: usize = 0x03;
const TRAINER_OFFSET: usize = 0x1000;

/// First PPU window index that holds a nametable.
pub const NAMETABLE_WINDOW: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// What a window is backed by, as seen by writers.
pub enum BankKind {
    Rom,
    Ram,
    Dram,
    Mapper,
    Vrom,
    Cram,
    Vram,
}

impl BankKind {
    #[inline]
    pub const fn is_writable(self) -> bool {
        !matches!(self, BankKind::Rom | BankKind::Vrom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Storage pool a window can point into.
pub enum Source {
    /// Cartridge PRG ROM, 8 KiB pages.
    Prg,
    /// 2 KiB console RAM.
    InternalRam,
    /// 8 KiB board expansion RAM.
    ExpansionRam,
    /// 128 KiB save/work RAM, 8 KiB pages.
    SaveRam,
    /// Cartridge CHR ROM, 1 KiB pages.
    Chr,
    /// 32 KiB pattern RAM, 1 KiB pages.
    PatternRam,
    /// 4 KiB nametable RAM, 1 KiB pages.
    Nametable,
}

impl Source {
    const fn kind(self) -> BankKind {
        match self {
            Source::Prg => BankKind::Rom,
            Source::InternalRam | Source::ExpansionRam | Source::SaveRam => BankKind::Ram,
            Source::Chr => BankKind::Vrom,
            Source::PatternRam => BankKind::Cram,
            Source::Nametable => BankKind::Vram,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Nametable layout over the physical nametable RAM.
pub enum Mirroring {
    #[default]
    Horizontal,
    Vertical,
    SingleLow,
    SingleHigh,
    FourScreen,
}

impl Mirroring {
    /// Physical nametable page for each of the four logical nametables.
    pub const fn pages(self) -> [usize; 4] {
        match self {
            Mirroring::Horizontal => [0, 0, 1, 1],
            Mirroring::Vertical => [0, 1, 0, 1],
            Mirroring::SingleLow => [0, 0, 0, 0],
            Mirroring::SingleHigh => [1, 1, 1, 1],
            Mirroring::FourScreen => [0, 1, 2, 3],
        }
    }

    pub fn from_header(header: &Header) -> Self {
        if header.four_screen {
            Mirroring::FourScreen
        } else if header.vertical {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub source: Source,
    pub offset: usize,
    pub kind: BankKind,
}

impl Window {
    const fn new(source: Source, offset: usize) -> Self {
        Self {
            source,
            offset,
            kind: source.kind(),
        }
    }
}

pub struct Memory {
    header: Header,
    prg: Vec<u8>,
    chr: Vec<u8>,
    trainer: Option<Vec<u8>>,

    pub ram: [u8; INTERNAL_RAM_LEN],
    pub xram: Box<[u8; EXPANSION_RAM_LEN]>,
    pub wram: Vec<u8>,
    pub vram: [u8; NAMETABLE_RAM_LEN],
    pub cram: Vec<u8>,

    cpu: [Window; CPU_WINDOWS],
    ppu: [Window; PPU_WINDOWS],

    prg_pages: usize,
    chr_pages: usize,
}

impl Memory {
    pub fn new(cart: Cartridge) -> Self {
        let prg_pages = (cart.prg.len() / CPU_WINDOW_LEN).max(1);
        let chr_pages = cart.chr.len() / PPU_WINDOW_LEN;
        let mut mem = Self {
            header: cart.header,
            prg: cart.prg,
            chr: cart.chr,
            trainer: cart.trainer,
            ram: [0; INTERNAL_RAM_LEN],
            xram: Box::new([0; EXPANSION_RAM_LEN]),
            wram: vec![0; SAVE_RAM_LEN],
            vram: [0; NAMETABLE_RAM_LEN],
            cram: vec![0; PATTERN_RAM_LEN],
            cpu: [Window::new(Source::InternalRam, 0); CPU_WINDOWS],
            ppu: [Window::new(Source::PatternRam, 0); PPU_WINDOWS],
            prg_pages,
            chr_pages,
        };
        mem.reset(true);
        mem
    }

    /// Restore the power-on window layout. Volatile RAM is cleared only on
    /// power-on; save RAM always survives.
    pub fn reset(&mut self, power_on: bool) {
        if power_on {
            self.ram.fill(0);
            self.xram.fill(0);
            self.vram.fill(0);
            self.cram.fill(0);
        }
        if let Some(trainer) = &self.trainer {
            let end = TRAINER_OFFSET + trainer.len();
            self.wram[TRAINER_OFFSET..end].copy_from_slice(trainer);
        }

        self.cpu[0] = Window::new(Source::InternalRam, 0);
        self.cpu[1] = Window::new(Source::ExpansionRam, 0);
        self.cpu[2] = Window::new(Source::ExpansionRam, 0);
        self.cpu[1].kind = BankKind::Rom;
        self.cpu[2].kind = BankKind::Rom;
        self.cpu[3] = Window::new(Source::SaveRam, 0);
        let last = self.prg_pages - 1;
        self.set_prg_32k4(0, 1, last.saturating_sub(1), last);

        self.set_chr_8k(0);
        self.set_mirroring(Mirroring::from_header(&self.header));
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// PRG ROM size in 8 KiB pages.
    pub fn prg_pages(&self) -> usize {
        self.prg_pages
    }

    /// CHR ROM size in 1 KiB pages. Zero on CHR-RAM boards.
    pub fn chr_pages(&self) -> usize {
        self.chr_pages
    }

    pub fn chr(&self) -> &[u8] {
        &self.chr
    }

    pub fn cpu_window(&self, index: usize) -> Window {
        self.cpu[index & 7]
    }

    pub fn ppu_window(&self, index: usize) -> Window {
        self.ppu[index % PPU_WINDOWS]
    }

    fn pool(&self, source: Source) -> &[u8] {
        match source {
            Source::Prg => &self.prg,
            Source::InternalRam => &self.ram,
            Source::ExpansionRam => &self.xram[..],
            Source::SaveRam => &self.wram,
            Source::Chr => &self.chr,
            Source::PatternRam => &self.cram,
            Source::Nametable => &self.vram,
        }
    }

    fn pool_mut(&mut self, source: Source) -> Option<&mut [u8]> {
        match source {
            Source::Prg | Source::Chr => None,
            Source::InternalRam => Some(&mut self.ram),
            Source::ExpansionRam => Some(&mut self.xram[..]),
            Source::SaveRam => Some(&mut self.wram),
            Source::PatternRam => Some(&mut self.cram),
            Source::Nametable => Some(&mut self.vram),
        }
    }

    #[inline]
    fn read_window(&self, w: Window, offset: usize) -> u8 {
        let pool = self.pool(w.source);
        pool.get(w.offset + offset).copied().unwrap_or(0)
    }

    #[inline]
    fn write_window(&mut self, w: Window, offset: usize, value: u8) {
        if !w.kind.is_writable() {
            return;
        }
        if let Some(slot) = self
            .pool_mut(w.source)
            .and_then(|pool| pool.get_mut(w.offset + offset))
        {
            *slot = value;
        }
    }

    /// Read through the CPU windows. `$0000-$1FFF` mirrors the 2 KiB RAM.
    #[inline]
    pub fn cpu_read(&self, addr: u16) -> u8 {
        if addr < 0x2000 {
            return self.ram[addr as usize & (INTERNAL_RAM_LEN - 1)];
        }
        let w = self.cpu[(addr >> 13) as usize];
        self.read_window(w, addr as usize & (CPU_WINDOW_LEN - 1))
    }

    /// Write through the CPU windows. ROM-backed windows drop the write.
    #[inline]
    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        if addr < 0x2000 {
            self.ram[addr as usize & (INTERNAL_RAM_LEN - 1)] = value;
            return;
        }
        let w = self.cpu[(addr >> 13) as usize];
        self.write_window(w, addr as usize & (CPU_WINDOW_LEN - 1), value);
    }

    #[inline]
    fn ppu_index(addr: u16) -> (usize, usize) {
        let mut addr = addr & 0x3FFF;
        if addr >= 0x3000 {
            addr &= 0xEFFF;
        }
        ((addr >> 10) as usize, addr as usize & (PPU_WINDOW_LEN - 1))
    }

    #[inline]
    pub fn ppu_read(&self, addr: u16) -> u8 {
        let (i, off) = Self::ppu_index(addr);
        self.read_window(self.ppu[i], off)
    }

    /// Writes to CHR ROM windows are ignored.
    #[inline]
    pub fn ppu_write(&mut self, addr: u16, value: u8) {
        let (i, off) = Self::ppu_index(addr);
        self.write_window(self.ppu[i], off, value);
    }

    /// Both bitplanes of one pattern row (`addr` and `addr + 8`).
    #[inline]
    pub fn pattern(&self, addr: u16) -> (u8, u8) {
        let (i, off) = Self::ppu_index(addr);
        let w = self.ppu[i];
        (self.read_window(w, off), self.read_window(w, off + 8))
    }

    /// Both bitplanes of one pattern row straight out of CHR ROM, bypassing
    /// the windows. `offset` wraps over the ROM size.
    #[inline]
    pub fn chr_pattern(&self, offset: usize) -> (u8, u8) {
        if self.chr.is_empty() {
            return (0, 0);
        }
        let len = self.chr.len();
        (self.chr[offset % len], self.chr[(offset + 8) % len])
    }

    /// Point CPU window `index` at `page` of `source`. Page numbers wrap over
    /// the size of the pool.
    pub fn set_cpu_window(&mut self, index: usize, source: Source, page: usize) {
        let page = match source {
            Source::Prg => page % self.prg_pages,
            Source::SaveRam => page % SAVE_RAM_PAGES,
            _ => 0,
        };
        self.cpu[index & 7] = Window::new(source, page * CPU_WINDOW_LEN);
    }

    /// Retag a CPU window without moving it (e.g. write-protect a RAM page).
    pub fn set_cpu_window_kind(&mut self, index: usize, kind: BankKind) {
        self.cpu[index & 7].kind = kind;
    }

    /// Point PPU window `index` at `page` of `source`. CHR requests on a board
    /// without CHR ROM fall back to pattern RAM.
    pub fn set_ppu_window(&mut self, index: usize, source: Source, page: usize) {
        let (source, page) = match source {
            Source::Chr if self.chr_pages == 0 => {
                (Source::PatternRam, page & PATTERN_RAM_PAGE_MASK)
            }
            Source::Chr => (Source::Chr, page % self.chr_pages),
            Source::PatternRam => (Source::PatternRam, page & PATTERN_RAM_PAGE_MASK),
            Source::Nametable => (Source::Nametable, page & NAMETABLE_PAGE_MASK),
            other => (other, 0),
        };
        self.ppu[index % PPU_WINDOWS] = Window::new(source, page * PPU_WINDOW_LEN);
    }

    pub fn set_prg_8k(&mut self, slot: usize, page: usize) {
        self.set_cpu_window(slot, Source::Prg, page);
    }

    pub fn set_prg_16k(&mut self, slot: usize, page: usize) {
        self.set_prg_8k(slot, page * 2);
        self.set_prg_8k(slot + 1, page * 2 + 1);
    }

    pub fn set_prg_32k(&mut self, page: usize) {
        for i in 0..4 {
            self.set_prg_8k(4 + i, page * 4 + i);
        }
    }

    pub fn set_prg_32k4(&mut self, p0: usize, p1: usize, p2: usize, p3: usize) {
        self.set_prg_8k(4, p0);
        self.set_prg_8k(5, p1);
        self.set_prg_8k(6, p2);
        self.set_prg_8k(7, p3);
    }

    pub fn set_save_ram_8k(&mut self, slot: usize, page: usize) {
        self.set_cpu_window(slot, Source::SaveRam, page);
    }

    pub fn set_chr_1k(&mut self, slot: usize, page: usize) {
        self.set_ppu_window(slot, Source::Chr, page);
    }

    pub fn set_chr_2k(&mut self, slot: usize, page: usize) {
        self.set_chr_1k(slot, page * 2);
        self.set_chr_1k(slot + 1, page * 2 + 1);
    }

    pub fn set_chr_4k(&mut self, slot: usize, page: usize) {
        for i in 0..4 {
            self.set_chr_1k(slot + i, page * 4 + i);
        }
    }

    pub fn set_chr_8k(&mut self, page: usize) {
        for i in 0..8 {
            self.set_chr_1k(i, page * 8 + i);
        }
    }

    pub fn set_cram_1k(&mut self, slot: usize, page: usize) {
        self.set_ppu_window(slot, Source::PatternRam, page);
    }

    pub fn set_cram_4k(&mut self, slot: usize, page: usize) {
        for i in 0..4 {
            self.set_cram_1k(slot + i, page * 4 + i);
        }
    }

    /// Map logical nametable `table` (0-3) onto physical page `page`.
    pub fn set_nametable(&mut self, table: usize, page: usize) {
        self.set_ppu_window(NAMETABLE_WINDOW + (table & 3), Source::Nametable, page);
    }

    pub fn set_nametables(&mut self, pages: [usize; 4]) {
        for (table, page) in pages.into_iter().enumerate() {
            self.set_nametable(table, page);
        }
    }

    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.set_nametables(mirroring.pages());
    }

    /// The battery-backed RAM area the host may persist.
    pub fn save_ram(&self) -> &[u8] {
        &self.wram[..BATTERY_RAM_LEN]
    }

    pub fn load_save_ram(&mut self, data: &[u8]) {
        let n = data.len().min(BATTERY_RAM_LEN);
        self.wram[..n].copy_from_slice(&data[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{CHR_PAGE_LEN, PRG_PAGE_LEN};

    fn cart(prg_pages: u8, chr_pages: u8, vertical: bool) -> Cartridge {
        let mut prg = vec![0u8; prg_pages as usize * PRG_PAGE_LEN];
        for (i, chunk) in prg.chunks_mut(CPU_WINDOW_LEN).enumerate() {
            chunk.fill(i as u8);
        }
        let mut chr = vec![0u8; chr_pages as usize * CHR_PAGE_LEN];
        for (i, chunk) in chr.chunks_mut(PPU_WINDOW_LEN).enumerate() {
            chunk.fill(0x80 | i as u8);
        }
        Cartridge {
            header: Header {
                prg_pages,
                chr_pages,
                vertical,
                save_ram: false,
                trainer: false,
                four_screen: false,
                mapper: 0,
            },
            prg,
            chr,
            trainer: None,
        }
    }

    #[test]
    fn initial_layout_maps_first_and_last_banks() {
        let mem = Memory::new(cart(4, 1, false));
        assert_eq!(mem.cpu_read(0x8000), 0);
        assert_eq!(mem.cpu_read(0xA000), 1);
        assert_eq!(mem.cpu_read(0xC000), 6);
        assert_eq!(mem.cpu_read(0xE000), 7);
        assert_eq!(mem.ppu_read(0x0000), 0x80);
        assert_eq!(mem.ppu_read(0x1C00), 0x87);
    }

    #[test]
    fn prg_pages_wrap_instead_of_faulting() {
        let mut mem = Memory::new(cart(2, 1, false));
        mem.set_prg_8k(4, 4 + 2);
        assert_eq!(mem.cpu_read(0x8000), 2);
        mem.set_prg_16k(6, 3);
        assert_eq!(mem.cpu_read(0xC000), 2);
        assert_eq!(mem.cpu_read(0xE000), 3);
        mem.set_chr_1k(0, 8 + 5);
        assert_eq!(mem.ppu_read(0x0000), 0x85);
    }

    #[test]
    fn rom_windows_ignore_writes() {
        let mut mem = Memory::new(cart(2, 1, false));
        mem.cpu_write(0x8000, 0xFF);
        assert_eq!(mem.cpu_read(0x8000), 0);
        mem.ppu_write(0x0010, 0xFF);
        assert_eq!(mem.ppu_read(0x0010), 0x80);
        mem.cpu_write(0x6000, 0x42);
        assert_eq!(mem.cpu_read(0x6000), 0x42);
        mem.set_cpu_window_kind(3, BankKind::Rom);
        mem.cpu_write(0x6000, 0x24);
        assert_eq!(mem.cpu_read(0x6000), 0x42);
    }

    #[test]
    fn chr_requests_fall_back_to_pattern_ram() {
        let mut mem = Memory::new(cart(1, 0, false));
        assert_eq!(mem.ppu_window(0).kind, BankKind::Cram);
        mem.ppu_write(0x0123, 0x5A);
        assert_eq!(mem.ppu_read(0x0123), 0x5A);
        mem.set_chr_8k(3);
        assert_eq!(mem.ppu_window(0).source, Source::PatternRam);
    }

    #[test]
    fn internal_ram_mirrors_every_2k() {
        let mut mem = Memory::new(cart(1, 1, false));
        mem.cpu_write(0x0001, 0x99);
        assert_eq!(mem.cpu_read(0x0801), 0x99);
        assert_eq!(mem.cpu_read(0x1801), 0x99);
    }

    #[test]
    fn mirroring_modes_alias_nametables() {
        let mut mem = Memory::new(cart(1, 1, false));
        let cases = [
            (Mirroring::Horizontal, [0, 0, 1, 1]),
            (Mirroring::Vertical, [0, 1, 0, 1]),
            (Mirroring::SingleLow, [0, 0, 0, 0]),
            (Mirroring::SingleHigh, [1, 1, 1, 1]),
            (Mirroring::FourScreen, [0, 1, 2, 3]),
        ];
        for (mode, pages) in cases {
            mem.set_mirroring(mode);
            mem.vram.fill(0);
            for (table, page) in pages.iter().enumerate() {
                mem.vram[page * PPU_WINDOW_LEN] = 0x10 + *page as u8;
                let addr = 0x2000 + (table as u16) * 0x400;
                assert_eq!(mem.ppu_read(addr), 0x10 + *page as u8, "{mode:?} table {table}");
                assert_eq!(mem.ppu_read(addr + 0x1000), 0x10 + *page as u8);
            }
        }
    }

    #[test]
    fn header_mirroring_is_applied_at_reset() {
        let mut mem = Memory::new(cart(1, 1, true));
        mem.ppu_write(0x2000, 1);
        assert_eq!(mem.ppu_read(0x2800), 1);
        assert_eq!(mem.ppu_read(0x2400), 0);
    }
}
