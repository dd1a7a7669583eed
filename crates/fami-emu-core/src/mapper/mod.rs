//! Cartridge board logic.
//!
//! A mapper owns no storage. It reacts to bus traffic and scanline/cycle
//! ticks by retargeting [`Memory`] windows and raising the mapper interrupt
//! line. Every hook has a no-op default so simple boards only implement what
//! they wire up.

use log::warn;

use crate::{
    cpu::Interrupts,
    error::LoadError,
    hardware::RenderMode,
    memory::Memory,
};

mod axrom;
mod cnrom;
mod fme7;
mod mmc1;
mod mmc2;
mod mmc3;
mod mmc5;
mod nrom;
mod uxrom;

pub use axrom::Axrom;
pub use cnrom::Cnrom;
pub use fme7::Fme7;
pub use mmc1::Mmc1;
pub use mmc2::{Mmc2, Mmc4};
pub use mmc3::Mmc3;
pub use mmc5::Mmc5;
pub use nrom::Nrom;
pub use uxrom::Uxrom;

/// Everything a mapper hook may touch besides its own registers.
pub struct MapperCtx<'a> {
    pub mem: &'a mut Memory,
    pub intr: &'a mut Interrupts,
    /// Scanline the frame scheduler is currently on.
    pub scanline: u16,
    /// Background or sprite rendering is enabled.
    pub display: bool,
}

impl MapperCtx<'_> {
    #[inline]
    pub fn raise_irq(&mut self) {
        self.intr.raise(Interrupts::MAPPER);
    }

    #[inline]
    pub fn clear_irq(&mut self) {
        self.intr.clear(Interrupts::MAPPER);
    }
}

/// One background tile produced by a board that replaces the PPU fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtTile {
    pub lo: u8,
    pub hi: u8,
    /// Palette select already shifted into bits 2-3.
    pub attr: u8,
}

pub trait Mapper: Send {
    fn reset(&mut self, _ctx: &mut MapperCtx<'_>) {}

    /// Observe a CPU read from `$8000-$FFFF`.
    fn read(&mut self, _ctx: &mut MapperCtx<'_>, _addr: u16, _data: u8) {}

    /// CPU write to `$8000-$FFFF`.
    fn write(&mut self, _ctx: &mut MapperCtx<'_>, _addr: u16, _data: u8) {}

    /// CPU read from `$4100-$7FFF`.
    fn read_low(&mut self, ctx: &mut MapperCtx<'_>, addr: u16) -> u8 {
        read_save_ram(ctx.mem, addr)
    }

    /// CPU write to `$4100-$7FFF`.
    fn write_low(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        write_save_ram(ctx.mem, addr, data);
    }

    /// CPU read from an I/O offset the console does not decode.
    fn read_ex(&mut self, _ctx: &mut MapperCtx<'_>, _addr: u16) -> u8 {
        0
    }

    fn write_ex(&mut self, _ctx: &mut MapperCtx<'_>, _addr: u16, _data: u8) {}

    /// Called once per scanline after the PPU has advanced its counters.
    fn h_sync(&mut self, _ctx: &mut MapperCtx<'_>) {}

    /// Called once per frame at the start of vertical blank.
    fn v_sync(&mut self, _ctx: &mut MapperCtx<'_>) {}

    /// Called after every instruction (and DMA stall) with the CPU cycles
    /// just spent.
    fn clock(&mut self, _ctx: &mut MapperCtx<'_>, _cycles: i64) {}

    /// The PPU loaded a new VRAM address.
    fn ppu_latch(&mut self, _mem: &mut Memory, _addr: u16) {}

    /// The PPU fetched a pattern row at `addr`. Only delivered when
    /// [`Mapper::uses_chr_latch`] is true.
    fn ppu_chr_latch(&mut self, _mem: &mut Memory, _addr: u16) {}

    /// Tile column about to be fetched by the ext-latch path.
    fn ppu_ext_latch_x(&mut self, _x: u8) {}

    /// Offset added to sprite pattern addresses on ext-latch boards.
    fn ppu_ext_latch_sp_ofs(&self) -> u16 {
        0
    }

    /// Produce one background tile in place of the PPU's own fetch. Only
    /// delivered when [`Mapper::uses_ext_latch`] is true.
    fn ppu_ext_latch(&mut self, _mem: &Memory, _name_addr: u16, _ctrl: u8, _fine_y: u8) -> ExtTile {
        ExtTile::default()
    }

    fn uses_chr_latch(&self) -> bool {
        false
    }

    fn uses_ext_latch(&self) -> bool {
        false
    }

    /// Timing resolution this board needs, if it differs from the
    /// configured one.
    fn preferred_render_mode(&self) -> Option<RenderMode> {
        None
    }
}

/// `$6000-$7FFF` through CPU window 3; anything lower reads back the low
/// address byte.
pub fn read_save_ram(mem: &Memory, addr: u16) -> u8 {
    if (0x6000..=0x7FFF).contains(&addr) {
        mem.cpu_read(addr)
    } else {
        addr as u8
    }
}

pub fn write_save_ram(mem: &mut Memory, addr: u16, data: u8) {
    if (0x6000..=0x7FFF).contains(&addr) {
        mem.cpu_write(addr, data);
    }
}

/// Build the board for iNES mapper `number`.
pub fn create(number: u8, patch: u64) -> Result<Box<dyn Mapper>, LoadError> {
    let mapper: Box<dyn Mapper> = match number {
        0 => Box::new(Nrom),
        1 => Box::new(Mmc1::new(patch)),
        2 => Box::new(Uxrom::new(patch)),
        3 => Box::new(Cnrom),
        4 => Box::new(Mmc3::new(patch)),
        5 => Box::new(Mmc5::new(patch)),
        7 => Box::new(Axrom),
        9 => Box::new(Mmc2::default()),
        10 => Box::new(Mmc4::default()),
        69 => Box::new(Fme7::new(patch)),
        n => return Err(LoadError::UnsupportedMapper(n)),
    };
    let unknown = patch & !known_patch_bits(number);
    if unknown != 0 {
        warn!("mapper {number} ignores patch bits {unknown:#x}");
    }
    Ok(mapper)
}

/// Patch bits each board interprets.
fn known_patch_bits(number: u8) -> u64 {
    match number {
        1 | 2 => 0x03,
        4 => 0x7F,
        5 => 0x0F,
        69 => 0x01,
        _ => 0,
    }
}

/// Boards whose only job on the PPU side is switching CHR ROM.
pub fn switches_chr(number: u8) -> bool {
    matches!(number, 3 | 9 | 10)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cartridge::{CHR_PAGE_LEN, Cartridge, Header, PRG_PAGE_LEN};

    /// A cartridge whose every 8 KiB PRG page and 1 KiB CHR page is filled
    /// with its own page number (CHR pages get bit 7 set).
    pub fn board(mapper: u8, prg_pages: u8, chr_pages: u8) -> Memory {
        let mut prg = vec![0u8; prg_pages as usize * PRG_PAGE_LEN];
        for (i, page) in prg.chunks_mut(0x2000).enumerate() {
            page.fill(i as u8);
        }
        let mut chr = vec![0u8; chr_pages as usize * CHR_PAGE_LEN];
        for (i, page) in chr.chunks_mut(0x400).enumerate() {
            page.fill(0x80 | i as u8);
        }
        Memory::new(Cartridge {
            header: Header {
                prg_pages,
                chr_pages,
                vertical: false,
                save_ram: false,
                trainer: false,
                four_screen: false,
                mapper,
            },
            prg,
            chr,
            trainer: None,
        })
    }

    pub struct Harness {
        pub mem: Memory,
        pub intr: Interrupts,
        pub scanline: u16,
        pub display: bool,
    }

    impl Harness {
        pub fn new(mem: Memory) -> Self {
            Self {
                mem,
                intr: Interrupts::default(),
                scanline: 0,
                display: true,
            }
        }

        pub fn ctx(&mut self) -> MapperCtx<'_> {
            MapperCtx {
                mem: &mut self.mem,
                intr: &mut self.intr,
                scanline: self.scanline,
                display: self.display,
            }
        }

        /// CPU-visible page number at `addr`.
        pub fn prg_at(&self, addr: u16) -> u8 {
            self.mem.cpu_read(addr)
        }

        /// CHR page number (bit 7 stripped) visible at PPU `addr`.
        pub fn chr_at(&self, addr: u16) -> u8 {
            self.mem.ppu_read(addr) & 0x7F
        }
    }
}
