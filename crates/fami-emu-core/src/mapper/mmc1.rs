use super::{Mapper, MapperCtx};
use crate::memory::Mirroring;

/// 8 KiB PRG pages at which the board switches to the 512 KiB layout.
const LARGE_PRG_PAGES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SaveRamSwitch {
    None,
    /// Five serial writes to `$BFFF` select the save RAM page.
    Serial,
    /// CHR register 1 bits 3-4 select the save RAM page.
    ChrRegister,
}

/// Mapper 1. Serial-loaded control, CHR and PRG registers.
///
/// Carts with 512 KiB of PRG use CHR register 1 bit 4 as the outer PRG bank.
pub struct Mmc1 {
    save_ram_switch: SaveRamSwitch,
    large: bool,
    reg: [u8; 4],
    buf: u8,
    shift: u8,
    serial_count: u8,
    serial_bank: u8,
    prev_addr: u16,
}

impl Mmc1 {
    pub fn new(patch: u64) -> Self {
        let save_ram_switch = if patch & 0x01 != 0 {
            SaveRamSwitch::Serial
        } else if patch & 0x02 != 0 {
            SaveRamSwitch::ChrRegister
        } else {
            SaveRamSwitch::None
        };
        Self {
            save_ram_switch,
            large: false,
            reg: [0x0C, 0, 0, 0],
            buf: 0,
            shift: 0,
            serial_count: 0,
            serial_bank: 0,
            prev_addr: 0,
        }
    }

    fn set_mirroring(&self, ctx: &mut MapperCtx<'_>) {
        let mirroring = match self.reg[0] & 0x03 {
            0 => Mirroring::SingleLow,
            1 => Mirroring::SingleHigh,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        };
        ctx.mem.set_mirroring(mirroring);
    }

    fn set_chr(&self, ctx: &mut MapperCtx<'_>, changed: usize) {
        let mem = &mut *ctx.mem;
        let four_k = self.reg[0] & 0x10 != 0;
        if mem.chr_pages() != 0 {
            if four_k {
                mem.set_chr_4k(0, self.reg[1] as usize);
                mem.set_chr_4k(4, self.reg[2] as usize);
            } else {
                mem.set_chr_8k((self.reg[1] >> 1) as usize);
            }
        } else if four_k {
            if self.large {
                mem.set_cram_4k(0, self.reg[1] as usize);
                mem.set_cram_4k(4, self.reg[2] as usize);
            } else {
                mem.set_cram_4k(0, self.reg[changed] as usize);
            }
        }
    }

    fn set_prg(&self, ctx: &mut MapperCtx<'_>) {
        let mem = &mut *ctx.mem;
        let base = if self.large {
            (self.reg[1] & 0x10) as usize
        } else {
            0
        };
        let (bank, last) = if self.large {
            ((self.reg[3] & 0x0F) as usize, 15)
        } else {
            (self.reg[3] as usize, (mem.prg_pages() >> 1).saturating_sub(1))
        };
        if self.reg[0] & 0x08 != 0 {
            if self.reg[0] & 0x04 != 0 {
                mem.set_prg_16k(4, base + bank);
                mem.set_prg_16k(6, base + last);
            } else {
                mem.set_prg_16k(4, base);
                mem.set_prg_16k(6, base + bank);
            }
        } else {
            mem.set_prg_32k((self.reg[3] >> 1) as usize);
        }
    }

    fn serial_save_ram(&mut self, ctx: &mut MapperCtx<'_>, data: u8) {
        self.serial_count += 1;
        self.serial_bank += data & 0x01;
        if self.serial_count == 5 {
            let page = usize::from(self.serial_bank != 0);
            ctx.mem.set_save_ram_8k(3, page);
            self.serial_count = 0;
            self.serial_bank = 0;
        }
    }
}

impl Mapper for Mmc1 {
    fn reset(&mut self, ctx: &mut MapperCtx<'_>) {
        self.serial_count = 0;
        self.serial_bank = 0;
        self.reg = [0x0C, 0, 0, 0];
        self.buf = 0;
        self.shift = 0;
        self.prev_addr = 0;

        let n = ctx.mem.prg_pages();
        self.large = n >= LARGE_PRG_PAGES;
        if self.large {
            ctx.mem.set_prg_16k(4, 0);
            ctx.mem.set_prg_16k(6, 15);
        } else {
            ctx.mem.set_prg_32k4(0, 1, n - 2, n - 1);
        }
    }

    fn write(&mut self, ctx: &mut MapperCtx<'_>, addr: u16, data: u8) {
        if self.save_ram_switch == SaveRamSwitch::Serial && addr == 0xBFFF {
            self.serial_save_ram(ctx, data);
        }

        if !self.large {
            if addr & 0x6000 != self.prev_addr & 0x6000 {
                self.shift = 0;
                self.buf = 0;
            }
            self.prev_addr = addr;
        }
        if data & 0x80 != 0 {
            self.shift = 0;
            self.buf = 0;
            self.reg[0] |= 0x0C;
            return;
        }
        if data & 0x01 != 0 {
            self.buf |= 1 << self.shift;
        }
        self.shift += 1;
        if self.shift < 5 {
            return;
        }

        let index = ((addr & 0x7FFF) >> 13) as usize;
        self.reg[index] = self.buf;
        self.shift = 0;
        self.buf = 0;

        if !self.large {
            match index {
                0 => self.set_mirroring(ctx),
                1 | 2 => self.set_chr(ctx, index),
                _ => self.set_prg(ctx),
            }
            return;
        }

        if self.save_ram_switch == SaveRamSwitch::ChrRegister {
            let page = usize::from(self.reg[1] & 0x18 != 0);
            ctx.mem.set_save_ram_8k(3, page);
        }
        self.set_prg(ctx);
        self.set_chr(ctx, index);
        if index == 0 {
            self.set_mirroring(ctx);
        }
    }
}
