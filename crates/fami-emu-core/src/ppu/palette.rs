//! Master palette tables.
//!
//! The mask register selects one of sixteen tables: three colour-emphasis
//! bits plus greyscale. All of them are derived once from the 64-entry base
//! palette.

/// Standard 2C02 output as `(r, g, b)`.
const BASE: [(u8, u8, u8); 64] = [
    (84, 84, 84),
    (0, 30, 116),
    (8, 16, 144),
    (48, 0, 136),
    (68, 0, 100),
    (92, 0, 48),
    (84, 4, 0),
    (60, 24, 0),
    (32, 42, 0),
    (8, 58, 0),
    (0, 64, 0),
    (0, 60, 0),
    (0, 50, 60),
    (0, 0, 0),
    (0, 0, 0),
    (0, 0, 0),
    (152, 150, 152),
    (8, 76, 196),
    (48, 50, 236),
    (92, 30, 228),
    (136, 20, 176),
    (160, 20, 100),
    (152, 34, 32),
    (120, 60, 0),
    (84, 90, 0),
    (40, 114, 0),
    (8, 124, 0),
    (0, 118, 40),
    (0, 102, 120),
    (0, 0, 0),
    (0, 0, 0),
    (0, 0, 0),
    (236, 238, 236),
    (76, 154, 236),
    (120, 124, 236),
    (176, 98, 236),
    (228, 84, 236),
    (236, 88, 180),
    (236, 106, 100),
    (212, 136, 32),
    (160, 170, 0),
    (116, 196, 0),
    (76, 208, 32),
    (56, 204, 108),
    (56, 180, 204),
    (60, 60, 60),
    (0, 0, 0),
    (0, 0, 0),
    (236, 238, 236),
    (168, 204, 236),
    (188, 188, 236),
    (212, 178, 236),
    (236, 174, 236),
    (236, 174, 212),
    (236, 180, 176),
    (228, 196, 144),
    (204, 210, 120),
    (180, 222, 120),
    (168, 226, 144),
    (152, 226, 180),
    (160, 214, 228),
    (160, 162, 160),
    (0, 0, 0),
    (0, 0, 0),
];

pub const TABLES: usize = 16;

// Table index bits
const EMPHASIS_RED: usize = 0x01;
const EMPHASIS_GREEN: usize = 0x02;
const EMPHASIS_BLUE: usize = 0x04;
const GREYSCALE: usize = 0x08;

/// Opaque `0xAARRGGBB`.
#[inline]
const fn argb(r: u8, g: u8, b: u8) -> u32 {
    0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Channels not emphasised are attenuated to three quarters.
#[inline]
fn attenuate(c: u8, emphasis: usize, own: usize) -> u8 {
    if emphasis != 0 && emphasis & own == 0 {
        (c as u16 * 3 / 4) as u8
    } else {
        c
    }
}

pub struct Palette {
    tables: Box<[[u32; 64]; TABLES]>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

impl Palette {
    pub fn new() -> Self {
        let mut tables = Box::new([[0u32; 64]; TABLES]);
        for (index, table) in tables.iter_mut().enumerate() {
            let emphasis = index & 0x07;
            for (i, entry) in table.iter_mut().enumerate() {
                let src = if index & GREYSCALE != 0 { i & 0x30 } else { i };
                let (r, g, b) = BASE[src];
                *entry = argb(
                    attenuate(r, emphasis, EMPHASIS_RED),
                    attenuate(g, emphasis, EMPHASIS_GREEN),
                    attenuate(b, emphasis, EMPHASIS_BLUE),
                );
            }
        }
        Self { tables }
    }

    /// Table selected by the mask register value `mask`.
    #[inline]
    pub fn index_for_mask(mask: u8) -> usize {
        ((mask >> 5) | ((mask & 0x01) << 3)) as usize
    }

    #[inline]
    pub fn color(&self, table: usize, entry: u8) -> u32 {
        self.tables[table & (TABLES - 1)][(entry & 0x3F) as usize]
    }
}
