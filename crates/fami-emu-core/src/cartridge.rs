use std::{fs, path::Path};

use log::{info, warn};

use crate::error::LoadError;

pub const HEADER_LEN: usize = 16;
pub const TRAINER_LEN: usize = 512;
pub const PRG_PAGE_LEN: usize = 0x4000;
pub const CHR_PAGE_LEN: usize = 0x2000;

const MAGIC: &[u8; 4] = b"NES\x1a";

// Control byte 1 flags.
const CTRL1_VERTICAL: u8 = 0x01;
const CTRL1_SAVE_RAM: u8 = 0x02;
const CTRL1_TRAINER: u8 = 0x04;
const CTRL1_FOUR_SCREEN: u8 = 0x08;

/// Decoded 16-byte iNES header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// PRG ROM size in 16 KiB pages.
    pub prg_pages: u8,
    /// CHR ROM size in 8 KiB pages. Zero means the board carries CHR RAM.
    pub chr_pages: u8,
    pub vertical: bool,
    pub save_ram: bool,
    pub trainer: bool,
    pub four_screen: bool,
    pub mapper: u8,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Self, LoadError> {
        if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
            return Err(LoadError::BadMagic);
        }
        if data.len() < HEADER_LEN {
            return Err(LoadError::Truncated {
                section: "header",
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }
        let c1 = data[6];
        let c2 = data[7];
        Ok(Self {
            prg_pages: data[4],
            chr_pages: data[5],
            vertical: c1 & CTRL1_VERTICAL != 0,
            save_ram: c1 & CTRL1_SAVE_RAM != 0,
            trainer: c1 & CTRL1_TRAINER != 0,
            four_screen: c1 & CTRL1_FOUR_SCREEN != 0,
            mapper: (c1 >> 4) | (c2 & 0xF0),
        })
    }

    pub fn prg_len(&self) -> usize {
        self.prg_pages as usize * PRG_PAGE_LEN
    }

    pub fn chr_len(&self) -> usize {
        self.chr_pages as usize * CHR_PAGE_LEN
    }
}

/// A loaded cartridge image. Never mutated after load.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub header: Header,
    pub prg: Vec<u8>,
    pub chr: Vec<u8>,
    pub trainer: Option<Vec<u8>>,
}

impl Cartridge {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let data = fs::read(&path)?;
        let cart = Self::load(&data)?;
        info!(
            "Loaded ROM {}: mapper {}, PRG {}x16K, CHR {}x8K",
            path.as_ref().display(),
            cart.header.mapper,
            cart.header.prg_pages,
            cart.header.chr_pages
        );
        Ok(cart)
    }

    pub fn load(data: &[u8]) -> Result<Self, LoadError> {
        let header = Header::parse(data)?;
        if header.prg_pages == 0 {
            return Err(LoadError::EmptyPrg);
        }
        if !header.prg_pages.is_power_of_two() {
            warn!(
                "PRG page count {} is not a power of two; bank numbers will wrap unevenly",
                header.prg_pages
            );
        }

        let mut pos = HEADER_LEN;
        let trainer = if header.trainer {
            Some(take(data, &mut pos, TRAINER_LEN, "trainer")?.to_vec())
        } else {
            None
        };
        let prg = take(data, &mut pos, header.prg_len(), "PRG")?.to_vec();
        let chr = take(data, &mut pos, header.chr_len(), "CHR")?.to_vec();

        Ok(Self {
            header,
            prg,
            chr,
            trainer,
        })
    }

    pub fn mapper(&self) -> u8 {
        self.header.mapper
    }

    pub fn has_chr_rom(&self) -> bool {
        !self.chr.is_empty()
    }

    pub fn has_battery(&self) -> bool {
        self.header.save_ram
    }
}

fn take<'a>(
    data: &'a [u8],
    pos: &mut usize,
    len: usize,
    section: &'static str,
) -> Result<&'a [u8], LoadError> {
    let end = *pos + len;
    let slice = data.get(*pos..end).ok_or(LoadError::Truncated {
        section,
        expected: len,
        actual: data.len().saturating_sub(*pos),
    })?;
    *pos = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(prg: u8, chr: u8, c1: u8, c2: u8) -> Vec<u8> {
        let mut v = vec![b'N', b'E', b'S', 0x1A, prg, chr, c1, c2];
        v.resize(HEADER_LEN, 0);
        if c1 & CTRL1_TRAINER != 0 {
            v.extend(std::iter::repeat_n(0x77, TRAINER_LEN));
        }
        v.extend(std::iter::repeat_n(0xEA, prg as usize * PRG_PAGE_LEN));
        v.extend(std::iter::repeat_n(0x55, chr as usize * CHR_PAGE_LEN));
        v
    }

    #[test]
    fn mapper_number_uses_both_nibbles() {
        let cart = Cartridge::load(&image(1, 1, 0x41, 0x40)).unwrap();
        assert_eq!(cart.mapper(), 0x44);
        assert!(cart.header.vertical);
        assert!(!cart.header.four_screen);
    }

    #[test]
    fn trainer_precedes_prg() {
        let cart = Cartridge::load(&image(2, 0, CTRL1_TRAINER | CTRL1_SAVE_RAM, 0)).unwrap();
        assert_eq!(cart.trainer.as_deref().map(<[u8]>::len), Some(TRAINER_LEN));
        assert_eq!(cart.prg.len(), 2 * PRG_PAGE_LEN);
        assert!(cart.prg.iter().all(|&b| b == 0xEA));
        assert!(!cart.has_chr_rom());
        assert!(cart.has_battery());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = image(1, 0, 0, 0);
        data[3] = 0x1B;
        assert!(matches!(Cartridge::load(&data), Err(LoadError::BadMagic)));
    }

    #[test]
    fn truncated_chr_reports_section() {
        let mut data = image(1, 1, 0, 0);
        data.truncate(data.len() - 100);
        match Cartridge::load(&data) {
            Err(LoadError::Truncated {
                section,
                expected,
                actual,
            }) => {
                assert_eq!(section, "CHR");
                assert_eq!(expected, CHR_PAGE_LEN);
                assert_eq!(actual, CHR_PAGE_LEN - 100);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_prg_is_rejected() {
        assert!(matches!(
            Cartridge::load(&image(0, 1, 0, 0)),
            Err(LoadError::EmptyPrg)
        ));
    }
}
