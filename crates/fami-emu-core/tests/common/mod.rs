#![allow(dead_code)]

use fami_emu_core::{Config, Nes};

pub const PRG_BANK_LEN: usize = 0x4000;
pub const CHR_BANK_LEN: usize = 0x2000;

/// Where the builder places the program, NMI handler and IRQ handler. All
/// three sit in the last 8 KiB of PRG, which every supported board keeps
/// fixed at `$E000` after reset.
pub const PROGRAM: u16 = 0xE000;
pub const NMI_HANDLER: u16 = 0xF000;
pub const IRQ_HANDLER: u16 = 0xF800;

const RTI: u8 = 0x40;
const NOP: u8 = 0xEA;

/// Assembles an iNES image in memory so no ROM binaries are checked in.
#[derive(Clone)]
pub struct Image {
    pub mapper: u8,
    /// 16 KiB units.
    pub prg_pages: u8,
    /// 8 KiB units.
    pub chr_pages: u8,
    pub vertical: bool,
    pub four_screen: bool,
    pub battery: bool,
    pub trainer: Option<Vec<u8>>,
    pub program: Vec<u8>,
    pub nmi: Vec<u8>,
    pub irq: Vec<u8>,
}

impl Image {
    pub fn new(mapper: u8) -> Self {
        Self {
            mapper,
            prg_pages: 2,
            chr_pages: 1,
            vertical: false,
            four_screen: false,
            battery: false,
            trainer: None,
            program: jump_to_self(PROGRAM),
            nmi: vec![RTI],
            irq: vec![RTI],
        }
    }

    pub fn prg_pages(mut self, pages: u8) -> Self {
        self.prg_pages = pages;
        self
    }

    pub fn chr_pages(mut self, pages: u8) -> Self {
        self.chr_pages = pages;
        self
    }

    pub fn vertical(mut self) -> Self {
        self.vertical = true;
        self
    }

    pub fn four_screen(mut self) -> Self {
        self.four_screen = true;
        self
    }

    pub fn battery(mut self) -> Self {
        self.battery = true;
        self
    }

    pub fn trainer(mut self, data: Vec<u8>) -> Self {
        self.trainer = Some(data);
        self
    }

    pub fn program(mut self, code: &[u8]) -> Self {
        self.program = code.to_vec();
        self
    }

    pub fn nmi(mut self, code: &[u8]) -> Self {
        self.nmi = code.to_vec();
        self
    }

    pub fn irq(mut self, code: &[u8]) -> Self {
        self.irq = code.to_vec();
        self
    }

    pub fn header(&self) -> [u8; 16] {
        let mut h = [0u8; 16];
        h[..4].copy_from_slice(b"NES\x1a");
        h[4] = self.prg_pages;
        h[5] = self.chr_pages;
        h[6] = (self.mapper << 4)
            | u8::from(self.vertical)
            | (u8::from(self.battery) << 1)
            | (u8::from(self.trainer.is_some()) << 2)
            | (u8::from(self.four_screen) << 3);
        h[7] = self.mapper & 0xF0;
        h
    }

    /// Serialise the image. PRG is NOP-filled except for the code and the
    /// first byte of each 16 KiB bank, which holds the bank number.
    pub fn build(&self) -> Vec<u8> {
        let mut prg = vec![NOP; self.prg_pages as usize * PRG_BANK_LEN];
        for (i, bank) in prg.chunks_mut(PRG_BANK_LEN).enumerate() {
            bank[0] = i as u8;
        }
        let len = prg.len();
        let mut place = |addr: u16, code: &[u8]| {
            let at = len + addr as usize - 0x10000;
            prg[at..at + code.len()].copy_from_slice(code);
        };
        place(PROGRAM, &self.program);
        place(NMI_HANDLER, &self.nmi);
        place(IRQ_HANDLER, &self.irq);
        let vectors = [NMI_HANDLER, PROGRAM, IRQ_HANDLER];
        let bytes: Vec<u8> = vectors.iter().flat_map(|v| v.to_le_bytes()).collect();
        place(0xFFFA, &bytes);

        let mut out = self.header().to_vec();
        if let Some(trainer) = &self.trainer {
            let mut t = trainer.clone();
            t.resize(512, 0);
            out.extend_from_slice(&t);
        }
        out.extend_from_slice(&prg);
        out.extend(std::iter::repeat_n(0u8, self.chr_pages as usize * CHR_BANK_LEN));
        out
    }

    pub fn boot(&self) -> Nes {
        self.boot_with(Config::default())
    }

    pub fn boot_with(&self, config: Config) -> Nes {
        Nes::new(&self.build(), config).expect("image loads")
    }
}

/// `JMP addr` placed at `addr`: an idle loop.
pub fn jump_to_self(addr: u16) -> Vec<u8> {
    let [lo, hi] = addr.to_le_bytes();
    vec![0x4C, lo, hi]
}

/// Append an idle loop at the address the code ends on.
pub fn with_idle_loop(origin: u16, mut code: Vec<u8>) -> Vec<u8> {
    let end = origin + code.len() as u16;
    code.extend(jump_to_self(end));
    code
}
