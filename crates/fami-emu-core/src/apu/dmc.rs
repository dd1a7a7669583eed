use crate::{cpu::Interrupts, memory::Memory};

/// Largest output change per sample; larger jumps are slewed.
const SLEW: i32 = 8;

/// CPU-time copy of the delta modulation channel: just enough to report
/// status and raise the completion IRQ on time.
#[derive(Default)]
pub(super) struct DmcSync {
    pub(super) enabled: bool,
    looping: bool,
    irq_enable: bool,
    pub(super) irq_flag: bool,
    /// Sample length in bytes.
    len_cache: u16,
    /// CPU cycles per byte.
    byte_cycles: u16,
    pub(super) len: u16,
    cycles: i32,
}

pub(super) struct Dmc {
    periods: &'static [u16; 16],

    enabled: bool,
    looping: bool,
    cur_byte: u8,
    /// Upper six bits of the 7-bit output counter.
    value: u8,
    /// Low output bit, written through `$4011`.
    low_bit: u8,

    addr: u16,
    addr_cache: u16,
    /// Remaining sample length in bits.
    len: u16,
    len_cache: u16,
    period: i32,
    phase: i32,
    slewed: i32,

    pub(super) sync: DmcSync,
}

impl Dmc {
    pub(super) fn new(periods: &'static [u16; 16]) -> Self {
        Self {
            periods,
            enabled: false,
            looping: false,
            cur_byte: 0,
            value: 0,
            low_bit: 0,
            addr: 0xC000,
            addr_cache: 0xC000,
            len: 0,
            len_cache: 0,
            period: (periods[0] as i32) << 16,
            phase: 0,
            slewed: 0,
            sync: DmcSync::default(),
        }
    }

    pub(super) fn write(&mut self, reg: u16, data: u8) {
        match reg & 0x03 {
            0 => {
                self.period = (self.periods[(data & 0x0F) as usize] as i32) << 16;
                self.looping = data & 0x40 != 0;
            }
            1 => {
                self.value = (data & 0x7F) >> 1;
                self.low_bit = data & 0x01;
            }
            2 => self.addr_cache = ((data as u16) << 6) | 0xC000,
            _ => self.len_cache = (((data as u16) << 4) + 1) << 3,
        }
    }

    pub(super) fn write_sync(&mut self, reg: u16, data: u8, intr: &mut Interrupts) {
        match reg & 0x03 {
            0 => {
                self.sync.byte_cycles = self.periods[(data & 0x0F) as usize] << 3;
                self.sync.looping = data & 0x40 != 0;
                self.sync.irq_enable = data & 0x80 != 0;
                if !self.sync.irq_enable {
                    self.sync.irq_flag = false;
                    intr.clear(Interrupts::DMC);
                }
            }
            3 => self.sync.len_cache = ((data as u16) << 4) + 1,
            _ => {}
        }
    }

    /// `$4015` bit 4, render-time copy.
    pub(super) fn set_enabled(&mut self, on: bool) {
        if !on {
            self.enabled = false;
            self.len = 0;
            return;
        }
        self.enabled = true;
        if self.len == 0 {
            self.addr = self.addr_cache;
            self.len = self.len_cache;
            self.phase = 0;
        }
    }

    /// `$4015` bit 4, CPU-time copy. Any status write acknowledges the IRQ.
    pub(super) fn set_enabled_sync(&mut self, on: bool, intr: &mut Interrupts) {
        self.sync.irq_flag = false;
        intr.clear(Interrupts::DMC);
        if !on {
            self.sync.enabled = false;
            self.sync.len = 0;
            return;
        }
        self.sync.enabled = true;
        if self.sync.len == 0 {
            self.sync.len = self.sync.len_cache;
            self.sync.cycles = 0;
        }
    }

    /// Advance the CPU-time copy by `cycles` and raise the completion IRQ.
    pub(super) fn clock_sync(&mut self, cycles: i32, intr: &mut Interrupts) {
        let s = &mut self.sync;
        if !s.enabled || s.byte_cycles == 0 {
            return;
        }
        s.cycles -= cycles;
        while s.cycles < 0 {
            s.cycles += s.byte_cycles as i32;
            if s.len == 0 {
                continue;
            }
            s.len -= 1;
            if s.len >= 2 {
                continue;
            }
            if s.looping {
                s.len = s.len_cache;
            } else {
                s.len = 0;
                if s.irq_enable {
                    s.irq_flag = true;
                    intr.raise(Interrupts::DMC);
                }
            }
        }
    }

    /// Direct 7-bit level as written, before slewing.
    fn target(&self) -> i32 {
        ((self.value as i32) << 1) | self.low_bit as i32
    }

    /// DAC level (0-127). Sample bytes are fetched from cartridge space
    /// without bus side effects.
    pub(super) fn render(&mut self, ratio: i32, mem: &Memory) -> f32 {
        if self.len != 0 {
            self.phase -= ratio;
            while self.phase < 0 {
                self.phase += self.period;
                if self.len & 0x07 == 0 {
                    self.cur_byte = mem.cpu_read(self.addr);
                    self.addr = if self.addr == 0xFFFF { 0x8000 } else { self.addr + 1 };
                }
                self.len -= 1;
                if self.len == 0 {
                    if self.looping {
                        self.addr = self.addr_cache;
                        self.len = self.len_cache;
                    } else {
                        self.enabled = false;
                        break;
                    }
                }
                if self.cur_byte & (1 << ((self.len & 0x07) ^ 0x07)) != 0 {
                    if self.value < 0x3F {
                        self.value += 1;
                    }
                } else if self.value > 1 {
                    self.value -= 1;
                }
            }
        }
        let target = self.target();
        let d = target - self.slewed;
        self.slewed = if d.abs() <= SLEW {
            target
        } else {
            self.slewed + SLEW * d.signum()
        };
        self.slewed as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::TvSystem;

    fn dmc() -> Dmc {
        Dmc::new(TvSystem::Ntsc.dmc_periods())
    }

    #[test]
    fn direct_load_is_slewed() {
        let mut d = dmc();
        let mem = crate::mapper::test_support::board(0, 2, 1);
        d.write(1, 0x40);
        assert_eq!(d.render(1 << 16, &mem), 8.0);
        assert_eq!(d.render(1 << 16, &mem), 16.0);
        for _ in 0..10 {
            d.render(1 << 16, &mem);
        }
        assert_eq!(d.render(1 << 16, &mem), 64.0);
    }

    #[test]
    fn completion_irq_after_last_byte() {
        let mut d = dmc();
        let mut intr = Interrupts::default();
        d.write_sync(0, 0x8F, &mut intr); // IRQ on, fastest rate
        d.write_sync(3, 0x00, &mut intr); // 1 byte
        d.set_enabled_sync(true, &mut intr);
        assert_eq!(d.sync.len, 1);
        d.clock_sync(1, &mut intr);
        assert!(intr.is_set(Interrupts::DMC));
        assert!(d.sync.irq_flag);
        assert_eq!(d.sync.len, 0);

        d.write_sync(0, 0x0F, &mut intr);
        assert!(!intr.is_set(Interrupts::DMC));
    }

    #[test]
    fn looping_sample_never_interrupts() {
        let mut d = dmc();
        let mut intr = Interrupts::default();
        d.write_sync(0, 0xCF, &mut intr);
        d.write_sync(3, 0x01, &mut intr);
        d.set_enabled_sync(true, &mut intr);
        d.clock_sync(100_000, &mut intr);
        assert!(!intr.is_set(Interrupts::DMC));
        assert!(d.sync.len != 0);
    }

    #[test]
    fn playback_reads_sample_bytes() {
        let mut d = dmc();
        let mem = crate::mapper::test_support::board(0, 2, 1);
        // $E000-$FFFF holds page 3, filled with 0x03: two up steps then downs.
        d.write(0, 0x0F);
        d.write(1, 0x20);
        d.write(2, 0xFF); // $FFC0
        d.write(3, 0x00);
        d.set_enabled(true);
        let before = d.value;
        d.render((54 << 16) * 8, &mem);
        assert!(d.value < before);
    }
}
