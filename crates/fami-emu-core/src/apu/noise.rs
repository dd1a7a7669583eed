use super::{Envelope, LENGTH_TABLE, SyncLength};

/// Timer periods in CPU cycles.
const PERIODS: [i32; 16] = [4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068];

const LFSR_SEED: u16 = 0x4000;
// Feedback taps
const TAP_LONG: u16 = 0x02;
const TAP_SHORT: u16 = 0x40;

pub(super) struct Noise {
    enabled: bool,
    halt: bool,
    volume: u8,
    tap: u16,
    lfsr: u16,

    length: u8,
    period: i32,
    phase: i32,
    env: Envelope,

    pub(super) sync: SyncLength,
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl Noise {
    pub(super) fn new() -> Self {
        Self {
            enabled: false,
            halt: false,
            volume: 0,
            tap: TAP_LONG,
            lfsr: LFSR_SEED,
            length: 0,
            period: PERIODS[0] << 16,
            phase: 0,
            env: Envelope::default(),
            sync: SyncLength::new(0x20),
        }
    }

    pub(super) fn write(&mut self, reg: u16, data: u8, channel_on: bool) {
        match reg & 0x03 {
            0 => {
                self.halt = data & 0x20 != 0;
                self.env.write(data);
                self.volume = data & 0x0F;
            }
            2 => {
                self.period = PERIODS[(data & 0x0F) as usize] << 16;
                self.tap = if data & 0x80 != 0 { TAP_SHORT } else { TAP_LONG };
            }
            3 => {
                self.length = LENGTH_TABLE[(data >> 3) as usize] << 1;
                self.env.restart();
                if channel_on {
                    self.enabled = true;
                }
            }
            _ => {}
        }
    }

    pub(super) fn disable(&mut self) {
        self.enabled = false;
        self.length = 0;
    }

    pub(super) fn tick(&mut self, step: u8) {
        if !self.enabled || self.length == 0 {
            return;
        }
        if step & 0x01 == 0 && !self.halt {
            self.length -= 1;
        }
        self.env.tick(self.halt);
    }

    fn output_volume(&self) -> u8 {
        if self.env.constant {
            self.volume
        } else {
            self.env.level
        }
    }

    /// Clock the shift register once. Returns the level it now outputs.
    fn advance(&mut self) -> u8 {
        self.phase += self.period;
        let bit = self.lfsr & 0x01;
        let feedback = bit ^ u16::from(self.lfsr & self.tap != 0);
        self.lfsr = (self.lfsr >> 1) | (feedback << 14);
        if self.lfsr & 0x01 == 0 {
            self.output_volume()
        } else {
            0
        }
    }

    fn current(&self) -> u8 {
        if self.lfsr & 0x01 == 0 {
            self.output_volume()
        } else {
            0
        }
    }

    /// DAC level (0-15), averaged when the register clocks faster than the
    /// output rate.
    pub(super) fn render(&mut self, ratio: i32) -> f32 {
        if !self.enabled || self.length == 0 {
            return 0.0;
        }
        self.phase -= ratio;
        if self.phase >= 0 {
            return self.current() as f32;
        }
        if self.period > ratio {
            return self.advance() as f32;
        }
        let (mut sum, mut count) = (0u32, 0u32);
        while self.phase < 0 {
            sum += self.advance() as u32;
            count += 1;
        }
        sum as f32 / count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_mode_has_full_period() {
        let mut n = Noise::new();
        let start = n.lfsr;
        let mut steps = 0u32;
        loop {
            n.advance();
            steps += 1;
            if n.lfsr == start {
                break;
            }
        }
        assert_eq!(steps, 32767);
    }

    #[test]
    fn short_mode_has_short_period() {
        let mut n = Noise::new();
        n.write(2, 0x80, true);
        for _ in 0..200 {
            n.advance();
        }
        let start = n.lfsr;
        let mut steps = 0u32;
        loop {
            n.advance();
            steps += 1;
            if n.lfsr == start || steps > 1000 {
                break;
            }
        }
        assert!(steps == 93 || steps == 31, "period {steps}");
    }

    #[test]
    fn silent_until_keyed() {
        let mut n = Noise::new();
        n.write(0, 0x1F, false);
        n.write(3, 0x08, false);
        assert_eq!(n.render(1 << 20), 0.0);
        n.write(3, 0x08, true);
        let total: f32 = (0..100).map(|_| n.render(1 << 20)).sum();
        assert!(total > 0.0);
    }
}
