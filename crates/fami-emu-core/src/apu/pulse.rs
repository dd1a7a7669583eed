use super::{Envelope, LENGTH_TABLE, SyncLength};

/// Highest period that does not overflow the sweep adder, by shift amount.
const PERIOD_LIMIT: [i32; 8] = [0x03FF, 0x0555, 0x0666, 0x071C, 0x0787, 0x07C1, 0x07E0, 0x07F0];

/// High steps out of 16 for each duty setting.
const DUTY: [u8; 4] = [2, 4, 8, 12];

#[derive(Default)]
struct Sweep {
    on: bool,
    negate: bool,
    shift: u8,
    reload: u8,
    count: u8,
}

/// Square channel. `ones_complement` selects the first channel's negate
/// quirk (subtracts one more than the second channel does).
#[derive(Default)]
pub(super) struct Pulse {
    ones_complement: bool,

    enabled: bool,
    halt: bool,
    volume: u8,
    duty: u8,
    step: u8,
    length: u8,
    period: i32,
    period_limit: i32,
    phase: i32,
    env: Envelope,
    sweep: Sweep,

    pub(super) sync: SyncLength,
}

impl Pulse {
    pub(super) fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            sync: SyncLength::new(0x20),
            period_limit: PERIOD_LIMIT[0],
            ..Self::default()
        }
    }

    /// Register write replayed at render time.
    pub(super) fn write(&mut self, reg: u16, data: u8, channel_on: bool) {
        match reg & 0x03 {
            0 => {
                self.halt = data & 0x20 != 0;
                self.env.write(data);
                self.volume = data & 0x0F;
                self.duty = DUTY[(data >> 6) as usize];
            }
            1 => {
                self.sweep.on = data & 0x80 != 0;
                self.sweep.negate = data & 0x08 != 0;
                self.sweep.shift = data & 0x07;
                self.sweep.reload = ((data >> 4) & 0x07) + 1;
                self.period_limit = PERIOD_LIMIT[(data & 0x07) as usize];
            }
            2 => self.period = (self.period & 0xFF00) | data as i32,
            _ => {
                self.period = (((data & 0x07) as i32) << 8) | (self.period & 0x00FF);
                self.length = LENGTH_TABLE[(data >> 3) as usize] << 1;
                self.env.restart();
                self.step = 0;
                if channel_on {
                    self.enabled = true;
                }
            }
        }
    }

    pub(super) fn disable(&mut self) {
        self.enabled = false;
        self.length = 0;
    }

    /// Frame sequencer step. Even steps also clock length and sweep.
    pub(super) fn tick(&mut self, step: u8) {
        if !self.enabled || self.length == 0 {
            return;
        }
        if step & 0x01 == 0 {
            if !self.halt {
                self.length -= 1;
            }
            if self.sweep.on && self.sweep.shift != 0 {
                self.sweep.count = self.sweep.count.saturating_sub(1);
                if self.sweep.count == 0 {
                    self.sweep.count = self.sweep.reload;
                    let delta = self.period >> self.sweep.shift;
                    if !self.sweep.negate {
                        self.period += delta;
                    } else if self.ones_complement {
                        self.period += !delta;
                    } else {
                        self.period -= delta;
                    }
                }
            }
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

    /// DAC level (0-15) averaged over one output sample of `ratio` CPU
    /// cycles (16.16 fixed point). Duty edges inside the sample are weighted
    /// by the time spent on each side.
    pub(super) fn render(&mut self, ratio: i32) -> f32 {
        if !self.enabled || self.length == 0 {
            return 0.0;
        }
        if self.period < 8 || (!self.sweep.negate && self.period > self.period_limit) {
            return 0.0;
        }
        let step_len = (self.period + 1) << 16;
        let mut w = self.phase.min(ratio) as i64;
        let mut s = if self.step < self.duty { w } else { -w };
        self.phase -= ratio;
        while self.phase < 0 {
            self.phase += step_len;
            self.step = (self.step + 1) & 0x0F;
            w = step_len as i64;
            if self.phase > 0 {
                w -= self.phase as i64;
            }
            if self.step < self.duty {
                s += w;
            } else {
                s -= w;
            }
        }
        let high = (s as f32 / ratio as f32 + 1.0) * 0.5;
        self.output_volume() as f32 * high.clamp(0.0, 1.0)
    }
}
