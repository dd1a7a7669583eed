use super::{LENGTH_TABLE, SyncLength};

#[derive(Default)]
pub(super) struct Triangle {
    enabled: bool,
    /// Control flag: halts the length counter and keeps reloading the
    /// linear counter.
    halt: bool,
    reload: bool,
    reg: [u8; 4],

    step: u8,
    length: u8,
    linear: u8,
    /// Step length in CPU cycles, 16.16 fixed point.
    period: i32,
    level: u8,
    phase: i32,

    pub(super) sync: SyncLength,
}

impl Triangle {
    pub(super) fn new() -> Self {
        Self {
            sync: SyncLength::new(0x80),
            ..Self::default()
        }
    }

    pub(super) fn write(&mut self, reg: u16, data: u8, channel_on: bool) {
        let i = (reg & 0x03) as usize;
        self.reg[i] = data;
        match i {
            0 => self.halt = data & 0x80 != 0,
            2 => self.period = ((((self.reg[3] & 0x07) as i32) << 8) + data as i32 + 1) << 16,
            3 => {
                self.period = ((((data & 0x07) as i32) << 8) + self.reg[2] as i32 + 1) << 16;
                self.length = LENGTH_TABLE[(data >> 3) as usize] << 1;
                self.reload = true;
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
        self.linear = 0;
        self.reload = false;
    }

    pub(super) fn tick(&mut self, step: u8) {
        if !self.enabled {
            return;
        }
        if step & 0x01 == 0 && !self.halt && self.length != 0 {
            self.length -= 1;
        }
        if self.reload {
            self.linear = self.reg[0] & 0x7F;
        } else if self.linear != 0 {
            self.linear -= 1;
        }
        if !self.halt && self.linear != 0 {
            self.reload = false;
        }
    }

    fn advance(&mut self) {
        self.phase += self.period;
        self.step = (self.step + 1) & 0x1F;
        self.level = if self.step < 0x10 {
            self.step & 0x0F
        } else {
            0x0F - (self.step & 0x0F)
        };
    }

    /// DAC level (0-15). A silenced triangle holds its last level; steps
    /// shorter than one output sample are averaged.
    pub(super) fn render(&mut self, ratio: i32) -> f32 {
        if !self.enabled || self.length == 0 || self.linear == 0 || self.period < (8 << 16) {
            return self.level as f32;
        }
        self.phase -= ratio;
        if self.phase >= 0 {
            return self.level as f32;
        }
        if self.period > ratio {
            self.advance();
            return self.level as f32;
        }
        let (mut sum, mut count) = (0u32, 0u32);
        while self.phase < 0 {
            self.advance();
            sum += self.level as u32;
            count += 1;
        }
        sum as f32 / count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATIO: i32 = ((1_789_772.5 * 65536.0) / 44_100.0) as i32;

    #[test]
    fn walks_the_32_step_ramp() {
        let mut t = Triangle::new();
        t.write(0, 0x81, true);
        t.write(2, 0xFF, true);
        t.write(3, 0x07, true);
        t.tick(1);
        let mut levels = Vec::new();
        for _ in 0..32 {
            t.advance();
            levels.push(t.level);
        }
        assert_eq!(&levels[..16], &(1..16).chain([15]).collect::<Vec<u8>>()[..]);
        assert_eq!(levels[31], 0);
    }

    #[test]
    fn linear_counter_gates_output() {
        let mut t = Triangle::new();
        t.write(0, 0x02, true); // linear reload 2, control clear
        t.write(2, 0x40, true);
        t.write(3, 0x08, true);
        t.tick(1);
        assert_eq!(t.linear, 2);
        t.tick(1);
        t.tick(1);
        assert_eq!(t.linear, 0);
        let held = t.level;
        for _ in 0..10 {
            assert_eq!(t.render(RATIO), held as f32);
        }
    }

    #[test]
    fn ultrasonic_periods_hold_level() {
        let mut t = Triangle::new();
        t.write(0, 0xFF, true);
        t.write(2, 0x01, true);
        t.write(3, 0x00, true);
        t.tick(1);
        assert_eq!(t.render(RATIO), 0.0);
    }
}
