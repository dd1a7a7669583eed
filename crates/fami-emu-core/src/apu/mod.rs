//! Sound chip.
//!
//! Every register write lands twice. The CPU-time copy (`SyncLength`,
//! `DmcSync`, frame sequencer) answers `$4015` reads and raises the frame
//! and DMC interrupts on the instruction that causes them. The synthesis
//! copy only sees the write once [`Apu::render`] replays the time-stamped
//! event queue at the end of each frame, so samples stay locked to the
//! CPU clock without synthesizing mid-frame.

use std::collections::VecDeque;

use log::debug;

use crate::{
    audio_queue::AudioProducer,
    config::Config,
    cpu::Interrupts,
    hardware::{MASTER_CYCLES_PER_CPU_CYCLE, TvSystem},
    memory::Memory,
};

mod dmc;
mod noise;
mod pulse;
mod triangle;

use dmc::Dmc;
use noise::Noise;
use pulse::Pulse;
use triangle::Triangle;

#[cfg(feature = "apu-trace")]
macro_rules! apu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "apu-trace"))]
macro_rules! apu_trace {
    ($($arg:tt)*) => {};
}

/// Half CPU cycles between frame sequencer steps.
const FRAME_STEP_HALF_CYCLES: i32 = 14915;

/// Pending writes kept for replay; past this the oldest is applied early.
const MAX_EVENTS: usize = 8192;

/// 2π × 40 Hz, the DC-blocking cutoff.
const HIGH_PASS_OMEGA: f32 = 251.327;

/// Length counter loads, halved; channels double them on load.
pub(super) const LENGTH_TABLE: [u8; 32] = [
    5, 127, 10, 1, 19, 2, 40, 3, 80, 4, 30, 5, 7, 6, 13, 7, 6, 8, 12, 9, 24, 10, 48, 11, 96, 12, 36,
    13, 8, 14, 16, 15,
];

// Frame IRQ register bits
const FRAME_MODE_5STEP: u8 = 0x80;
const FRAME_IRQ_INHIBIT: u8 = 0x40;

#[derive(Default)]
pub(super) struct Envelope {
    pub(super) constant: bool,
    pub(super) level: u8,
    decay: u8,
    count: u8,
}

impl Envelope {
    pub(super) fn write(&mut self, data: u8) {
        self.constant = data & 0x10 != 0;
        self.decay = (data & 0x0F) + 1;
    }

    pub(super) fn restart(&mut self) {
        self.level = 0x0F;
        self.count = self.decay + 1;
    }

    pub(super) fn tick(&mut self, loop_flag: bool) {
        if self.count != 0 {
            self.count -= 1;
        }
        if self.count != 0 {
            return;
        }
        self.count = self.decay;
        if loop_flag {
            self.level = self.level.wrapping_sub(1) & 0x0F;
        } else if self.level > 0 {
            self.level -= 1;
        }
    }
}

/// CPU-time length counter behind `$4015` status reads.
#[derive(Default)]
pub(super) struct SyncLength {
    halt_bit: u8,
    pub(super) enabled: bool,
    pub(super) halt: bool,
    pub(super) length: u8,
}

impl SyncLength {
    pub(super) fn new(halt_bit: u8) -> Self {
        Self {
            halt_bit,
            ..Self::default()
        }
    }

    fn write(&mut self, reg: u16, data: u8) {
        match reg & 0x03 {
            0 => self.halt = data & self.halt_bit != 0,
            3 if self.enabled => self.length = LENGTH_TABLE[(data >> 3) as usize] << 1,
            _ => {}
        }
    }

    fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
        if !on {
            self.length = 0;
        }
    }

    fn tick(&mut self, step: u8) {
        if step & 0x01 == 0 && !self.halt && self.length != 0 {
            self.length -= 1;
        }
    }

    fn active(&self) -> bool {
        self.enabled && self.length != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EventKind {
    Register { addr: u16, data: u8 },
    FrameTick(u8),
}

#[derive(Clone, Copy, Debug)]
struct Event {
    /// CPU cycle the write happened on.
    time: i64,
    kind: EventKind,
}

/// First-order DC blocker applied after the mixer.
struct HighPass {
    coef: f32,
    prev_in: f32,
    prev_out: f32,
}

impl HighPass {
    fn new(sample_rate: u32) -> Self {
        Self {
            coef: 1.0 - HIGH_PASS_OMEGA / sample_rate as f32,
            prev_in: 0.0,
            prev_out: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = x - self.prev_in + self.coef * self.prev_out;
        self.prev_in = x;
        self.prev_out = y;
        y
    }
}

/// Non-linear DAC of the real console: pulse pair and triangle/noise/DMC
/// each go through their own resistor-ladder curve.
fn mix(p1: f32, p2: f32, t: f32, n: f32, d: f32) -> f32 {
    let pulse_sum = p1 + p2;
    let pulse = if pulse_sum > 0.0 {
        95.88 / (8128.0 / pulse_sum + 100.0)
    } else {
        0.0
    };
    let tnd_in = t / 8227.0 + n / 12241.0 + d / 22638.0;
    let tnd = if tnd_in > 0.0 {
        159.79 / (1.0 / tnd_in + 100.0)
    } else {
        0.0
    };
    pulse + tnd
}

pub struct Apu {
    tv: TvSystem,
    sample_rate: u32,
    samples_per_frame: usize,
    /// CPU cycles per output sample.
    sample_cycles: f64,
    /// CPU cycles per output sample, 16.16 fixed point.
    ratio: i32,

    pulse: [Pulse; 2],
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    /// `$4015` as seen by the synthesis copy.
    status: u8,

    frame_irq: u8,
    frame_irq_occur: bool,
    frame_step: u8,
    frame_cycle: i32,

    events: VecDeque<Event>,
    /// Render cursor in CPU cycles.
    time: f64,
    high_pass: HighPass,
    out: AudioProducer,
}

impl Apu {
    pub fn new(config: &Config, out: AudioProducer) -> Self {
        let tv = config.tv;
        let sample_rate = config.sample_rate.max(1);
        let samples_per_frame = config.samples_per_frame().max(1);
        let frame_cpu_cycles = (tv.frame_cycles() / MASTER_CYCLES_PER_CPU_CYCLE) as f64;
        Self {
            tv,
            sample_rate,
            samples_per_frame,
            sample_cycles: frame_cpu_cycles / samples_per_frame as f64,
            ratio: (tv.cpu_rate() * 65536.0 / sample_rate as f64) as i32,
            pulse: [Pulse::new(true), Pulse::new(false)],
            triangle: Triangle::new(),
            noise: Noise::new(),
            dmc: Dmc::new(tv.dmc_periods()),
            status: 0,
            frame_irq: FRAME_MODE_5STEP | FRAME_IRQ_INHIBIT,
            frame_irq_occur: false,
            frame_step: 0,
            frame_cycle: 0,
            events: VecDeque::with_capacity(1024),
            time: 0.0,
            high_pass: HighPass::new(sample_rate),
            out,
        }
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    pub fn reset(&mut self, intr: &mut Interrupts) {
        self.pulse = [Pulse::new(true), Pulse::new(false)];
        self.triangle = Triangle::new();
        self.noise = Noise::new();
        self.dmc = Dmc::new(self.tv.dmc_periods());
        self.status = 0;
        self.events.clear();
        self.out.clear();

        for addr in (0x4000..=0x4010).chain(0x4012..=0x4015) {
            self.write_sync(addr, 0, intr);
            self.apply(EventKind::Register { addr, data: 0 });
        }

        self.frame_irq = FRAME_MODE_5STEP | FRAME_IRQ_INHIBIT;
        self.frame_irq_occur = false;
        self.frame_step = 0;
        self.frame_cycle = 0;
        intr.clear(Interrupts::FRAME | Interrupts::DMC);
        self.time = 0.0;
        self.high_pass = HighPass::new(self.sample_rate);
    }

    /// Register read at `$4000-$4017` (excluding the controller bits).
    pub fn read(&mut self, addr: u16, intr: &mut Interrupts) -> u8 {
        match addr {
            0x4015 => {
                let data = self.peek_status();
                self.frame_irq_occur = false;
                intr.clear(Interrupts::FRAME);
                data
            }
            0x4017 if self.frame_irq_occur => 0,
            _ => 0x40,
        }
    }

    /// Register write. `time` is the CPU cycle of the writing instruction.
    pub fn write(&mut self, addr: u16, data: u8, time: i64, intr: &mut Interrupts) {
        apu_trace!("APU W {addr:04X}={data:02X} @{time}");
        self.write_sync(addr, data, intr);
        if addr == 0x4017 {
            self.write_frame_counter(data, time, intr);
            return;
        }
        if addr > 0x4015 || addr == 0x4014 {
            return;
        }
        self.push_event(Event {
            time,
            kind: EventKind::Register { addr, data },
        });
    }

    fn write_sync(&mut self, addr: u16, data: u8, intr: &mut Interrupts) {
        let reg = addr & 0x03;
        match addr {
            0x4000..=0x4003 => self.pulse[0].sync.write(reg, data),
            0x4004..=0x4007 => self.pulse[1].sync.write(reg, data),
            0x4008..=0x400B => self.triangle.sync.write(reg, data),
            0x400C..=0x400F => self.noise.sync.write(reg, data),
            0x4010..=0x4013 => self.dmc.write_sync(reg, data, intr),
            0x4015 => {
                self.pulse[0].sync.set_enabled(data & 0x01 != 0);
                self.pulse[1].sync.set_enabled(data & 0x02 != 0);
                self.triangle.sync.set_enabled(data & 0x04 != 0);
                self.noise.sync.set_enabled(data & 0x08 != 0);
                self.dmc.set_enabled_sync(data & 0x10 != 0, intr);
            }
            _ => {}
        }
    }

    fn write_frame_counter(&mut self, data: u8, time: i64, intr: &mut Interrupts) {
        self.frame_cycle = 0;
        self.frame_irq = data;
        self.frame_irq_occur = false;
        intr.clear(Interrupts::FRAME);
        self.frame_step = 0;
        if data & FRAME_MODE_5STEP != 0 {
            self.update_frame(time, intr);
        }
        self.frame_step = 1;
        self.frame_cycle = FRAME_STEP_HALF_CYCLES;
    }

    fn push_event(&mut self, event: Event) {
        if self.events.len() >= MAX_EVENTS
            && let Some(old) = self.events.pop_front()
        {
            self.apply(old.kind);
        }
        self.events.push_back(event);
    }

    fn update_frame(&mut self, time: i64, intr: &mut Interrupts) {
        let step = self.frame_step;
        if step == 0 && self.frame_irq & (FRAME_MODE_5STEP | FRAME_IRQ_INHIBIT) == 0 {
            self.frame_irq_occur = true;
            intr.raise(Interrupts::FRAME);
        }
        if step == 3 && self.frame_irq & FRAME_MODE_5STEP != 0 {
            self.frame_cycle += FRAME_STEP_HALF_CYCLES;
        }
        self.push_event(Event {
            time,
            kind: EventKind::FrameTick(step),
        });
        self.pulse[0].sync.tick(step);
        self.pulse[1].sync.tick(step);
        self.triangle.sync.tick(step);
        self.noise.sync.tick(step);
        self.frame_step = (step + 1) & 0x03;
    }

    /// Advance the CPU-time state by `cycles` just executed. `time` is the
    /// CPU cycle count after them.
    pub fn sync(&mut self, cycles: i64, time: i64, intr: &mut Interrupts) {
        self.frame_cycle -= (cycles as i32) << 1;
        while self.frame_cycle <= 0 {
            self.frame_cycle += FRAME_STEP_HALF_CYCLES;
            self.update_frame(time, intr);
        }
        self.dmc.clock_sync(cycles as i32, intr);
    }

    fn apply(&mut self, kind: EventKind) {
        match kind {
            EventKind::Register { addr, data } => {
                let reg = addr & 0x03;
                match addr {
                    0x4000..=0x4003 => self.pulse[0].write(reg, data, self.status & 0x01 != 0),
                    0x4004..=0x4007 => self.pulse[1].write(reg, data, self.status & 0x02 != 0),
                    0x4008..=0x400B => self.triangle.write(reg, data, self.status & 0x04 != 0),
                    0x400C..=0x400F => self.noise.write(reg, data, self.status & 0x08 != 0),
                    0x4010..=0x4013 => self.dmc.write(reg, data),
                    0x4015 => {
                        self.status = data;
                        if data & 0x01 == 0 {
                            self.pulse[0].disable();
                        }
                        if data & 0x02 == 0 {
                            self.pulse[1].disable();
                        }
                        if data & 0x04 == 0 {
                            self.triangle.disable();
                        }
                        if data & 0x08 == 0 {
                            self.noise.disable();
                        }
                        self.dmc.set_enabled(data & 0x10 != 0);
                    }
                    _ => {}
                }
            }
            EventKind::FrameTick(step) => {
                self.pulse[0].tick(step);
                self.pulse[1].tick(step);
                self.triangle.tick(step);
                self.noise.tick(step);
            }
        }
    }

    /// Synthesize one frame of samples up to `cpu_cycles` into the output
    /// queue, replaying register events at their recorded times.
    pub fn render(&mut self, mem: &Memory, cpu_cycles: i64) {
        let now = cpu_cycles as f64;
        if self.time > now {
            while let Some(e) = self.events.pop_front() {
                self.apply(e.kind);
            }
        }
        let mut dropped = 0usize;
        for _ in 0..self.samples_per_frame {
            while let Some(e) = self.events.front()
                && e.time as f64 <= self.time
            {
                let kind = e.kind;
                self.events.pop_front();
                self.apply(kind);
            }
            let level = mix(
                self.pulse[0].render(self.ratio),
                self.pulse[1].render(self.ratio),
                self.triangle.render(self.ratio),
                self.noise.render(self.ratio),
                self.dmc.render(self.ratio, mem),
            );
            let y = self.high_pass.process(level);
            let sample = (y * 32767.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            if !self.out.push(sample) {
                dropped += 1;
            }
            self.time += self.sample_cycles;
        }
        if dropped != 0 {
            apu_trace!("audio queue overrun: {dropped} samples dropped");
        }

        // The CPU clock and the render cursor drift apart slowly; snap
        // back when the cursor is half a frame ahead or two frames behind.
        let frame = self.tv.frame_cycles() as f64;
        let drift = self.time - now;
        if drift > frame / 24.0 || drift < -frame / 6.0 {
            debug!("audio clock resynchronised (drift {drift:.0} cycles)");
            self.time = now;
        }
    }

    /// Status bits the CPU would read from `$4015`, without side effects.
    pub fn peek_status(&self) -> u8 {
        let mut data = 0;
        if self.pulse[0].sync.active() {
            data |= 0x01;
        }
        if self.pulse[1].sync.active() {
            data |= 0x02;
        }
        if self.triangle.sync.active() {
            data |= 0x04;
        }
        if self.noise.sync.active() {
            data |= 0x08;
        }
        if self.dmc.sync.enabled && self.dmc.sync.len != 0 {
            data |= 0x10;
        }
        if self.frame_irq_occur {
            data |= 0x40;
        }
        if self.dmc.sync.irq_flag {
            data |= 0x80;
        }
        data
    }
}
