use log::{debug, info, warn};

use crate::{
    apu::Apu,
    audio_queue::{AudioConsumer, audio_queue},
    bus::Bus,
    cartridge::Cartridge,
    config::Config,
    controller::Button,
    cpu::{Cpu, Registers},
    error::{ExecutionFault, LoadError},
    hardware::RenderMode,
    mapper,
    memory::{Memory, Mirroring},
    ppu::FrameBuffer,
};

/// Frames of audio the queue holds before dropping the oldest samples.
const AUDIO_QUEUE_FRAMES: usize = 16;

/// A complete console with a cartridge inserted.
pub struct Nes {
    pub cpu: Cpu,
    pub bus: Bus,
    config: Config,
    audio: AudioConsumer,
    frames: u64,
}

impl Nes {
    /// Parse an iNES image and power the console on.
    pub fn new(image: &[u8], config: Config) -> Result<Self, LoadError> {
        Self::from_cartridge(Cartridge::load(image)?, config)
    }

    pub fn from_cartridge(cart: Cartridge, config: Config) -> Result<Self, LoadError> {
        let number = cart.mapper();
        let board = mapper::create(number, config.patch)?;
        if !cart.has_chr_rom() && mapper::switches_chr(number) {
            warn!("mapper {number} without CHR ROM; falling back to pattern RAM");
        }
        info!(
            "cartridge: mapper {number}, PRG {}x16K, CHR {}x8K, {:?} mirroring{}",
            cart.header.prg_pages,
            cart.header.chr_pages,
            Mirroring::from_header(&cart.header),
            if cart.has_battery() { ", battery" } else { "" }
        );
        debug!("config: {config:?}");

        let (producer, consumer) =
            audio_queue(config.samples_per_frame().max(1) * AUDIO_QUEUE_FRAMES);
        let apu = Apu::new(&config, producer);
        let bus = Bus::new(&config, Memory::new(cart), board, apu);
        let mut nes = Self {
            cpu: Cpu::new(),
            bus,
            config,
            audio: consumer,
            frames: 0,
        };
        nes.power_on();
        Ok(nes)
    }

    fn power_on(&mut self) {
        self.bus.reset(&mut self.cpu, true);
        self.frames = 0;
    }

    /// Soft reset: RAM, save RAM and OAM keep their contents. Clears a
    /// jammed CPU.
    pub fn reset(&mut self) {
        self.bus.reset(&mut self.cpu, false);
        self.frames = 0;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Interleaving actually in use; a board may override the configured one.
    pub fn render_mode(&self) -> RenderMode {
        self.bus.render_mode()
    }

    /// Attach a frame buffer, returning the previous one.
    pub fn set_frame_buffer(&mut self, screen: Option<FrameBuffer>) -> Option<FrameBuffer> {
        self.bus.ppu.set_frame_buffer(screen)
    }

    pub fn frame_buffer(&self) -> Option<&FrameBuffer> {
        self.bus.ppu.frame_buffer()
    }

    pub fn set_controller_button(&mut self, player: u8, button: Button, pressed: bool) {
        self.bus.pad.set_button(player, button, pressed);
    }

    pub fn set_controller_state(&mut self, player: u8, buttons: u8) {
        self.bus.pad.set_state(player, buttons);
    }

    /// Emulate one video frame. A jammed CPU keeps returning the same fault
    /// until [`Nes::reset`].
    pub fn run_frame(&mut self) -> Result<(), ExecutionFault> {
        if let Some(fault) = self.cpu.jammed() {
            return Err(fault);
        }
        self.bus.run_frame(&mut self.cpu)?;
        self.frames += 1;
        Ok(())
    }

    pub fn frame_period_millis(&self) -> f32 {
        self.config.tv.frame_period_millis()
    }

    /// Copy queued audio into `out`, padding with silence. Returns the number
    /// of real samples.
    pub fn drain_audio_samples(&mut self, out: &mut [i16]) -> usize {
        self.audio.drain_into(out)
    }

    /// Handle for draining audio from another thread.
    pub fn audio_consumer(&self) -> AudioConsumer {
        self.audio.clone()
    }

    pub fn samples_per_frame(&self) -> usize {
        self.bus.apu.samples_per_frame()
    }

    pub fn cpu_cycles(&self) -> i64 {
        self.bus.signals.cycles
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn registers(&self) -> Registers {
        self.cpu.registers()
    }

    pub fn has_battery(&self) -> bool {
        self.bus.mem.header().save_ram
    }

    pub fn save_ram(&self) -> &[u8] {
        self.bus.mem.save_ram()
    }

    pub fn load_save_ram(&mut self, data: &[u8]) {
        self.bus.mem.load_save_ram(data);
    }
}
