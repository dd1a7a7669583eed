use log::debug;

use crate::{
    apu::Apu,
    config::Config,
    controller::Controller,
    cpu::{Cpu, CpuBus, Signals},
    error::ExecutionFault,
    hardware::{
        ACTIVE_WINDOW_CYCLES, MASTER_CYCLES_PER_CPU_CYCLE, RenderMode, SPRITE_FETCH_CYCLES,
        TILE_CYCLES, TvSystem,
    },
    mapper::{Mapper, MapperCtx},
    memory::Memory,
    ppu::{Ppu, TILES_PER_LINE},
};

/// CPU cycles the OAM DMA register stalls the processor for.
pub const OAM_DMA_CYCLES: i64 = 514;

const LAST_VISIBLE_LINE: u16 = 239;
const VSYNC_LINE: u16 = 240;
const VBLANK_LINE: u16 = 241;

/// Owns every chip and the cartridge board, decodes CPU addresses and
/// interleaves the chips over one frame.
pub struct Bus {
    pub mem: Memory,
    pub ppu: Ppu,
    pub apu: Apu,
    pub pad: Controller,
    pub mapper: Box<dyn Mapper>,
    pub signals: Signals,

    tv: TvSystem,
    configured_mode: RenderMode,
    render_mode: RenderMode,
    all_sprites: bool,
    scanline: u16,
    /// Master cycles actually executed this power cycle.
    cycles: i64,
    /// Master cycles requested by the scheduler so far.
    cycles_req: i64,
}

impl Bus {
    pub fn new(config: &Config, mem: Memory, mapper: Box<dyn Mapper>, apu: Apu) -> Self {
        let render_mode = mapper.preferred_render_mode().unwrap_or(config.render_mode);
        Self {
            mem,
            ppu: Ppu::new(),
            apu,
            pad: Controller::new(),
            mapper,
            signals: Signals::default(),
            tv: config.tv,
            configured_mode: config.render_mode,
            render_mode,
            all_sprites: config.all_sprites,
            scanline: 0,
            cycles: 0,
            cycles_req: 0,
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Reset every chip in dependency order: banks, board, CPU (which reads
    /// the reset vector through the board), then PPU, APU and pads.
    pub fn reset(&mut self, cpu: &mut Cpu, power_on: bool) {
        self.mem.reset(power_on);
        self.scanline = 0;
        self.with_mapper(|m, ctx| m.reset(ctx));
        cpu.reset(self);
        self.ppu.reset(power_on, self.mapper.as_ref());
        self.apu.reset(&mut self.signals.intr);
        self.pad = Controller::new();
        self.cycles = 0;
        self.cycles_req = 0;
        self.render_mode = self
            .mapper
            .preferred_render_mode()
            .unwrap_or(self.configured_mode);
        debug!(
            "bus reset (power_on={power_on}, render mode {:?}, pc={:04X})",
            self.render_mode, cpu.pc
        );
    }

    #[inline]
    fn with_mapper<R>(&mut self, f: impl FnOnce(&mut dyn Mapper, &mut MapperCtx<'_>) -> R) -> R {
        let mut ctx = MapperCtx {
            mem: &mut self.mem,
            intr: &mut self.signals.intr,
            scanline: self.scanline,
            display: self.ppu.is_rendering(),
        };
        f(self.mapper.as_mut(), &mut ctx)
    }

    fn h_sync(&mut self) {
        self.with_mapper(|m, ctx| m.h_sync(ctx));
    }

    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        let mut buf = [0u8; 256];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.read(base | i as u16);
        }
        self.ppu.load_oam(&buf);
        self.signals.dma_cycles += OAM_DMA_CYCLES;
    }

    fn read_io(&mut self, addr: u16) -> u8 {
        if addr >= 0x4100 {
            return self.with_mapper(|m, ctx| m.read_low(ctx, addr));
        }
        match addr as u8 {
            0x00..=0x13 | 0x15 => self.apu.read(addr, &mut self.signals.intr),
            0x14 => addr as u8,
            0x16 => self.pad.read(addr) | 0x40,
            0x17 => self.pad.read(addr) | self.apu.read(addr, &mut self.signals.intr),
            _ => self.with_mapper(|m, ctx| m.read_ex(ctx, addr)),
        }
    }

    fn write_io(&mut self, addr: u16, data: u8) {
        if addr >= 0x4100 {
            self.with_mapper(|m, ctx| m.write_low(ctx, addr, data));
            return;
        }
        match addr as u8 {
            0x00..=0x13 | 0x15 => {
                let time = self.signals.cycles;
                self.apu.write(addr, data, time, &mut self.signals.intr);
            }
            0x14 => self.oam_dma(data),
            0x16 => {
                self.with_mapper(|m, ctx| m.write_ex(ctx, addr, data));
                self.pad.write(addr, data);
            }
            0x17 => {
                self.pad.write(addr, data);
                let time = self.signals.cycles;
                self.apu.write(addr, data, time, &mut self.signals.intr);
            }
            _ => self.with_mapper(|m, ctx| m.write_ex(ctx, addr, data)),
        }
    }

    /// Hand the CPU the whole CPU cycles owed for `master` more master
    /// cycles. The remainder carries over to the next request.
    fn run_cpu(&mut self, cpu: &mut Cpu, master: i64) -> Result<(), ExecutionFault> {
        self.cycles_req += master;
        let request = (self.cycles_req - self.cycles) / MASTER_CYCLES_PER_CPU_CYCLE;
        if request > 0 {
            let exec = cpu.run(self, request)?;
            let now = self.signals.cycles;
            self.apu.sync(exec, now, &mut self.signals.intr);
            self.cycles += exec * MASTER_CYCLES_PER_CPU_CYCLE;
        }
        Ok(())
    }

    fn render_line(&mut self) {
        self.ppu
            .render_line(&mut self.mem, self.mapper.as_mut(), self.scanline, self.all_sprites);
    }

    /// Render the current line handing the CPU its share between tiles.
    fn render_line_tiled(&mut self, cpu: &mut Cpu) -> Result<(), ExecutionFault> {
        if self.ppu.begin_line(self.scanline) {
            for i in 0..TILES_PER_LINE {
                if i != 0 {
                    self.run_cpu(cpu, TILE_CYCLES)?;
                }
                self.ppu.fetch_tile(&mut self.mem, self.mapper.as_mut(), i);
            }
        } else {
            self.run_cpu(cpu, TILE_CYCLES * (TILES_PER_LINE as i64 - 1))?;
        }
        self.ppu
            .finish_line(&mut self.mem, self.mapper.as_mut(), self.all_sprites);
        Ok(())
    }

    fn scanline_start(&mut self) {
        self.ppu.scanline_start(&mut self.mem, self.mapper.as_mut());
    }

    /// The tail shared by the fine modes: h-sync, the active window, the
    /// horizontal reload and the sprite fetch window.
    fn fine_line_tail(&mut self, cpu: &mut Cpu) -> Result<(), ExecutionFault> {
        self.h_sync();
        self.run_cpu(cpu, ACTIVE_WINDOW_CYCLES)?;
        self.scanline_start();
        self.run_cpu(cpu, SPRITE_FETCH_CYCLES + self.tv.scanline_end_cycles())
    }

    fn tile_line_tail(&mut self, cpu: &mut Cpu) -> Result<(), ExecutionFault> {
        self.run_cpu(cpu, SPRITE_FETCH_CYCLES)?;
        self.h_sync();
        self.run_cpu(cpu, ACTIVE_WINDOW_CYCLES - SPRITE_FETCH_CYCLES)?;
        self.scanline_start();
        self.run_cpu(cpu, SPRITE_FETCH_CYCLES + self.tv.scanline_end_cycles())
    }

    fn pre_render_line(&mut self, cpu: &mut Cpu) -> Result<(), ExecutionFault> {
        let tv = self.tv;
        match self.render_mode {
            RenderMode::PostAll | RenderMode::PreAll => {
                self.run_cpu(cpu, tv.scanline_cycles())?;
                self.ppu.frame_start();
                self.ppu.scanline_next();
                self.h_sync();
                self.scanline_start();
            }
            RenderMode::Post | RenderMode::Pre => {
                self.run_cpu(cpu, tv.hdraw_cycles())?;
                self.ppu.frame_start();
                self.ppu.scanline_next();
                self.fine_line_tail(cpu)?;
            }
            RenderMode::Tile => {
                self.run_cpu(cpu, TILE_CYCLES * (TILES_PER_LINE as i64 - 1))?;
                self.ppu.frame_start();
                self.ppu.scanline_next();
                self.tile_line_tail(cpu)?;
            }
        }
        Ok(())
    }

    fn visible_line(&mut self, cpu: &mut Cpu) -> Result<(), ExecutionFault> {
        let tv = self.tv;
        match self.render_mode {
            RenderMode::PostAll => {
                self.run_cpu(cpu, tv.scanline_cycles())?;
                self.render_line();
                self.ppu.scanline_next();
                self.h_sync();
                self.scanline_start();
            }
            RenderMode::PreAll => {
                self.render_line();
                self.ppu.scanline_next();
                self.run_cpu(cpu, tv.scanline_cycles())?;
                self.h_sync();
                self.scanline_start();
            }
            RenderMode::Post => {
                self.run_cpu(cpu, tv.hdraw_cycles())?;
                self.render_line();
                self.ppu.scanline_next();
                self.fine_line_tail(cpu)?;
            }
            RenderMode::Pre => {
                self.render_line();
                self.run_cpu(cpu, tv.hdraw_cycles())?;
                self.ppu.scanline_next();
                self.fine_line_tail(cpu)?;
            }
            RenderMode::Tile => {
                self.render_line_tiled(cpu)?;
                self.ppu.scanline_next();
                self.tile_line_tail(cpu)?;
            }
        }
        Ok(())
    }

    fn blank_line(&mut self, cpu: &mut Cpu, last: u16) -> Result<(), ExecutionFault> {
        match self.scanline {
            VSYNC_LINE => self.with_mapper(|m, ctx| m.v_sync(ctx)),
            VBLANK_LINE => self.ppu.start_vblank(&mut self.signals.intr),
            l if l == last => self.ppu.end_vblank(),
            _ => {}
        }
        let tv = self.tv;
        if self.render_mode.is_coarse() {
            self.run_cpu(cpu, tv.scanline_cycles())?;
            self.h_sync();
        } else {
            self.run_cpu(cpu, tv.hdraw_cycles())?;
            self.h_sync();
            self.run_cpu(cpu, tv.hblank_cycles())?;
        }
        Ok(())
    }

    /// Advance exactly one video frame: pre-render line, 239 visible lines,
    /// post-render and vertical blank, then one frame of audio.
    pub fn run_frame(&mut self, cpu: &mut Cpu) -> Result<(), ExecutionFault> {
        let last = self.tv.scanlines() - 1;

        self.scanline = 0;
        self.pre_render_line(cpu)?;

        for line in 1..=LAST_VISIBLE_LINE {
            self.scanline = line;
            self.visible_line(cpu)?;
        }

        for line in VSYNC_LINE..=last {
            self.scanline = line;
            self.blank_line(cpu, last)?;
        }

        self.apu.render(&self.mem, self.signals.cycles);
        Ok(())
    }
}

impl CpuBus for Bus {
    fn read(&mut self, addr: u16) -> u8 {
        match addr >> 13 {
            0 => self.mem.cpu_read(addr),
            1 => self.ppu.read_register(&self.mem, addr & 0xE007),
            2 => self.read_io(addr),
            3 => self.with_mapper(|m, ctx| m.read_low(ctx, addr)),
            _ => {
                let data = self.mem.cpu_read(addr);
                self.with_mapper(|m, ctx| m.read(ctx, addr, data));
                data
            }
        }
    }

    fn write(&mut self, addr: u16, data: u8) {
        match addr >> 13 {
            0 => self.mem.cpu_write(addr, data),
            1 => self.ppu.write_register(
                &mut self.mem,
                self.mapper.as_mut(),
                &mut self.signals.intr,
                addr & 0xE007,
                data,
            ),
            2 => self.write_io(addr, data),
            3 => self.with_mapper(|m, ctx| m.write_low(ctx, addr, data)),
            _ => self.with_mapper(|m, ctx| m.write(ctx, addr, data)),
        }
    }

    #[inline]
    fn fetch(&mut self, addr: u16) -> u8 {
        self.mem.cpu_read(addr)
    }

    #[inline]
    fn signals(&mut self) -> &mut Signals {
        &mut self.signals
    }

    fn clock(&mut self, cycles: i64) {
        self.with_mapper(|m, ctx| m.clock(ctx, cycles));
    }
}
