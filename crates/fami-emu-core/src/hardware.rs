/// Master-clock dots per CPU cycle. All scheduler budgets are expressed in
/// master-clock units and divided by this when handed to the CPU.
pub const MASTER_CYCLES_PER_CPU_CYCLE: i64 = 12;

/// Length in master cycles of the visible 256-pixel part of a scanline when
/// the fine render modes split it.
pub const ACTIVE_WINDOW_CYCLES: i64 = 256;

/// Master cycles spent fetching sprites after the active window.
pub const SPRITE_FETCH_CYCLES: i64 = 80;

/// Master cycles the tile render mode hands the CPU per background tile.
pub const TILE_CYCLES: i64 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Television standard the console was built for.
///
/// Selects the CPU clock, the number of scanlines and the per-scanline cycle
/// split used by the frame scheduler.
pub enum TvSystem {
    #[default]
    Ntsc,
    Pal,
}

impl TvSystem {
    #[inline]
    /// CPU clock rate in Hz.
    pub const fn cpu_rate(self) -> f64 {
        match self {
            TvSystem::Ntsc => 1_789_772.5,
            TvSystem::Pal => 1_662_607.125,
        }
    }

    #[inline]
    /// Scanlines per frame, including pre-render and vertical blank.
    pub const fn scanlines(self) -> u16 {
        match self {
            TvSystem::Ntsc => 262,
            TvSystem::Pal => 312,
        }
    }

    #[inline]
    /// Master cycles per scanline.
    pub const fn scanline_cycles(self) -> i64 {
        match self {
            TvSystem::Ntsc => 1364,
            TvSystem::Pal => 1278,
        }
    }

    #[inline]
    /// Master cycles from the start of a scanline to the start of h-blank.
    pub const fn hdraw_cycles(self) -> i64 {
        match self {
            TvSystem::Ntsc => 1024,
            TvSystem::Pal => 960,
        }
    }

    #[inline]
    /// Master cycles of h-blank.
    pub const fn hblank_cycles(self) -> i64 {
        match self {
            TvSystem::Ntsc => 340,
            TvSystem::Pal => 318,
        }
    }

    #[inline]
    /// Trailing master cycles after sprite fetches that close a scanline.
    pub const fn scanline_end_cycles(self) -> i64 {
        match self {
            TvSystem::Ntsc => 4,
            TvSystem::Pal => 2,
        }
    }

    #[inline]
    /// Frames per second.
    pub const fn frame_rate(self) -> u32 {
        match self {
            TvSystem::Ntsc => 60,
            TvSystem::Pal => 50,
        }
    }

    #[inline]
    /// Duration of one frame in milliseconds.
    pub fn frame_period_millis(self) -> f32 {
        1000.0 / self.frame_rate() as f32
    }

    #[inline]
    /// Master cycles per frame.
    pub const fn frame_cycles(self) -> i64 {
        self.scanline_cycles() * self.scanlines() as i64
    }

    #[inline]
    /// DMC output rate table, in CPU cycles per output bit.
    pub const fn dmc_periods(self) -> &'static [u16; 16] {
        match self {
            TvSystem::Ntsc => &DMC_PERIODS_NTSC,
            TvSystem::Pal => &DMC_PERIODS_PAL,
        }
    }
}

const DMC_PERIODS_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 85, 72, 54,
];

const DMC_PERIODS_PAL: [u16; 16] = [
    397, 353, 315, 297, 265, 235, 209, 198, 176, 148, 131, 118, 98, 78, 66, 50,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// How finely CPU execution is interleaved with picture rendering.
///
/// The coarse modes hand the CPU a whole scanline at once; the fine modes split
/// the scanline around the 256-dot active window so mid-line register writes
/// land on the right side of the split; `Tile` interleaves every 8 pixels for
/// boards that switch banks mid-scanline.
pub enum RenderMode {
    /// Render the line, then run its CPU slice (fine split).
    Pre,
    /// Run the CPU up to h-blank, then render the line (fine split).
    #[default]
    Post,
    /// Render, then run a whole scanline of CPU.
    PreAll,
    /// Run a whole scanline of CPU, then render.
    PostAll,
    /// Run the CPU between every background tile.
    Tile,
}

impl RenderMode {
    #[inline]
    pub const fn is_coarse(self) -> bool {
        matches!(self, RenderMode::PreAll | RenderMode::PostAll)
    }
}
