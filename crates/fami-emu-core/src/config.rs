use crate::hardware::{RenderMode, TvSystem};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Machine configuration fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub tv: TvSystem,
    /// Cartridge-quirk bitmask. The meaning of each bit is board specific
    /// (for example MMC3 uses bits 0-4 to pick an IRQ timing variant).
    pub patch: u64,
    /// Draw every sprite on a scanline instead of stopping at eight.
    pub all_sprites: bool,
    pub render_mode: RenderMode,
    /// Audio output rate in Hz.
    pub sample_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tv: TvSystem::default(),
            patch: 0,
            all_sprites: false,
            render_mode: RenderMode::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl Config {
    pub fn with_tv(mut self, tv: TvSystem) -> Self {
        self.tv = tv;
        self
    }

    pub fn with_patch(mut self, patch: u64) -> Self {
        self.patch = patch;
        self
    }

    pub fn with_all_sprites(mut self, all_sprites: bool) -> Self {
        self.all_sprites = all_sprites;
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate.max(1);
        self
    }

    /// Whole output samples produced per emulated frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate / self.tv.frame_rate()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_ntsc_console() {
        let c = Config::default();
        assert_eq!(c.tv, TvSystem::Ntsc);
        assert_eq!(c.render_mode, RenderMode::Post);
        assert_eq!(c.samples_per_frame(), 735);
        assert_eq!(c.with_tv(TvSystem::Pal).samples_per_frame(), 882);
    }

    #[test]
    fn zero_sample_rate_is_clamped() {
        assert_eq!(Config::default().with_sample_rate(0).sample_rate, 1);
    }
}
