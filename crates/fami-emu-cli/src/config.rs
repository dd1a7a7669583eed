use clap::ValueEnum;
use fami_emu_core::{Config, RenderMode, TvSystem, config::DEFAULT_SAMPLE_RATE};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Tv {
    #[default]
    Ntsc,
    Pal,
}

impl From<Tv> for TvSystem {
    fn from(tv: Tv) -> Self {
        match tv {
            Tv::Ntsc => TvSystem::Ntsc,
            Tv::Pal => TvSystem::Pal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Interleave {
    Pre,
    #[default]
    Post,
    PreAll,
    PostAll,
    Tile,
}

impl From<Interleave> for RenderMode {
    fn from(mode: Interleave) -> Self {
        match mode {
            Interleave::Pre => RenderMode::Pre,
            Interleave::Post => RenderMode::Post,
            Interleave::PreAll => RenderMode::PreAll,
            Interleave::PostAll => RenderMode::PostAll,
            Interleave::Tile => RenderMode::Tile,
        }
    }
}

/// Persistent defaults; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CliConfig {
    pub tv: Tv,
    pub render_mode: Interleave,
    pub all_sprites: bool,
    pub patch: u64,
    pub sample_rate: u32,
    /// Load and store `<rom>.sav` for battery-backed cartridges.
    pub save_ram: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            tv: Tv::default(),
            render_mode: Interleave::default(),
            all_sprites: false,
            patch: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            save_ram: true,
        }
    }
}

impl CliConfig {
    pub fn machine(&self) -> Config {
        Config::default()
            .with_tv(self.tv.into())
            .with_render_mode(self.render_mode.into())
            .with_all_sprites(self.all_sprites)
            .with_patch(self.patch)
            .with_sample_rate(self.sample_rate)
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("fami-emu").join("config.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fami-emu").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("fami-emu")
            .join("config.toml");
    }

    PathBuf::from("config.toml")
}

pub fn load_from_file(path: &Path) -> CliConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return CliConfig::default(),
    };

    match toml::from_str::<CliConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            CliConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &CliConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
