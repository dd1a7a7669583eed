#[cfg(feature = "audio")]
mod audio;
mod capture;
mod config;

use clap::Parser;
use config::{CliConfig, Interleave, Tv};
use fami_emu_core::{FrameBuffer, Nes, cartridge::Cartridge};
use log::{debug, info, warn};
use std::{
    error::Error,
    path::{Path, PathBuf},
    process::ExitCode,
    time::{Duration, Instant},
};

/// Frames run when neither `--frames` nor `--seconds` is given.
const DEFAULT_FRAMES: u64 = 600;

#[derive(Parser)]
#[command(name = "fami-emu", about = "Headless NES / Famicom emulator")]
struct Args {
    /// Path to an iNES ROM image
    rom: PathBuf,

    /// Emulate a PAL console
    #[arg(long)]
    pal: bool,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u64>,

    /// Wall-clock seconds to run
    #[arg(long)]
    seconds: Option<u64>,

    /// CPU/PPU interleaving
    #[arg(long, value_enum)]
    render_mode: Option<Interleave>,

    /// Draw every sprite on a line instead of the first eight
    #[arg(long)]
    all_sprites: bool,

    /// Cartridge quirk bits (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_bits)]
    patch: Option<u64>,

    /// Audio sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Write the last frame as PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Write all produced audio as mono 16-bit WAV
    #[arg(long, conflicts_with = "play")]
    wav: Option<PathBuf>,

    /// Play audio on the default output device in real time
    #[arg(long)]
    play: bool,

    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the merged flags and config back to the config file
    #[arg(long)]
    save_config: bool,

    /// Log CPU state once per second of emulated time
    #[arg(long)]
    debug: bool,
}

fn parse_bits(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid bit mask {s:?}: {e}"))
}

/// Layer command-line overrides onto the file config.
fn effective_config(args: &Args, mut cfg: CliConfig) -> CliConfig {
    if args.pal {
        cfg.tv = Tv::Pal;
    }
    if let Some(mode) = args.render_mode {
        cfg.render_mode = mode;
    }
    if args.all_sprites {
        cfg.all_sprites = true;
    }
    if let Some(patch) = args.patch {
        cfg.patch = patch;
    }
    if let Some(rate) = args.sample_rate {
        cfg.sample_rate = rate;
    }
    cfg
}

fn save_path(rom: &Path) -> PathBuf {
    rom.with_extension("sav")
}

fn load_battery(nes: &mut Nes, path: &Path) {
    match std::fs::read(path) {
        Ok(data) => {
            info!("Loaded save RAM from {}", path.display());
            nes.load_save_ram(&data);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to read save RAM {}: {e}", path.display()),
    }
}

/// Load the config file, apply flags, and store the result if asked to.
fn prepare_config(args: &Args) -> std::io::Result<CliConfig> {
    let path = args.config.clone().unwrap_or_else(config::default_config_path);
    let cfg = effective_config(args, config::load_from_file(&path));
    if args.save_config {
        config::save_to_file(&path, &cfg)?;
        info!("Saved config to {}", path.display());
    }
    Ok(cfg)
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let cfg = prepare_config(&args)?;
    #[cfg(feature = "audio")]
    let cfg = if args.play
        && args.sample_rate.is_none()
        && let Some(rate) = audio::device_sample_rate()
    {
        CliConfig {
            sample_rate: rate,
            ..cfg
        }
    } else {
        cfg
    };
    #[cfg(not(feature = "audio"))]
    if args.play {
        warn!("built without the `audio` feature; --play only paces frames");
    }

    let cart = Cartridge::from_file(&args.rom)?;
    let mut nes = Nes::from_cartridge(cart, cfg.machine())?;
    debug!("render mode in use: {:?}", nes.render_mode());

    let sav = save_path(&args.rom);
    let battery = cfg.save_ram && nes.has_battery();
    if battery {
        load_battery(&mut nes, &sav);
    }

    if args.screenshot.is_some() {
        nes.set_frame_buffer(Some(FrameBuffer::new()));
    }

    let mut wav = match &args.wav {
        Some(path) => Some(capture::WavSink::create(path, cfg.sample_rate)?),
        None => None,
    };
    let mut chunk = vec![0i16; nes.samples_per_frame()];

    #[cfg(feature = "audio")]
    let _stream = if args.play {
        audio::start_stream(nes.audio_consumer())
    } else {
        None
    };

    let frame_limit = match (args.frames, args.seconds) {
        (None, None) => Some(DEFAULT_FRAMES),
        (frames, _) => frames,
    };
    let second_limit = args.seconds.map(Duration::from_secs);
    let period = Duration::from_secs_f32(nes.frame_period_millis() / 1000.0);
    let frames_per_second = (1000.0 / nes.frame_period_millis()).round() as u64;

    let start = Instant::now();
    let mut deadline = start;
    let result = 'headless: loop {
        if let Err(fault) = nes.run_frame() {
            break 'headless Err(fault);
        }
        let frame = nes.frame_count();

        if let Some(sink) = wav.as_mut() {
            let n = nes.drain_audio_samples(&mut chunk);
            sink.write(&chunk[..n])?;
        }

        if args.debug && frame.is_multiple_of(frames_per_second.max(1)) {
            debug!(
                "frame {frame}: cycles {} {:?}",
                nes.cpu_cycles(),
                nes.registers()
            );
        }

        if let Some(max) = frame_limit
            && frame >= max
        {
            break 'headless Ok(());
        }
        if let Some(limit) = second_limit
            && start.elapsed() >= limit
        {
            break 'headless Ok(());
        }

        if args.play {
            deadline += period;
            if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }
    };

    // Save RAM and captures are still written after a jam.
    if battery {
        match std::fs::write(&sav, nes.save_ram()) {
            Ok(()) => info!("Wrote save RAM to {}", sav.display()),
            Err(e) => warn!("Failed to write save RAM {}: {e}", sav.display()),
        }
    }
    if let (Some(sink), Some(path)) = (wav, &args.wav) {
        let samples = sink.finish()?;
        info!("Wrote {samples} samples to {}", path.display());
    }
    if let (Some(path), Some(frame)) = (&args.screenshot, nes.frame_buffer()) {
        capture::write_png(path, frame)?;
        info!("Wrote screenshot to {}", path.display());
    }

    info!(
        "Ran {} frames ({} CPU cycles) in {:.2?}",
        nes.frame_count(),
        nes.cpu_cycles(),
        start.elapsed()
    );
    result.map_err(Into::into)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
