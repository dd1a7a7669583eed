//! Cycle-accurate NES / Famicom emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/PPU/APU,
//! banked memory and cartridge boards). Frontends live in separate crates
//! and drive the core via the [`nes`] facade: attach a [`FrameBuffer`],
//! call [`Nes::run_frame`] once per display refresh and drain audio from
//! the [`audio_queue`].

/// Audio Processing Unit (APU) emulation.
pub mod apu;

/// Lock-free audio ring buffer shared with the host's audio callback.
pub mod audio_queue;

/// CPU address decode and the per-frame scheduler.
pub mod bus;

/// iNES image parsing.
pub mod cartridge;

/// Configuration fixed at construction.
pub mod config;

/// Standard pads behind `$4016`/`$4017`.
pub mod controller;

/// 2A03 CPU core (6502 without decimal mode).
pub mod cpu;

/// Load and execution errors.
pub mod error;

/// TV standards, timing constants and render modes.
pub mod hardware;

/// Cartridge boards.
pub mod mapper;

/// Banked ROM/RAM windows.
pub mod memory;

/// High-level facade that wires every chip into a single machine.
pub mod nes;

/// Picture Processing Unit (PPU) emulation.
pub mod ppu;

pub use config::Config;
pub use controller::Button;
pub use error::{ExecutionFault, LoadError};
pub use hardware::{RenderMode, TvSystem};
pub use nes::Nes;
pub use ppu::FrameBuffer;
