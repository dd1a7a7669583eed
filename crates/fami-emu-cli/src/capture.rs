use fami_emu_core::{
    FrameBuffer,
    ppu::{FRAME_HEIGHT, VISIBLE_WIDTH},
};
use std::{fs::File, io::BufWriter, path::Path};

/// Visible 256×240 area as tightly packed RGBA.
pub fn frame_to_rgba(frame: &FrameBuffer) -> Vec<u8> {
    let mut out = Vec::with_capacity(VISIBLE_WIDTH * FRAME_HEIGHT * 4);
    for y in 0..FRAME_HEIGHT {
        for &px in frame.visible_row(y) {
            let [b, g, r, a] = px.to_le_bytes();
            out.extend_from_slice(&[r, g, b, a]);
        }
    }
    out
}

pub fn write_png(path: &Path, frame: &FrameBuffer) -> Result<(), png::EncodingError> {
    let w = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(w, VISIBLE_WIDTH as u32, FRAME_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame_to_rgba(frame))?;
    writer.finish()
}

/// Mono 16-bit WAV writer fed one frame of samples at a time.
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    samples: u64,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32) -> hound::Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: hound::WavWriter::create(path, spec)?,
            samples: 0,
        })
    }

    pub fn write(&mut self, samples: &[i16]) -> hound::Result<()> {
        for &s in samples {
            self.writer.write_sample(s)?;
        }
        self.samples += samples.len() as u64;
        Ok(())
    }

    /// Flush the header and return the number of samples written.
    pub fn finish(self) -> hound::Result<u64> {
        self.writer.finalize()?;
        Ok(self.samples)
    }
}
