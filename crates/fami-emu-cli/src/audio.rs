use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use fami_emu_core::audio_queue::AudioConsumer;
use log::{error, warn};

/// Output rate of the default device, so the machine can be built to match.
pub fn device_sample_rate() -> Option<u32> {
    let device = cpal::default_host().default_output_device()?;
    match device.default_output_config() {
        Ok(c) => Some(c.sample_rate().0),
        Err(e) => {
            warn!("no supported output config: {e}");
            None
        }
    }
}

/// Stream mono samples from `queue` to every channel of the default device.
///
/// Returns the playing [`cpal::Stream`]; dropping it stops playback.
pub fn start_stream(queue: AudioConsumer) -> Option<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device()?;
    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            warn!("no supported output config: {e}");
            return None;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let err_fn = |err| error!("cpal stream error: {err}");

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| {
                for frame in data.chunks_mut(channels) {
                    frame.fill(queue.pop().unwrap_or(0));
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _| {
                for frame in data.chunks_mut(channels) {
                    let s = queue.pop().unwrap_or(0);
                    frame.fill((s as i32 + 32768) as u16);
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                for frame in data.chunks_mut(channels) {
                    let s = queue.pop().unwrap_or(0);
                    frame.fill(s as f32 / 32768.0);
                }
            },
            err_fn,
            None,
        ),
        other => {
            warn!("unsupported sample format {other:?}");
            return None;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to open output stream: {e}");
            return None;
        }
    };
    if let Err(e) = stream.play() {
        warn!("failed to start output stream: {e}");
        return None;
    }
    Some(stream)
}
