mod common;

use std::thread;

use common::{Image, PROGRAM, with_idle_loop};
use fami_emu_core::{Config, TvSystem, cpu::CpuBus};

fn tone_program() -> Vec<u8> {
    with_idle_loop(
        PROGRAM,
        vec![
            0xA9, 0x01, 0x8D, 0x15, 0x40, // enable pulse 1
            0xA9, 0xBF, 0x8D, 0x00, 0x40, // duty 2, halt, constant volume 15
            0xA9, 0xFD, 0x8D, 0x02, 0x40, // period low
            0xA9, 0x00, 0x8D, 0x03, 0x40, // period high, length load
        ],
    )
}

#[test]
fn samples_per_frame_follow_rate_and_tv() {
    let nes = Image::new(0).boot();
    assert_eq!(nes.samples_per_frame(), 735);
    let nes = Image::new(0).boot_with(
        Config::default()
            .with_tv(TvSystem::Pal)
            .with_sample_rate(48_000),
    );
    assert_eq!(nes.samples_per_frame(), 960);
}

#[test]
fn every_frame_produces_one_frame_of_samples() {
    let mut nes = Image::new(0).boot();
    let consumer = nes.audio_consumer();
    for frame in 1..=3 {
        nes.run_frame().unwrap();
        assert_eq!(consumer.len(), frame * 735);
    }
}

#[test]
fn idle_machine_is_silent() {
    let mut nes = Image::new(0).boot();
    let mut out = vec![1i16; 735];
    for _ in 0..4 {
        nes.run_frame().unwrap();
        assert_eq!(nes.drain_audio_samples(&mut out), 735);
        assert!(out.iter().all(|&s| s == 0));
    }
}

#[test]
fn pulse_tone_reaches_the_queue() {
    let mut nes = Image::new(0).program(&tone_program()).boot();
    let mut out = vec![0i16; 735];
    nes.run_frame().unwrap();
    nes.drain_audio_samples(&mut out);
    nes.run_frame().unwrap();
    assert_eq!(nes.drain_audio_samples(&mut out), 735);
    assert!(out.iter().any(|&s| s > 0));
    assert!(out.iter().any(|&s| s < 0));
}

#[test]
fn underrun_pads_with_silence() {
    let mut nes = Image::new(0).program(&tone_program()).boot();
    nes.run_frame().unwrap();
    let mut out = vec![7i16; 1000];
    assert_eq!(nes.drain_audio_samples(&mut out), 735);
    assert!(out[735..].iter().all(|&s| s == 0));
}

#[test]
fn consumer_drains_on_another_thread() {
    let mut nes = Image::new(0).program(&tone_program()).boot();
    let consumer = nes.audio_consumer();
    for _ in 0..4 {
        nes.run_frame().unwrap();
    }
    let drained = thread::spawn(move || {
        let mut out = vec![0i16; 4 * 735];
        consumer.drain_into(&mut out)
    })
    .join()
    .unwrap();
    assert_eq!(drained, 4 * 735);
}

#[test]
fn status_register_reports_length_counters() {
    // After the tone setup, read $4015 into $10.
    let mut code = tone_program();
    code.truncate(code.len() - 3);
    code.extend([0xAD, 0x15, 0x40, 0x85, 0x10]); // LDA $4015; STA $10
    let program = with_idle_loop(PROGRAM, code);
    let mut nes = Image::new(0).program(&program).boot();
    nes.run_frame().unwrap();
    assert_eq!(nes.bus.read(0x0010) & 0x1F, 0x01);
}

#[test]
fn undrained_queue_keeps_only_the_newest_samples() {
    const FRAMES: usize = 30;
    let image = Image::new(0).program(&tone_program());

    let mut live = image.boot();
    let per_frame = live.samples_per_frame();
    let mut chunk = vec![0i16; per_frame];
    let mut stream = Vec::new();
    for _ in 0..FRAMES {
        live.run_frame().unwrap();
        let n = live.drain_audio_samples(&mut chunk);
        stream.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(stream.len(), FRAMES * per_frame);

    let mut backlog = image.boot();
    let capacity = backlog.audio_consumer().capacity();
    assert!(FRAMES * per_frame > capacity);
    for _ in 0..FRAMES {
        backlog.run_frame().unwrap();
    }
    let mut out = vec![0i16; FRAMES * per_frame];
    let n = backlog.drain_audio_samples(&mut out);
    assert_eq!(n, capacity);
    assert_eq!(out[..n], stream[stream.len() - capacity..]);
}
