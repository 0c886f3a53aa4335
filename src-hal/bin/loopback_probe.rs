//! Drive the loopback device through simulated IO cycles
//!
//! Runs the driver against a manually stepped host clock: each cycle writes
//! a sine burst to the output stream, reads the input stream back and
//! reports the zero timestamp the HAL would see.
//!
//! Usage: `loopback_probe [cycles] [frames_per_cycle]`

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use sapphire_hal::clock::frames_to_ticks;
use sapphire_hal::hal_driver::{kObjectID_Stream_Input, kObjectID_Stream_Output};
use sapphire_hal::{DriverConfig, HALDriver, IoOperation, ManualClock, CHANNEL_COUNT, SAMPLE_RATE};

// Apple silicon timebase
const PROBE_CLOCK_HZ: f64 = 24_000_000.0;

fn parse_arg(args: &[String], index: usize, default: u32) -> Result<u32> {
    match args.get(index) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("argument {index} is not a positive integer: '{raw}'")),
        None => Ok(default),
    }
}

/// `(cycles, frames_per_cycle)`, both at least 1
fn parse_args(args: &[String]) -> Result<(u32, u32)> {
    let cycles = parse_arg(args, 1, 8)?;
    let frames = parse_arg(args, 2, 512)?;
    ensure!(cycles > 0, "cycles must be > 0");
    ensure!(frames > 0, "frames_per_cycle must be > 0");
    Ok((cycles, frames))
}

fn main() -> Result<()> {
    sapphire_hal::init_logging();

    let args: Vec<String> = std::env::args().collect();
    let (cycles, frames) = parse_args(&args)?;

    let config = DriverConfig::from_env().context("reading driver configuration")?;
    println!("=== Sapphire loopback probe ===");
    println!(
        "ring: {} frames ({:?}), {} cycles of {} frames",
        config.ring_frames, config.ring_kind, cycles, frames
    );

    let clock = Arc::new(ManualClock::new(PROBE_CLOCK_HZ));
    let driver = HALDriver::new(config, Box::new(Arc::clone(&clock)));
    driver.initialize()?;

    for op in [IoOperation::WRITE_MIX, IoOperation::READ_INPUT] {
        let (will_do, in_place) = driver.will_do_io_operation(op);
        println!("{:?}: will_do={will_do} in_place={in_place}", IoOperation::from_id(op));
    }

    driver.start_io();
    let ticks_per_frame = driver.clock().ticks_per_frame();
    let samples = frames as usize * CHANNEL_COUNT as usize;
    let mut output = vec![0.0f32; samples];
    let mut input = vec![0.0f32; samples];
    let mut phase = 0.0f64;
    let step = 2.0 * std::f64::consts::PI * 440.0 / SAMPLE_RATE;

    for cycle in 0..cycles {
        for frame in output.chunks_exact_mut(CHANNEL_COUNT as usize) {
            let value = (phase.sin() * 0.5) as f32;
            frame.fill(value);
            phase += step;
        }

        let cursor_before = driver.ring().cursor();
        driver.do_io_operation(kObjectID_Stream_Output, frames, &mut output);
        driver.do_io_operation(kObjectID_Stream_Input, frames, &mut input);
        clock.advance(frames_to_ticks(frames as u64, ticks_per_frame));

        let ts = driver.zero_timestamp();
        let matched = input.iter().zip(&output).filter(|(a, b)| a == b).count();
        println!(
            "cycle {cycle:>3}: cursor {cursor_before:>6} -> {:>6}, \
             sample_time {:>10.1}, host_time {:>12}, seed {}, \
             {matched}/{samples} samples looped",
            driver.ring().cursor(),
            ts.sample_time,
            ts.host_time,
            ts.seed
        );
    }

    driver.stop_io();
    println!("stopped: {:?}", driver.io_state());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("loopback_probe")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(parse_args(&args(&[])).unwrap(), (8, 512));
        assert_eq!(parse_args(&args(&["3", "64"])).unwrap(), (3, 64));
    }

    #[test]
    fn test_zero_or_garbage_is_rejected() {
        assert!(parse_args(&args(&["0"])).is_err());
        assert!(parse_args(&args(&["4", "0"])).is_err());
        assert!(parse_args(&args(&["-1"])).is_err());
        assert!(parse_args(&args(&["many"])).is_err());
    }
}
