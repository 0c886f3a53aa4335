//! End-to-end IO cycles through the driver context

use std::sync::Arc;

use sapphire_hal::hal_driver::{kObjectID_Device, kObjectID_Stream_Input, kObjectID_Stream_Output};
use sapphire_hal::properties::kAudioDevicePropertyDeviceIsRunning;
use sapphire_hal::{
    DriverConfig, HALDriver, ManualClock, PropertyAddress, PropertyValue, RingKind, RING_FRAMES,
};

const CLOCK_HZ: f64 = 44100.0 * 10.0;

fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32 * 0.25).collect()
}

fn running_driver(config: DriverConfig) -> (HALDriver, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(CLOCK_HZ));
    let driver = HALDriver::new(config, Box::new(Arc::clone(&clock)));
    driver.initialize().unwrap();
    driver.start_io();
    (driver, clock)
}

fn is_running(driver: &HALDriver) -> PropertyValue<'_> {
    driver
        .get_property_data(
            kObjectID_Device,
            &PropertyAddress::global(kAudioDevicePropertyDeviceIsRunning),
        )
        .unwrap()
}

#[test]
fn full_ring_round_trip_is_bit_exact() {
    let (driver, _) = running_driver(DriverConfig::default());
    let frames = RING_FRAMES as u32;
    let mut played = ramp(RING_FRAMES * 2);
    let mut recorded = vec![0.0f32; RING_FRAMES * 2];

    driver.do_io_operation(kObjectID_Stream_Output, frames, &mut played);
    driver.do_io_operation(kObjectID_Stream_Input, frames, &mut recorded);

    assert_eq!(recorded, played);
    assert_eq!(driver.ring().cursor(), 0);
}

#[test]
fn oversized_write_keeps_the_newest_ring_of_samples() {
    let (driver, _) = running_driver(DriverConfig::default());
    let capacity = RING_FRAMES * 2;
    let mut played = ramp(6000 * 2);
    let mut recorded = vec![0.0f32; capacity];

    driver.do_io_operation(kObjectID_Stream_Output, 6000, &mut played);
    driver.do_io_operation(kObjectID_Stream_Input, RING_FRAMES as u32, &mut recorded);

    // Slot k holds the last sample written to it
    let overwritten = played.len() - capacity;
    for (k, &sample) in recorded.iter().enumerate() {
        let expected = if k < overwritten { played[k + capacity] } else { played[k] };
        assert_eq!(sample, expected, "slot {k}");
    }

    let mut newest = played[overwritten..].to_vec();
    let mut sorted = recorded.clone();
    newest.sort_by(f32::total_cmp);
    sorted.sort_by(f32::total_cmp);
    assert_eq!(sorted, newest);
}

#[test]
fn device_is_running_follows_lifecycle() {
    let clock = Arc::new(ManualClock::new(CLOCK_HZ));
    let driver = HALDriver::new(DriverConfig::default(), Box::new(clock));
    driver.initialize().unwrap();

    assert_eq!(is_running(&driver), PropertyValue::U32(0));
    driver.start_io();
    assert_eq!(is_running(&driver), PropertyValue::U32(1));
    driver.start_io();
    assert_eq!(is_running(&driver), PropertyValue::U32(1));
    driver.stop_io();
    assert_eq!(is_running(&driver), PropertyValue::U32(0));
}

#[test]
fn restart_rewinds_but_keeps_stale_content() {
    let (driver, _) = running_driver(DriverConfig::default());
    let mut played = ramp(8);
    let mut partial = [0.0f32; 4];

    driver.do_io_operation(kObjectID_Stream_Output, 4, &mut played);
    driver.do_io_operation(kObjectID_Stream_Input, 2, &mut partial);
    assert_eq!(driver.ring().cursor(), 4);

    driver.stop_io();
    driver.start_io();
    assert_eq!(driver.ring().cursor(), 0);

    let mut recorded = [0.0f32; 8];
    driver.do_io_operation(kObjectID_Stream_Input, 4, &mut recorded);
    assert_eq!(&recorded[..], &played[..]);
}

#[test]
fn io_on_stopped_device_is_ignored() {
    let clock = Arc::new(ManualClock::new(CLOCK_HZ));
    let driver = HALDriver::new(DriverConfig::default(), Box::new(clock));
    driver.initialize().unwrap();

    let mut played = [1.0f32; 8];
    driver.do_io_operation(kObjectID_Stream_Output, 4, &mut played);

    driver.start_io();
    let mut recorded = [7.0f32; 8];
    driver.do_io_operation(kObjectID_Stream_Input, 4, &mut recorded);
    assert_eq!(recorded, [0.0; 8]);
}

#[test]
fn zero_timestamp_tracks_host_clock_from_start() {
    let (driver, clock) = running_driver(DriverConfig::default());
    assert_eq!(driver.zero_timestamp().sample_time, 0.0);

    clock.advance(5120);
    let ts = driver.zero_timestamp();
    assert_eq!(ts.sample_time, 512.0);
    assert_eq!(ts.host_time, 5120);
    assert_eq!(ts.seed, 1);

    driver.stop_io();
    clock.advance(1000);
    assert_eq!(driver.zero_timestamp().sample_time, 612.0);

    driver.start_io();
    assert_eq!(driver.zero_timestamp().sample_time, 0.0);
    assert_eq!(driver.clock().anchor(), 6120);
}

#[test]
fn concurrent_writer_and_reader_see_only_written_samples() {
    let config = DriverConfig {
        ring_frames: 256,
        ring_kind: RingKind::Dual,
        ..DriverConfig::default()
    };
    let (driver, _) = running_driver(config);
    let cycles = 2000u32;
    let frames = 64u32;

    crossbeam::thread::scope(|s| {
        s.spawn(|_| {
            let mut block = vec![0.0f32; frames as usize * 2];
            for cycle in 1..=cycles {
                block.fill(cycle as f32);
                driver.do_io_operation(kObjectID_Stream_Output, frames, &mut block);
            }
        });
        s.spawn(|_| {
            let mut block = vec![0.0f32; frames as usize * 2];
            for _ in 0..cycles {
                driver.do_io_operation(kObjectID_Stream_Input, frames, &mut block);
                for &sample in &block {
                    assert!(
                        sample == 0.0 || (1.0..=cycles as f32).contains(&sample),
                        "unexpected sample {sample}"
                    );
                    assert_eq!(sample.fract(), 0.0);
                }
            }
        });
    })
    .unwrap();
}
