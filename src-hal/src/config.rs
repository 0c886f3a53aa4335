//! Driver configuration
//!
//! Identity strings and ring sizing. The stream format itself is fixed
//! ([`CHANNEL_COUNT`], [`SAMPLE_RATE`]) and not configurable.
//!
//! Environment overrides, read once at plug-in load:
//! - `SAPPHIRE_RING_FRAMES`: ring length in frames (1 to [`MAX_RING_FRAMES`])
//! - `SAPPHIRE_RING_KIND`: `shared` (default) or `dual`

use std::str::FromStr;

use crate::audio_buffer::{DualCursorRing, SampleRing, SharedCursorRing};
use crate::properties::StreamFormat;
use crate::{
    DriverError, Result, CHANNEL_COUNT, DEVICE_MODEL_UID, DEVICE_UID, DRIVER_BUNDLE_ID,
    DRIVER_MANUFACTURER, DRIVER_NAME, RING_FRAMES, SAMPLE_RATE,
};

pub const ENV_RING_FRAMES: &str = "SAPPHIRE_RING_FRAMES";
pub const ENV_RING_KIND: &str = "SAPPHIRE_RING_KIND";

/// Upper bound for `SAPPHIRE_RING_FRAMES`, about 23 s at 44.1 kHz
pub const MAX_RING_FRAMES: usize = 1 << 20;

/// Which ring layout backs the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RingKind {
    /// One cursor, advanced by input reads only
    #[default]
    Shared,
    /// Independent read and write cursors
    Dual,
}

impl FromStr for RingKind {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(RingKind::Shared),
            "dual" => Ok(RingKind::Dual),
            other => Err(DriverError::Config(format!(
                "{ENV_RING_KIND} must be 'shared' or 'dual', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub bundle_id: String,
    pub device_name: String,
    pub manufacturer: String,
    pub device_uid: String,
    pub model_uid: String,
    /// Ring length in frames
    pub ring_frames: usize,
    pub ring_kind: RingKind,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            bundle_id: DRIVER_BUNDLE_ID.to_string(),
            device_name: DRIVER_NAME.to_string(),
            manufacturer: DRIVER_MANUFACTURER.to_string(),
            device_uid: DEVICE_UID.to_string(),
            model_uid: DEVICE_MODEL_UID.to_string(),
            ring_frames: RING_FRAMES,
            ring_kind: RingKind::default(),
        }
    }
}

impl DriverConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_RING_FRAMES) {
            let frames: usize = raw.trim().parse().map_err(|_| {
                DriverError::Config(format!("{ENV_RING_FRAMES} is not an integer: '{raw}'"))
            })?;
            if !(1..=MAX_RING_FRAMES).contains(&frames) {
                return Err(DriverError::Config(format!(
                    "{ENV_RING_FRAMES} must be between 1 and {MAX_RING_FRAMES}, got {frames}"
                )));
            }
            self.ring_frames = frames;
        }
        if let Some(raw) = lookup(ENV_RING_KIND) {
            self.ring_kind = raw.parse()?;
        }
        Ok(self)
    }

    pub fn channels(&self) -> u32 {
        CHANNEL_COUNT
    }

    pub fn sample_rate(&self) -> f64 {
        SAMPLE_RATE
    }

    /// Ring length in interleaved samples
    pub fn ring_capacity(&self) -> usize {
        self.ring_frames.saturating_mul(CHANNEL_COUNT as usize)
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat::float32_interleaved(SAMPLE_RATE, CHANNEL_COUNT)
    }

    /// Allocate the configured ring; called once at plug-in load
    pub fn build_ring(&self) -> Box<dyn SampleRing> {
        match self.ring_kind {
            RingKind::Shared => Box::new(SharedCursorRing::new(self.ring_capacity())),
            RingKind::Dual => Box::new(DualCursorRing::new(self.ring_capacity())),
        }
    }
}
