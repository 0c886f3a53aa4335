//! Sapphire Audio HAL Driver - Virtual Loopback Device
//!
//! This library implements the real-time core of a Core Audio Hardware
//! Abstraction Layer (HAL) plug-in that publishes one virtual stereo device on
//! macOS.
//!
//! The driver is intentionally minimal:
//! - One device with an output stream (apps play into it) and an input stream
//!   (apps record the same audio back)
//! - Both streams share a single lock-free sample ring
//! - Zero timestamps are derived from the host clock anchored at IO start
//!
//! Data flow:
//! - Output: macOS apps → HAL `DoIOOperation(output)` → ring write
//! - Input (loopback): ring read → HAL `DoIOOperation(input)` → recording apps
//!
//! Everything except `bridge` is platform independent so the IO path can be
//! exercised without the audio server.

// Allow Apple's naming convention for Core Audio constants
#![allow(non_upper_case_globals)]

use std::sync::Once;

// Module declarations
pub mod audio_buffer;
pub mod clock;
pub mod config;
pub mod hal_driver;
pub mod properties;
pub mod utils;

#[cfg(target_os = "macos")]
pub mod bridge;

// Re-exports for easier use
pub use audio_buffer::{DualCursorRing, SampleRing, SharedCursorRing};
pub use clock::{ClockState, HostClock, ManualClock, ZeroTimestamp};
pub use config::{DriverConfig, RingKind};
pub use hal_driver::{HALDriver, IoOperation, IoState, StreamDirection, StreamEndpoint};
pub use properties::{PropertyAddress, PropertyValue, StreamFormat};

/// OSStatus as seen by the HAL (plain `i32`, also on non-Apple targets)
pub type OSStatus = i32;

/// Core Audio object identifier
pub type AudioObjectID = u32;

/// Error types for the audio driver
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("unsupported operation")]
    UnsupportedOperation,

    #[error("unknown property {} on object {object}", utils::fourcc_to_string(.selector))]
    UnknownProperty {
        object: AudioObjectID,
        selector: u32,
    },

    #[error("bad parameter: {0}")]
    BadParameter(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DriverError {
    /// The HAL status code reported for this error
    pub fn os_status(&self) -> OSStatus {
        match self {
            DriverError::UnsupportedOperation => kAudioHardwareUnsupportedOperationError,
            DriverError::UnknownProperty { .. } => kAudioHardwareUnknownPropertyError,
            DriverError::BadParameter(_) => kAudioHardwareBadParameterError,
            DriverError::Config(_) => kAudioHardwareUnspecifiedError,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Convert a crate result to the status code handed back to the HAL
pub fn to_os_status<T>(result: &Result<T>) -> OSStatus {
    match result {
        Ok(_) => kAudioHardwareNoError,
        Err(e) => e.os_status(),
    }
}

// HAL status codes ('what', 'unop', '!prm', 'who?')
pub const kAudioHardwareNoError: OSStatus = 0;
pub const kAudioHardwareUnspecifiedError: OSStatus = utils::fourcc(b"what") as OSStatus;
pub const kAudioHardwareUnsupportedOperationError: OSStatus = utils::fourcc(b"unop") as OSStatus;
pub const kAudioHardwareBadParameterError: OSStatus = utils::fourcc(b"!prm") as OSStatus;
pub const kAudioHardwareUnknownPropertyError: OSStatus = utils::fourcc(b"who?") as OSStatus;

/// Driver version information
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DRIVER_BUNDLE_ID: &str = "com.shariq.sapphire.driver";
pub const DRIVER_NAME: &str = "Sapphire Audio";
pub const DRIVER_MANUFACTURER: &str = "Shariq Charolia";
pub const DEVICE_UID: &str = "SapphireAudioDevice_UID";
pub const DEVICE_MODEL_UID: &str = "SapphireAudioDevice_ModelUID";

/// Fixed stream format: interleaved stereo, 32-bit float, 44.1 kHz
pub const CHANNEL_COUNT: u32 = 2;
pub const SAMPLE_RATE: f64 = 44100.0;

/// Default ring size in frames (8192 interleaved samples)
pub const RING_FRAMES: usize = 4096;

static INIT: Once = Once::new();

/// Initialize logging for the driver
///
/// Defaults to `info`, `RUST_LOG` overrides. Safe to call more than once.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
        log::info!("================================================================================");
        log::info!("Sapphire HAL Driver v{} starting", DRIVER_VERSION);
        log::info!("   Name: {}", DRIVER_NAME);
        log::info!("   Manufacturer: {}", DRIVER_MANUFACTURER);
        log::info!("================================================================================");
    });
}

// Core Audio HAL driver entry point (C ABI)
#[cfg(target_os = "macos")]
use coreaudio_sys::{CFAllocatorRef, CFUUIDRef};

/// CFPlugIn factory, named in the bundle's `CFPlugInFactories`
#[cfg(target_os = "macos")]
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn SapphireDriver_Create(
    allocator: CFAllocatorRef,
    requested_type_uuid: CFUUIDRef,
) -> *mut std::os::raw::c_void {
    init_logging();
    bridge::driver_create(allocator, requested_type_uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_four_char_codes() {
        assert_eq!(kAudioHardwareUnsupportedOperationError, 0x756E_6F70);
        assert_eq!(kAudioHardwareUnknownPropertyError, 0x7768_6F3F);
        assert_eq!(kAudioHardwareBadParameterError, 0x2170_726D);
        assert_eq!(kAudioHardwareUnspecifiedError, 0x7768_6174);
    }

    #[test]
    fn test_error_to_status() {
        assert_eq!(to_os_status(&Ok::<(), DriverError>(())), kAudioHardwareNoError);
        assert_eq!(
            to_os_status::<()>(&Err(DriverError::UnsupportedOperation)),
            kAudioHardwareUnsupportedOperationError
        );
        let unknown = DriverError::UnknownProperty {
            object: 3,
            selector: utils::fourcc(b"zzzz"),
        };
        assert_eq!(unknown.os_status(), kAudioHardwareUnknownPropertyError);
        assert_eq!(unknown.to_string(), "unknown property 'zzzz' on object 3");
    }
}
