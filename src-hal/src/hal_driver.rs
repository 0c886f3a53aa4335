//! Core Audio HAL driver implementation
//!
//! [`HALDriver`] is the one driver-wide context: it owns the sample ring, the
//! clock state and the running flag, and answers every HAL entry point.
//! Only the bridge holds it in a process-wide static; everything here takes
//! `&self` so the IO path never needs a lock.
//!
//! Object tree:
//!  - the plug-in (ID = 1)
//!      - a device (ID = 3)
//!          - an input stream (ID = 4): recording apps read the ring
//!          - an output stream (ID = 5): playing apps write the ring
//!
//! Real-time entry points (`start_io`, `stop_io`, `zero_timestamp`,
//! `do_io_operation`) do not log, allocate or block.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio_buffer::SampleRing;
use crate::clock::{ClockState, HostClock, ZeroTimestamp};
use crate::config::DriverConfig;
use crate::properties::*;
use crate::utils::fourcc;
use crate::{AudioObjectID, DriverError, Result};

pub const kObjectID_PlugIn: AudioObjectID = 1;
pub const kObjectID_Device: AudioObjectID = 3;
pub const kObjectID_Stream_Input: AudioObjectID = 4;
pub const kObjectID_Stream_Output: AudioObjectID = 5;

/// Non-stream objects; streams resolve through [`HALDriver::stream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectType {
    PlugIn,
    Device,
    Unknown,
}

/// Direction of a stream endpoint, encoded as `kAudioStreamPropertyDirection`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Output = 0,
    Input = 1,
}

/// One side of the loopback: a fixed-format stream over the shared ring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamEndpoint {
    pub id: AudioObjectID,
    pub direction: StreamDirection,
    pub format: StreamFormat,
    pub active: bool,
}

impl StreamEndpoint {
    pub const fn new(id: AudioObjectID, direction: StreamDirection, format: StreamFormat) -> Self {
        Self {
            id,
            direction,
            format,
            active: true,
        }
    }
}

/// Device IO state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoState {
    Stopped,
    Running,
}

/// HAL IO operations this driver cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    /// `kAudioServerPlugInIOOperationReadInput`
    ReadInput,
    /// `kAudioServerPlugInIOOperationWriteMix`
    WriteMix,
    Other(u32),
}

impl IoOperation {
    pub const READ_INPUT: u32 = fourcc(b"read");
    pub const WRITE_MIX: u32 = fourcc(b"rite");

    pub fn from_id(id: u32) -> Self {
        match id {
            Self::READ_INPUT => IoOperation::ReadInput,
            Self::WRITE_MIX => IoOperation::WriteMix,
            other => IoOperation::Other(other),
        }
    }
}

/// The main HAL driver structure
pub struct HALDriver {
    config: DriverConfig,

    /// Loopback ring shared by both streams
    ring: Box<dyn SampleRing>,

    clock: ClockState,

    host_clock: Box<dyn HostClock>,

    /// Whether I/O is currently running
    running: AtomicBool,

    format: StreamFormat,

    input: StreamEndpoint,

    output: StreamEndpoint,
}

impl HALDriver {
    /// Create the driver context; the ring is allocated here and never again
    pub fn new(config: DriverConfig, host_clock: Box<dyn HostClock>) -> Self {
        let ring = config.build_ring();
        let format = config.stream_format();
        Self {
            config,
            ring,
            clock: ClockState::new(),
            host_clock,
            running: AtomicBool::new(false),
            format,
            input: StreamEndpoint::new(kObjectID_Stream_Input, StreamDirection::Input, format),
            output: StreamEndpoint::new(kObjectID_Stream_Output, StreamDirection::Output, format),
        }
    }

    /// Capture the host clock frequency and derive ticks per frame
    pub fn initialize(&self) -> Result<()> {
        let frequency = self.host_clock.frequency_hz();
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(DriverError::Config(format!(
                "host clock frequency is not usable: {frequency}"
            )));
        }
        let ticks_per_frame = self.clock.calibrate(frequency, self.format.sample_rate);

        log::info!(
            "Initialized {}: {} Hz, {} channels, ring {} samples ({:?}), host clock {:.0} Hz, {:.4} ticks/frame",
            self.config.device_name,
            self.format.sample_rate,
            self.format.channels_per_frame,
            self.ring.capacity(),
            self.config.ring_kind,
            frequency,
            ticks_per_frame
        );
        Ok(())
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn ring(&self) -> &dyn SampleRing {
        self.ring.as_ref()
    }

    pub fn clock(&self) -> &ClockState {
        &self.clock
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// The endpoint behind a stream object ID
    pub fn stream(&self, object_id: AudioObjectID) -> Option<&StreamEndpoint> {
        match object_id {
            kObjectID_Stream_Input => Some(&self.input),
            kObjectID_Stream_Output => Some(&self.output),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn io_state(&self) -> IoState {
        if self.is_running() {
            IoState::Running
        } else {
            IoState::Stopped
        }
    }

    /// Stopped → Running: re-anchor the clock and rewind the ring
    ///
    /// Starting a running device is a no-op.
    pub fn start_io(&self) {
        if !self.is_running() {
            self.clock.set_anchor(self.host_clock.now());
            self.ring.reset();
            self.running.store(true, Ordering::Relaxed);
        }
    }

    /// Running → Stopped; ring contents and cursor are left as they are
    pub fn stop_io(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Current sample position against the last IO start
    pub fn zero_timestamp(&self) -> ZeroTimestamp {
        self.clock.timestamp(self.host_clock.now())
    }

    /// `(will_do, will_do_in_place)` for a HAL IO operation
    pub fn will_do_io_operation(&self, operation_id: u32) -> (bool, bool) {
        match IoOperation::from_id(operation_id) {
            IoOperation::ReadInput | IoOperation::WriteMix => (true, true),
            IoOperation::Other(_) => (false, true),
        }
    }

    /// Move one IO cycle of interleaved samples through the ring
    ///
    /// The output stream writes `buffer` into the ring, the input stream
    /// fills `buffer` from it. At most `frame_count * channels` samples are
    /// touched. Unknown streams and a stopped device are no-ops.
    pub fn do_io_operation(&self, stream_id: AudioObjectID, frame_count: u32, buffer: &mut [f32]) {
        if !self.is_running() {
            return;
        }
        let samples = (frame_count as usize)
            .saturating_mul(self.format.channels_per_frame as usize)
            .min(buffer.len());
        let buffer = &mut buffer[..samples];

        match self.stream(stream_id) {
            Some(stream) if stream.active => match stream.direction {
                StreamDirection::Output => self.ring.write(buffer),
                StreamDirection::Input => self.ring.read(buffer),
            },
            _ => {}
        }
    }

    /// The device is fixed; the HAL cannot create more
    pub fn create_device(&self) -> Result<AudioObjectID> {
        log::warn!("create_device requested, the device list is fixed");
        Err(DriverError::UnsupportedOperation)
    }

    pub fn destroy_device(&self, device_id: AudioObjectID) -> Result<()> {
        log::warn!("destroy_device requested for {}, the device list is fixed", device_id);
        Err(DriverError::UnsupportedOperation)
    }

    /// Determine the type of an audio object
    fn object_type(&self, object_id: AudioObjectID) -> ObjectType {
        match object_id {
            kObjectID_PlugIn => ObjectType::PlugIn,
            kObjectID_Device => ObjectType::Device,
            _ => ObjectType::Unknown,
        }
    }

    /// Streams visible in `scope`
    fn streams_in_scope(scope: u32) -> ObjectList {
        match scope {
            kAudioObjectPropertyScopeInput => ObjectList::one(kObjectID_Stream_Input),
            kAudioObjectPropertyScopeOutput => ObjectList::one(kObjectID_Stream_Output),
            _ => ObjectList::two(kObjectID_Stream_Input, kObjectID_Stream_Output),
        }
    }

    /// The single source of truth for every property this driver publishes
    fn property_value(
        &self,
        object_id: AudioObjectID,
        address: &PropertyAddress,
    ) -> Option<PropertyValue<'_>> {
        use PropertyValue::*;

        if let Some(stream) = self.stream(object_id) {
            return Self::stream_property(stream, address.selector);
        }

        let obj_type = self.object_type(object_id);
        let config = &self.config;

        let value = match (obj_type, address.selector) {
            (ObjectType::Unknown, _) => return None,

            // Properties common to all objects
            (_, kAudioObjectPropertyBaseClass) => U32(kAudioObjectClassID),

            (ObjectType::PlugIn, kAudioObjectPropertyClass) => U32(kAudioPlugInClassID),
            (ObjectType::PlugIn, kAudioObjectPropertyOwner) => U32(kAudioObjectUnknown),
            (ObjectType::PlugIn, kAudioObjectPropertyManufacturer) => Str(&config.manufacturer),
            (
                ObjectType::PlugIn,
                kAudioObjectPropertyOwnedObjects | kAudioPlugInPropertyDeviceList,
            ) => Objects(ObjectList::one(kObjectID_Device)),

            (ObjectType::Device, kAudioObjectPropertyClass) => U32(kAudioDeviceClassID),
            (ObjectType::Device, kAudioObjectPropertyOwner) => U32(kObjectID_PlugIn),
            (ObjectType::Device, kAudioObjectPropertyName) => Str(&config.device_name),
            (ObjectType::Device, kAudioObjectPropertyManufacturer) => Str(&config.manufacturer),
            (ObjectType::Device, kAudioDevicePropertyDeviceUID) => Str(&config.device_uid),
            (ObjectType::Device, kAudioDevicePropertyModelUID) => Str(&config.model_uid),
            (
                ObjectType::Device,
                kAudioObjectPropertyOwnedObjects | kAudioDevicePropertyStreams,
            ) => Objects(Self::streams_in_scope(address.scope)),
            (ObjectType::Device, kAudioDevicePropertyNominalSampleRate) => {
                F64(self.format.sample_rate)
            }
            (ObjectType::Device, kAudioDevicePropertyAvailableNominalSampleRates) => {
                Range(ValueRange {
                    minimum: self.format.sample_rate,
                    maximum: self.format.sample_rate,
                })
            }
            (ObjectType::Device, kAudioDevicePropertyDeviceIsRunning) => {
                U32(self.is_running() as u32)
            }
            (ObjectType::Device, kAudioDevicePropertyDeviceIsAlive) => U32(1),
            (ObjectType::Device, kAudioDevicePropertyTransportType) => {
                U32(kAudioDeviceTransportTypeVirtual)
            }
            (
                ObjectType::Device,
                kAudioDevicePropertyDeviceCanBeDefaultDevice
                | kAudioDevicePropertyDeviceCanBeDefaultSystemDevice,
            ) => U32(1),
            (
                ObjectType::Device,
                kAudioDevicePropertyLatency | kAudioDevicePropertySafetyOffset,
            ) => U32(0),
            (ObjectType::Device, kAudioDevicePropertyZeroTimeStampPeriod) => {
                U32(u32::try_from(config.ring_frames).unwrap_or(u32::MAX))
            }

            _ => return None,
        };
        Some(value)
    }

    fn stream_property(stream: &StreamEndpoint, selector: u32) -> Option<PropertyValue<'static>> {
        use PropertyValue::*;

        let value = match selector {
            kAudioObjectPropertyBaseClass => U32(kAudioObjectClassID),
            kAudioObjectPropertyClass => U32(kAudioStreamClassID),
            kAudioObjectPropertyOwner => U32(kObjectID_Device),
            kAudioStreamPropertyDirection => U32(stream.direction as u32),
            kAudioStreamPropertyIsActive => U32(stream.active as u32),
            kAudioStreamPropertyTerminalType => U32(kAudioStreamTerminalTypeLine),
            kAudioStreamPropertyStartingChannel => U32(1),
            kAudioStreamPropertyLatency => U32(0),
            kAudioStreamPropertyVirtualFormat | kAudioStreamPropertyPhysicalFormat => {
                Format(stream.format)
            }
            _ => return None,
        };
        Some(value)
    }

    /// Check if the driver has a specific property
    pub fn has_property(&self, object_id: AudioObjectID, address: &PropertyAddress) -> bool {
        self.property_value(object_id, address).is_some()
    }

    /// Nothing on this device is settable
    pub fn is_property_settable(
        &self,
        object_id: AudioObjectID,
        address: &PropertyAddress,
    ) -> Result<bool> {
        self.lookup(object_id, address).map(|_| false)
    }

    /// Get the size of property data
    pub fn get_property_data_size(
        &self,
        object_id: AudioObjectID,
        address: &PropertyAddress,
    ) -> Result<u32> {
        self.lookup(object_id, address).map(|value| value.byte_size())
    }

    /// Get property data
    pub fn get_property_data(
        &self,
        object_id: AudioObjectID,
        address: &PropertyAddress,
    ) -> Result<PropertyValue<'_>> {
        self.lookup(object_id, address)
    }

    /// Set property data
    pub fn set_property_data(
        &self,
        object_id: AudioObjectID,
        address: &PropertyAddress,
    ) -> Result<()> {
        self.lookup(object_id, address)?;
        log::warn!(
            "set_property_data refused for object {} selector {}",
            object_id,
            crate::utils::fourcc_to_string(&address.selector)
        );
        Err(DriverError::UnsupportedOperation)
    }

    fn lookup(
        &self,
        object_id: AudioObjectID,
        address: &PropertyAddress,
    ) -> Result<PropertyValue<'_>> {
        self.property_value(object_id, address).ok_or_else(|| {
            log::debug!(
                "Unknown property {} on object {}",
                crate::utils::fourcc_to_string(&address.selector),
                object_id
            );
            DriverError::UnknownProperty {
                object: object_id,
                selector: address.selector,
            }
        })
    }
}
