//! Core Audio property vocabulary
//!
//! Selector, scope and class constants use Apple's names and four-char codes
//! so traces line up with the CoreAudio headers. Values are modelled as
//! [`PropertyValue`] so that the size reported by `GetPropertyDataSize` and
//! the bytes written by `GetPropertyData` come from the same place.

use crate::utils::{copy_to_buffer, copy_value_to_buffer, fourcc};
use crate::{AudioObjectID, DriverError, Result};

// Object properties
pub const kAudioObjectPropertyBaseClass: u32 = fourcc(b"bcls");
pub const kAudioObjectPropertyClass: u32 = fourcc(b"clas");
pub const kAudioObjectPropertyOwner: u32 = fourcc(b"stdv");
pub const kAudioObjectPropertyName: u32 = fourcc(b"lnam");
pub const kAudioObjectPropertyManufacturer: u32 = fourcc(b"lmak");
pub const kAudioObjectPropertyOwnedObjects: u32 = fourcc(b"ownd");

// Plug-in properties
pub const kAudioPlugInPropertyDeviceList: u32 = fourcc(b"dev#");

// Device properties
pub const kAudioDevicePropertyDeviceUID: u32 = fourcc(b"uid ");
pub const kAudioDevicePropertyModelUID: u32 = fourcc(b"muid");
pub const kAudioDevicePropertyTransportType: u32 = fourcc(b"tran");
pub const kAudioDevicePropertyDeviceIsAlive: u32 = fourcc(b"livn");
pub const kAudioDevicePropertyDeviceIsRunning: u32 = fourcc(b"goin");
pub const kAudioDevicePropertyDeviceCanBeDefaultDevice: u32 = fourcc(b"dflt");
pub const kAudioDevicePropertyDeviceCanBeDefaultSystemDevice: u32 = fourcc(b"sflt");
pub const kAudioDevicePropertyLatency: u32 = fourcc(b"ltnc");
pub const kAudioDevicePropertyStreams: u32 = fourcc(b"stm#");
pub const kAudioDevicePropertySafetyOffset: u32 = fourcc(b"saft");
pub const kAudioDevicePropertyNominalSampleRate: u32 = fourcc(b"nsrt");
pub const kAudioDevicePropertyAvailableNominalSampleRates: u32 = fourcc(b"nsr#");
pub const kAudioDevicePropertyZeroTimeStampPeriod: u32 = fourcc(b"ring");

// Stream properties
pub const kAudioStreamPropertyIsActive: u32 = fourcc(b"sact");
pub const kAudioStreamPropertyDirection: u32 = fourcc(b"sdir");
pub const kAudioStreamPropertyTerminalType: u32 = fourcc(b"term");
pub const kAudioStreamPropertyStartingChannel: u32 = fourcc(b"schn");
// Same value as kAudioDevicePropertyLatency
pub const kAudioStreamPropertyLatency: u32 = fourcc(b"ltnc");
pub const kAudioStreamPropertyVirtualFormat: u32 = fourcc(b"sfmt");
pub const kAudioStreamPropertyPhysicalFormat: u32 = fourcc(b"pft ");

// Scopes and elements
pub const kAudioObjectPropertyScopeGlobal: u32 = fourcc(b"glob");
pub const kAudioObjectPropertyScopeInput: u32 = fourcc(b"inpt");
pub const kAudioObjectPropertyScopeOutput: u32 = fourcc(b"outp");
pub const kAudioObjectPropertyElementMain: u32 = 0;

// Object class IDs
pub const kAudioObjectClassID: u32 = fourcc(b"aobj");
pub const kAudioPlugInClassID: u32 = fourcc(b"aplg");
pub const kAudioDeviceClassID: u32 = fourcc(b"adev");
pub const kAudioStreamClassID: u32 = fourcc(b"astr");

pub const kAudioObjectUnknown: AudioObjectID = 0;
pub const kAudioDeviceTransportTypeVirtual: u32 = fourcc(b"virt");
pub const kAudioStreamTerminalTypeLine: u32 = fourcc(b"line");

// Stream format
pub const kAudioFormatLinearPCM: u32 = fourcc(b"lpcm");
pub const kAudioFormatFlagIsFloat: u32 = 1 << 0;
pub const kAudioFormatFlagIsPacked: u32 = 1 << 3;

/// Property address as passed by the HAL
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAddress {
    pub selector: u32,
    pub scope: u32,
    pub element: u32,
}

impl PropertyAddress {
    pub const fn global(selector: u32) -> Self {
        Self {
            selector,
            scope: kAudioObjectPropertyScopeGlobal,
            element: kAudioObjectPropertyElementMain,
        }
    }

    pub const fn scoped(selector: u32, scope: u32) -> Self {
        Self {
            selector,
            scope,
            element: kAudioObjectPropertyElementMain,
        }
    }
}

/// Layout-compatible mirror of `AudioStreamBasicDescription`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub format_id: u32,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
    pub reserved: u32,
}

impl StreamFormat {
    /// Packed, interleaved 32-bit float LPCM
    pub const fn float32_interleaved(sample_rate: f64, channels: u32) -> Self {
        let bytes_per_frame = channels * std::mem::size_of::<f32>() as u32;
        Self {
            sample_rate,
            format_id: kAudioFormatLinearPCM,
            format_flags: kAudioFormatFlagIsFloat | kAudioFormatFlagIsPacked,
            bytes_per_packet: bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_frame,
            channels_per_frame: channels,
            bits_per_channel: 32,
            reserved: 0,
        }
    }
}

/// Mirror of `AudioValueRange`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub minimum: f64,
    pub maximum: f64,
}

/// Up to two object IDs; the largest list this device ever publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectList {
    ids: [AudioObjectID; 2],
    len: usize,
}

impl ObjectList {
    pub const fn one(id: AudioObjectID) -> Self {
        Self {
            ids: [id, kAudioObjectUnknown],
            len: 1,
        }
    }

    pub const fn two(first: AudioObjectID, second: AudioObjectID) -> Self {
        Self {
            ids: [first, second],
            len: 2,
        }
    }

    pub fn as_slice(&self) -> &[AudioObjectID] {
        &self.ids[..self.len]
    }
}

/// A property answer, borrowed from the driver where it holds strings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue<'a> {
    U32(u32),
    F64(f64),
    Objects(ObjectList),
    /// Returned to the host as a retained `CFStringRef`
    Str(&'a str),
    Format(StreamFormat),
    Range(ValueRange),
}

impl PropertyValue<'_> {
    /// Bytes needed to hold this value in a property buffer
    pub fn byte_size(&self) -> u32 {
        let size = match self {
            PropertyValue::U32(_) => std::mem::size_of::<u32>(),
            PropertyValue::F64(_) => std::mem::size_of::<f64>(),
            PropertyValue::Objects(list) => std::mem::size_of_val(list.as_slice()),
            PropertyValue::Str(_) => std::mem::size_of::<*const std::ffi::c_void>(),
            PropertyValue::Format(_) => std::mem::size_of::<StreamFormat>(),
            PropertyValue::Range(_) => std::mem::size_of::<ValueRange>(),
        };
        size as u32
    }

    /// Copy a plain-data value into `buffer`, returning the bytes written
    ///
    /// Strings need a CoreFoundation object and are marshalled by the bridge.
    pub fn encode_into(&self, buffer: &mut [u8]) -> Result<u32> {
        match self {
            PropertyValue::U32(v) => copy_value_to_buffer(v, buffer),
            PropertyValue::F64(v) => copy_value_to_buffer(v, buffer),
            PropertyValue::Objects(list) => copy_to_buffer(list.as_slice(), buffer),
            PropertyValue::Format(f) => copy_value_to_buffer(f, buffer),
            PropertyValue::Range(r) => copy_value_to_buffer(r, buffer),
            PropertyValue::Str(_) => Err(DriverError::BadParameter(
                "string properties are marshalled as CFStringRef",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_codes() {
        assert_eq!(kAudioObjectPropertyName, 0x6C6E616D);
        assert_eq!(kAudioDevicePropertyDeviceIsRunning, 1735354734);
        assert_eq!(kAudioDevicePropertyNominalSampleRate, 1853059700);
        assert_eq!(kAudioStreamPropertyDirection, 1935960434);
        assert_eq!(kAudioStreamPropertyLatency, kAudioDevicePropertyLatency);
    }

    #[test]
    fn test_stream_format_layout() {
        assert_eq!(std::mem::size_of::<StreamFormat>(), 40);
        let format = StreamFormat::float32_interleaved(44100.0, 2);
        assert_eq!(format.bytes_per_frame, 8);
        assert_eq!(format.bytes_per_packet, 8);
        assert_eq!(format.bits_per_channel, 32);
        assert_eq!(format.format_flags, 9);
    }

    #[test]
    fn test_value_sizes_match_encoding() {
        let values = [
            PropertyValue::U32(1),
            PropertyValue::F64(44100.0),
            PropertyValue::Objects(ObjectList::two(4, 5)),
            PropertyValue::Objects(ObjectList::one(3)),
            PropertyValue::Format(StreamFormat::float32_interleaved(44100.0, 2)),
            PropertyValue::Range(ValueRange {
                minimum: 44100.0,
                maximum: 44100.0,
            }),
        ];
        let mut buffer = [0u8; 64];
        for value in values {
            assert_eq!(value.encode_into(&mut buffer).unwrap(), value.byte_size());
        }
    }

    #[test]
    fn test_encode_object_list() {
        let mut buffer = [0u8; 8];
        PropertyValue::Objects(ObjectList::two(4, 5))
            .encode_into(&mut buffer)
            .unwrap();
        assert_eq!(u32::from_ne_bytes(buffer[..4].try_into().unwrap()), 4);
        assert_eq!(u32::from_ne_bytes(buffer[4..].try_into().unwrap()), 5);
    }

    #[test]
    fn test_string_size_is_pointer() {
        let value = PropertyValue::Str("Sapphire Audio");
        assert_eq!(value.byte_size() as usize, std::mem::size_of::<usize>());
        assert!(value.encode_into(&mut [0u8; 16]).is_err());
    }
}
