//! C/Rust bridge layer for Core Audio HAL driver callbacks
//!
//! The HAL talks to the plug-in through a COM-style table of function
//! pointers and never hands us an instance pointer we own, so the driver
//! context lives in a process-wide [`OnceLock`]. Every slot of the table
//! validates its pointers and forwards to [`HALDriver`].

use std::os::raw::c_void;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use coreaudio_sys::{
    AudioObjectPropertyAddress, AudioServerPlugInClientInfo, AudioServerPlugInDriverInterface,
    AudioServerPlugInDriverRef, AudioServerPlugInHostRef, AudioServerPlugInIOCycleInfo, Boolean,
    CFAllocatorRef, CFDictionaryRef, CFUUIDBytes, CFUUIDGetUUIDBytes, CFUUIDRef, Float64, HRESULT,
    LPVOID, REFIID, UInt32, UInt64, ULONG,
};

use crate::clock::system_clock;
use crate::config::DriverConfig;
use crate::properties::{PropertyAddress, PropertyValue};
use crate::utils::copy_cfstring_to_buffer;
use crate::{
    kAudioHardwareBadParameterError, kAudioHardwareNoError, to_os_status, AudioObjectID,
    HALDriver, OSStatus, CHANNEL_COUNT,
};

// kAudioServerPlugInTypeUUID
const AUDIO_SERVER_PLUGIN_TYPE_UUID: [u8; 16] = [
    0x44, 0x3A, 0xBA, 0xB8, 0xE7, 0xB3, 0x49, 0x1A, 0xB9, 0x85, 0xBE, 0xB9, 0x18, 0x70, 0x30, 0xDB,
];

// IUnknownUUID
const I_UNKNOWN_UUID: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46,
];

// kAudioServerPlugInDriverInterfaceUUID
const DRIVER_INTERFACE_UUID: [u8; 16] = [
    0xEE, 0xA5, 0x77, 0x3D, 0xCC, 0x43, 0x49, 0xF1, 0x8E, 0x00, 0x8F, 0x96, 0xE7, 0xD2, 0x3B, 0x17,
];

const E_NOINTERFACE: HRESULT = 0x8000_0004u32 as HRESULT;

// Global driver instance - Core Audio expects a single driver instance
static DRIVER_INSTANCE: OnceLock<HALDriver> = OnceLock::new();

static REF_COUNT: AtomicU32 = AtomicU32::new(0);

#[repr(transparent)]
struct AlwaysSync<T>(T);

// SAFETY: the table only holds function pointers and a null reserved slot
unsafe impl<T> Sync for AlwaysSync<T> {}

static DRIVER_INTERFACE: AlwaysSync<AudioServerPlugInDriverInterface> =
    AlwaysSync(AudioServerPlugInDriverInterface {
        _reserved: ptr::null_mut(),
        QueryInterface: Some(driver_query_interface),
        AddRef: Some(driver_add_ref),
        Release: Some(driver_release),
        Initialize: Some(driver_initialize),
        CreateDevice: Some(driver_create_device),
        DestroyDevice: Some(driver_destroy_device),
        AddDeviceClient: Some(driver_add_device_client),
        RemoveDeviceClient: Some(driver_remove_device_client),
        PerformDeviceConfigurationChange: Some(driver_perform_device_configuration_change),
        AbortDeviceConfigurationChange: Some(driver_abort_device_configuration_change),
        HasProperty: Some(driver_has_property),
        IsPropertySettable: Some(driver_is_property_settable),
        GetPropertyDataSize: Some(driver_get_property_data_size),
        GetPropertyData: Some(driver_get_property_data),
        SetPropertyData: Some(driver_set_property_data),
        StartIO: Some(driver_start_io),
        StopIO: Some(driver_stop_io),
        GetZeroTimeStamp: Some(driver_get_zero_time_stamp),
        WillDoIOOperation: Some(driver_will_do_io_operation),
        BeginIOOperation: Some(driver_begin_io_operation),
        DoIOOperation: Some(driver_do_io_operation),
        EndIOOperation: Some(driver_end_io_operation),
    });

// The driver reference is a pointer to a pointer to the interface table
static DRIVER_OBJECT: &AlwaysSync<AudioServerPlugInDriverInterface> = &DRIVER_INTERFACE;

#[inline(always)]
fn raw_driver_ptr() -> AudioServerPlugInDriverRef {
    ptr::addr_of!(DRIVER_OBJECT).cast_mut().cast()
}

/// Get the global driver instance, building it on first use
fn driver() -> &'static HALDriver {
    DRIVER_INSTANCE.get_or_init(|| {
        let config = DriverConfig::from_env().unwrap_or_else(|e| {
            log::error!("Invalid driver configuration, using defaults: {}", e);
            DriverConfig::default()
        });
        log::info!(
            "Creating driver context for '{}' ({})",
            config.device_name,
            config.bundle_id
        );
        HALDriver::new(config, system_clock())
    })
}

#[inline(always)]
fn cfuuid_as_bytes(b: CFUUIDBytes) -> [u8; 16] {
    [
        b.byte0, b.byte1, b.byte2, b.byte3, b.byte4, b.byte5, b.byte6, b.byte7, b.byte8, b.byte9,
        b.byte10, b.byte11, b.byte12, b.byte13, b.byte14, b.byte15,
    ]
}

/// SAFETY: `address` must be null or point to a valid property address
#[inline(always)]
unsafe fn read_address(address: *const AudioObjectPropertyAddress) -> Option<PropertyAddress> {
    // SAFETY: upheld by the caller
    let addr = unsafe { address.as_ref() }?;
    Some(PropertyAddress {
        selector: addr.mSelector,
        scope: addr.mScope,
        element: addr.mElement,
    })
}

/// CFPlugIn factory behind `SapphireDriver_Create`
pub unsafe fn driver_create(
    _allocator: CFAllocatorRef,
    requested_type_uuid: CFUUIDRef,
) -> *mut c_void {
    if requested_type_uuid.is_null() {
        log::warn!("driver_create: null type UUID");
        return ptr::null_mut();
    }
    // SAFETY: the caller hands us a valid CFUUIDRef
    let requested = cfuuid_as_bytes(unsafe { CFUUIDGetUUIDBytes(requested_type_uuid) });
    if requested != AUDIO_SERVER_PLUGIN_TYPE_UUID {
        log::warn!("driver_create: unsupported plug-in type {:02X?}", requested);
        return ptr::null_mut();
    }

    let _ = driver();
    log::info!("driver_create: returning driver reference {:p}", raw_driver_ptr());
    raw_driver_ptr().cast()
}

// HAL Driver Interface Implementation Functions

unsafe extern "C" fn driver_query_interface(
    _driver: *mut c_void,
    in_uuid: REFIID,
    out_interface: *mut LPVOID,
) -> HRESULT {
    let Some(out_interface) = NonNull::new(out_interface) else {
        return kAudioHardwareBadParameterError as HRESULT;
    };

    let requested = cfuuid_as_bytes(in_uuid);
    if requested == I_UNKNOWN_UUID || requested == DRIVER_INTERFACE_UUID {
        REF_COUNT.fetch_add(1, Ordering::Relaxed);
        // SAFETY: checked non-null; the HAL provides writable storage
        unsafe { out_interface.as_ptr().write(raw_driver_ptr().cast()) };
        kAudioHardwareNoError as HRESULT
    } else {
        log::debug!("driver_query_interface: no interface {:02X?}", requested);
        E_NOINTERFACE
    }
}

unsafe extern "C" fn driver_add_ref(_driver: *mut c_void) -> ULONG {
    REF_COUNT.fetch_add(1, Ordering::Relaxed).saturating_add(1)
}

unsafe extern "C" fn driver_release(_driver: *mut c_void) -> ULONG {
    let previous = REF_COUNT
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
        .unwrap_or(0);
    previous.saturating_sub(1)
}

unsafe extern "C" fn driver_initialize(
    _driver: AudioServerPlugInDriverRef,
    host: AudioServerPlugInHostRef,
) -> OSStatus {
    log::info!("driver_initialize called - host: {:p}", host);

    match driver().initialize() {
        Ok(()) => kAudioHardwareNoError,
        Err(e) => {
            log::error!("Driver initialization failed: {}", e);
            e.os_status()
        }
    }
}

unsafe extern "C" fn driver_create_device(
    _driver: AudioServerPlugInDriverRef,
    _description: CFDictionaryRef,
    _client_info: *const AudioServerPlugInClientInfo,
    _device_object_id: *mut AudioObjectID,
) -> OSStatus {
    to_os_status(&driver().create_device())
}

unsafe extern "C" fn driver_destroy_device(
    _driver: AudioServerPlugInDriverRef,
    device_object_id: AudioObjectID,
) -> OSStatus {
    to_os_status(&driver().destroy_device(device_object_id))
}

unsafe extern "C" fn driver_add_device_client(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_info: *const AudioServerPlugInClientInfo,
) -> OSStatus {
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_remove_device_client(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_info: *const AudioServerPlugInClientInfo,
) -> OSStatus {
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_perform_device_configuration_change(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _change_action: UInt64,
    _change_info: *mut c_void,
) -> OSStatus {
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_abort_device_configuration_change(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _change_action: UInt64,
    _change_info: *mut c_void,
) -> OSStatus {
    kAudioHardwareNoError
}

// Property handling functions
unsafe extern "C" fn driver_has_property(
    _driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: libc::pid_t,
    address: *const AudioObjectPropertyAddress,
) -> Boolean {
    // SAFETY: the HAL passes null or a valid address
    let Some(addr) = (unsafe { read_address(address) }) else {
        return 0;
    };
    Boolean::from(driver().has_property(object_id, &addr))
}

unsafe extern "C" fn driver_is_property_settable(
    _driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: libc::pid_t,
    address: *const AudioObjectPropertyAddress,
    out_is_settable: *mut Boolean,
) -> OSStatus {
    // SAFETY: the HAL passes null or a valid address
    let (Some(addr), Some(out)) = (unsafe { read_address(address) }, NonNull::new(out_is_settable))
    else {
        return kAudioHardwareBadParameterError;
    };

    match driver().is_property_settable(object_id, &addr) {
        Ok(settable) => {
            // SAFETY: checked non-null
            unsafe { out.as_ptr().write(Boolean::from(settable)) };
            kAudioHardwareNoError
        }
        Err(e) => e.os_status(),
    }
}

unsafe extern "C" fn driver_get_property_data_size(
    _driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: libc::pid_t,
    address: *const AudioObjectPropertyAddress,
    _qualifier_data_size: UInt32,
    _qualifier_data: *const c_void,
    out_data_size: *mut UInt32,
) -> OSStatus {
    // SAFETY: the HAL passes null or a valid address
    let (Some(addr), Some(out)) = (unsafe { read_address(address) }, NonNull::new(out_data_size))
    else {
        return kAudioHardwareBadParameterError;
    };

    match driver().get_property_data_size(object_id, &addr) {
        Ok(size) => {
            // SAFETY: checked non-null
            unsafe { out.as_ptr().write(size) };
            kAudioHardwareNoError
        }
        Err(e) => e.os_status(),
    }
}

unsafe extern "C" fn driver_get_property_data(
    _driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: libc::pid_t,
    address: *const AudioObjectPropertyAddress,
    _qualifier_data_size: UInt32,
    _qualifier_data: *const c_void,
    in_data_size: UInt32,
    out_data_size: *mut UInt32,
    out_data: *mut c_void,
) -> OSStatus {
    // SAFETY: the HAL passes null or a valid address
    let Some(addr) = (unsafe { read_address(address) }) else {
        return kAudioHardwareBadParameterError;
    };
    let (Some(out_size), Some(out_data)) = (NonNull::new(out_data_size), NonNull::new(out_data))
    else {
        return kAudioHardwareBadParameterError;
    };

    // SAFETY: the HAL owns `in_data_size` writable bytes at `out_data`
    let buffer = unsafe {
        std::slice::from_raw_parts_mut(out_data.as_ptr() as *mut u8, in_data_size as usize)
    };

    let written = driver()
        .get_property_data(object_id, &addr)
        .and_then(|value| match value {
            PropertyValue::Str(s) => copy_cfstring_to_buffer(s, buffer),
            other => other.encode_into(buffer),
        });

    match written {
        Ok(bytes) => {
            // SAFETY: checked non-null
            unsafe { out_size.as_ptr().write(bytes) };
            kAudioHardwareNoError
        }
        Err(e) => {
            log::debug!("get_property_data failed for object {}: {}", object_id, e);
            e.os_status()
        }
    }
}

unsafe extern "C" fn driver_set_property_data(
    _driver: AudioServerPlugInDriverRef,
    object_id: AudioObjectID,
    _client_pid: libc::pid_t,
    address: *const AudioObjectPropertyAddress,
    _qualifier_data_size: UInt32,
    _qualifier_data: *const c_void,
    _data_size: UInt32,
    _data: *const c_void,
) -> OSStatus {
    // SAFETY: the HAL passes null or a valid address
    let Some(addr) = (unsafe { read_address(address) }) else {
        return kAudioHardwareBadParameterError;
    };
    to_os_status(&driver().set_property_data(object_id, &addr))
}

// I/O Operation functions
unsafe extern "C" fn driver_start_io(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_id: UInt32,
) -> OSStatus {
    driver().start_io();
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_stop_io(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_id: UInt32,
) -> OSStatus {
    driver().stop_io();
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_get_zero_time_stamp(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_id: UInt32,
    out_sample_time: *mut Float64,
    out_host_time: *mut UInt64,
    out_seed: *mut UInt64,
) -> OSStatus {
    if out_sample_time.is_null() || out_host_time.is_null() || out_seed.is_null() {
        return kAudioHardwareBadParameterError;
    }

    let ts = driver().zero_timestamp();
    // SAFETY: all three checked non-null
    unsafe {
        out_sample_time.write(ts.sample_time);
        out_host_time.write(ts.host_time);
        out_seed.write(ts.seed);
    }
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_will_do_io_operation(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_id: UInt32,
    operation_id: UInt32,
    out_will_do: *mut Boolean,
    out_will_do_in_place: *mut Boolean,
) -> OSStatus {
    let (will_do, in_place) = driver().will_do_io_operation(operation_id);
    if let Some(out) = NonNull::new(out_will_do) {
        // SAFETY: checked non-null
        unsafe { out.as_ptr().write(Boolean::from(will_do)) };
    }
    if let Some(out) = NonNull::new(out_will_do_in_place) {
        // SAFETY: checked non-null
        unsafe { out.as_ptr().write(Boolean::from(in_place)) };
    }
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_begin_io_operation(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_id: UInt32,
    _operation_id: UInt32,
    _io_buffer_frame_size: UInt32,
    _io_cycle_info: *const AudioServerPlugInIOCycleInfo,
) -> OSStatus {
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_do_io_operation(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    stream_object_id: AudioObjectID,
    _client_id: UInt32,
    _operation_id: UInt32,
    io_buffer_frame_size: UInt32,
    _io_cycle_info: *const AudioServerPlugInIOCycleInfo,
    io_main_buffer: *mut c_void,
    _io_secondary_buffer: *mut c_void,
) -> OSStatus {
    let Some(main) = NonNull::new(io_main_buffer as *mut f32) else {
        return kAudioHardwareNoError;
    };
    let samples = io_buffer_frame_size as usize * CHANNEL_COUNT as usize;
    // SAFETY: the HAL sizes the main buffer for one cycle of interleaved frames
    let buffer = unsafe { std::slice::from_raw_parts_mut(main.as_ptr(), samples) };
    driver().do_io_operation(stream_object_id, io_buffer_frame_size, buffer);
    kAudioHardwareNoError
}

unsafe extern "C" fn driver_end_io_operation(
    _driver: AudioServerPlugInDriverRef,
    _device_object_id: AudioObjectID,
    _client_id: UInt32,
    _operation_id: UInt32,
    _io_buffer_frame_size: UInt32,
    _io_cycle_info: *const AudioServerPlugInIOCycleInfo,
) -> OSStatus {
    kAudioHardwareNoError
}
