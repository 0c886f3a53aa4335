//! Utility functions for the audio HAL driver
//!
//! Four-char code helpers and the byte copies used to answer property
//! queries into host-owned buffers.

use crate::{DriverError, Result};

/// Pack a four-char code the way Core Audio headers spell them (`'lnam'`)
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    ((code[0] as u32) << 24) | ((code[1] as u32) << 16) | ((code[2] as u32) << 8) | code[3] as u32
}

/// Render a selector as `'abcd'` when printable, hex otherwise
pub fn fourcc_to_string(code: &u32) -> String {
    let bytes = code.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        format!("'{}'", String::from_utf8_lossy(&bytes))
    } else {
        format!("0x{:08X}", code)
    }
}

/// Helper to copy a slice of plain values to a buffer
pub fn copy_to_buffer<T: Copy>(data: &[T], buffer: &mut [u8]) -> Result<u32> {
    let data_size = std::mem::size_of_val(data);

    if buffer.len() < data_size {
        return Err(DriverError::BadParameter("property buffer too small"));
    }

    // SAFETY: T is Copy (no drop glue) and the destination holds data_size bytes
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr() as *const u8, buffer.as_mut_ptr(), data_size);
    }

    Ok(data_size as u32)
}

/// Helper to copy a single value to a buffer
pub fn copy_value_to_buffer<T: Copy>(value: &T, buffer: &mut [u8]) -> Result<u32> {
    copy_to_buffer(std::slice::from_ref(value), buffer)
}

/// Create a CFString and hand its (+1 retained) reference to the caller
///
/// The HAL releases strings returned from `GetPropertyData`.
#[cfg(target_os = "macos")]
pub fn copy_cfstring_to_buffer(string: &str, buffer: &mut [u8]) -> Result<u32> {
    use core_foundation::base::TCFType;
    use core_foundation::string::{CFString, CFStringRef};

    let ptr_size = std::mem::size_of::<CFStringRef>();
    if buffer.len() < ptr_size {
        return Err(DriverError::BadParameter("property buffer too small for CFStringRef"));
    }

    let cf_string = CFString::new(string);
    let cf_ref = cf_string.as_concrete_TypeRef();
    let written = copy_value_to_buffer(&cf_ref, buffer)?;

    // Ownership moves to Core Audio
    std::mem::forget(cf_string);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc() {
        assert_eq!(fourcc(b"lnam"), 0x6C6E_616D);
        assert_eq!(fourcc(b"uid "), 1969841184);
        assert_eq!(fourcc_to_string(&fourcc(b"goin")), "'goin'");
        assert_eq!(fourcc_to_string(&1), "0x00000001");
    }

    #[test]
    fn test_buffer_operations() {
        let value: u32 = 42;
        let mut buffer = vec![0u8; 8];

        let written = copy_value_to_buffer(&value, &mut buffer).unwrap();
        assert_eq!(written, 4);
        assert_eq!(u32::from_ne_bytes(buffer[..4].try_into().unwrap()), 42);

        let ids = [4u32, 5u32];
        assert_eq!(copy_to_buffer(&ids, &mut buffer).unwrap(), 8);
        assert_eq!(u32::from_ne_bytes(buffer[4..8].try_into().unwrap()), 5);
    }

    #[test]
    fn test_buffer_too_small() {
        let mut buffer = [0u8; 2];
        assert_eq!(
            copy_value_to_buffer(&1.0f64, &mut buffer),
            Err(DriverError::BadParameter("property buffer too small"))
        );
    }
}
