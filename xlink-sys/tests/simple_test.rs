// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Smoke tests for the hand-declared FFI surface.

/// The handle must keep the C layout (two consecutive 32-bit fields).
#[test]
fn handle_has_c_layout() {
    assert_eq!(std::mem::size_of::<xlink_sys::Handle>(), 8);

    let handle = xlink_sys::Handle {
        sw_device_id: 0x1234,
        ..Default::default()
    };
    assert_eq!(handle.dev_type, xlink_sys::HOST_DEVICE);
}

/// Loading a library that does not exist fails instead of panicking.
#[test]
fn missing_library_is_reported() {
    let result = unsafe { xlink_sys::libxlink::new("libxlink-does-not-exist.so") };
    assert!(result.is_err());
}
