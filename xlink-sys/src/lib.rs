// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # xlink-sys: Raw FFI surface of the XLink channel driver
//!
//! This crate declares the C types, status codes and entry points of the XLink
//! point-to-point link driver (the PCIe channel link between the host and the
//! video-analytics accelerator). The driver is not linked at build time: its
//! shared object is opened at runtime through `libloading`, and every entry
//! point must resolve for [`libxlink::new`] to succeed.
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe
//! `mediapipe::link` module instead, which provides:
//! - Channel endpoints with fragmentation and retry semantics
//! - Scoped read leases that are always released back to the driver
//! - Rust-idiomatic error handling with `Result`
//!
//! ## Safety
//!
//! All functions in this crate are `unsafe` and require the caller to uphold
//! the driver's invariants:
//! - `initialize` must be called before any other entry point
//! - A channel must be opened on a connected handle before reading or writing
//! - Every buffer obtained through `read_data` must be handed back exactly once
//!   through `release_data` on the same handle and channel
//! - Pointers must remain valid for the duration of each call

#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

extern crate libloading;

use std::ffi::{OsStr, c_char, c_int};

/// Status code returned by every driver entry point.
pub type Status = c_int;

pub const X_LINK_SUCCESS: Status = 0;
pub const X_LINK_ALREADY_INIT: Status = 1;
pub const X_LINK_ALREADY_OPEN: Status = 2;
pub const X_LINK_COMMUNICATION_NOT_OPEN: Status = 3;
pub const X_LINK_COMMUNICATION_FAIL: Status = 4;
pub const X_LINK_COMMUNICATION_UNKNOWN_ERROR: Status = 5;
pub const X_LINK_DEVICE_NOT_FOUND: Status = 6;
pub const X_LINK_TIMEOUT: Status = 7;
pub const X_LINK_ERROR: Status = 8;
pub const X_LINK_CHAN_FULL: Status = 9;

/// Channel operation mode (blocking/non-blocking per direction).
pub type OpMode = u32;

/// Blocking receive, blocking transmit.
pub const RXB_TXB: OpMode = 0;
/// Non-blocking receive, non-blocking transmit.
pub const RXN_TXN: OpMode = 1;
/// Blocking receive, non-blocking transmit.
pub const RXB_TXN: OpMode = 2;
/// Non-blocking receive, blocking transmit.
pub const RXN_TXB: OpMode = 3;

/// Device class addressed by a handle.
pub type DevType = u32;

pub const HOST_DEVICE: DevType = 0;
pub const VPUIP_DEVICE: DevType = 1;

/// Device handle passed by pointer to every driver call.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub sw_device_id: u32,
    pub dev_type: DevType,
}

type InitializeFn = unsafe extern "C" fn() -> Status;
type BootDeviceFn = unsafe extern "C" fn(*mut Handle, *const c_char) -> Status;
type ConnectFn = unsafe extern "C" fn(*mut Handle) -> Status;
type OpenChannelFn = unsafe extern "C" fn(*mut Handle, u16, OpMode, u32, u32) -> Status;
type WriteDataFn = unsafe extern "C" fn(*mut Handle, u16, *const u8, u32) -> Status;
type ReadDataFn = unsafe extern "C" fn(*mut Handle, u16, *mut *mut u8, *mut u32) -> Status;
type ReleaseDataFn = unsafe extern "C" fn(*mut Handle, u16, *mut u8) -> Status;
type CloseChannelFn = unsafe extern "C" fn(*mut Handle, u16) -> Status;
type DisconnectFn = unsafe extern "C" fn(*mut Handle) -> Status;

/// Dynamically loaded XLink driver.
///
/// Holds the opened library together with every resolved entry point. The
/// function pointers stay valid for as long as `__library` is alive, which is
/// the lifetime of this struct.
pub struct libxlink {
    __library: libloading::Library,
    initialize: InitializeFn,
    boot_device: BootDeviceFn,
    connect: ConnectFn,
    open_channel: OpenChannelFn,
    write_data: WriteDataFn,
    read_data: ReadDataFn,
    release_data: ReleaseDataFn,
    close_channel: CloseChannelFn,
    disconnect: DisconnectFn,
}

impl libxlink {
    /// Opens the driver library at `path` and resolves all entry points.
    pub unsafe fn new<P>(path: P) -> Result<Self, libloading::Error>
    where
        P: AsRef<OsStr>,
    {
        let library = unsafe { libloading::Library::new(path) }?;
        unsafe { Self::from_library(library) }
    }

    /// Resolves all entry points from an already opened library.
    pub unsafe fn from_library<L>(library: L) -> Result<Self, libloading::Error>
    where
        L: Into<libloading::Library>,
    {
        let __library = library.into();
        unsafe {
            let initialize = *__library.get::<InitializeFn>(b"xlink_initialize\0")?;
            let boot_device = *__library.get::<BootDeviceFn>(b"xlink_boot_device\0")?;
            let connect = *__library.get::<ConnectFn>(b"xlink_connect\0")?;
            let open_channel = *__library.get::<OpenChannelFn>(b"xlink_open_channel\0")?;
            let write_data = *__library.get::<WriteDataFn>(b"xlink_write_data\0")?;
            let read_data = *__library.get::<ReadDataFn>(b"xlink_read_data\0")?;
            let release_data = *__library.get::<ReleaseDataFn>(b"xlink_release_data\0")?;
            let close_channel = *__library.get::<CloseChannelFn>(b"xlink_close_channel\0")?;
            let disconnect = *__library.get::<DisconnectFn>(b"xlink_disconnect\0")?;
            Ok(Self {
                __library,
                initialize,
                boot_device,
                connect,
                open_channel,
                write_data,
                read_data,
                release_data,
                close_channel,
                disconnect,
            })
        }
    }

    pub unsafe fn initialize(&self) -> Status {
        unsafe { (self.initialize)() }
    }

    pub unsafe fn boot_device(&self, handle: *mut Handle, binary_name: *const c_char) -> Status {
        unsafe { (self.boot_device)(handle, binary_name) }
    }

    pub unsafe fn connect(&self, handle: *mut Handle) -> Status {
        unsafe { (self.connect)(handle) }
    }

    pub unsafe fn open_channel(
        &self,
        handle: *mut Handle,
        chan: u16,
        mode: OpMode,
        data_size: u32,
        timeout_ms: u32,
    ) -> Status {
        unsafe { (self.open_channel)(handle, chan, mode, data_size, timeout_ms) }
    }

    pub unsafe fn write_data(
        &self,
        handle: *mut Handle,
        chan: u16,
        message: *const u8,
        size: u32,
    ) -> Status {
        unsafe { (self.write_data)(handle, chan, message, size) }
    }

    pub unsafe fn read_data(
        &self,
        handle: *mut Handle,
        chan: u16,
        message: *mut *mut u8,
        size: *mut u32,
    ) -> Status {
        unsafe { (self.read_data)(handle, chan, message, size) }
    }

    pub unsafe fn release_data(&self, handle: *mut Handle, chan: u16, data: *mut u8) -> Status {
        unsafe { (self.release_data)(handle, chan, data) }
    }

    pub unsafe fn close_channel(&self, handle: *mut Handle, chan: u16) -> Status {
        unsafe { (self.close_channel)(handle, chan) }
    }

    pub unsafe fn disconnect(&self, handle: *mut Handle) -> Status {
        unsafe { (self.disconnect)(handle) }
    }
}
