// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! XLink driver backed by the dynamically loaded C library.

use std::{ffi::CString, ffi::OsStr, ptr::NonNull, sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    error::{LinkStatus, OpenError},
    link::{ChannelMode, Lease, LinkDriver, LinkHandle},
};

/// The loaded XLink symbol table.
pub type XLinkApi = xlink_sys::libxlink;

/// Shared handle to the loaded XLink library.
pub type XLinkApiHandle = Arc<XLinkApi>;

/// Loads the XLink driver library from `path`.
///
/// # Errors
///
/// Returns [`OpenError::Library`] if the library cannot be opened or lacks
/// one of the required entry points.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mediapipe::link::{load_api, XLinkDriver};
///
/// # fn main() -> Result<(), mediapipe::error::OpenError> {
/// let driver = Arc::new(XLinkDriver::new(load_api("libXLink.so")?));
/// # Ok(())
/// # }
/// ```
pub fn load_api(path: impl AsRef<OsStr>) -> Result<XLinkApiHandle, OpenError> {
    let path = path.as_ref();
    debug!(path = %path.to_string_lossy(), "Loading XLink library");
    let api = unsafe { xlink_sys::libxlink::new(path) }?;
    Ok(Arc::new(api))
}

/// [`LinkDriver`] implementation calling into the XLink C library.
pub struct XLinkDriver {
    api: XLinkApiHandle,
}

impl XLinkDriver {
    pub fn new(api: XLinkApiHandle) -> Self {
        Self { api }
    }
}

fn op_mode(mode: ChannelMode) -> xlink_sys::OpMode {
    match mode {
        ChannelMode::Bidirectional => xlink_sys::RXB_TXB,
        ChannelMode::Send => xlink_sys::RXN_TXB,
        ChannelMode::Receive => xlink_sys::RXB_TXN,
    }
}

impl LinkDriver for XLinkDriver {
    fn initialize(&self) -> Result<(), LinkStatus> {
        match unsafe { self.api.initialize() } {
            xlink_sys::X_LINK_ALREADY_INIT => Ok(()),
            status => LinkStatus::check(status),
        }
    }

    fn boot_device(&self, handle: &LinkHandle, firmware: &str) -> Result<(), LinkStatus> {
        let firmware =
            CString::new(firmware).map_err(|_| LinkStatus(xlink_sys::X_LINK_ERROR))?;
        let mut raw = handle.to_raw();
        LinkStatus::check(unsafe { self.api.boot_device(&mut raw, firmware.as_ptr()) })
    }

    fn connect(&self, handle: &LinkHandle) -> Result<(), LinkStatus> {
        let mut raw = handle.to_raw();
        LinkStatus::check(unsafe { self.api.connect(&mut raw) })
    }

    fn open_channel(
        &self,
        handle: &LinkHandle,
        channel: u16,
        mode: ChannelMode,
        data_size: u32,
        timeout: Duration,
    ) -> Result<(), LinkStatus> {
        let mut raw = handle.to_raw();
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        match unsafe {
            self.api
                .open_channel(&mut raw, channel, op_mode(mode), data_size, timeout_ms)
        } {
            xlink_sys::X_LINK_ALREADY_OPEN => Ok(()),
            status => LinkStatus::check(status),
        }
    }

    fn write_data(&self, handle: &LinkHandle, channel: u16, data: &[u8]) -> Result<(), LinkStatus> {
        let size = u32::try_from(data.len()).map_err(|_| LinkStatus(xlink_sys::X_LINK_ERROR))?;
        let mut raw = handle.to_raw();
        LinkStatus::check(unsafe { self.api.write_data(&mut raw, channel, data.as_ptr(), size) })
    }

    fn read_data(&self, handle: &LinkHandle, channel: u16) -> Result<Lease, LinkStatus> {
        let mut raw = handle.to_raw();
        let mut message: *mut u8 = std::ptr::null_mut();
        let mut size: u32 = 0;
        LinkStatus::check(unsafe {
            self.api
                .read_data(&mut raw, channel, &mut message, &mut size)
        })?;
        let ptr = NonNull::new(message).ok_or(LinkStatus(xlink_sys::X_LINK_ERROR))?;
        // SAFETY
        // The driver keeps the message alive until `xlink_release_data`.
        Ok(unsafe { Lease::from_raw_parts(ptr, size as usize) })
    }

    fn release_data(
        &self,
        handle: &LinkHandle,
        channel: u16,
        lease: Lease,
    ) -> Result<(), LinkStatus> {
        let mut raw = handle.to_raw();
        LinkStatus::check(unsafe { self.api.release_data(&mut raw, channel, lease.as_ptr()) })
    }

    fn close_channel(&self, handle: &LinkHandle, channel: u16) -> Result<(), LinkStatus> {
        let mut raw = handle.to_raw();
        LinkStatus::check(unsafe { self.api.close_channel(&mut raw, channel) })
    }

    fn disconnect(&self, handle: &LinkHandle) -> Result<(), LinkStatus> {
        let mut raw = handle.to_raw();
        LinkStatus::check(unsafe { self.api.disconnect(&mut raw) })
    }
}
