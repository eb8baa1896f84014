// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The seam between endpoints and a concrete link driver.

use std::{ptr::NonNull, time::Duration};

use crate::{
    error::LinkStatus,
    link::{ChannelMode, LinkHandle},
};

/// A point-to-point link driver.
///
/// Mirrors the boot/connect/open/read/write/release/close primitives of the
/// XLink driver. Implementations must be callable from several threads at
/// once: an endpoint's reader thread blocks in [`LinkDriver::read_data`]
/// while other threads write or close the same channel.
pub trait LinkDriver: Send + Sync {
    /// Prepares the driver. Repeated calls must succeed.
    fn initialize(&self) -> Result<(), LinkStatus>;

    /// Boots the remote device with a firmware image.
    fn boot_device(&self, handle: &LinkHandle, firmware: &str) -> Result<(), LinkStatus>;

    fn connect(&self, handle: &LinkHandle) -> Result<(), LinkStatus>;

    fn open_channel(
        &self,
        handle: &LinkHandle,
        channel: u16,
        mode: ChannelMode,
        data_size: u32,
        timeout: Duration,
    ) -> Result<(), LinkStatus>;

    /// Writes one message. Callers keep messages within the fragment size.
    fn write_data(&self, handle: &LinkHandle, channel: u16, data: &[u8])
    -> Result<(), LinkStatus>;

    /// Blocks until one message is available and leases it to the caller.
    fn read_data(&self, handle: &LinkHandle, channel: u16) -> Result<Lease, LinkStatus>;

    /// Hands a leased message back to the driver.
    fn release_data(&self, handle: &LinkHandle, channel: u16, lease: Lease)
    -> Result<(), LinkStatus>;

    fn close_channel(&self, handle: &LinkHandle, channel: u16) -> Result<(), LinkStatus>;

    fn disconnect(&self, handle: &LinkHandle) -> Result<(), LinkStatus>;
}

/// A message buffer owned by the driver and lent to the reader.
///
/// The memory stays valid until the lease is passed back through
/// [`LinkDriver::release_data`]. A lease that is dropped without being
/// released leaks driver-side memory; [`crate::link::ReadGuard`] makes sure
/// that does not happen.
#[derive(Debug)]
pub struct Lease {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: the leased memory is exclusively owned by the lease holder until it
// is released, and the drivers accept release from any thread.
unsafe impl Send for Lease {}

impl Lease {
    /// Wraps driver-owned memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes until the lease is
    /// released through the driver that produced it.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY
        // Guaranteed by the contract of `from_raw_parts`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}
