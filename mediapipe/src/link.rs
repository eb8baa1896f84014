// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Channel-link transport adapter.
//!
//! This module frames packets onto the external point-to-point link driver:
//! - [`driver`]: the [`LinkDriver`] seam every driver implements
//! - [`api`]: the XLink driver, loaded from a shared object at runtime
//! - [`loopback`]: an in-process driver for tests and hardware-less runs
//! - [`endpoint`]: one open channel with fragmentation, retries and a reader thread

pub mod api;
pub mod driver;
pub mod endpoint;
pub mod loopback;

use std::time::Duration;

use serde::Deserialize;

pub use api::{XLinkApi, XLinkApiHandle, XLinkDriver, load_api};
pub use driver::{Lease, LinkDriver};
pub use endpoint::{CancelToken, Endpoint, OpenOptions, ReadGuard, ReaderHandle};
pub use loopback::LoopbackDriver;

/// Default upper bound of a single transport-level write.
pub const DEFAULT_FRAGMENT_SIZE: usize = 64 * 1024;

/// Default channel timeout handed to the driver when opening a channel.
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(0);

/// Direction(s) a channel is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    #[default]
    Bidirectional,
    Send,
    Receive,
}

/// Class of device a handle addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Host,
    Vpu,
}

/// Addresses one device on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkHandle {
    pub device_id: u32,
    pub device_type: DeviceType,
}

impl LinkHandle {
    pub fn new(device_id: u32) -> Self {
        Self {
            device_id,
            device_type: DeviceType::Host,
        }
    }

    pub(crate) fn to_raw(self) -> xlink_sys::Handle {
        xlink_sys::Handle {
            sw_device_id: self.device_id,
            dev_type: match self.device_type {
                DeviceType::Host => xlink_sys::HOST_DEVICE,
                DeviceType::Vpu => xlink_sys::VPUIP_DEVICE,
            },
        }
    }
}

/// Everything needed to open one channel endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub handle: LinkHandle,
    pub channel: u16,
    pub mode: ChannelMode,
    /// Largest single write handed to the driver. Must be non-zero.
    pub fragment_size: usize,
    /// Firmware image to boot before connecting, if any.
    pub firmware: Option<String>,
    /// Channel timeout passed to the driver on open.
    pub timeout: Duration,
}

impl EndpointConfig {
    pub fn new(handle: LinkHandle, channel: u16) -> Self {
        Self {
            handle,
            channel,
            mode: ChannelMode::default(),
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            firmware: None,
            timeout: DEFAULT_CHANNEL_TIMEOUT,
        }
    }

    pub fn with_mode(mut self, mode: ChannelMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size;
        self
    }
}
