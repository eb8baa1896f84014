// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The media graph seen from the module host.
//!
//! The core never talks to a media framework directly. It needs exactly two
//! things from one: a way to observe the buffers flowing through a named
//! element's pad, and a way to post messages on the graph's bus.
//! [`MediaRuntime`] is that seam.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::RuntimeError;

/// A buffer passing a tapped pad, mapped read-only for the duration of the
/// callback.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    pub data: &'a [u8],
    /// Presentation timestamp, if the buffer has one.
    pub pts: Option<Duration>,
}

impl<'a> BufferView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pts: None }
    }

    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }
}

/// Observer installed on a pad. Called on the streaming thread.
pub type PadTap = Box<dyn Fn(&BufferView<'_>) + Send + Sync>;

/// An application message on the pipeline bus.
///
/// `name` identifies the message; modules match on it. `fields` carries the
/// message structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BusMessage {
    pub name: String,
    pub fields: Map<String, Value>,
}

impl BusMessage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Media framework operations the host relies on.
pub trait MediaRuntime: Send + Sync {
    /// Installs `tap` on the static pad `pad` of the element named `element`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ElementNotFound`], [`RuntimeError::PadNotFound`] or
    /// [`RuntimeError::ProbeFailed`].
    fn attach_pad_tap(&self, element: &str, pad: &str, tap: PadTap) -> Result<(), RuntimeError>;

    /// Posts an application message on the bus.
    fn post_message(&self, message: BusMessage) -> Result<(), RuntimeError>;
}
