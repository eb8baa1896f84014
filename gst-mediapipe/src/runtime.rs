//! GStreamer Runtime
//!
//! Implements `MediaRuntime` for a `gst::Pipeline`:
//! - pad taps become buffer probes on an element's static pad, with the
//!   buffer mapped read-only for the duration of the tap
//! - bus messages become `application` messages whose structure is named
//!   after the message and carries its fields
//!
//! [`bus_message_from`] does the reverse for messages popped off the bus.

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use mediapipe::{
    error::RuntimeError,
    runtime::{BufferView, BusMessage, MediaRuntime, PadTap},
};
use serde_json::Value;
use tracing::{debug, trace};

/// [`MediaRuntime`] backed by a GStreamer pipeline.
#[derive(Debug, Clone)]
pub struct GstRuntime {
    pipeline: gst::Pipeline,
}

impl GstRuntime {
    pub fn new(pipeline: gst::Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &gst::Pipeline {
        &self.pipeline
    }
}

impl MediaRuntime for GstRuntime {
    fn attach_pad_tap(&self, element: &str, pad: &str, tap: PadTap) -> Result<(), RuntimeError> {
        let found = self
            .pipeline
            .by_name(element)
            .ok_or_else(|| RuntimeError::ElementNotFound(element.to_owned()))?;
        let static_pad = found
            .static_pad(pad)
            .ok_or_else(|| RuntimeError::PadNotFound {
                element: element.to_owned(),
                pad: pad.to_owned(),
            })?;

        static_pad
            .add_probe(gst::PadProbeType::BUFFER, move |_, info| {
                let Some(buffer) = info.buffer() else {
                    return gst::PadProbeReturn::Ok;
                };
                match buffer.map_readable() {
                    Ok(map) => {
                        let mut view = BufferView::new(map.as_slice());
                        if let Some(pts) = buffer.pts() {
                            view = view.with_pts(Duration::from_nanos(pts.nseconds()));
                        }
                        tap(&view);
                    }
                    Err(err) => trace!("Skipping unmappable buffer: {err}"),
                }
                gst::PadProbeReturn::Ok
            })
            .ok_or_else(|| RuntimeError::ProbeFailed {
                element: element.to_owned(),
                pad: pad.to_owned(),
            })?;

        debug!(element, pad, "Buffer probe attached");
        Ok(())
    }

    fn post_message(&self, message: BusMessage) -> Result<(), RuntimeError> {
        let mut structure = gst::Structure::new_empty(message.name.as_str());
        for (key, value) in &message.fields {
            set_field(&mut structure, key, value);
        }
        let application = gst::message::Application::builder(structure)
            .src(&self.pipeline)
            .build();
        self.pipeline
            .post_message(application)
            .map_err(|err| RuntimeError::Post(err.to_string()))
    }
}

/// JSON to GValue: numbers become `i64` when integral and `f64` otherwise;
/// arrays and objects are carried as their JSON text.
fn set_field(structure: &mut gst::StructureRef, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(flag) => structure.set(key, *flag),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                structure.set(key, integer);
            } else if let Some(float) = number.as_f64() {
                structure.set(key, float);
            }
        }
        Value::String(text) => structure.set(key, text.as_str()),
        other => structure.set(key, other.to_string()),
    }
}

/// Converts an application message structure back into a [`BusMessage`].
///
/// Fields of types with no JSON counterpart are dropped.
pub fn bus_message_from(structure: &gst::StructureRef) -> BusMessage {
    let mut message = BusMessage::new(structure.name().as_str());
    for (key, value) in structure.iter() {
        let json = if let Ok(flag) = value.get::<bool>() {
            Value::from(flag)
        } else if let Ok(integer) = value.get::<i64>() {
            Value::from(integer)
        } else if let Ok(integer) = value.get::<i32>() {
            Value::from(integer)
        } else if let Ok(integer) = value.get::<u32>() {
            Value::from(integer)
        } else if let Ok(integer) = value.get::<u64>() {
            Value::from(integer)
        } else if let Ok(float) = value.get::<f64>() {
            Value::from(float)
        } else if let Ok(text) = value.get::<String>() {
            Value::from(text)
        } else {
            trace!(field = key.as_str(), "Dropping field without a JSON form");
            continue;
        };
        message.fields.insert(key.as_str().to_owned(), json);
    }
    message
}
