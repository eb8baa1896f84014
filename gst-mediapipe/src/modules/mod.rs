//! Built-in Modules
//!
//! Each submodule exposes a `descriptor()` building its `ModuleDescriptor`.
//! Settings come from the module's directive in the run configuration and
//! are deserialized with serde; missing keys take their defaults.
//!
//! ## Example Configuration
//! ```json
//! {
//!   "module_list": ["mp_xlinkwriter", "console"],
//!   "pipeline": "videotestsrc ! x264enc ! h264parse name=parser ! fakesink",
//!   "link": { "driver": "loopback" },
//!   "xlinkwriter": { "element": "parser", "pad": "src", "channel": 1025 }
//! }
//! ```

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use mediapipe::{error::DirectiveError, link::OpenOptions};
use serde::de::DeserializeOwned;

/// Keyboard help and quit (stateless)
pub mod console;

/// Channel to bus: decodes received packets into application messages
pub mod xlinkreader;

/// Pad to channel: frames buffers as detection packets
pub mod xlinkwriter;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deserializes a directive value into a settings struct.
pub(crate) fn parse_settings<T: DeserializeOwned>(
    directive: &str,
    value: &serde_json::Value,
) -> Result<T, DirectiveError> {
    serde_json::from_value(value.clone())
        .map_err(|err| DirectiveError::Fatal(format!("invalid \"{directive}\" settings: {err}")))
}

/// Retry policy shared by the channel modules.
pub(crate) fn open_options(max_attempts: Option<u32>, retry_delay_ms: u64) -> OpenOptions {
    let options = OpenOptions::default().with_retry_delay(Duration::from_millis(retry_delay_ms));
    match max_attempts {
        Some(attempts) => options.with_max_attempts(attempts),
        None => options,
    }
}
