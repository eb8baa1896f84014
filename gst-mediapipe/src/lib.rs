//! GStreamer host for mediapipe
//!
//! This crate binds the `mediapipe` module host to a GStreamer pipeline and
//! ships the modules a stock run is built from:
//!
//! - **mp_xlinkwriter**: frames the buffers passing a pad as detection packets
//!   and sends them over a channel
//! - **mp_xlinkreader**: receives packets from a channel and posts them on the
//!   pipeline bus
//! - **console**: keyboard help and quit
//!
//! [`runtime::GstRuntime`] implements `mediapipe::runtime::MediaRuntime` on a
//! `gst::Pipeline`, and [`MODULES`] is the catalog the `mediapipe` binary
//! resolves its module list against.

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use mediapipe::module::{ModuleDescriptor, Registry};

pub mod error;

/// Built-in modules
pub mod modules;

/// `MediaRuntime` over a GStreamer pipeline
pub mod runtime;

/// Every module this build knows, in registration order.
pub fn catalog() -> Vec<ModuleDescriptor> {
    vec![
        modules::xlinkwriter::descriptor(),
        modules::xlinkreader::descriptor(),
        modules::console::descriptor(),
    ]
}

/// Process-wide module registry.
pub static MODULES: Registry = Registry::new(catalog);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_registers() {
        let table = MODULES.register_all().unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.resolve("xlinkwriter").is_some());
        assert!(table.resolve("mp_xlinkreader").is_some());
        assert!(table.lookup("console").is_some());
    }
}
