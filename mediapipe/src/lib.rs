// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # mediapipe - module host for video-analytics pipelines
//!
//! Loads named processing modules, walks them through an ordered lifecycle,
//! routes runtime events to them, and frames detection metadata and media
//! onto a point-to-point channel link.
//!
//! ## Overview
//!
//! - **Module**: a named set of optional hooks plus configuration directives ([`module`])
//! - **Registry**: the compiled module catalog, built once per process ([`module::Registry`])
//! - **Run**: one [`Pipeline`] over the modules a [`RunConfiguration`] lists ([`pipeline`])
//! - **Router**: keyshots, bus messages and pad buffers delivered to modules ([`router`])
//! - **Packet**: the binary frame exchanged over a channel ([`packet`])
//! - **Endpoint**: one open channel of the link driver ([`link`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  register_all  ┌─────────────┐
//! │ Registry │ ─────────────► │ ModuleTable │
//! └──────────┘                └──────┬──────┘
//!                                    │ resolve(module_list)
//!                                    ▼
//!                             ┌─────────────┐  hooks   ┌────────┐
//!   RunConfiguration ───────► │  Pipeline   │ ───────► │ Module │──► Endpoint ──► LinkDriver
//!                             └──────┬──────┘          └────────┘        │
//!                                    │ keyshot / bus / buffers           └─ packet::encode / decode
//!                                    ▼
//!                               MediaRuntime
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use mediapipe::{
//!     module::{ModuleDescriptor, Registry},
//!     router::{Disposition, Routed},
//!     Pipeline, RunConfiguration,
//! };
//!
//! #[derive(Default)]
//! struct Greeter {
//!     greeting: Mutex<String>,
//! }
//!
//! fn catalog() -> Vec<ModuleDescriptor> {
//!     vec![ModuleDescriptor::builder("mp_greeter")
//!         .create_context(|| Some(Greeter::default()))
//!         .directive("greeter", |call, value| {
//!             let greeter = call.context::<Greeter>().map_err(|e| {
//!                 mediapipe::error::DirectiveError::Fatal(e.to_string())
//!             })?;
//!             *greeter.greeting.lock().unwrap() = value.as_str().unwrap_or("hi").to_string();
//!             Ok(())
//!         })
//!         .keyshot(|_, token| {
//!             Ok(if token == 'g' { Disposition::Handled } else { Disposition::Declined })
//!         })
//!         .build()]
//! }
//!
//! static MODULES: Registry = Registry::new(catalog);
//!
//! # fn main() -> Result<(), mediapipe::Error> {
//! let config: RunConfiguration = r#"{"module_list": ["greeter"], "greeter": "hello"}"#.parse()?;
//! let mut pipeline = Pipeline::builder(MODULES.register_all()?, config).build();
//! pipeline.start()?;
//!
//! assert_eq!(pipeline.keyshot('g')?, Routed::Handled("mp_greeter".into()));
//! assert_eq!(pipeline.keyshot('x')?, Routed::Ignored);
//!
//! pipeline.teardown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Threads
//!
//! Lifecycle phases run on one controlling thread. Buffer callbacks run on
//! the media runtime's streaming threads, and each endpoint reader runs on
//! its own thread. Module contexts are shared between those threads, so
//! modules guard their own mutable state.

pub mod config;
pub mod error;
pub mod link;
pub mod module;
pub mod packet;
pub mod pipeline;
pub mod router;
pub mod runtime;

pub use config::RunConfiguration;
pub use error::{Error, Result};
pub use pipeline::{Host, Invocation, Pipeline, RunState};
