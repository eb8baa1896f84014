// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Module descriptors, contexts and the module table.
//!
//! A module is a named bundle of optional lifecycle hooks plus an ordered
//! list of configuration directives. All modules a binary can run are
//! compiled into one catalog; the [`Registry`] turns that catalog into a
//! [`ModuleTable`] exactly once per process.

pub mod context;
pub mod descriptor;
pub mod table;

pub use context::ModuleContext;
pub use descriptor::{ConfigDirective, ModuleBuilder, ModuleDescriptor, ModuleKind};
pub use table::{MODULE_PREFIX, ModuleTable, Registry};
