// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! One run of a module list.
//!
//! A [`Pipeline`] ties together a module table, a run configuration and the
//! collaborators modules need (media runtime, link driver), and walks the
//! selected modules through their lifecycle:
//!
//! ```text
//! Unresolved ─resolve─► ContextsCreated ─configure─► Configured
//!     ─init_modules─► ModulesInitialized ─init_callbacks─► CallbacksInitialized
//!     ─run─► Running ─teardown─► TornDown
//! ```
//!
//! Any failing phase moves the run to `Failed`; [`Pipeline::teardown`] is
//! accepted from every state.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use mediapipe::{
//!     module::{ModuleDescriptor, ModuleTable},
//!     pipeline::{Pipeline, RunState},
//! };
//!
//! # fn main() -> Result<(), mediapipe::Error> {
//! let table = Arc::new(ModuleTable::new(vec![ModuleDescriptor::builder("mp_alpha").build()])?);
//! let config = r#"{"module_list": ["alpha"]}"#.parse::<mediapipe::config::RunConfiguration>()?;
//!
//! let mut pipeline = Pipeline::builder(table, config).build();
//! pipeline.start()?;
//! assert_eq!(pipeline.state(), RunState::Running);
//! pipeline.teardown();
//! # Ok(())
//! # }
//! ```

mod host;
pub mod lifecycle;

use std::sync::Arc;

use tracing::info_span;

pub use host::{Host, Invocation};

use crate::{
    config::RunConfiguration,
    link::LinkDriver,
    module::{ModuleContext, ModuleDescriptor, ModuleTable},
    runtime::MediaRuntime,
};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Unresolved,
    ContextsCreated,
    Configured,
    ModulesInitialized,
    CallbacksInitialized,
    Running,
    TornDown,
    Failed,
}

/// The resolved modules of a run and their contexts, slot for slot.
#[derive(Debug, Default)]
pub struct ModuleSet {
    modules: Vec<Arc<ModuleDescriptor>>,
    contexts: Vec<Option<ModuleContext>>,
}

impl ModuleSet {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|module| module.name())
    }

    /// Modules with their contexts, in run order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<ModuleDescriptor>, Option<&ModuleContext>)> {
        self.modules
            .iter()
            .zip(self.contexts.iter().map(Option::as_ref))
    }

    fn clear(&mut self) {
        self.modules.clear();
        self.contexts.clear();
    }
}

/// A run of the modules named in a [`RunConfiguration`].
pub struct Pipeline {
    pub(crate) host: Arc<Host>,
    table: Option<Arc<ModuleTable>>,
    pub(crate) set: ModuleSet,
    pub(crate) state: RunState,
    degraded: Vec<String>,
    pub(crate) span: tracing::Span,
}

impl Pipeline {
    pub fn builder(table: Arc<ModuleTable>, config: RunConfiguration) -> PipelineBuilder {
        PipelineBuilder {
            table,
            config,
            runtime: None,
            link_driver: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn modules(&self) -> &ModuleSet {
        &self.set
    }

    /// Modules whose `init_callback` failed; they keep running without
    /// their callbacks.
    pub fn degraded(&self) -> &[String] {
        &self.degraded
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.host.run_id()
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    table: Arc<ModuleTable>,
    config: RunConfiguration,
    runtime: Option<Arc<dyn MediaRuntime>>,
    link_driver: Option<Arc<dyn LinkDriver>>,
}

impl PipelineBuilder {
    pub fn runtime(mut self, runtime: Arc<dyn MediaRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn link_driver(mut self, driver: Arc<dyn LinkDriver>) -> Self {
        self.link_driver = Some(driver);
        self
    }

    pub fn build(self) -> Pipeline {
        let host = Arc::new(Host::new(
            Arc::new(self.config),
            self.runtime,
            self.link_driver,
        ));
        let span = info_span!("run", run_id = %host.run_id());
        Pipeline {
            host,
            table: Some(self.table),
            set: ModuleSet::default(),
            state: RunState::Unresolved,
            degraded: Vec::new(),
            span,
        }
    }
}
