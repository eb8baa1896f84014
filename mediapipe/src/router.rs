// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime event routing.
//!
//! Three event classes reach modules while a run is [`RunState::Running`]:
//!
//! - keyshots (single-character commands) and bus messages go to modules in
//!   run order until one claims them ([`Pipeline::keyshot`],
//!   [`Pipeline::bus_message`])
//! - buffers arriving at a subscribed pad go to every subscriber of that pad
//!   ([`callbacks`])

pub mod callbacks;

use tracing::{debug, error, trace};

use crate::{
    error::{HookError, RouteError},
    module::{ModuleContext, ModuleDescriptor},
    pipeline::{Invocation, Pipeline, RunState},
    runtime::BusMessage,
};

pub use callbacks::{BufferCallback, CallbackId, CallbackRegistry};

/// A handler's answer to a keyshot or bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The event is consumed; later modules do not see it.
    Handled,
    /// Not for this module; the next one is asked.
    Declined,
}

/// Result of routing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// The named module claimed the event.
    Handled(String),
    /// No module claimed the event.
    Ignored,
}

impl Routed {
    pub fn is_handled(&self) -> bool {
        matches!(self, Routed::Handled(_))
    }
}

impl Pipeline {
    fn ensure_running(&self) -> Result<(), RouteError> {
        match self.state {
            RunState::Running => Ok(()),
            state => Err(RouteError::NotRunning(state)),
        }
    }

    fn first_responder<F>(&self, event: &str, mut ask: F) -> Result<Routed, RouteError>
    where
        F: FnMut(
            &ModuleDescriptor,
            &Invocation<'_>,
        ) -> Option<Result<Disposition, HookError>>,
    {
        self.ensure_running()?;
        let _run = self.span.enter();
        for (module, context) in self.set.iter() {
            let invocation = Invocation::new(&self.host, module, context);
            match ask(module.as_ref(), &invocation) {
                None | Some(Ok(Disposition::Declined)) => {}
                Some(Ok(Disposition::Handled)) => {
                    trace!(module = module.name(), event, "Event handled");
                    return Ok(Routed::Handled(module.name().to_string()));
                }
                Some(Err(source)) => {
                    error!(module = module.name(), event, error = %source, "Event handler failed");
                    return Err(RouteError::Handler {
                        module: module.name().to_string(),
                        source,
                    });
                }
            }
        }
        debug!(event, "Event ignored");
        Ok(Routed::Ignored)
    }

    /// Routes a keyshot command to the first module that handles it.
    ///
    /// # Errors
    ///
    /// - [`RouteError::NotRunning`] outside the running state
    /// - [`RouteError::Handler`] if a handler fails; later modules are not asked
    pub fn keyshot(&self, token: char) -> Result<Routed, RouteError> {
        self.first_responder("keyshot", |module, invocation| {
            module.keyshot.as_ref().map(|hook| hook(invocation, token))
        })
    }

    /// Routes a bus message to the first module that handles it. Modules
    /// decide by the message name.
    pub fn bus_message(&self, message: &BusMessage) -> Result<Routed, RouteError> {
        self.first_responder(&message.name, |module, invocation| {
            module
                .bus_message
                .as_ref()
                .map(|hook| hook(invocation, message))
        })
    }

    /// Context of the module named `name`, for host-side inspection.
    pub fn module_context(&self, name: &str) -> Option<ModuleContext> {
        self.host.find_module_context(name)
    }
}
