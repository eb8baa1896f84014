// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle phases of a [`Pipeline`].
//!
//! Each phase walks the resolved modules in `module_list` order and runs
//! one hook per module. The phases differ in how they treat failures:
//!
//! | phase            | on failure                                          |
//! |------------------|-----------------------------------------------------|
//! | `resolve`        | unknown name: nothing runs; no context: run fails   |
//! | `configure`      | soft directive error is logged, fatal one fails run |
//! | `init_modules`   | first failing module fails the run                  |
//! | `init_callbacks` | module is logged as degraded, run continues         |
//! | `teardown`       | logged, every module is still visited               |
//!
//! A failed run stays `Failed` until [`Pipeline::teardown`] releases what was
//! brought up.

use std::collections::HashSet;

use tracing::{debug, error, info, trace, warn};

use crate::{
    error::{ConfigError, DirectiveError, Error, LifecycleError, Phase},
    module::ModuleContext,
    pipeline::{Invocation, Pipeline, RunState},
};

impl Pipeline {
    fn expect_state(&self, phase: Phase, expected: RunState) -> Result<(), LifecycleError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                phase,
                state: self.state,
            })
        }
    }

    fn finish<T>(&mut self, outcome: Result<T, Error>, next: RunState) -> Result<T, Error> {
        self.state = match outcome {
            Ok(_) => next,
            Err(_) => RunState::Failed,
        };
        outcome
    }

    /// Resolves `module_list` against the module table and creates the
    /// contexts of core modules.
    ///
    /// Every name is resolved before any hook runs, so an unknown name leaves
    /// nothing to tear down. Contexts created before a failing
    /// `create_context` are kept for [`Pipeline::teardown`].
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownModule`] for a name matching no module
    /// - [`ConfigError::DuplicateModule`] for a module listed twice
    /// - [`LifecycleError::ContextCreateFailed`] if a `create_context` hook returns nothing
    pub fn resolve(&mut self) -> Result<(), Error> {
        let _run = self.span.clone().entered();
        self.expect_state(Phase::Resolve, RunState::Unresolved)?;
        let outcome = self.resolve_modules();
        self.finish(outcome, RunState::ContextsCreated)
    }

    fn resolve_modules(&mut self) -> Result<(), Error> {
        let table = self.table.clone().ok_or(LifecycleError::InvalidState {
            phase: Phase::Resolve,
            state: self.state,
        })?;
        let host = self.host.clone();

        let mut modules = Vec::with_capacity(host.config().module_list().len());
        let mut seen = HashSet::new();
        for name in host.config().module_list() {
            let Some(module) = table.resolve(name) else {
                error!(module = %name, phase = %Phase::Resolve, "Unknown module");
                return Err(ConfigError::UnknownModule(name.clone()).into());
            };
            if !seen.insert(module.name()) {
                error!(module = %name, phase = %Phase::Resolve, "Module listed twice");
                return Err(ConfigError::DuplicateModule(module.name().to_string()).into());
            }
            modules.push(module.clone());
        }

        self.set.contexts = vec![None; modules.len()];
        self.set.modules = modules;

        for (module, slot) in self.set.modules.iter().zip(self.set.contexts.iter_mut()) {
            if !module.is_core() {
                continue;
            }
            let Some(create) = &module.create_context else {
                continue;
            };
            let Some(state) = create() else {
                error!(module = module.name(), phase = %Phase::Resolve, "Context creation failed");
                return Err(LifecycleError::ContextCreateFailed(module.name().to_string()).into());
            };
            let context = ModuleContext::from_arc(module.name(), state);
            host.insert_context(context.clone());
            *slot = Some(context);
            debug!(module = module.name(), "Context created");
        }

        info!(modules = ?self.set.names().collect::<Vec<_>>(), "Modules resolved");
        Ok(())
    }

    /// Feeds every present directive value to its module's parse function,
    /// modules in run order and directives in declaration order.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Directive`] for the first [`DirectiveError::Fatal`].
    /// [`DirectiveError::Soft`] results are logged and skipped.
    pub fn configure(&mut self) -> Result<(), Error> {
        let _run = self.span.clone().entered();
        self.expect_state(Phase::Configure, RunState::ContextsCreated)?;
        let outcome = self.configure_modules();
        self.finish(outcome, RunState::Configured)
    }

    fn configure_modules(&self) -> Result<(), Error> {
        let config = self.host.config();
        for (module, context) in self.set.iter() {
            let invocation = Invocation::new(&self.host, module, context);
            for directive in module.directives() {
                let Some(value) = config.directive(&directive.name) else {
                    trace!(module = module.name(), directive = %directive.name, "Directive not set");
                    continue;
                };
                match (directive.parse)(&invocation, value) {
                    Ok(()) => {
                        debug!(module = module.name(), directive = %directive.name, "Directive applied");
                    }
                    Err(DirectiveError::Soft(reason)) => {
                        warn!(
                            module = module.name(),
                            directive = %directive.name,
                            phase = %Phase::Configure,
                            %reason,
                            "Directive ignored"
                        );
                    }
                    Err(DirectiveError::Fatal(reason)) => {
                        error!(
                            module = module.name(),
                            directive = %directive.name,
                            phase = %Phase::Configure,
                            %reason,
                            "Directive rejected"
                        );
                        return Err(ConfigError::Directive {
                            module: module.name().to_string(),
                            directive: directive.name.clone(),
                            reason,
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs every `init_module` hook. The first failure fails the run;
    /// modules after it are not initialized.
    pub fn init_modules(&mut self) -> Result<(), Error> {
        let _run = self.span.clone().entered();
        self.expect_state(Phase::InitModules, RunState::Configured)?;
        let outcome = self.init_each_module();
        self.finish(outcome, RunState::ModulesInitialized)
    }

    fn init_each_module(&self) -> Result<(), Error> {
        for (module, context) in self.set.iter() {
            let Some(init) = &module.init_module else {
                continue;
            };
            init(&Invocation::new(&self.host, module, context)).map_err(|source| {
                error!(module = module.name(), phase = %Phase::InitModules, error = %source, "Module initialization failed");
                LifecycleError::Hook {
                    phase: Phase::InitModules,
                    module: module.name().to_string(),
                    source,
                }
            })?;
            debug!(module = module.name(), "Module initialized");
        }
        Ok(())
    }

    /// Runs every `init_callback` hook.
    ///
    /// A failing hook does not stop the run: the module is recorded as
    /// degraded and the remaining hooks still run. Returns the names of the
    /// degraded modules.
    pub fn init_callbacks(&mut self) -> Result<Vec<String>, Error> {
        let _run = self.span.clone().entered();
        self.expect_state(Phase::InitCallbacks, RunState::ModulesInitialized)?;

        let mut degraded = Vec::new();
        for (module, context) in self.set.iter() {
            let Some(init) = &module.init_callback else {
                continue;
            };
            match init(&Invocation::new(&self.host, module, context)) {
                Ok(()) => debug!(module = module.name(), "Callbacks initialized"),
                Err(error) => {
                    warn!(
                        module = module.name(),
                        phase = %Phase::InitCallbacks,
                        %error,
                        "Callback initialization failed, module degraded"
                    );
                    degraded.push(module.name().to_string());
                }
            }
        }

        self.degraded = degraded.clone();
        self.state = RunState::CallbacksInitialized;
        Ok(degraded)
    }

    /// Enters the running state. Buffer callbacks, keyshots and bus messages
    /// are routed from now on.
    pub fn run(&mut self) -> Result<(), Error> {
        let _run = self.span.clone().entered();
        self.expect_state(Phase::Running, RunState::CallbacksInitialized)?;
        self.host.callbacks().set_live(true);
        self.state = RunState::Running;
        info!(degraded = ?self.degraded, "Pipeline running");
        Ok(())
    }

    /// Runs resolve, configure, init-modules and init-callbacks, then enters
    /// the running state.
    ///
    /// On failure the run is left `Failed`; the caller is expected to call
    /// [`Pipeline::teardown`].
    pub fn start(&mut self) -> Result<(), Error> {
        self.resolve()?;
        self.configure()?;
        self.init_modules()?;
        self.init_callbacks()?;
        self.run()
    }

    /// Releases everything the run brought up.
    ///
    /// Visits modules in run order (not reverse). For each, the contextless
    /// `exit` hook runs first, then `destroy_context` with the module's
    /// context if it is a core module holding one. Afterwards all buffer
    /// callbacks are dropped and the module table is released.
    ///
    /// Accepted from every state; a second call does nothing.
    pub fn teardown(&mut self) {
        if self.state == RunState::TornDown {
            debug!("Teardown already done");
            return;
        }
        let _run = self.span.clone().entered();
        self.host.callbacks().clear();

        for (module, slot) in self.set.modules.iter().zip(self.set.contexts.iter_mut()) {
            if let Some(exit) = &module.exit {
                exit();
                trace!(module = module.name(), "Exit hook done");
            }
            let Some(context) = slot.take() else {
                continue;
            };
            if module.is_core()
                && let Some(destroy) = &module.destroy_context
                && let Err(error) = destroy(context)
            {
                error!(
                    module = module.name(),
                    phase = %Phase::Teardown,
                    %error,
                    "Context destruction failed"
                );
            }
        }

        self.host.clear_contexts();
        self.set.clear();
        self.table = None;
        self.state = RunState::TornDown;
        info!("Pipeline torn down");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state != RunState::TornDown && !self.set.is_empty() {
            warn!("Pipeline dropped without teardown, tearing down now");
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tracing_test::traced_test;

    use super::*;
    use crate::{
        RunConfiguration,
        error::HookError,
        module::{ModuleDescriptor, ModuleTable},
    };

    fn pipeline(modules: Vec<ModuleDescriptor>, config: &str) -> Pipeline {
        let table = Arc::new(ModuleTable::new(modules).unwrap());
        let config: RunConfiguration = config.parse().unwrap();
        Pipeline::builder(table, config).build()
    }

    #[test]
    #[traced_test]
    fn soft_directive_errors_are_logged() {
        let module = ModuleDescriptor::builder("mp_lenient")
            .directive("lenient", |_, _| {
                Err(DirectiveError::Soft("using the default rate".into()))
            })
            .build();
        let mut run = pipeline(
            vec![module],
            r#"{"module_list": ["lenient"], "lenient": {"rate": "fast"}}"#,
        );

        run.start().unwrap();
        assert_eq!(run.state(), RunState::Running);
        assert!(logs_contain("Directive ignored"));
        assert!(logs_contain("using the default rate"));
        run.teardown();
    }

    #[test]
    #[traced_test]
    fn degraded_modules_are_logged() {
        let module = ModuleDescriptor::builder("mp_flaky")
            .init_callback(|_| Err(HookError::msg("pad not found")))
            .build();
        let mut run = pipeline(vec![module], r#"{"module_list": ["mp_flaky"]}"#);

        run.start().unwrap();
        assert_eq!(run.degraded(), ["mp_flaky"]);
        assert!(logs_contain("module degraded"));
        assert!(logs_contain("pad not found"));
    }

    #[test]
    #[traced_test]
    fn unknown_modules_are_logged() {
        let mut run = pipeline(vec![], r#"{"module_list": ["mp_ghost"]}"#);

        let err = run.resolve().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnknownModule(ref name)) if name == "mp_ghost"));
        assert_eq!(run.state(), RunState::Failed);
        assert!(logs_contain("Unknown module"));
        assert!(logs_contain("mp_ghost"));
    }

    #[test]
    fn phases_run_in_order_only() {
        let mut run = pipeline(vec![], r#"{"module_list": []}"#);
        let err = run.init_modules().unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::InvalidState {
                phase: Phase::InitModules,
                state: RunState::Unresolved
            })
        ));
        assert_eq!(run.state(), RunState::Unresolved);
    }

    #[test]
    fn teardown_twice_is_harmless() {
        let mut run = pipeline(vec![], r#"{"module_list": []}"#);
        run.start().unwrap();
        run.teardown();
        run.teardown();
        assert_eq!(run.state(), RunState::TornDown);
        assert!(run.resolve().is_err());
    }
}
