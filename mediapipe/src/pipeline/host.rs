// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! What a running module can reach.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use uuid::Uuid;

use crate::{
    config::RunConfiguration,
    error::{LifecycleError, RouteError, RuntimeError},
    link::LinkDriver,
    module::{ModuleContext, ModuleDescriptor},
    router::callbacks::{CallbackId, CallbackRegistry},
    runtime::{BufferView, BusMessage, MediaRuntime},
};

/// Services shared by every module of one run.
///
/// A `Host` is created with the run and handed to every hook through an
/// [`Invocation`]. It is `Send + Sync`; modules may clone the `Arc` into
/// their own threads.
pub struct Host {
    run_id: Uuid,
    config: Arc<RunConfiguration>,
    runtime: Option<Arc<dyn MediaRuntime>>,
    link_driver: Option<Arc<dyn LinkDriver>>,
    contexts: RwLock<HashMap<String, ModuleContext>>,
    callbacks: CallbackRegistry,
}

impl Host {
    pub(crate) fn new(
        config: Arc<RunConfiguration>,
        runtime: Option<Arc<dyn MediaRuntime>>,
        link_driver: Option<Arc<dyn LinkDriver>>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            runtime,
            link_driver,
            contexts: RwLock::new(HashMap::new()),
            callbacks: CallbackRegistry::new(),
        }
    }

    /// Identifier of this run, attached to its log span.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// The whole configuration document.
    pub fn config_root(&self) -> &serde_json::Value {
        self.config.root()
    }

    /// The context of another module of this run.
    pub fn find_module_context(&self, name: &str) -> Option<ModuleContext> {
        self.contexts
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    pub fn link_driver(&self) -> Option<Arc<dyn LinkDriver>> {
        self.link_driver.clone()
    }

    pub fn runtime(&self) -> Option<&Arc<dyn MediaRuntime>> {
        self.runtime.as_ref()
    }

    /// Subscribes `callback` to the buffers passing `element`'s pad `pad`.
    ///
    /// Callbacks run on the streaming thread, and only while the run is
    /// running.
    pub fn set_user_callback<F>(
        &self,
        element: &str,
        pad: &str,
        callback: F,
    ) -> Result<CallbackId, RouteError>
    where
        F: Fn(&BufferView<'_>) + Send + Sync + 'static,
    {
        self.callbacks
            .subscribe(self.runtime.as_deref(), element, pad, Arc::new(callback))
    }

    pub fn remove_user_callback(&self, element: &str, pad: &str, id: CallbackId) -> bool {
        self.callbacks.unsubscribe(element, pad, id)
    }

    /// Posts an application message on the pipeline bus.
    pub fn post_message(&self, message: BusMessage) -> Result<(), RuntimeError> {
        self.runtime
            .as_ref()
            .ok_or(RuntimeError::Unavailable)?
            .post_message(message)
    }

    pub(crate) fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub(crate) fn insert_context(&self, context: ModuleContext) {
        self.contexts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(context.module().to_string(), context);
    }

    pub(crate) fn clear_contexts(&self) {
        self.contexts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

/// The arguments of one hook call.
///
/// Gives the hook its module's name, its context (core modules only) and
/// the [`Host`].
pub struct Invocation<'a> {
    host: &'a Arc<Host>,
    module: &'a ModuleDescriptor,
    context: Option<&'a ModuleContext>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        host: &'a Arc<Host>,
        module: &'a ModuleDescriptor,
        context: Option<&'a ModuleContext>,
    ) -> Self {
        Self {
            host,
            module,
            context,
        }
    }

    pub fn host(&self) -> &'a Arc<Host> {
        self.host
    }

    pub fn module_name(&self) -> &'a str {
        self.module.name()
    }

    pub fn context_handle(&self) -> Option<&'a ModuleContext> {
        self.context
    }

    /// The calling module's context as `T`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ContextMismatch`] if the module has no context or
    /// it is not a `T`.
    pub fn context<T>(&self) -> Result<Arc<T>, LifecycleError>
    where
        T: Any + Send + Sync,
    {
        match self.context {
            Some(context) => context.downcast::<T>(),
            None => Err(LifecycleError::ContextMismatch {
                module: self.module.name().to_string(),
                expected: std::any::type_name::<T>(),
            }),
        }
    }
}
