// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Static description of a module: its name, kind, hooks and directives.

use std::{any::Any, fmt, sync::Arc};

use crate::{
    error::{DirectiveError, HookError},
    module::ModuleContext,
    pipeline::Invocation,
    router::Disposition,
    runtime::BusMessage,
};

pub type CreateContextFn = Box<dyn Fn() -> Option<Arc<dyn Any + Send + Sync>> + Send + Sync>;
pub type InitFn = Box<dyn Fn(&Invocation<'_>) -> Result<(), HookError> + Send + Sync>;
pub type KeyshotFn =
    Box<dyn Fn(&Invocation<'_>, char) -> Result<Disposition, HookError> + Send + Sync>;
pub type BusMessageFn =
    Box<dyn Fn(&Invocation<'_>, &BusMessage) -> Result<Disposition, HookError> + Send + Sync>;
pub type ExitFn = Box<dyn Fn() + Send + Sync>;
pub type DestroyContextFn = Box<dyn Fn(ModuleContext) -> Result<(), HookError> + Send + Sync>;
pub type DirectiveFn =
    Box<dyn Fn(&Invocation<'_>, &serde_json::Value) -> Result<(), DirectiveError> + Send + Sync>;

/// Whether a module owns per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleKind {
    /// Gets a context from `create_context` and has it destroyed at teardown.
    #[default]
    Core,
    /// Never has a context; `create_context`/`destroy_context` are not called.
    Stateless,
}

/// A named configuration key and the function that consumes its value.
pub struct ConfigDirective {
    pub name: String,
    pub parse: DirectiveFn,
}

impl fmt::Debug for ConfigDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDirective")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Everything the lifecycle dispatcher knows about a module.
///
/// Every hook is optional; a missing hook is skipped in its phase. Build
/// descriptors with [`ModuleDescriptor::builder`].
///
/// # Examples
///
/// ```
/// use mediapipe::{module::ModuleDescriptor, router::Disposition};
///
/// let module = ModuleDescriptor::builder("mp_echo")
///     .stateless()
///     .keyshot(|_, token| {
///         Ok(if token == 'e' { Disposition::Handled } else { Disposition::Declined })
///     })
///     .build();
/// assert!(!module.is_core());
/// ```
pub struct ModuleDescriptor {
    pub(crate) name: String,
    pub(crate) kind: ModuleKind,
    pub(crate) index: usize,
    pub(crate) create_context: Option<CreateContextFn>,
    pub(crate) init_module: Option<InitFn>,
    pub(crate) init_callback: Option<InitFn>,
    pub(crate) keyshot: Option<KeyshotFn>,
    pub(crate) bus_message: Option<BusMessageFn>,
    pub(crate) exit: Option<ExitFn>,
    pub(crate) destroy_context: Option<DestroyContextFn>,
    pub(crate) directives: Vec<ConfigDirective>,
}

impl ModuleDescriptor {
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder {
            descriptor: ModuleDescriptor {
                name: name.into(),
                kind: ModuleKind::Core,
                index: 0,
                create_context: None,
                init_module: None,
                init_callback: None,
                keyshot: None,
                bus_message: None,
                exit: None,
                destroy_context: None,
                directives: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn is_core(&self) -> bool {
        self.kind == ModuleKind::Core
    }

    /// Position in the module table. Assigned when the table is built.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn directives(&self) -> &[ConfigDirective] {
        &self.directives
    }

    pub fn has_context_hook(&self) -> bool {
        self.create_context.is_some()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("index", &self.index)
            .field("directives", &self.directives)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ModuleDescriptor`].
pub struct ModuleBuilder {
    descriptor: ModuleDescriptor,
}

impl ModuleBuilder {
    pub fn core(mut self) -> Self {
        self.descriptor.kind = ModuleKind::Core;
        self
    }

    pub fn stateless(mut self) -> Self {
        self.descriptor.kind = ModuleKind::Stateless;
        self
    }

    /// Sets the hook creating the module's context. Returning `None` fails
    /// the run.
    pub fn create_context<T, F>(mut self, create: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        self.descriptor.create_context = Some(Box::new(move || {
            create().map(|state| Arc::new(state) as Arc<dyn Any + Send + Sync>)
        }));
        self
    }

    pub fn init_module<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.descriptor.init_module = Some(Box::new(hook));
        self
    }

    pub fn init_callback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.descriptor.init_callback = Some(Box::new(hook));
        self
    }

    pub fn keyshot<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation<'_>, char) -> Result<Disposition, HookError> + Send + Sync + 'static,
    {
        self.descriptor.keyshot = Some(Box::new(hook));
        self
    }

    pub fn bus_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation<'_>, &BusMessage) -> Result<Disposition, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.descriptor.bus_message = Some(Box::new(hook));
        self
    }

    /// Sets the contextless teardown hook.
    pub fn exit<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.descriptor.exit = Some(Box::new(hook));
        self
    }

    pub fn destroy_context<F>(mut self, hook: F) -> Self
    where
        F: Fn(ModuleContext) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.descriptor.destroy_context = Some(Box::new(hook));
        self
    }

    /// Appends a directive. Directives are parsed in the order they are added.
    pub fn directive<F>(mut self, name: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&Invocation<'_>, &serde_json::Value) -> Result<(), DirectiveError>
            + Send
            + Sync
            + 'static,
    {
        self.descriptor.directives.push(ConfigDirective {
            name: name.into(),
            parse: Box::new(parse),
        });
        self
    }

    pub fn build(self) -> ModuleDescriptor {
        self.descriptor
    }
}
