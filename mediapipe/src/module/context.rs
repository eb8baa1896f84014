// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Type-erased per-module state.

use std::{any::Any, fmt, sync::Arc};

use crate::error::LifecycleError;

/// Opaque state created by a core module's `create_context` hook.
///
/// The handle is cheap to clone; every clone refers to the same state.
/// The state is shared, so modules that need to mutate it keep their own
/// locks inside it.
///
/// # Examples
///
/// ```
/// use std::sync::Mutex;
/// use mediapipe::module::ModuleContext;
///
/// #[derive(Default)]
/// struct Counter(Mutex<u32>);
///
/// let context = ModuleContext::new("mp_counter", Counter::default());
/// *context.downcast::<Counter>().unwrap().0.lock().unwrap() += 1;
///
/// assert!(context.downcast::<String>().is_err());
/// ```
#[derive(Clone)]
pub struct ModuleContext {
    module: Arc<str>,
    state: Arc<dyn Any + Send + Sync>,
}

impl ModuleContext {
    pub fn new<T>(module: impl Into<Arc<str>>, state: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self::from_arc(module, Arc::new(state))
    }

    pub fn from_arc(module: impl Into<Arc<str>>, state: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            module: module.into(),
            state,
        }
    }

    /// Name of the module that owns this context.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn is<T: Any>(&self) -> bool {
        self.state.is::<T>()
    }

    /// Returns the state as `T`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ContextMismatch`] if the state is not a `T`.
    pub fn downcast<T>(&self) -> Result<Arc<T>, LifecycleError>
    where
        T: Any + Send + Sync,
    {
        self.state
            .clone()
            .downcast::<T>()
            .map_err(|_| LifecycleError::ContextMismatch {
                module: self.module.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
