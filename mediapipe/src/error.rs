// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for mediapipe operations.
//!
//! Each concern has its own enum so that callers can match on exactly the
//! failures an operation can produce:
//!
//! - [`ConfigError`]: unknown modules, malformed documents, rejected directives
//! - [`LifecycleError`]: context creation and hook failures, tagged with the [`Phase`]
//! - [`OpenError`], [`WriteError`], [`ReadError`]: channel-link transport failures
//! - [`EncodeError`], [`DecodeError`]: packet codec failures (per packet, never fatal)
//! - [`RouteError`], [`RuntimeError`]: event routing and pipeline runtime failures
//!
//! [`Error`] wraps all of them for code that only needs to propagate.

use std::{fmt, path::PathBuf, sync::Arc};

use crate::pipeline::RunState;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Lifecycle phase in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Resolve,
    Configure,
    InitModules,
    InitCallbacks,
    Running,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Resolve => "resolve",
            Phase::Configure => "configure",
            Phase::InitModules => "init-modules",
            Phase::InitCallbacks => "init-callbacks",
            Phase::Running => "running",
            Phase::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Any error produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<WriteError> for Error {
    fn from(error: WriteError) -> Self {
        Error::Transport(error.into())
    }
}

impl From<ReadError> for Error {
    fn from(error: ReadError) -> Self {
        Error::Transport(error.into())
    }
}

/// Configuration errors. Always fatal to the phase that raised them.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A name in `module_list` matches no registered module.
    #[error("Unknown module \"{0}\"")]
    UnknownModule(String),

    /// Two descriptors in the compiled catalog share a name.
    #[error("Duplicate module \"{0}\"")]
    DuplicateModule(String),

    /// A required key is missing from the configuration document.
    #[error("Missing required key \"{0}\"")]
    MissingKey(String),

    /// The configuration document is not valid JSON or has the wrong shape.
    #[error("Malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("Reading configuration \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directive parse function reported a hard error.
    #[error("Directive \"{directive}\" of module \"{module}\" rejected: {reason}")]
    Directive {
        module: String,
        directive: String,
        reason: String,
    },

    /// The process-wide module registry failed to build; every call reports
    /// the same failure.
    #[error("Module registration failed: {0}")]
    Registration(Arc<ConfigError>),
}

/// Lifecycle errors. Fatal to the run, except for init-callback failures
/// which the dispatcher downgrades to a logged warning.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A `create_context` hook returned no context.
    #[error("[{phase}] module \"{0}\" failed to create its context", phase = Phase::Resolve)]
    ContextCreateFailed(String),

    /// A module hook reported failure.
    #[error("[{phase}] module \"{module}\" failed: {source}")]
    Hook {
        phase: Phase,
        module: String,
        #[source]
        source: HookError,
    },

    /// A context was accessed as the wrong concrete type.
    #[error("Context of module \"{module}\" is not a {expected}")]
    ContextMismatch {
        module: String,
        expected: &'static str,
    },

    /// A phase was requested from a state that does not allow it.
    #[error("[{phase}] cannot run from state {state:?}")]
    InvalidState { phase: Phase, state: RunState },
}

/// Failure reported by a module hook.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HookError {
    /// Creates a hook error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error, keeping it as the source.
    pub fn wrap<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let context = context.into();
        Self {
            message: format!("{context}: {error}"),
            source: Some(Box::new(error)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

macro_rules! hook_error_from {
    ($($ty:ty => $context:literal),* $(,)?) => {
        $(
            impl From<$ty> for HookError {
                fn from(error: $ty) -> Self {
                    HookError::wrap($context, error)
                }
            }
        )*
    };
}

hook_error_from! {
    Error => "mediapipe",
    ConfigError => "configuration",
    LifecycleError => "lifecycle",
    OpenError => "channel open",
    WriteError => "channel write",
    ReadError => "channel read",
    EncodeError => "packet encode",
    DecodeError => "packet decode",
    RouteError => "event routing",
    RuntimeError => "pipeline runtime",
    serde_json::Error => "settings",
}

/// Outcome of a failed directive parse function.
///
/// `Fatal` aborts the configure phase and the run; `Soft` is logged and the
/// remaining directives and modules are still configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    #[error("{0}")]
    Fatal(String),
    #[error("{0}")]
    Soft(String),
}

/// Raw status code reported by a channel-link driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkStatus(pub xlink_sys::Status);

impl LinkStatus {
    /// Converts a raw driver status code to a [`core::result::Result`].
    ///
    /// - `Ok(())` if `status == X_LINK_SUCCESS`
    /// - `Err(LinkStatus(status))` for any other code
    pub fn check(status: xlink_sys::Status) -> core::result::Result<(), LinkStatus> {
        if status == xlink_sys::X_LINK_SUCCESS {
            Ok(())
        } else {
            Err(LinkStatus(status))
        }
    }

    pub fn code(self) -> xlink_sys::Status {
        self.0
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            xlink_sys::X_LINK_SUCCESS => "success",
            xlink_sys::X_LINK_ALREADY_INIT => "already initialized",
            xlink_sys::X_LINK_ALREADY_OPEN => "already open",
            xlink_sys::X_LINK_COMMUNICATION_NOT_OPEN => "communication not open",
            xlink_sys::X_LINK_COMMUNICATION_FAIL => "communication failure",
            xlink_sys::X_LINK_COMMUNICATION_UNKNOWN_ERROR => "unknown communication error",
            xlink_sys::X_LINK_DEVICE_NOT_FOUND => "device not found",
            xlink_sys::X_LINK_TIMEOUT => "timeout",
            xlink_sys::X_LINK_ERROR => "error",
            xlink_sys::X_LINK_CHAN_FULL => "channel full",
            _ => "unrecognized status",
        };
        write!(f, "{name} ({})", self.0)
    }
}

/// Failure to bring a channel endpoint up.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// The retry budget ran out before the channel opened.
    #[error("Channel open gave up after {attempts} attempt(s), last status: {last}")]
    Exhausted { attempts: u32, last: LinkStatus },

    /// The open was cancelled through its token.
    #[error("Channel open cancelled")]
    Cancelled,

    /// The endpoint configuration is unusable (e.g. zero fragment size).
    #[error("Invalid endpoint configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load or interact with the driver's dynamic library.
    #[error("Loading link library: {0}")]
    Library(#[from] libloading::Error),
}

/// Failure while writing to an open channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// A fragment write failed; earlier fragments may already be on the wire.
    #[error("Channel write failed: {0}")]
    Transport(LinkStatus),

    /// The endpoint has been closed.
    #[error("Channel is closed")]
    Closed,
}

/// Failure while reading from an open channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("Channel read failed: {0}")]
    Transport(LinkStatus),

    #[error("Releasing channel data failed: {0}")]
    Release(LinkStatus),

    #[error("Channel is closed")]
    Closed,

    #[error("Reader thread panicked")]
    ReaderPanicked,
}

/// Terminal transport failure recorded on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Packet encoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A detection packet must carry at least one object record.
    #[error("Detection packets require at least one object")]
    EmptyObjectList,

    /// A coordinate does not fit in 24 bits.
    #[error("Object field \"{field}\" value {value} does not fit in 24 bits")]
    CoordinateOverflow { field: &'static str, value: u32 },

    /// More than 255 object records.
    #[error("Too many objects: {0} (at most 255)")]
    TooManyObjects(usize),

    /// The packet does not fit the header's size fields.
    #[error("Packet of {0} bytes exceeds the header size fields")]
    PacketTooLarge(usize),
}

/// Packet decoding failures. Reject one packet, never the channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Bad packet magic 0x{0:02x}")]
    BadMagic(u8),

    #[error("Unsupported packet version {0}")]
    BadVersion(u8),

    #[error("Truncated packet: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Metadata size {declared} does not match {expected} for the declared object count")]
    MetaSizeMismatch { declared: usize, expected: usize },

    #[error("Malformed packet: {0}")]
    Malformed(String),
}

/// Event routing failures.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// A handler claimed the event by failing on it.
    #[error("Module \"{module}\" failed handling the event: {source}")]
    Handler {
        module: String,
        #[source]
        source: HookError,
    },

    /// Events are only routed while the run is in the running state.
    #[error("Pipeline is not running (state {0:?})")]
    NotRunning(RunState),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Failures reported by the pipeline runtime collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("No element named \"{0}\" in the pipeline")]
    ElementNotFound(String),

    #[error("Element \"{element}\" has no pad \"{pad}\"")]
    PadNotFound { element: String, pad: String },

    #[error("Failed to install a buffer probe on {element}.{pad}")]
    ProbeFailed { element: String, pad: String },

    #[error("Failed to post message \"{0}\" on the bus")]
    Post(String),

    /// No pipeline runtime is attached to this run.
    #[error("No pipeline runtime attached")]
    Unavailable,
}
