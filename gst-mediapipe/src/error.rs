// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use gstreamer as gst;

/// Failures of the host binary outside the module lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("No pipeline description: pass --pipeline or set \"pipeline\" in the configuration")]
    MissingPipeline,

    #[error("Pipeline description did not produce a pipeline")]
    NotAPipeline,

    #[error("Pipeline has no bus")]
    NoBus,

    #[error("GStreamer error: {0}")]
    Glib(#[from] glib::Error),

    #[error("GStreamer call failed: {0}")]
    Bool(#[from] glib::BoolError),

    #[error("State change failed: {0}")]
    StateChange(#[from] gst::StateChangeError),

    #[error("Pipeline error from {source_name}: {message}")]
    Pipeline {
        source_name: String,
        message: String,
    },

    #[error(transparent)]
    Mediapipe(#[from] mediapipe::Error),
}

impl From<mediapipe::error::ConfigError> for HostError {
    fn from(error: mediapipe::error::ConfigError) -> Self {
        HostError::Mediapipe(error.into())
    }
}

impl From<mediapipe::error::OpenError> for HostError {
    fn from(error: mediapipe::error::OpenError) -> Self {
        HostError::Mediapipe(error.into())
    }
}

pub type Result<T> = core::result::Result<T, HostError>;
