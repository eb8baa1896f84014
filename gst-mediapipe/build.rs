//! Build script for gst-mediapipe
//!
//! Generates version information with `gst_plugin_version_helper`:
//! - `COMMIT_ID`: Git commit hash
//! - `BUILD_REL_DATE`: Build date
//!
//! Both feed the `--version` string of the `mediapipe` binary.

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

fn main() {
    gst_plugin_version_helper::info()
}
