// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Run configuration document.
//!
//! The document is a JSON object. `module_list` names the modules to run in
//! order; every other top-level key is a directive value, addressed by the
//! directive name a module declares. Two keys are read by the host itself:
//! `pipeline` (a launch description for the media graph) and `link` (which
//! channel-link driver to use).
//!
//! ```json
//! {
//!   "module_list": ["mp_xlinkwriter", "console"],
//!   "pipeline": "videotestsrc ! x264enc ! h264parse name=parser ! fakesink",
//!   "link": { "driver": "loopback" },
//!   "xlinkwriter": { "element": "parser", "pad": "src", "channel": 1025 }
//! }
//! ```

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{ConfigError, OpenError},
    link::{LinkDriver, LoopbackDriver, XLinkDriver, load_api},
};

/// Shared object loaded when `link.driver` is `"xlink"` and no library is named.
pub const DEFAULT_XLINK_LIBRARY: &str = "libXLink.so";

/// Which link driver a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDriverKind {
    /// In-process driver; a channel's writes come back on its reads.
    #[default]
    Loopback,
    /// The XLink shared library.
    Xlink,
}

/// The `link` section of the run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub driver: LinkDriverKind,
    pub library: PathBuf,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            driver: LinkDriverKind::default(),
            library: PathBuf::from(DEFAULT_XLINK_LIBRARY),
        }
    }
}

impl LinkSettings {
    /// Instantiates the selected driver.
    ///
    /// # Errors
    ///
    /// [`OpenError::Library`] if the XLink library cannot be loaded.
    pub fn build_driver(&self) -> Result<Arc<dyn LinkDriver>, OpenError> {
        Ok(match self.driver {
            LinkDriverKind::Loopback => Arc::new(LoopbackDriver::new()),
            LinkDriverKind::Xlink => Arc::new(XLinkDriver::new(load_api(&self.library)?)),
        })
    }
}

#[derive(Deserialize)]
struct Document {
    module_list: Option<Vec<String>>,
    pipeline: Option<String>,
    link: Option<LinkSettings>,
}

/// A parsed, immutable run configuration.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    root: Value,
    module_list: Vec<String>,
    pipeline: Option<String>,
    link: Option<LinkSettings>,
}

impl RunConfiguration {
    /// Reads and parses a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Builds a configuration from an already parsed JSON tree.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Malformed`] if the tree is not an object or a host key has the wrong shape
    /// - [`ConfigError::MissingKey`] if `module_list` is absent
    pub fn from_value(root: Value) -> Result<Self, ConfigError> {
        if !root.is_object() {
            return Err(ConfigError::Malformed(serde::de::Error::custom(
                "the configuration document must be a JSON object",
            )));
        }
        let document = Document::deserialize(&root)?;
        let module_list = document
            .module_list
            .ok_or_else(|| ConfigError::MissingKey("module_list".to_string()))?;
        Ok(Self {
            root,
            module_list,
            pipeline: document.pipeline,
            link: document.link,
        })
    }

    /// Module names in the order they are run.
    pub fn module_list(&self) -> &[String] {
        &self.module_list
    }

    /// Value of the directive `name`, if the document sets it.
    pub fn directive(&self, name: &str) -> Option<&Value> {
        self.root.get(name)
    }

    pub fn pipeline(&self) -> Option<&str> {
        self.pipeline.as_deref()
    }

    pub fn link(&self) -> Option<&LinkSettings> {
        self.link.as_ref()
    }

    /// Read-only access to the whole document.
    pub fn root(&self) -> &Value {
        &self.root
    }
}

impl FromStr for RunConfiguration {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_value(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_host_keys_and_directives() {
        let config: RunConfiguration = r#"{
            "module_list": ["mp_xlinkwriter", "console"],
            "pipeline": "videotestsrc ! fakesink",
            "link": { "driver": "xlink", "library": "/opt/xlink/libXLink.so" },
            "xlinkwriter": { "channel": 1025 }
        }"#
        .parse()
        .unwrap();

        assert_eq!(config.module_list(), ["mp_xlinkwriter", "console"]);
        assert_eq!(config.pipeline(), Some("videotestsrc ! fakesink"));
        let link = config.link().unwrap();
        assert_eq!(link.driver, LinkDriverKind::Xlink);
        assert_eq!(link.library, PathBuf::from("/opt/xlink/libXLink.so"));
        assert_eq!(config.directive("xlinkwriter").unwrap()["channel"], 1025);
        assert!(config.directive("xlinkreader").is_none());
    }

    #[test]
    fn link_defaults_to_loopback() {
        let config: RunConfiguration = r#"{"module_list": [], "link": {}}"#.parse().unwrap();
        assert_eq!(config.link(), Some(&LinkSettings::default()));
        assert!(config.pipeline().is_none());
    }

    #[test]
    fn module_list_is_required() {
        let err = "{}".parse::<RunConfiguration>().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(key) if key == "module_list"));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(
            "[1, 2]".parse::<RunConfiguration>(),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            r#"{"module_list": "console"}"#.parse::<RunConfiguration>(),
            Err(ConfigError::Malformed(_))
        ));
    }
}
