// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! `console`: keyboard help and quit.

use mediapipe::{
    Invocation,
    error::HookError,
    module::ModuleDescriptor,
    router::Disposition,
    runtime::BusMessage,
};
use tracing::info;

pub const NAME: &str = "console";

/// Bus message asking the host to stop the run.
pub const QUIT_MESSAGE: &str = "mediapipe-quit";

const HELP: &str = "keys: h help, q quit, p pause/resume writer, s reader statistics";

fn on_key(call: &Invocation<'_>, token: char) -> Result<Disposition, HookError> {
    match token {
        'h' => {
            info!("{HELP}");
            Ok(Disposition::Handled)
        }
        'q' => {
            info!("Quit requested");
            call.host().post_message(BusMessage::new(QUIT_MESSAGE))?;
            Ok(Disposition::Handled)
        }
        _ => Ok(Disposition::Declined),
    }
}

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::builder(NAME)
        .stateless()
        .keyshot(on_key)
        .exit(|| info!("Console shutting down"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediapipe::{Pipeline, RunConfiguration, error::RouteError, router::Routed};
    use tracing_test::traced_test;

    fn pipeline() -> Pipeline {
        let table = crate::MODULES.register_all().unwrap();
        let config: RunConfiguration = r#"{"module_list": ["console"]}"#.parse().unwrap();
        Pipeline::builder(table, config).build()
    }

    #[test]
    #[traced_test]
    fn help_and_exit_are_logged() {
        let mut pipeline = pipeline();
        pipeline.start().unwrap();
        assert_eq!(pipeline.keyshot('h').unwrap(), Routed::Handled(NAME.into()));
        assert_eq!(pipeline.keyshot('z').unwrap(), Routed::Ignored);
        pipeline.teardown();
        assert!(logs_contain("keys: h help"));
        assert!(logs_contain("Console shutting down"));
    }

    #[test]
    fn quit_without_runtime_is_a_handler_error() {
        let mut pipeline = pipeline();
        pipeline.start().unwrap();
        assert!(matches!(
            pipeline.keyshot('q'),
            Err(RouteError::Handler { .. })
        ));
        pipeline.teardown();
    }
}
