// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! `mediapipe`: runs a GStreamer pipeline with the modules of a run
//! configuration.
//!
//! ```bash
//! mediapipe --config run.json
//! mediapipe --config run.json --pipeline "videotestsrc ! h264parse name=parser ! fakesink"
//! ```
//!
//! Keys typed on stdin (followed by Enter) are routed to the modules.

use std::{
    io::BufRead,
    path::PathBuf,
    process::ExitCode,
    sync::{Arc, mpsc},
    thread,
};

use clap::Parser;
use gst::prelude::*;
use gstmediapipe::{
    MODULES,
    error::{HostError, Result},
    modules::console::QUIT_MESSAGE,
    runtime::{GstRuntime, bus_message_from},
};
use gstreamer as gst;
use mediapipe::{Pipeline, RunConfiguration, config::LinkSettings, router::Routed};
use tracing::{debug, error, info, warn};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "-",
    env!("COMMIT_ID"),
    " (",
    env!("BUILD_REL_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(version = VERSION, about = "Runs a GStreamer pipeline with mediapipe modules", long_about = None)]
struct Args {
    /// Run configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Launch description, overrides the configuration's "pipeline"
    #[arg(short, long)]
    pipeline: Option<String>,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

fn main() -> ExitCode {
    setup_logging();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "mediapipe failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    gst::init()?;

    let config = RunConfiguration::from_path(&args.config)?;
    let description = args
        .pipeline
        .as_deref()
        .or(config.pipeline())
        .ok_or(HostError::MissingPipeline)?
        .to_owned();
    let media = gst::parse::launch(&description)?
        .downcast::<gst::Pipeline>()
        .map_err(|_| HostError::NotAPipeline)?;
    let bus = media.bus().ok_or(HostError::NoBus)?;
    let driver = config.link().map(LinkSettings::build_driver).transpose()?;

    let table = MODULES.register_all()?;
    let mut builder =
        Pipeline::builder(table, config).runtime(Arc::new(GstRuntime::new(media.clone())));
    if let Some(driver) = driver {
        builder = builder.link_driver(driver);
    }
    let mut modules = builder.build();
    info!(run_id = %modules.run_id(), pipeline = %description, "Starting run");

    if let Err(error) = modules.start() {
        modules.teardown();
        return Err(error.into());
    }

    let outcome = play(&media, &bus, &modules);
    if let Err(error) = media.set_state(gst::State::Null) {
        warn!(%error, "Failed to stop pipeline");
    }
    modules.teardown();
    outcome
}

/// Sets the pipeline playing and serves its bus until end of stream, an
/// error, or a quit request.
fn play(media: &gst::Pipeline, bus: &gst::Bus, modules: &Pipeline) -> Result<()> {
    media.set_state(gst::State::Playing)?;
    let keys = spawn_keyboard();

    loop {
        for token in keys.try_iter() {
            match modules.keyshot(token) {
                Ok(Routed::Handled(module)) => debug!(%token, %module, "Key handled"),
                Ok(Routed::Ignored) => info!(%token, "No module handles this key"),
                Err(error) => warn!(%token, %error, "Key handler failed"),
            }
        }

        let Some(message) = bus.timed_pop(gst::ClockTime::from_mseconds(100)) else {
            continue;
        };
        match message.view() {
            gst::MessageView::Eos(..) => {
                info!("End of stream");
                return Ok(());
            }
            gst::MessageView::Error(err) => {
                return Err(HostError::Pipeline {
                    source_name: err
                        .src()
                        .map(|source| source.path_string().to_string())
                        .unwrap_or_default(),
                    message: err.error().to_string(),
                });
            }
            gst::MessageView::Application(application) => {
                let Some(structure) = application.structure() else {
                    continue;
                };
                let message = bus_message_from(structure);
                if message.is(QUIT_MESSAGE) {
                    info!("Quit requested");
                    return Ok(());
                }
                match modules.bus_message(&message) {
                    Ok(Routed::Handled(module)) => {
                        debug!(name = %message.name, %module, "Message handled")
                    }
                    Ok(Routed::Ignored) => debug!(name = %message.name, "Message ignored"),
                    Err(error) => warn!(name = %message.name, %error, "Message handler failed"),
                }
            }
            _ => {}
        }
    }
}

/// Forwards every non-blank character typed on stdin.
fn spawn_keyboard() -> mpsc::Receiver<char> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            for token in line.chars().filter(|c| !c.is_whitespace()) {
                if tx.send(token).is_err() {
                    return;
                }
            }
        }
    });
    rx
}
