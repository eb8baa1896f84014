//! `mp_xlinkreader`: receives packets from a channel and posts them on the bus.
//!
//! A reader thread reassembles the channel's messages into packets, decodes
//! them and posts one `xlink-packet` application message per packet. Codec
//! errors are logged and counted; the thread carries on with the next
//! packet.
//!
//! ## Directive `xlinkreader`
//! - `channel`, `device_id`, `fragment_size`: the endpoint
//! - `max_packet_size`: largest packet accepted from the channel
//! - `max_attempts`, `retry_delay_ms`: open retry policy
//!
//! ## Keyshots
//! - `s`: log packet and error counters

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU64, Ordering},
};

use mediapipe::{
    Host, Invocation,
    error::{DirectiveError, HookError},
    link::{ChannelMode, DEFAULT_FRAGMENT_SIZE, Endpoint, EndpointConfig, LinkHandle, ReaderHandle},
    module::{ModuleContext, ModuleDescriptor},
    packet::{
        self, Packet,
        reassembly::{DEFAULT_MAX_PACKET_SIZE, Reassembler},
    },
    router::Disposition,
    runtime::BusMessage,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::{lock, open_options, parse_settings};

pub const NAME: &str = "mp_xlinkreader";
pub const DIRECTIVE: &str = "xlinkreader";

/// Name of the bus message posted for every received packet.
pub const PACKET_MESSAGE: &str = "xlink-packet";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub channel: u16,
    pub device_id: u32,
    pub fragment_size: usize,
    pub max_packet_size: usize,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: u64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            channel: 1025,
            device_id: 0,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_attempts: None,
            retry_delay_ms: 100,
        }
    }
}

/// Packet and error counters shared with the reader thread.
#[derive(Debug, Default)]
pub struct Counters {
    packets: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Per-run state of the reader module.
#[derive(Debug, Default)]
pub struct XLinkReader {
    settings: Mutex<ReaderSettings>,
    endpoint: Mutex<Option<Endpoint>>,
    reader: Mutex<Option<ReaderHandle>>,
    counters: Arc<Counters>,
}

impl XLinkReader {
    pub fn settings(&self) -> ReaderSettings {
        lock(&self.settings).clone()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Closes the endpoint and waits for the reader thread.
    fn shut_down(&self) {
        if let Some(endpoint) = lock(&self.endpoint).take() {
            endpoint.close();
        }
        if let Some(reader) = lock(&self.reader).take()
            && let Some(error) = reader.join()
        {
            error!(%error, "Reader thread had stopped on a transport failure");
        }
    }
}

/// Bus message describing one received packet.
pub fn packet_message(packet: &Packet<'_>) -> BusMessage {
    BusMessage::new(PACKET_MESSAGE)
        .with_field("packet_type", u8::from(packet.metadata.packet_type))
        .with_field("stream_id", packet.metadata.stream_id)
        .with_field("frame_number", packet.metadata.frame_number)
        .with_field("object_count", packet.metadata.object_count)
        .with_field("payload_size", packet.payload.len() as u64)
}

/// Builds the reader thread's message sink.
fn packet_sink(
    host: Weak<Host>,
    counters: Arc<Counters>,
    max_packet_size: usize,
) -> impl FnMut(&[u8]) + Send + 'static {
    let mut reassembler = Reassembler::new().with_max_packet_size(max_packet_size);
    move |message| {
        reassembler.push(message);
        while let Some(next) = reassembler.next_packet() {
            let decoded = next.and_then(|bytes| {
                packet::decode(&bytes).map(|packet| packet_message(&packet))
            });
            let message = match decoded {
                Ok(message) => message,
                Err(error) => {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(%error, "Skipping undecodable packet");
                    continue;
                }
            };
            counters.packets.fetch_add(1, Ordering::Relaxed);
            let Some(host) = host.upgrade() else {
                continue;
            };
            if let Err(error) = host.post_message(message) {
                debug!(%error, "Packet message not posted");
            }
        }
    }
}

fn configure(call: &Invocation<'_>, value: &serde_json::Value) -> Result<(), DirectiveError> {
    let reader = call
        .context::<XLinkReader>()
        .map_err(|err| DirectiveError::Fatal(err.to_string()))?;
    let settings: ReaderSettings = parse_settings(DIRECTIVE, value)?;
    debug!(?settings, "Reader configured");
    *lock(&reader.settings) = settings;
    Ok(())
}

fn open(call: &Invocation<'_>) -> Result<(), HookError> {
    let reader = call.context::<XLinkReader>()?;
    let driver = call
        .host()
        .link_driver()
        .ok_or_else(|| HookError::msg("no link driver configured"))?;
    let settings = reader.settings();
    let config = EndpointConfig::new(LinkHandle::new(settings.device_id), settings.channel)
        .with_mode(ChannelMode::Receive)
        .with_fragment_size(settings.fragment_size);
    let endpoint = Endpoint::open(
        driver,
        config,
        &open_options(settings.max_attempts, settings.retry_delay_ms),
    )?;

    let handle = endpoint.spawn_reader(packet_sink(
        Arc::downgrade(call.host()),
        reader.counters.clone(),
        settings.max_packet_size,
    ));
    *lock(&reader.endpoint) = Some(endpoint);
    *lock(&reader.reader) = Some(handle);
    info!(channel = settings.channel, "Receiving packets");
    Ok(())
}

fn on_key(call: &Invocation<'_>, token: char) -> Result<Disposition, HookError> {
    if token != 's' {
        return Ok(Disposition::Declined);
    }
    let reader = call.context::<XLinkReader>()?;
    let last_error = lock(&reader.endpoint)
        .as_ref()
        .and_then(Endpoint::last_error);
    info!(
        packets = reader.counters.packets(),
        errors = reader.counters.errors(),
        ?last_error,
        "Reader statistics"
    );
    Ok(Disposition::Handled)
}

fn destroy(context: ModuleContext) -> Result<(), HookError> {
    let reader = context.downcast::<XLinkReader>()?;
    reader.shut_down();
    info!(
        packets = reader.counters.packets(),
        errors = reader.counters.errors(),
        "Reader closed"
    );
    Ok(())
}

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::builder(NAME)
        .core()
        .create_context(|| Some(XLinkReader::default()))
        .directive(DIRECTIVE, configure)
        .init_module(open)
        .keyshot(on_key)
        .destroy_context(destroy)
        .build()
}
