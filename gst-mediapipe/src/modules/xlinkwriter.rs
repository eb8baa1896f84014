//! `mp_xlinkwriter`: sends the buffers passing a pad over a channel.
//!
//! Every buffer becomes one `Detection` packet on the configured stream. The
//! object records are the regions of interest queued by `roi` bus messages
//! since the previous buffer, or the placeholder record when none were
//! queued. The buffer bytes are the payload.
//!
//! ## Directive `xlinkwriter`
//! - `element`, `pad`: where buffers are tapped (`element` is required)
//! - `channel`, `device_id`, `mode`, `fragment_size`: the endpoint
//! - `stream_id`: stream the packets are numbered on
//! - `max_attempts`, `retry_delay_ms`: open retry policy
//!
//! ## Keyshots
//! - `p`: pause or resume sending

// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use mediapipe::{
    Invocation,
    error::{DirectiveError, HookError},
    link::{ChannelMode, DEFAULT_FRAGMENT_SIZE, Endpoint, EndpointConfig, LinkHandle},
    module::{ModuleContext, ModuleDescriptor},
    packet::{COORDINATE_LIMIT, MAX_OBJECTS, ObjectRecord, PacketType, writer::PacketWriter},
    router::Disposition,
    runtime::{BufferView, BusMessage},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{lock, open_options, parse_settings};

pub const NAME: &str = "mp_xlinkwriter";
pub const DIRECTIVE: &str = "xlinkwriter";

/// Name of the bus message that queues a region of interest.
pub const ROI_MESSAGE: &str = "roi";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub element: String,
    pub pad: String,
    pub channel: u16,
    pub stream_id: u8,
    pub fragment_size: usize,
    pub device_id: u32,
    pub mode: ChannelMode,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: u64,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            element: String::new(),
            pad: "src".to_owned(),
            channel: 1025,
            stream_id: 0,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            device_id: 0,
            mode: ChannelMode::Send,
            max_attempts: None,
            retry_delay_ms: 100,
        }
    }
}

impl WriterSettings {
    fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig::new(LinkHandle::new(self.device_id), self.channel)
            .with_mode(self.mode)
            .with_fragment_size(self.fragment_size)
    }
}

/// Fields of a `roi` bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Roi {
    #[serde(default)]
    pub object_id: u8,
    #[serde(default)]
    pub classification: u16,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn from_message(message: &BusMessage) -> Result<Self, HookError> {
        let roi: Roi = serde_json::from_value(serde_json::Value::Object(message.fields.clone()))?;
        for (field, value) in [
            ("left", roi.left),
            ("top", roi.top),
            ("width", roi.width),
            ("height", roi.height),
        ] {
            if value >= COORDINATE_LIMIT {
                return Err(HookError::msg(format!(
                    "roi {field} {value} does not fit in 24 bits"
                )));
            }
        }
        Ok(roi)
    }
}

impl From<Roi> for ObjectRecord {
    fn from(roi: Roi) -> Self {
        ObjectRecord {
            reserved: 0,
            object_id: roi.object_id,
            classification: roi.classification,
            left: roi.left,
            top: roi.top,
            width: roi.width,
            height: roi.height,
        }
    }
}

/// Per-run state of the writer module.
#[derive(Debug, Default)]
pub struct XLinkWriter {
    settings: Mutex<WriterSettings>,
    endpoint: Mutex<Option<Arc<Endpoint>>>,
    packets: Mutex<PacketWriter>,
    pending: Mutex<Vec<ObjectRecord>>,
    paused: AtomicBool,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl XLinkWriter {
    pub fn settings(&self) -> WriterSettings {
        lock(&self.settings).clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Flips the pause flag and returns the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Queues a region of interest for the next buffer. Returns `false` when
    /// the queue is already full or a coordinate does not fit in 24 bits.
    pub fn queue(&self, record: ObjectRecord) -> bool {
        let fits = [record.left, record.top, record.width, record.height]
            .iter()
            .all(|&value| value < COORDINATE_LIMIT);
        let mut pending = lock(&self.pending);
        if !fits || pending.len() >= MAX_OBJECTS {
            return false;
        }
        pending.push(record);
        true
    }

    /// Puts regions taken for a failed packet back in front of the queue.
    fn requeue(&self, mut objects: Vec<ObjectRecord>) -> usize {
        let mut pending = lock(&self.pending);
        objects.append(&mut pending);
        objects.truncate(MAX_OBJECTS);
        *pending = objects;
        pending.len()
    }

    /// Frames `buffer` and writes it to the endpoint.
    pub fn send(&self, buffer: &BufferView<'_>) {
        if self.is_paused() {
            return;
        }
        let Some(endpoint) = lock(&self.endpoint).clone() else {
            return;
        };
        let stream_id = lock(&self.settings).stream_id;
        let objects = std::mem::take(&mut *lock(&self.pending));

        let bytes = match lock(&self.packets).frame(
            PacketType::Detection,
            stream_id,
            &objects,
            buffer.data,
        ) {
            Ok(bytes) => bytes,
            Err(error) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let queued = self.requeue(objects);
                warn!(%error, queued, "Dropping buffer, packet could not be framed");
                return;
            }
        };
        match endpoint.write(&bytes) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(channel = endpoint.channel(), %error, "Packet write failed");
            }
        }
    }

    fn close(&self) {
        if let Some(endpoint) = lock(&self.endpoint).take() {
            endpoint.close();
        }
    }
}

fn configure(call: &Invocation<'_>, value: &serde_json::Value) -> Result<(), DirectiveError> {
    let writer = call
        .context::<XLinkWriter>()
        .map_err(|err| DirectiveError::Fatal(err.to_string()))?;
    let settings: WriterSettings = parse_settings(DIRECTIVE, value)?;
    if settings.element.is_empty() {
        return Err(DirectiveError::Fatal(
            "\"xlinkwriter\" needs an \"element\" to tap".to_owned(),
        ));
    }
    debug!(?settings, "Writer configured");
    *lock(&writer.settings) = settings;
    Ok(())
}

fn open(call: &Invocation<'_>) -> Result<(), HookError> {
    let writer = call.context::<XLinkWriter>()?;
    let driver = call
        .host()
        .link_driver()
        .ok_or_else(|| HookError::msg("no link driver configured"))?;
    let settings = writer.settings();
    let endpoint = Endpoint::open(
        driver,
        settings.endpoint_config(),
        &open_options(settings.max_attempts, settings.retry_delay_ms),
    )?;
    *lock(&writer.endpoint) = Some(Arc::new(endpoint));
    Ok(())
}

fn subscribe(call: &Invocation<'_>) -> Result<(), HookError> {
    let writer = call.context::<XLinkWriter>()?;
    let settings = writer.settings();
    if settings.element.is_empty() {
        return Err(HookError::msg("no element to tap"));
    }
    let sender = writer.clone();
    call.host()
        .set_user_callback(&settings.element, &settings.pad, move |buffer| {
            sender.send(buffer)
        })?;
    info!(element = %settings.element, pad = %settings.pad, "Sending buffers");
    Ok(())
}

fn on_roi(call: &Invocation<'_>, message: &BusMessage) -> Result<Disposition, HookError> {
    if !message.is(ROI_MESSAGE) {
        return Ok(Disposition::Declined);
    }
    let writer = call.context::<XLinkWriter>()?;
    let roi = Roi::from_message(message)?;
    if !writer.queue(roi.into()) {
        warn!("Region of interest dropped, queue is full");
    }
    Ok(Disposition::Handled)
}

fn on_key(call: &Invocation<'_>, token: char) -> Result<Disposition, HookError> {
    if token != 'p' {
        return Ok(Disposition::Declined);
    }
    let writer = call.context::<XLinkWriter>()?;
    if writer.toggle_pause() {
        info!("Writer paused");
    } else {
        info!("Writer resumed");
    }
    Ok(Disposition::Handled)
}

fn destroy(context: ModuleContext) -> Result<(), HookError> {
    let writer = context.downcast::<XLinkWriter>()?;
    writer.close();
    info!(sent = writer.sent(), failed = writer.failed(), "Writer closed");
    Ok(())
}

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::builder(NAME)
        .core()
        .create_context(|| Some(XLinkWriter::default()))
        .directive(DIRECTIVE, configure)
        .init_module(open)
        .init_callback(subscribe)
        .bus_message(on_roi)
        .keyshot(on_key)
        .destroy_context(destroy)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediapipe::{
        Pipeline, RunConfiguration, RunState,
        error::RuntimeError,
        link::LoopbackDriver,
        packet::decode,
        router::Routed,
        runtime::{MediaRuntime, PadTap},
    };
    use serde_json::json;

    /// Runtime whose pad taps are driven by the test.
    #[derive(Default)]
    struct Taps(Mutex<Vec<PadTap>>);

    impl Taps {
        fn push(&self, data: &[u8]) {
            for tap in self.0.lock().unwrap().iter() {
                tap(&BufferView::new(data));
            }
        }
    }

    impl MediaRuntime for Taps {
        fn attach_pad_tap(&self, _element: &str, _pad: &str, tap: PadTap) -> Result<(), RuntimeError> {
            self.0.lock().unwrap().push(tap);
            Ok(())
        }

        fn post_message(&self, _message: BusMessage) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn run(config: serde_json::Value) -> (Arc<LoopbackDriver>, Pipeline) {
        let table = crate::MODULES.register_all().unwrap();
        let driver = Arc::new(LoopbackDriver::without_echo());
        let config = RunConfiguration::from_value(config).unwrap();
        let pipeline = Pipeline::builder(table, config)
            .link_driver(driver.clone())
            .build();
        (driver, pipeline)
    }

    fn writer(pipeline: &Pipeline) -> Arc<XLinkWriter> {
        pipeline
            .module_context(NAME)
            .unwrap()
            .downcast::<XLinkWriter>()
            .unwrap()
    }

    #[test]
    fn settings_take_defaults() {
        let settings: WriterSettings =
            parse_settings(DIRECTIVE, &json!({ "element": "parser", "channel": 7 })).unwrap();
        assert_eq!(settings.element, "parser");
        assert_eq!(settings.pad, "src");
        assert_eq!(settings.channel, 7);
        assert_eq!(settings.mode, ChannelMode::Send);
        assert_eq!(settings.fragment_size, DEFAULT_FRAGMENT_SIZE);
    }

    #[test]
    fn malformed_settings_are_fatal() {
        let err = parse_settings::<WriterSettings>(DIRECTIVE, &json!({ "channel": "one" }))
            .unwrap_err();
        assert!(matches!(err, DirectiveError::Fatal(_)));
    }

    #[test]
    fn roi_messages_parse() {
        let message = BusMessage::new(ROI_MESSAGE)
            .with_field("object_id", 3)
            .with_field("classification", 12)
            .with_field("left", 10)
            .with_field("top", 20)
            .with_field("width", 100)
            .with_field("height", 50);
        let record = ObjectRecord::from(Roi::from_message(&message).unwrap());
        assert_eq!(record.object_id, 3);
        assert_eq!(record.classification, 12);
        assert_eq!((record.left, record.top), (10, 20));
        assert_eq!((record.width, record.height), (100, 50));
    }

    #[test]
    fn roi_outside_24_bits_is_refused() {
        let message = BusMessage::new(ROI_MESSAGE)
            .with_field("left", COORDINATE_LIMIT)
            .with_field("top", 0)
            .with_field("width", 1)
            .with_field("height", 1);
        assert!(Roi::from_message(&message).is_err());

        let incomplete = BusMessage::new(ROI_MESSAGE).with_field("left", 1);
        assert!(Roi::from_message(&incomplete).is_err());
    }

    #[test]
    fn buffers_become_detection_packets() {
        let (driver, mut pipeline) = run(json!({
            "module_list": ["xlinkwriter"],
            "xlinkwriter": { "element": "parser", "channel": 9, "stream_id": 2, "fragment_size": 4096 }
        }));
        pipeline.resolve().unwrap();
        pipeline.configure().unwrap();
        pipeline.init_modules().unwrap();
        assert!(driver.is_open(9));
        assert_eq!(driver.mode(9), Some(ChannelMode::Send));

        // No media runtime here, so the pad subscription degrades the module.
        let degraded = pipeline.init_callbacks().unwrap();
        assert_eq!(degraded, [NAME]);
        pipeline.run().unwrap();

        let roi = BusMessage::new(ROI_MESSAGE)
            .with_field("object_id", 1)
            .with_field("left", 4)
            .with_field("top", 5)
            .with_field("width", 6)
            .with_field("height", 7);
        assert_eq!(
            pipeline.bus_message(&roi).unwrap(),
            Routed::Handled(NAME.into())
        );

        let writer = writer(&pipeline);
        writer.send(&BufferView::new(b"frame-0"));
        writer.send(&BufferView::new(b"frame-1"));
        assert_eq!(writer.sent(), 2);

        let writes = driver.writes();
        assert_eq!(writes.len(), 2);
        let first = decode(&writes[0].1).unwrap();
        assert_eq!(first.metadata.stream_id, 2);
        assert_eq!(first.metadata.frame_number, 0);
        assert_eq!(first.objects[0].object_id, 1);
        assert_eq!(first.payload, b"frame-0");
        let second = decode(&writes[1].1).unwrap();
        assert_eq!(second.metadata.frame_number, 1);
        assert!(second.objects[0].is_placeholder());

        pipeline.teardown();
        assert_eq!(pipeline.state(), RunState::TornDown);
        assert!(!driver.is_open(9));
    }

    #[test]
    fn pause_key_stops_sending() {
        let (driver, mut pipeline) = run(json!({
            "module_list": ["mp_xlinkwriter"],
            "xlinkwriter": { "element": "parser" }
        }));
        pipeline.start().unwrap();
        let writer = writer(&pipeline);

        assert_eq!(pipeline.keyshot('p').unwrap(), Routed::Handled(NAME.into()));
        assert!(writer.is_paused());
        writer.send(&BufferView::new(b"dropped"));
        assert!(driver.writes().is_empty());

        pipeline.keyshot('p').unwrap();
        writer.send(&BufferView::new(b"sent"));
        assert_eq!(driver.writes().len(), 1);
        pipeline.teardown();
    }

    #[test]
    fn missing_element_stops_configuration() {
        let (_driver, mut pipeline) = run(json!({
            "module_list": ["mp_xlinkwriter"],
            "xlinkwriter": { "channel": 3 }
        }));
        pipeline.resolve().unwrap();
        assert!(pipeline.configure().is_err());
        pipeline.teardown();
    }

    #[test]
    fn out_of_range_regions_are_not_queued() {
        let writer = XLinkWriter::default();
        let mut record = ObjectRecord::placeholder();
        assert!(writer.queue(record));
        record.width = COORDINATE_LIMIT;
        assert!(!writer.queue(record));
        assert_eq!(writer.pending(), 1);
    }

    #[test]
    fn requeued_regions_keep_their_order_and_limit() {
        let writer = XLinkWriter::default();
        let record = |object_id| ObjectRecord {
            object_id,
            ..ObjectRecord::placeholder()
        };
        for id in 0..200 {
            assert!(writer.queue(record(id)));
        }
        let taken: Vec<ObjectRecord> = (100..=255).map(record).collect();
        let restored = writer.requeue(taken);

        assert_eq!(restored, MAX_OBJECTS);
        let pending = lock(&writer.pending);
        assert_eq!(pending[0].object_id, 100);
        assert_eq!(pending[155].object_id, 255);
        assert_eq!(pending[156].object_id, 0);
        assert_eq!(pending[MAX_OBJECTS - 1].object_id, 98);
    }

    #[test]
    fn pad_buffers_are_sent_until_teardown() {
        let table = crate::MODULES.register_all().unwrap();
        let driver = Arc::new(LoopbackDriver::without_echo());
        let runtime = Arc::new(Taps::default());
        let config = RunConfiguration::from_value(json!({
            "module_list": ["xlinkwriter"],
            "xlinkwriter": { "element": "parser", "channel": 5 }
        }))
        .unwrap();
        let mut pipeline = Pipeline::builder(table, config)
            .link_driver(driver.clone())
            .runtime(runtime.clone())
            .build();
        pipeline.start().unwrap();
        let writer = writer(&pipeline);

        runtime.push(b"frame");
        assert_eq!(writer.sent(), 1);
        assert_eq!(driver.writes().len(), 1);

        pipeline.teardown();
        runtime.push(b"late");
        assert_eq!(driver.writes().len(), 1);
        assert_eq!(Arc::strong_count(&writer), 1);
    }
}
