// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Producer-side packet framing with per-stream frame numbering.

use std::collections::HashMap;

use crate::{
    error::EncodeError,
    packet::{Metadata, ObjectRecord, PacketType, encode},
};

/// What a producer does with a detection packet that has no objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyDetections {
    /// Send a single [`ObjectRecord::placeholder`] record.
    #[default]
    Placeholder,
    /// Refuse the packet with [`EncodeError::EmptyObjectList`].
    Reject,
}

/// Frames outgoing packets and numbers them per stream.
///
/// Each `stream_id` has its own counter starting at zero. A counter only
/// advances when a packet was actually produced, so frame numbers seen by the
/// receiver are consecutive for every stream. Counters wrap at `u32::MAX`.
///
/// # Examples
///
/// ```
/// use mediapipe::packet::{decode, PacketType, writer::PacketWriter};
///
/// let mut writer = PacketWriter::new();
/// let first = writer.frame(PacketType::Detection, 2, &[], b"a").unwrap();
/// let second = writer.frame(PacketType::Detection, 2, &[], b"b").unwrap();
/// assert_eq!(decode(&first).unwrap().metadata.frame_number, 0);
/// assert_eq!(decode(&second).unwrap().metadata.frame_number, 1);
/// ```
#[derive(Debug, Default)]
pub struct PacketWriter {
    counters: HashMap<u8, u32>,
    empty_detections: EmptyDetections,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the policy for detection packets without objects.
    pub fn with_empty_detections(mut self, policy: EmptyDetections) -> Self {
        self.empty_detections = policy;
        self
    }

    /// Next frame number that will be stamped on `stream_id`.
    pub fn next_frame_number(&self, stream_id: u8) -> u32 {
        self.counters.get(&stream_id).copied().unwrap_or(0)
    }

    /// Encodes one packet for `stream_id` and advances its counter.
    pub fn frame(
        &mut self,
        packet_type: PacketType,
        stream_id: u8,
        objects: &[ObjectRecord],
        payload: &[u8],
    ) -> Result<Vec<u8>, EncodeError> {
        let frame_number = self.next_frame_number(stream_id);
        let metadata = Metadata::new(packet_type, stream_id, frame_number);

        let placeholder = [ObjectRecord::placeholder()];
        let objects = if objects.is_empty()
            && packet_type == PacketType::Detection
            && self.empty_detections == EmptyDetections::Placeholder
        {
            &placeholder[..]
        } else {
            objects
        };

        let bytes = encode(&metadata, objects, payload)?;
        self.counters
            .insert(stream_id, frame_number.wrapping_add(1));
        Ok(bytes)
    }
}
