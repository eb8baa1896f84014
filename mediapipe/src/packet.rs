// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Channel-link packet types.
//!
//! Every unit sent over a channel is framed as:
//!
//! ```text
//! Header:    magic:u8 version:u8 meta_size:u16 package_size:u32         (8 bytes)
//! Metadata:  version:u8 packet_type:u8 stream_id:u8 object_count:u8
//!            frame_number:u32                                            (8 bytes)
//! ObjectRecord × object_count:
//!            reserved:u8 object_id:u8 classification:u16
//!            left:u24 top:u24 width:u24 height:u24                       (16 bytes)
//! payload:   package_size - 8 - meta_size bytes
//! ```
//!
//! Multi-byte fields are little-endian and 24-bit fields are written low byte
//! first. The byte layout is produced by explicit shifts ([`codec`]), never
//! by struct layout.

pub mod codec;
pub mod reassembly;
pub mod writer;

pub use codec::{decode, encode};

/// First byte of every packet.
pub const HEADER_MAGIC: u8 = 0x4D;
/// Header format version understood by this codec.
pub const HEADER_VERSION: u8 = 1;
/// Metadata format version stamped by producers.
pub const METADATA_VERSION: u8 = 1;

/// Encoded size of [`Header`].
pub const HEADER_SIZE: usize = 8;
/// Encoded size of [`Metadata`].
pub const METADATA_SIZE: usize = 8;
/// Encoded size of one [`ObjectRecord`].
pub const OBJECT_RECORD_SIZE: usize = 16;

/// Exclusive upper bound of the 24-bit coordinate fields.
pub const COORDINATE_LIMIT: u32 = 1 << 24;

/// Maximum number of object records in one packet.
pub const MAX_OBJECTS: usize = u8::MAX as usize;

/// Kind of content a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Detection results, optionally with the frame or a crop as payload.
    /// Must carry at least one object record.
    Detection,
    /// Encoded media stream data.
    Video,
    /// Application-defined payload.
    Application,
    /// Any type code this build does not know.
    Other(u8),
}

impl PacketType {
    /// Whether packets of this type may carry zero object records.
    pub fn allows_empty_objects(self) -> bool {
        !matches!(self, PacketType::Detection)
    }
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0 => PacketType::Detection,
            1 => PacketType::Video,
            2 => PacketType::Application,
            other => PacketType::Other(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::Detection => 0,
            PacketType::Video => 1,
            PacketType::Application => 2,
            PacketType::Other(other) => other,
        }
    }
}

/// Fixed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub version: u8,
    /// Size of the metadata block including all object records.
    pub meta_size: u16,
    /// Size of the whole packet including this header.
    pub package_size: u32,
}

impl Header {
    /// Payload length implied by the size fields.
    pub fn payload_len(&self) -> usize {
        (self.package_size as usize).saturating_sub(HEADER_SIZE + self.meta_size as usize)
    }
}

/// Per-frame metadata following the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub version: u8,
    pub packet_type: PacketType,
    pub stream_id: u8,
    /// Number of object records; derived from the record slice when encoding.
    pub object_count: u8,
    pub frame_number: u32,
}

impl Metadata {
    /// Metadata for a new packet; `object_count` is filled in by the encoder.
    pub fn new(packet_type: PacketType, stream_id: u8, frame_number: u32) -> Self {
        Self {
            version: METADATA_VERSION,
            packet_type,
            stream_id,
            object_count: 0,
            frame_number,
        }
    }
}

/// One detected object (region of interest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectRecord {
    pub reserved: u8,
    pub object_id: u8,
    pub classification: u16,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl ObjectRecord {
    /// Synthetic record sent when a detection packet has nothing to report.
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }
}

/// A decoded packet borrowing its payload from the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: Header,
    pub metadata: Metadata,
    pub objects: Vec<ObjectRecord>,
    pub payload: &'a [u8],
}

impl Packet<'_> {
    /// Copies the payload so the packet can outlive the receive buffer.
    pub fn into_owned(self) -> OwnedPacket {
        OwnedPacket {
            header: self.header,
            metadata: self.metadata,
            objects: self.objects,
            payload: self.payload.to_vec(),
        }
    }
}

/// A decoded packet that owns its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPacket {
    pub header: Header,
    pub metadata: Metadata,
    pub objects: Vec<ObjectRecord>,
    pub payload: Vec<u8>,
}
