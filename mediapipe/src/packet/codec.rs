// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Packet encoder and decoder.

use crate::{
    error::{DecodeError, EncodeError},
    packet::{
        COORDINATE_LIMIT, HEADER_MAGIC, HEADER_SIZE, HEADER_VERSION, Header, MAX_OBJECTS,
        METADATA_SIZE, Metadata, OBJECT_RECORD_SIZE, ObjectRecord, Packet, PacketType,
    },
};

/// Encodes metadata, object records and payload into one wire packet.
///
/// `metadata.object_count` is ignored and replaced by `objects.len()`.
/// `PacketType::Other` carrying a known type byte is treated as that type.
///
/// # Errors
///
/// - [`EncodeError::EmptyObjectList`] for a detection packet without objects
/// - [`EncodeError::TooManyObjects`] for more than 255 objects
/// - [`EncodeError::CoordinateOverflow`] for a coordinate `>= 2^24`
/// - [`EncodeError::PacketTooLarge`] if the sizes do not fit the header
///
/// # Examples
///
/// ```
/// use mediapipe::packet::{self, Metadata, ObjectRecord, PacketType};
///
/// let metadata = Metadata::new(PacketType::Detection, 0, 7);
/// let bytes = packet::encode(&metadata, &[ObjectRecord::placeholder()], b"jpeg").unwrap();
/// assert_eq!(bytes.len(), 8 + 8 + 16 + 4);
/// ```
pub fn encode(
    metadata: &Metadata,
    objects: &[ObjectRecord],
    payload: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let packet_type = PacketType::from(u8::from(metadata.packet_type));
    if objects.is_empty() && !packet_type.allows_empty_objects() {
        return Err(EncodeError::EmptyObjectList);
    }
    if objects.len() > MAX_OBJECTS {
        return Err(EncodeError::TooManyObjects(objects.len()));
    }
    for object in objects {
        check_coordinates(object)?;
    }

    let meta_size = METADATA_SIZE + objects.len() * OBJECT_RECORD_SIZE;
    let package_size = HEADER_SIZE + meta_size + payload.len();
    let meta_size_field =
        u16::try_from(meta_size).map_err(|_| EncodeError::PacketTooLarge(package_size))?;
    let package_size_field =
        u32::try_from(package_size).map_err(|_| EncodeError::PacketTooLarge(package_size))?;

    let mut out = Vec::with_capacity(package_size);

    out.push(HEADER_MAGIC);
    out.push(HEADER_VERSION);
    out.extend_from_slice(&meta_size_field.to_le_bytes());
    out.extend_from_slice(&package_size_field.to_le_bytes());

    out.push(metadata.version);
    out.push(packet_type.into());
    out.push(metadata.stream_id);
    out.push(objects.len() as u8);
    out.extend_from_slice(&metadata.frame_number.to_le_bytes());

    for object in objects {
        out.push(object.reserved);
        out.push(object.object_id);
        out.extend_from_slice(&object.classification.to_le_bytes());
        put_u24(&mut out, object.left);
        put_u24(&mut out, object.top);
        put_u24(&mut out, object.width);
        put_u24(&mut out, object.height);
    }

    out.extend_from_slice(payload);
    debug_assert_eq!(out.len(), package_size);
    Ok(out)
}

/// Decodes one wire packet, borrowing the payload from `bytes`.
///
/// Magic and version are validated before any other field is interpreted.
/// Bytes past the declared `package_size` are ignored; the payload content
/// is not validated.
///
/// # Errors
///
/// - [`DecodeError::BadMagic`] / [`DecodeError::BadVersion`] for a foreign header
/// - [`DecodeError::Truncated`] if fewer bytes than declared are available
/// - [`DecodeError::MetaSizeMismatch`] if `meta_size` disagrees with the object count
/// - [`DecodeError::Malformed`] if `package_size` cannot hold header and metadata
pub fn decode(bytes: &[u8]) -> Result<Packet<'_>, DecodeError> {
    if let Some(&magic) = bytes.first()
        && magic != HEADER_MAGIC
    {
        return Err(DecodeError::BadMagic(magic));
    }
    if let Some(&version) = bytes.get(1)
        && version != HEADER_VERSION
    {
        return Err(DecodeError::BadVersion(version));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let header = Header {
        magic: bytes[0],
        version: bytes[1],
        meta_size: u16::from_le_bytes([bytes[2], bytes[3]]),
        package_size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    };

    let meta_size = header.meta_size as usize;
    let package_size = header.package_size as usize;
    if meta_size < METADATA_SIZE || package_size < HEADER_SIZE + meta_size {
        return Err(DecodeError::Malformed(format!(
            "meta_size {meta_size} / package_size {package_size} cannot hold a header and metadata"
        )));
    }
    if bytes.len() < package_size {
        return Err(DecodeError::Truncated {
            needed: package_size,
            available: bytes.len(),
        });
    }

    let meta = &bytes[HEADER_SIZE..HEADER_SIZE + METADATA_SIZE];
    let metadata = Metadata {
        version: meta[0],
        packet_type: PacketType::from(meta[1]),
        stream_id: meta[2],
        object_count: meta[3],
        frame_number: u32::from_le_bytes([meta[4], meta[5], meta[6], meta[7]]),
    };

    let expected = METADATA_SIZE + metadata.object_count as usize * OBJECT_RECORD_SIZE;
    if expected != meta_size {
        return Err(DecodeError::MetaSizeMismatch {
            declared: meta_size,
            expected,
        });
    }

    let records_start = HEADER_SIZE + METADATA_SIZE;
    let objects = bytes[records_start..HEADER_SIZE + meta_size]
        .chunks_exact(OBJECT_RECORD_SIZE)
        .map(read_object)
        .collect();

    Ok(Packet {
        header,
        metadata,
        objects,
        payload: &bytes[HEADER_SIZE + meta_size..package_size],
    })
}

fn check_coordinates(object: &ObjectRecord) -> Result<(), EncodeError> {
    for (field, value) in [
        ("left", object.left),
        ("top", object.top),
        ("width", object.width),
        ("height", object.height),
    ] {
        if value >= COORDINATE_LIMIT {
            return Err(EncodeError::CoordinateOverflow { field, value });
        }
    }
    Ok(())
}

fn put_u24(out: &mut Vec<u8>, value: u32) {
    out.push((value & 0xff) as u8);
    out.push(((value >> 8) & 0xff) as u8);
    out.push(((value >> 16) & 0xff) as u8);
}

fn get_u24(bytes: &[u8]) -> u32 {
    u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16
}

fn read_object(record: &[u8]) -> ObjectRecord {
    ObjectRecord {
        reserved: record[0],
        object_id: record[1],
        classification: u16::from_le_bytes([record[2], record[3]]),
        left: get_u24(&record[4..7]),
        top: get_u24(&record[7..10]),
        width: get_u24(&record[10..13]),
        height: get_u24(&record[13..16]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: u8) -> ObjectRecord {
        ObjectRecord {
            reserved: 0,
            object_id: id,
            classification: 15,
            left: 0x0012_3456,
            top: 10,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn u24_fields_are_low_byte_first() {
        let metadata = Metadata::new(PacketType::Detection, 3, 1);
        let bytes = encode(&metadata, &[person(1)], &[]).unwrap();
        let left = &bytes[HEADER_SIZE + METADATA_SIZE + 4..HEADER_SIZE + METADATA_SIZE + 7];
        assert_eq!(left, &[0x56, 0x34, 0x12]);
    }

    #[test]
    fn header_sizes_follow_object_count() {
        let metadata = Metadata::new(PacketType::Video, 0, 9);
        let payload = vec![0xAB; 100];
        let bytes = encode(&metadata, &[person(1), person(2)], &payload).unwrap();
        let packet = decode(&bytes).unwrap();
        assert_eq!(packet.header.meta_size as usize, 8 + 2 * 16);
        assert_eq!(packet.header.package_size as usize, 8 + 40 + 100);
        assert_eq!(packet.header.payload_len(), 100);
        assert_eq!(packet.metadata.object_count, 2);
    }

    #[test]
    fn detection_packets_need_objects() {
        let metadata = Metadata::new(PacketType::Detection, 0, 0);
        assert_eq!(
            encode(&metadata, &[], b"x"),
            Err(EncodeError::EmptyObjectList)
        );
        let video = Metadata::new(PacketType::Video, 0, 0);
        let packet_bytes = encode(&video, &[], b"x").unwrap();
        assert!(decode(&packet_bytes).unwrap().objects.is_empty());
    }

    #[test]
    fn oversized_coordinates_are_rejected() {
        let metadata = Metadata::new(PacketType::Detection, 0, 0);
        let mut object = person(1);
        object.height = COORDINATE_LIMIT;
        assert_eq!(
            encode(&metadata, &[object], &[]),
            Err(EncodeError::CoordinateOverflow {
                field: "height",
                value: COORDINATE_LIMIT
            })
        );
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let metadata = Metadata::new(PacketType::Application, 1, 2);
        let mut bytes = encode(&metadata, &[], b"abc").unwrap();
        bytes.extend_from_slice(b"garbage");
        assert_eq!(decode(&bytes).unwrap().payload, b"abc");
    }

    #[test]
    fn inconsistent_meta_size_is_rejected() {
        let metadata = Metadata::new(PacketType::Detection, 0, 0);
        let mut bytes = encode(&metadata, &[person(1)], &[]).unwrap();
        // Claim two objects while only one record is present.
        bytes[HEADER_SIZE + 3] = 2;
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::MetaSizeMismatch {
                declared: 24,
                expected: 40
            })
        );
    }

    #[test]
    fn unknown_packet_types_survive() {
        let metadata = Metadata::new(PacketType::Other(0x7f), 0, 0);
        let bytes = encode(&metadata, &[], &[]).unwrap();
        assert_eq!(
            decode(&bytes).unwrap().metadata.packet_type,
            PacketType::Other(0x7f)
        );
    }

    #[test]
    fn other_with_a_known_byte_is_the_known_type() {
        let detection = Metadata::new(PacketType::Other(0), 0, 0);
        assert_eq!(
            encode(&detection, &[], b"x"),
            Err(EncodeError::EmptyObjectList)
        );

        let video = Metadata::new(PacketType::Other(1), 0, 0);
        let bytes = encode(&video, &[], b"x").unwrap();
        assert_eq!(decode(&bytes).unwrap().metadata.packet_type, PacketType::Video);
    }
}
