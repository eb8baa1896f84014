// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the packet codec and the producer/consumer helpers.

use mediapipe::{
    error::{DecodeError, EncodeError},
    packet::{
        self, COORDINATE_LIMIT, HEADER_MAGIC, HEADER_VERSION, MAX_OBJECTS, Metadata,
        OBJECT_RECORD_SIZE, ObjectRecord, PacketType,
        reassembly::Reassembler,
        writer::{EmptyDetections, PacketWriter},
    },
};
use proptest::prelude::*;

fn objects(count: usize) -> Vec<ObjectRecord> {
    (0..count)
        .map(|i| ObjectRecord {
            reserved: 0,
            object_id: i as u8,
            classification: (i * 3) as u16,
            left: (i as u32) << 16,
            top: 0x00FF_FFFF - i as u32,
            width: 1920,
            height: 1080,
        })
        .collect()
}

#[test]
fn round_trip_preserves_everything() {
    let cases = [
        (PacketType::Detection, 1, 0),
        (PacketType::Detection, 255, 17),
        (PacketType::Video, 0, 4096),
        (PacketType::Application, 3, 1),
        (PacketType::Other(200), 0, 0),
    ];
    for (packet_type, count, payload_len) in cases {
        let metadata = Metadata::new(packet_type, 4, 0xDEAD_BEEF);
        let records = objects(count);
        let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();

        let bytes = packet::encode(&metadata, &records, &payload).unwrap();
        let decoded = packet::decode(&bytes).unwrap();

        assert_eq!(decoded.metadata.packet_type, packet_type);
        assert_eq!(decoded.metadata.stream_id, 4);
        assert_eq!(decoded.metadata.frame_number, 0xDEAD_BEEF);
        assert_eq!(decoded.metadata.object_count as usize, count);
        assert_eq!(decoded.objects, records);
        assert_eq!(decoded.payload, payload.as_slice());
    }
}

#[test]
fn size_fields_are_consistent() {
    for count in [1, 2, 10, MAX_OBJECTS] {
        let bytes = packet::encode(
            &Metadata::new(PacketType::Detection, 0, 0),
            &objects(count),
            &[7; 33],
        )
        .unwrap();
        let header = packet::decode(&bytes).unwrap().header;
        assert_eq!(header.meta_size as usize, 8 + count * OBJECT_RECORD_SIZE);
        assert_eq!(header.package_size as usize, 8 + header.meta_size as usize + 33);
        assert_eq!(header.package_size as usize, bytes.len());
    }
}

#[test]
fn every_short_prefix_is_truncated() {
    let bytes = packet::encode(
        &Metadata::new(PacketType::Detection, 1, 1),
        &objects(2),
        b"payload",
    )
    .unwrap();
    for len in 0..bytes.len() {
        match packet::decode(&bytes[..len]) {
            Err(DecodeError::Truncated { available, .. }) => assert_eq!(available, len),
            other => panic!("prefix of {len} bytes decoded as {other:?}"),
        }
    }
}

#[test]
fn foreign_headers_are_rejected_first() {
    let mut bytes = packet::encode(&Metadata::new(PacketType::Video, 0, 0), &[], b"x").unwrap();

    bytes[0] = 0x4E;
    assert_eq!(packet::decode(&bytes), Err(DecodeError::BadMagic(0x4E)));
    assert_eq!(packet::decode(&bytes[..1]), Err(DecodeError::BadMagic(0x4E)));

    bytes[0] = HEADER_MAGIC;
    bytes[1] = HEADER_VERSION + 1;
    assert_eq!(
        packet::decode(&bytes[..2]),
        Err(DecodeError::BadVersion(HEADER_VERSION + 1))
    );
}

#[test]
fn undersized_package_is_malformed() {
    let mut bytes = packet::encode(&Metadata::new(PacketType::Video, 0, 0), &[], b"abc").unwrap();
    bytes[4..8].copy_from_slice(&10u32.to_le_bytes());
    assert!(matches!(
        packet::decode(&bytes),
        Err(DecodeError::Malformed(_))
    ));
}

#[test]
fn object_limit_is_enforced() {
    let err = packet::encode(
        &Metadata::new(PacketType::Detection, 0, 0),
        &objects(MAX_OBJECTS + 1),
        &[],
    )
    .unwrap_err();
    assert_eq!(err, EncodeError::TooManyObjects(MAX_OBJECTS + 1));
}

#[test]
fn writer_numbers_frames_per_stream() {
    let mut writer = PacketWriter::new();
    let mut frame = |stream| {
        let bytes = writer
            .frame(PacketType::Detection, stream, &[], b"frame")
            .unwrap();
        let packet = packet::decode(&bytes).unwrap();
        assert_eq!(packet.objects, [ObjectRecord::placeholder()]);
        packet.metadata.frame_number
    };
    assert_eq!(frame(0), 0);
    assert_eq!(frame(0), 1);
    assert_eq!(frame(1), 0);
    assert_eq!(frame(0), 2);
}

#[test]
fn rejecting_writer_does_not_advance() {
    let mut writer = PacketWriter::new().with_empty_detections(EmptyDetections::Reject);
    assert_eq!(
        writer.frame(PacketType::Detection, 0, &[], b"x"),
        Err(EncodeError::EmptyObjectList)
    );
    assert_eq!(writer.next_frame_number(0), 0);
    writer
        .frame(PacketType::Detection, 0, &objects(1), b"x")
        .unwrap();
    assert_eq!(writer.next_frame_number(0), 1);
}

#[test]
fn fragments_reassemble_into_packets() {
    let mut writer = PacketWriter::new();
    let first = writer.frame(PacketType::Video, 2, &[], &[1; 300]).unwrap();
    let second = writer.frame(PacketType::Video, 2, &[], &[2; 10]).unwrap();
    let mut stream = first.clone();
    stream.extend_from_slice(&second);

    let mut reassembler = Reassembler::new();
    let mut packets = Vec::new();
    for fragment in stream.chunks(64) {
        reassembler.push(fragment);
        while let Some(packet) = reassembler.next_packet() {
            packets.push(packet.unwrap());
        }
    }
    assert_eq!(packets, [first, second]);
    assert_eq!(reassembler.pending(), 0);
}

fn arb_metadata() -> impl Strategy<Value = Metadata> {
    (any::<u8>(), any::<u8>(), any::<u8>(), any::<u32>()).prop_map(
        |(version, packet_type, stream_id, frame_number)| Metadata {
            version,
            packet_type: PacketType::from(packet_type),
            stream_id,
            object_count: 0,
            frame_number,
        },
    )
}

fn arb_object() -> impl Strategy<Value = ObjectRecord> {
    (
        any::<u8>(),
        any::<u8>(),
        any::<u16>(),
        [0..COORDINATE_LIMIT, 0..COORDINATE_LIMIT, 0..COORDINATE_LIMIT, 0..COORDINATE_LIMIT],
    )
        .prop_map(
            |(reserved, object_id, classification, [left, top, width, height])| ObjectRecord {
                reserved,
                object_id,
                classification,
                left,
                top,
                width,
                height,
            },
        )
}

proptest! {
    #[test]
    fn any_valid_packet_round_trips(
        metadata in arb_metadata(),
        records in prop::collection::vec(arb_object(), 0..=MAX_OBJECTS),
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let encoded = packet::encode(&metadata, &records, &payload);
        if records.is_empty() && metadata.packet_type == PacketType::Detection {
            prop_assert_eq!(encoded, Err(EncodeError::EmptyObjectList));
            return Ok(());
        }
        let bytes = encoded.unwrap();
        let decoded = packet::decode(&bytes).unwrap();

        prop_assert_eq!(decoded.metadata.version, metadata.version);
        prop_assert_eq!(decoded.metadata.packet_type, metadata.packet_type);
        prop_assert_eq!(decoded.metadata.stream_id, metadata.stream_id);
        prop_assert_eq!(decoded.metadata.frame_number, metadata.frame_number);
        prop_assert_eq!(decoded.metadata.object_count as usize, records.len());
        prop_assert_eq!(&decoded.objects, &records);
        prop_assert_eq!(decoded.payload, payload.as_slice());
    }

    #[test]
    fn sizes_add_up(
        metadata in arb_metadata(),
        records in prop::collection::vec(arb_object(), 1..=MAX_OBJECTS),
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let bytes = packet::encode(&metadata, &records, &payload).unwrap();
        let header = packet::decode(&bytes).unwrap().header;

        prop_assert_eq!(header.meta_size as usize, 8 + records.len() * OBJECT_RECORD_SIZE);
        prop_assert_eq!(
            header.package_size as usize,
            8 + header.meta_size as usize + payload.len()
        );
        prop_assert_eq!(header.package_size as usize, bytes.len());
    }

    #[test]
    fn every_prefix_of_any_packet_is_truncated(
        metadata in arb_metadata(),
        records in prop::collection::vec(arb_object(), 1..=16),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let bytes = packet::encode(&metadata, &records, &payload).unwrap();
        for len in 0..bytes.len() {
            match packet::decode(&bytes[..len]) {
                Err(DecodeError::Truncated { available, .. }) => prop_assert_eq!(available, len),
                other => prop_assert!(false, "prefix of {} bytes decoded as {:?}", len, other),
            }
        }
    }
}
