// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Receiver-side packet reassembly.
//!
//! A sender splits each packet into fragments of at most the channel's
//! fragment size, and the driver delivers those fragments as separate
//! messages. [`Reassembler`] buffers them until the header's `package_size`
//! bytes are present and then yields the complete packet bytes.

use crate::{
    error::DecodeError,
    packet::{HEADER_MAGIC, HEADER_SIZE, HEADER_VERSION, METADATA_SIZE},
};

/// Largest `package_size` a [`Reassembler`] accepts unless configured otherwise.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Accumulates channel messages into whole packets.
///
/// A buffer that does not start with a valid header cannot be resynchronized
/// safely, so it is discarded and the error is reported once. The same
/// happens to a header whose sizes are inconsistent or whose `package_size`
/// exceeds the configured maximum, so one bad header never holds back the
/// packets that follow it.
///
/// # Examples
///
/// ```
/// use mediapipe::packet::{self, reassembly::Reassembler, Metadata, PacketType};
///
/// let bytes = packet::encode(&Metadata::new(PacketType::Video, 0, 0), &[], &[9; 20]).unwrap();
/// let mut reassembler = Reassembler::new();
/// reassembler.push(&bytes[..10]);
/// assert!(reassembler.next_packet().is_none());
/// reassembler.push(&bytes[10..]);
/// assert_eq!(reassembler.next_packet().unwrap().unwrap(), bytes);
/// ```
#[derive(Debug)]
pub struct Reassembler {
    buffer: Vec<u8>,
    max_packet_size: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest `package_size` accepted from a header.
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Appends one received message.
    pub fn push(&mut self, message: &[u8]) {
        self.buffer.extend_from_slice(message);
    }

    /// Bytes buffered towards the next packet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Takes the next complete packet out of the buffer.
    ///
    /// Returns `None` while more bytes are needed.
    ///
    /// # Errors
    ///
    /// [`DecodeError::BadMagic`] or [`DecodeError::BadVersion`] if the
    /// buffered bytes do not start with a packet header, and
    /// [`DecodeError::Malformed`] if the declared sizes cannot hold a header
    /// and metadata or exceed the maximum packet size. The buffer is cleared
    /// in each case.
    pub fn next_packet(&mut self) -> Option<Result<Vec<u8>, DecodeError>> {
        if let Some(&magic) = self.buffer.first()
            && magic != HEADER_MAGIC
        {
            self.buffer.clear();
            return Some(Err(DecodeError::BadMagic(magic)));
        }
        if let Some(&version) = self.buffer.get(1)
            && version != HEADER_VERSION
        {
            self.buffer.clear();
            return Some(Err(DecodeError::BadVersion(version)));
        }
        if self.buffer.len() < HEADER_SIZE {
            return None;
        }

        let meta_size = u16::from_le_bytes([self.buffer[2], self.buffer[3]]) as usize;
        let package_size = u32::from_le_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ]) as usize;
        if meta_size < METADATA_SIZE || package_size < HEADER_SIZE + meta_size {
            self.buffer.clear();
            return Some(Err(DecodeError::Malformed(format!(
                "meta_size {meta_size} / package_size {package_size} cannot hold a header and metadata"
            ))));
        }
        if package_size > self.max_packet_size {
            self.buffer.clear();
            return Some(Err(DecodeError::Malformed(format!(
                "package size {package_size} exceeds the limit of {}",
                self.max_packet_size
            ))));
        }
        if self.buffer.len() < package_size {
            return None;
        }

        let rest = self.buffer.split_off(package_size);
        Some(Ok(std::mem::replace(&mut self.buffer, rest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Metadata, PacketType, encode};

    fn video(len: usize, frame_number: u32) -> Vec<u8> {
        encode(&Metadata::new(PacketType::Video, 1, frame_number), &[], &vec![0xAB; len]).unwrap()
    }

    #[test]
    fn yields_back_to_back_packets() {
        let first = video(3, 0);
        let second = video(5, 1);
        let mut joined = first.clone();
        joined.extend_from_slice(&second);

        let mut reassembler = Reassembler::new();
        reassembler.push(&joined);
        assert_eq!(reassembler.next_packet(), Some(Ok(first)));
        assert_eq!(reassembler.next_packet(), Some(Ok(second)));
        assert_eq!(reassembler.next_packet(), None);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn waits_for_the_declared_size() {
        let packet = video(100, 0);
        let mut reassembler = Reassembler::new();
        for fragment in packet.chunks(32) {
            assert_eq!(reassembler.next_packet(), None);
            reassembler.push(fragment);
        }
        assert_eq!(reassembler.next_packet(), Some(Ok(packet)));
    }

    #[test]
    fn garbage_is_dropped() {
        let mut reassembler = Reassembler::new();
        reassembler.push(&[0x00, 0x01, 0x02]);
        assert_eq!(reassembler.next_packet(), Some(Err(DecodeError::BadMagic(0))));
        assert_eq!(reassembler.pending(), 0);

        reassembler.push(&[HEADER_MAGIC, 9]);
        assert_eq!(reassembler.next_packet(), Some(Err(DecodeError::BadVersion(9))));
    }

    #[test]
    fn oversized_header_does_not_stall_later_packets() {
        let mut reassembler = Reassembler::new().with_max_packet_size(4096);
        reassembler.push(&[HEADER_MAGIC, HEADER_VERSION, 8, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            reassembler.next_packet(),
            Some(Err(DecodeError::Malformed(_)))
        ));
        assert_eq!(reassembler.pending(), 0);

        let mut delivered = 0;
        for frame_number in 0..100 {
            reassembler.push(&video(1000, frame_number));
            while let Some(packet) = reassembler.next_packet() {
                assert_eq!(packet.unwrap().len(), 1016);
                delivered += 1;
            }
        }
        assert_eq!(delivered, 100);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn inconsistent_sizes_are_dropped() {
        let mut reassembler = Reassembler::new();
        // meta_size smaller than the metadata block
        reassembler.push(&[HEADER_MAGIC, HEADER_VERSION, 4, 0, 64, 0, 0, 0]);
        assert!(matches!(
            reassembler.next_packet(),
            Some(Err(DecodeError::Malformed(_)))
        ));
        // package_size smaller than header plus metadata
        reassembler.push(&[HEADER_MAGIC, HEADER_VERSION, 24, 0, 20, 0, 0, 0]);
        assert!(matches!(
            reassembler.next_packet(),
            Some(Err(DecodeError::Malformed(_)))
        ));
        assert_eq!(reassembler.pending(), 0);

        let packet = video(10, 0);
        reassembler.push(&packet);
        assert_eq!(reassembler.next_packet(), Some(Ok(packet)));
    }
}
