//! Synthetic packet generation for testing
//!
//! Builds wire packets with known payloads: RPC answers split the way the camera
//! splits them, and JPEG payloads with or without the metadata block.
//!
//! # Example
//!
//! ```rust,ignore
//! use dxo_link::test_utils::{synthetic_jpeg, PacketGenerator};
//!
//! let gen = PacketGenerator::default();
//!
//! // A status answer as it arrives over USB
//! let packets = gen.rpc_packets(&json!({"id": 0, "result": {}}));
//!
//! // A 4 KiB live-view payload
//! let packets = gen.jpeg_packets(&synthetic_jpeg(4096));
//! ```

use serde_json::Value;

use crate::protocol::{
    JPEG_EOI, JPEG_METADATA_MAGIC, MAX_PACKET_SIZE, METADATA_SIZE, RPC_HEADER_TRAILER, RPC_MAGIC,
};

/// Offset in [`minimal_jpeg`] right after the APP0 segment
const AFTER_APP0: usize = 20;

/// Largest comment segment body used for padding
const MAX_COMMENT_BODY: usize = 60_000;

/// Splits frames into device-sized packets
#[derive(Debug, Clone)]
pub struct PacketGenerator {
    /// Largest packet produced
    max_packet_size: usize,
}

impl Default for PacketGenerator {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

impl PacketGenerator {
    /// Create a generator producing packets of at most `max_packet_size` bytes
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size: max_packet_size.max(JPEG_EOI.len()),
        }
    }

    /// Largest packet produced
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Frame a JSON value the way the camera frames its answers
    pub fn rpc_frame(&self, message: &Value) -> Vec<u8> {
        let mut payload = message.to_string().into_bytes();
        payload.push(0x00);

        let mut frame = RPC_MAGIC.to_vec();
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&RPC_HEADER_TRAILER);
        frame.extend_from_slice(&payload);
        frame
    }

    /// Frame a JSON value and split it into packets
    pub fn rpc_packets(&self, message: &Value) -> Vec<Vec<u8>> {
        self.rpc_frame(message)
            .chunks(self.max_packet_size)
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Packets for one JPEG payload led by the 32-byte metadata block
    ///
    /// The EOI marker never shares the lead packet and never straddles a
    /// packet boundary.
    pub fn jpeg_packets(&self, image: &[u8]) -> Vec<Vec<u8>> {
        let mut lead = metadata_block();
        let room = self.max_packet_size.saturating_sub(METADATA_SIZE);
        let lead_len = room.min(image.len().saturating_sub(JPEG_EOI.len()));
        lead.extend_from_slice(&image[..lead_len]);

        let mut packets = vec![lead];
        packets.extend(self.split_tail(&image[lead_len..]));
        packets
    }

    /// Packets for one JPEG payload without a metadata block
    pub fn split_image(&self, image: &[u8]) -> Vec<Vec<u8>> {
        let lead_len = self
            .max_packet_size
            .min(image.len().saturating_sub(JPEG_EOI.len()));

        let mut packets = vec![image[..lead_len].to_vec()];
        packets.extend(self.split_tail(&image[lead_len..]));
        packets
    }

    fn split_tail(&self, tail: &[u8]) -> Vec<Vec<u8>> {
        let mut packets: Vec<Vec<u8>> = tail
            .chunks(self.max_packet_size)
            .map(<[u8]>::to_vec)
            .collect();

        // Keep the EOI marker inside one packet
        if let [.., previous, last] = packets.as_mut_slice() {
            if last.len() < JPEG_EOI.len() {
                if let Some(byte) = previous.pop() {
                    last.insert(0, byte);
                }
            }
        }
        packets
    }
}

/// Metadata block that leads a JPEG payload
pub fn metadata_block() -> Vec<u8> {
    let mut block = JPEG_METADATA_MAGIC.to_vec();
    block.resize(METADATA_SIZE, 0x00);
    block
}

/// A valid 8x8 grayscale baseline JPEG
pub fn minimal_jpeg() -> Vec<u8> {
    let mut jpeg = Vec::new();

    // SOI
    jpeg.extend_from_slice(&[0xFF, 0xD8]);

    // APP0 (JFIF)
    jpeg.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, // APP0, length
        0x4A, 0x46, 0x49, 0x46, 0x00, // "JFIF\0"
        0x01, 0x01, // version 1.1
        0x00, // no units
        0x00, 0x01, // X density
        0x00, 0x01, // Y density
        0x00, 0x00, // no thumbnail
    ]);

    // DQT, all 16s
    jpeg.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    jpeg.extend_from_slice(&[16u8; 64]);

    // SOF0: 8x8, one component
    jpeg.extend_from_slice(&[
        0xFF, 0xC0, 0x00, 0x0B, // SOF0, length
        0x08, // precision
        0x00, 0x08, // height
        0x00, 0x08, // width
        0x01, // components
        0x01, 0x11, 0x00, // id 1, 1x1 sampling, quant table 0
    ]);

    // DHT, DC luminance
    jpeg.extend_from_slice(&[
        0xFF, 0xC4, 0x00, 0x1F, 0x00, // DHT, length, DC table 0
        0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, // code counts
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
    ]);

    // DHT, AC luminance (standard table)
    jpeg.extend_from_slice(&[
        0xFF, 0xC4, 0x00, 0xB5, 0x10, // DHT, length, AC table 0
        0x00, 0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05, 0x04, 0x04, 0x00, 0x00, 0x01,
        0x7D, // code counts
        0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61,
        0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08, 0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52,
        0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x25,
        0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45,
        0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64,
        0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x83,
        0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99,
        0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6,
        0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3,
        0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8,
        0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
    ]);

    // SOS
    jpeg.extend_from_slice(&[
        0xFF, 0xDA, 0x00, 0x08, // SOS, length
        0x01, // components
        0x01, 0x00, // component 1: DC table 0, AC table 0
        0x00, 0x3F, 0x00, // spectral selection, approximation
    ]);

    // Entropy-coded gray block
    jpeg.extend_from_slice(&[0xFB, 0xD3, 0x28, 0xA2, 0x80, 0x00]);

    // EOI
    jpeg.extend_from_slice(&[0xFF, 0xD9]);

    jpeg
}

/// A valid JPEG padded to `len` bytes with comment segments
///
/// The filler never contains `0xFF`, so the only SOI and EOI markers are the
/// real ones. Sizes below `minimal_jpeg().len() + 4` round up to the smallest
/// size that fits one comment segment.
pub fn synthetic_jpeg(len: usize) -> Vec<u8> {
    let base = minimal_jpeg();
    let mut needed = len.saturating_sub(base.len());
    if needed == 0 {
        return base;
    }

    let mut padding = Vec::with_capacity(needed.max(4));
    let mut filler = 0usize;
    while needed > 0 {
        let body = if needed <= MAX_COMMENT_BODY + 4 {
            needed.saturating_sub(4)
        } else if needed < MAX_COMMENT_BODY + 8 {
            // Leave room for a whole segment after this one
            MAX_COMMENT_BODY - 4
        } else {
            MAX_COMMENT_BODY
        };

        padding.extend_from_slice(&[0xFF, 0xFE]);
        padding.extend_from_slice(&((body + 2) as u16).to_be_bytes());
        for _ in 0..body {
            padding.push((filler % 251) as u8);
            filler += 1;
        }
        needed = needed.saturating_sub(body + 4);
    }

    let mut jpeg = Vec::with_capacity(base.len() + padding.len());
    jpeg.extend_from_slice(&base[..AFTER_APP0]);
    jpeg.extend_from_slice(&padding);
    jpeg.extend_from_slice(&base[AFTER_APP0..]);
    jpeg
}
