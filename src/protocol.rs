//! Wire constants for the DXO One USB protocol
//!
//! The camera speaks two kinds of traffic over one pair of bulk endpoints:
//! - JSON-RPC frames: a 32-byte metadata block (magic, length, trailer) then the payload
//! - JPEG live-view payloads: an optional 32-byte metadata block then raw image bytes
//!
//! Both are interleaved with a 32-byte init signature that the camera emits whenever
//! it re-synchronizes; the host must answer it with the ack signature.

/// USB vendor ID of the DXO One
pub const DXO_VENDOR_ID: u16 = 0x2B8F;

/// Maximum size of one bulk packet
pub const MAX_PACKET_SIZE: usize = 512;

/// Size of the metadata block that precedes RPC and JPEG payloads
pub const METADATA_SIZE: usize = 32;

/// Size of a handshake signature
pub const SIGNATURE_SIZE: usize = 32;

/// Signature sent by the camera when it (re)starts a session
pub const INIT_SIGNATURE: [u8; SIGNATURE_SIZE] = [
    0xA3, 0xBA, 0xD1, 0x10, 0xAB, 0xCD, 0xAB, 0xCD, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Signature the host answers the init signature with
pub const ACK_SIGNATURE: [u8; SIGNATURE_SIZE] = [
    0xA3, 0xBA, 0xD1, 0x10, 0xDC, 0xBA, 0xDC, 0xBA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Magic prefix of an RPC metadata block
pub const RPC_MAGIC: [u8; 8] = [0xA3, 0xBA, 0xD1, 0x10, 0x17, 0x08, 0x00, 0x0C];

/// Bytes 10..32 of an outbound RPC metadata block
pub const RPC_HEADER_TRAILER: [u8; 22] = [
    0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Offset of the little-endian payload length inside the metadata block
pub const RPC_LENGTH_OFFSET: usize = 8;

/// Marker that identifies a JPEG metadata block at the start of a lead packet
pub const JPEG_METADATA_MAGIC: [u8; 4] = [0xA3, 0xBA, 0xD1, 0x10];

/// JPEG start-of-image marker as emitted by the camera
pub const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Notification the camera sends after discarding its output buffer
pub const METHOD_FLUSH_FORCED: &str = "dxo_usb_flush_forced";

/// Acknowledgment method for a setting change that was applied
pub const METHOD_SETTING_APPLIED: &str = "dxo_setting_applied";

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";
