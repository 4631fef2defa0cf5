//! JSON-RPC framing over bulk packets
//!
//! # Wire format
//!
//! ```text
//! ┌────────────────────────┬────────────┬─────────────────────┬──────────────────┐
//! │ Magic (8B)             │ Length     │ Trailer (22B)       │ Payload          │
//! │ A3 BA D1 10 17 08 00 0C│ (2B LE)    │ 00 00 03 00 ...     │ JSON text + NUL  │
//! └────────────────────────┴────────────┴─────────────────────┴──────────────────┘
//! ```
//!
//! The first 32 bytes form the metadata block. Inbound, the metadata block and the
//! start of the payload share the first packet; the rest of the payload follows in
//! as many packets as needed to reach the declared length.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::handshake::{acknowledge, is_init_signature, read_lead_packet};
use crate::protocol::{
    JSONRPC_VERSION, METADATA_SIZE, METHOD_FLUSH_FORCED, RPC_HEADER_TRAILER, RPC_LENGTH_OFFSET,
    RPC_MAGIC,
};
use crate::reassembly::{ReassemblyBuffer, WriteOutcome};
use crate::transport::{PacketChannel, Transport, TransportError};

/// Errors raised while building an outbound frame
#[derive(Error, Debug)]
pub enum EncodeError {
    /// The serialized request does not fit the 16-bit length field
    #[error("RPC payload of {size} bytes exceeds the 65535 byte frame limit")]
    PayloadTooLarge {
        /// Payload size including the NUL terminator
        size: usize,
    },

    /// The request could not be serialized
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outbound request sequence numbers
///
/// Starts at 0 and advances by one per encoded request, whether or not the
/// request is ever answered.
#[derive(Debug, Default, Clone)]
pub struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    /// Create a counter starting at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next request will carry
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Take the next id
    pub fn advance(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

/// Inbound JSON-RPC message
///
/// Responses, notifications, and echoed requests all decode into this shape;
/// fields the camera adds beyond the JSON-RPC members are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Protocol version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    /// Sequence id echoed from the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Notification or request parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Response result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Response error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Any other members
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RpcMessage {
    /// The echoed id as an integer, if it is one
    pub fn sequence_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// The method name, if any
    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Whether this is the camera's forced-flush notification
    pub fn is_flush_forced(&self) -> bool {
        self.method_name() == Some(METHOD_FLUSH_FORCED)
    }
}

/// Why a decode produced no message
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeFailure {
    /// The metadata packet was too short to carry a length field
    ShortHeader {
        /// Bytes received
        len: usize,
    },
    /// A packet would have written past the declared length
    Overflow {
        /// Declared payload length
        declared: usize,
        /// Bytes written before the offending packet
        offset: usize,
        /// Length of the offending packet
        packet_len: usize,
    },
    /// The payload was not valid UTF-8 JSON
    Malformed {
        /// Payload text (lossily decoded) for diagnostics
        text: String,
        /// Parser error
        reason: String,
    },
    /// The camera kept sending forced-flush notifications
    FlushRetriesExhausted {
        /// Notifications received
        flushes: u32,
    },
}

/// Result of decoding one inbound RPC transfer
#[derive(Debug, Clone, PartialEq)]
pub enum RpcDecode {
    /// A complete message
    Message(RpcMessage),
    /// The metadata block declared a zero-length payload
    Empty,
    /// The camera re-synchronized mid-transfer; the partial message was dropped
    Aborted,
    /// The transfer was corrupt
    Failed(DecodeFailure),
}

impl RpcDecode {
    /// The decoded message, if any
    pub fn into_message(self) -> Option<RpcMessage> {
        match self {
            Self::Message(message) => Some(message),
            Self::Empty | Self::Aborted | Self::Failed(_) => None,
        }
    }
}

/// Build the wire frame for a request with the given id
///
/// # Errors
///
/// Returns `EncodeError::PayloadTooLarge` if the NUL-terminated JSON exceeds 65535
/// bytes, or `EncodeError::Json` if `params` cannot be serialized.
pub fn encode_request(id: u64, method: &str, params: Option<&Value>) -> Result<Vec<u8>, EncodeError> {
    let request = RpcRequest {
        jsonrpc: JSONRPC_VERSION,
        id,
        method,
        params,
    };

    let mut payload = serde_json::to_vec(&request)?;
    payload.push(0x00);

    let len = u16::try_from(payload.len())
        .map_err(|_| EncodeError::PayloadTooLarge { size: payload.len() })?;

    let mut frame = Vec::with_capacity(METADATA_SIZE + payload.len());
    frame.extend_from_slice(&RPC_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&RPC_HEADER_TRAILER);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Allocate the next id from `counter` and build its frame
///
/// The counter advances even when encoding fails.
///
/// # Errors
///
/// See [`encode_request`].
pub fn encode_next(
    counter: &mut SequenceCounter,
    method: &str,
    params: Option<&Value>,
) -> Result<(u64, Vec<u8>), EncodeError> {
    let id = counter.advance();
    let frame = encode_request(id, method, params)?;
    Ok((id, frame))
}

/// Read the declared payload length from a metadata block
#[inline]
pub fn declared_length(metadata: &[u8]) -> Option<usize> {
    let bytes = metadata.get(RPC_LENGTH_OFFSET..RPC_LENGTH_OFFSET + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
}

/// Decode one RPC transfer, skipping forced-flush notifications
///
/// A forced flush means the camera pre-empted the channel and the real response
/// follows, so decoding restarts from a fresh read. At most `max_flush_retries`
/// notifications are skipped.
///
/// # Errors
///
/// Only transport failures are errors; corrupt transfers are reported through
/// [`RpcDecode`].
pub async fn decode_response<T: Transport>(
    channel: &mut PacketChannel<T>,
    max_flush_retries: u32,
) -> Result<RpcDecode, TransportError> {
    let mut flushes = 0;
    loop {
        match decode_frame(channel).await? {
            RpcDecode::Message(message) if message.is_flush_forced() => {
                flushes += 1;
                if flushes > max_flush_retries {
                    log::warn!("Giving up after {} forced flushes", flushes);
                    return Ok(RpcDecode::Failed(DecodeFailure::FlushRetriesExhausted {
                        flushes,
                    }));
                }
                log::debug!("Camera forced a buffer flush, reading again");
            }
            other => return Ok(other),
        }
    }
}

/// Decode a single RPC transfer without flush handling
///
/// The whole 32-byte header must arrive in the lead packet. Header bytes that
/// spill into a later packet are reassembled as payload, so such a transfer
/// overflows its declared length.
///
/// # Errors
///
/// Propagates transport errors.
pub async fn decode_frame<T: Transport>(
    channel: &mut PacketChannel<T>,
) -> Result<RpcDecode, TransportError> {
    let metadata = read_lead_packet(channel).await?;

    let Some(declared) = declared_length(&metadata) else {
        log::warn!("RPC metadata too short: {} bytes", metadata.len());
        return Ok(RpcDecode::Failed(DecodeFailure::ShortHeader {
            len: metadata.len(),
        }));
    };

    if declared == 0 {
        log::debug!("Empty RPC transfer");
        return Ok(RpcDecode::Empty);
    }

    let mut buffer = ReassemblyBuffer::with_len(declared);
    let tail = metadata.get(METADATA_SIZE..).unwrap_or_default();
    if buffer.write_bounded(tail) == WriteOutcome::Overflow {
        return Ok(overflow(declared, 0, tail.len()));
    }

    while !buffer.is_full() {
        let packet = channel.read_packet().await?;

        if is_init_signature(&packet) {
            log::warn!(
                "Camera re-synchronized mid-transfer at {}/{} bytes, dropping message",
                buffer.offset(),
                declared
            );
            acknowledge(channel).await?;
            return Ok(RpcDecode::Aborted);
        }

        if buffer.write_bounded(&packet) == WriteOutcome::Overflow {
            return Ok(overflow(declared, buffer.offset(), packet.len()));
        }
    }

    log::debug!("Reassembled {} byte RPC payload", declared);
    Ok(parse_payload(buffer.written()))
}

fn overflow(declared: usize, offset: usize, packet_len: usize) -> RpcDecode {
    log::warn!(
        "Dropping RPC transfer: {} byte packet at offset {} overflows declared length {}",
        packet_len,
        offset,
        declared
    );
    RpcDecode::Failed(DecodeFailure::Overflow {
        declared,
        offset,
        packet_len,
    })
}

/// Parse a reassembled payload into a message
///
/// Trailing NUL padding and surrounding whitespace are stripped first.
pub fn parse_payload(payload: &[u8]) -> RpcDecode {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => {
            let text = String::from_utf8_lossy(payload).into_owned();
            log::warn!("RPC payload is not UTF-8: {}", text);
            return RpcDecode::Failed(DecodeFailure::Malformed {
                text,
                reason: e.to_string(),
            });
        }
    };

    let text = text.trim_end_matches('\0').trim();
    match serde_json::from_str::<RpcMessage>(text) {
        Ok(message) => RpcDecode::Message(message),
        Err(e) => {
            log::warn!("Failed to parse RPC payload ({}): {}", e, text);
            RpcDecode::Failed(DecodeFailure::Malformed {
                text: text.to_string(),
                reason: e.to_string(),
            })
        }
    }
}
