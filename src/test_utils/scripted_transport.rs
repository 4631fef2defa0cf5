//! In-memory transport driven by a packet script
//!
//! Reads pop packets from a queue; writes are recorded for assertions. In echo
//! mode every non-handshake write is also queued back as inbound packets, which
//! is how a camera looks when it answers a request with the request itself.

use std::collections::VecDeque;

use crate::protocol::{ACK_SIGNATURE, INIT_SIGNATURE};
use crate::transport::{Transport, TransportError};

/// Transport that replays scripted packets and records writes
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    echo_packet_size: Option<usize>,
    closed: bool,
}

impl ScriptedTransport {
    /// Queue `packets` to be returned by successive reads
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        Self {
            inbound: packets.into(),
            ..Default::default()
        }
    }

    /// Echo every written frame back, split into `packet_size` byte packets
    ///
    /// Handshake signatures are recorded but not echoed.
    pub fn with_echo(mut self, packet_size: usize) -> Self {
        self.echo_packet_size = Some(packet_size.max(1));
        self
    }

    /// Append a packet to the read queue
    pub fn push(&mut self, packet: Vec<u8>) {
        self.inbound.push_back(packet);
    }

    /// Everything written so far, in order
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Packets not yet read
    pub fn remaining(&self) -> usize {
        self.inbound.len()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for ScriptedTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.push(data.to_vec());

        if let Some(size) = self.echo_packet_size {
            if data != ACK_SIGNATURE && data != INIT_SIGNATURE {
                self.inbound
                    .extend(data.chunks(size).map(<[u8]>::to_vec));
            }
        }
        Ok(())
    }

    async fn receive(&mut self, _max_len: usize) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inbound.pop_front().ok_or(TransportError::EndOfStream)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}
