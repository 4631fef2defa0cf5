//! Packet transport abstraction
//!
//! The protocol engine only needs two primitives from the device: write a buffer and
//! read one packet of at most `max_len` bytes. Opening the device and claiming its
//! endpoints happens when a concrete transport is constructed (see `usb` and `replay`).
//!
//! [`PacketChannel`] wraps a transport with the per-session packet size and the
//! optional read deadline so the codecs never deal with either.

use std::time::Duration;
use thiserror::Error;

use crate::config::SessionConfig;

/// Errors surfaced by a transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// No matching device was found
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device was disconnected or the endpoint stalled
    #[error("USB transfer failed: {0}")]
    Transfer(String),

    /// A read did not complete within the configured deadline
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// A replayed or scripted stream has no packets left
    #[error("end of packet stream")]
    EndOfStream,

    /// The transport was already closed
    #[error("transport is closed")]
    Closed,

    /// I/O error from the underlying handle
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw packet I/O against the camera's bulk endpoints
///
/// Reads and writes are suspension points; a transport is driven by exactly one
/// session at a time.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Write `data` to the OUT endpoint, completing once it has been accepted
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read one packet of at most `max_len` bytes from the IN endpoint
    async fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Release the device
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A transport bound to the session's packet size and read deadline
#[derive(Debug)]
pub struct PacketChannel<T> {
    transport: T,
    max_packet_size: usize,
    read_timeout: Option<Duration>,
}

impl<T: Transport> PacketChannel<T> {
    /// Wrap `transport` using the packet size and deadline from `config`
    pub fn new(transport: T, config: &SessionConfig) -> Self {
        Self {
            transport,
            max_packet_size: config.max_packet_size,
            read_timeout: config.read_timeout,
        }
    }

    /// Read a single packet
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Timeout` if a read deadline is configured and expires,
    /// or whatever error the underlying transport reports.
    pub async fn read_packet(&mut self) -> Result<Vec<u8>, TransportError> {
        let max_len = self.max_packet_size;
        match self.read_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.transport.receive(max_len))
                .await
                .map_err(|_| TransportError::Timeout(deadline))?,
            None => self.transport.receive(max_len).await,
        }
    }

    /// Write a buffer
    ///
    /// # Errors
    ///
    /// Propagates the underlying transport error.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.transport.send(data).await
    }

    /// Close the underlying transport
    ///
    /// # Errors
    ///
    /// Propagates the underlying transport error.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close().await
    }

    /// Maximum bytes requested per read
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Unwrap the underlying transport
    pub fn into_inner(self) -> T {
        self.transport
    }
}
