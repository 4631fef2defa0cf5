//! USB packet capture for debugging and offline replay
//!
//! [`CaptureState`] records packets with their endpoint and a timestamp relative
//! to the start of the capture; [`RecordingTransport`] feeds it from a live
//! transport so both directions of a session end up in one file.
//!
//! # File Format
//!
//! `capture_<unix secs>.bin` holds the packets:
//! ```text
//! [u64 LE: timestamp_us][u32 LE: length][u8: endpoint][data bytes]...
//! ```
//! `capture_<unix secs>.json` holds [`CaptureMetadata`].
//!
//! # Example
//!
//! ```ignore
//! let capture = Arc::new(CaptureState::new());
//! capture.start_capture(CaptureMetadata::for_device(DXO_VENDOR_ID, product_id, "live_view"))?;
//!
//! let transport = RecordingTransport::new(usb, Arc::clone(&capture));
//! // ... run a session ...
//!
//! let result = capture.stop_capture(Path::new("/output"))?;
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

use crate::transport::{Transport, TransportError};

/// Endpoint recorded for inbound packets when the real address is unknown
pub const DEFAULT_IN_ENDPOINT: u8 = 0x81;

/// Endpoint recorded for outbound packets when the real address is unknown
pub const DEFAULT_OUT_ENDPOINT: u8 = 0x01;

/// Direction bit of an endpoint address
pub const ENDPOINT_DIR_IN: u8 = 0x80;

/// Errors that can occur during packet capture operations
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Capture is not currently active when trying to stop
    #[error("capture is not active")]
    NotActive,

    /// Capture is already active when trying to start
    #[error("capture is already active")]
    AlreadyActive,

    /// Failed to acquire lock on internal state
    #[error("failed to acquire lock: {0}")]
    LockError(String),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output directory does not exist
    #[error("output directory does not exist: {0}")]
    DirectoryNotFound(String),
}

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Metadata about the capture session and device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// USB vendor ID of the device
    pub vendor_id: u16,
    /// USB product ID of the device
    pub product_id: u16,
    /// What the session was doing (e.g., "rpc", "live_view")
    #[serde(default)]
    pub mode: String,
    /// Total number of packets captured
    #[serde(default)]
    pub total_packets: u64,
    /// Total number of frames decoded during the capture
    #[serde(default)]
    pub total_frames: u64,
    /// Capture duration in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
    /// Total bytes captured
    #[serde(default)]
    pub total_bytes: u64,
    /// Optional description or notes about the capture
    #[serde(default)]
    pub description: String,
}

impl CaptureMetadata {
    /// Metadata for a device and session mode, with zeroed totals
    pub fn for_device(vendor_id: u16, product_id: u16, mode: &str) -> Self {
        Self {
            vendor_id,
            product_id,
            mode: mode.to_string(),
            ..Default::default()
        }
    }
}

/// A single captured packet with timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    /// Timestamp relative to capture start (microseconds)
    pub timestamp_us: u64,
    /// Endpoint address; the high bit marks device-to-host packets
    pub endpoint: u8,
    /// Raw packet data
    pub data: Vec<u8>,
}

impl CapturedPacket {
    /// Whether the packet travelled from the camera to the host
    pub fn is_inbound(&self) -> bool {
        self.endpoint & ENDPOINT_DIR_IN != 0
    }
}

/// Result returned when capture stops successfully
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResult {
    /// Path to the saved packet file
    pub packets_path: String,
    /// Path to the saved metadata file
    pub metadata_path: String,
    /// Summary of the capture session
    pub metadata: CaptureMetadata,
}

/// Thread-safe state for recording USB packets
///
/// Shared between the transport that records and whoever starts and stops the
/// capture.
#[derive(Debug)]
pub struct CaptureState {
    /// Whether capture is currently active
    is_capturing: AtomicBool,
    /// Captured packets
    packets: Mutex<Vec<CapturedPacket>>,
    /// When the capture started
    start_time: Mutex<Option<Instant>>,
    /// Metadata about the capture session
    metadata: Mutex<CaptureMetadata>,
    /// Atomic counter for total packets
    packet_count: AtomicU64,
    /// Atomic counter for total bytes
    byte_count: AtomicU64,
}

impl CaptureState {
    /// Creates a new capture state with no active capture
    #[must_use]
    pub fn new() -> Self {
        Self {
            is_capturing: AtomicBool::new(false),
            packets: Mutex::new(Vec::new()),
            start_time: Mutex::new(None),
            metadata: Mutex::new(CaptureMetadata::default()),
            packet_count: AtomicU64::new(0),
            byte_count: AtomicU64::new(0),
        }
    }

    /// Returns whether capture is currently active
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::Acquire)
    }

    /// Returns the current packet count
    #[must_use]
    pub fn packet_count(&self) -> u64 {
        self.packet_count.load(Ordering::Relaxed)
    }

    /// Returns the current byte count
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.byte_count.load(Ordering::Relaxed)
    }

    /// Starts a new capture session
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::AlreadyActive` if a capture is already in progress.
    /// Returns `CaptureError::LockError` if the internal mutex cannot be acquired.
    pub fn start_capture(&self, metadata: CaptureMetadata) -> Result<()> {
        if self
            .is_capturing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::AlreadyActive);
        }

        self.lock_packets()?.clear();
        self.packet_count.store(0, Ordering::Release);
        self.byte_count.store(0, Ordering::Release);

        *self
            .start_time
            .lock()
            .map_err(|e| CaptureError::LockError(e.to_string()))? = Some(Instant::now());
        *self
            .metadata
            .lock()
            .map_err(|e| CaptureError::LockError(e.to_string()))? = metadata;

        log::info!("Packet capture started");
        Ok(())
    }

    /// Records a packet during capture
    ///
    /// If capture is not active, the packet is silently ignored.
    pub fn record_packet(&self, packet: &[u8], endpoint: u8) {
        if !self.is_capturing.load(Ordering::Acquire) {
            return;
        }

        let timestamp_us = self
            .start_time
            .lock()
            .ok()
            .and_then(|start| start.map(|t| t.elapsed().as_micros() as u64))
            .unwrap_or(0);

        self.packet_count.fetch_add(1, Ordering::Relaxed);
        self.byte_count
            .fetch_add(packet.len() as u64, Ordering::Relaxed);

        if let Ok(mut packets) = self.packets.lock() {
            packets.push(CapturedPacket {
                timestamp_us,
                endpoint,
                data: packet.to_vec(),
            });
        } else {
            log::warn!("Failed to acquire lock for packet recording");
        }
    }

    /// Increments the frame counter in metadata
    pub fn record_frame(&self) {
        if !self.is_capturing.load(Ordering::Acquire) {
            return;
        }

        if let Ok(mut meta) = self.metadata.lock() {
            meta.total_frames += 1;
        }
    }

    /// Stops the capture and saves data to disk
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::NotActive` if no capture is in progress.
    /// Returns `CaptureError::DirectoryNotFound` if the output directory doesn't exist.
    /// Returns `CaptureError::Io` if file operations fail.
    /// Returns `CaptureError::Json` if metadata serialization fails.
    pub fn stop_capture(&self, output_dir: &Path) -> Result<CaptureResult> {
        if self
            .is_capturing
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::NotActive);
        }

        if !output_dir.exists() {
            return Err(CaptureError::DirectoryNotFound(
                output_dir.display().to_string(),
            ));
        }

        let duration_ms = self
            .start_time
            .lock()
            .map_err(|e| CaptureError::LockError(e.to_string()))?
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let total_packets = self.packet_count.load(Ordering::Acquire);
        let total_bytes = self.byte_count.load(Ordering::Acquire);

        let metadata = {
            let mut meta = self
                .metadata
                .lock()
                .map_err(|e| CaptureError::LockError(e.to_string()))?;
            meta.duration_ms = duration_ms;
            meta.total_packets = total_packets;
            meta.total_bytes = total_bytes;
            meta.clone()
        };

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let packets_path = output_dir.join(format!("capture_{}.bin", timestamp));
        let metadata_path = output_dir.join(format!("capture_{}.json", timestamp));

        {
            let packets = self.lock_packets()?;
            write_packets(&packets_path, &packets)?;
        }
        write_metadata(&metadata_path, &metadata)?;

        log::info!(
            "Capture stopped: {} packets, {} bytes, {} ms",
            total_packets,
            total_bytes,
            duration_ms
        );

        Ok(CaptureResult {
            packets_path: packets_path.display().to_string(),
            metadata_path: metadata_path.display().to_string(),
            metadata,
        })
    }

    /// Cancels the current capture without saving
    pub fn cancel_capture(&self) {
        self.is_capturing.store(false, Ordering::Release);
        if let Ok(mut packets) = self.packets.lock() {
            packets.clear();
        }
        log::info!("Capture cancelled");
    }

    fn lock_packets(&self) -> Result<std::sync::MutexGuard<'_, Vec<CapturedPacket>>> {
        self.packets
            .lock()
            .map_err(|e| CaptureError::LockError(e.to_string()))
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport wrapper that records both directions into a [`CaptureState`]
#[derive(Debug)]
pub struct RecordingTransport<T> {
    inner: T,
    state: Arc<CaptureState>,
    in_endpoint: u8,
    out_endpoint: u8,
}

impl<T: Transport> RecordingTransport<T> {
    /// Record traffic of `inner` under the default endpoint addresses
    pub fn new(inner: T, state: Arc<CaptureState>) -> Self {
        Self::with_endpoints(inner, state, DEFAULT_IN_ENDPOINT, DEFAULT_OUT_ENDPOINT)
    }

    /// Record traffic of `inner` under the given endpoint addresses
    pub fn with_endpoints(inner: T, state: Arc<CaptureState>, in_endpoint: u8, out_endpoint: u8) -> Self {
        Self {
            inner,
            state,
            in_endpoint: in_endpoint | ENDPOINT_DIR_IN,
            out_endpoint: out_endpoint & !ENDPOINT_DIR_IN,
        }
    }

    /// Unwrap the recorded transport
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for RecordingTransport<T> {
    async fn send(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.inner.send(data).await?;
        self.state.record_packet(data, self.out_endpoint);
        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> std::result::Result<Vec<u8>, TransportError> {
        let packet = self.inner.receive(max_len).await?;
        self.state.record_packet(&packet, self.in_endpoint);
        Ok(packet)
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.inner.close().await
    }
}

/// Write packets in the capture file format
///
/// # Errors
///
/// Returns `CaptureError::Io` if the file cannot be written.
pub fn write_packets(path: &Path, packets: &[CapturedPacket]) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);

    for packet in packets {
        file.write_all(&packet.timestamp_us.to_le_bytes())?;
        file.write_all(&(packet.data.len() as u32).to_le_bytes())?;
        file.write_all(&[packet.endpoint])?;
        file.write_all(&packet.data)?;
    }

    file.flush()?;
    log::debug!("Saved {} packets to {}", packets.len(), path.display());
    Ok(())
}

/// Save metadata to a JSON file
///
/// # Errors
///
/// Returns `CaptureError::Json` or `CaptureError::Io` on failure.
pub fn write_metadata(path: &Path, metadata: &CaptureMetadata) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(path, json)?;
    log::debug!("Saved metadata to {}", path.display());
    Ok(())
}

/// Reads capture metadata from a JSON file
///
/// # Errors
///
/// Returns `CaptureError::Io` if the file cannot be read.
/// Returns `CaptureError::Json` if the JSON is invalid.
pub fn read_metadata(path: &Path) -> Result<CaptureMetadata> {
    let json = std::fs::read_to_string(path)?;
    let metadata: CaptureMetadata = serde_json::from_str(&json)?;
    Ok(metadata)
}
