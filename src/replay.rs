//! USB packet replay for testing without a camera
//!
//! Loads packets recorded by [`crate::capture`] and serves the inbound ones
//! through [`ReplayTransport`], so the same protocol code that drives a real
//! camera can be run against a capture file.
//!
//! # File Format
//!
//! ```text
//! [u64 LE: timestamp_us][u32 LE: length][u8: endpoint][data bytes]...
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::path::Path;
//! use dxo_link::replay::replay_live_view_frames;
//!
//! let frames = replay_live_view_frames(Path::new("capture_12345.bin"), &config).await?;
//! println!("Replayed {} frames", frames.len());
//! ```

use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::capture::{read_metadata, CaptureMetadata, CapturedPacket};
use crate::config::SessionConfig;
use crate::frame_validation::{validate_jpeg_frame, ValidationLevel};
use crate::jpeg::read_jpeg_payload;
use crate::live_view::{run_live_view, LiveViewStitcher, LiveViewStopper};
use crate::transport::{PacketChannel, Transport, TransportError};

/// Largest packet accepted from a capture file
const MAX_CAPTURED_PACKET: usize = 1024 * 1024;

/// Errors that can occur during packet replay operations
#[derive(Error, Debug)]
pub enum ReplayError {
    /// File not found or cannot be opened
    #[error("failed to open file: {0}")]
    FileOpen(#[from] std::io::Error),

    /// Invalid or corrupted packet data in the capture file
    #[error("invalid packet data at offset {offset}: {message}")]
    InvalidPacket {
        /// Byte offset in the capture file where the error occurred
        offset: u64,
        /// Description of the error
        message: String,
    },

    /// The replayed stream failed for a reason other than running out of packets
    #[error("replay transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias for replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Configuration for packet replay
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Playback speed multiplier (1.0 = realtime, 2.0 = 2x speed, 0.0 = as fast as possible)
    pub speed: f64,
    /// Whether to loop the replay when reaching the end
    pub loop_playback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 0.0,
            loop_playback: false,
        }
    }
}

/// A loaded capture file
#[derive(Debug, Clone)]
pub struct PacketReplay {
    /// Every recorded packet, both directions
    packets: Vec<CapturedPacket>,
    /// Optional metadata from the capture session
    metadata: Option<CaptureMetadata>,
}

impl PacketReplay {
    /// Load captured packets from a binary file
    ///
    /// Companion metadata is picked up from `<name>.json`, or from
    /// `metadata_<id>.json` for a file named `capture_<id>.bin`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::FileOpen` if the file cannot be opened.
    /// Returns `ReplayError::InvalidPacket` if the file contains corrupted data.
    pub fn load(path: &Path) -> Result<Self> {
        let packets = read_capture(path)?;
        let metadata = try_load_metadata(path);

        log::info!("Loaded {} packets from {}", packets.len(), path.display());

        if let Some(ref meta) = metadata {
            log::info!(
                "Metadata: {:04x}:{:04x} {}, {} frames, {} ms",
                meta.vendor_id,
                meta.product_id,
                meta.mode,
                meta.total_frames,
                meta.duration_ms
            );
        }

        Ok(Self { packets, metadata })
    }

    /// Get the loaded metadata, if available
    #[must_use]
    pub fn metadata(&self) -> Option<&CaptureMetadata> {
        self.metadata.as_ref()
    }

    /// Get the number of loaded packets
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// Get the total duration of the capture in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.packets
            .last()
            .map(|p| p.timestamp_us / 1000)
            .unwrap_or(0)
    }

    /// All packets in recording order
    pub fn packets(&self) -> &[CapturedPacket] {
        &self.packets
    }

    /// Camera-to-host packets in recording order
    pub fn inbound(&self) -> impl Iterator<Item = &CapturedPacket> {
        self.packets.iter().filter(|p| p.is_inbound())
    }

    /// A transport serving the inbound packets
    pub fn into_transport(self, config: ReplayConfig) -> ReplayTransport {
        ReplayTransport::new(
            self.packets.into_iter().filter(CapturedPacket::is_inbound).collect(),
            config,
        )
    }
}

/// Transport that serves captured packets in order
///
/// Writes are recorded and otherwise ignored. Once every packet has been read
/// (and looping is off), reads fail with `TransportError::EndOfStream`.
#[derive(Debug)]
pub struct ReplayTransport {
    packets: Vec<CapturedPacket>,
    cursor: usize,
    config: ReplayConfig,
    started: Option<Instant>,
    sent: Vec<Vec<u8>>,
    queued: VecDeque<Vec<u8>>,
}

impl ReplayTransport {
    /// Serve `packets` as the camera's output
    pub fn new(packets: Vec<CapturedPacket>, config: ReplayConfig) -> Self {
        Self {
            packets,
            cursor: 0,
            config,
            started: None,
            sent: Vec::new(),
            queued: VecDeque::new(),
        }
    }

    /// Everything written by the host during replay
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Packets left before the end of the capture
    pub fn remaining(&self) -> usize {
        self.packets.len() - self.cursor + self.queued.len()
    }

    /// Serve `packet` before the rest of the capture
    pub fn inject(&mut self, packet: Vec<u8>) {
        self.queued.push_back(packet);
    }

    async fn pace(&mut self, timestamp_us: u64) {
        if self.config.speed <= 0.0 {
            return;
        }
        let started = *self.started.get_or_insert_with(Instant::now);
        let offset = Duration::from_micros((timestamp_us as f64 / self.config.speed) as u64);
        tokio::time::sleep_until(started + offset).await;
    }
}

impl Transport for ReplayTransport {
    async fn send(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.sent.push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, _max_len: usize) -> std::result::Result<Vec<u8>, TransportError> {
        if let Some(packet) = self.queued.pop_front() {
            return Ok(packet);
        }

        if self.cursor >= self.packets.len() {
            if !self.config.loop_playback || self.packets.is_empty() {
                return Err(TransportError::EndOfStream);
            }
            log::debug!("Replay loop completed, restarting");
            self.cursor = 0;
            self.started = None;
        }

        let timestamp_us = self.packets[self.cursor].timestamp_us;
        self.pace(timestamp_us).await;

        let packet = self.packets[self.cursor].data.clone();
        self.cursor += 1;
        Ok(packet)
    }
}

/// Read packets with timestamp information from a capture file
///
/// # Errors
///
/// Returns `ReplayError::FileOpen` on I/O failure, or `ReplayError::InvalidPacket`
/// with the byte offset of the bad record.
pub fn read_capture(path: &Path) -> Result<Vec<CapturedPacket>> {
    let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut packets = Vec::new();
    let mut offset = 0u64;

    loop {
        let mut timestamp_bytes = [0u8; 8];
        match fill(&mut file, &mut timestamp_bytes)? {
            0 => break,
            8 => {}
            _ => {
                return Err(ReplayError::InvalidPacket {
                    offset,
                    message: "unexpected EOF reading timestamp".to_string(),
                })
            }
        }
        let timestamp_us = u64::from_le_bytes(timestamp_bytes);

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)
            .map_err(|_| ReplayError::InvalidPacket {
                offset,
                message: "unexpected EOF reading packet length".to_string(),
            })?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_CAPTURED_PACKET {
            return Err(ReplayError::InvalidPacket {
                offset,
                message: format!("packet length {} exceeds 1MB limit", len),
            });
        }

        let mut endpoint_byte = [0u8; 1];
        file.read_exact(&mut endpoint_byte)
            .map_err(|_| ReplayError::InvalidPacket {
                offset,
                message: "unexpected EOF reading endpoint".to_string(),
            })?;

        let mut data = vec![0u8; len];
        file.read_exact(&mut data)
            .map_err(|_| ReplayError::InvalidPacket {
                offset,
                message: format!("unexpected EOF reading {} bytes of data", len),
            })?;

        packets.push(CapturedPacket {
            timestamp_us,
            endpoint: endpoint_byte[0],
            data,
        });

        offset += 8 + 4 + 1 + len as u64;
    }

    Ok(packets)
}

/// Read until `buf` is full or the reader is exhausted, returning the bytes read
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Try to load metadata from a companion JSON file
fn try_load_metadata(path: &Path) -> Option<CaptureMetadata> {
    let json_path = path.with_extension("json");
    if json_path.exists() {
        if let Ok(meta) = read_metadata(&json_path) {
            return Some(meta);
        }
    }

    let file_name = path.file_name().and_then(|n| n.to_str())?;
    if file_name.starts_with("capture_") {
        let json_name = file_name
            .replacen("capture_", "metadata_", 1)
            .replace(".bin", ".json");
        let json_path = path.with_file_name(json_name);
        if json_path.exists() {
            return read_metadata(&json_path).ok();
        }
    }

    None
}

/// Decode every live-view frame in a capture
///
/// Runs the live-view loop over the capture's inbound packets until they run
/// out; a payload cut off by the end of the capture is dropped.
///
/// # Errors
///
/// Returns `ReplayError` if the file cannot be loaded.
pub async fn replay_live_view_frames(path: &Path, config: &SessionConfig) -> Result<Vec<Vec<u8>>> {
    let transport = PacketReplay::load(path)?.into_transport(ReplayConfig::default());
    let mut channel = PacketChannel::new(transport, config);
    let mut stitcher = LiveViewStitcher::new(config.max_live_view_buffer);

    let mut frames = Vec::new();
    let outcome = run_live_view(
        &mut channel,
        &mut stitcher,
        &LiveViewStopper::new(),
        config.validation,
        &mut |frame: Vec<u8>| frames.push(frame),
    )
    .await;

    match outcome {
        Ok(_) | Err(TransportError::EndOfStream) => {
            log::info!("Replayed {} live-view frames", frames.len());
            Ok(frames)
        }
        Err(e) => Err(e.into()),
    }
}

/// Replay a capture and return live-view frames via an iterator
///
/// Frames are decoded on demand. The iterator drives the async reader on its
/// own single-threaded runtime, so it must not be used from inside another
/// async runtime.
pub struct FrameIterator {
    runtime: tokio::runtime::Runtime,
    channel: PacketChannel<ReplayTransport>,
    stitcher: LiveViewStitcher,
    validation: ValidationLevel,
    done: bool,
}

impl FrameIterator {
    /// Create a new frame iterator from a capture file
    ///
    /// # Errors
    ///
    /// Returns `ReplayError` if the file cannot be loaded.
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_config(path, &SessionConfig::default())
    }

    /// Create with custom session settings
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or contains invalid packet data.
    pub fn with_config(path: &Path, config: &SessionConfig) -> Result<Self> {
        let transport = PacketReplay::load(path)?.into_transport(ReplayConfig::default());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        Ok(Self {
            runtime,
            channel: PacketChannel::new(transport, config),
            stitcher: LiveViewStitcher::new(config.max_live_view_buffer),
            validation: config.validation,
            done: false,
        })
    }
}

impl Iterator for FrameIterator {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let payload = match self.runtime.block_on(read_jpeg_payload(&mut self.channel)) {
                Ok(payload) => payload,
                Err(TransportError::EndOfStream) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    log::warn!("Replay stopped: {}", e);
                    self.done = true;
                    break;
                }
            };

            let Some(frame) = self.stitcher.push(&payload) else {
                continue;
            };
            if validate_jpeg_frame(&frame, self.validation).valid {
                return Some(frame);
            }
            log::warn!("Skipping invalid {} byte frame", frame.len());
        }
        None
    }
}
