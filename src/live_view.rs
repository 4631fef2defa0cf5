//! Live-view frame stitching
//!
//! Reassembled JPEG payloads do not line up with image boundaries: a frame can
//! span several payloads and a payload can begin with bytes left over from a
//! collision. [`LiveViewStitcher`] keeps the unfinished tail between payloads
//! and cuts complete SOI..EOI frames out of it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dxo_link::live_view::LiveViewStitcher;
//!
//! let mut stitcher = LiveViewStitcher::default();
//!
//! for payload in payloads {
//!     if let Some(frame) = stitcher.push(&payload) {
//!         show(frame);
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::byte_match;
use crate::config::DEFAULT_MAX_LIVE_VIEW_BUFFER;
use crate::frame_validation::{validate_jpeg_frame, ValidationLevel};
use crate::jpeg::read_jpeg_payload;
use crate::protocol::{JPEG_EOI, JPEG_SOI};
use crate::transport::{PacketChannel, Transport, TransportError};

/// Locate a frame in `data`
///
/// Returns the SOI index and, if present, the index of the first EOI after it.
#[inline]
pub fn frame_bounds(data: &[u8]) -> Option<(usize, Option<usize>)> {
    let start = byte_match::find(data, &JPEG_SOI)?;
    let end = byte_match::find_from(data, &JPEG_EOI, start + 1);
    Some((start, end))
}

/// Carries partial frame data across payloads
#[derive(Debug)]
pub struct LiveViewStitcher {
    /// Bytes received since the last emitted frame
    accumulated: Vec<u8>,
    /// Accumulation limit before the buffer is dropped
    max_buffer: usize,
}

impl Default for LiveViewStitcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LIVE_VIEW_BUFFER)
    }
}

impl LiveViewStitcher {
    /// Create a stitcher that drops its buffer once it exceeds `max_buffer` bytes
    pub fn new(max_buffer: usize) -> Self {
        Self {
            accumulated: Vec::new(),
            max_buffer,
        }
    }

    /// Bytes held while waiting for the rest of a frame
    pub fn pending_len(&self) -> usize {
        self.accumulated.len()
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.accumulated.clear();
    }

    /// Feed one reassembled payload, returning a frame if one is complete
    ///
    /// A frame already complete in the held bytes is emitted first; in that case
    /// the new payload is discarded along with the rest of the buffer. Otherwise
    /// the payload is appended (dropping anything held before the SOI marker)
    /// and the buffer is scanned again. That second scan emits every complete
    /// frame, so between pushes the held bytes never contain one.
    pub fn push(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.is_empty() {
            return None;
        }

        let start = match frame_bounds(&self.accumulated) {
            Some((start, Some(end))) => return Some(self.take_frame(start, end)),
            Some((start, None)) => Some(start),
            None => None,
        };

        if let Some(start) = start {
            self.accumulated.drain(..start);
        }
        self.accumulated.extend_from_slice(payload);

        if let Some((start, Some(end))) = frame_bounds(&self.accumulated) {
            return Some(self.take_frame(start, end));
        }

        if self.accumulated.len() > self.max_buffer {
            log::warn!(
                "No complete frame in {} buffered bytes, dropping buffer",
                self.accumulated.len()
            );
            self.accumulated.clear();
        }
        None
    }

    fn take_frame(&mut self, start: usize, end: usize) -> Vec<u8> {
        let frame = self.accumulated[start..end + JPEG_EOI.len()].to_vec();
        self.accumulated.clear();
        frame
    }
}

/// Receives stitched frames
pub trait FrameSink {
    /// Handle one complete JPEG frame
    fn on_frame(&mut self, frame: Vec<u8>);
}

impl<F: FnMut(Vec<u8>)> FrameSink for F {
    fn on_frame(&mut self, frame: Vec<u8>) {
        self(frame)
    }
}

/// Cooperative stop handle for the live-view loop
///
/// Clones share one flag. A stop request is seen at the top of the next loop
/// iteration; a read already in flight runs to completion first.
#[derive(Debug, Clone, Default)]
pub struct LiveViewStopper {
    stopped: Arc<AtomicBool>,
}

impl LiveViewStopper {
    /// Create a handle in the running state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Clear a previous stop request
    pub fn rearm(&self) {
        self.stopped.store(false, Ordering::Release);
    }
}

/// Counters from one live-view run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveViewStats {
    /// Payloads reassembled
    pub payloads: u64,
    /// Empty payloads skipped
    pub empty_payloads: u64,
    /// Frames delivered to the sink
    pub frames: u64,
    /// Frames dropped by validation
    pub rejected: u64,
}

/// Read payloads and deliver stitched frames until stopped
///
/// # Errors
///
/// Returns the first transport error; frames delivered before it stay delivered.
pub async fn run_live_view<T, S>(
    channel: &mut PacketChannel<T>,
    stitcher: &mut LiveViewStitcher,
    stopper: &LiveViewStopper,
    validation: ValidationLevel,
    sink: &mut S,
) -> Result<LiveViewStats, TransportError>
where
    T: Transport,
    S: FrameSink + ?Sized,
{
    let mut stats = LiveViewStats::default();

    loop {
        if stopper.is_stopped() {
            log::info!("Live view stopped after {} frames", stats.frames);
            break;
        }

        let payload = read_jpeg_payload(channel).await?;
        stats.payloads += 1;

        if payload.is_empty() {
            stats.empty_payloads += 1;
            continue;
        }

        let Some(frame) = stitcher.push(&payload) else {
            continue;
        };

        let result = validate_jpeg_frame(&frame, validation);
        if !result.valid {
            stats.rejected += 1;
            log::warn!(
                "Dropping {} byte live-view frame: {}",
                result.size,
                result.failure_reason.unwrap_or_default()
            );
            continue;
        }

        stats.frames += 1;
        log::debug!("Live-view frame {}: {} bytes", stats.frames, frame.len());
        sink.on_frame(frame);
    }

    Ok(stats)
}
