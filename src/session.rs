//! Camera session
//!
//! A [`Session`] owns the transport for one opened camera together with the
//! only mutable protocol state: the outbound sequence counter and the live-view
//! stitcher with its stop flag. Every operation is a strict send-then-decode
//! sequence; nothing is pipelined and the sequence id is only used to verify
//! answers after the fact.

use serde_json::{json, Value};
use thiserror::Error;

use crate::commands::METHOD_CAMERA_MODE_SWITCH;
use crate::config::SessionConfig;
use crate::handshake::{acknowledge, resync};
use crate::live_view::{run_live_view, FrameSink, LiveViewStats, LiveViewStitcher, LiveViewStopper};
use crate::rpc::{decode_response, encode_next, EncodeError, RpcDecode, RpcMessage, SequenceCounter};
use crate::transport::{PacketChannel, Transport, TransportError};

/// Errors that end a session operation
///
/// Corrupt or missing answers are not errors; they surface as `None` from
/// [`Session::call`] or as a non-message [`RpcDecode`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// The transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request could not be framed
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// One opened camera
#[derive(Debug)]
pub struct Session<T> {
    channel: PacketChannel<T>,
    sequence: SequenceCounter,
    stitcher: LiveViewStitcher,
    stopper: LiveViewStopper,
    config: SessionConfig,
}

impl<T: Transport> Session<T> {
    /// Wrap an already claimed transport without touching the device
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            channel: PacketChannel::new(transport, &config),
            sequence: SequenceCounter::new(),
            stitcher: LiveViewStitcher::new(config.max_live_view_buffer),
            stopper: LiveViewStopper::new(),
            config,
        }
    }

    /// Wrap a transport and bring the camera into a known state
    ///
    /// Sends the ack signature once, then drains stale output until the camera
    /// goes quiet or re-synchronizes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transport` if the handshake I/O fails.
    pub async fn open(transport: T, config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(transport, config);
        acknowledge(&mut session.channel).await?;
        let discarded = resync(&mut session.channel).await?;
        log::info!("Camera session open ({} stale packets drained)", discarded);
        Ok(session)
    }

    /// Session settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The id the next request will carry
    pub fn next_sequence_id(&self) -> u64 {
        self.sequence.peek()
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    /// Send one request without reading the answer
    ///
    /// The ack signature goes out first so a camera waiting on a handshake is
    /// released before the request arrives. Returns the request's sequence id.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Encode` if the request cannot be framed (the id is
    /// still consumed) or `SessionError::Transport` if a write fails.
    pub async fn send_request(&mut self, method: &str, params: Option<&Value>) -> Result<u64> {
        acknowledge(&mut self.channel).await?;
        let (id, frame) = encode_next(&mut self.sequence, method, params)?;
        log::debug!("-> {} (id {}, {} bytes)", method, id, frame.len());
        self.channel.write(&frame).await?;
        Ok(id)
    }

    /// Decode the next inbound transfer, skipping forced flushes
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transport` if a read fails.
    pub async fn decode_next(&mut self) -> Result<RpcDecode> {
        Ok(decode_response(&mut self.channel, self.config.max_flush_retries).await?)
    }

    /// Send a request and decode exactly one answer, keeping the decode outcome
    ///
    /// # Errors
    ///
    /// See [`Session::send_request`] and [`Session::decode_next`].
    pub async fn transact(&mut self, method: &str, params: Option<&Value>) -> Result<RpcDecode> {
        self.send_request(method, params).await?;
        let outcome = self.decode_next().await?;
        if !matches!(outcome, RpcDecode::Message(_)) {
            log::debug!("<- {}: {:?}", method, outcome);
        }
        Ok(outcome)
    }

    /// Send a request and return its answer
    ///
    /// Returns `None` when the camera answered with an empty transfer, aborted
    /// it, or sent something that did not decode.
    ///
    /// # Errors
    ///
    /// See [`Session::transact`].
    pub async fn call(&mut self, method: &str, params: Option<&Value>) -> Result<Option<RpcMessage>> {
        Ok(self.transact(method, params).await?.into_message())
    }

    /// A handle that stops a running live view from elsewhere
    pub fn live_view_stopper(&self) -> LiveViewStopper {
        self.stopper.clone()
    }

    /// Request the live-view loop to stop at its next iteration
    pub fn stop_live_view(&self) {
        self.stopper.stop();
    }

    /// Switch the camera to view mode and stream frames into `sink`
    ///
    /// Runs until [`LiveViewStopper::stop`] is called on a handle from
    /// [`Session::live_view_stopper`] (including from inside the sink) or the
    /// transport fails. Any partial frame from a previous run is discarded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transport` on the first failed read or write.
    pub async fn start_live_view<S>(&mut self, sink: &mut S) -> Result<LiveViewStats>
    where
        S: FrameSink + ?Sized,
    {
        self.stopper.rearm();
        self.stitcher.reset();

        let params = json!({ "param": "view" });
        if self.call(METHOD_CAMERA_MODE_SWITCH, Some(&params)).await?.is_none() {
            log::warn!("Camera did not confirm the switch to view mode");
        }

        log::info!("Live view started");
        let stats = run_live_view(
            &mut self.channel,
            &mut self.stitcher,
            &self.stopper,
            self.config.validation,
            sink,
        )
        .await?;

        log::info!(
            "Live view ended: {} frames from {} payloads ({} rejected)",
            stats.frames,
            stats.payloads,
            stats.rejected
        );
        Ok(stats)
    }

    /// Stop live view and release the device
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transport` if closing the transport fails.
    pub async fn close(&mut self) -> Result<()> {
        self.stopper.stop();
        self.channel.close().await?;
        log::info!("Camera session closed");
        Ok(())
    }

    /// Unwrap the underlying transport
    pub fn into_transport(self) -> T {
        self.channel.into_inner()
    }
}
