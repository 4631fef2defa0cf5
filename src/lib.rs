//! `dxo-link` - USB tethering protocol engine for the DXO One camera
//!
//! The camera speaks JSON-RPC over a pair of bulk endpoints, wrapped in a small
//! binary envelope, and streams photos and live-view frames as JPEG payloads
//! split across packets. This crate implements that protocol on top of a
//! minimal packet [`transport::Transport`].
//!
//! # Layers
//!
//! ```text
//! commands      typed camera operations (photo, focus, settings, files)
//! session       sequence ids, handshake acknowledgement, live-view control
//! rpc / jpeg    frame codec, flush handling, JPEG payload reassembly
//! live_view     frame stitching across payloads
//! handshake     init/ack signatures and resynchronization
//! transport     packet I/O (USB, replay, scripted)
//! ```
//!
//! Recording ([`capture`]) and playback ([`replay`]) of raw packet streams let
//! the whole stack run without a camera attached.

pub mod byte_match;
pub mod capture;
pub mod commands;
pub mod config;
pub mod frame_validation;
pub mod handshake;
pub mod jpeg;
pub mod live_view;
pub mod protocol;
pub mod reassembly;
pub mod replay;
pub mod rpc;
pub mod session;
pub mod test_utils;
pub mod transport;

#[cfg(feature = "usb")]
pub mod usb;

pub use commands::Setting;
pub use config::SessionConfig;
pub use live_view::{FrameSink, LiveViewStats, LiveViewStitcher, LiveViewStopper};
pub use rpc::{DecodeFailure, RpcDecode, RpcMessage};
pub use session::{Session, SessionError};
pub use transport::{PacketChannel, Transport, TransportError};

#[cfg(feature = "usb")]
pub use usb::UsbTransport;
