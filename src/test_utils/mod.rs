//! Test utilities for `dxo-link`
//!
//! Provides a scripted transport and synthetic packet generation for exercising
//! the protocol engine without a camera attached.

pub mod packet_generator;
pub mod scripted_transport;

pub use packet_generator::*;
pub use scripted_transport::*;
