//! Integration tests for the live-view frame pipeline
//!
//! Tests the full packet-to-frame path:
//! ```text
//! Packets → JPEG Reassembly → Stitching → Validation → Sink
//! ```
//!
//! These tests run without a camera: packets come from the synthetic generator
//! through a scripted transport.

use dxo_link::frame_validation::ValidationLevel;
use dxo_link::protocol::{ACK_SIGNATURE, INIT_SIGNATURE};
use dxo_link::rpc::encode_request;
use dxo_link::test_utils::{synthetic_jpeg, PacketGenerator, ScriptedTransport};
use dxo_link::{LiveViewStitcher, Session, SessionConfig, SessionError, TransportError};
use serde_json::json;

/// Answer to the mode switch that starts live view
fn mode_switch_answer() -> Vec<Vec<u8>> {
    PacketGenerator::default().rpc_packets(&json!({ "jsonrpc": "2.0", "id": 0, "result": "view" }))
}

fn live_view_session(frames: &[Vec<u8>], config: SessionConfig) -> Session<ScriptedTransport> {
    let gen = PacketGenerator::default();
    let mut packets = mode_switch_answer();
    for frame in frames {
        packets.extend(gen.jpeg_packets(frame));
    }
    Session::new(ScriptedTransport::new(packets), config)
}

// ============================================================================
// Happy Path: Complete Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_live_view_delivers_frames_until_stopped() {
    let sources = vec![synthetic_jpeg(900), synthetic_jpeg(2500), synthetic_jpeg(1200)];
    let mut session = live_view_session(&sources, SessionConfig::default());
    let stopper = session.live_view_stopper();

    let mut received = Vec::new();
    let mut sink = |frame: Vec<u8>| {
        received.push(frame);
        if received.len() == 2 {
            stopper.stop();
        }
    };
    let stats = session.start_live_view(&mut sink).await.unwrap();

    assert_eq!(stats.frames, 2);
    assert_eq!(stats.rejected, 0);
    assert_eq!(received, sources[..2].to_vec());

    // Third frame never read
    let third = PacketGenerator::default().jpeg_packets(&sources[2]);
    assert_eq!(session.transport().remaining(), third.len());

    let sent = session.transport().sent();
    assert_eq!(sent[0], ACK_SIGNATURE);
    assert_eq!(
        sent[1],
        encode_request(0, "dxo_camera_mode_switch", Some(&json!({ "param": "view" }))).unwrap()
    );
}

#[tokio::test]
async fn test_large_frame_across_many_packets() {
    let source = synthetic_jpeg(150_000);
    let config = SessionConfig {
        validation: ValidationLevel::Strict,
        ..Default::default()
    };
    let mut session = live_view_session(std::slice::from_ref(&source), config);
    let stopper = session.live_view_stopper();

    let mut received = Vec::new();
    let mut sink = |frame: Vec<u8>| {
        received.push(frame);
        stopper.stop();
    };
    session.start_live_view(&mut sink).await.unwrap();

    assert_eq!(received.len(), 1);
    assert_eq!(received[0], source);
}

#[tokio::test]
async fn test_stream_end_is_reported_after_delivered_frames() {
    let sources = vec![synthetic_jpeg(700), synthetic_jpeg(800)];
    let mut session = live_view_session(&sources, SessionConfig::default());

    let mut received = Vec::new();
    let mut sink = |frame: Vec<u8>| received.push(frame);
    let result = session.start_live_view(&mut sink).await;

    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::EndOfStream))
    ));
    assert_eq!(received, sources);
}

// ============================================================================
// Recovery: garbage, resync, corrupt frames
// ============================================================================

#[tokio::test]
async fn test_garbage_before_soi_is_discarded() {
    let source = synthetic_jpeg(1000);
    let mut payload = vec![0x11; 300];
    payload.extend_from_slice(&source);

    let mut packets = mode_switch_answer();
    packets.extend(PacketGenerator::default().split_image(&payload));
    let mut session = Session::new(ScriptedTransport::new(packets), SessionConfig::default());
    let stopper = session.live_view_stopper();

    let mut received = Vec::new();
    let mut sink = |frame: Vec<u8>| {
        received.push(frame);
        stopper.stop();
    };
    session.start_live_view(&mut sink).await.unwrap();

    assert_eq!(received, vec![source]);
}

#[tokio::test]
async fn test_init_signature_between_payloads_is_acknowledged() {
    let gen = PacketGenerator::default();
    let first = synthetic_jpeg(600);
    let second = synthetic_jpeg(650);

    let mut packets = mode_switch_answer();
    packets.extend(gen.jpeg_packets(&first));
    packets.push(INIT_SIGNATURE.to_vec());
    packets.extend(gen.jpeg_packets(&second));
    let mut session = Session::new(ScriptedTransport::new(packets), SessionConfig::default());
    let stopper = session.live_view_stopper();

    let mut received = Vec::new();
    let mut sink = |frame: Vec<u8>| {
        received.push(frame);
        if received.len() == 2 {
            stopper.stop();
        }
    };
    session.start_live_view(&mut sink).await.unwrap();

    assert_eq!(received, vec![first, second]);
    let acks = session
        .transport()
        .sent()
        .iter()
        .filter(|s| s.as_slice() == ACK_SIGNATURE)
        .count();
    // One before the mode switch, one answering the init
    assert_eq!(acks, 2);
}

#[tokio::test]
async fn test_strict_validation_drops_corrupt_frame() {
    let corrupt = vec![0xFF, 0xD8, 0xFF, 0x00, 0x01, 0x02, 0x03, 0xFF, 0xD9];
    let good = synthetic_jpeg(800);

    let gen = PacketGenerator::default();
    let mut packets = mode_switch_answer();
    packets.extend(gen.split_image(&corrupt));
    packets.extend(gen.jpeg_packets(&good));

    let config = SessionConfig {
        validation: ValidationLevel::Strict,
        ..Default::default()
    };
    let mut session = Session::new(ScriptedTransport::new(packets), config);
    let stopper = session.live_view_stopper();

    let mut received = Vec::new();
    let mut sink = |frame: Vec<u8>| {
        received.push(frame);
        stopper.stop();
    };
    let stats = session.start_live_view(&mut sink).await.unwrap();

    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.frames, 1);
    assert_eq!(received, vec![good]);
}

#[tokio::test]
async fn test_restart_discards_partial_frame() {
    let source = synthetic_jpeg(700);
    let mut session = live_view_session(std::slice::from_ref(&source), SessionConfig::default());
    let stopper = session.live_view_stopper();

    let mut first_run = Vec::new();
    let mut sink = |frame: Vec<u8>| {
        first_run.push(frame);
        stopper.stop();
    };
    session.start_live_view(&mut sink).await.unwrap();
    assert_eq!(first_run, vec![source.clone()]);

    // A second start re-arms the stop flag and switches mode again
    let mut received = Vec::new();
    let mut sink = |frame: Vec<u8>| received.push(frame);
    let result = session.start_live_view(&mut sink).await;

    assert!(result.is_err());
    assert!(received.is_empty());
    assert_eq!(session.next_sequence_id(), 2);
}

// ============================================================================
// Stitching across payloads
// ============================================================================

#[test]
fn test_frame_spanning_three_payloads() {
    let source = synthetic_jpeg(1500);
    let mut first = vec![0x00, 0x42, 0x13, 0x37];
    first.extend_from_slice(&source[..400]);
    let second = &source[400..1000];
    let third = &source[1000..];

    let mut stitcher = LiveViewStitcher::default();
    assert_eq!(stitcher.push(&first), None);
    assert_eq!(stitcher.push(second), None);
    assert_eq!(stitcher.push(third), Some(source));
    assert_eq!(stitcher.pending_len(), 0);
}

#[test]
fn test_markers_straddling_payload_boundaries() {
    let source = synthetic_jpeg(600);
    let eoi_split = source.len() - 1;

    let mut stitcher = LiveViewStitcher::default();
    assert_eq!(stitcher.push(&source[..2]), None);
    assert_eq!(stitcher.push(&source[2..eoi_split]), None);
    assert_eq!(stitcher.push(&source[eoi_split..]), Some(source));
}
