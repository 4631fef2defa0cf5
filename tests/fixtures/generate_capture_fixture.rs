//! Generates a live-view capture fixture
//!
//! Run with: `cargo run --bin generate_capture_fixture`
//!
//! Writes `tests/fixtures/live_view/capture.bin` and `capture.json` holding a
//! synthetic session as the host would record it:
//! - Ack signature and the `view` mode switch going out
//! - The camera's answer
//! - Three live-view frames, the second preceded by an init signature and the
//!   host's ack

use std::path::Path;

use dxo_link::capture::{
    write_metadata, write_packets, CaptureMetadata, CapturedPacket, DEFAULT_IN_ENDPOINT,
    DEFAULT_OUT_ENDPOINT,
};
use dxo_link::protocol::{ACK_SIGNATURE, DXO_VENDOR_ID, INIT_SIGNATURE};
use dxo_link::rpc::encode_request;
use dxo_link::test_utils::{synthetic_jpeg, PacketGenerator};
use serde_json::json;

/// Product id written to the fixture metadata
const FIXTURE_PRODUCT_ID: u16 = 0x1012;

/// Time between live-view frames (~30fps)
const FRAME_INTERVAL_US: u64 = 33_333;

/// Time between packets of one transfer
const PACKET_INTERVAL_US: u64 = 125;

struct Recorder {
    packets: Vec<CapturedPacket>,
    timestamp_us: u64,
}

impl Recorder {
    fn push(&mut self, endpoint: u8, data: Vec<u8>) {
        self.packets.push(CapturedPacket {
            timestamp_us: self.timestamp_us,
            endpoint,
            data,
        });
        self.timestamp_us += PACKET_INTERVAL_US;
    }

    fn inbound(&mut self, packets: Vec<Vec<u8>>) -> usize {
        let count = packets.len();
        for data in packets {
            self.push(DEFAULT_IN_ENDPOINT, data);
        }
        count
    }
}

fn main() -> anyhow::Result<()> {
    let fixture_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("live_view");
    std::fs::create_dir_all(&fixture_dir)?;

    let gen = PacketGenerator::default();
    let mut recorder = Recorder {
        packets: Vec::new(),
        timestamp_us: 0,
    };

    println!("Writing handshake and mode switch");
    recorder.push(DEFAULT_OUT_ENDPOINT, ACK_SIGNATURE.to_vec());
    recorder.push(
        DEFAULT_OUT_ENDPOINT,
        encode_request(0, "dxo_camera_mode_switch", Some(&json!({ "param": "view" })))?,
    );
    recorder.inbound(gen.rpc_packets(&json!({ "jsonrpc": "2.0", "id": 0, "result": "view" })));

    let frames = [synthetic_jpeg(6_000), synthetic_jpeg(9_500), synthetic_jpeg(7_200)];
    for (index, frame) in frames.iter().enumerate() {
        recorder.timestamp_us += FRAME_INTERVAL_US;

        if index == 1 {
            println!("Writing init signature and ack");
            recorder.inbound(vec![INIT_SIGNATURE.to_vec()]);
            recorder.push(DEFAULT_OUT_ENDPOINT, ACK_SIGNATURE.to_vec());
        }

        let count = recorder.inbound(gen.jpeg_packets(frame));
        println!("Frame {}: {} bytes in {} packets", index + 1, frame.len(), count);
    }

    let packets_path = fixture_dir.join("capture.bin");
    write_packets(&packets_path, &recorder.packets)?;

    let total_bytes: u64 = recorder.packets.iter().map(|p| p.data.len() as u64).sum();
    let metadata = CaptureMetadata {
        total_packets: recorder.packets.len() as u64,
        total_frames: frames.len() as u64,
        duration_ms: recorder.timestamp_us / 1000,
        total_bytes,
        description: "Synthetic live-view session with a mid-stream init signature".to_string(),
        ..CaptureMetadata::for_device(DXO_VENDOR_ID, FIXTURE_PRODUCT_ID, "live_view")
    };
    write_metadata(&fixture_dir.join("capture.json"), &metadata)?;

    println!(
        "\nCreated {} with {} packets ({} bytes)",
        packets_path.display(),
        metadata.total_packets,
        total_bytes
    );
    Ok(())
}
