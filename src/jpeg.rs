//! JPEG payload reassembly
//!
//! A live-view payload arrives as a lead packet, which may start with a 32-byte
//! metadata block, followed by packets of image data. The payload ends with the
//! packet that carries the EOI marker. The total length is never announced, so
//! the buffer grows as packets arrive; foreign packets that collide with the
//! stream are absorbed rather than failing the transfer, and the stitcher sorts
//! out frame boundaries afterwards.

use crate::byte_match;
use crate::handshake::read_lead_packet;
use crate::protocol::{JPEG_EOI, JPEG_METADATA_MAGIC, METADATA_SIZE};
use crate::reassembly::ReassemblyBuffer;
use crate::transport::{PacketChannel, Transport, TransportError};

/// Image bytes carried by a lead packet
///
/// If the packet contains the metadata marker, the image starts after the
/// 32-byte metadata block; otherwise the whole packet is image data.
pub fn lead_image_bytes(lead: &[u8]) -> &[u8] {
    if byte_match::contains(lead, &JPEG_METADATA_MAGIC) {
        lead.get(METADATA_SIZE..).unwrap_or_default()
    } else {
        lead
    }
}

/// Read one JPEG payload
///
/// Always reads at least one packet after the lead packet. The loop has no
/// iteration bound: a stream that never carries the EOI marker only ends through
/// a transport error (for example a configured read timeout).
///
/// # Errors
///
/// Propagates transport errors; the partial payload is dropped.
pub async fn read_jpeg_payload<T: Transport>(
    channel: &mut PacketChannel<T>,
) -> Result<Vec<u8>, TransportError> {
    let lead = read_lead_packet(channel).await?;
    let image = lead_image_bytes(&lead);

    // Sized to the whole lead packet; the stripped metadata leaves slack for the next write
    let mut buffer = ReassemblyBuffer::with_len(lead.len());
    buffer.write_growing(image);

    let mut packets = 1usize;
    loop {
        let packet = channel.read_packet().await?;
        packets += 1;
        buffer.write_growing(&packet);

        if byte_match::contains(&packet, &JPEG_EOI) {
            break;
        }
    }

    log::debug!(
        "Reassembled {} byte JPEG payload from {} packets",
        buffer.offset(),
        packets
    );
    Ok(buffer.into_written())
}
