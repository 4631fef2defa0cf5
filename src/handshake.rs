//! Init/ack handshake handling
//!
//! The camera may restart its side of the session at any time by sending
//! [`INIT_SIGNATURE`]. Until the host replies with [`ACK_SIGNATURE`] no further
//! payload arrives, so every reader checks the first packet of a transfer and
//! answers the signature before treating anything as payload.

use crate::protocol::{ACK_SIGNATURE, INIT_SIGNATURE};
use crate::transport::{PacketChannel, Transport, TransportError};

/// Check whether a packet is exactly the init signature
///
/// Shorter or longer packets never match, even if they start with the signature.
#[inline]
pub fn is_init_signature(packet: &[u8]) -> bool {
    packet == INIT_SIGNATURE
}

/// Send the ack signature
///
/// # Errors
///
/// Propagates the transport error if the write fails.
pub async fn acknowledge<T: Transport>(
    channel: &mut PacketChannel<T>,
) -> Result<(), TransportError> {
    channel.write(&ACK_SIGNATURE).await
}

/// Read the first packet of a transfer, answering an init signature if one arrives
///
/// If the first packet is the init signature, the ack is written and the
/// following packet is returned instead.
///
/// # Errors
///
/// Propagates transport errors.
pub async fn read_lead_packet<T: Transport>(
    channel: &mut PacketChannel<T>,
) -> Result<Vec<u8>, TransportError> {
    let packet = channel.read_packet().await?;
    if is_init_signature(&packet) {
        log::warn!("Camera re-synchronized before transfer, acknowledging");
        acknowledge(channel).await?;
        return channel.read_packet().await;
    }
    Ok(packet)
}

/// Drain stale output from the camera
///
/// Reads packets until an empty packet arrives or the init signature is seen.
/// The init signature is acknowledged and ends the drain. Returns the number of
/// stale packets discarded.
///
/// # Errors
///
/// Propagates transport errors.
pub async fn resync<T: Transport>(channel: &mut PacketChannel<T>) -> Result<usize, TransportError> {
    let mut discarded = 0;
    loop {
        let packet = channel.read_packet().await?;
        if is_init_signature(&packet) {
            log::info!("Init signature received, acknowledging");
            acknowledge(channel).await?;
            break;
        }
        if packet.is_empty() {
            break;
        }
        discarded += 1;
        log::debug!("Drained {} stale bytes", packet.len());
    }

    if discarded > 0 {
        log::info!("Discarded {} stale packets during resync", discarded);
    }
    Ok(discarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::test_utils::ScriptedTransport;

    fn channel(packets: Vec<Vec<u8>>) -> PacketChannel<ScriptedTransport> {
        PacketChannel::new(ScriptedTransport::new(packets), &SessionConfig::default())
    }

    #[test]
    fn test_init_signature_exact_match_only() {
        assert!(is_init_signature(&INIT_SIGNATURE));
        assert!(!is_init_signature(&ACK_SIGNATURE));
        assert!(!is_init_signature(&INIT_SIGNATURE[..31]));

        let mut longer = INIT_SIGNATURE.to_vec();
        longer.push(0x00);
        assert!(!is_init_signature(&longer));
    }

    #[tokio::test]
    async fn test_lead_packet_without_signature() {
        let mut channel = channel(vec![vec![0x01, 0x02]]);
        let packet = read_lead_packet(&mut channel).await.unwrap();

        assert_eq!(packet, vec![0x01, 0x02]);
        assert!(channel.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn test_lead_packet_after_signature() {
        let mut channel = channel(vec![INIT_SIGNATURE.to_vec(), vec![0x01, 0x02]]);
        let packet = read_lead_packet(&mut channel).await.unwrap();

        assert_eq!(packet, vec![0x01, 0x02]);
        assert_eq!(channel.transport().sent(), &[ACK_SIGNATURE.to_vec()]);
    }

    #[tokio::test]
    async fn test_resync_drains_until_empty() {
        let mut channel = channel(vec![vec![0xAA; 512], vec![0xBB; 100], vec![], vec![0xCC]]);
        let discarded = resync(&mut channel).await.unwrap();

        assert_eq!(discarded, 2);
        assert!(channel.transport().sent().is_empty());
        // The packet after the empty read is left for the next transfer
        assert_eq!(channel.transport().remaining(), 1);
    }

    #[tokio::test]
    async fn test_resync_acknowledges_init_and_stops() {
        let mut channel = channel(vec![vec![0xAA; 10], INIT_SIGNATURE.to_vec(), vec![0xCC]]);
        let discarded = resync(&mut channel).await.unwrap();

        assert_eq!(discarded, 1);
        assert_eq!(channel.transport().sent(), &[ACK_SIGNATURE.to_vec()]);
        assert_eq!(channel.transport().remaining(), 1);
    }
}
