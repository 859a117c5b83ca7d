//! Inbound peer message dispatch.

use tracing::debug;

use hive_core::PeerMessage;

use crate::error::RegistryResult;
use crate::presence::Presence;
use crate::registry::Registry;

/// Handle one message from a peer.
///
/// Specification and presence messages that were new to this node are
/// relayed to both peer directions; duplicates stop here. A request is
/// answered by re-broadcasting the stored message, if any. Returns
/// whether the message caused anything to be stored or sent.
pub async fn handle_peer_message(
    registry: &Registry,
    presence: &Presence,
    message: PeerMessage,
) -> RegistryResult<bool> {
    let relay = match &message {
        PeerMessage::AppMessage(spec_message) => {
            registry.store_temporary(spec_message, true).await?
        }
        PeerMessage::AppRunning(location) => presence.ingest(location).await?,
        PeerMessage::AppRequest { hash } => {
            let Some(found) = registry.find_message(hash)? else {
                debug!(%hash, "requested message not known here");
                return Ok(false);
            };
            let answer = PeerMessage::AppMessage(found);
            registry.peers().broadcast_to_outgoing(&answer).await;
            registry.peers().broadcast_to_incoming(&answer).await;
            return Ok(true);
        }
    };
    if relay {
        registry.peers().broadcast_to_outgoing(&message).await;
        registry.peers().broadcast_to_incoming(&message).await;
    }
    Ok(relay)
}
