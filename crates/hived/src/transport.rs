//! Peer delivery over each peer's `POST /peer/message` endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::debug;

use hive_core::collab::{PeerMessage, PeerTransport};
use hive_core::net::{self, HttpRequest};

pub const PEER_MESSAGE_PATH: &str = "/peer/message";

/// Fire-and-forget HTTP delivery to the configured peer sets.
#[derive(Debug, Clone)]
pub struct HttpPeers {
    outgoing: Arc<Vec<String>>,
    incoming: Arc<Vec<String>>,
    timeout: Duration,
}

impl HttpPeers {
    pub fn new(outgoing: Vec<String>, incoming: Vec<String>) -> Self {
        Self {
            outgoing: Arc::new(outgoing),
            incoming: Arc::new(incoming),
            timeout: Duration::from_secs(10),
        }
    }

    /// Post `message` to every address concurrently and wait for all.
    async fn deliver(&self, peers: &[String], message: &PeerMessage) {
        let body = match serde_json::to_value(message) {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "peer message not serializable");
                return;
            }
        };
        let mut tasks = JoinSet::new();
        for peer in peers {
            let peer = peer.clone();
            let body = body.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let request = match HttpRequest::post(PEER_MESSAGE_PATH).json(&body) {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(%peer, error = %e, "peer request not built");
                        return;
                    }
                };
                match net::send(&peer, request, timeout).await {
                    Ok(response) if response.is_success() => {}
                    Ok(response) => debug!(%peer, status = %response.status, "peer refused message"),
                    Err(e) => debug!(%peer, error = %e, "peer unreachable"),
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

#[async_trait]
impl PeerTransport for HttpPeers {
    async fn broadcast_to_outgoing(&self, message: &PeerMessage) {
        self.deliver(&self.outgoing, message).await;
    }

    async fn broadcast_to_incoming(&self, message: &PeerMessage) {
        self.deliver(&self.incoming, message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_peers_are_swallowed() {
        // Port 9 on localhost is closed in test environments.
        let peers = HttpPeers::new(vec!["127.0.0.1:9".to_string()], vec![]);
        let message = PeerMessage::AppRequest {
            hash: "ab".repeat(32),
        };
        peers.broadcast_to_outgoing(&message).await;
        peers.broadcast_to_incoming(&message).await;
    }
}
