//! Node assembly and the `run` entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use hive_admission::AdmissionController;
use hive_core::collab::{ChainClient, ImageCatalog, PeerTransport};
use hive_core::config::NodeConfig;
use hive_core::tier::TierCatalog;
use hive_lifecycle::{ContainerRuntime, DockerRuntime, HostSystem, LifecycleManager, ShellHost};
use hive_registry::{Presence, Registry};
use hive_scheduler::Orchestrator;
use hive_state::StateStore;

use crate::catalog::HubCatalog;
use crate::peer_api::{self, ApiState};
use crate::rpc::RpcChain;
use crate::transport::HttpPeers;

/// External collaborators of a node.
pub struct Collaborators {
    pub chain: Arc<dyn ChainClient>,
    pub images: Arc<dyn ImageCatalog>,
    pub peers: Arc<dyn PeerTransport>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub host: Arc<dyn HostSystem>,
}

impl Collaborators {
    /// The production collaborators described by `config`.
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            chain: Arc::new(RpcChain::new(&config.chain)),
            images: Arc::new(HubCatalog::new(config.runtime.image_catalog_endpoint.clone())),
            peers: Arc::new(HttpPeers::new(
                config.node.outgoing_peers.clone(),
                config.node.incoming_peers.clone(),
            )),
            runtime: Arc::new(DockerRuntime::new(config.runtime.docker_endpoint.clone())),
            host: Arc::new(ShellHost::new()),
        }
    }
}

/// Every long-lived component of a node, constructed once.
pub struct Node {
    pub registry: Arc<Registry>,
    pub presence: Arc<Presence>,
    pub lifecycle: Arc<LifecycleManager>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Node {
    pub fn assemble(store: StateStore, config: &NodeConfig, with: Collaborators) -> Self {
        let tiers = TierCatalog::default();
        let registry = Arc::new(Registry::new(
            store.clone(),
            config.apps.clone(),
            tiers.clone(),
            with.images,
            Arc::clone(&with.peers),
        ));
        let presence = Arc::new(Presence::new(
            store.clone(),
            registry.cache(),
            with.peers,
            &config.apps,
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            with.runtime,
            with.host,
            AdmissionController::new(store, tiers),
            config.runtime.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&presence),
            Arc::clone(&lifecycle),
            with.chain,
            config,
        ));
        Self {
            registry,
            presence,
            lifecycle,
            orchestrator,
        }
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            registry: Arc::clone(&self.registry),
            presence: Arc::clone(&self.presence),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

/// Run a node until ctrl-c.
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    info!(ip = %config.node.public_ip, "hive node starting");

    std::fs::create_dir_all(&config.node.data_dir)?;
    let db_path = config.node.data_dir.join("hive.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let node = Node::assemble(store, &config, Collaborators::from_config(&config));
    let applied = node.registry.rebuild_projection(0, false)?;
    info!(applied, "projection rebuilt");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Catch up on expiry now rather than one expiration interval from now.
    // Local removals are paced, so this runs beside the loops.
    let catch_up = {
        let orchestrator = Arc::clone(&node.orchestrator);
        tokio::spawn(async move {
            match orchestrator.expire_once().await {
                Ok(expired) => info!(expired = expired.len(), "startup expiration pass done"),
                Err(e) => warn!(error = %e, "startup expiration pass failed"),
            }
        })
    };
    let mut handles = node.orchestrator.start(shutdown_rx);
    handles.push(catch_up);
    info!(tasks = handles.len(), "scheduler loops started");

    // ── API server ─────────────────────────────────────────────

    let router = peer_api::router(node.api_state());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.node.api_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "node API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c, running until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let failed = join_loops(handles).await;
    info!(failed, "hive node stopped");
    Ok(())
}

/// Wait for every loop task. Returns how many panicked or were cancelled.
async fn join_loops(handles: Vec<JoinHandle<()>>) -> usize {
    let mut failed = 0;
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, panicked = e.is_panic(), "scheduler loop ended abnormally");
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicked_loop_is_counted() {
        let handles = vec![
            tokio::spawn(async {}),
            tokio::spawn(async { panic!("loop body blew up") }),
            tokio::spawn(async {}),
        ];
        assert_eq!(join_loops(handles).await, 1);
    }
}
