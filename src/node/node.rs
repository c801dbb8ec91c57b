//! Node orchestration: open the stores, install the submission contract, then
//! wire the state worker and the relay together.

use crate::ledger::{BlockStorage, KvBlockStore};
use crate::node::config::NodeConfig;
use crate::node::service_handle::ServiceHandle;
use crate::rpc::{worker, RpcServer, StateInterface};
use crate::runtime::{install_submission, Engine};
use crate::state::StateDriver;
use crate::storage::{self, StorageEngine};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Build the state interface the node (and the one-shot CLI commands) serve from.
pub fn open_interface(cfg: &NodeConfig) -> Result<StateInterface> {
    if cfg.storage != StorageEngine::Memory {
        std::fs::create_dir_all(&cfg.data_dir)?;
    }
    let state_store = storage::open(cfg.state_path(), cfg.storage)?;
    let mut driver = StateDriver::new(state_store);
    if install_submission(&mut driver)? {
        info!("fresh state, submission contract installed");
    }

    let blocks: Option<Arc<dyn BlockStorage>> = if cfg.blocks {
        let block_store = storage::open(cfg.blocks_path(), cfg.storage)?;
        Some(Arc::new(KvBlockStore::new(block_store)))
    } else {
        None
    };
    Ok(StateInterface::new(driver, Engine::new(cfg.engine.clone()), blocks))
}

pub struct Node {
    cfg: NodeConfig,
}

impl Node {
    pub fn new(cfg: NodeConfig) -> Self {
        Self { cfg }
    }

    /// Start worker and relay; returns the handle for graceful shutdown and the
    /// address the relay is bound to.
    pub async fn start(self) -> Result<(ServiceHandle, SocketAddr)> {
        let (mut svc_handle, shutdown_rx) = ServiceHandle::new();

        let interface = open_interface(&self.cfg)?;
        let (mailbox, worker_handle) = worker::spawn(interface, self.cfg.queue_size);
        svc_handle.attach("state-worker", worker_handle);

        let server = RpcServer::bind(&self.cfg.rpc_addr, mailbox).await?;
        let addr = server.local_addr()?;
        let h = tokio::spawn(async move {
            if let Err(e) = server.serve(shutdown_rx).await {
                error!("relay failed: {:?}", e);
                return Err(e);
            }
            Ok(())
        });
        svc_handle.attach("relay", h);

        info!(
            rpc = %addr,
            storage = ?self.cfg.storage,
            blocks = self.cfg.blocks,
            metering = self.cfg.engine.metering,
            "node started"
        );
        Ok((svc_handle, addr))
    }
}
