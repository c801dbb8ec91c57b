use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

type ServiceTask = JoinHandle<anyhow::Result<()>>;

/// Named background services (state worker, relay) plus the shutdown flag they watch.
pub struct ServiceHandle {
    shutdown_tx: watch::Sender<bool>,
    services: Vec<(&'static str, ServiceTask)>,
}

impl ServiceHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (ServiceHandle { shutdown_tx: tx, services: Vec::new() }, rx)
    }

    /// Register a running service. Services are stopped in reverse order.
    pub fn attach(&mut self, name: &'static str, task: ServiceTask) {
        self.services.push((name, task));
    }

    pub fn service_names(&self) -> Vec<&'static str> {
        self.services.iter().map(|(name, _)| *name).collect()
    }

    /// Raise the shutdown flag, then join services newest first: the relay
    /// drops its mailbox before the worker is joined.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        while let Some((name, task)) = self.services.pop() {
            match task.await {
                Ok(Ok(())) => debug!(service = name, "service stopped"),
                Ok(Err(e)) => error!(service = name, "service returned error: {:?}", e),
                Err(e) => error!(service = name, "service join error: {:?}", e),
            }
        }
        Ok(())
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}
