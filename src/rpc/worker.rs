//! State worker: owns the `StateInterface` on a blocking thread and serves
//! commands from a queue, one at a time.

use crate::rpc::interface::{RpcError, StateInterface};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub enum Message {
    Dispatch {
        command: String,
        arguments: JsonValue,
        response: oneshot::Sender<Result<JsonValue, RpcError>>,
    },
    Process {
        request: JsonValue,
        response: oneshot::Sender<JsonValue>,
    },
}

/// Cloneable handle for sending commands to the worker.
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub async fn dispatch(&self, command: &str, arguments: JsonValue) -> Result<JsonValue, RpcError> {
        let (response, rx) = oneshot::channel();
        let msg = Message::Dispatch { command: command.to_string(), arguments, response };
        self.sender.send(msg).await.map_err(|_| RpcError::WorkerGone)?;
        rx.await.map_err(|_| RpcError::WorkerGone)?
    }

    /// Raw request in, raw response out (`{"error": ..}` on failure).
    pub async fn process(&self, request: JsonValue) -> Result<JsonValue, RpcError> {
        let (response, rx) = oneshot::channel();
        self.sender
            .send(Message::Process { request, response })
            .await
            .map_err(|_| RpcError::WorkerGone)?;
        rx.await.map_err(|_| RpcError::WorkerGone)
    }
}

/// Start the worker. It stops once every `Mailbox` is dropped.
pub fn spawn(interface: StateInterface, queue_size: usize) -> (Mailbox, JoinHandle<anyhow::Result<()>>) {
    let (sender, mut receiver) = mpsc::channel::<Message>(queue_size.max(1));
    let handle = tokio::task::spawn_blocking(move || {
        let mut interface = interface;
        info!("state worker started");
        while let Some(msg) = receiver.blocking_recv() {
            match msg {
                Message::Dispatch { command, arguments, response } => {
                    debug!(%command, "dispatch");
                    let result = interface.dispatch(&command, &arguments);
                    // requester may have gone away; nothing to do then
                    let _ = response.send(result);
                }
                Message::Process { request, response } => {
                    let _ = response.send(interface.process(&request));
                }
            }
        }
        info!("state worker stopped");
        Ok(())
    });
    (Mailbox { sender }, handle)
}
