//! Relay: newline-delimited JSON commands over TCP, forwarded to the state worker.
//!
//! One request per line, one response line per request, in order per connection.

use crate::rpc::worker::Mailbox;
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value as JsonValue};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

/// Longest accepted request line.
pub const MAX_LINE_LENGTH: usize = 4 * 1024 * 1024;

pub struct RpcServer {
    listener: TcpListener,
    mailbox: Mailbox,
}

impl RpcServer {
    pub async fn bind(addr: &str, mailbox: Mailbox) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, mailbox })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` flips to true.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("relay listening on {}", self.listener.local_addr()?);
        loop {
            let conn_shutdown = shutdown.clone();
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "connection accepted");
                    let mailbox = self.mailbox.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, mailbox, conn_shutdown).await {
                            warn!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("relay shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, mailbox: Mailbox, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        let line = tokio::select! {
            next = lines.next() => match next {
                Some(line) => line?,
                None => return Ok(()),
            },
            _ = shutdown.changed() => return Ok(()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonValue>(&line) {
            Ok(request) => match mailbox.process(request).await {
                Ok(v) => v,
                Err(e) => {
                    error!(error = %e, "worker unavailable");
                    json!({ "error": e.to_string() })
                }
            },
            Err(e) => json!({ "error": format!("invalid json: {}", e) }),
        };
        lines.send(serde_json::to_string(&response)?).await?;
    }
}
