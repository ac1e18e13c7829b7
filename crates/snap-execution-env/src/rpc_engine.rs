//! The host-side half of JSON-RPC correlation over the `command`
//! channel: a map from id to pending continuation, plus the background
//! task that reads responses off the wire and resolves them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use snap_protocol::{RpcId, RpcRequest, RpcResponse, Substream};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::error::ServiceError;
use crate::messenger::{ServiceEvent, ServiceMessenger};

type PendingMap = Arc<StdMutex<HashMap<RpcId, oneshot::Sender<RpcResponse>>>>;

/// Drives one job's `command` substream: sends requests and correlates
/// their responses by id, and forwards id-less error frames to the
/// messenger as [`ServiceEvent::UnhandledError`]. The substream is
/// shared behind a lock since sending a new request and reading the
/// next response happen concurrently.
pub struct RpcEngine {
    command: Arc<Mutex<Substream>>,
    pending: PendingMap,
    reader_task: JoinHandle<()>,
}

impl RpcEngine {
    /// Take ownership of `command` and start its reader task. `snap_id`
    /// and `messenger` are only used to attribute out-of-band error
    /// frames; this engine otherwise knows nothing about snaps.
    pub fn new(command: Substream, snap_id: String, messenger: ServiceMessenger) -> Self {
        let command = Arc::new(Mutex::new(command));
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let reader_command = command.clone();

        let reader_task = tokio::spawn(async move {
            loop {
                let response = {
                    let mut command = reader_command.lock().await;
                    command.recv::<RpcResponse>().await
                };
                let Some(response) = response else {
                    break;
                };
                match response.id.clone() {
                    Some(id) => {
                        let waiter = reader_pending.lock().unwrap().remove(&id);
                        if let Some(waiter) = waiter {
                            let _ = waiter.send(response);
                        } else {
                            tracing::warn!(
                                id = %id,
                                "command response for unknown or already-settled call"
                            );
                        }
                    }
                    None => {
                        if let Some(error) = response.error {
                            messenger.publish(ServiceEvent::UnhandledError {
                                snap_id: snap_id.clone(),
                                message: error.message,
                            });
                        }
                    }
                }
            }
        });

        Self {
            command,
            pending,
            reader_task,
        }
    }

    /// Send `request` and wait for its matching response, or
    /// [`ServiceError::Rpc`] if the transport closes first.
    pub async fn call(&self, request: RpcRequest) -> Result<RpcResponse, ServiceError> {
        let id = request.id.clone();
        let Some(id) = id else {
            // Fire-and-forget notifications have no response to correlate.
            self.command
                .lock()
                .await
                .send(&request)
                .await
                .map_err(ServiceError::Transport)?;
            return Ok(RpcResponse {
                jsonrpc: "2.0".to_string(),
                id: None,
                result: Some(serde_json::Value::Null),
                error: None,
            });
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);

        if let Err(e) = self.command.lock().await.send(&request).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(ServiceError::Transport(e));
        }

        match rx.await {
            Ok(response) => Ok(response),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(ServiceError::Terminated)
            }
        }
    }

    /// Send `request` and wait up to `timeout` for its response.
    /// Returns [`ServiceError::HandshakeTimeout`] on expiry — used by
    /// the post-spawn handshake and by liveness polling. On expiry the
    /// pending entry is removed so a response that never arrives
    /// doesn't linger in the map.
    pub async fn call_with_timeout(
        &self,
        request: RpcRequest,
        timeout: Duration,
    ) -> Result<RpcResponse, ServiceError> {
        let id = request.id.clone();
        let result = tokio::time::timeout(timeout, self.call(request)).await;
        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                if let Some(id) = id {
                    self.pending.lock().unwrap().remove(&id);
                }
                Err(ServiceError::HandshakeTimeout)
            }
        }
    }

    /// Drain every pending call, rejecting each with
    /// [`ServiceError::Terminated`] rather than leaving it dangling
    /// forever. Dropping the corresponding `oneshot::Sender` achieves
    /// the same thing for callers already awaiting `rx`, but this also
    /// clears entries nobody is awaiting yet.
    pub fn reject_all_pending(&self) {
        let mut pending = self.pending.lock().unwrap();
        pending.clear();
    }
}

impl Drop for RpcEngine {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
