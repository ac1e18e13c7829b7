//! One running snap's job: the isolate that hosts it, the JSON-RPC
//! engine driving its `command` channel, and the liveness poll that
//! watches it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{Level, instrument};

use crate::error::ServiceError;
use crate::isolate::{DuplexTransport, Isolate};
use crate::messenger::{ServiceEvent, ServiceMessenger};
use crate::rpc_engine::RpcEngine;

/// RAII guard aborting the liveness-polling task on drop.
struct LivenessTask(JoinHandle<()>);

impl Drop for LivenessTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A live job: one isolate, one snap, one command-channel RPC engine.
/// Outlives the `executeSnap` call that created it; destroyed only by
/// `terminate_snap`/`terminate_all_snaps`.
pub struct Job {
    pub job_id: String,
    pub snap_id: String,
    isolate: Isolate,
    rpc: Arc<RpcEngine>,
    jsonrpc: Option<snap_protocol::Substream>,
    liveness: Option<LivenessTask>,
}

impl Job {
    /// Spawn an isolate for `snap_id`, confirm it with a `ping`
    /// handshake, and wire up its RPC engine. Does not yet send
    /// `executeSnap` — that is the caller's next step.
    #[instrument(err(Debug), skip(messenger), level = Level::INFO)]
    pub async fn spawn_in_process(
        job_id: String,
        snap_id: String,
        create_window_timeout: Duration,
        messenger: ServiceMessenger,
    ) -> Result<Self, ServiceError> {
        let (isolate, transport) =
            Isolate::spawn_in_process(&snap_id, create_window_timeout).await?;
        Ok(Self::from_parts(job_id, snap_id, isolate, transport, messenger))
    }

    /// Same as [`Job::spawn_in_process`] but for the child-process
    /// transport, given the path to the `snap-worker` binary.
    #[instrument(err(Debug), skip(messenger), level = Level::INFO)]
    pub async fn spawn_child_process(
        job_id: String,
        snap_id: String,
        worker_binary: std::path::PathBuf,
        create_window_timeout: Duration,
        messenger: ServiceMessenger,
    ) -> Result<Self, ServiceError> {
        let (isolate, transport) =
            Isolate::spawn_child_process(&worker_binary, &snap_id, create_window_timeout).await?;
        Ok(Self::from_parts(job_id, snap_id, isolate, transport, messenger))
    }

    fn from_parts(
        job_id: String,
        snap_id: String,
        isolate: Isolate,
        transport: DuplexTransport,
        messenger: ServiceMessenger,
    ) -> Self {
        let rpc = Arc::new(RpcEngine::new(transport.command, snap_id.clone(), messenger));
        Self {
            job_id,
            snap_id,
            isolate,
            rpc,
            jsonrpc: Some(transport.jsonrpc),
            liveness: None,
        }
    }

    /// Send `executeSnap` over the command channel and wait for its
    /// response.
    pub async fn execute(&self, source_code: String) -> Result<serde_json::Value, ServiceError> {
        let params = snap_protocol::ExecuteSnapParams {
            snap_id: self.snap_id.clone(),
            source_code,
        };
        let request = snap_protocol::RpcRequest::new(
            "executeSnap",
            serde_json::to_value(params).expect("ExecuteSnapParams always serializes"),
        );
        let response = self.rpc.call(request).await?;
        match response.error {
            Some(e) => Err(ServiceError::EvaluationFailed(e.message)),
            None => Ok(response.result.unwrap_or(serde_json::Value::Null)),
        }
    }

    /// Invoke the snap's registered RPC handler with `origin`/`request`.
    pub async fn snap_rpc(
        &self,
        origin: String,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        self.handle().snap_rpc(origin, request).await
    }

    /// A cheap-to-clone handle onto this job's RPC engine. Callers that
    /// need to await an RPC round-trip should take a handle and drop any
    /// registry lock first — holding the registry locked across a whole
    /// `snapRpc` call would serialize every other snap behind it.
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            snap_id: self.snap_id.clone(),
            rpc: self.rpc.clone(),
        }
    }

    /// Hand the `jsonRpc` substream to the external snap-provider setup
    /// collaborator and start liveness polling. Must be called at most
    /// once, after a successful [`Job::execute`].
    pub fn begin_serving(
        &mut self,
        polling_interval: Duration,
        unresponsive_timeout: Duration,
        messenger: ServiceMessenger,
    ) -> Option<snap_protocol::Substream> {
        self.liveness = Some(LivenessTask(self.spawn_liveness_task(
            polling_interval,
            unresponsive_timeout,
            messenger,
        )));
        self.jsonrpc.take()
    }

    fn spawn_liveness_task(
        &self,
        polling_interval: Duration,
        unresponsive_timeout: Duration,
        messenger: ServiceMessenger,
    ) -> JoinHandle<()> {
        let snap_id = self.snap_id.clone();
        let rpc = self.rpc.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(polling_interval).await;
                let request = snap_protocol::RpcRequest::new("ping", serde_json::Value::Null);
                let outcome = rpc.call_with_timeout(request, unresponsive_timeout).await;
                match outcome {
                    Ok(response) if response.is_ok() => continue,
                    _ => {
                        crate::metrics::record_unresponsive();
                        messenger.publish(ServiceEvent::Unresponsive { snap_id });
                        return;
                    }
                }
            }
        })
    }

    /// Tear the job down: abort liveness polling, reject every pending
    /// RPC call, and destroy the isolate.
    pub async fn terminate(mut self) {
        self.liveness.take();
        self.rpc.reject_all_pending();
        self.isolate.destroy().await;
    }
}

/// A cloned-out reference to one job's RPC engine, independent of the
/// job record itself and of whatever lock guards it.
pub struct JobHandle {
    snap_id: String,
    rpc: Arc<RpcEngine>,
}

impl JobHandle {
    /// Invoke the snap's registered RPC handler with `origin`/`request`.
    pub async fn snap_rpc(
        &self,
        origin: String,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        let params = snap_protocol::SnapRpcParams {
            origin,
            request,
            target: self.snap_id.clone(),
        };
        let rpc_request = snap_protocol::RpcRequest::new(
            "snapRpc",
            serde_json::to_value(params).expect("SnapRpcParams always serializes"),
        );
        let response = self.rpc.call(rpc_request).await?;
        match response.error {
            Some(e) => Err(ServiceError::Rpc(e.message)),
            None => Ok(response.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}
