//! The execution environment service: the public surface wallets embed.
//! Owns the snap↔job registry and routes every operation to the right
//! job.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{Level, instrument};
use uuid::Uuid;

use crate::builder::ServiceConfig;
use crate::error::ServiceError;
use crate::job::Job;
use crate::messenger::ServiceMessenger;
use crate::metrics::{self, JobMetricsGuard};

/// A snap's registered JSON-RPC handler, callable by origin-routed
/// middleware outside this crate. Captures only the job's id and a
/// handle onto the registry, not the job record itself — no cyclic
/// ownership back into a job — so it re-resolves the live job on every
/// call. A hook outlives any one job without going stale in a way that
/// panics; it simply starts returning `UnknownSnap` once the job it
/// named is gone.
pub type SnapRpcHook = Arc<
    dyn Fn(String, serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value, ServiceError>>
        + Send
        + Sync,
>;

/// The external collaborator that wires a freshly executed snap's
/// `jsonRpc` substream into the wallet's own provider middleware.
/// Modeled as a trait rather than a bare closure so callers can hold
/// state (connections, loggers) behind it.
pub trait SnapProviderSetup: Send + Sync {
    fn setup(&self, snap_id: &str, jsonrpc: snap_protocol::Substream) -> BoxFuture<'static, ()>;
}

impl<F> SnapProviderSetup for F
where
    F: Fn(&str, snap_protocol::Substream) -> BoxFuture<'static, ()> + Send + Sync,
{
    fn setup(&self, snap_id: &str, jsonrpc: snap_protocol::Substream) -> BoxFuture<'static, ()> {
        (self)(snap_id, jsonrpc)
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, Job>,
    jobs_by_snap: HashMap<String, String>,
    hooks: HashMap<String, SnapRpcHook>,
    metric_guards: HashMap<String, JobMetricsGuard>,
}

/// The host-side execution environment service: spawns one isolated
/// worker per snap, drives it through spawn/execute/poll/terminate, and
/// routes origin-to-snap RPC calls.
pub struct ExecutionEnvironmentService {
    config: ServiceConfig,
    messenger: ServiceMessenger,
    provider_setup: Arc<dyn SnapProviderSetup>,
    registry: Arc<Mutex<Registry>>,
}

impl ExecutionEnvironmentService {
    pub fn new(config: ServiceConfig, provider_setup: Arc<dyn SnapProviderSetup>) -> Self {
        Self {
            messenger: ServiceMessenger::new(config.event_bus_capacity),
            config,
            provider_setup,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Subscribe to [`crate::messenger::ServiceEvent`]s (unresponsive
    /// isolates, unhandled errors).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::messenger::ServiceEvent> {
        self.messenger.subscribe()
    }

    /// Evaluate `source_code` for `snap_id` in a fresh isolate.
    /// Fails with [`ServiceError::AlreadyExecuting`] if `snap_id` has a
    /// live job already.
    #[instrument(err(Debug), skip(self, source_code), level = Level::INFO)]
    pub async fn execute_snap(
        &self,
        snap_id: String,
        source_code: String,
    ) -> Result<serde_json::Value, ServiceError> {
        {
            let registry = self.registry.lock().await;
            if registry.jobs_by_snap.contains_key(&snap_id) {
                return Err(ServiceError::AlreadyExecuting(snap_id));
            }
        }

        let job_id = Uuid::new_v4().to_string();
        let mut job = self.spawn_job(job_id.clone(), snap_id.clone()).await?;

        match job.execute(source_code).await {
            Ok(result) => {
                let jsonrpc = job.begin_serving(
                    self.config.unresponsive_polling_interval,
                    self.config.unresponsive_timeout,
                    self.messenger.clone(),
                );
                if let Some(jsonrpc) = jsonrpc {
                    self.provider_setup.setup(&snap_id, jsonrpc).await;
                }

                let hook = self.build_snap_rpc_hook(job_id.clone());

                let mut registry = self.registry.lock().await;
                registry.jobs.insert(job_id.clone(), job);
                registry
                    .jobs_by_snap
                    .insert(snap_id.clone(), job_id.clone());
                registry.hooks.insert(snap_id, hook);
                registry
                    .metric_guards
                    .insert(job_id, JobMetricsGuard::new());

                Ok(result)
            }
            Err(e) => {
                metrics::record_evaluation_failed();
                job.terminate().await;
                Err(e)
            }
        }
    }

    /// Terminate `snap_id`'s job. Fails with
    /// [`ServiceError::UnknownSnap`] if the snap has no live job — a
    /// caller error, surfaced synchronously rather than swallowed.
    #[instrument(err(Debug), skip(self), level = Level::INFO)]
    pub async fn terminate_snap(&self, snap_id: &str) -> Result<(), ServiceError> {
        let job = {
            let mut registry = self.registry.lock().await;
            let Some(job_id) = registry.jobs_by_snap.remove(snap_id) else {
                return Err(ServiceError::UnknownSnap(snap_id.to_string()));
            };
            registry.hooks.remove(snap_id);
            registry.metric_guards.remove(&job_id);
            registry.jobs.remove(&job_id)
        };
        if let Some(job) = job {
            job.terminate().await;
        }
        Ok(())
    }

    /// Terminate every live job. Best-effort; always succeeds.
    #[instrument(skip(self), level = Level::INFO)]
    pub async fn terminate_all_snaps(&self) {
        let jobs = {
            let mut registry = self.registry.lock().await;
            registry.jobs_by_snap.clear();
            registry.hooks.clear();
            registry.metric_guards.clear();
            std::mem::take(&mut registry.jobs)
        };
        for (_, job) in jobs {
            job.terminate().await;
        }
    }

    /// Look up `snap_id`'s registered RPC hook, if it has a live job.
    pub async fn get_rpc_message_handler(&self, snap_id: &str) -> Option<SnapRpcHook> {
        self.registry.lock().await.hooks.get(snap_id).cloned()
    }

    async fn spawn_job(&self, job_id: String, snap_id: String) -> Result<Job, ServiceError> {
        match &self.config.worker_binary {
            Some(binary) => {
                Job::spawn_child_process(
                    job_id,
                    snap_id,
                    binary.clone(),
                    self.config.create_window_timeout,
                    self.messenger.clone(),
                )
                .await
            }
            None => {
                Job::spawn_in_process(
                    job_id,
                    snap_id,
                    self.config.create_window_timeout,
                    self.messenger.clone(),
                )
                .await
            }
        }
    }

    fn build_snap_rpc_hook(&self, job_id: String) -> SnapRpcHook {
        let registry = self.registry.clone();
        Arc::new(move |origin: String, request: serde_json::Value| {
            let registry = registry.clone();
            let job_id = job_id.clone();
            Box::pin(async move {
                // Take a handle and release the registry lock before
                // awaiting the round-trip: holding it would serialize
                // every other snap's calls behind this one.
                let handle = {
                    let registry = registry.lock().await;
                    registry.jobs.get(&job_id).map(Job::handle)
                };
                match handle {
                    Some(handle) => handle.snap_rpc(origin, request).await,
                    None => Err(ServiceError::UnknownSnap(job_id)),
                }
            }) as BoxFuture<'static, Result<serde_json::Value, ServiceError>>
        })
    }
}
