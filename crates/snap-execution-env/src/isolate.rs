//! Isolate containers: the two ways to stand up a
//! worker and get a multiplexed transport to it. The service only ever
//! holds an [`Isolate`], never a concrete container type, so swapping
//! the child-process leg for the in-process one changes nothing above
//! this module.

use std::time::Duration;

use snap_protocol::{Channel, Multiplexer, RpcRequest, Substream};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::task::JoinHandle;

use crate::error::ServiceError;

/// The two substreams every isolate, regardless of transport, hands
/// back to its caller.
pub struct DuplexTransport {
    pub command: Substream,
    pub jsonrpc: Substream,
}

/// A running worker and the means to stop it. `spawn` brings a worker
/// up and confirms it answers a `ping` within `create_window_timeout`;
/// `destroy` tears it down unconditionally.
pub enum Isolate {
    ChildProcess(ChildProcessContainer),
    InProcess(InProcessContainer),
}

impl Isolate {
    /// Start the child-process variant: the `snap-worker` binary,
    /// talking over its own stdin/stdout — the strong-isolation leg.
    pub async fn spawn_child_process(
        worker_binary: &std::path::Path,
        id: &str,
        create_window_timeout: Duration,
    ) -> Result<(Self, DuplexTransport), ServiceError> {
        let (container, transport) =
            ChildProcessContainer::spawn(worker_binary, id, create_window_timeout).await?;
        Ok((Isolate::ChildProcess(container), transport))
    }

    /// Start the in-process variant: the worker controller driven as a
    /// `tokio::task` over an in-memory duplex pipe — weaker, same-process
    /// isolation, used for embedding and fast tests.
    pub async fn spawn_in_process(
        id: &str,
        create_window_timeout: Duration,
    ) -> Result<(Self, DuplexTransport), ServiceError> {
        let (container, transport) =
            InProcessContainer::spawn(id, create_window_timeout).await?;
        Ok((Isolate::InProcess(container), transport))
    }

    pub async fn destroy(&mut self) {
        match self {
            Isolate::ChildProcess(c) => c.destroy().await,
            Isolate::InProcess(c) => c.destroy().await,
        }
    }
}

/// Confirms the worker on the other end of `transport`'s command
/// substream answers a bare `ping` before the caller trusts it. Shared
/// by both container variants.
async fn await_readiness(
    command: &mut Substream,
    timeout: Duration,
) -> Result<(), ServiceError> {
    let request = RpcRequest::new("ping", serde_json::Value::Null);
    let id = request.id.clone();
    command
        .send(&request)
        .await
        .map_err(ServiceError::Transport)?;

    tokio::time::timeout(timeout, async {
        loop {
            let Some(response) = command.recv::<snap_protocol::RpcResponse>().await else {
                return Err(ServiceError::HandshakeTimeout);
            };
            if response.id == id {
                return if response.is_ok() {
                    Ok(())
                } else {
                    Err(ServiceError::HandshakeTimeout)
                };
            }
            // A frame for a different id during the handshake window is
            // unexpected this early; ignore and keep waiting for ours.
        }
    })
    .await
    .map_err(|_| ServiceError::HandshakeTimeout)?
}

/// The strong-isolation leg: the worker runs as its own OS process.
pub struct ChildProcessContainer {
    child: Child,
    mux: Multiplexer,
}

impl ChildProcessContainer {
    async fn spawn(
        worker_binary: &std::path::Path,
        id: &str,
        create_window_timeout: Duration,
    ) -> Result<(Self, DuplexTransport), ServiceError> {
        let mut command = ProcessCommand::new(worker_binary);
        command
            .arg("--snap-id")
            .arg(id)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(ServiceError::Transport)?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let mut mux = Multiplexer::new(stdout, stdin, &[Channel::Command, Channel::JsonRpc]);
        let mut command_stream = mux.take(Channel::Command).expect("command channel");
        let jsonrpc_stream = mux.take(Channel::JsonRpc).expect("jsonRpc channel");

        if let Err(e) = await_readiness(&mut command_stream, create_window_timeout).await {
            let _ = child.start_kill();
            return Err(e);
        }

        Ok((
            Self { child, mux },
            DuplexTransport {
                command: command_stream,
                jsonrpc: jsonrpc_stream,
            },
        ))
    }

    async fn destroy(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(error = %e, "failed to signal child worker for termination");
        }
        let _ = self.child.wait().await;
    }
}

/// The weaker, same-process leg: the worker controller runs as a task
/// over an in-memory duplex pipe.
pub struct InProcessContainer {
    worker_task: JoinHandle<()>,
    mux: Multiplexer,
}

impl InProcessContainer {
    async fn spawn(
        id: &str,
        create_window_timeout: Duration,
    ) -> Result<(Self, DuplexTransport), ServiceError> {
        let (host_io, worker_io) = tokio::io::duplex(64 * 1024);
        let (host_read, host_write) = tokio::io::split(host_io);
        let (worker_read, worker_write) = tokio::io::split(worker_io);

        let snap_id = id.to_string();
        let worker_task = tokio::task::spawn_blocking(move || {
            // The worker controller is built on `!Send` rquickjs types
            // (`Rc`, `Persistent`), so it cannot run on a multi-thread
            // `tokio::task::spawn` directly. `spawn_blocking` gives it
            // its own OS thread; inside, a `current_thread` runtime
            // drives its dispatch loop exactly like the standalone
            // binary does in `main.rs`.
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(snap_id = %snap_id, error = %e, "failed to build in-process worker executor");
                    return;
                }
            };
            runtime.block_on(async move {
                let mut worker_mux =
                    Multiplexer::new(worker_read, worker_write, &[Channel::Command, Channel::JsonRpc]);
                let worker_command = worker_mux.take(Channel::Command).expect("command channel");
                let worker_jsonrpc = worker_mux.take(Channel::JsonRpc).expect("jsonRpc channel");

                let now_ms = || {
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs_f64()
                        * 1000.0
                };
                let controller = match snap_worker::WorkerController::new(now_ms) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to construct in-process compartment");
                        return;
                    }
                };
                if let Err(e) = snap_worker::run::serve(controller, worker_command, worker_jsonrpc).await {
                    tracing::warn!(error = %e, "in-process worker dispatch loop ended with an error");
                }
            });
        });

        let mut host_mux =
            Multiplexer::new(host_read, host_write, &[Channel::Command, Channel::JsonRpc]);
        let mut command_stream = host_mux.take(Channel::Command).expect("command channel");
        let jsonrpc_stream = host_mux.take(Channel::JsonRpc).expect("jsonRpc channel");

        if let Err(e) = await_readiness(&mut command_stream, create_window_timeout).await {
            worker_task.abort();
            return Err(e);
        }

        Ok((
            Self {
                worker_task,
                mux: host_mux,
            },
            DuplexTransport {
                command: command_stream,
                jsonrpc: jsonrpc_stream,
            },
        ))
    }

    async fn destroy(&mut self) {
        self.worker_task.abort();
    }
}
