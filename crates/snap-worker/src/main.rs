//! The child-process isolation variant ("dedicated worker" leg): a
//! standalone process that speaks the multiplexed protocol over its own
//! stdin/stdout, running on a single-threaded cooperative executor — a
//! `current_thread` Tokio runtime, since the compartment underneath is
//! not `Send`.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use snap_protocol::{Channel, Multiplexer};
use snap_worker::WorkerController;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building the worker's single-threaded executor")?;

    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let snap_id = snap_id_arg();
    tracing::info!(snap_id = snap_id.as_deref().unwrap_or("<unset>"), "worker starting");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let mut mux = Multiplexer::new(stdin, stdout, &[Channel::Command, Channel::JsonRpc]);
    let command = mux
        .take(Channel::Command)
        .context("command substream already taken")?;
    let jsonrpc = mux
        .take(Channel::JsonRpc)
        .context("jsonRpc substream already taken")?;

    let controller = WorkerController::new(host_now_ms).context("constructing the compartment")?;

    snap_worker::run::serve(controller, command, jsonrpc).await
}

/// The `--snap-id <id>` the host passed when spawning this process.
/// Purely informational here — the worker learns the authoritative
/// snapId from the `executeSnap` command itself — but worth surfacing
/// in startup logs before that command arrives.
fn snap_id_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--snap-id" {
            return args.next();
        }
    }
    None
}

fn host_now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}
