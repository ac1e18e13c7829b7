//! The worker's command-dispatch loop. Shared by both
//! transport variants — the standalone binary drives it over stdio, and
//! `snap-execution-env`'s in-process container drives the exact same
//! function over an in-memory duplex — only the [`Substream`] plumbing
//! underneath differs.

use std::time::{Duration, Instant};

use snap_protocol::{Command, RpcRequest, RpcResponse, Substream};

use crate::controller::WorkerController;

/// The longest an idle loop iteration sleeps when no timer is pending.
/// Bounds how quickly a freshly staged `wallet.request()` call reaches
/// the wire even with nothing else happening.
const IDLE_TICK: Duration = Duration::from_millis(50);

/// Drive one worker's compartment to completion: dispatch `command`
/// traffic, settle `jsonRpc` responses, and fire timers / flush
/// outbound `wallet.request()` calls between turns. Returns once the
/// `command` substream closes (the parent transport was destroyed).
pub async fn serve(
    controller: WorkerController,
    mut command: Substream,
    mut jsonrpc: Substream,
) -> anyhow::Result<()> {
    loop {
        let sleep = next_sleep(&controller);

        tokio::select! {
            biased;

            request = command.recv::<RpcRequest>() => {
                let Some(request) = request else {
                    tracing::debug!("command channel closed, shutting down worker");
                    break;
                };
                dispatch_command(&controller, &command, request).await;
            }

            response = jsonrpc.recv::<RpcResponse>() => {
                let Some(response) = response else {
                    tracing::debug!("jsonRpc channel closed");
                    continue;
                };
                if let Err(e) = controller.settle_jsonrpc(response) {
                    tracing::warn!(error = %e, "failed to settle jsonRpc response");
                }
            }

            _ = tokio::time::sleep(sleep) => {}
        }

        flush_background(&controller, &command, &jsonrpc).await;
    }

    Ok(())
}

fn next_sleep(controller: &WorkerController) -> Duration {
    match controller.next_timer_due() {
        Some(due) => due.saturating_duration_since(Instant::now()).min(IDLE_TICK),
        None => IDLE_TICK,
    }
}

/// Fires due timers and flushes staged `wallet.request()` calls. A timer
/// callback (or any other background JS) throwing has no in-flight
/// command to answer, so it is pushed onto the `command` channel as an
/// id-less error frame instead — the host's only way to learn about an
/// error it never asked for.
async fn flush_background(controller: &WorkerController, command: &Substream, jsonrpc: &Substream) {
    let outbound = match controller.drain_background() {
        Ok(outbound) => outbound,
        Err(e) => {
            tracing::error!(error = %e, "unhandled error during background snap work");
            let frame = RpcResponse::err(None, e.to_string());
            if let Err(e) = command.send(&frame).await {
                tracing::warn!(error = %e, "failed to push unhandled-error frame");
            }
            return;
        }
    };
    for request in outbound {
        if let Err(e) = jsonrpc.send(&request).await {
            tracing::warn!(error = %e, "failed to send wallet.request over jsonRpc channel");
        }
    }
}

async fn dispatch_command(controller: &WorkerController, command: &Substream, request: RpcRequest) {
    let id = request.id.clone();
    let parsed = Command::try_from(&request);

    let response = match parsed {
        Ok(Command::Ping) => id.map(|id| RpcResponse::ok(id, serde_json::json!("OK"))),
        Ok(Command::ExecuteSnap(params)) => {
            let outcome = controller.execute_snap(params);
            id.map(|id| respond(id, outcome.map(|()| serde_json::json!("OK"))))
        }
        Ok(Command::SnapRpc(params)) => {
            let outcome = controller.handle_snap_rpc(params);
            id.map(|id| respond(id, outcome))
        }
        Err(e) => {
            tracing::warn!(method = %request.method, error = %e, "unrecognized or malformed command");
            id.map(|id| RpcResponse::err(Some(id), e.to_string()))
        }
    };

    if let Some(response) = response
        && let Err(e) = command.send(&response).await
    {
        tracing::warn!(error = %e, "failed to send command response");
    }
}

fn respond(id: snap_protocol::RpcId, outcome: anyhow::Result<serde_json::Value>) -> RpcResponse {
    match outcome {
        Ok(value) => RpcResponse::ok(id, value),
        Err(e) => RpcResponse::err(Some(id), e.to_string()),
    }
}
