//! The worker controller: owns the compartment, installs lockdown and
//! the endowment bag once, then evaluates exactly one snap's source and
//! serves its `snapRpc`/background traffic for the rest of the
//! process's life.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context as _, bail};
use rquickjs::{CatchResultExt, Context, Runtime};
use snap_protocol::{ExecuteSnapParams, RpcResponse, SnapRpcParams};

use crate::endowments::{self, TimerQueue};
use crate::lockdown::{self, TamingConfig};
use crate::provider::{self, Provider};

/// Adapts `rquickjs::Result` into `anyhow::Result` — the engine's own
/// `CatchResultExt` only attaches the JS stack, not an `anyhow::Error`.
trait CatchJsErrorExt {
    type Ok;
    fn catch(self, ctx: &rquickjs::Ctx<'_>) -> anyhow::Result<Self::Ok>;
}

impl<T> CatchJsErrorExt for rquickjs::Result<T> {
    type Ok = T;
    fn catch(self, ctx: &rquickjs::Ctx<'_>) -> anyhow::Result<T> {
        match CatchResultExt::catch(self, ctx) {
            Ok(v) => Ok(v),
            Err(e) => Err(anyhow::anyhow!("snap evaluation error: {e:#?}")),
        }
    }
}

/// One compartment, one snap, for the life of this controller — one
/// snap per isolate, for good.
pub struct WorkerController {
    _runtime: Runtime,
    context: Context,
    timers: Rc<TimerQueue>,
    provider: Rc<Provider>,
    snap_id: RefCell<Option<String>>,
}

impl WorkerController {
    pub fn new(now_ms: impl Fn() -> f64 + 'static) -> anyhow::Result<Self> {
        lockdown::lockdown(TamingConfig::required());

        let runtime = Runtime::new().context("creating the QuickJS runtime")?;
        let context = Context::full(&runtime).context("creating the compartment")?;
        let timers = TimerQueue::new();
        let provider = Provider::new();

        context.with(|ctx| -> anyhow::Result<()> {
            endowments::install(&ctx, timers.clone(), now_ms).catch(&ctx)
        })?;

        Ok(Self {
            _runtime: runtime,
            context,
            timers,
            provider,
            snap_id: RefCell::new(None),
        })
    }

    /// Whether a snap has already been (successfully) evaluated in this
    /// compartment. One worker serves exactly one snap.
    pub fn is_loaded(&self) -> bool {
        self.snap_id.borrow().is_some()
    }

    /// Evaluate a snap's source once. Validates `snapId`/`sourceCode`
    /// are non-empty, installs the `wallet` provider and the `window`
    /// shadow, then runs the source synchronously. A throw clears the
    /// handler slot and is reported to the caller, but never panics or
    /// tears down the process — termination is the service's job.
    pub fn execute_snap(&self, params: ExecuteSnapParams) -> anyhow::Result<()> {
        if params.snap_id.trim().is_empty() {
            bail!("snapId must be a non-empty string");
        }
        if params.source_code.trim().is_empty() {
            bail!("sourceCode must be a non-empty string");
        }
        if self.is_loaded() {
            bail!("a snap has already been executed in this worker");
        }

        let result = self.context.with(|ctx| -> anyhow::Result<()> {
            provider::install(&ctx, self.provider.clone()).catch(&ctx)?;
            endowments::mirror_to_window(&ctx).catch(&ctx)?;
            ctx.eval::<(), _>(params.source_code.as_str()).catch(&ctx)
        });

        match result {
            Ok(()) => {
                *self.snap_id.borrow_mut() = Some(params.snap_id);
                Ok(())
            }
            Err(e) => {
                tracing::error!(snap_id = %params.snap_id, error = %e, "snap evaluation failed");
                self.provider.clear_handler();
                Err(e)
            }
        }
    }

    /// Invoke the snap's registered `registerRpcMessageHandler` with
    /// `(origin, request)` and return its resolved result. Rejects if
    /// `target` doesn't name the snap loaded into this worker — one
    /// worker serves exactly one snap, so any other `target` is
    /// unreachable here, not merely "no handler registered".
    pub fn handle_snap_rpc(&self, params: SnapRpcParams) -> anyhow::Result<serde_json::Value> {
        match self.snap_id.borrow().as_deref() {
            Some(loaded) if loaded == params.target => {}
            Some(_) | None => bail!("no snap {:?} loaded in this worker", params.target),
        }
        self.context.with(|ctx| {
            self.provider
                .invoke_handler(&ctx, &params.origin, params.request.clone())
                .catch(&ctx)
        })
    }

    /// Settle a pending `wallet.request()` call with the response that
    /// arrived on the `jsonRpc` substream.
    pub fn settle_jsonrpc(&self, response: RpcResponse) -> anyhow::Result<()> {
        self.context
            .with(|ctx| self.provider.settle(&ctx, response).catch(&ctx))
    }

    /// Fire any due timers and drain whatever `wallet.request` calls
    /// have staged since the last drain. Called by the dispatch loop
    /// between turns — never concurrently with `execute_snap`/
    /// `handle_snap_rpc`, since the compartment runs one turn at a time.
    pub fn drain_background(&self) -> anyhow::Result<Vec<serde_json::Value>> {
        self.context.with(|ctx| -> anyhow::Result<Vec<serde_json::Value>> {
            self.timers.drain_ready(&ctx).catch(&ctx)?;
            Ok(self.provider.drain_outbound())
        })
    }

    /// The earliest pending timer deadline, for sizing the dispatch
    /// loop's idle sleep.
    pub fn next_timer_due(&self) -> Option<Instant> {
        self.timers.next_due()
    }
}
