//! The `wallet` snap provider: a JSON-RPC inpage provider bound to the
//! `jsonRpc` substream, augmented with `registerRpcMessageHandler`. This
//! crate treats the channel's payload shape as opaque — it reuses
//! [`snap_protocol::rpc`]'s envelope types only because that happens to
//! match the wallet provider's own wire shape, not because this crate
//! interprets its method names.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use rquickjs::promise::MaybePromise;
use rquickjs::{Ctx, Exception, Function, Object, Persistent, Result, Value};
use snap_protocol::{RpcId, RpcRequest, RpcResponse};

struct PendingCall {
    resolve: Persistent<Function<'static>>,
    reject: Persistent<Function<'static>>,
}

/// Shared state for the `wallet` object. Not `Send` — owned by the
/// single thread running the compartment. The dispatch loop (not this
/// module) owns the actual `jsonRpc` substream and drives
/// [`Provider::drain_outbound`]/[`Provider::resolve`] between turns, the
/// same cooperative-scheduling shape the timer queue uses.
#[derive(Default)]
pub struct Provider {
    outbox: std::cell::RefCell<VecDeque<serde_json::Value>>,
    pending: std::cell::RefCell<HashMap<RpcId, PendingCall>>,
    handler: std::cell::RefCell<Option<Persistent<Function<'static>>>>,
}

impl Provider {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Drain every request staged by `wallet.request` since the last
    /// call, in the order they were made.
    pub fn drain_outbound(&self) -> Vec<serde_json::Value> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    /// Resolve (or reject) the pending call this response answers.
    /// Unmatched ids (already resolved, or never ours) are dropped with
    /// a warning — the jsonRpc channel is otherwise opaque to us.
    pub fn settle(&self, ctx: &Ctx<'_>, response: RpcResponse) -> Result<()> {
        let Some(id) = response.id.clone() else {
            tracing::warn!("jsonRpc channel carried a response with no id");
            return Ok(());
        };
        let Some(call) = self.pending.borrow_mut().remove(&id) else {
            tracing::warn!(%id, "jsonRpc response for unknown or already-settled call");
            return Ok(());
        };
        if let Some(error) = response.error {
            let reject = call.reject.restore(ctx)?;
            reject.call::<_, ()>((error.message.clone(),))?;
        } else {
            let resolve = call.resolve.restore(ctx)?;
            let result = response.result.unwrap_or(serde_json::Value::Null);
            let value: Value = ctx.json_parse(serde_json::to_string(&result).unwrap_or_default())?;
            resolve.call::<_, ()>((value,))?;
        }
        Ok(())
    }

    /// Invoke the registered `registerRpcMessageHandler` callback with
    /// `(origin, request)`, awaiting a returned promise if the snap's
    /// handler is async.
    pub fn invoke_handler(
        &self,
        ctx: &Ctx<'_>,
        origin: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let Some(handler) = self.handler.borrow().clone() else {
            return Err(Exception::throw_type(ctx, "no RPC message handler registered"));
        };
        let handler = handler.restore(ctx)?;
        let request_value: Value = ctx.json_parse(serde_json::to_string(&request).unwrap_or_default())?;
        let promise: MaybePromise = handler.call((origin, request_value))?;
        let result: Value = promise.finish()?;
        let json = ctx
            .json_stringify(result)?
            .map(|s| s.to_string())
            .transpose()?
            .unwrap_or_else(|| "null".to_string());
        Ok(serde_json::from_str(&json).unwrap_or(serde_json::Value::Null))
    }

    /// Clear the registered handler, if any. Called when a snap's
    /// `executeSnap` evaluation throws, so a half-initialized snap never
    /// answers `snapRpc`.
    pub fn clear_handler(&self) {
        self.handler.borrow_mut().take();
    }

    fn register_handler(&self, ctx: &Ctx<'_>, handler: Function<'_>) -> Result<()> {
        let mut slot = self.handler.borrow_mut();
        if slot.is_some() {
            return Err(Exception::throw_type(ctx, "already registered"));
        }
        *slot = Some(Persistent::save(ctx, handler));
        Ok(())
    }

    fn request<'js>(&self, ctx: &Ctx<'js>, args: Value<'js>) -> Result<rquickjs::Promise<'js>> {
        let method: String = args.as_object().and_then(|o| o.get("method").ok()).ok_or_else(|| {
            Exception::throw_type(ctx, "request() expects { method, params? }")
        })?;
        let params = args
            .as_object()
            .and_then(|o| o.get::<_, Value>("params").ok())
            .unwrap_or_else(|| Value::new_undefined(ctx.clone()));
        let params_json = ctx
            .json_stringify(params)?
            .map(|s| s.to_string())
            .transpose()?
            .unwrap_or_else(|| "null".to_string());
        let params_value: serde_json::Value = serde_json::from_str(&params_json).unwrap_or(serde_json::Value::Null);

        let req = RpcRequest::new(method, params_value);
        let id = req.id.clone().expect("RpcRequest::new always mints an id");

        let (promise, resolve, reject) = rquickjs::Promise::new(ctx)?;
        self.pending.borrow_mut().insert(
            id,
            PendingCall {
                resolve: Persistent::save(ctx, resolve),
                reject: Persistent::save(ctx, reject),
            },
        );
        self.outbox
            .borrow_mut()
            .push_back(serde_json::to_value(&req).unwrap_or(serde_json::Value::Null));
        Ok(promise)
    }
}

pub fn install(ctx: &Ctx<'_>, provider: Rc<Provider>) -> Result<()> {
    let wallet = Object::new(ctx.clone())?;

    let request_provider = provider.clone();
    let request = Function::new(ctx.clone(), move |ctx: Ctx<'_>, args: Value<'_>| {
        request_provider.request(&ctx, args)
    })?
    .with_name("request")?;
    wallet.set("request", request)?;

    let register_provider = provider;
    let register = Function::new(ctx.clone(), move |ctx: Ctx<'_>, handler: Function<'_>| {
        register_provider.register_handler(&ctx, handler)
    })?
    .with_name("registerRpcMessageHandler")?;
    wallet.set("registerRpcMessageHandler", register)?;

    ctx.globals().set("wallet", wallet)?;
    Ok(())
}
