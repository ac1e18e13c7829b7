//! `fetch`, `WebSocket` and `XMLHttpRequest` endowments. All three are
//! enumerated so `typeof fetch`/`typeof WebSocket`/`typeof
//! XMLHttpRequest` behave as a snap author expects, but none of them
//! reach a live transport — these names only need to exist in the
//! compartment; wiring a real network policy belongs to whatever
//! permissions layer sits above this crate, out of scope here (see
//! DESIGN.md).

use rquickjs::class::Trace;
use rquickjs::{Class, Ctx, Exception, JsLifetime, Result};

const UNAVAILABLE: &str = "network access not available in this runtime";

pub fn install(ctx: &Ctx<'_>) -> Result<()> {
    let fetch = rquickjs::Function::new(ctx.clone(), |ctx: Ctx<'_>, _url: String| -> Result<()> {
        Err(Exception::throw_type(&ctx, UNAVAILABLE))
    })?
    .with_name("fetch")?;
    ctx.globals().set("fetch", fetch)?;

    Class::<WebSocket>::define(&ctx.globals())?;
    Class::<XmlHttpRequest>::define(&ctx.globals())?;
    Ok(())
}

#[rquickjs::class()]
#[derive(Trace, JsLifetime)]
pub struct WebSocket {
    #[qjs(skip_trace)]
    url: String,
}

#[rquickjs::methods]
impl WebSocket {
    #[qjs(constructor)]
    pub fn new(url: String) -> Self {
        Self { url }
    }

    pub fn send(&self, ctx: Ctx<'_>, _data: rquickjs::Value<'_>) -> Result<()> {
        Err(Exception::throw_type(&ctx, UNAVAILABLE))
    }

    pub fn close(&self, ctx: Ctx<'_>) -> Result<()> {
        Err(Exception::throw_type(&ctx, UNAVAILABLE))
    }

    #[qjs(get)]
    pub fn url(&self) -> String {
        self.url.clone()
    }
}

#[rquickjs::class()]
#[derive(Trace, JsLifetime)]
pub struct XmlHttpRequest {}

#[rquickjs::methods]
impl XmlHttpRequest {
    #[qjs(constructor)]
    pub fn new() -> Self {
        Self {}
    }

    pub fn open(&self, ctx: Ctx<'_>, _method: String, _url: String) -> Result<()> {
        Err(Exception::throw_type(&ctx, UNAVAILABLE))
    }

    pub fn send(&self, ctx: Ctx<'_>) -> Result<()> {
        Err(Exception::throw_type(&ctx, UNAVAILABLE))
    }
}

impl Default for XmlHttpRequest {
    fn default() -> Self {
        Self::new()
    }
}
