//! `console` endowment: a thin bridge onto `tracing`, so a snap's
//! `console.log` shows up in the host's own structured logs instead of
//! a captured stdout buffer.

use rquickjs::prelude::Rest;
use rquickjs::{Ctx, Function, Object, Result, Value};

pub fn install(ctx: &Ctx<'_>) -> Result<()> {
    let console = Object::new(ctx.clone())?;
    console.set("log", log_fn(ctx, Level::Info)?)?;
    console.set("info", log_fn(ctx, Level::Info)?)?;
    console.set("warn", log_fn(ctx, Level::Warn)?)?;
    console.set("error", log_fn(ctx, Level::Error)?)?;
    console.set("debug", log_fn(ctx, Level::Debug)?)?;
    ctx.globals().set("console", console)?;
    Ok(())
}

#[derive(Clone, Copy)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

fn log_fn<'js>(ctx: &Ctx<'js>, level: Level) -> Result<Function<'js>> {
    Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
        let line = args
            .into_inner()
            .iter()
            .map(|v| stringify(&ctx, v))
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            Level::Debug => tracing::debug!(target: "snap", "{line}"),
            Level::Info => tracing::info!(target: "snap", "{line}"),
            Level::Warn => tracing::warn!(target: "snap", "{line}"),
            Level::Error => tracing::error!(target: "snap", "{line}"),
        }
    })
}

fn stringify(ctx: &Ctx<'_>, value: &Value<'_>) -> String {
    if let Some(s) = value.as_string() {
        return s.to_string().unwrap_or_default();
    }
    ctx.json_stringify(value.clone())
        .ok()
        .flatten()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| "undefined".to_string())
}
