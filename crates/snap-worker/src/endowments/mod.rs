//! The endowment bag: the closed, enumerated set of globals every
//! compartment gets, installed once right after lockdown and before the
//! snap's source ever evaluates.
//!
//! `BigInt`, `Uint8Array` and `ArrayBuffer` need no setup of their own —
//! `Context::full` already exposes the engine's native constructors for
//! them — so this module only installs the endowments that need a host
//! bridge: `console`, `crypto`, `Date`, `fetch`/`WebSocket`/
//! `XMLHttpRequest`, `Math` (native, untouched) and the cooperative
//! `setTimeout`/`clearTimeout` pair.

mod console;
mod crypto;
mod date;
mod network;
mod timers;

use std::rc::Rc;

use rquickjs::{Ctx, Object, Result, Value};

pub use timers::TimerQueue;

/// Every name a compartment's global object and `window` shadow carry
/// after a snap's own `executeSnap` call finishes installing the
/// provider. `wallet` is installed separately by [`crate::provider`],
/// after the transport's `jsonRpc` substream exists — this list still
/// names it so the `window` mirror stays in one place.
pub const NAMES: &[&str] = &[
    "BigInt",
    "Uint8Array",
    "ArrayBuffer",
    "console",
    "crypto",
    "Date",
    "fetch",
    "Math",
    "setTimeout",
    "clearTimeout",
    "WebSocket",
    "XMLHttpRequest",
    "wallet",
];

/// Install every endowment except `wallet` (installed by the caller via
/// [`crate::provider`] once the transport is available) and the `Date`
/// host-time patch's clock source.
pub fn install(ctx: &Ctx<'_>, timers: Rc<TimerQueue>, now_ms: impl Fn() -> f64 + 'static) -> Result<()> {
    console::install(ctx)?;
    crypto::install(ctx)?;
    date::install(ctx, now_ms)?;
    network::install(ctx)?;
    timers::install(ctx, timers)?;
    Ok(())
}

/// Mirror every installed endowment onto a `window` global that aliases
/// the same values, for snap source that expects a browser-shaped
/// global scope. Called last, after `wallet` has been installed, so the
/// mirror is complete.
pub fn mirror_to_window(ctx: &Ctx<'_>) -> Result<()> {
    let globals = ctx.globals();
    let window = Object::new(ctx.clone())?;
    for name in NAMES {
        if let Ok(value) = globals.get::<_, Value>(*name) {
            window.set(*name, value)?;
        }
    }
    globals.set("window", window)?;
    Ok(())
}
