//! `Date` endowment, patched to source `Date.now()` from the host
//! clock: the guest never reads the wall clock directly, so tests can
//! supply a fixed or stepped clock instead of real time.

use rquickjs::{Ctx, Function, Result};

pub fn install(ctx: &Ctx<'_>, now_ms: impl Fn() -> f64 + 'static) -> Result<()> {
    let date_ctor: rquickjs::Value = ctx.eval("Date")?;
    let date_now = Function::new(ctx.clone(), move || now_ms())?.with_name("now")?;
    let date_obj = date_ctor
        .as_object()
        .expect("Date is always an object")
        .clone();
    date_obj.set("now", date_now)?;
    Ok(())
}
