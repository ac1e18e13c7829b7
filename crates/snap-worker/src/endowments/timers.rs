//! `setTimeout`/`clearTimeout` endowments, backed by a cooperative timer
//! queue: one snap's evaluation never preempts, or is preempted by,
//! another turn — timers only fire between dispatched commands, never
//! mid-evaluation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rquickjs::prelude::Opt;
use rquickjs::{Ctx, Function, Persistent, Result};

struct Entry {
    due: Instant,
    callback: Persistent<Function<'static>>,
}

/// Pending `setTimeout` callbacks for one compartment. Not `Send` —
/// lives on the single thread that owns the compartment.
#[derive(Default)]
pub struct TimerQueue {
    next_id: RefCell<i32>,
    pending: RefCell<HashMap<i32, Entry>>,
}

impl TimerQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn schedule(&self, ctx: &Ctx<'_>, callback: Function<'_>, delay_ms: f64) -> i32 {
        let mut next_id = self.next_id.borrow_mut();
        let id = *next_id;
        *next_id = next_id.wrapping_add(1);
        drop(next_id);

        let due = Instant::now() + Duration::from_millis(delay_ms.max(0.0) as u64);
        let callback = Persistent::save(ctx, callback);
        self.pending.borrow_mut().insert(id, Entry { due, callback });
        id
    }

    fn cancel(&self, id: i32) {
        self.pending.borrow_mut().remove(&id);
    }

    /// The earliest deadline still pending, if any. Used by the dispatch
    /// loop to size its next idle sleep.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.borrow().values().map(|e| e.due).min()
    }

    /// Invoke and remove every timer whose deadline has passed.
    pub fn drain_ready(&self, ctx: &Ctx<'_>) -> Result<()> {
        let now = Instant::now();
        let ready: Vec<Entry> = {
            let mut pending = self.pending.borrow_mut();
            let ready_ids: Vec<i32> = pending
                .iter()
                .filter(|(_, e)| e.due <= now)
                .map(|(id, _)| *id)
                .collect();
            ready_ids
                .into_iter()
                .filter_map(|id| pending.remove(&id))
                .collect()
        };
        for entry in ready {
            let callback = entry.callback.restore(ctx)?;
            callback.call::<_, ()>(())?;
        }
        Ok(())
    }
}

pub fn install(ctx: &Ctx<'_>, queue: Rc<TimerQueue>) -> Result<()> {
    let globals = ctx.globals();

    let set_queue = queue.clone();
    let set_timeout = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'_>, callback: Function<'_>, delay: Opt<f64>| -> i32 {
            set_queue.schedule(&ctx, callback, delay.0.unwrap_or(0.0))
        },
    )?
    .with_name("setTimeout")?;
    globals.set("setTimeout", set_timeout)?;

    let clear_queue = queue;
    let clear_timeout = Function::new(ctx.clone(), move |handle: Opt<i32>| {
        if let Some(id) = handle.0 {
            clear_queue.cancel(id);
        }
    })?
    .with_name("clearTimeout")?;
    globals.set("clearTimeout", clear_timeout)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn timer_fires_once_after_its_deadline() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let queue = TimerQueue::new();

        context
            .with(|ctx| -> Result<()> {
                install(&ctx, queue.clone())?;
                ctx.eval::<(), _>(
                    "globalThis.fired = 0; setTimeout(() => { globalThis.fired += 1; }, 0);",
                )?;
                Ok(())
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(5));

        context
            .with(|ctx| -> Result<()> {
                queue.drain_ready(&ctx)?;
                let fired: i32 = ctx.globals().get("fired")?;
                assert_eq!(fired, 1);
                queue.drain_ready(&ctx)?;
                let fired_again: i32 = ctx.globals().get("fired")?;
                assert_eq!(fired_again, 1, "timer must not fire twice");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn cleared_timer_never_fires() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let queue = TimerQueue::new();

        context
            .with(|ctx| -> Result<()> {
                install(&ctx, queue.clone())?;
                ctx.eval::<(), _>(
                    "globalThis.fired = false; const id = setTimeout(() => { globalThis.fired = true; }, 0); clearTimeout(id);",
                )?;
                Ok(())
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(5));

        context
            .with(|ctx| -> Result<()> {
                queue.drain_ready(&ctx)?;
                let fired: bool = ctx.globals().get("fired")?;
                assert!(!fired);
                Ok(())
            })
            .unwrap();
    }
}
