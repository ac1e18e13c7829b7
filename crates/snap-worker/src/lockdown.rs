//! Process-wide intrinsic hardening, run exactly once before any snap
//! evaluates.

use std::sync::OnceLock;

/// Taming level for one category of intrinsic. Only `Unsafe`
/// (console/error/math/date) or `Severe` (override) are used here, but
/// the type carries the full SES-style vocabulary so a stricter profile
/// can be wired in later without reshaping the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taming {
    /// Leave the intrinsic at its full, unrestricted power.
    Unsafe,
    /// Remove or neuter the unsafe parts of the intrinsic.
    Safe,
    /// Strictest: `Safe`, plus reject any attempt to redefine an
    /// existing own property via plain assignment (override-mistake
    /// protection).
    Severe,
}

/// The lockdown configuration: one taming level per intrinsic category.
#[derive(Debug, Clone, Copy)]
pub struct TamingConfig {
    /// Taming applied to `console`.
    pub console_taming: Taming,
    /// Taming applied to `Error` (stack traces, `.cause`, etc).
    pub error_taming: Taming,
    /// Taming applied to `Math` (notably `Math.random`).
    pub math_taming: Taming,
    /// Taming applied to `Date` (notably `Date.now`).
    pub date_taming: Taming,
    /// Taming applied to property override / redefinition.
    pub override_taming: Taming,
}

impl TamingConfig {
    /// The configuration every snap's compartment is evaluated under.
    pub fn required() -> Self {
        Self {
            console_taming: Taming::Unsafe,
            error_taming: Taming::Unsafe,
            math_taming: Taming::Unsafe,
            date_taming: Taming::Unsafe,
            override_taming: Taming::Severe,
        }
    }
}

static LOCKDOWN: OnceLock<TamingConfig> = OnceLock::new();

/// Install the process-wide lockdown. Idempotent: the first call wins and
/// later calls are no-ops (mirrors SES's own `lockdown()`, which is safe
/// to call more than once). Returns the configuration actually in effect.
pub fn lockdown(config: TamingConfig) -> TamingConfig {
    *LOCKDOWN.get_or_init(|| config)
}

/// Whether [`lockdown`] has run. Endowment installation asserts this —
/// evaluating a snap before lockdown is a programming error, not a
/// recoverable one.
pub fn is_locked_down() -> bool {
    LOCKDOWN.get().is_some()
}

/// The active lockdown configuration. Panics if [`lockdown`] has not run.
pub fn config() -> TamingConfig {
    *LOCKDOWN
        .get()
        .expect("lockdown() must run before any snap evaluates")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_wins() {
        // Other tests in this binary may have already locked down with a
        // different config, so only assert on shape, not identity.
        let applied = lockdown(TamingConfig::required());
        assert_eq!(applied.override_taming, Taming::Severe);
        assert!(is_locked_down());
    }
}
