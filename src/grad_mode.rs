//! Switch for turning gradient tracking off inside a scope.
//!
//! While tracking is off, results of operations are still computed but come out as
//! leaves, and `backward`/`zero_grad` do nothing.
//!
//! Leaving a no-grad scope always turns tracking back on. Scopes are not a stack, so
//! nesting one inside another re-enables tracking for the rest of the outer scope.

use std::{cell::Cell, marker::PhantomData};

use log::debug;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether new operations record their producers.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

pub fn set_grad_enabled(enabled: bool) {
    let previous = GRAD_ENABLED.with(|flag| flag.replace(enabled));
    if previous != enabled {
        debug!("grad tracking {}", if enabled { "enabled" } else { "disabled" });
    }
}

/// RAII guard for a no-grad scope. Dropping it, including during unwinding, turns
/// tracking back on.
pub struct NoGradGuard {
    // The flag is per thread, so the guard must stay on the thread that created it.
    _not_send: PhantomData<*const ()>,
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl NoGradGuard {
    pub fn new() -> Self {
        set_grad_enabled(false);
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        set_grad_enabled(true);
    }
}

/// Runs `f` with gradient tracking disabled.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = NoGradGuard::new();
    f()
}
