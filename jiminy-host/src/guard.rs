//! Failure containment for plug-in code
//!
//! Plug-in units, creator classes and event callbacks are written by third
//! parties. Their errors and panics are turned into plain errors here so the
//! caller can log them and carry on with the next unit.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Extract a human-readable message from a panic payload
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run `f`, converting a panic into an error
pub(crate) fn isolate<T>(op: &str, f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panic in {op}: {}", panic_message(payload))),
    }
}
