//! Tracing hooks for request lifecycle events.
//!
//! Nothing here installs a subscriber; binaries and tests decide where the
//! events go.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "quarry", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}
