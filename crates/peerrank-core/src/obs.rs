//! Structured observability hooks for the epoch lifecycle.
//!
//! This module provides:
//! - The epoch-scoped `peerrank.epoch` span
//! - Emission functions for lifecycle events: start, stage change, dispatch
//!   summary, finish, persistence failures
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::{info, warn};

/// Span wrapping one epoch; every event inside carries `epoch`.
///
/// ```ignore
/// run_epoch().instrument(epoch_span(42)).await;
/// ```
pub fn epoch_span(epoch: u64) -> tracing::Span {
    tracing::info_span!("peerrank.epoch", epoch = epoch)
}

/// Emit event: epoch started against a participant population.
pub fn emit_epoch_started(epoch: u64, population: usize) {
    info!(event = "epoch.started", epoch, population);
}

/// Emit event: scheduler entered a new stage.
pub fn emit_stage_entered(epoch: u64, stage: &str) {
    info!(event = "epoch.stage", epoch, stage = %stage);
}

/// Emit event: dispatch round closed.
pub fn emit_dispatch_completed(epoch: u64, dispatched: usize, valid: usize, rejected: usize) {
    info!(
        event = "dispatch.completed",
        epoch,
        dispatched,
        valid,
        rejected,
        non_responded = dispatched.saturating_sub(valid),
    );
}

/// Emit event: epoch finished with its summary counts.
pub fn emit_epoch_finished(
    epoch: u64,
    duration_ms: u64,
    scored: usize,
    total_reward: f64,
    persisted: bool,
) {
    info!(
        event = "epoch.finished",
        epoch,
        duration_ms,
        scored,
        total_reward,
        persisted,
    );
}

/// Emit event: ledger persistence failed (warning level).
pub fn emit_ledger_persist_error(epoch: u64, error: &dyn std::fmt::Display) {
    warn!(event = "ledger.persist_error", epoch, error = %error);
}

/// Emit event: weight publication failed (warning level).
pub fn emit_publish_error(epoch: u64, error: &dyn std::fmt::Display) {
    warn!(event = "weights.publish_error", epoch, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_events_inside_epoch_span_carry_epoch() {
        epoch_span(3).in_scope(|| emit_stage_entered(3, "dispatching"));
        assert!(logs_contain("peerrank.epoch"));
        assert!(logs_contain("epoch.stage"));
        assert!(logs_contain("dispatching"));
    }
}
