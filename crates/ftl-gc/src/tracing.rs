//! Reclamation tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! spans and events for the collector. Without it every helper compiles to
//! nothing.

#[cfg(feature = "tracing")]
pub mod internal {
    use tracing::{span, Level};

    use crate::error::{GcDiagnostic, GcError};
    use crate::gc::policy::PolicyKind;
    use crate::gc::reclaim::ReclaimState;

    /// Create a span for one state-machine step of a reclamation.
    ///
    /// `reclaim_id` correlates every step of the same reclamation.
    pub fn trace_reclaim_step(die: usize, reclaim_id: u64, state: ReclaimState) -> span::EnteredSpan {
        span!(
            Level::DEBUG,
            "gc_reclaim_step",
            die,
            reclaim_id,
            state = ?state
        )
        .entered()
    }

    /// Log a state transition.
    pub fn log_state_transition(die: usize, from: ReclaimState, to: ReclaimState) {
        tracing::trace!(die, from = ?from, to = ?to, "state_transition");
    }

    /// Log the admission of an idle die.
    pub fn log_admission(die: usize, free_blocks: usize) {
        tracing::debug!(die, free_blocks, "admission");
    }

    /// Log a manual trigger.
    pub fn log_trigger(die: usize, armed: bool) {
        tracing::debug!(die, armed, "manual_trigger");
    }

    /// Log a selected victim.
    pub fn log_victim_selected(die: usize, block: usize, score: u64, policy: PolicyKind) {
        tracing::debug!(die, block, score, policy = %policy, "victim_selected");
    }

    /// Log a selection that found nothing.
    pub fn log_no_candidate(die: usize) {
        tracing::debug!(die, "no_candidate");
    }

    /// Log an erased victim.
    pub fn log_erase(die: usize, block: usize, pages_copied: usize, steps: usize) {
        tracing::debug!(die, block, pages_copied, steps, "block_erased");
    }

    /// Log a generation flip.
    pub fn log_generation_flip(tick: u64, parity: Option<bool>) {
        tracing::debug!(tick, parity = ?parity, "generation_flip");
    }

    /// Report a diagnostic.
    pub fn log_diagnostic(diagnostic: &GcDiagnostic) {
        tracing::warn!(diagnostic = %diagnostic, "gc_diagnostic");
    }

    /// Report a die whose step failed; it is retried on the next visit.
    pub fn log_step_failure(die: usize, error: &GcError) {
        tracing::warn!(die, error = %error, "gc_step_failed");
    }

    /// Report flash exhaustion.
    pub fn log_flash_exhausted(die: usize) {
        tracing::error!(die, "flash_exhausted");
    }
}

#[cfg(not(feature = "tracing"))]
#[allow(clippy::missing_const_for_fn)]
pub mod internal {
    use crate::error::{GcDiagnostic, GcError};
    use crate::gc::policy::PolicyKind;
    use crate::gc::reclaim::ReclaimState;

    /// Stub span guard when tracing is disabled.
    #[derive(Debug)]
    pub struct NoopSpan;

    /// Stub function when tracing is disabled.
    pub fn trace_reclaim_step(_die: usize, _reclaim_id: u64, _state: ReclaimState) -> NoopSpan {
        NoopSpan
    }

    /// Stub function when tracing is disabled.
    pub fn log_state_transition(_die: usize, _from: ReclaimState, _to: ReclaimState) {}

    /// Stub function when tracing is disabled.
    pub fn log_admission(_die: usize, _free_blocks: usize) {}

    /// Stub function when tracing is disabled.
    pub fn log_trigger(_die: usize, _armed: bool) {}

    /// Stub function when tracing is disabled.
    pub fn log_victim_selected(_die: usize, _block: usize, _score: u64, _policy: PolicyKind) {}

    /// Stub function when tracing is disabled.
    pub fn log_no_candidate(_die: usize) {}

    /// Stub function when tracing is disabled.
    pub fn log_erase(_die: usize, _block: usize, _pages_copied: usize, _steps: usize) {}

    /// Stub function when tracing is disabled.
    pub fn log_generation_flip(_tick: u64, _parity: Option<bool>) {}

    /// Stub function when tracing is disabled.
    pub fn log_diagnostic(_diagnostic: &GcDiagnostic) {}

    /// Stub function when tracing is disabled.
    pub fn log_step_failure(_die: usize, _error: &GcError) {}

    /// Stub function when tracing is disabled.
    pub fn log_flash_exhausted(_die: usize) {}
}
