//! Reclamation metrics and statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics of one completed reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimMetrics {
    /// Correlation id of the reclamation.
    pub reclaim_id: u64,
    /// Die that was reclaimed.
    pub die: usize,
    /// Erased block.
    pub victim: usize,
    /// Policy score the victim won with.
    pub score: u64,
    /// Pages examined.
    pub pages_scanned: usize,
    /// Live pages relocated.
    pub pages_copied: usize,
    /// State-machine steps taken, including the arming step.
    pub steps: usize,
    /// Scheduler tick at which the die was armed.
    pub started_at_tick: u64,
    /// Scheduler tick at which the victim was erased.
    pub finished_at_tick: u64,
}

impl Default for ReclaimMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReclaimMetrics {
    /// Create a `ReclaimMetrics` with all fields zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reclaim_id: 0,
            die: 0,
            victim: 0,
            score: 0,
            pages_scanned: 0,
            pages_copied: 0,
            steps: 0,
            started_at_tick: 0,
            finished_at_tick: 0,
        }
    }

    /// Scheduler ticks between arming and erase.
    #[must_use]
    pub const fn ticks_elapsed(&self) -> u64 {
        self.finished_at_tick.saturating_sub(self.started_at_tick)
    }
}

/// Cumulative engine counters.
///
/// The engine shares this through an `Arc`, so the counters can be read from
/// another thread without taking the engine lock.
///
/// # Example
///
/// ```
/// use ftl_gc::config::{FtlGeometry, GcConfig};
/// use ftl_gc::GcEngine;
///
/// let engine = GcEngine::new(FtlGeometry::new(1, 8, 8, 32), GcConfig::default()).unwrap();
/// let metrics = engine.metrics();
/// assert_eq!(metrics.total_reclamations(), 0);
/// ```
#[derive(Debug, Default)]
pub struct EngineMetrics {
    scheduler_ticks: AtomicU64,
    reclamations: AtomicU64,
    pages_copied: AtomicU64,
    no_candidate: AtomicU64,
    manual_triggers: AtomicU64,
    generation_flips: AtomicU64,
    mapping_mismatches: AtomicU64,
    post_erase_violations: AtomicU64,
    step_failures: AtomicU64,
}

impl EngineMetrics {
    /// Create a new `EngineMetrics` with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scheduler_ticks: AtomicU64::new(0),
            reclamations: AtomicU64::new(0),
            pages_copied: AtomicU64::new(0),
            no_candidate: AtomicU64::new(0),
            manual_triggers: AtomicU64::new(0),
            generation_flips: AtomicU64::new(0),
            mapping_mismatches: AtomicU64::new(0),
            post_erase_violations: AtomicU64::new(0),
            step_failures: AtomicU64::new(0),
        }
    }

    /// Returns the number of scheduler ticks run.
    #[inline]
    #[must_use]
    pub fn total_scheduler_ticks(&self) -> u64 {
        self.scheduler_ticks.load(Ordering::Relaxed)
    }

    /// Returns the number of completed reclamations.
    #[inline]
    #[must_use]
    pub fn total_reclamations(&self) -> u64 {
        self.reclamations.load(Ordering::Relaxed)
    }

    /// Returns the number of live pages relocated.
    #[inline]
    #[must_use]
    pub fn total_pages_copied(&self) -> u64 {
        self.pages_copied.load(Ordering::Relaxed)
    }

    /// Returns how often selection found no candidate.
    #[inline]
    #[must_use]
    pub fn total_no_candidate(&self) -> u64 {
        self.no_candidate.load(Ordering::Relaxed)
    }

    /// Returns the number of manual triggers that armed a die.
    #[inline]
    #[must_use]
    pub fn total_manual_triggers(&self) -> u64 {
        self.manual_triggers.load(Ordering::Relaxed)
    }

    /// Returns the number of generation parity flips.
    #[inline]
    #[must_use]
    pub fn total_generation_flips(&self) -> u64 {
        self.generation_flips.load(Ordering::Relaxed)
    }

    /// Returns the number of `InconsistentMapping` diagnostics.
    #[inline]
    #[must_use]
    pub fn total_mapping_mismatches(&self) -> u64 {
        self.mapping_mismatches.load(Ordering::Relaxed)
    }

    /// Returns the number of post-erase invariant violations.
    #[inline]
    #[must_use]
    pub fn total_post_erase_violations(&self) -> u64 {
        self.post_erase_violations.load(Ordering::Relaxed)
    }

    /// Returns how often a die's step failed during a scheduler tick.
    #[inline]
    #[must_use]
    pub fn total_step_failures(&self) -> u64 {
        self.step_failures.load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.scheduler_ticks,
            &self.reclamations,
            &self.pages_copied,
            &self.no_candidate,
            &self.manual_triggers,
            &self.generation_flips,
            &self.mapping_mismatches,
            &self.post_erase_violations,
            &self.step_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_tick(&self) {
        self.scheduler_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclamation(&self, metrics: &ReclaimMetrics) {
        self.reclamations.fetch_add(1, Ordering::Relaxed);
        self.pages_copied
            .fetch_add(metrics.pages_copied as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_no_candidate(&self) {
        self.no_candidate.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_manual_trigger(&self) {
        self.manual_triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_generation_flip(&self) {
        self.generation_flips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mapping_mismatch(&self) {
        self.mapping_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_post_erase_violation(&self) {
        self.post_erase_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_step_failure(&self) {
        self.step_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ring buffer size for reclamation history.
const HISTORY_SIZE: usize = 64;

/// Fixed-size ring of the most recent [`ReclaimMetrics`].
///
/// # Example
///
/// ```
/// use ftl_gc::metrics::{ReclaimHistory, ReclaimMetrics};
///
/// let mut history = ReclaimHistory::new();
/// history.push(ReclaimMetrics { pages_copied: 3, ..ReclaimMetrics::new() });
/// assert_eq!(history.total_recorded(), 1);
/// assert_eq!(history.recent(5).len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ReclaimHistory {
    buffer: [ReclaimMetrics; HISTORY_SIZE],
    write_idx: usize,
}

impl Default for ReclaimHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ReclaimHistory {
    /// Create an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [ReclaimMetrics::new(); HISTORY_SIZE],
            write_idx: 0,
        }
    }

    /// Record a completed reclamation, overwriting the oldest entry when full.
    pub fn push(&mut self, metrics: ReclaimMetrics) {
        self.buffer[self.write_idx % HISTORY_SIZE] = metrics;
        self.write_idx += 1;
    }

    /// Number of reclamations ever recorded.
    #[must_use]
    pub const fn total_recorded(&self) -> usize {
        self.write_idx
    }

    /// Up to `n` most recent entries, newest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<ReclaimMetrics> {
        let available = self.write_idx.min(HISTORY_SIZE);
        (1..=n.min(available))
            .map(|back| self.buffer[(self.write_idx - back) % HISTORY_SIZE])
            .collect()
    }

    /// Mean pages copied over the retained entries.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_pages_copied(&self) -> f64 {
        let entries = self.recent(HISTORY_SIZE);
        if entries.is_empty() {
            return 0.0;
        }
        let total: usize = entries.iter().map(|m| m.pages_copied).sum();
        total as f64 / entries.len() as f64
    }

    /// Largest step count over the retained entries.
    #[must_use]
    pub fn max_steps(&self) -> usize {
        self.recent(HISTORY_SIZE)
            .iter()
            .map(|m| m.steps)
            .max()
            .unwrap_or(0)
    }
}
