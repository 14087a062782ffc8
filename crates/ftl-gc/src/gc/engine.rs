//! The collector engine.
//!
//! [`GcEngine`] owns the victim index, the active policy, one
//! [`ReclaimContext`] per die and the scheduler. The host firmware calls
//! [`GcEngine::run_scheduler_tick`] once per tick and forwards invalidations
//! through [`GcEngine::notify_block_invalidated`]; everything else happens
//! inside the engine.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::{ExecutionMode, FtlGeometry, GcConfig};
use crate::error::{ConfigError, GcDiagnostic, GcError, SelectionError};
use crate::ftl::{FlashTranslation, LogicalSlice};
use crate::gc::policy::{PolicyKind, VictimPolicy};
use crate::gc::reclaim::{self, ReclaimContext, ReclaimState, StepOutcome};
use crate::gc::scheduler::Scheduler;
use crate::gc::victim::VictimIndex;
use crate::metrics::{EngineMetrics, ReclaimHistory, ReclaimMetrics};
use crate::tracing::internal as trace;

/// Number of diagnostics retained by the engine.
const DIAGNOSTIC_LOG_SIZE: usize = 64;

/// The step a die took during a scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DieOutcome {
    /// Die that was driven.
    pub die: usize,
    /// What its state machine did.
    pub outcome: StepOutcome,
}

/// A die whose step failed during a scheduler tick.
///
/// The die keeps its reclamation state and is retried on its next visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DieFailure {
    /// Die that failed.
    pub die: usize,
    /// Why its step failed.
    pub error: GcError,
}

/// Result of one [`GcEngine::run_scheduler_tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that ran.
    pub tick: u64,
    /// Dies were visited on this tick.
    pub dies_visited: bool,
    /// The generation parity flipped on this tick.
    pub generation_flipped: bool,
    /// One entry per die that was stepped, in die order.
    pub outcomes: Vec<DieOutcome>,
    /// Dies whose step failed on this tick, in die order.
    pub failures: Vec<DieFailure>,
}

impl TickReport {
    /// The outcome recorded for `die`, if it was stepped.
    #[must_use]
    pub fn outcome(&self, die: usize) -> Option<StepOutcome> {
        self.outcomes
            .iter()
            .find(|entry| entry.die == die)
            .map(|entry| entry.outcome)
    }

    /// The error recorded for `die`, if its step failed.
    #[must_use]
    pub fn failure(&self, die: usize) -> Option<GcError> {
        self.failures
            .iter()
            .find(|entry| entry.die == die)
            .map(|entry| entry.error)
    }
}

/// Garbage collector for one flash array.
///
/// # Example
///
/// ```
/// use ftl_gc::config::{FtlGeometry, GcConfig};
/// use ftl_gc::sim::MemoryFtl;
/// use ftl_gc::{GcEngine, StepOutcome};
///
/// let geometry = FtlGeometry::new(1, 8, 4, 16);
/// let mut ftl = MemoryFtl::new(geometry).unwrap();
/// let mut engine = GcEngine::new(geometry, GcConfig::default()).unwrap();
///
/// for lsa in [0, 1, 2, 3, 0, 1] {
///     if let Some(stale) = ftl.write(lsa).unwrap() {
///         engine
///             .notify_block_invalidated(stale.die, stale.block, stale.invalid_slices)
///             .unwrap();
///     }
/// }
///
/// assert!(engine.trigger_reclamation(0).unwrap());
/// assert_eq!(
///     engine.step(0, &mut ftl).unwrap(),
///     StepOutcome::VictimSelected { block: 0, score: 2 }
/// );
/// ```
#[derive(Debug)]
pub struct GcEngine {
    geometry: FtlGeometry,
    config: GcConfig,
    victims: VictimIndex,
    policy: Box<dyn VictimPolicy>,
    contexts: Vec<ReclaimContext>,
    scheduler: Scheduler,
    metrics: Arc<EngineMetrics>,
    history: ReclaimHistory,
    diagnostics: VecDeque<GcDiagnostic>,
    halted: bool,
    next_reclaim_id: u64,
}

impl GcEngine {
    /// Build an engine using the policy named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `geometry` or `config` is invalid.
    pub fn new(geometry: FtlGeometry, config: GcConfig) -> Result<Self, ConfigError> {
        config.validate(&geometry)?;
        let policy = config.policy.build(&geometry, &config);
        Ok(Self::assemble(geometry, config, policy))
    }

    /// Build an engine around an already constructed policy, e.g. one whose
    /// state was restored from persisted metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `geometry` or `config` is invalid.
    pub fn with_policy(
        geometry: FtlGeometry,
        mut config: GcConfig,
        policy: Box<dyn VictimPolicy>,
    ) -> Result<Self, ConfigError> {
        config.validate(&geometry)?;
        config.policy = policy.kind();
        Ok(Self::assemble(geometry, config, policy))
    }

    fn assemble(geometry: FtlGeometry, config: GcConfig, policy: Box<dyn VictimPolicy>) -> Self {
        Self {
            geometry,
            config,
            victims: VictimIndex::new(&geometry),
            policy,
            contexts: vec![ReclaimContext::new(); geometry.dies],
            scheduler: Scheduler::new(geometry.dies, &config),
            metrics: Arc::new(EngineMetrics::new()),
            history: ReclaimHistory::new(),
            diagnostics: VecDeque::with_capacity(DIAGNOSTIC_LOG_SIZE),
            halted: false,
            next_reclaim_id: 0,
        }
    }

    /// Flash geometry the engine was built for.
    #[must_use]
    pub const fn geometry(&self) -> &FtlGeometry {
        &self.geometry
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Active scoring strategy.
    #[must_use]
    pub fn policy_kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &dyn VictimPolicy {
        self.policy.as_ref()
    }

    /// The victim candidate index.
    #[must_use]
    pub const fn victims(&self) -> &VictimIndex {
        &self.victims
    }

    /// Reclamation context of `die`.
    #[must_use]
    pub fn context(&self, die: usize) -> Option<&ReclaimContext> {
        self.contexts.get(die)
    }

    /// Scheduler ticks run so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.scheduler.tick()
    }

    /// Current generation parity, if the policy tracks one.
    #[must_use]
    pub fn generation_parity(&self) -> Option<bool> {
        self.policy.generation_parity()
    }

    /// Cumulative counters, shareable across threads.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Recently completed reclamations.
    #[must_use]
    pub const fn history(&self) -> &ReclaimHistory {
        &self.history
    }

    /// Retained diagnostics, oldest first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &GcDiagnostic> {
        self.diagnostics.iter()
    }

    /// Remove and return the retained diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<GcDiagnostic> {
        self.diagnostics.drain(..).collect()
    }

    /// Returns `true` once blocking reclamation has exhausted the flash.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    const fn check_die(&self, die: usize) -> Result<(), GcError> {
        if die >= self.geometry.dies {
            return Err(GcError::DieOutOfRange {
                die,
                dies: self.geometry.dies,
            });
        }
        Ok(())
    }

    const fn check_block(&self, die: usize, block: usize) -> Result<(), GcError> {
        if let Err(err) = self.check_die(die) {
            return Err(err);
        }
        if block >= self.geometry.blocks_per_die {
            return Err(GcError::BlockOutOfRange { die, block });
        }
        Ok(())
    }

    const fn check_running(&self) -> Result<(), GcError> {
        if self.halted {
            return Err(GcError::DeviceHalted);
        }
        Ok(())
    }

    /// A logical overwrite left `block` with `invalid_slices` stale slices.
    ///
    /// Moves the block to the tail of its new bucket. Notifications about the
    /// block currently being reclaimed on `die` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GcError`] if the die, block or count is out of range.
    pub fn notify_block_invalidated(
        &mut self,
        die: usize,
        block: usize,
        invalid_slices: usize,
    ) -> Result<(), GcError> {
        self.check_block(die, block)?;
        if self.contexts[die].victim() == Some(block) {
            return Ok(());
        }
        self.victims.insert(die, block, invalid_slices)?;
        self.policy
            .on_candidate_inserted(die, block, invalid_slices);
        Ok(())
    }

    /// Withdraw `block` from candidacy. Returns `false` if it was not a candidate.
    ///
    /// # Errors
    ///
    /// Returns [`GcError`] if the die or block is out of range.
    pub fn detach_block(&mut self, die: usize, block: usize) -> Result<bool, GcError> {
        self.check_block(die, block)?;
        Ok(self.victims.detach(die, block))
    }

    /// `lsa` was written by the host.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::LogicalSliceOutOfRange`] if `lsa` is outside the
    /// logical space.
    pub fn note_logical_write(&mut self, lsa: LogicalSlice) -> Result<(), GcError> {
        if !self.geometry.contains_logical(lsa) {
            return Err(GcError::LogicalSliceOutOfRange { lsa });
        }
        self.policy.note_logical_write(lsa);
        Ok(())
    }

    /// `block` was erased outside the collector.
    ///
    /// # Errors
    ///
    /// Returns [`GcError`] if the die or block is out of range.
    pub fn record_block_erased(&mut self, die: usize, block: usize) -> Result<(), GcError> {
        self.check_block(die, block)?;
        self.victims.detach(die, block);
        self.policy.on_block_erased(die, block);
        Ok(())
    }

    /// Demand a reclamation on `die` at the next scheduler visit.
    ///
    /// Returns `false` if a reclamation is already in flight on that die.
    ///
    /// # Errors
    ///
    /// Returns [`GcError`] if the die is out of range or the engine halted.
    pub fn trigger_reclamation(&mut self, die: usize) -> Result<bool, GcError> {
        self.check_die(die)?;
        self.check_running()?;
        let armed = self.arm(die);
        if armed {
            self.metrics.record_manual_trigger();
        }
        trace::log_trigger(die, armed);
        Ok(armed)
    }

    /// Run one scheduler tick.
    ///
    /// Every `sched_interval_ticks`-th tick visits the dies in index order:
    /// a die with a reclamation in flight is driven forward, an idle die is
    /// started if the admission policy asks for it.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::DeviceHalted`] after flash exhaustion and
    /// [`GcError::FlashExhausted`] when blocking reclamation finds no victim.
    /// Any other per-die error, such as [`GcError::NoReclaimDestination`],
    /// is recorded in [`TickReport::failures`] and the remaining dies are
    /// still visited.
    pub fn run_scheduler_tick(
        &mut self,
        ftl: &mut dyn FlashTranslation,
    ) -> Result<TickReport, GcError> {
        self.check_running()?;
        let plan = self.scheduler.advance();
        self.metrics.record_tick();

        if plan.flip_generation {
            self.policy.flip_generation();
            self.metrics.record_generation_flip();
            trace::log_generation_flip(plan.tick, self.policy.generation_parity());
        }

        let mut report = TickReport {
            tick: plan.tick,
            dies_visited: plan.visit_dies,
            generation_flipped: plan.flip_generation,
            outcomes: Vec::new(),
            failures: Vec::new(),
        };
        if !plan.visit_dies {
            return Ok(report);
        }

        for die in 0..self.geometry.dies {
            if !self.contexts[die].is_active() {
                let free_blocks = ftl.free_block_count(die);
                if !self.scheduler.should_start(die, free_blocks) {
                    continue;
                }
                trace::log_admission(die, free_blocks);
            }
            let result = match self.config.execution {
                ExecutionMode::Incremental { .. } => self.step(die, ftl),
                ExecutionMode::Blocking => self.reclaim_blocking(die, ftl),
            };
            match result {
                Ok(outcome) => report.outcomes.push(DieOutcome { die, outcome }),
                Err(error @ (GcError::FlashExhausted { .. } | GcError::DeviceHalted)) => {
                    return Err(error);
                }
                Err(error) => {
                    self.metrics.record_step_failure();
                    trace::log_step_failure(die, &error);
                    report.failures.push(DieFailure { die, error });
                }
            }
        }
        Ok(report)
    }

    /// Perform one state transition on `die`.
    ///
    /// # Errors
    ///
    /// Returns [`GcError`] if the die is out of range, the engine halted, or
    /// a live page cannot be relocated.
    pub fn step(
        &mut self,
        die: usize,
        ftl: &mut dyn FlashTranslation,
    ) -> Result<StepOutcome, GcError> {
        self.check_die(die)?;
        self.check_running()?;
        let budget = self.config.page_budget(&self.geometry);
        self.advance(die, ftl, budget)
    }

    /// Run a whole reclamation on `die` in one call.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::FlashExhausted`] and halts the engine if no victim
    /// exists; otherwise as [`step`](Self::step).
    pub fn reclaim_blocking(
        &mut self,
        die: usize,
        ftl: &mut dyn FlashTranslation,
    ) -> Result<StepOutcome, GcError> {
        self.check_die(die)?;
        self.check_running()?;
        if !self.contexts[die].is_active() {
            self.arm(die);
        }
        let budget = self.geometry.pages_per_block;
        loop {
            match self.advance(die, ftl, budget)? {
                StepOutcome::NoCandidate => {
                    self.halted = true;
                    trace::log_flash_exhausted(die);
                    return Err(GcError::FlashExhausted { die });
                }
                outcome @ StepOutcome::Erased { .. } => return Ok(outcome),
                _ => {}
            }
        }
    }

    fn arm(&mut self, die: usize) -> bool {
        let id = self.next_reclaim_id + 1;
        let armed = self.contexts[die].arm(id, self.scheduler.tick());
        if armed {
            self.next_reclaim_id = id;
            self.contexts[die].steps = 1;
        }
        armed
    }

    fn advance(
        &mut self,
        die: usize,
        ftl: &mut dyn FlashTranslation,
        budget: usize,
    ) -> Result<StepOutcome, GcError> {
        let state = self.contexts[die].state();
        let _span = trace::trace_reclaim_step(die, self.contexts[die].reclaim_id(), state);
        if state != ReclaimState::Idle {
            self.contexts[die].steps += 1;
        }

        let outcome = match state {
            ReclaimState::Idle => {
                self.arm(die);
                StepOutcome::Started
            }
            ReclaimState::SelectVictim => self.select(die, ftl),
            ReclaimState::CopyValidPages => self.copy(die, ftl, budget)?,
            ReclaimState::EraseBlock => self.erase(die, ftl),
        };

        let next = self.contexts[die].state();
        if next != state {
            trace::log_state_transition(die, state, next);
        }
        Ok(outcome)
    }

    fn select(&mut self, die: usize, ftl: &mut dyn FlashTranslation) -> StepOutcome {
        match self.policy.select_victim(die, &mut self.victims, &*ftl) {
            Ok(selection) => {
                ftl.seal_block(die, selection.block);
                self.contexts[die].begin_copy(selection.block, selection.score);
                trace::log_victim_selected(die, selection.block, selection.score, self.policy.kind());
                StepOutcome::VictimSelected {
                    block: selection.block,
                    score: selection.score,
                }
            }
            Err(SelectionError::NoCandidate { .. }) => {
                self.contexts[die].reset();
                self.metrics.record_no_candidate();
                trace::log_no_candidate(die);
                StepOutcome::NoCandidate
            }
        }
    }

    fn copy(
        &mut self,
        die: usize,
        ftl: &mut dyn FlashTranslation,
        budget: usize,
    ) -> Result<StepOutcome, GcError> {
        // CopyValidPages is only entered through `begin_copy`, which sets the victim.
        let Some(victim) = self.contexts[die].victim() else {
            self.contexts[die].reset();
            return Ok(StepOutcome::NoCandidate);
        };

        let mut diagnostics = Vec::new();
        let result = reclaim::copy_valid_pages(
            die,
            victim,
            self.geometry.pages_per_block,
            budget,
            &mut self.contexts[die],
            ftl,
            self.policy.as_mut(),
            &mut diagnostics,
        );
        self.report(diagnostics);

        let (scanned, copied) = result?;
        Ok(StepOutcome::Copied {
            scanned,
            copied,
            cursor: self.contexts[die].cursor(),
        })
    }

    fn erase(&mut self, die: usize, ftl: &mut dyn FlashTranslation) -> StepOutcome {
        let ctx = self.contexts[die];
        let Some(victim) = ctx.victim() else {
            self.contexts[die].reset();
            return StepOutcome::NoCandidate;
        };

        ftl.erase_block(die, victim);
        self.policy.on_block_erased(die, victim);

        let mut diagnostics = Vec::new();
        reclaim::validate_post_erase(
            die,
            victim,
            self.geometry.pages_per_block,
            &*ftl,
            &self.victims,
            &mut diagnostics,
        );
        self.report(diagnostics);

        let record = ReclaimMetrics {
            reclaim_id: ctx.id,
            die,
            victim,
            score: ctx.score,
            pages_scanned: ctx.pages_scanned,
            pages_copied: ctx.pages_copied,
            steps: ctx.steps,
            started_at_tick: ctx.started_at,
            finished_at_tick: self.scheduler.tick(),
        };
        self.metrics.record_reclamation(&record);
        self.history.push(record);
        trace::log_erase(die, victim, ctx.pages_copied, ctx.steps);

        self.contexts[die].reset();
        StepOutcome::Erased { block: victim }
    }

    fn report(&mut self, diagnostics: Vec<GcDiagnostic>) {
        for diagnostic in diagnostics {
            match diagnostic {
                GcDiagnostic::InconsistentMapping { .. } => self.metrics.record_mapping_mismatch(),
                GcDiagnostic::PostEraseInvariantViolation { .. } => {
                    self.metrics.record_post_erase_violation();
                }
            }
            trace::log_diagnostic(&diagnostic);
            if self.diagnostics.len() == DIAGNOSTIC_LOG_SIZE {
                self.diagnostics.pop_front();
            }
            self.diagnostics.push_back(diagnostic);
        }
    }
}
