//! The per-die reclamation state machine.
//!
//! A reclamation walks `Idle -> SelectVictim -> CopyValidPages -> EraseBlock
//! -> Idle`. In incremental mode each call performs one transition and
//! copies at most a page budget per `CopyValidPages` step, so no single call
//! does a full block's worth of copies.

use crate::error::{GcDiagnostic, GcError, PostEraseViolation};
use crate::ftl::FlashTranslation;
use crate::gc::policy::VictimPolicy;
use crate::gc::victim::{Link, VictimIndex};

/// Phase of a die's reclamation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReclaimState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Waiting for the policy to pick a victim.
    SelectVictim,
    /// Relocating the victim's live pages.
    CopyValidPages,
    /// Erasing the victim.
    EraseBlock,
}

impl ReclaimState {
    /// Returns `true` if the machine may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::SelectVictim)
                | (Self::SelectVictim, Self::CopyValidPages | Self::Idle)
                | (Self::CopyValidPages, Self::EraseBlock)
                | (Self::EraseBlock, Self::Idle)
        )
    }
}

/// What one step of the state machine did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An idle die was armed and will select a victim next.
    Started,
    /// A victim was chosen and detached from the index.
    VictimSelected {
        /// Victim block.
        block: usize,
        /// Winning policy score.
        score: u64,
    },
    /// No eligible victim; the die went back to idle.
    NoCandidate,
    /// Part of the victim was scanned and its live pages relocated.
    Copied {
        /// Pages examined in this step.
        scanned: usize,
        /// Live pages relocated in this step.
        copied: usize,
        /// Cursor after the step.
        cursor: usize,
    },
    /// The victim was erased and the die is idle again.
    Erased {
        /// The reclaimed block.
        block: usize,
    },
}

/// Reclamation progress for one die.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimContext {
    state: ReclaimState,
    victim: Option<usize>,
    cursor: usize,
    active: bool,
    pub(crate) id: u64,
    pub(crate) score: u64,
    pub(crate) pages_scanned: usize,
    pub(crate) pages_copied: usize,
    pub(crate) steps: usize,
    pub(crate) started_at: u64,
}

impl ReclaimContext {
    /// An idle context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ReclaimState::Idle,
            victim: None,
            cursor: 0,
            active: false,
            id: 0,
            score: 0,
            pages_scanned: 0,
            pages_copied: 0,
            steps: 0,
            started_at: 0,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn state(&self) -> ReclaimState {
        self.state
    }

    /// Block being reclaimed, once selected.
    #[must_use]
    pub const fn victim(&self) -> Option<usize> {
        self.victim
    }

    /// Next page of the victim to examine.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns `true` while a reclamation is in flight.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Correlation id of the current or last reclamation.
    #[must_use]
    pub const fn reclaim_id(&self) -> u64 {
        self.id
    }

    /// Move to `next` if the transition is legal.
    pub(crate) fn transition_to(&mut self, next: ReclaimState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Arm an idle die. Returns `false` if a reclamation is already in flight.
    pub(crate) fn arm(&mut self, id: u64, tick: u64) -> bool {
        if self.active || !self.transition_to(ReclaimState::SelectVictim) {
            return false;
        }
        *self = Self {
            state: ReclaimState::SelectVictim,
            active: true,
            id,
            started_at: tick,
            ..Self::new()
        };
        true
    }

    pub(crate) fn begin_copy(&mut self, victim: usize, score: u64) {
        if self.transition_to(ReclaimState::CopyValidPages) {
            self.victim = Some(victim);
            self.cursor = 0;
            self.score = score;
        }
    }

    /// Back to idle, keeping the correlation id.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            id: self.id,
            ..Self::new()
        };
    }
}

/// Relocate live pages of `victim` until `budget` pages have been scanned or
/// the block is exhausted. Returns `(scanned, copied)` for this call.
///
/// The cursor advances past dead pages too. A page whose destination cannot
/// be allocated is left under the cursor and reported as an error.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_valid_pages(
    die: usize,
    victim: usize,
    pages_per_block: usize,
    budget: usize,
    ctx: &mut ReclaimContext,
    ftl: &mut dyn FlashTranslation,
    policy: &mut dyn VictimPolicy,
    diagnostics: &mut Vec<GcDiagnostic>,
) -> Result<(usize, usize), GcError> {
    let mut scanned = 0;
    let mut copied = 0;

    while scanned < budget && ctx.cursor < pages_per_block {
        let source = ftl.physical_slice(die, victim, ctx.cursor);
        let live = ftl
            .logical_owner(source)
            .filter(|&lsa| ftl.physical_location(lsa) == Some(source));

        if let Some(lsa) = live {
            let dest = ftl
                .allocate_reclaim_slice(die, victim)
                .ok_or(GcError::NoReclaimDestination {
                    die,
                    victim,
                    page: ctx.cursor,
                })?;
            let buffer = ftl.allocate_temp_buffer(die);
            ftl.issue_read(source, buffer);
            ftl.issue_write(dest, buffer);
            ftl.set_mapping(lsa, dest);
            policy.note_logical_write(lsa);

            let found = ftl.physical_location(lsa);
            if found != Some(dest) {
                diagnostics.push(GcDiagnostic::InconsistentMapping {
                    die,
                    victim,
                    lsa,
                    expected: dest,
                    found,
                });
            }
            copied += 1;
            ctx.pages_copied += 1;
        }

        ctx.cursor += 1;
        ctx.pages_scanned += 1;
        scanned += 1;
    }

    if ctx.cursor >= pages_per_block {
        ctx.transition_to(ReclaimState::EraseBlock);
    }
    Ok((scanned, copied))
}

/// Check that `block` looks erased: no invalid slices, not linked into the
/// index, and no slice with a logical owner.
pub(crate) fn validate_post_erase(
    die: usize,
    block: usize,
    pages_per_block: usize,
    ftl: &dyn FlashTranslation,
    index: &VictimIndex,
    diagnostics: &mut Vec<GcDiagnostic>,
) {
    let mut report = |violation| {
        diagnostics.push(GcDiagnostic::PostEraseInvariantViolation {
            die,
            block,
            violation,
        });
    };

    let invalid = ftl.block_meta(die, block).invalid_slices;
    if invalid != 0 {
        report(PostEraseViolation::InvalidCountNonZero(invalid));
    }
    if index.link(die, block) != Link::default() {
        report(PostEraseViolation::StillLinked);
    }
    for page in 0..pages_per_block {
        let slice = ftl.physical_slice(die, block, page);
        if let Some(owner) = ftl.logical_owner(slice) {
            report(PostEraseViolation::SliceStillMapped { slice, owner });
        }
    }
}
