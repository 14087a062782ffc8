//! Victim scoring strategies.
//!
//! Exactly one [`VictimPolicy`] is active per engine. It is chosen at
//! construction through [`PolicyKind`] and never changes afterwards.

mod cost_benefit;
mod generational;
mod greedy;

pub use cost_benefit::CostBenefit;
pub use generational::Generational;
pub use greedy::Greedy;

use std::fmt;

use crate::config::{FtlGeometry, GcConfig};
use crate::error::SelectionError;
use crate::ftl::{FlashTranslation, LogicalSlice};
use crate::gc::victim::VictimIndex;

/// The block picked for reclamation and the score that won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Victim block on the searched die.
    pub block: usize,
    /// Policy-specific score of the victim.
    pub score: u64,
}

/// Available scoring strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// Most invalid slices wins, FIFO within a bucket.
    #[default]
    Greedy,
    /// Highest `invalid * (age + 1) * pages / (valid + 1)` wins.
    CostBenefit,
    /// Fewest weighted live pages wins, old pages weighing more than young.
    Generational,
}

impl PolicyKind {
    /// Build the policy for `geometry` with the tuning in `config`.
    #[must_use]
    pub fn build(self, geometry: &FtlGeometry, config: &GcConfig) -> Box<dyn VictimPolicy> {
        match self {
            Self::Greedy => Box::new(Greedy),
            Self::CostBenefit => Box::new(CostBenefit::new(geometry)),
            Self::Generational => {
                Box::new(Generational::new(geometry, config.generational_weights))
            }
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Greedy => "greedy",
            Self::CostBenefit => "cost-benefit",
            Self::Generational => "generational",
        })
    }
}

/// A victim selection strategy.
///
/// `select_victim` must never return a free or bad block, and must leave the
/// winner detached from `index`. The hooks let a policy keep its own
/// bookkeeping in step with the FTL; the defaults ignore the event.
pub trait VictimPolicy: Send + fmt::Debug {
    /// Which strategy this is.
    fn kind(&self) -> PolicyKind;

    /// Pick the next victim on `die`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoCandidate`] if no block is eligible.
    fn select_victim(
        &mut self,
        die: usize,
        index: &mut VictimIndex,
        ftl: &dyn FlashTranslation,
    ) -> Result<Selection, SelectionError>;

    /// `block` was (re)inserted into the index with `invalid_slices` stale slices.
    fn on_candidate_inserted(&mut self, _die: usize, _block: usize, _invalid_slices: usize) {}

    /// `block` was erased.
    fn on_block_erased(&mut self, _die: usize, _block: usize) {}

    /// `lsa` was written, by the host or by a relocation.
    fn note_logical_write(&mut self, _lsa: LogicalSlice) {}

    /// The scheduler flipped the global generation parity.
    fn flip_generation(&mut self) {}

    /// Current generation parity, for policies that track one.
    fn generation_parity(&self) -> Option<bool> {
        None
    }
}
