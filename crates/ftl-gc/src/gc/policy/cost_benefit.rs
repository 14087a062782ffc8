use crate::config::FtlGeometry;
use crate::error::SelectionError;
use crate::ftl::FlashTranslation;
use crate::gc::policy::{PolicyKind, Selection, VictimPolicy};
use crate::gc::victim::VictimIndex;

/// Weigh reclaimable space against copy cost and block age.
///
/// Age is measured on a logical activity clock that advances every time a
/// block enters the index with stale slices, so quiet periods do not age
/// anything. Each block remembers the clock value of its last erase.
#[derive(Debug, Clone)]
pub struct CostBenefit {
    blocks_per_die: usize,
    pages_per_block: usize,
    activity_tick: u64,
    last_erase: Vec<u64>,
}

impl CostBenefit {
    /// Create the policy with every block erased at tick 0.
    #[must_use]
    pub fn new(geometry: &FtlGeometry) -> Self {
        Self {
            blocks_per_die: geometry.blocks_per_die,
            pages_per_block: geometry.pages_per_block,
            activity_tick: 0,
            last_erase: vec![0; geometry.total_blocks()],
        }
    }

    /// Score of a block with the given counts and age.
    ///
    /// `invalid * (age + 1) * pages_per_block / (valid + 1)`, computed in 64
    /// bits and saturated to `u32`. A block with nothing to reclaim scores 0.
    ///
    /// ```
    /// use ftl_gc::gc::policy::CostBenefit;
    ///
    /// assert_eq!(CostBenefit::score(6, 2, 10, 8), 176);
    /// assert_eq!(CostBenefit::score(0, 8, 500, 8), 0);
    /// ```
    #[must_use]
    pub fn score(invalid: usize, valid: usize, age: u64, pages_per_block: usize) -> u32 {
        let benefit = (invalid as u64)
            .saturating_mul(age.saturating_add(1))
            .saturating_mul(pages_per_block as u64);
        if benefit == 0 {
            return 0;
        }
        let cost = (valid as u64).saturating_add(1);
        u32::try_from(benefit / cost).unwrap_or(u32::MAX)
    }

    /// Current value of the activity clock.
    #[must_use]
    pub const fn activity_tick(&self) -> u64 {
        self.activity_tick
    }

    /// Restore the activity clock, e.g. from persisted FTL metadata.
    pub fn set_activity_tick(&mut self, tick: u64) {
        self.activity_tick = tick;
    }

    /// Activity tick at which `block` was last erased.
    #[must_use]
    pub fn last_erase_tick(&self, die: usize, block: usize) -> u64 {
        self.last_erase[die * self.blocks_per_die + block]
    }

    /// Restore the last-erase tick of `block`.
    pub fn set_last_erase_tick(&mut self, die: usize, block: usize, tick: u64) {
        self.last_erase[die * self.blocks_per_die + block] = tick;
    }

    /// Ticks since `block` was last erased.
    #[must_use]
    pub fn age(&self, die: usize, block: usize) -> u64 {
        self.activity_tick
            .saturating_sub(self.last_erase_tick(die, block))
    }
}

impl VictimPolicy for CostBenefit {
    fn kind(&self) -> PolicyKind {
        PolicyKind::CostBenefit
    }

    fn select_victim(
        &mut self,
        die: usize,
        index: &mut VictimIndex,
        ftl: &dyn FlashTranslation,
    ) -> Result<Selection, SelectionError> {
        let mut best: Option<Selection> = None;
        let mut best_score = 0;

        for (_, block) in index.candidates(die) {
            let meta = ftl.block_meta(die, block);
            if !meta.is_reclaimable() {
                continue;
            }
            let invalid = meta.invalid_slices.min(self.pages_per_block);
            let valid = self.pages_per_block - invalid;
            let score = Self::score(invalid, valid, self.age(die, block), self.pages_per_block);
            // Strict comparison: equal scores keep the first block visited.
            if score > best_score {
                best_score = score;
                best = Some(Selection {
                    block,
                    score: u64::from(score),
                });
            }
        }

        let selection = best.ok_or(SelectionError::NoCandidate { die })?;
        index.detach(die, selection.block);
        Ok(selection)
    }

    fn on_candidate_inserted(&mut self, _die: usize, _block: usize, invalid_slices: usize) {
        if invalid_slices > 0 {
            self.activity_tick += 1;
        }
    }

    fn on_block_erased(&mut self, die: usize, block: usize) {
        let tick = self.activity_tick;
        self.set_last_erase_tick(die, block, tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_matches_reference_values() {
        assert_eq!(CostBenefit::score(6, 2, 10, 8), 176);
        assert_eq!(CostBenefit::score(2, 6, 40, 8), 93);
        assert_eq!(CostBenefit::score(2, 6, 100, 8), 230);
        assert_eq!(CostBenefit::score(8, 0, 0, 8), 64);
    }

    #[test]
    fn test_score_zero_benefit() {
        assert_eq!(CostBenefit::score(0, 8, u64::MAX, 8), 0);
    }

    #[test]
    fn test_score_saturates() {
        assert_eq!(CostBenefit::score(256, 0, u64::MAX - 1, 256), u32::MAX);
        assert_eq!(CostBenefit::score(1, 0, u64::MAX, 1), u32::MAX);
    }

    #[test]
    fn test_score_monotonic_in_age() {
        for valid in 0..=8 {
            let invalid = 8 - valid;
            let mut previous = 0;
            for age in 0..200 {
                let score = CostBenefit::score(invalid, valid, age, 8);
                assert!(score >= previous, "age {age} valid {valid}");
                previous = score;
            }
        }
    }

    #[test]
    fn test_score_monotonic_in_invalid() {
        for age in [0, 1, 7, 50, 1000] {
            for valid in 0..=16 {
                let mut previous = 0;
                for invalid in 0..=16 {
                    let score = CostBenefit::score(invalid, valid, age, 16);
                    assert!(score >= previous, "invalid {invalid} valid {valid} age {age}");
                    previous = score;
                }
            }
        }
    }

    #[test]
    fn test_score_antitone_in_valid() {
        for age in [0, 3, 99] {
            for invalid in 0..=16 {
                let mut previous = u32::MAX;
                for valid in 0..=16 {
                    let score = CostBenefit::score(invalid, valid, age, 16);
                    assert!(score <= previous, "invalid {invalid} valid {valid} age {age}");
                    previous = score;
                }
            }
        }
    }

    #[test]
    fn test_activity_tick_counts_stale_insertions_only() {
        let mut policy = CostBenefit::new(&FtlGeometry::new(1, 4, 8, 16));
        policy.on_candidate_inserted(0, 1, 0);
        assert_eq!(policy.activity_tick(), 0);
        policy.on_candidate_inserted(0, 1, 3);
        policy.on_candidate_inserted(0, 2, 1);
        assert_eq!(policy.activity_tick(), 2);

        policy.on_block_erased(0, 1);
        assert_eq!(policy.last_erase_tick(0, 1), 2);
        assert_eq!(policy.age(0, 1), 0);
        assert_eq!(policy.age(0, 2), 2);
    }
}
