use crate::error::SelectionError;
use crate::ftl::FlashTranslation;
use crate::gc::policy::{PolicyKind, Selection, VictimPolicy};
use crate::gc::victim::VictimIndex;

/// Reclaim the block with the most invalid slices.
///
/// Candidates are already bucketed by invalid count, so selection takes the
/// oldest block of the highest nonempty bucket. Free or bad blocks that were
/// left in the index are stepped over.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greedy;

impl VictimPolicy for Greedy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Greedy
    }

    fn select_victim(
        &mut self,
        die: usize,
        index: &mut VictimIndex,
        ftl: &dyn FlashTranslation,
    ) -> Result<Selection, SelectionError> {
        let found = index
            .candidates(die)
            .find(|&(_, block)| ftl.block_meta(die, block).is_reclaimable());

        let (bucket, block) = found.ok_or(SelectionError::NoCandidate { die })?;
        index.detach(die, block);
        Ok(Selection {
            block,
            score: bucket as u64,
        })
    }
}
