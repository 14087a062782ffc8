use crate::config::{FtlGeometry, GenerationalWeights};
use crate::error::SelectionError;
use crate::ftl::{FlashTranslation, LogicalSlice};
use crate::gc::bitmap::SliceBitmap;
use crate::gc::policy::{PolicyKind, Selection, VictimPolicy};
use crate::gc::victim::VictimIndex;

/// Mark-and-sweep selection over two data generations.
///
/// Every write stamps the logical slice with the current generation parity.
/// Selection first marks every mapped logical slice live, then sweeps all
/// in-use blocks of the die and counts their live pages, split into young
/// (stamped with the current parity) and old. The block with the lowest
/// `old * weights.old + young * weights.young` wins; among equal scores the
/// block with the higher erase count wins.
#[derive(Debug, Clone)]
pub struct Generational {
    blocks_per_die: usize,
    pages_per_block: usize,
    weights: GenerationalWeights,
    parity: bool,
    generation: SliceBitmap,
    live: SliceBitmap,
}

impl Generational {
    /// Create the policy with parity 0 and every slice stamped 0.
    #[must_use]
    pub fn new(geometry: &FtlGeometry, weights: GenerationalWeights) -> Self {
        Self {
            blocks_per_die: geometry.blocks_per_die,
            pages_per_block: geometry.pages_per_block,
            weights,
            parity: false,
            generation: SliceBitmap::new(geometry.logical_slices),
            live: SliceBitmap::new(geometry.logical_slices),
        }
    }

    /// Current generation parity.
    #[must_use]
    pub const fn parity(&self) -> bool {
        self.parity
    }

    /// Returns `true` if `lsa` was last written in the current generation.
    #[must_use]
    pub fn is_young(&self, lsa: LogicalSlice) -> bool {
        self.generation.get(lsa.index()) == self.parity
    }

    /// Rebuild the live map from the forward mapping table.
    pub fn mark(&mut self, ftl: &dyn FlashTranslation) {
        self.live.clear();
        let count = ftl.logical_slice_count().min(self.live.capacity());
        for raw in 0..count {
            #[allow(clippy::cast_possible_truncation)]
            let lsa = LogicalSlice(raw as u32);
            if ftl.physical_location(lsa).is_some() {
                self.live.set(raw);
            }
        }
    }

    /// Live pages of `block` as `(young, old)`, using the last [`mark`](Self::mark).
    ///
    /// A bad block reports every page as old.
    #[must_use]
    pub fn live_split(&self, die: usize, block: usize, ftl: &dyn FlashTranslation) -> (u64, u64) {
        if ftl.block_meta(die, block).bad {
            return (0, self.pages_per_block as u64);
        }
        let mut young = 0;
        let mut old = 0;
        for page in 0..self.pages_per_block {
            let slice = ftl.physical_slice(die, block, page);
            let Some(lsa) = ftl.logical_owner(slice) else {
                continue;
            };
            if !self.live.get(lsa.index()) || ftl.physical_location(lsa) != Some(slice) {
                continue;
            }
            if self.is_young(lsa) {
                young += 1;
            } else {
                old += 1;
            }
        }
        (young, old)
    }

    const fn weigh(&self, young: u64, old: u64) -> u64 {
        old.saturating_mul(self.weights.old)
            .saturating_add(young.saturating_mul(self.weights.young))
    }
}

impl VictimPolicy for Generational {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Generational
    }

    fn select_victim(
        &mut self,
        die: usize,
        index: &mut VictimIndex,
        ftl: &dyn FlashTranslation,
    ) -> Result<Selection, SelectionError> {
        self.mark(ftl);

        let mut best: Option<(Selection, u32)> = None;
        for block in 0..self.blocks_per_die {
            let meta = ftl.block_meta(die, block);
            if !meta.is_reclaimable() {
                continue;
            }
            let (young, old) = self.live_split(die, block, ftl);
            let score = self.weigh(young, old);
            let better = best.is_none_or(|(current, erase_count)| {
                score < current.score || (score == current.score && meta.erase_count > erase_count)
            });
            if better {
                best = Some((Selection { block, score }, meta.erase_count));
                if score == 0 {
                    break;
                }
            }
        }

        let (selection, _) = best.ok_or(SelectionError::NoCandidate { die })?;
        index.detach(die, selection.block);
        Ok(selection)
    }

    fn note_logical_write(&mut self, lsa: LogicalSlice) {
        self.generation.assign(lsa.index(), self.parity);
    }

    fn flip_generation(&mut self) {
        self.parity = !self.parity;
    }

    fn generation_parity(&self) -> Option<bool> {
        Some(self.parity)
    }
}
