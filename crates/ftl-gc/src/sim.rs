//! In-memory flash translation layer.
//!
//! [`MemoryFtl`] is a page-mapped FTL over a simulated NAND array: forward
//! and reverse slice maps, a block table, a FIFO free pool and one open
//! block per die. NAND commands are not executed; they are recorded in a
//! lock-free request queue that tests and benchmarks can drain.
//! [`SimulatedDrive`] wires a [`MemoryFtl`] to a [`GcEngine`] the way a host
//! I/O path would.

use std::collections::VecDeque;

use crossbeam_queue::SegQueue;
use thiserror::Error;

use crate::config::{FtlGeometry, GcConfig};
use crate::error::{ConfigError, GcError};
use crate::ftl::{BlockMeta, FlashTranslation, LogicalSlice, PhysicalSlice, TempBuffer};
use crate::gc::engine::{GcEngine, TickReport};

/// Temp buffers available per die.
const TEMP_BUFFERS_PER_DIE: usize = 16;

/// Free blocks per die that host writes may not consume.
pub const DEFAULT_RESERVED_BLOCKS: usize = 1;

/// Errors raised by the simulated FTL.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// Host write found no free block outside the reserve.
    #[error("die {die} has no free block for host data")]
    NoFreeBlock {
        /// Die the write was routed to.
        die: usize,
    },
    /// Logical slice outside the exported space.
    #[error("logical slice {lsa} out of range")]
    LogicalOutOfRange {
        /// Requested slice.
        lsa: LogicalSlice,
    },
    /// Block outside the geometry.
    #[error("block {block} out of range on die {die}")]
    BlockOutOfRange {
        /// Requested die.
        die: usize,
        /// Requested block.
        block: usize,
    },
    /// Forward and reverse maps disagree.
    #[error("{lsa} maps to {slice} but the slice is owned by {owner:?}")]
    MappingMismatch {
        /// Logical slice with the broken mapping.
        lsa: LogicalSlice,
        /// Its forward mapping.
        slice: PhysicalSlice,
        /// Reverse owner of that slice.
        owner: Option<LogicalSlice>,
    },
    /// A live slice sits in a free or bad block.
    #[error("{lsa} lives in unusable block {block} on die {die}")]
    LiveDataInUnusableBlock {
        /// Logical slice.
        lsa: LogicalSlice,
        /// Die of the block.
        die: usize,
        /// The free or bad block.
        block: usize,
    },
    /// A block's invalid count disagrees with its programmed and live pages.
    #[error("die {die} block {block}: invalid count {recorded}, expected {expected}")]
    InvalidCountMismatch {
        /// Die of the block.
        die: usize,
        /// Block.
        block: usize,
        /// Count in the block table.
        recorded: usize,
        /// Programmed pages minus live pages.
        expected: usize,
    },
    /// Engine rejected a notification.
    #[error(transparent)]
    Gc(#[from] GcError),
}

/// Where a NAND command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    /// Host data.
    Host,
    /// A relocation staged in a temp buffer.
    Reclaim(TempBuffer),
}

/// A NAND command issued to the simulated array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandRequest {
    /// Read a slice into a temp buffer.
    Read {
        /// Source slice.
        slice: PhysicalSlice,
        /// Destination buffer.
        buffer: TempBuffer,
    },
    /// Program a slice.
    Write {
        /// Destination slice.
        slice: PhysicalSlice,
        /// Data origin.
        source: WriteSource,
    },
    /// Erase a block.
    Erase {
        /// Die of the block.
        die: usize,
        /// Erased block.
        block: usize,
    },
}

/// A block that gained a stale slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    /// Die of the block.
    pub die: usize,
    /// Block that holds the stale slice.
    pub block: usize,
    /// Its invalid-slice count after the update.
    pub invalid_slices: usize,
}

/// Which open block a program lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Host = 0,
    Reclaim = 1,
}

#[derive(Debug, Clone, Copy, Default)]
struct BlockState {
    meta: BlockMeta,
    programmed: usize,
}

/// In-memory page-mapped FTL.
///
/// Host data and relocated data go to separate open blocks on each die.
///
/// # Example
///
/// ```
/// use ftl_gc::config::FtlGeometry;
/// use ftl_gc::sim::MemoryFtl;
/// use ftl_gc::FlashTranslation;
///
/// let mut ftl = MemoryFtl::new(FtlGeometry::new(1, 4, 4, 8)).unwrap();
/// assert_eq!(ftl.write(0).unwrap(), None);
///
/// let stale = ftl.write(0).unwrap().unwrap();
/// assert_eq!((stale.block, stale.invalid_slices), (0, 1));
/// assert_eq!(ftl.free_block_count(0), 3);
/// ```
#[derive(Debug)]
pub struct MemoryFtl {
    geometry: FtlGeometry,
    forward: Vec<Option<PhysicalSlice>>,
    reverse: Vec<Option<LogicalSlice>>,
    blocks: Vec<BlockState>,
    free: Vec<VecDeque<usize>>,
    open: Vec<[Option<usize>; 2]>,
    next_host_die: usize,
    next_buffer: Vec<usize>,
    reserved_blocks: usize,
    requests: SegQueue<NandRequest>,
}

impl MemoryFtl {
    /// Create an empty, fully erased array.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `geometry` is invalid.
    pub fn new(geometry: FtlGeometry) -> Result<Self, ConfigError> {
        geometry.validate()?;
        let erased = BlockState {
            meta: BlockMeta {
                free: true,
                ..BlockMeta::default()
            },
            programmed: 0,
        };
        Ok(Self {
            geometry,
            forward: vec![None; geometry.logical_slices],
            reverse: vec![None; geometry.physical_slices()],
            blocks: vec![erased; geometry.total_blocks()],
            free: (0..geometry.dies)
                .map(|_| (0..geometry.blocks_per_die).collect())
                .collect(),
            open: vec![[None; 2]; geometry.dies],
            next_host_die: 0,
            next_buffer: vec![0; geometry.dies],
            reserved_blocks: DEFAULT_RESERVED_BLOCKS,
            requests: SegQueue::new(),
        })
    }

    /// Keep `blocks` free blocks per die out of reach of host writes.
    #[must_use]
    pub const fn with_reserved_blocks(mut self, blocks: usize) -> Self {
        self.reserved_blocks = blocks;
        self
    }

    /// The array geometry.
    #[must_use]
    pub const fn geometry(&self) -> &FtlGeometry {
        &self.geometry
    }

    const fn block_slot(&self, die: usize, block: usize) -> usize {
        die * self.geometry.blocks_per_die + block
    }

    const fn check_block(&self, die: usize, block: usize) -> Result<(), SimError> {
        if die >= self.geometry.dies || block >= self.geometry.blocks_per_die {
            return Err(SimError::BlockOutOfRange { die, block });
        }
        Ok(())
    }

    const fn check_lsa(&self, lsa: LogicalSlice) -> Result<(), SimError> {
        if !self.geometry.contains_logical(lsa) {
            return Err(SimError::LogicalOutOfRange { lsa });
        }
        Ok(())
    }

    /// Block currently receiving host writes on `die`.
    #[must_use]
    pub fn open_block(&self, die: usize) -> Option<usize> {
        self.open.get(die).and_then(|open| open[Stream::Host as usize])
    }

    /// Block currently receiving relocated data on `die`.
    #[must_use]
    pub fn reclaim_block(&self, die: usize) -> Option<usize> {
        self.open.get(die).and_then(|open| open[Stream::Reclaim as usize])
    }

    fn close(&mut self, die: usize, block: usize) {
        for open in &mut self.open[die] {
            if *open == Some(block) {
                *open = None;
            }
        }
    }

    /// Pages programmed in `block` since its last erase.
    #[must_use]
    pub fn programmed_pages(&self, die: usize, block: usize) -> usize {
        self.blocks[self.block_slot(die, block)].programmed
    }

    /// Overwrite the erase counter of `block`, e.g. from a persisted wear table.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::BlockOutOfRange`] for an invalid block.
    pub fn set_erase_count(&mut self, die: usize, block: usize, count: u32) -> Result<(), SimError> {
        self.check_block(die, block)?;
        let slot = self.block_slot(die, block);
        self.blocks[slot].meta.erase_count = count;
        Ok(())
    }

    /// Retire `block` as bad. Live data in it stays mapped until rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::BlockOutOfRange`] for an invalid block.
    pub fn mark_bad(&mut self, die: usize, block: usize) -> Result<(), SimError> {
        self.check_block(die, block)?;
        let slot = self.block_slot(die, block);
        self.blocks[slot].meta.bad = true;
        self.blocks[slot].meta.free = false;
        self.free[die].retain(|&b| b != block);
        self.close(die, block);
        Ok(())
    }

    /// Write `lsa` on behalf of the host.
    ///
    /// Dies are chosen round-robin. Returns the block that now holds the
    /// superseded copy, if there was one.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NoFreeBlock`] when the target die is out of space
    /// outside its reserve, or [`SimError::LogicalOutOfRange`].
    pub fn write(&mut self, lsa: u32) -> Result<Option<Invalidation>, SimError> {
        let lsa = LogicalSlice(lsa);
        self.check_lsa(lsa)?;
        let die = self.next_host_die;
        let dest = self
            .allocate_slice(die, Stream::Host, None, self.reserved_blocks)
            .ok_or(SimError::NoFreeBlock { die })?;
        self.next_host_die = (die + 1) % self.geometry.dies;

        let stale = self.invalidate(lsa);
        self.forward[lsa.index()] = Some(dest);
        self.reverse[dest.index()] = Some(lsa);
        self.requests.push(NandRequest::Write {
            slice: dest,
            source: WriteSource::Host,
        });
        Ok(stale)
    }

    /// Unmap `lsa`. Returns the block that now holds the stale copy, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::LogicalOutOfRange`].
    pub fn trim(&mut self, lsa: u32) -> Result<Option<Invalidation>, SimError> {
        let lsa = LogicalSlice(lsa);
        self.check_lsa(lsa)?;
        Ok(self.invalidate(lsa))
    }

    fn invalidate(&mut self, lsa: LogicalSlice) -> Option<Invalidation> {
        let old = self.forward[lsa.index()].take()?;
        self.reverse[old.index()] = None;
        let (die, block, _) = self.geometry.locate(old);
        let slot = self.block_slot(die, block);
        let meta = &mut self.blocks[slot].meta;
        meta.invalid_slices += 1;
        Some(Invalidation {
            die,
            block,
            invalid_slices: meta.invalid_slices,
        })
    }

    fn allocate_slice(
        &mut self,
        die: usize,
        stream: Stream,
        exclude: Option<usize>,
        reserve: usize,
    ) -> Option<PhysicalSlice> {
        let lane = stream as usize;
        if let Some(open) = self.open[die][lane] {
            let full = self.programmed_pages(die, open) >= self.geometry.pages_per_block;
            if full || exclude == Some(open) {
                self.open[die][lane] = None;
            }
        }

        let block = match self.open[die][lane] {
            Some(block) => block,
            None => {
                if self.free[die].len() <= reserve {
                    return None;
                }
                let block = self.free[die].pop_front()?;
                let slot = self.block_slot(die, block);
                self.blocks[slot].meta.free = false;
                self.blocks[slot].programmed = 0;
                self.open[die][lane] = Some(block);
                block
            }
        };

        let slot = self.block_slot(die, block);
        let page = self.blocks[slot].programmed;
        self.blocks[slot].programmed += 1;
        Some(self.geometry.slice_at(die, block, page))
    }

    /// Remove and return every queued NAND command, oldest first.
    pub fn drain_requests(&self) -> Vec<NandRequest> {
        std::iter::from_fn(|| self.requests.pop()).collect()
    }

    /// Number of queued NAND commands.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Cross-check the forward map, reverse map and block table.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn verify_mappings(&self) -> Result<(), SimError> {
        let mut live = vec![0usize; self.geometry.total_blocks()];
        for (raw, slice) in self.forward.iter().enumerate() {
            let Some(slice) = *slice else {
                continue;
            };
            #[allow(clippy::cast_possible_truncation)]
            let lsa = LogicalSlice(raw as u32);
            let owner = self.reverse[slice.index()];
            if owner != Some(lsa) {
                return Err(SimError::MappingMismatch { lsa, slice, owner });
            }
            let (die, block, _) = self.geometry.locate(slice);
            let meta = self.blocks[self.block_slot(die, block)].meta;
            if !meta.is_reclaimable() {
                return Err(SimError::LiveDataInUnusableBlock { lsa, die, block });
            }
            live[self.block_slot(die, block)] += 1;
        }

        for die in 0..self.geometry.dies {
            for block in 0..self.geometry.blocks_per_die {
                let slot = self.block_slot(die, block);
                let state = self.blocks[slot];
                if state.meta.bad || state.meta.free {
                    continue;
                }
                let expected = state.programmed - live[slot];
                // Relocation copies leave the victim's stale slices uncounted
                // until the erase, so only excess invalid counts are errors.
                if state.meta.invalid_slices > expected {
                    return Err(SimError::InvalidCountMismatch {
                        die,
                        block,
                        recorded: state.meta.invalid_slices,
                        expected,
                    });
                }
            }
        }
        Ok(())
    }
}

impl FlashTranslation for MemoryFtl {
    fn block_meta(&self, die: usize, block: usize) -> BlockMeta {
        self.blocks[self.block_slot(die, block)].meta
    }

    fn free_block_count(&self, die: usize) -> usize {
        self.free[die].len()
    }

    fn physical_slice(&self, die: usize, block: usize, page: usize) -> PhysicalSlice {
        self.geometry.slice_at(die, block, page)
    }

    fn logical_owner(&self, slice: PhysicalSlice) -> Option<LogicalSlice> {
        self.reverse.get(slice.index()).copied().flatten()
    }

    fn physical_location(&self, lsa: LogicalSlice) -> Option<PhysicalSlice> {
        self.forward.get(lsa.index()).copied().flatten()
    }

    fn logical_slice_count(&self) -> usize {
        self.geometry.logical_slices
    }

    fn set_mapping(&mut self, lsa: LogicalSlice, slice: PhysicalSlice) {
        self.forward[lsa.index()] = Some(slice);
        self.reverse[slice.index()] = Some(lsa);
    }

    fn allocate_reclaim_slice(&mut self, die: usize, exclude_block: usize) -> Option<PhysicalSlice> {
        self.allocate_slice(die, Stream::Reclaim, Some(exclude_block), 0)
    }

    fn allocate_temp_buffer(&mut self, die: usize) -> TempBuffer {
        let slot = self.next_buffer[die];
        self.next_buffer[die] = (slot + 1) % TEMP_BUFFERS_PER_DIE;
        TempBuffer(die * TEMP_BUFFERS_PER_DIE + slot)
    }

    fn issue_read(&mut self, slice: PhysicalSlice, buffer: TempBuffer) {
        self.requests.push(NandRequest::Read { slice, buffer });
    }

    fn issue_write(&mut self, slice: PhysicalSlice, buffer: TempBuffer) {
        self.requests.push(NandRequest::Write {
            slice,
            source: WriteSource::Reclaim(buffer),
        });
    }

    fn erase_block(&mut self, die: usize, block: usize) {
        for page in 0..self.geometry.pages_per_block {
            let slice = self.geometry.slice_at(die, block, page);
            self.reverse[slice.index()] = None;
        }
        self.close(die, block);

        let slot = self.block_slot(die, block);
        let state = &mut self.blocks[slot];
        state.meta.invalid_slices = 0;
        state.meta.erase_count += 1;
        state.programmed = 0;
        if !state.meta.bad && !state.meta.free {
            state.meta.free = true;
            self.free[die].push_back(block);
        }
        self.requests.push(NandRequest::Erase { die, block });
    }

    fn seal_block(&mut self, die: usize, block: usize) {
        self.close(die, block);
    }
}

/// A [`GcEngine`] attached to a [`MemoryFtl`], with the host write path
/// forwarding invalidations to the collector.
///
/// # Example
///
/// ```
/// use ftl_gc::config::{FtlGeometry, GcConfig};
/// use ftl_gc::sim::SimulatedDrive;
///
/// let mut drive = SimulatedDrive::new(FtlGeometry::new(1, 8, 4, 16), GcConfig::default()).unwrap();
/// drive.write(3).unwrap();
/// drive.write(3).unwrap();
/// assert_eq!(drive.engine().victims().bucket_of(0, 0), Some(1));
/// ```
#[derive(Debug)]
pub struct SimulatedDrive {
    engine: GcEngine,
    ftl: MemoryFtl,
}

impl SimulatedDrive {
    /// Create a drive with a fresh array and engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `geometry` or `config` is invalid.
    pub fn new(geometry: FtlGeometry, config: GcConfig) -> Result<Self, ConfigError> {
        let engine = GcEngine::new(geometry, config)?;
        let ftl = MemoryFtl::new(geometry)?;
        Ok(Self { engine, ftl })
    }

    /// Assemble a drive from existing parts.
    #[must_use]
    pub const fn from_parts(engine: GcEngine, ftl: MemoryFtl) -> Self {
        Self { engine, ftl }
    }

    /// Split the drive back into its parts.
    #[must_use]
    pub fn into_parts(self) -> (GcEngine, MemoryFtl) {
        (self.engine, self.ftl)
    }

    /// The collector.
    #[must_use]
    pub const fn engine(&self) -> &GcEngine {
        &self.engine
    }

    /// The collector, mutably.
    pub fn engine_mut(&mut self) -> &mut GcEngine {
        &mut self.engine
    }

    /// The simulated FTL.
    #[must_use]
    pub const fn ftl(&self) -> &MemoryFtl {
        &self.ftl
    }

    /// The simulated FTL, mutably.
    pub fn ftl_mut(&mut self) -> &mut MemoryFtl {
        &mut self.ftl
    }

    /// Host write of `lsa`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError`] if the FTL rejects the write.
    pub fn write(&mut self, lsa: u32) -> Result<(), SimError> {
        let stale = self.ftl.write(lsa)?;
        self.engine.note_logical_write(LogicalSlice(lsa))?;
        self.forward(stale)
    }

    /// Host trim of `lsa`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError`] if `lsa` is out of range.
    pub fn trim(&mut self, lsa: u32) -> Result<(), SimError> {
        let stale = self.ftl.trim(lsa)?;
        self.forward(stale)
    }

    fn forward(&mut self, stale: Option<Invalidation>) -> Result<(), SimError> {
        if let Some(stale) = stale {
            self.engine
                .notify_block_invalidated(stale.die, stale.block, stale.invalid_slices)?;
        }
        Ok(())
    }

    /// Run one scheduler tick.
    ///
    /// # Errors
    ///
    /// Propagates [`GcError`] from the engine.
    pub fn tick(&mut self) -> Result<TickReport, GcError> {
        self.engine.run_scheduler_tick(&mut self.ftl)
    }

    /// Run `ticks` scheduler ticks.
    ///
    /// # Errors
    ///
    /// Stops at the first [`GcError`].
    pub fn run_ticks(&mut self, ticks: usize) -> Result<(), GcError> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Tick until no die has a reclamation in flight, at most `max_ticks`
    /// times. Returns the ticks run.
    ///
    /// # Errors
    ///
    /// Stops at the first [`GcError`].
    pub fn run_until_idle(&mut self, max_ticks: usize) -> Result<usize, GcError> {
        for ran in 0..max_ticks {
            let busy = (0..self.ftl.geometry.dies)
                .any(|die| self.engine.context(die).is_some_and(|ctx| ctx.is_active()));
            if !busy {
                return Ok(ran);
            }
            self.tick()?;
        }
        Ok(max_ticks)
    }

    /// Free blocks on `die`.
    #[must_use]
    pub fn free_blocks(&self, die: usize) -> usize {
        self.ftl.free_block_count(die)
    }
}
