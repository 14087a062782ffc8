//! The contract between the collector and the surrounding FTL.
//!
//! The collector never owns the mapping tables or the block metadata table.
//! Everything it needs to read or mutate goes through [`FlashTranslation`].

use std::fmt;

/// A physical (virtual-slice) address on the flash array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalSlice(pub u32);

impl PhysicalSlice {
    /// The slice as a table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PhysicalSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vsa#{}", self.0)
    }
}

/// A host-visible logical slice address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalSlice(pub u32);

impl LogicalSlice {
    /// The slice as a table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LogicalSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lsa#{}", self.0)
    }
}

impl From<u32> for LogicalSlice {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Handle to a temporary data buffer used to stage a page copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempBuffer(pub usize);

/// The block metadata fields the collector consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockMeta {
    /// Slices in the block whose logical owner has been remapped elsewhere.
    pub invalid_slices: usize,
    /// The block sits in the free pool.
    pub free: bool,
    /// The block is retired as bad.
    pub bad: bool,
    /// Number of times the block has been erased.
    pub erase_count: u32,
}

impl BlockMeta {
    /// A block the collector may pick as a victim.
    #[must_use]
    pub const fn is_reclaimable(&self) -> bool {
        !self.free && !self.bad
    }
}

/// Address translation, buffer management and NAND issue, as seen by GC.
///
/// Reads and writes are only enqueued; the collector never waits for them.
/// The collector assumes exclusive access to the tables for the duration of
/// one call into the engine.
pub trait FlashTranslation {
    /// Metadata of `block` on `die`.
    fn block_meta(&self, die: usize, block: usize) -> BlockMeta;

    /// Number of blocks in the free pool of `die`.
    fn free_block_count(&self, die: usize) -> usize;

    /// Physical slice holding `page` of `block` on `die`.
    fn physical_slice(&self, die: usize, block: usize, page: usize) -> PhysicalSlice;

    /// The logical slice last written to `slice`, if any.
    fn logical_owner(&self, slice: PhysicalSlice) -> Option<LogicalSlice>;

    /// Where `lsa` currently lives, if it is mapped.
    fn physical_location(&self, lsa: LogicalSlice) -> Option<PhysicalSlice>;

    /// Size of the logical address space.
    fn logical_slice_count(&self) -> usize;

    /// Point `lsa` at `slice` and record `lsa` as the owner of `slice`.
    fn set_mapping(&mut self, lsa: LogicalSlice, slice: PhysicalSlice);

    /// A free slice on `die` outside `exclude_block` to relocate a page into.
    fn allocate_reclaim_slice(&mut self, die: usize, exclude_block: usize)
        -> Option<PhysicalSlice>;

    /// A staging buffer for one page copy on `die`.
    fn allocate_temp_buffer(&mut self, die: usize) -> TempBuffer;

    /// Enqueue a read of `slice` into `buffer`.
    fn issue_read(&mut self, slice: PhysicalSlice, buffer: TempBuffer);

    /// Enqueue a write of `buffer` to `slice`.
    fn issue_write(&mut self, slice: PhysicalSlice, buffer: TempBuffer);

    /// Erase `block` on `die` and return it to the free pool.
    ///
    /// Afterwards the block reports zero invalid slices and none of its
    /// slices has a logical owner.
    fn erase_block(&mut self, die: usize, block: usize);

    /// `block` on `die` was chosen as a victim; no new data may land in it.
    fn seal_block(&mut self, _die: usize, _block: usize) {}
}
