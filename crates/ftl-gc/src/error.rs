//! Error and diagnostic types.

use thiserror::Error;

use crate::ftl::{LogicalSlice, PhysicalSlice};

/// Victim selection failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    /// No block on the die is eligible for reclamation.
    #[error("no reclaimable block on die {die}")]
    NoCandidate {
        /// Die that was searched.
        die: usize,
    },
}

/// Errors returned by the collector's entry points.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// Blocking reclamation found no victim. The engine is halted.
    #[error("flash exhausted on die {die}: no victim for blocking reclamation")]
    FlashExhausted {
        /// Die that ran out of reclaimable space.
        die: usize,
    },
    /// The engine halted after flash exhaustion and accepts no more work.
    #[error("device halted after flash exhaustion")]
    DeviceHalted,
    /// Die index beyond the configured geometry.
    #[error("die {die} out of range ({dies} dies)")]
    DieOutOfRange {
        /// Requested die.
        die: usize,
        /// Configured die count.
        dies: usize,
    },
    /// Block index beyond the configured geometry.
    #[error("block {block} out of range on die {die}")]
    BlockOutOfRange {
        /// Die of the request.
        die: usize,
        /// Requested block.
        block: usize,
    },
    /// Logical slice beyond the exported address space.
    #[error("logical slice {lsa} out of range")]
    LogicalSliceOutOfRange {
        /// Requested logical slice.
        lsa: LogicalSlice,
    },
    /// Invalid-slice bucket larger than the block.
    #[error("bucket {bucket} exceeds pages per block ({max})")]
    BucketOutOfRange {
        /// Requested bucket.
        bucket: usize,
        /// Largest valid bucket.
        max: usize,
    },
    /// The collaborator had no free slice to relocate a live page into.
    #[error("no destination for page {page} of victim block {victim} on die {die}")]
    NoReclaimDestination {
        /// Die being reclaimed.
        die: usize,
        /// Victim block.
        victim: usize,
        /// Page that could not be relocated; it is retried on the next step.
        page: usize,
    },
}

/// Rejected geometry or configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A geometry dimension is zero.
    #[error("geometry dimension `{0}` must be non-zero")]
    ZeroDimension(&'static str),
    /// The physical address space does not fit a 32-bit slice id.
    #[error("{dies} dies x {blocks_per_die} blocks x {pages_per_block} pages overflows the slice address space")]
    AddressSpaceOverflow {
        /// Configured dies.
        dies: usize,
        /// Configured blocks per die.
        blocks_per_die: usize,
        /// Configured pages per block.
        pages_per_block: usize,
    },
    /// More logical slices than physical ones.
    #[error("{logical} logical slices exceed {physical} physical slices")]
    LogicalExceedsPhysical {
        /// Configured logical slices.
        logical: usize,
        /// Available physical slices.
        physical: usize,
    },
    /// Incremental execution with a zero page budget never makes progress.
    #[error("incremental page budget must be non-zero")]
    ZeroPageBudget,
    /// A tick cadence is zero.
    #[error("`{0}` must be non-zero")]
    ZeroCadence(&'static str),
    /// Hysteresis low watermark is not below the high watermark.
    #[error("hysteresis low watermark {low} must be below high watermark {high}")]
    InvertedWatermarks {
        /// Configured low watermark.
        low: usize,
        /// Configured high watermark.
        high: usize,
    },
    /// A watermark larger than the die itself can never be satisfied.
    #[error("watermark {watermark} exceeds {blocks_per_die} blocks per die")]
    WatermarkAboveDieSize {
        /// Offending watermark.
        watermark: usize,
        /// Configured blocks per die.
        blocks_per_die: usize,
    },
}

/// A structural defect found by [`VictimIndex::verify`](crate::gc::VictimIndex::verify).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IndexCorruption {
    /// The head of a bucket list has a predecessor.
    #[error("die {die} bucket {bucket}: head block {block} has a prev link")]
    HeadHasPrev {
        /// Die of the list.
        die: usize,
        /// Bucket of the list.
        bucket: usize,
        /// Head block.
        block: usize,
    },
    /// A list has a tail but no head, or the tail is not the last block reached.
    #[error("die {die} bucket {bucket}: tail does not terminate the list")]
    TailMismatch {
        /// Die of the list.
        die: usize,
        /// Bucket of the list.
        bucket: usize,
    },
    /// A block's `prev` does not name the block that links to it.
    #[error("die {die}: block {block} has a broken back link")]
    BrokenBackLink {
        /// Die of the list.
        die: usize,
        /// Block with the inconsistent link.
        block: usize,
    },
    /// A block is linked into a list other than the one it records.
    #[error("die {die}: block {block} reached in bucket {found} but records {recorded:?}")]
    WrongBucket {
        /// Die of the list.
        die: usize,
        /// Misfiled block.
        block: usize,
        /// Bucket it was reached from.
        found: usize,
        /// Bucket recorded on the block.
        recorded: Option<usize>,
    },
    /// A block is reachable twice, from one list or two.
    #[error("die {die}: block {block} reachable more than once")]
    DuplicateMembership {
        /// Die of the list.
        die: usize,
        /// Duplicated block.
        block: usize,
    },
    /// A block records membership but no list reaches it.
    #[error("die {die}: block {block} is linked but unreachable")]
    Unreachable {
        /// Die of the list.
        die: usize,
        /// Orphaned block.
        block: usize,
    },
    /// A detached block still carries neighbour links.
    #[error("die {die}: detached block {block} has dangling links")]
    DanglingLinks {
        /// Die of the block.
        die: usize,
        /// Block with leftover links.
        block: usize,
    },
    /// The cached list length disagrees with the walk.
    #[error("die {die} bucket {bucket}: recorded length {recorded}, walked {walked}")]
    LengthMismatch {
        /// Die of the list.
        die: usize,
        /// Bucket of the list.
        bucket: usize,
        /// Cached length.
        recorded: usize,
        /// Length found by walking the list.
        walked: usize,
    },
}

/// Which post-erase check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostEraseViolation {
    /// The erased block still reports invalid slices.
    InvalidCountNonZero(usize),
    /// The erased block is still linked into the victim index.
    StillLinked,
    /// A slice of the erased block still has a logical owner.
    SliceStillMapped {
        /// The mapped slice.
        slice: PhysicalSlice,
        /// Its owner.
        owner: LogicalSlice,
    },
}

/// Non-fatal inconsistencies observed while reclaiming.
///
/// Diagnostics never abort a reclamation. The engine counts them, keeps the
/// most recent ones and emits them as warnings.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GcDiagnostic {
    /// After relocating a page the forward map does not point at the copy.
    #[error("die {die} victim {victim}: {lsa} maps to {found:?} after relocation to {expected}")]
    InconsistentMapping {
        /// Die being reclaimed.
        die: usize,
        /// Victim block.
        victim: usize,
        /// Relocated logical slice.
        lsa: LogicalSlice,
        /// Slice the page was written to.
        expected: PhysicalSlice,
        /// Slice the forward map reports.
        found: Option<PhysicalSlice>,
    },
    /// The erased block does not look erased.
    #[error("die {die} block {block}: post-erase check failed: {violation:?}")]
    PostEraseInvariantViolation {
        /// Die of the block.
        die: usize,
        /// Erased block.
        block: usize,
        /// Failed check.
        violation: PostEraseViolation,
    },
}
