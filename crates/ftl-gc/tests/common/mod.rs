//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ftl_gc::config::FtlGeometry;
use ftl_gc::sim::{MemoryFtl, SimulatedDrive};
use ftl_gc::{BlockMeta, FlashTranslation, GcEngine, LogicalSlice, PhysicalSlice, TempBuffer};

/// An FTL whose block table is fixed up front and which holds no data.
///
/// Useful for exercising selection without building a mapping first.
#[derive(Debug)]
pub struct StaticFtl {
    geometry: FtlGeometry,
    blocks: Vec<BlockMeta>,
}

impl StaticFtl {
    /// Every block in use with zero invalid slices.
    pub fn new(geometry: FtlGeometry) -> Self {
        Self {
            geometry,
            blocks: vec![BlockMeta::default(); geometry.total_blocks()],
        }
    }

    pub fn meta_mut(&mut self, die: usize, block: usize) -> &mut BlockMeta {
        &mut self.blocks[die * self.geometry.blocks_per_die + block]
    }
}

impl FlashTranslation for StaticFtl {
    fn block_meta(&self, die: usize, block: usize) -> BlockMeta {
        self.blocks[die * self.geometry.blocks_per_die + block]
    }

    fn free_block_count(&self, die: usize) -> usize {
        (0..self.geometry.blocks_per_die)
            .filter(|&block| self.block_meta(die, block).free)
            .count()
    }

    fn physical_slice(&self, die: usize, block: usize, page: usize) -> PhysicalSlice {
        self.geometry.slice_at(die, block, page)
    }

    fn logical_owner(&self, _slice: PhysicalSlice) -> Option<LogicalSlice> {
        None
    }

    fn physical_location(&self, _lsa: LogicalSlice) -> Option<PhysicalSlice> {
        None
    }

    fn logical_slice_count(&self) -> usize {
        self.geometry.logical_slices
    }

    fn set_mapping(&mut self, _lsa: LogicalSlice, _slice: PhysicalSlice) {}

    fn allocate_reclaim_slice(&mut self, _die: usize, _exclude_block: usize) -> Option<PhysicalSlice> {
        None
    }

    fn allocate_temp_buffer(&mut self, _die: usize) -> TempBuffer {
        TempBuffer(0)
    }

    fn issue_read(&mut self, _slice: PhysicalSlice, _buffer: TempBuffer) {}

    fn issue_write(&mut self, _slice: PhysicalSlice, _buffer: TempBuffer) {}

    fn erase_block(&mut self, die: usize, block: usize) {
        let meta = self.meta_mut(die, block);
        meta.invalid_slices = 0;
        meta.free = true;
        meta.erase_count += 1;
    }
}

/// Host-write `lsas` straight into `ftl`, forwarding every invalidation.
pub fn write_all(engine: &mut GcEngine, ftl: &mut MemoryFtl, lsas: impl IntoIterator<Item = u32>) {
    for lsa in lsas {
        if let Some(stale) = ftl.write(lsa).unwrap() {
            engine
                .notify_block_invalidated(stale.die, stale.block, stale.invalid_slices)
                .unwrap();
        }
    }
}

/// Assert the victim index and the FTL tables are coherent on every die.
pub fn assert_consistent(drive: &SimulatedDrive) {
    for die in 0..drive.ftl().geometry().dies {
        drive.engine().victims().verify(die).unwrap();
    }
    drive.ftl().verify_mappings().unwrap();
    assert_eq!(drive.engine().diagnostics().count(), 0);
}
