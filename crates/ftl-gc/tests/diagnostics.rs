//! Diagnostics raised when the FTL misbehaves underneath the collector.

mod common;

use ftl_gc::config::{FtlGeometry, GcConfig};
use ftl_gc::error::PostEraseViolation;
use ftl_gc::sim::MemoryFtl;
use ftl_gc::{
    AdmissionPolicy, BlockMeta, FlashTranslation, GcDiagnostic, GcEngine, GcError, LogicalSlice,
    PhysicalSlice, ReclaimState, StepOutcome, TempBuffer,
};

/// Wraps a [`MemoryFtl`] and injects faults.
#[derive(Debug)]
struct FaultyFtl {
    inner: MemoryFtl,
    drop_mappings: bool,
    skip_erase: bool,
    deny_destinations: Option<usize>,
}

impl FaultyFtl {
    fn new(inner: MemoryFtl) -> Self {
        Self {
            inner,
            drop_mappings: false,
            skip_erase: false,
            deny_destinations: None,
        }
    }
}

impl FlashTranslation for FaultyFtl {
    fn block_meta(&self, die: usize, block: usize) -> BlockMeta {
        self.inner.block_meta(die, block)
    }

    fn free_block_count(&self, die: usize) -> usize {
        self.inner.free_block_count(die)
    }

    fn physical_slice(&self, die: usize, block: usize, page: usize) -> PhysicalSlice {
        self.inner.physical_slice(die, block, page)
    }

    fn logical_owner(&self, slice: PhysicalSlice) -> Option<LogicalSlice> {
        self.inner.logical_owner(slice)
    }

    fn physical_location(&self, lsa: LogicalSlice) -> Option<PhysicalSlice> {
        self.inner.physical_location(lsa)
    }

    fn logical_slice_count(&self) -> usize {
        self.inner.logical_slice_count()
    }

    fn set_mapping(&mut self, lsa: LogicalSlice, slice: PhysicalSlice) {
        if !self.drop_mappings {
            self.inner.set_mapping(lsa, slice);
        }
    }

    fn allocate_reclaim_slice(&mut self, die: usize, exclude_block: usize) -> Option<PhysicalSlice> {
        if self.deny_destinations == Some(die) {
            return None;
        }
        self.inner.allocate_reclaim_slice(die, exclude_block)
    }

    fn allocate_temp_buffer(&mut self, die: usize) -> TempBuffer {
        self.inner.allocate_temp_buffer(die)
    }

    fn issue_read(&mut self, slice: PhysicalSlice, buffer: TempBuffer) {
        self.inner.issue_read(slice, buffer);
    }

    fn issue_write(&mut self, slice: PhysicalSlice, buffer: TempBuffer) {
        self.inner.issue_write(slice, buffer);
    }

    fn erase_block(&mut self, die: usize, block: usize) {
        if !self.skip_erase {
            self.inner.erase_block(die, block);
        }
    }

    fn seal_block(&mut self, die: usize, block: usize) {
        self.inner.seal_block(die, block);
    }
}

/// One die; block 0 holds lsa 1..4 live and lsa 0 stale.
fn setup() -> (GcEngine, FaultyFtl) {
    let geometry = FtlGeometry::new(1, 6, 4, 16);
    let mut engine = GcEngine::new(geometry, GcConfig::default()).unwrap();
    let mut ftl = MemoryFtl::new(geometry).unwrap();
    common::write_all(&mut engine, &mut ftl, [0, 1, 2, 3, 0]);
    engine.trigger_reclamation(0).unwrap();
    (engine, FaultyFtl::new(ftl))
}

fn run_to_idle(engine: &mut GcEngine, ftl: &mut FaultyFtl) {
    while !matches!(engine.step(0, ftl).unwrap(), StepOutcome::Erased { .. }) {}
}

#[test]
fn test_lost_mapping_update_is_reported() {
    let (mut engine, mut ftl) = setup();
    ftl.drop_mappings = true;
    run_to_idle(&mut engine, &mut ftl);

    let diagnostics = engine.take_diagnostics();
    assert_eq!(diagnostics.len(), 3);
    assert!(matches!(
        diagnostics[0],
        GcDiagnostic::InconsistentMapping {
            die: 0,
            victim: 0,
            lsa: LogicalSlice(1),
            found: Some(_),
            ..
        }
    ));
    assert_eq!(engine.metrics().total_mapping_mismatches(), 3);
    assert_eq!(engine.diagnostics().count(), 0);
}

#[test]
fn test_skipped_erase_violates_post_erase_checks() {
    let (mut engine, mut ftl) = setup();
    ftl.skip_erase = true;
    run_to_idle(&mut engine, &mut ftl);

    let violations: Vec<PostEraseViolation> = engine
        .diagnostics()
        .filter_map(|d| match *d {
            GcDiagnostic::PostEraseInvariantViolation {
                block: 0,
                violation,
                ..
            } => Some(violation),
            GcDiagnostic::PostEraseInvariantViolation { .. }
            | GcDiagnostic::InconsistentMapping { .. } => None,
        })
        .collect();

    assert!(violations.contains(&PostEraseViolation::InvalidCountNonZero(1)));
    assert!(violations
        .iter()
        .any(|v| matches!(v, PostEraseViolation::SliceStillMapped { .. })));
    assert!(!engine.context(0).unwrap().is_active());
    assert!(!engine.is_halted());
}

#[test]
fn test_missing_destination_keeps_cursor() {
    let (mut engine, mut ftl) = setup();
    ftl.deny_destinations = Some(0);

    assert!(matches!(
        engine.step(0, &mut ftl).unwrap(),
        StepOutcome::VictimSelected { block: 0, .. }
    ));
    assert_eq!(
        engine.step(0, &mut ftl),
        Err(GcError::NoReclaimDestination {
            die: 0,
            victim: 0,
            page: 1
        })
    );
    assert_eq!(engine.context(0).unwrap().cursor(), 1);

    ftl.deny_destinations = None;
    run_to_idle(&mut engine, &mut ftl);
    assert_eq!(engine.history().recent(1)[0].pages_copied, 3);
    ftl.inner.verify_mappings().unwrap();
}

#[test]
fn test_failing_die_does_not_stall_the_others() {
    let geometry = FtlGeometry::new(2, 6, 4, 16);
    let config = GcConfig::default()
        .with_admission(AdmissionPolicy::Threshold { free_blocks: 6 })
        .with_sched_interval(1);
    let mut engine = GcEngine::new(geometry, config).unwrap();
    let mut ftl = MemoryFtl::new(geometry).unwrap();
    // block 0 of each die holds four slices, one of which goes stale
    common::write_all(&mut engine, &mut ftl, (0..8).chain([0, 1]));
    let mut ftl = FaultyFtl::new(ftl);
    ftl.deny_destinations = Some(0);

    let mut failures = Vec::new();
    for _ in 0..10 {
        failures.extend(engine.run_scheduler_tick(&mut ftl).unwrap().failures);
    }

    assert!(!failures.is_empty());
    assert!(failures.iter().all(|failure| failure.die == 0
        && failure.error
            == GcError::NoReclaimDestination {
                die: 0,
                victim: 0,
                page: 1
            }));
    assert_eq!(engine.metrics().total_step_failures(), failures.len() as u64);
    assert!(engine
        .history()
        .recent(8)
        .iter()
        .any(|record| record.die == 1 && record.victim == 0));

    let ctx = engine.context(0).unwrap();
    assert_eq!(ctx.state(), ReclaimState::CopyValidPages);
    assert_eq!(ctx.cursor(), 1);

    ftl.deny_destinations = None;
    for _ in 0..4 {
        let report = engine.run_scheduler_tick(&mut ftl).unwrap();
        assert_eq!(report.failure(0), None);
    }
    assert!(engine
        .history()
        .recent(8)
        .iter()
        .any(|record| record.die == 0 && record.victim == 0));
    ftl.inner.verify_mappings().unwrap();
}
