//! Incremental reclamation: each step scans at most the page budget.

mod common;

use ftl_gc::config::{ExecutionMode, FtlGeometry, GcConfig};
use ftl_gc::sim::{MemoryFtl, NandRequest};
use ftl_gc::{FlashTranslation, GcEngine, LogicalSlice, ReclaimState, StepOutcome};

fn setup(page_budget: usize) -> (GcEngine, MemoryFtl) {
    let geometry = FtlGeometry::new(1, 4, 10, 20);
    let config = GcConfig::default().with_execution(ExecutionMode::Incremental { page_budget });
    let mut engine = GcEngine::new(geometry, config).unwrap();
    let mut ftl = MemoryFtl::new(geometry).unwrap();

    common::write_all(&mut engine, &mut ftl, 0..10);
    common::write_all(&mut engine, &mut ftl, [0]);
    ftl.drain_requests();
    (engine, ftl)
}

#[test]
fn test_cursor_advances_by_budget() {
    let (mut engine, mut ftl) = setup(3);
    assert!(engine.trigger_reclamation(0).unwrap());
    assert_eq!(
        engine.step(0, &mut ftl).unwrap(),
        StepOutcome::VictimSelected { block: 0, score: 1 }
    );

    let expected = [(3, 2, 3), (3, 3, 6), (3, 3, 9), (1, 1, 10)];
    for (scanned, copied, cursor) in expected {
        assert_eq!(
            engine.step(0, &mut ftl).unwrap(),
            StepOutcome::Copied {
                scanned,
                copied,
                cursor
            }
        );
    }
    assert_eq!(engine.context(0).unwrap().state(), ReclaimState::EraseBlock);

    assert_eq!(
        engine.step(0, &mut ftl).unwrap(),
        StepOutcome::Erased { block: 0 }
    );
    assert_eq!(engine.context(0).unwrap().state(), ReclaimState::Idle);

    let record = engine.history().recent(1)[0];
    assert_eq!(record.pages_scanned, 10);
    assert_eq!(record.pages_copied, 9);
    assert_eq!(record.steps, 7);
    assert_eq!(engine.metrics().total_pages_copied(), 9);
}

#[test]
fn test_relocated_pages_keep_their_data() {
    let (mut engine, mut ftl) = setup(4);
    engine.trigger_reclamation(0).unwrap();
    while !matches!(engine.step(0, &mut ftl).unwrap(), StepOutcome::Erased { .. }) {}

    for lsa in 0..10 {
        let slice = ftl.physical_location(LogicalSlice(lsa)).unwrap();
        let (_, block, _) = ftl.geometry().locate(slice);
        assert_ne!(block, 0);
        assert_eq!(ftl.logical_owner(slice), Some(LogicalSlice(lsa)));
    }
    assert!(ftl.block_meta(0, 0).free);
    ftl.verify_mappings().unwrap();

    let requests = ftl.drain_requests();
    let reads = requests
        .iter()
        .filter(|r| matches!(r, NandRequest::Read { .. }))
        .count();
    assert_eq!(reads, 9);
    assert_eq!(requests.last(), Some(&NandRequest::Erase { die: 0, block: 0 }));
}

#[test]
fn test_host_overwrite_during_copy_is_not_relocated() {
    let (mut engine, mut ftl) = setup(3);
    engine.trigger_reclamation(0).unwrap();
    engine.step(0, &mut ftl).unwrap();
    engine.step(0, &mut ftl).unwrap();

    // lsa 5 still sits under the cursor in the victim
    common::write_all(&mut engine, &mut ftl, [5]);
    assert!(!engine.victims().contains(0, 0));

    let mut copied = 0;
    loop {
        match engine.step(0, &mut ftl).unwrap() {
            StepOutcome::Copied { copied: n, .. } => copied += n,
            StepOutcome::Erased { .. } => break,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(copied, 6);
    ftl.verify_mappings().unwrap();
}

#[test]
fn test_blocking_mode_finishes_in_one_call() {
    let (mut engine, mut ftl) = setup(3);
    assert_eq!(
        engine.reclaim_blocking(0, &mut ftl).unwrap(),
        StepOutcome::Erased { block: 0 }
    );
    assert_eq!(engine.history().recent(1)[0].pages_copied, 9);
}
