//! Host threads and a collector thread sharing one engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ftl_gc::config::{AdmissionPolicy, FtlGeometry, GcConfig};
use ftl_gc::sim::{MemoryFtl, SimError};
use ftl_gc::{GcEngine, LogicalSlice, SharedEngine};

const HOST_THREADS: u32 = 3;
const WRITES_PER_THREAD: u32 = 400;
const SLICES_PER_THREAD: u32 = 16;

fn shared() -> SharedEngine<MemoryFtl> {
    let geometry = FtlGeometry::new(2, 12, 8, 64);
    let config = GcConfig::default()
        .with_admission(AdmissionPolicy::Hysteresis { low: 3, high: 6 })
        .with_sched_interval(1);
    let engine = GcEngine::new(geometry, config).unwrap();
    SharedEngine::new(engine, MemoryFtl::new(geometry).unwrap())
}

fn host_write(shared: &SharedEngine<MemoryFtl>, lsa: u32) -> Result<(), SimError> {
    shared.with(|engine, ftl| {
        let stale = ftl.write(lsa)?;
        engine.note_logical_write(LogicalSlice(lsa))?;
        if let Some(stale) = stale {
            engine.notify_block_invalidated(stale.die, stale.block, stale.invalid_slices)?;
        }
        Ok(())
    })
}

#[test]
fn test_concurrent_host_writes_and_ticks() {
    let shared = shared();
    let done = Arc::new(AtomicBool::new(false));

    let collector = {
        let shared = shared.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                shared.tick().unwrap();
                thread::yield_now();
            }
        })
    };

    let hosts: Vec<_> = (0..HOST_THREADS)
        .map(|id| {
            let shared = shared.clone();
            thread::spawn(move || {
                let base = id * SLICES_PER_THREAD;
                for n in 0..WRITES_PER_THREAD {
                    let lsa = base + n % SLICES_PER_THREAD;
                    loop {
                        match host_write(&shared, lsa) {
                            Ok(()) => break,
                            Err(SimError::NoFreeBlock { .. }) => thread::yield_now(),
                            Err(err) => panic!("host write failed: {err}"),
                        }
                    }
                }
            })
        })
        .collect();

    for host in hosts {
        host.join().unwrap();
    }
    done.store(true, Ordering::Release);
    collector.join().unwrap();

    let metrics = Arc::clone(shared.metrics());
    let (engine, ftl) = shared.into_inner().unwrap();
    ftl.verify_mappings().unwrap();
    for die in 0..2 {
        engine.victims().verify(die).unwrap();
    }
    assert!(metrics.total_scheduler_ticks() > 0);
    assert!(metrics.total_reclamations() > 0);
}

#[test]
fn test_metrics_readable_while_locked() {
    let shared = shared();
    let metrics = Arc::clone(shared.metrics());

    shared.with(|_, _| {
        assert_eq!(metrics.total_scheduler_ticks(), 0);
    });
    shared.tick().unwrap();
    assert_eq!(metrics.total_scheduler_ticks(), 1);
}
