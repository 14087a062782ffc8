//! Thread-safe engine handle.
//!
//! The collector is single-threaded by construction: a tick, a manual
//! trigger and a host notification must never interleave. [`SharedEngine`]
//! serializes them behind one lock that also guards the FTL, while the
//! counters stay readable without it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GcError;
use crate::ftl::FlashTranslation;
use crate::gc::engine::{GcEngine, TickReport};
use crate::metrics::EngineMetrics;

#[derive(Debug)]
struct Inner<F> {
    engine: GcEngine,
    ftl: F,
}

/// A [`GcEngine`] and its FTL behind one shared lock.
///
/// # Example
///
/// ```
/// use std::thread;
///
/// use ftl_gc::config::{FtlGeometry, GcConfig};
/// use ftl_gc::sim::MemoryFtl;
/// use ftl_gc::{GcEngine, SharedEngine};
///
/// let geometry = FtlGeometry::new(2, 8, 4, 32);
/// let engine = GcEngine::new(geometry, GcConfig::default().with_sched_interval(1)).unwrap();
/// let shared = SharedEngine::new(engine, MemoryFtl::new(geometry).unwrap());
///
/// let worker = shared.clone();
/// thread::spawn(move || worker.tick().unwrap()).join().unwrap();
/// assert_eq!(shared.metrics().total_scheduler_ticks(), 1);
/// ```
#[derive(Debug)]
pub struct SharedEngine<F> {
    inner: Arc<Mutex<Inner<F>>>,
    metrics: Arc<EngineMetrics>,
}

impl<F> Clone for SharedEngine<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<F: FlashTranslation> SharedEngine<F> {
    /// Wrap `engine` and the `ftl` it collects.
    #[must_use]
    pub fn new(engine: GcEngine, ftl: F) -> Self {
        let metrics = Arc::clone(engine.metrics());
        Self {
            inner: Arc::new(Mutex::new(Inner { engine, ftl })),
            metrics,
        }
    }

    /// Run one scheduler tick under the lock.
    ///
    /// # Errors
    ///
    /// Propagates [`GcError`] from [`GcEngine::run_scheduler_tick`].
    pub fn tick(&self) -> Result<TickReport, GcError> {
        let mut guard = self.inner.lock();
        let Inner { engine, ftl } = &mut *guard;
        engine.run_scheduler_tick(ftl)
    }

    /// Demand a reclamation on `die`.
    ///
    /// # Errors
    ///
    /// Propagates [`GcError`] from [`GcEngine::trigger_reclamation`].
    pub fn trigger(&self, die: usize) -> Result<bool, GcError> {
        self.inner.lock().engine.trigger_reclamation(die)
    }

    /// Run `f` with exclusive access to the engine and the FTL.
    pub fn with<R>(&self, f: impl FnOnce(&mut GcEngine, &mut F) -> R) -> R {
        let mut guard = self.inner.lock();
        let Inner { engine, ftl } = &mut *guard;
        f(engine, ftl)
    }

    /// Counters, readable without taking the lock.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Recover the engine and FTL if this is the last handle.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged while other handles exist.
    pub fn into_inner(self) -> Result<(GcEngine, F), Self> {
        let metrics = self.metrics;
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let Inner { engine, ftl } = inner.into_inner();
                Ok((engine, ftl))
            }
            Err(inner) => Err(Self { inner, metrics }),
        }
    }
}
