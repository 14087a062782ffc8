//! Garbage collection for a flash translation layer.
//!
//! `ftl-gc` reclaims mostly-invalid flash blocks on a per-die basis while host
//! I/O keeps flowing. Flash pages cannot be rewritten in place, so every
//! logical overwrite leaves a stale physical slice behind; the collector picks
//! a victim block, relocates the slices that are still live, erases the victim
//! and hands it back to the free pool.
//!
//! # Components
//!
//! - [`gc::VictimIndex`]: per-die candidate lists bucketed by invalid-slice count
//! - [`gc::policy`]: interchangeable victim scoring (`Greedy`, `CostBenefit`,
//!   `Generational`)
//! - [`gc::ReclaimContext`]: the incremental `Idle -> SelectVictim ->
//!   CopyValidPages -> EraseBlock` state machine, one per die
//! - [`gc::Scheduler`]: tick-driven admission with a single threshold or a
//!   low/high watermark pair
//! - [`GcEngine`]: owns all of the above and is driven by the host firmware loop
//!
//! The surrounding FTL is reached only through the [`FlashTranslation`] trait.
//! [`sim::MemoryFtl`] is a complete in-memory implementation used by the tests
//! and benchmarks.
//!
//! # Quick Start
//!
//! ```
//! use ftl_gc::config::{AdmissionPolicy, FtlGeometry, GcConfig};
//! use ftl_gc::gc::policy::PolicyKind;
//! use ftl_gc::sim::SimulatedDrive;
//!
//! let geometry = FtlGeometry::new(1, 16, 8, 64);
//! let config = GcConfig::default()
//!     .with_policy(PolicyKind::Greedy)
//!     .with_admission(AdmissionPolicy::Threshold { free_blocks: 4 })
//!     .with_sched_interval(1);
//!
//! let mut drive = SimulatedDrive::new(geometry, config).unwrap();
//! for _ in 0..4 {
//!     for lsa in 0..64 {
//!         drive.write(lsa).unwrap();
//!         drive.run_ticks(2).unwrap();
//!     }
//! }
//! assert!(drive.engine().metrics().total_reclamations() > 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod ftl;
pub mod gc;
pub mod metrics;
pub mod sim;
pub mod sync;
mod tracing;

pub use config::{AdmissionPolicy, ExecutionMode, FtlGeometry, GcConfig, GenerationalWeights};
pub use error::{ConfigError, GcDiagnostic, GcError, IndexCorruption, SelectionError};
pub use ftl::{BlockMeta, FlashTranslation, LogicalSlice, PhysicalSlice, TempBuffer};
pub use gc::engine::{DieFailure, DieOutcome, GcEngine, TickReport};
pub use gc::policy::{PolicyKind, Selection, VictimPolicy};
pub use gc::reclaim::{ReclaimContext, ReclaimState, StepOutcome};
pub use metrics::{EngineMetrics, ReclaimHistory, ReclaimMetrics};
pub use sync::SharedEngine;
