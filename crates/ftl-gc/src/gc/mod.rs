//! Block reclamation: victim index, scoring policies, the per-die state
//! machine, the scheduler, and the engine that ties them together.

pub mod bitmap;
pub mod engine;
pub mod policy;
pub mod reclaim;
pub mod scheduler;
pub mod victim;

pub use bitmap::SliceBitmap;
pub use engine::GcEngine;
pub use reclaim::{ReclaimContext, ReclaimState, StepOutcome};
pub use scheduler::Scheduler;
pub use victim::{Link, VictimIndex};
