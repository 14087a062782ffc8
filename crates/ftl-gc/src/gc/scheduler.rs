//! Tick-driven admission of new reclamations.

use crate::config::{AdmissionPolicy, GcConfig};

/// What the current tick asks of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    /// The scheduler tick just entered, starting at 1.
    pub tick: u64,
    /// Dies are visited on this tick.
    pub visit_dies: bool,
    /// The generation parity flips on this tick.
    pub flip_generation: bool,
}

/// Scheduler clock and per-die admission state.
///
/// # Example
///
/// ```
/// use ftl_gc::config::{AdmissionPolicy, GcConfig};
/// use ftl_gc::gc::Scheduler;
///
/// let config = GcConfig::default()
///     .with_admission(AdmissionPolicy::Hysteresis { low: 2, high: 5 });
/// let mut scheduler = Scheduler::new(1, &config);
///
/// assert!(!scheduler.should_start(0, 3));
/// assert!(scheduler.should_start(0, 2));
/// assert!(scheduler.should_start(0, 4));
/// assert!(!scheduler.should_start(0, 5));
/// ```
#[derive(Debug, Clone)]
pub struct Scheduler {
    tick: u64,
    interval: u64,
    flip_every: u64,
    admission: AdmissionPolicy,
    engaged: Vec<bool>,
}

impl Scheduler {
    /// Create a scheduler for `dies` dies at tick 0.
    #[must_use]
    pub fn new(dies: usize, config: &GcConfig) -> Self {
        Self {
            tick: 0,
            interval: config.sched_interval_ticks.max(1),
            flip_every: config.generation_flip_ticks.max(1),
            admission: config.admission,
            engaged: vec![false; dies],
        }
    }

    /// Ticks elapsed so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Returns `true` while hysteresis keeps `die` reclaiming.
    #[must_use]
    pub fn is_engaged(&self, die: usize) -> bool {
        self.engaged.get(die).copied().unwrap_or(false)
    }

    /// Enter the next tick.
    pub fn advance(&mut self) -> TickPlan {
        self.tick += 1;
        TickPlan {
            tick: self.tick,
            visit_dies: self.tick % self.interval == 0,
            flip_generation: self.tick % self.flip_every == 0,
        }
    }

    /// Whether an idle `die` with `free_blocks` free blocks starts reclaiming.
    pub fn should_start(&mut self, die: usize, free_blocks: usize) -> bool {
        match self.admission {
            AdmissionPolicy::Threshold { free_blocks: threshold } => free_blocks <= threshold,
            AdmissionPolicy::Hysteresis { low, high } => {
                let Some(engaged) = self.engaged.get_mut(die) else {
                    return false;
                };
                if free_blocks >= high {
                    *engaged = false;
                } else if free_blocks <= low {
                    *engaged = true;
                }
                *engaged
            }
        }
    }
}
