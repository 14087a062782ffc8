//! Flash geometry and collector tuning.

use crate::error::ConfigError;
use crate::ftl::{LogicalSlice, PhysicalSlice};
use crate::gc::policy::PolicyKind;

/// Pages copied per `CopyValidPages` step in incremental mode.
pub const DEFAULT_PAGE_BUDGET: usize = 8;
/// Scheduler ticks between two reclamation passes over the dies.
pub const DEFAULT_SCHED_INTERVAL_TICKS: u64 = 10;
/// Free-block count at or below which single-threshold admission starts GC.
pub const DEFAULT_FREE_BLOCK_THRESHOLD: usize = 4;
/// Scheduler ticks between two flips of the generation parity.
pub const DEFAULT_GENERATION_FLIP_TICKS: u64 = 1000;
/// Weight of a live page written in the previous generation.
pub const DEFAULT_OLD_WEIGHT: u64 = 8;
/// Weight of a live page written in the current generation.
pub const DEFAULT_YOUNG_WEIGHT: u64 = 1;

/// Physical layout of the flash array as seen by the collector.
///
/// Physical slices are numbered densely, die-major:
/// `(die * blocks_per_die + block) * pages_per_block + page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtlGeometry {
    /// Number of independently addressable dies.
    pub dies: usize,
    /// Erase blocks per die.
    pub blocks_per_die: usize,
    /// Slices (pages) per erase block.
    pub pages_per_block: usize,
    /// Size of the logical address space exported to the host.
    pub logical_slices: usize,
}

impl FtlGeometry {
    /// Create a geometry description.
    #[must_use]
    pub const fn new(
        dies: usize,
        blocks_per_die: usize,
        pages_per_block: usize,
        logical_slices: usize,
    ) -> Self {
        Self {
            dies,
            blocks_per_die,
            pages_per_block,
            logical_slices,
        }
    }

    /// Total number of erase blocks across all dies.
    #[must_use]
    pub const fn total_blocks(&self) -> usize {
        self.dies * self.blocks_per_die
    }

    /// Total number of physical slices across all dies.
    #[must_use]
    pub const fn physical_slices(&self) -> usize {
        self.total_blocks() * self.pages_per_block
    }

    /// Physical slice holding `page` of `block` on `die`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn slice_at(&self, die: usize, block: usize, page: usize) -> PhysicalSlice {
        // `validate` keeps the physical address space within u32.
        PhysicalSlice(((die * self.blocks_per_die + block) * self.pages_per_block + page) as u32)
    }

    /// Decompose a physical slice into `(die, block, page)`.
    #[must_use]
    pub const fn locate(&self, slice: PhysicalSlice) -> (usize, usize, usize) {
        let raw = slice.index();
        let page = raw % self.pages_per_block;
        let block_global = raw / self.pages_per_block;
        (
            block_global / self.blocks_per_die,
            block_global % self.blocks_per_die,
            page,
        )
    }

    /// Returns `true` if `lsa` addresses the exported logical space.
    #[must_use]
    pub const fn contains_logical(&self, lsa: LogicalSlice) -> bool {
        lsa.index() < self.logical_slices
    }

    /// Check that every dimension is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a dimension is zero, the physical address
    /// space does not fit a 32-bit slice id, or the logical space exceeds the
    /// physical one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("dies", self.dies),
            ("blocks_per_die", self.blocks_per_die),
            ("pages_per_block", self.pages_per_block),
            ("logical_slices", self.logical_slices),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension(name));
            }
        }
        let physical = self
            .dies
            .checked_mul(self.blocks_per_die)
            .and_then(|blocks| blocks.checked_mul(self.pages_per_block))
            .filter(|&slices| u32::try_from(slices).is_ok())
            .ok_or(ConfigError::AddressSpaceOverflow {
                dies: self.dies,
                blocks_per_die: self.blocks_per_die,
                pages_per_block: self.pages_per_block,
            })?;
        if self.logical_slices > physical {
            return Err(ConfigError::LogicalExceedsPhysical {
                logical: self.logical_slices,
                physical,
            });
        }
        Ok(())
    }
}

/// When an idle die starts a new reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Start whenever the die has at most `free_blocks` free blocks.
    Threshold {
        /// Inclusive trigger level.
        free_blocks: usize,
    },
    /// Engage at `low` free blocks and keep reclaiming until `high` is reached.
    Hysteresis {
        /// Inclusive low watermark that engages the collector.
        low: usize,
        /// Inclusive high watermark that disengages it.
        high: usize,
    },
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::Threshold {
            free_blocks: DEFAULT_FREE_BLOCK_THRESHOLD,
        }
    }
}

/// How much work a reclamation does per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One state transition per scheduler visit, copying at most
    /// `page_budget` pages per `CopyValidPages` step.
    Incremental {
        /// Pages scanned per copy step.
        page_budget: usize,
    },
    /// A whole reclamation runs to completion in one call. Running out of
    /// candidates halts the device.
    Blocking,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Incremental {
            page_budget: DEFAULT_PAGE_BUDGET,
        }
    }
}

/// Weights of the generational sweep score `old * old + young * young`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationalWeights {
    /// Weight of a live page from the previous generation.
    pub old: u64,
    /// Weight of a live page from the current generation.
    pub young: u64,
}

impl Default for GenerationalWeights {
    fn default() -> Self {
        Self {
            old: DEFAULT_OLD_WEIGHT,
            young: DEFAULT_YOUNG_WEIGHT,
        }
    }
}

/// Collector configuration.
///
/// # Example
///
/// ```
/// use ftl_gc::config::{AdmissionPolicy, ExecutionMode, GcConfig};
/// use ftl_gc::gc::policy::PolicyKind;
///
/// let config = GcConfig::default()
///     .with_policy(PolicyKind::CostBenefit)
///     .with_admission(AdmissionPolicy::Hysteresis { low: 2, high: 6 })
///     .with_execution(ExecutionMode::Incremental { page_budget: 4 });
/// assert_eq!(config.sched_interval_ticks, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// Victim scoring strategy.
    pub policy: PolicyKind,
    /// Admission rule for idle dies.
    pub admission: AdmissionPolicy,
    /// Incremental or blocking reclamation.
    pub execution: ExecutionMode,
    /// Dies are visited on every `sched_interval_ticks`-th scheduler tick.
    pub sched_interval_ticks: u64,
    /// The generation parity flips every `generation_flip_ticks` ticks.
    pub generation_flip_ticks: u64,
    /// Generational sweep weights.
    pub generational_weights: GenerationalWeights,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            admission: AdmissionPolicy::default(),
            execution: ExecutionMode::default(),
            sched_interval_ticks: DEFAULT_SCHED_INTERVAL_TICKS,
            generation_flip_ticks: DEFAULT_GENERATION_FLIP_TICKS,
            generational_weights: GenerationalWeights::default(),
        }
    }
}

impl GcConfig {
    /// Select the victim scoring strategy.
    #[must_use]
    pub const fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Select the admission rule.
    #[must_use]
    pub const fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// Select incremental or blocking execution.
    #[must_use]
    pub const fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    /// Set the scheduling interval in ticks.
    #[must_use]
    pub const fn with_sched_interval(mut self, ticks: u64) -> Self {
        self.sched_interval_ticks = ticks;
        self
    }

    /// Set the generation flip cadence in ticks.
    #[must_use]
    pub const fn with_generation_flip(mut self, ticks: u64) -> Self {
        self.generation_flip_ticks = ticks;
        self
    }

    /// Set the generational sweep weights.
    #[must_use]
    pub const fn with_generational_weights(mut self, old: u64, young: u64) -> Self {
        self.generational_weights = GenerationalWeights { old, young };
        self
    }

    /// Pages scanned per copy step under this configuration.
    #[must_use]
    pub const fn page_budget(&self, geometry: &FtlGeometry) -> usize {
        match self.execution {
            ExecutionMode::Incremental { page_budget } => page_budget,
            ExecutionMode::Blocking => geometry.pages_per_block,
        }
    }

    /// Check the configuration against `geometry`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid geometry, a zero page budget or
    /// cadence, or watermarks that are inverted or exceed the die size.
    pub fn validate(&self, geometry: &FtlGeometry) -> Result<(), ConfigError> {
        geometry.validate()?;
        if let ExecutionMode::Incremental { page_budget: 0 } = self.execution {
            return Err(ConfigError::ZeroPageBudget);
        }
        if self.sched_interval_ticks == 0 {
            return Err(ConfigError::ZeroCadence("sched_interval_ticks"));
        }
        if self.generation_flip_ticks == 0 {
            return Err(ConfigError::ZeroCadence("generation_flip_ticks"));
        }
        let highest = match self.admission {
            AdmissionPolicy::Threshold { free_blocks } => free_blocks,
            AdmissionPolicy::Hysteresis { low, high } => {
                if low >= high {
                    return Err(ConfigError::InvertedWatermarks { low, high });
                }
                high
            }
        };
        if highest > geometry.blocks_per_die {
            return Err(ConfigError::WatermarkAboveDieSize {
                watermark: highest,
                blocks_per_die: geometry.blocks_per_die,
            });
        }
        Ok(())
    }
}
