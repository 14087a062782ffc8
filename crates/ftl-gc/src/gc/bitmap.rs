//! One bit per logical slice.
//!
//! Used by the generational policy for the transient live map and the
//! persistent generation-parity map.

/// A fixed-capacity bitmap indexed by logical slice.
///
/// # Example
///
/// ```
/// use ftl_gc::gc::SliceBitmap;
///
/// let mut bitmap = SliceBitmap::new(100);
/// assert!(!bitmap.get(42));
///
/// bitmap.set(42);
/// assert!(bitmap.get(42));
/// assert_eq!(bitmap.count_ones(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceBitmap {
    words: Vec<u64>,
    capacity: usize,
}

impl SliceBitmap {
    /// Create a cleared bitmap holding `capacity` bits.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Number of addressable bits.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read bit `index`. Out-of-range bits read as clear.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    /// Set bit `index`. Out-of-range bits are ignored.
    pub fn set(&mut self, index: usize) {
        self.assign(index, true);
    }

    /// Clear bit `index`. Out-of-range bits are ignored.
    pub fn unset(&mut self, index: usize) {
        self.assign(index, false);
    }

    /// Set or clear bit `index`.
    pub fn assign(&mut self, index: usize, value: bool) {
        if index >= self.capacity {
            return;
        }
        let mask = 1 << (index % 64);
        let word = &mut self.words[index / 64];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
