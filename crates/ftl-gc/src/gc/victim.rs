//! Per-die victim candidate lists.
//!
//! Every die owns `pages_per_block + 1` doubly linked lists, one per
//! invalid-slice count. Blocks are linked through an arena of [`Link`]
//! records indexed by `(die, block)`, so a block can sit in at most one list
//! and detaching it is O(1).

use crate::config::FtlGeometry;
use crate::error::{GcError, IndexCorruption};

/// List membership of one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    /// Previous block in the same bucket list.
    pub prev: Option<usize>,
    /// Next block in the same bucket list.
    pub next: Option<usize>,
    /// Bucket the block is linked into, `None` when detached.
    pub bucket: Option<usize>,
}

impl Link {
    /// Returns `true` if the block is linked into some bucket.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.bucket.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BucketList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

/// The victim candidate index for all dies.
///
/// Only [`insert`](Self::insert) checks its die and block; the other
/// accessors expect coordinates inside the geometry the index was built for.
///
/// # Example
///
/// ```
/// use ftl_gc::config::FtlGeometry;
/// use ftl_gc::gc::VictimIndex;
///
/// let mut index = VictimIndex::new(&FtlGeometry::new(1, 8, 8, 32));
/// index.insert(0, 3, 5).unwrap();
/// index.insert(0, 4, 7).unwrap();
///
/// assert_eq!(index.peek_highest(0), Some((7, 4)));
/// assert_eq!(index.pop_head(0, 7), Some(4));
/// assert_eq!(index.pop_head(0, 5), Some(3));
/// assert!(index.is_empty(0));
/// ```
#[derive(Debug, Clone)]
pub struct VictimIndex {
    blocks_per_die: usize,
    pages_per_block: usize,
    buckets: Vec<BucketList>,
    links: Vec<Link>,
    members: Vec<usize>,
}

impl VictimIndex {
    /// Create an empty index sized for `geometry`.
    #[must_use]
    pub fn new(geometry: &FtlGeometry) -> Self {
        Self {
            blocks_per_die: geometry.blocks_per_die,
            pages_per_block: geometry.pages_per_block,
            buckets: vec![BucketList::default(); geometry.dies * (geometry.pages_per_block + 1)],
            links: vec![Link::default(); geometry.total_blocks()],
            members: vec![0; geometry.dies],
        }
    }

    /// Highest valid bucket, equal to the slices per block.
    #[must_use]
    pub const fn max_bucket(&self) -> usize {
        self.pages_per_block
    }

    #[inline]
    const fn bucket_slot(&self, die: usize, bucket: usize) -> usize {
        die * (self.pages_per_block + 1) + bucket
    }

    #[inline]
    const fn link_slot(&self, die: usize, block: usize) -> usize {
        assert!(block < self.blocks_per_die, "block out of range");
        die * self.blocks_per_die + block
    }

    /// Membership record of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `die` or `block` is outside the geometry.
    #[must_use]
    pub fn link(&self, die: usize, block: usize) -> Link {
        self.links[self.link_slot(die, block)]
    }

    /// Bucket `block` is linked into, if any.
    #[must_use]
    pub fn bucket_of(&self, die: usize, block: usize) -> Option<usize> {
        self.link(die, block).bucket
    }

    /// Returns `true` if `block` is linked into any bucket.
    #[must_use]
    pub fn contains(&self, die: usize, block: usize) -> bool {
        self.link(die, block).is_linked()
    }

    /// Number of blocks linked on `die`.
    #[must_use]
    pub fn len(&self, die: usize) -> usize {
        self.members[die]
    }

    /// Returns `true` if no block is linked on `die`.
    #[must_use]
    pub fn is_empty(&self, die: usize) -> bool {
        self.members[die] == 0
    }

    /// Number of blocks in one bucket.
    #[must_use]
    pub fn bucket_len(&self, die: usize, bucket: usize) -> usize {
        if bucket > self.pages_per_block {
            return 0;
        }
        self.buckets[self.bucket_slot(die, bucket)].len
    }

    /// Append `block` to the tail of `bucket` on `die`.
    ///
    /// A block that is already linked is moved, so re-inserting after an
    /// invalidation re-buckets it and puts it last in its new bucket.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::DieOutOfRange`] or [`GcError::BlockOutOfRange`] for
    /// coordinates outside the geometry, and [`GcError::BucketOutOfRange`] if
    /// `bucket` exceeds the slices per block.
    pub fn insert(&mut self, die: usize, block: usize, bucket: usize) -> Result<(), GcError> {
        let dies = self.members.len();
        if die >= dies {
            return Err(GcError::DieOutOfRange { die, dies });
        }
        if block >= self.blocks_per_die {
            return Err(GcError::BlockOutOfRange { die, block });
        }
        if bucket > self.pages_per_block {
            return Err(GcError::BucketOutOfRange {
                bucket,
                max: self.pages_per_block,
            });
        }
        self.detach(die, block);

        let slot = self.bucket_slot(die, bucket);
        let old_tail = self.buckets[slot].tail;
        match old_tail {
            Some(tail) => {
                let tail_slot = self.link_slot(die, tail);
                self.links[tail_slot].next = Some(block);
            }
            None => self.buckets[slot].head = Some(block),
        }
        self.buckets[slot].tail = Some(block);
        self.buckets[slot].len += 1;

        let link_slot = self.link_slot(die, block);
        self.links[link_slot] = Link {
            prev: old_tail,
            next: None,
            bucket: Some(bucket),
        };
        self.members[die] += 1;
        Ok(())
    }

    /// Unlink `block` from whichever bucket holds it.
    ///
    /// Returns `false` and changes nothing if the block is not linked.
    ///
    /// # Panics
    ///
    /// Panics if `die` or `block` is outside the geometry.
    pub fn detach(&mut self, die: usize, block: usize) -> bool {
        let link_slot = self.link_slot(die, block);
        let Link { prev, next, bucket } = self.links[link_slot];
        let Some(bucket) = bucket else {
            return false;
        };
        let slot = self.bucket_slot(die, bucket);

        match (prev, next) {
            (Some(prev), Some(next)) => {
                let prev_slot = self.link_slot(die, prev);
                let next_slot = self.link_slot(die, next);
                self.links[prev_slot].next = Some(next);
                self.links[next_slot].prev = Some(prev);
            }
            (Some(prev), None) => {
                let prev_slot = self.link_slot(die, prev);
                self.links[prev_slot].next = None;
                self.buckets[slot].tail = Some(prev);
            }
            (None, Some(next)) => {
                let next_slot = self.link_slot(die, next);
                self.links[next_slot].prev = None;
                self.buckets[slot].head = Some(next);
            }
            (None, None) => {
                self.buckets[slot].head = None;
                self.buckets[slot].tail = None;
            }
        }

        self.buckets[slot].len -= 1;
        self.members[die] -= 1;
        self.links[link_slot] = Link::default();
        true
    }

    /// Detach and return the oldest block of `bucket`.
    pub fn pop_head(&mut self, die: usize, bucket: usize) -> Option<usize> {
        if bucket > self.pages_per_block {
            return None;
        }
        let head = self.buckets[self.bucket_slot(die, bucket)].head?;
        self.detach(die, head);
        Some(head)
    }

    /// `(bucket, block)` at the head of the highest nonempty bucket above 0.
    #[must_use]
    pub fn peek_highest(&self, die: usize) -> Option<(usize, usize)> {
        (1..=self.pages_per_block)
            .rev()
            .find_map(|bucket| self.buckets[self.bucket_slot(die, bucket)].head.map(|b| (bucket, b)))
    }

    /// Blocks of one bucket in insertion order.
    #[must_use]
    pub fn bucket_iter(&self, die: usize, bucket: usize) -> BucketIter<'_> {
        let next = if bucket > self.pages_per_block {
            None
        } else {
            self.buckets[self.bucket_slot(die, bucket)].head
        };
        BucketIter {
            index: self,
            die,
            next,
        }
    }

    /// Every reclaimable candidate as `(bucket, block)`: buckets from the
    /// highest down to 1, insertion order within a bucket.
    ///
    /// Bucket 0 holds blocks without invalid slices and is never offered.
    pub fn candidates(&self, die: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        (1..=self.pages_per_block)
            .rev()
            .flat_map(move |bucket| self.bucket_iter(die, bucket).map(move |block| (bucket, block)))
    }

    /// Walk every list of `die` and check that links and membership agree.
    ///
    /// # Errors
    ///
    /// Returns the first [`IndexCorruption`] found.
    pub fn verify(&self, die: usize) -> Result<(), IndexCorruption> {
        let mut seen = vec![false; self.blocks_per_die];

        for bucket in 0..=self.pages_per_block {
            let list = self.buckets[self.bucket_slot(die, bucket)];
            if let Some(head) = list.head {
                if self.link(die, head).prev.is_some() {
                    return Err(IndexCorruption::HeadHasPrev {
                        die,
                        bucket,
                        block: head,
                    });
                }
            }

            let mut cursor = list.head;
            let mut last = None;
            let mut walked = 0;
            while let Some(block) = cursor {
                if block >= self.blocks_per_die || seen[block] {
                    return Err(IndexCorruption::DuplicateMembership { die, block });
                }
                seen[block] = true;

                let link = self.link(die, block);
                if link.bucket != Some(bucket) {
                    return Err(IndexCorruption::WrongBucket {
                        die,
                        block,
                        found: bucket,
                        recorded: link.bucket,
                    });
                }
                if link.prev != last {
                    return Err(IndexCorruption::BrokenBackLink { die, block });
                }
                last = Some(block);
                cursor = link.next;
                walked += 1;
            }

            if list.tail != last {
                return Err(IndexCorruption::TailMismatch { die, bucket });
            }
            if list.len != walked {
                return Err(IndexCorruption::LengthMismatch {
                    die,
                    bucket,
                    recorded: list.len,
                    walked,
                });
            }
        }

        for (block, &reached) in seen.iter().enumerate() {
            let link = self.link(die, block);
            if link.is_linked() && !reached {
                return Err(IndexCorruption::Unreachable { die, block });
            }
            if !link.is_linked() && (link.prev.is_some() || link.next.is_some()) {
                return Err(IndexCorruption::DanglingLinks { die, block });
            }
        }
        Ok(())
    }
}

/// Iterator over the blocks of one bucket list.
#[derive(Debug)]
pub struct BucketIter<'a> {
    index: &'a VictimIndex,
    die: usize,
    next: Option<usize>,
}

impl Iterator for BucketIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let block = self.next?;
        self.next = self.index.link(self.die, block).next;
        Some(block)
    }
}
