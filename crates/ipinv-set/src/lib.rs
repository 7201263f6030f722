//! Disjoint IPv4 block sets and their complement
//!
//! [`BlockSet`] keeps CIDR blocks sorted and pairwise disjoint:
//! - Insertion rejects misaligned blocks and overlaps, leaving the set unchanged
//! - Containment and overlap queries only look at the neighbors of a lower bound
//! - [`BlockSet::complement`] covers every address outside the set with the
//!   largest aligned blocks available, walking the address space from 0
//!
//! # Examples
//!
//! ```
//! use ipinv_cidr::CidrBlock;
//! use ipinv_set::BlockSet;
//!
//! let mut used = BlockSet::new();
//! used.insert(CidrBlock::parse("128.0.0.0/2").unwrap()).unwrap();
//!
//! let free: Vec<String> = used.complement().iter().map(|b| b.to_string()).collect();
//! assert_eq!(free, ["0.0.0.0/1", "192.0.0.0/2"]);
//! ```

use ipinv_cidr::{CidrBlock, ADDRESS_BITS};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::ops::Bound;
use thiserror::Error;

pub mod reserved;

/// Block set errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    /// Base address has bits set below the prefix boundary
    #[error("Invalid block {0}: base address is not aligned to its prefix")]
    InvalidBlock(CidrBlock),

    /// Block overlaps a member of the set
    #[error("Block {block} overlaps existing block {existing}")]
    Overlap {
        block: CidrBlock,
        existing: CidrBlock,
    },
}

pub type Result<T> = std::result::Result<T, SetError>;

/// How the complement walk treats a candidate block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// No member overlaps it: part of the complement
    Free,
    /// Exactly a member: skipped
    Member,
}

/// Sorted collection of pairwise-disjoint, aligned CIDR blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSet {
    blocks: BTreeSet<CidrBlock>,
}

impl BlockSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set by inserting every block in order
    ///
    /// Stops at the first block that is misaligned or overlaps an earlier one.
    pub fn try_from_blocks<I>(blocks: I) -> Result<Self>
    where
        I: IntoIterator<Item = CidrBlock>,
    {
        let mut set = Self::new();
        for block in blocks {
            set.insert(block)?;
        }
        Ok(set)
    }

    /// Number of member blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total number of addresses covered by the members
    pub fn address_count(&self) -> u64 {
        self.blocks.iter().map(CidrBlock::size).sum()
    }

    /// Insert a block
    ///
    /// # Errors
    ///
    /// * [`SetError::InvalidBlock`] if the base is not aligned to the prefix
    /// * [`SetError::Overlap`] if any member shares an address with `block`
    ///
    /// The set is unchanged on error.
    pub fn insert(&mut self, block: CidrBlock) -> Result<()> {
        if !block.is_valid() {
            tracing::debug!(%block, "rejecting misaligned block");
            return Err(SetError::InvalidBlock(block));
        }

        if let Some(existing) = self.overlapping(&block) {
            tracing::debug!(%block, %existing, "rejecting overlapping block");
            return Err(SetError::Overlap { block, existing });
        }

        self.blocks.insert(block);
        Ok(())
    }

    /// Remove an exact member, returning whether it was present
    pub fn remove(&mut self, block: &CidrBlock) -> bool {
        self.blocks.remove(block)
    }

    /// Check whether some member contains `candidate` entirely
    ///
    /// Only the first member at or after `candidate` and its predecessor can
    /// contain it, since members are sorted and disjoint.
    pub fn contains_block(&self, candidate: &CidrBlock) -> bool {
        let at_or_after = self.blocks.range(*candidate..).next();
        let before = self.blocks.range(..*candidate).next_back();

        at_or_after
            .into_iter()
            .chain(before)
            .any(|member| member.contains(candidate))
    }

    /// Check whether some member contains the address
    pub fn contains_addr(&self, addr: u32) -> bool {
        self.contains_block(&CidrBlock::host(addr))
    }

    /// Check whether any member shares an address with `candidate`
    pub fn overlaps_any(&self, candidate: &CidrBlock) -> bool {
        self.overlapping(candidate).is_some()
    }

    /// Find a member that shares an address with `candidate`
    ///
    /// Scans the members whose bases fall inside `candidate`, widened by one
    /// neighbor on each side for members straddling either end.
    pub fn overlapping(&self, candidate: &CidrBlock) -> Option<CidrBlock> {
        let lower = CidrBlock::host(candidate.first());
        let upper = CidrBlock::host(candidate.last());

        let before = self.blocks.range(..lower).next_back();
        let band = self.blocks.range(lower..=upper);
        let after = self
            .blocks
            .range((Bound::Excluded(upper), Bound::Unbounded))
            .next();

        before
            .into_iter()
            .chain(band)
            .chain(after)
            .find(|member| member.overlaps(candidate))
            .copied()
    }

    /// Check whether `candidate` is a member (same base and prefix)
    pub fn has_exact_member(&self, candidate: &CidrBlock) -> bool {
        self.blocks.contains(candidate)
    }

    /// Iterate over members in ascending order
    pub fn iter(&self) -> btree_set::Iter<'_, CidrBlock> {
        self.blocks.iter()
    }

    /// Compute the blocks covering every address not covered by this set
    ///
    /// Starting at address 0, takes the largest aligned block at the current
    /// address that is either free (emitted) or exactly a member (skipped),
    /// then moves past it and starts over from the largest prefix. A block
    /// that only partially overlaps the set is halved and retried at the same
    /// address.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipinv_cidr::CidrBlock;
    /// use ipinv_set::BlockSet;
    ///
    /// let used = BlockSet::new();
    /// let free = used.complement();
    /// assert_eq!(free.len(), 1);
    /// assert!(free.has_exact_member(&CidrBlock::new(0, 0).unwrap()));
    /// ```
    pub fn complement(&self) -> BlockSet {
        let mut free = BlockSet::new();
        let mut current: u64 = 0;

        // `current` is widened so stepping past 255.255.255.255 ends the walk
        while let Ok(start) = u32::try_from(current) {
            let (block, step) = self.largest_step_at(start);
            if step == Step::Free {
                tracing::trace!(%block, "free block");
                free.blocks.insert(block);
            }
            current = u64::from(block.first()) + block.size();
        }

        tracing::debug!(
            members = self.len(),
            free_blocks = free.len(),
            free_addresses = free.address_count(),
            "computed complement"
        );
        free
    }

    /// Largest aligned block at `start` that is free or an exact member
    fn largest_step_at(&self, start: u32) -> (CidrBlock, Step) {
        (0..=ADDRESS_BITS)
            .filter_map(|prefix_len| CidrBlock::new(start, prefix_len).ok())
            .filter(CidrBlock::is_valid)
            .find_map(|candidate| self.classify(&candidate).map(|step| (candidate, step)))
            .unwrap_or_else(|| {
                // Members are aligned and disjoint, so the walk only ever
                // starts on a member boundary where a host block classifies.
                unreachable!(
                    "complement walk landed inside a member at {}",
                    CidrBlock::host(start)
                )
            })
    }

    fn classify(&self, candidate: &CidrBlock) -> Option<Step> {
        if !self.overlaps_any(candidate) {
            Some(Step::Free)
        } else if self.has_exact_member(candidate) {
            Some(Step::Member)
        } else {
            None
        }
    }
}

impl<'a> IntoIterator for &'a BlockSet {
    type Item = &'a CidrBlock;
    type IntoIter = btree_set::Iter<'a, CidrBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

impl IntoIterator for BlockSet {
    type Item = CidrBlock;
    type IntoIter = btree_set::IntoIter<CidrBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}
