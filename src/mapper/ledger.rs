//! Region ledger - every payload extent the mapper currently has mapped
//!
//! The arena algorithm only ever hands back `(ptr, size)` pairs, so the ledger
//! is what lets the mapper check those pairs against what it really mapped and
//! release everything still outstanding at teardown.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// A payload extent `[start, start + len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: usize,
    pub len: usize,
}

impl Extent {
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Non-overlapping extents keyed by start address
#[derive(Default)]
pub struct RegionLedger {
    extents: Mutex<BTreeMap<usize, usize>>,
}

impl RegionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, start: usize, len: usize) {
        let previous = self.extents.lock().insert(start, len);
        debug_assert!(previous.is_none(), "extent {:#x} recorded twice", start);
    }

    /// Length recorded for the extent starting exactly at `start`
    pub fn lookup(&self, start: usize) -> Option<usize> {
        self.extents.lock().get(&start).copied()
    }

    /// Remove the extent starting at `start` if it has exactly `len` bytes.
    /// On mismatch nothing is removed and the recorded length is returned.
    pub fn forget_exact(&self, start: usize, len: usize) -> Result<(), Option<usize>> {
        let mut extents = self.extents.lock();
        match extents.get(&start) {
            Some(&recorded) if recorded == len => {
                extents.remove(&start);
                Ok(())
            }
            recorded => Err(recorded.copied()),
        }
    }

    /// Remove every recorded byte in `[start, start + len)`, splitting extents
    /// that straddle either boundary. Returns the removed pieces in address order.
    pub fn forget_range(&self, start: usize, len: usize) -> SmallVec<[Extent; 2]> {
        let end = start.saturating_add(len);
        let mut extents = self.extents.lock();

        let overlapping: SmallVec<[Extent; 2]> = extents
            .range(..end)
            .rev()
            .take_while(|(s, l)| **s + **l > start)
            .map(|(&s, &l)| Extent { start: s, len: l })
            .collect();

        let mut removed = SmallVec::new();
        for extent in overlapping.into_iter().rev() {
            extents.remove(&extent.start);

            let cut_lo = extent.start.max(start);
            let cut_hi = extent.end().min(end);
            if extent.start < cut_lo {
                extents.insert(extent.start, cut_lo - extent.start);
            }
            if cut_hi < extent.end() {
                extents.insert(cut_hi, extent.end() - cut_hi);
            }
            removed.push(Extent { start: cut_lo, len: cut_hi - cut_lo });
        }
        removed
    }

    /// Change the length of the extent at `start`, returning the old length
    pub fn resize(&self, start: usize, len: usize) -> Option<usize> {
        self.extents.lock().get_mut(&start).map(|recorded| core::mem::replace(recorded, len))
    }

    /// Take every extent out of the ledger
    pub fn drain(&self) -> Vec<Extent> {
        core::mem::take(&mut *self.extents.lock())
            .into_iter()
            .map(|(start, len)| Extent { start, len })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.extents.lock().len()
    }

    pub fn total_bytes(&self) -> usize {
        self.extents.lock().values().sum()
    }
}
