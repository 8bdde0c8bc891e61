use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Distinguishes the two purposes a spectral window can have.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Encode, Decode)]
pub enum RegionKind {
    Brillouin,
    Rayleigh,
}

impl Display for RegionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Brillouin => write!(f, "Brillouin"),
            RegionKind::Rayleigh => write!(f, "Rayleigh"),
        }
    }
}

/// A half-open window `[start, end)` on a pixel or frequency axis.
///
/// `start <= end` always holds; `Region::new` swaps reversed input.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize, Encode, Decode)]
pub struct Region {
    pub start: f64,
    pub end: f64,
}

impl Region {
    pub fn new(a: f64, b: f64) -> Self {
        if b < a {
            Region { start: b, end: a }
        } else {
            Region { start: a, end: b }
        }
    }

    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        x >= self.start && x < self.end
    }

    /// Lower and upper edge, in that order.
    #[inline]
    pub fn edges(&self) -> [f64; 2] {
        [self.start, self.end]
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        0.5 * (self.start + self.end)
    }

    /// True if the closed intervals touch or overlap.
    pub fn overlaps(&self, other: &Region) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn union(&self, other: &Region) -> Region {
        Region {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn rounded(&self) -> Region {
        Region::new(self.start.round(), self.end.round())
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Ordered list of regions of one purpose.
///
/// `add` merges a new region into the first entry it overlaps, `set` replaces
/// by index and never merges, so intentionally overlapping entries survive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    pub fn new() -> Self {
        RegionList { regions: Vec::new() }
    }

    /// Adds a region, rounded to integer edges, merging it with the first
    /// overlapping entry. Returns the index the region ended up at.
    pub fn add(&mut self, region: Region) -> usize {
        let region = region.rounded();
        match self.regions.iter().position(|r| r.overlaps(&region)) {
            Some(i) => {
                self.regions[i] = self.regions[i].union(&region);
                i
            }
            None => {
                self.regions.push(region);
                self.regions.len() - 1
            }
        }
    }

    /// Replaces the region at `index`, appending if `index` is past the end.
    pub fn set(&mut self, index: usize, region: Region) -> usize {
        let region = region.rounded();
        if index < self.regions.len() {
            self.regions[index] = region;
            index
        } else {
            self.regions.push(region);
            self.regions.len() - 1
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<Region> {
        if index < self.regions.len() {
            Some(self.regions.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    pub fn to_vec(&self) -> Vec<Region> {
        self.regions.clone()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl From<Vec<Region>> for RegionList {
    fn from(regions: Vec<Region>) -> Self {
        RegionList { regions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &RegionList) -> Vec<(f64, f64)> {
        list.as_slice().iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn test_add_merges_overlapping() {
        let mut list = RegionList::new();
        list.add(Region::new(4.9, 7.0));
        list.add(Region::new(6.0, 9.0));
        assert_eq!(pairs(&list), vec![(5.0, 9.0)]);

        list.add(Region::new(1.0, 3.0));
        assert_eq!(pairs(&list), vec![(5.0, 9.0), (1.0, 3.0)]);

        list.add(Region::new(2.0, 3.0));
        assert_eq!(pairs(&list), vec![(5.0, 9.0), (1.0, 3.0)]);
    }

    #[test]
    fn test_set_replaces_without_merge() {
        let mut list = RegionList::new();
        list.add(Region::new(6.0, 9.0));
        list.set(0, Region::new(0.9, 3.0));
        assert_eq!(pairs(&list), vec![(1.0, 3.0)]);

        // overlapping entries are kept apart when set explicitly
        list.set(1, Region::new(2.0, 4.0));
        assert_eq!(pairs(&list), vec![(1.0, 3.0), (2.0, 4.0)]);
    }

    #[test]
    fn test_region_normalizes_order() {
        let r = Region::new(10.0, 2.0);
        assert_eq!(r.edges(), [2.0, 10.0]);
        assert!(r.contains(2.0));
        assert!(!r.contains(10.0));
        assert!((r.mean() - 6.0).abs() < 1e-12);
    }
}
