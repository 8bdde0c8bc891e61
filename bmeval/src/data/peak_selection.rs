use bincode::{Decode, Encode};

use bmcore::data::region::{Region, RegionKind, RegionList};

/// Regions to evaluate on every payload spectrum, in Hz.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct PeakSelectionModel {
    brillouin: RegionList,
    rayleigh: RegionList,
}

impl PeakSelectionModel {
    pub fn new() -> Self {
        PeakSelectionModel::default()
    }

    fn list(&self, kind: RegionKind) -> &RegionList {
        match kind {
            RegionKind::Brillouin => &self.brillouin,
            RegionKind::Rayleigh => &self.rayleigh,
        }
    }

    fn list_mut(&mut self, kind: RegionKind) -> &mut RegionList {
        match kind {
            RegionKind::Brillouin => &mut self.brillouin,
            RegionKind::Rayleigh => &mut self.rayleigh,
        }
    }

    /// Adds a region, merging it with the first one it overlaps.
    pub fn add_region(&mut self, kind: RegionKind, region: Region) -> usize {
        self.list_mut(kind).add(region)
    }

    pub fn set_region(&mut self, kind: RegionKind, index: usize, region: Region) -> usize {
        self.list_mut(kind).set(index, region)
    }

    pub fn remove_region(&mut self, kind: RegionKind, index: usize) -> Option<Region> {
        self.list_mut(kind).remove(index)
    }

    pub fn clear_regions(&mut self, kind: RegionKind) {
        self.list_mut(kind).clear();
    }

    pub fn regions(&self, kind: RegionKind) -> &[Region] {
        self.list(kind).as_slice()
    }

    pub fn brillouin_regions(&self) -> &[Region] {
        self.regions(RegionKind::Brillouin)
    }

    pub fn rayleigh_regions(&self) -> &[Region] {
        self.regions(RegionKind::Rayleigh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_independent() {
        let mut model = PeakSelectionModel::new();
        model.add_region(RegionKind::Brillouin, Region::new(3e9, 7e9));
        model.add_region(RegionKind::Brillouin, Region::new(6e9, 9e9));
        model.add_region(RegionKind::Rayleigh, Region::new(-1e9, 1e9));

        assert_eq!(model.brillouin_regions(), &[Region::new(3e9, 9e9)]);
        assert_eq!(model.rayleigh_regions(), &[Region::new(-1e9, 1e9)]);

        model.set_region(RegionKind::Brillouin, 1, Region::new(8e9, 12e9));
        assert_eq!(model.brillouin_regions().len(), 2);

        assert_eq!(model.remove_region(RegionKind::Brillouin, 0), Some(Region::new(3e9, 9e9)));
        model.clear_regions(RegionKind::Rayleigh);
        assert!(model.rayleigh_regions().is_empty());
        assert_eq!(model.brillouin_regions(), &[Region::new(8e9, 12e9)]);
    }
}
