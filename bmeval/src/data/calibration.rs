use std::collections::BTreeMap;
use std::sync::Arc;

use bincode::{Decode, Encode};
use itertools::Itertools;
use ordered_float::OrderedFloat;

use bmcore::algorithm::lorentz::PeakFit;
use bmcore::algorithm::vipa::VipaParams;
use bmcore::data::region::{Region, RegionKind, RegionList};

/// Frequency axis of one calibrated frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyEntry {
    pub key: String,
    pub frame: usize,
    /// Acquisition time of the calibration frame.
    pub time: f64,
    pub axis: Arc<Vec<f64>>,
}

// Manual bincode implementation for Arc compatibility
impl Encode for FrequencyEntry {
    fn encode<E: bincode::enc::Encoder>(&self, encoder: &mut E) -> Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.key, encoder)?;
        bincode::Encode::encode(&self.frame, encoder)?;
        bincode::Encode::encode(&self.time, encoder)?;
        bincode::Encode::encode(&*self.axis, encoder)?;
        Ok(())
    }
}

impl<Context> Decode<Context> for FrequencyEntry {
    fn decode<D: bincode::de::Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, bincode::error::DecodeError> {
        let key: String = bincode::Decode::decode(decoder)?;
        let frame: usize = bincode::Decode::decode(decoder)?;
        let time: f64 = bincode::Decode::decode(decoder)?;
        let axis: Vec<f64> = bincode::Decode::decode(decoder)?;
        Ok(FrequencyEntry { key, frame, time, axis: Arc::new(axis) })
    }
}

impl<'de, Context> bincode::BorrowDecode<'de, Context> for FrequencyEntry {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> Result<Self, bincode::error::DecodeError> {
        let key: String = bincode::BorrowDecode::borrow_decode(decoder)?;
        let frame: usize = bincode::BorrowDecode::borrow_decode(decoder)?;
        let time: f64 = bincode::BorrowDecode::borrow_decode(decoder)?;
        let axis: Vec<f64> = bincode::BorrowDecode::borrow_decode(decoder)?;
        Ok(FrequencyEntry { key, frame, time, axis: Arc::new(axis) })
    }
}

/// Fits of one calibration image, keyed by `(region, frame)`.
pub type FitMap = BTreeMap<(usize, usize), PeakFit>;

/// Calibration state of one repetition: the regions chosen on every
/// calibration image, their fits, and the resulting transfer functions and
/// frequency axes.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct CalibrationModel {
    brillouin_regions: BTreeMap<String, RegionList>,
    rayleigh_regions: BTreeMap<String, RegionList>,
    brillouin_fits: BTreeMap<String, FitMap>,
    rayleigh_fits: BTreeMap<String, FitMap>,
    vipa_params: BTreeMap<String, Vec<VipaParams>>,
    frequencies: BTreeMap<String, Vec<FrequencyEntry>>,
}

impl CalibrationModel {
    pub fn new() -> Self {
        CalibrationModel::default()
    }

    fn region_lists(&self, kind: RegionKind) -> &BTreeMap<String, RegionList> {
        match kind {
            RegionKind::Brillouin => &self.brillouin_regions,
            RegionKind::Rayleigh => &self.rayleigh_regions,
        }
    }

    fn region_lists_mut(&mut self, kind: RegionKind) -> &mut BTreeMap<String, RegionList> {
        match kind {
            RegionKind::Brillouin => &mut self.brillouin_regions,
            RegionKind::Rayleigh => &mut self.rayleigh_regions,
        }
    }

    fn fit_maps(&self, kind: RegionKind) -> &BTreeMap<String, FitMap> {
        match kind {
            RegionKind::Brillouin => &self.brillouin_fits,
            RegionKind::Rayleigh => &self.rayleigh_fits,
        }
    }

    fn fit_maps_mut(&mut self, kind: RegionKind) -> &mut BTreeMap<String, FitMap> {
        match kind {
            RegionKind::Brillouin => &mut self.brillouin_fits,
            RegionKind::Rayleigh => &mut self.rayleigh_fits,
        }
    }

    /// Regions of `kind` on calibration image `key`, in discovery order.
    pub fn regions(&self, kind: RegionKind, key: &str) -> &[Region] {
        self.region_lists(kind)
            .get(key)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Add a region, merging it with the first one it overlaps.
    pub fn add_region(&mut self, kind: RegionKind, key: &str, region: Region) -> usize {
        self.region_lists_mut(kind)
            .entry(key.to_string())
            .or_default()
            .add(region)
    }

    /// Replace the region at `index`, or append it; never merges.
    pub fn set_region(&mut self, kind: RegionKind, key: &str, index: usize, region: Region) -> usize {
        self.region_lists_mut(kind)
            .entry(key.to_string())
            .or_default()
            .set(index, region)
    }

    pub fn clear_regions(&mut self, kind: RegionKind, key: &str) {
        self.region_lists_mut(kind).remove(key);
    }

    pub fn add_fit(&mut self, kind: RegionKind, key: &str, region: usize, frame: usize, fit: PeakFit) {
        self.fit_maps_mut(kind)
            .entry(key.to_string())
            .or_default()
            .insert((region, frame), fit);
    }

    pub fn fit(&self, kind: RegionKind, key: &str, region: usize, frame: usize) -> Option<&PeakFit> {
        self.fit_maps(kind).get(key)?.get(&(region, frame))
    }

    pub fn clear_fits(&mut self, kind: RegionKind, key: &str) {
        self.fit_maps_mut(kind).remove(key);
    }

    /// All fitted peak centers of one calibration frame, ascending.
    ///
    /// Failed fits contribute NaN, which sorts last.
    pub fn get_sorted_peaks(&self, key: &str, frame: usize) -> Vec<f64> {
        [RegionKind::Rayleigh, RegionKind::Brillouin]
            .iter()
            .filter_map(|&kind| self.fit_maps(kind).get(key))
            .flat_map(|fits| {
                fits.iter()
                    .filter(move |((_, f), _)| *f == frame)
                    .flat_map(|(_, fit)| fit.centers.iter().copied())
            })
            .sorted_by_key(|&c| OrderedFloat(c))
            .collect()
    }

    pub fn set_vipa_params(&mut self, key: &str, params: Vec<VipaParams>) {
        self.vipa_params.insert(key.to_string(), params);
    }

    /// Transfer functions of all successfully calibrated frames of `key`.
    pub fn vipa_params(&self, key: &str) -> &[VipaParams] {
        self.vipa_params.get(key).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn clear_vipa_params(&mut self, key: &str) {
        self.vipa_params.remove(key);
    }

    pub fn set_frequencies(&mut self, key: &str, entries: Vec<FrequencyEntry>) {
        self.frequencies.insert(key.to_string(), entries);
    }

    pub fn frequencies(&self, key: &str) -> &[FrequencyEntry] {
        self.frequencies.get(key).map(|f| f.as_slice()).unwrap_or(&[])
    }

    pub fn clear_frequencies(&mut self, key: &str) {
        self.frequencies.remove(key);
    }

    pub fn is_calibrated(&self) -> bool {
        self.frequencies.values().any(|entries| !entries.is_empty())
    }

    /// Calibrated frame closest in time to `time`.
    ///
    /// Ties go to the frame acquired earlier, then to the lexically smaller
    /// key and frame number. With keys numbered in acquisition order this is
    /// the same as preferring the earlier key.
    pub fn nearest_frequency_entry(&self, time: f64) -> Option<&FrequencyEntry> {
        self.frequencies
            .values()
            .flatten()
            .min_by(|a, b| {
                OrderedFloat((a.time - time).abs())
                    .cmp(&OrderedFloat((b.time - time).abs()))
                    .then(OrderedFloat(a.time).cmp(&OrderedFloat(b.time)))
                    .then_with(|| a.key.cmp(&b.key))
                    .then(a.frame.cmp(&b.frame))
            })
    }

    /// Frequency axis for every payload frame, looked up by acquisition time.
    ///
    /// `None` if nothing is calibrated yet.
    pub fn frequencies_by_time(&self, times: &[f64]) -> Option<Vec<Arc<Vec<f64>>>> {
        if !self.is_calibrated() {
            return None;
        }
        times
            .iter()
            .map(|&t| self.nearest_frequency_entry(t).map(|e| Arc::clone(&e.axis)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, frame: usize, time: f64, value: f64) -> FrequencyEntry {
        FrequencyEntry {
            key: key.to_string(),
            frame,
            time,
            axis: Arc::new(vec![value; 3]),
        }
    }

    fn fit(centers: &[f64]) -> PeakFit {
        PeakFit {
            centers: centers.to_vec(),
            fwhms: vec![1.0; centers.len()],
            intensities: vec![1.0; centers.len()],
            offset: 0.0,
        }
    }

    #[test]
    fn test_sorted_peaks_collect_both_kinds() {
        let mut model = CalibrationModel::new();
        model.add_fit(RegionKind::Rayleigh, "1", 0, 0, fit(&[50.0]));
        model.add_fit(RegionKind::Rayleigh, "1", 1, 0, fit(&[550.0]));
        model.add_fit(RegionKind::Brillouin, "1", 0, 0, fit(&[250.0, 150.0]));
        model.add_fit(RegionKind::Brillouin, "1", 1, 0, fit(&[350.0, 450.0]));
        model.add_fit(RegionKind::Brillouin, "1", 0, 1, fit(&[151.0, 251.0]));

        assert_eq!(
            model.get_sorted_peaks("1", 0),
            vec![50.0, 150.0, 250.0, 350.0, 450.0, 550.0]
        );
        assert_eq!(model.get_sorted_peaks("1", 1), vec![151.0, 251.0]);
        assert!(model.get_sorted_peaks("2", 0).is_empty());
    }

    #[test]
    fn test_regions_set_and_add() {
        let mut model = CalibrationModel::new();
        model.set_region(RegionKind::Brillouin, "1", 0, Region::new(10.0, 20.0));
        model.set_region(RegionKind::Brillouin, "1", 1, Region::new(15.0, 30.0));
        assert_eq!(model.regions(RegionKind::Brillouin, "1").len(), 2);

        model.add_region(RegionKind::Rayleigh, "1", Region::new(10.0, 20.0));
        model.add_region(RegionKind::Rayleigh, "1", Region::new(15.0, 30.0));
        assert_eq!(model.regions(RegionKind::Rayleigh, "1"), &[Region::new(10.0, 30.0)]);

        model.clear_regions(RegionKind::Brillouin, "1");
        assert!(model.regions(RegionKind::Brillouin, "1").is_empty());
    }

    #[test]
    fn test_frequencies_by_nearest_time() {
        let mut model = CalibrationModel::new();
        assert!(model.frequencies_by_time(&[1.0]).is_none());

        model.set_frequencies("1", vec![entry("1", 0, 0.0, 1.0), entry("1", 1, 1.0, 2.0)]);
        model.set_frequencies("2", vec![entry("2", 0, 10.0, 3.0)]);

        let axes = model.frequencies_by_time(&[0.2, 0.9, 7.0, 100.0]).unwrap();
        let firsts: Vec<f64> = axes.iter().map(|a| a[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0, 3.0]);
        assert!(model.is_calibrated());
    }

    #[test]
    fn test_time_ties_prefer_earlier_frame_then_key() {
        let mut model = CalibrationModel::new();
        model.set_frequencies("b", vec![entry("b", 0, 4.0, 1.0)]);
        model.set_frequencies("c", vec![entry("c", 0, 6.0, 2.0)]);
        // 5.0 is equally far from both, the earlier acquisition wins
        assert_eq!(model.frequencies_by_time(&[5.0]).unwrap()[0][0], 1.0);

        model.set_frequencies("a", vec![entry("a", 0, 6.0, 3.0)]);
        assert_eq!(model.frequencies_by_time(&[6.0]).unwrap()[0][0], 3.0);
    }

    #[test]
    fn test_time_ties_follow_key_order_when_keys_are_sequential() {
        let mut model = CalibrationModel::new();
        model.set_frequencies("1", vec![entry("1", 0, 10.0, 1.0), entry("1", 1, 12.0, 2.0)]);
        model.set_frequencies("2", vec![entry("2", 0, 20.0, 3.0), entry("2", 1, 22.0, 4.0)]);

        let axes = model.frequencies_by_time(&[11.0, 16.0, 21.0]).unwrap();
        assert_eq!(axes[0][0], 1.0);
        assert_eq!(axes[1][0], 2.0);
        assert_eq!(axes[2][0], 3.0);
    }
}
