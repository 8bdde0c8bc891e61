use std::collections::BTreeMap;
use std::fmt::Display;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use bmcore::algorithm::bounds::BoundPair;
use bmcore::algorithm::lorentz::PeakFit;
use bmcore::data::region::RegionKind;

use crate::data::grid::{grid_size, linear_index};

/// Index into a result field: `(x, y, z, frame, region, peak)`.
pub type TensorIndex = [usize; 6];

/// Measured and derived quantities stored per grid point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode)]
pub enum Quantity {
    BrillouinPosition,
    BrillouinFwhm,
    BrillouinIntensity,
    BrillouinOffset,
    /// Distance of a Brillouin peak to the nearest Rayleigh peak.
    BrillouinShift,
    RayleighPosition,
    RayleighFwhm,
    RayleighIntensity,
    RayleighOffset,
    /// Drift of the Rayleigh peaks against the first valid observation.
    RayleighShift,
    /// Acquisition time of a frame.
    Time,
    /// Mean image intensity of a frame.
    Intensity,
}

impl Quantity {
    pub const ALL: [Quantity; 12] = [
        Quantity::BrillouinPosition,
        Quantity::BrillouinFwhm,
        Quantity::BrillouinIntensity,
        Quantity::BrillouinOffset,
        Quantity::BrillouinShift,
        Quantity::RayleighPosition,
        Quantity::RayleighFwhm,
        Quantity::RayleighIntensity,
        Quantity::RayleighOffset,
        Quantity::RayleighShift,
        Quantity::Time,
        Quantity::Intensity,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Quantity::BrillouinPosition => "brillouin_peak_position_f",
            Quantity::BrillouinFwhm => "brillouin_peak_fwhm_f",
            Quantity::BrillouinIntensity => "brillouin_peak_intensity",
            Quantity::BrillouinOffset => "brillouin_peak_offset",
            Quantity::BrillouinShift => "brillouin_shift_f",
            Quantity::RayleighPosition => "rayleigh_peak_position_f",
            Quantity::RayleighFwhm => "rayleigh_peak_fwhm_f",
            Quantity::RayleighIntensity => "rayleigh_peak_intensity",
            Quantity::RayleighOffset => "rayleigh_peak_offset",
            Quantity::RayleighShift => "rayleigh_shift",
            Quantity::Time => "time",
            Quantity::Intensity => "intensity",
        }
    }

    pub fn from_key(key: &str) -> Option<Quantity> {
        Quantity::ALL.iter().copied().find(|q| q.key() == key)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quantity::BrillouinPosition => "Brillouin peak position",
            Quantity::BrillouinFwhm => "Brillouin peak width",
            Quantity::BrillouinIntensity => "Brillouin peak intensity",
            Quantity::BrillouinOffset => "Brillouin peak offset",
            Quantity::BrillouinShift => "Brillouin frequency shift",
            Quantity::RayleighPosition => "Rayleigh peak position",
            Quantity::RayleighFwhm => "Rayleigh peak width",
            Quantity::RayleighIntensity => "Rayleigh peak intensity",
            Quantity::RayleighOffset => "Rayleigh peak offset",
            Quantity::RayleighShift => "Rayleigh peak drift",
            Quantity::Time => "Time",
            Quantity::Intensity => "Intensity",
        }
    }

    pub fn is_frequency(&self) -> bool {
        matches!(
            self,
            Quantity::BrillouinPosition
                | Quantity::BrillouinFwhm
                | Quantity::BrillouinShift
                | Quantity::RayleighPosition
                | Quantity::RayleighFwhm
                | Quantity::RayleighShift
        )
    }

    pub fn unit(&self) -> &'static str {
        match self {
            _ if self.is_frequency() => "GHz",
            Quantity::Time => "s",
            _ => "a.u.",
        }
    }

    /// Factor from stored to displayed values, Hz are shown as GHz.
    pub fn scaling(&self) -> f64 {
        if self.is_frequency() { 1e-9 } else { 1.0 }
    }

    pub fn region_kind(&self) -> Option<RegionKind> {
        match self {
            Quantity::BrillouinPosition
            | Quantity::BrillouinFwhm
            | Quantity::BrillouinIntensity
            | Quantity::BrillouinOffset
            | Quantity::BrillouinShift => Some(RegionKind::Brillouin),
            Quantity::RayleighPosition
            | Quantity::RayleighFwhm
            | Quantity::RayleighIntensity
            | Quantity::RayleighOffset
            | Quantity::RayleighShift => Some(RegionKind::Rayleigh),
            Quantity::Time | Quantity::Intensity => None,
        }
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Extent of a result tensor, fixed for one evaluation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct TensorShape {
    pub resolution: [usize; 3],
    pub frames: usize,
    pub brillouin_regions: usize,
    pub rayleigh_regions: usize,
    pub brillouin_peaks: usize,
}

impl TensorShape {
    /// Peak axis of the Brillouin fields: the single-peak fit, followed by
    /// the multi-peak fits when more than one peak is configured.
    pub fn brillouin_peak_axis(&self) -> usize {
        if self.brillouin_peaks > 1 { 1 + self.brillouin_peaks } else { 1 }
    }

    pub fn field_shape(&self, quantity: Quantity) -> [usize; 6] {
        let [x, y, z] = self.resolution;
        match quantity.region_kind() {
            Some(RegionKind::Brillouin) => [x, y, z, self.frames, self.brillouin_regions, self.brillouin_peak_axis()],
            Some(RegionKind::Rayleigh) => [x, y, z, self.frames, self.rayleigh_regions, 1],
            None => [x, y, z, self.frames, 1, 1],
        }
    }
}

/// Dense 6-axis array of one quantity, NaN where nothing was written.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Field {
    shape: [usize; 6],
    values: Vec<f64>,
}

impl Field {
    pub fn filled(shape: [usize; 6]) -> Self {
        Field {
            shape,
            values: vec![f64::NAN; shape.iter().product()],
        }
    }

    pub fn shape(&self) -> [usize; 6] {
        self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn offset(&self, index: TensorIndex) -> Option<usize> {
        let mut offset = 0;
        for (i, n) in index.iter().zip(self.shape.iter()) {
            if i >= n {
                return None;
            }
            offset = offset * n + i;
        }
        Some(offset)
    }

    /// Value at `index`, NaN outside the field.
    pub fn get(&self, index: TensorIndex) -> f64 {
        self.offset(index).map(|o| self.values[o]).unwrap_or(f64::NAN)
    }

    /// Writes `value` at `index`, returns false outside the field.
    pub fn set(&mut self, index: TensorIndex, value: f64) -> bool {
        match self.offset(index) {
            Some(o) => {
                self.values[o] = value;
                true
            }
            None => false,
        }
    }
}

/// All result fields of one evaluation.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct ResultTensor {
    shape: Option<TensorShape>,
    fields: BTreeMap<Quantity, Field>,
}

impl ResultTensor {
    pub fn new(shape: TensorShape) -> Self {
        let fields = Quantity::ALL
            .iter()
            .map(|&q| (q, Field::filled(shape.field_shape(q))))
            .collect();
        ResultTensor { shape: Some(shape), fields }
    }

    pub fn shape(&self) -> Option<&TensorShape> {
        self.shape.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.shape.is_some()
    }

    pub fn field(&self, quantity: Quantity) -> Option<&Field> {
        self.fields.get(&quantity)
    }

    pub fn get(&self, quantity: Quantity, index: TensorIndex) -> f64 {
        self.fields.get(&quantity).map(|f| f.get(index)).unwrap_or(f64::NAN)
    }

    pub fn set(&mut self, quantity: Quantity, index: TensorIndex, value: f64) -> bool {
        self.fields
            .get_mut(&quantity)
            .map(|f| f.set(index, value))
            .unwrap_or(false)
    }

    /// Brillouin shift of every Brillouin peak: the distance to the nearest
    /// Rayleigh peak of the same point and frame, NaN when no distance is
    /// defined. Running it twice gives the same result.
    pub fn calculate_derived_values(&mut self) {
        let (brillouin, rayleigh) = match (
            self.fields.get(&Quantity::BrillouinPosition),
            self.fields.get(&Quantity::RayleighPosition),
        ) {
            (Some(b), Some(r)) if !b.is_empty() && !r.is_empty() => (b, r),
            _ => return,
        };

        let shape = brillouin.shape();
        let [dim_x, dim_y, dim_z, frames, regions, peaks] = shape;
        let rayleigh_regions = rayleigh.shape()[4];

        let mut shift = Field::filled(shape);
        for x in 0..dim_x {
            for y in 0..dim_y {
                for z in 0..dim_z {
                    for frame in 0..frames {
                        for region in 0..regions {
                            for peak in 0..peaks {
                                let position = brillouin.get([x, y, z, frame, region, peak]);
                                let mut nearest = f64::NAN;
                                for r in 0..rayleigh_regions {
                                    let d = (position - rayleigh.get([x, y, z, frame, r, 0])).abs();
                                    if d.is_nan() {
                                        continue;
                                    }
                                    if nearest.is_nan() || d < nearest {
                                        nearest = d;
                                    }
                                }
                                shift.set([x, y, z, frame, region, peak], nearest);
                            }
                        }
                    }
                }
            }
        }

        self.fields.insert(Quantity::BrillouinShift, shift);
    }
}

/// Values of one quantity reduced onto the scan grid.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialMap {
    pub resolution: [usize; 3],
    /// Values in linear grid order.
    pub values: Vec<f64>,
}

impl SpatialMap {
    pub fn filled(resolution: [usize; 3], value: f64) -> Self {
        SpatialMap {
            resolution,
            values: vec![value; grid_size(resolution)],
        }
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        if x >= self.resolution[0] || y >= self.resolution[1] || z >= self.resolution[2] {
            return f64::NAN;
        }
        self.values[linear_index(self.resolution, x, y, z)]
    }
}

/// One fit reconstructed from the result tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct FitRecord {
    pub kind: RegionKind,
    pub frame: usize,
    pub region: usize,
    /// Whether the fit holds the multi-peak result of a Brillouin region.
    pub multi_peak: bool,
    pub fit: PeakFit,
}

enum PeakReduction {
    Single(usize),
    Average,
    Weighted,
}

fn nan_mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Evaluation settings and results of one repetition.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct EvaluationModel {
    nr_brillouin_peaks: usize,
    bounds_w0: Option<Vec<BoundPair>>,
    bounds_fwhm: Option<Vec<BoundPair>>,
    pub results: ResultTensor,
}

impl Default for EvaluationModel {
    fn default() -> Self {
        EvaluationModel {
            nr_brillouin_peaks: 1,
            bounds_w0: None,
            bounds_fwhm: None,
            results: ResultTensor::default(),
        }
    }
}

impl EvaluationModel {
    pub fn new() -> Self {
        EvaluationModel::default()
    }

    pub fn nr_brillouin_peaks(&self) -> usize {
        self.nr_brillouin_peaks
    }

    pub fn set_nr_brillouin_peaks(&mut self, nr_brillouin_peaks: usize) {
        self.nr_brillouin_peaks = nr_brillouin_peaks.max(1);
    }

    pub fn bounds(&self) -> Option<&[BoundPair]> {
        self.bounds_w0.as_deref()
    }

    pub fn set_bounds(&mut self, bounds: Option<Vec<BoundPair>>) {
        self.bounds_w0 = bounds;
    }

    pub fn bounds_fwhm(&self) -> Option<&[BoundPair]> {
        self.bounds_fwhm.as_deref()
    }

    pub fn set_bounds_fwhm(&mut self, bounds: Option<Vec<BoundPair>>) {
        self.bounds_fwhm = bounds;
    }

    pub fn initialize_results(&mut self, shape: TensorShape) {
        self.results = ResultTensor::new(shape);
    }

    /// Drops all results, e.g. after the calibration changed.
    pub fn invalidate_results(&mut self) {
        self.results = ResultTensor::default();
    }

    pub fn calculate_derived_values(&mut self) {
        self.results.calculate_derived_values();
    }

    /// Reduce `quantity` onto the scan grid.
    ///
    /// For Brillouin fields holding multi-peak fits, `peak_index` below the
    /// stored peak count selects that peak, equal to it averages the
    /// multi-peak fits and one above weights them by intensity × FWHM. Any
    /// other index selects the single-peak fit. Frames and regions are
    /// averaged ignoring NaN, frequencies are returned in GHz.
    ///
    /// An empty result gives a NaN map of `resolution`.
    pub fn spatial_map(&self, quantity: Quantity, peak_index: usize, resolution: [usize; 3]) -> SpatialMap {
        let field = match self.results.field(quantity) {
            Some(f) if !f.is_empty() => f,
            _ => return SpatialMap::filled(resolution, f64::NAN),
        };

        let [dim_x, dim_y, dim_z, frames, regions, stored] = field.shape();
        let reduction = if stored > 1 && peak_index < stored + 2 {
            if peak_index < stored {
                PeakReduction::Single(peak_index)
            } else if peak_index == stored {
                PeakReduction::Average
            } else {
                PeakReduction::Weighted
            }
        } else {
            PeakReduction::Single(0)
        };

        let map_resolution = [dim_x, dim_y, dim_z];
        let mut map = SpatialMap::filled(map_resolution, f64::NAN);
        let scaling = quantity.scaling();
        let mut values = Vec::with_capacity(frames * regions * stored);

        for z in 0..dim_z {
            for y in 0..dim_y {
                for x in 0..dim_x {
                    values.clear();
                    for frame in 0..frames {
                        for region in 0..regions {
                            let at = |peak: usize| [x, y, z, frame, region, peak];
                            match reduction {
                                PeakReduction::Single(peak) => values.push(field.get(at(peak))),
                                PeakReduction::Average => {
                                    values.extend((1..stored).map(|peak| field.get(at(peak))));
                                }
                                PeakReduction::Weighted => {
                                    let (mut num, mut den) = (0.0, 0.0);
                                    for peak in 1..stored {
                                        let weight = self.results.get(Quantity::BrillouinIntensity, at(peak))
                                            * self.results.get(Quantity::BrillouinFwhm, at(peak));
                                        let weighted = field.get(at(peak)) * weight;
                                        if !weighted.is_nan() {
                                            num += weighted;
                                        }
                                        if !weight.is_nan() {
                                            den += weight;
                                        }
                                    }
                                    values.push(num / den);
                                }
                            }
                        }
                    }
                    map.values[linear_index(map_resolution, x, y, z)] = scaling * nan_mean(&values);
                }
            }
        }
        map
    }

    /// All fits stored for grid point `(x, y, z)`.
    pub fn fits_at(&self, x: usize, y: usize, z: usize) -> Vec<FitRecord> {
        let shape = match self.results.shape() {
            Some(s) => *s,
            None => return Vec::new(),
        };
        let r = &self.results;
        let fit_of = |kind: RegionKind, frame: usize, region: usize, peaks: std::ops::Range<usize>| {
            let (position, fwhm, intensity, offset) = match kind {
                RegionKind::Brillouin => (
                    Quantity::BrillouinPosition,
                    Quantity::BrillouinFwhm,
                    Quantity::BrillouinIntensity,
                    Quantity::BrillouinOffset,
                ),
                RegionKind::Rayleigh => (
                    Quantity::RayleighPosition,
                    Quantity::RayleighFwhm,
                    Quantity::RayleighIntensity,
                    Quantity::RayleighOffset,
                ),
            };
            let at = |peak: usize| [x, y, z, frame, region, peak];
            PeakFit {
                centers: peaks.clone().map(|p| r.get(position, at(p))).collect(),
                fwhms: peaks.clone().map(|p| r.get(fwhm, at(p))).collect(),
                intensities: peaks.clone().map(|p| r.get(intensity, at(p))).collect(),
                offset: r.get(offset, at(peaks.start)),
            }
        };

        let mut records = Vec::new();
        for frame in 0..shape.frames {
            for region in 0..shape.brillouin_regions {
                records.push(FitRecord {
                    kind: RegionKind::Brillouin,
                    frame,
                    region,
                    multi_peak: false,
                    fit: fit_of(RegionKind::Brillouin, frame, region, 0..1),
                });
                if shape.brillouin_peaks > 1 {
                    records.push(FitRecord {
                        kind: RegionKind::Brillouin,
                        frame,
                        region,
                        multi_peak: true,
                        fit: fit_of(RegionKind::Brillouin, frame, region, 1..shape.brillouin_peak_axis()),
                    });
                }
            }
            for region in 0..shape.rayleigh_regions {
                records.push(FitRecord {
                    kind: RegionKind::Rayleigh,
                    frame,
                    region,
                    multi_peak: false,
                    fit: fit_of(RegionKind::Rayleigh, frame, region, 0..1),
                });
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(peaks: usize) -> TensorShape {
        TensorShape {
            resolution: [2, 1, 1],
            frames: 1,
            brillouin_regions: 1,
            rayleigh_regions: 2,
            brillouin_peaks: peaks,
        }
    }

    fn bits(field: &Field) -> Vec<u64> {
        field.values().iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn test_shapes_and_prefill() {
        let tensor = ResultTensor::new(shape(3));
        assert_eq!(tensor.field(Quantity::BrillouinPosition).unwrap().shape(), [2, 1, 1, 1, 1, 4]);
        assert_eq!(tensor.field(Quantity::RayleighShift).unwrap().shape(), [2, 1, 1, 1, 2, 1]);
        assert_eq!(tensor.field(Quantity::Time).unwrap().shape(), [2, 1, 1, 1, 1, 1]);
        assert!(tensor
            .field(Quantity::BrillouinFwhm)
            .unwrap()
            .values()
            .iter()
            .all(|v| v.is_nan()));

        let single = ResultTensor::new(shape(1));
        assert_eq!(single.field(Quantity::BrillouinPosition).unwrap().shape()[5], 1);
    }

    #[test]
    fn test_writes_are_exact() {
        let mut tensor = ResultTensor::new(shape(2));
        assert!(tensor.set(Quantity::BrillouinOffset, [1, 0, 0, 0, 0, 2], 7.0));
        assert!(!tensor.set(Quantity::BrillouinOffset, [2, 0, 0, 0, 0, 0], 7.0));
        assert_eq!(tensor.get(Quantity::BrillouinOffset, [1, 0, 0, 0, 0, 2]), 7.0);
        assert!(tensor.get(Quantity::BrillouinOffset, [1, 0, 0, 0, 0, 1]).is_nan());
        assert!(tensor.get(Quantity::BrillouinOffset, [0, 0, 0, 0, 0, 2]).is_nan());
    }

    #[test]
    fn test_derived_shift_uses_nearest_rayleigh_peak() {
        let mut tensor = ResultTensor::new(TensorShape { brillouin_peaks: 2, ..shape(2) });
        tensor.set(Quantity::BrillouinPosition, [0, 0, 0, 0, 0, 1], 10.0);
        tensor.set(Quantity::BrillouinPosition, [0, 0, 0, 0, 0, 2], 20.0);
        tensor.set(Quantity::RayleighPosition, [0, 0, 0, 0, 0, 0], 5.0);
        tensor.set(Quantity::RayleighPosition, [0, 0, 0, 0, 1, 0], 30.0);
        // only one reference at the second point
        tensor.set(Quantity::BrillouinPosition, [1, 0, 0, 0, 0, 0], 12.0);
        tensor.set(Quantity::RayleighPosition, [1, 0, 0, 0, 1, 0], 30.0);

        tensor.calculate_derived_values();

        assert_eq!(tensor.get(Quantity::BrillouinShift, [0, 0, 0, 0, 0, 1]), 5.0);
        assert_eq!(tensor.get(Quantity::BrillouinShift, [0, 0, 0, 0, 0, 2]), 10.0);
        assert!(tensor.get(Quantity::BrillouinShift, [0, 0, 0, 0, 0, 0]).is_nan());
        assert_eq!(tensor.get(Quantity::BrillouinShift, [1, 0, 0, 0, 0, 0]), 18.0);
    }

    #[test]
    fn test_derived_pass_is_idempotent() {
        let mut tensor = ResultTensor::new(shape(1));
        tensor.set(Quantity::BrillouinPosition, [0, 0, 0, 0, 0, 0], 4.0);
        tensor.set(Quantity::RayleighPosition, [0, 0, 0, 0, 0, 0], 1.0);
        tensor.set(Quantity::RayleighPosition, [0, 0, 0, 0, 1, 0], 15.0);

        tensor.calculate_derived_values();
        let first = bits(tensor.field(Quantity::BrillouinShift).unwrap());
        tensor.calculate_derived_values();
        let second = bits(tensor.field(Quantity::BrillouinShift).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_derived_pass_needs_results() {
        let mut tensor = ResultTensor::default();
        tensor.calculate_derived_values();
        assert!(tensor.field(Quantity::BrillouinShift).is_none());
    }

    #[test]
    fn test_spatial_map_peak_selection() {
        let mut model = EvaluationModel::new();
        model.set_nr_brillouin_peaks(2);
        model.initialize_results(shape(2));

        let writes = [(0, 1e9, 3.0, 1.0), (1, 2e9, 1.0, 1.0), (2, 4e9, 1.0, 1.0)];
        for &(peak, position, intensity, fwhm) in &writes {
            let index = [0, 0, 0, 0, 0, peak];
            model.results.set(Quantity::BrillouinPosition, index, position);
            model.results.set(Quantity::BrillouinIntensity, index, intensity);
            model.results.set(Quantity::BrillouinFwhm, index, fwhm);
        }
        model.results.set(Quantity::BrillouinIntensity, [0, 0, 0, 0, 0, 2], 3.0);

        let map = |peak| model.spatial_map(Quantity::BrillouinPosition, peak, [2, 1, 1]).get(0, 0, 0);
        assert!((map(0) - 1.0).abs() < 1e-12);
        assert!((map(2) - 4.0).abs() < 1e-12);
        // average of the multi-peak fits
        assert!((map(3) - 3.0).abs() < 1e-12);
        // weighted by intensity × FWHM: (2·1 + 4·3) / 4
        assert!((map(4) - 3.5).abs() < 1e-12);
        assert!((map(5) - 1.0).abs() < 1e-12);

        assert!(model.spatial_map(Quantity::BrillouinPosition, 0, [2, 1, 1]).get(1, 0, 0).is_nan());
    }

    #[test]
    fn test_spatial_map_of_empty_results() {
        let model = EvaluationModel::new();
        let map = model.spatial_map(Quantity::RayleighShift, 0, [3, 2, 1]);
        assert_eq!(map.values.len(), 6);
        assert!(map.values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_fits_at_point() {
        let mut model = EvaluationModel::new();
        model.set_nr_brillouin_peaks(2);
        model.initialize_results(shape(2));
        model.results.set(Quantity::BrillouinPosition, [1, 0, 0, 0, 0, 1], 4e9);
        model.results.set(Quantity::BrillouinPosition, [1, 0, 0, 0, 0, 2], 6e9);
        model.results.set(Quantity::BrillouinOffset, [1, 0, 0, 0, 0, 1], 2.0);
        model.results.set(Quantity::BrillouinOffset, [1, 0, 0, 0, 0, 2], 2.0);

        let fits = model.fits_at(1, 0, 0);
        // single and multi-peak Brillouin fit plus two Rayleigh fits
        assert_eq!(fits.len(), 4);
        let multi = fits.iter().find(|r| r.multi_peak).unwrap();
        assert_eq!(multi.fit.centers, vec![4e9, 6e9]);
        assert_eq!(multi.fit.offset, 2.0);
        assert_eq!(fits.iter().filter(|r| r.kind == RegionKind::Rayleigh).count(), 2);

        assert!(EvaluationModel::new().fits_at(0, 0, 0).is_empty());
    }

    #[test]
    fn test_quantity_keys() {
        for q in Quantity::ALL {
            assert_eq!(Quantity::from_key(q.key()), Some(q));
        }
        assert_eq!(Quantity::BrillouinShift.unit(), "GHz");
        assert_eq!(Quantity::Time.unit(), "s");
        assert_eq!(Quantity::Intensity.scaling(), 1.0);
        assert!(Quantity::from_key("brillouin_shift_p").is_none());
    }
}
