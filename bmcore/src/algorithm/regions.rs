use serde::{Deserialize, Serialize};

use crate::algorithm::peaks::{find_peaks, Peak1D};
use crate::data::region::Region;
use crate::data::spectrum::Spectrum;
use crate::error::DetectionError;

/// Half width of a calibration region in multiples of the peak width.
const REGION_HALF_WIDTHS: f64 = 4.0;

/// Configuration for the calibration region detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionParams {
    /// Minimal topographic prominence of a peak (default: 15.0)
    pub min_prominence: f64,
    /// Minimal height above the spectrum median for the first search pass (default: 15.0)
    pub min_height: f64,
    /// Number of calibration samples, i.e. Brillouin doublets (default: 2)
    pub num_brillouin_samples: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        DetectionParams {
            min_prominence: 15.0,
            min_height: 15.0,
            num_brillouin_samples: 2,
        }
    }
}

impl DetectionParams {
    /// Number of peaks a calibration spectrum has to show:
    /// two Rayleigh peaks plus one Stokes and one anti-Stokes peak per sample.
    pub fn expected_peaks(&self) -> usize {
        2 + 2 * self.num_brillouin_samples
    }
}

/// Regions found on one averaged calibration spectrum.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedRegions {
    pub brillouin: Vec<Region>,
    pub rayleigh: Vec<Region>,
    /// Pixel position separating the Stokes from the anti-Stokes family.
    pub center: f64,
    /// Apex indices of all peak candidates used for the partition.
    pub peaks: Vec<usize>,
}

/// Intensity weighted centroid of the spectrum after subtracting `base`,
/// samples below `base` contribute nothing.
///
/// Samples are weighted by their one-based position, so the result sits one
/// pixel above the zero-based peak indices it is compared against.
fn background_centroid(y: &[f64], base: f64) -> f64 {
    let (weighted, total) = y
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(w, t), (i, &v)| {
            let v = (v - base).max(0.0);
            (w + v * (i + 1) as f64, t + v)
        });
    if total > 0.0 {
        weighted / total
    } else {
        0.5 * (y.len() + 1) as f64
    }
}

fn peak_to_region(peak: &Peak1D, len: usize) -> Region {
    let reach = REGION_HALF_WIDTHS * peak.width;
    let start = (peak.index as f64 - reach).trunc().max(0.0);
    let end = (peak.index as f64 + reach).trunc().min(len as f64);
    Region::new(start, end)
}

/// Find the Brillouin and Rayleigh regions on an averaged calibration spectrum.
///
/// Peaks are searched above `median + min_height` first and without a floor if
/// that yields too few. The center between the Stokes and anti-Stokes family is
/// the midpoint of the two middle peaks when exactly the expected number was
/// found, otherwise the background-subtracted centroid, moved onto the nearest
/// valid peak window when one side holds fewer than `samples + 1` peaks.
/// Peaks are then taken outward from the center: `2 × samples` Brillouin peaks,
/// followed by one Rayleigh peak on each side.
///
/// # Returns
///
/// Two merged Brillouin regions when `samples > 1` (one region per peak
/// otherwise) and always two Rayleigh regions.
pub fn find_regions(spectrum: &Spectrum, params: &DetectionParams) -> Result<DetectedRegions, DetectionError> {
    let base = spectrum.median();
    if !base.is_finite() {
        return Err(DetectionError::EmptySpectrum);
    }

    let y = spectrum.filled();
    let s = params.num_brillouin_samples;
    let required = params.expected_peaks();

    let mut peaks = find_peaks(&y, Some(base + params.min_height), params.min_prominence);
    if peaks.len() < required {
        log::debug!(
            "found {} of {} peaks above the height floor, retrying without it",
            peaks.len(),
            required
        );
        peaks = find_peaks(&y, None, params.min_prominence);
        if peaks.len() < required {
            return Err(DetectionError::InsufficientPeaks { found: peaks.len(), required });
        }
    }

    let positions: Vec<f64> = peaks.iter().map(|p| p.index as f64).collect();
    let n = positions.len();
    let count_left = |c: f64| positions.iter().filter(|&&p| p <= c).count();

    let center = if n == required {
        let mid = n / 2;
        0.5 * (positions[mid - 1] + positions[mid])
    } else {
        let centroid = background_centroid(&y, base);
        let left = count_left(centroid);
        let right = n - left;
        if right < s + 1 {
            0.5 * (positions[n - s - 2] + positions[n - s - 1])
        } else if left < s + 1 {
            0.5 * (positions[s] + positions[s + 1])
        } else {
            centroid
        }
    };

    // Holds for distinct peak indices since n >= 2s + 2 and the shifted
    // center always leaves s + 1 peaks on the short side.
    let left = count_left(center);
    let right = n - left;
    if left < s + 1 || right < s + 1 {
        return Err(DetectionError::AmbiguousCenter { left, right, required: s + 1 });
    }

    let len = spectrum.len();
    let mut brillouin: Vec<Region> = (left - s..left + s)
        .map(|i| peak_to_region(&peaks[i], len))
        .collect();
    if s > 1 {
        brillouin = vec![
            Region::new(brillouin[0].start, brillouin[s - 1].end),
            Region::new(brillouin[s].start, brillouin[2 * s - 1].end),
        ];
    }

    let rayleigh = vec![
        peak_to_region(&peaks[left - s - 1], len),
        peak_to_region(&peaks[left + s], len),
    ];

    Ok(DetectedRegions {
        brillouin,
        rayleigh,
        center,
        peaks: peaks.iter().map(|p| p.index).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::spectrum::SyntheticSpectrum;

    fn calibration_spectrum(positions: &[(f64, f64)]) -> Spectrum {
        let mut synth = SyntheticSpectrum::new(600, 10.0);
        for &(center, intensity) in positions {
            synth = synth.with_peak(center, 6.0, intensity);
        }
        synth.render()
    }

    fn standard_calibration() -> Spectrum {
        calibration_spectrum(&[
            (50.0, 1000.0),
            (150.0, 200.0),
            (250.0, 200.0),
            (350.0, 200.0),
            (450.0, 200.0),
            (550.0, 1000.0),
        ])
    }

    #[test]
    fn test_exact_peak_count_partition() {
        let regions = find_regions(&standard_calibration(), &DetectionParams::default()).unwrap();

        assert!((regions.center - 300.0).abs() < 1e-9);
        assert_eq!(regions.brillouin.len(), 2);
        assert_eq!(regions.rayleigh.len(), 2);

        let b0 = regions.brillouin[0];
        let b1 = regions.brillouin[1];
        assert!(b0.start > 100.0 && b0.start < 150.0);
        assert!(b0.end > 250.0 && b0.end < 300.0);
        assert!(b1.start > 300.0 && b1.start < 350.0);
        assert!(b1.end > 450.0 && b1.end < 500.0);

        assert!(regions.rayleigh[0].contains(50.0));
        assert!(regions.rayleigh[1].contains(550.0));
        assert!(!regions.rayleigh[0].contains(150.0));
    }

    #[test]
    fn test_single_sample_keeps_one_region_per_peak() {
        let spectrum = calibration_spectrum(&[
            (100.0, 1000.0),
            (220.0, 200.0),
            (380.0, 200.0),
            (500.0, 1000.0),
        ]);
        let params = DetectionParams { num_brillouin_samples: 1, ..Default::default() };
        let regions = find_regions(&spectrum, &params).unwrap();

        assert_eq!(regions.brillouin.len(), 2);
        assert!(regions.brillouin[0].contains(220.0));
        assert!(regions.brillouin[1].contains(380.0));
        assert!(regions.rayleigh[0].contains(100.0));
        assert!(regions.rayleigh[1].contains(500.0));
    }

    #[test]
    fn test_extra_peaks_use_centroid() {
        let spectrum = calibration_spectrum(&[
            (20.0, 60.0),
            (50.0, 1000.0),
            (150.0, 200.0),
            (250.0, 200.0),
            (350.0, 200.0),
            (450.0, 200.0),
            (550.0, 1000.0),
            (580.0, 60.0),
        ]);
        let regions = find_regions(&spectrum, &DetectionParams::default()).unwrap();

        assert_eq!(regions.peaks.len(), 8);
        assert!(regions.center > 250.0 && regions.center < 350.0);
        assert!(regions.brillouin[0].contains(150.0));
        assert!(regions.brillouin[0].contains(250.0));
        assert!(regions.brillouin[1].contains(350.0));
        assert!(regions.brillouin[1].contains(450.0));
        assert!(regions.rayleigh[0].contains(50.0));
        assert!(regions.rayleigh[1].contains(550.0));
    }

    #[test]
    fn test_center_moves_when_right_side_is_short() {
        // a very strong feature at the right border drags the centroid past
        // the anti-Stokes peaks
        let spectrum = calibration_spectrum(&[
            (50.0, 1000.0),
            (150.0, 200.0),
            (250.0, 200.0),
            (350.0, 1000.0),
            (590.0, 20000.0),
        ]);
        let params = DetectionParams { num_brillouin_samples: 1, ..Default::default() };
        let regions = find_regions(&spectrum, &params).unwrap();

        assert!((regions.center - 300.0).abs() < 1e-9);
        assert!(regions.rayleigh[1].contains(590.0));
    }

    #[test]
    fn test_centroid_uses_one_based_weights() {
        assert_eq!(background_centroid(&[0.0, 0.0, 10.0, 0.0], 0.0), 3.0);
        assert_eq!(background_centroid(&[5.0, 15.0, 5.0, 15.0], 5.0), 3.0);
        assert_eq!(background_centroid(&[1.0, 1.0, 1.0], 2.0), 2.0);
    }

    #[test]
    fn test_every_layout_leaves_enough_peaks_per_side() {
        let layouts: [&[(f64, f64)]; 4] = [
            // crowded on the left, strong features on the right
            &[(30.0, 500.0), (80.0, 200.0), (130.0, 200.0), (180.0, 200.0), (230.0, 200.0), (560.0, 8000.0), (590.0, 8000.0)],
            // crowded on the right, strong features on the left
            &[(10.0, 8000.0), (40.0, 8000.0), (370.0, 200.0), (420.0, 200.0), (470.0, 200.0), (520.0, 200.0), (570.0, 500.0)],
            // evenly spread with many extra peaks
            &[(30.0, 300.0), (100.0, 300.0), (170.0, 300.0), (240.0, 300.0), (310.0, 300.0), (380.0, 300.0), (450.0, 300.0), (520.0, 300.0), (580.0, 300.0)],
            // all peaks bunched in the middle
            &[(250.0, 400.0), (270.0, 400.0), (290.0, 400.0), (310.0, 400.0), (330.0, 400.0), (350.0, 400.0), (370.0, 400.0)],
        ];

        for layout in layouts {
            let regions = find_regions(&calibration_spectrum(layout), &DetectionParams::default()).unwrap();
            let left = regions.peaks.iter().filter(|&&p| p as f64 <= regions.center).count();
            let right = regions.peaks.len() - left;
            assert!(left >= 3 && right >= 3, "{left} | {right} around {}", regions.center);
        }
    }

    #[test]
    fn test_insufficient_peaks() {
        let spectrum = calibration_spectrum(&[(100.0, 1000.0), (300.0, 200.0), (500.0, 1000.0)]);
        let err = find_regions(&spectrum, &DetectionParams::default()).unwrap_err();
        assert_eq!(err, DetectionError::InsufficientPeaks { found: 3, required: 6 });
    }

    #[test]
    fn test_noisy_spectrum_is_partitioned() {
        let spectrum = SyntheticSpectrum::new(600, 10.0)
            .with_peak(50.0, 6.0, 1000.0)
            .with_peak(150.0, 6.0, 200.0)
            .with_peak(250.0, 6.0, 200.0)
            .with_peak(350.0, 6.0, 200.0)
            .with_peak(450.0, 6.0, 200.0)
            .with_peak(550.0, 6.0, 1000.0)
            .with_noise(1.0)
            .render_seeded(7);
        let regions = find_regions(&spectrum, &DetectionParams::default()).unwrap();

        assert!(regions.brillouin[0].contains(150.0) && regions.brillouin[0].contains(250.0));
        assert!(regions.brillouin[1].contains(350.0) && regions.brillouin[1].contains(450.0));
        assert!(regions.rayleigh[0].contains(50.0));
        assert!(regions.rayleigh[1].contains(550.0));
    }
}
