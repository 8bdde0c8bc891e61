use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use statrs::statistics::{Data, Median};

/// A one dimensional intensity trace extracted along the spectrometer arc.
///
/// Sample `i` belongs to pixel position `i`. Uses `Arc<Vec<f64>>` so that
/// handing the same frames to many fit tasks is O(1) per clone.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    pub intensity: Arc<Vec<f64>>,
}

impl Spectrum {
    /// Constructs a new `Spectrum`.
    ///
    /// # Arguments
    ///
    /// * `intensity` - Intensity samples ordered by pixel position.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use bmcore::data::spectrum::Spectrum;
    /// let spectrum = Spectrum::new(vec![1.0, 4.0, 2.0]);
    /// assert_eq!(spectrum.len(), 3);
    /// assert_eq!(spectrum.pixel_axis(), vec![0.0, 1.0, 2.0]);
    /// ```
    pub fn new(intensity: Vec<f64>) -> Self {
        Spectrum {
            intensity: Arc::new(intensity),
        }
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.intensity
    }

    /// Pixel positions `0..len` as floating point values.
    pub fn pixel_axis(&self) -> Vec<f64> {
        (0..self.len()).map(|i| i as f64).collect()
    }

    /// Sample-wise mean of several frames, ignoring NaN samples.
    ///
    /// Returns `None` if no frames are given or the frames differ in length.
    /// A sample that is NaN in every frame stays NaN.
    pub fn mean_of(frames: &[Spectrum]) -> Option<Spectrum> {
        let first = frames.first()?;
        let n = first.len();
        if frames.iter().any(|f| f.len() != n) {
            return None;
        }

        let mut sum = vec![0.0f64; n];
        let mut count = vec![0usize; n];
        for frame in frames {
            for (i, &v) in frame.intensity.iter().enumerate() {
                if v.is_finite() {
                    sum[i] += v;
                    count[i] += 1;
                }
            }
        }

        let mean = sum
            .into_iter()
            .zip(count)
            .map(|(s, c)| if c > 0 { s / c as f64 } else { f64::NAN })
            .collect();

        Some(Spectrum::new(mean))
    }

    /// Median of the finite samples, `NaN` for a spectrum without any.
    pub fn median(&self) -> f64 {
        let finite: Vec<f64> = self.intensity.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        Data::new(finite).median()
    }

    /// Mean of the finite samples, `NaN` for a spectrum without any.
    pub fn mean(&self) -> f64 {
        let (sum, n) = self
            .intensity
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n == 0 { f64::NAN } else { sum / n as f64 }
    }

    /// Smallest finite sample, `NaN` for a spectrum without any.
    pub fn min(&self) -> f64 {
        self.intensity
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::min)
    }

    /// Copy of the samples with NaN replaced by the smallest finite sample,
    /// so that peak searches never compare against NaN.
    pub fn filled(&self) -> Vec<f64> {
        let floor = self.min();
        let floor = if floor.is_finite() { floor } else { 0.0 };
        self.intensity
            .iter()
            .map(|&v| if v.is_finite() { v } else { floor })
            .collect()
    }
}

impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Spectrum(pixels: {}, median: {:.3})", self.len(), self.median())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_ignores_nan() {
        let a = Spectrum::new(vec![1.0, f64::NAN, 3.0]);
        let b = Spectrum::new(vec![3.0, 2.0, f64::NAN]);
        let c = Spectrum::new(vec![f64::NAN, f64::NAN, 5.0]);

        let mean = Spectrum::mean_of(&[a, b, c]).unwrap();
        assert_eq!(*mean.intensity, vec![2.0, 2.0, 4.0]);
    }

    #[test]
    fn test_mean_of_rejects_mismatched_frames() {
        let a = Spectrum::new(vec![1.0, 2.0]);
        let b = Spectrum::new(vec![1.0]);
        assert!(Spectrum::mean_of(&[a, b]).is_none());
        assert!(Spectrum::mean_of(&[]).is_none());
    }

    #[test]
    fn test_median_and_fill() {
        let s = Spectrum::new(vec![5.0, f64::NAN, 1.0, 3.0]);
        assert!((s.median() - 3.0).abs() < 1e-12);
        assert_eq!(s.filled(), vec![5.0, 1.0, 1.0, 3.0]);
        assert!((s.mean() - 3.0).abs() < 1e-12);
        assert!(Spectrum::new(vec![f64::NAN]).median().is_nan());
    }
}
