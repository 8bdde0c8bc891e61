use bincode::{Decode, Encode};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Number of free parameters of the transfer function.
pub const VIPA_PARAMETERS: usize = 4;

/// Largest accepted condition number of the calibration system.
const MAX_CONDITION: f64 = 1e12;

/// Spectrometer transfer function of one calibration frame.
///
/// `VIPA(x) = f0 + a + b·x + c·x²` maps a pixel position to an optical
/// frequency; `fsr` is the free spectral range, the frequency distance between
/// neighbouring interference orders.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct VipaParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub fsr: f64,
    /// Reference laser frequency the fit was made against.
    pub f0: f64,
}

impl VipaParams {
    /// Parameter vector `[a, b, c, fsr]`.
    pub fn values(&self) -> [f64; VIPA_PARAMETERS] {
        [self.a, self.b, self.c, self.fsr]
    }

    /// Absolute optical frequency at pixel `x`.
    pub fn vipa(&self, x: f64) -> f64 {
        self.f0 + self.relative_frequency(x)
    }

    /// Frequency at pixel `x` relative to `f0`, i.e. `VIPA(x) − f0`.
    #[inline]
    pub fn relative_frequency(&self, x: f64) -> f64 {
        self.a + self.b * x + self.c * x * x
    }

    /// Frequency axis for pixels `0..len`, relative to `f0`.
    pub fn frequency_axis(&self, len: usize) -> Vec<f64> {
        (0..len).map(|x| self.relative_frequency(x as f64)).collect()
    }

    /// Frequencies the calibration peaks are expected at:
    /// `shifts + orders × fsr`.
    pub fn expected_frequencies(&self, shifts: &[f64], orders: &[f64]) -> Vec<f64> {
        shifts
            .iter()
            .zip(orders.iter())
            .map(|(s, o)| s + o * self.fsr)
            .collect()
    }
}

/// Fit the transfer function to the sorted peak positions of one calibration
/// frame.
///
/// Peak `i` is known to sit at `shifts[i] + orders[i] × fsr` above `f0`, which
/// gives the linear system `a + b·x_i + c·x_i² − orders_i·fsr = shifts_i`.
/// It is solved in the least squares sense with pixel positions scaled to
/// `[-1, 1]` for conditioning.
///
/// # Arguments
///
/// * `peaks` - fitted peak centers in pixels, sorted ascending
/// * `shifts` - known shift of every calibration peak in Hz
/// * `orders` - interference order of every calibration peak
/// * `f0` - reference laser frequency in Hz
///
/// # Returns
///
/// `None` when the frame cannot be calibrated: peak count differs from the
/// configured shifts, a position is not finite, fewer peaks than parameters,
/// an ill-conditioned system, or a non-positive free spectral range.
pub fn fit_vipa(peaks: &[f64], shifts: &[f64], orders: &[f64], f0: f64) -> Option<VipaParams> {
    let n = peaks.len();
    if n < VIPA_PARAMETERS || n != shifts.len() || n != orders.len() {
        return None;
    }
    if peaks.iter().chain(shifts).chain(orders).any(|v| !v.is_finite()) {
        return None;
    }

    let scale = peaks.iter().fold(0.0f64, |m, p| m.max(p.abs()));
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let design = DMatrix::from_fn(n, VIPA_PARAMETERS, |i, j| {
        let t = peaks[i] / scale;
        match j {
            0 => 1.0,
            1 => t,
            2 => t * t,
            _ => -orders[i],
        }
    });
    let rhs = DVector::from_column_slice(shifts);

    let svd = design.svd(true, true);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if s_min <= 0.0 || s_max / s_min > MAX_CONDITION {
        log::debug!("VIPA system ill-conditioned (singular values {s_min:e} .. {s_max:e})");
        return None;
    }
    let solution = svd.solve(&rhs, 0.0).ok()?;

    let params = VipaParams {
        a: solution[0],
        b: solution[1] / scale,
        c: solution[2] / (scale * scale),
        fsr: solution[3],
        f0,
    };

    if !params.values().iter().all(|v| v.is_finite()) || params.fsr <= 0.0 {
        return None;
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::spectrum::QuadraticDispersion;

    const F0: f64 = 3.842e14;

    fn calibration() -> (Vec<f64>, Vec<f64>, Vec<f64>, QuadraticDispersion) {
        let d = QuadraticDispersion { origin: 50.0, slope: 2.9e7, curvature: 2.0e3 };
        let peaks = vec![50.0, 150.0, 250.0, 350.0, 450.0, 550.0];
        let orders = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let fsr = d.frequency(550.0);
        let shifts = peaks
            .iter()
            .zip(&orders)
            .map(|(&x, &o)| d.frequency(x) - o * fsr)
            .collect();
        (peaks, shifts, orders, d)
    }

    #[test]
    fn test_fit_recovers_dispersion() {
        let (peaks, shifts, orders, d) = calibration();
        let params = fit_vipa(&peaks, &shifts, &orders, F0).unwrap();

        assert!((params.fsr - d.frequency(550.0)).abs() < 1e3);
        let axis = params.frequency_axis(600);
        for x in [0usize, 50, 123, 300, 599] {
            assert!((axis[x] - d.frequency(x as f64)).abs() < 1e3);
        }
        assert!((params.vipa(50.0) - F0).abs() < 1e3);

        let expected = params.expected_frequencies(&shifts, &orders);
        for (e, &x) in expected.iter().zip(&peaks) {
            assert!((e - d.frequency(x)).abs() < 1e3);
        }
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let (peaks, shifts, orders, _) = calibration();
        assert!(fit_vipa(&peaks[..5], &shifts, &orders, F0).is_none());
        assert!(fit_vipa(&peaks[..3], &shifts[..3], &orders[..3], F0).is_none());

        let mut with_nan = peaks.clone();
        with_nan[2] = f64::NAN;
        assert!(fit_vipa(&with_nan, &shifts, &orders, F0).is_none());

        // all peaks in one order leave the free spectral range undetermined
        let flat = vec![0.0; 6];
        assert!(fit_vipa(&peaks, &shifts, &flat, F0).is_none());
    }
}
