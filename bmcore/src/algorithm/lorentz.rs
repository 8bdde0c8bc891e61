use bincode::{Decode, Encode};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::algorithm::peaks::local_maxima;
use crate::data::region::Region;
use crate::error::FitError;

/// Smallest normalized FWHM the solver may reach, keeps the model finite.
const MIN_NORMALIZED_FWHM: f64 = 1e-6;

/// Lorentzian line shape with peak height `intensity`.
#[inline]
pub fn lorentzian(x: f64, center: f64, fwhm: f64, intensity: f64) -> f64 {
    let g = 0.5 * fwhm;
    let g2 = g * g;
    let d = x - center;
    intensity * g2 / (d * d + g2)
}

/// Result of a region fit: `N` Lorentzian lobes sharing one offset.
///
/// Single-peak fits carry arrays of length one, use the scalar accessors for
/// those. A missing fit holds NaN everywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct PeakFit {
    pub centers: Vec<f64>,
    pub fwhms: Vec<f64>,
    pub intensities: Vec<f64>,
    pub offset: f64,
}

impl PeakFit {
    /// NaN sentinel for `n_peaks` lobes.
    pub fn missing(n_peaks: usize) -> Self {
        let n = n_peaks.max(1);
        PeakFit {
            centers: vec![f64::NAN; n],
            fwhms: vec![f64::NAN; n],
            intensities: vec![f64::NAN; n],
            offset: f64::NAN,
        }
    }

    pub fn n_peaks(&self) -> usize {
        self.centers.len()
    }

    pub fn is_missing(&self) -> bool {
        self.centers.iter().all(|c| c.is_nan())
    }

    pub fn center(&self) -> f64 {
        self.centers.first().copied().unwrap_or(f64::NAN)
    }

    pub fn fwhm(&self) -> f64 {
        self.fwhms.first().copied().unwrap_or(f64::NAN)
    }

    pub fn intensity(&self) -> f64 {
        self.intensities.first().copied().unwrap_or(f64::NAN)
    }

    /// Model value at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.offset
            + (0..self.n_peaks())
                .map(|k| lorentzian(x, self.centers[k], self.fwhms[k], self.intensities[k]))
                .sum::<f64>()
    }
}

/// Optional per-peak `(lower, upper)` limits for centers and widths,
/// in the units of the x axis. A list shorter than the peak count leaves the
/// remaining peaks unbounded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitBounds {
    pub center: Option<Vec<(f64, f64)>>,
    pub fwhm: Option<Vec<(f64, f64)>>,
}

impl FitBounds {
    pub fn none() -> Self {
        FitBounds::default()
    }

    pub fn center(&self, peak: usize) -> (f64, f64) {
        self.center
            .as_ref()
            .and_then(|b| b.get(peak).copied())
            .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
    }

    pub fn fwhm(&self, peak: usize) -> (f64, f64) {
        self.fwhm
            .as_ref()
            .and_then(|b| b.get(peak).copied())
            .unwrap_or((0.0, f64::INFINITY))
    }
}

/// Levenberg–Marquardt settings for the region fits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LorentzFitter {
    /// Hard cap on accepted and rejected steps (default: 400)
    pub max_iterations: usize,
    /// Relative cost decrease below which the fit counts as converged (default: 1e-10)
    pub ftol: f64,
    /// Relative step size below which the fit counts as converged (default: 1e-10)
    pub xtol: f64,
}

impl Default for LorentzFitter {
    fn default() -> Self {
        LorentzFitter {
            max_iterations: 400,
            ftol: 1e-10,
            xtol: 1e-10,
        }
    }
}

/// Window samples mapped to `[-1, 1]` on x and `[0, 1]` on y.
struct Normalized {
    u: Vec<f64>,
    v: Vec<f64>,
    x_mid: f64,
    x_scale: f64,
    y_min: f64,
    y_scale: f64,
}

impl Normalized {
    fn new(mut samples: Vec<(f64, f64)>) -> Self {
        samples.sort_by_key(|&(x, _)| OrderedFloat(x));

        let x_min = samples.first().map(|s| s.0).unwrap_or(0.0);
        let x_max = samples.last().map(|s| s.0).unwrap_or(0.0);
        let (y_min, y_max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s.1), hi.max(s.1)));

        let x_mid = 0.5 * (x_min + x_max);
        let x_scale = if x_max > x_min { 0.5 * (x_max - x_min) } else { 1.0 };
        let y_scale = if y_max > y_min { y_max - y_min } else { 1.0 };

        Normalized {
            u: samples.iter().map(|s| (s.0 - x_mid) / x_scale).collect(),
            v: samples.iter().map(|s| (s.1 - y_min) / y_scale).collect(),
            x_mid,
            x_scale,
            y_min,
            y_scale,
        }
    }

    fn x_bound(&self, b: f64) -> f64 {
        if b.is_finite() { (b - self.x_mid) / self.x_scale } else { b }
    }

    fn width_bound(&self, b: f64) -> f64 {
        if b.is_finite() { b / self.x_scale } else { b }
    }
}

/// Moves an initial guess strictly inside `[lo, hi]`.
fn inside(guess: f64, lo: f64, hi: f64) -> f64 {
    if guess >= lo && guess <= hi {
        return guess;
    }
    if lo.is_finite() && hi.is_finite() {
        return 0.5 * (lo + hi);
    }
    if guess < lo {
        lo + (0.05f64).max(0.05 * lo.abs())
    } else {
        hi - (0.05f64).max(0.05 * hi.abs())
    }
}

/// Initial centers for `n` lobes: the highest mutually separated local maxima,
/// evenly spaced positions fill up when there are fewer.
fn initial_centers(data: &Normalized, n: usize) -> Vec<usize> {
    let m = data.v.len();
    let separation = (m / (4 * n)).max(2);

    let mut candidates = local_maxima(&data.v);
    if candidates.is_empty() {
        if let Some((i, _)) = data.v.iter().enumerate().max_by_key(|(_, &v)| OrderedFloat(v)) {
            candidates.push(i);
        }
    }

    let mut chosen: Vec<usize> = Vec::with_capacity(n);
    for i in candidates.into_iter().sorted_by_key(|&i| std::cmp::Reverse(OrderedFloat(data.v[i]))) {
        if chosen.len() == n { break; }
        if chosen.iter().all(|&c| c.abs_diff(i) >= separation) {
            chosen.push(i);
        }
    }

    let mut k = 0;
    while chosen.len() < n {
        k += 1;
        let i = (k * (m - 1)) / (n + 1);
        if !chosen.contains(&i) || k > m {
            chosen.push(i);
        }
    }

    chosen.sort_unstable();
    chosen
}

/// Width of the single maximum at sample `i` from its half-maximum crossings.
fn half_max_width(data: &Normalized, i: usize) -> f64 {
    let half = 0.5 * data.v[i];
    let mut l = i;
    while l > 0 && data.v[l] > half { l -= 1; }
    let mut r = i;
    while r + 1 < data.v.len() && data.v[r] > half { r += 1; }
    let w = data.u[r] - data.u[l];
    if w > 0.0 { w } else { 0.5 }
}

/// Evaluates the model and, on request, its Jacobian for parameter vector
/// `[c0, w0, a0, c1, w1, a1, ..., offset]`.
fn model(p: &DVector<f64>, u: &[f64], n: usize, jacobian: Option<&mut DMatrix<f64>>) -> DVector<f64> {
    let offset = p[3 * n];
    let mut f = DVector::from_element(u.len(), offset);

    match jacobian {
        Some(j) => {
            for (i, &x) in u.iter().enumerate() {
                for k in 0..n {
                    let (c, w, a) = (p[3 * k], p[3 * k + 1], p[3 * k + 2]);
                    let g = 0.5 * w;
                    let g2 = g * g;
                    let d = x - c;
                    let den = d * d + g2;
                    let den2 = den * den;
                    f[i] += a * g2 / den;
                    j[(i, 3 * k)] = 2.0 * a * g2 * d / den2;
                    j[(i, 3 * k + 1)] = a * g * d * d / den2;
                    j[(i, 3 * k + 2)] = g2 / den;
                }
                j[(i, 3 * n)] = 1.0;
            }
        }
        None => {
            for (i, &x) in u.iter().enumerate() {
                for k in 0..n {
                    f[i] += lorentzian(x, p[3 * k], p[3 * k + 1], p[3 * k + 2]);
                }
            }
        }
    }
    f
}

impl LorentzFitter {
    /// Fit `n_peaks` Lorentzian lobes plus a shared offset to the samples of
    /// `(x, y)` that fall into `region`.
    ///
    /// # Arguments
    ///
    /// * `region` - window on the x axis
    /// * `x` - pixel positions or frequencies
    /// * `y` - intensities, same length as `x`
    /// * `n_peaks` - number of lobes, at least one
    /// * `bounds` - optional per-peak center and FWHM limits in x units
    ///
    /// # Returns
    ///
    /// The fit in x units, or `FitError` if the window holds too few samples,
    /// the bounds are inconsistent or the solver does not converge.
    pub fn fit(&self, region: &Region, x: &[f64], y: &[f64], n_peaks: usize, bounds: &FitBounds) -> Result<PeakFit, FitError> {
        let n = n_peaks.max(1);
        let n_params = 3 * n + 1;

        let samples: Vec<(f64, f64)> = x
            .iter()
            .zip(y.iter())
            .filter(|(&xi, &yi)| xi.is_finite() && yi.is_finite() && region.contains(xi))
            .map(|(&xi, &yi)| (xi, yi))
            .collect();
        if samples.len() < n_params {
            return Err(FitError::TooFewSamples { samples: samples.len(), parameters: n_params });
        }

        let data = Normalized::new(samples);

        // parameter limits in normalized units
        let mut lower = DVector::from_element(n_params, f64::NEG_INFINITY);
        let mut upper = DVector::from_element(n_params, f64::INFINITY);
        for k in 0..n {
            let (c_lo, c_hi) = bounds.center(k);
            let (w_lo, w_hi) = bounds.fwhm(k);
            lower[3 * k] = data.x_bound(c_lo);
            upper[3 * k] = data.x_bound(c_hi);
            lower[3 * k + 1] = data.width_bound(w_lo).max(MIN_NORMALIZED_FWHM);
            upper[3 * k + 1] = data.width_bound(w_hi);
            lower[3 * k + 2] = 0.0;
        }
        for i in 0..n_params {
            if lower[i].is_nan() || upper[i].is_nan() || lower[i] > upper[i] {
                return Err(FitError::InvalidBounds { parameter: i, lower: lower[i], upper: upper[i] });
            }
        }

        // initial guess
        let centers = initial_centers(&data, n);
        let mut p = DVector::zeros(n_params);
        for (k, &i) in centers.iter().enumerate() {
            let width = if n == 1 { half_max_width(&data, i) } else { 0.5 / n as f64 };
            p[3 * k] = inside(data.u[i], lower[3 * k], upper[3 * k]);
            p[3 * k + 1] = inside(width, lower[3 * k + 1], upper[3 * k + 1]);
            p[3 * k + 2] = data.v[i].max(1e-3);
        }
        p[3 * n] = 0.0;

        let p = self.solve(p, &data, n, &lower, &upper)?;

        let mut fit = PeakFit::missing(n);
        for k in 0..n {
            fit.centers[k] = data.x_mid + p[3 * k] * data.x_scale;
            fit.fwhms[k] = p[3 * k + 1] * data.x_scale;
            fit.intensities[k] = p[3 * k + 2] * data.y_scale;
        }
        fit.offset = data.y_min + p[3 * n] * data.y_scale;

        if fit.centers.iter().chain(&fit.fwhms).chain(&fit.intensities).any(|v| !v.is_finite()) {
            return Err(FitError::DidNotConverge { iterations: self.max_iterations });
        }
        Ok(fit)
    }

    /// Projected Levenberg–Marquardt iterations.
    fn solve(
        &self,
        mut p: DVector<f64>,
        data: &Normalized,
        n: usize,
        lower: &DVector<f64>,
        upper: &DVector<f64>,
    ) -> Result<DVector<f64>, FitError> {
        let project = |q: &mut DVector<f64>| {
            for i in 0..q.len() {
                q[i] = q[i].clamp(lower[i], upper[i]);
            }
        };
        let v = DVector::from_column_slice(&data.v);
        let cost_of = |q: &DVector<f64>| 0.5 * (&v - model(q, &data.u, n, None)).norm_squared();

        let mut jac = DMatrix::zeros(data.u.len(), p.len());
        let mut lambda = 1e-3;
        let mut cost = cost_of(&p);
        if !cost.is_finite() {
            return Err(FitError::DidNotConverge { iterations: 0 });
        }

        let mut iterations = 0;
        while iterations < self.max_iterations {
            let f = model(&p, &data.u, n, Some(&mut jac));
            let r = &v - f;
            let jt = jac.transpose();
            let jtj = &jt * &jac;
            let g = &jt * r;

            if g.amax() < 1e-14 {
                return Ok(p);
            }

            loop {
                iterations += 1;
                if iterations > self.max_iterations {
                    return Err(FitError::DidNotConverge { iterations: self.max_iterations });
                }

                let mut damped = jtj.clone();
                for i in 0..damped.nrows() {
                    damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
                }

                let step = match damped.cholesky() {
                    Some(ch) => ch.solve(&g),
                    None => {
                        lambda *= 10.0;
                        continue;
                    }
                };

                let mut candidate = &p + &step;
                project(&mut candidate);
                let new_cost = cost_of(&candidate);

                if new_cost.is_finite() && new_cost < cost {
                    let decrease = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);
                    let moved = (&candidate - &p).norm();
                    let scale = p.norm();
                    p = candidate;
                    cost = new_cost;
                    lambda = (lambda / 10.0).max(1e-12);
                    if decrease < self.ftol || moved < self.xtol * (scale + self.xtol) {
                        return Ok(p);
                    }
                    break;
                }

                lambda *= 10.0;
                if lambda > 1e12 {
                    // no downhill step left inside the bounds
                    return Ok(p);
                }
            }
        }

        Err(FitError::DidNotConverge { iterations: self.max_iterations })
    }
}

/// Fit a region with the default solver settings, see [`LorentzFitter::fit`].
pub fn fit_lorentz_region(region: &Region, x: &[f64], y: &[f64], n_peaks: usize, bounds: &FitBounds) -> Result<PeakFit, FitError> {
    LorentzFitter::default().fit(region, x, y, n_peaks, bounds)
}
