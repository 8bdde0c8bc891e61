use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

use crate::algorithm::lorentz::lorentzian;
use crate::data::spectrum::Spectrum;

/// A single Lorentzian line of a synthetic spectrum, in pixel units.
#[derive(Clone, Debug, PartialEq)]
pub struct LorentzLine {
    pub center: f64,
    pub fwhm: f64,
    pub intensity: f64,
}

/// Builder for synthetic spectra: Lorentzian lines on a flat background,
/// optionally with additive Gaussian noise.
#[derive(Clone, Debug)]
pub struct SyntheticSpectrum {
    pub len: usize,
    pub background: f64,
    pub lines: Vec<LorentzLine>,
    pub noise_sigma: f64,
}

impl SyntheticSpectrum {
    pub fn new(len: usize, background: f64) -> Self {
        SyntheticSpectrum {
            len,
            background,
            lines: Vec::new(),
            noise_sigma: 0.0,
        }
    }

    pub fn with_peak(mut self, center: f64, fwhm: f64, intensity: f64) -> Self {
        self.lines.push(LorentzLine { center, fwhm, intensity });
        self
    }

    pub fn with_noise(mut self, sigma: f64) -> Self {
        self.noise_sigma = sigma;
        self
    }

    fn value_at(&self, x: f64) -> f64 {
        self.background
            + self
                .lines
                .iter()
                .map(|l| lorentzian(x, l.center, l.fwhm, l.intensity))
                .sum::<f64>()
    }

    /// Noise free rendering.
    pub fn render(&self) -> Spectrum {
        Spectrum::new((0..self.len).map(|i| self.value_at(i as f64)).collect())
    }

    /// Rendering with Gaussian noise drawn from `rng`.
    pub fn render_noisy<R: Rng>(&self, rng: &mut R) -> Spectrum {
        let normal = match Normal::new(0.0, self.noise_sigma) {
            Ok(n) if self.noise_sigma > 0.0 => n,
            _ => return self.render(),
        };
        Spectrum::new(
            (0..self.len)
                .map(|i| self.value_at(i as f64) + normal.sample(rng))
                .collect(),
        )
    }

    /// Reproducible noisy rendering.
    pub fn render_seeded(&self, seed: u64) -> Spectrum {
        let mut rng = StdRng::seed_from_u64(seed);
        self.render_noisy(&mut rng)
    }
}

/// Smooth monotone pixel → frequency mapping used to lay out synthetic
/// acquisitions: `f(x) = slope·(x − origin) + curvature·(x − origin)²`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadraticDispersion {
    pub origin: f64,
    pub slope: f64,
    pub curvature: f64,
}

impl QuadraticDispersion {
    pub fn frequency(&self, x: f64) -> f64 {
        let d = x - self.origin;
        self.slope * d + self.curvature * d * d
    }

    /// Pixel position at which the mapping reaches `frequency`
    /// (the branch on the rising flank).
    pub fn pixel(&self, frequency: f64) -> f64 {
        if self.curvature == 0.0 {
            return self.origin + frequency / self.slope;
        }
        let disc = self.slope * self.slope + 4.0 * self.curvature * frequency;
        self.origin + (-self.slope + disc.max(0.0).sqrt()) / (2.0 * self.curvature)
    }
}
