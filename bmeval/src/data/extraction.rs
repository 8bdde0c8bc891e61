use std::collections::BTreeMap;
use std::fmt::Display;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use bmcore::data::spectrum::Spectrum;

use crate::data::grid::grid_size;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum ImageKind {
    Calibration,
    Payload,
}

impl Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageKind::Calibration => write!(f, "calibration"),
            ImageKind::Payload => write!(f, "payload"),
        }
    }
}

/// Spectra extracted from the frames of one image, with the acquisition time
/// and mean image intensity of every frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectraBundle {
    pub spectra: Vec<Spectrum>,
    pub times: Vec<f64>,
    pub intensities: Vec<f64>,
}

impl SpectraBundle {
    pub fn new(spectra: Vec<Spectrum>, times: Vec<f64>, intensities: Vec<f64>) -> Self {
        SpectraBundle { spectra, times, intensities }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// The single frame `frame` as a bundle of its own.
    pub fn frame(&self, frame: usize) -> Option<SpectraBundle> {
        let spectrum = self.spectra.get(frame)?.clone();
        Some(SpectraBundle {
            spectra: vec![spectrum],
            times: self.times.get(frame).copied().into_iter().collect(),
            intensities: self.intensities.get(frame).copied().into_iter().collect(),
        })
    }

    /// Sample-wise mean over all frames.
    pub fn mean_spectrum(&self) -> Option<Spectrum> {
        Spectrum::mean_of(&self.spectra)
    }
}

/// Access to extracted spectra of one repetition.
///
/// Image acquisition and arc extraction live behind this trait. Calibration
/// images are addressed by their key, payload images by the linear key of
/// their grid point.
pub trait SpectrumSource: Send + Sync {
    fn calibration_keys(&self) -> Vec<String>;
    /// All frames when `frame` is `None`, otherwise just that one.
    fn get_spectra(&self, kind: ImageKind, key: &str, frame: Option<usize>) -> Option<SpectraBundle>;
    /// Number of grid points along x, y and z.
    fn resolution(&self) -> [usize; 3];
    /// Stage coordinates in µm along x, y and z.
    fn positions(&self) -> [Vec<f64>; 3];

    fn payload_keys(&self) -> Vec<String> {
        (0..grid_size(self.resolution())).map(|i| i.to_string()).collect()
    }
}

/// Spectra held in memory, for embedding callers and tests.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    resolution: [usize; 3],
    positions: [Vec<f64>; 3],
    calibrations: BTreeMap<String, SpectraBundle>,
    payload: BTreeMap<String, SpectraBundle>,
}

impl InMemorySource {
    /// Empty source for a grid of `resolution`, positions are the grid
    /// indices.
    pub fn new(resolution: [usize; 3]) -> Self {
        let positions = resolution.map(|n| (0..n).map(|i| i as f64).collect());
        InMemorySource {
            resolution,
            positions,
            calibrations: BTreeMap::new(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with_positions(mut self, positions: [Vec<f64>; 3]) -> Self {
        self.positions = positions;
        self
    }

    pub fn add_calibration(&mut self, key: &str, bundle: SpectraBundle) {
        self.calibrations.insert(key.to_string(), bundle);
    }

    pub fn add_payload(&mut self, key: &str, bundle: SpectraBundle) {
        self.payload.insert(key.to_string(), bundle);
    }
}

impl SpectrumSource for InMemorySource {
    fn calibration_keys(&self) -> Vec<String> {
        self.calibrations.keys().cloned().collect()
    }

    fn get_spectra(&self, kind: ImageKind, key: &str, frame: Option<usize>) -> Option<SpectraBundle> {
        let images = match kind {
            ImageKind::Calibration => &self.calibrations,
            ImageKind::Payload => &self.payload,
        };
        let bundle = images.get(key)?;
        match frame {
            Some(f) => bundle.frame(f),
            None => Some(bundle.clone()),
        }
    }

    fn resolution(&self) -> [usize; 3] {
        self.resolution
    }

    fn positions(&self) -> [Vec<f64>; 3] {
        self.positions.clone()
    }
}
