use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Known positions of the calibration peaks.
///
/// Peak `i` of a calibration spectrum, counted in ascending pixel order, sits
/// at `shifts[i] + orders[i] × FSR` above the laser frequency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CalibrationSetup {
    /// Number of reference samples measured for calibration (default: 2)
    pub num_brillouin_samples: usize,
    /// Frequency shift of every calibration peak in Hz
    pub shifts: Vec<f64>,
    /// Interference order of every calibration peak
    pub orders: Vec<f64>,
}

impl Default for CalibrationSetup {
    fn default() -> Self {
        // Rayleigh, methanol, water on the Stokes side of order 0,
        // mirrored on the anti-Stokes side of order 1
        CalibrationSetup {
            num_brillouin_samples: 2,
            shifts: vec![0.0, 3.78e9, 5.066e9, -5.066e9, -3.78e9, 0.0],
            orders: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        }
    }
}

/// Instrument description, read-only during calibration and evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Setup {
    pub name: String,
    /// Laser wavelength in m
    pub wavelength: f64,
    /// Laser frequency in Hz
    pub f0: f64,
    pub calibration: CalibrationSetup,
}

impl Default for Setup {
    fn default() -> Self {
        Setup::new("780 nm", 780.24e-9, CalibrationSetup::default())
    }
}

impl Setup {
    pub fn new(name: &str, wavelength: f64, calibration: CalibrationSetup) -> Self {
        Setup {
            name: name.to_string(),
            wavelength,
            f0: SPEED_OF_LIGHT / wavelength,
            calibration,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, EvalError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, EvalError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json(&self) -> Result<String, EvalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of peaks a calibration spectrum of this setup shows.
    pub fn expected_peaks(&self) -> usize {
        2 + 2 * self.calibration.num_brillouin_samples
    }
}
