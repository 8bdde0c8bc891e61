use std::sync::Arc;

use rayon::prelude::*;

use bmcore::algorithm::lorentz::{fit_lorentz_region, FitBounds, PeakFit};
use bmcore::algorithm::regions::{find_regions, DetectedRegions, DetectionParams};
use bmcore::algorithm::vipa::fit_vipa;
use bmcore::data::region::{Region, RegionKind};
use bmcore::data::spectrum::Spectrum;

use crate::data::calibration::FrequencyEntry;
use crate::data::extraction::ImageKind;
use crate::error::EvalError;
use crate::progress::Progress;
use crate::session::Session;

/// Region fits of one calibration frame, in pixel units.
struct FrameFits {
    rayleigh: Vec<PeakFit>,
    brillouin: Vec<PeakFit>,
}

fn fit_regions(spectrum: &Spectrum, regions: &[Region], n_peaks: usize) -> Vec<PeakFit> {
    let x = spectrum.pixel_axis();
    regions
        .iter()
        .map(|region| {
            fit_lorentz_region(region, &x, spectrum.values(), n_peaks, &FitBounds::none()).unwrap_or_else(|e| {
                log::debug!("calibration fit in {} failed: {}", region, e);
                PeakFit::missing(n_peaks)
            })
        })
        .collect()
}

/// Turns calibration images into frequency axes: finds the calibration
/// regions, fits them and fits the spectrometer transfer function per frame.
pub struct CalibrationController<'a> {
    session: &'a mut Session,
}

impl<'a> CalibrationController<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        CalibrationController { session }
    }

    /// Detect Brillouin and Rayleigh regions on the frame average of
    /// calibration image `key` and store them, replacing earlier ones.
    pub fn find_peaks(&mut self, key: &str, params: &DetectionParams) -> Result<DetectedRegions, EvalError> {
        let source = self
            .session
            .source()
            .ok_or(EvalError::MissingPrerequisite("spectrum source"))?;
        let unavailable = || EvalError::ExtractionUnavailable {
            kind: ImageKind::Calibration,
            key: key.to_string(),
        };
        let bundle = source
            .get_spectra(ImageKind::Calibration, key, None)
            .ok_or_else(unavailable)?;
        let spectrum = bundle.mean_spectrum().ok_or_else(unavailable)?;

        let detected = find_regions(&spectrum, params)?;

        let model = self
            .session
            .calibration_model_mut()
            .ok_or(EvalError::MissingPrerequisite("calibration model"))?;
        for (kind, regions) in [
            (RegionKind::Brillouin, &detected.brillouin),
            (RegionKind::Rayleigh, &detected.rayleigh),
        ] {
            model.clear_regions(kind, key);
            for (i, region) in regions.iter().enumerate() {
                model.set_region(kind, key, i, *region);
            }
        }
        log::debug!(
            "calibration {}: {} Brillouin and {} Rayleigh regions around pixel {:.1}",
            key,
            detected.brillouin.len(),
            detected.rayleigh.len(),
            detected.center
        );
        Ok(detected)
    }

    /// Fit the regions of calibration image `key` in every frame and derive
    /// a frequency axis for each frame the transfer function could be fitted
    /// for.
    ///
    /// Adds the frame count to `progress.max_count`, counts every calibrated
    /// frame and takes skipped frames off the total again. Returns the number
    /// of calibrated frames.
    pub fn calibrate(&mut self, key: &str, progress: &Progress) -> Result<usize, EvalError> {
        let (setup, source) = match (self.session.setup().cloned(), self.session.source()) {
            (Some(setup), Some(source)) if self.session.models().is_some() => (setup, source),
            (None, _) => {
                progress.fail();
                return Err(EvalError::MissingPrerequisite("setup"));
            }
            _ => {
                progress.fail();
                return Err(EvalError::MissingPrerequisite("spectrum source"));
            }
        };

        let bundle = match source.get_spectra(ImageKind::Calibration, key, None) {
            Some(bundle) if !bundle.is_empty() => bundle,
            _ => {
                progress.fail();
                return Err(EvalError::ExtractionUnavailable {
                    kind: ImageKind::Calibration,
                    key: key.to_string(),
                });
            }
        };

        let model = self
            .session
            .calibration_model_mut()
            .ok_or(EvalError::MissingPrerequisite("calibration model"))?;
        let rayleigh_regions = model.regions(RegionKind::Rayleigh, key).to_vec();
        let brillouin_regions = model.regions(RegionKind::Brillouin, key).to_vec();
        let samples = setup.calibration.num_brillouin_samples;

        let frame_fits: Vec<FrameFits> = bundle
            .spectra
            .par_iter()
            .map(|spectrum| FrameFits {
                rayleigh: fit_regions(spectrum, &rayleigh_regions, 1),
                brillouin: fit_regions(spectrum, &brillouin_regions, samples),
            })
            .collect();

        model.clear_fits(RegionKind::Rayleigh, key);
        model.clear_fits(RegionKind::Brillouin, key);
        for (frame, fits) in frame_fits.into_iter().enumerate() {
            for (region, fit) in fits.rayleigh.into_iter().enumerate() {
                model.add_fit(RegionKind::Rayleigh, key, region, frame, fit);
            }
            for (region, fit) in fits.brillouin.into_iter().enumerate() {
                model.add_fit(RegionKind::Brillouin, key, region, frame, fit);
            }
        }

        progress.add_total(bundle.len() as i64);

        let mut vipa_params = Vec::new();
        let mut frequencies = Vec::new();
        for (frame, spectrum) in bundle.spectra.iter().enumerate() {
            let peaks = model.get_sorted_peaks(key, frame);
            match fit_vipa(&peaks, &setup.calibration.shifts, &setup.calibration.orders, setup.f0) {
                Some(params) => {
                    frequencies.push(FrequencyEntry {
                        key: key.to_string(),
                        frame,
                        time: bundle.times.get(frame).copied().unwrap_or(f64::NAN),
                        axis: Arc::new(params.frequency_axis(spectrum.len())),
                    });
                    vipa_params.push(params);
                    progress.increment();
                }
                None => {
                    log::warn!("calibration {} frame {}: transfer function fit failed, frame skipped", key, frame);
                    progress.add_total(-1);
                }
            }
        }

        let calibrated = vipa_params.len();
        model.set_vipa_params(key, vipa_params);
        model.set_frequencies(key, frequencies);

        if let Some(evaluation) = self.session.evaluation_model_mut() {
            evaluation.invalidate_results();
        }
        log::info!("calibration {}: {} of {} frames calibrated", key, calibrated, bundle.len());
        Ok(calibrated)
    }

    /// Forget fits, transfer functions and frequency axes of `key`.
    pub fn clear_calibration(&mut self, key: &str) {
        if let Some(model) = self.session.calibration_model_mut() {
            model.clear_fits(RegionKind::Brillouin, key);
            model.clear_fits(RegionKind::Rayleigh, key);
            model.clear_frequencies(key);
            model.clear_vipa_params(key);
        }
        if let Some(evaluation) = self.session.evaluation_model_mut() {
            evaluation.invalidate_results();
        }
    }

    /// Frequencies the calibration peaks of `key` are expected at in the
    /// `frame`-th calibrated frame.
    pub fn expected_frequencies(&self, key: &str, frame: usize) -> Option<Vec<f64>> {
        let setup = self.session.setup()?;
        let params = self.session.calibration_model()?.vipa_params(key).get(frame)?;
        Some(params.expected_frequencies(&setup.calibration.shifts, &setup.calibration.orders))
    }

    /// Find peaks and calibrate every calibration image of the current
    /// repetition. Images that fail are logged and skipped.
    pub fn calibrate_all(&mut self, params: &DetectionParams, progress: &Progress) -> Result<usize, EvalError> {
        let source = match (self.session.setup(), self.session.source()) {
            (Some(_), Some(source)) => source,
            _ => {
                progress.fail();
                return Err(EvalError::MissingPrerequisite("setup or spectrum source"));
            }
        };

        let mut calibrated = 0;
        for key in source.calibration_keys() {
            if let Err(e) = self.find_peaks(&key, params) {
                log::warn!("calibration {} skipped: {}", key, e);
                continue;
            }
            match self.calibrate(&key, progress) {
                Ok(frames) if frames > 0 => calibrated += 1,
                Ok(_) => log::warn!("calibration {}: no frame could be calibrated", key),
                Err(e) => log::warn!("calibration {} skipped: {}", key, e),
            }
        }
        Ok(calibrated)
    }
}
