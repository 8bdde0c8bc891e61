use std::fmt::Display;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use bmcore::algorithm::bounds::{translate_center_bounds, translate_fwhm_bounds, BoundPair, TranslatedBounds};
use bmcore::algorithm::lorentz::{fit_lorentz_region, FitBounds, PeakFit};
use bmcore::data::region::{Region, RegionKind};
use bmcore::data::spectrum::Spectrum;

use crate::data::calibration::CalibrationModel;
use crate::data::evaluation::{FitRecord, Quantity, ResultTensor, SpatialMap, TensorShape};
use crate::data::extraction::{ImageKind, SpectrumSource};
use crate::data::grid::{grid_size, indices_from_linear, key_from_indices};
use crate::error::EvalError;
use crate::progress::{CancelFlag, Progress};
use crate::session::{RepetitionModels, Session};

/// Derived values are refreshed every this many grid points during a run.
const DERIVED_VALUES_INTERVAL: usize = 10;

pub const AXIS_LABELS: [&str; 3] = ["x [µm]", "y [µm]", "z [µm]"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluationState {
    Idle,
    Initializing,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl Display for EvaluationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            EvaluationState::Idle => "idle",
            EvaluationState::Initializing => "initializing",
            EvaluationState::Running => "running",
            EvaluationState::Completed => "completed",
            EvaluationState::Aborted => "aborted",
            EvaluationState::Failed => "failed",
        };
        write!(f, "{}", state)
    }
}

/// Thread pool of one evaluation run, torn down when dropped.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Result<Self, EvalError> {
        let pool = ThreadPoolBuilder::new().num_threads(num_threads.max(1)).build()?;
        log::debug!("worker pool started with {} threads", pool.current_num_threads());
        Ok(WorkerPool { pool })
    }

    /// Two threads per available core.
    pub fn with_default_size() -> Result<Self, EvalError> {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        WorkerPool::new(2 * cores)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` on every task inside the pool. Blocks until all tasks are
    /// done, results come back in task order.
    pub fn map<T, R, F>(&self, tasks: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| tasks.par_iter().map(f).collect())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        log::debug!("worker pool with {} threads torn down", self.pool.current_num_threads());
    }
}

/// Fit of one region over all frames of a grid point.
#[derive(Clone, Debug)]
pub struct FitTask {
    pub kind: RegionKind,
    pub region_index: usize,
    pub region: Region,
    pub n_peaks: usize,
    /// Limits per frame, frames without an entry are fitted unbounded.
    pub bounds: Vec<FitBounds>,
}

impl FitTask {
    pub fn unbounded(kind: RegionKind, region_index: usize, region: Region, n_peaks: usize) -> Self {
        FitTask {
            kind,
            region_index,
            region,
            n_peaks,
            bounds: Vec::new(),
        }
    }

    /// One fit per frame, `PeakFit::missing` where a frame could not be
    /// fitted.
    pub fn run(&self, spectra: &[Spectrum], axes: &[Arc<Vec<f64>>]) -> Vec<PeakFit> {
        let unbounded = FitBounds::none();
        spectra
            .iter()
            .zip(axes)
            .enumerate()
            .map(|(frame, (spectrum, axis))| {
                let bounds = self.bounds.get(frame).unwrap_or(&unbounded);
                fit_lorentz_region(&self.region, axis, spectrum.values(), self.n_peaks, bounds).unwrap_or_else(|e| {
                    log::debug!("{} region {} frame {}: {}", self.kind, self.region_index, frame, e);
                    PeakFit::missing(self.n_peaks)
                })
            })
            .collect()
    }
}

fn field_quantities(kind: RegionKind) -> [Quantity; 4] {
    match kind {
        RegionKind::Brillouin => [
            Quantity::BrillouinPosition,
            Quantity::BrillouinFwhm,
            Quantity::BrillouinIntensity,
            Quantity::BrillouinOffset,
        ],
        RegionKind::Rayleigh => [
            Quantity::RayleighPosition,
            Quantity::RayleighFwhm,
            Quantity::RayleighIntensity,
            Quantity::RayleighOffset,
        ],
    }
}

/// Write the lobes of `fit` at peak indices `first_peak..`; the shared offset
/// goes to every one of them.
fn write_fit(results: &mut ResultTensor, kind: RegionKind, point: [usize; 3], frame: usize, region: usize, first_peak: usize, fit: &PeakFit) {
    let [position, fwhm, intensity, offset] = field_quantities(kind);
    let [x, y, z] = point;
    for k in 0..fit.n_peaks() {
        let index = [x, y, z, frame, region, first_peak + k];
        results.set(position, index, fit.centers[k]);
        results.set(fwhm, index, fit.fwhms[k]);
        results.set(intensity, index, fit.intensities[k]);
        results.set(offset, index, fit.offset);
    }
}

/// Settings and collaborators fixed for one evaluation run.
struct Run<'r> {
    source: &'r dyn SpectrumSource,
    resolution: [usize; 3],
    frames: usize,
    brillouin: Vec<Region>,
    rayleigh: Vec<Region>,
    n_peaks: usize,
    bounds_w0: Option<Vec<BoundPair>>,
    bounds_fwhm: Option<Vec<BoundPair>>,
    pool: WorkerPool,
}

impl Run<'_> {
    fn multi_peak_bounds(&self, rayleigh_positions: &[Vec<f64>], frames: usize) -> Vec<Vec<FitBounds>> {
        let translate = |bounds: &Option<Vec<BoundPair>>, f: fn(&[BoundPair], &[Region], &[Vec<f64>]) -> Option<TranslatedBounds>| {
            bounds.as_ref().and_then(|b| {
                let translated = f(b, &self.brillouin, rayleigh_positions);
                if translated.is_none() {
                    log::debug!("fewer than two Rayleigh references, multi-peak fit uses default bounds");
                }
                translated
            })
        };
        let centers = translate(&self.bounds_w0, translate_center_bounds);
        let fwhms = translate(&self.bounds_fwhm, translate_fwhm_bounds);

        (0..self.brillouin.len())
            .map(|region| {
                (0..frames)
                    .map(|frame| FitBounds {
                        center: centers.as_ref().and_then(|c| c.get(region)?.get(frame).cloned()),
                        fwhm: fwhms.as_ref().and_then(|w| w.get(region)?.get(frame).cloned()),
                    })
                    .collect()
            })
            .collect()
    }

    /// Extract, fit and store one grid point. Returns false if the point was
    /// skipped.
    fn evaluate_point(
        &self,
        index: usize,
        calibration: &CalibrationModel,
        results: &mut ResultTensor,
        drift_reference: &mut Option<Vec<Vec<f64>>>,
    ) -> bool {
        let (x, y, z) = indices_from_linear(self.resolution, index);
        let point = [x, y, z];
        let key = match key_from_indices(self.resolution, x, y, z) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("grid point {} skipped: {}", index, e);
                return false;
            }
        };

        let bundle = match self.source.get_spectra(ImageKind::Payload, &key, None) {
            Some(bundle) if !bundle.is_empty() => bundle,
            _ => {
                log::warn!("grid point {} skipped: no spectra", key);
                return false;
            }
        };

        for (frame, (&time, &intensity)) in bundle.times.iter().zip(&bundle.intensities).enumerate() {
            results.set(Quantity::Time, [x, y, z, frame, 0, 0], time);
            results.set(Quantity::Intensity, [x, y, z, frame, 0, 0], intensity);
        }

        let axes = match calibration.frequencies_by_time(&bundle.times) {
            Some(axes) => axes,
            None => {
                log::warn!("grid point {} skipped: no calibration", key);
                return false;
            }
        };
        let frames = bundle.len().min(axes.len()).min(self.frames);
        let spectra = &bundle.spectra[..frames];
        let axes = &axes[..frames];

        let tasks: Vec<FitTask> = self
            .brillouin
            .iter()
            .enumerate()
            .map(|(i, r)| FitTask::unbounded(RegionKind::Brillouin, i, *r, 1))
            .chain(
                self.rayleigh
                    .iter()
                    .enumerate()
                    .map(|(i, r)| FitTask::unbounded(RegionKind::Rayleigh, i, *r, 1)),
            )
            .collect();
        let fits = self.pool.map(&tasks, |task| task.run(spectra, axes));

        let mut rayleigh_positions = vec![Vec::new(); self.rayleigh.len()];
        for (task, frame_fits) in tasks.iter().zip(&fits) {
            for (frame, fit) in frame_fits.iter().enumerate() {
                write_fit(results, task.kind, point, frame, task.region_index, 0, fit);
            }
            if task.kind == RegionKind::Rayleigh {
                rayleigh_positions[task.region_index] = frame_fits.iter().map(|f| f.center()).collect();
            }
        }

        if self.n_peaks > 1 {
            let bounds = self.multi_peak_bounds(&rayleigh_positions, frames);
            let tasks: Vec<FitTask> = self
                .brillouin
                .iter()
                .zip(bounds)
                .enumerate()
                .map(|(i, (r, bounds))| FitTask {
                    kind: RegionKind::Brillouin,
                    region_index: i,
                    region: *r,
                    n_peaks: self.n_peaks,
                    bounds,
                })
                .collect();
            let fits = self.pool.map(&tasks, |task| task.run(spectra, axes));
            for (task, frame_fits) in tasks.iter().zip(&fits) {
                for (frame, fit) in frame_fits.iter().enumerate() {
                    write_fit(results, RegionKind::Brillouin, point, frame, task.region_index, 1, fit);
                }
            }
        }

        let observed = rayleigh_positions.iter().flatten().any(|p| !p.is_nan());
        if drift_reference.is_none() && observed {
            log::debug!("Rayleigh drift reference taken at grid point {}", key);
            *drift_reference = Some(rayleigh_positions.clone());
        }
        if let Some(reference) = drift_reference.as_ref() {
            for (region, positions) in rayleigh_positions.iter().enumerate() {
                for (frame, current) in positions.iter().enumerate() {
                    let first = reference
                        .get(region)
                        .and_then(|r| r.get(frame))
                        .copied()
                        .unwrap_or(f64::NAN);
                    results.set(Quantity::RayleighShift, [x, y, z, frame, region, 0], current - first);
                }
            }
        }

        log::debug!("grid point {} evaluated with {} frames", key, frames);
        true
    }
}

/// Values of one quantity on the scan grid, ready for display.
#[derive(Clone, Debug, PartialEq)]
pub struct DataView {
    pub values: SpatialMap,
    /// Stage coordinates along x, y and z.
    pub positions: [Vec<f64>; 3],
    /// Number of axes with more than one grid point.
    pub dimensionality: usize,
    pub labels: [&'static str; 3],
}

/// Runs the evaluation of the current repetition over the scan grid and
/// gives access to its results.
pub struct EvaluationController<'a> {
    session: &'a mut Session,
    state: EvaluationState,
}

impl<'a> EvaluationController<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        EvaluationController {
            session,
            state: EvaluationState::Idle,
        }
    }

    pub fn state(&self) -> EvaluationState {
        self.state
    }

    fn models_mut(&mut self) -> Result<&mut RepetitionModels, EvalError> {
        self.session
            .models_mut()
            .ok_or(EvalError::MissingPrerequisite("repetition"))
    }

    /// Number of Brillouin peaks fitted in multi-peak mode, at least 1.
    /// Takes effect with the next run.
    pub fn set_nr_brillouin_peaks(&mut self, nr_brillouin_peaks: usize) -> Result<(), EvalError> {
        self.models_mut()?.evaluation.set_nr_brillouin_peaks(nr_brillouin_peaks);
        Ok(())
    }

    /// Center bounds of the multi-peak fit, one pair per peak in GHz
    /// relative to the Rayleigh peaks.
    pub fn set_bounds(&mut self, bounds: Option<Vec<BoundPair>>) -> Result<(), EvalError> {
        self.models_mut()?.evaluation.set_bounds(bounds);
        Ok(())
    }

    pub fn set_bounds_fwhm(&mut self, bounds: Option<Vec<BoundPair>>) -> Result<(), EvalError> {
        self.models_mut()?.evaluation.set_bounds_fwhm(bounds);
        Ok(())
    }

    /// Evaluate every grid point of the current repetition.
    ///
    /// `progress.max_count` is set to the number of grid points and `count`
    /// grows by one per handled point. A cancelled run stops before the next
    /// point, keeps the partial results and sets `max_count` to `-1`.
    ///
    /// # Errors
    ///
    /// `MissingPrerequisite` if the repetition, its spectra or the payload
    /// of the first grid point are not available, and `WorkerPool` if no
    /// threads could be started. Both leave `max_count` at `-1`.
    pub fn evaluate(&mut self, cancel: &CancelFlag, progress: &Progress) -> Result<EvaluationState, EvalError> {
        self.state = EvaluationState::Initializing;

        let source = match self.session.source() {
            Some(source) if self.session.models().is_some() => source,
            _ => {
                self.state = EvaluationState::Failed;
                progress.fail();
                return Err(EvalError::MissingPrerequisite("spectrum source"));
            }
        };

        let resolution = source.resolution();
        let frames = key_from_indices(resolution, 0, 0, 0)
            .ok()
            .and_then(|key| source.get_spectra(ImageKind::Payload, &key, None))
            .map(|bundle| bundle.len())
            .unwrap_or(0);
        if frames == 0 {
            self.state = EvaluationState::Failed;
            progress.fail();
            return Err(EvalError::MissingPrerequisite("payload spectra"));
        }

        let pool = match WorkerPool::with_default_size() {
            Ok(pool) => pool,
            Err(e) => {
                self.state = EvaluationState::Failed;
                progress.fail();
                return Err(e);
            }
        };

        let RepetitionModels { calibration, peak_selection, evaluation } = match self.session.models_mut() {
            Some(models) => models,
            None => {
                self.state = EvaluationState::Failed;
                progress.fail();
                return Err(EvalError::MissingPrerequisite("repetition"));
            }
        };

        let run = Run {
            source: source.as_ref(),
            resolution,
            frames,
            brillouin: peak_selection.brillouin_regions().to_vec(),
            rayleigh: peak_selection.rayleigh_regions().to_vec(),
            n_peaks: evaluation.nr_brillouin_peaks(),
            bounds_w0: evaluation.bounds().map(|b| b.to_vec()),
            bounds_fwhm: evaluation.bounds_fwhm().map(|b| b.to_vec()),
            pool,
        };

        let points = grid_size(resolution);
        progress.set_total(points as i64);
        evaluation.initialize_results(TensorShape {
            resolution,
            frames,
            brillouin_regions: run.brillouin.len(),
            rayleigh_regions: run.rayleigh.len(),
            brillouin_peaks: run.n_peaks,
        });
        let mut drift_reference = None;
        let mut skipped = 0;

        log::info!(
            "evaluating {} grid points with {} frames, {} Brillouin and {} Rayleigh regions on {} threads",
            points,
            frames,
            run.brillouin.len(),
            run.rayleigh.len(),
            run.pool.num_threads()
        );
        self.state = EvaluationState::Running;

        for index in 0..points {
            if cancel.is_cancelled() {
                evaluation.calculate_derived_values();
                progress.fail();
                log::info!("evaluation aborted after {} of {} grid points", index, points);
                self.state = EvaluationState::Aborted;
                return Ok(self.state);
            }

            if !run.evaluate_point(index, calibration, &mut evaluation.results, &mut drift_reference) {
                skipped += 1;
            }
            progress.increment();

            if index % DERIVED_VALUES_INTERVAL == 0 {
                evaluation.calculate_derived_values();
            }
        }

        drop(run);
        evaluation.calculate_derived_values();
        log::info!("evaluation of {} grid points completed, {} skipped", points, skipped);
        self.state = EvaluationState::Completed;
        Ok(self.state)
    }

    /// Reduce `quantity` onto the scan grid, see
    /// [`EvaluationModel::spatial_map`](crate::data::evaluation::EvaluationModel::spatial_map)
    /// for the meaning of `peak_index`.
    pub fn get_data(&self, quantity: Quantity, peak_index: usize) -> Result<DataView, EvalError> {
        let evaluation = self
            .session
            .evaluation_model()
            .ok_or(EvalError::MissingPrerequisite("repetition"))?;
        let source = self.session.source();

        let resolution = match (&source, evaluation.results.shape()) {
            (Some(source), _) => source.resolution(),
            (None, Some(shape)) => shape.resolution,
            (None, None) => return Err(EvalError::MissingPrerequisite("spectrum source")),
        };
        let positions: [Vec<f64>; 3] = match &source {
            Some(source) => source.positions(),
            None => resolution.map(|n| (0..n).map(|i| i as f64).collect()),
        };

        Ok(DataView {
            values: evaluation.spatial_map(quantity, peak_index, resolution),
            positions,
            dimensionality: resolution.iter().filter(|&&n| n > 1).count(),
            labels: AXIS_LABELS,
        })
    }

    pub fn fits_at(&self, x: usize, y: usize, z: usize) -> Vec<FitRecord> {
        self.session
            .evaluation_model()
            .map(|evaluation| evaluation.fits_at(x, y, z))
            .unwrap_or_default()
    }
}
