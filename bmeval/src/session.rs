use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bincode::{Decode, Encode};

use crate::data::calibration::CalibrationModel;
use crate::data::evaluation::EvaluationModel;
use crate::data::extraction::SpectrumSource;
use crate::data::peak_selection::PeakSelectionModel;
use crate::data::setup::Setup;
use crate::error::EvalError;

/// zstd level used for session files.
const COMPRESSION_LEVEL: i32 = 3;

/// Models of one repetition of a measurement.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode)]
pub struct RepetitionModels {
    pub calibration: CalibrationModel,
    pub peak_selection: PeakSelectionModel,
    pub evaluation: EvaluationModel,
}

#[derive(Encode, Decode)]
struct SessionFile {
    setup: Option<Setup>,
    current: Option<String>,
    repetitions: BTreeMap<String, RepetitionModels>,
}

/// Working state of an analysis, owned by the caller and handed to the
/// controllers.
///
/// Spectrum sources are attached per repetition and are not persisted.
#[derive(Default)]
pub struct Session {
    setup: Option<Setup>,
    current: Option<String>,
    repetitions: BTreeMap<String, RepetitionModels>,
    sources: BTreeMap<String, Arc<dyn SpectrumSource>>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn with_setup(setup: Setup) -> Self {
        Session {
            setup: Some(setup),
            ..Session::default()
        }
    }

    pub fn setup(&self) -> Option<&Setup> {
        self.setup.as_ref()
    }

    pub fn set_setup(&mut self, setup: Setup) {
        self.setup = Some(setup);
    }

    /// Registers a repetition with its spectrum source. Existing models of
    /// the repetition are kept, the first repetition becomes current.
    pub fn add_repetition(&mut self, key: &str, source: Arc<dyn SpectrumSource>) {
        self.repetitions.entry(key.to_string()).or_default();
        self.sources.insert(key.to_string(), source);
        if self.current.is_none() {
            self.current = Some(key.to_string());
        }
    }

    /// Attaches a source to a repetition restored from a session file.
    pub fn attach_source(&mut self, key: &str, source: Arc<dyn SpectrumSource>) -> Result<(), EvalError> {
        if !self.repetitions.contains_key(key) {
            return Err(EvalError::MissingPrerequisite("repetition"));
        }
        self.sources.insert(key.to_string(), source);
        Ok(())
    }

    pub fn set_current_repetition(&mut self, key: &str) -> Result<(), EvalError> {
        if !self.repetitions.contains_key(key) {
            return Err(EvalError::MissingPrerequisite("repetition"));
        }
        self.current = Some(key.to_string());
        Ok(())
    }

    pub fn current_repetition(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn repetition_keys(&self) -> Vec<String> {
        self.repetitions.keys().cloned().collect()
    }

    /// Spectrum source of the current repetition.
    pub fn source(&self) -> Option<Arc<dyn SpectrumSource>> {
        self.sources.get(self.current.as_deref()?).cloned()
    }

    pub fn models(&self) -> Option<&RepetitionModels> {
        self.repetitions.get(self.current.as_deref()?)
    }

    pub fn models_mut(&mut self) -> Option<&mut RepetitionModels> {
        let key = self.current.as_deref()?;
        self.repetitions.get_mut(key)
    }

    pub fn calibration_model(&self) -> Option<&CalibrationModel> {
        self.models().map(|m| &m.calibration)
    }

    pub fn calibration_model_mut(&mut self) -> Option<&mut CalibrationModel> {
        self.models_mut().map(|m| &mut m.calibration)
    }

    pub fn peak_selection_model(&self) -> Option<&PeakSelectionModel> {
        self.models().map(|m| &m.peak_selection)
    }

    pub fn peak_selection_model_mut(&mut self) -> Option<&mut PeakSelectionModel> {
        self.models_mut().map(|m| &mut m.peak_selection)
    }

    pub fn evaluation_model(&self) -> Option<&EvaluationModel> {
        self.models().map(|m| &m.evaluation)
    }

    pub fn evaluation_model_mut(&mut self) -> Option<&mut EvaluationModel> {
        self.models_mut().map(|m| &mut m.evaluation)
    }

    /// Removes all repetitions and sources, keeps the setup.
    pub fn clear(&mut self) {
        self.current = None;
        self.repetitions.clear();
        self.sources.clear();
    }

    /// Writes setup and models of all repetitions to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), EvalError> {
        let file = SessionFile {
            setup: self.setup.clone(),
            current: self.current.clone(),
            repetitions: self.repetitions.clone(),
        };
        let encoded = bincode::encode_to_vec(&file, bincode::config::standard())?;
        let compressed = zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL)?;
        fs::write(path.as_ref(), compressed)?;
        log::info!("session saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Restores a session written by [`Session::save`], without sources.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Session, EvalError> {
        let compressed = fs::read(path.as_ref())?;
        let encoded = zstd::decode_all(compressed.as_slice())?;
        let (file, _): (SessionFile, usize) = bincode::decode_from_slice(&encoded, bincode::config::standard())?;
        log::info!(
            "session loaded from {} with {} repetitions",
            path.as_ref().display(),
            file.repetitions.len()
        );
        Ok(Session {
            setup: file.setup,
            current: file.current,
            repetitions: file.repetitions,
            sources: BTreeMap::new(),
        })
    }
}

/// Session file belonging to a data file: `name.h5` → `name.session.bin`.
pub fn session_file_name<P: AsRef<Path>>(data_file: P) -> PathBuf {
    let path = data_file.as_ref();
    let stem = match path.extension() {
        Some(ext) if ext == "h5" => path.with_extension(""),
        _ => path.to_path_buf(),
    };
    let mut name = stem.into_os_string();
    name.push(".session.bin");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::extraction::InMemorySource;

    #[test]
    fn test_session_file_name() {
        assert_eq!(session_file_name("data/scan.h5"), PathBuf::from("data/scan.session.bin"));
        assert_eq!(session_file_name("scan.raw"), PathBuf::from("scan.raw.session.bin"));
    }

    #[test]
    fn test_repetitions() {
        let mut session = Session::new();
        assert!(session.models().is_none());
        assert!(session.source().is_none());

        session.add_repetition("0", Arc::new(InMemorySource::new([1, 1, 1])));
        session.add_repetition("1", Arc::new(InMemorySource::new([2, 1, 1])));
        assert_eq!(session.current_repetition(), Some("0"));
        assert_eq!(session.source().unwrap().resolution(), [1, 1, 1]);

        session.set_current_repetition("1").unwrap();
        assert_eq!(session.source().unwrap().resolution(), [2, 1, 1]);
        assert!(session.set_current_repetition("7").is_err());

        session.evaluation_model_mut().unwrap().set_nr_brillouin_peaks(3);
        session.set_current_repetition("0").unwrap();
        assert_eq!(session.evaluation_model().unwrap().nr_brillouin_peaks(), 1);
        assert_eq!(session.repetition_keys(), vec!["0".to_string(), "1".to_string()]);
    }
}
