//! Writing produced files back to the output directory between runs.

use std::path::{Path, PathBuf};

use kiln_config::state::{BuildRecord, FileRecord, RecordedOutcome, TargetRecord};
use tracing::debug;

use crate::error::{EngineError, StoreError};
use crate::resolve::{Engine, Outcome};
use crate::store::validate_name;
use crate::target::{Target, TargetId};

/// Write every file of one completed target under `dir`.
///
/// Each file is written atomically. Returns the paths written.
///
/// # Errors
/// Returns an error if a file name would escape `dir` or a write fails.
pub fn persist_target(
    dir: &Path,
    id: TargetId,
    target: &dyn Target,
) -> Result<Vec<PathBuf>, EngineError> {
    let persist_err = |source: StoreError| EngineError::Persist {
        target: id.name().to_owned(),
        source,
    };

    let mut written = Vec::new();
    for file in target.files() {
        validate_name(&file.filename).map_err(persist_err)?;
        let path = dir.join(&file.filename);
        kiln_util::fs::write_atomic(&path, &file.data)
            .map_err(|e| persist_err(StoreError::Util(e)))?;
        debug!(asset = %id, path = %path.display(), "wrote output");
        written.push(path);
    }
    Ok(written)
}

/// Write the files of every target the engine completed, dependencies first.
///
/// # Errors
/// Returns the first persistence error.
pub fn persist_all(dir: &Path, engine: &Engine<'_>) -> Result<Vec<PathBuf>, EngineError> {
    let mut written = Vec::new();
    for (id, _, target) in engine.completed() {
        written.extend(persist_target(dir, id, target)?);
    }
    Ok(written)
}

/// Summarize a finished run as a build record.
pub fn build_record(engine: &Engine<'_>) -> BuildRecord {
    let targets = engine
        .completed()
        .map(|(id, outcome, target)| TargetRecord {
            name: id.name().to_owned(),
            outcome: match outcome {
                Outcome::Loaded => RecordedOutcome::Loaded,
                Outcome::Generated => RecordedOutcome::Generated,
            },
            files: target
                .files()
                .into_iter()
                .map(|file| FileRecord {
                    name: file.filename.clone(),
                    sha256: kiln_util::hash::sha256_bytes(&file.data),
                })
                .collect(),
        })
        .collect();
    BuildRecord { targets }
}

/// Summarize a finished run and write the record to `path`.
///
/// # Errors
/// Returns an error if the record cannot be serialized or written.
pub fn write_record(path: &Path, engine: &Engine<'_>) -> Result<BuildRecord, EngineError> {
    let record = build_record(engine);
    record.write_to(path)?;
    Ok(record)
}
