// ModelRepository: keyed model storage with a "current model" slot
//
// Every successful training run saves a new artifact under its own id and then
// moves the current pointer. Prediction only ever reads the current slot. The
// slot is guarded by an RwLock: writers hold it while persisting, readers while
// loading, so a reader never sees a half-written pointer. Only the newest
// `retain` artifacts are kept; older ones are pruned after each save.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{log_model_error, ModelError};
use crate::model::Model;

/// Name of the pointer file holding the current model id
const CURRENT_POINTER: &str = "current";

/// Artifacts kept on disk (and models kept in memory) by default
pub const DEFAULT_RETAINED_MODELS: usize = 3;

/// Storage of trained models
pub trait ModelRepository: Send + Sync {
    /// Persist `model` and make it the current model
    fn save(&self, model: &Model) -> Result<(), ModelError>;

    /// Load the current model
    ///
    /// # Errors
    /// `ModelError::NotFound` when nothing has been saved yet
    fn load_current(&self) -> Result<Model, ModelError>;

    /// Id of the current model, if any
    fn current_id(&self) -> Result<Option<String>, ModelError>;

    fn has_current(&self) -> bool {
        matches!(self.current_id(), Ok(Some(_)))
    }
}

/// File-backed repository: `<dir>/<id>.json` plus a `current` pointer file
pub struct FileModelRepository {
    dir: PathBuf,
    retain: usize,
    slot: RwLock<()>,
}

impl FileModelRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retain: DEFAULT_RETAINED_MODELS,
            slot: RwLock::new(()),
        }
    }

    /// Keep at most `retain` artifacts (never fewer than the current one)
    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn read_slot(&self) -> Result<RwLockReadGuard<'_, ()>, ModelError> {
        self.slot.read().map_err(|_| ModelError::LockPoisoned)
    }

    fn write_slot(&self) -> Result<RwLockWriteGuard<'_, ()>, ModelError> {
        self.slot.write().map_err(|_| ModelError::LockPoisoned)
    }

    /// Write via a temp file and rename, so the target is never partial
    fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ModelError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_pointer(&self) -> Result<Option<String>, ModelError> {
        match fs::read_to_string(self.dir.join(CURRENT_POINTER)) {
            Ok(contents) => {
                let id = contents.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete all but the newest `retain` artifacts; `current` is always kept
    ///
    /// Failures are logged and otherwise ignored: the save already succeeded.
    fn prune(&self, current: &str) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("[ModelRepository] Cannot list {}: {}", self.dir.display(), err);
                return;
            }
        };

        let mut artifacts: Vec<((u64, u64), String)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_suffix(".json")?.to_string();
                Some((artifact_order(&id)?, id))
            })
            .filter(|(_, id)| id != current)
            .collect();

        artifacts.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (_, id) in artifacts.into_iter().skip(self.retain - 1) {
            let path = self.artifact_path(&id);
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("[ModelRepository] Pruned {}", id),
                Err(err) => log::warn!("[ModelRepository] Cannot prune {}: {}", path.display(), err),
            }
        }
    }
}

/// Sort key of a `model-<millis>-<seq>` id; `None` for foreign files
fn artifact_order(id: &str) -> Option<(u64, u64)> {
    let mut parts = id.strip_prefix("model-")?.splitn(2, '-');
    let millis = parts.next()?.parse().ok()?;
    let sequence = parts.next()?.parse().ok()?;
    Some((millis, sequence))
}

impl ModelRepository for FileModelRepository {
    fn save(&self, model: &Model) -> Result<(), ModelError> {
        let _guard = self.write_slot()?;

        let result = (|| -> Result<(), ModelError> {
            fs::create_dir_all(&self.dir)?;
            let json = serde_json::to_vec(model)?;
            Self::write_atomic(&self.artifact_path(model.id()), &json)?;
            Self::write_atomic(&self.dir.join(CURRENT_POINTER), model.id().as_bytes())
        })();

        match &result {
            Ok(()) => {
                log::info!(
                    "[ModelRepository] Saved {} to {} (accuracy {:.3})",
                    model.id(),
                    self.dir.display(),
                    model.accuracy()
                );
                self.prune(model.id());
            }
            Err(err) => log_model_error(err, "save_model"),
        }
        result
    }

    fn load_current(&self) -> Result<Model, ModelError> {
        let _guard = self.read_slot()?;

        let id = self.read_pointer()?.ok_or_else(|| ModelError::NotFound {
            location: self.dir.display().to_string(),
        })?;

        let bytes = fs::read(self.artifact_path(&id)).map_err(|err| ModelError::Persistence {
            details: format!("current model {} unreadable: {}", id, err),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn current_id(&self) -> Result<Option<String>, ModelError> {
        let _guard = self.read_slot()?;
        self.read_pointer()
    }
}

/// In-memory repository for tests and short-lived sessions
///
/// Holds the newest `retain` models; the last one is current.
pub struct InMemoryModelRepository {
    models: RwLock<Vec<Model>>,
    retain: usize,
}

impl Default for InMemoryModelRepository {
    fn default() -> Self {
        Self {
            models: RwLock::new(Vec::new()),
            retain: DEFAULT_RETAINED_MODELS,
        }
    }
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    /// Number of models currently held
    pub fn len(&self) -> usize {
        self.models.read().map(|models| models.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelRepository for InMemoryModelRepository {
    fn save(&self, model: &Model) -> Result<(), ModelError> {
        let mut models = self.models.write().map_err(|_| ModelError::LockPoisoned)?;
        models.push(model.clone());
        let excess = models.len().saturating_sub(self.retain);
        models.drain(..excess);
        Ok(())
    }

    fn load_current(&self) -> Result<Model, ModelError> {
        let models = self.models.read().map_err(|_| ModelError::LockPoisoned)?;
        models.last().cloned().ok_or_else(|| ModelError::NotFound {
            location: "memory".to_string(),
        })
    }

    fn current_id(&self) -> Result<Option<String>, ModelError> {
        let models = self.models.read().map_err(|_| ModelError::LockPoisoned)?;
        Ok(models.last().map(|model| model.id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::fitted_model;
    use tempfile::TempDir;

    #[test]
    fn test_file_repository_starts_empty() {
        let dir = TempDir::new().unwrap();
        let repo = FileModelRepository::new(dir.path().join("models"));

        assert_eq!(repo.current_id().unwrap(), None);
        assert!(!repo.has_current());
        assert!(matches!(
            repo.load_current(),
            Err(ModelError::NotFound { .. })
        ));
    }

    #[test]
    fn test_file_repository_save_replaces_current() {
        let dir = TempDir::new().unwrap();
        let repo = FileModelRepository::new(dir.path().join("models"));

        let first = fitted_model();
        let second = fitted_model();
        repo.save(&first).unwrap();
        repo.save(&second).unwrap();

        assert_eq!(repo.current_id().unwrap().as_deref(), Some(second.id()));
        let loaded = repo.load_current().unwrap();
        assert_eq!(loaded.id(), second.id());
        assert_eq!(loaded.classes(), second.classes());

        // Older artifacts are kept under their own ids
        assert!(repo.dir().join(format!("{}.json", first.id())).exists());
        assert!(!repo.dir().join("current.tmp").exists());
    }

    #[test]
    fn test_file_repository_prunes_beyond_retention() {
        let dir = TempDir::new().unwrap();
        let repo = FileModelRepository::new(dir.path()).with_retention(2);
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let models: Vec<Model> = (0..4).map(|_| fitted_model()).collect();
        for model in &models {
            repo.save(model).unwrap();
        }

        let artifact = |model: &Model| dir.path().join(format!("{}.json", model.id()));
        assert!(!artifact(&models[0]).exists());
        assert!(!artifact(&models[1]).exists());
        assert!(artifact(&models[2]).exists());
        assert!(artifact(&models[3]).exists());
        assert!(dir.path().join("notes.json").exists());
        assert_eq!(repo.load_current().unwrap().id(), models[3].id());
    }

    #[test]
    fn test_artifact_order_parses_model_ids() {
        assert_eq!(artifact_order("model-1700000000000-0012"), Some((1_700_000_000_000, 12)));
        assert_eq!(artifact_order("notes"), None);
        assert_eq!(artifact_order("model-abc-1"), None);
    }

    #[test]
    fn test_file_repository_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let model = fitted_model();
        FileModelRepository::new(dir.path()).save(&model).unwrap();

        let reopened = FileModelRepository::new(dir.path());
        assert_eq!(reopened.load_current().unwrap().id(), model.id());
    }

    #[test]
    fn test_dangling_pointer_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_POINTER), "model-missing").unwrap();

        let repo = FileModelRepository::new(dir.path());
        assert!(matches!(
            repo.load_current(),
            Err(ModelError::Persistence { .. })
        ));
    }

    #[test]
    fn test_in_memory_repository_tracks_latest() {
        let repo = InMemoryModelRepository::new();
        assert!(repo.is_empty());
        assert!(matches!(
            repo.load_current(),
            Err(ModelError::NotFound { .. })
        ));

        let model = fitted_model();
        repo.save(&model).unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.current_id().unwrap().as_deref(), Some(model.id()));
        assert_eq!(repo.load_current().unwrap(), model);
    }

    #[test]
    fn test_in_memory_repository_keeps_newest_only() {
        let repo = InMemoryModelRepository::new().with_retention(2);
        let models: Vec<Model> = (0..5).map(|_| fitted_model()).collect();
        for model in &models {
            repo.save(model).unwrap();
        }

        assert_eq!(repo.len(), 2);
        assert_eq!(repo.current_id().unwrap().as_deref(), Some(models[4].id()));
    }
}
