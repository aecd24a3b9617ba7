use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use watch_error::{Result, WatchError};
use watch_fingerprint::Fingerprint;

const BASELINE_LABEL: &str = "baseline";

/// Single-slot store for the last confirmed avatar fingerprint.
///
/// The slot only moves by whole replacement: the new value lands in a
/// sibling temp file and renames into place, so a crash leaves either
/// the old baseline or the new one, never a torn write.
pub struct BaselineStore {
    label: String,
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(path: &Path) -> Self {
        BaselineStore {
            label: BASELINE_LABEL.to_string(),
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored fingerprint. A missing slot is a first run; an
    /// empty or unreadable one logs a warning and reads the same way,
    /// and the next confirmed change rewrites it.
    pub fn load(&self) -> Result<Option<Fingerprint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            log::warn!("{} file {} is empty", self.label, self.path.display());
            return Ok(None);
        }
        match Fingerprint::from_str(trimmed) {
            Ok(fingerprint) => Ok(Some(fingerprint)),
            Err(err) => {
                log::warn!(
                    "{} file {} is unreadable ({err}), starting over",
                    self.label,
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    /// Replace the slot with a new fingerprint.
    pub fn replace(&self, fingerprint: &Fingerprint) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            WatchError::Path(format!("{} has no parent directory", self.path.display()))
        })?;
        fs::create_dir_all(parent)?;
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                WatchError::Path(format!("bad {} path {}", self.label, self.path.display()))
            })?;
        let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(10)
            .collect();
        let tmp_path = self.path.with_file_name(format!(".{file_name}.{suffix}"));

        fs::write(&tmp_path, format!("{fingerprint}\n"))?;
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(WatchError::Storage(
                self.label.clone(),
                format!("could not move new baseline into place: {err}"),
            ));
        }
        log::info!(
            "{} updated to {fingerprint} at {}",
            self.label,
            self.path.display()
        );
        Ok(())
    }
}

/// Compares the current avatar fingerprint against the stored
/// baseline. `is_update` is pure; the baseline only moves when the
/// caller commits, which must happen only after the avatar artifact is
/// safely on disk.
#[derive(Debug)]
pub struct ChangeDetector {
    prior: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new(prior: Option<Fingerprint>) -> Self {
        ChangeDetector { prior }
    }

    pub fn load(store: &BaselineStore) -> Result<Self> {
        Ok(ChangeDetector {
            prior: store.load()?,
        })
    }

    pub fn prior(&self) -> Option<&Fingerprint> {
        self.prior.as_ref()
    }

    /// A first run, with no baseline at all, always reads as an update.
    pub fn is_update(&self, current: &Fingerprint) -> bool {
        match &self.prior {
            None => true,
            Some(prior) => prior != current,
        }
    }

    /// Persist the confirmed fingerprint and adopt it as the new
    /// baseline.
    pub fn commit(&mut self, store: &BaselineStore, fingerprint: Fingerprint) -> Result<()> {
        store.replace(&fingerprint)?;
        self.prior = Some(fingerprint);
        Ok(())
    }
}
