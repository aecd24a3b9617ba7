use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use watch_error::{Result, WatchError};

/// A lock file older than this belongs to a crashed run and may be
/// broken.
const STALE_AFTER: Duration = Duration::from_secs(600);

/// Advisory lock serializing whole runs. Scheduled invocations overlap
/// when a page renders slowly; a second run must not interleave its
/// baseline and ledger writes with the first.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock, breaking a stale one once.
    pub fn acquire(path: &Path) -> Result<Self> {
        match Self::try_create(path) {
            Ok(lock) => Ok(lock),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if is_stale(path) {
                    log::warn!("breaking stale run lock at {}", path.display());
                    let _ = fs::remove_file(path);
                    Self::try_create(path).map_err(|err| {
                        WatchError::Storage("run lock".to_string(), err.to_string())
                    })
                } else {
                    Err(WatchError::Storage(
                        "run lock".to_string(),
                        format!("another run holds {}", path.display()),
                    ))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<RunLock> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(RunLock {
            path: path.to_path_buf(),
        })
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
