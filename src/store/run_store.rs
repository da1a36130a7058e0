use super::{RunDocument, RunLockGuard, RunLocks};
use crate::config::{Settings, StatePaths};
use crate::shared::errors::{io_error, RelayError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RunStore {
    paths: StatePaths,
    locks: RunLocks,
    lock_timeout: Duration,
    lock_poll: Duration,
}

/// Outcome of [`RunStore::settle`]; `forced` means the lock was bypassed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub document: RunDocument,
    pub forced: bool,
}

impl RunStore {
    pub fn new(paths: StatePaths, settings: &Settings) -> Self {
        Self {
            paths,
            locks: RunLocks::process_wide(),
            lock_timeout: settings.lock_timeout(),
            lock_poll: settings.lock_poll_interval(),
        }
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn create(&self, document: &RunDocument) -> Result<(), RelayError> {
        let _guard = self.lock(document.run_id.as_str())?;
        self.write(document)
    }

    pub fn read(&self, run_id: &str) -> Result<Option<RunDocument>, RelayError> {
        let path = self.paths.run_document_path(run_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&path, source)),
        };
        let document: RunDocument =
            serde_json::from_str(&raw).map_err(|source| RelayError::CorruptState {
                path: path.display().to_string(),
                source,
            })?;
        if document.run_id.as_str() != run_id {
            return Err(RelayError::RunIdMismatch {
                path: path.display().to_string(),
                found: document.run_id.to_string(),
            });
        }
        Ok(Some(document))
    }

    pub fn load(&self, run_id: &str) -> Result<RunDocument, RelayError> {
        self.read(run_id)?.ok_or_else(|| RelayError::RunNotFound {
            run_id: run_id.to_string(),
        })
    }

    pub fn update<F>(&self, run_id: &str, mutate: F) -> Result<RunDocument, RelayError>
    where
        F: FnOnce(&mut RunDocument) -> Result<(), RelayError>,
    {
        let _guard = self.lock(run_id)?;
        let mut document = self.load(run_id)?;
        mutate(&mut document)?;
        self.write(&document)?;
        Ok(document)
    }

    /// Records a run outcome that must not be lost. Lock timeouts and io
    /// failures are retried `attempts` times; after that the document is
    /// rewritten without the lock.
    pub fn settle<F>(&self, run_id: &str, attempts: usize, mut mutate: F) -> Result<Settled, RelayError>
    where
        F: FnMut(&mut RunDocument) -> Result<(), RelayError>,
    {
        for _ in 0..attempts {
            match self.update(run_id, &mut mutate) {
                Ok(document) => {
                    return Ok(Settled {
                        document,
                        forced: false,
                    })
                }
                Err(RelayError::LockTimeout { .. } | RelayError::Io { .. }) => {
                    thread::sleep(self.lock_poll);
                }
                Err(err) => return Err(err),
            }
        }
        let mut document = self.load(run_id)?;
        mutate(&mut document)?;
        self.write(&document)?;
        Ok(Settled {
            document,
            forced: true,
        })
    }

    fn lock(&self, run_id: &str) -> Result<RunLockGuard, RelayError> {
        self.locks
            .acquire(&self.paths, run_id, self.lock_timeout, self.lock_poll)
    }

    fn write(&self, document: &RunDocument) -> Result<(), RelayError> {
        let path = self.paths.run_document_path(document.run_id.as_str());
        let body = serde_json::to_vec_pretty(document).map_err(|source| RelayError::Encode {
            path: path.display().to_string(),
            source,
        })?;
        replace_file(&path, &body)
    }
}

/// Writes `body` beside `path` and renames it over `path`, so readers see the
/// old or the new content and never a partial file.
pub(crate) fn replace_file(path: &Path, body: &[u8]) -> Result<(), RelayError> {
    let Some(dir) = path.parent() else {
        return Err(io_error(path, std::io::Error::other("no parent directory")));
    };
    fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
    let staged = dir.join(format!(
        ".{}.{}.partial",
        path.file_name().and_then(|name| name.to_str()).unwrap_or("run"),
        uuid::Uuid::new_v4().simple()
    ));

    let written = fs::File::create_new(&staged).and_then(|mut file| {
        file.write_all(body)?;
        file.sync_all()
    });
    if let Err(source) = written.and_then(|()| fs::rename(&staged, path)) {
        let _ = fs::remove_file(&staged);
        return Err(io_error(path, source));
    }
    sync_directory(dir);
    Ok(())
}

#[cfg(unix)]
fn sync_directory(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) {}
