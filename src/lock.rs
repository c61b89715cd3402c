//! Single-run lock backed by a marker file.
//!
//! Presence of the file plus its modification time is the whole protocol:
//! a marker younger than the staleness threshold means another run is
//! active, an older one was left behind by a crashed run and is reclaimed.
use chrono::{DateTime, Duration, Utc};
use log::*;
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::{BuildBotError, Result};

/// Source of the current time, injectable so staleness can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct LockManager {
    path: PathBuf,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self::with_clock(path, stale_after, Arc::new(SystemClock))
    }

    pub fn with_clock(
        path: impl Into<PathBuf>,
        stale_after: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            path: path.into(),
            stale_after,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the lock, reclaiming a stale marker. Fails with
    /// [`BuildBotError::AlreadyRunning`] while a fresh marker exists.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        if let Some(age) = self.marker_age()? {
            if age < self.stale_after {
                return Err(BuildBotError::AlreadyRunning {
                    path: self.path.clone(),
                    age_minutes: age.num_minutes(),
                });
            }

            warn!(
                "reclaiming stale lock {} ({} minutes old)",
                self.path.display(),
                age.num_minutes()
            );
            // removing first guarantees a fresh mtime on the new marker
            self.remove_marker()?;
        }

        self.create_marker()?;
        debug!("acquired lock {}", self.path.display());

        Ok(LockGuard {
            manager: self,
            released: false,
        })
    }

    /// Deletes the marker unconditionally.
    pub fn release(&self) -> Result<()> {
        self.remove_marker()?;
        debug!("released lock {}", self.path.display());
        Ok(())
    }

    fn marker_age(&self) -> Result<Option<Duration>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let created: DateTime<Utc> = metadata.modified()?.into();

        Ok(Some(self.clock.now() - created))
    }

    /// Creates the marker holding this process id. Losing the race to
    /// another run that created it first is contention.
    fn create_marker(&self) -> Result<()> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(BuildBotError::AlreadyRunning {
                    path: self.path.clone(),
                    age_minutes: 0,
                });
            }
            Err(err) => return Err(err.into()),
        };

        writeln!(file, "{}", std::process::id())?;

        Ok(())
    }

    fn remove_marker(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Live lock token. Released explicitly with [`LockGuard::release`], or on
/// drop for every other exit path.
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    released: bool,
}

impl LockGuard<'_> {
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(err) = self.manager.release()
        {
            error!("failed to release lock: {err}");
        }
    }
}
