//! Filesystem-based health signals: the liveness file touched by
//! whichever server is active, and the active-marker file the secondary
//! drops when it takes over.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Error;

/// `<priv>/svrlive` — touched every `HANDSHAKE_PERIOD` by the active
/// server, read by the standby as a heartbeat independent of the control
/// channel.
pub struct LivenessFile {
    path: PathBuf,
}

impl LivenessFile {
    pub fn new(priv_dir: impl AsRef<Path>) -> Self {
        LivenessFile {
            path: priv_dir.as_ref().join("svrlive"),
        }
    }

    /// Touches the file's mtime. Creates it if absent. Permission or
    /// missing-directory failures are transient I/O — the caller decides
    /// what "unknown, wait and retry" means for its own state.
    pub async fn touch(&self) -> Result<(), Error> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.set_modified(SystemTime::now())?;
            Ok::<(), std::io::Error>(())
        })
        .await
        .map_err(|join_err| Error::fatal(format!("liveness touch task panicked: {join_err}")))??;
        Ok(())
    }

    /// Returns the current mtime, or `Ok(None)` if the file does not exist
    /// yet (treated identically to a transient miss by callers).
    pub async fn stat_mtime(&self) -> Result<Option<SystemTime>, Error> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// A reader's view of the liveness file: it must compare successive
/// observed mtimes, never the absolute value against local time, because
/// the writer and reader clocks may be skewed.
#[derive(Debug, Clone, Default)]
pub struct LivenessObserver {
    last_seen: Option<SystemTime>,
}

/// What changed (or didn't) between two observations of the liveness file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessChange {
    /// The file doesn't exist (yet, or was removed).
    Absent,
    /// The mtime moved forward since the last observation.
    Advanced,
    /// The mtime is unchanged since the last observation.
    Stagnant,
}

impl LivenessObserver {
    /// Records a freshly-read mtime and classifies the change relative to
    /// the last one this observer saw.
    pub fn observe(&mut self, mtime: Option<SystemTime>) -> LivenessChange {
        let change = match (mtime, self.last_seen) {
            (None, _) => LivenessChange::Absent,
            (Some(new), Some(old)) if new > old => LivenessChange::Advanced,
            (Some(_), Some(_)) => LivenessChange::Stagnant,
            (Some(_), None) => LivenessChange::Advanced,
        };
        if mtime.is_some() {
            self.last_seen = mtime;
        }
        change
    }
}

/// `<priv>/secondary_active` — created by the secondary on promotion,
/// removed on primary reclaim, and on any other transition that
/// surrenders active role.
pub struct ActiveMarker {
    path: PathBuf,
}

impl ActiveMarker {
    pub fn new(priv_dir: impl AsRef<Path>) -> Self {
        ActiveMarker {
            path: priv_dir.as_ref().join("secondary_active"),
        }
    }

    /// Truncate-and-write the secondary's hostname.
    pub async fn create(&self, secondary_host: &str) -> Result<(), Error> {
        tokio::fs::write(&self.path, secondary_host.as_bytes()).await?;
        Ok(())
    }

    /// Returns the recorded hostname if the marker exists.
    pub async fn read(&self) -> Result<Option<String>, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents.trim_end_matches('\n').to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self) -> Result<bool, Error> {
        Ok(self.read().await?.is_some())
    }

    /// Removes the marker. Idempotent: a missing marker is not an error.
    pub async fn remove(&self) -> Result<(), Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
