//! The STONITH fencing hook: a would-be new active forcibly downs the
//! old active before assuming the role.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Error;

/// Outcome of invoking the fencing hook. `Absent` is treated as `Ok` for
/// state-machine purposes but logged differently, so it stays a
/// distinct variant rather than being collapsed before it reaches the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FencingOutcome {
    Ok,
    Absent,
    Failed,
}

/// Isolates the blocking `system("stonith ...")` call behind an interface
/// so tests can inject a deterministic fake.
#[async_trait]
pub trait FencingHook: Send + Sync {
    async fn fence(&self, target_host: &str) -> Result<FencingOutcome, Error>;
}

/// Invokes `<priv>/stonith <primary-host>`, capturing combined
/// stdout/stderr to `<home>/spool/stonith_out_err_fl_<host>_<pid>`, emitting
/// it once to the log, then removing the capture file.
pub struct ProcessFencingHook {
    stonith_path: PathBuf,
    spool_dir: PathBuf,
}

impl ProcessFencingHook {
    pub fn new(priv_dir: impl AsRef<Path>, home_dir: impl AsRef<Path>) -> Self {
        ProcessFencingHook {
            stonith_path: priv_dir.as_ref().join("stonith"),
            spool_dir: home_dir.as_ref().join("spool"),
        }
    }
}

#[async_trait]
impl FencingHook for ProcessFencingHook {
    async fn fence(&self, target_host: &str) -> Result<FencingOutcome, Error> {
        if tokio::fs::metadata(&self.stonith_path).await.is_err() {
            info!(stonith = %self.stonith_path.display(), "fencing script absent, treating as ok");
            return Ok(FencingOutcome::Absent);
        }

        tokio::fs::create_dir_all(&self.spool_dir).await?;
        let pid = std::process::id();
        let capture_path = self
            .spool_dir
            .join(format!("stonith_out_err_fl_{target_host}_{pid}"));

        let capture_file = std::fs::File::create(&capture_path)?;
        let capture_for_stderr = capture_file.try_clone()?;

        let status = tokio::process::Command::new(&self.stonith_path)
            .arg(target_host)
            .stdin(Stdio::null())
            .stdout(Stdio::from(capture_file))
            .stderr(Stdio::from(capture_for_stderr))
            .status()
            .await?;

        let captured = tokio::fs::read_to_string(&capture_path)
            .await
            .unwrap_or_default();
        tokio::fs::remove_file(&capture_path).await.ok();

        if status.success() {
            info!(target = %target_host, output = %captured, "fencing succeeded");
            Ok(FencingOutcome::Ok)
        } else {
            warn!(target = %target_host, output = %captured, code = ?status.code(), "fencing failed");
            Ok(FencingOutcome::Failed)
        }
    }
}

/// Deterministic fencing-hook fakes, kept outside `#[cfg(test)]` so both
/// this crate's own tests and `tests/` integration tests can inject them
/// (an interface so tests can inject a deterministic fake).
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A deterministic fake for retry scenarios such as fencing failing
    /// once or twice before succeeding.
    pub struct ScriptedFencingHook {
        outcomes: Vec<FencingOutcome>,
        calls: AtomicUsize,
    }

    impl ScriptedFencingHook {
        pub fn new(outcomes: Vec<FencingOutcome>) -> Self {
            ScriptedFencingHook {
                outcomes,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FencingHook for ScriptedFencingHook {
        async fn fence(&self, _target_host: &str) -> Result<FencingOutcome, Error> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .outcomes
                .get(idx)
                .copied()
                .unwrap_or(*self.outcomes.last().unwrap()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_script_is_ok_variant_absent() {
        let dir = tempfile::tempdir().unwrap();
        let hook = ProcessFencingHook::new(dir.path(), dir.path());
        let outcome = hook.fence("old-primary").await.unwrap();
        assert_eq!(outcome, FencingOutcome::Absent);
    }

    #[tokio::test]
    async fn scripted_hook_retries_until_ok() {
        let hook = test_support::ScriptedFencingHook::new(vec![
            FencingOutcome::Failed,
            FencingOutcome::Failed,
            FencingOutcome::Ok,
        ]);
        assert_eq!(hook.fence("h").await.unwrap(), FencingOutcome::Failed);
        assert_eq!(hook.fence("h").await.unwrap(), FencingOutcome::Failed);
        assert_eq!(hook.fence("h").await.unwrap(), FencingOutcome::Ok);
        assert_eq!(hook.call_count(), 3);
    }
}
