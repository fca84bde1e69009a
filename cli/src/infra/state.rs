//! Infrastructure implementation of the `StateStore` port.
//!
//! `StateManager` keeps `bbl-state.json` in the state directory, using
//! `tokio::task::spawn_blocking` for file I/O and an atomic write (temp file
//! in the same directory + rename) so an interrupted write never leaves a
//! truncated document behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::StateStore;
use crate::domain::state::{STATE_VERSION, State};
use crate::domain::BblError;

pub const STATE_FILE: &str = "bbl-state.json";
/// Name used by releases before the state file was renamed.
pub const LEGACY_STATE_FILE: &str = "state.json";

/// State file manager for one state directory.
#[derive(Debug, Clone)]
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Synchronous load — used by `load` via `spawn_blocking`.
    fn load_sync(&self) -> Result<Option<State>> {
        let path = self.path();
        let legacy = self.dir.join(LEGACY_STATE_FILE);
        if !path.exists() && legacy.exists() {
            std::fs::rename(&legacy, &path).with_context(|| {
                format!("renaming {} to {}", legacy.display(), path.display())
            })?;
            tracing::debug!(from = %legacy.display(), to = %path.display(), "renamed legacy state file");
        }
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading state file {}", path.display()))?;
        let document: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", path.display()))?;
        // Checked before the typed parse so documents from other schema
        // generations fail with a version error rather than a field error.
        let version = document
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if version < u64::from(STATE_VERSION) {
            return Err(BblError::Incompatible.into());
        }
        if version > u64::from(STATE_VERSION) {
            return Err(BblError::NewerState(u32::try_from(version).unwrap_or(u32::MAX)).into());
        }
        let state: State = serde_json::from_value(document)
            .with_context(|| format!("parsing state file {}", path.display()))?;
        Ok(Some(state))
    }

    /// Synchronous save — used by `write` via `spawn_blocking`.
    fn write_sync(&self, state: &State) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating directory {}", self.dir.display()))?;
        let mut state = state.clone();
        state.version = STATE_VERSION;
        let content = serde_json::to_string_pretty(&state).context("serializing state")?;

        let path = self.path();
        let temp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        std::fs::write(temp.path(), content)
            .with_context(|| format!("writing temp file {}", temp.path().display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o644))
                .with_context(|| format!("setting permissions on {}", temp.path().display()))?;
        }

        temp.persist(&path)
            .with_context(|| format!("finalizing state file {}", path.display()))?;
        Ok(())
    }

    fn remove_sync(&self) -> Result<()> {
        let path = self.path();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing state file {}", path.display())),
        }
    }
}

impl StateStore for StateManager {
    async fn load(&self) -> Result<Option<State>> {
        let mgr = self.clone();
        tokio::task::spawn_blocking(move || mgr.load_sync())
            .await
            .context("state load task panicked")?
    }

    async fn write(&self, state: &State) -> Result<()> {
        let mgr = self.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || mgr.write_sync(&state))
            .await
            .context("state save task panicked")?
    }

    async fn remove(&self) -> Result<()> {
        let mgr = self.clone();
        tokio::task::spawn_blocking(move || mgr.remove_sync())
            .await
            .context("state remove task panicked")?
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}
