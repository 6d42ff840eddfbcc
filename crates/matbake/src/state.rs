use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use baker::BakeReport;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the last `bake` run left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastRun {
    /// RFC 3339 local time the run finished.
    pub finished_at: String,
    pub scene: String,
    pub status: String,
    pub passes_completed: usize,
    pub passes_skipped: usize,
    pub warnings: usize,
}

impl LastRun {
    pub fn from_report(scene: &Path, report: &BakeReport) -> Self {
        Self {
            finished_at: chrono::Local::now().to_rfc3339(),
            scene: scene.display().to_string(),
            status: report.status.to_string(),
            passes_completed: report.passes_completed,
            passes_skipped: report.passes_skipped,
            warnings: report.warnings.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub last_run: Option<LastRun>,
}

impl AppState {
    /// Reads the state file; a file that was never written is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("cannot read state at {}", path.display()))
            }
        };
        toml::from_str(&contents)
            .with_context(|| format!("state at {} is not valid TOML", path.display()))
    }

    /// Replaces the recorded run and writes the state back.
    pub fn record_run(path: &Path, run: LastRun) -> Result<()> {
        let mut state = Self::load(path)?;
        state.last_run = Some(run);
        state.save(path)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create state directory {}", dir.display()))?;
        }
        let serialized = toml::to_string_pretty(self).context("cannot encode state as TOML")?;
        fs::write(path, serialized)
            .with_context(|| format!("cannot write state to {}", path.display()))?;
        debug!(path = %path.display(), "recorded run state");
        Ok(())
    }
}
