use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::write_json_atomic;
use crate::maintainer::RebuildStage;
use crate::IndexError;

/// Timing and size of one completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: RebuildStage,
    pub duration_ms: u64,
    pub items: Option<usize>,
}

/// Manifest of a complete, committed set of search indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub config_version: f64,
    pub file_name_prefix: String,
    pub completed_at: DateTime<Utc>,
    /// How the snapshot was produced: `rebuild` or `restore`.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub stages: Vec<StageReport>,
}

fn default_origin() -> String {
    "rebuild".to_string()
}

impl SnapshotInfo {
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IndexError::Snapshot(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| IndexError::Snapshot(format!("corrupt manifest {}: {e}", path.display())))
    }

    pub fn persist(&self, path: &Path) -> Result<(), IndexError> {
        write_json_atomic(path, self)
    }
}

/// Read access to the snapshot the service is currently allowed to serve.
///
/// Query dispatch consults this before every call to the toolkit so that no
/// query runs against a partially built index.
pub trait SnapshotGate: Send + Sync {
    fn serving(&self) -> Option<SnapshotInfo>;

    fn is_serving(&self) -> bool {
        self.serving().is_some()
    }
}
