use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::model::{ClassificationRecord, ProjectKey, SnapshotLabels, SnapshotOrigin};
use crate::bohm::tools::reconcile::UpdatePolicy;

/// Project field used to look a project up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectIdentity {
    #[default]
    Name,
    Code,
}

impl ProjectIdentity {
    pub fn key(self, value: impl Into<String>) -> ProjectKey {
        match self {
            Self::Name => ProjectKey::Name(value.into()),
            Self::Code => ProjectKey::Code(value.into()),
        }
    }
}

/// Process settings for a sync run.
///
/// Every field has a default, so a settings file only needs the values it
/// changes:
///
/// ```json
/// { "projectIdentity": "code", "updateFields": "name-only", "cooldownMs": 0 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    pub project_identity: ProjectIdentity,
    /// Fields overwritten when the authoring tool updates an existing element.
    pub update_fields: UpdatePolicy,
    /// Maximum rows per spreadsheet write batch.
    pub batch_size: usize,
    /// Pause between sheet-group writes, in milliseconds.
    pub cooldown_ms: u64,
    /// Rewrite every data row of existing schedules instead of patching cells.
    pub full_resync: bool,
    /// Classification assigned when no refinement applies.
    pub default_classification: ClassificationRecord,
    /// `triggeredFrom` labels written on element snapshots.
    pub snapshot_labels: SnapshotLabels,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            project_identity: ProjectIdentity::default(),
            update_fields: UpdatePolicy::default(),
            batch_size: 1000,
            cooldown_ms: 5000,
            full_resync: false,
            default_classification: ClassificationRecord::new("Ss__01", "Systems"),
            snapshot_labels: SnapshotLabels::default(),
        }
    }
}

impl SyncSettings {
    /// Loads settings from a JSON file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) if !path.exists() => return Err(ToolError::MissingInput(path.to_path_buf())),
            Some(path) => {
                let source = fs::read_to_string(path)?;
                serde_json::from_str(&source)
                    .map_err(|err| ToolError::Configuration(format!("{}: {err}", path.display())))?
            }
            None => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ToolError::Configuration("batchSize must be at least 1".into()));
        }
        if self.default_classification.code.trim().is_empty() {
            return Err(ToolError::Configuration(
                "defaultClassification needs a code".into(),
            ));
        }
        Ok(())
    }

    pub fn snapshot_label(&self, origin: SnapshotOrigin) -> &str {
        self.snapshot_labels.label(origin)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}
