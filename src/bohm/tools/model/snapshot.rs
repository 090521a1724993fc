use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Element;

/// Store the change that triggered a snapshot originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// The authoring tool's project file.
    AuthoringTool,
    /// A collaborator spreadsheet.
    Schedule,
    /// A data migration.
    Migration,
}

/// `triggeredFrom` label recorded for each origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotLabels {
    pub authoring_tool: String,
    pub schedule: String,
    pub migration: String,
}

impl Default for SnapshotLabels {
    fn default() -> Self {
        Self {
            authoring_tool: "ArchiCAD".into(),
            schedule: "Schedule".into(),
            migration: "Migration".into(),
        }
    }
}

impl SnapshotLabels {
    pub fn label(&self, origin: SnapshotOrigin) -> &str {
        match origin {
            SnapshotOrigin::AuthoringTool => &self.authoring_tool,
            SnapshotOrigin::Schedule => &self.schedule,
            SnapshotOrigin::Migration => &self.migration,
        }
    }
}

/// Immutable copy of an element taken right before it is overwritten or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub id: Uuid,
    #[serde(flatten)]
    pub element: Element,
    pub triggered_from: String,
    pub triggered_from_detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ElementSnapshot {
    pub fn capture(
        element: &Element,
        triggered_from: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            element: element.clone(),
            triggered_from: triggered_from.into(),
            triggered_from_detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_default_to_the_store_conventions() {
        let labels = SnapshotLabels::default();
        assert_eq!(labels.label(SnapshotOrigin::AuthoringTool), "ArchiCAD");
        assert_eq!(labels.label(SnapshotOrigin::Schedule), "Schedule");

        let snapshot = ElementSnapshot::capture(&Element::new("G1"), "Review", "Schedule: Doors");
        let record = serde_json::to_value(&snapshot).expect("record");
        assert_eq!(record["triggeredFrom"], "Review");
        assert_eq!(record["guid"], "G1");
    }
}
