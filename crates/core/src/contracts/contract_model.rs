//! Contract snapshot models held by the local cache and live sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Contract lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Sent,
    InProgress,
    Signed,
    Completed,
    Cancelled,
}

/// One document block. `content` is owned by the rendering layer and only
/// ever merged into, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Full state of one contract instance as last known to this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecordSnapshot {
    pub id: String,
    pub status: ContractStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub blocks: Vec<ContractBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Fields this engine does not model, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContractRecordSnapshot {
    pub fn block(&self, block_id: &str) -> Option<&ContractBlock> {
        self.blocks.iter().find(|block| block.id == block_id)
    }

    /// Merge `patch` into the content of block `block_id` (JSON merge patch:
    /// objects merge recursively, `null` removes a key, anything else
    /// replaces).
    pub fn apply_block_patch(&mut self, block_id: &str, patch: &serde_json::Value) -> Result<()> {
        let block = self
            .blocks
            .iter_mut()
            .find(|block| block.id == block_id)
            .ok_or_else(|| {
                Error::validation(format!(
                    "Block '{}' does not exist in contract '{}'",
                    block_id, self.id
                ))
            })?;
        merge_patch(&mut block.content, patch);
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_completed(&mut self) {
        let now = Utc::now();
        self.status = ContractStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = Some(now);
    }

    /// True when top-level JSON field `key` of this snapshot equals `value`.
    pub fn field_matches(&self, key: &str, value: &str) -> bool {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => match map.get(key) {
                Some(serde_json::Value::String(v)) => v == value,
                Some(serde_json::Value::Number(v)) => v.to_string() == value,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Snapshot plus the moment it was written to the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRecord {
    pub snapshot: ContractRecordSnapshot,
    pub cached_at: DateTime<Utc>,
}

impl CachedRecord {
    pub fn new(snapshot: ContractRecordSnapshot) -> Self {
        Self {
            snapshot,
            cached_at: Utc::now(),
        }
    }
}

/// Foreign-key names usable with `list_by_foreign_key`.
pub fn validate_foreign_key_name(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Unsupported foreign key name '{}'",
            key
        )))
    }
}

pub fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    let serde_json::Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(
                    target_map
                        .entry(key.clone())
                        .or_insert(serde_json::Value::Null),
                    value,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_snapshot() -> ContractRecordSnapshot {
        serde_json::from_value(json!({
            "id": "c-1",
            "status": "in_progress",
            "jobId": "job-9",
            "blocks": [
                { "id": "b-1", "type": "text", "content": { "text": "Scope", "style": { "bold": true } } },
                { "id": "b-2", "type": "signature", "content": null }
            ],
            "templateVersion": 4
        }))
        .expect("deserialize snapshot")
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.extra.get("templateVersion"), Some(&json!(4)));
        let value = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(value["templateVersion"], json!(4));
        assert_eq!(value["jobId"], json!("job-9"));
    }

    #[test]
    fn block_patch_merges_nested_objects() {
        let mut snapshot = sample_snapshot();
        snapshot
            .apply_block_patch("b-1", &json!({ "style": { "italic": true }, "text": "Scope v2" }))
            .expect("patch");
        assert_eq!(
            snapshot.block("b-1").map(|b| b.content.clone()),
            Some(json!({ "text": "Scope v2", "style": { "bold": true, "italic": true } }))
        );
        assert!(snapshot.updated_at.is_some());
    }

    #[test]
    fn block_patch_null_removes_key_and_fills_empty_block() {
        let mut snapshot = sample_snapshot();
        snapshot
            .apply_block_patch("b-1", &json!({ "style": null }))
            .expect("patch b-1");
        snapshot
            .apply_block_patch("b-2", &json!({ "signedBy": "A. Tech" }))
            .expect("patch b-2");
        assert_eq!(snapshot.block("b-1").map(|b| b.content.clone()), Some(json!({ "text": "Scope" })));
        assert_eq!(
            snapshot.block("b-2").map(|b| b.content.clone()),
            Some(json!({ "signedBy": "A. Tech" }))
        );
    }

    #[test]
    fn block_patch_rejects_unknown_block() {
        let mut snapshot = sample_snapshot();
        let err = snapshot
            .apply_block_patch("missing", &json!({ "text": "x" }))
            .expect_err("unknown block");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn field_matches_uses_wire_names() {
        let snapshot = sample_snapshot();
        assert!(snapshot.field_matches("jobId", "job-9"));
        assert!(snapshot.field_matches("templateVersion", "4"));
        assert!(!snapshot.field_matches("jobId", "job-1"));
        assert!(!snapshot.field_matches("job_id", "job-9"));
    }

    #[test]
    fn foreign_key_names_are_restricted() {
        assert!(validate_foreign_key_name("jobId").is_ok());
        assert!(validate_foreign_key_name("customer_id").is_ok());
        assert!(validate_foreign_key_name("").is_err());
        assert!(validate_foreign_key_name("a.b").is_err());
        assert!(validate_foreign_key_name("x') OR 1=1").is_err());
    }
}
