//! Operator-facing view of a delta.

use serde::{Deserialize, Serialize};
use tandem_protocol::{DeltaSummary, Record, RecordUpdate, SyncDelta, UpdateKind};

/// Sample entries shown per list.
pub const PLAN_SAMPLE_SIZE: usize = 5;

/// Longest text excerpt shown per entry.
const EXCERPT_CHARS: usize = 60;

/// One sampled record in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Identifier of the record in its origin store.
    pub id: String,
    /// Start of the record text.
    pub excerpt: String,
    /// Category label.
    pub category: String,
    /// Set for link-only updates.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub link_only: bool,
}

impl PlanEntry {
    fn from_record(record: &Record) -> Self {
        let mut excerpt: String = record.text.chars().take(EXCERPT_CHARS).collect();
        if record.text.chars().count() > EXCERPT_CHARS {
            excerpt.push_str("...");
        }
        Self {
            id: record.label().to_string(),
            excerpt,
            category: record.category.clone(),
            link_only: false,
        }
    }

    fn from_update(update: &RecordUpdate) -> Self {
        Self {
            link_only: update.kind == UpdateKind::LinkOnly,
            ..Self::from_record(&update.proposed)
        }
    }
}

/// Delta sizes plus a few sample records per list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    /// Full list sizes.
    pub summary: DeltaSummary,
    /// Sample of records to create in the primary store.
    pub create_in_primary: Vec<PlanEntry>,
    /// Sample of records to create in the secondary store.
    pub create_in_secondary: Vec<PlanEntry>,
    /// Sample of primary records to update.
    pub update_in_primary: Vec<PlanEntry>,
    /// Sample of secondary records to update.
    pub update_in_secondary: Vec<PlanEntry>,
}

impl SyncPlan {
    /// Samples up to [`PLAN_SAMPLE_SIZE`] entries per list.
    pub fn from_delta(delta: &SyncDelta) -> Self {
        Self {
            summary: delta.summary(),
            create_in_primary: sample(&delta.create_in_primary, PlanEntry::from_record),
            create_in_secondary: sample(&delta.create_in_secondary, PlanEntry::from_record),
            update_in_primary: sample(&delta.update_in_primary, PlanEntry::from_update),
            update_in_secondary: sample(&delta.update_in_secondary, PlanEntry::from_update),
        }
    }

    /// Returns true if nothing would change.
    pub fn is_empty(&self) -> bool {
        self.summary.total() == 0
    }
}

fn sample<T>(items: &[T], entry: fn(&T) -> PlanEntry) -> Vec<PlanEntry> {
    items.iter().take(PLAN_SAMPLE_SIZE).map(entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_capped() {
        let delta = SyncDelta {
            create_in_secondary: (0..8)
                .map(|i| Record::new(format!("record {i}"), "Policy", None).with_primary_id(i.to_string()))
                .collect(),
            ..SyncDelta::default()
        };

        let plan = SyncPlan::from_delta(&delta);
        assert_eq!(plan.summary.create_in_secondary, 8);
        assert_eq!(plan.create_in_secondary.len(), PLAN_SAMPLE_SIZE);
        assert_eq!(plan.create_in_secondary[0].id, "0");
        assert!(plan.create_in_primary.is_empty());
        assert!(!plan.is_empty());
    }

    #[test]
    fn long_text_is_shortened() {
        let delta = SyncDelta {
            create_in_primary: vec![Record::new("x".repeat(100), "", None).with_secondary_id("page-1")],
            ..SyncDelta::default()
        };

        let entry = &SyncPlan::from_delta(&delta).create_in_primary[0];
        assert_eq!(entry.id, "page-1");
        assert_eq!(entry.excerpt.chars().count(), EXCERPT_CHARS + 3);
    }

    #[test]
    fn link_only_updates_are_flagged() {
        let current = Record::new("a", "b", None).with_primary_id("1");
        let proposed = current.clone().with_secondary_id("page-1").with_linked(true);
        let delta = SyncDelta {
            update_in_primary: vec![RecordUpdate::link_only(current, proposed)],
            ..SyncDelta::default()
        };

        let plan = SyncPlan::from_delta(&delta);
        assert!(plan.update_in_primary[0].link_only);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["update_in_primary"][0]["link_only"], true);
        assert_eq!(json["summary"]["link_only"], 1);
    }
}
