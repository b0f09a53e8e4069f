//! The reconciliation engine.
//!
//! [`compute_delta`] takes the full record sets of both stores and returns
//! the minimal creates/updates that converge them. It runs three ordered
//! passes, each removing matched records from further consideration:
//!
//! 1. **Link-based**: a primary record whose secondary id resolves to a
//!    secondary record is paired with it. Diverged content is resolved by
//!    [`resolve_conflict`]. A link that does not resolve falls through.
//! 2. **Fingerprint-based**: a fingerprint present exactly once among the
//!    remaining records of each side pairs them; the primary record gets a
//!    link-only update.
//! 3. **Unmatched**: whatever is left is new on its side and gets created on
//!    the other.
//!
//! Output order follows input order, so identical inputs always produce an
//! identical delta.

use crate::conflict::{resolve_conflict, Side};
use crate::delta::{RecordUpdate, SyncDelta};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::record::Record;
use std::collections::HashMap;

/// Computes the mutations needed to converge `primary` and `secondary`.
pub fn compute_delta(primary: &[Record], secondary: &[Record]) -> SyncDelta {
    let mut pass = Pass::new(primary, secondary);
    pass.match_by_link();
    pass.match_by_fingerprint();
    pass.collect_unmatched();
    pass.delta
}

struct Pass<'a> {
    primary: &'a [Record],
    secondary: &'a [Record],
    primary_fps: Vec<Fingerprint>,
    secondary_fps: Vec<Fingerprint>,
    primary_matched: Vec<bool>,
    secondary_matched: Vec<bool>,
    delta: SyncDelta,
}

impl<'a> Pass<'a> {
    fn new(primary: &'a [Record], secondary: &'a [Record]) -> Self {
        Self {
            primary,
            secondary,
            primary_fps: primary.iter().map(fingerprint).collect(),
            secondary_fps: secondary.iter().map(fingerprint).collect(),
            primary_matched: vec![false; primary.len()],
            secondary_matched: vec![false; secondary.len()],
            delta: SyncDelta::default(),
        }
    }

    fn match_by_link(&mut self) {
        // First occurrence wins if the secondary store reports an id twice.
        let mut by_id: HashMap<&str, usize> = HashMap::new();
        for (index, record) in self.secondary.iter().enumerate() {
            if let Some(id) = record.secondary_id.as_deref() {
                by_id.entry(id).or_insert(index);
            }
        }

        for (pi, primary) in self.primary.iter().enumerate() {
            let Some(link) = primary.secondary_id.as_deref() else {
                continue;
            };
            let Some(&si) = by_id.get(link) else {
                continue;
            };
            if self.secondary_matched[si] {
                continue;
            }

            self.primary_matched[pi] = true;
            self.secondary_matched[si] = true;
            let secondary = &self.secondary[si];

            if self.primary_fps[pi] != self.secondary_fps[si] {
                match resolve_conflict(primary.updated_at, secondary.updated_at) {
                    Side::Primary => {
                        let mut proposed = secondary.with_content_of(primary);
                        proposed.primary_id = primary.primary_id.clone();
                        self.delta
                            .update_in_secondary
                            .push(RecordUpdate::content(secondary.clone(), proposed));
                        if !primary.linked {
                            self.delta.update_in_primary.push(RecordUpdate::link_only(
                                primary.clone(),
                                linked_to(primary, link),
                            ));
                        }
                    }
                    Side::Secondary => {
                        let proposed = primary.with_content_of(secondary);
                        self.delta
                            .update_in_primary
                            .push(RecordUpdate::content(primary.clone(), proposed));
                    }
                }
            } else if !primary.linked {
                self.delta.update_in_primary.push(RecordUpdate::link_only(
                    primary.clone(),
                    linked_to(primary, link),
                ));
            }
        }
    }

    fn match_by_fingerprint(&mut self) {
        let mut primary_counts: HashMap<&Fingerprint, usize> = HashMap::new();
        for (pi, fp) in self.primary_fps.iter().enumerate() {
            if !self.primary_matched[pi] {
                *primary_counts.entry(fp).or_insert(0) += 1;
            }
        }

        let mut secondary_groups: HashMap<&Fingerprint, Vec<usize>> = HashMap::new();
        for (si, fp) in self.secondary_fps.iter().enumerate() {
            if !self.secondary_matched[si] {
                secondary_groups.entry(fp).or_default().push(si);
            }
        }

        for pi in 0..self.primary.len() {
            if self.primary_matched[pi] {
                continue;
            }
            let fp = &self.primary_fps[pi];
            if primary_counts.get(fp) != Some(&1) {
                continue;
            }
            let si = match secondary_groups.get(fp).map(Vec::as_slice) {
                Some([si]) => *si,
                _ => continue,
            };

            let primary = &self.primary[pi];
            let secondary = &self.secondary[si];
            let Some(page_id) = secondary.secondary_id.as_deref() else {
                continue;
            };
            // A page that already names a different primary record is not a
            // candidate for this one.
            if let (Some(claimed), Some(own)) = (&secondary.primary_id, &primary.primary_id) {
                if claimed != own {
                    continue;
                }
            }

            self.primary_matched[pi] = true;
            self.secondary_matched[si] = true;
            self.delta.update_in_primary.push(RecordUpdate::link_only(
                primary.clone(),
                linked_to(primary, page_id),
            ));
        }
    }

    fn collect_unmatched(&mut self) {
        for (si, secondary) in self.secondary.iter().enumerate() {
            if !self.secondary_matched[si] {
                let mut record = secondary.clone();
                record.fingerprint = Some(self.secondary_fps[si].clone());
                self.delta.create_in_primary.push(record);
            }
        }

        for (pi, primary) in self.primary.iter().enumerate() {
            if !self.primary_matched[pi] {
                let mut record = primary.clone();
                record.fingerprint = Some(self.primary_fps[pi].clone());
                self.delta.create_in_secondary.push(record);
            }
        }
    }
}

fn linked_to(record: &Record, secondary_id: &str) -> Record {
    let mut linked = record.clone();
    linked.secondary_id = Some(secondary_id.to_string());
    linked.linked = true;
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::UpdateKind;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 1, d)
    }

    fn primary(id: &str, text: &str) -> Record {
        Record::new(text, "Ops", day(10)).with_primary_id(id)
    }

    fn page(id: &str, text: &str) -> Record {
        Record::new(text, "Ops", day(10)).with_secondary_id(id)
    }

    #[test]
    fn new_primary_record_is_created_in_secondary() {
        let a = primary("1", "Adopt Rust");
        let delta = compute_delta(&[a.clone()], &[]);

        assert_eq!(delta.create_in_secondary.len(), 1);
        assert_eq!(delta.create_in_secondary[0].primary_id.as_deref(), Some("1"));
        assert_eq!(
            delta.create_in_secondary[0].fingerprint,
            Some(a.content_fingerprint())
        );
        assert!(delta.create_in_primary.is_empty());
        assert!(delta.update_in_primary.is_empty());
        assert!(delta.update_in_secondary.is_empty());
    }

    #[test]
    fn new_secondary_record_is_created_in_primary() {
        let p = page("p1", "Hire");
        let delta = compute_delta(&[], &[p]);

        assert_eq!(delta.create_in_primary.len(), 1);
        assert_eq!(delta.create_in_primary[0].secondary_id.as_deref(), Some("p1"));
        assert_eq!(delta.total_changes(), 1);
    }

    #[test]
    fn newer_secondary_edit_updates_primary() {
        let a = primary("1", "Adopt Rust")
            .with_secondary_id("p1")
            .with_linked(true)
            .with_updated_at(at(1));
        let p = page("p1", "Adopt Rust everywhere").with_updated_at(at(2));

        let delta = compute_delta(&[a.clone()], &[p.clone()]);

        assert_eq!(delta.update_in_primary.len(), 1);
        let update = &delta.update_in_primary[0];
        assert_eq!(update.kind, UpdateKind::Content);
        assert_eq!(update.current, a);
        assert_eq!(update.proposed.primary_id.as_deref(), Some("1"));
        assert_eq!(update.proposed.text, "Adopt Rust everywhere");
        assert_eq!(update.proposed.content_fingerprint(), p.content_fingerprint());
        assert!(delta.update_in_secondary.is_empty());
        assert!(delta.create_in_primary.is_empty());
        assert!(delta.create_in_secondary.is_empty());
    }

    #[test]
    fn newer_primary_edit_updates_secondary() {
        let a = primary("1", "Keep Postgres")
            .with_secondary_id("p1")
            .with_linked(true)
            .with_updated_at(at(5));
        let p = page("p1", "Drop Postgres").with_updated_at(at(2));

        let delta = compute_delta(&[a], &[p.clone()]);

        assert_eq!(delta.update_in_secondary.len(), 1);
        let update = &delta.update_in_secondary[0];
        assert_eq!(update.current, p);
        assert_eq!(update.proposed.secondary_id.as_deref(), Some("p1"));
        assert_eq!(update.proposed.primary_id.as_deref(), Some("1"));
        assert_eq!(update.proposed.text, "Keep Postgres");
        assert!(delta.update_in_primary.is_empty());
    }

    #[test]
    fn equal_timestamps_take_the_secondary_edit() {
        let a = primary("1", "Weekly sync")
            .with_secondary_id("p1")
            .with_linked(true)
            .with_updated_at(at(4));
        let p = page("p1", "Biweekly sync").with_updated_at(at(4));

        let delta = compute_delta(&[a], &[p]);
        assert!(delta.update_in_secondary.is_empty());
        assert_eq!(delta.update_in_primary.len(), 1);
        assert_eq!(delta.update_in_primary[0].kind, UpdateKind::Content);
        assert_eq!(delta.update_in_primary[0].proposed.text, "Biweekly sync");
    }

    #[test]
    fn missing_timestamps_favor_primary() {
        let a = primary("1", "A").with_secondary_id("p1").with_linked(true);
        let p = page("p1", "B");

        let delta = compute_delta(&[a], &[p]);
        assert_eq!(delta.update_in_secondary.len(), 1);
        assert!(delta.update_in_primary.is_empty());
    }

    #[test]
    fn unflagged_primary_winner_is_also_flagged() {
        let a = primary("1", "A").with_secondary_id("p1").with_updated_at(at(3));
        let p = page("p1", "B").with_updated_at(at(1));

        let delta = compute_delta(&[a], &[p]);
        assert_eq!(delta.update_in_secondary.len(), 1);
        assert_eq!(delta.update_in_primary.len(), 1);
        assert_eq!(delta.update_in_primary[0].kind, UpdateKind::LinkOnly);
    }

    #[test]
    fn identical_linked_pair_is_a_noop() {
        let a = primary("1", "Same").with_secondary_id("p1").with_linked(true);
        let p = page("p1", "  SAME ");

        let delta = compute_delta(&[a], &[p]);
        assert!(delta.is_empty());
    }

    #[test]
    fn unflagged_link_gets_link_only_update() {
        let a = primary("1", "Same").with_secondary_id("p1");
        let p = page("p1", "Same");

        let delta = compute_delta(&[a], &[p]);
        assert_eq!(delta.update_in_primary.len(), 1);
        assert_eq!(delta.update_in_primary[0].kind, UpdateKind::LinkOnly);
        assert!(delta.update_in_primary[0].proposed.linked);
    }

    #[test]
    fn matching_fingerprints_are_linked_without_content_change() {
        let a = primary("1", "Adopt Rust").with_updated_at(at(1));
        let p = page("p1", "adopt  rust").with_updated_at(at(9));

        let delta = compute_delta(&[a.clone()], &[p]);

        assert_eq!(delta.update_in_primary.len(), 1);
        let update = &delta.update_in_primary[0];
        assert_eq!(update.kind, UpdateKind::LinkOnly);
        assert_eq!(update.proposed.secondary_id.as_deref(), Some("p1"));
        assert!(update.proposed.linked);
        assert_eq!(update.proposed.text, a.text);
        assert_eq!(update.proposed.category, a.category);
        assert_eq!(update.proposed.effective_date, a.effective_date);
        assert_eq!(delta.total_changes(), 1);
    }

    #[test]
    fn stale_link_falls_through() {
        let a = primary("1", "Orphan").with_secondary_id("gone").with_linked(true);

        let delta = compute_delta(&[a], &[page("p2", "Other")]);
        assert_eq!(delta.create_in_secondary.len(), 1);
        assert_eq!(delta.create_in_primary.len(), 1);
        assert!(delta.update_in_primary.is_empty());
    }

    #[test]
    fn stale_link_can_rematch_by_fingerprint() {
        let a = primary("1", "Orphan").with_secondary_id("gone").with_linked(true);
        let p = page("p9", "orphan");

        let delta = compute_delta(&[a], &[p]);
        assert_eq!(delta.update_in_primary.len(), 1);
        assert_eq!(
            delta.update_in_primary[0].proposed.secondary_id.as_deref(),
            Some("p9")
        );
    }

    #[test]
    fn ambiguous_fingerprints_are_not_linked() {
        let primaries = [primary("1", "Dup"), primary("2", "Dup")];
        let pages = [page("p1", "Dup")];

        let delta = compute_delta(&primaries, &pages);
        assert!(delta.update_in_primary.is_empty());
        assert_eq!(delta.create_in_secondary.len(), 2);
        assert_eq!(delta.create_in_primary.len(), 1);
    }

    #[test]
    fn page_claimed_by_other_primary_is_not_linked() {
        let a = primary("1", "Same");
        let mut p = page("p1", "Same");
        p.primary_id = Some("99".into());

        let delta = compute_delta(&[a], &[p]);
        assert!(delta.update_in_primary.is_empty());
        assert_eq!(delta.create_in_secondary.len(), 1);
        assert_eq!(delta.create_in_primary.len(), 1);
    }

    #[test]
    fn second_claim_on_same_page_falls_through() {
        let a = primary("1", "X").with_secondary_id("p1").with_linked(true);
        let b = primary("2", "Y").with_secondary_id("p1").with_linked(true);
        let p = page("p1", "X");

        let delta = compute_delta(&[a, b], &[p]);
        assert_eq!(delta.create_in_secondary.len(), 1);
        assert_eq!(delta.create_in_secondary[0].primary_id.as_deref(), Some("2"));
        assert!(delta.update_in_primary.is_empty());
    }

    #[test]
    fn every_record_is_classified_once() {
        let primaries = vec![
            primary("1", "linked same").with_secondary_id("p1").with_linked(true),
            primary("2", "linked diff")
                .with_secondary_id("p2")
                .with_linked(true)
                .with_updated_at(at(1)),
            primary("3", "twin"),
            primary("4", "lonely"),
        ];
        let pages = vec![
            page("p1", "linked same"),
            page("p2", "linked diff!").with_updated_at(at(2)),
            page("p3", "twin"),
            page("p4", "new page"),
        ];

        let delta = compute_delta(&primaries, &pages);
        let summary = delta.summary();
        assert_eq!(summary.update_in_primary, 2);
        assert_eq!(summary.link_only, 1);
        assert_eq!(summary.create_in_secondary, 1);
        assert_eq!(summary.create_in_primary, 1);
        assert_eq!(summary.update_in_secondary, 0);
        assert_eq!(delta.create_in_secondary[0].primary_id.as_deref(), Some("4"));
        assert_eq!(delta.create_in_primary[0].secondary_id.as_deref(), Some("p4"));
    }

    #[test]
    fn output_is_deterministic() {
        let primaries: Vec<Record> = (0..20)
            .map(|i| primary(&i.to_string(), &format!("record {}", i % 7)))
            .collect();
        let pages: Vec<Record> = (0..15)
            .map(|i| page(&format!("p{i}"), &format!("record {}", i % 5)))
            .collect();

        let first = compute_delta(&primaries, &pages);
        let second = compute_delta(&primaries, &pages);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}
