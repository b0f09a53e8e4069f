//! Property-based test generators using proptest.
//!
//! Record sets are built from scenarios, so generated stores look like
//! real ones: mostly linked pairs, some one-sided records, a few
//! duplicates and stale links.

use crate::fixtures::{fixed_time, CATEGORIES};
use chrono::{DateTime, NaiveDate, Utc};
use proptest::prelude::*;
use tandem_protocol::Record;

/// Record content: text, category and effective date.
pub type Content = (String, String, Option<NaiveDate>);

/// How one generated entry is spread across the two stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Only in the primary store.
    PrimaryOnly,
    /// Only in the secondary store.
    SecondaryOnly,
    /// Linked with identical content.
    LinkedSame,
    /// Linked, content edited on one or both sides.
    LinkedDiverged,
    /// Link present but the primary record is not flagged as synced.
    UnflaggedLink,
    /// In both stores with the same content but no link.
    Duplicate,
    /// Primary record pointing at a page that no longer exists.
    StaleLink,
}

/// Strategy for decision text.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{2,8}( [a-z]{2,8}){0,5}").expect("Invalid regex")
}

/// Strategy for a category label.
pub fn category_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(CATEGORIES.to_vec()).prop_map(str::to_string)
}

/// Strategy for an optional effective date.
pub fn date_strategy() -> impl Strategy<Value = Option<NaiveDate>> {
    prop::option::of((1u32..=12, 1u32..=28).prop_filter_map("valid date", |(m, d)| {
        NaiveDate::from_ymd_opt(2024, m, d)
    }))
}

/// Strategy for an optional update time.
pub fn timestamp_strategy() -> impl Strategy<Value = Option<DateTime<Utc>>> {
    prop::option::weighted(0.9, (0u32..48).prop_map(fixed_time))
}

/// Strategy for record content.
pub fn content_strategy() -> impl Strategy<Value = Content> {
    (text_strategy(), category_strategy(), date_strategy())
}

/// Strategy for a copy of `text` that normalizes to the same value.
pub fn text_variant_strategy(text: String) -> impl Strategy<Value = String> {
    (any::<bool>(), "[ \t]{0,3}", "[ \n]{0,2}").prop_map(move |(upper, lead, trail)| {
        let body = if upper {
            text.to_uppercase()
        } else {
            text.split(' ').collect::<Vec<_>>().join("  ")
        };
        format!("{lead}{body}{trail}")
    })
}

/// Strategy for a scenario, weighted towards linked pairs.
pub fn scenario_strategy() -> impl Strategy<Value = Scenario> {
    prop_oneof![
        3 => Just(Scenario::LinkedSame),
        2 => Just(Scenario::LinkedDiverged),
        2 => Just(Scenario::PrimaryOnly),
        2 => Just(Scenario::SecondaryOnly),
        1 => Just(Scenario::UnflaggedLink),
        1 => Just(Scenario::Duplicate),
        1 => Just(Scenario::StaleLink),
    ]
}

fn with_content(record: Record, content: &Content) -> Record {
    Record {
        text: content.0.clone(),
        category: content.1.clone(),
        effective_date: content.2,
        ..record
    }
}

fn entry_records(
    index: usize,
    scenario: Scenario,
    content: &Content,
    edited: &Content,
    variant: &str,
    times: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
) -> (Option<Record>, Option<Record>) {
    let row = format!("r{index}");
    let page = format!("p{index}");
    let base = Record::default();

    let mut primary = with_content(base.clone(), content).with_primary_id(&row);
    let mut secondary = with_content(base, content).with_secondary_id(&page);
    primary.updated_at = times.0;
    secondary.updated_at = times.1;

    match scenario {
        Scenario::PrimaryOnly => (Some(primary), None),
        Scenario::SecondaryOnly => (None, Some(secondary)),
        Scenario::LinkedSame => (
            Some(primary.with_secondary_id(&page).with_linked(true)),
            Some(secondary.with_primary_id(&row).with_linked(true)),
        ),
        Scenario::LinkedDiverged => (
            Some(primary.with_secondary_id(&page).with_linked(true)),
            Some(with_content(secondary, edited).with_primary_id(&row).with_linked(true)),
        ),
        Scenario::UnflaggedLink => (
            Some(primary.with_secondary_id(&page)),
            Some(with_content(secondary, edited)),
        ),
        Scenario::Duplicate => {
            secondary.text = variant.to_string();
            (Some(primary), Some(secondary))
        }
        Scenario::StaleLink => (
            Some(primary.with_secondary_id(format!("gone{index}")).with_linked(true)),
            None,
        ),
    }
}

type Entry = (
    Scenario,
    Content,
    Content,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

fn entry_strategy() -> impl Strategy<Value = Entry> {
    (scenario_strategy(), content_strategy(), content_strategy()).prop_flat_map(
        |(scenario, content, edited)| {
            let variant = text_variant_strategy(content.0.clone());
            (
                Just(scenario),
                Just(content),
                Just(edited),
                variant,
                timestamp_strategy(),
                timestamp_strategy(),
            )
        },
    )
}

/// Strategy for the contents of both stores, with up to `max_entries`
/// scenario entries.
///
/// Primary ids are `r{i}` and secondary ids `p{i}`, so every id is unique
/// within its store.
pub fn store_pair_strategy(max_entries: usize) -> impl Strategy<Value = (Vec<Record>, Vec<Record>)> {
    prop::collection::vec(entry_strategy(), 0..=max_entries).prop_map(|entries| {
        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        for (index, (scenario, content, edited, variant, t1, t2)) in entries.iter().enumerate() {
            let (p, s) = entry_records(index, *scenario, content, edited, variant, (*t1, *t2));
            primary.extend(p);
            secondary.extend(s);
        }
        (primary, secondary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;
    use std::collections::HashSet;

    proptest! {
        #[test]
        fn variants_share_a_fingerprint(
            (text, variant) in text_strategy().prop_flat_map(|t| (Just(t.clone()), text_variant_strategy(t)))
        ) {
            let a = Record::new(text, "Ops", None);
            let b = Record::new(variant, "ops ", None);
            prop_assert_eq!(a.content_fingerprint(), b.content_fingerprint());
        }

        #[test]
        fn ids_are_unique_per_store((primary, secondary) in store_pair_strategy(20)) {
            let rows: HashSet<_> = primary.iter().filter_map(|r| r.primary_id.clone()).collect();
            let pages: HashSet<_> = secondary.iter().filter_map(|r| r.secondary_id.clone()).collect();
            prop_assert_eq!(rows.len(), primary.len());
            prop_assert_eq!(pages.len(), secondary.len());
        }
    }

    #[test]
    fn stale_links_point_nowhere() {
        let (primary, secondary) = entry_records(
            3,
            Scenario::StaleLink,
            &("a".into(), "Ops".into(), None),
            &("b".into(), "Ops".into(), None),
            "a",
            (None, None),
        );
        assert!(secondary.is_none());
        assert_eq!(
            primary.and_then(|r| r.secondary_id),
            Some("gone3".to_string())
        );
    }

    #[test]
    fn generated_text_is_not_blank() {
        let mut runner = TestRunner::default();
        for _ in 0..20 {
            let text = text_strategy().new_tree(&mut runner).unwrap().current();
            assert!(!text.trim().is_empty());
        }
    }
}
