//! Benchmark utilities.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tandem_protocol::Record;

const WORDS: [&str; 12] = [
    "adopt", "retire", "service", "budget", "hiring", "policy", "rust", "postgres", "review",
    "quarterly", "rotation", "vendor",
];
const CATEGORIES: [&str; 4] = ["Architecture", "Policy", "Ops", "Finance"];

/// Share of generated entries in each shape, out of 100.
#[derive(Debug, Clone, Copy)]
pub struct Mix {
    /// Linked with identical content.
    pub linked_same: u32,
    /// Linked with diverged content.
    pub linked_diverged: u32,
    /// Unlinked but with identical content on both sides.
    pub duplicate: u32,
}

impl Mix {
    /// A steady-state store: almost everything already linked.
    pub const STEADY: Mix = Mix {
        linked_same: 90,
        linked_diverged: 5,
        duplicate: 0,
    };

    /// A first sync: nothing linked, half the content already present twice.
    pub const INITIAL: Mix = Mix {
        linked_same: 0,
        linked_diverged: 0,
        duplicate: 50,
    };
}

/// Random decision text of a few words.
pub fn random_text(rng: &mut impl Rng) -> String {
    let words = rng.gen_range(3..12);
    (0..words)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

/// A random unlinked record.
pub fn random_record(rng: &mut impl Rng) -> Record {
    let date = NaiveDate::from_ymd_opt(2024, rng.gen_range(1..=12), rng.gen_range(1..=28));
    Record::new(
        random_text(rng),
        CATEGORIES[rng.gen_range(0..CATEGORIES.len())],
        date,
    )
}

/// Generates `count` entries spread over both stores according to `mix`.
///
/// Entries outside the mix are split evenly between primary-only and
/// secondary-only records. The same seed always yields the same sets.
pub fn generate_store_pair(count: usize, mix: Mix, seed: u64) -> (Vec<Record>, Vec<Record>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
    let mut primary = Vec::with_capacity(count);
    let mut secondary = Vec::with_capacity(count);

    for i in 0..count {
        let row = format!("{i}");
        let page = format!("page-{i}");
        let mut content = random_record(&mut rng);
        content.updated_at = base.map(|t| t + Duration::minutes(rng.gen_range(0..10_000)));
        let roll = rng.gen_range(0..100);

        let linked_same = mix.linked_same;
        let linked_diverged = linked_same + mix.linked_diverged;
        let duplicate = linked_diverged + mix.duplicate;
        if roll < linked_same {
            primary.push(content.clone().with_primary_id(&row).with_secondary_id(&page).with_linked(true));
            secondary.push(content.with_secondary_id(&page).with_primary_id(&row).with_linked(true));
        } else if roll < linked_diverged {
            let mut edited = content.clone();
            edited.text.push_str(" amended");
            edited.updated_at = edited.updated_at.map(|t| t + Duration::minutes(5));
            primary.push(content.with_primary_id(&row).with_secondary_id(&page).with_linked(true));
            secondary.push(edited.with_secondary_id(&page).with_primary_id(&row).with_linked(true));
        } else if roll < duplicate {
            primary.push(content.clone().with_primary_id(&row));
            secondary.push(content.with_secondary_id(&page));
        } else if roll % 2 == 0 {
            primary.push(content.with_primary_id(&row));
        } else {
            secondary.push(content.with_secondary_id(&page));
        }
    }
    (primary, secondary)
}
