use std::collections::{BTreeMap, BTreeSet};

use crate::domain::SpotRange;

/// Coalesces spot indices into sorted, maximal, non-adjacent closed ranges.
pub fn coalesce<I>(spots: I) -> Vec<SpotRange>
where
    I: IntoIterator<Item = u64>,
{
    let sorted: BTreeSet<u64> = spots.into_iter().collect();
    let mut out: Vec<SpotRange> = Vec::new();
    for spot in sorted {
        match out.last_mut() {
            Some(last) if last.end.checked_add(1) == Some(spot) => last.end = spot,
            _ => out.push(SpotRange::new(spot, spot)),
        }
    }
    out
}

/// run accession -> distinct spot indices hit so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitAccumulator {
    runs: BTreeMap<String, BTreeSet<u64>>,
}

impl HitAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, hits: BTreeMap<String, Vec<u64>>) {
        for (run, spots) in hits {
            self.runs.entry(run).or_default().extend(spots);
        }
    }

    pub fn insert(&mut self, run: &str, spot: u64) {
        self.runs.entry(run.to_string()).or_default().insert(spot);
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn spot_count(&self) -> usize {
        self.runs.values().map(BTreeSet::len).sum()
    }

    pub fn into_ranges(self) -> BTreeMap<String, Vec<SpotRange>> {
        self.runs
            .into_iter()
            .map(|(run, spots)| (run, coalesce(spots)))
            .collect()
    }
}
