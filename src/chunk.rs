use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::domain::{BlastProgram, QueryBatch, QueryFragment};
use crate::error::KiraError;

/// Fragments per submitted query; more records than this are split over jobs.
pub const BATCH_SIZE: usize = 20;

const NUCLEOTIDE_ALPHABET: &str = "GATCRYWSMKHBVDNU";
const PROTEIN_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWYBXZJUO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FragmentSpec {
    fragment: usize,
    overlap: usize,
}

impl FragmentSpec {
    pub fn new(fragment: usize, overlap: usize) -> Result<Self, KiraError> {
        if fragment <= overlap {
            return Err(KiraError::InvalidFragmentSpec(format!(
                "fragment ({fragment}) must be longer than the overlap ({overlap})"
            )));
        }
        Ok(Self { fragment, overlap })
    }

    pub fn for_program(program: BlastProgram) -> Self {
        if program.is_translated() {
            Self {
                fragment: 24,
                overlap: 7,
            }
        } else {
            Self {
                fragment: 70,
                overlap: 20,
            }
        }
    }

    pub fn fragment(&self) -> usize {
        self.fragment
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.fragment - self.overlap
    }

    /// Number of fragments a sequence of `len` residues is cut into.
    pub fn fragment_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= self.fragment {
            1
        } else {
            (len - self.overlap).div_ceil(self.step())
        }
    }
}

impl fmt::Display for FragmentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.fragment, self.overlap)
    }
}

impl FromStr for FragmentSpec {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (fragment, overlap) = value
            .trim()
            .split_once(',')
            .ok_or_else(|| KiraError::InvalidFragmentSpec(value.to_string()))?;
        let fragment = fragment
            .trim()
            .parse::<usize>()
            .map_err(|_| KiraError::InvalidFragmentSpec(value.to_string()))?;
        let overlap = overlap
            .trim()
            .parse::<usize>()
            .map_err(|_| KiraError::InvalidFragmentSpec(value.to_string()))?;
        Self::new(fragment, overlap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub name: String,
    pub sequence: String,
}

/// One or more named query sequences, from FASTA text or a bare sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInput {
    records: Vec<QueryRecord>,
}

impl QueryInput {
    pub fn parse(text: &str) -> Result<Self, KiraError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(KiraError::InvalidQuery("query is empty".to_string()));
        }

        if !text.starts_with('>') {
            return Ok(Self {
                records: vec![QueryRecord {
                    name: "Undefined".to_string(),
                    sequence: strip_whitespace(text),
                }],
            });
        }

        let mut records = Vec::new();
        let mut current: Option<QueryRecord> = None;
        for line in text.lines() {
            if let Some(header) = line.trim_start().strip_prefix('>') {
                if let Some(record) = current.take() {
                    records.push(record);
                }
                let name = header
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| KiraError::InvalidQuery("FASTA header without a name".to_string()))?;
                current = Some(QueryRecord {
                    name: name.to_string(),
                    sequence: String::new(),
                });
            } else if let Some(record) = current.as_mut() {
                record.sequence.push_str(&strip_whitespace(line));
            }
        }
        records.extend(current);
        Ok(Self { records })
    }

    pub fn records(&self) -> &[QueryRecord] {
        &self.records
    }

    /// Label of the whole query: record names joined by `_`.
    pub fn name(&self) -> String {
        self.records
            .iter()
            .map(|record| record.name.as_str())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Rejects queries that are neither nucleotides nor amino acids.
    pub fn validate_alphabet(&self) -> Result<(), KiraError> {
        let residues: String = self
            .records
            .iter()
            .flat_map(|record| record.sequence.chars())
            .map(|ch| ch.to_ascii_uppercase())
            .collect();
        if residues.is_empty() {
            return Err(KiraError::InvalidQuery(
                "query contains no sequence data".to_string(),
            ));
        }
        let within = |alphabet: &str| residues.chars().all(|ch| alphabet.contains(ch));
        if within(NUCLEOTIDE_ALPHABET) || within(PROTEIN_ALPHABET) {
            Ok(())
        } else {
            Err(KiraError::InvalidQuery(
                "sequence is neither nucleotides nor amino acids".to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkedQuery {
    pub name: String,
    pub batches: Vec<QueryBatch>,
}

impl ChunkedQuery {
    pub fn fragment_count(&self) -> usize {
        self.batches.iter().map(QueryBatch::len).sum()
    }
}

/// Cuts one sequence into overlapping fragments named `{name}_{i}`.
pub fn cut_sequence(name: &str, sequence: &str, spec: FragmentSpec) -> Vec<QueryFragment> {
    let residues: Vec<char> = sequence.chars().collect();
    let len = residues.len();
    let count = spec.fragment_count(len);
    (0..count)
        .map(|index| {
            let start = index * spec.step();
            let end = if index + 1 == count {
                len
            } else {
                (start + spec.fragment()).min(len)
            };
            QueryFragment {
                name: format!("{name}_{index}"),
                sequence: residues[start..end].iter().collect(),
            }
        })
        .collect()
}

pub fn batch_fragments(fragments: Vec<QueryFragment>) -> Vec<QueryBatch> {
    fragments
        .chunks(BATCH_SIZE)
        .map(|chunk| QueryBatch {
            fragments: chunk.to_vec(),
        })
        .filter(|batch| !batch.is_empty())
        .collect()
}

pub fn chunk_query(
    input: &QueryInput,
    spec: FragmentSpec,
    program: BlastProgram,
) -> Result<ChunkedQuery, KiraError> {
    if program.is_translated() && spec.fragment() > 50 {
        warn!(
            fragment = spec.fragment(),
            "translated search with a long fragment; weak hits may be missed"
        );
    }
    let fragments: Vec<QueryFragment> = input
        .records()
        .iter()
        .flat_map(|record| cut_sequence(&record.name, &record.sequence, spec))
        .collect();
    if fragments.is_empty() {
        return Err(KiraError::InvalidQuery(
            "query contains no sequence data".to_string(),
        ));
    }
    Ok(ChunkedQuery {
        name: input.name(),
        batches: batch_fragments(fragments),
    })
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|ch| !ch.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn reassemble(fragments: &[QueryFragment], spec: FragmentSpec) -> String {
        let mut out = String::new();
        for (index, fragment) in fragments.iter().enumerate() {
            if index == 0 {
                out.push_str(&fragment.sequence);
            } else {
                let covered = out.len() - index * (spec.fragment() - spec.overlap());
                out.push_str(&fragment.sequence[covered..]);
            }
        }
        out
    }

    #[test]
    fn fragments_reconstruct_sequence() {
        let spec = FragmentSpec::new(7, 3).unwrap();
        for len in 1..60 {
            let sequence: String = "ACGT".chars().cycle().take(len).collect();
            let fragments = cut_sequence("q", &sequence, spec);
            assert_eq!(fragments.len(), spec.fragment_count(len), "len {len}");
            assert!(fragments.iter().all(|f| f.sequence.len() <= 7));
            assert_eq!(reassemble(&fragments, spec), sequence, "len {len}");
        }
    }

    #[test]
    fn consecutive_fragments_share_overlap() {
        let spec = FragmentSpec::new(10, 4).unwrap();
        let sequence: String = ('a'..='z').collect();
        let fragments = cut_sequence("q", &sequence, spec);
        for pair in fragments.windows(2) {
            let tail = &pair[0].sequence[pair[0].sequence.len() - 4..];
            assert_eq!(tail, &pair[1].sequence[..4]);
        }
    }

    #[test]
    fn short_sequence_is_one_fragment() {
        let spec = FragmentSpec::new(70, 20).unwrap();
        let fragments = cut_sequence("gene", "ACGTACGT", spec);
        assert_eq!(
            fragments,
            vec![QueryFragment {
                name: "gene_0".to_string(),
                sequence: "ACGTACGT".to_string(),
            }]
        );
    }

    #[test]
    fn spec_rejects_overlap_not_shorter() {
        assert_matches!(
            "7,31".parse::<FragmentSpec>(),
            Err(KiraError::InvalidFragmentSpec(_))
        );
        assert_matches!(
            "20,20".parse::<FragmentSpec>(),
            Err(KiraError::InvalidFragmentSpec(_))
        );
        assert_matches!(
            "X,J".parse::<FragmentSpec>(),
            Err(KiraError::InvalidFragmentSpec(_))
        );
        assert_matches!(
            "70".parse::<FragmentSpec>(),
            Err(KiraError::InvalidFragmentSpec(_))
        );
    }

    #[test]
    fn batches_hold_at_most_twenty() {
        let spec = FragmentSpec::new(2, 1).unwrap();
        let sequence = "A".repeat(46);
        let fragments = cut_sequence("q", &sequence, spec);
        assert_eq!(fragments.len(), 45);
        let batches = batch_fragments(fragments);
        let sizes: Vec<_> = batches.iter().map(QueryBatch::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(batches[1].fragments[0].name, "q_20");
    }
}
