use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BlastProgram {
    #[default]
    Blastn,
    Megablast,
    Discomegablast,
    Tblastn,
    Tblastx,
}

impl BlastProgram {
    /// `PROGRAM` and optional `BLAST_PROGRAMS` values of the SRA BLAST form.
    pub fn form_params(self) -> (&'static str, Option<&'static str>) {
        match self {
            BlastProgram::Blastn => ("blastn", Some("blastn")),
            BlastProgram::Megablast => ("blastn", Some("megaBlast")),
            BlastProgram::Discomegablast => ("blastn", Some("discoMegablast")),
            BlastProgram::Tblastn => ("tblastn", None),
            BlastProgram::Tblastx => ("tblastx", None),
        }
    }

    /// Translated searches take amino-acid sized fragments.
    pub fn is_translated(self) -> bool {
        matches!(self, BlastProgram::Tblastn | BlastProgram::Tblastx)
    }
}

impl fmt::Display for BlastProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlastProgram::Blastn => write!(f, "blastn"),
            BlastProgram::Megablast => write!(f, "megablast"),
            BlastProgram::Discomegablast => write!(f, "discomegablast"),
            BlastProgram::Tblastn => write!(f, "tblastn"),
            BlastProgram::Tblastx => write!(f, "tblastx"),
        }
    }
}

impl FromStr for BlastProgram {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blastn" => Ok(BlastProgram::Blastn),
            "megablast" => Ok(BlastProgram::Megablast),
            "discomegablast" => Ok(BlastProgram::Discomegablast),
            "tblastn" => Ok(BlastProgram::Tblastn),
            "tblastx" => Ok(BlastProgram::Tblastx),
            _ => Err(KiraError::InvalidProgram(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessionKind {
    Experiment,
    Run,
}

/// An SRA/ENA/DDBJ experiment or run accession, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct SraAccession(String);

impl SraAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> AccessionKind {
        match self.0.get(1..3) {
            Some("RX") => AccessionKind::Experiment,
            _ => AccessionKind::Run,
        }
    }
}

impl fmt::Display for SraAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SraAccession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let prefix_ok = ["SRX", "ERX", "DRX", "SRR", "ERR", "DRR"]
            .iter()
            .any(|prefix| normalized.starts_with(prefix));
        let digits = normalized.get(3..).unwrap_or_default();
        let is_valid =
            prefix_ok && !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(KiraError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for SraAccession {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parses a comma-separated accession list, dropping repeats (first occurrence wins).
pub fn parse_accession_list(value: &str) -> Result<Vec<SraAccession>, KiraError> {
    let mut out: Vec<SraAccession> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let accession: SraAccession = item.parse()?;
        if !out.contains(&accession) {
            out.push(accession);
        }
    }
    if out.is_empty() {
        return Err(KiraError::InvalidAccession(value.to_string()));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFragment {
    pub name: String,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryBatch {
    pub fragments: Vec<QueryFragment>,
}

impl QueryBatch {
    /// Multi-record FASTA submitted as one query.
    pub fn payload(&self) -> String {
        self.fragments
            .iter()
            .map(|fragment| format!(">{}\n{}", fragment.name, fragment.sequence))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// An experiment resolved from user accessions, with every run it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveHandle {
    pub organism: String,
    pub experiment: String,
    pub runs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitRecord {
    pub run_accession: String,
    pub spot_index: u64,
}

impl HitRecord {
    /// Splits a report accession of the form `<run>.<spot>`.
    pub fn from_accession(accession: &str) -> Option<Self> {
        let mut parts = accession.trim().split('.');
        let run = parts.next().filter(|run| !run.is_empty())?;
        let spot = parts.next()?.parse::<u64>().ok()?;
        Some(Self {
            run_accession: run.to_string(),
            spot_index: spot,
        })
    }
}

/// Closed spot interval within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotRange {
    pub start: u64,
    pub end: u64,
}

impl SpotRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn spot_count(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for SpotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Waiting,
    Searching,
    Ready,
    Retrieved,
    Failed,
    Unknown(String),
}

impl JobStatus {
    /// Maps status text scraped from a BLAST page, ignoring case.
    pub fn from_scraped(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "waiting" => JobStatus::Waiting,
            "searching" => JobStatus::Searching,
            "ready" => JobStatus::Ready,
            "failed" => JobStatus::Failed,
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            JobStatus::Submitted | JobStatus::Waiting | JobStatus::Searching
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Submitted => write!(f, "submitted"),
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Searching => write!(f, "searching"),
            JobStatus::Ready => write!(f, "ready"),
            JobStatus::Retrieved => write!(f, "retrieved"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Unknown(text) => write!(f, "{text}"),
        }
    }
}

/// A BLAST job as echoed back by the wait page.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchJob {
    pub tracking_id: String,
    pub status: JobStatus,
    pub status_detail: Option<String>,
    pub entrez_query: Option<String>,
    pub title: Option<String>,
    pub max_hits: u32,
}
