//! NCBI BLAST XML report reading.
//!
//! Only the path `BlastOutput / BlastOutput_iterations / Iteration / Iteration_hits / Hit`
//! matters for spot extraction; HSP details are kept for logging and callers
//! that want them.

use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::HitRecord;
use crate::error::KiraError;

/// run accession -> spot indices, in report order, possibly repeated
pub type RunHits = BTreeMap<String, Vec<u64>>;

#[derive(Debug, Deserialize)]
#[serde(rename = "BlastOutput")]
pub struct BlastOutput {
    #[serde(rename = "BlastOutput_program")]
    pub program: Option<String>,
    #[serde(rename = "BlastOutput_db")]
    pub database: Option<String>,
    #[serde(rename = "BlastOutput_iterations")]
    pub iterations: Option<Iterations>,
}

#[derive(Debug, Deserialize)]
pub struct Iterations {
    #[serde(rename = "Iteration", default)]
    pub iterations: Vec<Iteration>,
}

#[derive(Debug, Deserialize)]
pub struct Iteration {
    #[serde(rename = "Iteration_query-def")]
    pub query_def: Option<String>,
    #[serde(rename = "Iteration_hits")]
    pub hits: Option<IterationHits>,
    #[serde(rename = "Iteration_message")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IterationHits {
    #[serde(rename = "Hit", default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "Hit_id")]
    pub id: Option<String>,
    #[serde(rename = "Hit_def")]
    pub def: Option<String>,
    #[serde(rename = "Hit_accession")]
    pub accession: Option<String>,
    #[serde(rename = "Hit_len")]
    pub len: Option<u64>,
    #[serde(rename = "Hit_hsps")]
    pub hsps: Option<HitHsps>,
}

#[derive(Debug, Deserialize)]
pub struct HitHsps {
    #[serde(rename = "Hsp", default)]
    pub hsps: Vec<Hsp>,
}

#[derive(Debug, Deserialize)]
pub struct Hsp {
    #[serde(rename = "Hsp_bit-score")]
    pub bit_score: Option<f64>,
    #[serde(rename = "Hsp_score")]
    pub score: Option<f64>,
    #[serde(rename = "Hsp_evalue")]
    pub evalue: Option<f64>,
    #[serde(rename = "Hsp_identity")]
    pub identity: Option<u64>,
    #[serde(rename = "Hsp_gaps")]
    pub gaps: Option<u64>,
    #[serde(rename = "Hsp_align-len")]
    pub align_len: Option<u64>,
    #[serde(rename = "Hsp_query-from")]
    pub query_from: Option<u64>,
    #[serde(rename = "Hsp_query-to")]
    pub query_to: Option<u64>,
    #[serde(rename = "Hsp_hit-from")]
    pub hit_from: Option<u64>,
    #[serde(rename = "Hsp_hit-to")]
    pub hit_to: Option<u64>,
}

impl Hit {
    pub fn best_evalue(&self) -> Option<f64> {
        self.hsps
            .as_ref()?
            .hsps
            .iter()
            .filter_map(|hsp| hsp.evalue)
            .min_by(f64::total_cmp)
    }
}

pub fn read_report(xml: &str) -> Result<BlastOutput, KiraError> {
    let report: BlastOutput =
        quick_xml::de::from_str(xml).map_err(|err| KiraError::MalformedReport(err.to_string()))?;
    if report.iterations.is_none() {
        return Err(KiraError::MalformedReport(
            "no BlastOutput_iterations element".to_string(),
        ));
    }
    Ok(report)
}

/// Every hit whose accession splits into `<run>.<spot>`, grouped by run.
pub fn parse_report(xml: &str) -> Result<RunHits, KiraError> {
    let report = read_report(xml)?;
    let mut out = RunHits::new();
    let hits = report
        .iterations
        .iter()
        .flat_map(|iterations| iterations.iterations.iter())
        .filter_map(|iteration| iteration.hits.as_ref())
        .flat_map(|hits| hits.hits.iter());
    for hit in hits {
        let Some(accession) = hit.accession.as_deref() else {
            continue;
        };
        match HitRecord::from_accession(accession) {
            Some(record) => {
                debug!(
                    run = %record.run_accession,
                    spot = record.spot_index,
                    evalue = ?hit.best_evalue(),
                    "report hit"
                );
                out.entry(record.run_accession)
                    .or_default()
                    .push(record.spot_index);
            }
            None => debug!(accession, "skipping hit without a spot index"),
        }
    }
    Ok(out)
}

/// Parses `initial`, re-requesting the report through `refetch` while it is
/// malformed. After `retries` re-requests the batch counts as empty; the last
/// payload is written to `dump` when given.
pub fn collect_hits<F>(
    initial: String,
    retries: usize,
    mut refetch: F,
    dump: Option<&Utf8Path>,
) -> Result<RunHits, KiraError>
where
    F: FnMut() -> Result<String, KiraError>,
{
    let mut payload = initial;
    let mut attempt = 0;
    loop {
        match parse_report(&payload) {
            Ok(hits) => return Ok(hits),
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(error = %err, attempt, "malformed report, requesting it again");
                payload = refetch()?;
            }
            Err(err) => {
                warn!(error = %err, "report stayed malformed, treating batch as empty");
                if let Some(path) = dump {
                    if let Err(io) = write_dump(path, &payload) {
                        warn!(path = %path, error = %io, "failed to keep malformed report");
                    }
                }
                return Ok(RunHits::new());
            }
        }
    }
}

fn write_dump(path: &Utf8Path, payload: &str) -> Result<(), KiraError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    fs::write(path, payload).map_err(|err| KiraError::Filesystem(err.to_string()))
}
