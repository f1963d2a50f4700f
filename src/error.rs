use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid fragment spec: {0}")]
    #[diagnostic(help("use FRAGMENT,OVERLAP with FRAGMENT greater than OVERLAP, e.g. 70,20"))]
    InvalidFragmentSpec(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid SRA accession: {0}")]
    #[diagnostic(help("expected an experiment (SRX/ERX/DRX) or run (SRR/ERR/DRR) accession"))]
    InvalidAccession(String),

    #[error("unresolvable SRA accession: {0}")]
    UnresolvableAccession(String),

    #[error("invalid BLAST program: {0}")]
    InvalidProgram(String),

    #[error("accession lookup failed: {0}")]
    LookupHttp(String),

    #[error("accession lookup returned status {status}: {message}")]
    LookupStatus { status: u16, message: String },

    #[error("job submission failed: {0}")]
    Submission(String),

    #[error("webdriver request failed: {0}")]
    WebDriver(String),

    #[error("BLAST request failed: {0}")]
    BlastHttp(String),

    #[error("BLAST returned status {status}: {message}")]
    BlastStatus { status: u16, message: String },

    #[error("search job {rid} failed: {message}")]
    SearchJobFailed { rid: String, message: String },

    #[error("search job {rid} stalled with status {status:?} after {polls} polls")]
    PollStalled {
        rid: String,
        status: String,
        polls: usize,
    },

    #[error("malformed BLAST report: {0}")]
    MalformedReport(String),

    #[error(
        "search against {experiment} gave up on batch {batch} after {attempts} attempts: {last_error}"
    )]
    SearchExhausted {
        experiment: String,
        batch: usize,
        attempts: usize,
        last_error: String,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("read extraction failed: {0}")]
    Extraction(String),
}
