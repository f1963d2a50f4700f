use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::chunk::ChunkedQuery;
use crate::error::KiraError;
use crate::resolver::Resolution;
use crate::search::{ProgressEvent, ProgressSink, SearchOutcome};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

impl OutputMode {
    pub fn sink(self) -> Box<dyn ProgressSink> {
        match self {
            OutputMode::Interactive => Box::new(ConsoleProgress),
            OutputMode::NonInteractive => Box::new(JsonOutput),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcome(outcome: &SearchOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_resolution(resolution: &Resolution) -> io::Result<()> {
        Self::print_json(&resolution.organisms)
    }

    /// FASTA payloads exactly as they would be submitted, one block per batch.
    pub fn print_batches(chunked: &ChunkedQuery) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for (index, batch) in chunked.batches.iter().enumerate() {
            writeln!(
                stdout,
                "# {} batch {}/{} ({} fragments)",
                chunked.name,
                index + 1,
                chunked.batches.len(),
                batch.len()
            )?;
            writeln!(stdout, "{}", batch.payload())?;
        }
        Ok(())
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr, keeping stdout for the JSON result.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        eprintln!("{}", format_event(&event));
    }
}

pub fn format_event(event: &ProgressEvent) -> String {
    let mut line = String::new();
    if let Some((current, total)) = event.progress {
        line.push_str(&format!("[{current}/{total}] "));
    }
    line.push_str(&event.message);
    if let Some(elapsed) = event.elapsed {
        line.push_str(&format!(" ({}s)", elapsed.as_secs()));
    }
    line
}

/// `<outdir>/<query>.ranges.json`, with path-hostile characters of the name replaced.
pub fn outcome_path(outdir: &Utf8Path, query_name: &str) -> Utf8PathBuf {
    let stem: String = query_name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    outdir.join(format!("{stem}.ranges.json"))
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), KiraError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-sb")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    serde_json::to_writer_pretty(&mut temp, value)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.write_all(b"\n")
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(())
}
