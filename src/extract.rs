use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::SpotRange;
use crate::error::KiraError;
use crate::search::{ProgressEvent, ProgressSink};

/// Pulls the reads of one spot range out of the archive.
pub trait ReadExtractor: Send + Sync {
    fn extract(
        &self,
        run: &str,
        range: &SpotRange,
        destination_dir: &Path,
    ) -> Result<PathBuf, KiraError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedReads {
    pub run: String,
    pub range: SpotRange,
    pub path: PathBuf,
}

/// Runs `fastq-dump` from the SRA Toolkit.
#[derive(Debug, Clone)]
pub struct FastqDumpExtractor {
    fastq_dump: Option<PathBuf>,
}

impl FastqDumpExtractor {
    /// Uses `path` when given, else looks `fastq-dump` up on `PATH`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            fastq_dump: path.or_else(|| find_in_path("fastq-dump")),
        }
    }

    pub fn tool_version(&self) -> Option<String> {
        let path = self.fastq_dump.as_ref()?;
        let output = Command::new(path).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() { None } else { Some(stdout) }
    }

    fn require_tool(&self) -> Result<&PathBuf, KiraError> {
        self.fastq_dump
            .as_ref()
            .ok_or_else(|| KiraError::MissingTool("fastq-dump (SRA Toolkit)".to_string()))
    }
}

pub fn fastq_dump_args(run: &str, range: &SpotRange) -> Vec<String> {
    vec![
        "--defline-seq".to_string(),
        "@$sn/$ri".to_string(),
        "--split-files".to_string(),
        "-W".to_string(),
        "-Z".to_string(),
        "-N".to_string(),
        range.start.to_string(),
        "-X".to_string(),
        range.end.to_string(),
        run.to_string(),
    ]
}

pub fn output_file_name(run: &str, range: &SpotRange) -> String {
    format!("{run}_{range}.fastq")
}

impl ReadExtractor for FastqDumpExtractor {
    fn extract(
        &self,
        run: &str,
        range: &SpotRange,
        destination_dir: &Path,
    ) -> Result<PathBuf, KiraError> {
        let program = self.require_tool()?;
        fs::create_dir_all(destination_dir)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let target = destination_dir.join(output_file_name(run, range));
        let file = File::create(&target).map_err(|err| KiraError::Filesystem(err.to_string()))?;

        let args = fastq_dump_args(run, range);
        debug!(program = %program.display(), ?args, "running fastq-dump");
        let output = Command::new(program)
            .args(&args)
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| KiraError::Extraction(err.to_string()))?;
        if output.status.success() {
            return Ok(target);
        }

        // Leave no truncated FASTQ behind.
        let _ = fs::remove_file(&target);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("fastq-dump failed for {run} spots {range}")
        } else {
            stderr
        };
        Err(KiraError::Extraction(message))
    }
}

/// Extracts every range in run order, stopping at the first failure.
pub fn extract_all(
    extractor: &dyn ReadExtractor,
    ranges: &BTreeMap<String, Vec<SpotRange>>,
    destination_dir: &Path,
    sink: &dyn ProgressSink,
) -> Result<Vec<ExtractedReads>, KiraError> {
    let total: usize = ranges.values().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for (run, run_ranges) in ranges {
        for range in run_ranges {
            sink.event(ProgressEvent {
                message: format!("phase=Extract; {run} spots {range}"),
                elapsed: None,
                progress: Some((out.len() + 1, total)),
            });
            let path = extractor.extract(run, range, destination_dir)?;
            info!(run = %run, range = %range, path = %path.display(), "reads extracted");
            out.push(ExtractedReads {
                run: run.clone(),
                range: *range,
                path,
            });
        }
    }
    Ok(out)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| [dir.join(format!("{name}.exe")), dir.join(name)])
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_range() {
        let args = fastq_dump_args("SRR1812889", &SpotRange::new(10, 12));
        assert_eq!(
            args.join(" "),
            "--defline-seq @$sn/$ri --split-files -W -Z -N 10 -X 12 SRR1812889"
        );
        assert_eq!(
            output_file_name("SRR1812889", &SpotRange::new(10, 12)),
            "SRR1812889_10-12.fastq"
        );
    }

    #[test]
    fn missing_tool_is_reported() {
        let extractor = FastqDumpExtractor { fastq_dump: None };
        let dir = tempfile::tempdir().unwrap();
        let err = extractor
            .extract("SRR1", &SpotRange::new(1, 1), dir.path())
            .unwrap_err();
        assert!(matches!(err, KiraError::MissingTool(_)));
        assert_eq!(extractor.tool_version(), None);
    }
}
