use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::chunk::{BATCH_SIZE, FragmentSpec, QueryInput, chunk_query};
use crate::domain::{ArchiveHandle, BlastProgram, QueryBatch, SpotRange, SraAccession};
use crate::error::KiraError;
use crate::pacing::{Clock, Pacer};
use crate::poll::{JobPoller, PollTransport};
use crate::ranges::HitAccumulator;
use crate::report::{RunHits, collect_hits};
use crate::resolver::{AccessionResolver, SuggestClient};
use crate::submit::{JobSubmitter, SubmitParams};

/// Minimum spacing between the starts of two search units.
pub const UNIT_SPACING: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub program: BlastProgram,
    /// Falls back to the program default when unset.
    pub fragment: Option<FragmentSpec>,
    /// Total hit budget, spread over every job of one experiment.
    pub max_num_seq: u32,
    pub evalue: Option<f64>,
    pub word_size: Option<u32>,
    pub short_query: Option<bool>,
    pub retry: usize,
    pub unit_spacing: Duration,
    pub report_dir: Option<Utf8PathBuf>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            program: BlastProgram::Blastn,
            fragment: None,
            max_num_seq: 1000,
            evalue: Some(1e-3),
            word_size: None,
            short_query: None,
            retry: 5,
            unit_spacing: UNIT_SPACING,
            report_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    /// `(current, total)` search units
    pub progress: Option<(usize, usize)>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query_name: String,
    pub program: BlastProgram,
    pub generated_at: String,
    pub handles: Vec<ArchiveHandle>,
    pub ranges: BTreeMap<String, Vec<SpotRange>>,
}

impl SearchOutcome {
    pub fn spot_count(&self) -> u64 {
        self.ranges
            .values()
            .flatten()
            .map(SpotRange::spot_count)
            .sum()
    }
}

/// Hit cap of a single job so that all batches together stay near `max_num_seq`.
pub fn per_job_hit_cap(max_num_seq: u32, batches: usize) -> u32 {
    let slots = (batches.max(1) * BATCH_SIZE) as u32;
    max_num_seq / slots + 1
}

pub struct Searcher<C: SuggestClient, S: JobSubmitter, T: PollTransport> {
    resolver: AccessionResolver<C>,
    submitter: S,
    poller: JobPoller<T>,
    clock: Arc<dyn Clock>,
    options: SearchOptions,
}

impl<C: SuggestClient, S: JobSubmitter, T: PollTransport> Searcher<C, S, T> {
    pub fn new(
        resolver: AccessionResolver<C>,
        submitter: S,
        poller: JobPoller<T>,
        clock: Arc<dyn Clock>,
        options: SearchOptions,
    ) -> Self {
        Self {
            resolver,
            submitter,
            poller,
            clock,
            options,
        }
    }

    pub fn run(
        &self,
        query: &QueryInput,
        accessions: &[SraAccession],
        sink: &dyn ProgressSink,
    ) -> Result<SearchOutcome, KiraError> {
        let started = self.clock.now();
        let program = self.options.program;
        let spec = self
            .options
            .fragment
            .unwrap_or_else(|| FragmentSpec::for_program(program));
        query.validate_alphabet()?;
        let chunked = chunk_query(query, spec, program)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Chunk; {} fragments in {} batches",
                chunked.fragment_count(),
                chunked.batches.len()
            ),
            elapsed: None,
            progress: None,
        });

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} accessions", accessions.len()),
            elapsed: Some(self.clock.now() - started),
            progress: None,
        });
        let handles = self.resolver.resolve(accessions)?.handles();

        let hit_cap = per_job_hit_cap(self.options.max_num_seq, chunked.batches.len());
        let total = handles.len() * chunked.batches.len();
        let mut accumulator = HitAccumulator::new();
        let mut pacer = Pacer::new();
        let mut current = 0;
        for handle in &handles {
            for (index, batch) in chunked.batches.iter().enumerate() {
                current += 1;
                let unit = Unit {
                    handle,
                    batch,
                    number: index + 1,
                };
                sink.event(ProgressEvent {
                    message: format!(
                        "phase=Search; {} ({}) batch {}/{}",
                        handle.experiment,
                        handle.organism,
                        unit.number,
                        chunked.batches.len()
                    ),
                    elapsed: Some(self.clock.now() - started),
                    progress: Some((current, total)),
                });
                let params = self.submit_params(&unit, hit_cap, &chunked.name);
                let hits = self.run_unit(&unit, &params, &mut pacer)?;
                accumulator.merge(hits);
            }
        }

        info!(
            runs = accumulator.run_count(),
            spots = accumulator.spot_count(),
            "search finished"
        );
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} runs with hits", accumulator.run_count()),
            elapsed: Some(self.clock.now() - started),
            progress: Some((total, total)),
        });

        Ok(SearchOutcome {
            query_name: chunked.name,
            program,
            generated_at: chrono::Utc::now().to_rfc3339(),
            handles,
            ranges: accumulator.into_ranges(),
        })
    }

    fn submit_params(&self, unit: &Unit<'_>, hit_cap: u32, title: &str) -> SubmitParams {
        let mut params = SubmitParams::new(
            vec![unit.handle.experiment.clone()],
            self.options.program,
            unit.batch.payload(),
        );
        params.max_num_seq = Some(hit_cap);
        params.expect = self.options.evalue;
        params.word_size = self.options.word_size;
        params.short_query = self.options.short_query;
        params.job_title = Some(title.to_string());
        params
    }

    /// Submit, poll and parse one batch, retrying the whole unit on any error.
    fn run_unit(
        &self,
        unit: &Unit<'_>,
        params: &SubmitParams,
        pacer: &mut Pacer,
    ) -> Result<RunHits, KiraError> {
        let attempts = self.options.retry + 1;
        let mut last_error = None;
        for attempt in 1..=attempts {
            pacer.wait(self.clock.as_ref(), self.options.unit_spacing);
            match self.attempt_unit(unit, params) {
                Ok(hits) => return Ok(hits),
                Err(err) => {
                    warn!(
                        experiment = %unit.handle.experiment,
                        batch = unit.number,
                        attempt,
                        error = %err,
                        "search unit failed"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(KiraError::SearchExhausted {
            experiment: unit.handle.experiment.clone(),
            batch: unit.number,
            attempts,
            last_error: last_error
                .map(|err| err.to_string())
                .unwrap_or_default(),
        })
    }

    fn attempt_unit(&self, unit: &Unit<'_>, params: &SubmitParams) -> Result<RunHits, KiraError> {
        let context = self.submitter.submit(params)?;
        info!(
            rid = %context.rid(),
            experiment = %unit.handle.experiment,
            batch = unit.number,
            "job submitted"
        );
        let mut session = self.poller.start(&context);
        let report = session.wait_for_report()?;

        let stem = format!("{}_{}", unit.handle.experiment, unit.number);
        let report_dir = self.options.report_dir.as_deref();
        if let Some(dir) = report_dir {
            keep_report(&dir.join(format!("{stem}.xml")), &report);
        }
        let dump = report_dir.map(|dir| dir.join(format!("{stem}.malformed.xml")));
        collect_hits(
            report,
            self.options.retry,
            || session.refetch_report(),
            dump.as_deref(),
        )
    }
}

struct Unit<'a> {
    handle: &'a ArchiveHandle,
    batch: &'a QueryBatch,
    /// 1-based batch number within the query
    number: usize,
}

fn keep_report(path: &Utf8Path, report: &str) {
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(path, report));
    if let Err(err) = written {
        warn!(path = %path, error = %err, "failed to keep report");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_cap_spreads_budget_over_batches() {
        assert_eq!(per_job_hit_cap(1000, 1), 51);
        assert_eq!(per_job_hit_cap(1000, 3), 17);
        assert_eq!(per_job_hit_cap(10, 2), 1);
        assert_eq!(per_job_hit_cap(1000, 0), 51);
    }

    #[test]
    fn outcome_counts_spots() {
        let outcome = SearchOutcome {
            query_name: "q".to_string(),
            program: BlastProgram::Blastn,
            generated_at: String::new(),
            handles: Vec::new(),
            ranges: BTreeMap::from([(
                "SRR1".to_string(),
                vec![SpotRange::new(5, 7), SpotRange::new(10, 10)],
            )]),
        };
        assert_eq!(outcome.spot_count(), 4);
    }
}
