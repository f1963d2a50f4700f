use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{ArchiveHandle, SraAccession};
use crate::error::KiraError;
use crate::pacing::{Clock, Pacer};
use crate::taxonomy::Taxonomy;

/// Spacing between two accession lookups.
pub const LOOKUP_SPACING: Duration = Duration::from_secs(5);

// "SRX885416 (Leymus arenarius taxid:220462; run:SRR1812885)@srx885416 ..."
static SUGGESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([A-Z]+[0-9]+) \([^";]*?taxid:([0-9]+); run:([0-9A-Z ]+)\)@"#).unwrap()
});

pub trait SuggestClient: Send + Sync {
    /// Raw autocomplete payload for one accession.
    fn suggest(&self, accession: &SraAccession) -> Result<String, KiraError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub experiment: String,
    pub taxid: u32,
    pub runs: Vec<String>,
}

pub fn parse_suggestions(text: &str) -> Vec<Suggestion> {
    SUGGESTION
        .captures_iter(text)
        .filter_map(|caps| {
            Some(Suggestion {
                experiment: caps.get(1)?.as_str().to_string(),
                taxid: caps.get(2)?.as_str().parse().ok()?,
                runs: caps
                    .get(3)?
                    .as_str()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect()
}

/// Experiment match first, then the experiment owning a matching run.
pub fn match_accession<'a>(
    suggestions: &'a [Suggestion],
    accession: &SraAccession,
) -> Option<&'a Suggestion> {
    suggestions
        .iter()
        .find(|entry| entry.experiment == accession.as_str())
        .or_else(|| {
            suggestions
                .iter()
                .find(|entry| entry.runs.iter().any(|run| run == accession.as_str()))
        })
}

/// organism -> experiment -> runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub organisms: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Resolution {
    fn insert(&mut self, organism: String, experiment: String, runs: Vec<String>) {
        let merged = self
            .organisms
            .entry(organism)
            .or_default()
            .entry(experiment)
            .or_default();
        for run in runs {
            if !merged.contains(&run) {
                merged.push(run);
            }
        }
    }

    pub fn handles(&self) -> Vec<ArchiveHandle> {
        self.organisms
            .iter()
            .flat_map(|(organism, experiments)| {
                experiments.iter().map(move |(experiment, runs)| ArchiveHandle {
                    organism: organism.clone(),
                    experiment: experiment.clone(),
                    runs: runs.clone(),
                })
            })
            .collect()
    }
}

pub struct AccessionResolver<C: SuggestClient> {
    client: C,
    taxonomy: Taxonomy,
    clock: Arc<dyn Clock>,
    spacing: Duration,
}

impl<C: SuggestClient> AccessionResolver<C> {
    pub fn new(client: C, taxonomy: Taxonomy, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            taxonomy,
            clock,
            spacing: LOOKUP_SPACING,
        }
    }

    pub fn resolve(&self, accessions: &[SraAccession]) -> Result<Resolution, KiraError> {
        let mut resolution = Resolution::default();
        let mut pacer = Pacer::new();
        for accession in accessions {
            pacer.wait(self.clock.as_ref(), self.spacing);
            let handle = self.resolve_one(accession)?;
            info!(
                accession = %accession,
                experiment = %handle.experiment,
                organism = %handle.organism,
                "resolved accession"
            );
            resolution.insert(handle.organism, handle.experiment, handle.runs);
        }
        Ok(resolution)
    }

    pub fn resolve_one(&self, accession: &SraAccession) -> Result<ArchiveHandle, KiraError> {
        let text = self.client.suggest(accession)?;
        let suggestions = parse_suggestions(&text);
        debug!(accession = %accession, entries = suggestions.len(), "autocomplete response");
        let entry = match_accession(&suggestions, accession)
            .ok_or_else(|| KiraError::UnresolvableAccession(accession.to_string()))?;
        Ok(ArchiveHandle {
            organism: self.taxonomy.species(entry.taxid),
            experiment: entry.experiment.clone(),
            runs: entry.runs.clone(),
        })
    }
}
