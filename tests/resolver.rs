use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use kira_sra_blast::domain::{SraAccession, parse_accession_list};
use kira_sra_blast::error::KiraError;
use kira_sra_blast::pacing::Clock;
use kira_sra_blast::resolver::{AccessionResolver, SuggestClient};
use kira_sra_blast::taxonomy::Taxonomy;

const SRX885418: &str = r#"NSuggest_CreateData("q", new Array("SRX885418 ( taxid:7160; run:SRR1812886 SRR1812887)@srx885418 7160     srr1812886 srr1812887"), 1);"#;
const SRX882917: &str = r#"NSuggest_CreateData("q", new Array("SRX882917 ( taxid:7164; run:SRR1810085)@srx882917 7164     srr1810085"), 1);"#;

struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        *self.now.lock().unwrap() += duration;
    }
}

#[derive(Default)]
struct MockSuggest {
    queries: Mutex<Vec<String>>,
}

impl SuggestClient for MockSuggest {
    fn suggest(&self, accession: &SraAccession) -> Result<String, KiraError> {
        self.queries
            .lock()
            .unwrap()
            .push(accession.as_str().to_string());
        match accession.as_str() {
            "SRX885418" | "SRR1812886" | "SRR1812887" => Ok(SRX885418.to_string()),
            "SRR1810085" => Ok(SRX882917.to_string()),
            "SRR500" => Err(KiraError::LookupStatus {
                status: 502,
                message: "Bad Gateway".to_string(),
            }),
            _ => Ok(r#"NSuggest_CreateData("q", new Array(), 0);"#.to_string()),
        }
    }
}

fn resolver() -> (AccessionResolver<MockSuggest>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let resolver = AccessionResolver::new(MockSuggest::default(), Taxonomy::default(), clock.clone());
    (resolver, clock)
}

#[test]
fn run_and_experiment_resolve_identically() {
    let (resolver, _) = resolver();
    let mut seen = Vec::new();
    for id in ["SRX885418", "SRR1812886", "srr1812887"] {
        let accession: SraAccession = id.parse().unwrap();
        seen.push(resolver.resolve_one(&accession).unwrap());
    }
    assert!(seen.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(seen[0].organism, "Aedes albopictus");
    assert_eq!(seen[0].experiment, "SRX885418");
    assert_eq!(seen[0].runs, vec!["SRR1812886", "SRR1812887"]);
}

#[test]
fn resolution_groups_by_organism_and_sleeps_between_lookups() {
    let (resolver, clock) = resolver();
    let accessions = parse_accession_list("SRR1812886,SRR1810085,SRX885418").unwrap();
    let resolution = resolver.resolve(&accessions).unwrap();

    let expected: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::from([
        (
            "Aedes albopictus".to_string(),
            BTreeMap::from([(
                "SRX885418".to_string(),
                vec!["SRR1812886".to_string(), "SRR1812887".to_string()],
            )]),
        ),
        (
            "Unknown species (taxid 7164)".to_string(),
            BTreeMap::from([("SRX882917".to_string(), vec!["SRR1810085".to_string()])]),
        ),
    ]);
    assert_eq!(resolution.organisms, expected);
    assert_eq!(resolution.handles().len(), 2);

    let sleeps = clock.sleeps.lock().unwrap();
    assert_eq!(sleeps.as_slice(), &[Duration::from_secs(5), Duration::from_secs(5)]);
}

#[test]
fn unknown_accession_is_unresolvable() {
    let (resolver, _) = resolver();
    let accessions = parse_accession_list("SRX885418,SRR999").unwrap();
    assert_matches!(
        resolver.resolve(&accessions),
        Err(KiraError::UnresolvableAccession(id)) if id == "SRR999"
    );
}

#[test]
fn lookup_failure_is_surfaced() {
    let (resolver, _) = resolver();
    let accession: SraAccession = "SRR500".parse().unwrap();
    assert_matches!(
        resolver.resolve_one(&accession),
        Err(KiraError::LookupStatus { status: 502, .. })
    );
}
