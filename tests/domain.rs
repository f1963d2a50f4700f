use std::str::FromStr;

use assert_matches::assert_matches;

use kira_sra_blast::domain::{
    AccessionKind, BlastProgram, JobStatus, SpotRange, SraAccession, parse_accession_list,
};
use kira_sra_blast::error::KiraError;

#[test]
fn accession_kinds() {
    let experiment: SraAccession = "drx000001".parse().unwrap();
    assert_eq!(experiment.as_str(), "DRX000001");
    assert_eq!(experiment.kind(), AccessionKind::Experiment);

    let run: SraAccession = "ERR2173620".parse().unwrap();
    assert_eq!(run.kind(), AccessionKind::Run);
}

#[test]
fn accession_list_rejects_any_bad_item() {
    let err = parse_accession_list("SRX885418,GSE1234").unwrap_err();
    assert_matches!(err, KiraError::InvalidAccession(value) if value == "GSE1234");
    assert_matches!(parse_accession_list(" , "), Err(KiraError::InvalidAccession(_)));
}

#[test]
fn program_names_round_trip() {
    for program in [
        BlastProgram::Blastn,
        BlastProgram::Megablast,
        BlastProgram::Discomegablast,
        BlastProgram::Tblastn,
        BlastProgram::Tblastx,
    ] {
        assert_eq!(BlastProgram::from_str(&program.to_string()).unwrap(), program);
    }
    assert_matches!(
        BlastProgram::from_str("blastp"),
        Err(KiraError::InvalidProgram(_))
    );
}

#[test]
fn pending_states() {
    assert!(JobStatus::Submitted.is_pending());
    assert!(JobStatus::from_scraped("WAITING").is_pending());
    assert!(!JobStatus::Ready.is_pending());
    assert!(!JobStatus::Failed.is_pending());
}

#[test]
fn spot_range_serializes_as_object() {
    let range = SpotRange::new(5, 7);
    assert_eq!(range.spot_count(), 3);
    assert_eq!(range.to_string(), "5-7");
    assert_eq!(
        serde_json::to_value(range).unwrap(),
        serde_json::json!({ "start": 5, "end": 7 })
    );
}
