//! Pattern extraction over BLAST HTML pages.
//!
//! Every regular expression that depends on NCBI markup lives here; the
//! submitter and the poller only see [`WaitPage`] and plain strings.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{JobStatus, SearchJob};

/// Hit cap the form falls back to when the page does not echo one.
pub const DEFAULT_MAX_NUM_SEQ: u32 = 500;

static RID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input name="RID"[^>]*?value="([0-9A-Za-z_]+)""#).unwrap());
static DB_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input name="SEARCH_DB_STATUS"[^>]*?value="([0-9]+)""#).unwrap()
});
static STATUS_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<td>Status</td><td>(\w+?)</td>").unwrap());
static STATUS_ASSIGN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Status=(\w+)").unwrap());
static JOB_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input name="JOB_TITLE"[^>]*?value="([^"]+)""#).unwrap());
static ENTREZ_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input name="ENTREZ_QUERY"[^>]*?value="([^"]+)""#).unwrap());
static RTOE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input name="RTOE"[^>]*?value="([0-9]+)""#).unwrap());
static MAX_NUM_SEQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input name="MAX_NUM_SEQ"[^>]*?value="([0-9]+)""#).unwrap());
static ERROR_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<p class="error">(.+?)</p>"#).unwrap());
static MESSAGE_ID_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Message ID#[0-9]+ Error: (.+?)$").unwrap());
static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!DOCTYPE (\w+?) PUBLIC").unwrap());
static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WaitPage {
    pub rid: Option<String>,
    pub status_text: Option<String>,
    pub status_code: Option<String>,
    pub job_title: Option<String>,
    pub entrez_query: Option<String>,
    pub rtoe: Option<String>,
    pub max_num_seq: u32,
}

impl WaitPage {
    /// Status from the status cell, then `Status=`, then the database status code.
    pub fn status(&self) -> JobStatus {
        if let Some(text) = &self.status_text {
            return JobStatus::from_scraped(text);
        }
        match self.status_code.as_deref() {
            Some("21") => JobStatus::Waiting,
            Some("31") => JobStatus::Searching,
            Some("43") => JobStatus::Ready,
            Some("63") => JobStatus::Failed,
            _ => JobStatus::Unknown("unknown".to_string()),
        }
    }

    pub fn to_job(&self) -> Option<SearchJob> {
        Some(SearchJob {
            tracking_id: self.rid.clone()?,
            status: match self.status() {
                JobStatus::Unknown(_) => JobStatus::Submitted,
                status => status,
            },
            status_detail: self.status_code.clone(),
            entrez_query: self.entrez_query.clone(),
            title: self.job_title.clone(),
            max_hits: self.max_num_seq,
        })
    }
}

pub fn parse_wait_page(html: &str) -> WaitPage {
    WaitPage {
        rid: capture(&RID, html),
        status_text: capture(&STATUS_CELL, html).or_else(|| capture(&STATUS_ASSIGN, html)),
        status_code: capture(&DB_STATUS, html),
        job_title: capture(&JOB_TITLE, html),
        entrez_query: capture(&ENTREZ_QUERY, html),
        rtoe: capture(&RTOE, html),
        max_num_seq: capture(&MAX_NUM_SEQ, html)
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_NUM_SEQ),
    }
}

/// Error text of a BLAST page with markup removed, if the page carries one.
pub fn error_message(html: &str) -> Option<String> {
    if let Some(paragraph) = capture(&ERROR_PARAGRAPH, html) {
        let text = strip_markup(&paragraph);
        if !text.is_empty() {
            return Some(text);
        }
    }
    capture(&MESSAGE_ID_ERROR, html).map(|text| strip_markup(&text))
}

pub fn report_doctype(body: &str) -> Option<String> {
    capture(&DOCTYPE, body)
}

/// True when the body declares the BLAST XML document type.
pub fn is_blast_report(body: &str) -> bool {
    report_doctype(body)
        .map(|doctype| doctype.eq_ignore_ascii_case("BlastOutput"))
        .unwrap_or(false)
}

pub fn strip_markup(fragment: &str) -> String {
    MARKUP
        .replace_all(fragment, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}
