use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{BlastProgram, SearchJob};
use crate::error::KiraError;
use crate::pacing::Clock;
use crate::scrape;
use crate::webdriver::{BrowserOptions, BrowserSession, WebDriver};

pub const SUBMIT_URL: &str = "https://blast.ncbi.nlm.nih.gov/blast/Blast.cgi";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// Everything the SRA BLAST form needs for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitParams {
    pub experiments: Vec<String>,
    pub program: BlastProgram,
    pub query: String,
    pub query_range: Option<(u64, u64)>,
    pub max_num_seq: Option<u32>,
    pub expect: Option<f64>,
    pub filter: Option<String>,
    pub short_query: Option<bool>,
    pub word_size: Option<u32>,
    pub job_title: Option<String>,
}

impl SubmitParams {
    pub fn new(experiments: Vec<String>, program: BlastProgram, query: String) -> Self {
        Self {
            experiments,
            program,
            query,
            query_range: None,
            max_num_seq: None,
            expect: None,
            filter: None,
            short_query: None,
            word_size: None,
            job_title: None,
        }
    }
}

/// A submitted job plus the session cookies needed to poll it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingContext {
    pub job: SearchJob,
    pub cookies: Vec<SessionCookie>,
}

impl TrackingContext {
    pub fn rid(&self) -> &str {
        &self.job.tracking_id
    }
}

pub trait JobSubmitter: Send + Sync {
    fn submit(&self, params: &SubmitParams) -> Result<TrackingContext, KiraError>;
}

pub fn submission_url(base: &str, params: &SubmitParams) -> Result<String, KiraError> {
    let (first, extras) = params
        .experiments
        .split_first()
        .ok_or_else(|| KiraError::Submission("no experiment to search against".to_string()))?;
    let mut url = Url::parse(base).map_err(|err| KiraError::Submission(err.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("PAGE_TYPE", "BlastSearch")
            .append_pair("BLAST_SPEC", "SRA")
            .append_pair("DB_GROUP", "Exp")
            .append_pair("EQ_MENU", first);
        for (index, experiment) in extras.iter().enumerate() {
            pairs.append_pair(&format!("EQ_MENU{}", index + 1), experiment);
        }
        pairs.append_pair("NUM_ORG", &params.experiments.len().to_string());

        let (program, variant) = params.program.form_params();
        pairs.append_pair("PROGRAM", program);
        if let Some(variant) = variant {
            pairs.append_pair("BLAST_PROGRAMS", variant);
        }

        let optional = [
            ("MAX_NUM_SEQ", params.max_num_seq.map(|value| value.to_string())),
            ("EXPECT", params.expect.map(|value| value.to_string())),
            ("FILTER", params.filter.clone()),
            (
                "SHORT_QUERY_ADJUST",
                params
                    .short_query
                    .map(|on| if on { "on" } else { "off" }.to_string()),
            ),
            ("WORD_SIZE", params.word_size.map(|value| value.to_string())),
            ("JOB_TITLE", params.job_title.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                pairs.append_pair(key, &value);
            }
        }
    }
    Ok(url.into())
}

/// Submits through the interactive form in a headless Chrome.
pub struct WebDriverSubmitter {
    driver: WebDriver,
    options: BrowserOptions,
    base_url: String,
    clock: Arc<dyn Clock>,
    settle: Duration,
}

impl WebDriverSubmitter {
    pub fn new(driver: WebDriver, options: BrowserOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            driver,
            options,
            base_url: SUBMIT_URL.to_string(),
            clock,
            settle: Duration::from_secs(4),
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn fill_and_submit(
        &self,
        session: &BrowserSession,
        url: &str,
        params: &SubmitParams,
    ) -> Result<SearchJob, KiraError> {
        session.navigate(url)?;
        self.clock.sleep(self.settle);
        let query = session.find_by_name("QUERY")?;
        session.send_keys(&query, &params.query)?;
        if let Some((from, to)) = params.query_range {
            let field = session.find_by_name("QUERY_FROM")?;
            session.send_keys(&field, &from.to_string())?;
            let field = session.find_by_name("QUERY_TO")?;
            session.send_keys(&field, &to.to_string())?;
        }
        self.clock.sleep(self.settle);

        let page = self.click_submit(session)?;
        if let Some(job) = scrape::parse_wait_page(&page).to_job() {
            return Ok(job);
        }

        // The first click on a fresh form is sometimes swallowed.
        warn!("no RID on the wait page, submitting the form once more");
        self.clock.sleep(self.settle);
        let retry_page = match self.click_submit(session) {
            Ok(retry_page) => retry_page,
            Err(err) => {
                debug!(error = %err, "re-submission could not click the form");
                return Err(submission_error(&page));
            }
        };
        scrape::parse_wait_page(&retry_page)
            .to_job()
            .ok_or_else(|| submission_error(&retry_page))
    }

    fn click_submit(&self, session: &BrowserSession) -> Result<String, KiraError> {
        let button = session.find_by_css(".blastbutton")?;
        session.click(&button)?;
        self.clock.sleep(self.settle);
        session.page_source()
    }
}

impl JobSubmitter for WebDriverSubmitter {
    fn submit(&self, params: &SubmitParams) -> Result<TrackingContext, KiraError> {
        let url = submission_url(&self.base_url, params)?;
        debug!(url = %url, "submitting BLAST job");
        let session = self.driver.open(&self.options)?;
        let outcome = self
            .fill_and_submit(&session, &url, params)
            .and_then(|job| {
                let cookies = session.cookies()?;
                Ok(TrackingContext { job, cookies })
            });
        if let Err(err) = session.quit() {
            warn!(error = %err, "failed to close browser session");
        }
        outcome
    }
}

fn submission_error(page: &str) -> KiraError {
    match scrape::error_message(page) {
        Some(message) => KiraError::Submission(format!("error message from NCBI: {message}")),
        None => KiraError::Submission(
            "no RID found on the wait page and no extractable error message".to_string(),
        ),
    }
}
