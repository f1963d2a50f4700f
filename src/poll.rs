use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{JobStatus, SearchJob};
use crate::error::KiraError;
use crate::pacing::{Clock, Pacer};
use crate::scrape;
use crate::submit::{SessionCookie, TrackingContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResponse {
    pub status: u16,
    pub body: String,
}

impl PollResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Cookie-authenticated GET against the BLAST CGI.
pub trait PollTransport: Send + Sync {
    fn get(
        &self,
        params: &[(&'static str, String)],
        cookies: &[SessionCookie],
    ) -> Result<PollResponse, KiraError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Minimum delay between submission and the first status poll.
    pub initial_delay: Duration,
    /// Minimum spacing between any two later requests for the same job.
    pub interval: Duration,
    /// Consecutive unproductive responses tolerated before giving up.
    pub max_stalled_polls: Option<usize>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(20),
            interval: Duration::from_secs(60),
            max_stalled_polls: Some(30),
        }
    }
}

pub struct JobPoller<T: PollTransport> {
    transport: T,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl<T: PollTransport> JobPoller<T> {
    pub fn new(transport: T, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Starts the poll loop for a freshly submitted job; the initial delay counts from now.
    pub fn start<'a>(&'a self, context: &'a TrackingContext) -> PollSession<'a, T> {
        PollSession {
            poller: self,
            context,
            pacer: Pacer::starting_at(self.clock.now()),
            status: context.job.status.clone(),
            stalled: 0,
            requests: 0,
        }
    }
}

/// Polling state of one job. Every request for the job goes through here so
/// that status polls and report re-fetches share one spacing budget.
pub struct PollSession<'a, T: PollTransport> {
    poller: &'a JobPoller<T>,
    context: &'a TrackingContext,
    pacer: Pacer,
    status: JobStatus,
    stalled: usize,
    requests: usize,
}

impl<T: PollTransport> PollSession<'_, T> {
    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Polls until the job is ready and returns its XML report.
    pub fn wait_for_report(&mut self) -> Result<String, KiraError> {
        let rid = self.context.rid().to_string();
        let mut spacing = self.poller.policy.initial_delay;
        loop {
            self.pacer.wait(self.poller.clock.as_ref(), spacing);
            spacing = self.poller.policy.interval;

            let page = match self.request(false) {
                Ok(page) => page,
                Err(err) => {
                    warn!(rid = %rid, error = %err, "status poll failed, retrying");
                    continue;
                }
            };

            let wait = scrape::parse_wait_page(&page);
            if wait.rid.as_deref() != Some(rid.as_str()) {
                warn!(rid = %rid, found = ?wait.rid, "status page does not echo the tracking id");
                self.stall("missing RID")?;
                continue;
            }

            let status = wait.status();
            debug!(rid = %rid, status = %status, "polled job status");
            match status {
                JobStatus::Waiting | JobStatus::Searching => {
                    self.stalled = 0;
                    self.status = status;
                }
                JobStatus::Ready => {
                    self.stalled = 0;
                    self.status = JobStatus::Ready;
                    info!(rid = %rid, "job ready, retrieving report");
                    return self.fetch_report(Duration::ZERO);
                }
                JobStatus::Failed => {
                    self.status = JobStatus::Failed;
                    let message = scrape::error_message(&page).unwrap_or_else(|| "NA".to_string());
                    return Err(KiraError::SearchJobFailed { rid, message });
                }
                other => {
                    warn!(rid = %rid, status = %other, "unrecognized job status, polling again");
                    self.stall(&other.to_string())?;
                }
            }
        }
    }

    /// Requests the report again, one full interval after the previous request.
    pub fn refetch_report(&mut self) -> Result<String, KiraError> {
        self.fetch_report(self.poller.policy.interval)
    }

    fn fetch_report(&mut self, first_spacing: Duration) -> Result<String, KiraError> {
        let rid = self.context.rid().to_string();
        let mut spacing = first_spacing;
        loop {
            self.pacer.wait(self.poller.clock.as_ref(), spacing);
            spacing = self.poller.policy.interval;
            match self.request(true) {
                Ok(body) if scrape::is_blast_report(&body) => {
                    self.stalled = 0;
                    self.status = JobStatus::Retrieved;
                    return Ok(body);
                }
                Ok(body) => {
                    let doctype = scrape::report_doctype(&body);
                    warn!(rid = %rid, doctype = ?doctype, "report is not BLAST XML, fetching again");
                    self.stall(doctype.as_deref().unwrap_or("no doctype"))?;
                }
                Err(err) => {
                    warn!(rid = %rid, error = %err, "report request failed, retrying");
                }
            }
        }
    }

    fn request(&mut self, report: bool) -> Result<String, KiraError> {
        self.requests += 1;
        let params = poll_params(&self.context.job, report);
        let response = self
            .poller
            .transport
            .get(&params, &self.context.cookies)?;
        if !response.is_success() {
            let message = scrape::error_message(&response.body)
                .unwrap_or_else(|| "unexpected response".to_string());
            return Err(KiraError::BlastStatus {
                status: response.status,
                message,
            });
        }
        Ok(response.body)
    }

    fn stall(&mut self, status: &str) -> Result<(), KiraError> {
        self.stalled += 1;
        if let Some(limit) = self.poller.policy.max_stalled_polls {
            if self.stalled >= limit {
                return Err(KiraError::PollStalled {
                    rid: self.context.rid().to_string(),
                    status: status.to_string(),
                    polls: self.stalled,
                });
            }
        }
        Ok(())
    }
}

pub fn poll_params(job: &SearchJob, report: bool) -> Vec<(&'static str, String)> {
    let mut params = vec![("RID", job.tracking_id.clone())];
    if let Some(title) = &job.title {
        params.push(("JOB_TITLE", title.clone()));
    }
    if let Some(query) = &job.entrez_query {
        params.push(("ENTREZ_QUERY", query.clone()));
    }
    params.push(("MAX_NUM_SEQ", job.max_hits.to_string()));
    params.push(("CMD", "Get".to_string()));
    if report {
        params.push(("FORMAT_TYPE", "XML".to_string()));
    }
    params
}
