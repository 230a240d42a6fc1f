//! Session orchestration: one end-to-end application run for one user
//! and one search.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::crawler::{Crawler, PageOutcome};
use crate::credentials::{CredentialStore, LOGIN_EMAIL_SELECTOR, LOGIN_PATH};
use crate::driver::Driver;
use crate::error::{EngineError, StoreError};
use crate::filter::{self, Verdict};
use crate::ledger::Ledger;
use crate::models::{
    ApplicationOutcome, RateLimitState, SearchQuery, SessionRecord, SkipOutcome, SkipReason,
};
use crate::rate_limit::RateLimiter;
use crate::resumes::ResumeCatalog;
use crate::store::{DataDir, JsonStore};
use crate::submit::{SubmitOutcome, Submitter};

const LOGIN_POLL: Duration = Duration::from_millis(250);

/// Everything one run needs, resolved from settings and flags before
/// the engine starts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub username: String,
    pub password: String,
    pub query: SearchQuery,
    /// Title terms that disqualify a listing. Not part of the board
    /// search; applied locally after the crawl.
    pub blacklist: Vec<String>,
    /// Catalog name of the resume to submit with.
    pub resume: String,
    pub jobs_per_hour: u32,
    pub resumes_per_minute: u32,
    pub element_wait: Duration,
    pub page_size: u32,
    pub board_url: String,
}

/// What the engine hands back after a run.
#[derive(Debug)]
pub struct RunReport {
    /// Ordered user-facing log of everything the session did.
    pub transcript: String,
    pub applied: usize,
}

/// Ordered log of a run. Lines mirror to tracing as they happen and
/// come back joined in the final report.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

pub struct SessionEngine {
    driver: Arc<dyn Driver>,
    credentials: Box<dyn CredentialStore>,
    data: DataDir,
}

impl SessionEngine {
    pub fn new(
        driver: Arc<dyn Driver>,
        credentials: Box<dyn CredentialStore>,
        data: DataDir,
    ) -> Self {
        Self {
            driver,
            credentials,
            data,
        }
    }

    /// Runs one full session: validate, authenticate, crawl, filter,
    /// submit, and finalize. Applied job ids reach the history store
    /// even when the crawl ends early, and the browser is released on
    /// every exit path past validation.
    pub async fn run(&self, config: &SessionConfig) -> Result<RunReport, EngineError> {
        validate(config)?;

        let outcome = self.run_session(config).await;

        if let Err(e) = self.driver.quit().await {
            warn!("browser did not shut down cleanly: {e}");
        }
        outcome
    }

    /// Everything between validation and releasing the browser. Failures
    /// propagate to [`SessionEngine::run`], which quits the driver no
    /// matter how this returns.
    async fn run_session(&self, config: &SessionConfig) -> Result<RunReport, EngineError> {
        let catalog = ResumeCatalog::open(&self.data)?;
        let resume_path = match catalog.resolve(&config.resume) {
            Ok(path) => path,
            Err(StoreError::UnknownResume(name)) => {
                return Err(EngineError::Validation(format!(
                    "resume '{name}' is not in the catalog"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let history_store = self.data.history();
        let mut history = history_store.load()?;
        let rate_store = self.data.rate_limits();
        let mut limiter = RateLimiter::new(
            rate_store.load()?,
            config.jobs_per_hour,
            config.resumes_per_minute,
        );

        let mut transcript = Transcript::default();

        self.authenticate(config, &mut transcript).await?;

        catalog.touch_last_used(&config.resume, Utc::now())?;

        let prior = history.get(&config.username).cloned().unwrap_or_default();
        let mut ledger = Ledger::from_ids(prior.applied_job_ids);
        if !ledger.is_empty() {
            transcript.push(format!(
                "{} previously applied job(s) will be skipped.",
                ledger.len()
            ));
        }

        let mut record = SessionRecord {
            keywords: config.query.keywords.clone(),
            blacklist: config.blacklist.clone(),
            location: config.query.location.clone(),
            employment_type: config.query.employment_type,
            prefer_remote: config.query.prefer_remote,
            resume: config.resume.clone(),
            started_at: Utc::now(),
            ended_at: None,
            applied_jobs: Vec::new(),
            skipped_jobs: Vec::new(),
        };

        let crawl_result = self
            .crawl_loop(
                config,
                &resume_path,
                &rate_store,
                &mut limiter,
                &mut ledger,
                &mut record,
                &mut transcript,
            )
            .await;

        // Finalizing. The dedup ledger always persists; the session
        // record joins history only when something was applied to.
        record.ended_at = Some(Utc::now());
        let applied = record.applied_jobs.len();
        let entry = history.entry(config.username.clone()).or_default();
        entry.applied_job_ids = ledger.to_sorted();
        if applied > 0 {
            entry.sessions.push(record);
        }
        history_store.save(&history)?;

        transcript.push(format!("Applied to {applied} job(s) this session."));

        crawl_result?;

        Ok(RunReport {
            transcript: transcript.render(),
            applied,
        })
    }

    /// The page-by-page crawl and submit loop. Driver failures end the
    /// loop gracefully so the caller can still finalize; store failures
    /// propagate.
    #[allow(clippy::too_many_arguments)]
    async fn crawl_loop(
        &self,
        config: &SessionConfig,
        resume_path: &Path,
        rate_store: &JsonStore<RateLimitState>,
        limiter: &mut RateLimiter,
        ledger: &mut Ledger,
        record: &mut SessionRecord,
        transcript: &mut Transcript,
    ) -> Result<(), StoreError> {
        let mut crawler = Crawler::new(
            self.driver.clone(),
            config.board_url.clone(),
            config.query.clone(),
            config.page_size,
            config.element_wait,
        );
        let submitter = Submitter::new(self.driver.clone(), config.element_wait);
        let mut session_skips: HashSet<String> = HashSet::new();

        'session: loop {
            let (page, outcome) = match crawler.next_page(ledger, &session_skips).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    transcript.push(format!("Browser error while crawling: {e}. Ending session."));
                    break 'session;
                }
            };

            let listings = match outcome {
                PageOutcome::EndOfResults => {
                    transcript.push(format!("No jobs found on page {page}. End of results."));
                    break 'session;
                }
                PageOutcome::NoFreshListings => {
                    transcript.push(format!(
                        "Nothing new on page {page}; every listing was already applied to or skipped."
                    ));
                    break 'session;
                }
                PageOutcome::Halt(reason) => {
                    transcript.push(format!("{reason} Stopping session."));
                    break 'session;
                }
                PageOutcome::Candidates(listings) => listings,
            };
            transcript.push(format!(
                "Found {} new listing(s) on page {page}.",
                listings.len()
            ));

            for job in listings {
                transcript.push(format!("Processing: {}", job.title));

                match filter::evaluate(&job.title, &config.query.keywords, &config.blacklist) {
                    Verdict::Reject(reason) => {
                        transcript.push(format!("Skipped: {reason}."));
                        session_skips.insert(job.id.clone());
                        record
                            .skipped_jobs
                            .push(SkipOutcome::from_listing(&job, reason, Utc::now()));
                    }
                    Verdict::Accept => {
                        // The budget gate runs before any browser work,
                        // so a rejected submission costs nothing.
                        if !limiter.can_submit(Utc::now()) {
                            transcript.push(format!(
                                "Hourly application budget ({}/hour) is spent. Ending session.",
                                limiter.jobs_per_hour()
                            ));
                            break 'session;
                        }

                        match submitter.apply(&job, resume_path).await {
                            SubmitOutcome::Applied => {
                                let now = Utc::now();
                                ledger.record(job.id.clone());
                                limiter.record_submission(now);
                                rate_store.save(limiter.state())?;
                                record
                                    .applied_jobs
                                    .push(ApplicationOutcome::from_listing(&job, now));
                                transcript
                                    .push(format!("Successfully applied to {}.", job.title));

                                let pause = limiter.submission_pause();
                                debug!(?pause, "pausing to spread submissions");
                                sleep(pause).await;
                            }
                            SubmitOutcome::JobFailure(error) => {
                                transcript
                                    .push(format!("Failed to apply to {}: {error}.", job.title));
                                session_skips.insert(job.id.clone());
                                record.skipped_jobs.push(SkipOutcome::from_listing(
                                    &job,
                                    SkipReason::ApplicationFailed { error },
                                    Utc::now(),
                                ));
                            }
                            SubmitOutcome::SessionHalt(reason) => {
                                transcript.push(format!("{reason} Stopping session."));
                                break 'session;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn authenticate(
        &self,
        config: &SessionConfig,
        transcript: &mut Transcript,
    ) -> Result<(), EngineError> {
        match self.credentials.try_restore(&config.username).await {
            Ok(true) => {
                transcript.push("Restored a cached login session.");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => warn!("session restore failed, falling back to login: {e:#}"),
        }

        let login_url = format!("{}{}", config.board_url.trim_end_matches('/'), LOGIN_PATH);
        self.driver
            .navigate(&login_url)
            .await
            .map_err(|e| EngineError::Auth(format!("could not open the login page: {e}")))?;
        let email_field = self
            .driver
            .wait_for(LOGIN_EMAIL_SELECTOR, config.element_wait)
            .await
            .map_err(|e| EngineError::Auth(format!("login form did not appear: {e}")))?;

        // Tab moves to the password field; the trailing newline submits.
        let keys = format!("{}\t{}\n", config.username, config.password);
        self.driver
            .type_into(email_field, &keys)
            .await
            .map_err(|e| EngineError::Auth(format!("could not enter credentials: {e}")))?;

        // The form tearing itself down is the only confirmation the
        // board gives. A form that stays up did not accept us.
        let deadline = Instant::now() + config.element_wait;
        loop {
            match self.driver.is_visible(email_field).await {
                Ok(false) => break,
                Ok(true) => {}
                Err(e) => {
                    return Err(EngineError::Auth(format!("could not verify the login: {e}")));
                }
            }
            if Instant::now() >= deadline {
                return Err(EngineError::Auth(
                    "the login form did not accept the credentials".to_string(),
                ));
            }
            sleep(LOGIN_POLL).await;
        }

        transcript.push("Logged in successfully.");

        if let Err(e) = self.credentials.persist(&config.username).await {
            warn!("could not cache the login session: {e:#}");
        }
        Ok(())
    }
}

fn validate(config: &SessionConfig) -> Result<(), EngineError> {
    if config.username.trim().is_empty() {
        return Err(EngineError::Validation("a username is required".to_string()));
    }
    if config.password.trim().is_empty() {
        return Err(EngineError::Validation("a password is required".to_string()));
    }
    if !config.query.keywords.iter().any(|k| !k.trim().is_empty()) {
        return Err(EngineError::Validation(
            "at least one search keyword is required".to_string(),
        ));
    }
    if config.resume.trim().is_empty() {
        return Err(EngineError::Validation(
            "a resume selection is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmploymentType;

    fn config() -> SessionConfig {
        SessionConfig {
            username: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
            query: SearchQuery {
                keywords: vec!["python".to_string()],
                location: None,
                employment_type: EmploymentType::ThirdParty,
                prefer_remote: false,
            },
            blacklist: Vec::new(),
            resume: "cv.pdf".to_string(),
            jobs_per_hour: 15,
            resumes_per_minute: 1,
            element_wait: Duration::from_secs(5),
            page_size: 100,
            board_url: "https://board.test".to_string(),
        }
    }

    #[test]
    fn validation_requires_each_mandatory_input() {
        assert!(validate(&config()).is_ok());

        let mut missing_user = config();
        missing_user.username = "  ".to_string();
        assert!(matches!(
            validate(&missing_user),
            Err(EngineError::Validation(msg)) if msg.contains("username")
        ));

        let mut missing_password = config();
        missing_password.password = String::new();
        assert!(matches!(
            validate(&missing_password),
            Err(EngineError::Validation(msg)) if msg.contains("password")
        ));

        let mut missing_keywords = config();
        missing_keywords.query.keywords = vec![" ".to_string()];
        assert!(matches!(
            validate(&missing_keywords),
            Err(EngineError::Validation(msg)) if msg.contains("keyword")
        ));

        let mut missing_resume = config();
        missing_resume.resume = String::new();
        assert!(matches!(
            validate(&missing_resume),
            Err(EngineError::Validation(msg)) if msg.contains("resume")
        ));
    }

    #[test]
    fn transcript_renders_lines_in_order() {
        let mut transcript = Transcript::default();
        transcript.push("first");
        transcript.push("second".to_string());

        assert_eq!(transcript.lines().len(), 2);
        assert_eq!(transcript.render(), "first\nsecond");
    }
}
