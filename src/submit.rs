//! Drives one job's apply flow from opened listing to confirmed
//! submission.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::driver::{Driver, DriverResult};
use crate::error::DriverError;
use crate::models::JobListing;

/// The board's custom apply widget. Only usable once its label settles
/// on "Apply Now".
const APPLY_BUTTON_SELECTOR: &str = "dhi-wc-apply-button";
const APPLY_BUTTON_READY_TEXT: &str = "Apply Now";
const RESUME_RADIO_SELECTOR: &str = "input#upload-resume-radio";
const RESUME_FILE_INPUT_SELECTOR: &str = "input#upload-resume-file-input";
const SUBMIT_BUTTON_SELECTOR: &str = "button#submit-job-btn";

/// Challenge widget the board raises when it has had enough
/// applications for the day.
pub(crate) const CHALLENGE_SELECTOR: &str = "div[id^=googleCaptchaSection]";

const CONFIRM_POLL: Duration = Duration::from_millis(250);

/// Result of one apply attempt. A job failure keeps the session loop
/// going; a halt ends the whole session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Applied,
    JobFailure(String),
    SessionHalt(String),
}

/// Checks for the challenge widget without waiting for it. The widget
/// is often present but hidden, so presence alone is not a signal.
pub(crate) async fn challenge_visible(driver: &dyn Driver) -> DriverResult<bool> {
    match driver.wait_for(CHALLENGE_SELECTOR, Duration::ZERO).await {
        Ok(handle) => driver.is_visible(handle).await,
        Err(DriverError::NotFound(_)) | Err(DriverError::Timeout { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

pub struct Submitter {
    driver: Arc<dyn Driver>,
    element_wait: Duration,
}

impl Submitter {
    pub fn new(driver: Arc<dyn Driver>, element_wait: Duration) -> Self {
        Self {
            driver,
            element_wait,
        }
    }

    /// Applies to one job with the given resume. Unexpected driver
    /// failures come back as job failures so one broken listing cannot
    /// take down the whole run.
    pub async fn apply(&self, job: &JobListing, resume_path: &Path) -> SubmitOutcome {
        match self.try_apply(job, resume_path).await {
            Ok(outcome) => outcome,
            Err(e) => SubmitOutcome::JobFailure(e.to_string()),
        }
    }

    async fn try_apply(&self, job: &JobListing, resume_path: &Path) -> DriverResult<SubmitOutcome> {
        debug!(job_id = %job.id, url = %job.url, "opening listing");
        self.driver.navigate(&job.url).await?;

        let apply_button = match self
            .driver
            .wait_for_text(APPLY_BUTTON_SELECTOR, APPLY_BUTTON_READY_TEXT, self.element_wait)
            .await
        {
            Ok(handle) => handle,
            Err(DriverError::Timeout { .. }) | Err(DriverError::NotFound(_)) => {
                return Ok(SubmitOutcome::JobFailure(
                    "apply control never became interactive".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };
        self.driver.click(apply_button).await?;

        let resume_radio = match self
            .driver
            .wait_for(RESUME_RADIO_SELECTOR, self.element_wait)
            .await
        {
            Ok(handle) => handle,
            Err(DriverError::Timeout { .. }) | Err(DriverError::NotFound(_)) => {
                return Ok(SubmitOutcome::JobFailure(
                    "resume upload option did not appear".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        // The challenge overlay outranks the rest of the form. Hitting
        // it means the board is done taking applications today.
        if challenge_visible(self.driver.as_ref()).await? {
            return Ok(SubmitOutcome::SessionHalt(
                "Daily application limit reached.".to_string(),
            ));
        }

        let submit_button = match self
            .driver
            .wait_for(SUBMIT_BUTTON_SELECTOR, self.element_wait)
            .await
        {
            Ok(handle) => handle,
            Err(DriverError::Timeout { .. }) | Err(DriverError::NotFound(_)) => {
                return Ok(SubmitOutcome::JobFailure(
                    "submit control did not appear".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };
        let file_input = match self
            .driver
            .wait_for(RESUME_FILE_INPUT_SELECTOR, self.element_wait)
            .await
        {
            Ok(handle) => handle,
            Err(DriverError::Timeout { .. }) | Err(DriverError::NotFound(_)) => {
                return Ok(SubmitOutcome::JobFailure(
                    "resume file input did not appear".to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        self.driver.click(resume_radio).await?;
        self.driver.set_input_file(file_input, resume_path).await?;
        self.driver.click(submit_button).await?;

        // Confirmation is the form tearing itself down: the submit
        // control disappears or goes stale once the application lands.
        let deadline = Instant::now() + self.element_wait;
        loop {
            if !self.driver.is_visible(submit_button).await? {
                info!(job_id = %job.id, title = %job.title, "application submitted");
                return Ok(SubmitOutcome::Applied);
            }
            if Instant::now() >= deadline {
                return Ok(SubmitOutcome::JobFailure(
                    "submission was not confirmed in time".to_string(),
                ));
            }
            sleep(CONFIRM_POLL).await;
        }
    }
}
