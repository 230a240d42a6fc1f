use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One job card scraped from a search results page. Lives for a single
/// crawl iteration and is never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    /// Board-assigned identifier, treated as opaque text.
    pub id: String,
    pub title: String,
    /// Empty when the card does not carry a company name.
    pub company: String,
    pub url: String,
    /// The board's own "applied" ribbon was present on the card.
    pub marked_applied: bool,
}

/// Why a listing was passed over instead of applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingKeyword,
    Blacklisted,
    ApplicationFailed { error: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingKeyword => write!(f, "missing keywords in job title"),
            SkipReason::Blacklisted => write!(f, "blacklisted word found"),
            SkipReason::ApplicationFailed { error } => write!(f, "application failed: {error}"),
        }
    }
}

/// A submission that went through, as recorded in session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationOutcome {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub applied_at: DateTime<Utc>,
}

impl ApplicationOutcome {
    pub fn from_listing(job: &JobListing, applied_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            url: job.url.clone(),
            applied_at,
        }
    }
}

/// A listing that was seen but not applied to, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipOutcome {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub reason: SkipReason,
    pub skipped_at: DateTime<Utc>,
}

impl SkipOutcome {
    pub fn from_listing(job: &JobListing, reason: SkipReason, skipped_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            url: job.url.clone(),
            reason,
            skipped_at,
        }
    }
}

/// Everything one run did. Appended whole to the user's history at the
/// end of a session, but only when at least one application went through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub keywords: Vec<String>,
    pub blacklist: Vec<String>,
    pub location: Option<String>,
    pub employment_type: EmploymentType,
    pub prefer_remote: bool,
    /// Catalog name of the resume used for every submission in this run.
    pub resume: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub applied_jobs: Vec<ApplicationOutcome>,
    pub skipped_jobs: Vec<SkipOutcome>,
}

/// Cumulative per-user record. `applied_job_ids` only ever grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserHistory {
    pub applied_job_ids: BTreeSet<String>,
    pub sessions: Vec<SessionRecord>,
}

/// The whole history document, keyed by username.
pub type HistoryDoc = BTreeMap<String, UserHistory>;

/// Persisted rate-limit counters, shared by every session of this
/// installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitState {
    pub jobs_per_hour: u32,
    pub resumes_per_minute: u32,
    /// Start of the current submission window. Unset until the first
    /// submission after install or window expiry.
    pub window_started_at: Option<DateTime<Utc>>,
    pub jobs_in_window: u32,
    pub last_resume_upload: Option<DateTime<Utc>>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            jobs_per_hour: 15,
            resumes_per_minute: 1,
            window_started_at: None,
            jobs_in_window: 0,
            last_resume_upload: None,
        }
    }
}

/// One managed resume file, keyed in the catalog by `stored_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeEntry {
    /// File name inside the managed resume directory. Unique.
    pub stored_name: String,
    /// Name the file had when it was added.
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub notes: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
}

/// The resume catalog document, keyed by stored name.
pub type ResumeCatalogDoc = BTreeMap<String, ResumeEntry>;

/// Employment type filter understood by the job board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    ThirdParty,
    Internship,
}

impl EmploymentType {
    /// Value the board expects in the search URL's employment filter.
    pub fn filter_code(self) -> &'static str {
        match self {
            EmploymentType::FullTime => "FULLTIME",
            EmploymentType::PartTime => "PARTTIME",
            EmploymentType::Contract => "CONTRACTS",
            EmploymentType::ThirdParty => "THIRD_PARTY",
            EmploymentType::Internship => "INTERNSHIP",
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmploymentType::FullTime => "full-time",
            EmploymentType::PartTime => "part-time",
            EmploymentType::Contract => "contract",
            EmploymentType::ThirdParty => "third-party",
            EmploymentType::Internship => "internship",
        };
        write!(f, "{name}")
    }
}

impl FromStr for EmploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "full-time" | "fulltime" => Ok(EmploymentType::FullTime),
            "part-time" | "parttime" => Ok(EmploymentType::PartTime),
            "contract" | "contracts" => Ok(EmploymentType::Contract),
            "third-party" | "thirdparty" | "c2c" => Ok(EmploymentType::ThirdParty),
            "internship" | "intern" => Ok(EmploymentType::Internship),
            other => Err(format!(
                "unknown employment type '{other}' (expected full-time, part-time, contract, third-party, or internship)"
            )),
        }
    }
}

/// What the user asked the crawler to search for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub employment_type: EmploymentType,
    pub prefer_remote: bool,
}

/// Saved defaults merged under the command line on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub board_url: String,
    pub webdriver_url: String,
    pub default_keywords: Vec<String>,
    pub default_blacklist: Vec<String>,
    pub location: Option<String>,
    pub employment_type: EmploymentType,
    pub prefer_remote: bool,
    pub jobs_per_hour: u32,
    pub resumes_per_minute: u32,
    /// How long to wait for any page element before giving up on it.
    pub element_wait_secs: u64,
    pub page_size: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            board_url: "https://www.dice.com".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            default_keywords: Vec::new(),
            default_blacklist: Vec::new(),
            location: None,
            employment_type: EmploymentType::ThirdParty,
            prefer_remote: false,
            jobs_per_hour: 15,
            resumes_per_minute: 1,
            element_wait_secs: 5,
            page_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employment_type_parses_common_spellings() {
        assert_eq!("contract".parse::<EmploymentType>().unwrap(), EmploymentType::Contract);
        assert_eq!("THIRD_PARTY".parse::<EmploymentType>().unwrap(), EmploymentType::ThirdParty);
        assert_eq!("Full-Time".parse::<EmploymentType>().unwrap(), EmploymentType::FullTime);
        assert!("freelance".parse::<EmploymentType>().is_err());
    }

    #[test]
    fn skip_reason_serializes_with_kind_tag() {
        let reason = SkipReason::ApplicationFailed {
            error: "no apply button".to_string(),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "application_failed");
        assert_eq!(json["error"], "no apply button");

        let plain = serde_json::to_value(SkipReason::MissingKeyword).unwrap();
        assert_eq!(plain["kind"], "missing_keyword");
    }

    #[test]
    fn rate_limit_state_defaults_apply_to_missing_fields() {
        let state: RateLimitState = serde_json::from_str("{}").unwrap();
        assert_eq!(state.jobs_per_hour, 15);
        assert_eq!(state.resumes_per_minute, 1);
        assert_eq!(state.jobs_in_window, 0);
        assert!(state.window_started_at.is_none());
    }
}
