use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use easyapply::driver::{BrowserOptions, Driver, WebDriverSession};
use easyapply::models::{SearchQuery, UserHistory};
use easyapply::rate_limit::RateLimiter;
use easyapply::resumes::{ResumeCatalog, UploadOutcome};
use easyapply::{CookieCache, DataDir, SessionConfig, SessionEngine};

#[derive(Parser)]
#[command(name = "easyapply")]
#[command(about = "Job board automation - search, filter, and apply with a stored resume")]
struct Cli {
    /// Override the data directory (stores, resumes, cookies)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one application session
    Apply {
        /// Board account email (falls back to DICE_USERNAME)
        #[arg(short, long)]
        username: Option<String>,

        /// Board account password (falls back to DICE_PASSWORD)
        #[arg(long)]
        password: Option<String>,

        /// Search keywords; every one must appear in a job title
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Title terms that disqualify a listing
        #[arg(short, long, value_delimiter = ',')]
        blacklist: Vec<String>,

        /// Resume to submit, by catalog name (see `resume list`)
        #[arg(short, long)]
        resume: Option<String>,

        /// Search location
        #[arg(long)]
        location: Option<String>,

        /// Employment type (full-time, part-time, contract, third-party, internship)
        #[arg(long)]
        employment_type: Option<String>,

        /// Prefer remote listings
        #[arg(long)]
        remote: bool,

        /// Cap on applications per hour
        #[arg(long)]
        jobs_per_hour: Option<u32>,

        /// WebDriver server to drive the browser through
        #[arg(long)]
        webdriver_url: Option<String>,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Browser profile directory to reuse between runs
        #[arg(long)]
        profile_dir: Option<PathBuf>,
    },

    /// Show application history
    History {
        /// Account to show (defaults to every account)
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Manage the resume catalog
    Resume {
        #[command(subcommand)]
        command: ResumeCommands,
    },

    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// Copy a resume file into the catalog
    Add {
        /// Path to the resume file
        file: PathBuf,

        /// Optional notes about this resume
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List cataloged resumes
    List,

    /// Rename a stored resume
    Rename {
        /// Current catalog name
        old: String,

        /// New catalog name
        new: String,
    },

    /// Replace the notes on a resume
    Notes {
        /// Catalog name
        name: String,

        /// New notes text
        notes: String,
    },

    /// Delete a resume from the catalog
    Delete {
        /// Catalog name
        name: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the saved settings
    Show,

    /// Change saved settings
    Set {
        #[arg(long)]
        board_url: Option<String>,

        #[arg(long)]
        webdriver_url: Option<String>,

        /// Default search keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Option<Vec<String>>,

        /// Default blacklist terms
        #[arg(long, value_delimiter = ',')]
        blacklist: Option<Vec<String>>,

        #[arg(long)]
        location: Option<String>,

        /// Default employment type
        #[arg(long)]
        employment_type: Option<String>,

        /// Prefer remote listings by default (true/false)
        #[arg(long)]
        remote: Option<bool>,

        #[arg(long)]
        jobs_per_hour: Option<u32>,

        #[arg(long)]
        resumes_per_minute: Option<u32>,

        /// Seconds to wait for page elements
        #[arg(long)]
        wait_secs: Option<u64>,

        #[arg(long)]
        page_size: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("easyapply=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let data = match &cli.data_dir {
        Some(dir) => DataDir::at(dir)?,
        None => DataDir::default_location()?,
    };

    match cli.command {
        Commands::Apply {
            username,
            password,
            keywords,
            blacklist,
            resume,
            location,
            employment_type,
            remote,
            jobs_per_hour,
            webdriver_url,
            headless,
            profile_dir,
        } => {
            let settings = data.settings().load()?;

            let username = username
                .or_else(|| std::env::var("DICE_USERNAME").ok())
                .unwrap_or_default();
            let password = password
                .or_else(|| std::env::var("DICE_PASSWORD").ok())
                .unwrap_or_default();
            let keywords = if keywords.is_empty() {
                settings.default_keywords.clone()
            } else {
                keywords
            };
            let blacklist = if blacklist.is_empty() {
                settings.default_blacklist.clone()
            } else {
                blacklist
            };
            // "python engineer" is two terms, matching each separately.
            let keywords = split_terms(&keywords);
            let blacklist = split_terms(&blacklist);
            let employment_type = match employment_type {
                Some(raw) => raw.parse().map_err(|e: String| anyhow!(e))?,
                None => settings.employment_type,
            };

            let config = SessionConfig {
                username,
                password,
                query: SearchQuery {
                    keywords,
                    location: location.or_else(|| settings.location.clone()),
                    employment_type,
                    prefer_remote: remote || settings.prefer_remote,
                },
                blacklist,
                resume: resume.unwrap_or_default(),
                jobs_per_hour: jobs_per_hour.unwrap_or(settings.jobs_per_hour),
                resumes_per_minute: settings.resumes_per_minute,
                element_wait: Duration::from_secs(settings.element_wait_secs),
                page_size: settings.page_size,
                board_url: settings.board_url.clone(),
            };

            let webdriver_url = webdriver_url.unwrap_or_else(|| settings.webdriver_url.clone());
            let options = BrowserOptions {
                headless,
                profile_dir,
            };

            println!("Starting browser session...");
            let driver = WebDriverSession::connect(&webdriver_url, &options)
                .await
                .with_context(|| {
                    format!(
                        "Failed to reach the WebDriver server at {webdriver_url}. Is chromedriver running?"
                    )
                })?;
            let driver: Arc<dyn Driver> = Arc::new(driver);
            let credentials = CookieCache::new(driver.clone(), &data, config.board_url.clone());
            let engine = SessionEngine::new(driver, Box::new(credentials), data);

            let report = engine.run(&config).await?;
            println!("\n--- Session log ---");
            println!("{}", report.transcript);
        }

        Commands::History { username } => {
            let history = data.history().load()?;
            let users: Vec<_> = match &username {
                Some(user) => history.get_key_value(user).into_iter().collect(),
                None => history.iter().collect(),
            };

            if users.is_empty() {
                match username {
                    Some(user) => println!("No history for '{}'.", user),
                    None => println!("No history found."),
                }
            }

            for (user, record) in users {
                print!("{}", render_user_history(user, record));
            }
        }

        Commands::Resume { command } => {
            let catalog = ResumeCatalog::open(&data)?;
            match command {
                ResumeCommands::Add { file, notes } => {
                    let settings = data.settings().load()?;
                    let rate_store = data.rate_limits();
                    let mut limiter = RateLimiter::new(
                        rate_store.load()?,
                        settings.jobs_per_hour,
                        settings.resumes_per_minute,
                    );

                    match catalog.add(&file, notes, &mut limiter, Utc::now())? {
                        UploadOutcome::Added(entry) => {
                            rate_store.save(limiter.state())?;
                            println!(
                                "Added resume '{}' ({} bytes)",
                                entry.stored_name, entry.size_bytes
                            );
                            if entry.stored_name != entry.original_name {
                                println!(
                                    "(stored as '{}' because '{}' was taken)",
                                    entry.stored_name, entry.original_name
                                );
                            }
                        }
                        UploadOutcome::CooldownActive { retry_in } => {
                            println!(
                                "Resume uploads are limited to one per minute. Try again in {}s.",
                                retry_in.as_secs()
                            );
                        }
                    }
                }

                ResumeCommands::List => {
                    let entries = catalog.entries()?;
                    if entries.is_empty() {
                        println!("No resumes in the catalog.");
                    } else {
                        println!(
                            "{:<28} {:>10} {:<18} {:<18}",
                            "NAME", "SIZE", "ADDED", "LAST USED"
                        );
                        println!("{}", "-".repeat(78));
                        for entry in entries {
                            let last_used = entry
                                .last_used
                                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                                .unwrap_or_else(|| "-".to_string());
                            println!(
                                "{:<28} {:>10} {:<18} {:<18}",
                                truncate(&entry.stored_name, 26),
                                format!("{} B", entry.size_bytes),
                                entry.uploaded_at.format("%Y-%m-%d %H:%M"),
                                last_used
                            );
                            if let Some(notes) = &entry.notes {
                                println!("    {}", notes);
                            }
                        }
                    }
                }

                ResumeCommands::Rename { old, new } => {
                    catalog.rename(&old, &new)?;
                    println!("Renamed '{}' to '{}'.", old, new);
                }

                ResumeCommands::Notes { name, notes } => {
                    catalog.set_notes(&name, Some(notes))?;
                    println!("Updated notes for '{}'.", name);
                }

                ResumeCommands::Delete { name } => {
                    catalog.remove(&name)?;
                    println!("Deleted resume '{}'.", name);
                }
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let settings = data.settings().load()?;
                println!("data_dir:           {}", data.root().display());
                println!("board_url:          {}", settings.board_url);
                println!("webdriver_url:      {}", settings.webdriver_url);
                println!("keywords:           {}", settings.default_keywords.join(", "));
                println!("blacklist:          {}", settings.default_blacklist.join(", "));
                println!(
                    "location:           {}",
                    settings.location.as_deref().unwrap_or("-")
                );
                println!("employment_type:    {}", settings.employment_type);
                println!("prefer_remote:      {}", settings.prefer_remote);
                println!("jobs_per_hour:      {}", settings.jobs_per_hour);
                println!("resumes_per_minute: {}", settings.resumes_per_minute);
                println!("element_wait_secs:  {}", settings.element_wait_secs);
                println!("page_size:          {}", settings.page_size);
            }

            ConfigCommands::Set {
                board_url,
                webdriver_url,
                keywords,
                blacklist,
                location,
                employment_type,
                remote,
                jobs_per_hour,
                resumes_per_minute,
                wait_secs,
                page_size,
            } => {
                let store = data.settings();
                let mut settings = store.load()?;

                if let Some(v) = board_url {
                    settings.board_url = v;
                }
                if let Some(v) = webdriver_url {
                    settings.webdriver_url = v;
                }
                if let Some(v) = keywords {
                    settings.default_keywords = v;
                }
                if let Some(v) = blacklist {
                    settings.default_blacklist = v;
                }
                if let Some(v) = location {
                    settings.location = Some(v);
                }
                if let Some(raw) = employment_type {
                    settings.employment_type = raw.parse().map_err(|e: String| anyhow!(e))?;
                }
                if let Some(v) = remote {
                    settings.prefer_remote = v;
                }
                if let Some(v) = jobs_per_hour {
                    settings.jobs_per_hour = v;
                }
                if let Some(v) = resumes_per_minute {
                    settings.resumes_per_minute = v;
                }
                if let Some(v) = wait_secs {
                    settings.element_wait_secs = v;
                }
                if let Some(v) = page_size {
                    settings.page_size = v;
                }

                store.save(&settings)?;
                println!("Settings saved to {}", store.path().display());
            }
        },
    }

    Ok(())
}

// Terms may arrive comma-delimited from clap or space-separated inside
// one quoted value; both split down to individual terms.
fn split_terms(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|term| term.split_whitespace())
        .map(str::to_string)
        .collect()
}

/// One user's block of `history` output: the headline count, the
/// applied job ids, then each recorded session with its titles.
fn render_user_history(user: &str, record: &UserHistory) -> String {
    let mut out = format!(
        "{}: {} job(s) applied to across {} recorded session(s)\n",
        user,
        record.applied_job_ids.len(),
        record.sessions.len()
    );
    if !record.applied_job_ids.is_empty() {
        let ids: Vec<_> = record.applied_job_ids.iter().map(String::as_str).collect();
        out.push_str(&format!("  applied ids: {}\n", ids.join(", ")));
    }
    for session in &record.sessions {
        out.push_str(&format!(
            "  {} | applied {:>3}, skipped {:>3} | {}\n",
            session.started_at.format("%Y-%m-%d %H:%M"),
            session.applied_jobs.len(),
            session.skipped_jobs.len(),
            session.keywords.join(" ")
        ));
        for job in &session.applied_jobs {
            let company = if job.company.is_empty() {
                String::new()
            } else {
                format!(" ({})", job.company)
            };
            out.push_str(&format!("    {}{}\n", truncate(&job.title, 60), company));
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    // Back up to a char boundary so multibyte titles cannot split a
    // character at the cut point.
    let mut cut = max.saturating_sub(3);
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

#[cfg(test)]
mod tests {
    use super::{render_user_history, truncate};
    use easyapply::models::UserHistory;

    #[test]
    fn truncate_cuts_on_char_boundaries() {
        let plain = "a".repeat(70);
        assert_eq!(truncate(&plain, 60).len(), 60);

        // En dash straddles the cut point; the slice must not land
        // inside it.
        let dashed = format!("{}\u{2013}bb", "a".repeat(56));
        let cut = truncate(&dashed, 60);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 60);

        assert_eq!(truncate("short", 60), "short");
    }

    #[test]
    fn history_rendering_lists_applied_ids() {
        let mut record = UserHistory::default();
        record.applied_job_ids.insert("job-1".to_string());
        record.applied_job_ids.insert("job-2".to_string());

        let rendered = render_user_history("alice@example.com", &record);
        assert!(rendered.contains("2 job(s) applied to"));
        assert!(rendered.contains("applied ids: job-1, job-2"));
    }

    #[test]
    fn history_rendering_skips_the_id_line_when_empty() {
        let rendered = render_user_history("bob@example.com", &UserHistory::default());
        assert!(rendered.contains("0 job(s) applied to"));
        assert!(!rendered.contains("applied ids"));
    }
}
