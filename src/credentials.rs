//! Cached login sessions.
//!
//! Interactive login is slow and noisy, so each successful login's
//! cookies are snapshotted per user and replayed on the next run.
//! Restore failures are never fatal; the session falls back to the
//! login form.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::Driver;
use crate::store::{DataDir, write_atomic};

/// Login page, relative to the board URL.
pub(crate) const LOGIN_PATH: &str = "/dashboard/login";
/// The login form's email field. Its absence on the login page is how
/// an already-authenticated browser shows up.
pub(crate) const LOGIN_EMAIL_SELECTOR: &str = "#email";

/// Cached authentication, good enough to skip the login form.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Tries to restore a previous login. Returns whether the browser
    /// ended up authenticated.
    async fn try_restore(&self, username: &str) -> Result<bool>;

    /// Captures the current browser session for later restores.
    async fn persist(&self, username: &str) -> Result<()>;

    /// Forgets any cached session for this user.
    fn clear(&self, username: &str) -> Result<()>;
}

/// File-backed cookie snapshots, one JSON file per user, replayed
/// through the driver.
pub struct CookieCache {
    driver: Arc<dyn Driver>,
    dir: PathBuf,
    board_url: String,
    probe_wait: Duration,
}

impl CookieCache {
    pub fn new(driver: Arc<dyn Driver>, data: &DataDir, board_url: impl Into<String>) -> Self {
        Self {
            driver,
            dir: data.cookies_dir(),
            board_url: board_url.into(),
            probe_wait: Duration::from_secs(3),
        }
    }

    fn cookie_file(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_filename(username)))
    }

    fn login_url(&self) -> String {
        format!("{}{}", self.board_url.trim_end_matches('/'), LOGIN_PATH)
    }
}

#[async_trait]
impl CredentialStore for CookieCache {
    async fn try_restore(&self, username: &str) -> Result<bool> {
        let path = self.cookie_file(username);
        if !path.is_file() {
            return Ok(false);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read cookie snapshot {}", path.display()))?;

        // Cookies only attach on their own origin, so land on the board
        // first, replay, then let the login page reveal whether the
        // session took.
        self.driver.navigate(&self.board_url).await?;
        self.driver.restore_cookies_json(&json).await?;
        self.driver.navigate(&self.login_url()).await?;

        match self
            .driver
            .wait_for(LOGIN_EMAIL_SELECTOR, self.probe_wait)
            .await
        {
            // Login form came up: the snapshot is no longer accepted.
            Ok(_) => {
                debug!("cookie snapshot for {username} did not authenticate");
                Ok(false)
            }
            Err(crate::error::DriverError::Timeout { .. }) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, username: &str) -> Result<()> {
        let json = self.driver.cookies_json().await?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        write_atomic(&self.cookie_file(username), json.as_bytes())?;
        Ok(())
    }

    fn clear(&self, username: &str) -> Result<()> {
        let path = self.cookie_file(username);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to remove {}", path.display()))
            }
        }
    }
}

/// Usernames are emails; keep the snapshot file names plain.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverResult, ElementHandle};
    use std::path::Path;
    use tempfile::TempDir;

    struct NullDriver;

    #[async_trait]
    impl Driver for NullDriver {
        async fn navigate(&self, _url: &str) -> DriverResult<()> {
            panic!("driver should not be touched")
        }
        async fn wait_for(&self, _s: &str, _t: Duration) -> DriverResult<ElementHandle> {
            panic!("driver should not be touched")
        }
        async fn wait_for_text(&self, _s: &str, _x: &str, _t: Duration) -> DriverResult<ElementHandle> {
            panic!("driver should not be touched")
        }
        async fn click(&self, _e: ElementHandle) -> DriverResult<()> {
            panic!("driver should not be touched")
        }
        async fn type_into(&self, _e: ElementHandle, _t: &str) -> DriverResult<()> {
            panic!("driver should not be touched")
        }
        async fn set_input_file(&self, _e: ElementHandle, _p: &Path) -> DriverResult<()> {
            panic!("driver should not be touched")
        }
        async fn is_visible(&self, _e: ElementHandle) -> DriverResult<bool> {
            panic!("driver should not be touched")
        }
        async fn page_source(&self) -> DriverResult<String> {
            panic!("driver should not be touched")
        }
        async fn cookies_json(&self) -> DriverResult<String> {
            panic!("driver should not be touched")
        }
        async fn restore_cookies_json(&self, _j: &str) -> DriverResult<()> {
            panic!("driver should not be touched")
        }
        async fn quit(&self) -> DriverResult<()> {
            panic!("driver should not be touched")
        }
    }

    #[tokio::test]
    async fn restore_without_a_snapshot_skips_the_driver() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::at(dir.path()).unwrap();
        let cache = CookieCache::new(Arc::new(NullDriver), &data, "https://board.test");

        // No snapshot on disk, so this returns early without touching
        // the panicking driver.
        assert!(!cache.try_restore("alice@example.com").await.unwrap());
    }

    #[test]
    fn clear_tolerates_a_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        let data = DataDir::at(dir.path()).unwrap();
        let cache = CookieCache::new(Arc::new(NullDriver), &data, "https://board.test");

        cache.clear("nobody@example.com").unwrap();
    }

    #[test]
    fn snapshot_names_stay_plain() {
        assert_eq!(sanitize_filename("alice@example.com"), "alice_example.com");
        assert_eq!(sanitize_filename("we?ird/user"), "we_ird_user");
    }
}
