//! Browser automation seam.
//!
//! The engine only ever talks to the [`Driver`] trait. The production
//! implementation drives a WebDriver-compatible browser through
//! thirtyfour; tests substitute scripted drivers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::error::WebDriverError;
use thirtyfour::{By, ChromiumLikeCapabilities, Cookie, DesiredCapabilities, WebDriver, WebElement};
use tokio::time::{Instant, sleep};
use tracing::warn;

use crate::error::DriverError;

pub type DriverResult<T> = Result<T, DriverError>;

/// Opaque reference to a located page element. Only meaningful to the
/// driver that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Waits until an element matching `selector` exists, up to
    /// `timeout`. A zero timeout checks exactly once.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<ElementHandle>;

    /// Waits until the matching element's text contains `text`.
    async fn wait_for_text(
        &self,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle>;

    async fn click(&self, element: ElementHandle) -> DriverResult<()>;

    /// Types literal text into an element. Tab and newline characters
    /// move focus and submit, as they do on a keyboard.
    async fn type_into(&self, element: ElementHandle, text: &str) -> DriverResult<()>;

    /// Pushes a local file path into a file input.
    async fn set_input_file(&self, element: ElementHandle, path: &Path) -> DriverResult<()>;

    /// Whether the element is currently displayed. An element that has
    /// gone stale since it was located reads as not visible.
    async fn is_visible(&self, element: ElementHandle) -> DriverResult<bool>;

    async fn page_source(&self) -> DriverResult<String>;

    /// Cookie snapshot of the current browser session, as JSON.
    async fn cookies_json(&self) -> DriverResult<String>;

    /// Replays a cookie snapshot into the current session. The browser
    /// must already be on the cookie domain's origin.
    async fn restore_cookies_json(&self, json: &str) -> DriverResult<()>;

    /// Releases the underlying browser session.
    async fn quit(&self) -> DriverResult<()>;
}

/// How the production browser session is launched.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Browser profile directory reused across runs. Keeps the board's
    /// own login cookies between sessions.
    pub profile_dir: Option<PathBuf>,
}

/// Production [`Driver`] over a thirtyfour WebDriver session.
pub struct WebDriverSession {
    driver: WebDriver,
    poll: Duration,
    elements: Mutex<ElementRegistry>,
}

#[derive(Default)]
struct ElementRegistry {
    next_id: u64,
    map: HashMap<u64, WebElement>,
}

impl WebDriverSession {
    /// Connects to a running WebDriver server such as chromedriver.
    pub async fn connect(server_url: &str, options: &BrowserOptions) -> DriverResult<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if options.headless {
            caps.add_arg("--headless=new").map_err(wd)?;
            caps.add_arg("--window-size=1920,1080").map_err(wd)?;
        }
        if let Some(dir) = &options.profile_dir {
            caps.add_arg(&format!("--user-data-dir={}", dir.display()))
                .map_err(wd)?;
        }

        let driver = WebDriver::new(server_url, caps).await.map_err(wd)?;
        Ok(Self {
            driver,
            poll: Duration::from_millis(250),
            elements: Mutex::default(),
        })
    }

    fn register(&self, element: WebElement) -> ElementHandle {
        let mut registry = self
            .elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.map.insert(id, element);
        ElementHandle(id)
    }

    fn lookup(&self, handle: ElementHandle) -> DriverResult<WebElement> {
        let registry = self
            .elements
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry
            .map
            .get(&handle.0)
            .cloned()
            .ok_or(DriverError::UnknownHandle(handle.0))
    }
}

#[async_trait]
impl Driver for WebDriverSession {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.driver.goto(url).await.map_err(wd)
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<ElementHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.driver.find(By::Css(selector)).await {
                Ok(element) => return Ok(self.register(element)),
                Err(WebDriverError::NoSuchElement(_)) => {}
                Err(e) => return Err(wd(e)),
            }
            if Instant::now() >= deadline {
                return Err(if timeout.is_zero() {
                    DriverError::NotFound(selector.to_string())
                } else {
                    DriverError::Timeout {
                        selector: selector.to_string(),
                        timeout,
                    }
                });
            }
            sleep(self.poll).await;
        }
    }

    async fn wait_for_text(
        &self,
        selector: &str,
        text: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.driver.find(By::Css(selector)).await {
                Ok(element) => match element.text().await {
                    Ok(t) if t.contains(text) => return Ok(self.register(element)),
                    Ok(_) => {}
                    Err(WebDriverError::StaleElementReference(_)) => {}
                    Err(e) => return Err(wd(e)),
                },
                Err(WebDriverError::NoSuchElement(_)) => {}
                Err(e) => return Err(wd(e)),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    timeout,
                });
            }
            sleep(self.poll).await;
        }
    }

    async fn click(&self, element: ElementHandle) -> DriverResult<()> {
        self.lookup(element)?.click().await.map_err(wd)
    }

    async fn type_into(&self, element: ElementHandle, text: &str) -> DriverResult<()> {
        self.lookup(element)?.send_keys(text).await.map_err(wd)
    }

    async fn set_input_file(&self, element: ElementHandle, path: &Path) -> DriverResult<()> {
        // WebDriver takes file uploads as the path typed into the input.
        let path_text = path.to_string_lossy();
        self.lookup(element)?
            .send_keys(path_text.as_ref())
            .await
            .map_err(wd)
    }

    async fn is_visible(&self, element: ElementHandle) -> DriverResult<bool> {
        let element = self.lookup(element)?;
        match element.is_displayed().await {
            Ok(displayed) => Ok(displayed),
            Err(WebDriverError::StaleElementReference(_)) => Ok(false),
            Err(WebDriverError::NoSuchElement(_)) => Ok(false),
            Err(e) => Err(wd(e)),
        }
    }

    async fn page_source(&self) -> DriverResult<String> {
        self.driver.source().await.map_err(wd)
    }

    async fn cookies_json(&self) -> DriverResult<String> {
        let cookies = self.driver.get_all_cookies().await.map_err(wd)?;
        serde_json::to_string(&cookies)
            .map_err(|e| DriverError::WebDriver(format!("could not encode cookies: {e}")))
    }

    async fn restore_cookies_json(&self, json: &str) -> DriverResult<()> {
        let cookies: Vec<Cookie> = serde_json::from_str(json)
            .map_err(|e| DriverError::WebDriver(format!("could not decode cookies: {e}")))?;
        for cookie in cookies {
            // Expired or cross-domain cookies are rejected one by one;
            // the rest of the snapshot is still worth replaying.
            if let Err(e) = self.driver.add_cookie(cookie.clone()).await {
                warn!(name = %cookie.name, "skipping cookie that would not restore: {e}");
            }
        }
        Ok(())
    }

    async fn quit(&self) -> DriverResult<()> {
        self.driver.clone().quit().await.map_err(wd)
    }
}

fn wd(e: WebDriverError) -> DriverError {
    DriverError::WebDriver(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Ignore by default since it requires a running chromedriver
    async fn test_connect_and_read_page_source() {
        let options = BrowserOptions {
            headless: true,
            profile_dir: None,
        };
        let session = WebDriverSession::connect("http://localhost:9515", &options)
            .await
            .expect("Failed to connect. Is chromedriver running on :9515?");

        session.navigate("https://www.dice.com").await.unwrap();
        let source = session.page_source().await.unwrap();
        assert!(!source.is_empty());

        session.quit().await.unwrap();
    }
}
