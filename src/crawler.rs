//! Search-results crawler: builds board search URLs, walks pages, and
//! extracts job cards.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::error::DriverError;
use crate::ledger::Ledger;
use crate::models::{JobListing, SearchQuery};
use crate::submit::challenge_visible;

/// A result card on the search page.
pub const CARD_SELECTOR: &str = "div.search-card";
const CARD_LINK_SELECTOR: &str = "a.card-title-link";
const CARD_RIBBON_SELECTOR: &str = "span.ribbon-inner";
const CARD_COMPANY_SELECTOR: &str = "a.search-result-company-name";

/// What one fetched page of results held.
#[derive(Debug)]
pub enum PageOutcome {
    /// Net-new listings in document order, ready for filtering.
    Candidates(Vec<JobListing>),
    /// No result cards at all: the end of the feed.
    EndOfResults,
    /// Cards were present but every one was already applied to,
    /// ribboned by the board, or skipped earlier this session.
    NoFreshListings,
    /// The board put up a challenge widget. Ends the whole session.
    Halt(String),
}

pub struct Crawler {
    driver: Arc<dyn Driver>,
    base_url: String,
    query: SearchQuery,
    page_size: u32,
    element_wait: Duration,
    next_page: u32,
}

impl Crawler {
    pub fn new(
        driver: Arc<dyn Driver>,
        base_url: impl Into<String>,
        query: SearchQuery,
        page_size: u32,
        element_wait: Duration,
    ) -> Self {
        Self {
            driver,
            base_url: base_url.into(),
            query,
            page_size,
            element_wait,
            next_page: 1,
        }
    }

    /// Fetches the next results page and reports the fetched page
    /// number alongside what it held. Only a page that produced
    /// candidates advances the crawl; every other outcome ends the
    /// session, so there is nothing to advance past.
    pub async fn next_page(
        &mut self,
        ledger: &Ledger,
        session_skips: &HashSet<String>,
    ) -> Result<(u32, PageOutcome), DriverError> {
        let page = self.next_page;
        let url = build_search_url(&self.base_url, &self.query, page, self.page_size);
        debug!(page, %url, "fetching search results");
        self.driver.navigate(&url).await?;

        let cards_present = match self.driver.wait_for(CARD_SELECTOR, self.element_wait).await {
            Ok(_) => true,
            Err(DriverError::Timeout { .. }) | Err(DriverError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };

        // The challenge widget can replace or sit on top of results.
        if challenge_visible(self.driver.as_ref()).await? {
            return Ok((
                page,
                PageOutcome::Halt("The board is showing an application challenge.".to_string()),
            ));
        }
        if !cards_present {
            return Ok((page, PageOutcome::EndOfResults));
        }

        let source = self.driver.page_source().await?;
        let listings = parse_search_cards(&source, &self.base_url);
        if listings.is_empty() {
            warn!(page, "result cards were present but none parsed");
            return Ok((page, PageOutcome::EndOfResults));
        }

        let mut seen_on_page = HashSet::new();
        let mut fresh = Vec::new();
        for listing in listings {
            if listing.marked_applied {
                debug!(job_id = %listing.id, "card already ribboned as applied");
                continue;
            }
            if ledger.is_known(&listing.id) || session_skips.contains(&listing.id) {
                continue;
            }
            if !seen_on_page.insert(listing.id.clone()) {
                continue;
            }
            fresh.push(listing);
        }

        if fresh.is_empty() {
            debug!(page, "page held no net-new listings");
            return Ok((page, PageOutcome::NoFreshListings));
        }
        self.next_page += 1;
        Ok((page, PageOutcome::Candidates(fresh)))
    }
}

/// Board search URL for one page of results. Mirrors the parameters the
/// board's own search UI sends, with easy-apply and last-day filters
/// always on.
pub fn build_search_url(base_url: &str, query: &SearchQuery, page: u32, page_size: u32) -> String {
    let keywords = query.keywords.join(" ");
    let mut url = format!(
        "{}/jobs?q={}&countryCode=US&radius=30&radiusUnit=mi&page={}&pageSize={}",
        base_url.trim_end_matches('/'),
        utf8_percent_encode(&keywords, NON_ALPHANUMERIC),
        page,
        page_size,
    );
    if let Some(location) = &query.location {
        url.push_str("&location=");
        url.push_str(&utf8_percent_encode(location, NON_ALPHANUMERIC).to_string());
    }
    url.push_str("&filters.postedDate=ONE");
    url.push_str("&filters.employmentType=");
    url.push_str(query.employment_type.filter_code());
    if query.prefer_remote {
        url.push_str("&filters.isRemote=true");
    }
    url.push_str("&filters.easyApply=true&language=en");
    url
}

/// Extracts job cards from a search results page. Cards the markup has
/// mangled beyond recognition are dropped rather than failing the page.
pub fn parse_search_cards(source: &str, base_url: &str) -> Vec<JobListing> {
    let document = Html::parse_document(source);
    let card_selector = Selector::parse(CARD_SELECTOR).ok();
    let link_selector = Selector::parse(CARD_LINK_SELECTOR).ok();
    let ribbon_selector = Selector::parse(CARD_RIBBON_SELECTOR).ok();
    let company_selector = Selector::parse(CARD_COMPANY_SELECTOR).ok();

    let (Some(card_selector), Some(link_selector)) = (card_selector, link_selector) else {
        return Vec::new();
    };

    let mut listings = Vec::new();
    for card in document.select(&card_selector) {
        let Some(link) = card.select(&link_selector).next() else {
            debug!("search card without a title link, skipping");
            continue;
        };

        let title = link.text().collect::<String>().trim().to_string();
        let href = link.value().attr("href").unwrap_or_default();
        let id = link
            .value()
            .attr("id")
            .map(str::to_string)
            .or_else(|| id_from_href(href))
            .unwrap_or_default();
        if id.is_empty() || title.is_empty() {
            debug!(%href, "search card missing id or title, skipping");
            continue;
        }

        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), href)
        };

        let company = company_selector
            .as_ref()
            .and_then(|sel| card.select(sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let marked_applied = ribbon_selector
            .as_ref()
            .and_then(|sel| card.select(sel).next())
            .map(|el| {
                el.text()
                    .collect::<String>()
                    .trim()
                    .eq_ignore_ascii_case("applied")
            })
            .unwrap_or(false);

        listings.push(JobListing {
            id,
            title,
            company,
            url,
            marked_applied,
        });
    }
    listings
}

fn id_from_href(href: &str) -> Option<String> {
    let re = Regex::new(r"/job-detail/([0-9A-Za-z-]+)").ok()?;
    Some(re.captures(href)?.get(1)?.as_str().to_string())
}
