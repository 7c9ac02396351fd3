// src/registry/pagination.rs

//! Walks the registry's result pages.
//!
//! ```text
//! Init -> Extracting(1) -> Loading(2) -> Extracting(2) -> ... -> Done
//!                                   \-> (navigation failure) -> Loading(n+1)
//! any state -> Aborted on a session-level failure
//! ```
//!
//! A page that yields no records ends the walk even when the declared page
//! count is larger: the registry silently caps long listings.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tokio::time::{sleep, Instant};
use url::Url;

use crate::config::PipelineConfig;
use crate::extractors::table_materialized;
use crate::registry::models::PageSnapshot;
use crate::registry::renderer::RenderSession;
use crate::utils::error::RenderError;

// "Показано c 1 по 50 из 10 000 записей" / "Showing 1-50 of 10,000 records"
static SUMMARY_RE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)показано\s+[cс]\s+\d+\s+по\s+(\d+)\s+из\s+([\d\s,]+?)\s*записей",
        r"(?i)showing\s+\d+\s*(?:[-–—]|to)\s*(\d+)\s+of\s+([\d\s,]+?)\s*(?:records|entries|results)",
    ]
    .iter()
    .filter_map(|pat| Regex::new(pat).ok())
    .collect()
});

static PAGINATION_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".pagination a, .pagination li, nav[aria-label*='agination'] a")
        .expect("Failed to compile PAGINATION_LINK_SELECTOR")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Init,
    Loading(u32),
    Extracting(u32),
    Done,
    Aborted,
}

pub struct PaginationController<S> {
    session: S,
    config: PipelineConfig,
    state: PageState,
    total_pages: u32,
    pages_parsed: u32,
    pages_failed: u32,
    throttle_next: bool,
}

impl<S: RenderSession> PaginationController<S> {
    pub fn new(session: S, config: PipelineConfig) -> Self {
        Self {
            session,
            config,
            state: PageState::Init,
            total_pages: 1,
            pages_parsed: 0,
            pages_failed: 0,
            throttle_next: false,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PageState {
        self.state
    }

    #[cfg(test)]
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Pages whose content reached extraction.
    pub fn pages_parsed(&self) -> u32 {
        self.pages_parsed
    }

    pub fn pages_failed(&self) -> u32 {
        self.pages_failed
    }

    /// Loads the next page, or `None` once the walk is over.
    ///
    /// Page-level failures are absorbed here (logged, backed off, skipped);
    /// only session-level failures are returned, after moving to `Aborted`.
    pub async fn next_page(&mut self) -> Result<Option<PageSnapshot>, RenderError> {
        loop {
            match self.state {
                PageState::Done | PageState::Aborted => return Ok(None),
                PageState::Extracting(n) => {
                    tracing::warn!("Page {} was not reported as extracted; assuming it had records", n);
                    self.complete_page(1);
                }
                PageState::Init => {
                    let url = page_url(&self.config.base_url, 1);
                    tracing::info!("Loading first page: {}", url);
                    // Nothing is known about the listing until page 1 renders
                    let content = match self.load(&url).await {
                        Ok(content) => content,
                        Err(e) => {
                            self.state = PageState::Aborted;
                            return Err(if e.is_fatal() {
                                e
                            } else {
                                RenderError::SessionLost(format!("first page could not be loaded: {}", e))
                            });
                        }
                    };

                    self.total_pages = self.resolve_total_pages(&content);
                    tracing::info!("Walking {} page(s)", self.total_pages);
                    self.state = PageState::Extracting(1);
                    return Ok(Some(PageSnapshot { page: 1, url, content }));
                }
                PageState::Loading(n) => {
                    if self.throttle_next {
                        sleep(self.config.inter_page_delay).await;
                        self.throttle_next = false;
                    }

                    let url = page_url(&self.config.base_url, n);
                    tracing::info!("→ Page {}/{}: {}", n, self.total_pages, url);
                    match self.load(&url).await {
                        Ok(content) => {
                            self.state = PageState::Extracting(n);
                            return Ok(Some(PageSnapshot { page: n, url, content }));
                        }
                        Err(e) if e.is_fatal() => {
                            tracing::error!("Renderer failed on page {}: {}", n, e);
                            self.state = PageState::Aborted;
                            return Err(e);
                        }
                        Err(e) => {
                            tracing::error!("Failed to load page {}: {}", n, e);
                            self.pages_failed += 1;
                            sleep(self.config.failure_backoff).await;
                            self.state = if n < self.total_pages {
                                PageState::Loading(n + 1)
                            } else {
                                PageState::Done
                            };
                        }
                    }
                }
            }
        }
    }

    /// Reports how many records the current page produced.
    pub fn complete_page(&mut self, records: usize) {
        let PageState::Extracting(n) = self.state else {
            return;
        };
        self.pages_parsed += 1;

        self.state = if records == 0 {
            tracing::warn!("Page {} yielded no records; treating it as the end of results", n);
            PageState::Done
        } else if n >= self.total_pages {
            PageState::Done
        } else {
            self.throttle_next = true;
            PageState::Loading(n + 1)
        };
    }

    /// Releases the renderer session.
    pub async fn close(&mut self) {
        self.session.close().await;
    }

    /// Navigates and waits for the result table, degrading after the timeout.
    async fn load(&mut self, url: &str) -> Result<String, RenderError> {
        let mut content = self.session.load(url).await?;
        let deadline = Instant::now() + self.config.page_load_timeout;

        loop {
            if table_materialized(&content) {
                // Let the "please wait" overlay finish before reading rows
                sleep(self.config.settle_delay).await;
                return self.session.current_content().await;
            }
            if Instant::now() >= deadline {
                tracing::warn!("Result table did not appear within {:?} for {}", self.config.page_load_timeout, url);
                sleep(self.config.render_grace).await;
                return self.session.current_content().await;
            }
            sleep(self.config.poll_interval).await;
            content = self.session.current_content().await?;
        }
    }

    fn resolve_total_pages(&self, content: &str) -> u32 {
        let declared = declared_total_pages(content).or_else(|| {
            tracing::debug!("No record summary found; falling back to pagination control");
            max_pagination_page(content)
        });

        let mut total = declared.unwrap_or_else(|| {
            tracing::warn!("Page count unknown; assuming a single page");
            1
        });

        if self.config.page_cap > 0 && total > self.config.page_cap {
            tracing::info!("Page cap {} applied (listing has {} pages)", self.config.page_cap, total);
            total = self.config.page_cap;
        }
        total.max(1)
    }
}

/// URL of page `n`; the first page is the base URL itself.
pub fn page_url(base: &Url, page: u32) -> String {
    if page <= 1 {
        return base.to_string();
    }
    let mut url = base.clone();
    let pairs: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &page.to_string());
    url.to_string()
}

/// `ceil(total / per_page)` from the "showing X–Y of Z" summary.
pub fn declared_total_pages(content: &str) -> Option<u32> {
    let document = Html::parse_document(content);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");

    SUMMARY_RE.iter().find_map(|re| {
        let caps = re.captures(&text)?;
        let per_page: u64 = digits(&caps[1])?;
        let total: u64 = digits(&caps[2])?;
        if per_page == 0 {
            return None;
        }
        let pages = total.div_ceil(per_page);
        tracing::info!("Records: {}, per page: {}, pages: {}", total, per_page, pages);
        u32::try_from(pages).ok()
    })
}

/// Highest page number shown in the pagination control.
pub fn max_pagination_page(content: &str) -> Option<u32> {
    let document = Html::parse_document(content);
    document
        .select(&PAGINATION_LINK_SELECTOR)
        .filter_map(|el| el.text().collect::<String>().trim().parse::<u32>().ok())
        .max()
}

fn digits(text: &str) -> Option<u64> {
    let only: String = text.chars().filter(char::is_ascii_digit).collect();
    only.parse().ok()
}
