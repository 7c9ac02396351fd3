// src/registry/fake.rs

//! Scripted renderer and registry page fixtures for tests.

use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::config::PipelineConfig;
use crate::registry::renderer::{RenderSession, Renderer};
use crate::utils::error::RenderError;

const LOADING_PAGE: &str = "<html><body><div class=\"loader\">Пожалуйста, подождите...</div></body></html>";

#[derive(Debug, Clone)]
pub enum FakePage {
    Html(String),
    /// Shows a loading overlay on navigation; the table appears on the next poll.
    Delayed(String),
    /// Shows the loading overlay until `after` has passed since navigation.
    Stalled { html: String, after: Duration },
    NavigationError,
    /// The browser goes away while loading this page.
    Crash,
}

#[derive(Default)]
struct Shared {
    loads: Vec<u32>,
    opened: u32,
    closed: bool,
}

/// Serves page `n` of the script for any URL whose `page` query is `n`.
#[derive(Clone)]
pub struct FakeRenderer {
    pages: Arc<Vec<FakePage>>,
    fail_open: bool,
    shared: Arc<Mutex<Shared>>,
}

impl FakeRenderer {
    pub const BASE: &'static str = "https://www.goszakup.gov.kz/ru/search/lots";

    pub fn new(pages: Vec<FakePage>) -> Self {
        Self { pages: Arc::new(pages), fail_open: false, shared: Arc::default() }
    }

    /// A renderer whose browser never starts.
    pub fn unavailable() -> Self {
        Self { fail_open: true, ..Self::new(Vec::new()) }
    }

    /// Page numbers navigated to, in order, across all sessions.
    pub fn loaded_pages(&self) -> Vec<u32> {
        self.shared.lock().unwrap().loads.clone()
    }

    pub fn sessions_opened(&self) -> u32 {
        self.shared.lock().unwrap().opened
    }

    pub fn closed(&self) -> bool {
        self.shared.lock().unwrap().closed
    }
}

pub struct FakeSession {
    pages: Arc<Vec<FakePage>>,
    shared: Arc<Mutex<Shared>>,
    current: String,
    ready_at: Option<Instant>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    type Session = FakeSession;

    async fn open(&self) -> Result<FakeSession, RenderError> {
        if self.fail_open {
            return Err(RenderError::Launch("chrome executable not found".into()));
        }
        let mut shared = self.shared.lock().unwrap();
        shared.opened += 1;
        shared.closed = false;
        Ok(FakeSession { pages: self.pages.clone(), shared: self.shared.clone(), current: String::new(), ready_at: None })
    }
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn load(&mut self, url: &str) -> Result<String, RenderError> {
        let page = page_number(url);
        self.shared.lock().unwrap().loads.push(page);

        let scripted = page.checked_sub(1).and_then(|i| self.pages.get(i as usize)).cloned();
        self.ready_at = None;
        match scripted {
            Some(FakePage::Html(html)) => {
                self.current = html;
                Ok(self.current.clone())
            }
            Some(FakePage::Delayed(html)) => {
                self.current = html;
                Ok(LOADING_PAGE.to_string())
            }
            Some(FakePage::Stalled { html, after }) => {
                self.current = html;
                self.ready_at = Some(Instant::now() + after);
                Ok(LOADING_PAGE.to_string())
            }
            Some(FakePage::Crash) => Err(RenderError::SessionLost("browser process exited".into())),
            Some(FakePage::NavigationError) | None => Err(RenderError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".into(),
            }),
        }
    }

    async fn current_content(&mut self) -> Result<String, RenderError> {
        match self.ready_at {
            Some(at) if Instant::now() < at => Ok(LOADING_PAGE.to_string()),
            _ => Ok(self.current.clone()),
        }
    }

    async fn close(&mut self) {
        self.shared.lock().unwrap().closed = true;
    }
}

fn page_number(url: &str) -> u32 {
    Url::parse(url)
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "page").and_then(|(_, v)| v.parse().ok()))
        .unwrap_or(1)
}

/// Pipeline settings with millisecond delays.
pub fn quick_config(base: &str) -> PipelineConfig {
    PipelineConfig {
        page_load_timeout: Duration::from_millis(50),
        settle_delay: Duration::from_millis(1),
        render_grace: Duration::from_millis(1),
        inter_page_delay: Duration::from_millis(1),
        failure_backoff: Duration::from_millis(1),
        poll_interval: Duration::from_millis(5),
        ..PipelineConfig::new(Url::parse(base).unwrap())
    }
}

/// A listing page in the registry's current layout: one row per lot in `lots`,
/// with the record summary declaring `total` records at `per_page` per page.
pub fn fixture_page(page: u32, lots: Range<u32>, total: u32, per_page: u32) -> String {
    let first = (page - 1) * per_page + 1;
    let last = (page * per_page).min(total);

    let rows: String = lots.map(fixture_row).collect();

    format!(
        r#"<html><body>
<div class="dataTables_info">Показано c {first} по {last} из {total} записей</div>
<table class="table table-bordered">
  <thead><tr>
    <th>Номер лота</th><th>Наименование и описание лота</th><th>Кол-во</th>
    <th>Сумма, тг.</th><th>Способ закупки</th><th>Статус</th>
  </tr></thead>
  <tbody>{rows}</tbody>
</table>
</body></html>"#
    )
}

fn fixture_row(i: u32) -> String {
    format!(
        r#"<tr>
  <td><b>LOT-{i:05}</b><br>
    <a href="/ru/announce/index/{i}">{i}-1 Закупка товаров {i}</a><br>
    <small>Заказчик: ГУ "Аппарат акима" {tax:012}</small></td>
  <td><a href="/ru/subpriceoffer/index/{i}/{i}">Товар {i}</a></td>
  <td>{qty}</td>
  <td>{amount} 000,00</td>
  <td>Запрос ценовых предложений</td>
  <td>Опубликовано (прием ценовых предложений)</td>
</tr>"#,
        tax = 100_000_000_000u64 + u64::from(i),
        qty = i % 7 + 1,
        amount = i + 1,
    )
}
