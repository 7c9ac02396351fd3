// src/registry/browser.rs

//! Chromium-backed renderer for the JavaScript-rendered registry.
//!
//! Launches a local Chrome/Chromium through chromiumoxide (CDP), or attaches
//! to a remote DevTools endpoint when one is configured.

#![cfg_attr(not(feature = "browser"), allow(dead_code))]

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::registry::renderer::{RenderSession, Renderer};
use crate::utils::error::RenderError;

#[cfg(feature = "browser")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "browser")]
use std::sync::Arc;

#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::handler::HandlerConfig;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;

// Desktop Chrome; the registry serves a reduced page to unknown agents
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Launch options for the browser renderer.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub chrome_path: Option<PathBuf>,
    /// DevTools endpoint of an already running browser (e.g. `http://chrome:9222`).
    pub remote_url: Option<String>,
}

pub struct BrowserRenderer {
    settings: BrowserSettings,
}

impl BrowserRenderer {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[cfg(feature = "browser")]
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
    remote: bool,
    timeout: Duration,
}

#[cfg(feature = "browser")]
impl BrowserRenderer {
    async fn launch(&self) -> Result<(Browser, chromiumoxide::handler::Handler), RenderError> {
        tracing::info!("Launching browser (headless={})", self.settings.headless);

        let mut builder = BrowserConfig::builder().request_timeout(self.settings.page_load_timeout);
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.settings.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--window-size=1920,1080")
            .arg("--lang=ru-RU")
            .arg(format!("--user-agent={}", BROWSER_USER_AGENT))
            .build()
            .map_err(RenderError::Launch)?;

        Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))
    }

    async fn connect_remote(&self, url: &str) -> Result<(Browser, chromiumoxide::handler::Handler), RenderError> {
        tracing::info!("Connecting to remote browser at {}", url);

        let http_url = url.replace("ws://", "http://").replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let version: serde_json::Value = reqwest::get(&version_url)
            .await
            .map_err(|e| RenderError::Launch(format!("cannot reach {}: {}", version_url, e)))?
            .json()
            .await
            .map_err(|e| RenderError::Launch(format!("bad version info from {}: {}", version_url, e)))?;

        let ws_url = version
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RenderError::Launch("no webSocketDebuggerUrl in version info".into()))?;

        let handler_config = HandlerConfig {
            request_timeout: self.settings.page_load_timeout,
            ..Default::default()
        };

        Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Renderer for BrowserRenderer {
    type Session = BrowserSession;

    async fn open(&self) -> Result<BrowserSession, RenderError> {
        let remote = self.settings.remote_url.is_some();
        let (browser, mut handler) = match &self.settings.remote_url {
            Some(url) => self.connect_remote(url).await?,
            None => self.launch().await?,
        };

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::error!("Browser connection failed: {}", e);
                    break;
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(RenderError::Launch(format!("cannot open page: {}", e)));
            }
        };

        Ok(BrowserSession {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler_task),
            alive,
            remote,
            timeout: self.settings.page_load_timeout,
        })
    }
}

#[cfg(feature = "browser")]
impl BrowserSession {
    fn page(&self) -> Result<&Page, RenderError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(RenderError::SessionLost("browser connection closed".into()));
        }
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::SessionLost("session already closed".into()))
    }

    fn classify(&self, url: &str, error: CdpError) -> RenderError {
        if !self.alive.load(Ordering::SeqCst) {
            return RenderError::SessionLost(error.to_string());
        }
        match error {
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                RenderError::SessionLost(error.to_string())
            }
            other => RenderError::Navigation { url: url.to_string(), message: other.to_string() },
        }
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl RenderSession for BrowserSession {
    async fn load(&mut self, url: &str) -> Result<String, RenderError> {
        let navigation = tokio::time::timeout(self.timeout, self.page()?.goto(url)).await;
        match navigation {
            Err(_) => return Err(RenderError::Timeout { url: url.to_string() }),
            Ok(Err(e)) => return Err(self.classify(url, e)),
            Ok(Ok(_)) => {}
        }
        self.current_content().await
    }

    async fn current_content(&mut self) -> Result<String, RenderError> {
        let result = self.page()?.content().await;
        result.map_err(|e| self.classify("current page", e))
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.browser.take() {
            // A shared remote browser stays up; only our tab goes away
            if !self.remote {
                if let Err(e) = browser.close().await {
                    tracing::warn!("Browser did not close cleanly: {}", e);
                }
                let _ = browser.wait().await;
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        tracing::info!("Browser session closed");
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct BrowserSession;

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Renderer for BrowserRenderer {
    type Session = BrowserSession;

    async fn open(&self) -> Result<BrowserSession, RenderError> {
        Err(RenderError::Unsupported)
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl RenderSession for BrowserSession {
    async fn load(&mut self, _url: &str) -> Result<String, RenderError> {
        Err(RenderError::Unsupported)
    }

    async fn current_content(&mut self) -> Result<String, RenderError> {
        Err(RenderError::Unsupported)
    }

    async fn close(&mut self) {}
}
