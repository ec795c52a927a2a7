//! Chromiumoxide-backed [`DocumentQuery`] implementation.
//!
//! [`ChromiumSession`] launches a local Chromium and drives its CDP handler
//! on a background task; [`ChromiumDocument`] answers selector checks by
//! evaluating `document.querySelector` in a page of that browser.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::waiter::{CheckError, DocumentQuery};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("invalid browser configuration: {0}")]
    Config(String),
    #[error("chromium error: {0}")]
    Cdp(String),
}

fn map_cdp_error(err: impl std::fmt::Display) -> BrowserError {
    BrowserError::Cdp(err.to_string())
}

fn map_check_error(err: impl std::fmt::Display) -> CheckError {
    err.to_string().into()
}

/// How to start the local browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            headless: true,
        }
    }
}

fn build_config(options: &LaunchOptions) -> Result<BrowserConfig, BrowserError> {
    let mut builder = BrowserConfig::builder();

    if let Some(path) = &options.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = if options.headless {
        builder
    } else {
        builder.with_head()
    };

    builder.build().map_err(BrowserError::Config)
}

/// A launched browser and its event loop.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let config = build_config(options)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(map_cdp_error)?;

        let handler = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if let Err(err) = result {
                    log::warn!("chromiumoxide handler error: {err}");
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Open `url` in a new tab and wrap it as a queryable document.
    pub async fn open(&self, url: &str) -> Result<ChromiumDocument, BrowserError> {
        let page = self.browser.new_page(url).await.map_err(map_cdp_error)?;
        Ok(ChromiumDocument::new(page))
    }

    pub async fn close(mut self) -> Result<(), BrowserError> {
        self.browser.close().await.map_err(map_cdp_error)?;
        if let Err(err) = self.browser.wait().await {
            log::warn!("chromium did not exit cleanly: {err}");
        }
        self.handler.abort();
        Ok(())
    }
}

/// A live page used as the document for selector checks.
#[derive(Clone)]
pub struct ChromiumDocument {
    page: Page,
}

impl ChromiumDocument {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }
}

/// JavaScript expression that is `true` while `selector` matches an element.
pub fn presence_script(selector: &str) -> Result<String, serde_json::Error> {
    let quoted = serde_json::to_string(selector)?;
    Ok(format!("document.querySelector({quoted}) !== null"))
}

#[async_trait]
impl DocumentQuery for ChromiumDocument {
    async fn has_match(&self, selector: &str) -> Result<bool, CheckError> {
        let script = presence_script(selector)?;
        let result = self.page.evaluate(script.as_str()).await.map_err(map_check_error)?;
        result.into_value::<bool>().map_err(map_check_error)
    }
}
