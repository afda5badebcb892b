use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use tokio::time::{sleep, Instant};

use super::error::{BrowserError, BrowserResult};

const WAIT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const WAIT_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Narrow capability surface of the browser page. The navigation driver is
/// the sole owner of the live session; the captcha gate and tests only ever
/// see this trait.
#[async_trait(?Send)]
pub trait PageSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;
    /// Readiness poll with exponential backoff, bounded by `timeout`.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()>;
    async fn click(&mut self, selector: &str) -> BrowserResult<()>;
    /// Clear the control, then type `text` into it.
    async fn fill(&mut self, selector: &str, text: &str) -> BrowserResult<()>;
    async fn attribute(&mut self, selector: &str, name: &str) -> BrowserResult<Option<String>>;
    async fn screenshot(&mut self, selector: &str) -> BrowserResult<Vec<u8>>;
    async fn content(&mut self) -> BrowserResult<String>;
}

pub struct ChromiumSession {
    page: Page,
}

impl ChromiumSession {
    pub(crate) fn new(page: Page) -> Self {
        Self { page }
    }

    async fn find(&self, selector: &str) -> BrowserResult<Element> {
        self.page
            .find_element(selector.to_string())
            .await
            .map_err(|err| {
                BrowserError::Unexpected(format!("element not found ({selector}): {err}"))
            })
    }
}

#[async_trait(?Send)]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let deadline = Instant::now() + timeout;
        let mut backoff = WAIT_INITIAL_BACKOFF;
        loop {
            if self.page.find_element(selector.to_string()).await.is_ok() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(BrowserError::Timeout(selector.to_string()));
            }
            sleep(backoff.min(deadline - now)).await;
            backoff = (backoff * 2).min(WAIT_MAX_BACKOFF);
        }
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<()> {
        let element = self.find(selector).await?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> BrowserResult<()> {
        let element = self.find(selector).await?;
        element.click().await?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn attribute(&mut self, selector: &str, name: &str) -> BrowserResult<Option<String>> {
        let element = self.find(selector).await?;
        Ok(element.attribute(name).await?)
    }

    async fn screenshot(&mut self, selector: &str) -> BrowserResult<Vec<u8>> {
        let element = self.find(selector).await?;
        Ok(element.screenshot(CaptureScreenshotFormat::Jpeg).await?)
    }

    async fn content(&mut self) -> BrowserResult<String> {
        Ok(self.page.content().await?)
    }
}
