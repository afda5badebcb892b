use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::browser::{BrowserResult, PageSession};
use crate::captcha::CaptchaGate;

/// Seam the orchestrator drives pages through; integration tests substitute
/// a scripted fake.
#[async_trait(?Send)]
pub trait PageNavigator {
    /// Navigate to `url`, clear the captcha gate if one appears, wait for
    /// `marker` to become ready, and return the rendered HTML.
    async fn load(&mut self, url: &str, marker: &str) -> BrowserResult<String>;
}

/// Sole owner of the live page session. Readiness is the marker wait itself;
/// there is no fixed post-navigation settling delay.
pub struct Navigator {
    session: Box<dyn PageSession>,
    gate: CaptchaGate,
    marker_timeout: Duration,
}

impl Navigator {
    pub fn new(session: Box<dyn PageSession>, gate: CaptchaGate, marker_timeout: Duration) -> Self {
        Self {
            session,
            gate,
            marker_timeout,
        }
    }
}

#[async_trait(?Send)]
impl PageNavigator for Navigator {
    async fn load(&mut self, url: &str, marker: &str) -> BrowserResult<String> {
        debug!(url = %url, "navigating");
        self.session.navigate(url).await?;
        // The gate is a no-op when no challenge is present.
        self.gate.pass(self.session.as_mut()).await?;
        self.session.wait_for(marker, self.marker_timeout).await?;
        self.session.content().await
    }
}
