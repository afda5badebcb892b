use std::path::PathBuf;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::browser::{BrowserError, BrowserResult, PageSession};
use crate::config::{SelectorSection, TimeoutSection};

use super::solver::CaptchaSolver;

const ARTIFACT_FILE: &str = "captcha.jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// No challenge on the current page; nothing was touched.
    NotPresent,
    Passed,
}

/// Detects and clears the human-verification challenge blocking navigation.
/// Exactly one solve attempt per page load; every step is bounded, and any
/// timeout or solver failure surfaces as a gate failure the caller treats as
/// non-fatal for the current postal code.
pub struct CaptchaGate {
    selectors: SelectorSection,
    timeouts: TimeoutSection,
    artifacts_dir: PathBuf,
    solver: Box<dyn CaptchaSolver>,
}

impl CaptchaGate {
    pub fn new(
        selectors: SelectorSection,
        timeouts: TimeoutSection,
        artifacts_dir: impl Into<PathBuf>,
        solver: Box<dyn CaptchaSolver>,
    ) -> Self {
        Self {
            selectors,
            timeouts,
            artifacts_dir: artifacts_dir.into(),
            solver,
        }
    }

    pub async fn pass(&self, session: &mut dyn PageSession) -> BrowserResult<GateOutcome> {
        let html = session.content().await?;
        if !challenge_present(&html, &self.selectors.challenge_form) {
            debug!("no captcha challenge on current page");
            return Ok(GateOutcome::NotPresent);
        }
        info!("captcha challenge detected");

        // Terms checkbox is optional; its absence is not an error.
        let checkbox_wait = Duration::from_secs(self.timeouts.terms_checkbox_seconds);
        match session
            .wait_for(&self.selectors.terms_checkbox, checkbox_wait)
            .await
        {
            Ok(()) => {
                session.click(&self.selectors.terms_checkbox).await?;
                debug!("agreed to terms");
            }
            Err(BrowserError::Timeout(_)) => debug!("terms checkbox not present"),
            Err(err) => return Err(err),
        }

        let image_wait = Duration::from_secs(self.timeouts.captcha_image_seconds);
        session
            .wait_for(&self.selectors.captcha_image, image_wait)
            .await?;
        if let Some(src) = session
            .attribute(&self.selectors.captcha_image, "src")
            .await?
        {
            debug!(src = %src, "captcha image located");
        }

        let image = session.screenshot(&self.selectors.captcha_image).await?;
        let artifact = self.write_artifact(&image)?;
        debug!(path = %artifact.display(), "captcha image captured");

        let solution = self.solver.solve(&image).await?;
        let solution = solution.trim();
        if solution.is_empty() {
            return Err(BrowserError::Captcha(
                "solver returned an empty solution".into(),
            ));
        }
        info!(solution = %solution, "captcha solved");

        session
            .wait_for(&self.selectors.captcha_input, image_wait)
            .await?;
        session
            .fill(&self.selectors.captcha_input, solution)
            .await?;
        session.click(&self.selectors.continue_button).await?;

        let marker_wait = Duration::from_secs(self.timeouts.marker_seconds);
        session
            .wait_for(&self.selectors.results_marker, marker_wait)
            .await?;
        info!("captcha gate passed");
        Ok(GateOutcome::Passed)
    }

    fn write_artifact(&self, image: &[u8]) -> BrowserResult<PathBuf> {
        std::fs::create_dir_all(&self.artifacts_dir)?;
        let path = self.artifacts_dir.join(ARTIFACT_FILE);
        std::fs::write(&path, image)?;
        Ok(path)
    }
}

fn challenge_present(html: &str, form_selector: &str) -> bool {
    let document = Html::parse_document(html);
    let selector = Selector::parse(form_selector).expect("valid challenge form selector");
    document.select(&selector).next().is_some()
}
