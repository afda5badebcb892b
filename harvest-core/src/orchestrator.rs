use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::BrowserError;
use crate::config::{CrawlSection, SelectorSection};
use crate::extract::{extract_detail, harvest_links, LicenseeRecord};
use crate::ledger::{Ledger, LedgerError};
use crate::navigator::PageNavigator;
use crate::sink::{RecordSink, SinkError};

pub type CrawlResult<T> = Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid detail base url {url}: {source}")]
    BaseUrl {
        source: url::ParseError,
        url: String,
    },
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Cap on postal codes attempted this invocation; `None` = the whole
    /// pending backlog.
    pub max_codes_per_run: Option<usize>,
    pub stop_on_first_error: bool,
    /// Navigate and extract, but write neither ledger nor sink.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CrawlStats {
    pub codes_processed: usize,
    pub codes_completed: usize,
    pub links_found: usize,
    pub records_written: usize,
    pub pages_discarded: usize,
    pub dry_run: bool,
    pub total_wait_ms: u64,
    pub duration_secs: u64,
    pub errors: Vec<String>,
}

/// Drives the whole pipeline: one postal code at a time, one link at a time.
/// A failure inside a postal code leaves it pending (its buffered records are
/// discarded) and the loop moves on; the code is retried on a later run.
pub struct CrawlOrchestrator {
    navigator: Box<dyn PageNavigator>,
    ledger: Ledger,
    sink: RecordSink,
    crawl: CrawlSection,
    selectors: SelectorSection,
    options: CrawlOptions,
    base_url: url::Url,
    pacer: Pacer,
}

impl CrawlOrchestrator {
    pub fn new(
        navigator: Box<dyn PageNavigator>,
        ledger: Ledger,
        sink: RecordSink,
        crawl: CrawlSection,
        selectors: SelectorSection,
        options: CrawlOptions,
    ) -> CrawlResult<Self> {
        let base_url = url::Url::parse(&crawl.detail_base_url).map_err(|source| {
            CrawlError::BaseUrl {
                source,
                url: crawl.detail_base_url.clone(),
            }
        })?;
        let pacer = Pacer::new(crawl.pacing_delay_ms);
        Ok(Self {
            navigator,
            ledger,
            sink,
            crawl,
            selectors,
            options,
            base_url,
            pacer,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn run(&mut self) -> CrawlResult<CrawlStats> {
        let start = Instant::now();
        let mut stats = CrawlStats {
            dry_run: self.options.dry_run,
            ..CrawlStats::default()
        };

        let pending = self.ledger.pending_codes();
        info!(
            pending = pending.len(),
            total = self.ledger.tasks().len(),
            dry_run = self.options.dry_run,
            "starting crawl run"
        );

        for code in pending {
            if let Some(limit) = self.options.max_codes_per_run {
                if stats.codes_processed >= limit {
                    info!(limit, "per-run code limit reached");
                    break;
                }
            }
            stats.codes_processed += 1;

            match self.process_code(&code, &mut stats).await {
                Ok(()) => stats.codes_completed += 1,
                Err(err) => {
                    stats.errors.push(format!("{code}: {err}"));
                    warn!(
                        code = %code,
                        error = %err,
                        "postal code failed, left pending for a later run"
                    );
                    if self.options.stop_on_first_error {
                        return Err(err);
                    }
                }
            }
        }

        stats.duration_secs = start.elapsed().as_secs();
        info!(
            processed = stats.codes_processed,
            completed = stats.codes_completed,
            records = stats.records_written,
            discarded = stats.pages_discarded,
            errors = stats.errors.len(),
            duration = stats.duration_secs,
            "crawl run finished"
        );
        Ok(stats)
    }

    async fn process_code(&mut self, code: &str, stats: &mut CrawlStats) -> CrawlResult<()> {
        info!(code = %code, "processing postal code");
        let search_url = self.crawl.search_url_template.replace("{code}", code);
        let html = self
            .navigator
            .load(&search_url, &self.selectors.results_marker)
            .await?;

        let links = harvest_links(&html);
        info!(code = %code, links = links.len(), "harvested detail links");
        stats.links_found += links.len();

        let mut buffer: Vec<LicenseeRecord> = Vec::new();
        for link in &links {
            let detail_url = match self.base_url.join(link) {
                Ok(joined) => joined,
                Err(err) => {
                    warn!(code = %code, link = %link, error = %err, "unjoinable reference skipped");
                    continue;
                }
            };
            let html = self
                .navigator
                .load(detail_url.as_str(), &self.selectors.detail_marker)
                .await?;
            match extract_detail(&html) {
                Some(page) => buffer.extend(page.into_records()),
                None => {
                    stats.pages_discarded += 1;
                    warn!(url = %detail_url, "detail page missing required fields, discarded");
                }
            }
            stats.total_wait_ms += self.pacer.wait().await;
        }

        if self.options.dry_run {
            info!(code = %code, records = buffer.len(), "dry run, skipping persistence");
            return Ok(());
        }

        // Sink flush precedes the ledger mark; a crash between the two
        // leaves the code pending and its rows are re-appended next run.
        stats.records_written += self.sink.append(&buffer)?;
        self.ledger.mark_done(code)?;
        info!(code = %code, records = buffer.len(), "postal code completed");
        Ok(())
    }
}

/// Inter-request pacing between detail fetches; the crawl's only deliberate
/// delay.
struct Pacer {
    range: [u64; 2],
}

impl Pacer {
    fn new(range: [u64; 2]) -> Self {
        Self { range }
    }

    async fn wait(&self) -> u64 {
        if self.range[0] == 0 && self.range[1] == 0 {
            return 0;
        }
        let lower = self.range[0].min(self.range[1]);
        let upper = self.range[0].max(self.range[1]);
        let delay = if lower == upper {
            lower
        } else {
            rand::thread_rng().gen_range(lower..=upper)
        };
        debug!(delay_ms = delay, "pacing before next request");
        sleep(Duration::from_millis(delay)).await;
        delay
    }
}
