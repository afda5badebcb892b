pub mod browser;
pub mod captcha;
pub mod config;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod navigator;
pub mod orchestrator;
pub mod sink;

pub use config::{
    load_browser_config, load_harvest_config, BrowserConfig, ConfigBundle, HarvestConfig,
};
pub use error::{ConfigError, Result};
pub use extract::{extract_detail, harvest_links, DetailPage, LicenseeRecord, OfficeLocation};
pub use ledger::{Ledger, LedgerError, PostalCodeTask, TaskStatus};
pub use navigator::{Navigator, PageNavigator};
pub use orchestrator::{CrawlError, CrawlOptions, CrawlOrchestrator, CrawlStats};
pub use sink::{RecordSink, SinkError};
