use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HarvestConfig {
    pub crawl: CrawlSection,
    pub paths: PathsSection,
    pub selectors: SelectorSection,
    pub timeouts: TimeoutSection,
    pub solver: SolverSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSection {
    /// Search URL with a `{code}` placeholder for the postal code.
    pub search_url_template: String,
    pub detail_base_url: String,
    /// Inter-request delay range in milliseconds, applied after each detail fetch.
    pub pacing_delay_ms: [u64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub ledger: String,
    pub sink: String,
    pub artifacts_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    pub challenge_form: String,
    pub terms_checkbox: String,
    pub captcha_image: String,
    pub captcha_input: String,
    pub continue_button: String,
    pub results_marker: String,
    pub detail_marker: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSection {
    pub terms_checkbox_seconds: u64,
    pub captcha_image_seconds: u64,
    pub marker_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverSection {
    pub submit_url: String,
    pub result_url: String,
    /// Name of the environment variable holding the solver API key.
    pub api_key_env: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub chromium: ChromiumSection,
    pub flags: FlagsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window_size: [u32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagsSection {
    pub no_first_run: bool,
    pub disable_automation_controlled: bool,
    pub mute_audio: bool,
    pub lang: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub harvest: HarvestConfig,
    pub browser: BrowserConfig,
}

impl ConfigBundle {
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let harvest = load_harvest_config(dir.join("harvest.toml"))?;
        let browser = load_browser_config(dir.join("browser.toml"))?;
        Ok(Self { harvest, browser })
    }
}

pub fn load_harvest_config<P: AsRef<Path>>(path: P) -> Result<HarvestConfig> {
    load_toml(path)
}

pub fn load_browser_config<P: AsRef<Path>>(path: P) -> Result<BrowserConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_configs() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs");
        let bundle = ConfigBundle::from_directory(dir).expect("configs should parse");
        assert!(bundle.harvest.crawl.search_url_template.contains("{code}"));
        assert_eq!(bundle.harvest.selectors.challenge_form, "form#aspnetForm");
        assert!(bundle.harvest.timeouts.marker_seconds > 0);
        assert!(bundle.browser.chromium.window_size[0] > 0);
    }

    #[test]
    fn missing_directory_reports_path() {
        let err = ConfigBundle::from_directory("/nonexistent").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert!(path.ends_with("harvest.toml"));
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
