use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 1024,
            chrome_path: None,
        }
    }
}

/// Every pause and bounded wait used while driving the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Pause after a radio click so dependent fields can re-render.
    pub settle: Duration,
    /// Bound on a dropdown menu becoming visible.
    pub menu_timeout: Duration,
    /// Pause after typing into the autocomplete before looking for matches.
    pub autocomplete_settle: Duration,
    /// Bound on an exact autocomplete match appearing.
    pub autocomplete_timeout: Duration,
    /// Bound on the form's anchor field appearing after navigation.
    pub anchor_timeout: Duration,
    /// Bound on the page going quiet after confirm/submit.
    pub ready_timeout: Duration,
    /// How long without new network activity counts as idle.
    pub network_quiet: Duration,
    /// Poll interval for every condition wait.
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            menu_timeout: Duration::from_secs(5),
            autocomplete_settle: Duration::from_millis(500),
            autocomplete_timeout: Duration::from_secs(3),
            anchor_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(30),
            network_quiet: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Where a finished submission is recorded, if anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkConfig {
    pub webhook_url: Option<String>,
    pub csv_path: Option<PathBuf>,
    /// Reject a row whose contact email is already recorded.
    pub reject_duplicate_email: bool,
    /// Do not wait for the webhook's acknowledgement.
    pub fire_and_forget: bool,
}

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub form_url: Option<String>,
    pub form_map_path: Option<PathBuf>,
    pub browser: BrowserConfig,
    pub timings: Timings,
    pub sink: SinkConfig,
    pub log_level: String,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            form_url: None,
            form_map_path: None,
            browser: BrowserConfig::default(),
            timings: Timings::default(),
            sink: SinkConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AutomationConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Build a configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        config.form_url = lookup("SUBSIDY_FORM_URL").filter(|v| !v.trim().is_empty());
        config.form_map_path = lookup("SUBSIDY_FORM_MAP").map(PathBuf::from);
        if let Some(value) = lookup("SUBSIDY_HEADLESS") {
            config.browser.headless = parse_bool("SUBSIDY_HEADLESS", &value)?;
        }
        config.browser.chrome_path = lookup("CHROME_EXECUTABLE");
        if let Some(level) = lookup("SUBSIDY_LOG_LEVEL") {
            config.log_level = level;
        }

        let timings = &mut config.timings;
        for (key, slot) in [
            ("SUBSIDY_SETTLE_MS", &mut timings.settle),
            ("SUBSIDY_MENU_TIMEOUT_MS", &mut timings.menu_timeout),
            ("SUBSIDY_AUTOCOMPLETE_TIMEOUT_MS", &mut timings.autocomplete_timeout),
            ("SUBSIDY_READY_TIMEOUT_MS", &mut timings.ready_timeout),
        ] {
            if let Some(value) = lookup(key) {
                *slot = parse_millis(key, &value)?;
            }
        }

        config.sink.webhook_url = lookup("SUBSIDY_SINK_URL").filter(|v| !v.trim().is_empty());
        config.sink.csv_path = lookup("SUBSIDY_SINK_CSV").map(PathBuf::from);
        if let Some(value) = lookup("SUBSIDY_SINK_REJECT_DUPLICATES") {
            config.sink.reject_duplicate_email =
                parse_bool("SUBSIDY_SINK_REJECT_DUPLICATES", &value)?;
        }
        if let Some(value) = lookup("SUBSIDY_SINK_FIRE_AND_FORGET") {
            config.sink.fire_and_forget = parse_bool("SUBSIDY_SINK_FIRE_AND_FORGET", &value)?;
        }

        Ok(config)
    }

    /// The form URL, which has no default.
    pub fn require_form_url(&self) -> Result<&str> {
        self.form_url.as_deref().ok_or_else(|| {
            Error::Config("form URL is not set (use --form-url or SUBSIDY_FORM_URL)".into())
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| Error::Config(format!("{key}: expected milliseconds, got {value:?}")))
}

pub struct ConfigBuilder {
    config: AutomationConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AutomationConfig::default(),
        }
    }

    /// Start from an existing configuration, e.g. one read from the environment.
    pub fn from_config(config: AutomationConfig) -> Self {
        Self { config }
    }

    pub fn form_url(mut self, url: impl Into<String>) -> Self {
        self.config.form_url = Some(url.into());
        self
    }

    pub fn form_map_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.form_map_path = Some(path.into());
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.browser.headless = headless;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.browser.viewport_width = width;
        self.config.browser.viewport_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.browser.chrome_path = Some(path.into());
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.config.timings = timings;
        self
    }

    pub fn webhook_sink(mut self, url: impl Into<String>) -> Self {
        self.config.sink.webhook_url = Some(url.into());
        self
    }

    pub fn csv_sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sink.csv_path = Some(path.into());
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn build(self) -> AutomationConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
