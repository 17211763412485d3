use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

/// Largest page the playlistItems endpoint will return
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Browser launch and session settings
    pub browser: BrowserSettings,

    /// Wait budgets of the two capture strategies
    pub interception: InterceptionSettings,

    /// Replay client settings
    pub http: HttpSettings,

    /// YouTube Data API settings
    pub api: ApiSettings,

    /// Batch pipeline settings
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run Chromium without a window
    pub headless: bool,

    /// User agent presented by the page
    pub user_agent: String,

    /// Extra Chromium command-line switches
    pub launch_args: Vec<String>,

    /// Chromium binary to use instead of auto-detection
    pub chrome_executable: Option<PathBuf>,

    /// JSON cookie export used to seed the session
    pub cookies_file: Option<PathBuf>,

    /// Upper bound on a single page navigation
    pub navigation_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterceptionSettings {
    /// Per-click wait for the transcript panel affordances
    pub panel_timeout_ms: u64,

    /// Per-action wait for the player and captions toggle
    pub fallback_timeout_ms: u64,

    /// Pause between hovering the player and clicking the captions toggle
    pub hover_settle_ms: u64,

    /// Pause after the last click so the triggered request can be captured
    pub capture_settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpSettings {
    /// Whole-request timeout for replayed calls
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,

    /// Items requested per playlist page
    pub page_size: u32,

    /// Used when neither `--api-key` nor `YT_API_KEY` is set
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Root of the `raw/` and `failed/` result directories
    pub transcript_dir: PathBuf,

    /// Videos processed between checkpoints
    pub checkpoint_every: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserSettings::default(),
            interception: InterceptionSettings::default(),
            http: HttpSettings::default(),
            api: ApiSettings::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            launch_args: vec![
                "--mute-audio".to_string(),
                "--disable-blink-features=AutomationControlled".to_string(),
            ],
            chrome_executable: None,
            cookies_file: None,
            navigation_timeout_secs: 30,
        }
    }
}

impl Default for InterceptionSettings {
    fn default() -> Self {
        Self {
            panel_timeout_ms: 5000,
            fallback_timeout_ms: 5000,
            hover_settle_ms: 500,
            capture_settle_ms: 500,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            page_size: MAX_PAGE_SIZE,
            api_key: None,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            transcript_dir: PathBuf::from("./transcripts"),
            checkpoint_every: 10,
        }
    }
}

impl InterceptionSettings {
    pub fn panel_timeout(&self) -> Duration {
        Duration::from_millis(self.panel_timeout_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    pub fn hover_settle(&self) -> Duration {
        Duration::from_millis(self.hover_settle_ms)
    }

    pub fn capture_settle(&self) -> Duration {
        Duration::from_millis(self.capture_settle_ms)
    }
}

impl Config {
    /// Load configuration from `explicit`, or the default location (creating it if absent)
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            Ok(config)
        }
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("yt-transcript-scraper").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.checkpoint_every == 0 {
            anyhow::bail!("pipeline.checkpoint_every must be at least 1");
        }

        if !(1..=MAX_PAGE_SIZE).contains(&self.api.page_size) {
            anyhow::bail!("api.page_size must be between 1 and {}", MAX_PAGE_SIZE);
        }

        if self.interception.panel_timeout_ms == 0 || self.interception.fallback_timeout_ms == 0 {
            anyhow::bail!("interception timeouts must be greater than zero");
        }

        if self.http.request_timeout_secs == 0 {
            anyhow::bail!("http.request_timeout_secs must be greater than zero");
        }

        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("api.base_url is not a valid URL: {}", self.api.base_url))?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Headless: {}", self.browser.headless);
        if let Some(cookies) = &self.browser.cookies_file {
            println!("  Cookies File: {}", cookies.display());
        }
        println!(
            "  Panel / Fallback Timeout: {}ms / {}ms",
            self.interception.panel_timeout_ms, self.interception.fallback_timeout_ms
        );
        println!("  Replay Timeout: {}s", self.http.request_timeout_secs);
        println!("  API Base URL: {}", self.api.base_url);
        println!("  API Key: {}", if self.api.api_key.is_some() { "set" } else { "not set" });
        println!("  Transcript Dir: {}", self.pipeline.transcript_dir.display());
        println!("  Checkpoint Every: {}", self.pipeline.checkpoint_every);
    }
}
