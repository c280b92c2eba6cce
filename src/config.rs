use crate::errors::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Deserializer};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_LOG_FILE: &str = "all_segments_log.csv";
pub const DEFAULT_CHART_DIR: &str = "plots";
pub const DEFAULT_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
pub const DEFAULT_API_BASE_URL: &str = "https://www.strava.com/api/v3";

const ENV_PREFIX: &str = "STRAVA_";

/// Raw settings as merged from the config file and the environment. Nothing
/// here is validated yet; see [`Settings::into_config`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub strava: StravaSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StravaSettings {
    #[serde(deserialize_with = "lenient_string")]
    pub client_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub client_secret: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub refresh_token: Option<String>,
    pub segment_ids: Option<SegmentIds>,
    pub token_url: String,
    pub api_base_url: String,
    pub request_delay_ms: u64,
    pub token_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for StravaSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            segment_ids: None,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_delay_ms: 500,
            token_timeout_secs: 30,
            fetch_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub log_file: PathBuf,
    pub chart_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            chart_dir: PathBuf::from(DEFAULT_CHART_DIR),
        }
    }
}

/// Segment ids as they may appear in TOML or the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SegmentIds {
    List(Vec<u64>),
    One(u64),
    Text(String),
}

impl SegmentIds {
    pub fn parse(&self) -> Result<Vec<u64>, ConfigError> {
        match self {
            Self::List(ids) => Ok(ids.clone()),
            Self::One(id) => Ok(vec![*id]),
            Self::Text(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| {
                    token
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidSegmentId(token.to_string()))
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub token_url: String,
    pub api_base_url: String,
    pub token_timeout: Duration,
    pub fetch_timeout: Duration,
    pub request_delay: Duration,
}

/// Validated configuration, built once at startup and passed explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub segment_ids: Vec<u64>,
    pub api: ApiSettings,
    pub log_file: PathBuf,
    pub chart_dir: PathBuf,
}

impl Settings {
    /// Config file first, then `STRAVA_*` environment variables on top.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::new().merge(Toml::file(config_path)).merge(
            Env::prefixed(ENV_PREFIX).map(|key| format!("strava.{key}").into()),
        )
    }

    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(config_path))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    pub fn api(&self) -> ApiSettings {
        ApiSettings {
            token_url: self.strava.token_url.clone(),
            api_base_url: self.strava.api_base_url.trim_end_matches('/').to_string(),
            token_timeout: Duration::from_secs(self.strava.token_timeout_secs),
            fetch_timeout: Duration::from_secs(self.strava.fetch_timeout_secs),
            request_delay: Duration::from_millis(self.strava.request_delay_ms),
        }
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let missing = self.missing_credentials();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        Ok(self.credentials_unchecked())
    }

    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut missing = self.missing_credentials();
        let segment_ids = match &self.strava.segment_ids {
            Some(raw) => raw.parse()?,
            None => Vec::new(),
        };
        if segment_ids.is_empty() {
            missing.push("segment_ids");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        Ok(Config {
            credentials: self.credentials_unchecked(),
            segment_ids,
            api: self.api(),
            log_file: self.output.log_file,
            chart_dir: self.output.chart_dir,
        })
    }

    fn missing_credentials(&self) -> Vec<&'static str> {
        [
            ("client_id", &self.strava.client_id),
            ("client_secret", &self.strava.client_secret),
            ("refresh_token", &self.strava.refresh_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    fn credentials_unchecked(&self) -> Credentials {
        let value = |field: &Option<String>| field.as_deref().unwrap_or_default().trim().to_string();
        Credentials {
            client_id: value(&self.strava.client_id),
            client_secret: value(&self.strava.client_secret),
            refresh_token: value(&self.strava.refresh_token),
        }
    }
}

// Numeric client ids arrive as integers from both TOML and the environment.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(text) => text,
        Scalar::Unsigned(n) => n.to_string(),
        Scalar::Signed(n) => n.to_string(),
    }))
}
