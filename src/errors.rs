use reqwest::StatusCode;
use thiserror::Error;

const BODY_SNIPPET_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(Box<figment::Error>),

    #[error("missing configuration values: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid segment id '{0}' in segment_ids")]
    InvalidSegmentId(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Source(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("token response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("token response did not contain an access_token")]
    MissingAccessToken,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unauthorized (401), the access token may be invalid or expired")]
    Unauthorized,

    #[error("rate limit exceeded (429), usage={} limit={}", .usage.as_deref().unwrap_or("N/A"), .limit.as_deref().unwrap_or("N/A"))]
    RateLimited {
        usage: Option<String>,
        limit: Option<String>,
    },

    #[error("bad request (400): {0}")]
    BadRequest(String),

    #[error("request returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write log file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write chart {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Conditions that stop the whole invocation with a non-zero exit status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("cannot proceed without a valid access token: {0}")]
    Auth(#[from] AuthError),

    #[error("segment explore failed: {0}")]
    Explore(#[from] FetchError),
}

pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}
