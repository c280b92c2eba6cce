//! HTTPS client for the token exchange and segment endpoints.

use crate::config::{ApiSettings, Credentials};
use crate::errors::{AuthError, FetchError, snippet};
use crate::models::{
    ExploreResponse, ExploredSegment, SegmentDetail, SegmentSnapshot, TokenResponse,
};
use chrono::DateTime;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

const EXPLORE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ActivityType {
    Riding,
    Running,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Riding => "riding",
            Self::Running => "running",
        }
    }
}

/// Bounding box and filters for the segment explore endpoint.
#[derive(Debug, Clone)]
pub struct ExploreQuery {
    pub sw_lat: f64,
    pub sw_lng: f64,
    pub ne_lat: f64,
    pub ne_lng: f64,
    pub activity: ActivityType,
    pub min_cat: Option<u8>,
    pub max_cat: Option<u8>,
}

impl ExploreQuery {
    pub fn bounds(&self) -> String {
        format!("{},{},{},{}", self.sw_lat, self.sw_lng, self.ne_lat, self.ne_lng)
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("bounds", self.bounds()),
            ("activity_type", self.activity.as_str().to_string()),
        ];
        if let Some(min_cat) = self.min_cat {
            params.push(("min_cat", min_cat.to_string()));
        }
        if let Some(max_cat) = self.max_cat {
            params.push(("max_cat", max_cat.to_string()));
        }
        params
    }
}

pub struct StravaClient {
    http: Client,
    api: ApiSettings,
}

impl StravaClient {
    pub fn new(api: ApiSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("segment_tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, api })
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.api
    }

    /// Exchanges the long-lived refresh token for a bearer token.
    pub async fn refresh_token(&self, credentials: &Credentials) -> Result<String, AuthError> {
        info!("refreshing access token");
        let form = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
            ("f", "json"),
        ];
        let response = self
            .http
            .post(&self.api.token_url)
            .form(&form)
            .timeout(self.api.token_timeout)
            .send()
            .await
            .map_err(AuthError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(AuthError::Transport)?;
        if !status.is_success() {
            return Err(AuthError::Status {
                status,
                body: snippet(&body),
            });
        }

        let (token, expires_at) = parse_token(&body)?;
        let expiry = expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "N/A".to_string());
        info!("access token refreshed, expires around {expiry}");
        Ok(token)
    }

    pub async fn fetch_segment(
        &self,
        segment_id: u64,
        access_token: &str,
    ) -> Result<SegmentSnapshot, FetchError> {
        debug!("fetching segment {segment_id}");
        let response = self
            .http
            .get(format!("{}/segments/{segment_id}", self.api.api_base_url))
            .bearer_auth(access_token)
            .timeout(self.api.fetch_timeout)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let body = success_body(response).await?;
        let snapshot = parse_segment(segment_id, &body)?;
        info!(
            "segment {} ('{}') fetched: total efforts {}, total athletes {}",
            snapshot.id, snapshot.name, snapshot.cumulative_attempts, snapshot.cumulative_athletes
        );
        Ok(snapshot)
    }

    pub async fn explore_segments(
        &self,
        access_token: &str,
        query: &ExploreQuery,
    ) -> Result<Vec<ExploredSegment>, FetchError> {
        info!(
            "exploring {} segments within bounds {}",
            query.activity.as_str(),
            query.bounds()
        );
        let response = self
            .http
            .get(format!("{}/segments/explore", self.api.api_base_url))
            .bearer_auth(access_token)
            .query(&query.params())
            .timeout(EXPLORE_TIMEOUT)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let body = success_body(response).await?;
        let parsed: ExploreResponse = serde_json::from_str(&body).map_err(FetchError::Decode)?;
        Ok(parsed.segments)
    }
}

async fn success_body(response: Response) -> Result<String, FetchError> {
    let status = response.status();
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let usage = header("X-RateLimit-Usage");
    let limit = header("X-RateLimit-Limit");

    let body = response.text().await.map_err(FetchError::Transport)?;
    match status {
        s if s.is_success() => Ok(body),
        StatusCode::UNAUTHORIZED => Err(FetchError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => {
            warn!("rate limit reached: usage={usage:?} limit={limit:?}");
            Err(FetchError::RateLimited { usage, limit })
        }
        StatusCode::BAD_REQUEST => Err(FetchError::BadRequest(snippet(&body))),
        status => Err(FetchError::Status {
            status,
            body: snippet(&body),
        }),
    }
}

pub fn parse_token(body: &str) -> Result<(String, Option<i64>), AuthError> {
    let parsed: TokenResponse = serde_json::from_str(body).map_err(AuthError::Decode)?;
    match parsed.access_token {
        Some(token) if !token.is_empty() => Ok((token, parsed.expires_at)),
        _ => Err(AuthError::MissingAccessToken),
    }
}

/// Missing counters read as zero and a missing name gets a placeholder.
pub fn parse_segment(segment_id: u64, body: &str) -> Result<SegmentSnapshot, FetchError> {
    let detail: SegmentDetail = serde_json::from_str(body).map_err(FetchError::Decode)?;
    Ok(SegmentSnapshot {
        id: segment_id,
        name: detail
            .name
            .unwrap_or_else(|| format!("Unknown Segment {segment_id}")),
        cumulative_attempts: detail.effort_count.unwrap_or(0),
        cumulative_athletes: detail.athlete_count.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_fields_are_read() {
        let body = r#"{"id": 229781, "name": "Hawk Hill", "effort_count": 309974, "athlete_count": 30623, "distance": 2684.82}"#;
        let snapshot = parse_segment(229781, body).unwrap();
        assert_eq!(
            snapshot,
            SegmentSnapshot {
                id: 229781,
                name: "Hawk Hill".into(),
                cumulative_attempts: 309974,
                cumulative_athletes: 30623,
            }
        );
    }

    #[test]
    fn missing_segment_fields_default() {
        let snapshot = parse_segment(17, r#"{"effort_count": null}"#).unwrap();
        assert_eq!(snapshot.name, "Unknown Segment 17");
        assert_eq!(snapshot.cumulative_attempts, 0);
        assert_eq!(snapshot.cumulative_athletes, 0);
    }

    #[test]
    fn malformed_segment_body_is_decode_error() {
        assert!(matches!(
            parse_segment(1, "<html>oops</html>"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn token_requires_access_token_field() {
        assert!(matches!(
            parse_token(r#"{"expires_at": 1700000000}"#),
            Err(AuthError::MissingAccessToken)
        ));
        let (token, expires) = parse_token(r#"{"access_token": "abc", "expires_at": 5}"#).unwrap();
        assert_eq!(token, "abc");
        assert_eq!(expires, Some(5));
    }

    #[test]
    fn explore_params_include_optional_categories() {
        let query = ExploreQuery {
            sw_lat: -41.24486,
            sw_lng: 174.921171,
            ne_lat: -41.238907,
            ne_lng: 174.937489,
            activity: ActivityType::Running,
            min_cat: None,
            max_cat: Some(3),
        };
        let params = query.params();
        assert_eq!(params[0], ("bounds", "-41.24486,174.921171,-41.238907,174.937489".to_string()));
        assert_eq!(params[1], ("activity_type", "running".to_string()));
        assert_eq!(params[2], ("max_cat", "3".to_string()));
        assert_eq!(params.len(), 3);
    }
}
