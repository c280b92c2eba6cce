use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Current cumulative counters for one segment, as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSnapshot {
    pub id: u64,
    pub name: String,
    pub cumulative_attempts: u64,
    pub cumulative_athletes: u64,
}

/// One persisted observation of a segment on a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub segment_id: u64,
    pub segment_name: String,
    pub date: NaiveDate,
    #[serde(rename = "total_attempts_on_date")]
    pub cumulative_attempts_on_date: u64,
    pub daily_attempts: u64,
    pub athlete_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub daily_attempts: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
    pub charts_written: usize,
    pub chart_failures: usize,
}

#[derive(Debug, Deserialize)]
pub struct SegmentDetail {
    pub name: Option<String>,
    pub effort_count: Option<u64>,
    pub athlete_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExploreResponse {
    #[serde(default)]
    pub segments: Vec<ExploredSegment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExploredSegment {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "no_climb_category")]
    pub climb_category: i32,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub avg_grade: f64,
}

fn no_climb_category() -> i32 {
    -1
}
