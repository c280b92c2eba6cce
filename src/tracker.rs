use crate::accumulator::accumulate;
use crate::chart;
use crate::models::{RunSummary, SegmentSnapshot};
use crate::storage::LogStore;
use crate::strava::StravaClient;
use chrono::NaiveDate;
use std::path::Path;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// One batch: fetch every segment, fold each snapshot into the log, then
/// chart every segment that made it into the log this run.
pub async fn run<S: LogStore>(
    client: &StravaClient,
    access_token: &str,
    segment_ids: &[u64],
    store: &mut S,
    chart_dir: &Path,
    today: NaiveDate,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let delay = client.settings().request_delay;

    info!("fetching current data for {} segment(s)", segment_ids.len());
    let mut snapshots: Vec<SegmentSnapshot> = Vec::with_capacity(segment_ids.len());
    for &segment_id in segment_ids {
        if !delay.is_zero() {
            sleep(delay).await;
        }
        match client.fetch_segment(segment_id, access_token).await {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(err) => {
                warn!("skipping segment {segment_id}: {err}");
                summary.failed += 1;
            }
        }
    }

    if snapshots.is_empty() {
        warn!("no segment data fetched successfully; skipping log update and charts");
        return summary;
    }

    let mut logged: Vec<(u64, String)> = Vec::with_capacity(snapshots.len());
    for snapshot in &snapshots {
        match accumulate(snapshot, store, today) {
            Ok(_) => {
                summary.processed += 1;
                logged.push((snapshot.id, snapshot.name.clone()));
            }
            Err(err) => {
                error!("could not record segment {}: {err}", snapshot.id);
                summary.failed += 1;
            }
        }
    }

    for (segment_id, name) in &logged {
        match chart::render(*segment_id, name, store, chart_dir) {
            Ok(Some(_)) => summary.charts_written += 1,
            Ok(None) => {}
            Err(err) => {
                error!("chart for segment {segment_id} failed: {err}");
                summary.chart_failures += 1;
            }
        }
    }

    info!(
        "run finished: {} processed, {} failed, {} chart(s) written, {} chart failure(s)",
        summary.processed, summary.failed, summary.charts_written, summary.chart_failures
    );
    summary
}
