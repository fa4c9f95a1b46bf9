//! Long-running `watch` mode: periodic refreshes plus a daily digest at
//! a configured UTC time, until Ctrl-C.

use anyhow::Result;
use chrono::{NaiveTime, Utc};
use std::time::Duration;

use crate::pipeline::Pipeline;

/// Runs the pipeline on a schedule until interrupted.
///
/// A full run (including the digest) happens immediately on startup and
/// then daily at `digest_time`. In between, feeds are refreshed and new
/// articles summarized every `refresh_interval_hours` (0 disables the
/// interval, leaving only the daily run).
pub async fn watch(
    pipeline: &Pipeline,
    digest_time: NaiveTime,
    refresh_interval_hours: u64,
) -> Result<()> {
    tracing::info!(
        digest_time = %digest_time.format("%H:%M"),
        refresh_interval_hours = refresh_interval_hours,
        "Starting watch mode"
    );

    if let Err(e) = pipeline.run_once().await {
        tracing::error!(error = %e, "Initial pipeline run failed");
    }

    let mut refresh_timer = (refresh_interval_hours > 0).then(|| {
        let period = Duration::from_secs(refresh_interval_hours * 3600);
        // First tick fires after one period, not immediately
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    loop {
        let until_digest = duration_until(digest_time);
        tracing::debug!(secs = until_digest.as_secs(), "Next digest run scheduled");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down");
                return Ok(());
            }
            _ = tokio::time::sleep(until_digest) => {
                if let Err(e) = pipeline.run_once().await {
                    tracing::error!(error = %e, "Scheduled digest run failed");
                }
            }
            _ = tick(&mut refresh_timer) => {
                match pipeline.refresh_and_summarize().await {
                    Ok(report) => tracing::info!(
                        new_articles = report.new_articles,
                        summarized = report.summarized,
                        "Interval refresh complete"
                    ),
                    Err(e) => tracing::error!(error = %e, "Interval refresh failed"),
                }
            }
        }
    }
}

/// Resolves to the next tick, or never when the interval is disabled.
async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Time until the next occurrence of `target` in UTC.
fn duration_until(target: NaiveTime) -> Duration {
    duration_until_from(Utc::now().naive_utc(), target)
}

fn duration_until_from(now: chrono::NaiveDateTime, target: NaiveTime) -> Duration {
    let mut next = now.date().and_time(target);
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
