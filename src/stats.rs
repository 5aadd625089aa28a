//! Store statistics and health overview.
//!
//! Summarizes what has been ingested and judged: item and record counts,
//! open queries, and per-source / per-query breakdowns. Used by `sift stats`
//! to confirm that scheduled runs are making progress.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::store::ItemStore;

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config, store: &dyn ItemStore) -> Result<()> {
    let stats = store.stats().await?;

    println!("feedsift: store stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(stats.size_bytes));
    println!();
    println!("  Sources:     {}", stats.source_count);
    println!("  Items:       {}", stats.item_count);
    println!("  Records:     {}", stats.record_count);
    println!(
        "  Queries:     {} ({} open, {} resolved)",
        stats.query_count,
        stats.open_query_count,
        stats.query_count - stats.open_query_count
    );

    let sources = store.source_breakdown().await?;
    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<28} {:>6} {:>8} {:>9}   {}",
            "SOURCE", "ITEMS", "RECORDS", "AVG SCORE", "LAST CONSUMED"
        );
        println!("  {}", "-".repeat(76));
        for s in &sources {
            let last = s
                .last_consumed_at
                .map(format_ts_relative)
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<28} {:>6} {:>8} {:>9}   {}",
                s.name,
                s.item_count,
                s.record_count,
                format_avg(s.avg_score),
                last
            );
        }
    }

    let queries = store.query_breakdown().await?;
    if !queries.is_empty() {
        println!();
        println!("  By query:");
        println!(
            "  {:>4}  {:<9} {:>8} {:>9}   {}",
            "ID", "STATE", "RECORDS", "AVG SCORE", "TEXT"
        );
        println!("  {}", "-".repeat(76));
        for q in &queries {
            println!(
                "  {:>4}  {:<9} {:>8} {:>9}   {}",
                q.id,
                if q.resolved { "resolved" } else { "open" },
                q.record_count,
                format_avg(q.avg_score),
                q.text
            );
        }
    }

    println!();
    Ok(())
}

fn format_avg(avg: Option<f64>) -> String {
    avg.map(|a| format!("{:.1}", a))
        .unwrap_or_else(|| "-".to_string())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
pub fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

pub fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}
