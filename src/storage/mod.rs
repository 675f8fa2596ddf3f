//! Lifetime statistics on disk.
//!
//! Counters outlive the process, so a save goes to a sibling temp file that
//! is renamed over the real one; an interrupted write leaves the previous
//! file intact. Loading repairs files written by older or hand-edited
//! versions: the sales history is capped and the counters never fall below
//! what the history itself records.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::LifetimeStats;

/// Default stats file path.
pub const DEFAULT_STATS_FILE: &str = "pinch_stats.json";

fn resolve(path: Option<&str>) -> &Path {
    Path::new(path.unwrap_or(DEFAULT_STATS_FILE))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `stats` atomically.
pub fn save_stats(stats: &LifetimeStats, path: Option<&str>) -> Result<()> {
    let path = resolve(path);
    let tmp = temp_sibling(path);
    let json = serde_json::to_vec_pretty(stats).context("Failed to serialise lifetime stats")?;

    fs::write(&tmp, &json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;

    debug!(
        path = %path.display(),
        undercuts = stats.total_undercuts_made,
        sales = stats.sales_history.len(),
        "Lifetime stats saved"
    );
    Ok(())
}

/// Read lifetime stats. `None` on first run.
pub fn load_stats(path: Option<&str>) -> Result<Option<LifetimeStats>> {
    let path = resolve(path);
    let json = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No lifetime stats yet, starting from zero");
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let mut stats: LifetimeStats = serde_json::from_slice(&json)
        .with_context(|| format!("Corrupt lifetime stats in {}", path.display()))?;
    repair(&mut stats);

    info!(
        path = %path.display(),
        lifetime = %stats,
        sales = stats.sales_history.len(),
        "Lifetime stats restored"
    );
    Ok(Some(stats))
}

fn repair(stats: &mut LifetimeStats) {
    let listed = stats.sales_history.len() as u64;
    let listed_gil: u64 = stats.sales_history.iter().map(|s| s.price).sum();
    if stats.total_items_sold < listed || stats.total_gil_earned < listed_gil {
        warn!(
            items_sold = stats.total_items_sold,
            listed,
            gil_earned = stats.total_gil_earned,
            listed_gil,
            "Sale counters behind history, raising them"
        );
        stats.total_items_sold = stats.total_items_sold.max(listed);
        stats.total_gil_earned = stats.total_gil_earned.max(listed_gil);
    }

    let dropped = stats.trim_history();
    if dropped > 0 {
        warn!(dropped, "Sales history over capacity, oldest entries dropped");
    }
}
