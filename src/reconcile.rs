use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{info, warn};

use crate::common::FileLayout;
use crate::intake::spool_broker::{SpoolBroker, INFLIGHT_DIR};
use crate::pipeline::orchestration::artifact::TEMP_EXTENSION;
use crate::sink::JsonResultSink;

/// What a startup sweep found under the upload root and the spool.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub removed_temporaries: Vec<PathBuf>,
    /// Published results whose photo has no recorded outcome.
    pub orphaned_results: Vec<PathBuf>,
    /// Claimed spool messages never acknowledged within the timeout.
    pub stale_deliveries: Vec<PathBuf>,
}

/// Deletes temporary artifacts older than `max_age` left in the per-user
/// directories by interrupted runs. A missing upload root is not an error.
pub fn sweep_stale_temporaries(upload_root: &Path, max_age: Duration) -> io::Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut removed = Vec::new();
    for path in user_files(upload_root)? {
        if path.extension().is_none_or(|ext| ext != TEMP_EXTENSION) {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= max_age {
            fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Lists result artifacts the sink has no record for. These come from runs
/// that published their image but stopped before the outcome was recorded;
/// the broker redelivers such jobs, so they are only reported.
pub fn find_orphaned_results(
    upload_root: &Path,
    sink: &JsonResultSink,
) -> io::Result<Vec<PathBuf>> {
    let mut orphans: Vec<PathBuf> = user_files(upload_root)?
        .into_iter()
        .filter(|path| {
            FileLayout::parse_result_name(path).is_some_and(|photo_id| !sink.has_record(photo_id))
        })
        .collect();
    orphans.sort();
    Ok(orphans)
}

/// Lists claims in `<spool_dir>/inflight` older than `max_age`. Their photos
/// are still shown as processing; the broker hands them out again.
pub fn find_stale_deliveries(spool_dir: &Path, max_age: Duration) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(spool_dir.join(INFLIGHT_DIR)) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let now = Utc::now();
    let mut stale = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let expired = match SpoolBroker::claimed_at(&path) {
            Some(claimed) => (now - claimed).to_std().unwrap_or_default() >= max_age,
            None => true,
        };
        if expired {
            stale.push(path);
        }
    }
    stale.sort();
    Ok(stale)
}

pub fn reconcile(
    layout: &FileLayout,
    spool_dir: &Path,
    sink: &JsonResultSink,
    max_temp_age: Duration,
    visibility_timeout: Duration,
) -> io::Result<ReconcileReport> {
    let report = ReconcileReport {
        removed_temporaries: sweep_stale_temporaries(&layout.upload_root, max_temp_age)?,
        orphaned_results: find_orphaned_results(&layout.upload_root, sink)?,
        stale_deliveries: find_stale_deliveries(spool_dir, visibility_timeout)?,
    };
    if !report.removed_temporaries.is_empty() {
        info!(
            "Removed {} stale temporary artifacts",
            report.removed_temporaries.len()
        );
    }
    for orphan in &report.orphaned_results {
        warn!("Result without a recorded outcome: {}", orphan.display());
    }
    for delivery in &report.stale_deliveries {
        warn!("Unacknowledged job past its timeout: {}", delivery.display());
    }
    Ok(report)
}

/// Files one level below the upload root, i.e. inside user directories.
fn user_files(upload_root: &Path) -> io::Result<Vec<PathBuf>> {
    let users = match fs::read_dir(upload_root) {
        Ok(users) => users,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut files = Vec::new();
    for user in users {
        let user = user?;
        if !user.file_type()?.is_dir() {
            continue;
        }
        for entry in fs::read_dir(user.path())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
    }
    Ok(files)
}
