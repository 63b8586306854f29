use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::OnceCell;
use serde_json::{json, Value};

use crate::error::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CastOutcome {
    Success,
    Invalid,
    Ineligible,
    Duplicate,
    Internal,
}

impl CastOutcome {
    pub fn of<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(Error::Validation(_)) | Err(Error::NotFound(_)) => Self::Invalid,
            Err(Error::Eligibility(_)) | Err(Error::Unauthorized) => Self::Ineligible,
            Err(Error::DuplicateVote) => Self::Duplicate,
            Err(_) => Self::Internal,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Invalid => "invalid",
            Self::Ineligible => "ineligible",
            Self::Duplicate => "duplicate",
            Self::Internal => "internal",
        }
    }
}

#[derive(Default)]
pub struct Metrics {
    cast_total: HashMap<CastOutcome, u64>,
    append_conflicts_total: u64,
    broadcast_failures_total: u64,
    integrity_findings_total: u64,
    sessions_opened_total: u64,
    sessions_active: u64,
}

static METRICS: OnceCell<Mutex<Metrics>> = OnceCell::new();

fn get() -> MutexGuard<'static, Metrics> {
    METRICS
        .get_or_init(|| Mutex::new(Metrics::default()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

pub fn record_cast_outcome(outcome: CastOutcome) {
    *get().cast_total.entry(outcome).or_insert(0) += 1;
}

pub fn record_append_conflict() {
    get().append_conflicts_total += 1;
}

pub fn record_broadcast_failure() {
    get().broadcast_failures_total += 1;
}

pub fn record_integrity_finding() {
    get().integrity_findings_total += 1;
}

pub fn record_session_opened() {
    let mut m = get();
    m.sessions_opened_total += 1;
    m.sessions_active += 1;
}

pub fn record_session_closed() {
    let mut m = get();
    m.sessions_active = m.sessions_active.saturating_sub(1);
}

pub fn snapshot_as_json(db_path: &str) -> Value {
    let m = get();

    let mut casts: Vec<(CastOutcome, u64)> = m.cast_total.iter().map(|(k, v)| (*k, *v)).collect();
    casts.sort_by_key(|(outcome, _)| outcome.label());
    let casts: Vec<Value> = casts
        .into_iter()
        .map(|(outcome, count)| json!({ "outcome": outcome.label(), "count": count }))
        .collect();

    let db_mb = storage_db_bytes(db_path).map(|b| round2(bytes_to_mb(b)));
    let fs_free_mb = filesystem_free_mb_from_db_path(db_path);

    json!({
        "cast_total": casts,
        "append_conflicts_total": m.append_conflicts_total,
        "broadcast_failures_total": m.broadcast_failures_total,
        "integrity_findings_total": m.integrity_findings_total,
        "sessions": {
            "opened_total": m.sessions_opened_total,
            "active": m.sessions_active,
        },
        "storage": {
            "db_path": db_path,
            "db_size_mb": db_mb,
            "free_storage_mb": fs_free_mb,
        }
    })
}

fn storage_db_bytes(db_path: &str) -> Option<u64> {
    std::fs::metadata(db_path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = 1024.0 * 1024.0;
    (bytes as f64) / mb
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn filesystem_free_mb_from_db_path(db_path: &str) -> Option<f64> {
    use sysinfo::Disks;
    let path = std::path::Path::new(db_path).canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| round2(bytes_to_mb(d.available_space())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        assert_eq!(CastOutcome::of(&Ok::<(), Error>(())), CastOutcome::Success);
        assert_eq!(
            CastOutcome::of::<()>(&Err(Error::DuplicateVote)),
            CastOutcome::Duplicate
        );
        assert_eq!(
            CastOutcome::of::<()>(&Err(Error::Eligibility("x".into()))),
            CastOutcome::Ineligible
        );
        assert_eq!(
            CastOutcome::of::<()>(&Err(Error::ConcurrencyConflict("e1".into()))),
            CastOutcome::Internal
        );
    }

    #[test]
    fn test_snapshot_shape() {
        record_cast_outcome(CastOutcome::Duplicate);
        let json = snapshot_as_json(":memory:");
        let casts = json["cast_total"].as_array().unwrap();
        assert!(casts
            .iter()
            .any(|c| c["outcome"] == "duplicate" && c["count"].as_u64() >= Some(1)));
        assert_eq!(json["storage"]["db_size_mb"], Value::Null);
    }
}
