use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use prometheus::*;

static METRIC_ASSETS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("mvannot_assets_total", "assets handled by the renderer", &["outcome"])
        .expect("failed to register mvannot_assets_total")
});

static METRIC_VIEWS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "mvannot_views_rejected_total",
        "views dropped by the quality gate",
        &["reason"]
    )
    .expect("failed to register mvannot_views_rejected_total")
});

static METRIC_BATCH_JOBS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "mvannot_batch_jobs_total",
        "batch jobs observed in a terminal state",
        &["status"]
    )
    .expect("failed to register mvannot_batch_jobs_total")
});

/// `outcome` is one of `done`, `skipped`, `failed`
pub fn inc_asset(outcome: &str) {
    METRIC_ASSETS.with_label_values(&[outcome]).inc();
}

pub fn inc_view_rejected(reason: &str) {
    METRIC_VIEWS_REJECTED.with_label_values(&[reason]).inc();
}

pub fn inc_batch_job(status: &str) {
    METRIC_BATCH_JOBS.with_label_values(&[status]).inc();
}

/// Dump every registered metric in text format, for a node exporter textfile collector
pub fn write_textfile(path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut buffer = String::new();
    TextEncoder::new().encode_utf8(&gather(), &mut buffer)?;
    std::fs::write(path, buffer).with_context(|| format!("failed to write {}", path.display()))
}
