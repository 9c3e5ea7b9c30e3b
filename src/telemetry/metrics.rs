//! Metric emission through the `metrics` facade.
//!
//! Every call is a no-op until the embedding process installs a recorder.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::models::ArtifactType;

pub fn record_active_models(count: usize) {
    gauge!("task_ai_active_models").set(count as f64);
}

/// Resident memory attributed to one loaded artifact. Zero on unload.
pub fn record_model_memory(model_type: ArtifactType, version: &str, bytes: u64) {
    gauge!(
        "task_ai_model_memory_bytes",
        "model_type" => model_type.as_str(),
        "version" => version.to_string()
    )
    .set(bytes as f64);
}

pub fn record_inference(model_type: ArtifactType, version: &str, status: &'static str, elapsed: Duration) {
    counter!(
        "task_ai_model_inference_total",
        "model_type" => model_type.as_str(),
        "version" => version.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "task_ai_model_inference_duration_seconds",
        "model_type" => model_type.as_str(),
        "version" => version.to_string(),
        "status" => status
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_load(model_type: ArtifactType, status: &'static str) {
    counter!(
        "task_ai_model_load_total",
        "model_type" => model_type.as_str(),
        "status" => status
    )
    .increment(1);
}
