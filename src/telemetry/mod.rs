//! Telemetry for the task AI core.
//!
//! Structured logging, processing spans, and metrics emitted through the
//! `metrics` facade. The exporter is installed by the embedding process.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{record_active_models, record_inference, record_load, record_model_memory};
pub use spans::{ProcessingSpan, SpanExt};
