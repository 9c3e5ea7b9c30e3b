//! Analyzer seam.
//!
//! The core never parses, ranks or summarizes tasks itself. It calls into
//! a [`TaskAnalyzer`] supplied by the embedding service and substitutes a
//! low-confidence fallback when the analyzer fails.

pub mod fallback;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("Invalid analyzer input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

/// Structured form of a free-text task description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTask {
    pub title: String,
    pub description: String,
    pub priority: String,
    pub estimated_hours: f64,
    pub tags: Vec<String>,
    pub confidence: f64,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedTask {
    pub task_id: String,
    pub priority_score: f64,
    pub urgency: String,
    pub importance: String,
    pub reasoning: String,
    pub factors: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizationResult {
    pub prioritized_tasks: Vec<PrioritizedTask>,
    pub reasoning: String,
    pub confidence: f64,
    pub factors_considered: Vec<String>,
    pub total_tasks: usize,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub total_patterns: usize,
    pub pattern_types: Vec<String>,
    pub strongest_pattern: Option<String>,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub patterns: PatternSummary,
    pub confidence: f64,
    pub analysis_period: String,
    pub data_quality: String,
    #[serde(default)]
    pub detailed_insights: Vec<Value>,
    #[serde(default)]
    pub detected_patterns: Vec<Value>,
}

/// External analysis functions. Implementations must be side-effect free:
/// identical input is expected to produce identical output, and results
/// may be served from cache.
pub trait TaskAnalyzer: Send + Sync {
    fn parse_task(&self, text: &str) -> Result<ParsedTask, AnalyzerError>;

    fn prioritize_tasks(&self, tasks: &[Value]) -> Result<PrioritizationResult, AnalyzerError>;

    fn generate_insights(&self, history: &[Value]) -> Result<InsightReport, AnalyzerError>;
}
