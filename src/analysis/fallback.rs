//! Low-confidence responses returned when an analyzer fails.

use serde_json::Value;

use super::{
    AnalyzerError, InsightReport, ParsedTask, PatternSummary, PrioritizationResult, PrioritizedTask,
};

const TITLE_CHARS: usize = 50;

pub fn parsed_task(text: &str) -> ParsedTask {
    let title = if text.chars().count() > TITLE_CHARS {
        let mut truncated: String = text.chars().take(TITLE_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        text.to_string()
    };

    ParsedTask {
        title,
        description: text.to_string(),
        priority: "medium".to_string(),
        estimated_hours: 1.0,
        tags: vec!["error".to_string()],
        confidence: 0.1,
        category: None,
    }
}

/// One neutral entry per input task, in input order.
pub fn prioritization(tasks: &[Value]) -> PrioritizationResult {
    let prioritized_tasks = (0..tasks.len())
        .map(|i| PrioritizedTask {
            task_id: i.to_string(),
            priority_score: 0.5,
            urgency: "medium".to_string(),
            importance: "medium".to_string(),
            reasoning: "Fallback prioritization due to error".to_string(),
            factors: vec!["error".to_string()],
            confidence: 0.1,
        })
        .collect();

    PrioritizationResult {
        prioritized_tasks,
        reasoning: "Prioritization failed, using fallback ordering".to_string(),
        confidence: 0.1,
        factors_considered: vec!["error".to_string()],
        total_tasks: tasks.len(),
        processing_time_ms: 0.0,
    }
}

pub fn insight_report(error: &AnalyzerError) -> InsightReport {
    InsightReport {
        insights: vec![
            "Focus on completing one task at a time to build momentum".to_string(),
            "Break large tasks into smaller, manageable pieces".to_string(),
            "Set specific time blocks for different types of work".to_string(),
        ],
        recommendations: vec![
            "Track your tasks consistently to enable better insights".to_string(),
            "Note completion times to improve future planning".to_string(),
            "Categorize tasks to identify patterns over time".to_string(),
        ],
        patterns: PatternSummary::default(),
        confidence: 0.3,
        analysis_period: "Unknown".to_string(),
        data_quality: format!("Analysis failed: {}", error),
        detailed_insights: Vec::new(),
        detected_patterns: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_short_title_kept() {
        let parsed = parsed_task("Buy milk");
        assert_eq!(parsed.title, "Buy milk");
        assert_eq!(parsed.description, "Buy milk");
        assert_eq!(parsed.tags, vec!["error"]);
        assert_eq!(parsed.confidence, 0.1);
        assert!(parsed.category.is_none());
    }

    #[test]
    fn test_long_title_truncated_on_chars() {
        let text = "é".repeat(60);
        let parsed = parsed_task(&text);
        assert_eq!(parsed.title.chars().count(), TITLE_CHARS + 3);
        assert!(parsed.title.ends_with("..."));
        assert_eq!(parsed.description, text);
    }

    #[test]
    fn test_prioritization_one_entry_per_task() {
        let result = prioritization(&[json!({"title": "a"}), json!({"title": "b"})]);
        assert_eq!(result.total_tasks, 2);
        let ids: Vec<_> = result.prioritized_tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert!(result.prioritized_tasks.iter().all(|t| t.priority_score == 0.5));
    }

    #[test]
    fn test_insight_report_carries_reason() {
        let report = insight_report(&AnalyzerError::Failed("no history".into()));
        assert_eq!(report.data_quality, "Analysis failed: no history");
        assert_eq!(report.insights.len(), 3);
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(report.patterns.total_patterns, 0);
        assert_eq!(report.confidence, 0.3);
    }
}
