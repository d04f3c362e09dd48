//! Core data types for scrape jobs, tools, and execution results.
//!
//! These structs mirror the job documents the host application stores, so
//! the serialized shape is camelCase with `type` fields kept under their
//! document names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How often a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Once,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ScheduleType {
    /// Whether this kind keeps a cron trigger after its first fire.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, ScheduleType::Once)
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScheduleType::Once => "once",
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
            ScheduleType::Monthly => "monthly",
            ScheduleType::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

/// Everything the delegator needs to run one scrape job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationPayload {
    pub job_id: String,
    pub name: String,
    pub schedule_type: ScheduleType,
    pub tools: Vec<Tool>,
}

/// One scraping tool: what to look for and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub max_pages: u32,
    pub targets: Vec<ToolTarget>,
}

impl Tool {
    /// Keywords for a target, falling back to the tool-level list.
    pub fn effective_keywords(&self, target: &ToolTarget) -> Vec<String> {
        target
            .keywords
            .clone()
            .unwrap_or_else(|| self.keywords.clone())
    }

    /// Page budget for a target, falling back to the tool-level limit.
    pub fn effective_max_pages(&self, target: &ToolTarget) -> u32 {
        target.max_pages.unwrap_or(self.max_pages)
    }
}

/// A crawl target attached to a tool, with optional per-target overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolTarget {
    pub target_id: String,
    pub target_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
}

/// The outcome of one crawl request: a scraped record or an error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestOutcome {
    /// A successfully scraped record.
    pub fn ok(record: serde_json::Value) -> Self {
        Self {
            record: Some(record),
            error: None,
        }
    }

    /// A failed request, keeping the error message for the stored results.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            record: None,
            error: Some(message.into()),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything one target produced during a crawl, in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub target_id: String,
    pub target_name: String,
    pub results: Vec<RequestOutcome>,
}

/// A tool paired with the per-target results of running it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolWithResults {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub max_pages: u32,
    pub targets: Vec<TargetResult>,
}

impl ToolWithResults {
    pub fn new(tool: &Tool, targets: Vec<TargetResult>) -> Self {
        Self {
            kind: tool.kind.clone(),
            keywords: tool.keywords.clone(),
            max_pages: tool.max_pages,
            targets,
        }
    }
}

/// When a delegation ran and on what recurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSchedule {
    #[serde(rename = "type")]
    pub kind: ScheduleType,
    pub delegated_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The persisted record of one delegation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayload {
    pub job_id: String,
    pub schedule: ExecutionSchedule,
    pub tools: Vec<ToolWithResults>,
}

impl ExecutionPayload {
    /// Scraped records across all tools and targets.
    pub fn record_count(&self) -> usize {
        self.tools
            .iter()
            .flat_map(|tool| &tool.targets)
            .flat_map(|target| &target.results)
            .filter(|outcome| outcome.record.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tool() -> Tool {
        Tool {
            kind: "listing-scan".into(),
            keywords: vec!["forklift".into()],
            max_pages: 10,
            targets: vec![ToolTarget {
                target_id: "t1".into(),
                target_name: "Acme Jobs".into(),
                keywords: Some(vec!["picker".into()]),
                max_pages: None,
            }],
        }
    }

    #[test]
    fn target_overrides_fall_back_to_tool_values() {
        let tool = sample_tool();
        let target = &tool.targets[0];

        assert_eq!(tool.effective_keywords(target), vec!["picker".to_string()]);
        assert_eq!(tool.effective_max_pages(target), 10);
    }

    #[test]
    fn schedule_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ScheduleType::Weekly).unwrap(),
            json!("weekly")
        );
        let parsed: ScheduleType = serde_json::from_value(json!("monthly")).unwrap();
        assert_eq!(parsed, ScheduleType::Monthly);
    }

    #[test]
    fn only_once_is_non_recurring() {
        assert!(!ScheduleType::Once.is_recurring());
        assert!(ScheduleType::Daily.is_recurring());
        assert!(ScheduleType::Yearly.is_recurring());
    }

    #[test]
    fn execution_payload_serializes_to_document_shape() {
        let execution = ExecutionPayload {
            job_id: "j1".into(),
            schedule: ExecutionSchedule {
                kind: ScheduleType::Daily,
                delegated_at: Utc::now(),
                finished_at: Utc::now(),
            },
            tools: vec![ToolWithResults::new(
                &sample_tool(),
                vec![TargetResult {
                    target_id: "t1".into(),
                    target_name: "Acme Jobs".into(),
                    results: vec![RequestOutcome::ok(json!({"title": "picker"}))],
                }],
            )],
        };

        let value = serde_json::to_value(&execution).unwrap();
        assert!(value.get("jobId").is_some());
        assert!(value["schedule"].get("delegatedAt").is_some());
        assert_eq!(value["schedule"]["type"], json!("daily"));
        assert_eq!(value["tools"][0]["type"], json!("listing-scan"));
        assert_eq!(value["tools"][0]["targets"][0]["targetId"], json!("t1"));
    }

    #[test]
    fn outcome_constructors_set_one_side() {
        let ok = RequestOutcome::ok(json!(1));
        assert!(ok.record.is_some());
        assert!(!ok.is_err());

        let err = RequestOutcome::err("boom");
        assert!(err.record.is_none());
        assert_eq!(err.error.as_deref(), Some("boom"));
    }

    #[test]
    fn record_count_ignores_errors() {
        let tool = sample_tool();
        let execution = ExecutionPayload {
            job_id: "j1".into(),
            schedule: ExecutionSchedule {
                kind: ScheduleType::Once,
                delegated_at: Utc::now(),
                finished_at: Utc::now(),
            },
            tools: vec![ToolWithResults::new(
                &tool,
                vec![TargetResult {
                    target_id: "t1".into(),
                    target_name: "Acme Jobs".into(),
                    results: vec![
                        RequestOutcome::ok(json!({"a": 1})),
                        RequestOutcome::err("404"),
                        RequestOutcome::ok(json!({"b": 2})),
                    ],
                }],
            )],
        };

        assert_eq!(execution.record_count(), 2);
    }
}
