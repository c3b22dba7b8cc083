use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(test)]
use anyhow::{anyhow, bail};
#[cfg(test)]
use jsonschema::{Draft, JSONSchema};

use crate::models::{BuildingType, QueryType, Region};
use crate::window::RangeKind;

pub const SCHEMA_VERSION: u32 = 1;

/// Admin dashboard metrics, one field per metric family
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub sign_ups: PeriodCounts,
    pub log_ins: PeriodCounts,
    pub engagement: Engagement,
    pub messages: MessageStats,
    pub messages_per_user: MessagesPerUser,
    pub query_analysis: QueryAnalysis,
    pub feature_usage: FeatureUsage,
    pub feedback: FeedbackStats,
    pub region_usage: Vec<RegionShare>,
    pub region_usage_by_users: Vec<RegionShare>,
    pub active_users: ActiveUsers,
    pub peak_usage_hours: PeakUsage,
    pub professional_use_cases: Vec<UseCaseShare>,
    pub technical_performance: TechnicalPerformance,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCounts {
    pub today: u64,
    pub this_week: u64,
    pub this_month: u64,
    pub this_year: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub total_users: u64,
    pub active_users_in_range: u64,
    pub new_users_in_range: u64,
    pub returning_users_in_range: u64,
    pub retention_rate: f64,
    pub churn_rate: f64,
    pub avg_days_between_sessions: f64,
    pub total_conversations: u64,
    pub total_conversation_length: u64,
    pub avg_conversation_length: f64,
    pub conversations_with_followups: u64,
    pub follow_up_rate: f64,
    pub total_edits: u64,
    pub edit_rate: f64,
}

/// Window total spread over whole periods
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAverages {
    pub avg_per_day: f64,
    pub avg_per_week: f64,
    pub avg_per_month: f64,
    pub avg_per_year: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total: u64,
    #[serde(flatten)]
    pub averages: PeriodAverages,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesPerUser {
    pub average: f64,
    #[serde(flatten)]
    pub averages: PeriodAverages,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub total_queries: u64,
    pub avg_confidence: f64,
    /// Seconds
    pub avg_response_time: f64,
    pub query_type_distribution: QueryTypeDistribution,
    pub failed_queries: u64,
    pub failed_query_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTypeDistribution {
    pub building_codes: u64,
    pub not_available: u64,
    pub out_of_scope: u64,
    pub identity: u64,
    pub unknown: u64,
}

impl QueryTypeDistribution {
    pub fn record(&mut self, query_type: QueryType) {
        match query_type {
            QueryType::BuildingCodes => self.building_codes += 1,
            QueryType::NotAvailable => self.not_available += 1,
            QueryType::OutOfScope => self.out_of_scope += 1,
            QueryType::Identity => self.identity += 1,
            QueryType::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUsage {
    pub dark_mode: ThemeShare,
    pub light_mode: ThemeShare,
    /// Ordered by count, descending
    pub jurisdictions: IndexMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ThemeShare {
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStats {
    pub helpful: u64,
    pub unhelpful: u64,
    pub total: u64,
    pub helpful_rate: f64,
    #[serde(flatten)]
    pub averages: PeriodAverages,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegionShare {
    pub region: Region,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActiveUsers {
    pub dau: u64,
    pub wau: u64,
    pub mau: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakUsage {
    /// Hour of day (UTC); absent when no conversation was started
    pub hour: Option<u32>,
    pub count: u64,
    pub by_hour: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseShare {
    pub building_type: BuildingType,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalPerformance {
    pub avg_response_time: f64,
    pub error_rate: f64,
    pub uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub schema_version: u32,
    pub range: RangeKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window_days: f64,
    pub generated_at: DateTime<Utc>,
}

impl MetricsReport {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report file: {}", path.display()))?;

        let report: MetricsReport = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON from: {}", path.display()))?;

        Ok(report)
    }

    #[cfg(test)]
    /// Validate report JSON against the JSON schema
    pub fn validate_with_schema(report_json: &serde_json::Value, schema: &JSONSchema) -> Result<()> {
        match schema.validate(report_json) {
            Ok(_) => Ok(()),
            Err(errors) => {
                let error_messages: Vec<String> = errors
                    .map(|e| format!("  - {}: {}", e.instance_path, e))
                    .collect();
                bail!("Report validation failed:\n{}", error_messages.join("\n"))
            }
        }
    }

    #[cfg(test)]
    /// Load and compile the JSON schema
    pub fn load_schema(schema_path: &Path) -> Result<JSONSchema> {
        let schema_content = std::fs::read_to_string(schema_path)
            .with_context(|| format!("Failed to read schema file: {}", schema_path.display()))?;

        let schema_json: serde_json::Value =
            serde_json::from_str(&schema_content).with_context(|| {
                format!(
                    "Failed to parse schema JSON from: {}",
                    schema_path.display()
                )
            })?;

        JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_json)
            .map_err(|e| anyhow!("Failed to compile JSON schema: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Conversation, Message, Regulation, Role, User};
    use crate::report_builder::{build_report, ReportInputs};
    use crate::window::TimeWindow;
    use chrono::TimeZone;
    use serde_json::json;
    use std::path::PathBuf;

    fn get_schema_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("report_schema.json")
    }

    fn sample_report() -> MetricsReport {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        let window = TimeWindow::resolve(RangeKind::Week, None, None, now).unwrap();
        let users: Vec<User> = serde_json::from_value(json!([
            {
                "id": "u1",
                "createdAt": "2025-03-14T09:00:00Z",
                "lastLogin": "2025-03-19T09:00:00Z",
                "preferences": { "theme": "dark" },
                "profile": { "primaryJurisdiction": "Scotland" }
            },
            {
                "id": "u2",
                "createdAt": "2024-11-01T09:00:00Z",
                "lastLogin": "2025-03-20T08:00:00Z",
                "preferences": { "theme": "light" }
            }
        ]))
        .unwrap();
        let conversation = Conversation {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            region: Region::Scotland,
            created_at: Utc.with_ymd_and_hms(2025, 3, 19, 9, 5, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 3, 19, 9, 10, 0).unwrap(),
            metadata: Default::default(),
            messages: vec![
                Message {
                    role: Role::User,
                    content: "Minimum ceiling height for habitable rooms?".to_string(),
                    timestamp: Utc.with_ymd_and_hms(2025, 3, 19, 9, 5, 0).unwrap(),
                    is_edited: false,
                    regulation: None,
                    feedback: None,
                },
                Message {
                    role: Role::Assistant,
                    content: "2.3 m in most cases.".to_string(),
                    timestamp: Utc.with_ymd_and_hms(2025, 3, 19, 9, 5, 4).unwrap(),
                    is_edited: false,
                    regulation: Some(Regulation {
                        confidence: Some(0.82),
                        processing_time: Some(3.4),
                        query_type: QueryType::BuildingCodes,
                        ..Default::default()
                    }),
                    feedback: None,
                },
            ],
        };

        build_report(ReportInputs {
            users: &users,
            conversations: &[conversation],
            window: &window,
            now,
            uptime: 99.95,
        })
    }

    #[test]
    fn test_load_schema() {
        let result = MetricsReport::load_schema(&get_schema_path());
        assert!(result.is_ok(), "Failed to load schema: {:?}", result.err());
    }

    #[test]
    fn test_generated_report_matches_schema() {
        let schema = MetricsReport::load_schema(&get_schema_path()).unwrap();
        let report_json = serde_json::to_value(sample_report()).unwrap();
        let result = MetricsReport::validate_with_schema(&report_json, &schema);
        assert!(result.is_ok(), "{:?}", result.err());

        assert_eq!(report_json["messages"]["total"], 2);
        assert!(report_json["messages"]["avgPerDay"].is_number());
        assert_eq!(report_json["regionUsage"][1]["region"], "Scotland");
        assert_eq!(report_json["metadata"]["range"], "week");
    }

    #[test]
    fn test_validate_percentage_range() {
        let schema = MetricsReport::load_schema(&get_schema_path()).unwrap();
        let mut report_json = serde_json::to_value(sample_report()).unwrap();
        report_json["engagement"]["retentionRate"] = json!(150.0);

        let result = MetricsReport::validate_with_schema(&report_json, &schema);
        assert!(result.is_err(), "Should fail validation for rate > 100");
    }

    #[test]
    fn test_validate_missing_family() {
        let schema = MetricsReport::load_schema(&get_schema_path()).unwrap();
        let mut report_json = serde_json::to_value(sample_report()).unwrap();
        report_json
            .as_object_mut()
            .unwrap()
            .remove("technicalPerformance");

        let result = MetricsReport::validate_with_schema(&report_json, &schema);
        let err_msg = format!("{:?}", result.err().unwrap());
        assert!(err_msg.contains("technicalPerformance"));
    }

    #[test]
    fn test_load_from_file() {
        let report = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(&path, serde_json::to_string_pretty(&report).unwrap()).unwrap();

        let loaded = MetricsReport::load_from_file(&path).unwrap();
        assert_eq!(loaded, report);

        let missing = MetricsReport::load_from_file(&dir.path().join("absent.json"));
        assert!(missing.is_err());
    }
}
