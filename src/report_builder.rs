/// Report assembly.
///
/// `generate_report` resolves the window, reads users and conversations and
/// fetches uptime concurrently, then hands everything to the pure
/// `build_report` merge.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::conversation_stats::aggregate_conversations;
use crate::error::ReportError;
use crate::feature_usage::aggregate_feature_usage;
use crate::models::{Conversation, User};
use crate::rates::round_to;
use crate::report::{Engagement, MetricsReport, ReportMetadata, TechnicalPerformance, SCHEMA_VERSION};
use crate::store::RecordSource;
use crate::uptime::{resolve_uptime, UptimeProvider};
use crate::user_activity::aggregate_users;
use crate::window::{RangeKind, TimeWindow};

/// Dashboard request: a range token plus custom bounds when `range` is `custom`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl ReportRequest {
    pub fn new(range: &str) -> Self {
        Self {
            range: range.to_string(),
            from: None,
            to: None,
        }
    }

    pub fn custom(from: &str, to: &str) -> Self {
        Self {
            range: "custom".to_string(),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
        }
    }

    pub fn resolve_window(&self, now: DateTime<Utc>) -> Result<TimeWindow, ReportError> {
        let kind = RangeKind::parse(&self.range);
        Ok(TimeWindow::resolve(
            kind,
            self.from.as_deref(),
            self.to.as_deref(),
            now,
        )?)
    }
}

/// Everything the merge needs, already read
pub struct ReportInputs<'a> {
    pub users: &'a [User],
    /// Non-archived conversations updated inside `window`
    pub conversations: &'a [Conversation],
    pub window: &'a TimeWindow,
    pub now: DateTime<Utc>,
    pub uptime: f64,
}

/// Merge every aggregator's output into one report.
pub fn build_report(inputs: ReportInputs<'_>) -> MetricsReport {
    let ReportInputs {
        users,
        conversations,
        window,
        now,
        uptime,
    } = inputs;

    let activity = aggregate_users(users, window, now);
    let analytics = aggregate_conversations(conversations, window, activity.active_users_in_range);
    let feature_usage = aggregate_feature_usage(users);

    let technical_performance = TechnicalPerformance {
        avg_response_time: analytics.query_analysis.avg_response_time,
        error_rate: analytics.query_analysis.failed_query_rate,
        uptime,
    };

    MetricsReport {
        sign_ups: activity.sign_ups,
        log_ins: activity.log_ins,
        engagement: Engagement {
            total_users: activity.total_users,
            active_users_in_range: activity.active_users_in_range,
            new_users_in_range: activity.new_users_in_range,
            returning_users_in_range: activity.returning_users_in_range,
            retention_rate: activity.retention_rate,
            churn_rate: activity.churn_rate,
            avg_days_between_sessions: activity.avg_days_between_sessions,
            total_conversations: analytics.total_conversations,
            total_conversation_length: analytics.messages.total,
            avg_conversation_length: analytics.avg_conversation_length,
            conversations_with_followups: analytics.conversations_with_followups,
            follow_up_rate: analytics.follow_up_rate,
            total_edits: analytics.total_edits,
            edit_rate: analytics.edit_rate,
        },
        messages: analytics.messages,
        messages_per_user: analytics.messages_per_user,
        query_analysis: analytics.query_analysis,
        feature_usage,
        feedback: analytics.feedback,
        region_usage: analytics.region_usage,
        region_usage_by_users: analytics.region_usage_by_users,
        active_users: activity.active_users,
        peak_usage_hours: analytics.peak_usage_hours,
        professional_use_cases: analytics.professional_use_cases,
        technical_performance,
        metadata: ReportMetadata {
            schema_version: SCHEMA_VERSION,
            range: window.kind,
            start: window.start,
            end: window.end,
            window_days: round_to(window.length_days(), 2),
            generated_at: now,
        },
    }
}

/// Generate the dashboard report for `request` as of `now`.
///
/// An invalid range is rejected before anything is read. A failed record read
/// fails the request; a failed uptime call only substitutes the fallback.
pub async fn generate_report<S, P>(
    source: Arc<S>,
    uptime: &P,
    request: &ReportRequest,
    now: DateTime<Utc>,
    uptime_timeout: Duration,
) -> Result<MetricsReport, ReportError>
where
    S: RecordSource + 'static,
    P: UptimeProvider,
{
    let window = request.resolve_window(now)?;
    tracing::info!(
        range = window.kind.as_str(),
        start = %window.start,
        end = %window.end,
        "Generating metrics report"
    );

    let users_task = {
        let source = Arc::clone(&source);
        tokio::task::spawn_blocking(move || source.load_users())
    };
    let conversations_task = {
        let source = Arc::clone(&source);
        let window = window.clone();
        tokio::task::spawn_blocking(move || source.load_conversations(&window))
    };

    let (users, conversations, uptime) = tokio::join!(
        users_task,
        conversations_task,
        resolve_uptime(uptime, uptime_timeout)
    );

    let users = users
        .map_err(anyhow::Error::from)
        .and_then(|read| read)
        .map_err(|e| ReportError::Persistence(e.context("Failed to load users")))?;
    let conversations = conversations
        .map_err(anyhow::Error::from)
        .and_then(|read| read)
        .map_err(|e| ReportError::Persistence(e.context("Failed to load conversations")))?;

    tracing::debug!(
        users = users.len(),
        conversations = conversations.len(),
        uptime,
        "Records loaded"
    );

    Ok(build_report(ReportInputs {
        users: &users,
        conversations: &conversations,
        window: &window,
        now,
        uptime,
    }))
}
