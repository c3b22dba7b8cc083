/// Conversation analytics aggregation.
///
/// Folds the window's conversations and their embedded messages once and
/// derives message volume, query quality, feedback, region and peak-hour
/// statistics from the accumulated counters.
use chrono::Timelike;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{BuildingType, Conversation, Message, Region, Regulation, Vote};
use crate::rates::{percentage, ratio, round_to};
use crate::report::{
    FeedbackStats, MessageStats, MessagesPerUser, PeakUsage, PeriodAverages, QueryAnalysis,
    QueryTypeDistribution, RegionShare, UseCaseShare,
};
use crate::window::{Period, TimeWindow};

/// Output of [`aggregate_conversations`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationAnalytics {
    pub total_conversations: u64,
    pub conversations_with_followups: u64,
    pub follow_up_rate: f64,
    pub avg_conversation_length: f64,
    pub total_edits: u64,
    pub edit_rate: f64,
    pub messages: MessageStats,
    pub messages_per_user: MessagesPerUser,
    pub query_analysis: QueryAnalysis,
    pub feedback: FeedbackStats,
    pub region_usage: Vec<RegionShare>,
    pub region_usage_by_users: Vec<RegionShare>,
    pub peak_usage_hours: PeakUsage,
    pub professional_use_cases: Vec<UseCaseShare>,
}

// ============================================================================
// Accumulators (private)
// ============================================================================

/// Answer quality counters over assistant messages carrying a regulation block.
#[derive(Default)]
struct QueryTally {
    total: u64,
    confidence_sum: f64,
    processing_sum: f64,
    distribution: QueryTypeDistribution,
    failed: u64,
    building_types: BTreeMap<BuildingType, u64>,
}

impl QueryTally {
    fn record(&mut self, regulation: &Regulation) {
        self.total += 1;

        if let Some(confidence) = regulation.confidence.filter(|c| c.is_finite()) {
            self.confidence_sum += confidence;
        }
        if let Some(seconds) = regulation.processing_time.filter(|s| s.is_finite()) {
            self.processing_sum += seconds;
        }

        self.distribution.record(regulation.query_type);
        if regulation.query_type.is_failed() {
            self.failed += 1;
        }

        if let Some(building_type) = regulation.building_type() {
            *self.building_types.entry(building_type).or_insert(0) += 1;
        }
    }

    // Absent values add nothing to the sums but still count in the divisor
    fn avg_confidence(&self) -> f64 {
        round_to(ratio(self.confidence_sum, self.total as f64), 3)
    }

    fn avg_response_time(&self) -> f64 {
        round_to(ratio(self.processing_sum, self.total as f64), 2)
    }
}

/// Conversation and unique-user counts per region.
#[derive(Default)]
struct RegionTally<'a> {
    conversations: BTreeMap<Region, u64>,
    users: BTreeMap<Region, BTreeSet<&'a str>>,
}

impl<'a> RegionTally<'a> {
    fn record(&mut self, conversation: &'a Conversation) {
        *self.conversations.entry(conversation.region).or_insert(0) += 1;
        self.users
            .entry(conversation.region)
            .or_default()
            .insert(conversation.user_id.as_str());
    }

    fn by_conversations(&self) -> Vec<RegionShare> {
        region_shares(|region| self.conversations.get(&region).copied().unwrap_or(0))
    }

    fn by_users(&self) -> Vec<RegionShare> {
        region_shares(|region| self.users.get(&region).map_or(0, |set| set.len() as u64))
    }
}

/// Conversations started per hour of day (UTC).
struct HourHistogram {
    buckets: [u64; 24],
}

impl HourHistogram {
    fn new() -> Self {
        Self { buckets: [0; 24] }
    }

    fn record(&mut self, hour: u32) {
        if let Some(bucket) = self.buckets.get_mut(hour as usize) {
            *bucket += 1;
        }
    }

    /// Busiest hour; the earliest hour wins ties
    fn peak(&self) -> PeakUsage {
        let mut hour = None;
        let mut count = 0;
        for (h, &n) in self.buckets.iter().enumerate() {
            if n > count {
                count = n;
                hour = Some(h as u32);
            }
        }

        PeakUsage {
            hour,
            count,
            by_hour: self.buckets.to_vec(),
        }
    }
}

#[derive(Default)]
struct FeedbackTally {
    helpful: u64,
    unhelpful: u64,
}

impl FeedbackTally {
    fn record(&mut self, message: &Message) {
        match message.vote() {
            Some(Vote::Helpful) => self.helpful += 1,
            Some(Vote::Unhelpful) => self.unhelpful += 1,
            None => {}
        }
    }

    fn total(&self) -> u64 {
        self.helpful + self.unhelpful
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Aggregate the window's conversations.
///
/// `conversations` must already be restricted to non-archived conversations
/// updated inside `window`; `active_users_in_range` comes from the user
/// activity aggregation of the same window.
pub fn aggregate_conversations(
    conversations: &[Conversation],
    window: &TimeWindow,
    active_users_in_range: u64,
) -> ConversationAnalytics {
    let mut total_messages = 0u64;
    let mut with_followups = 0u64;
    let mut total_edits = 0u64;
    let mut queries = QueryTally::default();
    let mut regions = RegionTally::default();
    let mut hours = HourHistogram::new();
    let mut feedback = FeedbackTally::default();

    for conversation in conversations {
        let length = conversation.messages.len() as u64;
        total_messages += length;
        if length > 2 {
            with_followups += 1;
        }
        regions.record(conversation);
        hours.record(conversation.created_at.hour());

        for message in &conversation.messages {
            if let Some(regulation) = message.assistant_regulation() {
                queries.record(regulation);
            }
            if message.is_edited {
                total_edits += 1;
            }
            feedback.record(message);
        }
    }

    let total_conversations = conversations.len() as u64;
    let avg_messages_per_user = ratio(total_messages as f64, active_users_in_range as f64);

    ConversationAnalytics {
        total_conversations,
        conversations_with_followups: with_followups,
        follow_up_rate: percentage(with_followups, total_conversations),
        avg_conversation_length: round_to(
            ratio(total_messages as f64, total_conversations as f64),
            2,
        ),
        total_edits,
        edit_rate: percentage(total_edits, total_messages),
        messages: MessageStats {
            total: total_messages,
            averages: per_period(total_messages as f64, window),
        },
        messages_per_user: MessagesPerUser {
            average: round_to(avg_messages_per_user, 2),
            averages: per_period(avg_messages_per_user, window),
        },
        query_analysis: QueryAnalysis {
            total_queries: queries.total,
            avg_confidence: queries.avg_confidence(),
            avg_response_time: queries.avg_response_time(),
            query_type_distribution: queries.distribution.clone(),
            failed_queries: queries.failed,
            failed_query_rate: percentage(queries.failed, queries.total),
        },
        feedback: FeedbackStats {
            helpful: feedback.helpful,
            unhelpful: feedback.unhelpful,
            total: feedback.total(),
            helpful_rate: percentage(feedback.helpful, feedback.total()),
            averages: per_period(feedback.total() as f64, window),
        },
        region_usage: regions.by_conversations(),
        region_usage_by_users: regions.by_users(),
        peak_usage_hours: hours.peak(),
        professional_use_cases: rank_use_cases(&queries.building_types, queries.total),
    }
}

/// Divide a window total by the number of whole periods the window spans.
fn per_period(total: f64, window: &TimeWindow) -> PeriodAverages {
    let average = |period: Period| round_to(ratio(total, window.period_count(period) as f64), 2);

    PeriodAverages {
        avg_per_day: average(Period::Day),
        avg_per_week: average(Period::Week),
        avg_per_month: average(Period::Month),
        avg_per_year: average(Period::Year),
    }
}

/// Known regions always appear; `Other` only when it has traffic.
fn region_shares(count_for: impl Fn(Region) -> u64) -> Vec<RegionShare> {
    let mut counts: Vec<(Region, u64)> = Region::KNOWN
        .iter()
        .map(|&region| (region, count_for(region)))
        .collect();
    let other = count_for(Region::Other);
    if other > 0 {
        counts.push((Region::Other, other));
    }

    let total: u64 = counts.iter().map(|(_, count)| count).sum();
    counts
        .into_iter()
        .map(|(region, count)| RegionShare {
            region,
            count,
            percentage: percentage(count, total),
        })
        .collect()
}

/// Building types by query count, descending; ties in declaration order.
fn rank_use_cases(building_types: &BTreeMap<BuildingType, u64>, total_queries: u64) -> Vec<UseCaseShare> {
    let mut ranked: Vec<(BuildingType, u64)> =
        building_types.iter().map(|(&kind, &count)| (kind, count)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .map(|(building_type, count)| UseCaseShare {
            building_type,
            count,
            percentage: percentage(count, total_queries),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Feedback, QueryMetadata, QueryType, Role};
    use crate::window::RangeKind;
    use chrono::{DateTime, TimeZone, Utc};

    fn window() -> TimeWindow {
        let now = Utc.with_ymd_and_hms(2025, 2, 5, 12, 0, 0).unwrap();
        TimeWindow::resolve(RangeKind::Custom, Some("2025-01-01"), Some("2025-01-31"), now)
            .unwrap()
    }

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn user_msg(text: &str) -> Message {
        Message {
            role: Role::User,
            content: text.to_string(),
            timestamp: ts(10, 9),
            is_edited: false,
            regulation: None,
            feedback: None,
        }
    }

    fn answer(query_type: QueryType, confidence: Option<f64>, seconds: Option<f64>) -> Message {
        Message {
            role: Role::Assistant,
            content: "Refer to the fire safety section.".to_string(),
            timestamp: ts(10, 9),
            is_edited: false,
            regulation: Some(Regulation {
                confidence,
                processing_time: seconds,
                query_type,
                ..Default::default()
            }),
            feedback: None,
        }
    }

    fn conversation(id: &str, user: &str, region: Region, hour: u32, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: id.to_string(),
            user_id: user.to_string(),
            region,
            created_at: ts(10, hour),
            updated_at: ts(11, hour),
            metadata: Default::default(),
            messages,
        }
    }

    #[test]
    fn test_empty_window() {
        let stats = aggregate_conversations(&[], &window(), 0);
        assert_eq!(stats.messages.total, 0);
        assert_eq!(stats.avg_conversation_length, 0.0);
        assert_eq!(stats.follow_up_rate, 0.0);
        assert_eq!(stats.edit_rate, 0.0);
        assert_eq!(stats.feedback.helpful_rate, 0.0);
        assert_eq!(stats.query_analysis.failed_query_rate, 0.0);
        assert_eq!(stats.messages_per_user.average, 0.0);
        assert_eq!(stats.peak_usage_hours.hour, None);
        assert_eq!(stats.peak_usage_hours.by_hour.len(), 24);
        assert!(stats.professional_use_cases.is_empty());
        assert_eq!(stats.region_usage.len(), 3);
        assert!(stats.region_usage.iter().all(|r| r.percentage == 0.0));
    }

    #[test]
    fn test_failed_queries() {
        let messages = vec![
            answer(QueryType::BuildingCodes, Some(0.9), Some(2.0)),
            answer(QueryType::BuildingCodes, Some(0.8), Some(4.0)),
            answer(QueryType::BuildingCodes, None, None),
            answer(QueryType::NotAvailable, Some(0.1), Some(1.0)),
            answer(QueryType::OutOfScope, Some(0.2), None),
        ];
        let stats = aggregate_conversations(
            &[conversation("c1", "u1", Region::India, 9, messages)],
            &window(),
            1,
        );
        let q = &stats.query_analysis;
        assert_eq!(q.total_queries, 5);
        assert_eq!(q.failed_queries, 2);
        assert_eq!(q.failed_query_rate, 40.0);
        assert_eq!(q.query_type_distribution.building_codes, 3);
        assert_eq!(q.query_type_distribution.not_available, 1);
        assert_eq!(q.query_type_distribution.out_of_scope, 1);
        // Absent values add nothing but every answer counts in the divisor
        assert_eq!(q.avg_confidence, 0.4);
        assert_eq!(q.avg_response_time, 1.4);
    }

    #[test]
    fn test_regulation_on_user_message_is_ignored() {
        let mut question = user_msg("Is a sprinkler system required?");
        question.regulation = Some(Regulation {
            query_type: QueryType::OutOfScope,
            ..Default::default()
        });
        let stats = aggregate_conversations(
            &[conversation("c1", "u1", Region::Dubai, 9, vec![question])],
            &window(),
            1,
        );
        assert_eq!(stats.query_analysis.total_queries, 0);
        assert_eq!(stats.query_analysis.failed_queries, 0);
    }

    #[test]
    fn test_messages_per_period_for_custom_range() {
        let conversations: Vec<Conversation> = (0..31)
            .map(|i| {
                let messages = (0..10).map(|_| user_msg("question")).collect();
                conversation(&format!("c{}", i), "u1", Region::India, 8, messages)
            })
            .collect();
        let stats = aggregate_conversations(&conversations, &window(), 2);
        assert_eq!(stats.messages.total, 310);
        assert_eq!(stats.messages.averages.avg_per_day, 10.0);
        assert_eq!(stats.messages.averages.avg_per_week, 62.0);
        assert_eq!(stats.messages.averages.avg_per_month, 155.0);
        assert_eq!(stats.messages.averages.avg_per_year, 310.0);
        assert_eq!(stats.messages_per_user.average, 155.0);
        assert_eq!(stats.messages_per_user.averages.avg_per_day, 5.0);
        assert_eq!(stats.avg_conversation_length, 10.0);
        assert_eq!(stats.follow_up_rate, 100.0);
    }

    #[test]
    fn test_followups_edits_and_feedback() {
        let mut edited = user_msg("Corrected question");
        edited.is_edited = true;
        let mut liked = answer(QueryType::BuildingCodes, Some(0.7), Some(1.5));
        liked.feedback = Some(Feedback {
            user_vote: Some(Vote::Helpful),
        });
        let mut disliked = answer(QueryType::BuildingCodes, Some(0.6), Some(1.5));
        disliked.feedback = Some(Feedback {
            user_vote: Some(Vote::Unhelpful),
        });
        let mut unvoted = answer(QueryType::Identity, None, None);
        unvoted.feedback = Some(Feedback { user_vote: None });

        let conversations = vec![
            conversation("c1", "u1", Region::India, 9, vec![edited, liked, user_msg("thanks")]),
            conversation("c2", "u2", Region::India, 9, vec![user_msg("hi"), disliked]),
            conversation("c3", "u3", Region::Scotland, 9, vec![user_msg("who are you"), unvoted]),
        ];
        let stats = aggregate_conversations(&conversations, &window(), 3);
        assert_eq!(stats.conversations_with_followups, 1);
        assert_eq!(stats.follow_up_rate, 33.33);
        assert_eq!(stats.total_edits, 1);
        assert_eq!(stats.edit_rate, 14.29);
        assert_eq!(stats.feedback.helpful, 1);
        assert_eq!(stats.feedback.unhelpful, 1);
        assert_eq!(stats.feedback.helpful_rate, 50.0);
        assert_eq!(stats.query_analysis.query_type_distribution.identity, 1);
    }

    #[test]
    fn test_region_usage() {
        let conversations = vec![
            conversation("c1", "u1", Region::India, 9, vec![]),
            conversation("c2", "u1", Region::India, 9, vec![]),
            conversation("c3", "u2", Region::India, 9, vec![]),
            conversation("c4", "u3", Region::Scotland, 9, vec![]),
            conversation("c5", "u1", Region::Other, 9, vec![]),
        ];
        let stats = aggregate_conversations(&conversations, &window(), 3);

        let by_conv: Vec<(Region, u64, f64)> = stats
            .region_usage
            .iter()
            .map(|r| (r.region, r.count, r.percentage))
            .collect();
        assert_eq!(
            by_conv,
            vec![
                (Region::India, 3, 60.0),
                (Region::Scotland, 1, 20.0),
                (Region::Dubai, 0, 0.0),
                (Region::Other, 1, 20.0),
            ]
        );

        let by_users: Vec<u64> = stats.region_usage_by_users.iter().map(|r| r.count).collect();
        assert_eq!(by_users, vec![2, 1, 0, 1]);
        let total: f64 = stats.region_usage_by_users.iter().map(|r| r.percentage).sum();
        assert!((total - 100.0).abs() < 0.05);
    }

    #[test]
    fn test_peak_hour_prefers_earliest_on_tie() {
        let conversations = vec![
            conversation("c1", "u1", Region::India, 15, vec![]),
            conversation("c2", "u1", Region::India, 7, vec![]),
            conversation("c3", "u1", Region::India, 15, vec![]),
            conversation("c4", "u1", Region::India, 7, vec![]),
            conversation("c5", "u1", Region::India, 22, vec![]),
        ];
        let peak = aggregate_conversations(&conversations, &window(), 1).peak_usage_hours;
        assert_eq!(peak.hour, Some(7));
        assert_eq!(peak.count, 2);
        assert_eq!(peak.by_hour[15], 2);
        assert_eq!(peak.by_hour[22], 1);
    }

    #[test]
    fn test_professional_use_cases_ranking() {
        let typed = |building: BuildingType| {
            let mut msg = answer(QueryType::BuildingCodes, Some(0.9), Some(1.0));
            if let Some(reg) = msg.regulation.as_mut() {
                reg.query_metadata = Some(QueryMetadata {
                    building_type: Some(building),
                });
            }
            msg
        };
        let messages = vec![
            typed(BuildingType::Commercial),
            typed(BuildingType::Residential),
            typed(BuildingType::Residential),
            typed(BuildingType::Residential),
            typed(BuildingType::Commercial),
            answer(QueryType::BuildingCodes, None, None),
        ];
        let stats = aggregate_conversations(
            &[conversation("c1", "u1", Region::Dubai, 9, messages)],
            &window(),
            1,
        );
        let cases = &stats.professional_use_cases;
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].building_type, BuildingType::Residential);
        assert_eq!(cases[0].count, 3);
        assert_eq!(cases[0].percentage, 50.0);
        assert_eq!(cases[1].building_type, BuildingType::Commercial);
        assert_eq!(cases[1].percentage, 33.33);
    }

    #[test]
    fn test_use_case_ties_follow_declaration_order() {
        let typed = |building: BuildingType| {
            let mut msg = answer(QueryType::BuildingCodes, None, None);
            if let Some(reg) = msg.regulation.as_mut() {
                reg.query_metadata = Some(QueryMetadata {
                    building_type: Some(building),
                });
            }
            msg
        };
        let messages = vec![
            typed(BuildingType::Healthcare),
            typed(BuildingType::Industrial),
            typed(BuildingType::Residential),
        ];
        let stats = aggregate_conversations(
            &[conversation("c1", "u1", Region::India, 9, messages)],
            &window(),
            1,
        );
        let order: Vec<BuildingType> = stats
            .professional_use_cases
            .iter()
            .map(|case| case.building_type)
            .collect();
        assert_eq!(
            order,
            vec![
                BuildingType::Residential,
                BuildingType::Industrial,
                BuildingType::Healthcare
            ]
        );
    }

    #[test]
    fn test_averages_divide_by_every_answer() {
        let messages = vec![
            answer(QueryType::BuildingCodes, Some(0.9), Some(3.0)),
            answer(QueryType::BuildingCodes, None, None),
        ];
        let stats = aggregate_conversations(
            &[conversation("c1", "u1", Region::Scotland, 9, messages)],
            &window(),
            1,
        );
        assert_eq!(stats.query_analysis.total_queries, 2);
        assert_eq!(stats.query_analysis.avg_confidence, 0.45);
        assert_eq!(stats.query_analysis.avg_response_time, 1.5);
    }
}
