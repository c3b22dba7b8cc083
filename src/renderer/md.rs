use crate::report::*;
use crate::timefmt::{format_date, format_hour_opt, format_instant};
use crate::window::RangeKind;
use anyhow::Result;

/// Render a metrics report as a Markdown dashboard summary
pub fn render(report: &MetricsReport) -> Result<String> {
    let mut output = String::new();

    // 1. Title and window
    render_header(&mut output, &report.metadata);

    // 2. Users
    render_users(&mut output, report);

    // 3. Conversations
    render_engagement(&mut output, report);

    // 4. Queries and outcomes
    render_queries(&mut output, &report.query_analysis, &report.feedback);

    // 5. Where and what
    render_regions(&mut output, &report.region_usage, &report.region_usage_by_users);
    render_use_cases(&mut output, &report.professional_use_cases);
    render_feature_usage(&mut output, &report.feature_usage);

    // 6. When
    render_peak_usage(&mut output, &report.peak_usage_hours);

    // 7. Service
    render_technical(&mut output, &report.technical_performance);

    Ok(output)
}

fn render_header(output: &mut String, metadata: &ReportMetadata) {
    output.push_str(&format!("# 📊 Usage Report — {}\n", range_label(metadata)));
    output.push_str(&format!(
        "- **Window:** {} → {} ({} days)\n",
        format_instant(&metadata.start),
        format_instant(&metadata.end),
        metadata.window_days
    ));
    output.push_str(&format!(
        "- **Generated:** {}\n\n",
        format_instant(&metadata.generated_at)
    ));
}

fn render_users(output: &mut String, report: &MetricsReport) {
    let engagement = &report.engagement;
    output.push_str("### 🧑 Users\n");
    output.push_str(&format!(
        "- **Total users:** {}\n",
        format_number(engagement.total_users)
    ));
    output.push_str(&format!(
        "- **Active in window:** {} ({} new, {} returning)\n",
        format_number(engagement.active_users_in_range),
        format_number(engagement.new_users_in_range),
        format_number(engagement.returning_users_in_range)
    ));
    output.push_str(&format!(
        "- **Retention:** {}% · **Churn:** {}%\n",
        engagement.retention_rate, engagement.churn_rate
    ));
    output.push_str(&format!(
        "- **Avg days between sessions:** {}\n\n",
        engagement.avg_days_between_sessions
    ));

    output.push_str("| | Today | This week | This month | This year |\n");
    output.push_str("| - | ----- | --------- | ---------- | --------- |\n");
    for (label, counts) in [("Sign-ups", &report.sign_ups), ("Log-ins", &report.log_ins)] {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            label,
            format_number(counts.today),
            format_number(counts.this_week),
            format_number(counts.this_month),
            format_number(counts.this_year)
        ));
    }
    output.push('\n');

    let active = &report.active_users;
    output.push_str(&format!(
        "**DAU** {} · **WAU** {} · **MAU** {}\n\n",
        format_number(active.dau),
        format_number(active.wau),
        format_number(active.mau)
    ));
}

fn render_engagement(output: &mut String, report: &MetricsReport) {
    let engagement = &report.engagement;
    output.push_str("### 💬 Conversations\n");
    output.push_str(&format!(
        "- **Conversations:** {} (avg {} messages)\n",
        format_number(engagement.total_conversations),
        engagement.avg_conversation_length
    ));
    output.push_str(&format!(
        "- **With follow-ups:** {} ({}%)\n",
        format_number(engagement.conversations_with_followups),
        engagement.follow_up_rate
    ));
    output.push_str(&format!(
        "- **Edited messages:** {} ({}%)\n",
        format_number(engagement.total_edits),
        engagement.edit_rate
    ));
    output.push_str(&format!(
        "- **Messages per active user:** {}\n\n",
        report.messages_per_user.average
    ));

    output.push_str("| | Total | Per day | Per week | Per month | Per year |\n");
    output.push_str("| - | ----- | ------- | -------- | --------- | -------- |\n");
    output.push_str(&averages_row(
        "Messages",
        &format_number(report.messages.total),
        &report.messages.averages,
    ));
    output.push_str(&averages_row(
        "Messages per user",
        &report.messages_per_user.average.to_string(),
        &report.messages_per_user.averages,
    ));
    output.push('\n');
}

fn render_queries(output: &mut String, queries: &QueryAnalysis, feedback: &FeedbackStats) {
    output.push_str("### 🔎 Queries\n");
    output.push_str(&format!(
        "- **Answered queries:** {}\n",
        format_number(queries.total_queries)
    ));
    output.push_str(&format!(
        "- **Avg confidence:** {} · **Avg response time:** {} s\n",
        queries.avg_confidence, queries.avg_response_time
    ));
    output.push_str(&format!(
        "- **Failed:** {} ({}%)\n\n",
        format_number(queries.failed_queries),
        queries.failed_query_rate
    ));

    let distribution = &queries.query_type_distribution;
    output.push_str("| Building codes | Not available | Out of scope | Identity | Unknown |\n");
    output.push_str("| -------------- | ------------- | ------------ | -------- | ------- |\n");
    output.push_str(&format!(
        "| {} | {} | {} | {} | {} |\n\n",
        format_number(distribution.building_codes),
        format_number(distribution.not_available),
        format_number(distribution.out_of_scope),
        format_number(distribution.identity),
        format_number(distribution.unknown)
    ));

    output.push_str("#### 👍 Feedback\n");
    if feedback.total == 0 {
        output.push_str("No votes in this window.\n\n");
        return;
    }
    output.push_str(&format!(
        "{} votes: **{}** helpful, **{}** unhelpful ({}% helpful).\n\n",
        format_number(feedback.total),
        format_number(feedback.helpful),
        format_number(feedback.unhelpful),
        feedback.helpful_rate
    ));
}

fn render_regions(output: &mut String, by_conversations: &[RegionShare], by_users: &[RegionShare]) {
    output.push_str("### 🌍 Regions\n");
    output.push_str("| Region | Conversations | % | Users | % |\n");
    output.push_str("| ------ | ------------- | - | ----- | - |\n");

    for share in by_conversations {
        let users = by_users.iter().find(|u| u.region == share.region);
        let (user_count, user_pct) = match users {
            Some(u) => (format_number(u.count), u.percentage.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            share.region.as_str(),
            format_number(share.count),
            share.percentage,
            user_count,
            user_pct
        ));
    }
    output.push('\n');
}

fn render_use_cases(output: &mut String, use_cases: &[UseCaseShare]) {
    if use_cases.is_empty() {
        return;
    }

    output.push_str("### 🏗️ Professional Use Cases\n");
    output.push_str("| Rank | Building type | Queries | % of queries |\n");
    output.push_str("| ---- | ------------- | ------- | ------------ |\n");
    for (i, use_case) in use_cases.iter().enumerate() {
        output.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            i + 1,
            uppercase_first_char(&use_case.building_type.as_str().replace('_', " ")),
            format_number(use_case.count),
            use_case.percentage
        ));
    }
    output.push('\n');
}

fn render_feature_usage(output: &mut String, features: &FeatureUsage) {
    output.push_str("### 🎨 Features\n");
    output.push_str(&format!(
        "- 🌙 **Dark mode:** {} ({}%)\n",
        format_number(features.dark_mode.count),
        features.dark_mode.percentage
    ));
    output.push_str(&format!(
        "- ☀️ **Light mode:** {} ({}%)\n",
        format_number(features.light_mode.count),
        features.light_mode.percentage
    ));

    if !features.jurisdictions.is_empty() {
        output.push_str("\n| Jurisdiction | Users |\n");
        output.push_str("| ------------ | ----- |\n");
        for (jurisdiction, count) in &features.jurisdictions {
            output.push_str(&format!("| {} | {} |\n", jurisdiction, format_number(*count)));
        }
    }
    output.push('\n');
}

fn render_peak_usage(output: &mut String, peak: &PeakUsage) {
    output.push_str("### 🕐 Peak Usage\n");
    output.push_str(&format!(
        "- **Peak hour:** {} ({} conversations started)\n\n",
        format_hour_opt(peak.hour),
        format_number(peak.count)
    ));

    if peak.by_hour.iter().all(|&count| count == 0) {
        return;
    }

    // Hours 00-11
    output.push_str("| 00 | 01 | 02 | 03 | 04 | 05 | 06 | 07 | 08 | 09 | 10 | 11 |\n");
    output.push_str("| -- | -- | -- | -- | -- | -- | -- | -- | -- | -- | -- | -- |\n");
    output.push('|');
    for hour in 0..12 {
        let count = peak.by_hour.get(hour).copied().unwrap_or(0);
        output.push_str(&format!(" {} |", format_number(count)));
    }
    output.push('\n');

    // Hours 12-23
    output.push_str("\n| 12 | 13 | 14 | 15 | 16 | 17 | 18 | 19 | 20 | 21 | 22 | 23 |\n");
    output.push_str("| -- | -- | -- | -- | -- | -- | -- | -- | -- | -- | -- | -- |\n");
    output.push('|');
    for hour in 12..24 {
        let count = peak.by_hour.get(hour).copied().unwrap_or(0);
        output.push_str(&format!(" {} |", format_number(count)));
    }
    output.push_str("\n\n");
}

fn render_technical(output: &mut String, technical: &TechnicalPerformance) {
    output.push_str("### ⚙️ Technical Performance\n");
    output.push_str(&format!(
        "- ⏱️ **Avg response time:** {} s\n",
        technical.avg_response_time
    ));
    output.push_str(&format!("- ❌ **Error rate:** {}%\n", technical.error_rate));
    output.push_str(&format!("- ✅ **Uptime:** {}%\n", technical.uptime));
    output.push('\n');
}

fn averages_row(label: &str, total: &str, averages: &PeriodAverages) -> String {
    format!(
        "| {} | {} | {} | {} | {} | {} |\n",
        label,
        total,
        averages.avg_per_day,
        averages.avg_per_week,
        averages.avg_per_month,
        averages.avg_per_year
    )
}

fn range_label(metadata: &ReportMetadata) -> String {
    match metadata.range {
        RangeKind::Day => format!("Day {}", format_date(&metadata.start)),
        RangeKind::Week => format!("Week from {}", format_date(&metadata.start)),
        RangeKind::Month => format!("Month from {}", format_date(&metadata.start)),
        RangeKind::Year => format!("Year from {}", format_date(&metadata.start)),
        RangeKind::Custom => format!(
            "{} to {}",
            format_date(&metadata.start),
            format_date(&metadata.end)
        ),
    }
}

/// Format a number with thousand separators
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped_rev = String::new();

    // Insert commas every three digits, starting from the right
    for (count, ch) in digits.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            grouped_rev.push(',');
        }
        grouped_rev.push(ch);
    }

    grouped_rev.chars().rev().collect()
}

/// Uppercase the first character of a string
fn uppercase_first_char(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}
