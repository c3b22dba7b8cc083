/// User activity aggregation.
///
/// Sign-up and log-in KPIs are anchored to `now`; retention, churn and
/// session frequency follow the selected window; DAU/WAU/MAU are anchored to
/// the window's end.
use chrono::{DateTime, Duration, Utc};

use crate::models::User;
use crate::rates::{percentage, ratio, round_to};
use crate::report::{ActiveUsers, PeriodCounts};
use crate::window::{Period, TimeWindow};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Output of [`aggregate_users`]
#[derive(Debug, Clone, PartialEq)]
pub struct UserActivity {
    pub total_users: u64,
    pub active_users_in_range: u64,
    pub sign_ups: PeriodCounts,
    pub log_ins: PeriodCounts,
    pub new_users_in_range: u64,
    pub returning_users_in_range: u64,
    pub retention_rate: f64,
    pub churn_rate: f64,
    pub avg_days_between_sessions: f64,
    pub active_users: ActiveUsers,
}

/// Retention cohort tracking (private).
struct Retention {
    cohort: u64,
    returned: u64,
}

impl Retention {
    fn record(&mut self, user: &User) {
        self.cohort += 1;
        if let Some(last_login) = user.last_login {
            if (last_login - user.created_at).abs() > Duration::hours(1) {
                self.returned += 1;
            }
        }
    }
}

/// Churn over the pre-existing user base (private).
struct Churn {
    base: u64,
    lapsed: u64,
}

impl Churn {
    fn record(&mut self, user: &User, window: &TimeWindow) {
        self.base += 1;
        match user.last_login {
            Some(last_login) if last_login >= window.start => {}
            _ => self.lapsed += 1,
        }
    }
}

/// Aggregate user records for the given window.
pub fn aggregate_users(users: &[User], window: &TimeWindow, now: DateTime<Utc>) -> UserActivity {
    let live: Vec<&User> = users.iter().filter(|u| !u.is_deleted).collect();

    let mut retention = Retention {
        cohort: 0,
        returned: 0,
    };
    let mut churn = Churn { base: 0, lapsed: 0 };
    let mut active_users_in_range = 0;
    let mut returning_users_in_range = 0;
    let mut session_days_total = 0.0;
    let mut session_users = 0u64;

    for user in &live {
        if window.contains(user.created_at) {
            retention.record(user);
        }

        let pre_existing = user.created_at < window.start;
        if pre_existing {
            churn.record(user, window);
        }

        if let Some(last_login) = user.last_login.filter(|ts| window.contains(*ts)) {
            active_users_in_range += 1;
            if pre_existing {
                returning_users_in_range += 1;
            }

            // Proxy for the inter-session gap: no per-session log exists
            let days = (last_login - user.created_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
            if days > 1.0 {
                session_days_total += days;
                session_users += 1;
            }
        }
    }

    UserActivity {
        total_users: live.len() as u64,
        active_users_in_range,
        sign_ups: period_counts(&live, now, |u| Some(u.created_at)),
        log_ins: period_counts(&live, now, |u| u.last_login),
        new_users_in_range: retention.cohort,
        returning_users_in_range,
        retention_rate: percentage(retention.returned, retention.cohort),
        churn_rate: percentage(churn.lapsed, churn.base),
        avg_days_between_sessions: round_to(
            ratio(session_days_total, session_users as f64),
            1,
        ),
        active_users: active_users(&live, window.end),
    }
}

/// Counts over fixed rolling periods ending at `now`, independent of the window.
fn period_counts(
    users: &[&User],
    now: DateTime<Utc>,
    timestamp: impl Fn(&User) -> Option<DateTime<Utc>>,
) -> PeriodCounts {
    let count = |period: Period| {
        // An anchor outside the calendar counts everything up to now
        let start = period.rolling_start(now).unwrap_or(DateTime::<Utc>::MIN_UTC);
        users
            .iter()
            .filter_map(|&u| timestamp(u))
            .filter(|ts| start <= *ts && *ts <= now)
            .count() as u64
    };

    PeriodCounts {
        today: count(Period::Day),
        this_week: count(Period::Week),
        this_month: count(Period::Month),
        this_year: count(Period::Year),
    }
}

/// Trailing 1/7/30-day login counts ending at `end`.
fn active_users(users: &[&User], end: DateTime<Utc>) -> ActiveUsers {
    let count = |days: i64| {
        let start = end
            .checked_sub_signed(Duration::days(days))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        users
            .iter()
            .filter_map(|u| u.last_login)
            .filter(|ts| start <= *ts && *ts <= end)
            .count() as u64
    };

    ActiveUsers {
        dau: count(1),
        wau: count(7),
        mau: count(30),
    }
}
