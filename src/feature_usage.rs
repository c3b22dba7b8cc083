//! All-time feature usage snapshot: theme preference and jurisdiction spread.
//! The selected window is not an input here.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::models::{Theme, User};
use crate::rates::percentage;
use crate::report::{FeatureUsage, ThemeShare};

pub fn aggregate_feature_usage(users: &[User]) -> FeatureUsage {
    let mut dark = 0u64;
    let mut light = 0u64;
    let mut jurisdictions: HashMap<&str, u64> = HashMap::new();

    for user in users.iter().filter(|u| !u.is_deleted) {
        match user.preferences.theme {
            Theme::Dark => dark += 1,
            Theme::Light => light += 1,
            Theme::Unset => {}
        }

        if let Some(jurisdiction) = user
            .profile
            .primary_jurisdiction
            .as_deref()
            .map(str::trim)
            .filter(|j| !j.is_empty())
        {
            *jurisdictions.entry(jurisdiction).or_insert(0) += 1;
        }
    }

    // Users without a theme stay out of the denominator
    let themed = dark + light;

    FeatureUsage {
        dark_mode: ThemeShare {
            count: dark,
            percentage: percentage(dark, themed),
        },
        light_mode: ThemeShare {
            count: light,
            percentage: percentage(light, themed),
        },
        jurisdictions: rank_jurisdictions(jurisdictions),
    }
}

fn rank_jurisdictions(counts: HashMap<&str, u64>) -> IndexMap<String, u64> {
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    ranked
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect()
}
