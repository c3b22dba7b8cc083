//! Read-only record types consumed by the metrics engine.
//!
//! Shapes follow the document store export: camelCase keys, messages embedded
//! in their conversation. Classification fields are closed enums that accept
//! any label, so malformed upstream data lands in a fallback bucket instead of
//! failing the read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub profile: Profile,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub primary_jurisdiction: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "Option<String>", rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
    #[default]
    Unset,
}

impl From<Option<String>> for Theme {
    fn from(label: Option<String>) -> Self {
        match label.as_deref().map(str::trim) {
            Some(l) if l.eq_ignore_ascii_case("dark") => Theme::Dark,
            Some(l) if l.eq_ignore_ascii_case("light") => Theme::Light,
            _ => Theme::Unset,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub region: Region,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: ConversationMetadata,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    #[serde(default)]
    pub is_archived: bool,
}

/// Deployment region a conversation was held against
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(from = "Option<String>")]
pub enum Region {
    India,
    Scotland,
    Dubai,
    #[default]
    Other,
}

impl Region {
    /// Regions always listed in usage breakdowns
    pub const KNOWN: [Region; 3] = [Region::India, Region::Scotland, Region::Dubai];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::India => "India",
            Region::Scotland => "Scotland",
            Region::Dubai => "Dubai",
            Region::Other => "Other",
        }
    }
}

impl From<Option<String>> for Region {
    fn from(label: Option<String>) -> Self {
        let Some(label) = label else {
            return Region::Other;
        };
        match label.trim().to_ascii_lowercase().as_str() {
            "india" => Region::India,
            "scotland" => Region::Scotland,
            "dubai" => Region::Dubai,
            _ => Region::Other,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulation: Option<Regulation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Message {
    /// Regulation block, only ever read from assistant messages
    pub fn assistant_regulation(&self) -> Option<&Regulation> {
        match self.role {
            Role::Assistant => self.regulation.as_ref(),
            _ => None,
        }
    }

    pub fn vote(&self) -> Option<Vote> {
        self.feedback.as_ref().and_then(|f| f.user_vote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "Option<String>", rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Other,
}

impl From<Option<String>> for Role {
    fn from(label: Option<String>) -> Self {
        match label.as_deref().map(str::trim) {
            Some(l) if l.eq_ignore_ascii_case("user") => Role::User,
            Some(l) if l.eq_ignore_ascii_case("assistant") => Role::Assistant,
            _ => Role::Other,
        }
    }
}

/// Answer metadata attached to assistant messages
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Regulation {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Seconds
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(rename = "query_type", default)]
    pub query_type: QueryType,
    #[serde(default)]
    pub query_metadata: Option<QueryMetadata>,
}

impl Regulation {
    pub fn building_type(&self) -> Option<BuildingType> {
        self.query_metadata.as_ref().and_then(|m| m.building_type)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    #[serde(default)]
    pub building_type: Option<BuildingType>,
}

/// Classification label on an answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "Option<String>", rename_all = "snake_case")]
pub enum QueryType {
    BuildingCodes,
    NotAvailable,
    OutOfScope,
    Identity,
    #[default]
    Unknown,
}

impl QueryType {
    /// Answers that did not resolve the question
    pub fn is_failed(self) -> bool {
        matches!(self, QueryType::NotAvailable | QueryType::OutOfScope)
    }
}

impl From<Option<String>> for QueryType {
    fn from(label: Option<String>) -> Self {
        match label.as_deref().map(|l| l.trim().to_ascii_lowercase()) {
            Some(l) => match l.as_str() {
                "building_codes" => QueryType::BuildingCodes,
                "not_available" => QueryType::NotAvailable,
                "out_of_scope" => QueryType::OutOfScope,
                "identity" => QueryType::Identity,
                _ => QueryType::Unknown,
            },
            None => QueryType::Unknown,
        }
    }
}

/// Building category a question was asked about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(from = "String", rename_all = "snake_case")]
pub enum BuildingType {
    Residential,
    Commercial,
    Industrial,
    Institutional,
    Healthcare,
    Educational,
    MixedUse,
    Other,
}

impl BuildingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingType::Residential => "residential",
            BuildingType::Commercial => "commercial",
            BuildingType::Industrial => "industrial",
            BuildingType::Institutional => "institutional",
            BuildingType::Healthcare => "healthcare",
            BuildingType::Educational => "educational",
            BuildingType::MixedUse => "mixed_use",
            BuildingType::Other => "other",
        }
    }
}

impl From<String> for BuildingType {
    fn from(label: String) -> Self {
        let normalized: String = label
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        match normalized.as_str() {
            "residential" => BuildingType::Residential,
            "commercial" => BuildingType::Commercial,
            "industrial" => BuildingType::Industrial,
            "institutional" => BuildingType::Institutional,
            "healthcare" => BuildingType::Healthcare,
            "educational" => BuildingType::Educational,
            "mixed_use" => BuildingType::MixedUse,
            _ => BuildingType::Other,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Unrecognised labels read as no vote
    #[serde(default, deserialize_with = "lenient_vote")]
    pub user_vote: Option<Vote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Helpful,
    Unhelpful,
}

impl Vote {
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("helpful") {
            Some(Vote::Helpful)
        } else if label.eq_ignore_ascii_case("unhelpful") {
            Some(Vote::Unhelpful)
        } else {
            None
        }
    }
}

fn lenient_vote<'de, D>(deserializer: D) -> Result<Option<Vote>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    Ok(label.as_deref().and_then(Vote::parse))
}
