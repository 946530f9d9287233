// Shared models between the store adapters and the command dispatch.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One participant's published profile. Keyed by the owning user's id;
/// only the owner may save it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: Option<String>,
    /// Case-sensitive, order preserved for display.
    pub skills: Vec<String>,
    /// "Available from" date.
    pub availability: Option<NaiveDate>,
    pub commitment: Vec<Commitment>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Commitment {
    #[serde(rename = "Full-time")]
    FullTime,
    #[serde(rename = "Part-time")]
    PartTime,
    #[serde(rename = "Contract")]
    Contract,
}

impl Commitment {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Full-time" => Some(Commitment::FullTime),
            "Part-time" => Some(Commitment::PartTime),
            "Contract" => Some(Commitment::Contract),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub project_description: String,
    /// Empty means "open to anyone".
    pub required_skills: Vec<String>,
    /// Creator's profile id, immutable after creation.
    pub owner_id: String,
}

/// A pending invitation as shown to its recipient, annotated with the
/// target group's display name. The group may have been deleted in the
/// meantime, so the name is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingInvitation {
    pub id: i64,
    pub sender_id: String,
    pub group_id: String,
    pub group_name: Option<String>,
    pub project_title: String,
    pub project_description: String,
}

// Request payloads carried as JSON on the wire, mirroring the forms of the
// original web UI.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    /// Comma-separated free text, split and trimmed on save.
    #[serde(default)]
    pub skills: String,
    pub availability: Option<NaiveDate>,
    #[serde(default)]
    pub commitment: Vec<Commitment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub project_description: String,
    /// Comma-separated free text, like the create-group form field.
    #[serde(default)]
    pub required_skills: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvitation {
    pub recipient_id: String,
    pub group_id: String,
    pub project_title: String,
    pub project_description: String,
}

/// Splits a comma-separated form field into trimmed, non-empty entries.
pub fn split_skill_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
