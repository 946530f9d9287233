//! Compatibility matcher: pure filters over caller-supplied snapshots of
//! profiles and groups. Nothing here touches the database or errors out;
//! malformed criteria degrade to the permissive default.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::common::models::{Commitment, Group, Profile};

/// Search-form criteria as they arrive on the wire. The free-text fields
/// keep the sentinel conventions of the original form: blank skills and
/// "any" selectors mean "no filter".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchCriteria {
    #[serde(default)]
    pub skills: String,
    #[serde(default = "any_sentinel")]
    pub availability: String,
    #[serde(default = "any_sentinel")]
    pub commitment: String,
}

fn any_sentinel() -> String {
    "any".to_string()
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            skills: String::new(),
            availability: any_sentinel(),
            commitment: any_sentinel(),
        }
    }
}

/// Draft/applied state of a search form: edits accumulate in `draft` and
/// only become visible to searches after `apply()`.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    pub draft: SearchCriteria,
    pub applied: SearchCriteria,
}

impl FilterState {
    pub fn edit(&mut self, criteria: SearchCriteria) {
        self.draft = criteria;
    }

    pub fn apply(&mut self) {
        self.applied = self.draft.clone();
    }
}

/// Groups compatible with the given skill set: a group matches if it has
/// no skill requirements at all ("open to anyone") or shares at least one
/// skill, compared case-sensitively on exact equality. Input order is
/// preserved.
pub fn matching_groups<'a>(skills: &[String], groups: &'a [Group]) -> Vec<&'a Group> {
    groups
        .iter()
        .filter(|g| {
            g.required_skills.is_empty()
                || g.required_skills.iter().any(|r| skills.iter().any(|s| s == r))
        })
        .collect()
}

/// Profile search, exact-date availability mode. All three criteria are
/// independent AND-ed filters; see the module docs for the sentinels.
pub fn filter_profiles<'a>(criteria: &SearchCriteria, profiles: &'a [Profile]) -> Vec<&'a Profile> {
    let tokens = skill_tokens(&criteria.skills);
    let availability = parse_availability(&criteria.availability);
    let commitment = Commitment::parse(&criteria.commitment);

    profiles
        .iter()
        .filter(|p| matches_skills(&tokens, p))
        .filter(|p| match availability {
            None => true,
            Some(day) => p.availability == Some(day),
        })
        .filter(|p| match commitment {
            None => true,
            Some(c) => p.commitment.contains(&c),
        })
        .collect()
}

/// The distinct range mode: profiles available on or after `from`
/// (inclusive). Profiles with no availability date never pass. Not to be
/// mixed up with the exact-equality filter above; the two have different
/// call sites on purpose.
pub fn profiles_available_from<'a>(from: NaiveDate, profiles: &'a [Profile]) -> Vec<&'a Profile> {
    profiles
        .iter()
        .filter(|p| matches!(p.availability, Some(day) if day >= from))
        .collect()
}

fn skill_tokens(text: &str) -> Vec<String> {
    text.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

// A profile passes the skill filter when any requested token appears as a
// case-insensitive substring of one of its skills. No tokens, no filter.
fn matches_skills(tokens: &[String], profile: &Profile) -> bool {
    tokens.is_empty()
        || tokens
            .iter()
            .any(|t| profile.skills.iter().any(|s| s.to_lowercase().contains(t)))
}

// "any", blank or unparseable text all mean "no availability filter".
fn parse_availability(selector: &str) -> Option<NaiveDate> {
    let s = selector.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("any") {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
