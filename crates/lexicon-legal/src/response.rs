//! Parsing and validation of the model's role assignments
//!
//! The model is not trusted: every assignment must name a person that occurs
//! verbatim in the source text, and role strings are folded onto the fixed
//! taxonomy.

use serde::Deserialize;
use tracing::debug;

use lexicon_core::{Entity, EntityType, LegalRole};

/// One role assignment as returned by the model
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Assignment {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Character offsets claimed by the model
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RoleResponse {
    entities: Vec<Assignment>,
}

/// Parse the raw message content
///
/// Markdown code fences around the JSON are tolerated. Anything that is not
/// an object with an `entities` array is malformed.
pub fn parse_response(content: &str) -> Result<Vec<Assignment>, String> {
    let body = strip_code_fence(content);
    serde_json::from_str::<RoleResponse>(body)
        .map(|response| response.entities)
        .map_err(|e| format!("response does not match the role schema: {e}"))
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Fold a free-form role label onto the taxonomy
///
/// Returns `None` for "unknown" and anything unrecognised.
pub fn map_role(raw: &str) -> Option<LegalRole> {
    let role = raw.trim().to_lowercase();
    match role.as_str() {
        "defendant" | "accused" | "respondent" | "terdakwa" | "tergugat" | "tersangka"
        | "termohon" => Some(LegalRole::Defendant),
        "plaintiff" | "claimant" | "complainant" | "petitioner" | "penggugat" | "pemohon"
        | "pelapor" => Some(LegalRole::Plaintiff),
        "representative" | "lawyer" | "attorney" | "counsel" | "advocate" | "judge"
        | "prosecutor" | "mediator" | "advokat" | "pengacara" | "hakim" | "jaksa"
        | "kuasa hukum" | "penuntut umum" => Some(LegalRole::Representative),
        _ => None,
    }
}

/// Keep only assignments grounded in `source`, as person entities
///
/// Offsets in the result are byte offsets. The model's own offsets are used
/// when they address the name exactly; otherwise the first occurrence not
/// already claimed by an earlier assignment is used.
pub fn validate(source: &str, assignments: Vec<Assignment>) -> Vec<Entity> {
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut entities = Vec::new();

    for assignment in assignments {
        let name = assignment.name.trim();
        if name.is_empty() {
            continue;
        }

        let is_free = |start: usize, end: usize| {
            !claimed.iter().any(|&(s, e)| s < end && start < e)
        };

        let stated = match (assignment.start, assignment.end) {
            (Some(start), Some(end)) => byte_range(source, start, end)
                .filter(|&(s, e)| &source[s..e] == name && is_free(s, e)),
            _ => None,
        };
        let located = stated.or_else(|| {
            occurrences(source, name).find(|&(s, e)| is_free(s, e))
        });

        let Some((start, end)) = located else {
            debug!(name, "Dropping assignment not found in source text");
            continue;
        };

        let role = assignment.role.as_deref().and_then(map_role);
        let confidence = assignment
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(0.0);

        claimed.push((start, end));
        entities.push(
            Entity::from_source(source, EntityType::Person, start, end, confidence)
                .with_role(role),
        );
    }

    entities.sort_by_key(|e| (e.start, e.end));
    entities
}

/// Convert a character range into a byte range, if it lies within `source`
fn byte_range(source: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    if start >= end {
        return None;
    }
    let mut indices = source
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(source.len()));
    let byte_start = indices.nth(start)?;
    let byte_end = indices.nth(end - start - 1)?;
    Some((byte_start, byte_end))
}

/// Whole-word occurrences of `name` in `source`
fn occurrences<'a>(source: &'a str, name: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    source
        .match_indices(name)
        .map(|(start, matched)| (start, start + matched.len()))
        .filter(|&(start, end)| {
            let before = source[..start].chars().next_back();
            let after = source[end..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
}
