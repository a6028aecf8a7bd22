//! Prompt construction for legal role classification

use serde_json::{json, Value};

use lexicon_core::{CompletionRequest, LegalRole};

pub const SYSTEM_PROMPT: &str =
    "You are a legal document analyzer that identifies the roles of people mentioned in legal texts.";

/// Role label the model uses when it cannot decide
pub const UNKNOWN_ROLE: &str = "unknown";

/// Build the user prompt for `text`
///
/// `candidates` are person names found by the tagging pipeline. They are a
/// hint only; the model may report people the tagger missed.
pub fn build_prompt(text: &str, candidates: &[String]) -> String {
    let roles = role_labels().join("|");

    let people = if candidates.is_empty() {
        "Identify every person mentioned in the text and their role.".to_string()
    } else {
        let names = candidates
            .iter()
            .map(|name| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Analyze the following text and identify the roles of these people: {names}.")
    };

    format!(
        r#"{people}

For each person, determine if they are a defendant, plaintiff, or representative (like a lawyer, judge, etc.).
If their role cannot be determined, classify them as "{UNKNOWN_ROLE}".
Use each name exactly as it is written in the text.

Text:
```
{text}
```

Return the results in JSON format with the following structure:
{{
  "entities": [
    {{
      "name": "<person name>",
      "role": "<{roles}>",
      "confidence": <float between 0 and 1>,
      "start": <character offset where the name starts, optional>,
      "end": <character offset where the name ends, optional>
    }}
  ]
}}
"#
    )
}

/// JSON schema of the expected response
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "role": { "type": "string", "enum": role_labels() },
                        "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                        "start": { "type": "integer", "minimum": 0 },
                        "end": { "type": "integer", "minimum": 0 }
                    },
                    "required": ["name", "role", "confidence"]
                }
            }
        },
        "required": ["entities"]
    })
}

/// Complete request for one text
pub fn completion_request(text: &str, candidates: &[String]) -> CompletionRequest {
    CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt: build_prompt(text, candidates),
        schema: Some(response_schema()),
    }
}

fn role_labels() -> Vec<&'static str> {
    LegalRole::all()
        .iter()
        .map(LegalRole::as_str)
        .chain(std::iter::once(UNKNOWN_ROLE))
        .collect()
}
