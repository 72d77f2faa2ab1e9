//! C1 — Response Parser.
//!
//! Two entry points: a structured path for respondents that return JSON
//! matching the wire shape, and a free-text path that extracts the same
//! fields heuristically from prose (grounded on `evaluator.rs`'s
//! keyword-indicator-array style). The free-text path never fails — it
//! always produces a best-effort `ParsedFields` with defaults. The
//! structured path validates strictly and returns a [`ValidationError`]
//! instead of raising, per the engine's error taxonomy.

use serde_json::Value;

use crate::errors::ValidationError;
use crate::types::{Choice, DilemmaItem, ForcedChoice, Principle};

/// Fields extracted from a single response, prior to persistence.
#[derive(Debug, Clone)]
pub struct ParsedFields {
    pub choice: Choice,
    pub forced_choice: ForcedChoice,
    pub permissibility: f64,
    pub confidence: f64,
    pub principles: Vec<Principle>,
    pub rationale: Option<String>,
    pub info_needed: Vec<String>,
    /// Non-fatal notices: structured-path truncations/drops, or (always, for
    /// the free-text path) an enumeration of every field that was inferred
    /// rather than explicitly given.
    pub warnings: Vec<String>,
}

const MAX_PRINCIPLES: usize = 3;
const MAX_RATIONALE_CHARS: usize = 200;
const MAX_INFO_NEEDED: usize = 5;

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Structured JSON path. `item` is only used to validate `choice` against
/// the dilemma's labeled options (all four are always present).
pub fn parse_structured(value: &Value, _item: &DilemmaItem) -> Result<ParsedFields, ValidationError> {
    let mut warnings = Vec::new();

    let choice_raw = value
        .get("choice")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingChoice)?;
    let choice: Choice = choice_raw.parse()?;
    let forced_choice = match value.get("forced_choice").and_then(Value::as_str) {
        Some(raw) => raw.parse()?,
        None => {
            warnings.push("forced_choice not given, inferred from choice".to_string());
            ForcedChoice::derive_from(choice)
        }
    };

    let permissibility = match value.get("permissibility") {
        Some(v) => {
            let n = v.as_f64().ok_or(ValidationError::NotAString)?;
            if !(0.0..=100.0).contains(&n) {
                return Err(ValidationError::InvalidRange {
                    field: "permissibility".to_string(),
                    value: n,
                });
            }
            n
        }
        None => 50.0,
    };

    let confidence = match value.get("confidence") {
        Some(v) => {
            let n = v.as_f64().ok_or(ValidationError::NotAString)?;
            if !(0.0..=100.0).contains(&n) {
                return Err(ValidationError::InvalidRange {
                    field: "confidence".to_string(),
                    value: n,
                });
            }
            n
        }
        None => 50.0,
    };

    let principles = value
        .get("principles")
        .and_then(Value::as_array)
        .map(|arr| {
            let raw_strs: Vec<&str> = arr.iter().filter_map(Value::as_str).collect();
            let parsed: Vec<Principle> = raw_strs.iter().filter_map(|s| Principle::parse(s)).collect();
            if parsed.len() < raw_strs.len() {
                warnings.push("unrecognized principle(s) dropped".to_string());
            }
            if parsed.len() > MAX_PRINCIPLES {
                warnings.push(format!("principles truncated to {MAX_PRINCIPLES}"));
            }
            parsed.into_iter().take(MAX_PRINCIPLES).collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let rationale = value.get("rationale").and_then(Value::as_str).map(|s| {
        if s.chars().count() > MAX_RATIONALE_CHARS {
            warnings.push(format!("rationale truncated to {MAX_RATIONALE_CHARS} characters"));
        }
        truncate_chars(s, MAX_RATIONALE_CHARS)
    });

    let info_needed = value
        .get("info_needed")
        .and_then(Value::as_array)
        .map(|arr| {
            let items: Vec<String> = arr.iter().filter_map(Value::as_str).map(str::to_string).collect();
            if items.len() > MAX_INFO_NEEDED {
                warnings.push(format!("info_needed truncated to {MAX_INFO_NEEDED} items"));
            }
            items.into_iter().take(MAX_INFO_NEEDED).collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(ParsedFields {
        choice,
        forced_choice,
        permissibility,
        confidence,
        principles,
        rationale,
        info_needed,
        warnings,
    })
}

const PERMISSION_WORDS: &[&str] = &["permissible", "acceptable", "justified", "allowed", "permitted", "fine", "okay", "reasonable"];
const PROHIBITION_WORDS: &[&str] = &["impermissible", "unacceptable", "forbidden", "prohibited", "wrong", "unjustified", "never"];

const CERTAINTY_WORDS: &[&str] = &["certainly", "definitely", "clearly", "obviously", "undoubtedly", "without doubt", "surely"];
const UNCERTAINTY_PHRASES: &[&str] = &[
    "i'm not sure",
    "i am not sure",
    "it's unclear",
    "it is unclear",
    "hard to say",
    "difficult to say",
    "on the other hand",
    "depends on",
    "might",
    "could be",
];

/// Free-text fallback. Never returns an error: a respondent that answers
/// in prose instead of the structured schema still produces a scorable
/// response, just a noisier one.
pub fn parse_free_text(text: &str, _item: &DilemmaItem) -> ParsedFields {
    let lower = text.to_lowercase();

    let choice = extract_choice(&lower).unwrap_or(Choice::A);
    let forced_choice = ForcedChoice::derive_from(choice);

    // `50 + 15 * (permission_word_count - prohibition_word_count)`, clamped.
    let permission_count = count_occurrences(&lower, PERMISSION_WORDS) as f64;
    let prohibition_count = count_occurrences(&lower, PROHIBITION_WORDS) as f64;
    let permissibility = clamp(50.0 + 15.0 * (permission_count - prohibition_count), 0.0, 100.0);

    // `70 + 10 * certainty_words - 15 * uncertainty_words`, clamped to [10, 100].
    let certainty_count = count_occurrences(&lower, CERTAINTY_WORDS) as f64;
    let uncertainty_count = UNCERTAINTY_PHRASES.iter().filter(|p| lower.contains(**p)).count() as f64;
    let confidence = clamp(70.0 + 10.0 * certainty_count - 15.0 * uncertainty_count, 10.0, 100.0);

    let principles = Principle::all()
        .into_iter()
        .filter(|p| lower.contains(principle_keyword(*p)))
        .take(MAX_PRINCIPLES)
        .collect();

    let rationale = Some(truncate_chars(text.trim(), MAX_RATIONALE_CHARS)).filter(|s| !s.is_empty());

    let info_needed = extract_info_needed(&lower);

    let warnings = vec![
        "free-text response: all fields inferred heuristically from prose".to_string(),
        format!("choice inferred as {choice}"),
        format!("permissibility inferred as {permissibility:.0} from permission/prohibition wording"),
        format!("confidence inferred as {confidence:.0} from certainty/uncertainty wording"),
        format!("principles inferred from keyword matches ({} found)", principles.len()),
        format!("info_needed inferred from interrogative phrasing ({} found)", info_needed.len()),
    ];

    ParsedFields {
        choice,
        forced_choice,
        permissibility,
        confidence,
        principles,
        rationale,
        info_needed,
        warnings,
    }
}

fn principle_keyword(p: Principle) -> &'static str {
    match p {
        Principle::Consequentialist => "consequence",
        Principle::Deontological => "duty",
        Principle::Virtue => "virtue",
        Principle::Contractualist => "contract",
        Principle::Care => "care",
        Principle::Pragmatic => "pragmatic",
    }
}

fn extract_choice(lower: &str) -> Option<Choice> {
    for (needle, choice) in [
        ("option a", Choice::A),
        ("option b", Choice::B),
        ("option c", Choice::C),
        ("option d", Choice::D),
        ("(a)", Choice::A),
        ("(b)", Choice::B),
        ("(c)", Choice::C),
        ("(d)", Choice::D),
        ("choose a", Choice::A),
        ("choose b", Choice::B),
        ("choose c", Choice::C),
        ("choose d", Choice::D),
    ] {
        if lower.contains(needle) {
            return Some(choice);
        }
    }
    None
}

fn count_occurrences(lower: &str, words: &[&str]) -> usize {
    words.iter().map(|w| lower.matches(w).count()).sum()
}

/// Three pattern families: "need to know ..." phrasing, bare interrogative
/// sentences, and "more information about ..." phrasing.
fn extract_info_needed(lower: &str) -> Vec<String> {
    const NEED_TO_KNOW_MARKERS: &[&str] = &["i would need to know", "i'd need to know", "need to know", "need more detail"];
    const MORE_INFO_MARKERS: &[&str] = &["more information about", "more info about", "more details about"];

    for marker in NEED_TO_KNOW_MARKERS.iter().chain(MORE_INFO_MARKERS) {
        if let Some(pos) = lower.find(marker) {
            let tail = &lower[pos + marker.len()..];
            let items: Vec<String> = tail
                .split(&[',', '.', ';'][..])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .take(MAX_INFO_NEEDED)
                .collect();
            if !items.is_empty() {
                return items;
            }
        }
    }

    // Bare interrogative sentences ("what happens if...?", "how many...?").
    const INTERROGATIVES: &[&str] = &["what", "how", "why", "who", "when", "where", "would"];
    let interrogative_questions: Vec<String> = lower
        .split(&['.', '?', '!'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| INTERROGATIVES.iter().any(|w| s.starts_with(w)))
        .map(str::to_string)
        .take(MAX_INFO_NEEDED)
        .collect();

    interrogative_questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DilemmaOption, DilemmaParams, DilemmaType, Pole};

    fn dummy_item() -> DilemmaItem {
        DilemmaItem {
            id: "item-1".to_string(),
            axis_id: "axis-1".to_string(),
            secondary_axis_id: None,
            family_id: "family-1".to_string(),
            pressure_level: 0.5,
            params: DilemmaParams::default(),
            options: [
                DilemmaOption { choice: Choice::A, text: "A".to_string(), pole: Pole::Left },
                DilemmaOption { choice: Choice::B, text: "B".to_string(), pole: Pole::Right },
                DilemmaOption { choice: Choice::C, text: "C".to_string(), pole: Pole::Neutral },
                DilemmaOption { choice: Choice::D, text: "D".to_string(), pole: Pole::Creative },
            ],
            is_anchor: false,
            dilemma_type: DilemmaType::Base,
            consistency_group_id: None,
            variant_type: None,
            non_obvious_factors: vec![],
            expert_disagreement: 0.0,
            requires_residue_recognition: false,
            meta_ethical_type: None,
        }
    }

    #[test]
    fn structured_missing_choice_errors() {
        let item = dummy_item();
        let value = serde_json::json!({"permissibility": 50});
        let result = parse_structured(&value, &item);
        assert_eq!(result.unwrap_err(), ValidationError::MissingChoice);
    }

    #[test]
    fn structured_out_of_range_permissibility_errors() {
        let item = dummy_item();
        let value = serde_json::json!({"choice": "A", "permissibility": 150});
        let result = parse_structured(&value, &item);
        assert!(matches!(result, Err(ValidationError::InvalidRange { .. })));
    }

    #[test]
    fn structured_truncates_principles_and_rationale() {
        let item = dummy_item();
        let value = serde_json::json!({
            "choice": "B",
            "principles": ["care", "virtue", "pragmatic", "deontological"],
            "rationale": "x".repeat(300),
        });
        let parsed = parse_structured(&value, &item).unwrap();
        assert_eq!(parsed.principles.len(), MAX_PRINCIPLES);
        assert_eq!(parsed.rationale.unwrap().len(), MAX_RATIONALE_CHARS);
        assert_eq!(parsed.forced_choice, ForcedChoice::B);
    }

    #[test]
    fn free_text_never_errors_and_has_defaults() {
        let item = dummy_item();
        let parsed = parse_free_text("I think option B is more defensible here, though it's unclear.", &item);
        assert_eq!(parsed.choice, Choice::B);
        assert!(parsed.confidence < 80.0);
    }
}
