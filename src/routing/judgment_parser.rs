//! Classifier output parser.
//!
//! Models are asked for a JSON object but routinely wrap it in markdown
//! fences, prefix it with prose, emit trailing commas or answer in plain
//! sentences. Parsing runs in tiers:
//!
//! 1. **Strict**: a JSON object, taken from a code fence or from the first
//!    `{` to the last `}`, with an `agent` field
//! 2. **Lenient**: `agent: name` / `confidence: 0.8` style pairs anywhere in
//!    the text, or a single known agent id mentioned by name
//! 3. **Failed**: candidate `None`, confidence 0.0, raw text as rationale
//!
//! Confidence may be numeric or one of the labels `high`, `medium`, `low`.
//! Values outside `[0, 1]` are clamped and logged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::types::{Candidate, ParseStage, RoutingJudgment};

// ─── Constants ───────────────────────────────────────────────────────────────

const CONFIDENCE_HIGH: f64 = 0.9;
const CONFIDENCE_MEDIUM: f64 = 0.6;
const CONFIDENCE_LOW: f64 = 0.3;

/// Confidence assumed when the model names an agent but gives no confidence.
const CONFIDENCE_DEFAULT: f64 = CONFIDENCE_MEDIUM;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").expect("fenced block regex")
});

static AGENT_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?\b(?:agent|agent_id|candidate|route_to)\b["']?\s*[:=]\s*["']?([a-z][\w\-]*)"#)
        .expect("agent field regex")
});

static CONFIDENCE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?\bconfidence\b["']?\s*[:=]\s*["']?(-?\d+(?:\.\d+)?|high|medium|low)\b"#)
        .expect("confidence field regex")
});

static REASON_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?\b(?:reason|rationale)\b["']?\s*[:=]\s*["']?([^"'\n]+)"#)
        .expect("reason field regex")
});

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse raw classifier output into a judgment.
///
/// `known_agents` lets the lenient stage recognize a bare agent id in prose.
/// Never fails: unreadable output becomes an explicit parse-failure judgment.
pub fn parse_judgment(raw: &str, known_agents: &[&str]) -> RoutingJudgment {
    if let Some(fields) = parse_strict(raw) {
        return finish(raw, fields, ParseStage::Strict);
    }

    if let Some(fields) = parse_lenient(raw, known_agents) {
        tracing::warn!(
            candidate = ?fields.candidate,
            "classifier output was not valid JSON, recovered fields leniently"
        );
        return finish(raw, fields, ParseStage::Lenient);
    }

    tracing::warn!(
        output_len = raw.len(),
        "classifier output could not be parsed"
    );
    RoutingJudgment::parse_failure(raw)
}

// ─── Strict Stage ────────────────────────────────────────────────────────────

/// Fields recovered by either stage, before clamping.
struct ParsedFields {
    candidate: Candidate,
    confidence: f64,
    rationale: Option<String>,
    reformulated_query: Option<String>,
}

#[derive(Deserialize)]
struct RawJudgment {
    /// `None` when the key is absent; `Some(Null)` for an explicit null.
    #[serde(default, deserialize_with = "present", alias = "agent_id", alias = "candidate")]
    agent: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default, alias = "rationale", alias = "reasoning")]
    reason: Option<String>,
    #[serde(default)]
    reformulated_query: Option<String>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn parse_strict(raw: &str) -> Option<ParsedFields> {
    json_candidates(raw).find_map(|text| {
        let parsed: RawJudgment = serde_json::from_str(text).ok()?;
        let candidate = match parsed.agent? {
            Value::String(label) => Candidate::from_label(&label),
            Value::Null => Candidate::None,
            _ => return None,
        };
        let confidence = match parsed.confidence {
            None | Some(Value::Null) => CONFIDENCE_DEFAULT,
            Some(Value::Number(n)) => n.as_f64()?,
            Some(Value::String(s)) => confidence_from_token(&s)?,
            Some(_) => return None,
        };
        Some(ParsedFields {
            candidate,
            confidence,
            rationale: parsed.reason.filter(|r| !r.trim().is_empty()),
            reformulated_query: parsed.reformulated_query.filter(|q| !q.trim().is_empty()),
        })
    })
}

/// Substrings that might be the JSON object: fenced blocks first, then the
/// outermost braces of the whole text.
fn json_candidates(raw: &str) -> impl Iterator<Item = &str> {
    FENCED_BLOCK
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1).map(|m| outer_braces(m.as_str())))
        .chain(std::iter::once(outer_braces(raw)))
        .filter(|s| s.starts_with('{'))
}

fn outer_braces(text: &str) -> &str {
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return &text[start..=end];
            }
        }
    }
    text
}

// ─── Lenient Stage ───────────────────────────────────────────────────────────

fn parse_lenient(raw: &str, known_agents: &[&str]) -> Option<ParsedFields> {
    let candidate = AGENT_FIELD
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| Candidate::from_label(m.as_str()))
        .or_else(|| sole_mentioned_agent(raw, known_agents).map(Candidate::Agent))?;

    let confidence = CONFIDENCE_FIELD
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| confidence_from_token(m.as_str()))
        .unwrap_or(CONFIDENCE_DEFAULT);

    let rationale = REASON_FIELD
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_end_matches(',').to_string())
        .filter(|r| !r.is_empty());

    Some(ParsedFields {
        candidate,
        confidence,
        rationale,
        reformulated_query: None,
    })
}

/// The one known agent id mentioned as a whole word, if exactly one is.
fn sole_mentioned_agent(raw: &str, known_agents: &[&str]) -> Option<String> {
    let words: Vec<String> = raw
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut mentioned = known_agents
        .iter()
        .map(|id| id.to_lowercase())
        .filter(|id| words.iter().any(|w| w == id));

    let first = mentioned.next()?;
    if mentioned.next().is_some() {
        return None;
    }
    Some(first)
}

// ─── Shared ──────────────────────────────────────────────────────────────────

fn confidence_from_token(token: &str) -> Option<f64> {
    let token = token.trim();
    match token.to_lowercase().as_str() {
        "high" => Some(CONFIDENCE_HIGH),
        "medium" => Some(CONFIDENCE_MEDIUM),
        "low" => Some(CONFIDENCE_LOW),
        _ => token.parse::<f64>().ok(),
    }
}

fn clamp_confidence(value: f64) -> f32 {
    if !value.is_finite() {
        tracing::warn!(confidence = value, "non-finite classifier confidence, using 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        tracing::warn!(confidence = value, "classifier confidence out of range, clamped");
    }
    value.clamp(0.0, 1.0) as f32
}

fn finish(raw: &str, fields: ParsedFields, stage: ParseStage) -> RoutingJudgment {
    RoutingJudgment {
        candidate: fields.candidate,
        confidence: clamp_confidence(fields.confidence),
        rationale: fields.rationale.unwrap_or_else(|| raw.trim().to_string()),
        raw_output: raw.to_string(),
        stage,
        reformulated_query: fields.reformulated_query,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const AGENTS: &[&str] = &["documentation", "search", "desktop", "data"];

    #[test]
    fn test_strict_plain_json() {
        let j = parse_judgment(
            r#"{"agent": "search", "confidence": 0.9, "reason": "weather is current info"}"#,
            AGENTS,
        );
        assert_eq!(j.stage, ParseStage::Strict);
        assert_eq!(j.candidate, Candidate::Agent("search".into()));
        assert!((j.confidence - 0.9).abs() < 1e-6);
        assert_eq!(j.rationale, "weather is current info");
    }

    #[test]
    fn test_strict_fenced_json_with_labels() {
        let raw = "Sure! Here is my routing:\n```json\n{\n  \"agent\": \"Documentation\",\n  \"reason\": \"asks about an SDK\",\n  \"reformulated_query\": \"How do I paginate with the Stripe SDK?\",\n  \"confidence\": \"high\"\n}\n```";
        let j = parse_judgment(raw, AGENTS);
        assert_eq!(j.stage, ParseStage::Strict);
        assert_eq!(j.candidate, Candidate::Agent("documentation".into()));
        assert!((j.confidence - 0.9).abs() < 1e-6);
        assert_eq!(
            j.reformulated_query.as_deref(),
            Some("How do I paginate with the Stripe SDK?")
        );
        assert_eq!(j.raw_output, raw);
    }

    #[test]
    fn test_strict_json_after_prose() {
        let j = parse_judgment(
            r#"I think this is a data question. {"agent":"data","confidence":"low"} Hope that helps."#,
            AGENTS,
        );
        assert_eq!(j.stage, ParseStage::Strict);
        assert!((j.confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_missing_confidence_defaults_to_medium() {
        let j = parse_judgment(r#"{"agent":"desktop","reason":"files"}"#, AGENTS);
        assert!((j.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_explicit_decline_is_not_a_parse_failure() {
        let j = parse_judgment(r#"{"agent":"router","confidence":"high"}"#, AGENTS);
        assert_eq!(j.stage, ParseStage::Strict);
        assert_eq!(j.candidate, Candidate::None);
        assert!(!j.is_parse_failure());

        let j = parse_judgment(r#"{"agent":null,"confidence":0.2}"#, AGENTS);
        assert_eq!(j.candidate, Candidate::None);
        assert!(!j.is_parse_failure());
    }

    #[test]
    fn test_out_of_range_confidence_is_clamped() {
        let high = parse_judgment(r#"{"agent":"search","confidence":1.7}"#, AGENTS);
        assert_eq!(high.confidence, 1.0);
        let low = parse_judgment(r#"{"agent":"search","confidence":-0.2}"#, AGENTS);
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn test_lenient_trailing_comma() {
        let raw = "{\"agent\": \"search\", \"confidence\": 0.85,}";
        let j = parse_judgment(raw, AGENTS);
        assert_eq!(j.stage, ParseStage::Lenient);
        assert_eq!(j.candidate, Candidate::Agent("search".into()));
        assert!((j.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_lenient_key_value_prose() {
        let raw = "Agent: desktop\nConfidence: 0.7\nReason: user wants to list a directory";
        let j = parse_judgment(raw, AGENTS);
        assert_eq!(j.stage, ParseStage::Lenient);
        assert_eq!(j.candidate, Candidate::Agent("desktop".into()));
        assert!((j.confidence - 0.7).abs() < 1e-6);
        assert_eq!(j.rationale, "user wants to list a directory");
    }

    #[test]
    fn test_lenient_single_agent_mention() {
        let j = parse_judgment("This should go to the search agent, I'm fairly sure.", AGENTS);
        assert_eq!(j.stage, ParseStage::Lenient);
        assert_eq!(j.candidate, Candidate::Agent("search".into()));
        assert!((j.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_ambiguous_mentions_fail() {
        let j = parse_judgment("Either search or documentation could work.", AGENTS);
        assert!(j.is_parse_failure());
    }

    #[test]
    fn test_garbage_is_parse_failure() {
        let raw = "¯\\_(ツ)_/¯ ... <|endoftext|>";
        let j = parse_judgment(raw, AGENTS);
        assert!(j.is_parse_failure());
        assert_eq!(j.candidate, Candidate::None);
        assert_eq!(j.confidence, 0.0);
        assert_eq!(j.rationale, raw);
    }

    #[test]
    fn test_empty_output_is_parse_failure() {
        assert!(parse_judgment("", AGENTS).is_parse_failure());
    }

    #[test]
    fn test_json_without_agent_falls_through() {
        // Valid JSON but no agent key and no agent mention.
        let j = parse_judgment(r#"{"answer": 42}"#, AGENTS);
        assert!(j.is_parse_failure());
    }
}
