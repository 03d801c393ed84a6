//! Multi-strategy extraction of a structured verdict from raw model text.
//!
//! The prompt asks for a sentinel-delimited layout, but models drift: they
//! wrap JSON in prose, emit half-escaped strings, truncate mid-object, or
//! mix formats. Five tiers run in fixed priority order and the first one
//! whose candidate survives normalization wins. The whole pass is pure and
//! deterministic — the same input always yields the same record.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::analysis::normalize::normalize;
use crate::models::analysis::AnalysisRecord;

pub const SCORE_SENTINEL: &str = "---SCORE---";
pub const RECOMMENDATION_SENTINEL: &str = "---RECOMMENDATION---";
pub const ANALYSIS_SENTINEL: &str = "---ANALYSIS---";
pub const END_SENTINEL: &str = "---END---";

/// Raw fields pulled out by one tier, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtraction {
    pub score: Option<f64>,
    pub recommendation: Option<String>,
    pub body: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no strategy produced an analysis body of at least {min_chars} characters")]
    NoUsableBody { min_chars: usize },
}

/// Walks the tiers in priority order and returns the first candidate that
/// survives normalization, together with the name of the tier that
/// produced it.
pub fn extract_analysis(
    text: &str,
    min_body_chars: usize,
) -> Result<(AnalysisRecord, &'static str), ExtractionError> {
    type Tier = fn(&str) -> Option<RawExtraction>;
    const TIERS: [(&str, Tier); 5] = [
        ("delimiter", parse_delimited),
        ("json", parse_json),
        ("mixed", parse_mixed),
        ("field_scan", parse_field_scan),
        ("markdown", parse_markdown_heading),
    ];

    for (strategy, tier) in TIERS {
        let Some(raw) = tier(text) else {
            debug!(strategy, "extraction tier found no candidate");
            continue;
        };
        match normalize(raw, min_body_chars) {
            Ok(record) => {
                debug!(strategy, score = record.score, "extraction succeeded");
                return Ok((record, strategy));
            }
            Err(e) => debug!(strategy, "candidate rejected: {e}"),
        }
    }

    Err(ExtractionError::NoUsableBody {
        min_chars: min_body_chars,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 1: sentinel-delimited layout
// ────────────────────────────────────────────────────────────────────────────

/// Parses the sentinel layout. Both the SCORE and ANALYSIS sentinels must
/// be present — this format is unambiguously signaled, never guessed. The
/// RECOMMENDATION section is optional and the body tolerates arbitrary
/// nested markup (only the END sentinel terminates it).
fn parse_delimited(text: &str) -> Option<RawExtraction> {
    let score_at = text.find(SCORE_SENTINEL)?;
    let body_at = text.find(ANALYSIS_SENTINEL)?;

    let after_score = &text[score_at + SCORE_SENTINEL.len()..];
    let score_section = after_score.split("---").next().unwrap_or("");
    // Clamped here, not left to normalization: this tier's score also backs
    // recommendation derivation when the token is malformed.
    let score = first_number(score_section).map(|n| n.clamp(0.0, 100.0));

    let recommendation = text.find(RECOMMENDATION_SENTINEL).and_then(|at| {
        let after = &text[at + RECOMMENDATION_SENTINEL.len()..];
        let token = after.split("---").next()?.trim();
        (!token.is_empty()).then(|| token.to_string())
    });

    let after_body = &text[body_at + ANALYSIS_SENTINEL.len()..];
    let body = match after_body.find(END_SENTINEL) {
        Some(end) => &after_body[..end],
        None => after_body,
    };

    Some(RawExtraction {
        score,
        recommendation,
        body: body.trim().to_string(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 2: direct JSON
// ────────────────────────────────────────────────────────────────────────────

fn parse_json(text: &str) -> Option<RawExtraction> {
    let candidate = locate_json_object(strip_fences(text));
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    let body = value.get("analysis")?.as_str()?.trim().to_string();
    Some(RawExtraction {
        score: value.get("score").and_then(|v| v.as_f64()),
        recommendation: value
            .get("recommendation")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        body,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 3: mixed-format salvage
// ────────────────────────────────────────────────────────────────────────────

/// Handles outputs that used the sentinel body section but JSON-style (or
/// prose-style) score and category. The three fields are recovered
/// independently — loose patterns anywhere in the text are good enough for
/// score and category once the body is anchored by its sentinel.
fn parse_mixed(text: &str) -> Option<RawExtraction> {
    let at = text.find(ANALYSIS_SENTINEL)?;
    let after = &text[at + ANALYSIS_SENTINEL.len()..];
    let body = match after.find(END_SENTINEL) {
        Some(end) => &after[..end],
        None => after,
    };
    Some(RawExtraction {
        score: loose_score(text),
        recommendation: loose_recommendation(text),
        body: body.trim().to_string(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 4: escape-aware field scan
// ────────────────────────────────────────────────────────────────────────────

fn parse_field_scan(text: &str) -> Option<RawExtraction> {
    let body = scan_string_field(text, "analysis")?;
    Some(RawExtraction {
        score: loose_score(text),
        recommendation: loose_recommendation(text),
        body: body.trim().to_string(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tier 5: markdown-heading heuristic
// ────────────────────────────────────────────────────────────────────────────

/// Last resort for free-form output: everything from the first markdown
/// heading to an END sentinel or a JSON-closing token is the body.
fn parse_markdown_heading(text: &str) -> Option<RawExtraction> {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    let re = HEADING.get_or_init(|| Regex::new(r"(?m)^#{1,6} ").expect("valid regex"));

    let start = re.find(text)?.start();
    let tail = &text[start..];
    let end = tail
        .find(END_SENTINEL)
        .or_else(|| tail.find("\"}"))
        .unwrap_or(tail.len());

    Some(RawExtraction {
        score: loose_score(text),
        recommendation: loose_recommendation(text),
        body: unescape_common(tail[..end].trim()),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Shared scanning primitives
// ────────────────────────────────────────────────────────────────────────────

/// Returns the interior of the first complete fenced region, tolerating a
/// missing closing fence (truncated output). Pass-through (trimmed) when no
/// fence exists. Never fails — this stage only narrows.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[open + 3..];
    // The optional language tag runs to the end of the fence line.
    let interior = match after.find('\n') {
        Some(i) => &after[i + 1..],
        None => after
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim_start(),
    };
    match interior.find("```") {
        Some(close) => interior[..close].trim(),
        None => interior.trim(),
    }
}

/// First `{` to last `}`, or the original text if either is absent. A
/// heuristic to strip prose wrapped around a JSON object — downstream
/// parsing is what actually validates structure.
pub fn locate_json_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if close > open => &text[open..=close],
        _ => text,
    }
}

/// Extracts the decoded value of one named string field from a loosely
/// JSON-shaped blob, tracking quote/escape state by hand. Works even when
/// the surrounding document is not valid JSON. Unterminated strings and
/// missing fields degrade to `None` — never a panic, never a hang.
pub fn scan_string_field(text: &str, field: &str) -> Option<String> {
    let needle = format!("\"{field}\"");
    let at = text.find(&needle)?;
    let rest = &text[at + needle.len()..];
    let colon = rest.find(':')?;

    let mut chars = rest[colon + 1..].chars();
    let mut c = chars.next()?;
    while c.is_whitespace() {
        c = chars.next()?;
    }
    if c != '"' {
        return None;
    }

    let mut out = String::new();
    let mut escaped = false;
    for c in chars {
        if escaped {
            match c {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                other => out.push(other),
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some(out);
        } else {
            out.push(c);
        }
    }
    None
}

fn first_number(text: &str) -> Option<f64> {
    static NUM: OnceLock<Regex> = OnceLock::new();
    let re = NUM.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));
    re.find(text)?.as_str().parse().ok()
}

fn loose_score(text: &str) -> Option<f64> {
    static SCORE: OnceLock<Regex> = OnceLock::new();
    let re = SCORE.get_or_init(|| Regex::new(r"(?i)score\D{0,12}(\d{1,3})").expect("valid regex"));
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn loose_recommendation(text: &str) -> Option<String> {
    static REC: OnceLock<Regex> = OnceLock::new();
    let re = REC.get_or_init(|| {
        Regex::new(
            r"(?i)\b(not[ _-]?recommended|strongly[ _-]?recommended|strong|moderate|weak|exceptional|outstanding|borderline|poor)\b",
        )
        .expect("valid regex")
    });
    re.find(text).map(|m| m.as_str().to_string())
}

/// Unescapes the common sequences that survive in markdown bodies lifted
/// out of broken JSON. Unknown escapes are kept verbatim.
fn unescape_common(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
