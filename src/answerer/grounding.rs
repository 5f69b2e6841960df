//! Post-processing policy that turns raw backend output into a
//! `GroundedAnswer` the surfaces can always display.

use crate::models::{Citation, Confidence, GroundedAnswer};

use super::prompt::{GENERIC_FAILURE_NOTICE, refusal_sentinel};

/// Fields recovered from a structured backend response.
///
/// Everything is optional here; the grounding policy fills the gaps. The
/// strict required-fields contract lives in the schema sent to the backend,
/// not in this parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredAnswer {
    pub answer: Option<String>,
    pub confidence: Option<Confidence>,
    pub citations: Option<Vec<Citation>>,
}

/// Tagged result of parsing backend output.
///
/// Callers handle both arms exhaustively: `Parsed` carries the structured
/// fields, `Degraded` carries the raw text of a response that was not valid
/// structured output. Degradation is a recovery path, not an error - the
/// user always receives something displayable.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Parsed(StructuredAnswer),
    Degraded(String),
}

/// Lenient citation extraction shared with the study synthesizer.
///
/// Requires a file name; reference and snippet default to empty strings
/// rather than failing the containing item.
pub(crate) fn citations_from_value(value: Option<&serde_json::Value>) -> Option<Vec<Citation>> {
    value.and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|c| {
                let file_name = c.get("fileName").and_then(|v| v.as_str())?;
                Some(Citation {
                    file_name: file_name.to_string(),
                    reference: c
                        .get("reference")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    snippet: c
                        .get("snippet")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                })
            })
            .collect()
    })
}

/// Extracts the outermost JSON object from a response.
///
/// Models occasionally wrap JSON in markdown fences or prose despite the
/// output schema; the slice between the first `{` and the last `}` is the
/// candidate object.
fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start <= end).then(|| &trimmed[start..=end])
}

/// Parses raw backend output into a tagged `ModelOutput`.
///
/// Field extraction is lenient; the grounding policy fills the gaps. A
/// missing or oddly cased confidence becomes `None`, and citations missing
/// a file name are dropped rather than failing the whole parse.
pub fn parse_model_output(raw: &str) -> ModelOutput {
    let Some(json_str) = extract_json(raw) else {
        return ModelOutput::Degraded(raw.to_string());
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) else {
        return ModelOutput::Degraded(raw.to_string());
    };

    let Some(obj) = value.as_object() else {
        return ModelOutput::Degraded(raw.to_string());
    };

    let answer = obj
        .get("answer")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let confidence = obj
        .get("confidence")
        .and_then(|v| v.as_str())
        .and_then(Confidence::parse);

    let citations = citations_from_value(obj.get("citations"));

    ModelOutput::Parsed(StructuredAnswer {
        answer,
        confidence,
        citations,
    })
}

/// Applies the grounding policy to a parsed or degraded output.
///
/// Enforced invariants:
/// - no passages existed -> the answer is exactly the refusal sentinel,
///   confidence `Low`, no citations, regardless of what the model said;
/// - the model returned the sentinel itself -> confidence forced to `Low`
///   and citations dropped;
/// - a missing or empty answer becomes a generic failure notice;
/// - missing confidence defaults to `Low`, missing citations to none.
///
/// Citations are passed through untouched otherwise - never invented here,
/// and snippet authenticity is not re-checked against the source chunks
/// (the backend is trusted to quote accurately).
pub fn ground(output: ModelOutput, subject_name: &str, had_context: bool) -> GroundedAnswer {
    let sentinel = refusal_sentinel(subject_name);

    if !had_context {
        return GroundedAnswer {
            answer: sentinel,
            confidence: Confidence::Low,
            citations: Vec::new(),
        };
    }

    match output {
        ModelOutput::Degraded(raw) => {
            let raw = raw.trim();
            GroundedAnswer {
                answer: if raw.is_empty() {
                    GENERIC_FAILURE_NOTICE.to_string()
                } else {
                    raw.to_string()
                },
                confidence: Confidence::Low,
                citations: Vec::new(),
            }
        }
        ModelOutput::Parsed(parsed) => {
            let answer = match parsed.answer {
                Some(text) if !text.trim().is_empty() => text,
                _ => GENERIC_FAILURE_NOTICE.to_string(),
            };

            if answer == sentinel {
                return GroundedAnswer {
                    answer,
                    confidence: Confidence::Low,
                    citations: Vec::new(),
                };
            }

            GroundedAnswer {
                answer,
                confidence: parsed.confidence.unwrap_or(Confidence::Low),
                citations: parsed.citations.unwrap_or_default(),
            }
        }
    }
}
