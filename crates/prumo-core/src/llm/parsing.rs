//! Parsing helpers for LLM fallback responses
//!
//! Models answer with prose around a JSON payload more often than not; these
//! functions pull the first balanced `{...}` block out of the raw text and
//! validate it against the closed message schema.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{local_offset, MessageKind, ParsedData, ParsedMessage};

/// Extract the first balanced `{...}` block from raw response text.
///
/// Brace depth is tracked outside of string literals so prose or markdown
/// fences around the payload do not confuse the scan.
pub fn extract_json_block(text: &str) -> Result<&str> {
    let start = text.find('{').ok_or_else(|| {
        Error::MalformedResponse(format!("No JSON found in LLM response | Raw: {}", truncate(text)))
    })?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    Err(Error::MalformedResponse(format!(
        "Unbalanced JSON in LLM response | Raw: {}",
        truncate(text)
    )))
}

fn truncate(text: &str) -> String {
    if text.chars().count() > 200 {
        let cut: String = text.chars().take(200).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// A validated fallback reply, before confidence clamping
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub kind: MessageKind,
    pub confidence: f64,
    pub reasoning: String,
    pub data: Option<Value>,
}

/// Parse and validate a raw backend response.
///
/// `MalformedResponse` when no JSON block exists or it does not parse;
/// `InvalidResponse` when the object fails schema validation.
pub fn parse_reply(raw: &str) -> Result<LlmReply> {
    let block = extract_json_block(raw.trim())?;
    let value: Value = serde_json::from_str(block).map_err(|e| {
        Error::MalformedResponse(format!("Invalid JSON from LLM: {} | Raw: {}", e, truncate(block)))
    })?;

    let object = value
        .as_object()
        .ok_or_else(|| Error::InvalidResponse("Response is not a JSON object".into()))?;

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidResponse("Missing type field".into()))?
        .parse::<MessageKind>()
        .map_err(Error::InvalidResponse)?;

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::InvalidResponse("Missing or non-numeric confidence".into()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::InvalidResponse(format!(
            "Confidence out of range: {}",
            confidence
        )));
    }

    let reasoning = object
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(LlmReply {
        kind,
        confidence,
        reasoning,
        data: object.get("data").cloned(),
    })
}

/// Convert a validated reply into a `ParsedMessage`, clamping confidence to
/// the context ceiling and enforcing the data-presence invariant.
pub fn reply_to_message(reply: LlmReply, raw_text: &str, max_confidence: f64) -> Result<ParsedMessage> {
    let confidence = reply.confidence.min(max_confidence);

    let data = match reply.kind {
        MessageKind::Transaction => {
            let data = reply
                .data
                .as_ref()
                .ok_or_else(|| Error::InvalidResponse("Transaction without data".into()))?;
            let amount = data
                .get("amount")
                .and_then(Value::as_f64)
                .filter(|a| a.is_finite())
                .ok_or_else(|| Error::InvalidResponse("Transaction without amount".into()))?;
            Some(ParsedData::Transaction {
                amount,
                category: data
                    .get("category")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                date: data.get("date").and_then(Value::as_str).and_then(parse_loose_date),
                note: data
                    .get("note")
                    .and_then(Value::as_str)
                    .unwrap_or(raw_text)
                    .to_string(),
                is_income: data.get("isIncome").and_then(Value::as_bool).unwrap_or(false),
            })
        }
        MessageKind::Event => {
            let data = reply
                .data
                .as_ref()
                .ok_or_else(|| Error::InvalidResponse("Event without data".into()))?;
            let starts_at = data
                .get("eventTime")
                .and_then(Value::as_str)
                .and_then(parse_loose_date)
                .ok_or_else(|| Error::InvalidResponse("Event without a valid eventTime".into()))?;
            Some(ParsedData::Event {
                title: data
                    .get("eventTitle")
                    .and_then(Value::as_str)
                    .unwrap_or(raw_text)
                    .to_string(),
                starts_at,
            })
        }
        MessageKind::Query | MessageKind::Unknown => None,
    };

    Ok(ParsedMessage {
        kind: reply.kind,
        confidence,
        reasoning: reply.reasoning,
        data,
    })
}

/// Accept RFC 3339 or a bare `YYYY-MM-DD` (interpreted at local midnight)
fn parse_loose_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    date.and_hms_opt(0, 0, 0)?
        .and_local_timezone(local_offset())
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
