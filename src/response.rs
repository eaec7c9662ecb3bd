//! Decoding and shape checks for raw enrichment replies.

use serde_json::{Map, Value};

use crate::config::ResponseMode;
use crate::error::{Error, Result};

/// One per-item analysis returned in [`ResponseMode::Analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisEntry {
    /// Item echoed back by the service, when it did so.
    pub item: Option<String>,
    /// Analysis text.
    pub analysis: String,
}

/// A reply that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    /// Canonical words from a lemmatize pass.
    Items(Vec<String>),
    /// Per-item analyses, in input order.
    Analyses(Vec<AnalysisEntry>),
}

/// Checks that a raw reply decodes to the shape `mode` expects.
///
/// All or nothing: a single bad element rejects the whole reply.
#[derive(Debug, Clone, Copy)]
pub struct ResponseValidator {
    mode: ResponseMode,
    expected_len: Option<usize>,
}

impl ResponseValidator {
    /// Validator with no count check.
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            mode,
            expected_len: None,
        }
    }

    /// Validator for a reply to a batch of `len` items.
    pub fn expecting(mode: ResponseMode, len: usize) -> Self {
        Self {
            mode,
            expected_len: Some(len),
        }
    }

    /// Decodes `raw`, recovering the outermost JSON structure from chatter or
    /// markdown fences when direct decoding fails.
    pub fn validate(&self, raw: &str) -> Result<ParsedResponse> {
        let value = decode(raw)?;
        match self.mode {
            ResponseMode::Lemmatize => self.items(value).map(ParsedResponse::Items),
            ResponseMode::Analyze => self.analyses(value).map(ParsedResponse::Analyses),
        }
    }

    fn items(&self, value: Value) -> Result<Vec<String>> {
        let Value::Array(elements) = value else {
            return Err(Error::malformed("expected a JSON array of strings"));
        };
        let mut items = Vec::with_capacity(elements.len());
        for (idx, element) in elements.into_iter().enumerate() {
            match element {
                Value::String(text) if !text.trim().is_empty() => items.push(text.trim().to_string()),
                Value::String(_) => {
                    return Err(Error::malformed(format!("element {idx} is blank")));
                }
                other => {
                    return Err(Error::malformed(format!(
                        "element {idx} is {}, expected a string",
                        kind(&other)
                    )));
                }
            }
        }
        if items.is_empty() && self.expected_len.is_some_and(|len| len > 0) {
            return Err(Error::malformed("empty array for a non-empty batch"));
        }
        Ok(items)
    }

    fn analyses(&self, value: Value) -> Result<Vec<AnalysisEntry>> {
        let elements = match value {
            Value::Array(elements) => elements,
            Value::Object(mut object) => match object.remove("results") {
                Some(Value::Array(elements)) => elements,
                Some(other) => {
                    return Err(Error::malformed(format!(
                        "`results` is {}, expected an array",
                        kind(&other)
                    )));
                }
                None => return Err(Error::malformed("object reply without a `results` field")),
            },
            other => {
                return Err(Error::malformed(format!(
                    "reply is {}, expected an array or object",
                    kind(&other)
                )));
            }
        };
        if let Some(expected) = self.expected_len {
            if elements.len() != expected {
                return Err(Error::malformed(format!(
                    "{} result(s) for a batch of {expected}",
                    elements.len()
                )));
            }
        }
        elements
            .into_iter()
            .enumerate()
            .map(|(idx, element)| match element {
                Value::String(analysis) => Ok(AnalysisEntry {
                    item: None,
                    analysis,
                }),
                Value::Object(object) => entry_from_object(idx, object),
                other => Err(Error::malformed(format!(
                    "result {idx} is {}, expected an object or string",
                    kind(&other)
                ))),
            })
            .collect()
    }
}

fn entry_from_object(idx: usize, mut object: Map<String, Value>) -> Result<AnalysisEntry> {
    let analysis = match object.remove("analysis") {
        Some(Value::String(analysis)) => analysis,
        Some(other) => {
            return Err(Error::malformed(format!(
                "result {idx} analysis is {}, expected a string",
                kind(&other)
            )));
        }
        None => {
            return Err(Error::malformed(format!(
                "result {idx} has no `analysis` field"
            )));
        }
    };
    let item = match object.remove("item") {
        Some(Value::String(item)) => Some(item),
        _ => None,
    };
    Ok(AnalysisEntry { item, analysis })
}

fn decode(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::malformed("empty reply"));
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let candidate = outermost_structure(trimmed)
        .ok_or_else(|| Error::malformed("no JSON array or object in reply"))?;
    serde_json::from_str(candidate)
        .map_err(|err| Error::malformed(format!("recovered JSON failed to parse: {err}")))
}

/// Outermost bracketed substring: first `[` to last `]`, or first `{` to last
/// `}`, whichever opens first.
pub fn outermost_structure(text: &str) -> Option<&str> {
    let square = text.find('[');
    let curly = text.find('{');
    let (start, close) = match (square, curly) {
        (Some(s), Some(c)) if c < s => (c, '}'),
        (Some(s), _) => (s, ']'),
        (None, Some(c)) => (c, '}'),
        (None, None) => return None,
    };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
