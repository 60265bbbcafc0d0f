//! Context Builder: turn caller input into a validated [`GenerationContext`].
//!
//! The caller supplies a project name and description, a free-text prompt
//! and explicit variables. A JSON object embedded at the end of the prompt
//! supplies lower-precedence overrides:
//!
//! ```text
//! defaults  <  json_overrides (prompt)  <  json_overrides (caller)  <  strict_vars
//! ```
//!
//! The extracted JSON is removed from the prompt shown to the writer; see
//! [`GenerationContext::cleaned_prompt`].

use crate::error::DocRegenError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const MAX_NAME_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// A scalar context variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl VarValue {
    /// Convert a JSON value. `null` yields `None`; arrays and objects become
    /// their compact JSON text.
    pub fn from_json(value: &serde_json::Value) -> Option<VarValue> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(VarValue::Bool(*b)),
            Value::Number(n) => Some(VarValue::Number(n.clone())),
            Value::String(s) => Some(VarValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(VarValue::Text(value.to_string())),
        }
    }

    /// Parse a CLI-style literal: `true`/`false`, a JSON number, else text.
    pub fn parse_literal(s: &str) -> VarValue {
        match s {
            "true" => VarValue::Bool(true),
            "false" => VarValue::Bool(false),
            _ => match serde_json::from_str::<serde_json::Number>(s) {
                Ok(n) => VarValue::Number(n),
                Err(_) => VarValue::Text(s.to_string()),
            },
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{b}"),
            VarValue::Number(n) => write!(f, "{n}"),
            VarValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::Text(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::Text(s)
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        VarValue::Bool(b)
    }
}

impl From<i64> for VarValue {
    fn from(n: i64) -> Self {
        VarValue::Number(n.into())
    }
}

impl From<f64> for VarValue {
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(VarValue::Number)
            .unwrap_or_else(|| VarValue::Text(n.to_string()))
    }
}

pub type Vars = BTreeMap<String, VarValue>;

/// Raw, unvalidated input as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextInput {
    pub project_name: Option<String>,
    pub project_description: Option<String>,
    #[serde(default)]
    pub prompt_text: String,
    #[serde(default)]
    pub strict_vars: Vars,
    /// Caller-supplied overrides, merged over the ones found in the prompt.
    #[serde(default)]
    pub json_overrides: Vars,
}

impl ContextInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            project_name: Some(name.into()),
            project_description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.prompt_text = text.into();
        self
    }

    pub fn strict_var(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.strict_vars.insert(key.into(), value.into());
        self
    }

    pub fn json_override(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.json_overrides.insert(key.into(), value.into());
        self
    }
}

/// The normalised context attached to every section request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub project_name: String,
    pub project_description: String,
    /// Sanitised prompt, including any embedded JSON.
    pub prompt_text: String,
    pub strict_vars: Vars,
    pub json_overrides: Vars,
    pub defaults: Vars,
    cleaned_prompt: String,
}

impl GenerationContext {
    /// `strict_vars` over `json_overrides` over `defaults`.
    pub fn effective_vars(&self) -> Vars {
        let mut vars = self.defaults.clone();
        vars.extend(self.json_overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(self.strict_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    /// The prompt with the extracted JSON block removed.
    pub fn cleaned_prompt(&self) -> &str {
        &self.cleaned_prompt
    }
}

/// Builds [`GenerationContext`]s, optionally with default variables.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    defaults: Vars,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default, the lowest-precedence source of a variable.
    pub fn default_var(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Validate and normalise `input`.
    ///
    /// # Errors
    /// [`DocRegenError::Validation`] when the project name or description is
    /// missing or empty, a field exceeds its length limit, or a variable key
    /// is blank.
    pub fn build(&self, input: ContextInput) -> Result<GenerationContext, DocRegenError> {
        let project_name = required(input.project_name.as_deref(), "project_name", MAX_NAME_CHARS)?;
        let project_description = required(
            input.project_description.as_deref(),
            "project_description",
            MAX_DESCRIPTION_CHARS,
        )?;

        let prompt_text = sanitize(&input.prompt_text);
        check_length("prompt_text", &prompt_text, MAX_PROMPT_CHARS)?;

        for key in input.strict_vars.keys().chain(input.json_overrides.keys()) {
            if key.trim().is_empty() {
                return Err(DocRegenError::validation("strict_vars", "variable names must not be blank"));
            }
        }

        let (mut json_overrides, cleaned_prompt) = match extract_trailing_json(&prompt_text) {
            Some(extracted) => (extracted.overrides, extracted.remaining),
            None => (Vars::new(), prompt_text.clone()),
        };
        json_overrides.extend(input.json_overrides);

        debug!(
            "Context for '{}': {} strict vars, {} overrides",
            project_name,
            input.strict_vars.len(),
            json_overrides.len()
        );

        Ok(GenerationContext {
            project_name,
            project_description,
            prompt_text,
            strict_vars: input.strict_vars,
            json_overrides,
            defaults: self.defaults.clone(),
            cleaned_prompt,
        })
    }
}

/// Build a context without defaults.
pub fn build_context(input: ContextInput) -> Result<GenerationContext, DocRegenError> {
    ContextBuilder::new().build(input)
}

// ── Sanitisation ─────────────────────────────────────────────────────────

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Trim and collapse whitespace runs to one space.
pub fn sanitize(text: &str) -> String {
    RE_WS.replace_all(text.trim(), " ").into_owned()
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), DocRegenError> {
    let len = value.chars().count();
    if len > max {
        return Err(DocRegenError::validation(
            field,
            format!("must be at most {max} characters, got {len}"),
        ));
    }
    Ok(())
}

fn required(value: Option<&str>, field: &str, max: usize) -> Result<String, DocRegenError> {
    let value = sanitize(value.unwrap_or_default());
    if value.is_empty() {
        return Err(DocRegenError::validation(field, "is required and must not be empty"));
    }
    check_length(field, &value, max)?;
    Ok(value)
}

// ── Trailing JSON ────────────────────────────────────────────────────────

/// Overrides found in a prompt and the prompt without them.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedJson {
    pub overrides: Vars,
    pub remaining: String,
}

/// Byte range of the outermost balanced `{…}` block that closes last.
///
/// Quotes are only tracked inside braces so apostrophes and quoted words in
/// the surrounding prose do not disturb matching.
fn last_balanced_block(text: &str) -> Option<(usize, usize)> {
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut best: Option<(usize, usize)> = None;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !stack.is_empty() => in_string = true,
            '{' => stack.push(i),
            '}' => {
                // Later closers always end further right; an enclosing block
                // closes after its inner ones and replaces them.
                if let Some(start) = stack.pop() {
                    best = Some((start, i + 1));
                }
            }
            _ => {}
        }
    }
    best
}

/// Extract the last balanced JSON object from `prompt`.
///
/// Returns `None` when there is no balanced block or the block is not a
/// JSON object; the prompt is then used unchanged.
pub fn extract_trailing_json(prompt: &str) -> Option<ExtractedJson> {
    let (start, end) = last_balanced_block(prompt)?;
    let block = &prompt[start..end];
    let parsed: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(block) {
        Ok(map) => map,
        Err(e) => {
            debug!("Trailing block is not a JSON object, keeping it as text: {}", e);
            return None;
        }
    };

    let overrides = parsed
        .iter()
        .filter_map(|(k, v)| VarValue::from_json(v).map(|v| (k.clone(), v)))
        .collect();
    let remaining = sanitize(&format!("{} {}", &prompt[..start], &prompt[end..]));

    Some(ExtractedJson {
        overrides,
        remaining,
    })
}
