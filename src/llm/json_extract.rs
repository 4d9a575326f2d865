use serde_json::Value;

/// Outcome of pulling a JSON object out of free-form model output.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    Parsed(Value),
    ParseFailed { raw: String, reason: String },
}

impl StructuredOutput {
    pub fn is_parsed(&self) -> bool {
        matches!(self, StructuredOutput::Parsed(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            StructuredOutput::Parsed(v) => Some(v),
            StructuredOutput::ParseFailed { .. } => None,
        }
    }

    /// Non-empty string field of the parsed object.
    pub fn str_field(&self, key: &str) -> Option<String> {
        self.value()?
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "null")
            .map(str::to_string)
    }

    /// String items of an array field; non-string items are dropped.
    pub fn list_field(&self, key: &str) -> Vec<String> {
        self.value()
            .and_then(|v| v.get(key))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn raw_text(&self) -> Option<&str> {
        match self {
            StructuredOutput::Parsed(_) => None,
            StructuredOutput::ParseFailed { raw, .. } => Some(raw),
        }
    }
}

/// Byte span of the first balanced `{...}` in `text`, ignoring braces inside
/// JSON string literals.
fn first_object_span(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
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
                    return Some((start, start + offset + ch.len_utf8()));
                }
            }
            _ => {}
        }
    }
    None
}

/// Locate the first balanced JSON object in model output and parse it.
///
/// Prose before or after the object is ignored. Anything that is not a JSON
/// object (no braces, unbalanced braces, invalid JSON) is `ParseFailed`.
pub fn extract_json_object(text: &str) -> StructuredOutput {
    let failed = |reason: &str| StructuredOutput::ParseFailed {
        raw: text.to_string(),
        reason: reason.to_string(),
    };

    let Some((start, end)) = first_object_span(text) else {
        return failed("no balanced JSON object in response");
    };

    match serde_json::from_str::<Value>(&text[start..end]) {
        Ok(value @ Value::Object(_)) => StructuredOutput::Parsed(value),
        Ok(_) => failed("response JSON is not an object"),
        Err(e) => failed(&format!("invalid JSON: {}", e)),
    }
}
