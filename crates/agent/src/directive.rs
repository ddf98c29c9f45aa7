//! Parsing of model responses.
//!
//! A response may contain tool directives and a confidence tag:
//!
//! ```text
//! Let me check.
//! TOOL_CALL: memory_search(query="favorite color", limit=3)
//! CONFIDENCE: 0.4
//! ```
//!
//! Arguments are `key=value` pairs. Values are double- or single-quoted
//! strings, numbers, `true`/`false`/`null`, or bare words (taken as strings).
//! A single JSON object is accepted as well: `name({"query": "x"})`.
//! Everything that is neither a directive nor a confidence tag is the answer.

use serde_json::{Map, Number, Value};

pub const DIRECTIVE_MARKER: &str = "TOOL_CALL:";
pub const CONFIDENCE_MARKER: &str = "CONFIDENCE:";

/// One well-formed tool directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDirective {
    pub name: String,
    pub params: Value,
}

/// A directive that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedDirective {
    pub raw: String,
    pub reason: String,
}

/// Everything the governor needs from one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// Directives in order of appearance, capped at the per-iteration limit
    pub calls: Vec<ToolDirective>,
    pub malformed: Vec<MalformedDirective>,
    /// Well-formed directives past the limit
    pub ignored: usize,
    /// Explicit confidence in `[0, 1]`
    pub confidence: Option<f32>,
    /// The response without directives and confidence tags
    pub answer: String,
}

/// Parse `response`, keeping at most `max_calls` directives.
pub fn parse_response(response: &str, max_calls: usize) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let mut answer_lines: Vec<&str> = Vec::new();

    let mut rest = response;
    while !rest.is_empty() {
        let (line, tail) = match rest.find('\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };

        if let Some(at) = line.find(DIRECTIVE_MARKER) {
            let before = line[..at].trim_end();
            if !before.is_empty() {
                answer_lines.push(before);
            }
            // a directive may span lines (e.g. a JSON object); parse from
            // the marker over the remaining text
            let from_marker = &rest[at + DIRECTIVE_MARKER.len()..];
            let consumed = match parse_directive(from_marker) {
                Ok((directive, consumed)) => {
                    if parsed.calls.len() < max_calls {
                        parsed.calls.push(directive);
                    } else {
                        parsed.ignored += 1;
                    }
                    consumed
                }
                Err(reason) => {
                    parsed.malformed.push(MalformedDirective {
                        raw: line[at..].trim().to_string(),
                        reason,
                    });
                    line.len() - at - DIRECTIVE_MARKER.len()
                }
            };
            rest = &from_marker[consumed..];
            continue;
        }

        if let Some(at) = line.find(CONFIDENCE_MARKER) {
            if let Some(value) = parse_confidence_value(&line[at + CONFIDENCE_MARKER.len()..]) {
                parsed.confidence = Some(value);
                let before = line[..at].trim_end();
                if !before.is_empty() {
                    answer_lines.push(before);
                }
                rest = tail;
                continue;
            }
        }

        answer_lines.push(line);
        rest = tail;
    }

    parsed.answer = answer_lines
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    parsed
}

/// `0.85`, `85%`, `9/10`, or a whole number `2..=100` (taken as a
/// percentage). Anything outside `[0, 1]` is not a confidence.
pub fn parse_confidence_value(text: &str) -> Option<f32> {
    let token: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | '%' | '/'))
        .collect();
    let token = token.trim_end_matches('.');

    let value = if let Some(number) = token.strip_suffix('%') {
        decimal(number)? / 100.0
    } else if let Some((numerator, denominator)) = token.split_once('/') {
        let denominator = decimal(denominator)?;
        if denominator <= 0.0 {
            return None;
        }
        decimal(numerator)? / denominator
    } else if token.contains('.') {
        decimal(token)?
    } else {
        let whole: u32 = token.parse().ok()?;
        if (2..=100).contains(&whole) {
            whole as f32 / 100.0
        } else {
            whole as f32
        }
    };
    (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(value)
}

fn decimal(text: &str) -> Option<f32> {
    text.trim_end_matches('.').parse().ok()
}

/// Whether the answer asks the user something.
pub fn is_question(answer: &str) -> bool {
    answer.trim_end().ends_with('?')
}

// ── Directive grammar ─────────────────────────────────────────────────────

/// Parse `name(args)` at the start of `input` (after the marker). Returns
/// the directive and the number of bytes consumed.
fn parse_directive(input: &str) -> Result<(ToolDirective, usize), String> {
    let mut cursor = Cursor::new(input);
    cursor.skip_inline_space();

    let name = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() {
        return Err("missing tool name".into());
    }
    cursor.skip_inline_space();
    if !cursor.eat('(') {
        return Err(format!("expected '(' after '{name}'"));
    }
    cursor.skip_space();

    let params = if cursor.peek() == Some('{') {
        let value = cursor.json_object()?;
        cursor.skip_space();
        value
    } else {
        Value::Object(cursor.key_values()?)
    };

    if !cursor.eat(')') {
        return Err("expected ')' to close the argument list".into());
    }

    Ok((
        ToolDirective {
            name: name.to_string(),
            params,
        },
        cursor.pos,
    ))
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        let input: &'a str = self.input;
        &input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_inline_space(&mut self) {
        self.take_while(|c| c == ' ' || c == '\t');
    }

    fn skip_space(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn json_object(&mut self) -> Result<Value, String> {
        let mut stream = serde_json::Deserializer::from_str(self.rest()).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                self.pos += stream.byte_offset();
                Ok(value)
            }
            Some(Ok(_)) => Err("arguments must be a JSON object".into()),
            Some(Err(e)) => Err(format!("invalid JSON arguments: {e}")),
            None => Err("missing arguments".into()),
        }
    }

    fn key_values(&mut self) -> Result<Map<String, Value>, String> {
        let mut params = Map::new();
        loop {
            self.skip_space();
            if self.peek() == Some(')') || self.peek().is_none() {
                return Ok(params);
            }

            let key = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            if key.is_empty() {
                return Err(format!("expected a parameter name at '{}'", preview(self.rest())));
            }
            self.skip_space();
            if !self.eat('=') && !self.eat(':') {
                return Err(format!("expected '=' after '{key}'"));
            }
            self.skip_space();
            let value = self.value()?;
            params.insert(key.to_string(), value);

            self.skip_space();
            if !self.eat(',') {
                return Ok(params);
            }
        }
    }

    fn value(&mut self) -> Result<Value, String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                self.quoted(quote).map(Value::String)
            }
            Some(_) => {
                let raw = self.take_while(|c| !matches!(c, ',' | ')' | '\n')).trim();
                if raw.is_empty() {
                    return Err("empty parameter value".into());
                }
                Ok(bare_value(raw))
            }
            None => Err("unexpected end of directive".into()),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, String> {
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    self.pos += i + c.len_utf8();
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err("unterminated string".into())
    }
}

fn bare_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                return Value::Number(i.into());
            }
            raw.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string()))
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(20).collect()
}
