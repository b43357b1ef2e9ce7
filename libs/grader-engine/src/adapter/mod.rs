/// Language Adapters - Entry Point Discovery and Invocation Building
///
/// **Core Responsibility:**
/// Locate the single callable named `solution` in submitted source and
/// describe how to call it with one test input.
///
/// **Critical Architectural Boundary:**
/// - Adapters only produce files and stdin for a sandbox
/// - Adapters never execute anything
/// - Adapters know nothing about scoring
///
/// Every harness prints the return value as one `RESULT_MARKER` line on
/// stdout; when the candidate throws it prints one `ERROR_MARKER` line on
/// stderr and exits with status 1.
pub mod cpp;
pub mod java;
pub mod javascript;
pub mod python;

use grader_common::types::MAX_TEST_INPUT_BYTES;
use grader_common::Language;
use serde_json::Value;
use thiserror::Error;

/// Prefix of the stdout line carrying the JSON-encoded return value
pub const RESULT_MARKER: &str = "__GRADER_RESULT__:";
/// Prefix of the stderr line carrying `Name: message` for a thrown error
pub const ERROR_MARKER: &str = "__GRADER_ERROR__:";

/// Closed set of adapter failures; `Display` is the user-visible message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("entry point not found")]
    EntryPointNotFound,

    #[error("expected an array of {expected} arguments, got {got}")]
    ArityMismatch { expected: String, got: String },

    #[error("unsupported parameter type `{0}`")]
    UnsupportedType(String),

    #[error("cannot pass {value} as `{declared}`")]
    TypeMismatch { value: String, declared: String },

    #[error("input exceeds maximum size of {0} bytes")]
    InputTooLarge(usize),
}

impl AdapterError {
    pub(crate) fn type_mismatch(value: &Value, declared: &str) -> Self {
        AdapterError::TypeMismatch {
            value: preview(value),
            declared: declared.to_string(),
        }
    }
}

/// One declared positional parameter of the entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Declared type, for statically typed languages
    pub declared_type: Option<String>,
    pub has_default: bool,
    pub variadic: bool,
}

impl Parameter {
    pub(crate) fn untyped(name: &str, has_default: bool, variadic: bool) -> Self {
        Self {
            name: name.to_string(),
            declared_type: None,
            has_default,
            variadic,
        }
    }
}

/// Accepted argument counts; `max == None` means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }

    fn describe(&self) -> String {
        match self.max {
            None => format!("at least {}", self.min),
            Some(max) if max == self.min => max.to_string(),
            Some(max) => format!("{} to {}", self.min, max),
        }
    }
}

/// How the harness reaches the entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// Free function (or a lambda/arrow bound to a name)
    Free,
    /// Static method called on its owning type
    Static(String),
    /// Instance method called on a default-constructed owner
    Instance(String),
}

/// The discovered callable plus the source the harness embeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub language: Language,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub receiver: Receiver,
    /// Candidate source after language-specific rewriting
    pub source: String,
}

impl EntryPoint {
    pub fn arity(&self) -> Arity {
        let min = self
            .parameters
            .iter()
            .take_while(|p| !p.variadic)
            .filter(|p| !p.has_default)
            .count();
        let max = if self.parameters.iter().any(|p| p.variadic) {
            None
        } else {
            Some(self.parameters.len())
        };
        Arity { min, max }
    }
}

/// A file to materialise in the sandbox workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub contents: String,
}

impl SourceFile {
    pub fn new(name: &str, contents: String) -> Self {
        Self {
            name: name.to_string(),
            contents,
        }
    }
}

/// Everything a sandbox needs to run one case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub language: Language,
    pub files: Vec<SourceFile>,
    pub stdin: String,
}

pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Find exactly one callable named `solution`
    fn extract_entry_point(&self, source_code: &str) -> Result<EntryPoint, AdapterError>;

    /// Build the harness that calls `entry_point` with `input`
    fn invoke(&self, entry_point: &EntryPoint, input: &Value) -> Result<Invocation, AdapterError>;
}

/// Resolve the adapter for a language
pub fn adapter_for(language: Language) -> &'static dyn LanguageAdapter {
    match language {
        Language::JavaScript => &javascript::JavaScriptAdapter,
        Language::Python => &python::PythonAdapter,
        Language::Java => &java::JavaAdapter,
        Language::Cpp => &cpp::CppAdapter,
    }
}

/// Check the input size, then shape it into positional arguments
pub(crate) fn prepare_arguments(
    entry_point: &EntryPoint,
    input: &Value,
) -> Result<Vec<Value>, AdapterError> {
    let size = serde_json::to_string(input).map(|s| s.len()).unwrap_or(0);
    if size > MAX_TEST_INPUT_BYTES {
        return Err(AdapterError::InputTooLarge(MAX_TEST_INPUT_BYTES));
    }
    shape_arguments(entry_point.arity(), input)
}

/// Map one test input onto positional arguments.
///
/// Rules apply in order: a zero-parameter entry point ignores the input; a
/// one-parameter entry point receives the whole input (arrays included); an
/// array whose length fits the arity is spread; a scalar is passed alone when
/// at most one argument is required; anything else is a mismatch.
pub fn shape_arguments(arity: Arity, input: &Value) -> Result<Vec<Value>, AdapterError> {
    if arity.max == Some(0) {
        return Ok(Vec::new());
    }
    if arity.max == Some(1) {
        return Ok(vec![input.clone()]);
    }

    match input {
        Value::Array(items) if arity.accepts(items.len()) => Ok(items.clone()),
        Value::Array(_) => Err(arity_mismatch(arity, input)),
        _ if arity.min <= 1 => Ok(vec![input.clone()]),
        _ => Err(arity_mismatch(arity, input)),
    }
}

fn arity_mismatch(arity: Arity, input: &Value) -> AdapterError {
    let got = match input {
        Value::Array(items) if items.len() == 1 => "an array of 1 element".to_string(),
        Value::Array(items) => format!("an array of {} elements", items.len()),
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Object(_) => "an object".to_string(),
    };
    AdapterError::ArityMismatch {
        expected: arity.describe(),
        got,
    }
}

/// Short JSON rendering for error messages
pub(crate) fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 40 {
        let cut: String = text.chars().take(37).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommentStyle {
    /// `//` and `/* */`, with `'`, `"` and backtick string literals
    CFamily,
    /// `#` line comments, with `'`/`"` strings and triple-quoted strings
    Hash,
}

/// Blank out comments and string literal contents, keeping byte offsets.
///
/// Quotes survive so literals stay recognisable; every masked character is
/// replaced by as many spaces as its UTF-8 width and newlines are kept, so
/// positions found in the masked text index the original source.
pub(crate) fn mask_source(source: &str, style: CommentStyle) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let line_comment = match style {
            CommentStyle::CFamily => c == '/' && next == Some('/'),
            CommentStyle::Hash => c == '#',
        };
        if line_comment {
            while i < chars.len() && chars[i] != '\n' {
                blank(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }

        if style == CommentStyle::CFamily && c == '/' && next == Some('*') {
            blank(&mut out, '/');
            blank(&mut out, '*');
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                blank(&mut out, chars[i]);
                i += 1;
            }
            if i < chars.len() {
                blank(&mut out, '*');
                blank(&mut out, '/');
                i += 2;
            }
            continue;
        }

        let is_quote = match style {
            CommentStyle::CFamily => matches!(c, '"' | '\'' | '`'),
            CommentStyle::Hash => matches!(c, '"' | '\''),
        };
        if !is_quote {
            out.push(c);
            i += 1;
            continue;
        }

        let triple = style == CommentStyle::Hash
            && chars.get(i + 1) == Some(&c)
            && chars.get(i + 2) == Some(&c);
        let width = if triple { 3 } else { 1 };
        for _ in 0..width {
            out.push(c);
        }
        i += width;

        while i < chars.len() {
            let ch = chars[i];
            if ch == '\\' {
                blank(&mut out, ch);
                if let Some(&escaped) = chars.get(i + 1) {
                    blank(&mut out, escaped);
                }
                i += 2;
                continue;
            }
            if triple {
                if ch == c && chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    out.push(c);
                    out.push(c);
                    out.push(c);
                    i += 3;
                    break;
                }
            } else if ch == c {
                out.push(c);
                i += 1;
                break;
            } else if ch == '\n' && c != '`' {
                // unterminated literal ends at the line
                break;
            }
            blank(&mut out, ch);
            i += 1;
        }
    }

    out
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    }
}

/// Byte index of the delimiter closing the one at `open`
pub(crate) fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (open_ch, close_ch) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };

    let mut depth = 0usize;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        if b == open_ch {
            depth += 1;
        } else if b == close_ch {
            depth -= 1;
            if depth == 0 {
                return Some(open + offset);
            }
        }
    }
    None
}

/// Split a parameter list at top-level commas
pub(crate) fn split_params(list: &str, angle_brackets: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in list.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            '<' if angle_brackets => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '>' if angle_brackets => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());

    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Position of the first top-level `=` that is an assignment (not `==`, `=>`, `<=`, `>=`, `!=`)
pub(crate) fn default_split(param: &str) -> Option<usize> {
    let bytes = param.as_bytes();
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'>' if i == 0 || bytes[i - 1] != b'=' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                let next = bytes.get(i + 1).copied().unwrap_or(b' ');
                if !matches!(prev, b'=' | b'!' | b'<' | b'>') && !matches!(next, b'=' | b'>') {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Enclosing block kinds, outermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scope {
    Type(String),
    Namespace(String),
    Block,
}

/// Scopes open at `pos`, reconstructed from braces in masked source
pub(crate) fn scopes_at(masked: &str, pos: usize, type_keywords: &[&str]) -> Vec<Scope> {
    let mut stack: Vec<Scope> = Vec::new();
    let mut header_start = 0;

    for (i, b) in masked.bytes().enumerate().take(pos) {
        match b {
            b'{' => {
                stack.push(classify_header(&masked[header_start..i], type_keywords));
                header_start = i + 1;
            }
            b'}' => {
                stack.pop();
                header_start = i + 1;
            }
            b';' => header_start = i + 1,
            _ => {}
        }
    }
    stack
}

fn classify_header(header: &str, type_keywords: &[&str]) -> Scope {
    let tokens: Vec<&str> = header
        .split(|c: char| c.is_whitespace() || c == ':' || c == '<' || c == '(')
        .filter(|t| !t.is_empty())
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if type_keywords.contains(token) {
            if let Some(name) = tokens.get(i + 1) {
                if is_identifier(name) {
                    return Scope::Type(name.to_string());
                }
            }
        }
        if *token == "namespace" {
            let name = tokens.get(i + 1).copied().unwrap_or("");
            return Scope::Namespace(name.to_string());
        }
    }
    Scope::Block
}

pub(crate) fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Start of the declaration that contains `pos` (after the previous `;`, `{` or `}`)
pub(crate) fn statement_start(masked: &str, pos: usize) -> usize {
    masked[..pos]
        .rfind(|c: char| c == ';' || c == '{' || c == '}')
        .map(|i| i + 1)
        .unwrap_or(0)
}
