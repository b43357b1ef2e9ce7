use super::{
    default_split, mask_source, matching_close, prepare_arguments, split_params, AdapterError,
    CommentStyle, EntryPoint, Invocation, LanguageAdapter, Parameter, Receiver, SourceFile,
    ERROR_MARKER, RESULT_MARKER,
};
use grader_common::Language;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

lazy_static! {
    static ref FUNCTION_DECL: Regex =
        Regex::new(r"(?:^|[^\w$.])(?:async\s+)?function\s*\*?\s*solution\s*\(").unwrap();
    static ref FUNCTION_EXPR: Regex = Regex::new(
        r"(?:^|[^\w$.])(?:const|let|var)\s+solution\s*=\s*(?:async\s+)?function\b\s*\*?\s*(?:[A-Za-z_$][\w$]*)?\s*\("
    )
    .unwrap();
    static ref ARROW_PARENS: Regex =
        Regex::new(r"(?:^|[^\w$.])(?:const|let|var)\s+solution\s*=\s*(?:async\s*)?\(").unwrap();
    static ref ARROW_SINGLE: Regex = Regex::new(
        r"(?:^|[^\w$.])(?:const|let|var)\s+solution\s*=\s*(?:async\s+)?([A-Za-z_$][\w$]*)\s*=>"
    )
    .unwrap();
    static ref ARROW_TAIL: Regex = Regex::new(r"^\s*=>").unwrap();
}

pub struct JavaScriptAdapter;

impl LanguageAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn extract_entry_point(&self, source_code: &str) -> Result<EntryPoint, AdapterError> {
        let masked = mask_source(source_code, CommentStyle::CFamily);
        // keyed by the offset of the parameter list so `= function solution(` counts once
        let mut candidates: BTreeMap<usize, Vec<Parameter>> = BTreeMap::new();

        for pattern in [&*FUNCTION_DECL, &*FUNCTION_EXPR] {
            for m in pattern.find_iter(&masked) {
                let open = m.end() - 1;
                if let Some(close) = matching_close(&masked, open) {
                    candidates.insert(open, parse_params(&masked[open + 1..close]));
                }
            }
        }

        for m in ARROW_PARENS.find_iter(&masked) {
            let open = m.end() - 1;
            if let Some(close) = matching_close(&masked, open) {
                if ARROW_TAIL.is_match(&masked[close + 1..]) {
                    candidates.insert(open, parse_params(&masked[open + 1..close]));
                }
            }
        }

        for caps in ARROW_SINGLE.captures_iter(&masked) {
            if let Some(name) = caps.get(1) {
                candidates.insert(
                    name.start(),
                    vec![Parameter::untyped(name.as_str(), false, false)],
                );
            }
        }

        if candidates.len() != 1 {
            return Err(AdapterError::EntryPointNotFound);
        }
        let parameters = candidates.into_values().next().unwrap_or_default();

        Ok(EntryPoint {
            language: Language::JavaScript,
            parameters,
            return_type: None,
            receiver: Receiver::Free,
            source: source_code.to_string(),
        })
    }

    fn invoke(&self, entry_point: &EntryPoint, input: &Value) -> Result<Invocation, AdapterError> {
        let args = prepare_arguments(entry_point, input)?;

        Ok(Invocation {
            language: Language::JavaScript,
            files: vec![SourceFile::new("main.js", harness(&entry_point.source))],
            stdin: Value::Array(args).to_string(),
        })
    }
}

fn parse_params(list: &str) -> Vec<Parameter> {
    split_params(list, false)
        .iter()
        .map(|raw| {
            let (variadic, rest) = match raw.strip_prefix("...") {
                Some(rest) => (true, rest.trim()),
                None => (false, raw.as_str()),
            };
            match default_split(rest) {
                Some(eq) => Parameter::untyped(rest[..eq].trim(), true, variadic),
                None => Parameter::untyped(rest, false, variadic),
            }
        })
        .collect()
}

/// main.js: the candidate is loaded inside a function so load-time throws are reported too
fn harness(source: &str) -> String {
    format!(
        r#"function __graderLoad() {{
{source}
;return solution;
}}

(async () => {{
  const __graderNormalize = (_key, value) => {{
    if (typeof value === "bigint") {{
      return Number.isSafeInteger(Number(value)) ? Number(value) : value.toString();
    }}
    if (value instanceof Map) return Object.fromEntries(value);
    if (value instanceof Set) return Array.from(value);
    if (value === undefined) return null;
    return value;
  }};
  try {{
    const args = JSON.parse(require("fs").readFileSync(0, "utf8"));
    const candidate = __graderLoad();
    const value = await Promise.resolve(candidate(...args));
    const encoded = JSON.stringify(value, __graderNormalize);
    process.stdout.write("{result}" + (encoded === undefined ? "null" : encoded) + "\n");
    process.exit(0);
  }} catch (err) {{
    const name = err && err.name ? err.name : "Error";
    const message = err && err.message !== undefined ? String(err.message) : String(err);
    process.stderr.write("{error}" + (name + ": " + message).split("\n")[0] + "\n");
    process.exit(1);
  }}
}})();
"#,
        source = source,
        result = RESULT_MARKER,
        error = ERROR_MARKER,
    )
}
