use super::{
    default_split, mask_source, matching_close, prepare_arguments, split_params, AdapterError,
    CommentStyle, EntryPoint, Invocation, LanguageAdapter, Parameter, Receiver, SourceFile,
    ERROR_MARKER, RESULT_MARKER,
};
use grader_common::Language;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref DEF: Regex = Regex::new(r"(?m)^(?:async[ \t]+)?def[ \t]+solution[ \t]*\(").unwrap();
    static ref LAMBDA: Regex =
        Regex::new(r"(?m)^solution[ \t]*(?::[^=\n]*)?=[ \t]*lambda\b([^:\n]*):").unwrap();
}

pub struct PythonAdapter;

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extract_entry_point(&self, source_code: &str) -> Result<EntryPoint, AdapterError> {
        let masked = mask_source(source_code, CommentStyle::Hash);
        let mut candidates = Vec::new();

        for m in DEF.find_iter(&masked) {
            let open = m.end() - 1;
            if let Some(close) = matching_close(&masked, open) {
                candidates.push(parse_params(&masked[open + 1..close]));
            }
        }
        for caps in LAMBDA.captures_iter(&masked) {
            let list = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            candidates.push(parse_params(list));
        }

        if candidates.len() != 1 {
            return Err(AdapterError::EntryPointNotFound);
        }

        Ok(EntryPoint {
            language: Language::Python,
            parameters: candidates.remove(0),
            return_type: None,
            receiver: Receiver::Free,
            source: source_code.to_string(),
        })
    }

    fn invoke(&self, entry_point: &EntryPoint, input: &Value) -> Result<Invocation, AdapterError> {
        let args = prepare_arguments(entry_point, input)?;

        Ok(Invocation {
            language: Language::Python,
            files: vec![
                SourceFile::new("solution.py", entry_point.source.clone()),
                SourceFile::new("runner.py", runner()),
            ],
            stdin: Value::Array(args).to_string(),
        })
    }
}

/// Positional parameters only: `/` is skipped, `*` and `*args` end the positional section
fn parse_params(list: &str) -> Vec<Parameter> {
    let mut params = Vec::new();

    for raw in split_params(list, false) {
        if raw == "/" {
            continue;
        }
        if raw.starts_with("**") || raw == "*" {
            break;
        }
        if let Some(rest) = raw.strip_prefix('*') {
            params.push(Parameter::untyped(annotation_free(rest), false, true));
            break;
        }
        match default_split(&raw) {
            Some(eq) => params.push(Parameter::untyped(annotation_free(&raw[..eq]), true, false)),
            None => params.push(Parameter::untyped(annotation_free(&raw), false, false)),
        }
    }

    params
}

fn annotation_free(param: &str) -> &str {
    param.split(':').next().unwrap_or(param).trim()
}

fn runner() -> String {
    format!(
        r#"import asyncio
import inspect
import json
import math
import sys

sys.setrecursionlimit(10000)

RESULT_MARKER = "{result}"
ERROR_MARKER = "{error}"


def _normalize(value):
    if isinstance(value, dict):
        return {{str(k) if not isinstance(k, str) else k: _normalize(v) for k, v in value.items()}}
    if isinstance(value, (list, tuple)):
        return [_normalize(v) for v in value]
    if isinstance(value, (set, frozenset)):
        items = [_normalize(v) for v in value]
        try:
            return sorted(items)
        except TypeError:
            return items
    if isinstance(value, float) and (math.isnan(value) or math.isinf(value)):
        return None
    return value


def _fallback(value):
    if hasattr(value, "__dict__"):
        return _normalize(vars(value))
    return str(value)


def main():
    args = json.loads(sys.stdin.read())
    try:
        import solution as candidate

        result = candidate.solution(*args)
        if inspect.isawaitable(result):
            result = asyncio.run(result)
        payload = json.dumps(_normalize(result), default=_fallback, allow_nan=False)
    except BaseException as exc:
        text = str(exc).splitlines()
        line = type(exc).__name__ + (": " + text[0] if text else "")
        sys.stderr.write(ERROR_MARKER + line + "\n")
        sys.stderr.flush()
        sys.exit(1)
    sys.stdout.write(RESULT_MARKER + payload + "\n")
    sys.stdout.flush()


main()
"#,
        result = RESULT_MARKER,
        error = ERROR_MARKER,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(source: &str) -> Result<EntryPoint, AdapterError> {
        PythonAdapter.extract_entry_point(source)
    }

    #[test]
    fn test_top_level_def() {
        let entry = extract("def solution(a, b):\n    return a + b\n").unwrap();
        let names: Vec<&str> = entry.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(entry.arity().min, 2);
    }

    #[test]
    fn test_annotations_defaults_and_star_args() {
        let source = "def solution(xs: list[int], k: int = 1, *rest, flag=False, **kw) -> int:\n    pass\n";
        let entry = extract(source).unwrap();
        let names: Vec<&str> = entry.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["xs", "k", "rest"]);
        assert_eq!(entry.arity().min, 1);
        assert_eq!(entry.arity().max, None);
    }

    #[test]
    fn test_keyword_only_parameters_are_not_positional() {
        let entry = extract("def solution(a, /, b, *, c=3):\n    pass\n").unwrap();
        assert_eq!(entry.parameters.len(), 2);
        assert_eq!(entry.arity().max, Some(2));
    }

    #[test]
    fn test_lambda_and_async_def() {
        let entry = extract("solution = lambda x, y=2: x * y\n").unwrap();
        assert_eq!(entry.arity().min, 1);
        assert_eq!(entry.arity().max, Some(2));

        let entry = extract("async def solution():\n    return 1\n").unwrap();
        assert_eq!(entry.arity().max, Some(0));
    }

    #[test]
    fn test_nested_and_commented_defs_are_ignored() {
        let source = "class A:\n    def solution(self, x):\n        return x\n# def solution(y):\n";
        assert_eq!(extract(source), Err(AdapterError::EntryPointNotFound));

        let source = "def solution(a):\n    return a\n\ndef solution(a, b):\n    return b\n";
        assert_eq!(extract(source), Err(AdapterError::EntryPointNotFound));
    }

    #[test]
    fn test_invoke_writes_module_and_runner() {
        let entry = extract("def solution(a, b):\n    return a + b\n").unwrap();
        let invocation = PythonAdapter.invoke(&entry, &json!([2, 3])).unwrap();

        assert_eq!(invocation.stdin, "[2,3]");
        let names: Vec<&str> = invocation.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["solution.py", "runner.py"]);
        assert!(invocation.files[1].contents.contains("import solution as candidate"));
    }

    #[test]
    fn test_invoke_rejects_wrong_arity() {
        let entry = extract("def solution(a, b):\n    return a + b\n").unwrap();
        let err = PythonAdapter.invoke(&entry, &json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.to_string(), "expected an array of 2 arguments, got an array of 3 elements");
    }
}
