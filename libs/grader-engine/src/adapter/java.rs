use super::{
    is_identifier, mask_source, matching_close, prepare_arguments, scopes_at, split_params,
    statement_start, AdapterError, CommentStyle, EntryPoint, Invocation, LanguageAdapter,
    Parameter, Receiver, Scope, SourceFile, ERROR_MARKER, RESULT_MARKER,
};
use grader_common::Language;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::cmp::Reverse;

/// Class generated around a bare method submitted without one
const WRAPPER_CLASS: &str = "GraderSolution";
const TYPE_KEYWORDS: &[&str] = &["class", "interface", "enum", "record"];
const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "protected",
    "static",
    "final",
    "synchronized",
    "abstract",
    "native",
    "strictfp",
    "default",
];
const NOT_TYPES: &[&str] = &["return", "new", "throw", "else", "case", "yield", "assert"];

lazy_static! {
    static ref SOLUTION_CALL: Regex = Regex::new(r"\bsolution\s*\(").unwrap();
    static ref BODY_FOLLOWS: Regex = Regex::new(r"^\s*(?:throws\b[^{;]*)?\{").unwrap();
    static ref ANNOTATION: Regex = Regex::new(r"@[\w.]+(?:\s*\([^)]*\))?").unwrap();
    static ref PACKAGE: Regex = Regex::new(r"(?m)^[ \t]*package\s+[\w.]+\s*;").unwrap();
    static ref IMPORT: Regex =
        Regex::new(r"(?m)^[ \t]*import\s+(?:static\s+)?[\w.]+(?:\.\*)?\s*;").unwrap();
    static ref PUBLIC_TYPE: Regex = Regex::new(
        r"\bpublic\s+((?:(?:final|abstract|static|sealed|strictfp)\s+)*(?:class|interface|enum|record)\b)"
    )
    .unwrap();
}

pub struct JavaAdapter;

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn extract_entry_point(&self, source_code: &str) -> Result<EntryPoint, AdapterError> {
        let masked = mask_source(source_code, CommentStyle::CFamily);
        let mut found = Vec::new();

        for m in SOLUTION_CALL.find_iter(&masked) {
            if let Some(method) = method_at(&masked, m.start(), m.end() - 1) {
                found.push(method);
            }
        }

        if found.len() != 1 {
            return Err(AdapterError::EntryPointNotFound);
        }
        let method = found.remove(0);

        let wrap = method.owner_path.is_empty();
        let owner = if wrap {
            WRAPPER_CLASS.to_string()
        } else {
            method.owner_path.join(".")
        };
        let receiver = if method.is_static {
            Receiver::Static(owner)
        } else {
            Receiver::Instance(owner)
        };

        Ok(EntryPoint {
            language: Language::Java,
            parameters: method.parameters,
            return_type: Some(method.return_type),
            receiver,
            source: prepare_source(source_code, &masked, wrap),
        })
    }

    fn invoke(&self, entry_point: &EntryPoint, input: &Value) -> Result<Invocation, AdapterError> {
        let args = prepare_arguments(entry_point, input)?;

        let mut accessors = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let declared = declared_type_at(&entry_point.parameters, i)?;
            let ty = JavaType::parse(declared)?;
            // one method per argument keeps each literal under the bytecode size limit
            accessors.push(format!(
                "    static {} arg{}() {{\n        return {};\n    }}\n",
                ty.name(),
                i,
                ty.literal(arg)?
            ));
        }

        let call_args: Vec<String> = (0..args.len()).map(|i| format!("arg{}()", i)).collect();
        let target = match &entry_point.receiver {
            Receiver::Static(owner) => owner.clone(),
            Receiver::Instance(owner) => format!("new {}()", owner),
            Receiver::Free => WRAPPER_CLASS.to_string(),
        };
        let call = format!("{}.solution({})", target, call_args.join(", "));
        let returns_void = entry_point.return_type.as_deref() == Some("void");
        let invoke_line = if returns_void {
            format!("{};\n            Object result = null;", call)
        } else {
            format!("Object result = {};", call)
        };

        let main_java = format!(
            "{source}\n\nclass GraderMain {{\n{accessors}\n    public static void main(String[] args) {{\n        try {{\n            {invoke}\n            StringBuilder out = new StringBuilder();\n            emit(out, result);\n            System.out.println(\"{marker}\" + out);\n            System.out.flush();\n            System.exit(0);\n        }} catch (Throwable t) {{\n            String message = t.getMessage();\n            String line = t.getClass().getSimpleName() + (message == null ? \"\" : \": \" + message.split(\"\\n\")[0]);\n            System.err.println(\"{error}\" + line);\n            System.err.flush();\n            System.exit(1);\n        }}\n    }}\n{emitter}}}\n",
            source = entry_point.source,
            accessors = accessors.concat(),
            invoke = invoke_line,
            marker = RESULT_MARKER,
            error = ERROR_MARKER,
            emitter = EMITTER,
        );

        Ok(Invocation {
            language: Language::Java,
            files: vec![SourceFile::new("Main.java", main_java)],
            stdin: String::new(),
        })
    }
}

struct MethodDecl {
    owner_path: Vec<String>,
    is_static: bool,
    return_type: String,
    parameters: Vec<Parameter>,
}

/// Accept a `solution(` occurrence only when it declares a method with a body
fn method_at(masked: &str, name_start: usize, open: usize) -> Option<MethodDecl> {
    let close = matching_close(masked, open)?;
    if !BODY_FOLLOWS.is_match(&masked[close + 1..]) {
        return None;
    }

    let start = statement_start(masked, name_start);
    let header = ANNOTATION.replace_all(&masked[start..name_start], " ");
    let header = compact_type_spacing(&header);
    let tokens: Vec<&str> = header.split_whitespace().collect();
    let (return_type, modifiers) = tokens.split_last()?;
    if !is_type_token(return_type) {
        return None;
    }
    if modifiers
        .iter()
        .any(|t| !MODIFIERS.contains(t) && !t.starts_with('<'))
    {
        return None;
    }

    let mut owner_path = Vec::new();
    for scope in scopes_at(masked, name_start, TYPE_KEYWORDS) {
        match scope {
            Scope::Type(name) => owner_path.push(name),
            _ => return None,
        }
    }

    Some(MethodDecl {
        owner_path,
        is_static: modifiers.contains(&"static"),
        return_type: return_type.to_string(),
        parameters: parse_params(&masked[open + 1..close])?,
    })
}

fn is_type_token(token: &str) -> bool {
    let first_ok = token
        .chars()
        .next()
        .map_or(false, |c| c.is_alphabetic() || c == '_' || c == '$');
    first_ok
        && !NOT_TYPES.contains(&token)
        && token
            .chars()
            .all(|c| c.is_alphanumeric() || "_$.<>[],?".contains(c))
}

fn parse_params(list: &str) -> Option<Vec<Parameter>> {
    split_params(list, true)
        .iter()
        .map(|raw| {
            let cleaned = ANNOTATION.replace_all(raw, " ").replace("...", "... ");
            let cleaned = compact_type_spacing(&cleaned);
            let mut tokens: Vec<&str> = cleaned
                .split_whitespace()
                .filter(|t| *t != "final")
                .collect();
            let mut name = tokens.pop()?.to_string();
            let mut ty = tokens.pop()?.to_string();
            if !tokens.is_empty() {
                return None;
            }
            // C-style `int xs[]`
            while let Some(stripped) = name.strip_suffix("[]") {
                name = stripped.to_string();
                ty.push_str("[]");
            }
            let variadic = ty.ends_with("...");
            if variadic {
                ty.truncate(ty.len() - 3);
            }
            if !is_identifier(&name) {
                return None;
            }
            Some(Parameter {
                name,
                declared_type: Some(ty),
                has_default: false,
                variadic,
            })
        })
        .collect()
}

/// Drop whitespace inside generic brackets and before `<`, `[`, `]`, `.`
fn compact_type_spacing(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        let keep_space = pending_space
            && depth == 0
            && !matches!(c, '<' | '[' | ']' | '.' | ',' | '>')
            && !out.ends_with('<')
            && !out.ends_with('[');
        if keep_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Strip `package`, demote top-level `public` types, and wrap a bare method in a class
fn prepare_source(source: &str, masked: &str, wrap: bool) -> String {
    let mut removals: Vec<(usize, usize)> = Vec::new();
    let mut imports = Vec::new();

    for m in PACKAGE.find_iter(masked) {
        removals.push((m.start(), m.end()));
    }
    for caps in PUBLIC_TYPE.captures_iter(masked) {
        if let (Some(whole), Some(kind)) = (caps.get(0), caps.get(1)) {
            if scopes_at(masked, whole.start(), TYPE_KEYWORDS).is_empty() {
                removals.push((whole.start(), kind.start()));
            }
        }
    }
    if wrap {
        for m in IMPORT.find_iter(masked) {
            imports.push(source[m.start()..m.end()].trim().to_string());
            removals.push((m.start(), m.end()));
        }
    }

    removals.sort_by_key(|(start, _)| Reverse(*start));
    let mut body = source.to_string();
    for (start, end) in removals {
        body.replace_range(start..end, "");
    }

    if wrap {
        format!(
            "{}\n\nclass {} {{\n{}\n}}\n",
            imports.join("\n"),
            WRAPPER_CLASS,
            body
        )
    } else {
        body
    }
}

fn declared_type_at(parameters: &[Parameter], index: usize) -> Result<&str, AdapterError> {
    let param = parameters
        .get(index)
        .or_else(|| parameters.last().filter(|p| p.variadic))
        .ok_or(AdapterError::EntryPointNotFound)?;
    param
        .declared_type
        .as_deref()
        .ok_or_else(|| AdapterError::UnsupportedType(param.name.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Int,
    Long,
    Short,
    Byte,
    Double,
    Float,
    Boolean,
    Char,
}

impl Primitive {
    fn keyword(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Short => "short",
            Primitive::Byte => "byte",
            Primitive::Double => "double",
            Primitive::Float => "float",
            Primitive::Boolean => "boolean",
            Primitive::Char => "char",
        }
    }

    fn boxed(self) -> &'static str {
        match self {
            Primitive::Int => "Integer",
            Primitive::Long => "Long",
            Primitive::Short => "Short",
            Primitive::Byte => "Byte",
            Primitive::Double => "Double",
            Primitive::Float => "Float",
            Primitive::Boolean => "Boolean",
            Primitive::Char => "Character",
        }
    }

    fn literal(self, value: &Value) -> Option<String> {
        match self {
            Primitive::Int => integral(value)
                .filter(|n| i32::try_from(*n).is_ok())
                .map(|n| n.to_string()),
            Primitive::Long => integral(value).map(|n| format!("{}L", n)),
            Primitive::Short => integral(value)
                .filter(|n| i16::try_from(*n).is_ok())
                .map(|n| format!("(short) {}", n)),
            Primitive::Byte => integral(value)
                .filter(|n| i8::try_from(*n).is_ok())
                .map(|n| format!("(byte) {}", n)),
            Primitive::Double => value.as_f64().map(|f| format!("{:?}", f)),
            Primitive::Float => value
                .as_f64()
                .map(|f| f as f32)
                .filter(|f| f.is_finite())
                .map(|f| format!("{:?}f", f)),
            Primitive::Boolean => value.as_bool().map(|b| b.to_string()),
            Primitive::Char => single_char(value)
                .filter(|c| (*c as u32) <= 0xFFFF)
                .map(|c| format!("(char) {}", c as u32)),
        }
    }
}

/// Declared parameter types the harness can build literals for
#[derive(Debug, Clone, PartialEq, Eq)]
enum JavaType {
    Primitive(Primitive),
    Boxed(Primitive),
    Str,
    Array(Box<JavaType>),
    List(Box<JavaType>),
}

impl JavaType {
    fn parse(text: &str) -> Result<Self, AdapterError> {
        let text = text.trim();
        let unsupported = || AdapterError::UnsupportedType(text.to_string());

        if let Some(inner) = text.strip_suffix("[]") {
            return match Self::parse(inner)? {
                JavaType::List(_) => Err(unsupported()),
                elem => Ok(JavaType::Array(Box::new(elem))),
            };
        }

        if let Some(open) = text.find('<') {
            let base = text[..open].rsplit('.').next().unwrap_or_default();
            let inner = text[open + 1..].strip_suffix('>').ok_or_else(unsupported)?;
            if !matches!(base, "List" | "ArrayList" | "Collection" | "Iterable") {
                return Err(unsupported());
            }
            return match Self::parse(inner)? {
                JavaType::Primitive(_) => Err(unsupported()),
                elem => Ok(JavaType::List(Box::new(elem))),
            };
        }

        let simple = text.strip_prefix("java.lang.").unwrap_or(text);
        let ty = match simple {
            "int" => JavaType::Primitive(Primitive::Int),
            "long" => JavaType::Primitive(Primitive::Long),
            "short" => JavaType::Primitive(Primitive::Short),
            "byte" => JavaType::Primitive(Primitive::Byte),
            "double" => JavaType::Primitive(Primitive::Double),
            "float" => JavaType::Primitive(Primitive::Float),
            "boolean" => JavaType::Primitive(Primitive::Boolean),
            "char" => JavaType::Primitive(Primitive::Char),
            "Integer" => JavaType::Boxed(Primitive::Int),
            "Long" => JavaType::Boxed(Primitive::Long),
            "Short" => JavaType::Boxed(Primitive::Short),
            "Byte" => JavaType::Boxed(Primitive::Byte),
            "Double" => JavaType::Boxed(Primitive::Double),
            "Float" => JavaType::Boxed(Primitive::Float),
            "Boolean" => JavaType::Boxed(Primitive::Boolean),
            "Character" => JavaType::Boxed(Primitive::Char),
            "String" => JavaType::Str,
            _ => return Err(unsupported()),
        };
        Ok(ty)
    }

    fn name(&self) -> String {
        match self {
            JavaType::Primitive(p) => p.keyword().to_string(),
            JavaType::Boxed(p) => p.boxed().to_string(),
            JavaType::Str => "String".to_string(),
            JavaType::Array(elem) => format!("{}[]", elem.name()),
            JavaType::List(elem) => format!("java.util.List<{}>", elem.name()),
        }
    }

    fn literal(&self, value: &Value) -> Result<String, AdapterError> {
        let mismatch = || AdapterError::type_mismatch(value, &self.name());

        match self {
            JavaType::Primitive(p) => p.literal(value).ok_or_else(mismatch),
            JavaType::Boxed(p) if value.is_null() => Ok(format!("({}) null", p.boxed())),
            JavaType::Boxed(p) => p
                .literal(value)
                .map(|lit| format!("{}.valueOf({})", p.boxed(), lit))
                .ok_or_else(mismatch),
            _ if value.is_null() => Ok(format!("({}) null", self.name())),
            JavaType::Str => value.as_str().map(java_string).ok_or_else(mismatch),
            JavaType::Array(elem) => {
                let items = value.as_array().ok_or_else(mismatch)?;
                let parts = items
                    .iter()
                    .map(|item| elem.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("new {}{{{}}}", self.name(), parts.join(", ")))
            }
            JavaType::List(elem) => {
                let items = value.as_array().ok_or_else(mismatch)?;
                let elem_name = elem.name();
                if items.is_empty() {
                    return Ok(format!("new java.util.ArrayList<{}>()", elem_name));
                }
                let parts = items
                    .iter()
                    .map(|item| elem.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!(
                    "new java.util.ArrayList<{0}>(java.util.Arrays.<{0}>asList({1}))",
                    elem_name,
                    parts.join(", ")
                ))
            }
        }
    }
}

/// Integers, or floats with no fractional part inside the exact range
fn integral(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0)
            .map(|f| f as i64)
    })
}

fn single_char(value: &Value) -> Option<char> {
    let s = value.as_str()?;
    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

/// Java string literal; control characters use octal escapes and non-ASCII uses UTF-16 `\u` escapes
fn java_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c if c.is_ascii() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
    out
}

const EMITTER: &str = r#"
    private static void emit(StringBuilder out, Object value) {
        if (value == null) {
            out.append("null");
        } else if (value instanceof Double || value instanceof Float) {
            double d = ((Number) value).doubleValue();
            if (Double.isNaN(d) || Double.isInfinite(d)) {
                out.append("null");
            } else {
                out.append(d);
            }
        } else if (value instanceof Number || value instanceof Boolean) {
            out.append(value);
        } else if (value instanceof Character || value instanceof CharSequence) {
            quote(out, value.toString());
        } else if (value.getClass().isArray()) {
            int length = java.lang.reflect.Array.getLength(value);
            out.append('[');
            for (int i = 0; i < length; i++) {
                if (i > 0) out.append(',');
                emit(out, java.lang.reflect.Array.get(value, i));
            }
            out.append(']');
        } else if (value instanceof java.util.Map) {
            out.append('{');
            boolean first = true;
            for (Object entry : ((java.util.Map<?, ?>) value).entrySet()) {
                java.util.Map.Entry<?, ?> e = (java.util.Map.Entry<?, ?>) entry;
                if (!first) out.append(',');
                first = false;
                quote(out, String.valueOf(e.getKey()));
                out.append(':');
                emit(out, e.getValue());
            }
            out.append('}');
        } else if (value instanceof Iterable) {
            out.append('[');
            boolean first = true;
            for (Object item : (Iterable<?>) value) {
                if (!first) out.append(',');
                first = false;
                emit(out, item);
            }
            out.append(']');
        } else if (value instanceof java.util.Optional) {
            emit(out, ((java.util.Optional<?>) value).orElse(null));
        } else {
            quote(out, value.toString());
        }
    }

    private static void quote(StringBuilder out, String s) {
        out.append('"');
        for (int i = 0; i < s.length(); i++) {
            char c = s.charAt(i);
            switch (c) {
                case '"': out.append("\\\""); break;
                case '\\': out.append("\\\\"); break;
                case '\n': out.append("\\n"); break;
                case '\r': out.append("\\r"); break;
                case '\t': out.append("\\t"); break;
                default:
                    if (c < 0x20 || c > 0x7e) {
                        out.append(String.format("\\u%04x", (int) c));
                    } else {
                        out.append(c);
                    }
            }
        }
        out.append('"');
    }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(source: &str) -> Result<EntryPoint, AdapterError> {
        JavaAdapter.extract_entry_point(source)
    }

    fn main_java(entry: &EntryPoint, input: Value) -> String {
        let invocation = JavaAdapter.invoke(entry, &input).unwrap();
        assert_eq!(invocation.files[0].name, "Main.java");
        invocation.files[0].contents.clone()
    }

    #[test]
    fn test_static_method_in_public_class() {
        let source = "import java.util.*;\n\npublic class Solution {\n    public static int solution(int[] nums, int k) {\n        return nums.length + k;\n    }\n}\n";
        let entry = extract(source).unwrap();

        assert_eq!(entry.receiver, Receiver::Static("Solution".to_string()));
        assert_eq!(entry.return_type.as_deref(), Some("int"));
        let types: Vec<&str> = entry
            .parameters
            .iter()
            .filter_map(|p| p.declared_type.as_deref())
            .collect();
        assert_eq!(types, vec!["int[]", "int"]);
        assert!(entry.source.contains("\nclass Solution {"));
        assert!(!entry.source.contains("public class"));
    }

    #[test]
    fn test_instance_method_and_generic_return() {
        let source = "class Solution {\n    @Override\n    public List < Integer > solution(List<Integer> xs) { return xs; }\n    int helper() { return solution(null).size(); }\n}";
        let entry = extract(source).unwrap();
        assert_eq!(entry.receiver, Receiver::Instance("Solution".to_string()));
        assert_eq!(entry.return_type.as_deref(), Some("List<Integer>"));
        assert_eq!(
            entry.parameters[0].declared_type.as_deref(),
            Some("List<Integer>")
        );
    }

    #[test]
    fn test_bare_method_is_wrapped() {
        let source = "import java.util.Arrays;\nstatic long solution(long a, long b) { return a + b; }";
        let entry = extract(source).unwrap();
        assert_eq!(entry.receiver, Receiver::Static(WRAPPER_CLASS.to_string()));
        assert!(entry.source.starts_with("import java.util.Arrays;"));
        assert!(entry.source.contains("class GraderSolution {"));
    }

    #[test]
    fn test_missing_or_duplicate_method() {
        assert_eq!(
            extract("class A { int answer(int x) { return x; } }"),
            Err(AdapterError::EntryPointNotFound)
        );
        assert_eq!(
            extract("class A { int solution(int x) { return x; } int solution(String s) { return 0; } }"),
            Err(AdapterError::EntryPointNotFound)
        );
        assert_eq!(
            extract("class A { /* int solution(int x) { return x; } */ }"),
            Err(AdapterError::EntryPointNotFound)
        );
    }

    #[test]
    fn test_varargs_parameter() {
        let entry = extract("class A { static int solution(int... xs) { return xs.length; } }").unwrap();
        assert!(entry.parameters[0].variadic);
        assert_eq!(entry.parameters[0].declared_type.as_deref(), Some("int"));
        assert_eq!(entry.arity().max, None);
    }

    #[test]
    fn test_invoke_builds_typed_literals() {
        let source = "public class Solution { public static int solution(int[] nums, String s, List<Integer> xs, double d) { return 0; } }";
        let entry = extract(source).unwrap();
        let java = main_java(&entry, json!([[1, 2], "a\"b", [3], 2]));

        assert!(java.contains("static int[] arg0() {\n        return new int[]{1, 2};"));
        assert!(java.contains("return \"a\\\"b\";"));
        assert!(java.contains(
            "new java.util.ArrayList<Integer>(java.util.Arrays.<Integer>asList(Integer.valueOf(3)))"
        ));
        assert!(java.contains("return 2.0;"));
        assert!(java.contains("Object result = Solution.solution(arg0(), arg1(), arg2(), arg3());"));
        assert!(java.contains("class GraderMain"));
    }

    #[test]
    fn test_invoke_instance_void_method() {
        let entry = extract("class Solution { void solution(char c) { } }").unwrap();
        let java = main_java(&entry, json!("x"));
        assert!(java.contains("return (char) 120;"));
        assert!(java.contains("new Solution().solution(arg0());\n            Object result = null;"));
    }

    #[test]
    fn test_invoke_type_mismatch() {
        let entry = extract("class Solution { int solution(int n) { return n; } }").unwrap();
        let err = JavaAdapter.invoke(&entry, &json!("five")).unwrap_err();
        assert_eq!(err.to_string(), "cannot pass \"five\" as `int`");

        let err = JavaAdapter.invoke(&entry, &json!(3_000_000_000i64)).unwrap_err();
        assert!(matches!(err, AdapterError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unsupported_parameter_type() {
        let entry =
            extract("class Solution { int solution(Map<String, Integer> m) { return 0; } }").unwrap();
        let err = JavaAdapter.invoke(&entry, &json!({"a": 1})).unwrap_err();
        assert_eq!(err.to_string(), "unsupported parameter type `Map<String,Integer>`");
    }

    #[test]
    fn test_java_string_escapes() {
        assert_eq!(java_string("a\nb"), "\"a\\nb\"");
        assert_eq!(java_string("\u{1}"), "\"\\001\"");
        assert_eq!(java_string("é"), "\"\\u00e9\"");
        assert_eq!(java_string("😀"), "\"\\ud83d\\ude00\"");
    }
}
