use super::{
    default_split, mask_source, matching_close, prepare_arguments, scopes_at, split_params,
    statement_start, AdapterError, CommentStyle, EntryPoint, Invocation, LanguageAdapter,
    Parameter, Receiver, Scope, SourceFile, ERROR_MARKER, RESULT_MARKER,
};
use grader_common::Language;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

const TYPE_KEYWORDS: &[&str] = &["class", "struct"];
const SPECIFIERS: &[&str] = &[
    "static",
    "inline",
    "virtual",
    "constexpr",
    "explicit",
    "friend",
    "extern",
];
const NOT_TYPES: &[&str] = &["return", "new", "throw", "else", "case", "delete", "co_return"];
/// Trailing words that name a type rather than a parameter
const TYPE_WORDS: &[&str] = &[
    "int", "long", "short", "char", "bool", "double", "float", "unsigned", "signed", "auto",
];

lazy_static! {
    static ref SOLUTION_CALL: Regex = Regex::new(r"\bsolution\s*\(").unwrap();
    static ref BODY_FOLLOWS: Regex = Regex::new(
        r"^\s*(?:const\b\s*)?(?:noexcept\b\s*)?(?:override\b\s*)?(?:final\b\s*)?(?:->\s*[^{;]+)?\{"
    )
    .unwrap();
    static ref PREPROCESSOR: Regex = Regex::new(r"(?m)^[ \t]*#.*$").unwrap();
    static ref TEMPLATE_PREFIX: Regex = Regex::new(r"\btemplate\s*<[^{};]*?>").unwrap();
    static ref ACCESS_LABEL: Regex = Regex::new(r"\b(?:public|private|protected)\s*:").unwrap();
    static ref ATTRIBUTE: Regex = Regex::new(r"\[\[[^\]]*\]\]").unwrap();
    static ref QUALIFIED_OWNER: Regex = Regex::new(r"([A-Za-z_]\w*)\s*::\s*$").unwrap();
    static ref HEADER_CHARS: Regex = Regex::new(r"^[\w\s:<>,*&]+$").unwrap();
}

pub struct CppAdapter;

impl LanguageAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn extract_entry_point(&self, source_code: &str) -> Result<EntryPoint, AdapterError> {
        let masked = mask_source(source_code, CommentStyle::CFamily);
        let mut found: Vec<FunctionDecl> = SOLUTION_CALL
            .find_iter(&masked)
            .filter_map(|m| function_at(&masked, m.start(), m.end() - 1))
            .collect();

        if found.len() != 1 {
            return Err(AdapterError::EntryPointNotFound);
        }
        let function = found.remove(0);

        let path = function.path.join("::");
        let receiver = if function.member && !function.is_static {
            Receiver::Instance(path)
        } else if path.is_empty() {
            Receiver::Free
        } else {
            Receiver::Static(path)
        };

        Ok(EntryPoint {
            language: Language::Cpp,
            parameters: function.parameters,
            return_type: Some(function.return_type),
            receiver,
            source: source_code.to_string(),
        })
    }

    fn invoke(&self, entry_point: &EntryPoint, input: &Value) -> Result<Invocation, AdapterError> {
        let args = prepare_arguments(entry_point, input)?;

        let mut declarations = String::new();
        for (i, arg) in args.iter().enumerate() {
            let param = &entry_point.parameters[i.min(entry_point.parameters.len() - 1)];
            let declared = param
                .declared_type
                .as_deref()
                .ok_or_else(|| AdapterError::UnsupportedType(param.name.clone()))?;
            let ty = CppType::parse(declared)?;
            declarations.push_str(&format!(
                "        {} arg{} = {};\n",
                ty.spelling(),
                i,
                ty.literal(arg)?
            ));
        }

        let call_args: Vec<String> = (0..args.len()).map(|i| format!("arg{}", i)).collect();
        let target = match &entry_point.receiver {
            Receiver::Free => "solution".to_string(),
            Receiver::Static(path) => format!("{}::solution", path),
            Receiver::Instance(path) => format!("{}().solution", path),
        };
        let call = format!("{}({})", target, call_args.join(", "));
        let returns_void = entry_point.return_type.as_deref() == Some("void");
        let invoke_lines = if returns_void {
            format!(
                "        {};\n        std::ostringstream grader_out;\n        grader_out << \"null\";\n",
                call
            )
        } else {
            format!(
                "        auto grader_result = {};\n        std::ostringstream grader_out;\n        grader_json::emit(grader_out, grader_result);\n",
                call
            )
        };

        let main_cpp = format!(
            "{prelude}\n#define main grader_user_main\n{source}\n#undef main\n\nsigned main() {{\n    try {{\n{declarations}{invoke}        std::cout << \"{marker}\" << grader_out.str() << std::endl;\n    }} catch (const std::exception& e) {{\n        std::cerr << \"{error}\" << grader_json::exception_name(e) << \": \" << e.what() << std::endl;\n        return 1;\n    }} catch (...) {{\n        std::cerr << \"{error}\" << \"Exception: unknown exception\" << std::endl;\n        return 1;\n    }}\n    return 0;\n}}\n",
            prelude = PRELUDE,
            source = entry_point.source,
            declarations = declarations,
            invoke = invoke_lines,
            marker = RESULT_MARKER,
            error = ERROR_MARKER,
        );

        Ok(Invocation {
            language: Language::Cpp,
            files: vec![SourceFile::new("main.cpp", main_cpp)],
            stdin: String::new(),
        })
    }
}

struct FunctionDecl {
    path: Vec<String>,
    member: bool,
    is_static: bool,
    return_type: String,
    parameters: Vec<Parameter>,
}

/// Accept a `solution(` occurrence only when it defines a function with a body
fn function_at(masked: &str, name_start: usize, open: usize) -> Option<FunctionDecl> {
    let close = matching_close(masked, open)?;
    if !BODY_FOLLOWS.is_match(&masked[close + 1..]) {
        return None;
    }

    let start = statement_start(masked, name_start);
    let header = PREPROCESSOR.replace_all(&masked[start..name_start], " ");
    let header = TEMPLATE_PREFIX.replace_all(&header, " ");
    let header = ACCESS_LABEL.replace_all(&header, " ");
    let mut header = ATTRIBUTE.replace_all(&header, " ").into_owned();

    // out-of-class definition `int Solution::solution(...) {`
    let qualified = QUALIFIED_OWNER
        .captures(&header)
        .and_then(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str().to_string())));
    let mut qualifier = None;
    if let Some((cut, owner)) = qualified {
        header.truncate(cut);
        qualifier = Some(owner);
    }

    if !HEADER_CHARS.is_match(&header) {
        return None;
    }
    let tokens: Vec<&str> = header.split_whitespace().collect();
    if tokens.first().map_or(true, |t| NOT_TYPES.contains(t)) {
        return None;
    }
    let is_static = tokens.contains(&"static");
    let return_type = tokens
        .iter()
        .filter(|t| !SPECIFIERS.contains(*t))
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if return_type.is_empty() {
        return None;
    }

    let mut path = Vec::new();
    let mut member = false;
    for scope in scopes_at(masked, name_start, TYPE_KEYWORDS) {
        match scope {
            Scope::Namespace(name) => {
                member = false;
                if !name.is_empty() {
                    path.push(name);
                }
            }
            Scope::Type(name) => {
                member = true;
                path.push(name);
            }
            Scope::Block => return None,
        }
    }
    if let Some(owner) = qualifier {
        member = true;
        path.push(owner);
    }

    Some(FunctionDecl {
        path,
        member,
        is_static,
        return_type,
        parameters: parse_params(&masked[open + 1..close]),
    })
}

fn parse_params(list: &str) -> Vec<Parameter> {
    if list.trim() == "void" {
        return Vec::new();
    }

    split_params(list, true)
        .iter()
        .map(|raw| {
            let (decl, has_default) = match default_split(raw) {
                Some(eq) => (raw[..eq].trim(), true),
                None => (raw.as_str(), false),
            };
            let decl = decl.trim_end_matches(|c: char| c == '[' || c == ']' || c.is_whitespace());
            let (declared_type, name) = split_declarator(decl);
            Parameter {
                name: name.to_string(),
                declared_type: Some(declared_type.to_string()),
                has_default,
                variadic: false,
            }
        })
        .collect()
}

/// Split `const std::vector<int>& nums` into type and name; unnamed parameters keep an empty name
fn split_declarator(decl: &str) -> (&str, &str) {
    let ident_start = decl
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i);

    match ident_start {
        Some(i) if i > 0 => {
            let name = &decl[i..];
            let ty = decl[..i].trim();
            if TYPE_WORDS.contains(&name) || ty.is_empty() || ty.ends_with("::") {
                (decl, "")
            } else {
                (ty, name)
            }
        }
        _ => (decl, ""),
    }
}

/// Declared parameter types the harness can build literals for
#[derive(Debug, Clone, PartialEq, Eq)]
enum CppType {
    Integral {
        spelling: &'static str,
        min: i128,
        max: i128,
    },
    Floating(&'static str),
    Bool,
    Char,
    Str,
    Vector(Box<CppType>),
}

impl CppType {
    fn parse(text: &str) -> Result<Self, AdapterError> {
        let unsupported = || AdapterError::UnsupportedType(text.trim().to_string());
        let cleaned = text.replace("std::", "").replace('&', " ");

        if let (Some(open), Some(close)) = (cleaned.find('<'), cleaned.rfind('>')) {
            let base = words(&cleaned[..open]);
            if base != "vector" || close < open {
                return Err(unsupported());
            }
            return Ok(CppType::Vector(Box::new(Self::parse(&cleaned[open + 1..close])?)));
        }
        if cleaned.contains('*') || cleaned.contains('[') {
            return Err(unsupported());
        }

        let int_type = |spelling, min: i128, max: i128| CppType::Integral { spelling, min, max };
        let ty = match words(&cleaned).as_str() {
            "int" | "signed" | "signed int" | "int32_t" => {
                int_type("int", i32::MIN as i128, i32::MAX as i128)
            }
            "short" | "short int" | "int16_t" => int_type("short", i16::MIN as i128, i16::MAX as i128),
            "long" | "long int" | "long long" | "long long int" | "int64_t" | "ptrdiff_t" => {
                int_type("long long", i64::MIN as i128, i64::MAX as i128)
            }
            "unsigned" | "unsigned int" | "uint32_t" => int_type("unsigned int", 0, u32::MAX as i128),
            "unsigned long" | "unsigned long long" | "uint64_t" | "size_t" => {
                int_type("unsigned long long", 0, u64::MAX as i128)
            }
            "double" => CppType::Floating("double"),
            "long double" => CppType::Floating("long double"),
            "float" => CppType::Floating("float"),
            "bool" => CppType::Bool,
            "char" => CppType::Char,
            "string" => CppType::Str,
            _ => return Err(unsupported()),
        };
        Ok(ty)
    }

    fn spelling(&self) -> String {
        match self {
            CppType::Integral { spelling, .. } => spelling.to_string(),
            CppType::Floating(spelling) => spelling.to_string(),
            CppType::Bool => "bool".to_string(),
            CppType::Char => "char".to_string(),
            CppType::Str => "std::string".to_string(),
            CppType::Vector(elem) => format!("std::vector<{}>", elem.spelling()),
        }
    }

    fn literal(&self, value: &Value) -> Result<String, AdapterError> {
        let mismatch = || AdapterError::type_mismatch(value, &self.spelling());

        match self {
            CppType::Integral { min, max, .. } => {
                let n = integral(value)
                    .filter(|n| n >= min && n <= max)
                    .ok_or_else(mismatch)?;
                Ok(integer_literal(n))
            }
            CppType::Floating(_) => value
                .as_f64()
                .map(|f| format!("{:?}", f))
                .ok_or_else(mismatch),
            CppType::Bool => value.as_bool().map(|b| b.to_string()).ok_or_else(mismatch),
            CppType::Char => value
                .as_str()
                .filter(|s| s.len() == 1 && s.is_ascii())
                .map(|s| format!("static_cast<char>({})", s.as_bytes()[0]))
                .ok_or_else(mismatch),
            CppType::Str => value.as_str().map(cpp_string).ok_or_else(mismatch),
            CppType::Vector(elem) => {
                let items = value.as_array().ok_or_else(mismatch)?;
                let parts = items
                    .iter()
                    .map(|item| elem.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{{{}}}", parts.join(", ")))
            }
        }
    }
}

fn words(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| *w != "const" && *w != "volatile")
        .collect::<Vec<_>>()
        .join(" ")
}

fn integral(value: &Value) -> Option<i128> {
    if let Some(n) = value.as_i64() {
        return Some(n as i128);
    }
    if let Some(n) = value.as_u64() {
        return Some(n as i128);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0)
        .map(|f| f as i128)
}

fn integer_literal(n: i128) -> String {
    if n == i64::MIN as i128 {
        "(-9223372036854775807LL - 1)".to_string()
    } else if n > i64::MAX as i128 {
        format!("{}ULL", n)
    } else if n > i32::MAX as i128 || n < i32::MIN as i128 {
        format!("{}LL", n)
    } else {
        n.to_string()
    }
}

/// `std::string` literal with explicit length so embedded NULs survive
fn cpp_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    out.push_str("std::string(\"");
    for &b in s.as_bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'?' => out.push_str("\\?"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out.push_str(&format!("\", {})", s.len()));
    out
}

const PRELUDE: &str = r##"#include <bits/stdc++.h>
#include <cxxabi.h>

namespace grader_json {
inline void emit(std::ostream& out, bool v);
inline void emit(std::ostream& out, char v);
inline void emit(std::ostream& out, const std::string& v);
inline void emit(std::ostream& out, const char* v);
template <typename T>
typename std::enable_if<std::is_integral<T>::value>::type emit(std::ostream& out, T v);
template <typename T>
typename std::enable_if<std::is_floating_point<T>::value>::type emit(std::ostream& out, T v);
template <typename T, typename A>
void emit(std::ostream& out, const std::vector<T, A>& v);
template <typename T, std::size_t N>
void emit(std::ostream& out, const std::array<T, N>& v);
template <typename T, typename C, typename A>
void emit(std::ostream& out, const std::set<T, C, A>& v);
template <typename K, typename V, typename C, typename A>
void emit(std::ostream& out, const std::map<K, V, C, A>& v);
template <typename K, typename V, typename H, typename E, typename A>
void emit(std::ostream& out, const std::unordered_map<K, V, H, E, A>& v);
template <typename A, typename B>
void emit(std::ostream& out, const std::pair<A, B>& v);

inline void emit_string(std::ostream& out, const std::string& s) {
    out << '"';
    for (unsigned char c : s) {
        switch (c) {
            case '"': out << "\\\""; break;
            case '\\': out << "\\\\"; break;
            case '\n': out << "\\n"; break;
            case '\r': out << "\\r"; break;
            case '\t': out << "\\t"; break;
            default:
                if (c < 0x20) {
                    char buf[8];
                    std::snprintf(buf, sizeof(buf), "\\u%04x", c);
                    out << buf;
                } else {
                    out << static_cast<char>(c);
                }
        }
    }
    out << '"';
}

inline std::string key_string(const std::string& k) { return k; }
inline std::string key_string(char k) { return std::string(1, k); }
template <typename K>
std::string key_string(const K& k) {
    std::ostringstream s;
    s << k;
    return s.str();
}

template <typename It>
void emit_sequence(std::ostream& out, It begin, It end) {
    out << '[';
    for (It it = begin; it != end; ++it) {
        if (it != begin) out << ',';
        emit(out, *it);
    }
    out << ']';
}

template <typename It>
void emit_object(std::ostream& out, It begin, It end) {
    out << '{';
    for (It it = begin; it != end; ++it) {
        if (it != begin) out << ',';
        emit_string(out, key_string(it->first));
        out << ':';
        emit(out, it->second);
    }
    out << '}';
}

inline void emit(std::ostream& out, bool v) { out << (v ? "true" : "false"); }
inline void emit(std::ostream& out, char v) { emit_string(out, std::string(1, v)); }
inline void emit(std::ostream& out, const std::string& v) { emit_string(out, v); }
inline void emit(std::ostream& out, const char* v) { emit_string(out, v ? std::string(v) : std::string()); }

template <typename T>
typename std::enable_if<std::is_integral<T>::value>::type emit(std::ostream& out, T v) {
    out << +v;
}

template <typename T>
typename std::enable_if<std::is_floating_point<T>::value>::type emit(std::ostream& out, T v) {
    if (!std::isfinite(v)) {
        out << "null";
        return;
    }
    std::ostringstream tmp;
    tmp << std::setprecision(17) << v;
    out << tmp.str();
}

template <typename T, typename A>
void emit(std::ostream& out, const std::vector<T, A>& v) {
    out << '[';
    bool first = true;
    for (const auto& item : v) {
        if (!first) out << ',';
        first = false;
        emit(out, static_cast<T>(item));
    }
    out << ']';
}

template <typename T, std::size_t N>
void emit(std::ostream& out, const std::array<T, N>& v) { emit_sequence(out, v.begin(), v.end()); }

template <typename T, typename C, typename A>
void emit(std::ostream& out, const std::set<T, C, A>& v) { emit_sequence(out, v.begin(), v.end()); }

template <typename K, typename V, typename C, typename A>
void emit(std::ostream& out, const std::map<K, V, C, A>& v) { emit_object(out, v.begin(), v.end()); }

template <typename K, typename V, typename H, typename E, typename A>
void emit(std::ostream& out, const std::unordered_map<K, V, H, E, A>& v) { emit_object(out, v.begin(), v.end()); }

template <typename A, typename B>
void emit(std::ostream& out, const std::pair<A, B>& v) {
    out << '[';
    emit(out, v.first);
    out << ',';
    emit(out, v.second);
    out << ']';
}

inline std::string exception_name(const std::exception& e) {
    int status = 0;
    char* demangled = abi::__cxa_demangle(typeid(e).name(), nullptr, nullptr, &status);
    std::string name = (status == 0 && demangled) ? demangled : typeid(e).name();
    std::free(demangled);
    return name;
}
}  // namespace grader_json
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(source: &str) -> Result<EntryPoint, AdapterError> {
        CppAdapter.extract_entry_point(source)
    }

    fn main_cpp(entry: &EntryPoint, input: Value) -> String {
        let invocation = CppAdapter.invoke(entry, &input).unwrap();
        assert_eq!(invocation.files[0].name, "main.cpp");
        invocation.files[0].contents.clone()
    }

    #[test]
    fn test_free_function() {
        let source = "#include <vector>\nusing namespace std;\n\nint solution(const vector<int>& nums, int k = 2) {\n    return nums.size() * k;\n}\n";
        let entry = extract(source).unwrap();

        assert_eq!(entry.receiver, Receiver::Free);
        assert_eq!(entry.return_type.as_deref(), Some("int"));
        assert_eq!(entry.parameters[0].name, "nums");
        assert_eq!(
            entry.parameters[0].declared_type.as_deref(),
            Some("const vector<int>&")
        );
        assert_eq!(entry.arity().min, 1);
        assert_eq!(entry.arity().max, Some(2));
    }

    #[test]
    fn test_member_function_in_class() {
        let source = "class Solution {\npublic:\n    long long solution(long long a, long long b) {\n        return a + b;\n    }\n};\n";
        let entry = extract(source).unwrap();
        assert_eq!(entry.receiver, Receiver::Instance("Solution".to_string()));
        assert_eq!(entry.return_type.as_deref(), Some("long long"));
    }

    #[test]
    fn test_out_of_class_definition() {
        let source = "struct Solution { int solution(int x); };\nint Solution::solution(int x) { return x; }\n";
        let entry = extract(source).unwrap();
        assert_eq!(entry.receiver, Receiver::Instance("Solution".to_string()));
    }

    #[test]
    fn test_namespaced_function() {
        let source = "namespace algo {\nstatic int solution(int x) { return x; }\n}\n";
        let entry = extract(source).unwrap();
        assert_eq!(entry.receiver, Receiver::Static("algo".to_string()));
    }

    #[test]
    fn test_calls_and_declarations_are_not_definitions() {
        let source = "int solution(int x);\nint main() { return solution(3); }\n";
        assert_eq!(extract(source), Err(AdapterError::EntryPointNotFound));

        let source = "int solution(int x) { return x; }\nint solution(double x) { return 0; }\n";
        assert_eq!(extract(source), Err(AdapterError::EntryPointNotFound));
    }

    #[test]
    fn test_invoke_declares_typed_arguments() {
        let source = "#include <bits/stdc++.h>\nusing namespace std;\nvector<int> solution(vector<vector<int>> grid, string s, double d) { return {}; }\n";
        let entry = extract(source).unwrap();
        let cpp = main_cpp(&entry, json!([[[1, 2], [3]], "hi", 1.5]));

        assert!(cpp.contains("std::vector<std::vector<int>> arg0 = {{1, 2}, {3}};"));
        assert!(cpp.contains("std::string arg1 = std::string(\"hi\", 2);"));
        assert!(cpp.contains("double arg2 = 1.5;"));
        assert!(cpp.contains("auto grader_result = solution(arg0, arg1, arg2);"));
        assert!(cpp.contains("#define main grader_user_main"));
        assert!(cpp.contains(RESULT_MARKER));
    }

    #[test]
    fn test_invoke_void_member() {
        let source = "class Solution { public: void solution() {} };";
        let entry = extract(source).unwrap();
        let cpp = main_cpp(&entry, json!(null));
        assert!(cpp.contains("Solution().solution();"));
        assert!(cpp.contains("grader_out << \"null\";"));
    }

    #[test]
    fn test_literal_ranges() {
        let long = CppType::parse("long long").unwrap();
        assert_eq!(long.literal(&json!(5_000_000_000i64)).unwrap(), "5000000000LL");

        let int = CppType::parse("const int&").unwrap();
        assert!(int.literal(&json!(5_000_000_000i64)).is_err());
        assert_eq!(int.literal(&json!(-7)).unwrap(), "-7");

        let unsigned = CppType::parse("size_t").unwrap();
        assert!(unsigned.literal(&json!(-1)).is_err());
    }

    #[test]
    fn test_unsupported_types() {
        assert!(CppType::parse("int*").is_err());
        assert!(CppType::parse("map<string, int>").is_err());
        assert_eq!(
            CppType::parse("std::vector<std::string>").unwrap().spelling(),
            "std::vector<std::string>"
        );
    }

    #[test]
    fn test_cpp_string_escapes() {
        assert_eq!(cpp_string("a\"b"), "std::string(\"a\\\"b\", 3)");
        assert_eq!(cpp_string("é"), "std::string(\"\\303\\251\", 2)");
    }
}
