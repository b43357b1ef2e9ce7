// Result reporter: structured JSON plus a human-readable summary
use grader_common::{CaseResult, SubmissionReport};
use serde_json::Value;
use std::fmt::Write;

const HEAVY_RULE: &str = "═══════════════════════════════════════════════════════════";
const LIGHT_RULE: &str = "───────────────────────────────────────────────────────────";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub json: Value,
    pub text: String,
}

/// Render a report; every case appears, in report order
pub fn format(report: &SubmissionReport) -> RenderedReport {
    RenderedReport {
        json: to_json(report),
        text: to_text(report),
    }
}

pub fn to_json(report: &SubmissionReport) -> Value {
    // The report's serde derive already follows the wire format
    serde_json::to_value(report).unwrap_or(Value::Null)
}

pub fn to_text(report: &SubmissionReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", HEAVY_RULE);
    let _ = writeln!(
        out,
        "  Results: {}/{} test cases passed",
        report.passed_cases, report.total_cases
    );
    let _ = writeln!(out, "{}", HEAVY_RULE);

    for result in &report.case_results {
        write_case(&mut out, result);
    }

    let _ = writeln!(out, "{}", LIGHT_RULE);
    if report.all_passed {
        let _ = writeln!(out, "✓ All test cases passed. Great work!");
    } else {
        let _ = writeln!(
            out,
            "✗ {} of {} test cases failed. Review the failing cases above and try again.",
            report.failed_cases(),
            report.total_cases
        );
    }

    out
}

fn write_case(out: &mut String, result: &CaseResult) {
    let mark = if result.passed { "✓" } else { "✗" };
    let verdict = if result.passed { "passed" } else { "failed" };

    let _ = writeln!(out, "{}", LIGHT_RULE);
    let _ = writeln!(
        out,
        "{} Case {} {} ({}ms)",
        mark,
        result.index + 1,
        verdict,
        result.duration_ms
    );
    let _ = writeln!(out, "  Input:    {}", compact(&result.input));
    let _ = writeln!(out, "  Expected: {}", compact(&result.expected));

    match (&result.actual, &result.error) {
        (Some(actual), _) => {
            let _ = writeln!(out, "  Actual:   {}", compact(actual));
        }
        (None, Some(error)) => {
            let _ = writeln!(out, "  Error:    {}", error);
        }
        (None, None) => {}
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mixed_report() -> SubmissionReport {
        SubmissionReport::from_case_results(vec![
            CaseResult {
                index: 0,
                input: json!(5),
                expected: json!("10"),
                actual: Some(json!(10)),
                passed: true,
                error: None,
                duration_ms: 31,
            },
            CaseResult {
                index: 1,
                input: json!([1, 2]),
                expected: json!(3),
                actual: None,
                passed: false,
                error: Some("timeout: exceeded 100 ms".to_string()),
                duration_ms: 104,
            },
        ])
    }

    #[test]
    fn test_json_omits_absent_fields() {
        let rendered = format(&mixed_report());

        assert_eq!(rendered.json["totalCases"], json!(2));
        assert_eq!(rendered.json["passedCases"], json!(1));
        assert_eq!(rendered.json["allPassed"], json!(false));

        let first = &rendered.json["caseResults"][0];
        assert_eq!(first["actual"], json!(10));
        assert!(first.get("error").is_none());
        assert_eq!(first["durationMs"], json!(31));

        let second = &rendered.json["caseResults"][1];
        assert!(second.get("actual").is_none());
        assert_eq!(second["error"], json!("timeout: exceeded 100 ms"));
    }

    #[test]
    fn test_json_keeps_returned_null() {
        let report = SubmissionReport::from_case_results(vec![CaseResult {
            index: 0,
            input: json!(1),
            expected: Value::Null,
            actual: Some(Value::Null),
            passed: true,
            error: None,
            duration_ms: 1,
        }]);

        let json = to_json(&report);
        let case = json["caseResults"][0].as_object().unwrap();
        assert_eq!(case.get("actual"), Some(&Value::Null));
    }

    #[test]
    fn test_text_lists_every_case_in_order() {
        let text = to_text(&mixed_report());

        assert!(text.contains("Results: 1/2 test cases passed"));
        let first = text.find("✓ Case 1 passed (31ms)").unwrap();
        let second = text.find("✗ Case 2 failed (104ms)").unwrap();
        assert!(first < second);
        assert!(text.contains("  Input:    [1,2]"));
        assert!(text.contains("  Expected: \"10\""));
        assert!(text.contains("  Actual:   10"));
        assert!(text.contains("  Error:    timeout: exceeded 100 ms"));
        assert!(text.trim_end().ends_with(
            "✗ 1 of 2 test cases failed. Review the failing cases above and try again."
        ));
    }

    #[test]
    fn test_text_congratulates_when_all_pass() {
        let mut report = mixed_report();
        report.case_results.truncate(1);
        let report = SubmissionReport::from_case_results(report.case_results);

        let text = to_text(&report);
        assert!(text.trim_end().ends_with("✓ All test cases passed. Great work!"));
    }
}
