// CLI commands for grading and inspecting submissions
use anyhow::{bail, Context, Result};
use grader_common::{GraderConfig, GradingRequest, Language, SandboxBackend, SubmissionReport};
use grader_engine::adapter::Receiver;
use grader_engine::{adapter_for, reporter, EntryPoint, Grader, LanguageConfigManager, Sandbox};
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::OutputFormat;

/// Read a grading request from a file, or stdin for `-`
fn read_request(source: &str) -> Result<GradingRequest> {
    let content = if source == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read request from stdin")?;
        buffer
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };

    parse_request(&content)
}

fn parse_request(content: &str) -> Result<GradingRequest> {
    serde_json::from_str(content).context("Failed to parse grading request")
}

fn load_languages(config: &GraderConfig) -> Result<LanguageConfigManager> {
    LanguageConfigManager::load_or_builtin(Path::new(&config.language_config_path))
}

/// Grade a request and print the report; returns whether every case passed
pub async fn grade(
    request_source: &str,
    format: OutputFormat,
    time_limit_override: Option<u64>,
) -> Result<bool> {
    let config = GraderConfig::from_env().context("Invalid configuration")?;
    let mut request = read_request(request_source)?;

    if time_limit_override.is_some() {
        request.time_limit_ms = time_limit_override;
    }
    if let Err(rejection) = request.validate(config.max_time_limit_ms) {
        bail!("Request rejected: {}", rejection);
    }

    let sandbox = Sandbox::from_config(&config, load_languages(&config)?)?;
    let grader = Grader::new(sandbox, config.max_concurrent_cases);
    let time_limit_ms = request.effective_time_limit_ms(config.time_limit_ms);

    let report = grader
        .grade_submission(&request.submission(), &request.test_cases, time_limit_ms)
        .await;

    print!("{}", render(&report, format)?);
    Ok(report.all_passed)
}

fn render(report: &SubmissionReport, format: OutputFormat) -> Result<String> {
    let rendered = reporter::format(report);
    let json = serde_json::to_string_pretty(&rendered.json)?;

    Ok(match format {
        OutputFormat::Json => format!("{}\n", json),
        OutputFormat::Text => rendered.text,
        OutputFormat::Both => format!("{}\n{}", rendered.text, json),
    })
}

/// Print the entry point an author's source exposes
pub fn inspect(language: &str, source_path: &Path) -> Result<()> {
    let language: Language = match language.parse() {
        Ok(language) => language,
        Err(e) => bail!("{} (expected one of: {})", e, supported_tags()),
    };

    let source = fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read {}", source_path.display()))?;

    let entry_point = adapter_for(language)
        .extract_entry_point(&source)
        .with_context(|| format!("No usable entry point in {}", source_path.display()))?;

    print!("{}", describe_entry_point(&entry_point));
    Ok(())
}

fn describe_entry_point(entry_point: &EntryPoint) -> String {
    let mut out = String::new();

    let receiver = match &entry_point.receiver {
        Receiver::Free => "function".to_string(),
        Receiver::Static(owner) => format!("static method on {}", owner),
        Receiver::Instance(owner) => format!("instance method on new {}()", owner),
    };
    let _ = writeln!(out, "Entry point: solution ({}, {})", entry_point.language, receiver);

    if entry_point.parameters.is_empty() {
        let _ = writeln!(out, "Parameters:  none");
    } else {
        let _ = writeln!(out, "Parameters:");
        for (i, param) in entry_point.parameters.iter().enumerate() {
            let mut line = format!("  {}. {}", i + 1, param.name);
            if let Some(declared) = &param.declared_type {
                let _ = write!(line, ": {}", declared);
            }
            if param.has_default {
                line.push_str(" (optional)");
            }
            if param.variadic {
                line.push_str(" (variadic)");
            }
            let _ = writeln!(out, "{}", line);
        }
    }

    if let Some(return_type) = &entry_point.return_type {
        let _ = writeln!(out, "Returns:     {}", return_type);
    }

    let arity = entry_point.arity();
    let max = arity
        .max
        .map(|m| m.to_string())
        .unwrap_or_else(|| "unbounded".to_string());
    let _ = writeln!(out, "Arity:       min {}, max {}", arity.min, max);

    let input_hint = match (arity.min, arity.max) {
        (_, Some(0)) => "input is ignored; pass [] or null".to_string(),
        (_, Some(1)) => "input is passed as the single argument".to_string(),
        _ => "input must be an array of arguments".to_string(),
    };
    let _ = writeln!(out, "Input:       {}", input_hint);

    out
}

/// List configured runtimes and their commands
pub fn list_languages() -> Result<()> {
    let config = GraderConfig::from_env().context("Invalid configuration")?;
    let languages = load_languages(&config)?;

    println!("Sandbox backend: {}", config.sandbox_backend);
    if config.sandbox_backend == SandboxBackend::Process {
        println!("Process isolation: {}", config.process_isolation);
    }
    println!();

    for language in languages.list_languages() {
        let runtime = languages.get_config(&language)?;
        println!("{} ({})", language, runtime.version);
        println!("  image:   {}", runtime.image);
        if let Some(compile) = &runtime.compile {
            println!("  compile: {}", compile.join(" "));
        }
        println!("  run:     {}", runtime.run.join(" "));
        println!(
            "  limits:  {} MB, {} CPU",
            runtime.memory_limit_mb, runtime.cpu_limit
        );
    }

    Ok(())
}

fn supported_tags() -> String {
    Language::all_variants()
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
