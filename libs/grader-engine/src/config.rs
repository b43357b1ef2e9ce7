// Language runtime configuration for the sandbox backends
use anyhow::{bail, Context, Result};
use grader_common::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// How one language is compiled and run inside a sandbox workspace.
///
/// Commands are argv vectors executed with the workspace as working
/// directory; they refer to the file names the language adapter writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: Language,
    pub version: String,
    pub image: String,
    #[serde(default)]
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
    /// Apply RLIMIT_AS in the process backend (unsafe for JVM/V8 runtimes)
    #[serde(default)]
    pub limit_address_space: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Parse a languages.json document
    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)?;

        let mut configs = HashMap::new();
        for lang in languages_json.languages {
            if lang.run.is_empty() {
                bail!("Language '{}' has an empty run command", lang.name);
            }
            if matches!(&lang.compile, Some(cmd) if cmd.is_empty()) {
                bail!("Language '{}' has an empty compile command", lang.name);
            }
            configs.insert(lang.name, lang);
        }

        if configs.is_empty() {
            bail!("No languages configured");
        }

        Ok(Self { configs })
    }

    /// Load from `path`, falling back to the built-in runtimes when the file is absent
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        warn!(
            path = %path.display(),
            "Language config not found, using built-in runtimes"
        );
        Ok(Self::builtin())
    }

    /// Built-in runtimes matching the file names the adapters generate
    pub fn builtin() -> Self {
        let configs = [
            LanguageConfig {
                name: Language::JavaScript,
                version: "20".to_string(),
                image: "node:20-slim".to_string(),
                compile: None,
                run: argv(&["node", "main.js"]),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                limit_address_space: false,
            },
            LanguageConfig {
                name: Language::Python,
                version: "3.12".to_string(),
                image: "python:3.12-slim".to_string(),
                compile: None,
                run: argv(&["python3", "-B", "runner.py"]),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                limit_address_space: true,
            },
            LanguageConfig {
                name: Language::Java,
                version: "21".to_string(),
                image: "eclipse-temurin:21-jdk".to_string(),
                compile: Some(argv(&["javac", "-encoding", "UTF-8", "-d", ".", "Main.java"])),
                run: argv(&["java", "-Xss64m", "-cp", ".", "GraderMain"]),
                memory_limit_mb: 512,
                cpu_limit: 1.0,
                limit_address_space: false,
            },
            LanguageConfig {
                name: Language::Cpp,
                version: "13".to_string(),
                image: "gcc:13".to_string(),
                compile: Some(argv(&["g++", "-std=c++17", "-O2", "-o", "solution", "main.cpp"])),
                run: argv(&["./solution"]),
                memory_limit_mb: 256,
                cpu_limit: 0.5,
                limit_address_space: true,
            },
        ];

        Self {
            configs: configs.into_iter().map(|c| (c.name, c)).collect(),
        }
    }

    /// Replace or add one language (used to point a runtime at a custom command)
    pub fn with_config(mut self, config: LanguageConfig) -> Self {
        self.configs.insert(config.name, config);
        self
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        self.configs
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", language))
    }

    /// List all configured languages in a stable order
    pub fn list_languages(&self) -> Vec<Language> {
        Language::all_variants()
            .iter()
            .copied()
            .filter(|l| self.configs.contains_key(l))
            .collect()
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
