use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_url: String,
    pub openai_temperature: f64,

    // Output budgets
    pub translation_max_tokens: u32,
    pub score_max_tokens: u32,
    pub evaluation_temperature: f64,
    pub evaluation_max_tokens: u32,

    // Pacing
    pub rate_limit_delay: Duration,
    pub score_max_attempts: u32,
    pub retry_delay: Duration,

    // Source language
    pub source_language_code: String,
    pub source_language_name: String,

    // Files
    pub questions_file: PathBuf,
    pub languages_file: PathBuf,
    pub translations_file: PathBuf,
    pub scores_file: PathBuf,
    pub transcript_file: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // OpenAI
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY not set")?,
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-2024-08-06"),
            openai_api_url: env_or(
                "OPENAI_API_URL",
                "https://api.openai.com/v1/chat/completions",
            ),
            openai_temperature: env_parse("OPENAI_TEMPERATURE", 0.7),

            // Translations are tiny; size this to the longest expected question
            translation_max_tokens: env_parse("TRANSLATION_MAX_TOKENS", 5),
            // Two digits plus newline
            score_max_tokens: env_parse("SCORE_MAX_TOKENS", 3),
            evaluation_temperature: env_parse("EVALUATION_TEMPERATURE", 0.1),
            evaluation_max_tokens: env_parse("EVALUATION_MAX_TOKENS", 1),

            // Pacing
            rate_limit_delay: Duration::from_millis(env_parse("RATE_LIMIT_DELAY_MS", 1000)),
            score_max_attempts: env_parse::<u32>("SCORE_MAX_ATTEMPTS", 3).max(1),
            retry_delay: Duration::from_millis(env_parse("RETRY_DELAY_MS", 1000)),

            // Source language
            source_language_code: env_or("SOURCE_LANGUAGE_CODE", "en"),
            source_language_name: env_or("SOURCE_LANGUAGE_NAME", "English"),

            // Files
            questions_file: env_or("QUESTIONS_FILE", "app/data/questions.json").into(),
            languages_file: env_or("LANGUAGES_FILE", "app/data/languages.json").into(),
            translations_file: env_or("TRANSLATIONS_FILE", "app/data/translations.json").into(),
            scores_file: env_or("SCORES_FILE", "app/data/scores.json").into(),
            transcript_file: env_or("TRANSCRIPT_FILE", "temp_output.txt").into(),
        })
    }
}
