use regex::Regex;
use serde_json::Map;
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::openai::{ChatClient, ChatCompletion, ChatError, ChatRequest};
use crate::retry::{retry_with_fallback, Attempt, RetryPolicy};
use crate::store::{timestamp_now, ScoreMetadata, ScoreParameters, ScoreRecord, SENTINEL_SCORE};
use crate::transcript::Transcript;

/// Frames the model as a survey respondent; the scale itself comes from the language prompt
pub const RESPONDENT_SYSTEM_MESSAGE: &str = "You are a respondent in a values survey. Answer the following question with just one number that best represents your view, according to the scale provided. Do not include any extra commentary.";

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

#[derive(Debug, Clone)]
pub struct ScoreSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

impl ScoreSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.openai_temperature,
            max_tokens: config.score_max_tokens,
            retry: RetryPolicy::new(config.score_max_attempts, config.retry_delay),
        }
    }
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 3,
            retry: RetryPolicy::score_elicitation(),
        }
    }
}

static DIGITS_REGEX: OnceLock<Regex> = OnceLock::new();
static DIGIT_CHAR_REGEX: OnceLock<Regex> = OnceLock::new();

fn digits_regex() -> &'static Regex {
    DIGITS_REGEX.get_or_init(|| Regex::new(r"\d+").expect("Invalid digits regex"))
}

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DIGIT_CHAR_REGEX
        .get_or_init(|| Regex::new(r"^\d$").expect("Invalid digit regex"))
        .is_match(c.encode_utf8(&mut buf))
}

/// Numeric value of any Unicode decimal digit (`\d`), not just ASCII.
///
/// Decimal digits are encoded in contiguous runs of whole 0-9 blocks, so the value is
/// the offset from the start of the run, modulo 10.
fn decimal_digit_value(c: char) -> Option<u32> {
    if let Some(d) = c.to_digit(10) {
        return Some(d);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let code = u32::from(c);
    let mut start = code;
    while let Some(prev) = start.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        start -= 1;
    }
    Some((code - start) % 10)
}

/// Take the first run of digits anywhere in the reply and accept it if it is 1-10.
///
/// Deliberately loose: "chapter 8 of" yields 8. Digits from any script count, so
/// "٨" and "８" also yield 8.
pub fn extract_score(content: &str) -> Option<u8> {
    let digits = digits_regex().find(content)?;
    let value = digits.as_str().chars().try_fold(0u64, |acc, c| {
        acc.checked_mul(10)?.checked_add(u64::from(decimal_digit_value(c)?))
    })?;
    if (u64::from(MIN_SCORE)..=u64::from(MAX_SCORE)).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

/// User message: question text followed by the language's scale description
pub fn build_score_prompt(question: &str, language_prompt: &str) -> String {
    format!("{} {}", question, language_prompt)
}

#[derive(Debug)]
enum AttemptFailure {
    Malformed(ChatCompletion),
    Transport(ChatError),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Malformed(c) => write!(f, "invalid response format: '{}'", c.content),
            AttemptFailure::Transport(e) => write!(f, "API call failed: {}", e),
        }
    }
}

struct ScoredReply {
    score: u8,
    completion: Option<ChatCompletion>,
}

/// Single-number opinion elicitation with bounded retries
pub struct ScorePipeline<'a> {
    client: &'a dyn ChatClient,
    transcript: &'a Transcript,
    settings: ScoreSettings,
}

impl<'a> ScorePipeline<'a> {
    pub fn new(
        client: &'a dyn ChatClient,
        transcript: &'a Transcript,
        settings: ScoreSettings,
    ) -> Self {
        Self {
            client,
            transcript,
            settings,
        }
    }

    /// Ask for a 1-10 score. Never fails: after the last attempt the record carries
    /// [`SENTINEL_SCORE`] and the number of attempts used.
    pub async fn elicit_score(
        &self,
        question: &str,
        language_code: &str,
        language_prompt: &str,
    ) -> ScoreRecord {
        let request = ChatRequest::new(
            self.client.model(),
            RESPONDENT_SYSTEM_MESSAGE,
            build_score_prompt(question, language_prompt),
            self.settings.temperature,
            self.settings.max_tokens,
        );
        let max_attempts = self.settings.retry.max_attempts;

        let outcome = retry_with_fallback(
            &self.settings.retry,
            &format!("Score for {}", language_code),
            |attempt| {
                let request = &request;
                async move {
                    info!(
                        "Making API call for {} (attempt {}/{})",
                        language_code, attempt, max_attempts
                    );
                    self.transcript.request(language_code, request);

                    let completion = match self.client.complete(request).await {
                        Ok(completion) => completion,
                        Err(e) => {
                            self.transcript.error(language_code, &e);
                            return Attempt::Retry(AttemptFailure::Transport(e));
                        }
                    };
                    self.transcript.response(&completion);

                    match extract_score(&completion.content) {
                        Some(score) => {
                            info!("Received valid score: {}", score);
                            Attempt::Success(ScoredReply {
                                score,
                                completion: Some(completion),
                            })
                        }
                        None => Attempt::Retry(AttemptFailure::Malformed(completion)),
                    }
                }
            },
            || ScoredReply {
                score: SENTINEL_SCORE,
                completion: None,
            },
        )
        .await;

        let attempts = outcome.attempts;
        let mut reply = outcome.value;
        if outcome.fallback_used {
            warn!(
                "Failed to get a valid score for {} after {} attempts, using {}",
                language_code, attempts, SENTINEL_SCORE
            );
            // Keep the newest response that did arrive for provenance
            reply.completion = outcome.failures.into_iter().rev().find_map(|f| match f {
                AttemptFailure::Malformed(c) => Some(c),
                AttemptFailure::Transport(_) => None,
            });
        }

        let record = ScoreRecord {
            score: reply.score,
            metadata: ScoreMetadata {
                timestamp: timestamp_now(),
                model: self.client.model().to_string(),
                prompt: request.user_message().to_string(),
                system_message: request.system_message().to_string(),
                parameters: ScoreParameters {
                    temperature: request.temperature,
                    max_tokens: request.max_tokens,
                },
                language_code: language_code.to_string(),
                response_id: reply.completion.as_ref().map(|c| c.id.clone()),
                raw_response: reply.completion.map(|c| c.content),
                attempts,
                extra: Map::new(),
            },
            extra: Map::new(),
        };

        self.transcript.section(
            "Stored Score Data",
            &serde_json::to_string_pretty(&record).unwrap_or_default(),
        );
        record
    }
}
