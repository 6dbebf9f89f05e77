use serde_json::Map;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::openai::{ChatClient, ChatError, ChatRequest};
use crate::store::{timestamp_now, Question, TranslationMetadata, TranslationRecord};
use crate::transcript::Transcript;

/// Sampling settings for the three translation-stage calls
#[derive(Debug, Clone)]
pub struct TranslationSettings {
    pub source_language_name: String,
    pub temperature: f64,
    /// Must fit the longest expected translation; overflow truncates silently
    pub max_tokens: u32,
    pub evaluation_temperature: f64,
    pub evaluation_max_tokens: u32,
}

impl TranslationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_language_name: config.source_language_name.clone(),
            temperature: config.openai_temperature,
            max_tokens: config.translation_max_tokens,
            evaluation_temperature: config.evaluation_temperature,
            evaluation_max_tokens: config.evaluation_max_tokens,
        }
    }
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            source_language_name: "English".to_string(),
            temperature: 0.7,
            max_tokens: 5,
            evaluation_temperature: 0.1,
            evaluation_max_tokens: 1,
        }
    }
}

/// Why a (question, language) pair produced no translation record
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Translate(#[source] ChatError),

    #[error("translation came back empty")]
    EmptyTranslation,

    #[error("back-translation request failed: {0}")]
    BackTranslate(#[source] ChatError),

    #[error("back-translation came back empty")]
    EmptyBackTranslation,

    #[error("similarity evaluation request failed: {0}")]
    Evaluate(#[source] ChatError),

    #[error("similarity rating is not a number: '{0}'")]
    UnparseableRating(String),
}

/// Rubric shown to the model when rating back-translation fidelity
pub fn build_similarity_rubric(source_language: &str) -> String {
    format!(
        "You are a translation quality evaluator. Compare the original {} text with the back-translation and rate the semantic similarity on a scale of 1 to 5, where:
1 = Poor (meaning significantly altered)
2 = Fair (major meaning changes)
3 = Good (minor meaning changes)
4 = Very Good (slight nuance differences)
5 = Excellent (meanings match perfectly)
Respond with just the number.",
        source_language
    )
}

fn build_translation_system_prompt(source_language: &str, target_language: &str) -> String {
    format!(
        "You are a professional translator. Translate the following text from {} to {}. Provide only the translation, no explanations.",
        source_language, target_language
    )
}

fn build_similarity_user_prompt(original: &str, back_translation: &str) -> String {
    format!(
        "Original: {}\nBack-translation: {}\n\nRate from 1-5:",
        original, back_translation
    )
}

/// Parse a rubric answer and clamp it into 1..=5.
///
/// Only a reply that is not an integer at all is rejected.
pub fn parse_similarity_rating(content: &str) -> Option<u8> {
    let value: i64 = content.trim().parse().ok()?;
    Some(value.clamp(1, 5) as u8)
}

/// Forward translation, back-translation and fidelity rating for one pair
pub struct TranslationPipeline<'a> {
    client: &'a dyn ChatClient,
    transcript: &'a Transcript,
    settings: TranslationSettings,
}

impl<'a> TranslationPipeline<'a> {
    pub fn new(
        client: &'a dyn ChatClient,
        transcript: &'a Transcript,
        settings: TranslationSettings,
    ) -> Self {
        Self {
            client,
            transcript,
            settings,
        }
    }

    async fn translate(
        &self,
        label: &str,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<String, ChatError> {
        let request = ChatRequest::new(
            self.client.model(),
            build_translation_system_prompt(from, to),
            text,
            self.settings.temperature,
            self.settings.max_tokens,
        );

        self.transcript.request(label, &request);
        match self.client.complete(&request).await {
            Ok(completion) => {
                self.transcript.response(&completion);
                Ok(completion.content.trim().to_string())
            }
            Err(e) => {
                self.transcript.error(label, &e);
                Err(e)
            }
        }
    }

    /// Render source-language text into the target language
    pub async fn produce_translation(
        &self,
        text: &str,
        source_language_name: &str,
        target_language_code: &str,
        target_language_name: &str,
    ) -> Result<String, ChatError> {
        self.translate(
            &format!("translate {}", target_language_code),
            text,
            source_language_name,
            target_language_name,
        )
        .await
        .inspect_err(|e| warn!("Error translating to {}: {}", target_language_code, e))
    }

    /// Translate a forward translation back into the source language
    pub async fn produce_back_translation(
        &self,
        translated_text: &str,
        target_language_name: &str,
    ) -> Result<String, ChatError> {
        let source = self.settings.source_language_name.clone();
        self.translate(
            &format!("back-translate {}", target_language_name),
            translated_text,
            target_language_name,
            &source,
        )
        .await
        .inspect_err(|e| warn!("Error back-translating from {}: {}", target_language_name, e))
    }

    /// Rate how well the back-translation preserves the original meaning (1-5)
    pub async fn evaluate_similarity(
        &self,
        original: &str,
        back_translation: &str,
    ) -> Result<u8, TranslationError> {
        let request = ChatRequest::new(
            self.client.model(),
            build_similarity_rubric(&self.settings.source_language_name),
            build_similarity_user_prompt(original, back_translation),
            self.settings.evaluation_temperature,
            self.settings.evaluation_max_tokens,
        );

        self.transcript.request("evaluate", &request);
        let completion = match self.client.complete(&request).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!("Error evaluating translation: {}", e);
                self.transcript.error("evaluate", &e);
                return Err(TranslationError::Evaluate(e));
            }
        };
        self.transcript.response(&completion);

        parse_similarity_rating(&completion.content).ok_or_else(|| {
            warn!("Unparseable similarity rating: '{}'", completion.content);
            TranslationError::UnparseableRating(completion.content.clone())
        })
    }

    /// Run all three stages for one pair. A record is returned only when every stage
    /// succeeded, so callers never store a partial translation.
    pub async fn process_pair(
        &self,
        question: &Question,
        language_code: &str,
        language_name: &str,
    ) -> Result<TranslationRecord, TranslationError> {
        let source = self.settings.source_language_name.clone();

        let text = self
            .produce_translation(&question.text_en, &source, language_code, language_name)
            .await
            .map_err(TranslationError::Translate)?;
        if text.is_empty() {
            return Err(TranslationError::EmptyTranslation);
        }
        info!("Translation: {}", text);

        let back_translation = self
            .produce_back_translation(&text, language_name)
            .await
            .map_err(TranslationError::BackTranslate)?;
        if back_translation.is_empty() {
            return Err(TranslationError::EmptyBackTranslation);
        }
        info!("Back translation: {}", back_translation);

        let quality_score = self
            .evaluate_similarity(&question.text_en, &back_translation)
            .await?;
        info!("Quality score: {}/5", quality_score);

        self.transcript.section(
            &format!("Translation Process for {}", language_code),
            &format!(
                "Original ({}): {}\nTranslation: {}\nBack Translation: {}\nQuality Score: {}/5",
                question.id, question.text_en, text, back_translation, quality_score
            ),
        );

        Ok(TranslationRecord {
            text,
            back_translation,
            quality_score,
            metadata: TranslationMetadata {
                timestamp: timestamp_now(),
                model: self.client.model().to_string(),
                extra: Map::new(),
            },
            extra: Map::new(),
        })
    }
}
