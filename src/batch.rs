//! Sequential driver over questions × languages for both pipelines.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::scoring::ScorePipeline;
use crate::store::{DataStore, Question, SENTINEL_SCORE};
use crate::translation::TranslationPipeline;

/// Which pairs a batch run touches
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    /// Only this question id, if set
    pub question_id: Option<String>,
    /// Only this language code, if set
    pub language_code: Option<String>,
    /// Overwrite existing records instead of skipping them
    pub force: bool,
}

impl BatchFilter {
    pub fn includes_question(&self, id: &str) -> bool {
        self.question_id.as_deref().map_or(true, |q| q == id)
    }

    pub fn includes_language(&self, code: &str) -> bool {
        self.language_code.as_deref().map_or(true, |l| l == code)
    }
}

/// Skip-if-present unless forced, shared by both batches
pub fn should_generate(record_exists: bool, force: bool) -> bool {
    force || !record_exists
}

/// Per-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub generated: usize,
    pub skipped_existing: usize,
    pub skipped_missing: usize,
    pub failed: usize,
    /// Score records that fell back to the sentinel value
    pub sentinel: usize,
}

impl BatchReport {
    pub fn log(&self, kind: &str) {
        info!(
            "{} batch finished: {} generated, {} already present, {} missing inputs, {} failed, {} sentinel",
            kind,
            self.generated,
            self.skipped_existing,
            self.skipped_missing,
            self.failed,
            self.sentinel
        );
    }
}

fn warn_on_unmatched_filter(
    filter: &BatchFilter,
    questions: &[Question],
    language_codes: &[&String],
) {
    if let Some(id) = &filter.question_id {
        if !questions.iter().any(|q| &q.id == id) {
            warn!("Question {} not found in the questions document", id);
        }
    }
    if let Some(code) = &filter.language_code {
        if !language_codes.iter().any(|c| *c == code) {
            warn!("Language {} not found in the languages document", code);
        }
    }
}

/// Translate every selected (question, language) pair that lacks a record.
///
/// The translations document is saved after each question that gained a record, so a
/// crash loses at most one question's work. Languages are visited in file order and
/// the source language itself is never a translation target.
pub async fn run_translation_batch(
    store: &DataStore,
    pipeline: &TranslationPipeline<'_>,
    source_language_code: &str,
    filter: &BatchFilter,
) -> Result<BatchReport> {
    let questions = store.load_questions()?;
    let languages = store.load_languages()?;
    let mut translations = store.load_translations()?;
    let mut report = BatchReport::default();

    info!(
        "Found {} questions and {} languages",
        questions.len(),
        languages.len()
    );
    warn_on_unmatched_filter(filter, &questions, &languages.keys().collect::<Vec<_>>());

    for question in questions.iter().filter(|q| filter.includes_question(&q.id)) {
        info!("Processing question: {}", question.id);
        info!("Original text: {}", question.text_en);
        let generated_before = report.generated;

        for (code, language) in languages
            .iter()
            .filter(|(code, _)| code.as_str() != source_language_code)
            .filter(|(code, _)| filter.includes_language(code))
        {
            let exists = translations
                .get(&question.id)
                .is_some_and(|by_lang| by_lang.contains_key(code));
            if !should_generate(exists, filter.force) {
                debug!("Translation exists for {}, skipping", code);
                report.skipped_existing += 1;
                continue;
            }

            if question.text_en.trim().is_empty() {
                warn!("Question {} has no source text, skipping", question.id);
                report.skipped_missing += 1;
                continue;
            }

            info!("Processing language: {} ({})", code, language.name);
            match pipeline.process_pair(question, code, &language.name).await {
                Ok(record) => {
                    translations
                        .entry(question.id.clone())
                        .or_default()
                        .insert(code.clone(), record);
                    report.generated += 1;
                }
                Err(e) => {
                    warn!(
                        "No translation stored for {} / {}: {}",
                        question.id, code, e
                    );
                    report.failed += 1;
                }
            }
        }

        if report.generated > generated_before {
            store.save_translations(&translations)?;
            info!("Saved translations for {}", question.id);
        }
    }

    report.log("Translation");
    Ok(report)
}

/// Elicit an opinion score for every selected pair that has input text and lacks a
/// score. Non-source languages are scored on their stored translation; the source
/// language is scored on the question text. Scores are saved once, at the end, and
/// only if the run produced any.
pub async fn run_score_batch(
    store: &DataStore,
    pipeline: &ScorePipeline<'_>,
    source_language_code: &str,
    filter: &BatchFilter,
) -> Result<BatchReport> {
    let questions = store.load_questions()?;
    let languages = store.load_languages()?;
    let translations = store.load_translations()?;
    let mut scores = store.load_scores()?;
    let mut report = BatchReport::default();

    info!(
        "Found {} questions and {} languages",
        questions.len(),
        languages.len()
    );
    warn_on_unmatched_filter(filter, &questions, &languages.keys().collect::<Vec<_>>());

    for question in questions.iter().filter(|q| filter.includes_question(&q.id)) {
        info!("Processing question: {}", question.id);

        for (code, language) in languages
            .iter()
            .filter(|(code, _)| filter.includes_language(code))
        {
            let exists = scores
                .get(&question.id)
                .is_some_and(|by_lang| by_lang.contains_key(code));
            if !should_generate(exists, filter.force) {
                debug!("Score already exists for {}", code);
                report.skipped_existing += 1;
                continue;
            }

            let input = if code == source_language_code {
                Some(question.text_en.as_str())
            } else {
                translations
                    .get(&question.id)
                    .and_then(|by_lang| by_lang.get(code))
                    .map(|t| t.text.as_str())
            };
            let Some(input) = input.filter(|text| !text.trim().is_empty()) else {
                warn!("No translation found for {} / {}, skipping", question.id, code);
                report.skipped_missing += 1;
                continue;
            };

            info!("Scoring {} in {}: {}", question.id, code, input);
            let record = pipeline.elicit_score(input, code, &language.prompt).await;
            if record.score == SENTINEL_SCORE {
                report.sentinel += 1;
            }
            scores
                .entry(question.id.clone())
                .or_default()
                .insert(code.clone(), record);
            report.generated += 1;
        }
    }

    if report.generated > 0 {
        store.save_scores(&scores)?;
    }
    report.log("Score");
    Ok(report)
}
